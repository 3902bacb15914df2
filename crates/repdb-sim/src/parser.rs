//! Script parser.
//!
//! One input line is one logical tick's batch: operations separated by
//! `;`, mnemonics case-insensitive, `//` lines skipped. Everything is
//! validated here; the engine receives only well-formed operations.

use repdb_common::types::{DumpScope, Operation, SiteId, VariableId};
use repdb_common::SimConfig;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ParseError {
    #[error("operation '{0}' is not supported")]
    UnknownOperation(String),

    #[error("operation '{0}' is missing an argument")]
    MissingArgument(String),

    #[error("'{0}' is not a valid site (expected 1..={1})")]
    InvalidSite(String, u8),

    #[error("'{0}' is not a valid variable (expected x1..=x{1})")]
    InvalidVariable(String, u8),

    #[error("'{0}' is not a valid integer write value")]
    InvalidValue(String),
}

/// Parses one script line into a batch of operations.
///
/// Returns `None` for comment lines (they do not consume a tick). A blank
/// line is an empty batch: the clock still advances, which scripts use to
/// let buffered operations rerun.
pub fn parse_line(line: &str, config: &SimConfig) -> Result<Option<Vec<Operation>>, ParseError> {
    let line = line.trim();
    if line.starts_with("//") {
        return Ok(None);
    }

    line.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(|stmt| parse_operation(stmt, config))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn parse_operation(stmt: &str, config: &SimConfig) -> Result<Operation, ParseError> {
    let (name, args) = split_call(stmt);
    let name = name.trim().to_lowercase();
    let args: Vec<&str> = args
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .collect();

    match name.as_str() {
        "begin" => Ok(Operation::Begin {
            txn: txn_arg(&args, stmt)?,
        }),
        "beginro" => Ok(Operation::BeginRo {
            txn: txn_arg(&args, stmt)?,
        }),
        "r" | "read" => Ok(Operation::Read {
            txn: txn_arg(&args, stmt)?,
            variable: variable_arg(&args, 1, stmt, config)?,
        }),
        "w" | "write" => Ok(Operation::Write {
            txn: txn_arg(&args, stmt)?,
            variable: variable_arg(&args, 1, stmt, config)?,
            value: value_arg(&args, stmt)?,
        }),
        "end" => Ok(Operation::End {
            txn: txn_arg(&args, stmt)?,
        }),
        "dump" => parse_dump(&args, config),
        "fail" => Ok(Operation::Fail(site_arg(&args, stmt, config)?)),
        "recover" => Ok(Operation::Recover(site_arg(&args, stmt, config)?)),
        _ => Err(ParseError::UnknownOperation(stmt.to_string())),
    }
}

/// Splits `name(arg, ...)` into name and argument text; a missing or
/// unclosed parenthesis yields an empty argument list.
fn split_call(stmt: &str) -> (&str, &str) {
    match stmt.split_once('(') {
        Some((name, rest)) => (name, rest.trim_end().trim_end_matches(')')),
        None => (stmt, ""),
    }
}

/// Transaction names are matched case-insensitively; normalize once here.
fn txn_arg(args: &[&str], stmt: &str) -> Result<String, ParseError> {
    args.first()
        .map(|t| t.to_uppercase())
        .ok_or_else(|| ParseError::MissingArgument(stmt.to_string()))
}

fn variable_arg(
    args: &[&str],
    index: usize,
    stmt: &str,
    config: &SimConfig,
) -> Result<VariableId, ParseError> {
    let raw = args
        .get(index)
        .ok_or_else(|| ParseError::MissingArgument(stmt.to_string()))?;
    parse_variable(raw, config)
}

fn parse_variable(raw: &str, config: &SimConfig) -> Result<VariableId, ParseError> {
    raw.parse::<VariableId>()
        .ok()
        .filter(|v| v.0 <= config.variables)
        .ok_or_else(|| ParseError::InvalidVariable(raw.to_string(), config.variables))
}

fn site_arg(args: &[&str], stmt: &str, config: &SimConfig) -> Result<SiteId, ParseError> {
    let raw = args
        .first()
        .ok_or_else(|| ParseError::MissingArgument(stmt.to_string()))?;
    parse_site(raw, config)
}

fn parse_site(raw: &str, config: &SimConfig) -> Result<SiteId, ParseError> {
    raw.parse::<u8>()
        .ok()
        .filter(|&s| (1..=config.sites).contains(&s))
        .map(SiteId)
        .ok_or_else(|| ParseError::InvalidSite(raw.to_string(), config.sites))
}

fn value_arg(args: &[&str], stmt: &str) -> Result<i64, ParseError> {
    let raw = args
        .get(2)
        .ok_or_else(|| ParseError::MissingArgument(stmt.to_string()))?;
    raw.parse::<i64>()
        .map_err(|_| ParseError::InvalidValue(raw.to_string()))
}

/// `dump()` reports everything; a numeric argument is a site, anything
/// else must be a variable.
fn parse_dump(args: &[&str], config: &SimConfig) -> Result<Operation, ParseError> {
    let scope = match args.first() {
        None => DumpScope::All,
        Some(raw) if raw.chars().all(|c| c.is_ascii_digit()) => {
            DumpScope::Site(parse_site(raw, config)?)
        }
        Some(raw) => DumpScope::Variable(parse_variable(raw, config)?),
    };
    Ok(Operation::Dump(scope))
}
