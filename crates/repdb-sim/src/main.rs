//! RepDB simulation driver.
//!
//! Reads an operation script (file or standard input), feeds one line per
//! logical tick to the engine, and prints the event transcript. Malformed
//! scripts and protocol violations terminate with a descriptive message
//! and a nonzero exit status.

mod parser;
mod reporter;

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use repdb_common::SimConfig;
use repdb_engine::Simulation;
use reporter::ConsoleReporter;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// RepDB - deterministic simulator of replicated transaction processing
#[derive(Parser, Debug)]
#[command(name = "repdb-sim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the operation script; standard input when omitted
    script: Option<PathBuf>,

    /// Enable verbose engine logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();

    let input: Box<dyn BufRead> = match &args.script {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("cannot open script {}", path.display()))?,
        )),
        None => {
            info!("reading from standard input (type exit to quit)");
            Box::new(BufReader::new(io::stdin()))
        }
    };

    run(input)
}

fn run(input: Box<dyn BufRead>) -> anyhow::Result<()> {
    let config = SimConfig::default();
    let mut sim = Simulation::new(&config, ConsoleReporter::stdout());

    for (lineno, line) in input.lines().enumerate() {
        let line = line.context("cannot read script line")?;
        if line.trim() == "exit" {
            break;
        }

        let batch = parser::parse_line(&line, &config)
            .with_context(|| format!("line {}: invalid operation", lineno + 1))?;
        // Comment lines do not consume a tick.
        let Some(batch) = batch else { continue };

        sim.step(&batch)
            .with_context(|| format!("line {}: '{}'", lineno + 1, line.trim()))?;
    }

    info!("simulation completed");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_run_executes_script_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "// a full round trip").unwrap();
        writeln!(file, "begin(T1)").unwrap();
        writeln!(file, "W(T1, x2, 99)").unwrap();
        writeln!(file, "end(T1)").unwrap();
        writeln!(file, "dump(x2)").unwrap();
        file.flush().unwrap();

        let input = Box::new(BufReader::new(File::open(file.path()).unwrap()));
        assert!(run(input).is_ok());
    }

    #[test]
    fn test_run_stops_at_exit() {
        let script = b"begin(T1)\nexit\nnot a line\n" as &[u8];
        assert!(run(Box::new(BufReader::new(script))).is_ok());
    }

    #[test]
    fn test_malformed_operation_is_fatal() {
        let script = b"begin(T1)\nW(T1, x99, 1)\n" as &[u8];
        assert!(run(Box::new(BufReader::new(script))).is_err());
    }

    #[test]
    fn test_protocol_violation_is_fatal() {
        let script = b"begin(T1)\nbegin(T1)\n" as &[u8];
        assert!(run(Box::new(BufReader::new(script))).is_err());
    }
}
