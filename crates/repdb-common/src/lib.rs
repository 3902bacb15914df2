//! # RepDB Common
//!
//! Common types, errors, and configuration shared across all RepDB crates.

pub mod config;
pub mod error;
pub mod event;
pub mod types;

pub use config::SimConfig;
pub use error::{Error, Result};
pub use types::*;

/// Re-export commonly used types
pub mod prelude {
    pub use super::config::SimConfig;
    pub use super::error::{DataError, Error, ProtocolError, Result};
    pub use super::event::{AbortReason, Event, EventSink, MemorySink, NullSink, SuspendKind};
    pub use super::types::*;
    pub use tracing::{debug, error, info, trace, warn};
}
