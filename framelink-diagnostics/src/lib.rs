//! # framelink diagnostics
//!
//! Logging setup and connection diagnostics for framelink.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod connection_analyzer;
pub mod debug_logger;

// Re-export main types
pub use connection_analyzer::{ConnectionAnalyzer, ConnectionReport, SharedAnalyzer, StatusEvent};
pub use debug_logger::init_logging;
