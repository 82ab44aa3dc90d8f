//! Logging infrastructure
//!
//! Structured logging using tracing and tracing-subscriber:
//! - JSON or pretty stdout output
//! - Optional daily rolling JSON log file

pub mod logger;

pub use logger::Logger;
