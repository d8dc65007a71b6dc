//! Command implementations for the CLI
//!
//! - start: Run the log server
//! - test: Test configuration validity
//! - config: Configuration display
//! - logs: Query or follow a running server's logs

pub mod config;
pub mod logs;
pub mod start;
