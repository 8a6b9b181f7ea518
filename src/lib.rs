pub mod claude;
pub mod cli;
pub mod config;
pub mod error;
pub mod projects;
pub mod runtime;
pub mod ui;

pub use error::{Error, Result};

/// Version of claude-deck
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
