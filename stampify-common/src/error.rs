//! Common error types for Stampify

use thiserror::Error;

/// Common result type for Stampify operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while bootstrapping the scanner (config files, settings values)
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A setting value that does not name a known option
    #[error("Invalid value for {setting}: '{value}' (expected one of: {expected})")]
    InvalidSetting {
        setting: &'static str,
        value: String,
        expected: &'static str,
    },
}
