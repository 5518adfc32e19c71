//! Settings errors.

use thiserror::Error;

/// Errors from loading or parsing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    /// The settings file or merged result was not valid JSON.
    #[error("invalid settings: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, SettingsError>;
