//! Error types for the vocare client

use thiserror::Error;

/// Result type alias for vocare operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the vocare client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone access refused by the platform
    #[error("microphone access denied: {0}")]
    PermissionDenied(String),

    /// Network or backend failure during an exchange
    #[error("transport error: {0}")]
    Transport(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_reason() {
        let error = Error::Transport("connection refused".to_string());

        assert_eq!(error.to_string(), "transport error: connection refused");
    }
}
