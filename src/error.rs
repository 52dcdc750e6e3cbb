use thiserror::Error;

#[derive(Error, Debug)]
pub enum NormalizeError {
    #[error("unresolvable classification text: {0}")]
    Classification(String),

    #[error("unparseable value: {0}")]
    Format(String),

    #[error("value outside allowed bounds: {0}")]
    Range(String),

    #[error("cross-field inconsistency: {0}")]
    Consistency(String),

    #[error("conflicting input paths: {0}")]
    ConfigurationConflict(String),

    #[error("malformed input shape: {0}")]
    Structural(String),

    #[error("label/value sequences have different lengths: {labels} vs {values}")]
    LengthMismatch { labels: usize, values: usize },

    #[error("invalid flag value: {0}")]
    InvalidFlag(String),

    #[error("invalid availability value: {0}")]
    InvalidAvailability(String),

    #[error("no room count found in: {0}")]
    MissingRoomCount(String),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NormalizeError>;
