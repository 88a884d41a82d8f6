use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Data availability
    #[error("No data: {0}")]
    NotFound(String),

    // Live source faults
    #[error("Transport error from {source_id}: {message}")]
    Transport {
        source_id: String,
        message: String,
    },

    // Construction / configuration
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Subscriber fan-out
    #[error("Delivery to subscriber {subscriber} failed: {message}")]
    Delivery {
        subscriber: String,
        message: String,
    },

    // Durability sink
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    pub fn transport(source_id: &str, message: impl Into<String>) -> Self {
        Error::Transport {
            source_id: source_id.to_string(),
            message: message.into(),
        }
    }

    pub fn delivery(subscriber: impl ToString, message: impl Into<String>) -> Self {
        Error::Delivery {
            subscriber: subscriber.to_string(),
            message: message.into(),
        }
    }

    /// Machine-readable classification surfaced to API callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Transport { .. } => ErrorKind::Transport,
            Error::Validation(_) | Error::ConfigError(_) => ErrorKind::Validation,
            Error::Delivery { .. } => ErrorKind::Delivery,
            Error::Storage(_) | Error::IoError(_) => ErrorKind::Storage,
            Error::SerializationError(_) => ErrorKind::Internal,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::SerializationError(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Transport,
    Validation,
    Delivery,
    Storage,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(Error::NotFound("empty".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::transport("stellar", "timeout").kind(), ErrorKind::Transport);
        assert_eq!(Error::Validation("max_retained".into()).kind(), ErrorKind::Validation);
        assert_eq!(Error::delivery("abc", "closed").kind(), ErrorKind::Delivery);
        assert_eq!(Error::Storage("disk".into()).kind(), ErrorKind::Storage);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
    }
}
