// error.rs - Bot Error Types
// One error enum shared by the backend client, the reply relay and every slash command.
//
// Used by: service.rs, attachments.rs, relay/, commands/

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// No backend URL configured for the provider (e.g. "Ollama")
    #[error("No {0} server configured. Please update the .env configuration.")]
    MissingServer(&'static str),

    #[error("invalid server url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("failed to download attachment {name}: {reason}")]
    Attachment { name: String, reason: String },

    #[error("failed to extract PDF text: {0}")]
    Pdf(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Discord(#[from] serenity::Error),
}

impl BotError {
    /// Errors that happen before any backend call and carry their own user-facing text
    pub fn is_configuration(&self) -> bool {
        matches!(self, BotError::MissingServer(_) | BotError::Config(_))
    }
}

pub type BotResult<T> = Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_server_names_provider() {
        let err = BotError::MissingServer("Ollama");
        assert_eq!(
            err.to_string(),
            "No Ollama server configured. Please update the .env configuration."
        );
        assert!(err.is_configuration());
    }

    #[test]
    fn test_json_error_is_not_configuration() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(!BotError::from(json_err).is_configuration());
    }
}
