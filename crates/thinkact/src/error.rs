//! Typed errors for the engine and its model client.

use thiserror::Error;

use crate::api::retry;

/// A failure reported by a [`ModelClient`](crate::api::model::ModelClient).
///
/// `kind` is a short type label for diagnostics (for example
/// `WebClientRequestException`); `response_body` is set when the failure came
/// back as a structured API error and is surfaced in escalation reports.
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct ModelError {
    pub message: String,
    pub kind: String,
    pub response_body: Option<String>,
}

impl ModelError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            response_body: None,
        }
    }

    /// Attach the raw response body of a structured API error.
    pub fn with_response_body(mut self, body: impl Into<String>) -> Self {
        self.response_body = Some(body.into());
        self
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    /// The interruption checker asked the agent to stop.
    #[error("{0}")]
    Interrupted(String),
    /// The prompt is still over the model limit after both compression passes.
    /// `tokens_before` is the count before compression, `current_tokens` after.
    #[error(
        "token limit exceeded for model {model_name}: {current_tokens} tokens after compression, \
         {tokens_before} before (limit: {limit})"
    )]
    TokenLimitExceeded {
        tokens_before: usize,
        current_tokens: usize,
        limit: usize,
        model_name: String,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("execution failed: {0}")]
    Execution(String),
}

impl EngineError {
    /// Whether a think attempt that failed with this error may be retried.
    ///
    /// Only model-call failures whose message or kind matches a network,
    /// timeout, or DNS pattern qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Model(e) => {
                retry::is_retryable_error(&e.message) || retry::is_retryable_error(&e.kind)
            }
            _ => false,
        }
    }

    /// Short type label used in diagnostic reports.
    pub fn kind(&self) -> &str {
        match self {
            EngineError::Interrupted(_) => "Interrupted",
            EngineError::TokenLimitExceeded { .. } => "TokenLimitExceeded",
            EngineError::Model(e) => &e.kind,
            EngineError::InvalidState(_) => "InvalidState",
            EngineError::Execution(_) => "Execution",
        }
    }

    /// Raw response body when the error came from a structured API failure.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            EngineError::Model(e) => e.response_body.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn network_model_errors_are_retryable() {
        let err = EngineError::from(ModelError::new("IoError", "connection reset by peer"));
        assert!(err.is_retryable());

        let err = EngineError::from(ModelError::new(
            "WebClientRequestException",
            "request to upstream failed",
        ));
        assert!(err.is_retryable());
    }

    #[test]
    fn token_limit_is_never_retryable() {
        let err = EngineError::TokenLimitExceeded {
            tokens_before: 12000,
            current_tokens: 9000,
            limit: 8000,
            model_name: "timeout-model".into(),
        };
        assert!(!err.is_retryable());
        let text = err.to_string();
        assert!(text.contains("9000 tokens after compression, 12000 before"));
        assert!(text.contains("8000"));
    }

    #[test]
    fn response_body_only_for_model_errors() {
        let err = EngineError::from(
            ModelError::new("ApiError", "HTTP 400").with_response_body(r#"{"error":"bad"}"#),
        );
        assert_eq!(err.response_body(), Some(r#"{"error":"bad"}"#));
        assert_eq!(err.kind(), "ApiError");
        assert!(EngineError::InvalidState("x".into()).response_body().is_none());
    }
}
