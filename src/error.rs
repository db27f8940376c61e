use serde_json::{json, Value};

use crate::bus::TransportError;
use crate::config::ConfigError;
use crate::mail::DeliveryError;

/// Process-level failures. Any of these stops the worker.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Mail provider setup failed: {0}")]
    Mail(#[from] DeliveryError),
}

pub type Result<T> = std::result::Result<T, AppError>;

/// Failures local to a single request. The dispatcher turns each of these
/// into a failure reply; none of them ends a subscription.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Malformed request: {0}")]
    Decode(String),

    #[error("Unknown template: {0}")]
    UnknownTemplate(String),

    #[error("Template {template} requires parameter \"{parameter}\"")]
    MissingParameter {
        template: &'static str,
        parameter: &'static str,
    },

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

impl HandlerError {
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::Decode(_) => "decode_error",
            HandlerError::UnknownTemplate(_) => "unknown_template",
            HandlerError::MissingParameter { .. } => "missing_parameter",
            HandlerError::Delivery(_) => "delivery_error",
        }
    }

    /// Body of the failure acknowledgement sent back to the requester.
    pub fn to_reply(&self) -> Value {
        failure_reply(self.code(), &self.to_string())
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Decode(format!("JSON error: {}", err))
    }
}

pub fn failure_reply(code: &str, message: &str) -> Value {
    json!({
        "ok": false,
        "code": code,
        "error": message
    })
}

pub fn success_reply() -> Value {
    json!({ "ok": true })
}

pub type HandlerResult = std::result::Result<Value, HandlerError>;
