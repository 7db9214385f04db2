use thiserror::Error;

/// Errors raised while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame was not valid JSON at all.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// The frame was JSON but did not match the shape its `type` declares.
    #[error("invalid {kind} message: {details}")]
    Schema { kind: String, details: String },

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProtocolError {
    pub fn schema(kind: impl Into<String>, details: impl std::fmt::Display) -> Self {
        Self::Schema {
            kind: kind.into(),
            details: details.to_string(),
        }
    }

    /// Short machine-facing label used in `{error, details}` replies.
    pub fn label(&self) -> String {
        match self {
            Self::InvalidJson(_) => "Invalid JSON format".to_string(),
            Self::Schema { kind, .. } => format!("Invalid {kind} format"),
            Self::Serialization(_) => "Serialization failure".to_string(),
        }
    }

    /// Human-facing detail string for `{error, details}` replies.
    pub fn details(&self) -> String {
        match self {
            Self::InvalidJson(d) | Self::Serialization(d) => d.clone(),
            Self::Schema { details, .. } => details.clone(),
        }
    }
}
