//! Error types for formstate-core.
//!
//! Only construction-time and boundary operations return errors: schema
//! parsing, rendering, identifier parsing and submission. Cascades triggered
//! by field changes never surface an error; every sub-step degrades to
//! "skip this effect" instead.

use thiserror::Error;

pub type FormResult<T> = Result<T, FormError>;

#[derive(Debug, Error)]
pub enum FormError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("invalid schema: {0}")]
    Schema(String),

    #[error("malformed field identifier `{id}`: {reason}")]
    Identifier { id: String, reason: String },

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown array container: {0}")]
    UnknownContainer(String),

    #[error("calculation cycle through: {}", .0.join(" -> "))]
    CalculationCycle(Vec<String>),

    #[error("submission blocked by {0} validation error(s)")]
    ValidationPending(usize),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl FormError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn identifier(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Identifier {
            id: id.into(),
            reason: reason.into(),
        }
    }
}
