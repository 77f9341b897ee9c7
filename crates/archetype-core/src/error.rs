use crate::user::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchetypeError {
    #[error("not initialized: run 'archetype init'")]
    NotInitialized,

    #[error("illegitimate form submission")]
    Security,

    #[error(transparent)]
    Validation(FormErrors),

    #[error("permission denied: cannot {action} user {user}")]
    Permission { action: String, user: UserId },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("no context set: call set_context before reading fields")]
    NoContext,

    #[error("form not found: {0}")]
    FormNotFound(String),

    #[error("field not found: {0}")]
    FieldNotFound(String),

    #[error("user not found: {0}")]
    UserNotFound(UserId),

    #[error("funnel not found: {0}")]
    FunnelNotFound(String),

    #[error("facebook: {0}")]
    Facebook(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Form(#[from] serde_urlencoded::de::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, ArchetypeError>;

// ---------------------------------------------------------------------------
// FormError: one user-visible message collected during a submission
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    FailedNonceCheck,
    GenericValidationFailure,
    FailedFieldValidation,
    GeneralErrors,
    ProcessorError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl FormError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn for_field(code: ErrorCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

/// The ordered list of errors a form submission produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormErrors(pub Vec<FormError>);

impl FormErrors {
    pub fn iter(&self) -> std::slice::Iter<'_, FormError> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn messages(&self) -> Vec<&str> {
        self.0.iter().map(|e| e.message.as_str()).collect()
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "errors found: {}", self.messages().join("; "))
    }
}

impl std::error::Error for FormErrors {}
