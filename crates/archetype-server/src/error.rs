use archetype_core::error::ArchetypeError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

// ---------------------------------------------------------------------------
// Internal sentinel for explicit 400 Bad Request errors
// ---------------------------------------------------------------------------

/// Carries an explicit HTTP 400 through the `anyhow::Error` chain for caller
/// mistakes that are not core errors, such as an unknown context name.
#[derive(Debug)]
struct BadRequestError(String);

impl std::fmt::Display for BadRequestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BadRequestError {}

// ---------------------------------------------------------------------------
// AppError: unified error type for HTTP responses
// ---------------------------------------------------------------------------

/// Unified error type for HTTP responses.
#[derive(Debug)]
pub struct AppError(pub anyhow::Error);

impl AppError {
    /// Construct a 400 Bad Request error with the given message.
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self(BadRequestError(msg.into()).into())
    }
}

fn status_for(e: &ArchetypeError) -> StatusCode {
    match e {
        ArchetypeError::NotInitialized => StatusCode::BAD_REQUEST,
        ArchetypeError::Security | ArchetypeError::Permission { .. } => StatusCode::FORBIDDEN,
        ArchetypeError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ArchetypeError::NoContext | ArchetypeError::Form(_) | ArchetypeError::Json(_) => {
            StatusCode::BAD_REQUEST
        }
        ArchetypeError::FormNotFound(_)
        | ArchetypeError::FieldNotFound(_)
        | ArchetypeError::UserNotFound(_)
        | ArchetypeError::FunnelNotFound(_) => StatusCode::NOT_FOUND,
        ArchetypeError::Facebook(_) | ArchetypeError::Http(_) => StatusCode::BAD_GATEWAY,
        ArchetypeError::Configuration(_) | ArchetypeError::Io(_) | ArchetypeError::Yaml(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if let Some(b) = self.0.downcast_ref::<BadRequestError>() {
            let body = serde_json::json!({ "error": b.0.clone() });
            return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
        }

        let Some(e) = self.0.downcast_ref::<ArchetypeError>() else {
            let body = serde_json::json!({ "error": self.0.to_string() });
            return (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(body)).into_response();
        };

        let status = status_for(e);
        if status.is_server_error() {
            tracing::error!(error = %e, "request failed");
        }
        let body = match e {
            ArchetypeError::Validation(errors) => serde_json::json!({
                "error": e.to_string(),
                "errors": errors,
            }),
            _ => serde_json::json!({ "error": e.to_string() }),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}
