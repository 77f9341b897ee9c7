use archetype_core::error::ArchetypeError;
use archetype_core::user::{Capability, Principal, UserId};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::AppError;
use crate::state::AppState;

pub const SESSION_COOKIE: &str = "archetype_session";

/// The principal making the request, resolved from the signed session
/// cookie. Requests without a valid cookie are anonymous.
#[derive(Debug, Clone)]
pub struct Session(pub Principal);

impl Session {
    /// The signed-in user, or a permission error for anonymous requests.
    pub fn require_user(&self) -> Result<UserId, ArchetypeError> {
        self.0.user.ok_or_else(|| ArchetypeError::Permission {
            action: Capability::EditUser.to_string(),
            user: UserId(0),
        })
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, app: &AppState) -> Result<Self, Self::Rejection> {
        let Some(user) = session_cookie(&parts.headers)
            .and_then(|token| app.site.nonces().verify_session(token))
        else {
            return Ok(Session(Principal::anonymous()));
        };

        let store = app.store.clone();
        let record = tokio::task::spawn_blocking(move || store.user(user))
            .await
            .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))?;
        match record {
            Ok(record) => Ok(Session(record.principal())),
            Err(ArchetypeError::UserNotFound(_)) => {
                tracing::debug!(user = %user, "session names a missing user");
                Ok(Session(Principal::anonymous()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all("cookie")
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|part| part.trim().strip_prefix(&format!("{SESSION_COOKIE}=")))
}

/// `Set-Cookie` value that signs `user` in.
pub fn login_cookie(app: &AppState, user: UserId) -> String {
    let token = app.site.nonces().session_token(user);
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
