use archetype_core::error::ArchetypeError;
use archetype_core::user::Capability;
use archetype_core::{io, mime, paths};
use axum::body::Bytes;
use axum::extract::State;
use axum::Json;

use crate::auth::Session;
use crate::error::AppError;
use crate::state::AppState;

/// Meta key holding the path of an uploaded profile picture.
pub const AVATAR_META: &str = "at_avatar";

/// Largest accepted upload.
pub const MAX_AVATAR_BYTES: usize = 2 * 1024 * 1024;

/// POST /api/avatar: store a JPEG or PNG as the signed-in user's picture.
///
/// The image type is taken from the file's leading bytes, never from the
/// request's content type.
pub async fn upload_avatar(
    State(app): State<AppState>,
    session: Session,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = session.require_user()?;
    if body.len() > MAX_AVATAR_BYTES {
        return Err(AppError::bad_request(format!(
            "avatar exceeds {MAX_AVATAR_BYTES} bytes"
        )));
    }
    let Some(kind) = mime::sniff(&body) else {
        return Err(AppError::bad_request("avatar must be a JPEG or PNG image"));
    };
    let ext = mime::extension(kind).unwrap_or("bin");

    let root = app.root.clone();
    let store = app.store.clone();
    let principal = session.0.clone();
    let rel = format!("{}/uploads/{user}.{ext}", paths::DATA_DIR);
    let stored = rel.clone();
    tokio::task::spawn_blocking(move || {
        if !store.can(&principal, Capability::EditUser, user) {
            return Err(ArchetypeError::Permission {
                action: Capability::EditUser.to_string(),
                user,
            });
        }
        io::atomic_write(&root.join(&rel), &body)?;
        store.set_meta(user, AVATAR_META, &rel)?;
        tracing::info!(user = %user, mime = kind, "avatar stored");
        Ok(())
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!({ "path": stored, "mime": kind })))
}
