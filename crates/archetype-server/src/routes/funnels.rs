use archetype_core::error::ArchetypeError;
use archetype_core::funnel;
use axum::extract::{Path, State};
use axum::Json;

use crate::auth::Session;
use crate::error::AppError;
use crate::state::AppState;

/// GET /api/funnels/:name/next: the signed-in user's next phase, or
/// `null` once they are through, plus per-phase progress.
pub async fn next_phase(
    State(app): State<AppState>,
    session: Session,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = session.require_user()?;
    let site = app.site.clone();
    let store = app.store.clone();
    let result = tokio::task::spawn_blocking(move || {
        let f = site.funnel(&name)?;
        let next = f.next_phase(store.as_ref(), user)?;
        Ok::<_, ArchetypeError>(serde_json::json!({
            "funnel": f.name,
            "next": next,
            "progress": f.progress(store.as_ref(), user)?,
            "completed": funnel::is_complete(store.as_ref(), user)?,
        }))
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(result))
}

/// POST /api/funnels/:name/phases/:phase/visit: record a visit.
pub async fn visit_phase(
    State(app): State<AppState>,
    session: Session,
    Path((name, phase)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = session.require_user()?;
    let f = app.site.funnel(&name)?.clone();
    if !f.phases.iter().any(|p| p.slug == phase) {
        return Err(AppError::bad_request(format!(
            "funnel '{name}' has no phase '{phase}'"
        )));
    }
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || f.mark_visited(store.as_ref(), user, &phase))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!({ "ok": true })))
}

/// POST /api/funnels/complete: mark signup finished for the signed-in user.
pub async fn complete(
    State(app): State<AppState>,
    session: Session,
) -> Result<Json<serde_json::Value>, AppError> {
    let user = session.require_user()?;
    let store = app.store.clone();
    tokio::task::spawn_blocking(move || funnel::complete(store.as_ref(), user))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(serde_json::json!({ "completed": true })))
}
