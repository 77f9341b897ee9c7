use axum::extract::{Path, State};
use axum::Json;

use crate::auth::Session;
use crate::state::AppState;

/// GET /api/nonce/:action: a token for `action`, bound to the caller.
pub async fn create_nonce(
    State(app): State<AppState>,
    Session(principal): Session,
    Path(action): Path<String>,
) -> Json<serde_json::Value> {
    let nonce = app.site.nonces().create(&action, &principal);
    Json(serde_json::json!({ "action": action, "nonce": nonce }))
}
