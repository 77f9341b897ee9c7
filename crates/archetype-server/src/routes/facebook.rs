use archetype_core::error::ArchetypeError;
use archetype_core::facebook::{self, GraphApi};
use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use crate::auth::{login_cookie, Session};
use crate::error::AppError;
use crate::state::AppState;

fn graph(app: &AppState) -> Result<Arc<dyn GraphApi>, ArchetypeError> {
    app.graph
        .clone()
        .ok_or_else(|| ArchetypeError::Configuration("facebook is not configured".to_string()))
}

/// POST /ajax/fb_login: sign in with a client-side Facebook auth payload.
///
/// A known user is bound and signed in with a session cookie. An unknown
/// one gets `newUser: true` and the normalized Facebook data for signup.
pub async fn fb_login(
    State(app): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Response, AppError> {
    let session = facebook::parse_payload(payload)?;
    let api = graph(&app)?;
    let store = app.store.clone();
    let response = tokio::task::spawn_blocking(move || {
        facebook::login(store.as_ref(), api.as_ref(), session, chrono::Utc::now())
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(match response.user {
        Some(user) => (
            [(header::SET_COOKIE, login_cookie(&app, user))],
            Json(response),
        )
            .into_response(),
        None => Json(response).into_response(),
    })
}

/// POST /ajax/fb_connect: connect the signed-in user to Facebook.
pub async fn fb_connect(
    State(app): State<AppState>,
    Session(principal): Session,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<facebook::LoginResponse>, AppError> {
    let session = facebook::parse_payload(payload)?;
    let api = graph(&app)?;
    let store = app.store.clone();
    let response = tokio::task::spawn_blocking(move || {
        facebook::connect(
            store.as_ref(),
            api.as_ref(),
            &principal,
            session,
            chrono::Utc::now(),
        )
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Json(response))
}
