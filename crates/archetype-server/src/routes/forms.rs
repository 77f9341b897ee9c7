use archetype_core::context::Context;
use archetype_core::error::ArchetypeError;
use archetype_core::facebook;
use archetype_core::processor::{Outcome, ProcessContext};
use archetype_core::sanitize::escape_html;
use archetype_core::submission::{Submission, NONCE_FIELD, REFERER_FIELD};
use archetype_core::user::UserId;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use indexmap::IndexMap;
use serde::Deserialize;

use crate::auth::Session;
use crate::error::AppError;
use crate::state::AppState;

/// Posted field naming the user whose profile is being edited. Defaults to
/// the signed-in user.
pub const TARGET_USER_FIELD: &str = "_user_id";

/// POST /forms/:name: validate and process a urlencoded submission.
///
/// Redirecting processors answer 303; JSON processors answer 200 with their
/// body. Validation failures answer 422 with the collected errors.
pub async fn submit_form(
    State(app): State<AppState>,
    Session(principal): Session,
    Path(name): Path<String>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, AppError> {
    let mut submission = Submission::from_urlencoded(&body)?;
    if !submission.contains(REFERER_FIELD) {
        if let Some(path) = referer_path(&headers) {
            submission.insert(REFERER_FIELD, path);
        }
    }
    let user = match submission.get(TARGET_USER_FIELD) {
        Some(raw) => raw
            .parse::<UserId>()
            .map_err(|_| AppError::bad_request(format!("invalid {TARGET_USER_FIELD} '{raw}'")))?,
        None => Session(principal.clone()).require_user()?,
    };

    let site = app.site.clone();
    let store = app.store.clone();
    let graph = app.graph.clone();
    let outcome = tokio::task::spawn_blocking(move || {
        let form = site.form(&name)?;
        let mut ctx = ProcessContext::new(store.as_ref(), &principal, user, &submission);
        let outcome = form.submit(site.nonces(), &mut ctx)?;
        // The profile is already saved; a failed bind must not report the
        // submission as failed.
        if let (Outcome::Redirect { .. } | Outcome::Json { .. }, Some(graph)) = (&outcome, &graph) {
            if let Err(e) = facebook::bind_from_submission(
                store.as_ref(),
                graph.as_ref(),
                user,
                &submission,
                chrono::Utc::now(),
            ) {
                tracing::warn!(user = %user, error = %e, "facebook bind after submit failed");
            }
        }
        Ok::<_, ArchetypeError>(outcome)
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(match outcome {
        Outcome::Redirect { location } => {
            (StatusCode::SEE_OTHER, [(header::LOCATION, location)]).into_response()
        }
        Outcome::Json { body } => Json(body).into_response(),
        Outcome::Errors { errors } => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({ "errors": errors })),
        )
            .into_response(),
    })
}

/// The path of a same-site `Referer` header.
fn referer_path(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get(header::REFERER)?.to_str().ok()?;
    let uri: Uri = raw.parse().ok()?;
    Some(
        uri.path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string()),
    )
}

#[derive(Debug, Deserialize)]
pub struct RenderQuery {
    #[serde(default)]
    pub context: Option<String>,
}

/// GET /forms/:name?context=frontend: the form's markup, pre-filled with
/// the signed-in user's stored values and carrying a fresh nonce.
pub async fn render_form(
    State(app): State<AppState>,
    Session(principal): Session,
    Path(name): Path<String>,
    Query(query): Query<RenderQuery>,
) -> Result<Html<String>, AppError> {
    let context: Context = match query.context.as_deref() {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::bad_request(format!("unknown context '{raw}'")))?,
        None => Context::Frontend,
    };

    let site = app.site.clone();
    let store = app.store.clone();
    let templates = app.templates.clone();
    let html = tokio::task::spawn_blocking(move || {
        let form = site.form(&name)?;
        let mut values: IndexMap<String, Option<String>> = IndexMap::new();
        for (slug, field) in form.fields() {
            let current = match principal.user {
                Some(user) => store.get_meta(user, field.meta_key())?,
                None => None,
            };
            values.insert(slug.clone(), current);
        }
        let nonce = site.nonces().create(&form.options().nonce_action, &principal);
        let args = (&name, context, principal.user, &values, &nonce);

        templates.get_or_render("form", &args, || {
            let mut out = format!(
                r#"<form method="post" action="/forms/{}" class="at-form at-{context}">"#,
                escape_html(&name)
            );
            out.push_str(&format!(
                r#"<input type="hidden" name="{NONCE_FIELD}" value="{nonce}" />"#
            ));
            for (slug, field) in form.fields() {
                let current = values.get(slug).and_then(|v| v.as_deref());
                out.push_str(&field.render(context, current, None));
            }
            out.push_str(r#"<input type="submit" value="Save" /></form>"#);
            Ok(out)
        })
    })
    .await
    .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;

    Ok(Html(html))
}
