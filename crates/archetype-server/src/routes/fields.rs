use archetype_core::context::Context;
use axum::extract::{Path, State};
use axum::Json;

use crate::error::AppError;
use crate::state::AppState;

/// GET /api/contexts/:context/fields: fields active in a context, in
/// registration order.
pub async fn list_context_fields(
    State(app): State<AppState>,
    Path(context): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let context: Context = context
        .parse()
        .map_err(|_| AppError::bad_request(format!("unknown context '{context}'")))?;

    let mut registry = app.site.contexts().clone();
    registry.set_context(context);
    let list: Vec<serde_json::Value> = registry
        .fields()?
        .iter()
        .map(|cf| {
            let f = &cf.field;
            serde_json::json!({
                "slug": f.slug(),
                "name": f.name(),
                "description": f.description(),
                "meta_key": f.meta_key(),
                "type": f.kind(),
                "required": f.required(),
                "choices": f.choices(),
                "context": cf.context,
            })
        })
        .collect();

    Ok(Json(serde_json::json!(list)))
}
