use crate::error::{ArchetypeError, ErrorCode, FormError, Result};
use crate::field::Field;
use crate::save_strategy::{self, SaveContext, SaveOutcome};
use crate::submission::Submission;
use crate::user::{Principal, UserId, UserStore};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// How a processed submission ends.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outcome {
    Redirect { location: String },
    Json { body: Value },
    Errors { errors: Vec<FormError> },
}

/// Per-request state handed to a processor.
pub struct ProcessContext<'a> {
    pub store: &'a dyn UserStore,
    pub principal: &'a Principal,
    pub user: UserId,
    pub submission: &'a Submission,
    errors: Vec<FormError>,
}

impl<'a> ProcessContext<'a> {
    pub fn new(
        store: &'a dyn UserStore,
        principal: &'a Principal,
        user: UserId,
        submission: &'a Submission,
    ) -> Self {
        Self {
            store,
            principal,
            user,
            submission,
            errors: Vec::new(),
        }
    }

    pub fn add_error(&mut self, error: FormError) {
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[FormError] {
        &self.errors
    }

    pub fn save_context(&self) -> SaveContext<'a> {
        SaveContext {
            store: self.store,
            principal: self.principal,
            user: self.user,
            submission: self.submission,
        }
    }

    /// Where to send the browser back to.
    pub fn referer(&self) -> String {
        self.submission
            .referer()
            .filter(|r| is_local_path(r))
            .unwrap_or("/")
            .to_string()
    }
}

/// Same-site absolute paths only. `//host` and `/\host` are read by
/// browsers as another origin.
fn is_local_path(r: &str) -> bool {
    r.starts_with('/') && !r.starts_with("//") && !r.starts_with("/\\")
}

/// Domain logic run after a form passes validation.
pub trait FormProcessor: Send + Sync {
    fn process(
        &self,
        fields: &IndexMap<String, Arc<Field>>,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Value>;

    /// Default: send the browser back where it came from.
    fn succeed(&self, _data: Value, ctx: &ProcessContext<'_>) -> Outcome {
        Outcome::Redirect {
            location: ctx.referer(),
        }
    }

    /// Reporting hook, always called after `process`.
    fn report(&self, result: Result<Value>, ctx: &ProcessContext<'_>) -> Result<Outcome> {
        let data = result?;
        if ctx.errors().is_empty() {
            Ok(self.succeed(data, ctx))
        } else {
            Ok(Outcome::Errors {
                errors: ctx.errors().to_vec(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// ProfileProcessor
// ---------------------------------------------------------------------------

/// Saves every field of the form for the target user.
///
/// Every field is authorized before the first write, so a permission failure
/// leaves the user untouched. Other per-field failures are collected and the
/// remaining fields are still saved.
#[derive(Debug, Default)]
pub struct ProfileProcessor {
    json: bool,
}

impl ProfileProcessor {
    pub fn redirecting() -> Self {
        Self { json: false }
    }

    pub fn json() -> Self {
        Self { json: true }
    }
}

impl FormProcessor for ProfileProcessor {
    fn process(
        &self,
        fields: &IndexMap<String, Arc<Field>>,
        ctx: &mut ProcessContext<'_>,
    ) -> Result<Value> {
        let save_ctx = ctx.save_context();
        for field in fields.values() {
            save_strategy::authorize(field, &save_ctx)?;
        }
        let mut saved = serde_json::Map::new();
        let mut skipped = Vec::new();
        for (slug, field) in fields {
            match field.save(&save_ctx) {
                Ok(SaveOutcome::Written(value)) => {
                    saved.insert(slug.clone(), Value::String(value));
                }
                Ok(SaveOutcome::Skipped) => skipped.push(slug.clone()),
                Err(e @ ArchetypeError::Permission { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(field = %slug, error = %e, "field save failed");
                    ctx.add_error(FormError::for_field(
                        ErrorCode::ProcessorError,
                        slug.clone(),
                        format!("Could not save {}", field.name()),
                    ));
                }
            }
        }
        tracing::info!(user = %ctx.user, saved = saved.len(), skipped = skipped.len(), "profile saved");
        Ok(serde_json::json!({
            "user": ctx.user,
            "saved": saved,
            "skipped": skipped,
        }))
    }

    fn succeed(&self, data: Value, ctx: &ProcessContext<'_>) -> Outcome {
        if self.json {
            Outcome::Json { body: data }
        } else {
            Outcome::Redirect {
                location: ctx.referer(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ProcessorTable
// ---------------------------------------------------------------------------

/// Named processors available to forms, fixed at startup.
#[derive(Clone, Default)]
pub struct ProcessorTable {
    processors: HashMap<String, Arc<dyn FormProcessor>>,
}

impl ProcessorTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// `profile` (redirects) and `ajax_profile` (answers with JSON).
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register("profile", Arc::new(ProfileProcessor::redirecting()));
        table.register("ajax_profile", Arc::new(ProfileProcessor::json()));
        table
    }

    pub fn register(&mut self, name: impl Into<String>, processor: Arc<dyn FormProcessor>) {
        self.processors.insert(name.into(), processor);
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn FormProcessor>> {
        self.processors.get(name).cloned().ok_or_else(|| {
            ArchetypeError::Configuration(format!("no form processor named '{name}'"))
        })
    }
}
