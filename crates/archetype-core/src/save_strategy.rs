use crate::error::{ArchetypeError, Result};
use crate::field::{Field, FieldKind};
use crate::sanitize;
use crate::submission::Submission;
use crate::user::{Capability, Principal, UserId, UserStore};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything a strategy needs to write one field for one user.
pub struct SaveContext<'a> {
    pub store: &'a dyn UserStore,
    pub principal: &'a Principal,
    pub user: UserId,
    pub submission: &'a Submission,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The value was written to the user's metadata.
    Written(String),
    /// Nothing was written: the value was absent or failed validation.
    Skipped,
}

/// Persistence policy for one field kind.
pub trait SaveStrategy: Send + Sync {
    fn save(&self, field: &Field, ctx: &SaveContext<'_>) -> Result<SaveOutcome>;
}

/// Refuse the write unless the acting principal may edit the target user.
/// Admin-only fields also require the right to manage users.
pub fn authorize(field: &Field, ctx: &SaveContext<'_>) -> Result<()> {
    if !ctx.store.can(ctx.principal, Capability::EditUser, ctx.user) {
        tracing::warn!(field = field.slug(), user = %ctx.user, "edit refused");
        return Err(ArchetypeError::Permission {
            action: Capability::EditUser.to_string(),
            user: ctx.user,
        });
    }
    if field.options().admin && !ctx.store.can(ctx.principal, Capability::ManageUsers, ctx.user) {
        tracing::warn!(field = field.slug(), user = %ctx.user, "admin field refused");
        return Err(ArchetypeError::Permission {
            action: Capability::ManageUsers.to_string(),
            user: ctx.user,
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Strategies
// ---------------------------------------------------------------------------

/// Writes the sanitized value when it passes the field's validation.
/// Absent or invalid values are skipped without a write.
#[derive(Debug, Default)]
pub struct TextSaveStrategy;

impl SaveStrategy for TextSaveStrategy {
    fn save(&self, field: &Field, ctx: &SaveContext<'_>) -> Result<SaveOutcome> {
        authorize(field, ctx)?;
        let Some(raw) = field.posted_value(ctx.submission) else {
            return Ok(SaveOutcome::Skipped);
        };
        let value = sanitize::text_field(raw);
        if !field.is_valid(Some(&value)).is_valid() {
            tracing::debug!(field = field.slug(), "value failed validation, not saved");
            return Ok(SaveOutcome::Skipped);
        }
        ctx.store.set_meta(ctx.user, field.meta_key(), &value)?;
        Ok(SaveOutcome::Written(value))
    }
}

/// Unchecked boxes are never submitted, so absence stores `"0"`.
#[derive(Debug, Default)]
pub struct CheckboxSaveStrategy;

pub const UNCHECKED: &str = "0";

impl SaveStrategy for CheckboxSaveStrategy {
    fn save(&self, field: &Field, ctx: &SaveContext<'_>) -> Result<SaveOutcome> {
        authorize(field, ctx)?;
        let value = match field.posted_value(ctx.submission) {
            Some(raw) => sanitize::text_field(raw),
            None => UNCHECKED.to_string(),
        };
        ctx.store.set_meta(ctx.user, field.meta_key(), &value)?;
        Ok(SaveOutcome::Written(value))
    }
}

/// Select values go through the same path as text; choice membership is
/// part of the field's validation.
#[derive(Debug, Default)]
pub struct SelectSaveStrategy;

impl SaveStrategy for SelectSaveStrategy {
    fn save(&self, field: &Field, ctx: &SaveContext<'_>) -> Result<SaveOutcome> {
        TextSaveStrategy.save(field, ctx)
    }
}

// ---------------------------------------------------------------------------
// StrategyTable
// ---------------------------------------------------------------------------

/// Dispatch table from field kind to save strategy, built once at startup.
#[derive(Clone, Default)]
pub struct StrategyTable {
    strategies: HashMap<FieldKind, Arc<dyn SaveStrategy>>,
}

impl StrategyTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Text, checkbox and select strategies.
    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(FieldKind::Text, Arc::new(TextSaveStrategy));
        table.register(FieldKind::Checkbox, Arc::new(CheckboxSaveStrategy));
        table.register(FieldKind::Select, Arc::new(SelectSaveStrategy));
        table
    }

    pub fn register(&mut self, kind: FieldKind, strategy: Arc<dyn SaveStrategy>) {
        self.strategies.insert(kind, strategy);
    }

    pub fn resolve(&self, kind: FieldKind) -> Result<Arc<dyn SaveStrategy>> {
        self.strategies.get(&kind).cloned().ok_or_else(|| {
            ArchetypeError::Configuration(format!("no save strategy registered for '{kind}' fields"))
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
