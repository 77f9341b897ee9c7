use crate::error::{ArchetypeError, Result};
use crate::field::Field;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where a field is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Context {
    Admin,
    Frontend,
    Signup,
}

impl Context {
    pub fn all() -> &'static [Context] {
        &[Context::Admin, Context::Frontend, Context::Signup]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Context::Admin => "admin",
            Context::Frontend => "frontend",
            Context::Signup => "signup",
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Context {
    type Err = ArchetypeError;

    fn from_str(s: &str) -> Result<Self> {
        Context::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| ArchetypeError::Configuration(format!("unknown context '{s}'")))
    }
}

/// A shared field as seen through the context it was read in.
#[derive(Debug, Clone)]
pub struct ContextualField {
    pub field: Arc<Field>,
    pub context: Context,
}

impl ContextualField {
    pub fn render(&self, current: Option<&str>) -> String {
        self.field.render(self.context, current, None)
    }
}

/// Which fields are active in which context.
///
/// Fields are shared between contexts, not copied; the context a field was
/// read in travels alongside it as a [`ContextualField`].
#[derive(Debug, Clone, Default)]
pub struct ContextRegistry {
    contexts: IndexMap<Context, IndexMap<String, Arc<Field>>>,
    current: Option<Context>,
}

impl ContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `field` to `context`. Registering the same slug again replaces
    /// the earlier entry in place.
    pub fn register_field(&mut self, context: Context, field: Arc<Field>) {
        self.contexts
            .entry(context)
            .or_default()
            .insert(field.slug().to_string(), field);
    }

    /// Place a field by its own flags: signup fields go to the signup
    /// context, and every field that is not signup-only goes to the admin
    /// or frontend profile.
    pub fn register(&mut self, field: Arc<Field>) {
        let opts = field.options();
        if opts.show_in_signup || opts.signup_only {
            self.register_field(Context::Signup, field.clone());
        }
        if !opts.signup_only {
            let target = if opts.admin {
                Context::Admin
            } else {
                Context::Frontend
            };
            self.register_field(target, field);
        }
    }

    pub fn set_context(&mut self, context: Context) {
        self.current = Some(context);
    }

    pub fn current(&self) -> Option<Context> {
        self.current
    }

    /// Fields for the current context, in registration order.
    pub fn fields(&self) -> Result<Vec<ContextualField>> {
        let context = self.current.ok_or(ArchetypeError::NoContext)?;
        Ok(self.fields_in(context))
    }

    pub fn fields_in(&self, context: Context) -> Vec<ContextualField> {
        self.contexts
            .get(&context)
            .map(|fields| {
                fields
                    .values()
                    .map(|f| ContextualField {
                        field: f.clone(),
                        context,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save_strategy::StrategyTable;

    fn field(name: &str, key: &str) -> Arc<Field> {
        Arc::new(Field::builder(name, key).build(&StrategyTable::standard()).unwrap())
    }

    #[test]
    fn reading_without_context_fails() {
        let registry = ContextRegistry::new();
        assert!(matches!(registry.fields(), Err(ArchetypeError::NoContext)));
    }

    #[test]
    fn re_registering_a_slug_keeps_one_entry() {
        let mut registry = ContextRegistry::new();
        registry.register_field(Context::Frontend, field("Bio", "bio"));
        registry.register_field(Context::Frontend, field("Biography", "bio"));
        registry.set_context(Context::Frontend);
        let fields = registry.fields().unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].field.name(), "Biography");
    }

    #[test]
    fn fields_keep_registration_order_and_carry_context() {
        let mut registry = ContextRegistry::new();
        registry.register_field(Context::Admin, field("B", "b"));
        registry.register_field(Context::Admin, field("A", "a"));
        registry.set_context(Context::Admin);
        let slugs: Vec<_> = registry
            .fields()
            .unwrap()
            .iter()
            .map(|f| f.field.slug().to_string())
            .collect();
        assert_eq!(slugs, ["b", "a"]);
        assert!(registry.fields().unwrap().iter().all(|f| f.context == Context::Admin));
    }

    #[test]
    fn shared_field_reports_context_of_each_read() {
        let shared = Arc::new(
            Field::builder("Nick", "nick")
                .show_in_signup(true)
                .build(&StrategyTable::standard())
                .unwrap(),
        );
        let mut registry = ContextRegistry::new();
        registry.register(shared.clone());

        registry.set_context(Context::Signup);
        let signup = registry.fields().unwrap();
        registry.set_context(Context::Frontend);
        let frontend = registry.fields().unwrap();

        assert!(Arc::ptr_eq(&signup[0].field, &frontend[0].field));
        assert_eq!(signup[0].context, Context::Signup);
        assert_eq!(frontend[0].context, Context::Frontend);
    }

    #[test]
    fn signup_only_fields_stay_out_of_profiles() {
        let mut registry = ContextRegistry::new();
        registry.register(Arc::new(
            Field::builder("Invite", "invite")
                .signup_only(true)
                .build(&StrategyTable::standard())
                .unwrap(),
        ));
        assert_eq!(registry.fields_in(Context::Signup).len(), 1);
        assert!(registry.fields_in(Context::Frontend).is_empty());
        assert!(registry.fields_in(Context::Admin).is_empty());
    }
}
