use crate::config::{Config, FacebookConfig, FieldConfig};
use crate::context::ContextRegistry;
use crate::error::{ArchetypeError, Result};
use crate::facebook::GraphClient;
use crate::field::{Field, FieldKind};
use crate::form::{Form, FormOptions, FormRegistry, SUMMARY_MESSAGE, USER_NONCE_ACTION};
use crate::funnel::Funnel;
use crate::nonce::NonceService;
use crate::processor::ProcessorTable;
use crate::save_strategy::StrategyTable;
use crate::validators::Validator;
use chrono::Duration;
use indexmap::IndexMap;
use std::sync::Arc;

/// Everything built from `archetype.yaml`: fields, the forms that use them,
/// context placement, funnels and the nonce service.
///
/// Built once at startup and shared read-only afterwards.
#[derive(Debug, Clone)]
pub struct Site {
    name: String,
    fields: Vec<Arc<Field>>,
    contexts: ContextRegistry,
    forms: FormRegistry,
    funnels: IndexMap<String, Funnel>,
    nonces: NonceService,
    facebook: Option<FacebookConfig>,
}

impl Site {
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::with_tables(config, &StrategyTable::standard(), &ProcessorTable::standard())
    }

    /// Build with caller-supplied strategy and processor tables, for sites
    /// that register their own field kinds or processors.
    pub fn with_tables(
        config: &Config,
        strategies: &StrategyTable,
        processors: &ProcessorTable,
    ) -> Result<Self> {
        let fields = config
            .fields
            .iter()
            .map(|f| build_field(f, strategies).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;

        let mut contexts = ContextRegistry::new();
        for field in &fields {
            contexts.register(Arc::clone(field));
        }

        let mut forms = FormRegistry::new();
        for form in &config.forms {
            let options = FormOptions {
                show_discrete_errors: form.show_discrete_errors,
                nonce_action: form
                    .nonce_action
                    .clone()
                    .unwrap_or_else(|| USER_NONCE_ACTION.to_string()),
                summary_message: form
                    .summary_message
                    .clone()
                    .unwrap_or_else(|| SUMMARY_MESSAGE.to_string()),
            };
            let processor = processors.resolve(&form.processor)?;
            forms.register(&form.name, &form.fields, &fields, processor, options)?;
        }

        let funnels = config
            .funnels
            .iter()
            .map(|f| (f.name.clone(), f.clone()))
            .collect();

        let nonces = NonceService::new(
            config.nonce.secret.as_bytes(),
            Duration::hours(i64::from(config.nonce.lifetime_hours)),
        );

        tracing::debug!(
            fields = fields.len(),
            forms = config.forms.len(),
            funnels = config.funnels.len(),
            "site built"
        );

        Ok(Self {
            name: config.site.name.clone(),
            fields,
            contexts,
            forms,
            funnels,
            nonces,
            facebook: config.facebook.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Arc<Field>] {
        &self.fields
    }

    pub fn field(&self, slug: &str) -> Result<&Arc<Field>> {
        self.fields
            .iter()
            .find(|f| f.slug() == slug)
            .ok_or_else(|| ArchetypeError::FieldNotFound(slug.to_string()))
    }

    /// The shared registry. Clone it to set a per-request context.
    pub fn contexts(&self) -> &ContextRegistry {
        &self.contexts
    }

    pub fn forms(&self) -> &FormRegistry {
        &self.forms
    }

    pub fn form(&self, name: &str) -> Result<&Form> {
        self.forms.get(name)
    }

    pub fn funnel(&self, name: &str) -> Result<&Funnel> {
        self.funnels
            .get(name)
            .ok_or_else(|| ArchetypeError::FunnelNotFound(name.to_string()))
    }

    pub fn funnel_names(&self) -> Vec<&str> {
        self.funnels.keys().map(String::as_str).collect()
    }

    pub fn nonces(&self) -> &NonceService {
        &self.nonces
    }

    pub fn facebook(&self) -> Option<&FacebookConfig> {
        self.facebook.as_ref()
    }

    /// A Graph client for the configured app, if Facebook is configured.
    pub fn graph_client(&self) -> Result<Option<GraphClient>> {
        self.facebook
            .as_ref()
            .map(|fb| GraphClient::new(&fb.graph_url, &fb.app_id, &fb.app_secret))
            .transpose()
    }
}

fn build_field(cfg: &FieldConfig, strategies: &StrategyTable) -> Result<Field> {
    let kind: FieldKind = cfg.field_type.parse()?;
    let mut builder = Field::builder(&cfg.name, &cfg.meta_key)
        .description(&cfg.description)
        .kind(kind)
        .choices(cfg.choices.clone())
        .required(cfg.required)
        .admin(cfg.admin)
        .show_in_signup(cfg.show_in_signup)
        .signup_only(cfg.signup_only)
        .hidden(cfg.hidden);
    if let Some(slug) = &cfg.slug {
        builder = builder.slug(slug);
    }
    if let Some(name) = &cfg.validator {
        builder = builder.validator(Validator::by_name(name)?);
    }
    builder.build(strategies)
}
