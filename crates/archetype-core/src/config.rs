use crate::error::{ArchetypeError, Result};
use crate::field::FieldKind;
use crate::funnel::Funnel;
use crate::paths;
use crate::processor::ProcessorTable;
use crate::validators::Validator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

impl ConfigWarning {
    fn warning(message: String) -> Self {
        Self {
            level: WarnLevel::Warning,
            message,
        }
    }

    fn error(message: String) -> Self {
        Self {
            level: WarnLevel::Error,
            message,
        }
    }
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NonceConfig {
    pub secret: String,
    #[serde(default = "default_lifetime_hours")]
    pub lifetime_hours: u32,
}

fn default_lifetime_hours() -> u32 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacebookConfig {
    pub app_id: String,
    pub app_secret: String,
    #[serde(default = "default_permissions")]
    pub permissions: Vec<String>,
    #[serde(default = "default_graph_url")]
    pub graph_url: String,
}

fn default_permissions() -> Vec<String> {
    vec!["email".to_string()]
}

fn default_graph_url() -> String {
    crate::facebook::DEFAULT_GRAPH_URL.to_string()
}

/// One `fields:` entry. `type` and `validator` are checked when the site is
/// built, so a bad name fails at startup rather than on first submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldConfig {
    pub name: String,
    pub meta_key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slug: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(rename = "type", default = "default_field_type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub choices: IndexMap<String, String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub admin: bool,
    #[serde(default)]
    pub show_in_signup: bool,
    #[serde(default)]
    pub signup_only: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator: Option<String>,
}

fn default_field_type() -> String {
    FieldKind::Text.as_str().to_string()
}

impl FieldConfig {
    pub fn slug(&self) -> &str {
        self.slug.as_deref().unwrap_or(&self.meta_key)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormConfig {
    pub name: String,
    #[serde(default = "default_processor")]
    pub processor: String,
    pub fields: Vec<String>,
    #[serde(default = "default_true")]
    pub show_discrete_errors: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce_action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary_message: Option<String>,
}

fn default_processor() -> String {
    "profile".to_string()
}

fn default_true() -> bool {
    true
}

// ---------------------------------------------------------------------------
// Config (top-level)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,
    pub site: SiteConfig,
    pub nonce: NonceConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<FacebookConfig>,
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
    #[serde(default)]
    pub forms: Vec<FormConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub funnels: Vec<Funnel>,
}

fn default_version() -> u32 {
    1
}

impl Config {
    /// A fresh config with a generated nonce secret and a starter profile form.
    pub fn new(site_name: impl Into<String>) -> Self {
        Self {
            version: 1,
            site: SiteConfig {
                name: site_name.into(),
                url: None,
            },
            nonce: NonceConfig {
                secret: crate::nonce::NonceService::generate_secret(),
                lifetime_hours: default_lifetime_hours(),
            },
            facebook: None,
            fields: vec![FieldConfig {
                name: "Display name".to_string(),
                meta_key: "display_name".to_string(),
                slug: None,
                description: String::new(),
                field_type: default_field_type(),
                choices: IndexMap::new(),
                required: true,
                admin: false,
                show_in_signup: true,
                signup_only: false,
                hidden: false,
                validator: Some("non_empty".to_string()),
            }],
            forms: vec![FormConfig {
                name: "profile".to_string(),
                processor: default_processor(),
                fields: vec!["display_name".to_string()],
                show_discrete_errors: true,
                nonce_action: None,
                summary_message: None,
            }],
            funnels: Vec::new(),
        }
    }

    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Err(ArchetypeError::NotInitialized);
        }
        let data = std::fs::read_to_string(&path)?;
        let cfg: Config = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let path = paths::config_path(root);
        let data = serde_yaml::to_string(self)?;
        crate::io::atomic_write(&path, data.as_bytes())
    }

    pub fn field(&self, slug: &str) -> Option<&FieldConfig> {
        self.fields.iter().find(|f| f.slug() == slug)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.nonce.secret.trim().is_empty() {
            warnings.push(ConfigWarning::error("nonce.secret is empty".to_string()));
        }
        if self.nonce.lifetime_hours == 0 {
            warnings.push(ConfigWarning::error(
                "nonce.lifetime_hours must be at least 1".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.slug()) {
                warnings.push(ConfigWarning::error(format!(
                    "duplicate field slug '{}'",
                    field.slug()
                )));
            }
            match field.field_type.parse::<FieldKind>() {
                Ok(FieldKind::Select) if field.choices.is_empty() => {
                    warnings.push(ConfigWarning::error(format!(
                        "select field '{}' declares no choices",
                        field.slug()
                    )));
                }
                Ok(_) => {}
                Err(_) => warnings.push(ConfigWarning::error(format!(
                    "field '{}' has unknown type '{}'",
                    field.slug(),
                    field.field_type
                ))),
            }
            if let Some(name) = &field.validator {
                if Validator::by_name(name).is_err() {
                    warnings.push(ConfigWarning::error(format!(
                        "field '{}' has unknown validator '{name}'",
                        field.slug()
                    )));
                }
            }
            if field.signup_only && field.admin {
                warnings.push(ConfigWarning::warning(format!(
                    "field '{}' is signup_only; admin has no effect",
                    field.slug()
                )));
            }
        }

        let processors = ProcessorTable::standard();
        let mut form_names = HashSet::new();
        for form in &self.forms {
            if !form_names.insert(form.name.as_str()) {
                warnings.push(ConfigWarning::warning(format!(
                    "form '{}' is declared twice; the last one wins",
                    form.name
                )));
            }
            if processors.resolve(&form.processor).is_err() {
                warnings.push(ConfigWarning::error(format!(
                    "form '{}' uses unknown processor '{}'",
                    form.name, form.processor
                )));
            }
            for slug in &form.fields {
                if self.field(slug).is_none() {
                    warnings.push(ConfigWarning::error(format!(
                        "form '{}' references unknown field '{slug}'",
                        form.name
                    )));
                }
            }
        }

        if let Some(fb) = &self.facebook {
            if fb.app_id.trim().is_empty() || fb.app_secret.trim().is_empty() {
                warnings.push(ConfigWarning::warning(
                    "facebook section is present but app_id or app_secret is empty".to_string(),
                ));
            }
        }

        for funnel in &self.funnels {
            if funnel.phases.is_empty() {
                warnings.push(ConfigWarning::warning(format!(
                    "funnel '{}' has no phases",
                    funnel.name
                )));
            }
        }

        warnings
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
