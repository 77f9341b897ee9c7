use crate::error::{ArchetypeError, ErrorCode, FormError, FormErrors, Result};
use crate::field::{Field, Validity};
use crate::nonce::NonceService;
use crate::processor::{FormProcessor, Outcome, ProcessContext};
use crate::submission::Submission;
use crate::user::Principal;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

/// Default nonce action for profile forms.
pub const USER_NONCE_ACTION: &str = "_at_update_user_profile";

pub const GENERIC_REQUIRED_MESSAGE: &str = "Please fill in the required information";
pub const NONCE_FAILURE_MESSAGE: &str = "Illegitimate form submission";
pub const SUMMARY_MESSAGE: &str = "Oops! There were errors";

#[derive(Debug, Clone)]
pub struct FormOptions {
    /// Report each error; when false, any errors collapse into one summary.
    pub show_discrete_errors: bool,
    pub nonce_action: String,
    pub summary_message: String,
}

impl Default for FormOptions {
    fn default() -> Self {
        Self {
            show_discrete_errors: true,
            nonce_action: USER_NONCE_ACTION.to_string(),
            summary_message: SUMMARY_MESSAGE.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// ValidationReport
// ---------------------------------------------------------------------------

/// Result of one validation pass over a form.
///
/// Holds each checked field's validity for this request, used to pick
/// error messages and CSS classes when re-rendering.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    validity: IndexMap<String, Validity>,
    errors: Vec<FormError>,
}

impl ValidationReport {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[FormError] {
        &self.errors
    }

    pub fn validity(&self, slug: &str) -> Option<&Validity> {
        self.validity.get(slug)
    }

    pub fn error_message(&self, slug: &str) -> Option<&str> {
        match self.validity(slug)? {
            Validity::Valid => None,
            Validity::Invalid => Some(GENERIC_REQUIRED_MESSAGE),
            Validity::Rejected(e) => Some(e.message()),
        }
    }

    pub fn css_class(&self, slug: &str) -> &'static str {
        match self.validity(slug) {
            Some(Validity::Valid) => "at-valid",
            Some(_) => "at-error",
            None => "",
        }
    }

    pub fn into_result(self) -> Result<Self> {
        if self.passed() {
            Ok(self)
        } else {
            Err(ArchetypeError::Validation(FormErrors(self.errors)))
        }
    }
}

// ---------------------------------------------------------------------------
// Form
// ---------------------------------------------------------------------------

/// An ordered set of fields bound to one processor.
#[derive(Clone)]
pub struct Form {
    name: String,
    fields: IndexMap<String, Arc<Field>>,
    processor: Arc<dyn FormProcessor>,
    options: FormOptions,
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("name", &self.name)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .finish()
    }
}

impl Form {
    /// Build a form. Field slugs must be unique.
    pub fn new(
        name: impl Into<String>,
        fields: impl IntoIterator<Item = Arc<Field>>,
        processor: Arc<dyn FormProcessor>,
        options: FormOptions,
    ) -> Result<Self> {
        let name = name.into();
        let mut map = IndexMap::new();
        for field in fields {
            let slug = field.slug().to_string();
            if map.insert(slug.clone(), field).is_some() {
                return Err(ArchetypeError::Configuration(format!(
                    "form '{name}' has two fields with slug '{slug}'"
                )));
            }
        }
        Ok(Self {
            name,
            fields: map,
            processor,
            options,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &FormOptions {
        &self.options
    }

    pub fn fields(&self) -> &IndexMap<String, Arc<Field>> {
        &self.fields
    }

    pub fn field(&self, slug: &str) -> Result<&Arc<Field>> {
        self.fields
            .get(slug)
            .ok_or_else(|| ArchetypeError::FieldNotFound(slug.to_string()))
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.keys().map(String::as_str).collect()
    }

    /// Check the submission token and every required field.
    ///
    /// All checks run even after a failure so every message is collected in
    /// one pass. Generic failures are reported once, at the first field that
    /// produced one; specific messages are reported per field.
    pub fn validate(
        &self,
        submission: &Submission,
        nonces: &NonceService,
        principal: &Principal,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        let nonce_ok = submission
            .nonce()
            .and_then(|token| nonces.verify(token, &self.options.nonce_action, principal))
            .is_some();
        if !nonce_ok {
            report
                .errors
                .push(FormError::new(ErrorCode::FailedNonceCheck, NONCE_FAILURE_MESSAGE));
        }

        let mut generic_recorded = false;
        for (slug, field) in &self.fields {
            if !field.required() {
                continue;
            }
            let validity = field.is_valid(field.posted_value(submission));
            match &validity {
                Validity::Valid => {}
                Validity::Rejected(e) => report.errors.push(FormError::for_field(
                    ErrorCode::FailedFieldValidation,
                    slug.clone(),
                    e.message(),
                )),
                Validity::Invalid if !generic_recorded => {
                    report.errors.push(FormError::for_field(
                        ErrorCode::GenericValidationFailure,
                        slug.clone(),
                        GENERIC_REQUIRED_MESSAGE,
                    ));
                    generic_recorded = true;
                }
                Validity::Invalid => {}
            }
            report.validity.insert(slug.clone(), validity);
        }

        if !report.errors.is_empty() && !self.options.show_discrete_errors {
            report.errors = vec![FormError::new(
                ErrorCode::GeneralErrors,
                self.options.summary_message.clone(),
            )];
        }

        tracing::debug!(form = %self.name, errors = report.errors.len(), "validated");
        report
    }

    /// Run the processor, then its reporting hook. Call only after a
    /// passing [`Form::validate`].
    pub fn process(&self, ctx: &mut ProcessContext<'_>) -> Result<Outcome> {
        let result = self.processor.process(&self.fields, ctx);
        self.processor.report(result, ctx)
    }

    /// Validate and, when that passes, process.
    pub fn submit(&self, nonces: &NonceService, ctx: &mut ProcessContext<'_>) -> Result<Outcome> {
        self.validate(ctx.submission, nonces, ctx.principal)
            .into_result()?;
        self.process(ctx)
    }
}

// ---------------------------------------------------------------------------
// FormRegistry
// ---------------------------------------------------------------------------

/// Forms by name. One per process, owned by the composition root.
#[derive(Debug, Clone, Default)]
pub struct FormRegistry {
    forms: IndexMap<String, Form>,
}

impl FormRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a form, replacing any earlier form with the same name.
    pub fn add(&mut self, form: Form) {
        if self.forms.contains_key(form.name()) {
            tracing::warn!(form = form.name(), "replacing registered form");
        }
        self.forms.insert(form.name().to_string(), form);
    }

    /// Build and add a form from a subset of `all_fields`, selected by slug.
    ///
    /// The form keeps the order of `all_fields`. Unknown slugs are rejected.
    pub fn register(
        &mut self,
        name: &str,
        slugs: &[String],
        all_fields: &[Arc<Field>],
        processor: Arc<dyn FormProcessor>,
        options: FormOptions,
    ) -> Result<()> {
        for slug in slugs {
            if !all_fields.iter().any(|f| f.slug() == slug) {
                return Err(ArchetypeError::Configuration(format!(
                    "form '{name}' references unknown field '{slug}'"
                )));
            }
        }
        let selected = all_fields
            .iter()
            .filter(|f| slugs.iter().any(|s| s == f.slug()))
            .cloned();
        self.add(Form::new(name, selected, processor, options)?);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<&Form> {
        self.forms
            .get(name)
            .ok_or_else(|| ArchetypeError::FormNotFound(name.to_string()))
    }

    pub fn names(&self) -> Vec<&str> {
        self.forms.keys().map(String::as_str).collect()
    }

    pub fn field_names(&self, name: &str) -> Result<Vec<&str>> {
        Ok(self.get(name)?.field_names())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
