use crate::context::Context;
use crate::error::{ArchetypeError, Result};
use crate::sanitize::escape_html;
use crate::save_strategy::{SaveContext, SaveOutcome, SaveStrategy, StrategyTable};
use crate::submission::Submission;
use crate::validators::Validator;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// FieldKind
// ---------------------------------------------------------------------------

/// The input type of a field. Selects both the markup and the save strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Checkbox,
    Select,
}

impl FieldKind {
    pub fn all() -> &'static [FieldKind] {
        &[FieldKind::Text, FieldKind::Checkbox, FieldKind::Select]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Checkbox => "checkbox",
            FieldKind::Select => "select",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = ArchetypeError;

    fn from_str(s: &str) -> Result<Self> {
        FieldKind::all()
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ArchetypeError::Configuration(format!("unknown field type '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// Validity
// ---------------------------------------------------------------------------

/// A validator's specific complaint about a value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Outcome of validating one value.
///
/// `Invalid` carries no message and is reported with the form's generic
/// text; `Rejected` carries a message that is reported as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    Rejected(ValidationError),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FieldOptions {
    pub required: bool,
    /// Only administrators may write this field.
    pub admin: bool,
    pub show_in_signup: bool,
    pub signup_only: bool,
    pub hidden: bool,
    pub validator: Validator,
}

/// One piece of user data: label, storage key, input type and rules.
///
/// Immutable once built. Per-request validation results live in
/// [`crate::form::ValidationReport`].
#[derive(Clone)]
pub struct Field {
    name: String,
    slug: String,
    description: String,
    meta_key: String,
    kind: FieldKind,
    choices: IndexMap<String, String>,
    /// Choice membership rule, present for select fields.
    choice_check: Option<Validator>,
    options: FieldOptions,
    strategy: Arc<dyn SaveStrategy>,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("slug", &self.slug)
            .field("meta_key", &self.meta_key)
            .field("kind", &self.kind)
            .field("options", &self.options)
            .finish()
    }
}

impl Field {
    pub fn builder(name: impl Into<String>, meta_key: impl Into<String>) -> FieldBuilder {
        FieldBuilder::new(name, meta_key)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn meta_key(&self) -> &str {
        &self.meta_key
    }

    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    pub fn choices(&self) -> &IndexMap<String, String> {
        &self.choices
    }

    pub fn options(&self) -> &FieldOptions {
        &self.options
    }

    pub fn required(&self) -> bool {
        self.options.required
    }

    /// The raw submitted value for this field, or `None` when the key was
    /// not submitted at all.
    pub fn posted_value<'a>(&self, submission: &'a Submission) -> Option<&'a str> {
        submission.get(&self.slug)
    }

    /// Validate a value.
    ///
    /// A required field with no value (or only whitespace) is `Invalid`
    /// whatever the validator says. An optional field with no value is
    /// `Valid`. A present value is judged by the validator, and select
    /// fields also insist the value is one of their choices.
    pub fn is_valid(&self, value: Option<&str>) -> Validity {
        let value = match value {
            Some(v) if !(self.options.required && v.trim().is_empty()) => v,
            _ if self.options.required => return Validity::Invalid,
            _ => return Validity::Valid,
        };
        if let Some(check) = &self.choice_check {
            let membership = check.check(value);
            if !membership.is_valid() {
                return membership;
            }
        }
        self.options.validator.check(value)
    }

    /// Persist this field for `ctx.user` through its save strategy.
    pub fn save(&self, ctx: &SaveContext<'_>) -> Result<SaveOutcome> {
        self.strategy.save(self, ctx)
    }

    /// Produce the markup for this field.
    ///
    /// `current` is the stored value used to pre-fill the input; `validity`
    /// is this request's validation result, when there is one.
    pub fn render(
        &self,
        context: Context,
        current: Option<&str>,
        validity: Option<&Validity>,
    ) -> String {
        let slug = escape_html(&self.slug);
        let name = escape_html(&self.name);
        let value = escape_html(current.unwrap_or(""));
        let desc = escape_html(&self.description);

        if self.options.hidden {
            return format!(r#"<input type="hidden" name="{slug}" id="{slug}" value="{value}" />"#);
        }

        let input = match self.kind {
            FieldKind::Text => {
                let class = match context {
                    Context::Admin => "regular-text",
                    Context::Frontend | Context::Signup => "at-input",
                };
                format!(
                    r#"<input type="text" name="{slug}" id="{slug}" value="{value}" class="{class}" />"#
                )
            }
            FieldKind::Checkbox => {
                let checked = if is_truthy(current) { r#" checked="checked""# } else { "" };
                format!(
                    r#"<input type="checkbox" name="{slug}" value="1" id="{slug}"{checked} />"#
                )
            }
            FieldKind::Select => {
                let mut out = format!(r#"<select name="{slug}" id="{slug}">"#);
                for (choice, label) in &self.choices {
                    let selected = if Some(choice.as_str()) == current {
                        r#" selected="selected""#
                    } else {
                        ""
                    };
                    out.push_str(&format!(
                        r#"<option value="{}"{selected}>{}</option>"#,
                        escape_html(choice),
                        escape_html(label)
                    ));
                }
                out.push_str("</select>");
                out
            }
        };

        let message = match validity {
            Some(Validity::Rejected(e)) => format!(
                r#"<span class="at-error-message">{}</span>"#,
                escape_html(e.message())
            ),
            _ => String::new(),
        };

        match context {
            Context::Admin => format!(
                concat!(
                    r#"<table class="form-table"><tr>"#,
                    r#"<th><label for="{slug}">{name}</label></th>"#,
                    r#"<td>{input}{message}<br /><span class="description">{desc}</span></td>"#,
                    "</tr></table>"
                ),
                slug = slug,
                name = name,
                input = input,
                message = message,
                desc = desc,
            ),
            Context::Frontend | Context::Signup => {
                let state = match validity {
                    Some(Validity::Valid) => " at-valid",
                    Some(_) => " at-error",
                    None => "",
                };
                format!(
                    r#"<p class="at-field at-{kind}{state}"><label for="{slug}">{name}</label>{input}{message}</p>"#,
                    kind = self.kind,
                )
            }
        }
    }
}

/// Stored flag values count as set unless empty or `"0"`.
pub fn is_truthy(value: Option<&str>) -> bool {
    matches!(value, Some(v) if !v.is_empty() && v != "0")
}

// ---------------------------------------------------------------------------
// FieldBuilder
// ---------------------------------------------------------------------------

pub struct FieldBuilder {
    name: String,
    slug: Option<String>,
    description: String,
    meta_key: String,
    kind: FieldKind,
    choices: IndexMap<String, String>,
    options: FieldOptions,
}

impl FieldBuilder {
    fn new(name: impl Into<String>, meta_key: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slug: None,
            description: String::new(),
            meta_key: meta_key.into(),
            kind: FieldKind::Text,
            choices: IndexMap::new(),
            options: FieldOptions::default(),
        }
    }

    /// Override the submission key; defaults to the meta key.
    pub fn slug(mut self, slug: impl Into<String>) -> Self {
        self.slug = Some(slug.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn kind(mut self, kind: FieldKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn choice(mut self, value: impl Into<String>, label: impl Into<String>) -> Self {
        self.choices.insert(value.into(), label.into());
        self
    }

    pub fn choices(mut self, choices: IndexMap<String, String>) -> Self {
        self.choices = choices;
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.options.required = required;
        self
    }

    pub fn admin(mut self, admin: bool) -> Self {
        self.options.admin = admin;
        self
    }

    pub fn show_in_signup(mut self, show: bool) -> Self {
        self.options.show_in_signup = show;
        self
    }

    pub fn signup_only(mut self, only: bool) -> Self {
        self.options.signup_only = only;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.options.hidden = hidden;
        self
    }

    pub fn validator(mut self, validator: Validator) -> Self {
        self.options.validator = validator;
        self
    }

    /// Bind the save strategy for this field's kind and finish.
    ///
    /// Fails when the table has no strategy for the kind, when the meta key
    /// is blank, or when a select field declares no choices.
    pub fn build(self, strategies: &StrategyTable) -> Result<Field> {
        if self.meta_key.trim().is_empty() {
            return Err(ArchetypeError::Configuration(format!(
                "field '{}' has an empty meta key",
                self.name
            )));
        }
        if self.kind == FieldKind::Select && self.choices.is_empty() {
            return Err(ArchetypeError::Configuration(format!(
                "select field '{}' declares no choices",
                self.name
            )));
        }
        let strategy = strategies.resolve(self.kind)?;
        let slug = self.slug.unwrap_or_else(|| self.meta_key.clone());
        let choice_check = (self.kind == FieldKind::Select)
            .then(|| Validator::one_of(self.choices.keys().cloned().collect()));
        Ok(Field {
            name: self.name,
            slug,
            description: self.description,
            meta_key: self.meta_key,
            kind: self.kind,
            choices: self.choices,
            choice_check,
            options: self.options,
            strategy,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn text(required: bool) -> Field {
        Field::builder("Email", "email")
            .required(required)
            .validator(Validator::email())
            .build(&StrategyTable::standard())
            .unwrap()
    }

    #[test]
    fn slug_defaults_to_meta_key() {
        let f = text(false);
        assert_eq!(f.slug(), "email");
        assert_eq!(f.meta_key(), "email");
    }

    #[test]
    fn posted_value_distinguishes_absent_from_empty() {
        let f = text(false);
        let empty = Submission::new().with("email", "");
        assert_eq!(f.posted_value(&empty), Some(""));
        assert_eq!(f.posted_value(&Submission::new()), None);
    }

    #[test]
    fn optional_absent_value_is_valid() {
        assert_eq!(text(false).is_valid(None), Validity::Valid);
    }

    #[test]
    fn required_absent_value_is_invalid_even_with_permissive_validator() {
        let f = Field::builder("Nick", "nick")
            .required(true)
            .validator(Validator::always())
            .build(&StrategyTable::standard())
            .unwrap();
        assert_eq!(f.is_valid(None), Validity::Invalid);
        assert_eq!(f.is_valid(Some("  ")), Validity::Invalid);
    }

    #[test]
    fn present_value_defers_to_validator() {
        assert!(matches!(text(true).is_valid(Some("nope")), Validity::Rejected(_)));
        assert_eq!(text(true).is_valid(Some("a@b.com")), Validity::Valid);
    }

    #[test]
    fn select_rejects_unknown_choice() {
        let f = Field::builder("Plan", "plan")
            .kind(FieldKind::Select)
            .choice("free", "Free")
            .choice("pro", "Pro")
            .build(&StrategyTable::standard())
            .unwrap();
        assert_eq!(f.is_valid(Some("pro")), Validity::Valid);
        assert!(matches!(f.is_valid(Some("gold")), Validity::Rejected(_)));
    }

    #[test]
    fn select_without_choices_is_a_configuration_error() {
        let err = Field::builder("Plan", "plan")
            .kind(FieldKind::Select)
            .build(&StrategyTable::standard())
            .unwrap_err();
        assert!(matches!(err, ArchetypeError::Configuration(_)));
    }

    #[test]
    fn missing_strategy_is_a_configuration_error() {
        let err = Field::builder("Agree", "agree")
            .kind(FieldKind::Checkbox)
            .build(&StrategyTable::empty())
            .unwrap_err();
        assert!(matches!(err, ArchetypeError::Configuration(_)));
    }

    #[test]
    fn unknown_kind_name_fails() {
        assert!("textarea".parse::<FieldKind>().is_err());
        assert_eq!("checkbox".parse::<FieldKind>().unwrap(), FieldKind::Checkbox);
    }

    #[test]
    fn admin_checkbox_renders_checked_state() {
        let f = Field::builder("Newsletter", "newsletter")
            .kind(FieldKind::Checkbox)
            .build(&StrategyTable::standard())
            .unwrap();
        let on = f.render(Context::Admin, Some("1"), None);
        let off = f.render(Context::Admin, Some("0"), None);
        assert!(on.contains(r#"checked="checked""#));
        assert!(!off.contains("checked="));
        assert!(on.contains("form-table"));
    }

    #[test]
    fn frontend_render_escapes_and_marks_errors() {
        let f = text(true);
        let validity = Validity::Rejected(ValidationError::new("Bad <email>"));
        let html = f.render(Context::Frontend, Some(r#""x"#), Some(&validity));
        assert!(html.contains("at-error"));
        assert!(html.contains("Bad &lt;email&gt;"));
        assert!(html.contains(r#"value="&quot;x""#));
    }

    fn input_name(html: &str) -> &str {
        let start = html.find(r#"name=""#).unwrap() + r#"name=""#.len();
        let end = html[start..].find('"').unwrap();
        &html[start..start + end]
    }

    #[test]
    fn rendered_input_name_is_read_back_when_slug_differs_from_meta_key() {
        let table = StrategyTable::standard();
        let fields = [
            Field::builder("Email", "email").slug("mail").required(true).build(&table).unwrap(),
            Field::builder("Agree", "agree")
                .slug("consent")
                .kind(FieldKind::Checkbox)
                .build(&table)
                .unwrap(),
            Field::builder("Ref", "ref").slug("referral").hidden(true).build(&table).unwrap(),
        ];
        for f in &fields {
            for ctx in Context::all() {
                let html = f.render(*ctx, None, None);
                let name = input_name(&html);
                assert_eq!(name, f.slug(), "{html}");
                let posted = Submission::new().with(name, "1");
                assert_eq!(f.posted_value(&posted), Some("1"));
            }
        }
        let posted = Submission::new().with("mail", "a@b.com");
        assert_eq!(fields[0].is_valid(fields[0].posted_value(&posted)), Validity::Valid);
    }

    #[test]
    fn select_membership_comes_from_choices_before_validator() {
        let f = Field::builder("Plan", "plan")
            .kind(FieldKind::Select)
            .choice("free", "Free")
            .validator(Validator::max_len(2))
            .build(&StrategyTable::standard())
            .unwrap();
        match f.is_valid(Some("gold")) {
            Validity::Rejected(e) => assert_eq!(e.message(), "Please choose a valid option"),
            other => panic!("expected rejection, got {other:?}"),
        }
        // A member still has to satisfy the configured validator.
        assert!(matches!(f.is_valid(Some("free")), Validity::Rejected(_)));
    }
}
