use crate::error::{ArchetypeError, Result};
use crate::field::{ValidationError, Validity};
use regex::Regex;
use std::fmt;
use std::sync::{Arc, OnceLock};

type Check = dyn Fn(&str) -> Validity + Send + Sync;

/// A named validation rule applied to a field's posted value.
///
/// Validators only ever see values that are present; absence is handled by
/// [`crate::field::Field::is_valid`] before the rule is consulted.
#[derive(Clone)]
pub struct Validator {
    name: String,
    check: Arc<Check>,
}

impl Validator {
    pub fn new<F>(name: impl Into<String>, check: F) -> Self
    where
        F: Fn(&str) -> Validity + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn check(&self, value: &str) -> Validity {
        (self.check)(value)
    }

    /// Accepts anything.
    pub fn always() -> Self {
        Self::new("always", |_| Validity::Valid)
    }

    /// Rejects blank values with the generic message.
    pub fn non_empty() -> Self {
        Self::new("non_empty", |v| {
            if v.trim().is_empty() {
                Validity::Invalid
            } else {
                Validity::Valid
            }
        })
    }

    pub fn email() -> Self {
        Self::new("email", |v| {
            if email_re().is_match(v.trim()) {
                Validity::Valid
            } else {
                Validity::Rejected(ValidationError::new(
                    "Please enter a valid email address",
                ))
            }
        })
    }

    pub fn max_len(max: usize) -> Self {
        Self::new(format!("max_len:{max}"), move |v| {
            if v.chars().count() <= max {
                Validity::Valid
            } else {
                Validity::Rejected(ValidationError::new(format!(
                    "Must be at most {max} characters"
                )))
            }
        })
    }

    /// Accepts only one of the given values.
    pub fn one_of(choices: Vec<String>) -> Self {
        Self::new("one_of", move |v| {
            if choices.iter().any(|c| c == v) {
                Validity::Valid
            } else {
                Validity::Rejected(ValidationError::new("Please choose a valid option"))
            }
        })
    }

    /// Resolve a validator by the name used in `archetype.yaml`.
    ///
    /// Recognised names: `always`, `non_empty`, `email`, `max_len:N`.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "always" => Ok(Self::always()),
            "non_empty" => Ok(Self::non_empty()),
            "email" => Ok(Self::email()),
            other => {
                if let Some(n) = other.strip_prefix("max_len:") {
                    let max = n.parse::<usize>().map_err(|_| {
                        ArchetypeError::Configuration(format!("invalid max_len bound '{n}'"))
                    })?;
                    return Ok(Self::max_len(max));
                }
                Err(ArchetypeError::Configuration(format!(
                    "unknown validator '{other}'"
                )))
            }
        }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::always()
    }
}

impl fmt::Debug for Validator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Validator").field(&self.name).finish()
    }
}

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
}
