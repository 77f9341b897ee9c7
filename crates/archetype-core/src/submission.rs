use crate::error::Result;
use indexmap::IndexMap;

/// Key carrying the one-time submission token.
pub const NONCE_FIELD: &str = "_nonce";
/// Key carrying the page to return to after a successful submission.
pub const REFERER_FIELD: &str = "_referer";

/// The inbound map of submitted values, in submission order.
///
/// A key that was not submitted is absent, which is distinct from a key
/// submitted with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Submission {
    values: IndexMap<String, String>,
}

impl Submission {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse an `application/x-www-form-urlencoded` body. Repeated keys keep
    /// the last value.
    pub fn from_urlencoded(body: &str) -> Result<Self> {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_str(body)?;
        Ok(pairs.into_iter().collect())
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn nonce(&self) -> Option<&str> {
        self.get(NONCE_FIELD)
    }

    pub fn referer(&self) -> Option<&str> {
        self.get(REFERER_FIELD)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, String)> for Submission {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
