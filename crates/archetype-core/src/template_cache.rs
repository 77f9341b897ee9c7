use crate::error::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default lifetime of a cached render.
pub const DEFAULT_TTL_SECS: i64 = 3600;

#[derive(Debug)]
struct Entry {
    html: String,
    expires_at: DateTime<Utc>,
}

/// Short-lived cache of rendered markup, keyed by template name and the
/// serialized template arguments.
#[derive(Debug)]
pub struct TemplateCache {
    ttl: Duration,
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl Default for TemplateCache {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_TTL_SECS))
    }
}

impl TemplateCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_render<A, F>(&self, template: &str, args: &A, render: F) -> Result<String>
    where
        A: Serialize,
        F: FnOnce() -> Result<String>,
    {
        self.get_or_render_at(template, args, Utc::now(), render)
    }

    pub fn get_or_render_at<A, F>(
        &self,
        template: &str,
        args: &A,
        now: DateTime<Utc>,
        render: F,
    ) -> Result<String>
    where
        A: Serialize,
        F: FnOnce() -> Result<String>,
    {
        let key = (template.to_string(), serde_json::to_string(args)?);
        {
            let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(hit) = entries.get(&key) {
                if hit.expires_at > now {
                    return Ok(hit.html.clone());
                }
            }
        }
        let html = render()?;
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // Keys carry per-request values, so stale keys rarely recur.
        entries.retain(|_, entry| entry.expires_at > now);
        entries.insert(
            key,
            Entry {
                html: html.clone(),
                expires_at: now + self.ttl,
            },
        );
        Ok(html)
    }

    /// Drop every cached render of `template`.
    pub fn invalidate(&self, template: &str) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.retain(|(t, _), _| t != template);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
