use crate::error::Result;
use crate::field::is_truthy;
use crate::user::{UserId, UserStore};
use serde::{Deserialize, Serialize};

/// Meta key set once a user has finished the signup funnel.
pub const SIGNUP_COMPLETED_META: &str = "at_signup_completed";

/// How a phase decides whether a user is done with it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PhaseTest {
    /// Done when the meta key holds a truthy value.
    Usermeta { meta_key: String },
    /// Done once the phase has been visited.
    Once,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phase {
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub shortname: Option<String>,
    pub test: PhaseTest,
    /// Where to send a user who has not passed this phase.
    pub redirect: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhaseProgress {
    pub slug: String,
    pub name: String,
    pub done: bool,
}

/// An ordered series of pages a user must get through, in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Funnel {
    pub name: String,
    pub phases: Vec<Phase>,
}

impl Funnel {
    fn visited(&self, store: &dyn UserStore, user: UserId) -> Result<Vec<String>> {
        match store.get_meta(user, &self.name)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(Vec::new()),
        }
    }

    fn passes(&self, phase: &Phase, store: &dyn UserStore, user: UserId, visited: &[String]) -> Result<bool> {
        Ok(match &phase.test {
            PhaseTest::Usermeta { meta_key } => is_truthy(store.get_meta(user, meta_key)?.as_deref()),
            PhaseTest::Once => visited.iter().any(|v| v == &phase.slug),
        })
    }

    /// The first phase the user has not passed, or `None` when they are through.
    pub fn next_phase(&self, store: &dyn UserStore, user: UserId) -> Result<Option<&Phase>> {
        let visited = self.visited(store, user)?;
        for phase in &self.phases {
            if !self.passes(phase, store, user, &visited)? {
                return Ok(Some(phase));
            }
        }
        Ok(None)
    }

    /// Record a visit to a `once` phase.
    pub fn mark_visited(&self, store: &dyn UserStore, user: UserId, phase: &str) -> Result<()> {
        let mut visited = self.visited(store, user)?;
        if !visited.iter().any(|v| v == phase) {
            visited.push(phase.to_string());
            store.set_meta(user, &self.name, &serde_json::to_string(&visited)?)?;
        }
        Ok(())
    }

    pub fn progress(&self, store: &dyn UserStore, user: UserId) -> Result<Vec<PhaseProgress>> {
        let visited = self.visited(store, user)?;
        self.phases
            .iter()
            .map(|p| {
                Ok(PhaseProgress {
                    slug: p.slug.clone(),
                    name: p.shortname.clone().unwrap_or_else(|| p.name.clone()),
                    done: self.passes(p, store, user, &visited)?,
                })
            })
            .collect()
    }
}

/// Mark the user as having finished signup.
pub fn complete(store: &dyn UserStore, user: UserId) -> Result<()> {
    store.set_meta(user, SIGNUP_COMPLETED_META, "1")?;
    tracing::info!(user = %user, "signup completed");
    Ok(())
}

pub fn is_complete(store: &dyn UserStore, user: UserId) -> Result<bool> {
    Ok(is_truthy(store.get_meta(user, SIGNUP_COMPLETED_META)?.as_deref()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{MemoryUserStore, Role};

    fn funnel() -> Funnel {
        Funnel {
            name: "signup".into(),
            phases: vec![
                Phase {
                    slug: "tour".into(),
                    name: "Take a tour".into(),
                    shortname: Some("Tour".into()),
                    test: PhaseTest::Once,
                    redirect: "/tour".into(),
                },
                Phase {
                    slug: "profile".into(),
                    name: "Fill in your profile".into(),
                    shortname: None,
                    test: PhaseTest::Usermeta {
                        meta_key: "at_profile_done".into(),
                    },
                    redirect: "/profile".into(),
                },
            ],
        }
    }

    #[test]
    fn phases_are_taken_in_order() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let f = funnel();

        assert_eq!(f.next_phase(&store, user).unwrap().unwrap().slug, "tour");
        f.mark_visited(&store, user, "tour").unwrap();
        assert_eq!(f.next_phase(&store, user).unwrap().unwrap().slug, "profile");

        store.set_meta(user, "at_profile_done", "0").unwrap();
        assert_eq!(f.next_phase(&store, user).unwrap().unwrap().slug, "profile");
        store.set_meta(user, "at_profile_done", "1").unwrap();
        assert!(f.next_phase(&store, user).unwrap().is_none());
    }

    #[test]
    fn mark_visited_is_idempotent() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let f = funnel();
        f.mark_visited(&store, user, "tour").unwrap();
        f.mark_visited(&store, user, "tour").unwrap();
        assert_eq!(store.get_meta(user, "signup").unwrap().as_deref(), Some(r#"["tour"]"#));
    }

    #[test]
    fn progress_reports_each_phase() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let f = funnel();
        f.mark_visited(&store, user, "tour").unwrap();
        let progress = f.progress(&store, user).unwrap();
        assert_eq!(progress[0].name, "Tour");
        assert!(progress[0].done);
        assert!(!progress[1].done);
    }

    #[test]
    fn completion_is_recorded() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        assert!(!is_complete(&store, user).unwrap());
        complete(&store, user).unwrap();
        assert!(is_complete(&store, user).unwrap());
    }

    #[test]
    fn phase_config_parses_from_yaml() {
        let yaml = r#"
name: signup
phases:
  - slug: tour
    name: Take a tour
    test: { type: usermeta, meta_key: at_tour }
    redirect: /tour
"#;
        let f: Funnel = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            f.phases[0].test,
            PhaseTest::Usermeta {
                meta_key: "at_tour".into()
            }
        );
    }
}
