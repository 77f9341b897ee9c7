use crate::error::{ArchetypeError, Result};
use crate::io::atomic_write;
use crate::paths;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub u64);

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        s.trim().parse().map(UserId)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    Subscriber,
    Anonymous,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Administrator => "administrator",
            Role::Subscriber => "subscriber",
            Role::Anonymous => "anonymous",
        })
    }
}

impl FromStr for Role {
    type Err = ArchetypeError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "administrator" | "admin" => Ok(Role::Administrator),
            "subscriber" => Ok(Role::Subscriber),
            other => Err(ArchetypeError::Configuration(format!("unknown role '{other}'"))),
        }
    }
}

/// The party acting on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal {
    pub user: Option<UserId>,
    pub role: Role,
}

impl Principal {
    pub fn anonymous() -> Self {
        Self {
            user: None,
            role: Role::Anonymous,
        }
    }

    pub fn user(id: UserId, role: Role) -> Self {
        Self {
            user: Some(id),
            role,
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.user.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    EditUser,
    ManageUsers,
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Capability::EditUser => f.write_str("edit"),
            Capability::ManageUsers => f.write_str("manage"),
        }
    }
}

/// Administrators may do anything; a signed-in user may edit themselves.
pub fn default_policy(principal: &Principal, capability: Capability, target: UserId) -> bool {
    match (principal.role, capability) {
        (Role::Administrator, _) => true,
        (Role::Subscriber, Capability::EditUser) => principal.user == Some(target),
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// UserRecord / UserStore
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: UserId,
    pub login: String,
    pub email: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
}

impl UserRecord {
    pub fn new(id: UserId, login: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            login: login.into(),
            email: email.into(),
            role,
            created_at: Utc::now(),
            meta: BTreeMap::new(),
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::user(self.id, self.role)
    }
}

/// String-keyed metadata storage for users, plus the permission check that
/// guards writes. The form core only reads and writes metadata; it never
/// creates or deletes users.
pub trait UserStore: Send + Sync {
    fn user(&self, id: UserId) -> Result<UserRecord>;

    fn get_meta(&self, id: UserId, key: &str) -> Result<Option<String>>;

    /// Last write wins.
    fn set_meta(&self, id: UserId, key: &str, value: &str) -> Result<()>;

    fn find_by_meta(&self, key: &str, value: &str) -> Result<Option<UserId>>;

    fn find_by_email(&self, email: &str) -> Result<Option<UserId>>;

    fn can(&self, principal: &Principal, capability: Capability, target: UserId) -> bool {
        default_policy(principal, capability, target)
    }
}

// ---------------------------------------------------------------------------
// MemoryUserStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryUserStore {
    users: Mutex<BTreeMap<UserId, UserRecord>>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, login: &str, email: &str, role: Role) -> UserId {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let id = UserId(users.keys().last().map(|k| k.0 + 1).unwrap_or(1));
        users.insert(id, UserRecord::new(id, login, email, role));
        id
    }
}

impl UserStore for MemoryUserStore {
    fn user(&self, id: UserId) -> Result<UserRecord> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        users.get(&id).cloned().ok_or(ArchetypeError::UserNotFound(id))
    }

    fn get_meta(&self, id: UserId, key: &str) -> Result<Option<String>> {
        Ok(self.user(id)?.meta.get(key).cloned())
    }

    fn set_meta(&self, id: UserId, key: &str, value: &str) -> Result<()> {
        let mut users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        let record = users.get_mut(&id).ok_or(ArchetypeError::UserNotFound(id))?;
        record.meta.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn find_by_meta(&self, key: &str, value: &str) -> Result<Option<UserId>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .values()
            .find(|u| u.meta.get(key).map(String::as_str) == Some(value))
            .map(|u| u.id))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserId>> {
        let users = self.users.lock().unwrap_or_else(|e| e.into_inner());
        Ok(users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.id))
    }
}

// ---------------------------------------------------------------------------
// FileUserStore
// ---------------------------------------------------------------------------

/// One YAML file per user under `.archetype/users/`, written atomically.
#[derive(Debug)]
pub struct FileUserStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl FileUserStore {
    pub fn open(root: &Path) -> Self {
        Self {
            dir: paths::users_dir(root),
            write_lock: Mutex::new(()),
        }
    }

    fn path(&self, id: UserId) -> PathBuf {
        self.dir.join(format!("{id}.yaml"))
    }

    fn save(&self, record: &UserRecord) -> Result<()> {
        let data = serde_yaml::to_string(record)?;
        atomic_write(&self.path(record.id), data.as_bytes())
    }

    /// All users, ordered by id. Unreadable files are skipped.
    pub fn list(&self) -> Result<Vec<UserRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut records = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("yaml") {
                continue;
            }
            let Ok(data) = std::fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(record) = serde_yaml::from_str::<UserRecord>(&data) {
                records.push(record);
            }
        }
        records.sort_by_key(|r| r.id);
        Ok(records)
    }

    /// Add a user. Used by administration tooling, not by forms.
    pub fn create(&self, login: &str, email: &str, role: Role) -> Result<UserRecord> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let existing = self.list()?;
        if existing.iter().any(|u| u.login == login) {
            return Err(ArchetypeError::Configuration(format!(
                "user login already taken: {login}"
            )));
        }
        let id = UserId(existing.last().map(|u| u.id.0 + 1).unwrap_or(1));
        let record = UserRecord::new(id, login, email, role);
        self.save(&record)?;
        tracing::info!(user = %id, login, "user created");
        Ok(record)
    }
}

impl UserStore for FileUserStore {
    fn user(&self, id: UserId) -> Result<UserRecord> {
        let path = self.path(id);
        if !path.exists() {
            return Err(ArchetypeError::UserNotFound(id));
        }
        let data = std::fs::read_to_string(&path)?;
        Ok(serde_yaml::from_str(&data)?)
    }

    fn get_meta(&self, id: UserId, key: &str) -> Result<Option<String>> {
        Ok(self.user(id)?.meta.get(key).cloned())
    }

    fn set_meta(&self, id: UserId, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut record = self.user(id)?;
        record.meta.insert(key.to_string(), value.to_string());
        self.save(&record)
    }

    fn find_by_meta(&self, key: &str, value: &str) -> Result<Option<UserId>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|u| u.meta.get(key).map(String::as_str) == Some(value))
            .map(|u| u.id))
    }

    fn find_by_email(&self, email: &str) -> Result<Option<UserId>> {
        Ok(self
            .list()?
            .into_iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .map(|u| u.id))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
