//! Facebook login and account binding.
//!
//! The browser SDK hands us an `authResponse`; we normalize it, find or bind
//! the matching user, and swap the short-lived token for a long-lived one
//! through the Graph API.

use crate::error::{ArchetypeError, Result};
use crate::submission::Submission;
use crate::user::{Capability, Principal, UserId, UserStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

pub const FB_ID_META: &str = "at_fb_id";
pub const FB_TOKEN_META: &str = "at_fb_token";
pub const FB_EXPIRES_META: &str = "at_fb_expires";
pub const FB_AVATAR_META: &str = "at_fb_avatar";

pub const DEFAULT_GRAPH_URL: &str = "https://graph.facebook.com";

// ---------------------------------------------------------------------------
// Callback payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct AuthPayload {
    #[serde(rename = "authResponse")]
    pub auth_response: AuthResponse,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "accessToken")]
    pub access_token: String,
    #[serde(rename = "userID", deserialize_with = "lenient_string")]
    pub user_id: String,
    #[serde(rename = "expiresIn", deserialize_with = "lenient_i64")]
    pub expires_in: i64,
}

/// The normalized form of an auth callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacebookSession {
    pub token: String,
    pub id: String,
    pub expires: i64,
}

impl From<AuthPayload> for FacebookSession {
    fn from(payload: AuthPayload) -> Self {
        let auth = payload.auth_response;
        Self {
            token: auth.access_token,
            id: auth.user_id,
            expires: auth.expires_in,
        }
    }
}

/// Normalize a raw callback body.
pub fn parse_payload(value: serde_json::Value) -> Result<FacebookSession> {
    let payload: AuthPayload = serde_json::from_value(value)?;
    Ok(payload.into())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Lenient {
    Int(i64),
    Str(String),
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    Ok(match Lenient::deserialize(d)? {
        Lenient::Int(n) => n.to_string(),
        Lenient::Str(s) => s,
    })
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<i64, D::Error> {
    match Lenient::deserialize(d)? {
        Lenient::Int(n) => Ok(n),
        Lenient::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

// ---------------------------------------------------------------------------
// Graph API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LongLivedToken {
    pub token: String,
    /// Seconds until expiry.
    pub expires: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FacebookProfile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

pub trait GraphApi: Send + Sync {
    fn exchange_token(&self, short_lived: &str) -> Result<LongLivedToken>;

    fn me(&self, token: &str) -> Result<FacebookProfile>;

    fn avatar_url(&self, profile: &FacebookProfile) -> String;
}

/// Blocking Graph API client.
pub struct GraphClient {
    http: reqwest::blocking::Client,
    base_url: String,
    app_id: String,
    app_secret: String,
}

impl GraphClient {
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            app_id: app_id.into(),
            app_secret: app_secret.into(),
        })
    }
}

#[derive(Deserialize)]
struct JsonToken {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Deserialize)]
struct LegacyToken {
    access_token: String,
    #[serde(default)]
    expires: Option<String>,
}

/// Accept the JSON body current Graph versions return, and the urlencoded
/// `access_token=..&expires=..` body older versions returned.
fn parse_token_body(body: &str) -> Result<LongLivedToken> {
    if let Ok(t) = serde_json::from_str::<JsonToken>(body) {
        return Ok(LongLivedToken {
            token: t.access_token,
            expires: t.expires_in.unwrap_or(0),
        });
    }
    let t: LegacyToken = serde_urlencoded::from_str(body)
        .map_err(|_| ArchetypeError::Facebook("unrecognised token exchange response".into()))?;
    Ok(LongLivedToken {
        token: t.access_token,
        expires: t.expires.and_then(|e| e.parse().ok()).unwrap_or(0),
    })
}

impl GraphApi for GraphClient {
    fn exchange_token(&self, short_lived: &str) -> Result<LongLivedToken> {
        let resp = self
            .http
            .get(format!("{}/oauth/access_token", self.base_url))
            .query(&[
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_secret.as_str()),
                ("grant_type", "fb_exchange_token"),
                ("fb_exchange_token", short_lived),
            ])
            .send()?;
        let status = resp.status();
        let body = resp.text()?;
        if !status.is_success() {
            return Err(ArchetypeError::Facebook(format!(
                "token exchange failed with status {status}"
            )));
        }
        parse_token_body(&body)
    }

    fn me(&self, token: &str) -> Result<FacebookProfile> {
        let resp = self
            .http
            .get(format!("{}/me", self.base_url))
            .query(&[("access_token", token), ("fields", "id,name,email")])
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ArchetypeError::Facebook(format!(
                "profile lookup failed with status {status}"
            )));
        }
        Ok(resp.json()?)
    }

    fn avatar_url(&self, profile: &FacebookProfile) -> String {
        let handle = profile.username.as_deref().unwrap_or(&profile.id);
        format!("{}/{handle}/picture?type=large", self.base_url)
    }
}

// ---------------------------------------------------------------------------
// Lookup and binding
// ---------------------------------------------------------------------------

/// Find the user for a Facebook id, falling back to the email address on
/// their Graph profile when a token is available.
pub fn find_user(
    store: &dyn UserStore,
    api: &dyn GraphApi,
    fb_id: &str,
    token: Option<&str>,
) -> Result<Option<UserId>> {
    if let Some(id) = store.find_by_meta(FB_ID_META, fb_id)? {
        return Ok(Some(id));
    }
    let Some(token) = token else {
        return Ok(None);
    };
    match api.me(token) {
        Ok(profile) => match profile.email {
            Some(email) => store.find_by_email(&email),
            None => Ok(None),
        },
        Err(e) => {
            tracing::warn!(error = %e, "facebook profile lookup failed");
            Ok(None)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Binding {
    pub avatar: Option<String>,
    /// The token could not be checked against the Graph API and nothing was
    /// stored; the user should reconnect.
    pub needs_reauth: bool,
}

/// Associate a user with a Facebook session: store the id, a long-lived
/// token and its absolute expiry, and the profile picture.
///
/// The client-supplied id is only trusted once the Graph profile behind the
/// token reports the same id. A mismatch is an error; an unreadable profile
/// writes nothing and asks for reauthentication.
pub fn bind_user(
    store: &dyn UserStore,
    api: &dyn GraphApi,
    user: UserId,
    session: &FacebookSession,
    now: DateTime<Utc>,
) -> Result<Binding> {
    let profile = match api.me(&session.token) {
        Ok(profile) => profile,
        Err(e) => {
            tracing::warn!(user = %user, error = %e, "facebook profile unavailable, not binding");
            return Ok(Binding {
                avatar: None,
                needs_reauth: true,
            });
        }
    };
    if profile.id != session.id {
        tracing::warn!(user = %user, claimed = %session.id, actual = %profile.id, "facebook id mismatch");
        return Err(ArchetypeError::Facebook(
            "access token belongs to a different Facebook account".to_string(),
        ));
    }

    let long = api.exchange_token(&session.token)?;
    store.set_meta(user, FB_ID_META, &session.id)?;
    store.set_meta(user, FB_TOKEN_META, &long.token)?;
    store.set_meta(
        user,
        FB_EXPIRES_META,
        &(long.expires + now.timestamp()).to_string(),
    )?;
    let avatar = api.avatar_url(&profile);
    store.set_meta(user, FB_AVATAR_META, &avatar)?;
    tracing::info!(user = %user, fb_id = %session.id, "facebook account bound");

    Ok(Binding {
        avatar: Some(avatar),
        needs_reauth: false,
    })
}

/// JSON answer to the login and connect callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub new_user: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub facebook_data: Option<FacebookSession>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub needs_reauth: bool,
    /// The user to sign in, when one was found.
    #[serde(skip)]
    pub user: Option<UserId>,
}

/// Log in with Facebook: bind and sign in a known user, or tell the client
/// to start signup with the Facebook data attached.
pub fn login(
    store: &dyn UserStore,
    api: &dyn GraphApi,
    session: FacebookSession,
    now: DateTime<Utc>,
) -> Result<LoginResponse> {
    match find_user(store, api, &session.id, Some(&session.token))? {
        Some(user) => {
            let binding = bind_user(store, api, user, &session, now)?;
            Ok(LoginResponse {
                new_user: false,
                facebook_data: Some(session),
                avatar: binding.avatar,
                needs_reauth: binding.needs_reauth,
                // An unverified session signs nobody in.
                user: (!binding.needs_reauth).then_some(user),
            })
        }
        None => Ok(LoginResponse {
            new_user: true,
            facebook_data: Some(session),
            avatar: None,
            needs_reauth: false,
            user: None,
        }),
    }
}

/// Connect the signed-in user's account to Facebook.
pub fn connect(
    store: &dyn UserStore,
    api: &dyn GraphApi,
    principal: &Principal,
    session: FacebookSession,
    now: DateTime<Utc>,
) -> Result<LoginResponse> {
    let user = principal.user.ok_or(ArchetypeError::Permission {
        action: Capability::EditUser.to_string(),
        user: UserId(0),
    })?;
    if !store.can(principal, Capability::EditUser, user) {
        return Err(ArchetypeError::Permission {
            action: Capability::EditUser.to_string(),
            user,
        });
    }
    let binding = bind_user(store, api, user, &session, now)?;
    Ok(LoginResponse {
        new_user: false,
        facebook_data: Some(session),
        avatar: binding.avatar,
        needs_reauth: binding.needs_reauth,
        user: Some(user),
    })
}

/// Bind a just-created user when the signup submission carried Facebook
/// credentials.
pub fn bind_from_submission(
    store: &dyn UserStore,
    api: &dyn GraphApi,
    user: UserId,
    submission: &Submission,
    now: DateTime<Utc>,
) -> Result<Option<Binding>> {
    let (Some(id), Some(token)) = (submission.get(FB_ID_META), submission.get(FB_TOKEN_META))
    else {
        return Ok(None);
    };
    let session = FacebookSession {
        token: token.to_string(),
        id: id.to_string(),
        expires: 0,
    };
    bind_user(store, api, user, &session, now).map(Some)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{MemoryUserStore, Role};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeGraph {
        email: Option<String>,
        profile_id: String,
        profile_fails: AtomicBool,
    }

    impl FakeGraph {
        fn new(email: Option<&str>) -> Self {
            Self {
                email: email.map(str::to_string),
                profile_id: "999".into(),
                profile_fails: AtomicBool::new(false),
            }
        }

        /// A Graph whose tokens belong to a different account.
        fn owned_by(id: &str) -> Self {
            Self {
                profile_id: id.into(),
                ..Self::new(None)
            }
        }
    }

    impl GraphApi for FakeGraph {
        fn exchange_token(&self, short_lived: &str) -> Result<LongLivedToken> {
            Ok(LongLivedToken {
                token: format!("long-{short_lived}"),
                expires: 5_000_000,
            })
        }

        fn me(&self, _token: &str) -> Result<FacebookProfile> {
            if self.profile_fails.load(Ordering::SeqCst) {
                return Err(ArchetypeError::Facebook("expired".into()));
            }
            Ok(FacebookProfile {
                id: self.profile_id.clone(),
                email: self.email.clone(),
                username: Some("jo.fb".into()),
                ..Default::default()
            })
        }

        fn avatar_url(&self, profile: &FacebookProfile) -> String {
            format!("https://graph.test/{}/picture", profile.username.as_deref().unwrap_or(&profile.id))
        }
    }

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn session() -> FacebookSession {
        FacebookSession {
            token: "tok123".into(),
            id: "999".into(),
            expires: 3600,
        }
    }

    #[test]
    fn payload_normalizes_to_session() {
        let session = parse_payload(serde_json::json!({
            "authResponse": { "accessToken": "tok123", "userID": "999", "expiresIn": 3600 }
        }))
        .unwrap();
        assert_eq!(session, self::session());
    }

    #[test]
    fn payload_accepts_stringly_numbers() {
        let session = parse_payload(serde_json::json!({
            "authResponse": { "accessToken": "t", "userID": 999, "expiresIn": "3600" }
        }))
        .unwrap();
        assert_eq!(session.id, "999");
        assert_eq!(session.expires, 3600);
    }

    #[test]
    fn legacy_token_body_is_understood() {
        let t = parse_token_body("access_token=abc&expires=5183999").unwrap();
        assert_eq!(t, LongLivedToken { token: "abc".into(), expires: 5_183_999 });
        let t = parse_token_body(r#"{"access_token":"xyz","token_type":"bearer","expires_in":60}"#)
            .unwrap();
        assert_eq!(t.expires, 60);
    }

    #[test]
    fn bind_writes_token_expiry_and_avatar() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let graph = FakeGraph::new(None);
        let binding = bind_user(&store, &graph, user, &session(), now()).unwrap();

        assert_eq!(store.get_meta(user, FB_ID_META).unwrap().as_deref(), Some("999"));
        assert_eq!(store.get_meta(user, FB_TOKEN_META).unwrap().as_deref(), Some("long-tok123"));
        assert_eq!(
            store.get_meta(user, FB_EXPIRES_META).unwrap().as_deref(),
            Some("1705000000")
        );
        assert_eq!(binding.avatar.as_deref(), Some("https://graph.test/jo.fb/picture"));
        assert!(!binding.needs_reauth);
    }

    #[test]
    fn bind_flags_reauth_when_profile_fails() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let graph = FakeGraph::new(None);
        graph.profile_fails.store(true, Ordering::SeqCst);
        let binding = bind_user(&store, &graph, user, &session(), now()).unwrap();
        assert!(binding.needs_reauth);
        assert_eq!(binding.avatar, None);
        assert_eq!(store.get_meta(user, FB_ID_META).unwrap(), None);
    }

    #[test]
    fn login_rejects_token_issued_to_another_account() {
        let store = MemoryUserStore::new();
        let victim = store.insert("jo", "jo@example.com", Role::Subscriber);
        store.set_meta(victim, FB_ID_META, "999").unwrap();
        let graph = FakeGraph::owned_by("attacker-fb");
        let forged = FacebookSession {
            token: "attacker-token".into(),
            id: "999".into(),
            expires: 3600,
        };

        let err = login(&store, &graph, forged, now()).unwrap_err();
        assert!(matches!(err, ArchetypeError::Facebook(_)));
        assert_eq!(store.get_meta(victim, FB_TOKEN_META).unwrap(), None);
    }

    #[test]
    fn unreadable_profile_signs_nobody_in() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        store.set_meta(user, FB_ID_META, "999").unwrap();
        let graph = FakeGraph::new(None);
        graph.profile_fails.store(true, Ordering::SeqCst);

        let resp = login(&store, &graph, session(), now()).unwrap();
        assert!(resp.needs_reauth);
        assert_eq!(resp.user, None);
    }

    #[test]
    fn bind_from_submission_checks_the_token_owner() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let graph = FakeGraph::owned_by("someone-else");
        let sub = Submission::new().with(FB_ID_META, "999").with(FB_TOKEN_META, "tok");

        let err = bind_from_submission(&store, &graph, user, &sub, now()).unwrap_err();
        assert!(matches!(err, ArchetypeError::Facebook(_)));
        assert_eq!(store.get_meta(user, FB_ID_META).unwrap(), None);
    }

    #[test]
    fn login_finds_user_by_graph_email() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let graph = FakeGraph::new(Some("jo@example.com"));
        let resp = login(&store, &graph, session(), now()).unwrap();
        assert!(!resp.new_user);
        assert_eq!(resp.user, Some(user));
        assert_eq!(store.find_by_meta(FB_ID_META, "999").unwrap(), Some(user));
    }

    #[test]
    fn login_reports_new_user_when_unknown() {
        let store = MemoryUserStore::new();
        let graph = FakeGraph::new(Some("nobody@example.com"));
        let resp = login(&store, &graph, session(), now()).unwrap();
        assert!(resp.new_user);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["newUser"], true);
        assert_eq!(json["facebookData"]["token"], "tok123");
        assert!(json.get("user").is_none());
    }

    #[test]
    fn connect_requires_a_signed_in_user() {
        let store = MemoryUserStore::new();
        let graph = FakeGraph::new(None);
        let err = connect(&store, &graph, &Principal::anonymous(), session(), now()).unwrap_err();
        assert!(matches!(err, ArchetypeError::Permission { .. }));
    }

    #[test]
    fn bind_from_submission_needs_both_keys() {
        let store = MemoryUserStore::new();
        let user = store.insert("jo", "jo@example.com", Role::Subscriber);
        let graph = FakeGraph::new(None);
        let partial = Submission::new().with(FB_ID_META, "999");
        assert_eq!(bind_from_submission(&store, &graph, user, &partial, now()).unwrap(), None);

        let full = partial.with(FB_TOKEN_META, "tok");
        assert!(bind_from_submission(&store, &graph, user, &full, now()).unwrap().is_some());
    }

    #[test]
    fn graph_client_exchanges_token_over_http() {
        let mut server = mockito::Server::new();
        let exchange = server
            .mock("GET", "/oauth/access_token")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "fb_exchange_token".into()),
                mockito::Matcher::UrlEncoded("fb_exchange_token".into(), "short".into()),
            ]))
            .with_body(r#"{"access_token":"long","expires_in":5183999}"#)
            .create();

        let client = GraphClient::new(server.url(), "app", "secret").unwrap();
        let token = client.exchange_token("short").unwrap();
        assert_eq!(token.token, "long");
        assert_eq!(token.expires, 5_183_999);
        exchange.assert();
    }

    #[test]
    fn graph_client_reports_failed_profile_lookup() {
        let mut server = mockito::Server::new();
        let _me = server
            .mock("GET", "/me")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":{"message":"bad token"}}"#)
            .create();
        let client = GraphClient::new(server.url(), "app", "secret").unwrap();
        assert!(matches!(client.me("bad"), Err(ArchetypeError::Facebook(_))));
    }
}
