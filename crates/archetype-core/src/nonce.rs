use crate::user::{Principal, UserId};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Bytes of the HMAC kept in a token (rendered as twice as many hex chars).
const TOKEN_BYTES: usize = 5;

/// How old a verified token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonceAge {
    /// Minted in the current half-lifetime.
    Fresh,
    /// Minted in the previous half-lifetime; still accepted.
    Aging,
}

/// Mints and checks time-limited submission tokens bound to an action and
/// a user.
///
/// Time is divided into ticks of half the lifetime. A token is valid for the
/// tick it was minted in and the one after.
#[derive(Clone)]
pub struct NonceService {
    secret: Vec<u8>,
    lifetime: Duration,
}

impl std::fmt::Debug for NonceService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NonceService")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl NonceService {
    pub fn new(secret: impl AsRef<[u8]>, lifetime: Duration) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            lifetime,
        }
    }

    /// A random 32-byte secret, hex encoded.
    pub fn generate_secret() -> String {
        let mut buf = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut buf);
        hex(&buf)
    }

    fn tick(&self, now: DateTime<Utc>) -> i64 {
        let half = (self.lifetime.num_seconds() / 2).max(1);
        let ts = now.timestamp();
        (ts + half - 1).div_euclid(half)
    }

    fn mac(&self, tick: i64, action: &str, principal: &Principal) -> HmacSha256 {
        let uid = principal.user.map(|u| u.0).unwrap_or(0);
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(format!("{tick}|{action}|{uid}").as_bytes());
        mac
    }

    pub fn create(&self, action: &str, principal: &Principal) -> String {
        self.create_at(action, principal, Utc::now())
    }

    pub fn create_at(&self, action: &str, principal: &Principal, now: DateTime<Utc>) -> String {
        let tag = self.mac(self.tick(now), action, principal).finalize().into_bytes();
        hex(&tag[..TOKEN_BYTES])
    }

    pub fn verify(&self, token: &str, action: &str, principal: &Principal) -> Option<NonceAge> {
        self.verify_at(token, action, principal, Utc::now())
    }

    pub fn verify_at(
        &self,
        token: &str,
        action: &str,
        principal: &Principal,
        now: DateTime<Utc>,
    ) -> Option<NonceAge> {
        let bytes = unhex(token)?;
        if bytes.len() != TOKEN_BYTES {
            return None;
        }
        let tick = self.tick(now);
        if self
            .mac(tick, action, principal)
            .verify_truncated_left(&bytes)
            .is_ok()
        {
            return Some(NonceAge::Fresh);
        }
        if self
            .mac(tick - 1, action, principal)
            .verify_truncated_left(&bytes)
            .is_ok()
        {
            return Some(NonceAge::Aging);
        }
        None
    }

    // -----------------------------------------------------------------------
    // Session tokens
    // -----------------------------------------------------------------------

    fn session_mac(&self, user: UserId) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC accepts keys of any length");
        mac.update(format!("session|{user}").as_bytes());
        mac
    }

    /// A signed `"{uid}.{mac}"` token identifying a signed-in user.
    pub fn session_token(&self, user: UserId) -> String {
        let tag = self.session_mac(user).finalize().into_bytes();
        format!("{user}.{}", hex(&tag))
    }

    pub fn verify_session(&self, token: &str) -> Option<UserId> {
        let (uid, sig) = token.split_once('.')?;
        let user: UserId = uid.parse().ok()?;
        let bytes = unhex(sig)?;
        self.session_mac(user).verify_slice(&bytes).ok()?;
        Some(user)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn unhex(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::{Role, UserId};

    fn service() -> NonceService {
        NonceService::new("test-secret", Duration::hours(24))
    }

    fn member() -> Principal {
        Principal::user(UserId(7), Role::Subscriber)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn token_is_ten_hex_chars() {
        let token = service().create_at("save", &member(), at(1_000_000));
        assert_eq!(token.len(), 10);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn fresh_token_verifies() {
        let s = service();
        let now = at(1_000_000);
        let token = s.create_at("save", &member(), now);
        assert_eq!(s.verify_at(&token, "save", &member(), now), Some(NonceAge::Fresh));
    }

    #[test]
    fn token_ages_then_expires() {
        let s = service();
        let minted = at(1_000_000);
        let token = s.create_at("save", &member(), minted);
        let half = 12 * 3600;
        assert_eq!(
            s.verify_at(&token, "save", &member(), at(1_000_000 + half)),
            Some(NonceAge::Aging)
        );
        assert_eq!(s.verify_at(&token, "save", &member(), at(1_000_000 + 2 * half)), None);
    }

    #[test]
    fn token_is_bound_to_action_and_user() {
        let s = service();
        let now = at(1_000_000);
        let token = s.create_at("save", &member(), now);
        assert_eq!(s.verify_at(&token, "delete", &member(), now), None);
        assert_eq!(s.verify_at(&token, "save", &Principal::anonymous(), now), None);
    }

    #[test]
    fn garbage_is_rejected() {
        let s = service();
        assert_eq!(s.verify("zz", "save", &member()), None);
        assert_eq!(s.verify("", "save", &member()), None);
    }

    #[test]
    fn session_token_round_trips_and_rejects_tampering() {
        let s = service();
        let token = s.session_token(UserId(42));
        assert_eq!(s.verify_session(&token), Some(UserId(42)));

        let forged = token.replacen("42.", "43.", 1);
        assert_eq!(s.verify_session(&forged), None);
        assert_eq!(s.verify_session("42"), None);

        let other = NonceService::new("other", Duration::hours(24));
        assert_eq!(other.verify_session(&token), None);
    }

    #[test]
    fn generated_secrets_differ() {
        assert_ne!(NonceService::generate_secret(), NonceService::generate_secret());
    }
}
