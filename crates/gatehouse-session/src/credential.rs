//! The credential store seam.
//!
//! Gatehouse never stores passwords or hashes itself. Accounts live in
//! some external store (a database behind a website, usually), and the
//! node talks to it through the [`CredentialStore`] trait: a handful of
//! async questions and two "issue me a fresh credential" calls.
//!
//! [`MemoryCredentialStore`] implements the trait in memory. It backs the
//! tests and the demo, and doubles as a reference for what a real store
//! must guarantee:
//!
//! - issuing a code or token deletes any outstanding one for the identity;
//! - a code is consumed by the same call that accepts it (single use);
//! - codes and tokens expire after [`CredentialConfig::ttl`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use gatehouse_protocol::{PlayerId, PlayerIdentity};
use parking_lot::Mutex;
use rand::Rng;
use tokio::time::Instant;

use crate::StoreError;

/// Result of checking a one-time code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    /// The code matched and has been consumed.
    Accepted,
    /// A code is pending for the identity but this isn't it.
    Rejected,
    /// The pending code outlived its TTL (and is now gone).
    Expired,
    /// No code is pending for the identity.
    NoPendingCode,
}

/// Access to accounts and ephemeral credentials.
///
/// # Trait bounds
///
/// - `Send + Sync + 'static` → one store is shared by every spawned
///   credential check on the node.
/// - Every future is `Send` so checks can run in `tokio::spawn`ed tasks,
///   off the node's main loop.
///
/// Every method may fail with [`StoreError::Unavailable`]. Callers treat
/// that as "try again later", never as success.
pub trait CredentialStore: Send + Sync + 'static {
    /// Cheap liveness check, used once at startup.
    fn ping(&self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Whether an account exists for the identity.
    fn identity_exists(
        &self,
        identity: &PlayerIdentity,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Whether the identity has completed registration.
    fn is_verified(
        &self,
        identity: &PlayerIdentity,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Checks the identity's long-lived secret (password). An account
    /// with no secret set never matches.
    fn verify_long_lived_secret(
        &self,
        identity: &PlayerIdentity,
        secret: &str,
    ) -> impl Future<Output = Result<bool, StoreError>> + Send;

    /// Issues a fresh numeric one-time code, replacing any pending one.
    fn issue_one_time_code(
        &self,
        identity: &PlayerIdentity,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;

    /// Checks `code` and, if it matches, consumes it in the same step.
    fn verify_and_consume_one_time_code(
        &self,
        identity: &PlayerIdentity,
        code: &str,
    ) -> impl Future<Output = Result<CodeCheck, StoreError>> + Send;

    /// Issues a fresh registration token, replacing any pending one.
    fn issue_registration_token(
        &self,
        identity: &PlayerIdentity,
    ) -> impl Future<Output = Result<String, StoreError>> + Send;
}

// ---------------------------------------------------------------------------
// MemoryCredentialStore
// ---------------------------------------------------------------------------

/// Settings for issued credentials.
#[derive(Debug, Clone)]
pub struct CredentialConfig {
    /// Digits in a one-time code. Default: 6.
    pub code_length: usize,
    /// Lifetime of codes and registration tokens. Default: 30 minutes.
    pub ttl: Duration,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone)]
struct Account {
    secret: String,
    verified: bool,
}

#[derive(Debug, Clone)]
struct Pending {
    value: String,
    expires_at: Instant,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<PlayerId, Account>,
    codes: HashMap<PlayerId, Pending>,
    tokens: HashMap<PlayerId, Pending>,
}

/// An in-memory [`CredentialStore`].
///
/// Accepting a one-time code also marks the identity's account as
/// verified (creating it if needed), which is what completing
/// registration looks like from the game's side.
pub struct MemoryCredentialStore {
    config: CredentialConfig,
    inner: Mutex<Inner>,
    available: AtomicBool,
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new(CredentialConfig::default())
    }
}

impl MemoryCredentialStore {
    /// Creates an empty, reachable store.
    pub fn new(config: CredentialConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner::default()),
            available: AtomicBool::new(true),
        }
    }

    /// Adds (or replaces) an account.
    pub fn add_account(&self, id: PlayerId, secret: impl Into<String>, verified: bool) {
        self.inner.lock().accounts.insert(
            id,
            Account {
                secret: secret.into(),
                verified,
            },
        );
    }

    /// Simulates the store going down (`false`) or coming back.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// The code currently pending for `id`, expired or not.
    pub fn pending_code(&self, id: &PlayerId) -> Option<String> {
        self.inner.lock().codes.get(id).map(|p| p.value.clone())
    }

    /// The registration token currently pending for `id`.
    pub fn pending_token(&self, id: &PlayerId) -> Option<String> {
        self.inner.lock().tokens.get(id).map(|p| p.value.clone())
    }

    /// Drops every expired code and token. Returns how many went.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        let before = inner.codes.len() + inner.tokens.len();
        inner.codes.retain(|_, p| p.expires_at > now);
        inner.tokens.retain(|_, p| p.expires_at > now);
        before - inner.codes.len() - inner.tokens.len()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store offline".into()))
        }
    }

    fn pending(&self, value: String) -> Pending {
        Pending {
            value,
            expires_at: Instant::now() + self.config.ttl,
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }

    async fn identity_exists(&self, identity: &PlayerIdentity) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self.inner.lock().accounts.contains_key(&identity.id))
    }

    async fn is_verified(&self, identity: &PlayerIdentity) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .accounts
            .get(&identity.id)
            .is_some_and(|a| a.verified))
    }

    async fn verify_long_lived_secret(
        &self,
        identity: &PlayerIdentity,
        secret: &str,
    ) -> Result<bool, StoreError> {
        self.check_available()?;
        Ok(self
            .inner
            .lock()
            .accounts
            .get(&identity.id)
            .is_some_and(|a| !a.secret.is_empty() && a.secret == secret))
    }

    async fn issue_one_time_code(&self, identity: &PlayerIdentity) -> Result<String, StoreError> {
        self.check_available()?;
        let code = generate_code(self.config.code_length);
        let pending = self.pending(code.clone());
        self.inner.lock().codes.insert(identity.id, pending);
        tracing::debug!(player_id = %identity.id, "one-time code issued");
        Ok(code)
    }

    async fn verify_and_consume_one_time_code(
        &self,
        identity: &PlayerIdentity,
        code: &str,
    ) -> Result<CodeCheck, StoreError> {
        self.check_available()?;
        let mut inner = self.inner.lock();
        let Some(pending) = inner.codes.get(&identity.id) else {
            return Ok(CodeCheck::NoPendingCode);
        };
        if pending.expires_at <= Instant::now() {
            inner.codes.remove(&identity.id);
            return Ok(CodeCheck::Expired);
        }
        if pending.value != code {
            return Ok(CodeCheck::Rejected);
        }

        inner.codes.remove(&identity.id);
        inner.tokens.remove(&identity.id);
        inner
            .accounts
            .entry(identity.id)
            .or_insert_with(|| Account {
                secret: String::new(),
                verified: false,
            })
            .verified = true;
        Ok(CodeCheck::Accepted)
    }

    async fn issue_registration_token(
        &self,
        identity: &PlayerIdentity,
    ) -> Result<String, StoreError> {
        self.check_available()?;
        let token = generate_token();
        let pending = self.pending(token.clone());
        self.inner.lock().tokens.insert(identity.id, pending);
        Ok(token)
    }
}

/// A zero-padded numeric code of `len` digits.
fn generate_code(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect()
}

/// A random 32-character hex string (128 bits of entropy).
fn generate_token() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alex() -> PlayerIdentity {
        PlayerIdentity::new(PlayerId::random(), "Alex")
    }

    #[test]
    fn test_generate_code_is_all_digits_of_requested_length() {
        for len in [4, 6, 8] {
            let code = generate_code(len);
            assert_eq!(code.len(), len);
            assert!(code.bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_generate_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.bytes().all(|b| b.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_verify_and_consume_code_only_once() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        let code = store.issue_one_time_code(&who).await.unwrap();

        let first = store.verify_and_consume_one_time_code(&who, &code).await;
        let second = store.verify_and_consume_one_time_code(&who, &code).await;
        assert_eq!(first.unwrap(), CodeCheck::Accepted);
        assert_eq!(second.unwrap(), CodeCheck::NoPendingCode);
    }

    #[tokio::test]
    async fn test_verify_code_wrong_value_is_rejected_and_kept() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        let code = store.issue_one_time_code(&who).await.unwrap();
        let wrong = if code == "000000" { "111111" } else { "000000" };

        let result = store.verify_and_consume_one_time_code(&who, wrong).await;
        assert_eq!(result.unwrap(), CodeCheck::Rejected);
        assert_eq!(store.pending_code(&who.id), Some(code));
    }

    #[tokio::test(start_paused = true)]
    async fn test_verify_code_after_ttl_is_expired() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        let code = store.issue_one_time_code(&who).await.unwrap();

        tokio::time::advance(Duration::from_secs(30 * 60)).await;
        let result = store.verify_and_consume_one_time_code(&who, &code).await;
        assert_eq!(result.unwrap(), CodeCheck::Expired);
        assert_eq!(store.pending_code(&who.id), None);
    }

    #[tokio::test]
    async fn test_issue_code_replaces_outstanding_code() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        let first = store.issue_one_time_code(&who).await.unwrap();
        let second = store.issue_one_time_code(&who).await.unwrap();

        assert_eq!(store.pending_code(&who.id), Some(second.clone()));
        if first != second {
            let old = store.verify_and_consume_one_time_code(&who, &first).await;
            assert_eq!(old.unwrap(), CodeCheck::Rejected);
        }
    }

    #[tokio::test]
    async fn test_accepted_code_marks_account_verified() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        assert!(!store.identity_exists(&who).await.unwrap());

        let code = store.issue_one_time_code(&who).await.unwrap();
        store.verify_and_consume_one_time_code(&who, &code).await.unwrap();

        assert!(store.identity_exists(&who).await.unwrap());
        assert!(store.is_verified(&who).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_secret_checks_account() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        store.add_account(who.id, "hunter2", true);

        assert!(store.verify_long_lived_secret(&who, "hunter2").await.unwrap());
        assert!(!store.verify_long_lived_secret(&who, "hunter3").await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_secret_never_matches_unset_password() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        let code = store.issue_one_time_code(&who).await.unwrap();
        store.verify_and_consume_one_time_code(&who, &code).await.unwrap();

        assert!(!store.verify_long_lived_secret(&who, "").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        store.set_available(false);

        assert!(store.ping().await.is_err());
        assert!(store.identity_exists(&who).await.is_err());
        assert!(store.issue_registration_token(&who).await.is_err());

        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_expired_drops_old_codes_and_tokens() {
        let store = MemoryCredentialStore::default();
        let who = alex();
        store.issue_one_time_code(&who).await.unwrap();
        store.issue_registration_token(&who).await.unwrap();

        assert_eq!(store.cleanup_expired(), 0);
        tokio::time::advance(Duration::from_secs(31 * 60)).await;
        assert_eq!(store.cleanup_expired(), 2);
        assert_eq!(store.pending_token(&who.id), None);
    }
}
