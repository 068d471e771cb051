//! Login and registration against the credential store.
//!
//! [`LoginFlow`] asks the [`CredentialStore`] the questions and returns a
//! verdict. It never touches authentication state: the node applies the
//! verdict on its main loop, so a failed attempt mutates nothing.
//!
//! A credential is tried as a one-time code first when it has the exact
//! shape of one (all digits, the configured length). If no code is pending
//! it is tried as the player's password instead, so a numeric password
//! still works.

use std::sync::Arc;

use gatehouse_protocol::PlayerIdentity;
use gatehouse_session::{AuthError, CodeCheck, CredentialStore};

/// Which kind of credential got the player in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialKind {
    OneTimeCode,
    Secret,
}

/// Result of a successful `/login`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    /// The player is now authenticated.
    Authenticated(CredentialKind),
    /// Nothing to do; they already were.
    AlreadyAuthenticated,
}

/// Result of a successful `/register`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// Fresh credentials were issued. Any earlier ones are now void.
    Issued {
        /// Type this in game as `/login <code>`.
        code: String,
        /// Finish registering on the website.
        link: String,
    },
    /// The account is already verified; use `/login`.
    AlreadyRegistered,
}

/// The credential-checking half of login and registration.
pub struct LoginFlow<S: CredentialStore> {
    store: Arc<S>,
    code_length: usize,
    website_url: String,
}

impl<S: CredentialStore> LoginFlow<S> {
    pub fn new(store: Arc<S>, code_length: usize, website_url: impl Into<String>) -> Self {
        Self {
            store,
            code_length,
            website_url: website_url.into(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Whether `credential` has the shape of a one-time code.
    pub fn looks_like_code(&self, credential: &str) -> bool {
        credential.len() == self.code_length && credential.bytes().all(|b| b.is_ascii_digit())
    }

    /// Checks `credential` for `identity`.
    ///
    /// A matching one-time code is consumed by this call.
    ///
    /// # Errors
    /// - [`AuthError::CredentialInvalid`]: wrong code, wrong password, or
    ///   nothing typed at all
    /// - [`AuthError::CredentialExpired`]: the pending code timed out
    /// - [`AuthError::IdentityNotRegistered`]: no account and no code
    /// - [`AuthError::StoreUnavailable`]: the store didn't answer
    pub async fn verify(
        &self,
        identity: &PlayerIdentity,
        credential: &str,
    ) -> Result<CredentialKind, AuthError> {
        if credential.trim().is_empty() {
            return Err(AuthError::CredentialInvalid);
        }
        if self.looks_like_code(credential) {
            match self
                .store
                .verify_and_consume_one_time_code(identity, credential)
                .await?
            {
                CodeCheck::Accepted => return Ok(CredentialKind::OneTimeCode),
                CodeCheck::Rejected => return Err(AuthError::CredentialInvalid),
                CodeCheck::Expired => return Err(AuthError::CredentialExpired),
                CodeCheck::NoPendingCode => {}
            }
        }

        if !self.store.identity_exists(identity).await? {
            return Err(AuthError::IdentityNotRegistered(identity.id));
        }
        if self.store.verify_long_lived_secret(identity, credential).await? {
            Ok(CredentialKind::Secret)
        } else {
            Err(AuthError::CredentialInvalid)
        }
    }

    /// Issues a registration token and a one-time code for `identity`.
    pub async fn register(&self, identity: &PlayerIdentity) -> Result<RegisterOutcome, AuthError> {
        if self.store.is_verified(identity).await? {
            return Ok(RegisterOutcome::AlreadyRegistered);
        }
        let token = self.store.issue_registration_token(identity).await?;
        let code = self.store.issue_one_time_code(identity).await?;
        Ok(RegisterOutcome::Issued {
            code,
            link: self.registration_link(&token),
        })
    }

    /// Whether `identity` has an account, for choosing the login or
    /// register hint.
    pub async fn is_registered(&self, identity: &PlayerIdentity) -> Result<bool, AuthError> {
        Ok(self.store.identity_exists(identity).await?)
    }

    /// The website link carrying a registration token.
    pub fn registration_link(&self, token: &str) -> String {
        format!("{}/register?token={token}", self.website_url)
    }
}
