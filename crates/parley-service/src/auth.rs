//! External identity-provider boundary.
//!
//! Credential storage and verification mechanics are delegated to a
//! provider; the core only keeps the opaque verifier it hands back.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use uuid::Uuid;

use parley_shared::error::AuthError;
use parley_shared::types::UserId;

/// What the provider hands back for a new account.
#[derive(Debug, Clone)]
pub struct ProviderCredential {
    /// Provider-assigned opaque id; becomes the user's stable id.
    pub id: UserId,
    /// Opaque verifier to persist on the user record.
    pub verifier: String,
}

/// The credential collaborator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Create a provider account and return its id and opaque verifier.
    async fn create_account(
        &self,
        username: &str,
        password: &str,
    ) -> Result<ProviderCredential, AuthError>;

    /// Check a password against a stored verifier.
    async fn verify_credentials(&self, verifier: &str, password: &str)
        -> Result<bool, AuthError>;
}

/// Default provider: Argon2id password hashing, ids minted locally.
#[derive(Debug, Clone, Default)]
pub struct ArgonAuthenticator;

impl ArgonAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for ArgonAuthenticator {
    async fn create_account(
        &self,
        _username: &str,
        password: &str,
    ) -> Result<ProviderCredential, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let verifier = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Provider(format!("password hashing failed: {e}")))?
            .to_string();

        Ok(ProviderCredential {
            id: UserId(Uuid::new_v4().to_string()),
            verifier,
        })
    }

    async fn verify_credentials(
        &self,
        verifier: &str,
        password: &str,
    ) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(verifier)
            .map_err(|e| AuthError::Provider(format!("stored verifier unreadable: {e}")))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }
}
