//! Core configuration loaded from environment variables.
//!
//! All settings have development defaults so a local session can start
//! with zero configuration.

use std::time::Duration;

use parley_shared::constants::DEFAULT_CONNECT_TIMEOUT_SECS;
use parley_shared::envelope::Envelope;
use parley_service::identity::OperatorCredentials;

/// Session configuration.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// Username of the synthetic operator identity.
    /// Env: `PARLEY_OPERATOR_USER`
    /// Default: `admin` (development only).
    pub operator_username: String,

    /// Password of the synthetic operator identity.
    /// Env: `PARLEY_OPERATOR_PASS`
    /// Default: `admin` (development only).
    pub operator_password: String,

    /// Shared secret the message envelope key is derived from.
    /// Env: `PARLEY_SHARED_SECRET`
    /// Default: `parley-dev-secret` (development only).
    pub shared_secret: String,

    /// Timeout applied to store calls made while establishing a session.
    /// Env: `PARLEY_CONNECT_TIMEOUT_SECS`
    /// Default: 5 seconds.
    pub connect_timeout: Duration,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            operator_username: "admin".to_string(),
            operator_password: "admin".to_string(),
            shared_secret: "parley-dev-secret".to_string(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
        }
    }
}

impl CoreConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(user) = std::env::var("PARLEY_OPERATOR_USER") {
            config.operator_username = user;
        }

        if let Ok(pass) = std::env::var("PARLEY_OPERATOR_PASS") {
            config.operator_password = pass;
        }

        if let Ok(secret) = std::env::var("PARLEY_SHARED_SECRET") {
            config.shared_secret = secret;
        }

        if let Ok(val) = std::env::var("PARLEY_CONNECT_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) => config.connect_timeout = Duration::from_secs(secs),
                Err(_) => {
                    tracing::warn!(
                        value = %val,
                        "Invalid PARLEY_CONNECT_TIMEOUT_SECS, using default"
                    );
                }
            }
        }

        config
    }

    /// The fixed pair the operator identity authenticates with.
    pub fn operator_credentials(&self) -> OperatorCredentials {
        OperatorCredentials {
            username: self.operator_username.clone(),
            password: self.operator_password.clone(),
        }
    }

    /// The content envelope derived from the shared secret.
    pub fn envelope(&self) -> Envelope {
        Envelope::from_secret(&self.shared_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CoreConfig::default();
        assert_eq!(config.operator_username, "admin");
        assert_eq!(config.connect_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_operator_credentials_mapping() {
        let config = CoreConfig {
            operator_username: "root".into(),
            operator_password: "sesame".into(),
            ..CoreConfig::default()
        };

        let creds = config.operator_credentials();
        assert_eq!(creds.username, "root");
        assert_eq!(creds.password, "sesame");
    }
}
