//! Authorizer configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for a [`DecryptionAuthorizer`](crate::DecryptionAuthorizer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizerConfig {
    /// How long a newly issued grant stays valid.
    pub grant_ttl: Duration,
    /// How long to wait for the signer.
    pub sign_timeout: Duration,
    /// How long to wait for the decryption service.
    pub decrypt_timeout: Duration,
}

impl AuthorizerConfig {
    /// Grant lifetime in milliseconds, saturating.
    pub fn grant_ttl_millis(&self) -> i64 {
        i64::try_from(self.grant_ttl.as_millis()).unwrap_or(i64::MAX)
    }
}

impl Default for AuthorizerConfig {
    fn default() -> Self {
        Self {
            grant_ttl: Duration::from_secs(365 * 24 * 60 * 60),
            sign_timeout: Duration::from_secs(60),
            decrypt_timeout: Duration::from_secs(30),
        }
    }
}
