//! Configuration for the registry, the orchestrator, and the client session.
//!
//! Every struct here deserializes from JSON so a host can keep its settings
//! in a file. Missing fields fall back to [`Default`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use cipherdrop_core::{FheType, Identity, StorageLocation};

pub use cipherdrop_authz::AuthorizerConfig;

/// Configuration for a [`Registry`](crate::Registry).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Where this registry lives.
    pub location: StorageLocation,
    /// Keys whose input proofs the registry accepts.
    #[serde(default)]
    pub trusted_input_verifiers: Vec<Identity>,
}

impl RegistryConfig {
    /// A registry at `location` that trusts no verifier yet.
    pub fn new(location: StorageLocation) -> Self {
        Self {
            location,
            trusted_input_verifiers: Vec::new(),
        }
    }

    /// Trust proofs signed by `verifier`.
    pub fn with_verifier(mut self, verifier: Identity) -> Self {
        if !self.trusted_input_verifiers.contains(&verifier) {
            self.trusted_input_verifiers.push(verifier);
        }
        self
    }
}

/// Configuration for a [`RegistrationOrchestrator`](crate::RegistrationOrchestrator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// How long to wait for a registry state read.
    pub read_timeout: Duration,
    /// How long to wait for the executor to accept a transaction.
    pub submit_timeout: Duration,
    /// How long to wait for a submitted transaction to confirm.
    pub confirm_timeout: Duration,
    /// The encrypted type plaintexts are encoded as.
    pub fhe_type: FheType,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            submit_timeout: Duration::from_secs(30),
            confirm_timeout: Duration::from_secs(120),
            fhe_type: FheType::Uint32,
        }
    }
}

/// Settings for one client session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Decryption authorization.
    pub authorizer: AuthorizerConfig,
    /// Registration submission.
    pub orchestrator: OrchestratorConfig,
}

impl ClientConfig {
    /// Parse from a JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.orchestrator.fhe_type, FheType::Uint32);
        assert_eq!(config.orchestrator.confirm_timeout, Duration::from_secs(120));
        assert_eq!(config.orchestrator.read_timeout, Duration::from_secs(30));
        assert_eq!(config.authorizer.sign_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_partial_json() {
        let config = ClientConfig::from_json(
            r#"{"orchestrator":{"fhe_type":"Uint8"},"authorizer":{"grant_ttl":{"secs":60,"nanos":0}}}"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.fhe_type, FheType::Uint8);
        assert_eq!(config.orchestrator.submit_timeout, Duration::from_secs(30));
        assert_eq!(config.orchestrator.read_timeout, Duration::from_secs(30));
        assert_eq!(config.authorizer.grant_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_read_timeout_from_json() {
        let config = ClientConfig::from_json(
            r#"{"orchestrator":{"read_timeout":{"secs":2,"nanos":0}}}"#,
        )
        .unwrap();

        assert_eq!(config.orchestrator.read_timeout, Duration::from_secs(2));
        assert_eq!(config.orchestrator.confirm_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_registry_config_dedups_verifiers() {
        let verifier = Identity::from_bytes([4; 32]);
        let config = RegistryConfig::new(StorageLocation::from_bytes([1; 20]))
            .with_verifier(verifier)
            .with_verifier(verifier);

        assert_eq!(config.trusted_input_verifiers, vec![verifier]);
    }

    #[test]
    fn test_registry_config_json_roundtrip() {
        let config = RegistryConfig::new(StorageLocation::from_bytes([1; 20]))
            .with_verifier(Identity::from_bytes([4; 32]));

        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(serde_json::from_str::<RegistryConfig>(&json).unwrap(), config);
    }
}
