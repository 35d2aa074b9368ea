// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Configuration Management
//!
//! This module loads, validates and saves the YAML configuration of the token
//! service. A configuration file is validated in three passes:
//!
//! 1. against the JSON schema embedded from `resources/config.schema.json`
//! 2. by deserializing it into [`Config`]
//! 3. by [`Config::validate_specific_rules`], which parses every key
//!
//! When a pass fails, a `<name>.sample.yaml` file holding the defaults is
//! written next to the configuration so it can be used as a starting point.
//!
//! ## Configuration Structure
//!
//! - `token`: issuance policy (issuer, lifetime, encryption, clock skew)
//! - `keys`: RSA key records, see [`KeyConfig`]
//!
//! ## Usage
//!
//! ```no_run
//! use rust_jose_tokens::config::Config;
//!
//! // Load config from file, creates a default if not found
//! let config = Config::from_file("config.yaml").unwrap();
//! let key_store = config.key_store().unwrap();
//!
//! println!("Issuer: {:?}", config.token.issuer);
//! ```

use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Duration;
use log::{debug, error, warn};
use serde::{Deserialize, Serialize};

use crate::security::jwk::Jwk;
use crate::security::key::pem;
use crate::security::key::{Key, KeyUse, MemoryKeyStore};

/// Token issuance policy
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct TokenConfig {
    /// Value of the `iss` claim; when set, decoded tokens must carry it too
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// Access token lifetime in seconds
    #[serde(default = "default_access_token_ttl")]
    pub access_token_ttl: u64,

    /// Encrypt issued tokens for the key named by `key_id`
    #[serde(default = "default_jwe_enabled")]
    pub jwe_enabled: bool,

    /// `kid` of the encryption key, required when `jwe_enabled` is set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    /// Tolerance in seconds applied to `exp` and `nbf` checks
    #[serde(default)]
    pub clock_skew: u64,
}

impl TokenConfig {
    pub fn access_token_lifetime(&self) -> Duration {
        seconds(self.access_token_ttl)
    }

    pub fn clock_skew_tolerance(&self) -> Duration {
        seconds(self.clock_skew)
    }
}

fn seconds(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            access_token_ttl: default_access_token_ttl(),
            jwe_enabled: default_jwe_enabled(),
            key_id: Some(DEFAULT_ENCRYPTION_KID.to_string()),
            clock_skew: 0,
        }
    }
}

/// Provides the default access token lifetime: one hour
fn default_access_token_ttl() -> u64 {
    3600
}

fn default_jwe_enabled() -> bool {
    true
}

fn default_key_type() -> String {
    Key::RSA.to_string()
}

fn default_active() -> bool {
    true
}

/// One stored key
///
/// Key material is the base64 body of a PEM document; the armor lines may be
/// kept. Public keys are X.509 SubjectPublicKeyInfo, private keys PKCS#8.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct KeyConfig {
    /// Storage identifier, unique across all keys
    pub id: String,

    #[serde(rename = "type", default = "default_key_type")]
    pub key_type: String,

    pub algorithm: String,

    pub public_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,

    pub kid: String,

    #[serde(rename = "use")]
    pub key_use: KeyUse,
}

impl KeyConfig {
    /// Decodes the key material into a [`Key`] record
    pub fn to_key(&self) -> Result<Key> {
        let public_key = pem::decode_body(&self.public_key)
            .with_context(|| format!("Public key of '{}' is not valid base64", self.id))?;

        let mut key = Key::new(&self.id, &self.kid, self.key_use, &self.algorithm, public_key)
            .with_key_type(&self.key_type)
            .with_active(self.active);

        if let Some(private_key) = &self.private_key {
            let private_key = pem::decode_body(private_key)
                .with_context(|| format!("Private key of '{}' is not valid base64", self.id))?;
            key = key.with_private_key(private_key);
        }
        Ok(key)
    }
}

const DEFAULT_SIGNING_KID: &str = "default-signing";
const DEFAULT_ENCRYPTION_KID: &str = "default-encryption";

/// Development keys embedded at build time
fn default_keys() -> Vec<KeyConfig> {
    vec![
        KeyConfig {
            id: "default-signing-key".to_string(),
            key_type: default_key_type(),
            algorithm: "RS256".to_string(),
            public_key: pem::strip_armor(include_str!("../resources/default_signing.pub")),
            private_key: Some(pem::strip_armor(include_str!("../resources/default_signing.key"))),
            active: true,
            kid: DEFAULT_SIGNING_KID.to_string(),
            key_use: KeyUse::Signature,
        },
        KeyConfig {
            id: "default-encryption-key".to_string(),
            key_type: default_key_type(),
            algorithm: "RSA-OAEP-256".to_string(),
            public_key: pem::strip_armor(include_str!("../resources/default_encryption.pub")),
            private_key: Some(pem::strip_armor(include_str!("../resources/default_encryption.key"))),
            active: true,
            kid: DEFAULT_ENCRYPTION_KID.to_string(),
            key_use: KeyUse::Encryption,
        },
    ]
}

/// Root configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub token: TokenConfig,

    #[serde(default)]
    pub keys: Vec<KeyConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: TokenConfig::default(),
            keys: default_keys(),
        }
    }
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create directory for sample config at {:?}", parent)
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    ///
    /// A missing file is created with the default configuration, which is
    /// then returned.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read or parsed, violates the schema, or
    /// breaks one of the rules of [`Config::validate_specific_rules`].
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("Configuration file not found at {:?}, creating default", path);
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = serde_json::to_value(&yaml_value)
            .context("Failed to convert YAML to JSON for validation")?;

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        let config: Config = match serde_yml::from_str(&contents) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = Self::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Builds an in-memory key store holding every configured key
    pub fn key_store(&self) -> Result<MemoryKeyStore> {
        let keys = self
            .keys
            .iter()
            .map(KeyConfig::to_key)
            .collect::<Result<Vec<_>>>()?;
        Ok(MemoryKeyStore::with_keys(keys))
    }

    /// Rules the schema cannot express
    ///
    /// - **Lifetime**: the access token TTL is strictly positive
    /// - **Keys**: every key decodes and parses as a matching RSA key pair
    /// - **Identifiers**: `id` is unique, `kid` is unique among keys with the same `use`
    /// - **Encryption**: with JWE enabled, `key_id` names an active encryption key
    pub fn validate_specific_rules(config: &Config) -> Result<()> {
        debug!("Performing additional validation checks");

        if config.token.access_token_ttl == 0 {
            anyhow::bail!("Access token TTL must be greater than zero");
        }

        let mut ids = HashSet::new();
        let mut kids = HashSet::new();
        for key_config in &config.keys {
            if !ids.insert(key_config.id.as_str()) {
                anyhow::bail!("Duplicate key id '{}'", key_config.id);
            }
            if !kids.insert((key_config.kid.as_str(), key_config.key_use)) {
                anyhow::bail!(
                    "Duplicate kid '{}' for use '{}'",
                    key_config.kid,
                    key_config.key_use
                );
            }

            let key = key_config.to_key()?;
            Jwk::try_from(&key).with_context(|| format!("Key '{}' is not usable", key_config.id))?;
        }

        if !config
            .keys
            .iter()
            .any(|key| key.active && key.key_use == KeyUse::Signature)
        {
            warn!("No active signing key is configured, tokens cannot be issued");
        }

        if config.token.jwe_enabled {
            let kid = config
                .token
                .key_id
                .as_deref()
                .context("JWE is enabled but token.key_id is not set")?;
            let key = config
                .keys
                .iter()
                .find(|key| key.kid == kid && key.key_use == KeyUse::Encryption)
                .with_context(|| format!("No encryption key with kid '{}' is configured", kid))?;
            if !key.active {
                anyhow::bail!("The encryption key '{}' is not active", kid);
            }
        }

        Ok(())
    }
}

/// JSON schema of the configuration file
pub const CONFIG_SCHEMA: &str = include_str!("../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_jose_tokens --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;

    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::key::KeyStore;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();

        assert!(Config::validate_specific_rules(&config).is_ok());
        assert_eq!(config.token.access_token_ttl, 3600);
        assert!(config.token.jwe_enabled);
        assert_eq!(config.token.key_id.as_deref(), Some(DEFAULT_ENCRYPTION_KID));
        assert_eq!(config.token.access_token_lifetime(), Duration::hours(1));
        assert_eq!(config.token.clock_skew_tolerance(), Duration::zero());
    }

    #[test]
    fn test_default_key_store() {
        let store = Config::default().key_store().unwrap();

        assert_eq!(store.len(), 2);
        let signing = store.find_all().unwrap();
        assert_eq!(signing.len(), 1);
        assert_eq!(signing[0].kid(), DEFAULT_SIGNING_KID);
        assert!(store.find_by_kid(DEFAULT_ENCRYPTION_KID).unwrap().is_some());
    }

    #[test]
    fn test_rules_reject_bad_configurations() {
        let mut config = Config::default();
        config.token.access_token_ttl = 0;
        assert!(Config::validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.token.key_id = None;
        assert!(Config::validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.keys[1].active = false;
        assert!(Config::validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.keys[1].kid = DEFAULT_SIGNING_KID.to_string();
        config.token.key_id = Some(DEFAULT_SIGNING_KID.to_string());
        assert!(Config::validate_specific_rules(&config).is_ok());

        let mut config = Config::default();
        let duplicate = config.keys[0].clone();
        config.keys.push(KeyConfig {
            id: "other".to_string(),
            ..duplicate
        });
        assert!(Config::validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.keys[0].public_key = "%%%".to_string();
        assert!(Config::validate_specific_rules(&config).is_err());

        let mut config = Config::default();
        config.keys[0].private_key = config.keys[1].private_key.clone();
        assert!(Config::validate_specific_rules(&config).is_err());
    }

    #[test]
    fn test_jwe_disabled_needs_no_encryption_key() {
        let mut config = Config::default();
        config.token.jwe_enabled = false;
        config.token.key_id = None;
        config.keys.truncate(1);

        assert!(Config::validate_specific_rules(&config).is_ok());
    }

    #[test]
    fn test_key_config_accepts_armored_material() {
        let mut key_config = Config::default().keys.remove(0);
        key_config.public_key = include_str!("../resources/default_signing.pub").to_string();

        let key = key_config.to_key().unwrap();
        assert!(Jwk::try_from(&key).is_ok());
    }
}
