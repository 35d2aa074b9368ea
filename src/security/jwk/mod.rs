// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # JSON Web Keys
//!
//! This module turns stored [`Key`] records into structured RSA keys usable
//! for signing, verification and JWE key unwrapping, and exposes the pieces
//! the encoder and decoder use to find the right key for a token:
//!
//! * [`Jwk`] - parsed RSA key pair plus JOSE metadata (`kid`, `use`, `alg`)
//! * [`matcher::JwkMatcher`] - selection criteria built from a JOSE header
//! * [`selector::KeySelector`] - source of candidate keys for a matcher
//! * [`JwkSet`] - public JWKS export of the signing keys
//!
//! ## Example
//!
//! ```rust,no_run
//! use rust_jose_tokens::security::jwk::{JwkSet, Jwk};
//! use rust_jose_tokens::security::key::{Key, KeyStore, KeyUse, MemoryKeyStore};
//!
//! let public_pem = std::fs::read_to_string("signing.pub").unwrap();
//! let key = Key::from_pem("1", "main", KeyUse::Signature, "RS256", &public_pem, None).unwrap();
//! let jwk = Jwk::try_from(&key).unwrap();
//! println!("thumbprint: {}", jwk.thumbprint());
//!
//! let store = MemoryKeyStore::with_keys([key]);
//! let jwks = JwkSet::from_store(&store).unwrap();
//! println!("{}", serde_json::to_string_pretty(&jwks).unwrap());
//! ```

pub mod matcher;
pub mod selector;

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::jwk as jose;
use jsonwebtoken::{DecodingKey, EncodingKey};
use log::warn;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::sha2::{Digest, Sha256};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::{KeyError, KeyStoreError};
use crate::security::key::{Key, KeyStore, KeyUse};

pub use matcher::{AlgorithmFamily, JwkMatcher};
pub use selector::{KeySelector, StoreKeySelector};

/// JOSE key families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyType {
    Rsa,
    Ec,
    /// Octet sequence, the family of HMAC secrets
    Oct,
}

impl KeyType {
    /// JOSE `kty` parameter value
    pub fn identifier(&self) -> &'static str {
        match self {
            KeyType::Rsa => "RSA",
            KeyType::Ec => "EC",
            KeyType::Oct => "oct",
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for KeyType {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            s if s.eq_ignore_ascii_case("RSA") => Ok(KeyType::Rsa),
            s if s.eq_ignore_ascii_case("EC") => Ok(KeyType::Ec),
            s if s.eq_ignore_ascii_case("oct") => Ok(KeyType::Oct),
            other => Err(KeyError::UnsupportedKeyType(other.to_string())),
        }
    }
}

/// Structured RSA key with its JOSE metadata
///
/// The private half is optional: verify-only and encrypt-only keys carry the
/// public half alone.
#[derive(Clone)]
pub struct Jwk {
    public_key: RsaPublicKey,
    private_key: Option<RsaPrivateKey>,
    key_id: Option<String>,
    key_use: Option<KeyUse>,
    algorithm: Option<String>,
    x509_sha256_thumbprint: Option<String>,
}

impl Jwk {
    pub fn from_rsa(public_key: RsaPublicKey) -> Self {
        Self {
            public_key,
            private_key: None,
            key_id: None,
            key_use: None,
            algorithm: None,
            x509_sha256_thumbprint: None,
        }
    }

    /// Attaches the private half
    ///
    /// # Errors
    ///
    /// [`KeyError::MismatchedKeyPair`] if the private key does not belong to
    /// the public key already held.
    pub fn with_private_key(mut self, private_key: RsaPrivateKey) -> Result<Self, KeyError> {
        if private_key.to_public_key() != self.public_key {
            return Err(KeyError::MismatchedKeyPair {
                kid: self.key_id.clone().unwrap_or_default(),
            });
        }
        self.private_key = Some(private_key);
        Ok(self)
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }

    pub fn with_key_use(mut self, key_use: KeyUse) -> Self {
        self.key_use = Some(key_use);
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl Into<String>) -> Self {
        self.algorithm = Some(algorithm.into());
        self
    }

    pub fn with_x509_sha256_thumbprint(mut self, thumbprint: impl Into<String>) -> Self {
        self.x509_sha256_thumbprint = Some(thumbprint.into());
        self
    }

    pub fn key_type(&self) -> KeyType {
        KeyType::Rsa
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn key_use(&self) -> Option<KeyUse> {
        self.key_use
    }

    pub fn algorithm(&self) -> Option<&str> {
        self.algorithm.as_deref()
    }

    pub fn x509_sha256_thumbprint(&self) -> Option<&str> {
        self.x509_sha256_thumbprint.as_deref()
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&RsaPrivateKey> {
        self.private_key.as_ref()
    }

    pub fn is_private(&self) -> bool {
        self.private_key.is_some()
    }

    /// Base64url encoded modulus
    pub fn modulus(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.public_key.n().to_bytes_be())
    }

    /// Base64url encoded public exponent
    pub fn exponent(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.public_key.e().to_bytes_be())
    }

    /// RFC 7638 SHA-256 thumbprint of the public key
    ///
    /// The canonical JSON only contains the required members in
    /// lexicographic order: `e`, `kty`, `n`.
    pub fn thumbprint(&self) -> String {
        let canonical = json!({
            "e": self.exponent(),
            "kty": "RSA",
            "n": self.modulus(),
        });

        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    }

    /// Verification key for `jsonwebtoken`
    pub fn decoding_key(&self) -> Result<DecodingKey, jsonwebtoken::errors::Error> {
        DecodingKey::from_rsa_components(&self.modulus(), &self.exponent())
    }

    /// Signing key for `jsonwebtoken`, `None` for public-only keys
    pub fn encoding_key(&self) -> Option<Result<EncodingKey, KeyError>> {
        self.private_key.as_ref().map(|private_key| {
            let der = private_key
                .to_pkcs1_der()
                .map_err(|e| KeyError::InvalidPrivateKey {
                    kid: self.key_id.clone().unwrap_or_default(),
                    reason: e.to_string(),
                })?;
            Ok(EncodingKey::from_rsa_der(der.as_bytes()))
        })
    }

    /// Public JWK document; private parameters are never included
    pub fn to_public_jwk(&self) -> jose::Jwk {
        jose::Jwk {
            common: jose::CommonParameters {
                public_key_use: self.key_use.map(|key_use| match key_use {
                    KeyUse::Signature => jose::PublicKeyUse::Signature,
                    KeyUse::Encryption => jose::PublicKeyUse::Encryption,
                }),
                key_algorithm: self.algorithm.as_deref().and_then(key_algorithm),
                key_id: self.key_id.clone(),
                x509_sha256_fingerprint: self.x509_sha256_thumbprint.clone(),
                ..Default::default()
            },
            algorithm: jose::AlgorithmParameters::RSA(jose::RSAKeyParameters {
                key_type: jose::RSAKeyType::RSA,
                n: self.modulus(),
                e: self.exponent(),
            }),
        }
    }
}

fn key_algorithm(name: &str) -> Option<jose::KeyAlgorithm> {
    let algorithm = match name {
        "RS256" => jose::KeyAlgorithm::RS256,
        "RS384" => jose::KeyAlgorithm::RS384,
        "RS512" => jose::KeyAlgorithm::RS512,
        "PS256" => jose::KeyAlgorithm::PS256,
        "PS384" => jose::KeyAlgorithm::PS384,
        "PS512" => jose::KeyAlgorithm::PS512,
        "RSA-OAEP" => jose::KeyAlgorithm::RSA_OAEP,
        "RSA-OAEP-256" => jose::KeyAlgorithm::RSA_OAEP_256,
        _ => return None,
    };
    Some(algorithm)
}

impl fmt::Debug for Jwk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Jwk")
            .field("key_type", &self.key_type())
            .field("key_id", &self.key_id)
            .field("key_use", &self.key_use)
            .field("algorithm", &self.algorithm)
            .field("x509_sha256_thumbprint", &self.x509_sha256_thumbprint)
            .field("private_key", &self.private_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl TryFrom<&Key> for Jwk {
    type Error = KeyError;

    /// Parses the stored DER material
    ///
    /// Fails fast when the record is not an RSA key, when the public key is
    /// absent or malformed, or when the private key does not match it.
    fn try_from(key: &Key) -> Result<Self, Self::Error> {
        if KeyType::from_str(key.key_type())? != KeyType::Rsa {
            return Err(KeyError::UnsupportedKeyType(key.key_type().to_string()));
        }
        if key.public_key().is_empty() {
            return Err(KeyError::MissingPublicKey {
                kid: key.kid().to_string(),
            });
        }

        let public_key = RsaPublicKey::from_public_key_der(key.public_key())
            .or_else(|_| RsaPublicKey::from_pkcs1_der(key.public_key()))
            .map_err(|e| KeyError::InvalidPublicKey {
                kid: key.kid().to_string(),
                reason: e.to_string(),
            })?;

        let jwk = Jwk::from_rsa(public_key)
            .with_key_id(key.kid())
            .with_key_use(key.key_use())
            .with_algorithm(key.algorithm());

        match key.private_key() {
            Some(der) => {
                let private_key = RsaPrivateKey::from_pkcs8_der(der)
                    .or_else(|_| RsaPrivateKey::from_pkcs1_der(der))
                    .map_err(|e| KeyError::InvalidPrivateKey {
                        kid: key.kid().to_string(),
                        reason: e.to_string(),
                    })?;
                jwk.with_private_key(private_key)
            }
            None => Ok(jwk),
        }
    }
}

/// JWKS document holding public keys only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<jose::Jwk>,
}

impl JwkSet {
    pub fn from_jwks<'a>(jwks: impl IntoIterator<Item = &'a Jwk>) -> Self {
        Self {
            keys: jwks.into_iter().map(Jwk::to_public_jwk).collect(),
        }
    }

    /// Exports the active signature keys of a store
    ///
    /// Records that cannot be parsed are logged and left out.
    pub fn from_store(store: &dyn KeyStore) -> Result<Self, KeyStoreError> {
        let jwks: Vec<Jwk> = store
            .find_all()?
            .iter()
            .filter_map(|key| match Jwk::try_from(key) {
                Ok(jwk) => Some(jwk),
                Err(e) => {
                    warn!("Skipping key '{}' in JWK set export: {}", key.id(), e);
                    None
                }
            })
            .collect();
        Ok(Self::from_jwks(&jwks))
    }

    pub fn find(&self, kid: &str) -> Option<&jose::Jwk> {
        self.keys
            .iter()
            .find(|jwk| jwk.common.key_id.as_deref() == Some(kid))
    }
}
