// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Key records
//!
//! A [`Key`] is the stored form of one RSA key pair: DER encoded material plus
//! the metadata the JOSE machinery selects on (algorithm, purpose, key ID,
//! active flag). Keys are immutable snapshots; the [`KeyStore`] that owns them
//! is the only place where they are created, replaced or removed.
//!
//! Public keys are X.509 SubjectPublicKeyInfo DER, private keys PKCS#8 DER.
//! PKCS#1 material is also accepted when the key is converted into a
//! [`Jwk`](crate::security::jwk::Jwk).

pub mod pem;
pub mod store;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KeyError;

pub use store::{KeyStore, MemoryKeyStore};

/// Purpose a key is registered for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyUse {
    #[serde(rename = "sig")]
    Signature,
    #[serde(rename = "enc")]
    Encryption,
}

impl KeyUse {
    /// JOSE `use` parameter value
    pub fn identifier(&self) -> &'static str {
        match self {
            KeyUse::Signature => "sig",
            KeyUse::Encryption => "enc",
        }
    }
}

impl fmt::Display for KeyUse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.identifier())
    }
}

impl FromStr for KeyUse {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sig" => Ok(KeyUse::Signature),
            "enc" => Ok(KeyUse::Encryption),
            other => Err(KeyError::UnknownKeyUse(other.to_string())),
        }
    }
}

/// Stored RSA key pair and its selection metadata
#[derive(Clone, PartialEq, Eq)]
pub struct Key {
    id: String,
    key_type: String,
    algorithm: String,
    public_key: Vec<u8>,
    private_key: Option<Vec<u8>>,
    active: bool,
    kid: String,
    key_use: KeyUse,
}

impl Key {
    /// Default key family of new records
    pub const RSA: &'static str = "RSA";

    /// Creates an active, verify-only RSA key record
    ///
    /// # Arguments
    ///
    /// * `id` - Stable storage identifier, distinct from the `kid`
    /// * `kid` - Key ID written to and matched against JOSE headers
    /// * `key_use` - Whether the key signs tokens or decrypts them
    /// * `algorithm` - JOSE algorithm name such as `RS256` or `RSA-OAEP-256`
    /// * `public_key` - SubjectPublicKeyInfo DER bytes
    pub fn new(
        id: impl Into<String>,
        kid: impl Into<String>,
        key_use: KeyUse,
        algorithm: impl Into<String>,
        public_key: Vec<u8>,
    ) -> Self {
        Self {
            id: id.into(),
            key_type: Self::RSA.to_string(),
            algorithm: algorithm.into(),
            public_key,
            private_key: None,
            active: true,
            kid: kid.into(),
            key_use,
        }
    }

    /// Creates a key record from PEM documents (or bare base64 bodies)
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] if either document cannot be decoded. The
    /// material itself is only parsed when the key is converted to a JWK.
    pub fn from_pem(
        id: impl Into<String>,
        kid: impl Into<String>,
        key_use: KeyUse,
        algorithm: impl Into<String>,
        public_pem: &str,
        private_pem: Option<&str>,
    ) -> Result<Self, KeyError> {
        let key = Self::new(id, kid, key_use, algorithm, pem::decode_body(public_pem)?);
        match private_pem {
            Some(private_pem) => Ok(key.with_private_key(pem::decode_body(private_pem)?)),
            None => Ok(key),
        }
    }

    /// Attaches PKCS#8 private key DER bytes
    pub fn with_private_key(mut self, private_key: Vec<u8>) -> Self {
        self.private_key = Some(private_key);
        self
    }

    pub fn with_key_type(mut self, key_type: impl Into<String>) -> Self {
        self.key_type = key_type.into();
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.active = active;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key_type(&self) -> &str {
        &self.key_type
    }

    pub fn algorithm(&self) -> &str {
        &self.algorithm
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    pub fn private_key(&self) -> Option<&[u8]> {
        self.private_key.as_deref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn key_use(&self) -> KeyUse {
        self.key_use
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key")
            .field("id", &self.id)
            .field("key_type", &self.key_type)
            .field("algorithm", &self.algorithm)
            .field("public_key", &format!("[{} bytes]", self.public_key.len()))
            .field(
                "private_key",
                &self.private_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("active", &self.active)
            .field("kid", &self.kid)
            .field("key_use", &self.key_use)
            .finish()
    }
}
