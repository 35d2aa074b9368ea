// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Key selection criteria
//!
//! A [`JwkMatcher`] describes which keys may sign or verify a token. It is
//! derived from the JWS header through the [`AlgorithmFamily`] of the
//! header algorithm; each family builds its own matcher.

use jsonwebtoken::Algorithm;

use super::{Jwk, KeyType};
use crate::security::key::KeyUse;

/// Families of JWS algorithms sharing a key type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    /// RS256/384/512 and PS256/384/512
    Rsa,
    /// ES256/384
    Ec,
    /// HS256/384/512
    Hmac,
}

impl AlgorithmFamily {
    /// Family of a JWS algorithm, `None` for algorithms without key support
    /// such as EdDSA
    pub fn of(algorithm: Algorithm) -> Option<Self> {
        match algorithm {
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512 => Some(AlgorithmFamily::Rsa),
            Algorithm::ES256 | Algorithm::ES384 => Some(AlgorithmFamily::Ec),
            Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Some(AlgorithmFamily::Hmac),
            Algorithm::EdDSA => None,
        }
    }

    pub fn key_type(self) -> KeyType {
        match self {
            AlgorithmFamily::Rsa => KeyType::Rsa,
            AlgorithmFamily::Ec => KeyType::Ec,
            AlgorithmFamily::Hmac => KeyType::Oct,
        }
    }

    /// Family of the algorithms a key of `key_type` can produce
    pub fn for_key_type(key_type: KeyType) -> Self {
        match key_type {
            KeyType::Rsa => AlgorithmFamily::Rsa,
            KeyType::Ec => AlgorithmFamily::Ec,
            KeyType::Oct => AlgorithmFamily::Hmac,
        }
    }

    /// Matcher for the key that will sign a token
    pub fn signing_matcher(
        self,
        algorithm: Algorithm,
        key_id: Option<&str>,
        x509_sha256_thumbprint: Option<&str>,
    ) -> JwkMatcher {
        match self {
            AlgorithmFamily::Rsa | AlgorithmFamily::Ec => {
                asymmetric_matcher(self.key_type(), algorithm, key_id)
                    .with_x509_sha256_thumbprint(x509_sha256_thumbprint)
            }
            AlgorithmFamily::Hmac => hmac_matcher(algorithm, key_id),
        }
    }

    /// Matcher for the keys allowed to verify a token
    pub fn verification_matcher(self, algorithm: Algorithm, key_id: Option<&str>) -> JwkMatcher {
        match self {
            AlgorithmFamily::Rsa | AlgorithmFamily::Ec => {
                asymmetric_matcher(self.key_type(), algorithm, key_id)
            }
            AlgorithmFamily::Hmac => hmac_matcher(algorithm, key_id),
        }
    }
}

/// Public key families: signature use (or none declared), matching algorithm
/// (or none declared)
fn asymmetric_matcher(key_type: KeyType, algorithm: Algorithm, key_id: Option<&str>) -> JwkMatcher {
    JwkMatcher::new()
        .with_key_type(key_type)
        .with_key_id(key_id)
        .with_key_uses(vec![Some(KeyUse::Signature), None])
        .with_algorithms(vec![Some(algorithm), None])
}

/// Shared secrets: the key must hold secret material
fn hmac_matcher(algorithm: Algorithm, key_id: Option<&str>) -> JwkMatcher {
    JwkMatcher::new()
        .with_key_type(KeyType::Oct)
        .with_key_id(key_id)
        .with_private_only(true)
        .with_algorithms(vec![Some(algorithm), None])
}

/// JOSE name of a JWS algorithm
pub fn algorithm_name(algorithm: Algorithm) -> &'static str {
    match algorithm {
        Algorithm::HS256 => "HS256",
        Algorithm::HS384 => "HS384",
        Algorithm::HS512 => "HS512",
        Algorithm::ES256 => "ES256",
        Algorithm::ES384 => "ES384",
        Algorithm::RS256 => "RS256",
        Algorithm::RS384 => "RS384",
        Algorithm::RS512 => "RS512",
        Algorithm::PS256 => "PS256",
        Algorithm::PS384 => "PS384",
        Algorithm::PS512 => "PS512",
        Algorithm::EdDSA => "EdDSA",
    }
}

/// Conjunction of optional key criteria
///
/// Every criterion left unset accepts any key. In the `key_uses` and
/// `algorithms` lists a `None` entry accepts keys that do not declare the
/// attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JwkMatcher {
    key_type: Option<KeyType>,
    key_id: Option<String>,
    key_uses: Option<Vec<Option<KeyUse>>>,
    algorithms: Option<Vec<Option<Algorithm>>>,
    private_only: bool,
    x509_sha256_thumbprint: Option<String>,
}

impl JwkMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the signing matcher for an algorithm, `None` when the algorithm
    /// has no supported family
    pub fn for_signing(
        algorithm: Algorithm,
        key_id: Option<&str>,
        x509_sha256_thumbprint: Option<&str>,
    ) -> Option<Self> {
        AlgorithmFamily::of(algorithm)
            .map(|family| family.signing_matcher(algorithm, key_id, x509_sha256_thumbprint))
    }

    pub fn for_verification(algorithm: Algorithm, key_id: Option<&str>) -> Option<Self> {
        AlgorithmFamily::of(algorithm).map(|family| family.verification_matcher(algorithm, key_id))
    }

    pub fn with_key_type(mut self, key_type: KeyType) -> Self {
        self.key_type = Some(key_type);
        self
    }

    pub fn with_key_id(mut self, key_id: Option<&str>) -> Self {
        self.key_id = key_id.map(str::to_string);
        self
    }

    pub fn with_key_uses(mut self, key_uses: Vec<Option<KeyUse>>) -> Self {
        self.key_uses = Some(key_uses);
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Option<Algorithm>>) -> Self {
        self.algorithms = Some(algorithms);
        self
    }

    pub fn with_private_only(mut self, private_only: bool) -> Self {
        self.private_only = private_only;
        self
    }

    pub fn with_x509_sha256_thumbprint(mut self, thumbprint: Option<&str>) -> Self {
        self.x509_sha256_thumbprint = thumbprint.map(str::to_string);
        self
    }

    pub fn key_type(&self) -> Option<KeyType> {
        self.key_type
    }

    pub fn key_id(&self) -> Option<&str> {
        self.key_id.as_deref()
    }

    pub fn is_private_only(&self) -> bool {
        self.private_only
    }

    /// Tests a key against every criterion
    pub fn matches(&self, jwk: &Jwk) -> bool {
        if let Some(key_type) = self.key_type {
            if jwk.key_type() != key_type {
                return false;
            }
        }

        if let Some(key_id) = &self.key_id {
            if jwk.key_id() != Some(key_id.as_str()) {
                return false;
            }
        }

        if let Some(key_uses) = &self.key_uses {
            if !key_uses.contains(&jwk.key_use()) {
                return false;
            }
        }

        if let Some(algorithms) = &self.algorithms {
            let accepted = algorithms.iter().any(|algorithm| match (algorithm, jwk.algorithm()) {
                (Some(algorithm), Some(declared)) => algorithm_name(*algorithm) == declared,
                (None, None) => true,
                _ => false,
            });
            if !accepted {
                return false;
            }
        }

        if self.private_only && !jwk.is_private() {
            return false;
        }

        if let Some(thumbprint) = &self.x509_sha256_thumbprint {
            if jwk.x509_sha256_thumbprint() != Some(thumbprint.as_str()) {
                return false;
            }
        }

        true
    }
}
