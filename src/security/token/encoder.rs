// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Token encoding
//!
//! The encoder resolves exactly one signing key from its [`KeySelector`],
//! signs the claims as a compact JWS and, when a JWE header is supplied,
//! encrypts the signed token for the supplied recipient key.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use dashmap::DashMap;
use jsonwebtoken::{Algorithm, EncodingKey};
use log::{debug, trace};

use super::claims::ClaimSet;
use super::header::{JweHeader, JwsHeader};
use super::{jwe, Jwt};
use crate::error::EncodeError;
use crate::security::jwk::matcher::algorithm_name;
use crate::security::jwk::{AlgorithmFamily, Jwk, JwkMatcher, KeySelector};

/// What to encode: headers and claims
#[derive(Debug, Clone, Default)]
pub struct EncoderParameters {
    jws_header: Option<JwsHeader>,
    jwe_header: Option<JweHeader>,
    claims: ClaimSet,
}

impl EncoderParameters {
    /// Signs with the default RS256 header, no encryption
    pub fn from_claims(claims: ClaimSet) -> Self {
        Self {
            claims,
            ..Self::default()
        }
    }

    pub fn new(jws_header: Option<JwsHeader>, jwe_header: Option<JweHeader>, claims: ClaimSet) -> Self {
        Self {
            jws_header,
            jwe_header,
            claims,
        }
    }

    pub fn with_jws_header(mut self, header: JwsHeader) -> Self {
        self.jws_header = Some(header);
        self
    }

    pub fn with_jwe_header(mut self, header: JweHeader) -> Self {
        self.jwe_header = Some(header);
        self
    }

    pub fn jws_header(&self) -> Option<&JwsHeader> {
        self.jws_header.as_ref()
    }

    pub fn jwe_header(&self) -> Option<&JweHeader> {
        self.jwe_header.as_ref()
    }

    pub fn claims(&self) -> &ClaimSet {
        &self.claims
    }
}

/// Signing key prepared for one algorithm family
pub struct JwsSigner {
    family: AlgorithmFamily,
    encoding_key: EncodingKey,
}

impl JwsSigner {
    fn create(jwk: &Jwk) -> Result<Self, EncodeError> {
        let encoding_key = jwk
            .encoding_key()
            .ok_or_else(|| {
                EncodeError::Signing(format!(
                    "key '{}' has no private key",
                    jwk.key_id().unwrap_or_default()
                ))
            })?
            .map_err(|e| EncodeError::Signing(e.to_string()))?;

        Ok(Self {
            family: AlgorithmFamily::for_key_type(jwk.key_type()),
            encoding_key,
        })
    }

    /// Signs the JWS signing input and returns the encoded signature
    pub fn sign(&self, algorithm: Algorithm, signing_input: &[u8]) -> Result<String, EncodeError> {
        if AlgorithmFamily::of(algorithm) != Some(self.family) {
            return Err(EncodeError::Signing(format!(
                "{} signer cannot produce {}",
                self.family.key_type(),
                algorithm_name(algorithm)
            )));
        }
        jsonwebtoken::crypto::sign(signing_input, &self.encoding_key, algorithm)
            .map_err(|e| EncodeError::Signing(e.to_string()))
    }
}

/// Signs and optionally encrypts tokens
///
/// Signers are cached by key thumbprint for the lifetime of the encoder.
/// Concurrent first uses of a key may build the signer twice; only one is
/// kept.
pub struct TokenEncoder {
    key_selector: Arc<dyn KeySelector>,
    signers: DashMap<String, Arc<JwsSigner>>,
}

impl TokenEncoder {
    pub fn new(key_selector: Arc<dyn KeySelector>) -> Self {
        Self {
            key_selector,
            signers: DashMap::new(),
        }
    }

    /// Encodes the claims into a signed, optionally encrypted, token
    ///
    /// # Arguments
    ///
    /// * `parameters` - Claims plus the optional JWS and JWE headers
    /// * `encryption_key` - Recipient key, required when a JWE header is set
    ///
    /// # Returns
    ///
    /// The token with its final headers and claims. The headers are the JWS
    /// header for a signed token and the JWE header for an encrypted one.
    ///
    /// # Errors
    ///
    /// * [`EncodeError::UnsupportedAlgorithm`] - no key family for the algorithm
    /// * [`EncodeError::KeyResolution`] - zero or several signing keys match
    /// * [`EncodeError::Signing`] / [`EncodeError::Encryption`] - crypto failures
    pub fn encode(&self, parameters: &EncoderParameters, encryption_key: Option<&Jwk>) -> Result<Jwt, EncodeError> {
        let header = parameters
            .jws_header()
            .cloned()
            .unwrap_or_else(|| JwsHeader::new(Algorithm::RS256));
        header.validate().map_err(EncodeError::InvalidHeader)?;
        if let Some(jwe_header) = parameters.jwe_header() {
            jwe_header.validate().map_err(EncodeError::InvalidHeader)?;
        }

        let jwk = self.select_jwk(&header)?;
        let header = add_key_identifier_headers_if_necessary(header, &jwk);
        let signer = self.signer_for(&jwk)?;

        let claims = parameters.claims().as_map();
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
        );
        let signature = signer.sign(header.alg, signing_input.as_bytes())?;
        let signed = format!("{signing_input}.{signature}");
        trace!("Signed token with key '{}'", jwk.key_id().unwrap_or_default());

        let Some(jwe_header) = parameters.jwe_header() else {
            return Ok(Jwt::new(signed, header.to_map()?, claims.clone()));
        };

        let encryption_key = encryption_key
            .ok_or_else(|| EncodeError::Encryption("no encryption key supplied".to_string()))?;
        let token = jwe::encrypt(jwe_header, signed.as_bytes(), encryption_key.public_key())?;
        debug!(
            "Encrypted token for key '{}' with {}",
            encryption_key.key_id().unwrap_or_default(),
            jwe_header.enc
        );
        Ok(Jwt::new(token, jwe_header.to_map()?, claims.clone()))
    }

    /// Number of signers built so far
    pub fn cached_signers(&self) -> usize {
        self.signers.len()
    }

    fn select_jwk(&self, header: &JwsHeader) -> Result<Jwk, EncodeError> {
        let matcher = JwkMatcher::for_signing(header.alg, header.kid.as_deref(), header.x5t_s256.as_deref())
            .ok_or_else(|| EncodeError::UnsupportedAlgorithm(algorithm_name(header.alg).to_string()))?;

        let mut jwks = self.key_selector.get(&matcher);
        match jwks.len() {
            0 => Err(EncodeError::KeyResolution(
                "Failed to select a JWK signing key".to_string(),
            )),
            1 => Ok(jwks.remove(0)),
            _ => Err(EncodeError::KeyResolution(format!(
                "Found multiple JWK signing keys for algorithm '{}'",
                algorithm_name(header.alg)
            ))),
        }
    }

    fn signer_for(&self, jwk: &Jwk) -> Result<Arc<JwsSigner>, EncodeError> {
        let thumbprint = jwk.thumbprint();
        if let Some(signer) = self.signers.get(&thumbprint) {
            return Ok(Arc::clone(signer.value()));
        }

        let signer = Arc::new(JwsSigner::create(jwk)?);
        let cached = self.signers.entry(thumbprint).or_insert(signer);
        Ok(Arc::clone(cached.value()))
    }
}

/// Copies `kid` and `x5t#S256` from the key when the header leaves them out
fn add_key_identifier_headers_if_necessary(mut header: JwsHeader, jwk: &Jwk) -> JwsHeader {
    if header.kid.is_none() {
        header.kid = jwk.key_id().map(str::to_string);
    }
    if header.x5t_s256.is_none() {
        header.x5t_s256 = jwk.x509_sha256_thumbprint().map(str::to_string);
    }
    header
}
