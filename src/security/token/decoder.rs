// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Token decoding
//!
//! Decoding runs in four steps, each with its own error kind:
//!
//! 1. detect the form from the segment count and parse ([`DecodeError::Malformed`])
//! 2. for a JWE, decrypt with the key named by its `kid` ([`DecodeError::Decrypt`])
//! 3. verify the signature with a key resolved from the JWS header and
//!    convert the claims ([`DecodeError::KeyResolution`], [`DecodeError::Processing`])
//! 4. run the validators ([`DecodeError::Validation`])

use std::str::FromStr;
use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Duration;
use jsonwebtoken::Algorithm;
use log::{debug, trace};
use serde_json::{Map, Value};

use super::claims::{ClaimSetConverter, MappedClaimSetConverter};
use super::jwe::{self, EncryptedToken};
use super::validator::{DelegatingValidator, TokenValidator};
use super::Jwt;
use crate::error::DecodeError;
use crate::security::jwk::matcher::algorithm_name;
use crate::security::jwk::{Jwk, JwkMatcher, KeySelector};
use crate::security::key::{KeyStore, KeyUse};

/// Number of segments of a compact JWS
const JWS_SEGMENTS: usize = 3;

/// Structural form of a compact token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenForm {
    /// `header.payload.signature`
    Jws,
    /// `header.encrypted_key.iv.ciphertext.tag` wrapping a JWS
    Jwe,
}

impl TokenForm {
    /// Classifies a token by its number of segments, before any decoding
    pub fn detect(token: &str) -> Result<Self, DecodeError> {
        match token.split('.').count() {
            jwe::SEGMENTS => Ok(TokenForm::Jwe),
            JWS_SEGMENTS => Ok(TokenForm::Jws),
            count => Err(DecodeError::Malformed(format!(
                "expected {JWS_SEGMENTS} or {} segments, found {count}",
                jwe::SEGMENTS
            ))),
        }
    }
}

/// Parsed compact JWS, signature not yet checked
struct SignedToken<'a> {
    signing_input: &'a str,
    signature: &'a str,
    header: Map<String, Value>,
    claims: Map<String, Value>,
}

impl<'a> SignedToken<'a> {
    fn parse(token: &'a str) -> Result<Self, DecodeError> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or_else(|| DecodeError::Malformed("missing signature".to_string()))?;
        let (header, payload) = signing_input
            .split_once('.')
            .ok_or_else(|| DecodeError::Malformed("missing payload".to_string()))?;
        if signature.contains('.') || payload.contains('.') {
            return Err(DecodeError::Malformed(format!(
                "a JWS has {JWS_SEGMENTS} segments"
            )));
        }

        Ok(Self {
            signing_input,
            signature,
            header: json_object(header, "header")?,
            claims: json_object(payload, "payload")?,
        })
    }

    fn algorithm(&self) -> Result<Algorithm, DecodeError> {
        let name = self
            .header
            .get("alg")
            .and_then(Value::as_str)
            .ok_or_else(|| DecodeError::Malformed("header has no 'alg'".to_string()))?;
        Algorithm::from_str(name)
            .map_err(|_| DecodeError::Processing(format!("Signed JWT rejected: unsupported algorithm '{name}'")))
    }

    fn key_id(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }
}

fn json_object(segment: &str, name: &str) -> Result<Map<String, Value>, DecodeError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| DecodeError::Malformed(format!("invalid {name} encoding: {e}")))?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(object)) => Ok(object),
        Ok(_) => Err(DecodeError::Malformed(format!("{name} is not a JSON object"))),
        Err(e) => Err(DecodeError::Malformed(format!("invalid {name}: {e}"))),
    }
}

/// Verifies tokens issued by a [`TokenEncoder`](super::TokenEncoder)
pub struct TokenDecoder {
    key_store: Arc<dyn KeyStore>,
    key_selector: Arc<dyn KeySelector>,
    algorithms: Vec<Algorithm>,
    validator: Box<dyn TokenValidator>,
    claim_set_converter: Box<dyn ClaimSetConverter>,
}

impl TokenDecoder {
    /// Decoder accepting the RSA signature algorithms, with the default
    /// timestamp validation and claim conversion
    pub fn new(key_store: Arc<dyn KeyStore>, key_selector: Arc<dyn KeySelector>) -> Self {
        Self {
            key_store,
            key_selector,
            algorithms: vec![
                Algorithm::RS256,
                Algorithm::RS384,
                Algorithm::RS512,
                Algorithm::PS256,
                Algorithm::PS384,
                Algorithm::PS512,
            ],
            validator: Box::new(DelegatingValidator::with_defaults(None, Duration::zero())),
            claim_set_converter: Box::new(MappedClaimSetConverter),
        }
    }

    /// Replaces the validator chain
    pub fn with_validator(mut self, validator: impl TokenValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    pub fn with_claim_set_converter(mut self, converter: impl ClaimSetConverter + 'static) -> Self {
        self.claim_set_converter = Box::new(converter);
        self
    }

    /// Restricts the accepted JWS algorithms
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    /// Decodes, verifies and validates a compact token
    ///
    /// The returned [`Jwt`] carries the raw `token` and the headers of the
    /// signed token.
    pub fn decode(&self, token: &str) -> Result<Jwt, DecodeError> {
        let jwt = self.verify_token(token).map_err(|e| {
            debug!("{}", e);
            e
        })?;
        self.validate(jwt)
    }

    fn verify_token(&self, token: &str) -> Result<Jwt, DecodeError> {
        match TokenForm::detect(token)? {
            TokenForm::Jws => self.create_jwt(token, token),
            TokenForm::Jwe => {
                let signed = self.decrypt(token)?;
                self.create_jwt(token, &signed)
            }
        }
    }

    fn decrypt(&self, token: &str) -> Result<String, DecodeError> {
        let encrypted = EncryptedToken::parse(token)?;
        let kid = encrypted
            .key_id()
            .ok_or_else(|| DecodeError::KeyResolution("JWE header has no 'kid'".to_string()))?;

        let key = self
            .key_store
            .find_by_kid_and_use(kid, KeyUse::Encryption)
            .map_err(|e| DecodeError::KeyResolution(e.to_string()))?
            .ok_or_else(|| DecodeError::KeyResolution(format!("No encryption key found with kid '{kid}'")))?;
        let jwk = Jwk::try_from(&key).map_err(|e| DecodeError::KeyResolution(e.to_string()))?;
        let private_key = jwk.private_key().ok_or_else(|| {
            DecodeError::KeyResolution(format!("key '{kid}' has no private key"))
        })?;

        let payload = encrypted.decrypt(private_key)?;
        trace!("Decrypted token with key '{}'", kid);
        String::from_utf8(payload)
            .map_err(|_| DecodeError::Malformed("decrypted payload is not a signed token".to_string()))
    }

    fn create_jwt(&self, token: &str, signed: &str) -> Result<Jwt, DecodeError> {
        if signed.split('.').count() != JWS_SEGMENTS {
            return Err(DecodeError::Malformed(format!(
                "payload is not a JWS with {JWS_SEGMENTS} segments"
            )));
        }
        let parsed = SignedToken::parse(signed)?;
        self.verify(&parsed)?;

        let claims = self
            .claim_set_converter
            .convert(parsed.claims)
            .map_err(DecodeError::Processing)?;
        Ok(Jwt::new(token, parsed.header, claims))
    }

    fn verify(&self, parsed: &SignedToken<'_>) -> Result<(), DecodeError> {
        let algorithm = parsed.algorithm()?;
        if !self.algorithms.contains(&algorithm) {
            return Err(DecodeError::Processing(format!(
                "Signed JWT rejected: algorithm '{}' is not accepted",
                algorithm_name(algorithm)
            )));
        }

        let matcher = JwkMatcher::for_verification(algorithm, parsed.key_id()).ok_or_else(|| {
            DecodeError::Processing(format!(
                "Signed JWT rejected: unsupported algorithm '{}'",
                algorithm_name(algorithm)
            ))
        })?;

        let candidates = self.verification_keys(&matcher, parsed.key_id());
        if candidates.is_empty() {
            return Err(DecodeError::KeyResolution(
                "Signed JWT rejected: Another algorithm expected, or no matching key(s) found".to_string(),
            ));
        }

        for jwk in &candidates {
            let decoding_key = match jwk.decoding_key() {
                Ok(decoding_key) => decoding_key,
                Err(e) => {
                    trace!("Skipping key '{}': {}", jwk.key_id().unwrap_or_default(), e);
                    continue;
                }
            };
            match jsonwebtoken::crypto::verify(
                parsed.signature,
                parsed.signing_input.as_bytes(),
                &decoding_key,
                algorithm,
            ) {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => trace!("Verification with key '{}' failed: {}", jwk.key_id().unwrap_or_default(), e),
            }
        }

        Err(DecodeError::Processing("Signed JWT rejected: Invalid signature".to_string()))
    }

    /// Active keys first, then the key named by `kid` even if it was retired
    fn verification_keys(&self, matcher: &JwkMatcher, kid: Option<&str>) -> Vec<Jwk> {
        let candidates = self.key_selector.get(matcher);
        if !candidates.is_empty() {
            return candidates;
        }

        let Some(kid) = kid else {
            return candidates;
        };
        match self.key_store.find_by_kid_and_use(kid, KeyUse::Signature) {
            Ok(Some(key)) => match Jwk::try_from(&key) {
                Ok(jwk) if matcher.matches(&jwk) => {
                    debug!("Verifying with inactive key '{}'", kid);
                    vec![jwk]
                }
                Ok(_) => Vec::new(),
                Err(e) => {
                    debug!("Key '{}' is unusable: {}", kid, e);
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                debug!("Key lookup for '{}' failed: {}", kid, e);
                Vec::new()
            }
        }
    }

    fn validate(&self, jwt: Jwt) -> Result<Jwt, DecodeError> {
        let errors = self.validator.validate(&jwt);
        if errors.is_empty() {
            return Ok(jwt);
        }
        let error = DecodeError::Validation { errors };
        debug!("{}", error);
        Err(error)
    }
}
