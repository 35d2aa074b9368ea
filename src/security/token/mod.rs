// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! # Token issuance and verification
//!
//! Tokens are compact JWS strings (`header.payload.signature`), optionally
//! wrapped in a compact JWE (`header.key.iv.ciphertext.tag`) whose payload
//! is the signed token.
//!
//! * [`TokenEncoder`] selects the single signing key matching the header,
//!   signs, and optionally encrypts for a recipient key.
//! * [`TokenDecoder`] detects the form, decrypts with the key named by the
//!   JWE `kid`, verifies with keys resolved from the JWS header, converts the
//!   claims and runs the validators.
//! * [`TokenGenerator`] applies the issuance policy (issuer, lifetime,
//!   encryption) on top of the encoder.

pub mod claims;
pub mod decoder;
pub mod encoder;
pub mod generator;
pub mod header;
pub mod jwe;
pub mod validator;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

pub use claims::{ClaimSet, ClaimSetConverter, MappedClaimSetConverter};
pub use decoder::{TokenDecoder, TokenForm};
pub use encoder::{EncoderParameters, TokenEncoder};
pub use generator::{Principal, TokenGenerator, TokenResponse, AUTHORITIES_CLAIM};
pub use header::{EncryptionMethod, JweAlgorithm, JweHeader, JwsHeader};
pub use validator::{DelegatingValidator, IssuerValidator, TimestampValidator, TokenValidator};

/// Issued or verified token
///
/// Carries the serialized token and the headers and claims it was built
/// from. For an encrypted token the headers are those of the outer JWE.
#[derive(Debug, Clone, PartialEq)]
pub struct Jwt {
    token_value: String,
    issued_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
    headers: Map<String, Value>,
    claims: Map<String, Value>,
}

impl Jwt {
    pub fn new(
        token_value: impl Into<String>,
        headers: Map<String, Value>,
        claims: Map<String, Value>,
    ) -> Self {
        let issued_at = claims.get(claims::ISSUED_AT).and_then(claims::numeric_date);
        let expires_at = claims.get(claims::EXPIRES_AT).and_then(claims::numeric_date);
        Self {
            token_value: token_value.into(),
            issued_at,
            expires_at,
            headers,
            claims,
        }
    }

    pub fn token_value(&self) -> &str {
        &self.token_value
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    pub fn headers(&self) -> &Map<String, Value> {
        &self.headers
    }

    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn header(&self, name: &str) -> Option<&Value> {
        self.headers.get(name)
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claim(claims::SUBJECT).and_then(Value::as_str)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.claim(claims::ISSUER).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.claim(claims::JWT_ID).and_then(Value::as_str)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.claim(claims::NOT_BEFORE).and_then(claims::numeric_date)
    }

    /// Audience claim, a single string counting as a one element list
    pub fn audience(&self) -> Vec<String> {
        match self.claim(claims::AUDIENCE) {
            Some(Value::String(audience)) => vec![audience.clone()],
            Some(Value::Array(audiences)) => audiences
                .iter()
                .filter_map(|audience| audience.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Granted authorities, read from the `authorities` claim
    pub fn authorities(&self) -> Vec<String> {
        match self.claim(AUTHORITIES_CLAIM) {
            Some(Value::Array(authorities)) => authorities
                .iter()
                .filter_map(|authority| authority.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(authorities)) => authorities
                .split_whitespace()
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }
}
