// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Access token issuance policy
//!
//! [`TokenGenerator`] turns an authenticated [`Principal`] into an access
//! token: issuer and lifetime come from [`TokenConfig`], the token is
//! signed with RS256 and, when JWE is enabled, encrypted with RSA-OAEP-256
//! and A256GCM for the configured encryption key.

use std::sync::Arc;

use chrono::Utc;
use jsonwebtoken::Algorithm;
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::claims::ClaimSet;
use super::encoder::{EncoderParameters, TokenEncoder};
use super::header::{EncryptionMethod, JweAlgorithm, JweHeader, JwsHeader};
use super::Jwt;
use crate::config::TokenConfig;
use crate::error::TokenError;
use crate::security::jwk::Jwk;
use crate::security::key::{KeyStore, KeyUse};

/// Claim holding the granted authorities
pub const AUTHORITIES_CLAIM: &str = "authorities";

/// `token_type` of issued access tokens
pub const BEARER: &str = "Bearer";

/// Authenticated subject a token is issued for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    name: String,
    authorities: Vec<String>,
}

impl Principal {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            authorities: Vec::new(),
        }
    }

    pub fn with_authorities<I, S>(mut self, authorities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authorities = authorities.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn authorities(&self) -> &[String] {
        &self.authorities
    }
}

/// Issues access tokens for authenticated principals
pub struct TokenGenerator {
    encoder: Arc<TokenEncoder>,
    key_store: Arc<dyn KeyStore>,
    settings: TokenConfig,
}

impl TokenGenerator {
    pub fn new(encoder: Arc<TokenEncoder>, key_store: Arc<dyn KeyStore>, settings: TokenConfig) -> Self {
        Self {
            encoder,
            key_store,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenConfig {
        &self.settings
    }

    /// Issues a token for `principal`
    ///
    /// # Errors
    ///
    /// * [`TokenError::Configuration`] - JWE is enabled but the encryption
    ///   key is not configured, missing, inactive or unusable
    /// * [`TokenError::Encode`] - any encoder failure, unchanged
    pub fn generate(&self, principal: &Principal) -> Result<Jwt, TokenError> {
        let issued_at = Utc::now();
        let expires_at = issued_at
            .checked_add_signed(self.settings.access_token_lifetime())
            .ok_or_else(|| TokenError::Configuration("access token lifetime is out of range".to_string()))?;

        let mut claims = ClaimSet::builder();
        if let Some(issuer) = &self.settings.issuer {
            claims = claims.issuer(issuer.clone());
        }
        claims = claims
            .subject(principal.name())
            .issued_at(issued_at)
            .expires_at(expires_at)
            .id(Uuid::new_v4().to_string())
            .not_before(issued_at);
        if !principal.authorities().is_empty() {
            claims = claims.claim(AUTHORITIES_CLAIM, principal.authorities().to_vec());
        }

        let parameters = EncoderParameters::new(Some(JwsHeader::new(Algorithm::RS256)), None, claims.build());
        if !self.settings.jwe_enabled {
            debug!("Issuing signed token for '{}'", principal.name());
            return Ok(self.encoder.encode(&parameters, None)?);
        }

        let encryption_key = self.encryption_key()?;
        let kid = encryption_key.key_id().unwrap_or_default().to_string();
        let parameters = parameters.with_jwe_header(JweHeader::nested_jwt(
            JweAlgorithm::RsaOaep256,
            EncryptionMethod::A256GCM,
            kid,
        ));

        debug!("Issuing encrypted token for '{}'", principal.name());
        Ok(self.encoder.encode(&parameters, Some(&encryption_key))?)
    }

    fn encryption_key(&self) -> Result<Jwk, TokenError> {
        let kid = self.settings.key_id.as_deref().ok_or_else(|| {
            TokenError::Configuration("JWE is enabled but no encryption key ID is configured".to_string())
        })?;

        let key = self
            .key_store
            .find_by_kid_and_use(kid, KeyUse::Encryption)
            .map_err(|e| TokenError::Configuration(e.to_string()))?
            .ok_or_else(|| {
                TokenError::Configuration(format!("No encryption key found with kid '{kid}'"))
            })?;
        if !key.is_active() {
            return Err(TokenError::Configuration(format!(
                "The encryption key '{kid}' is not active"
            )));
        }

        Jwk::try_from(&key).map_err(|e| TokenError::Configuration(e.to_string()))
    }
}

/// OAuth 2.0 style token response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Lifetime in seconds, `exp - iat`, or 0 when either is missing
    pub access_token_expires_in: i64,
}

impl From<&Jwt> for TokenResponse {
    fn from(jwt: &Jwt) -> Self {
        let access_token_expires_in = match (jwt.issued_at(), jwt.expires_at()) {
            (Some(issued_at), Some(expires_at)) => (expires_at - issued_at).num_seconds(),
            _ => 0,
        };
        Self {
            access_token: jwt.token_value().to_string(),
            token_type: BEARER.to_string(),
            access_token_expires_in,
        }
    }
}
