// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error taxonomy of the token subsystem
//!
//! Every failure surfaced by the key model, the key store, the encoder, the
//! decoder and the generator is one of the enums below. None of them is
//! retryable: the token core never retries internally and callers decide how
//! to map a failure to an HTTP status or a user message.
//!
//! The decoder keeps its failure points apart so callers can tell a malformed
//! token from a tampered one or an expired one:
//!
//! | Failure point                  | Variant                        |
//! |--------------------------------|--------------------------------|
//! | structure, base64, JSON        | [`DecodeError::Malformed`]     |
//! | no usable key                  | [`DecodeError::KeyResolution`] |
//! | JWE decryption                 | [`DecodeError::Decrypt`]       |
//! | signature or claims processing | [`DecodeError::Processing`]    |
//! | claim validation               | [`DecodeError::Validation`]    |

use thiserror::Error;

/// Errors raised while converting stored key records into usable keys
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key '{kid}' has no public key material")]
    MissingPublicKey { kid: String },

    #[error("Invalid public key for '{kid}': {reason}")]
    InvalidPublicKey { kid: String, reason: String },

    #[error("Invalid private key for '{kid}': {reason}")]
    InvalidPrivateKey { kid: String, reason: String },

    #[error("Private key of '{kid}' does not match its public key")]
    MismatchedKeyPair { kid: String },

    #[error("Unsupported key type '{0}'")]
    UnsupportedKeyType(String),

    #[error("Unknown key use '{0}', expected 'sig' or 'enc'")]
    UnknownKeyUse(String),

    #[error("PEM document is empty")]
    EmptyPem,

    #[error("Invalid PEM body: {0}")]
    InvalidPem(#[from] base64::DecodeError),
}

/// Errors raised by a [`KeyStore`](crate::security::key::KeyStore) implementation
#[derive(Error, Debug)]
pub enum KeyStoreError {
    #[error("The key with kid '{kid}' was not found in the key store")]
    NotFound { kid: String },

    #[error("Key store failure: {0}")]
    Storage(String),
}

/// Errors raised while encoding a token
#[derive(Error, Debug)]
pub enum EncodeError {
    /// Zero or several keys matched the signing criteria
    #[error("An error occurred while attempting to encode the token: {0}")]
    KeyResolution(String),

    #[error("An error occurred while attempting to encode the token: unsupported algorithm '{0}'")]
    UnsupportedAlgorithm(String),

    #[error("An error occurred while attempting to encode the token: {0}")]
    InvalidHeader(String),

    #[error("An error occurred while attempting to encode the token: {0}")]
    Signing(String),

    #[error("An error occurred while attempting to encode the token: unable to encrypt token: {0}")]
    Encryption(String),

    #[error("An error occurred while attempting to encode the token: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One claim-level violation reported by a validator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// OAuth 2.0 style error code, `invalid_token` for every built-in validator
    pub code: String,
    /// Human readable description of the violation
    pub description: String,
}

impl ValidationError {
    pub const INVALID_TOKEN: &'static str = "invalid_token";

    pub fn invalid_token(description: impl Into<String>) -> Self {
        Self {
            code: Self::INVALID_TOKEN.to_string(),
            description: description.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.description)
    }
}

/// Errors raised while decoding a token
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("An error occurred while attempting to decode the token: Malformed token ({0})")]
    Malformed(String),

    #[error("An error occurred while attempting to decode the token: {0}")]
    KeyResolution(String),

    #[error("An error occurred while attempting to decode the token: Unable to decrypt token ({0})")]
    Decrypt(String),

    /// Signature verification failed or the claim set could not be processed
    #[error("An error occurred while attempting to decode the token: {0}")]
    Processing(String),

    /// Every violation reported by the validator chain, not only the first one
    #[error("Unable to validate token: {}", describe(.errors))]
    Validation { errors: Vec<ValidationError> },
}

fn describe(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|error| error.description.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Errors raised by the [`TokenGenerator`](crate::security::token::TokenGenerator)
#[derive(Error, Debug)]
pub enum TokenError {
    /// Missing or unusable encryption key configuration; fatal, not per request
    #[error("Token configuration error: {0}")]
    Configuration(String),

    #[error(transparent)]
    Encode(#[from] EncodeError),
}
