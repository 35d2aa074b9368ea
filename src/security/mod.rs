// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JOSE token machinery
//!
//! - [`key`]: stored key records and the [`KeyStore`] abstraction
//! - [`jwk`]: parsed RSA keys, matchers and key selection
//! - [`token`]: encoding, decoding, validation and issuance of tokens
//!
//! [`TokenServices`] wires one instance of each component around a shared
//! key store.

pub mod jwk;
pub mod key;
pub mod token;

use std::sync::Arc;

use crate::config::TokenConfig;
use jwk::{KeySelector, StoreKeySelector};
use key::KeyStore;
use token::{DelegatingValidator, TokenDecoder, TokenEncoder, TokenGenerator};

/// Encoder, decoder and generator sharing one key store
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use rust_jose_tokens::config::Config;
/// use rust_jose_tokens::security::TokenServices;
/// use rust_jose_tokens::security::token::Principal;
///
/// let config = Config::default();
/// let store = Arc::new(config.key_store().unwrap());
/// let services = TokenServices::new(&config.token, store);
///
/// let jwt = services.generator().generate(&Principal::new("alice")).unwrap();
/// let decoded = services.decoder().decode(jwt.token_value()).unwrap();
/// assert_eq!(decoded.subject(), Some("alice"));
/// ```
pub struct TokenServices {
    key_store: Arc<dyn KeyStore>,
    key_selector: Arc<dyn KeySelector>,
    encoder: Arc<TokenEncoder>,
    decoder: TokenDecoder,
    generator: TokenGenerator,
}

impl TokenServices {
    /// Builds the components for `settings`
    ///
    /// The decoder checks `exp` and `nbf` with the configured clock skew and,
    /// when an issuer is configured, requires `iss` to match it.
    pub fn new(settings: &TokenConfig, key_store: Arc<dyn KeyStore>) -> Self {
        let key_selector: Arc<dyn KeySelector> = Arc::new(StoreKeySelector::new(key_store.clone()));
        let encoder = Arc::new(TokenEncoder::new(key_selector.clone()));
        let decoder = TokenDecoder::new(key_store.clone(), key_selector.clone()).with_validator(
            DelegatingValidator::with_defaults(settings.issuer.as_deref(), settings.clock_skew_tolerance()),
        );
        let generator = TokenGenerator::new(encoder.clone(), key_store.clone(), settings.clone());

        Self {
            key_store,
            key_selector,
            encoder,
            decoder,
            generator,
        }
    }

    pub fn key_store(&self) -> &Arc<dyn KeyStore> {
        &self.key_store
    }

    pub fn key_selector(&self) -> &Arc<dyn KeySelector> {
        &self.key_selector
    }

    pub fn encoder(&self) -> &Arc<TokenEncoder> {
        &self.encoder
    }

    pub fn decoder(&self) -> &TokenDecoder {
        &self.decoder
    }

    pub fn generator(&self) -> &TokenGenerator {
        &self.generator
    }
}
