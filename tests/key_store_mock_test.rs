// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Behaviour of the token services against a failing or partial key store

use std::sync::Arc;

use anyhow::Result;
use mockall::mock;
use mockall::predicate::eq;

use rust_jose_tokens::config::TokenConfig;
use rust_jose_tokens::error::{DecodeError, EncodeError, KeyStoreError, TokenError};
use rust_jose_tokens::security::key::{Key, KeyStore, KeyUse, MemoryKeyStore};
use rust_jose_tokens::security::token::Principal;
use rust_jose_tokens::security::TokenServices;

mock! {
    pub Store {}

    impl KeyStore for Store {
        fn find_all(&self) -> Result<Vec<Key>, KeyStoreError>;
        fn find_by_id(&self, id: &str) -> Result<Option<Key>, KeyStoreError>;
        fn find_by_kid(&self, kid: &str) -> Result<Option<Key>, KeyStoreError>;
        fn find_by_kid_or_throw(&self, kid: &str) -> Result<Key, KeyStoreError>;
        fn find_by_kid_and_use(&self, kid: &str, key_use: KeyUse) -> Result<Option<Key>, KeyStoreError>;
        fn save(&self, key: Key) -> Result<(), KeyStoreError>;
        fn remove(&self, key: &Key) -> Result<(), KeyStoreError>;
    }
}

fn signing_key() -> Key {
    Key::from_pem(
        "sig",
        "sig-1",
        KeyUse::Signature,
        "RS256",
        include_str!("fixtures/rsa_a.pub"),
        Some(include_str!("fixtures/rsa_a.key")),
    )
    .expect("signing fixture")
}

fn settings(jwe_enabled: bool) -> TokenConfig {
    TokenConfig {
        issuer: None,
        access_token_ttl: 60,
        jwe_enabled,
        key_id: Some("enc-1".to_string()),
        clock_skew: 0,
    }
}

#[test]
fn test_storage_failure_leaves_no_signing_key() {
    let mut store = MockStore::new();
    store
        .expect_find_all()
        .times(1)
        .returning(|| Err(KeyStoreError::Storage("connection refused".to_string())));

    let services = TokenServices::new(&settings(false), Arc::new(store));
    let result = services.generator().generate(&Principal::new("alice"));

    assert!(matches!(
        result,
        Err(TokenError::Encode(EncodeError::KeyResolution(_)))
    ));
}

#[test]
fn test_inactive_key_from_find_all_never_signs() {
    let mut store = MockStore::new();
    store
        .expect_find_all()
        .times(1)
        .returning(|| Ok(vec![signing_key().with_active(false)]));

    let services = TokenServices::new(&settings(false), Arc::new(store));
    let result = services.generator().generate(&Principal::new("alice"));

    assert!(matches!(
        result,
        Err(TokenError::Encode(EncodeError::KeyResolution(_)))
    ));
}

#[test]
fn test_missing_encryption_key_is_a_configuration_error() {
    let mut store = MockStore::new();
    store
        .expect_find_by_kid_and_use()
        .with(eq("enc-1"), eq(KeyUse::Encryption))
        .times(1)
        .returning(|_, _| Ok(None));

    let services = TokenServices::new(&settings(true), Arc::new(store));
    let result = services.generator().generate(&Principal::new("alice"));

    match result {
        Err(TokenError::Configuration(message)) => assert!(message.contains("enc-1")),
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_decoder_consults_store_for_retired_kid() -> Result<()> {
    let issuing = Arc::new(MemoryKeyStore::with_keys([signing_key()]));
    let jwt = TokenServices::new(&settings(false), issuing)
        .generator()
        .generate(&Principal::new("alice"))?;

    let mut store = MockStore::new();
    store.expect_find_all().returning(|| Ok(Vec::new()));
    store
        .expect_find_by_kid_and_use()
        .with(eq("sig-1"), eq(KeyUse::Signature))
        .times(1)
        .returning(|_, _| Ok(Some(signing_key().with_active(false))));

    let services = TokenServices::new(&settings(false), Arc::new(store));
    let decoded = services.decoder().decode(jwt.token_value())?;
    assert_eq!(decoded.subject(), Some("alice"));
    Ok(())
}

#[test]
fn test_decoder_reports_unknown_kid() -> Result<()> {
    let issuing = Arc::new(MemoryKeyStore::with_keys([signing_key()]));
    let jwt = TokenServices::new(&settings(false), issuing)
        .generator()
        .generate(&Principal::new("alice"))?;

    let mut store = MockStore::new();
    store.expect_find_all().returning(|| Ok(Vec::new()));
    store.expect_find_by_kid_and_use().returning(|_, _| Ok(None));

    let services = TokenServices::new(&settings(false), Arc::new(store));
    assert!(matches!(
        services.decoder().decode(jwt.token_value()),
        Err(DecodeError::KeyResolution(_))
    ));
    Ok(())
}
