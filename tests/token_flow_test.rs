// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

use std::sync::{Arc, Once};

use anyhow::Result;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use jsonwebtoken::Algorithm;
use serde_json::json;

use rust_jose_tokens::config::TokenConfig;
use rust_jose_tokens::error::{DecodeError, EncodeError, TokenError};
use rust_jose_tokens::security::jwk::{Jwk, JwkSet, StoreKeySelector};
use rust_jose_tokens::security::key::{Key, KeyStore, KeyUse, MemoryKeyStore};
use rust_jose_tokens::security::token::{
    ClaimSet, EncoderParameters, EncryptionMethod, JweAlgorithm, JweHeader, JwsHeader, Principal,
    TokenDecoder, TokenForm, TokenResponse,
};
use rust_jose_tokens::security::TokenServices;

const PUBLIC_A: &str = include_str!("fixtures/rsa_a.pub");
const PRIVATE_A: &str = include_str!("fixtures/rsa_a.key");
const PUBLIC_B: &str = include_str!("fixtures/rsa_b.pub");
const PRIVATE_B: &str = include_str!("fixtures/rsa_b.key");
const PUBLIC_C: &str = include_str!("fixtures/rsa_c.pub");
const PRIVATE_C: &str = include_str!("fixtures/rsa_c.key");

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        env_logger::builder()
            .filter_level(log::LevelFilter::Debug)
            .is_test(true)
            .init();
    });
}

fn signing_key() -> Key {
    Key::from_pem("sig", "sig-1", KeyUse::Signature, "RS256", PUBLIC_A, Some(PRIVATE_A))
        .expect("signing fixture")
}

fn encryption_key() -> Key {
    Key::from_pem("enc", "enc-1", KeyUse::Encryption, "RSA-OAEP-256", PUBLIC_B, Some(PRIVATE_B))
        .expect("encryption fixture")
}

fn settings(jwe_enabled: bool) -> TokenConfig {
    TokenConfig {
        issuer: Some("app".to_string()),
        access_token_ttl: 3600,
        jwe_enabled,
        key_id: Some("enc-1".to_string()),
        clock_skew: 0,
    }
}

fn services(jwe_enabled: bool) -> TokenServices {
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::with_keys([signing_key(), encryption_key()]));
    TokenServices::new(&settings(jwe_enabled), store)
}

fn claims_from(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).unwrap_or_default();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

#[test]
fn test_signed_token_round_trip() -> Result<()> {
    setup();
    let services = services(false);
    let principal = Principal::new("alice").with_authorities(["READ", "WRITE"]);

    let jwt = services.generator().generate(&principal)?;
    assert_eq!(jwt.token_value().split('.').count(), 3);
    assert_eq!(TokenForm::detect(jwt.token_value())?, TokenForm::Jws);

    let claims = claims_from(jwt.token_value());
    assert_eq!(claims["exp"].as_i64().unwrap() - claims["iat"].as_i64().unwrap(), 3600);
    assert_eq!(claims["iss"], "app");

    let decoded = services.decoder().decode(jwt.token_value())?;
    assert_eq!(decoded.subject(), Some("alice"));
    assert_eq!(decoded.issuer(), Some("app"));
    assert_eq!(decoded.authorities(), vec!["READ".to_string(), "WRITE".to_string()]);
    assert_eq!(decoded.header("alg"), Some(&json!("RS256")));
    assert_eq!(decoded.header("kid"), Some(&json!("sig-1")));
    assert_eq!(decoded.id(), jwt.id());

    let response = TokenResponse::from(&decoded);
    assert_eq!(response.access_token, jwt.token_value());
    assert_eq!(response.access_token_expires_in, 3600);
    Ok(())
}

#[test]
fn test_encrypted_token_round_trip() -> Result<()> {
    setup();
    let services = services(true);

    let jwt = services.generator().generate(&Principal::new("alice"))?;
    assert_eq!(jwt.token_value().split('.').count(), 5);
    assert_eq!(TokenForm::detect(jwt.token_value())?, TokenForm::Jwe);
    assert_eq!(jwt.header("enc"), Some(&json!("A256GCM")));
    assert_eq!(jwt.header("alg"), Some(&json!("RSA-OAEP-256")));
    assert_eq!(jwt.header("cty"), Some(&json!("JWT")));

    let decoded = services.decoder().decode(jwt.token_value())?;
    assert_eq!(decoded.token_value(), jwt.token_value());
    assert_eq!(decoded.subject(), Some("alice"));
    // Headers of the nested signed token
    assert_eq!(decoded.header("kid"), Some(&json!("sig-1")));
    Ok(())
}

#[test]
fn test_encrypted_token_needs_the_recipient_key() -> Result<()> {
    setup();
    let jwt = services(true).generator().generate(&Principal::new("alice"))?;

    // Same kid, different key pair
    let impostor = Key::from_pem("enc", "enc-1", KeyUse::Encryption, "RSA-OAEP-256", PUBLIC_C, Some(PRIVATE_C))?;
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::with_keys([signing_key(), impostor]));
    let decoder = TokenDecoder::new(store.clone(), Arc::new(StoreKeySelector::new(store)));
    assert!(matches!(decoder.decode(jwt.token_value()), Err(DecodeError::Decrypt(_))));

    let empty: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
    let decoder = TokenDecoder::new(empty.clone(), Arc::new(StoreKeySelector::new(empty)));
    assert!(matches!(
        decoder.decode(jwt.token_value()),
        Err(DecodeError::KeyResolution(_)) | Err(DecodeError::Decrypt(_))
    ));
    Ok(())
}

#[test]
fn test_ambiguous_signing_keys_are_rejected() -> Result<()> {
    setup();
    let second = Key::from_pem("sig-2", "sig-2", KeyUse::Signature, "RS256", PUBLIC_C, Some(PRIVATE_C))?;
    let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::with_keys([signing_key(), second]));
    let services = TokenServices::new(&settings(false), store);

    let error = services.generator().generate(&Principal::new("alice")).unwrap_err();
    match error {
        TokenError::Encode(EncodeError::KeyResolution(message)) => {
            assert_eq!(message, "Found multiple JWK signing keys for algorithm 'RS256'")
        }
        other => panic!("unexpected error: {other}"),
    }

    // Naming the key in the header disambiguates
    let parameters = EncoderParameters::from_claims(ClaimSet::builder().issuer("app").subject("alice").build())
        .with_jws_header(JwsHeader::new(Algorithm::RS256).with_key_id("sig-2"));
    let jwt = services.encoder().encode(&parameters, None)?;
    assert_eq!(services.decoder().decode(jwt.token_value())?.header("kid"), Some(&json!("sig-2")));
    Ok(())
}

#[test]
fn test_expiry_boundaries() -> Result<()> {
    setup();
    let services = services(false);
    let now = Utc::now();
    let encode = |claims: ClaimSet| services.encoder().encode(&EncoderParameters::from_claims(claims), None);

    let expired = encode(ClaimSet::builder().issuer("app").expires_at(now - Duration::seconds(1)).build())?;
    match services.decoder().decode(expired.token_value()) {
        Err(DecodeError::Validation { errors }) => {
            assert_eq!(errors.len(), 1);
            assert!(errors[0].description.starts_with("Jwt expired at"));
        }
        other => panic!("expected a validation error, got {other:?}"),
    }

    let fresh = encode(ClaimSet::builder().issuer("app").expires_at(now + Duration::seconds(3600)).build())?;
    assert!(services.decoder().decode(fresh.token_value()).is_ok());

    let early = encode(ClaimSet::builder().issuer("app").not_before(now + Duration::seconds(600)).build())?;
    assert!(matches!(
        services.decoder().decode(early.token_value()),
        Err(DecodeError::Validation { .. })
    ));

    let foreign = encode(ClaimSet::builder().issuer("someone-else").build())?;
    assert!(matches!(
        services.decoder().decode(foreign.token_value()),
        Err(DecodeError::Validation { .. })
    ));
    Ok(())
}

#[test]
fn test_tampered_tokens_are_rejected() -> Result<()> {
    setup();
    let services = services(false);
    let jwt = services.generator().generate(&Principal::new("alice"))?;

    let (signing_input, signature) = jwt
        .token_value()
        .rsplit_once('.')
        .expect("three segments");
    let mut signature = URL_SAFE_NO_PAD.decode(signature)?;
    signature[0] ^= 0x01;
    let tampered = format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature));
    assert!(matches!(
        services.decoder().decode(&tampered),
        Err(DecodeError::Processing(_))
    ));

    let mut claims = claims_from(jwt.token_value());
    claims["sub"] = json!("mallory");
    let header = jwt.token_value().split('.').next().unwrap_or_default();
    let forged = format!(
        "{header}.{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?),
        jwt.token_value().rsplit('.').next().unwrap_or_default()
    );
    assert!(matches!(
        services.decoder().decode(&forged),
        Err(DecodeError::Processing(_))
    ));
    Ok(())
}

#[test]
fn test_structural_dispatch() {
    setup();
    let services = services(false);

    for token in ["", "a", "a.b", "a.b.c.d", "a.b.c.d.e.f"] {
        assert!(
            matches!(services.decoder().decode(token), Err(DecodeError::Malformed(_))),
            "{token:?} should be malformed"
        );
    }
    assert!(services.decoder().decode("a.b.c").is_err());
    assert!(services.decoder().decode("a.b.c.d.e").is_err());
}

#[test]
fn test_key_rotation_keeps_old_tokens_valid() -> Result<()> {
    setup();
    let store = Arc::new(MemoryKeyStore::with_keys([signing_key(), encryption_key()]));
    let services = TokenServices::new(&settings(false), store.clone());
    let old = services.generator().generate(&Principal::new("alice"))?;

    store.save(signing_key().with_active(false))?;
    store.save(Key::from_pem("sig-new", "sig-2", KeyUse::Signature, "RS256", PUBLIC_C, Some(PRIVATE_C))?)?;

    let new = services.generator().generate(&Principal::new("bob"))?;
    assert_eq!(new.header("kid"), Some(&json!("sig-2")));
    assert_eq!(services.decoder().decode(old.token_value())?.subject(), Some("alice"));
    assert_eq!(services.decoder().decode(new.token_value())?.subject(), Some("bob"));

    store.remove(&signing_key())?;
    assert!(matches!(
        services.decoder().decode(old.token_value()),
        Err(DecodeError::KeyResolution(_))
    ));
    Ok(())
}

#[test]
fn test_explicit_encryption_key_and_a128gcm() -> Result<()> {
    setup();
    let services = services(false);
    let recipient = Jwk::try_from(&encryption_key())?;

    let parameters = EncoderParameters::from_claims(ClaimSet::builder().issuer("app").subject("carol").build())
        .with_jwe_header(JweHeader::nested_jwt(JweAlgorithm::RsaOaep256, EncryptionMethod::A128GCM, "enc-1"));
    let jwt = services.encoder().encode(&parameters, Some(&recipient))?;
    assert_eq!(jwt.header("enc"), Some(&json!("A128GCM")));

    let decoded = services.decoder().decode(jwt.token_value())?;
    assert_eq!(decoded.subject(), Some("carol"));
    Ok(())
}

#[test]
fn test_jwks_export_lists_active_signing_keys() -> Result<()> {
    let store = MemoryKeyStore::with_keys([
        signing_key(),
        encryption_key(),
        Key::from_pem("old", "sig-0", KeyUse::Signature, "RS256", PUBLIC_C, None)?.with_active(false),
    ]);

    let jwks = JwkSet::from_store(&store)?;
    assert_eq!(jwks.keys.len(), 1);
    assert!(jwks.find("sig-1").is_some());

    let json = serde_json::to_value(&jwks)?;
    let key = &json["keys"][0];
    assert_eq!(key["kty"], "RSA");
    assert_eq!(key["kid"], "sig-1");
    assert!(key.get("d").is_none());
    Ok(())
}
