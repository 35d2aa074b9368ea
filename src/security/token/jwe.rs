// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Compact JWE serialization
//!
//! Key management is RSA-OAEP with SHA-256; content encryption is AES-GCM
//! with a 96 bit IV and a 128 bit tag. The additional authenticated data is
//! the ASCII form of the encoded protected header.

use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::{Aes128Gcm, Aes256Gcm};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use log::trace;
use rand::RngCore;
use rsa::sha2::Sha256;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde_json::{Map, Value};

use super::header::{EncryptionMethod, JweAlgorithm, JweHeader};
use crate::error::{DecodeError, EncodeError};

const IV_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;

/// Number of segments of a compact JWE
pub const SEGMENTS: usize = 5;

/// Encrypts `plaintext` for `recipient` and returns the compact serialization
pub fn encrypt(header: &JweHeader, plaintext: &[u8], recipient: &RsaPublicKey) -> Result<String, EncodeError> {
    let protected = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);

    let mut cek = vec![0u8; header.enc.key_length()];
    let mut iv = [0u8; IV_LENGTH];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut cek);
    rng.fill_bytes(&mut iv);

    let encrypted_key = match header.alg {
        JweAlgorithm::RsaOaep256 => recipient
            .encrypt(&mut rsa::rand_core::OsRng, Oaep::new::<Sha256>(), &cek)
            .map_err(|e| EncodeError::Encryption(e.to_string()))?,
    };

    let sealed = seal(header.enc, &cek, &iv, protected.as_bytes(), plaintext)
        .map_err(|_| EncodeError::Encryption(format!("{} content encryption failed", header.enc)))?;
    let (ciphertext, tag) = sealed.split_at(sealed.len() - TAG_LENGTH);

    Ok([
        protected,
        URL_SAFE_NO_PAD.encode(encrypted_key),
        URL_SAFE_NO_PAD.encode(iv),
        URL_SAFE_NO_PAD.encode(ciphertext),
        URL_SAFE_NO_PAD.encode(tag),
    ]
    .join("."))
}

fn seal(
    enc: EncryptionMethod,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    msg: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    match enc {
        EncryptionMethod::A128GCM => seal_with::<Aes128Gcm>(cek, iv, aad, msg),
        EncryptionMethod::A256GCM => seal_with::<Aes256Gcm>(cek, iv, aad, msg),
    }
}

fn seal_with<C: Aead + KeyInit>(cek: &[u8], iv: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(cek).map_err(|_| aes_gcm::Error)?;
    cipher.encrypt(Nonce::<C>::from_slice(iv), Payload { msg, aad })
}

fn open(
    enc: EncryptionMethod,
    cek: &[u8],
    iv: &[u8],
    aad: &[u8],
    msg: &[u8],
) -> Result<Vec<u8>, aes_gcm::Error> {
    match enc {
        EncryptionMethod::A128GCM => open_with::<Aes128Gcm>(cek, iv, aad, msg),
        EncryptionMethod::A256GCM => open_with::<Aes256Gcm>(cek, iv, aad, msg),
    }
}

fn open_with<C: Aead + KeyInit>(cek: &[u8], iv: &[u8], aad: &[u8], msg: &[u8]) -> Result<Vec<u8>, aes_gcm::Error> {
    let cipher = C::new_from_slice(cek).map_err(|_| aes_gcm::Error)?;
    cipher.decrypt(Nonce::<C>::from_slice(iv), Payload { msg, aad })
}

/// Parsed, still encrypted, compact JWE
#[derive(Debug, Clone)]
pub struct EncryptedToken {
    protected: String,
    header: Map<String, Value>,
    encrypted_key: Vec<u8>,
    iv: Vec<u8>,
    ciphertext: Vec<u8>,
    tag: Vec<u8>,
}

impl EncryptedToken {
    /// Splits and decodes the five segments
    ///
    /// # Errors
    ///
    /// [`DecodeError::Malformed`] on a wrong segment count, invalid base64 or
    /// a protected header that is not a JSON object.
    pub fn parse(token: &str) -> Result<Self, DecodeError> {
        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != SEGMENTS {
            return Err(DecodeError::Malformed(format!(
                "a JWE has {} segments, found {}",
                SEGMENTS,
                segments.len()
            )));
        }

        let decode = |segment: &str, name: &str| {
            URL_SAFE_NO_PAD
                .decode(segment)
                .map_err(|e| DecodeError::Malformed(format!("invalid JWE {name}: {e}")))
        };

        let header = match serde_json::from_slice(&decode(segments[0], "header")?) {
            Ok(Value::Object(header)) => header,
            Ok(_) => return Err(DecodeError::Malformed("JWE header is not a JSON object".to_string())),
            Err(e) => return Err(DecodeError::Malformed(format!("invalid JWE header: {e}"))),
        };

        Ok(Self {
            protected: segments[0].to_string(),
            header,
            encrypted_key: decode(segments[1], "encrypted key")?,
            iv: decode(segments[2], "initialization vector")?,
            ciphertext: decode(segments[3], "ciphertext")?,
            tag: decode(segments[4], "authentication tag")?,
        })
    }

    pub fn header(&self) -> &Map<String, Value> {
        &self.header
    }

    pub fn key_id(&self) -> Option<&str> {
        self.header.get("kid").and_then(Value::as_str)
    }

    /// Unwraps the content encryption key and decrypts the payload
    ///
    /// # Errors
    ///
    /// [`DecodeError::Decrypt`] for unsupported algorithms, a key that does
    /// not unwrap the CEK, or an authentication failure of the content.
    pub fn decrypt(&self, key: &RsaPrivateKey) -> Result<Vec<u8>, DecodeError> {
        let header: JweHeader = serde_json::from_value(Value::Object(self.header.clone()))
            .map_err(|e| DecodeError::Decrypt(format!("unsupported JWE header: {e}")))?;

        if self.iv.len() != IV_LENGTH {
            return Err(DecodeError::Decrypt(format!(
                "initialization vector must be {} bytes",
                IV_LENGTH
            )));
        }
        if self.tag.len() != TAG_LENGTH {
            return Err(DecodeError::Decrypt(format!(
                "authentication tag must be {} bytes",
                TAG_LENGTH
            )));
        }

        let cek = match header.alg {
            JweAlgorithm::RsaOaep256 => key
                .decrypt(Oaep::new::<Sha256>(), &self.encrypted_key)
                .map_err(|e| DecodeError::Decrypt(format!("unable to unwrap content key: {e}")))?,
        };
        if cek.len() != header.enc.key_length() {
            return Err(DecodeError::Decrypt(format!(
                "content key length does not match {}",
                header.enc
            )));
        }

        let mut sealed = Vec::with_capacity(self.ciphertext.len() + TAG_LENGTH);
        sealed.extend_from_slice(&self.ciphertext);
        sealed.extend_from_slice(&self.tag);

        trace!("Decrypting {} bytes of {} content", self.ciphertext.len(), header.enc);
        open(header.enc, &cek, &self.iv, self.protected.as_bytes(), &sealed)
            .map_err(|_| DecodeError::Decrypt("content authentication failed".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::DecodePrivateKey;

    const PRIVATE_A: &str = include_str!("../../../tests/fixtures/rsa_a.key");
    const PRIVATE_B: &str = include_str!("../../../tests/fixtures/rsa_b.key");

    fn private_key(pem: &str) -> RsaPrivateKey {
        RsaPrivateKey::from_pkcs8_pem(pem).unwrap()
    }

    fn header(enc: EncryptionMethod) -> JweHeader {
        JweHeader::nested_jwt(JweAlgorithm::RsaOaep256, enc, "enc-a")
    }

    #[test]
    fn test_encrypt_then_decrypt() {
        let key = private_key(PRIVATE_A);

        for enc in [EncryptionMethod::A128GCM, EncryptionMethod::A256GCM] {
            let token = encrypt(&header(enc), b"inner.signed.token", &key.to_public_key()).unwrap();
            assert_eq!(token.split('.').count(), SEGMENTS);

            let parsed = EncryptedToken::parse(&token).unwrap();
            assert_eq!(parsed.key_id(), Some("enc-a"));
            assert_eq!(parsed.header().get("cty"), Some(&Value::from("JWT")));
            assert_eq!(parsed.decrypt(&key).unwrap(), b"inner.signed.token");
        }
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let token = encrypt(
            &header(EncryptionMethod::A256GCM),
            b"payload",
            &private_key(PRIVATE_A).to_public_key(),
        )
        .unwrap();

        let parsed = EncryptedToken::parse(&token).unwrap();
        assert!(matches!(parsed.decrypt(&private_key(PRIVATE_B)), Err(DecodeError::Decrypt(_))));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = private_key(PRIVATE_A);
        let token = encrypt(&header(EncryptionMethod::A256GCM), b"payload", &key.to_public_key()).unwrap();

        let mut segments: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut ciphertext = URL_SAFE_NO_PAD.decode(&segments[3]).unwrap();
        ciphertext[0] ^= 0x01;
        segments[3] = URL_SAFE_NO_PAD.encode(ciphertext);

        let parsed = EncryptedToken::parse(&segments.join(".")).unwrap();
        assert!(matches!(parsed.decrypt(&key), Err(DecodeError::Decrypt(_))));
    }

    #[test]
    fn test_parse_rejects_malformed_input() {
        assert!(matches!(EncryptedToken::parse("a.b.c"), Err(DecodeError::Malformed(_))));
        assert!(matches!(EncryptedToken::parse("!!.b.c.d.e"), Err(DecodeError::Malformed(_))));

        let not_object = URL_SAFE_NO_PAD.encode("[1,2]");
        assert!(matches!(
            EncryptedToken::parse(&format!("{not_object}.AA.AA.AA.AA")),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn test_unsupported_algorithm_is_a_decrypt_error() {
        let protected = URL_SAFE_NO_PAD.encode(r#"{"alg":"RSA1_5","enc":"A256GCM","kid":"enc-a"}"#);
        let token = format!("{protected}.AA.AAAAAAAAAAAAAAAA.AA.AAAAAAAAAAAAAAAAAAAAAA");

        let parsed = EncryptedToken::parse(&token).unwrap();
        assert!(matches!(parsed.decrypt(&private_key(PRIVATE_A)), Err(DecodeError::Decrypt(_))));
    }
}
