// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! PEM armor codec
//!
//! Key records carry raw DER bytes. Configuration files and fixtures carry
//! PEM documents or bare base64 bodies. The functions here convert between the
//! two without caring about the concrete key format inside the armor.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::error::KeyError;

/// Label of an X.509 SubjectPublicKeyInfo document
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
/// Label of a PKCS#8 private key document
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

const ARMOR_DELIMITER: &str = "-----";
const LINE_WIDTH: usize = 64;

/// Removes every `-----BEGIN …-----` / `-----END …-----` marker and all
/// whitespace, leaving the base64 body.
///
/// Input without armor is returned with whitespace removed, so a bare
/// base64 body passes through unchanged.
pub fn strip_armor(text: &str) -> String {
    let mut body = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(ARMOR_DELIMITER) {
        body.push_str(&rest[..start]);
        let marker = &rest[start + ARMOR_DELIMITER.len()..];
        match marker.find(ARMOR_DELIMITER) {
            Some(end) => rest = &marker[end + ARMOR_DELIMITER.len()..],
            None => {
                // Unterminated marker, left in place so decoding rejects it
                body.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    body.push_str(rest);
    body.retain(|c| !c.is_whitespace());
    body
}

/// Strips the armor and decodes the base64 body into DER bytes
///
/// # Errors
///
/// [`KeyError::EmptyPem`] when nothing is left after stripping,
/// [`KeyError::InvalidPem`] when the body is not valid base64.
pub fn decode_body(text: &str) -> Result<Vec<u8>, KeyError> {
    let body = strip_armor(text);
    if body.is_empty() {
        return Err(KeyError::EmptyPem);
    }
    Ok(STANDARD.decode(body)?)
}

/// Encodes DER bytes as a single-line base64 body, without armor
pub fn encode_body(der: &[u8]) -> String {
    STANDARD.encode(der)
}

/// Wraps DER bytes into a full PEM document with 64 character lines
pub fn to_pem(label: &str, der: &[u8]) -> String {
    let body = encode_body(der);
    let mut pem = format!("-----BEGIN {label}-----\n");
    for line in body.as_bytes().chunks(LINE_WIDTH) {
        // base64 output is ASCII
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {label}-----\n"));
    pem
}
