// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JWT claim sets
//!
//! Claims are kept as a JSON object so custom claims need no schema. Time
//! claims are NumericDate values: whole seconds since the epoch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ISSUER: &str = "iss";
pub const SUBJECT: &str = "sub";
pub const AUDIENCE: &str = "aud";
pub const EXPIRES_AT: &str = "exp";
pub const NOT_BEFORE: &str = "nbf";
pub const ISSUED_AT: &str = "iat";
pub const JWT_ID: &str = "jti";

/// Converts a NumericDate claim value, truncating fractional seconds
pub fn numeric_date(value: &Value) -> Option<DateTime<Utc>> {
    let seconds = match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().map(|seconds| seconds.trunc() as i64))?,
        _ => return None,
    };
    DateTime::from_timestamp(seconds, 0)
}

/// Claims of a token being issued
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClaimSet {
    claims: Map<String, Value>,
}

impl ClaimSet {
    pub fn builder() -> ClaimSetBuilder {
        ClaimSetBuilder::default()
    }

    pub fn from_map(claims: Map<String, Value>) -> Self {
        Self { claims }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.claims
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }

    pub fn issuer(&self) -> Option<&str> {
        self.get(ISSUER).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get(SUBJECT).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.get(JWT_ID).and_then(Value::as_str)
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.get(ISSUED_AT).and_then(numeric_date)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.get(EXPIRES_AT).and_then(numeric_date)
    }

    pub fn not_before(&self) -> Option<DateTime<Utc>> {
        self.get(NOT_BEFORE).and_then(numeric_date)
    }
}

/// Builder for [`ClaimSet`]
#[derive(Debug, Default)]
pub struct ClaimSetBuilder {
    claims: Map<String, Value>,
}

impl ClaimSetBuilder {
    pub fn issuer(self, issuer: impl Into<String>) -> Self {
        self.claim(ISSUER, issuer.into())
    }

    pub fn subject(self, subject: impl Into<String>) -> Self {
        self.claim(SUBJECT, subject.into())
    }

    pub fn audience(self, audience: Vec<String>) -> Self {
        self.claim(AUDIENCE, audience)
    }

    pub fn issued_at(self, at: DateTime<Utc>) -> Self {
        self.claim(ISSUED_AT, at.timestamp())
    }

    pub fn expires_at(self, at: DateTime<Utc>) -> Self {
        self.claim(EXPIRES_AT, at.timestamp())
    }

    pub fn not_before(self, at: DateTime<Utc>) -> Self {
        self.claim(NOT_BEFORE, at.timestamp())
    }

    pub fn id(self, id: impl Into<String>) -> Self {
        self.claim(JWT_ID, id.into())
    }

    pub fn claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    pub fn build(self) -> ClaimSet {
        ClaimSet {
            claims: self.claims,
        }
    }
}

/// Post-verification claim processing
///
/// Runs on the claims of every successfully verified token before the
/// validators. A failure rejects the token.
pub trait ClaimSetConverter: Send + Sync {
    fn convert(&self, claims: Map<String, Value>) -> Result<Map<String, Value>, String>;
}

/// Default converter normalising the registered claims
///
/// * `iss`, `sub`, `jti` become strings (numbers and booleans are rendered)
/// * `aud` becomes a list of strings
/// * `exp`, `nbf`, `iat` become whole seconds
/// * claims set to `null` are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct MappedClaimSetConverter;

impl ClaimSetConverter for MappedClaimSetConverter {
    fn convert(&self, mut claims: Map<String, Value>) -> Result<Map<String, Value>, String> {
        claims.retain(|_, value| !value.is_null());

        for name in [ISSUER, SUBJECT, JWT_ID] {
            if let Some(value) = claims.get_mut(name) {
                *value = match value {
                    Value::String(_) => continue,
                    Value::Number(number) => Value::String(number.to_string()),
                    Value::Bool(flag) => Value::String(flag.to_string()),
                    _ => return Err(format!("Malformed payload: '{name}' must be a string")),
                };
            }
        }

        if let Some(value) = claims.get_mut(AUDIENCE) {
            match value {
                Value::String(audience) => {
                    let audience = std::mem::take(audience);
                    *value = Value::Array(vec![Value::String(audience)]);
                }
                Value::Array(audiences) if audiences.iter().all(Value::is_string) => {}
                _ => {
                    return Err(format!(
                        "Malformed payload: '{AUDIENCE}' must be a string or a list of strings"
                    ))
                }
            }
        }

        for name in [EXPIRES_AT, NOT_BEFORE, ISSUED_AT] {
            if let Some(value) = claims.get_mut(name) {
                let at = numeric_date(value)
                    .ok_or_else(|| format!("Malformed payload: '{name}' must be a NumericDate"))?;
                *value = Value::from(at.timestamp());
            }
        }

        Ok(claims)
    }
}
