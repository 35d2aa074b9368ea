// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! JOSE headers
//!
//! [`JwsHeader`] is the protected header of the signed token and
//! [`JweHeader`] the protected header of the optional encryption layer.
//! Both keep unknown parameters in a `custom` map so they survive a
//! round trip.

use std::fmt;
use std::str::FromStr;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

/// `typ` value of a JWT
pub const JWT_TYPE: &str = "JWT";

/// Protected header of a JWS
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JwsHeader {
    pub alg: Algorithm,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub jku: Option<String>,

    /// Embedded public JWK
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk: Option<Map<String, Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    #[serde(rename = "x5t#S256", skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub crit: Option<Vec<String>>,

    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl JwsHeader {
    pub fn new(alg: Algorithm) -> Self {
        Self {
            alg,
            jku: None,
            jwk: None,
            kid: None,
            x5u: None,
            x5c: None,
            x5t_s256: None,
            typ: None,
            cty: None,
            crit: None,
            custom: Map::new(),
        }
    }

    pub fn with_key_id(mut self, kid: impl Into<String>) -> Self {
        self.kid = Some(kid.into());
        self
    }

    pub fn with_type(mut self, typ: impl Into<String>) -> Self {
        self.typ = Some(typ.into());
        self
    }

    pub fn with_custom(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.custom.insert(name.into(), value.into());
        self
    }

    /// Checks the parameters that carry structured values
    ///
    /// `jku` and `x5u` must be absolute URLs and an embedded `jwk` must
    /// declare its `kty`. Custom parameters may not reuse a registered name.
    pub fn validate(&self) -> Result<(), String> {
        check_custom_names(&self.custom, JWS_REGISTERED)?;

        for (name, value) in [("jku", &self.jku), ("x5u", &self.x5u)] {
            if let Some(value) = value {
                Url::parse(value).map_err(|e| format!("invalid '{name}' header: {e}"))?;
            }
        }

        if let Some(jwk) = &self.jwk {
            if !jwk.get("kty").is_some_and(Value::is_string) {
                return Err("invalid 'jwk' header: missing 'kty'".to_string());
            }
        }

        Ok(())
    }

    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        to_map(self)
    }
}

/// Key management algorithms of the encryption layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JweAlgorithm {
    #[serde(rename = "RSA-OAEP-256")]
    RsaOaep256,
}

impl fmt::Display for JweAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JweAlgorithm::RsaOaep256 => f.write_str("RSA-OAEP-256"),
        }
    }
}

impl FromStr for JweAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSA-OAEP-256" => Ok(JweAlgorithm::RsaOaep256),
            other => Err(format!("unsupported JWE algorithm '{other}'")),
        }
    }
}

/// Content encryption methods
#[allow(clippy::upper_case_acronyms)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EncryptionMethod {
    A128GCM,
    A256GCM,
}

impl EncryptionMethod {
    /// Content encryption key length in bytes
    pub fn key_length(&self) -> usize {
        match self {
            EncryptionMethod::A128GCM => 16,
            EncryptionMethod::A256GCM => 32,
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMethod::A128GCM => f.write_str("A128GCM"),
            EncryptionMethod::A256GCM => f.write_str("A256GCM"),
        }
    }
}

impl FromStr for EncryptionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A128GCM" => Ok(EncryptionMethod::A128GCM),
            "A256GCM" => Ok(EncryptionMethod::A256GCM),
            other => Err(format!("unsupported content encryption method '{other}'")),
        }
    }
}

/// Protected header of a JWE
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JweHeader {
    pub alg: JweAlgorithm,

    pub enc: EncryptionMethod,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cty: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,

    #[serde(flatten)]
    pub custom: Map<String, Value>,
}

impl JweHeader {
    pub fn new(alg: JweAlgorithm, enc: EncryptionMethod) -> Self {
        Self {
            alg,
            enc,
            cty: None,
            kid: None,
            typ: None,
            custom: Map::new(),
        }
    }

    /// Header of a JWE whose payload is a signed JWT
    pub fn nested_jwt(alg: JweAlgorithm, enc: EncryptionMethod, kid: impl Into<String>) -> Self {
        Self {
            cty: Some(JWT_TYPE.to_string()),
            kid: Some(kid.into()),
            ..Self::new(alg, enc)
        }
    }

    /// Rejects custom parameters named like a registered one
    pub fn validate(&self) -> Result<(), String> {
        check_custom_names(&self.custom, JWE_REGISTERED)
    }

    pub fn to_map(&self) -> Result<Map<String, Value>, serde_json::Error> {
        to_map(self)
    }
}

const JWS_REGISTERED: &[&str] = &["alg", "jku", "jwk", "kid", "x5u", "x5c", "x5t#S256", "typ", "cty", "crit"];
const JWE_REGISTERED: &[&str] = &["alg", "enc", "cty", "kid", "typ"];

fn check_custom_names(custom: &Map<String, Value>, registered: &[&str]) -> Result<(), String> {
    match custom.keys().find(|name| registered.contains(&name.as_str())) {
        Some(name) => Err(format!("custom header parameter '{name}' shadows a registered one")),
        None => Ok(()),
    }
}

fn to_map<T: Serialize>(header: &T) -> Result<Map<String, Value>, serde_json::Error> {
    match serde_json::to_value(header)? {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_jws_header_serialization() {
        let header = JwsHeader::new(Algorithm::RS256)
            .with_key_id("main")
            .with_type(JWT_TYPE)
            .with_custom("tenant", "acme");

        let json = serde_json::to_value(&header).unwrap();
        assert_eq!(json, json!({"alg": "RS256", "kid": "main", "typ": "JWT", "tenant": "acme"}));
    }

    #[test]
    fn test_jws_header_custom_parameters_round_trip() {
        let json = json!({
            "alg": "PS256",
            "x5t#S256": "thumb",
            "crit": ["exp"],
            "exp": 1700000000,
        });

        let header: JwsHeader = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(header.alg, Algorithm::PS256);
        assert_eq!(header.x5t_s256.as_deref(), Some("thumb"));
        assert_eq!(header.custom.get("exp"), Some(&json!(1700000000)));
        assert_eq!(Value::Object(header.to_map().unwrap()), json);
    }

    #[test]
    fn test_jws_header_validation() {
        let mut header = JwsHeader::new(Algorithm::RS256);
        assert!(header.validate().is_ok());

        header.jku = Some("https://issuer.example/jwks.json".to_string());
        assert!(header.validate().is_ok());

        header.x5u = Some("not a url".to_string());
        assert!(header.validate().unwrap_err().contains("x5u"));

        header.x5u = None;
        header.jwk = Some(Map::new());
        assert!(header.validate().unwrap_err().contains("kty"));
    }

    #[test]
    fn test_custom_parameters_cannot_shadow_registered_names() {
        let shadowed = JwsHeader::new(Algorithm::RS256).with_custom("alg", "RS512");
        assert!(shadowed.validate().unwrap_err().contains("'alg'"));

        let shadowed = JwsHeader::new(Algorithm::RS256).with_custom("x5t#S256", "thumb");
        assert!(shadowed.validate().is_err());

        let mut header = JweHeader::new(JweAlgorithm::RsaOaep256, EncryptionMethod::A256GCM);
        assert!(header.validate().is_ok());
        header.custom.insert("enc".to_string(), json!("A128GCM"));
        assert!(header.validate().unwrap_err().contains("'enc'"));
    }

    #[test]
    fn test_jwe_header() {
        let header = JweHeader::nested_jwt(JweAlgorithm::RsaOaep256, EncryptionMethod::A256GCM, "enc-1");
        let json = serde_json::to_value(&header).unwrap();

        assert_eq!(
            json,
            json!({"alg": "RSA-OAEP-256", "enc": "A256GCM", "cty": "JWT", "kid": "enc-1"})
        );
        assert_eq!(EncryptionMethod::A128GCM.key_length(), 16);
        assert_eq!(EncryptionMethod::A256GCM.key_length(), 32);
        assert!("RSA1_5".parse::<JweAlgorithm>().is_err());
        assert_eq!("A128GCM".parse::<EncryptionMethod>().unwrap(), EncryptionMethod::A128GCM);
    }
}
