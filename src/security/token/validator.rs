// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-jose-tokens project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Claim validators run on every verified token

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use super::Jwt;
use crate::error::ValidationError;

/// A single claim-level check
///
/// Returns every violation found, an empty list meaning the token is valid.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, jwt: &Jwt) -> Vec<ValidationError>;
}

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Checks `exp` and `nbf` against the current time
///
/// A token is expired once the current time, minus the clock skew, is past
/// `exp`; it is not yet valid while the current time, plus the clock skew,
/// is before `nbf`. Missing claims are not checked.
#[derive(Clone)]
pub struct TimestampValidator {
    clock_skew: Duration,
    clock: Clock,
}

impl TimestampValidator {
    pub fn new(clock_skew: Duration) -> Self {
        Self {
            clock_skew,
            clock: Arc::new(Utc::now),
        }
    }

    /// Replaces the system clock
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }
}

impl Default for TimestampValidator {
    fn default() -> Self {
        Self::new(Duration::zero())
    }
}

impl fmt::Debug for TimestampValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimestampValidator")
            .field("clock_skew", &self.clock_skew)
            .finish()
    }
}

impl TokenValidator for TimestampValidator {
    fn validate(&self, jwt: &Jwt) -> Vec<ValidationError> {
        let now = (self.clock)();
        let mut errors = Vec::new();

        if let Some(expires_at) = jwt.expires_at() {
            if now - self.clock_skew > expires_at {
                errors.push(ValidationError::invalid_token(format!(
                    "Jwt expired at {}",
                    expires_at.to_rfc3339()
                )));
            }
        }

        if let Some(not_before) = jwt.not_before() {
            if now + self.clock_skew < not_before {
                errors.push(ValidationError::invalid_token(format!(
                    "Jwt used before {}",
                    not_before.to_rfc3339()
                )));
            }
        }

        errors
    }
}

/// Requires the `iss` claim to equal the configured issuer
#[derive(Debug, Clone)]
pub struct IssuerValidator {
    issuer: String,
}

impl IssuerValidator {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }
}

impl TokenValidator for IssuerValidator {
    fn validate(&self, jwt: &Jwt) -> Vec<ValidationError> {
        if jwt.issuer() == Some(self.issuer.as_str()) {
            Vec::new()
        } else {
            vec![ValidationError::invalid_token("The iss claim is not valid")]
        }
    }
}

/// Checks one claim with an arbitrary predicate
pub struct ClaimValidator {
    claim: String,
    predicate: Box<dyn Fn(Option<&Value>) -> bool + Send + Sync>,
}

impl ClaimValidator {
    pub fn new(
        claim: impl Into<String>,
        predicate: impl Fn(Option<&Value>) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            claim: claim.into(),
            predicate: Box::new(predicate),
        }
    }
}

impl TokenValidator for ClaimValidator {
    fn validate(&self, jwt: &Jwt) -> Vec<ValidationError> {
        if (self.predicate)(jwt.claim(&self.claim)) {
            Vec::new()
        } else {
            vec![ValidationError::invalid_token(format!(
                "The {} claim is not valid",
                self.claim
            ))]
        }
    }
}

/// Runs every validator and collects all their violations
#[derive(Default)]
pub struct DelegatingValidator {
    validators: Vec<Box<dyn TokenValidator>>,
}

impl DelegatingValidator {
    pub fn new(validators: Vec<Box<dyn TokenValidator>>) -> Self {
        Self { validators }
    }

    /// Timestamp checks, plus the issuer check when an issuer is configured
    pub fn with_defaults(issuer: Option<&str>, clock_skew: Duration) -> Self {
        let mut validators: Vec<Box<dyn TokenValidator>> =
            vec![Box::new(TimestampValidator::new(clock_skew))];
        if let Some(issuer) = issuer {
            validators.push(Box::new(IssuerValidator::new(issuer)));
        }
        Self { validators }
    }

    pub fn push(&mut self, validator: impl TokenValidator + 'static) {
        self.validators.push(Box::new(validator));
    }
}

impl TokenValidator for DelegatingValidator {
    fn validate(&self, jwt: &Jwt) -> Vec<ValidationError> {
        self.validators
            .iter()
            .flat_map(|validator| validator.validate(jwt))
            .collect()
    }
}
