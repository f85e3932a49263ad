// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent token verification.
//!
//! A token passes through a fixed sequence of fallible steps and stops at
//! the first failure:
//!
//! 1. structural parse (three segments, JSON header and payload)
//! 2. algorithm allowlist (`RS256` only)
//! 3. key resolution through the endpoint's [`KeySetHandle`]
//! 4. signature verification
//! 5. issuer
//! 6. expiry (with clock tolerance)
//! 7. `auth_method`
//! 8. `sub`
//!
//! The allowlist runs before any key is resolved, so `none` and symmetric
//! algorithms never reach signature verification.

use std::sync::Arc;

use base64ct::{Base64UrlUnpadded, Encoding};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use super::claims::{AuthMethod, Claims};
use super::error::AuthError;
use super::jwks::{KeySetCache, KeySetHandle};

/// The only accepted signing algorithm.
pub const SUPPORTED_ALGORITHM: &str = "RS256";

/// Required value of the `iss` claim.
pub const EXPECTED_ISSUER: &str = "https://auth.agentgate.dev";

/// Hosted key set used when no endpoint is configured.
pub const DEFAULT_JWKS_URL: &str = "https://auth.agentgate.dev/.well-known/jwks.json";

/// Default clock-skew tolerance for `exp`.
pub const DEFAULT_CLOCK_TOLERANCE_SECS: u64 = 30;

/// Source of the current time in Unix seconds.
pub trait Clock: Send + Sync {
    fn now_unix(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_unix(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Per-call verification settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifierConfig {
    /// JWKS endpoint
    pub endpoint: String,
    /// Seconds an expired token is still accepted
    pub clock_tolerance_secs: u64,
}

impl VerifierConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            clock_tolerance_secs: DEFAULT_CLOCK_TOLERANCE_SECS,
        }
    }

    pub fn with_clock_tolerance(mut self, secs: u64) -> Self {
        self.clock_tolerance_secs = secs;
        self
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self::new(DEFAULT_JWKS_URL)
    }
}

/// Token verifier backed by a shared [`KeySetCache`].
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<KeySetCache>,
    clock: Arc<dyn Clock>,
}

impl TokenVerifier {
    pub fn new(keys: Arc<KeySetCache>) -> Self {
        Self {
            keys,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Verify `token` against the key set at `config.endpoint`.
    ///
    /// # Errors
    ///
    /// Endpoint errors from the cache, otherwise the first failing check.
    /// No claims are returned unless every check passes.
    pub async fn verify(&self, token: &str, config: &VerifierConfig) -> Result<Claims, AuthError> {
        let handle = self.keys.get(&config.endpoint)?;
        self.verify_with(token, &handle, config.clock_tolerance_secs)
            .await
    }

    /// Verify `token` against an already resolved key-set handle.
    pub async fn verify_with(
        &self,
        token: &str,
        keys: &KeySetHandle,
        clock_tolerance_secs: u64,
    ) -> Result<Claims, AuthError> {
        let parsed = parse_structure(token)?;
        check_algorithm(&parsed.header)?;
        let key = keys.key(parsed.header.kid.as_deref()).await?;
        verify_signature(parsed.raw, &key)?;

        let payload = parsed.payload;
        let iss = check_issuer(&payload)?;
        let exp = check_expiry(&payload, self.clock.now_unix(), clock_tolerance_secs)?;
        let auth_method = check_auth_method(&payload)?;
        let sub = check_subject(&payload)?;

        Ok(Claims {
            sub,
            iss,
            iat: integer_claim(&payload, "iat")?,
            exp,
            jti: string_claim(&payload, "jti")?,
            auth_method,
        })
    }
}

/// Header fields the pipeline inspects before any key is touched.
#[derive(Debug, Deserialize)]
struct ProtectedHeader {
    #[serde(default)]
    alg: Option<String>,
    #[serde(default)]
    kid: Option<String>,
}

struct ParsedToken<'a> {
    raw: &'a str,
    header: ProtectedHeader,
    payload: Map<String, Value>,
}

fn parse_structure(token: &str) -> Result<ParsedToken<'_>, AuthError> {
    let segments: Vec<&str> = token.split('.').collect();
    let [header, payload, _signature] = segments.as_slice() else {
        return Err(AuthError::MalformedToken(
            "expected three dot-separated segments".to_string(),
        ));
    };

    let header: ProtectedHeader = decode_segment(header, "header")?;
    let payload: Map<String, Value> = decode_segment(payload, "payload")?;

    Ok(ParsedToken {
        raw: token,
        header,
        payload,
    })
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str, name: &str) -> Result<T, AuthError> {
    let bytes = Base64UrlUnpadded::decode_vec(segment)
        .map_err(|_| AuthError::MalformedToken(format!("{name} is not base64url")))?;
    serde_json::from_slice(&bytes)
        .map_err(|_| AuthError::MalformedToken(format!("{name} is not a JSON object")))
}

fn check_algorithm(header: &ProtectedHeader) -> Result<(), AuthError> {
    match header.alg.as_deref() {
        Some(SUPPORTED_ALGORITHM) => Ok(()),
        other => Err(AuthError::AlgorithmRejected(
            other.unwrap_or("<missing>").to_string(),
        )),
    }
}

fn verify_signature(token: &str, key: &DecodingKey) -> Result<(), AuthError> {
    // Claims are checked by the later steps.
    let mut validation = Validation::new(Algorithm::RS256);
    validation.required_spec_claims.clear();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;

    jsonwebtoken::decode::<Value>(token, key, &validation)
        .map(|_| ())
        .map_err(|e| match e.kind() {
            ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                AuthError::MalformedToken(e.to_string())
            }
            _ => AuthError::SignatureInvalid,
        })
}

fn check_issuer(payload: &Map<String, Value>) -> Result<String, AuthError> {
    match payload.get("iss").and_then(Value::as_str) {
        Some(iss) if iss == EXPECTED_ISSUER => Ok(iss.to_string()),
        _ => Err(AuthError::IssuerMismatch),
    }
}

fn check_expiry(payload: &Map<String, Value>, now: i64, tolerance_secs: u64) -> Result<i64, AuthError> {
    let exp = match payload.get("exp") {
        None => return Err(AuthError::TokenExpired),
        Some(value) => value.as_i64().ok_or_else(|| {
            AuthError::MalformedToken("claim exp is not an integer".to_string())
        })?,
    };

    let tolerance = i64::try_from(tolerance_secs).unwrap_or(i64::MAX);
    if exp < now.saturating_sub(tolerance) {
        return Err(AuthError::TokenExpired);
    }
    Ok(exp)
}

fn check_auth_method(payload: &Map<String, Value>) -> Result<AuthMethod, AuthError> {
    payload
        .get("auth_method")
        .and_then(Value::as_str)
        .and_then(AuthMethod::from_claim)
        .ok_or(AuthError::InvalidAuthMethod)
}

fn check_subject(payload: &Map<String, Value>) -> Result<String, AuthError> {
    match payload.get("sub").and_then(Value::as_str) {
        Some(sub) if !sub.is_empty() => Ok(sub.to_string()),
        _ => Err(AuthError::MissingSubject),
    }
}

fn integer_claim(payload: &Map<String, Value>, name: &str) -> Result<i64, AuthError> {
    payload
        .get(name)
        .and_then(Value::as_i64)
        .ok_or_else(|| AuthError::MalformedToken(format!("claim {name} is missing or not an integer")))
}

fn string_claim(payload: &Map<String, Value>, name: &str) -> Result<String, AuthError> {
    payload
        .get(name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| AuthError::MalformedToken(format!("claim {name} is missing or not a string")))
}
