// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for auth tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::{json, Value};
use url::Url;

use super::error::AuthError;
use super::jwks::JwksFetcher;
use super::verifier::{Clock, EXPECTED_ISSUER};

/// Fixed "current time" used across tests.
pub const NOW: i64 = 1_760_000_000;

/// RSA test key pair: private PEM plus the base64url public modulus.
pub struct TestKey {
    pem: &'static str,
    modulus: &'static str,
}

impl TestKey {
    pub fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_rsa_pem(self.pem.as_bytes()).unwrap()
    }

    pub fn modulus(&self) -> &'static str {
        self.modulus.trim()
    }
}

pub const KEY_A: TestKey = TestKey {
    pem: include_str!("testdata/signing_key_a.pem"),
    modulus: include_str!("testdata/modulus_a.txt"),
};

pub const KEY_B: TestKey = TestKey {
    pem: include_str!("testdata/signing_key_b.pem"),
    modulus: include_str!("testdata/modulus_b.txt"),
};

/// RS256 signing JWK for `key`.
pub fn jwk(key: &TestKey, kid: &str) -> Jwk {
    rsa_jwk_with(key, kid, json!({}))
}

/// RS256 signing JWK for `key` with fields overridden by `extra`.
pub fn rsa_jwk_with(key: &TestKey, kid: &str, extra: Value) -> Jwk {
    let mut value = json!({
        "kty": "RSA",
        "kid": kid,
        "use": "sig",
        "alg": "RS256",
        "n": key.modulus(),
        "e": "AQAB",
    });
    if let (Some(base), Some(extra)) = (value.as_object_mut(), extra.as_object()) {
        for (k, v) in extra {
            base.insert(k.clone(), v.clone());
        }
    }
    serde_json::from_value(value).unwrap()
}

pub fn jwks(keys: &[(&TestKey, &str)]) -> JwkSet {
    JwkSet {
        keys: keys.iter().map(|(key, kid)| jwk(key, kid)).collect(),
    }
}

/// Claims that pass every check at [`NOW`].
pub fn valid_claims() -> Value {
    json!({
        "sub": "psn_9f3b2c7e1a",
        "iss": EXPECTED_ISSUER,
        "iat": NOW - 60,
        "exp": NOW + 900,
        "jti": "tok_01J9Z6",
        "auth_method": "bankid",
    })
}

/// Sign `claims` with RS256.
pub fn sign(claims: &Value, key: &TestKey, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = kid.map(str::to_string);
    jsonwebtoken::encode(&header, claims, &key.encoding_key()).unwrap()
}

/// Assemble a compact token from raw parts without signing.
pub fn unsigned_token(header: &Value, claims: &Value, signature: &str) -> String {
    format!(
        "{}.{}.{}",
        URL_SAFE_NO_PAD.encode(header.to_string()),
        URL_SAFE_NO_PAD.encode(claims.to_string()),
        signature
    )
}

/// Fetcher that replays a script of outcomes and counts calls.
pub struct ScriptedFetcher {
    script: Mutex<VecDeque<Result<JwkSet, AuthError>>>,
    repeat: Option<JwkSet>,
    delay: Option<Duration>,
    hang: bool,
    calls: AtomicUsize,
}

impl ScriptedFetcher {
    pub fn new(script: Vec<Result<JwkSet, AuthError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            delay: None,
            hang: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Always returns `jwks`.
    pub fn repeating(jwks: JwkSet) -> Self {
        Self {
            repeat: Some(jwks),
            ..Self::new(vec![])
        }
    }

    /// Never completes.
    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new(vec![])
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JwksFetcher for ScriptedFetcher {
    async fn fetch(&self, _endpoint: &Url) -> Result<JwkSet, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(jwks) = &self.repeat {
            return Ok(jwks.clone());
        }
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(AuthError::NetworkFailure("script exhausted".to_string())))
    }
}

/// Clock pinned to a settable instant.
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: i64) -> Self {
        Self(AtomicI64::new(now))
    }

    pub fn set(&self, now: i64) {
        self.0.store(now, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_unix(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}
