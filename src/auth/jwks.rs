// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! ## Security
//!
//! - Endpoints must be HTTPS; `localhost`, `127.0.0.1` and `::1` may use HTTP
//! - Keys are cached per endpoint with a TTL (default 1 hour)
//! - An unknown key id triggers a refresh, at most once per rotation cooldown
//! - A failed refresh is not retried until the rotation cooldown has passed
//! - Redirects are followed only to endpoints that pass the same HTTPS check
//! - Only RSA signing keys usable with RS256 are retained
//!
//! ## Concurrency
//!
//! Each endpoint entry publishes an immutable [`KeySnapshot`] behind a lock,
//! so readers never observe a partially refreshed key set. Refreshes are
//! single-flight: callers that queue behind an in-flight fetch receive that
//! fetch's outcome instead of issuing their own.
//!
//! ## Usage
//!
//! Create one [`KeySetCache`] per process and share it (it is injected into
//! the gate rather than held in a global), then call [`KeySetCache::get`] for
//! the configured endpoint.

use std::collections::HashMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet, KeyAlgorithm, PublicKeyUse};
use jsonwebtoken::DecodingKey;
use tokio::sync::{Mutex as AsyncMutex, RwLock};
use tokio::time::Instant;
use url::{Host, Url};

use super::error::AuthError;

/// Default key-set TTL (1 hour).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Minimum key-set age before an unknown key id may force a refresh.
pub const DEFAULT_ROTATION_COOLDOWN: Duration = Duration::from_secs(30);

/// Upper bound on a single JWKS fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Redirect hops followed by [`HttpJwksFetcher`].
pub const MAX_REDIRECTS: usize = 5;

/// Source of key sets. The production implementation is [`HttpJwksFetcher`].
#[async_trait]
pub trait JwksFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &Url) -> Result<JwkSet, AuthError>;
}

/// Fetches a JWKS document with a plain HTTPS GET.
#[derive(Clone)]
pub struct HttpJwksFetcher {
    client: reqwest::Client,
}

impl HttpJwksFetcher {
    /// Create a fetcher whose requests are bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// `NetworkFailure` if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect_policy())
            .build()
            .map_err(|e| {
                tracing::error!(target: "agent_gate::jwks", error = %e, "Failed to build JWKS HTTP client");
                AuthError::NetworkFailure(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client })
    }
}

/// Follow a redirect only if its target would itself be accepted as an endpoint.
fn redirect_policy() -> reqwest::redirect::Policy {
    reqwest::redirect::Policy::custom(|attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error("too many JWKS redirects");
        }
        match validate_endpoint(attempt.url().as_str()) {
            Ok(_) => attempt.follow(),
            Err(e) => {
                tracing::warn!(target: "agent_gate::jwks", url = %attempt.url(), "Refusing JWKS redirect");
                attempt.error(e)
            }
        }
    })
}

#[async_trait]
impl JwksFetcher for HttpJwksFetcher {
    async fn fetch(&self, endpoint: &Url) -> Result<JwkSet, AuthError> {
        let response = self
            .client
            .get(endpoint.clone())
            .send()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AuthError::NetworkFailure(format!(
                "HTTP {} from JWKS endpoint",
                response.status()
            )));
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| AuthError::NetworkFailure(e.to_string()))
    }
}

/// Validate and normalize a JWKS endpoint URL.
///
/// HTTPS is required unless the host is `localhost`, `127.0.0.1` or `::1`,
/// in which case HTTP is also accepted.
pub fn validate_endpoint(endpoint: &str) -> Result<Url, AuthError> {
    let url = Url::parse(endpoint).map_err(|e| AuthError::MalformedEndpoint(e.to_string()))?;

    match url.scheme() {
        "https" => Ok(url),
        "http" if is_loopback(&url) => Ok(url),
        _ => Err(AuthError::InsecureEndpoint(endpoint.to_string())),
    }
}

fn is_loopback(url: &Url) -> bool {
    match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(ip)) => ip == Ipv4Addr::LOCALHOST,
        Some(Host::Ipv6(ip)) => ip == Ipv6Addr::LOCALHOST,
        None => false,
    }
}

/// Immutable view of one endpoint's usable keys.
pub struct KeySnapshot {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Instant,
}

impl KeySnapshot {
    fn from_jwks(jwks: &JwkSet) -> Self {
        let keys = jwks
            .keys
            .iter()
            .filter_map(|jwk| {
                let kid = jwk.common.key_id.clone()?;
                match jwk_to_decoding_key(jwk) {
                    Ok(key) => Some((kid, key)),
                    Err(reason) => {
                        tracing::debug!(target: "agent_gate::jwks", kid = %kid, reason, "Skipping unusable JWK");
                        None
                    }
                }
            })
            .collect();

        Self {
            keys,
            fetched_at: Instant::now(),
        }
    }

    /// Select a key by id. Without an id, the set must hold exactly one key.
    fn select(&self, kid: Option<&str>) -> Option<DecodingKey> {
        match kid {
            Some(kid) => self.keys.get(kid).cloned(),
            None if self.keys.len() == 1 => self.keys.values().next().cloned(),
            None => None,
        }
    }

    fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Convert an RSA signing JWK to a decoding key.
fn jwk_to_decoding_key(jwk: &Jwk) -> Result<DecodingKey, &'static str> {
    match &jwk.common.public_key_use {
        None | Some(PublicKeyUse::Signature) => {}
        Some(_) => return Err("key use is not sig"),
    }

    match jwk.common.key_algorithm {
        None | Some(KeyAlgorithm::RS256) => {}
        Some(_) => return Err("key algorithm is not RS256"),
    }

    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|_| "invalid RSA components"),
        _ => Err("key type is not RSA"),
    }
}

/// Mutable state for one endpoint.
struct KeySetEntry {
    endpoint: Url,
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    rotation_cooldown: Duration,
    fetch_timeout: Duration,
    snapshot: RwLock<Option<Arc<KeySnapshot>>>,
    /// Completed refresh attempts, read before queueing on `refresh`.
    attempts: AtomicU64,
    /// Serializes refreshes and remembers the latest outcome for waiters.
    refresh: AsyncMutex<Option<Result<Arc<KeySnapshot>, AuthError>>>,
    /// Time and error of the latest refresh, cleared by a successful one.
    last_failure: Mutex<Option<(Instant, AuthError)>>,
}

impl KeySetEntry {
    /// Time since the last refresh attempt, successful or not.
    fn since_last_attempt(&self, snapshot: &KeySnapshot) -> Duration {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or_else(|| snapshot.age(), |(at, _)| at.elapsed())
    }

    /// The latest refresh error, if it happened within the rotation cooldown.
    fn recent_failure(&self) -> Option<AuthError> {
        self.last_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .filter(|(at, _)| at.elapsed() < self.rotation_cooldown)
            .map(|(_, e)| e.clone())
    }

    fn record_outcome(&self, outcome: &Result<Arc<KeySnapshot>, AuthError>) {
        let mut last_failure = self.last_failure.lock().unwrap_or_else(PoisonError::into_inner);
        *last_failure = match outcome {
            Ok(_) => None,
            Err(e) => Some((Instant::now(), e.clone())),
        };
    }
}

/// Process-wide cache of key sets, one entry per endpoint.
///
/// Entries are created lazily on first [`get`](Self::get) and live as long as
/// the cache.
pub struct KeySetCache {
    fetcher: Arc<dyn JwksFetcher>,
    ttl: Duration,
    rotation_cooldown: Duration,
    fetch_timeout: Duration,
    entries: Mutex<HashMap<String, Arc<KeySetEntry>>>,
    #[cfg(test)]
    lookups: std::sync::atomic::AtomicUsize,
}

impl KeySetCache {
    pub fn new(fetcher: Arc<dyn JwksFetcher>) -> Self {
        Self {
            fetcher,
            ttl: DEFAULT_CACHE_TTL,
            rotation_cooldown: DEFAULT_ROTATION_COOLDOWN,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            entries: Mutex::new(HashMap::new()),
            #[cfg(test)]
            lookups: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Cache backed by [`HttpJwksFetcher`].
    pub fn with_http(fetch_timeout: Duration) -> Result<Self, AuthError> {
        let fetcher = HttpJwksFetcher::new(fetch_timeout)?;
        Ok(Self::new(Arc::new(fetcher)).with_fetch_timeout(fetch_timeout))
    }

    /// Set the key-set TTL. Applies to entries created afterwards.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the unknown-key-id refresh cooldown.
    pub fn with_rotation_cooldown(mut self, cooldown: Duration) -> Self {
        self.rotation_cooldown = cooldown;
        self
    }

    /// Set the upper bound on a single fetch.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Get the handle for `endpoint`, creating its entry on first use.
    ///
    /// # Errors
    ///
    /// `MalformedEndpoint` if the URL does not parse, `InsecureEndpoint` if it
    /// is not HTTPS and not a loopback host. No network access happens here.
    pub fn get(&self, endpoint: &str) -> Result<KeySetHandle, AuthError> {
        let url = validate_endpoint(endpoint)?;
        #[cfg(test)]
        self.lookups.fetch_add(1, Ordering::Relaxed);

        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries
            .entry(url.as_str().to_string())
            .or_insert_with(|| {
                Arc::new(KeySetEntry {
                    endpoint: url.clone(),
                    fetcher: Arc::clone(&self.fetcher),
                    ttl: self.ttl,
                    rotation_cooldown: self.rotation_cooldown,
                    fetch_timeout: self.fetch_timeout,
                    snapshot: RwLock::new(None),
                    attempts: AtomicU64::new(0),
                    refresh: AsyncMutex::new(None),
                    last_failure: Mutex::new(None),
                })
            })
            .clone();

        Ok(KeySetHandle { entry })
    }

    /// Number of endpoints with an entry.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Calls to [`get`](Self::get) that passed endpoint validation.
    #[cfg(test)]
    pub(crate) fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

/// Shared handle to one endpoint's cache entry.
#[derive(Clone)]
pub struct KeySetHandle {
    entry: Arc<KeySetEntry>,
}

impl KeySetHandle {
    pub fn endpoint(&self) -> &Url {
        &self.entry.endpoint
    }

    /// Resolve the decoding key for `kid`.
    ///
    /// Fetches on a cold or expired entry, and on an unknown key id once the
    /// last refresh attempt is older than the rotation cooldown. A failed
    /// refresh is not retried within the cooldown. If an expired set cannot
    /// be refreshed, the stale set is still consulted.
    ///
    /// # Errors
    ///
    /// `NetworkFailure` if a required fetch fails with no usable cached key,
    /// `UnknownKeyId` if no key matches after any refresh.
    pub async fn key(&self, kid: Option<&str>) -> Result<DecodingKey, AuthError> {
        let seen = self.entry.attempts.load(Ordering::Acquire);
        let current = self.snapshot().await;

        if let Some(snapshot) = &current {
            if snapshot.age() < self.entry.ttl {
                if let Some(key) = snapshot.select(kid) {
                    return Ok(key);
                }
                if self.entry.since_last_attempt(snapshot) < self.entry.rotation_cooldown {
                    return Err(unknown_kid(kid));
                }
                tracing::info!(target: "agent_gate::jwks", kid = kid.unwrap_or("<none>"), "Unknown key id, refreshing JWKS");
            }
        }

        let refreshed = match self.entry.recent_failure() {
            Some(e) => Err(e),
            None => self.refresh_after(seen).await,
        };

        match refreshed {
            Ok(snapshot) => snapshot.select(kid).ok_or_else(|| unknown_kid(kid)),
            Err(e) => {
                let stale = current.as_ref().and_then(|s| s.select(kid));
                match stale {
                    Some(key) => {
                        tracing::warn!(target: "agent_gate::jwks", error = %e, "JWKS refresh failed, using stale keys");
                        Ok(key)
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Refresh this endpoint's key set.
    ///
    /// # Errors
    ///
    /// The fetch error, or the previous one if a refresh failed within the
    /// rotation cooldown (no fetch is made then).
    pub async fn refresh(&self) -> Result<(), AuthError> {
        if let Some(e) = self.entry.recent_failure() {
            return Err(e);
        }
        let seen = self.entry.attempts.load(Ordering::Acquire);
        self.refresh_after(seen).await.map(|_| ())
    }

    /// Whether a key set is cached and within its TTL.
    pub async fn is_fresh(&self) -> bool {
        self.snapshot()
            .await
            .is_some_and(|s| s.age() < self.entry.ttl)
    }

    /// The currently published key set, if any.
    pub async fn snapshot(&self) -> Option<Arc<KeySnapshot>> {
        self.entry.snapshot.read().await.clone()
    }

    /// Refresh unless another refresh completed after `seen` was observed,
    /// in which case that refresh's outcome is returned.
    async fn refresh_after(&self, seen: u64) -> Result<Arc<KeySnapshot>, AuthError> {
        let mut last = self.entry.refresh.lock().await;

        if self.entry.attempts.load(Ordering::Acquire) != seen {
            if let Some(outcome) = last.as_ref() {
                return outcome.clone();
            }
        }

        let outcome = self.fetch_snapshot().await;
        if let Ok(snapshot) = &outcome {
            *self.entry.snapshot.write().await = Some(Arc::clone(snapshot));
        }
        self.entry.record_outcome(&outcome);
        self.entry.attempts.fetch_add(1, Ordering::AcqRel);
        *last = Some(outcome.clone());
        outcome
    }

    async fn fetch_snapshot(&self) -> Result<Arc<KeySnapshot>, AuthError> {
        let endpoint = &self.entry.endpoint;
        tracing::debug!(target: "agent_gate::jwks", url = %endpoint, "Fetching JWKS");

        let fetched = tokio::time::timeout(self.entry.fetch_timeout, self.entry.fetcher.fetch(endpoint))
            .await
            .unwrap_or_else(|_| Err(AuthError::NetworkFailure("JWKS fetch timed out".to_string())));

        match fetched {
            Ok(jwks) => {
                let snapshot = KeySnapshot::from_jwks(&jwks);
                tracing::debug!(target: "agent_gate::jwks", url = %endpoint, keys = snapshot.len(), "JWKS refreshed");
                Ok(Arc::new(snapshot))
            }
            Err(e) => {
                tracing::error!(target: "agent_gate::jwks", url = %endpoint, error = %e, "Failed to fetch JWKS");
                Err(e)
            }
        }
    }
}

fn unknown_kid(kid: Option<&str>) -> AuthError {
    AuthError::UnknownKeyId(kid.unwrap_or("<none>").to_string())
}
