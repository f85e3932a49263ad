// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-request gate decision.
//!
//! ## Flow
//!
//! 1. Copy the inbound headers and strip the reserved `x-agent-*` output
//!    headers, so a client can never forge a verified result
//! 2. Classify; human traffic is forwarded unchanged
//! 3. Extract the agent token; none → unauthorized (`no_token`)
//! 4. Verify; any failure → unauthorized (`invalid_token`)
//! 5. Inject `x-agent-verified: true`, `x-agent-subject` and `x-agent-claims`
//!
//! ## Unauthorized agents
//!
//! The override hook, if configured, runs first and may supply the response.
//! Otherwise a blocking gate responds `403 AGENT_UNAUTHORIZED`, and a
//! non-blocking gate forwards with `x-agent-verified: false`.
//!
//! Verification failures are logged locally and never distinguished in the
//! response.

use std::fmt;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, Request, Uri};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use super::classifier::RequestClassifier;
use super::claims::Claims;
use super::error::AuthError;
use super::extractor::extract_token;
use super::jwks::{KeySetCache, KeySetHandle};
use super::verifier::{
    Clock, TokenVerifier, VerifierConfig, DEFAULT_CLOCK_TOLERANCE_SECS, DEFAULT_JWKS_URL,
};
use crate::error::AgentRejection;

/// `"true"` for verified agents, `"false"` for unverified agents in non-blocking mode.
pub const VERIFIED_HEADER: HeaderName = HeaderName::from_static("x-agent-verified");

/// Pseudonymous subject of a verified agent.
pub const SUBJECT_HEADER: HeaderName = HeaderName::from_static("x-agent-subject");

/// JSON-serialized [`Claims`] of a verified agent.
pub const CLAIMS_HEADER: HeaderName = HeaderName::from_static("x-agent-claims");

/// Headers only the gate may set.
pub const RESERVED_HEADERS: [HeaderName; 3] = [VERIFIED_HEADER, SUBJECT_HEADER, CLAIMS_HEADER];

/// Why a request was not verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnverifiedReason {
    NotAgent,
    NoToken,
    InvalidToken,
}

impl UnverifiedReason {
    /// Client-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            UnverifiedReason::NotAgent => "Request is not from an automated agent",
            UnverifiedReason::NoToken => "Agent requests require a verified identity token",
            UnverifiedReason::InvalidToken => "Invalid or expired agent token",
        }
    }
}

/// Gate outcome, published to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GateResult {
    Verified { claims: Claims },
    Unverified { reason: UnverifiedReason },
}

impl GateResult {
    pub fn is_verified(&self) -> bool {
        matches!(self, GateResult::Verified { .. })
    }

    pub fn claims(&self) -> Option<&Claims> {
        match self {
            GateResult::Verified { claims } => Some(claims),
            GateResult::Unverified { .. } => None,
        }
    }

    fn unverified(reason: UnverifiedReason) -> Self {
        GateResult::Unverified { reason }
    }
}

/// Borrowed view of the request the gate inspects.
#[derive(Debug, Clone, Copy)]
pub struct GateRequest<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub headers: &'a HeaderMap,
}

impl<'a, B> From<&'a Request<B>> for GateRequest<'a> {
    fn from(request: &'a Request<B>) -> Self {
        Self {
            method: request.method(),
            uri: request.uri(),
            headers: request.headers(),
        }
    }
}

/// Override for the unauthorized-agent response.
///
/// Receives the request (with reserved headers stripped) and a
/// human-readable reason. Returning `Some` replaces the default behaviour.
pub type UnauthorizedHook =
    Arc<dyn Fn(&GateRequest<'_>, &str) -> Option<Response> + Send + Sync>;

/// Gate configuration. Fixed once the gate is built.
#[derive(Clone)]
pub struct GateConfig {
    /// JWKS endpoint
    pub endpoint: String,
    /// Reject unauthorized agents (otherwise forward them marked unverified)
    pub block_unauthorized_agents: bool,
    /// Seconds an expired token is still accepted
    pub clock_tolerance_secs: u64,
    /// Agent/human classifier
    pub classifier: RequestClassifier,
    /// Unauthorized-agent override
    pub on_unauthorized: Option<UnauthorizedHook>,
}

impl GateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_block_unauthorized_agents(mut self, block: bool) -> Self {
        self.block_unauthorized_agents = block;
        self
    }

    pub fn with_clock_tolerance(mut self, secs: u64) -> Self {
        self.clock_tolerance_secs = secs;
        self
    }

    pub fn with_classifier(mut self, classifier: RequestClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Install an unauthorized-agent override.
    pub fn on_unauthorized<F>(mut self, hook: F) -> Self
    where
        F: Fn(&GateRequest<'_>, &str) -> Option<Response> + Send + Sync + 'static,
    {
        self.on_unauthorized = Some(Arc::new(hook));
        self
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_JWKS_URL.to_string(),
            block_unauthorized_agents: true,
            clock_tolerance_secs: DEFAULT_CLOCK_TOLERANCE_SECS,
            classifier: RequestClassifier::default(),
            on_unauthorized: None,
        }
    }
}

impl fmt::Debug for GateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateConfig")
            .field("endpoint", &self.endpoint)
            .field("block_unauthorized_agents", &self.block_unauthorized_agents)
            .field("clock_tolerance_secs", &self.clock_tolerance_secs)
            .field("classifier_signatures", &self.classifier.len())
            .field("on_unauthorized", &self.on_unauthorized.is_some())
            .finish()
    }
}

/// What to do with a request.
pub enum GateDecision {
    /// Continue to the handler with these headers.
    Forward { headers: HeaderMap, result: GateResult },
    /// Answer immediately with this response.
    Respond { response: Response, result: GateResult },
}

impl GateDecision {
    pub fn result(&self) -> &GateResult {
        match self {
            GateDecision::Forward { result, .. } | GateDecision::Respond { result, .. } => result,
        }
    }
}

/// Request gate for agent traffic.
pub struct Gate {
    classifier: RequestClassifier,
    verifier: TokenVerifier,
    verifier_config: VerifierConfig,
    keys: KeySetHandle,
    block_unauthorized_agents: bool,
    on_unauthorized: Option<UnauthorizedHook>,
}

impl Gate {
    /// Build a gate.
    ///
    /// # Errors
    ///
    /// `MalformedEndpoint` or `InsecureEndpoint` if the configured JWKS
    /// endpoint is unusable.
    pub fn new(config: GateConfig, keys: Arc<KeySetCache>) -> Result<Self, AuthError> {
        let handle = keys.get(&config.endpoint)?;

        Ok(Self {
            classifier: config.classifier,
            verifier: TokenVerifier::new(keys),
            keys: handle,
            verifier_config: VerifierConfig::new(config.endpoint)
                .with_clock_tolerance(config.clock_tolerance_secs),
            block_unauthorized_agents: config.block_unauthorized_agents,
            on_unauthorized: config.on_unauthorized,
        })
    }

    /// Replace the clock used for expiry checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.verifier = self.verifier.with_clock(clock);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.verifier_config.endpoint
    }

    /// Key set of the configured endpoint.
    pub fn key_set(&self) -> &KeySetHandle {
        &self.keys
    }

    pub fn blocks_unauthorized_agents(&self) -> bool {
        self.block_unauthorized_agents
    }

    /// Decide the outcome for one request. The caller's headers are not modified.
    pub async fn handle(&self, request: GateRequest<'_>) -> GateDecision {
        let mut headers = request.headers.clone();
        strip_reserved_headers(&mut headers);

        if !self.classifier.classify(&headers) {
            return GateDecision::Forward {
                headers,
                result: GateResult::unverified(UnverifiedReason::NotAgent),
            };
        }

        let Some(token) = extract_token(&headers) else {
            tracing::debug!(target: "agent_gate::gate", path = %request.uri.path(), "Agent request without token");
            return self.unauthorized(&request, headers, UnverifiedReason::NoToken);
        };

        let verified = self
            .verifier
            .verify_with(&token, &self.keys, self.verifier_config.clock_tolerance_secs)
            .await;
        let claims = match verified {
            Ok(claims) => claims,
            Err(e) => {
                tracing::warn!(
                    target: "agent_gate::gate",
                    path = %request.uri.path(),
                    error = %e,
                    error_code = e.error_code(),
                    "Agent token verification failed"
                );
                return self.unauthorized(&request, headers, UnverifiedReason::InvalidToken);
            }
        };

        let identity = match identity_headers(&claims) {
            Ok(identity) => identity,
            Err(reason) => {
                tracing::warn!(target: "agent_gate::gate", reason, "Verified claims cannot be carried in headers");
                return self.unauthorized(&request, headers, UnverifiedReason::InvalidToken);
            }
        };
        headers.extend(identity);

        tracing::debug!(
            target: "agent_gate::gate",
            sub = %claims.sub,
            auth_method = claims.auth_method.as_str(),
            "Agent verified"
        );
        GateDecision::Forward {
            headers,
            result: GateResult::Verified { claims },
        }
    }

    fn unauthorized(
        &self,
        request: &GateRequest<'_>,
        mut headers: HeaderMap,
        reason: UnverifiedReason,
    ) -> GateDecision {
        let result = GateResult::unverified(reason);
        let message = reason.message();

        if let Some(hook) = &self.on_unauthorized {
            let sanitized = GateRequest {
                headers: &headers,
                ..*request
            };
            if let Some(response) = hook(&sanitized, message) {
                return GateDecision::Respond { response, result };
            }
        }

        if self.block_unauthorized_agents {
            return GateDecision::Respond {
                response: AgentRejection::new(message).into_response(),
                result,
            };
        }

        headers.insert(VERIFIED_HEADER, HeaderValue::from_static("false"));
        GateDecision::Forward { headers, result }
    }
}

impl fmt::Debug for Gate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gate")
            .field("endpoint", &self.verifier_config.endpoint)
            .field("clock_tolerance_secs", &self.verifier_config.clock_tolerance_secs)
            .field("block_unauthorized_agents", &self.block_unauthorized_agents)
            .finish_non_exhaustive()
    }
}

/// Remove every reserved output header.
pub fn strip_reserved_headers(headers: &mut HeaderMap) {
    for name in &RESERVED_HEADERS {
        headers.remove(name);
    }
}

fn identity_headers(claims: &Claims) -> Result<HeaderMap, &'static str> {
    let serialized = serde_json::to_string(claims).map_err(|_| "claims do not serialize")?;
    let subject = HeaderValue::from_bytes(claims.sub.as_bytes()).map_err(|_| "subject is not a valid header value")?;
    let claims = HeaderValue::from_bytes(serialized.as_bytes()).map_err(|_| "claims are not a valid header value")?;

    let mut headers = HeaderMap::with_capacity(3);
    headers.insert(VERIFIED_HEADER, HeaderValue::from_static("true"));
    headers.insert(SUBJECT_HEADER, subject);
    headers.insert(CLAIMS_HEADER, claims);
    Ok(headers)
}
