// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Agent Verification Module
//!
//! Classifies inbound requests and verifies agent identity tokens for the
//! edge gate.
//!
//! ## Flow
//!
//! 1. Inbound `x-agent-*` headers are stripped
//! 2. The classifier decides human or agent from `User-Agent` and `Accept-Language`
//! 3. Agents present `Authorization: Bearer <token>` (or `x-agent-token`)
//! 4. The verifier:
//!    - Fetches the issuer JWKS via HTTPS (cached, 1 hour TTL)
//!    - Accepts RS256 only
//!    - Verifies signature, issuer, expiry, `auth_method` and `sub`
//! 5. Verified identity is forwarded in `x-agent-verified`, `x-agent-subject`, `x-agent-claims`
//!
//! ## Security
//!
//! - Algorithm is checked before any key is resolved
//! - JWKS endpoints must be HTTPS outside loopback
//! - Verification failures all map to one uniform response
//! - Clock skew tolerance defaults to 30 seconds

pub mod claims;
pub mod classifier;
pub mod error;
pub mod extractor;
pub mod gate;
pub mod jwks;
pub mod middleware;
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

pub use claims::{AuthMethod, Claims};
pub use classifier::RequestClassifier;
pub use error::AuthError;
pub use extractor::extract_token;
pub use gate::{Gate, GateConfig, GateDecision, GateRequest, GateResult, UnverifiedReason};
pub use jwks::{HttpJwksFetcher, JwksFetcher, KeySetCache, KeySetHandle};
pub use middleware::agent_gate;
pub use verifier::{Clock, SystemClock, TokenVerifier, VerifierConfig};
