// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent token extraction from request headers.
//!
//! Precedence:
//!
//! 1. `Authorization: Bearer <token>` (scheme is case-exact)
//! 2. `x-agent-token: <token>`
//!
//! Values are trimmed; an empty value counts as absent. No other
//! `Authorization` schemes are recognized.

use axum::http::{header::AUTHORIZATION, HeaderMap, HeaderName};

/// Fallback header carrying the raw agent token.
pub const AGENT_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-agent-token");

const BEARER_PREFIX: &str = "Bearer ";

/// Extract the candidate agent token, if any.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    bearer_token(headers).or_else(|| fallback_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    non_empty(value.strip_prefix(BEARER_PREFIX)?)
}

fn fallback_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AGENT_TOKEN_HEADER)?.to_str().ok()?;
    non_empty(value)
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}
