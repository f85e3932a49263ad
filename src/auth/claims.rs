// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent identity token claims.

use serde::{Deserialize, Serialize};

/// Authentication method the issuer used to bind the agent to a person.
///
/// Only BankID-backed tokens are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthMethod {
    #[serde(rename = "bankid")]
    BankId,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::BankId => "bankid",
        }
    }

    /// Parse a claim value. Exact, case-sensitive match.
    pub fn from_claim(value: &str) -> Option<Self> {
        match value {
            "bankid" => Some(AuthMethod::BankId),
            _ => None,
        }
    }
}

/// Verified claims of an agent identity token.
///
/// Only produced by the verifier after every check has passed; never
/// persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Pseudonymous subject identifier (non-empty)
    pub sub: String,

    /// Issuer
    pub iss: String,

    /// Issued at (Unix seconds)
    pub iat: i64,

    /// Expiration (Unix seconds)
    pub exp: i64,

    /// Unique token id
    pub jti: String,

    /// How the subject was authenticated
    pub auth_method: AuthMethod,
}
