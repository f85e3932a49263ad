// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verification errors.
//!
//! Endpoint errors (`MalformedEndpoint`, `InsecureEndpoint`) are deployment
//! misconfigurations and surface at construction time. Every other variant is
//! a request-time verification failure: the gate logs it and collapses it into
//! one generic outcome, so none of these messages ever reach a client.

/// Error produced by the key-set cache or the token verifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    /// JWKS endpoint URL cannot be parsed
    #[error("JWKS endpoint is not a valid URL: {0}")]
    MalformedEndpoint(String),
    /// JWKS endpoint is neither HTTPS nor a loopback host
    #[error("JWKS endpoint must use HTTPS (loopback hosts excepted): {0}")]
    InsecureEndpoint(String),
    /// JWKS fetch failed or timed out
    #[error("failed to fetch JWKS: {0}")]
    NetworkFailure(String),
    /// No usable key in the set matches the token's key id
    #[error("no usable key in JWKS for key id {0}")]
    UnknownKeyId(String),
    /// Token is not a structurally valid compact JWS
    #[error("token is malformed: {0}")]
    MalformedToken(String),
    /// Declared algorithm is not the supported asymmetric scheme
    #[error("token algorithm {0:?} is not accepted")]
    AlgorithmRejected(String),
    /// Signature does not verify against the resolved key
    #[error("token signature is invalid")]
    SignatureInvalid,
    /// `iss` claim differs from the expected issuer
    #[error("token issuer does not match the expected issuer")]
    IssuerMismatch,
    /// `exp` claim is missing or in the past beyond the tolerance
    #[error("token has expired")]
    TokenExpired,
    /// `auth_method` claim is missing or not a supported value
    #[error("claim auth_method is missing or unsupported")]
    InvalidAuthMethod,
    /// `sub` claim is missing or empty
    #[error("claim sub is missing or empty")]
    MissingSubject,
}

impl AuthError {
    /// Stable machine-readable code, used as a structured log field.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::MalformedEndpoint(_) => "malformed_endpoint",
            AuthError::InsecureEndpoint(_) => "insecure_endpoint",
            AuthError::NetworkFailure(_) => "network_failure",
            AuthError::UnknownKeyId(_) => "unknown_key_id",
            AuthError::MalformedToken(_) => "malformed_token",
            AuthError::AlgorithmRejected(_) => "algorithm_rejected",
            AuthError::SignatureInvalid => "signature_invalid",
            AuthError::IssuerMismatch => "issuer_mismatch",
            AuthError::TokenExpired => "token_expired",
            AuthError::InvalidAuthMethod => "invalid_auth_method",
            AuthError::MissingSubject => "missing_subject",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_method_error_names_the_field() {
        assert!(AuthError::InvalidAuthMethod.to_string().contains("auth_method"));
    }

    #[test]
    fn error_codes_are_distinct() {
        let errors = [
            AuthError::MalformedEndpoint(String::new()),
            AuthError::InsecureEndpoint(String::new()),
            AuthError::NetworkFailure(String::new()),
            AuthError::UnknownKeyId(String::new()),
            AuthError::MalformedToken(String::new()),
            AuthError::AlgorithmRejected(String::new()),
            AuthError::SignatureInvalid,
            AuthError::IssuerMismatch,
            AuthError::TokenExpired,
            AuthError::InvalidAuthMethod,
            AuthError::MissingSubject,
        ];
        let codes: std::collections::HashSet<_> = errors.iter().map(AuthError::error_code).collect();
        assert_eq!(codes.len(), errors.len());
    }
}
