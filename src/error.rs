// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthError;

/// Error code of every agent rejection.
pub const AGENT_UNAUTHORIZED: &str = "AGENT_UNAUTHORIZED";

/// Uniform rejection returned to unauthorized agents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentRejection {
    pub status: StatusCode,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RejectionBody {
    pub error: String,
    pub message: String,
}

impl AgentRejection {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }
}

impl IntoResponse for AgentRejection {
    fn into_response(self) -> Response {
        let body = Json(RejectionBody {
            error: AGENT_UNAUTHORIZED.to_string(),
            message: self.message,
        });
        (self.status, body).into_response()
    }
}

/// Error loading gate configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a boolean (true/false/1/0/yes/no), got {value:?}")]
    InvalidBool { name: &'static str, value: String },

    #[error("{name} must be a non-negative integer, got {value:?}")]
    InvalidInteger { name: &'static str, value: String },

    #[error("invalid classifier signature: {0}")]
    InvalidSignature(#[from] regex::Error),

    #[error(transparent)]
    Endpoint(#[from] AuthError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[tokio::test]
    async fn rejection_is_403_with_fixed_error_code() {
        let response = AgentRejection::new("Invalid or expired agent token").into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let body_bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap();
        assert_eq!(body["error"], "AGENT_UNAUTHORIZED");
        assert_eq!(body["message"], "Invalid or expired agent token");
    }

    #[test]
    fn config_error_messages_name_the_variable() {
        let err = ConfigError::InvalidBool {
            name: "AGENT_GATE_BLOCK_UNAUTHORIZED",
            value: "maybe".to_string(),
        };
        assert!(err.to_string().contains("AGENT_GATE_BLOCK_UNAUTHORIZED"));
    }
}
