// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{Extension, Json};
use serde::Serialize;

use crate::auth::{GateResult, UnverifiedReason};

/// What the gate established about the caller.
#[derive(Debug, Serialize)]
pub struct IdentityResponse {
    /// `human`, `agent` or `unverified_agent`
    pub caller: &'static str,
    /// Pseudonymous subject, for verified agents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    pub gate: GateResult,
}

/// Report the gate outcome for this request.
pub async fn identity(Extension(result): Extension<GateResult>) -> Json<IdentityResponse> {
    let caller = match &result {
        GateResult::Verified { .. } => "agent",
        GateResult::Unverified {
            reason: UnverifiedReason::NotAgent,
        } => "human",
        GateResult::Unverified { .. } => "unverified_agent",
    };

    Json(IdentityResponse {
        caller,
        subject: result.claims().map(|c| c.sub.clone()),
        gate: result,
    })
}
