// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum middleware running the [`Gate`] in front of a router.
//!
//! Forwarded requests carry the gate's sanitized headers and a [`GateResult`]
//! request extension.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let cache = Arc::new(KeySetCache::with_http(DEFAULT_FETCH_TIMEOUT)?);
//! let gate = Arc::new(Gate::new(GateConfig::default(), cache)?);
//!
//! let app = Router::new()
//!     .route("/reports", get(reports))
//!     .layer(axum::middleware::from_fn_with_state(gate, agent_gate));
//! ```

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use super::gate::{Gate, GateDecision, GateRequest};

/// Gate middleware function.
pub async fn agent_gate(State(gate): State<Arc<Gate>>, mut request: Request, next: Next) -> Response {
    let view = GateRequest::from(&request);
    let decision = gate.handle(view).await;

    match decision {
        GateDecision::Forward { headers, result } => {
            *request.headers_mut() = headers;
            request.extensions_mut().insert(result);
            next.run(request).await
        }
        GateDecision::Respond { response, .. } => response,
    }
}
