// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware, routing::get, Router};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{auth::agent_gate, state::AppState};

pub mod health;
pub mod identity;

/// Build the router. Everything under `/v1` sits behind the agent gate;
/// health probes do not.
pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/identity", get(identity::identity))
        .route_layer(middleware::from_fn_with_state(
            state.gate.clone(),
            agent_gate,
        ));

    Router::new()
        .nest("/v1", v1_routes)
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
