// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Agent Gate - Edge verification for automated clients
//!
//! This crate classifies inbound HTTP requests as human or agent traffic and,
//! for agents, verifies a signed identity token against the issuer's JWKS
//! before the request reaches the application.
//!
//! ## Modules
//!
//! - `api` - HTTP routes (Axum) behind the gate
//! - `auth` - Classification, token extraction, JWKS cache, verification and the gate
//! - `config` - Environment configuration
//! - `error` - Rejection response and configuration errors

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod state;
