// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! Environment variable names and defaults. Configuration is loaded from the
//! environment at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `AGENT_GATE_JWKS_URL` | JWKS endpoint for agent token verification | `https://auth.agentgate.dev/.well-known/jwks.json` |
//! | `AGENT_GATE_BLOCK_UNAUTHORIZED` | Reject unauthorized agents (`false` forwards them marked) | `true` |
//! | `AGENT_GATE_CLOCK_TOLERANCE_SECS` | Clock skew tolerance for `exp` | `30` |
//! | `AGENT_GATE_JWKS_TTL_SECS` | Key set cache TTL | `3600` |
//! | `AGENT_GATE_JWKS_TIMEOUT_SECS` | JWKS fetch timeout | `5` |
//! | `AGENT_GATE_EXTRA_SIGNATURES` | Comma-separated extra automation signatures (regex) | empty |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

use crate::auth::jwks::{DEFAULT_CACHE_TTL, DEFAULT_FETCH_TIMEOUT};
use crate::auth::verifier::{DEFAULT_CLOCK_TOLERANCE_SECS, DEFAULT_JWKS_URL};
use crate::auth::{GateConfig, RequestClassifier};
use crate::error::ConfigError;

pub const JWKS_URL_ENV: &str = "AGENT_GATE_JWKS_URL";
pub const BLOCK_UNAUTHORIZED_ENV: &str = "AGENT_GATE_BLOCK_UNAUTHORIZED";
pub const CLOCK_TOLERANCE_ENV: &str = "AGENT_GATE_CLOCK_TOLERANCE_SECS";
pub const JWKS_TTL_ENV: &str = "AGENT_GATE_JWKS_TTL_SECS";
pub const JWKS_TIMEOUT_ENV: &str = "AGENT_GATE_JWKS_TIMEOUT_SECS";
pub const EXTRA_SIGNATURES_ENV: &str = "AGENT_GATE_EXTRA_SIGNATURES";
pub const HOST_ENV: &str = "HOST";
pub const PORT_ENV: &str = "PORT";
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

/// Settings for the key-set cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    pub ttl: Duration,
    pub fetch_timeout: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_CACHE_TTL,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

/// Full runtime configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gate: GateConfig,
    pub cache: CacheSettings,
}

impl Settings {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let endpoint = var(JWKS_URL_ENV).unwrap_or_else(|| DEFAULT_JWKS_URL.to_string());
        let block = match var(BLOCK_UNAUTHORIZED_ENV) {
            Some(value) => parse_bool(BLOCK_UNAUTHORIZED_ENV, &value)?,
            None => true,
        };
        let tolerance = match var(CLOCK_TOLERANCE_ENV) {
            Some(value) => parse_u64(CLOCK_TOLERANCE_ENV, &value)?,
            None => DEFAULT_CLOCK_TOLERANCE_SECS,
        };

        let classifier = match var(EXTRA_SIGNATURES_ENV) {
            Some(value) => RequestClassifier::with_extra_signatures(
                value.split(',').map(str::trim).filter(|s| !s.is_empty()),
            )?,
            None => RequestClassifier::default(),
        };

        let mut cache = CacheSettings::default();
        if let Some(value) = var(JWKS_TTL_ENV) {
            cache.ttl = Duration::from_secs(parse_u64(JWKS_TTL_ENV, &value)?);
        }
        if let Some(value) = var(JWKS_TIMEOUT_ENV) {
            cache.fetch_timeout = Duration::from_secs(parse_u64(JWKS_TIMEOUT_ENV, &value)?);
        }

        crate::auth::jwks::validate_endpoint(&endpoint)?;

        Ok(Self {
            gate: GateConfig::new()
                .with_endpoint(endpoint)
                .with_block_unauthorized_agents(block)
                .with_clock_tolerance(tolerance)
                .with_classifier(classifier),
            cache,
        })
    }
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            name,
            value: value.to_string(),
        }),
    }
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidInteger {
        name,
        value: value.to_string(),
    })
}
