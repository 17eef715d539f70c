// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Runtime Configuration
//!
//! This module defines environment variable names and default values, and
//! loads them into [`AuthConfig`] and [`ServerConfig`] at startup.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `CLERK_PUBLISHABLE_KEY` | Publishable key (`pk_live_…` / `pk_test_…`) | Required |
//! | `CLERK_SECRET_KEY` | Secret key, authenticates backend API JWKS fetches | Optional |
//! | `CLERK_JWT_KEY` | PEM public key for networkless verification | Optional |
//! | `CLERK_JWKS_URL` | Explicit JWKS endpoint | Derived from the keys |
//! | `CLERK_AUTHORIZED_PARTIES` | Comma-separated origins accepted in `azp` | Empty (no check) |
//! | `CLERK_DOMAIN` | Domain served by this deployment | Optional |
//! | `CLERK_PROXY_URL` | Frontend API proxy URL | Optional |
//! | `CLERK_IS_SATELLITE` | `true` for a satellite deployment | `false` |
//! | `CLERK_CLOCK_SKEW_MS` | Clock skew tolerance in milliseconds | `5000` |
//! | `CLERK_ISSUER` | Expected `iss` claim | Not checked |
//! | `CLERK_CARRY_TOKEN_PLACEMENT` | Dev-browser token placement (`query` or `fragment`) | `query` |
//! | `CLERK_LOCAL_SUFFIXES` | Comma-separated local-development domain suffixes | Built-in list |
//! | `CLERK_STAGING_SUFFIXES` | Comma-separated staging domain suffixes | Built-in list |
//! | `CLERK_DEVELOPMENT_SUFFIXES` | Comma-separated development domain suffixes | Built-in list |
//! | `HOST` | Server bind address | `0.0.0.0` |
//! | `PORT` | Server bind port | `8080` |
//! | `LOG_FORMAT` | Logging format (`json` or `pretty`) | `pretty` |
//! | `RUST_LOG` | Log level filter | `info,tower_http=debug` |

use std::time::Duration;

use crate::auth::domain::{DomainKind, DomainSuffixes};
use crate::auth::handshake::CarryTokenPlacement;
use crate::auth::publishable_key::{
    api_url_from_frontend_api_with, parse_publishable_key_with, parse_secret_key,
    PublishableKeyOptions,
};
use crate::auth::resolver::DeploymentConfig;
use crate::auth::verification_key::VerificationKey;

pub const PUBLISHABLE_KEY_ENV: &str = "CLERK_PUBLISHABLE_KEY";
pub const SECRET_KEY_ENV: &str = "CLERK_SECRET_KEY";
pub const JWT_KEY_ENV: &str = "CLERK_JWT_KEY";
pub const JWKS_URL_ENV: &str = "CLERK_JWKS_URL";
pub const AUTHORIZED_PARTIES_ENV: &str = "CLERK_AUTHORIZED_PARTIES";
pub const DOMAIN_ENV: &str = "CLERK_DOMAIN";
pub const PROXY_URL_ENV: &str = "CLERK_PROXY_URL";
pub const IS_SATELLITE_ENV: &str = "CLERK_IS_SATELLITE";
pub const CLOCK_SKEW_MS_ENV: &str = "CLERK_CLOCK_SKEW_MS";
pub const ISSUER_ENV: &str = "CLERK_ISSUER";
pub const CARRY_TOKEN_PLACEMENT_ENV: &str = "CLERK_CARRY_TOKEN_PLACEMENT";
pub const LOCAL_SUFFIXES_ENV: &str = "CLERK_LOCAL_SUFFIXES";
pub const STAGING_SUFFIXES_ENV: &str = "CLERK_STAGING_SUFFIXES";
pub const DEVELOPMENT_SUFFIXES_ENV: &str = "CLERK_DEVELOPMENT_SUFFIXES";

/// Environment variable name for the server bind address.
pub const HOST_ENV: &str = "HOST";
/// Environment variable name for the server bind port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable name for the log output format.
pub const LOG_FORMAT_ENV: &str = "LOG_FORMAT";
/// Environment variable name for the log filter.
pub const LOG_FILTER_ENV: &str = "RUST_LOG";

pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_LOG_FILTER: &str = "info,tower_http=debug";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("invalid {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl ToString) -> Self {
        ConfigError::Invalid {
            name,
            reason: reason.to_string(),
        }
    }
}

/// Where verification keys come from.
#[derive(Clone, PartialEq, Eq)]
pub enum KeyConfig {
    /// `CLERK_JWT_KEY`; no network access needed
    Static(VerificationKey),
    /// Fetched and cached from a JWKS endpoint
    Jwks {
        url: String,
        secret_key: Option<String>,
    },
}

impl std::fmt::Debug for KeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyConfig::Static(key) => f.debug_tuple("Static").field(key).finish(),
            KeyConfig::Jwks { url, secret_key } => f
                .debug_struct("Jwks")
                .field("url", url)
                .field("secret_key", &secret_key.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}

/// Authentication settings.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub deployment: DeploymentConfig,
    pub keys: KeyConfig,
    pub suffixes: DomainSuffixes,
    /// Classification of the frontend API host
    pub frontend_api_kind: DomainKind,
}

impl AuthConfig {
    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let publishable_key = get(PUBLISHABLE_KEY_ENV).ok_or(ConfigError::Missing(PUBLISHABLE_KEY_ENV))?;
        let proxy_url = get(PROXY_URL_ENV);
        let domain = get(DOMAIN_ENV);

        let publishable = parse_publishable_key_with(
            &publishable_key,
            PublishableKeyOptions {
                proxy_url: proxy_url.as_deref(),
                domain: domain.as_deref(),
            },
        )
        .map_err(|e| ConfigError::invalid(PUBLISHABLE_KEY_ENV, e))?;

        let secret_key = get(SECRET_KEY_ENV);
        if let Some(secret_key) = secret_key.as_deref() {
            let secret = parse_secret_key(secret_key)
                .map_err(|e| ConfigError::invalid(SECRET_KEY_ENV, e))?;
            if secret.instance_type != publishable.instance_type {
                tracing::warn!(
                    publishable = ?publishable.instance_type,
                    secret = ?secret.instance_type,
                    "Publishable and secret keys belong to different instance types"
                );
            }
        }

        let mut suffixes = DomainSuffixes::default();
        if let Some(list) = get(LOCAL_SUFFIXES_ENV) {
            suffixes.local = split_list(&list);
        }
        if let Some(list) = get(STAGING_SUFFIXES_ENV) {
            suffixes.staging = split_list(&list);
        }
        if let Some(list) = get(DEVELOPMENT_SUFFIXES_ENV) {
            suffixes.development = split_list(&list);
        }

        let frontend_api_kind = suffixes.classify(&publishable.frontend_api).kind;
        if proxy_url.is_none() && !publishable.is_development() && !frontend_api_kind.is_production() {
            tracing::warn!(
                frontend_api = %publishable.frontend_api,
                kind = ?frontend_api_kind,
                "Production publishable key points at a non-production frontend API"
            );
        }

        let keys = if let Some(pem) = get(JWT_KEY_ENV) {
            KeyConfig::Static(
                VerificationKey::from_pem(&pem).map_err(|e| ConfigError::invalid(JWT_KEY_ENV, e))?,
            )
        } else if let Some(url) = get(JWKS_URL_ENV) {
            KeyConfig::Jwks { url, secret_key }
        } else if let Some(secret_key) = secret_key {
            KeyConfig::Jwks {
                url: format!(
                    "{}/v1/jwks",
                    api_url_from_frontend_api_with(&publishable.frontend_api, &suffixes)
                ),
                secret_key: Some(secret_key),
            }
        } else {
            KeyConfig::Jwks {
                url: frontend_api_jwks_url(&publishable.frontend_api),
                secret_key: None,
            }
        };

        let is_satellite = match get(IS_SATELLITE_ENV) {
            Some(value) => parse_bool(&value).ok_or_else(|| ConfigError::invalid(IS_SATELLITE_ENV, value))?,
            None => false,
        };
        if is_satellite && domain.is_none() && proxy_url.is_none() {
            return Err(ConfigError::invalid(
                IS_SATELLITE_ENV,
                "a satellite needs CLERK_DOMAIN or CLERK_PROXY_URL",
            ));
        }

        let mut deployment = DeploymentConfig::new(publishable);
        deployment.authorized_parties = get(AUTHORIZED_PARTIES_ENV)
            .map(|list| split_list(&list))
            .unwrap_or_default();
        if let Some(skew) = get(CLOCK_SKEW_MS_ENV) {
            let ms: u64 = skew
                .parse()
                .map_err(|e| ConfigError::invalid(CLOCK_SKEW_MS_ENV, e))?;
            deployment.clock_skew = Duration::from_millis(ms);
        }
        if let Some(placement) = get(CARRY_TOKEN_PLACEMENT_ENV) {
            deployment.carry_token_placement = placement
                .parse::<CarryTokenPlacement>()
                .map_err(|e| ConfigError::invalid(CARRY_TOKEN_PLACEMENT_ENV, e))?;
        }
        deployment.is_satellite = is_satellite;
        deployment.domain = domain;
        deployment.proxy_url = proxy_url;
        deployment.expected_issuer = get(ISSUER_ENV);

        Ok(Self {
            deployment,
            keys,
            suffixes,
            frontend_api_kind,
        })
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    #[default]
    Pretty,
}

/// HTTP server and logging settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_format: LogFormat,
    pub log_filter: String,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = match lookup(PORT_ENV) {
            Some(port) => port
                .trim()
                .parse()
                .map_err(|e| ConfigError::invalid(PORT_ENV, e))?,
            None => DEFAULT_PORT,
        };
        let log_format = match lookup(LOG_FORMAT_ENV).as_deref().map(str::trim) {
            None | Some("") | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => return Err(ConfigError::invalid(LOG_FORMAT_ENV, other)),
        };

        Ok(Self {
            host: lookup(HOST_ENV).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            log_format,
            log_filter: lookup(LOG_FILTER_ENV).unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn frontend_api_jwks_url(frontend_api: &str) -> String {
    let base = frontend_api.trim_end_matches('/');
    if base.starts_with("http://") || base.starts_with("https://") {
        format!("{base}/.well-known/jwks.json")
    } else {
        format!("https://{base}/.well-known/jwks.json")
    }
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}
