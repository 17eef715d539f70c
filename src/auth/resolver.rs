// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Request authentication state.
//!
//! Combines the request's token, cookies and host headers with the
//! deployment configuration into one [`AuthVerdict`] per request.
//!
//! ## Decision order
//!
//! 1. No session cookie, no bearer token, no active `__client_uat` → signed out
//!    (`no_token`).
//! 2. Bearer token → verify it; signed in or signed out. Never a handshake,
//!    there is no browser to redirect.
//! 3. Cookie path: the host must be consistent with the deployment first
//!    (`domain_mismatch` otherwise, never a handshake).
//! 4. Session cookie verifies → signed in. Expired while `__client_uat` says
//!    the browser holds a session → handshake. Active `__client_uat` and no
//!    cookie at all → handshake.
//! 5. Everything else → signed out with the original reason.
//!
//! A handshake is only issued for document navigations; other requests get
//! the signed-out verdict the handshake would have replaced.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::claims::{self, SessionClaims, ValidClaims, DEFAULT_CLOCK_SKEW};
use super::domain::{host_matches, same_origin};
use super::error::AuthErrorReason;
use super::handshake::{self, CarryTokenPlacement, HandshakeReason, HandshakeRequest};
use super::publishable_key::PublishableKeyInfo;
use super::signature;
use super::token;
use super::verification_key::KeySource;

/// Session cookie name.
pub const SESSION_COOKIE: &str = handshake::SESSION_COOKIE;

/// Cookie holding the client's last session update time (seconds; `0` when
/// signed out).
pub const CLIENT_UAT_COOKIE: &str = "__client_uat";

/// Everything the resolver reads from one request.
#[derive(Debug, Clone, Default)]
pub struct RequestAuthInputs {
    /// `__session` cookie
    pub cookie_token: Option<String>,
    /// `__client_uat` cookie
    pub client_uat: Option<i64>,
    /// `Authorization: Bearer` token
    pub header_token: Option<String>,
    pub host: Option<String>,
    /// First value of `X-Forwarded-Host`
    pub forwarded_host: Option<String>,
    /// First value of `X-Forwarded-Proto`
    pub forwarded_proto: Option<String>,
    pub origin: Option<String>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub sec_fetch_dest: Option<String>,
    pub accept: Option<String>,
    /// Absolute URL of the request, used as the handshake return address
    pub request_url: Option<String>,
    /// `__clerk_db_jwt` from the URL or cookie (development instances)
    pub dev_browser_token: Option<String>,
    /// Key material resolved by the caller
    pub key_source: Option<KeySource>,
}

impl RequestAuthInputs {
    /// Host the request was addressed to, preferring the forwarded host.
    pub fn effective_host(&self) -> Option<&str> {
        self.forwarded_host
            .as_deref()
            .or(self.host.as_deref())
            .map(|h| h.split(',').next().unwrap_or(h).trim())
            .filter(|h| !h.is_empty())
    }

    fn client_is_active(&self) -> bool {
        self.client_uat.is_some_and(|uat| uat > 0)
    }

    /// Whether a redirect can reach a browser: document or iframe
    /// navigations, judged by `Sec-Fetch-Dest`, then `Accept`, then the
    /// user agent.
    pub fn is_document_request(&self) -> bool {
        if let Some(dest) = self.sec_fetch_dest.as_deref() {
            return dest == "document" || dest == "iframe";
        }
        if let Some(accept) = self.accept.as_deref() {
            return accept.contains("text/html");
        }
        self.user_agent
            .as_deref()
            .is_some_and(|ua| ua.starts_with("Mozilla/") || ua.contains("AppleWebKit"))
    }
}

/// Deployment-wide settings passed alongside every request.
#[derive(Debug, Clone)]
pub struct DeploymentConfig {
    /// Parsed publishable key (frontend API already proxy/domain adjusted)
    pub publishable_key: PublishableKeyInfo,
    /// Origins allowed in the `azp` claim. Empty disables the check.
    pub authorized_parties: Vec<String>,
    pub clock_skew: Duration,
    pub is_satellite: bool,
    /// Domain this deployment serves (required for satellites without a proxy)
    pub domain: Option<String>,
    pub proxy_url: Option<String>,
    /// Checked against `iss` when set
    pub expected_issuer: Option<String>,
    /// Placement of the dev-browser token on the handshake URL
    pub carry_token_placement: CarryTokenPlacement,
}

impl DeploymentConfig {
    pub fn new(publishable_key: PublishableKeyInfo) -> Self {
        Self {
            publishable_key,
            authorized_parties: Vec::new(),
            clock_skew: DEFAULT_CLOCK_SKEW,
            is_satellite: false,
            domain: None,
            proxy_url: None,
            expected_issuer: None,
            carry_token_placement: CarryTokenPlacement::default(),
        }
    }

    fn handshake_base(&self) -> &str {
        self.proxy_url
            .as_deref()
            .unwrap_or(&self.publishable_key.frontend_api)
    }
}

/// Outcome of resolving one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AuthVerdict {
    SignedIn {
        session_id: Option<String>,
        user_id: String,
        claims: SessionClaims,
    },
    SignedOut {
        reason: AuthErrorReason,
    },
    Handshake {
        redirect_target: String,
        reason: HandshakeReason,
    },
}

impl AuthVerdict {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, AuthVerdict::SignedIn { .. })
    }

    fn signed_in(valid: ValidClaims) -> Self {
        let claims = valid.into_inner();
        AuthVerdict::SignedIn {
            session_id: claims.sid.clone(),
            user_id: claims.sub.clone(),
            claims,
        }
    }
}

/// Resolve a request against the current time.
pub fn resolve(inputs: &RequestAuthInputs, config: &DeploymentConfig) -> AuthVerdict {
    resolve_at(inputs, config, Utc::now())
}

/// Resolve a request at a fixed instant.
pub fn resolve_at(
    inputs: &RequestAuthInputs,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> AuthVerdict {
    let verdict = decide(inputs, config, now);
    match &verdict {
        AuthVerdict::SignedIn { user_id, .. } => {
            tracing::debug!(user_id = %user_id, "Request signed in");
        }
        AuthVerdict::SignedOut { reason } => {
            tracing::debug!(reason = reason.error_code(), "Request signed out");
        }
        AuthVerdict::Handshake { reason, .. } => {
            tracing::debug!(reason = %reason, "Request needs handshake");
        }
    }
    verdict
}

fn decide(inputs: &RequestAuthInputs, config: &DeploymentConfig, now: DateTime<Utc>) -> AuthVerdict {
    if let Some(token) = inputs.header_token.as_deref() {
        return match verify_request_token(token, inputs, config, now) {
            Ok(valid) => AuthVerdict::signed_in(valid),
            Err(reason) => AuthVerdict::SignedOut { reason },
        };
    }

    let client_active = inputs.client_is_active();
    if inputs.cookie_token.is_none() && !client_active {
        return AuthVerdict::SignedOut {
            reason: AuthErrorReason::NoToken,
        };
    }

    if !domain_is_consistent(inputs, config) {
        return AuthVerdict::SignedOut {
            reason: AuthErrorReason::DomainMismatch,
        };
    }

    let Some(token) = inputs.cookie_token.as_deref() else {
        return handshake_or(
            inputs,
            config,
            HandshakeReason::ClientUatWithoutSessionToken,
            AuthErrorReason::NoToken,
        );
    };

    match verify_request_token(token, inputs, config, now) {
        Ok(valid) => AuthVerdict::signed_in(valid),
        Err(AuthErrorReason::TokenExpired) if client_active => handshake_or(
            inputs,
            config,
            HandshakeReason::SessionTokenExpired,
            AuthErrorReason::TokenExpired,
        ),
        Err(reason) => AuthVerdict::SignedOut { reason },
    }
}

/// Verify a session token end to end: decode, resolve the key, check the
/// signature, then the claims.
pub fn verify_token(
    token: &str,
    keys: &KeySource,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> Result<ValidClaims, AuthErrorReason> {
    let jwt = token::decode(token)?;
    let key = keys.resolve(jwt.header())?;
    if !signature::verify(&jwt, key)? {
        return Err(AuthErrorReason::SignatureInvalid);
    }
    let valid = claims::validate(
        jwt.into_payload(),
        &config.authorized_parties,
        now,
        config.clock_skew,
    )?;
    if let Some(issuer) = config.expected_issuer.as_deref() {
        claims::validate_issuer(valid.claims(), issuer)?;
    }
    Ok(valid)
}

fn verify_request_token(
    token: &str,
    inputs: &RequestAuthInputs,
    config: &DeploymentConfig,
    now: DateTime<Utc>,
) -> Result<ValidClaims, AuthErrorReason> {
    let keys = inputs
        .key_source
        .as_ref()
        .ok_or(AuthErrorReason::KeyNotFound)?;
    verify_token(token, keys, config, now)
}

fn domain_is_consistent(inputs: &RequestAuthInputs, config: &DeploymentConfig) -> bool {
    if config.is_satellite && config.domain.is_none() && config.proxy_url.is_none() {
        tracing::warn!("Satellite deployment has neither a domain nor a proxy URL");
        return false;
    }

    let host = inputs.effective_host();
    if let Some(domain) = config.domain.as_deref() {
        if !host.is_some_and(|h| host_matches(h, domain)) {
            return false;
        }
    }

    if let (Some(origin), Some(host)) = (inputs.origin.as_deref(), host) {
        if !same_origin(origin, host, inputs.forwarded_proto.as_deref()) {
            return false;
        }
    }

    true
}

fn handshake_or(
    inputs: &RequestAuthInputs,
    config: &DeploymentConfig,
    reason: HandshakeReason,
    fallback: AuthErrorReason,
) -> AuthVerdict {
    let signed_out = AuthVerdict::SignedOut { reason: fallback };
    if !inputs.is_document_request() {
        return signed_out;
    }
    let Some(redirect_url) = inputs.request_url.as_deref() else {
        return signed_out;
    };

    let dev_browser_token = if config.publishable_key.is_development() {
        inputs.dev_browser_token.as_deref()
    } else {
        None
    };
    let request = HandshakeRequest {
        frontend_api: config.handshake_base(),
        redirect_url,
        reason,
        dev_browser_token,
        placement: config.carry_token_placement,
    };
    match handshake::handshake_url(&request) {
        Ok(redirect_target) => AuthVerdict::Handshake {
            redirect_target,
            reason,
        },
        Err(e) => {
            tracing::warn!(error = %e, "Failed to build handshake URL");
            signed_out
        }
    }
}
