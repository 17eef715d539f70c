// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Publishable and secret key decoding.
//!
//! A publishable key is `pk_live_` or `pk_test_` followed by the base64
//! encoding of the frontend API hostname with a trailing `$`. The sentinel
//! catches truncated or hand-edited keys. Secret keys are opaque apart from
//! their `sk_live_` / `sk_test_` prefix.

use std::sync::Once;

use base64ct::{Base64, Base64Unpadded, Encoding};
use serde::Serialize;

use super::domain::{add_clerk_prefix, canonical_host, DomainKind, DomainSuffixes};
use super::error::AuthErrorReason;

pub const PUBLISHABLE_KEY_LIVE_PREFIX: &str = "pk_live_";
pub const PUBLISHABLE_KEY_TEST_PREFIX: &str = "pk_test_";
pub const SECRET_KEY_LIVE_PREFIX: &str = "sk_live_";
pub const SECRET_KEY_TEST_PREFIX: &str = "sk_test_";

/// Backend API base URLs, picked from the frontend API's environment.
pub const PROD_API_URL: &str = "https://api.clerk.com";
pub const STAGING_API_URL: &str = "https://api.clerkstage.dev";
pub const LOCAL_API_URL: &str = "https://api.lclclerk.com";

const FRONTEND_API_SENTINEL: char = '$';

/// Upper bound on the decoded key payload. DNS names top out at 253 bytes.
const MAX_DECODED_LEN: usize = 512;

/// Instance environment a key belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceType {
    Production,
    Development,
}

/// Decoded publishable key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishableKeyInfo {
    pub instance_type: InstanceType,
    pub frontend_api: String,
}

impl PublishableKeyInfo {
    pub fn is_development(&self) -> bool {
        self.instance_type == InstanceType::Development
    }
}

/// Overrides applied on top of the frontend API embedded in the key.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishableKeyOptions<'a> {
    /// Frontend API is served through this proxy URL instead.
    pub proxy_url: Option<&'a str>,
    /// Production satellite/custom domain; frontend API becomes `clerk.<domain>`.
    pub domain: Option<&'a str>,
}

/// Decoded secret key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretKeyInfo {
    pub instance_type: InstanceType,
}

/// Parse a publishable key into its instance type and frontend API host.
pub fn parse_publishable_key(key: &str) -> Result<PublishableKeyInfo, AuthErrorReason> {
    let (instance_type, encoded) =
        split_publishable_key(key).ok_or(AuthErrorReason::InvalidPublishableKey)?;

    let mut buf = [0u8; MAX_DECODED_LEN];
    let frontend_api =
        decode_frontend_api(encoded, &mut buf).ok_or(AuthErrorReason::InvalidPublishableKey)?;

    Ok(PublishableKeyInfo {
        instance_type,
        frontend_api: frontend_api.to_string(),
    })
}

/// Same checks as [`parse_publishable_key`], decoding into a stack buffer.
pub fn is_publishable_key(key: &str) -> bool {
    let Some((_, encoded)) = split_publishable_key(key) else {
        return false;
    };
    let mut buf = [0u8; MAX_DECODED_LEN];
    decode_frontend_api(encoded, &mut buf).is_some()
}

/// Parse a publishable key and apply proxy / domain overrides.
///
/// A proxy URL always wins. A domain only applies to production keys,
/// since development instances are always served from their own host.
pub fn parse_publishable_key_with(
    key: &str,
    options: PublishableKeyOptions<'_>,
) -> Result<PublishableKeyInfo, AuthErrorReason> {
    let mut info = parse_publishable_key(key)?;

    if let Some(proxy_url) = options.proxy_url.filter(|p| !p.trim().is_empty()) {
        info.frontend_api = proxy_url.trim().trim_end_matches('/').to_string();
    } else if let Some(domain) = options.domain.filter(|d| !d.trim().is_empty()) {
        if info.instance_type == InstanceType::Production {
            info.frontend_api = add_clerk_prefix(&canonical_host(domain));
        }
    }

    Ok(info)
}

/// Build the publishable key for a frontend API host.
///
/// Hosts that classify as anything but production get a `pk_test_` key.
pub fn build_publishable_key(frontend_api: &str) -> String {
    build_publishable_key_with(frontend_api, DomainSuffixes::builtin())
}

/// [`build_publishable_key`] with a custom suffix table.
pub fn build_publishable_key_with(frontend_api: &str, suffixes: &DomainSuffixes) -> String {
    let prefix = if suffixes.classify(frontend_api).kind.is_production() {
        PUBLISHABLE_KEY_LIVE_PREFIX
    } else {
        PUBLISHABLE_KEY_TEST_PREFIX
    };
    let payload = format!("{frontend_api}{FRONTEND_API_SENTINEL}");
    format!("{prefix}{}", Base64::encode_string(payload.as_bytes()))
}

/// Backend API base URL for the environment hosting `frontend_api`.
pub fn api_url_from_frontend_api(frontend_api: &str) -> &'static str {
    api_url_from_frontend_api_with(frontend_api, DomainSuffixes::builtin())
}

/// [`api_url_from_frontend_api`] with a custom suffix table.
pub fn api_url_from_frontend_api_with(
    frontend_api: &str,
    suffixes: &DomainSuffixes,
) -> &'static str {
    match suffixes.classify(frontend_api).kind {
        DomainKind::Local => LOCAL_API_URL,
        DomainKind::Staging => STAGING_API_URL,
        DomainKind::Development | DomainKind::Production => PROD_API_URL,
    }
}

/// Parse a secret key's instance type.
pub fn parse_secret_key(key: &str) -> Result<SecretKeyInfo, AuthErrorReason> {
    let instance_type = if key.len() > SECRET_KEY_LIVE_PREFIX.len()
        && key.starts_with(SECRET_KEY_LIVE_PREFIX)
    {
        InstanceType::Production
    } else if key.len() > SECRET_KEY_TEST_PREFIX.len() && key.starts_with(SECRET_KEY_TEST_PREFIX) {
        InstanceType::Development
    } else {
        return Err(AuthErrorReason::InvalidSecretKey);
    };
    Ok(SecretKeyInfo { instance_type })
}

pub fn is_development_from_secret_key(key: &str) -> bool {
    key.starts_with(SECRET_KEY_TEST_PREFIX)
}

pub fn is_production_from_secret_key(key: &str) -> bool {
    key.starts_with(SECRET_KEY_LIVE_PREFIX)
}

/// Legacy name from when secret keys were called API keys.
#[deprecated(note = "use `is_development_from_secret_key`")]
pub fn is_development_from_api_key(key: &str) -> bool {
    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        tracing::warn!(
            "is_development_from_api_key is deprecated, use is_development_from_secret_key"
        );
    });
    key.starts_with("test_") || is_development_from_secret_key(key)
}

fn split_publishable_key(key: &str) -> Option<(InstanceType, &str)> {
    let mut parts = key.splitn(3, '_');
    let instance_type = match (parts.next()?, parts.next()?) {
        ("pk", "live") => InstanceType::Production,
        ("pk", "test") => InstanceType::Development,
        _ => return None,
    };
    let encoded = parts.next()?;
    (!encoded.is_empty()).then_some((instance_type, encoded))
}

fn decode_frontend_api<'a>(encoded: &str, buf: &'a mut [u8]) -> Option<&'a str> {
    let decoded = Base64Unpadded::decode(encoded.trim_end_matches('='), buf).ok()?;
    let decoded = std::str::from_utf8(decoded).ok()?;
    decoded
        .strip_suffix(FRONTEND_API_SENTINEL)
        .filter(|host| !host.is_empty())
}
