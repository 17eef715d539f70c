// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session token claims and their validation.
//!
//! ## Checks (in order, first failure wins)
//!
//! 1. `nbf` ≤ now + skew, then `iat` ≤ now + skew → otherwise `TokenNotYetValid`
//! 2. now ≤ `exp` + skew → otherwise `TokenExpired`
//! 3. `azp` is one of the authorized parties (when both are present)
//!
//! The same skew is applied in both directions, so it can widen a token's
//! window by at most the configured amount on each side.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::AuthErrorReason;

/// Default clock skew tolerance (5 seconds).
pub const DEFAULT_CLOCK_SKEW: Duration = Duration::from_secs(5);

/// Claims carried by a session token.
///
/// Session tokens contain standard JWT claims plus session and organization
/// claims. Anything else (JWT template fields, feature flags) lands in
/// `custom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,

    /// Session ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Issued at timestamp
    pub iat: i64,

    /// Expiration timestamp
    pub exp: i64,

    /// Not before timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,

    /// Issuer (frontend API URL)
    #[serde(default)]
    pub iss: String,

    /// Authorized party (origin that requested the token)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azp: Option<String>,

    /// Active organization ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,

    /// Role in the active organization (e.g. `org:admin`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_role: Option<String>,

    /// Active organization slug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_slug: Option<String>,

    /// Permissions granted in the active organization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_permissions: Option<Vec<String>>,

    /// Actor claim, present when the session is an impersonation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub act: Option<serde_json::Value>,

    /// Every other claim
    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// Organization-scoped view of the claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrganizationClaims<'a> {
    pub id: &'a str,
    pub role: Option<&'a str>,
    pub slug: Option<&'a str>,
    pub permissions: &'a [String],
}

impl SessionClaims {
    /// Organization claims, if the session has an active organization.
    pub fn organization(&self) -> Option<OrganizationClaims<'_>> {
        let id = self.org_id.as_deref()?;
        Some(OrganizationClaims {
            id,
            role: self.org_role.as_deref(),
            slug: self.org_slug.as_deref(),
            permissions: self.org_permissions.as_deref().unwrap_or_default(),
        })
    }

    /// Look up a custom claim.
    pub fn get_claim(&self, key: &str) -> Option<&serde_json::Value> {
        self.custom.get(key)
    }
}

/// Claims that passed [`validate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ValidClaims(SessionClaims);

impl ValidClaims {
    pub fn claims(&self) -> &SessionClaims {
        &self.0
    }

    pub fn into_inner(self) -> SessionClaims {
        self.0
    }
}

/// Validate time-based claims and the authorized party.
///
/// An empty `authorized_parties` list disables the `azp` check, as does a
/// token without an `azp` claim.
pub fn validate(
    payload: SessionClaims,
    authorized_parties: &[String],
    now: DateTime<Utc>,
    skew: Duration,
) -> Result<ValidClaims, AuthErrorReason> {
    let now_ms = now.timestamp_millis();
    let skew_ms = i64::try_from(skew.as_millis()).unwrap_or(i64::MAX);
    let latest_acceptable_start = now_ms.saturating_add(skew_ms);

    if let Some(nbf) = payload.nbf {
        if seconds_to_millis(nbf) > latest_acceptable_start {
            return Err(AuthErrorReason::TokenNotYetValid);
        }
    }
    if seconds_to_millis(payload.iat) > latest_acceptable_start {
        return Err(AuthErrorReason::TokenNotYetValid);
    }

    if seconds_to_millis(payload.exp).saturating_add(skew_ms) < now_ms {
        return Err(AuthErrorReason::TokenExpired);
    }

    if let Some(azp) = payload.azp.as_deref() {
        if !authorized_parties.is_empty() && !authorized_parties.iter().any(|p| p == azp) {
            return Err(AuthErrorReason::AuthorizedPartyMismatch);
        }
    }

    Ok(ValidClaims(payload))
}

/// Check `iss` against the expected issuer. Trailing slashes are ignored.
pub fn validate_issuer(payload: &SessionClaims, expected: &str) -> Result<(), AuthErrorReason> {
    if payload.iss.trim_end_matches('/') == expected.trim_end_matches('/') {
        Ok(())
    } else {
        Err(AuthErrorReason::InvalidIssuer)
    }
}

fn seconds_to_millis(seconds: i64) -> i64 {
    seconds.saturating_mul(1000)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).unwrap()
    }

    fn sample_claims() -> SessionClaims {
        SessionClaims {
            sub: "user_123".to_string(),
            sid: Some("sess_abc".to_string()),
            iat: NOW - 30,
            exp: NOW + 30,
            nbf: Some(NOW - 40),
            iss: "https://clerk.example.com".to_string(),
            azp: Some("https://example.com".to_string()),
            org_id: None,
            org_role: None,
            org_slug: None,
            org_permissions: None,
            act: None,
            custom: Default::default(),
        }
    }

    fn parties(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn accepts_fresh_token() {
        let valid = validate(sample_claims(), &[], now(), DEFAULT_CLOCK_SKEW).unwrap();
        assert_eq!(valid.claims().sub, "user_123");
    }

    #[test]
    fn expiry_within_skew_passes() {
        let mut claims = sample_claims();
        claims.exp = NOW - 2;
        assert!(validate(claims, &[], now(), DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn expiry_beyond_skew_fails() {
        let mut claims = sample_claims();
        claims.exp = NOW - 10;
        assert_eq!(
            validate(claims, &[], now(), DEFAULT_CLOCK_SKEW),
            Err(AuthErrorReason::TokenExpired)
        );
    }

    #[test]
    fn expiry_boundary_is_inclusive() {
        let skew = Duration::from_secs(5);
        for offset in -20i64..=20 {
            let mut claims = sample_claims();
            claims.exp = NOW + offset;
            claims.azp = Some("https://elsewhere.test".to_string());
            let result = validate(claims, &parties(&["https://example.com"]), now(), skew);
            if NOW + offset < NOW - 5 {
                assert_eq!(result, Err(AuthErrorReason::TokenExpired), "offset {offset}");
            } else {
                // The expiry check passes; the azp check fails afterwards.
                assert_eq!(
                    result,
                    Err(AuthErrorReason::AuthorizedPartyMismatch),
                    "offset {offset}"
                );
            }
        }
    }

    #[test]
    fn not_before_in_future_fails() {
        let mut claims = sample_claims();
        claims.nbf = Some(NOW + 10);
        assert_eq!(
            validate(claims, &[], now(), DEFAULT_CLOCK_SKEW),
            Err(AuthErrorReason::TokenNotYetValid)
        );

        let mut claims = sample_claims();
        claims.nbf = Some(NOW + 4);
        assert!(validate(claims, &[], now(), DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn issued_in_future_fails() {
        let mut claims = sample_claims();
        claims.iat = NOW + 60;
        assert_eq!(
            validate(claims, &[], now(), DEFAULT_CLOCK_SKEW),
            Err(AuthErrorReason::TokenNotYetValid)
        );
    }

    #[test]
    fn not_before_checked_before_expiry() {
        let mut claims = sample_claims();
        claims.nbf = Some(NOW + 100);
        claims.exp = NOW - 100;
        assert_eq!(
            validate(claims, &[], now(), DEFAULT_CLOCK_SKEW),
            Err(AuthErrorReason::TokenNotYetValid)
        );
    }

    #[test]
    fn authorized_party_must_be_listed() {
        let list = parties(&["https://app.example.com"]);
        assert_eq!(
            validate(sample_claims(), &list, now(), DEFAULT_CLOCK_SKEW),
            Err(AuthErrorReason::AuthorizedPartyMismatch)
        );

        let list = parties(&["https://app.example.com", "https://example.com"]);
        assert!(validate(sample_claims(), &list, now(), DEFAULT_CLOCK_SKEW).is_ok());

        let mut claims = sample_claims();
        claims.azp = None;
        assert!(validate(claims, &list, now(), DEFAULT_CLOCK_SKEW).is_ok());
    }

    #[test]
    fn extreme_timestamps_do_not_overflow() {
        let mut claims = sample_claims();
        claims.exp = i64::MAX;
        claims.iat = i64::MIN;
        claims.nbf = Some(i64::MIN);
        assert!(validate(claims, &[], now(), Duration::MAX).is_ok());
    }

    #[test]
    fn issuer_check_ignores_trailing_slash() {
        let claims = sample_claims();
        assert!(validate_issuer(&claims, "https://clerk.example.com/").is_ok());
        assert_eq!(
            validate_issuer(&claims, "https://clerk.other.com"),
            Err(AuthErrorReason::InvalidIssuer)
        );
    }

    #[test]
    fn organization_view() {
        let mut claims = sample_claims();
        assert!(claims.organization().is_none());
        claims.org_id = Some("org_1".to_string());
        claims.org_role = Some("org:admin".to_string());
        let org = claims.organization().unwrap();
        assert_eq!(org.id, "org_1");
        assert_eq!(org.role, Some("org:admin"));
        assert!(org.permissions.is_empty());
    }
}
