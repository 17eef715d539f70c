// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Handshake round trip.
//!
//! When the resolver cannot decide locally it sends the browser to the
//! frontend API's handshake endpoint, which answers by redirecting back with
//! a signed `__clerk_handshake` token holding fresh cookies.
//!
//! Development instances additionally carry a dev-browser token between
//! origins. It travels either as a query parameter
//! (`?__clerk_db_jwt=<token>`) or as a fragment marker
//! (`#__clerk_db_jwt[<token>]`). Fragments never reach servers, so the
//! fragment form keeps the token out of access logs.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;
use url::Url;

use super::error::AuthErrorReason;
use super::signature;
use super::token::decode_jwt;
use super::verification_key::KeySource;

/// Dev-browser token name, used as query parameter, fragment marker and cookie.
pub const DEV_BROWSER_TOKEN: &str = "__clerk_db_jwt";

/// Query parameter carrying the signed handshake result back to the app.
pub const HANDSHAKE_TOKEN: &str = "__clerk_handshake";

/// Query parameter carrying the reason a handshake was started.
pub const HANDSHAKE_REASON: &str = "__clerk_hs_reason";

pub const REDIRECT_URL_PARAM: &str = "redirect_url";

/// Handshake endpoint path on the frontend API.
pub const HANDSHAKE_PATH: &str = "/v1/client/handshake";

/// Session cookie name.
pub const SESSION_COOKIE: &str = "__session";

/// Where the carry token is placed on a redirect URL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CarryTokenPlacement {
    /// Query parameter. Required when the next hop is a server.
    #[default]
    Query,
    /// Fragment marker. Never sent to servers.
    Fragment,
}

impl FromStr for CarryTokenPlacement {
    type Err = HandshakeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(CarryTokenPlacement::Query),
            "fragment" => Ok(CarryTokenPlacement::Fragment),
            other => Err(HandshakeError::InvalidPlacement(other.to_string())),
        }
    }
}

/// Why a handshake was started. Sent to the frontend API for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HandshakeReason {
    /// The session cookie expired while the client still reports a session
    SessionTokenExpired,
    /// The client reports a session but sent no session cookie
    #[serde(rename = "client-uat-but-no-session-token")]
    ClientUatWithoutSessionToken,
}

impl HandshakeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandshakeReason::SessionTokenExpired => "session-token-expired",
            HandshakeReason::ClientUatWithoutSessionToken => "client-uat-but-no-session-token",
        }
    }
}

impl std::fmt::Display for HandshakeReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("carry token must be a non-empty base64url token")]
    InvalidCarryToken,

    #[error("unknown carry token placement: {0}")]
    InvalidPlacement(String),

    #[error("handshake token rejected: {0}")]
    Token(#[from] AuthErrorReason),
}

/// Attach a carry token to `target_url`.
///
/// Any carry token already on the URL, in the query or the fragment, is
/// replaced.
pub fn build_redirect(
    target_url: &str,
    carry_token: &str,
    placement: CarryTokenPlacement,
) -> Result<String, HandshakeError> {
    if !is_carry_token(carry_token) {
        return Err(HandshakeError::InvalidCarryToken);
    }
    let (target_url, _) = consume_redirect(target_url);
    let mut url =
        Url::parse(&target_url).map_err(|e| HandshakeError::InvalidUrl(e.to_string()))?;

    match placement {
        CarryTokenPlacement::Query => {
            let carried = format!("{DEV_BROWSER_TOKEN}={carry_token}");
            let query = match url.query().filter(|q| !q.is_empty()) {
                Some(query) => format!("{query}&{carried}"),
                None => carried,
            };
            url.set_query(Some(&query));
        }
        CarryTokenPlacement::Fragment => {
            let fragment = format!(
                "{}{DEV_BROWSER_TOKEN}[{carry_token}]",
                url.fragment().unwrap_or_default()
            );
            url.set_fragment(Some(&fragment));
        }
    }

    Ok(url.to_string())
}

/// Split a carry token off `url`.
///
/// The fragment is checked first and wins when both locations carry a token;
/// both artifacts are removed either way. A token with characters outside the
/// base64url/JWT alphabet is stripped but not returned. Without a carry token
/// the input is returned unchanged.
pub fn consume_redirect(url: &str) -> (String, Option<String>) {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((before, fragment)) => (before, Some(fragment)),
        None => (url, None),
    };
    let (base, query) = match before_fragment.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (before_fragment, None),
    };

    let (clean_fragment, fragment_token) = match fragment {
        Some(fragment) => {
            let (rest, token) = take_fragment_marker(fragment);
            (Some(rest), token)
        }
        None => (None, None),
    };

    let mut query_token = None;
    let mut found_in_query = false;
    let clean_query = query.map(|query| {
        query
            .split('&')
            .filter(|pair| {
                if !is_carry_pair(pair) {
                    return true;
                }
                found_in_query = true;
                if query_token.is_none() {
                    query_token = form_urlencoded::parse(pair.as_bytes())
                        .next()
                        .map(|(_, value)| value.into_owned())
                        .filter(|value| !value.is_empty());
                }
                false
            })
            .collect::<Vec<_>>()
            .join("&")
    });

    let fragment_had_marker = matches!(
        (fragment, clean_fragment.as_deref()),
        (Some(original), Some(clean)) if original != clean
    );
    if !found_in_query && !fragment_had_marker {
        return (url.to_string(), None);
    }

    let mut clean = base.to_string();
    if let Some(query) = clean_query.filter(|q| !q.is_empty()) {
        clean.push('?');
        clean.push_str(&query);
    }
    if let Some(fragment) = clean_fragment.filter(|f| !f.is_empty()) {
        clean.push('#');
        clean.push_str(&fragment);
    }

    let token = fragment_token.or(query_token).filter(|t| is_carry_token(t));
    (clean, token)
}

/// Inputs for [`handshake_url`].
#[derive(Debug, Clone)]
pub struct HandshakeRequest<'a> {
    /// Frontend API host or proxy URL
    pub frontend_api: &'a str,
    /// Absolute URL the browser returns to afterwards
    pub redirect_url: &'a str,
    pub reason: HandshakeReason,
    /// Forwarded for development instances
    pub dev_browser_token: Option<&'a str>,
    pub placement: CarryTokenPlacement,
}

/// Build the frontend API handshake URL.
pub fn handshake_url(request: &HandshakeRequest<'_>) -> Result<String, HandshakeError> {
    let base = if request.frontend_api.starts_with("http://")
        || request.frontend_api.starts_with("https://")
    {
        request.frontend_api.to_string()
    } else {
        format!("https://{}", request.frontend_api)
    };
    let mut url = Url::parse(&base).map_err(|e| HandshakeError::InvalidUrl(e.to_string()))?;

    let path = format!("{}{HANDSHAKE_PATH}", url.path().trim_end_matches('/'));
    url.set_path(&path);

    // The app's own URL must not leak a stale dev-browser token back.
    let (redirect_url, _) = consume_redirect(request.redirect_url);
    url.query_pairs_mut()
        .clear()
        .append_pair(REDIRECT_URL_PARAM, &redirect_url)
        .append_pair(HANDSHAKE_REASON, request.reason.as_str());

    match request.dev_browser_token {
        Some(token) => build_redirect(url.as_str(), token, request.placement),
        None => Ok(url.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct HandshakeClaims {
    handshake: Vec<String>,
}

/// Verified contents of a `__clerk_handshake` token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakePayload {
    cookies: Vec<String>,
}

impl HandshakePayload {
    /// Decode and verify a handshake token against `keys`.
    pub fn verify(token: &str, keys: &KeySource) -> Result<Self, HandshakeError> {
        let jwt = decode_jwt::<HandshakeClaims>(token)?;
        let key = keys.resolve(jwt.header())?;
        if !signature::verify(&jwt, key)? {
            return Err(AuthErrorReason::SignatureInvalid.into());
        }
        Ok(Self {
            cookies: jwt.into_payload().handshake,
        })
    }

    /// `Set-Cookie` directives to forward to the browser.
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Value of a cookie set by the handshake. Empty values (cleared
    /// cookies) count as absent.
    pub fn cookie_value(&self, name: &str) -> Option<&str> {
        self.cookies.iter().find_map(|directive| {
            let pair = directive.split(';').next()?;
            let (key, value) = pair.split_once('=')?;
            (key.trim() == name && !value.trim().is_empty()).then(|| value.trim())
        })
    }

    /// The fresh session token, if the handshake signed the user in.
    pub fn session_token(&self) -> Option<&str> {
        self.cookie_value(SESSION_COOKIE)
    }
}

fn is_carry_token(token: &str) -> bool {
    !token.is_empty()
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn is_carry_pair(pair: &str) -> bool {
    let key = pair.split_once('=').map_or(pair, |(key, _)| key);
    key == DEV_BROWSER_TOKEN
}

/// Remove a `__clerk_db_jwt[...]` marker from a fragment.
fn take_fragment_marker(fragment: &str) -> (String, Option<String>) {
    let marker = format!("{DEV_BROWSER_TOKEN}[");
    let Some(start) = fragment.find(&marker) else {
        return (fragment.to_string(), None);
    };
    let token_start = start + marker.len();
    let Some(len) = fragment[token_start..].find(']') else {
        return (fragment.to_string(), None);
    };
    let token = &fragment[token_start..token_start + len];
    let rest = format!("{}{}", &fragment[..start], &fragment[token_start + len + 1..]);
    let token = (!token.is_empty()).then(|| token.to_string());
    (rest, token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::{rsa_public_key, sign_rs256};
    use serde_json::json;

    const TOKEN: &str = "eyJhbGciOiJIUzI1NiJ9.eyJkZXYiOjF9.c2lnbmF0dXJl";

    #[test]
    fn query_round_trip() {
        let url = build_redirect(
            "https://app.example.com/dashboard?tab=1",
            TOKEN,
            CarryTokenPlacement::Query,
        )
        .unwrap();
        assert_eq!(
            url,
            format!("https://app.example.com/dashboard?tab=1&__clerk_db_jwt={TOKEN}")
        );

        let (clean, token) = consume_redirect(&url);
        assert_eq!(clean, "https://app.example.com/dashboard?tab=1");
        assert_eq!(token.as_deref(), Some(TOKEN));
    }

    #[test]
    fn fragment_round_trip() {
        let url = build_redirect(
            "https://app.example.com/dashboard#section",
            TOKEN,
            CarryTokenPlacement::Fragment,
        )
        .unwrap();
        assert_eq!(
            url,
            format!("https://app.example.com/dashboard#section__clerk_db_jwt[{TOKEN}]")
        );

        let (clean, token) = consume_redirect(&url);
        assert_eq!(clean, "https://app.example.com/dashboard#section");
        assert!(!clean.contains(DEV_BROWSER_TOKEN));
        assert_eq!(token.as_deref(), Some(TOKEN));
    }

    #[test]
    fn build_replaces_existing_token() {
        let url = build_redirect(
            "https://app.example.com/?__clerk_db_jwt=old&x=y",
            TOKEN,
            CarryTokenPlacement::Query,
        )
        .unwrap();
        assert_eq!(url.matches(DEV_BROWSER_TOKEN).count(), 1);
        assert_eq!(consume_redirect(&url).1.as_deref(), Some(TOKEN));

        let url = build_redirect(
            "https://app.example.com/#__clerk_db_jwt[old]",
            TOKEN,
            CarryTokenPlacement::Fragment,
        )
        .unwrap();
        assert_eq!(url.matches(DEV_BROWSER_TOKEN).count(), 1);
    }

    #[test]
    fn build_moves_token_between_locations() {
        let url = build_redirect(
            "https://app.example.com/p#__clerk_db_jwt[old]",
            TOKEN,
            CarryTokenPlacement::Query,
        )
        .unwrap();
        assert_eq!(url, format!("https://app.example.com/p?__clerk_db_jwt={TOKEN}"));
        assert_eq!(consume_redirect(&url).1.as_deref(), Some(TOKEN));

        let url = build_redirect(
            "https://app.example.com/p?a=1&__clerk_db_jwt=old#top",
            TOKEN,
            CarryTokenPlacement::Fragment,
        )
        .unwrap();
        assert_eq!(url, format!("https://app.example.com/p?a=1#top__clerk_db_jwt[{TOKEN}]"));
        let (clean, token) = consume_redirect(&url);
        assert_eq!(clean, "https://app.example.com/p?a=1#top");
        assert_eq!(token.as_deref(), Some(TOKEN));
    }

    #[test]
    fn consume_drops_tokens_with_cookie_syntax() {
        let (clean, token) = consume_redirect(
            "https://app.example.com/me?__clerk_db_jwt=x%3B%20Domain%3Devil.test&a=1",
        );
        assert_eq!(clean, "https://app.example.com/me?a=1");
        assert_eq!(token, None);

        let (clean, token) = consume_redirect("https://app.example.com/me#__clerk_db_jwt[x;y]");
        assert_eq!(clean, "https://app.example.com/me");
        assert_eq!(token, None);
    }

    #[test]
    fn fragment_takes_precedence_over_query() {
        let url = "https://app.example.com/p?__clerk_db_jwt=from_query&a=1#__clerk_db_jwt[from_fragment]";
        let (clean, token) = consume_redirect(url);
        assert_eq!(token.as_deref(), Some("from_fragment"));
        assert_eq!(clean, "https://app.example.com/p?a=1");
    }

    #[test]
    fn consume_without_token_is_identity() {
        for url in [
            "https://app.example.com/p?a=%20b&c#frag",
            "https://app.example.com",
            "/relative/path?x=1",
            "https://app.example.com/?__clerk_db_jwtx=1#__clerk_db_jwt",
        ] {
            assert_eq!(consume_redirect(url), (url.to_string(), None));
        }
    }

    #[test]
    fn consume_drops_empty_separators() {
        let (clean, token) = consume_redirect("https://app.example.com/p?__clerk_db_jwt=abc");
        assert_eq!(clean, "https://app.example.com/p");
        assert_eq!(token.as_deref(), Some("abc"));

        let (clean, token) = consume_redirect("/p#__clerk_db_jwt[abc]");
        assert_eq!(clean, "/p");
        assert_eq!(token.as_deref(), Some("abc"));
    }

    #[test]
    fn rejects_bad_inputs() {
        assert_eq!(
            build_redirect("https://app.example.com", "", CarryTokenPlacement::Query),
            Err(HandshakeError::InvalidCarryToken)
        );
        assert_eq!(
            build_redirect("https://app.example.com", "a]b", CarryTokenPlacement::Fragment),
            Err(HandshakeError::InvalidCarryToken)
        );
        assert!(matches!(
            build_redirect("not a url", TOKEN, CarryTokenPlacement::Query),
            Err(HandshakeError::InvalidUrl(_))
        ));
    }

    #[test]
    fn placement_parses_from_config_strings() {
        assert_eq!("Query".parse::<CarryTokenPlacement>(), Ok(CarryTokenPlacement::Query));
        assert_eq!(" fragment ".parse::<CarryTokenPlacement>(), Ok(CarryTokenPlacement::Fragment));
        assert!("cookie".parse::<CarryTokenPlacement>().is_err());
    }

    #[test]
    fn handshake_url_for_production() {
        let url = handshake_url(&HandshakeRequest {
            frontend_api: "clerk.example.com",
            redirect_url: "https://example.com/account?x=1",
            reason: HandshakeReason::SessionTokenExpired,
            dev_browser_token: None,
            placement: CarryTokenPlacement::Query,
        })
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.host_str(), Some("clerk.example.com"));
        assert_eq!(parsed.path(), HANDSHAKE_PATH);
        let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                (
                    REDIRECT_URL_PARAM.to_string(),
                    "https://example.com/account?x=1".to_string()
                ),
                (
                    HANDSHAKE_REASON.to_string(),
                    "session-token-expired".to_string()
                ),
            ]
        );
    }

    #[test]
    fn handshake_url_through_proxy_carries_dev_token() {
        let url = handshake_url(&HandshakeRequest {
            frontend_api: "https://example.com/__clerk/",
            redirect_url: "https://example.com/?__clerk_db_jwt=stale",
            reason: HandshakeReason::ClientUatWithoutSessionToken,
            dev_browser_token: Some(TOKEN),
            placement: CarryTokenPlacement::Query,
        })
        .unwrap();

        let parsed = Url::parse(&url).unwrap();
        assert_eq!(parsed.path(), "/__clerk/v1/client/handshake");
        let redirect = parsed
            .query_pairs()
            .find(|(k, _)| k == REDIRECT_URL_PARAM)
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert_eq!(redirect, "https://example.com/");
        assert_eq!(consume_redirect(&url).1.as_deref(), Some(TOKEN));
    }

    #[test]
    fn handshake_payload_verifies_and_exposes_cookies() {
        let token = sign_rs256(
            None,
            &json!({
                "handshake": [
                    "__session=eyJ.abc.def; Path=/; Secure; SameSite=Lax",
                    "__client_uat=1700000000; Path=/; Max-Age=31536000",
                ]
            }),
        );
        let payload = HandshakePayload::verify(&token, &KeySource::Static(rsa_public_key()))
            .unwrap();
        assert_eq!(payload.cookies().len(), 2);
        assert_eq!(payload.session_token(), Some("eyJ.abc.def"));
        assert_eq!(payload.cookie_value("__client_uat"), Some("1700000000"));
    }

    #[test]
    fn handshake_payload_signed_out() {
        let token = sign_rs256(
            None,
            &json!({ "handshake": ["__session=; Path=/; Max-Age=0", "__client_uat=0; Path=/"] }),
        );
        let payload = HandshakePayload::verify(&token, &KeySource::Static(rsa_public_key()))
            .unwrap();
        assert_eq!(payload.session_token(), None);
    }

    #[test]
    fn handshake_payload_rejects_bad_signature() {
        let token = sign_rs256(None, &json!({ "handshake": [] }));
        let (head, _) = token.rsplit_once('.').unwrap();
        let forged = format!("{head}.AAAA");
        assert_eq!(
            HandshakePayload::verify(&forged, &KeySource::Static(rsa_public_key())),
            Err(HandshakeError::Token(AuthErrorReason::SignatureInvalid))
        );
    }
}
