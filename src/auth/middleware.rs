// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication middleware for Axum.
//!
//! Reads cookies, headers and host information into [`RequestAuthInputs`],
//! resolves key material, and runs the [`AuthEngine`]. Handlers read the
//! result through the extractors in `extractor.rs`.
//!
//! ## Responses produced here
//!
//! - `307` to the frontend API when the verdict is a handshake
//! - `307` back to the clean URL after a `__clerk_handshake` return,
//!   forwarding the handshake's `Set-Cookie` directives
//! - `307` to the clean URL when a development instance receives a
//!   dev-browser token in the query string (the token moves to a cookie)
//!
//! Signed-out requests are not rejected; protected handlers do that through
//! the `Auth` extractor.
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .route("/protected", get(protected_handler))
//!     .layer(axum::middleware::from_fn_with_state(state.clone(), clerk_middleware));
//! ```
//!
//! [`AuthEngine`]: super::engine::AuthEngine

use axum::{
    extract::{Request, State},
    http::{
        header::{
            ACCEPT, AUTHORIZATION, CACHE_CONTROL, HOST, LOCATION, ORIGIN, REFERER, SET_COOKIE,
            USER_AGENT,
        },
        HeaderMap, HeaderName, HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};

use super::engine::AuthenticateInput;
use super::error::{AuthError, AuthErrorReason};
use super::extractor::AuthObject;
use super::handshake::{
    consume_redirect, HandshakeError, HandshakePayload, DEV_BROWSER_TOKEN, HANDSHAKE_REASON,
    HANDSHAKE_TOKEN,
};
use super::resolver::{AuthVerdict, RequestAuthInputs, CLIENT_UAT_COOKIE, SESSION_COOKIE};
use super::token::decode_jwt;
use super::verification_key::KeySource;
use crate::state::AppState;

pub const AUTH_STATUS_HEADER: HeaderName = HeaderName::from_static("x-clerk-auth-status");
pub const AUTH_REASON_HEADER: HeaderName = HeaderName::from_static("x-clerk-auth-reason");

const FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
const FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
const SEC_FETCH_DEST: HeaderName = HeaderName::from_static("sec-fetch-dest");

/// Authenticate every request passing through.
pub async fn clerk_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let request_url = request_url(request.headers(), request.uri());

    if let Some(token) = query_param(request.uri().query(), HANDSHAKE_TOKEN) {
        return complete_handshake(&state, request_url.as_deref(), &token).await;
    }

    if state.engine.config().publishable_key.is_development() {
        if let Some(response) = persist_dev_browser_token(request_url.as_deref()) {
            return response;
        }
    }

    let mut inputs = read_inputs(request.headers());
    inputs.request_url = request_url;
    if let Some(token) = inputs.header_token.as_deref().or(inputs.cookie_token.as_deref()) {
        inputs.key_source = key_source_for(&state, token).await;
    }

    let verdict = state
        .engine
        .authenticate(&AuthenticateInput::Request(inputs));

    match verdict {
        AuthVerdict::Handshake {
            redirect_target,
            reason,
        } => {
            let mut response = redirect(&redirect_target);
            let headers = response.headers_mut();
            headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            headers.insert(AUTH_STATUS_HEADER, HeaderValue::from_static("handshake"));
            headers.insert(AUTH_REASON_HEADER, HeaderValue::from_static(reason.as_str()));
            response
        }
        verdict => {
            let Some(auth) = AuthObject::from_verdict(verdict) else {
                return AuthError::MiddlewareMissing.into_response();
            };
            let status = match &auth {
                AuthObject::SignedIn(_) => ("signed-in", None),
                AuthObject::SignedOut(reason) => ("signed-out", Some(reason.error_code())),
            };
            request.extensions_mut().insert(auth);

            let mut response = next.run(request).await;
            let headers = response.headers_mut();
            headers.insert(AUTH_STATUS_HEADER, HeaderValue::from_static(status.0));
            if let Some(reason) = status.1 {
                headers.insert(AUTH_REASON_HEADER, HeaderValue::from_static(reason));
            }
            response
        }
    }
}

/// Verify a `__clerk_handshake` return token and bounce back to the clean
/// URL with the cookies it carries.
async fn complete_handshake(state: &AppState, request_url: Option<&str>, token: &str) -> Response {
    let Some(request_url) = request_url else {
        return AuthError::Unauthenticated(AuthErrorReason::DomainMismatch).into_response();
    };

    let kid = decode_jwt::<serde_json::Value>(token)
        .ok()
        .and_then(|jwt| jwt.header().kid.clone());
    let payload = match state.keys.key_source_for(kid.as_deref()).await {
        Ok(keys) => HandshakePayload::verify(token, &keys),
        Err(e) => {
            tracing::warn!(error = %e, "Could not load keys for handshake verification");
            Err(HandshakeError::Token(AuthErrorReason::KeyNotFound))
        }
    };
    let payload = match payload {
        Ok(payload) => payload,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected handshake token");
            let reason = match e {
                HandshakeError::Token(reason) => reason,
                _ => AuthErrorReason::MalformedToken,
            };
            return AuthError::Unauthenticated(reason).into_response();
        }
    };

    let clean = strip_query_params(request_url, &[HANDSHAKE_TOKEN, HANDSHAKE_REASON]);
    let (clean, dev_browser_token) = consume_redirect(&clean);

    let mut response = redirect(&clean);
    let headers = response.headers_mut();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    for cookie in payload.cookies() {
        match HeaderValue::from_str(cookie) {
            Ok(value) => {
                headers.append(SET_COOKIE, value);
            }
            Err(_) => tracing::warn!("Skipping handshake cookie with invalid characters"),
        }
    }
    tracing::debug!(cookies = payload.cookies().len(), "Handshake completed");

    let mut jar = CookieJar::new();
    if let Some(token) = dev_browser_token {
        jar = jar.add(dev_browser_cookie(token));
    }
    (jar, response).into_response()
}

/// Move a dev-browser token from the URL into a cookie.
fn persist_dev_browser_token(request_url: Option<&str>) -> Option<Response> {
    let (clean, token) = consume_redirect(request_url?);
    let jar = CookieJar::new().add(dev_browser_cookie(token?));
    Some((jar, redirect(&clean)).into_response())
}

fn dev_browser_cookie(token: String) -> Cookie<'static> {
    Cookie::build((DEV_BROWSER_TOKEN, token))
        .path("/")
        .same_site(SameSite::Lax)
        .build()
}

async fn key_source_for(state: &AppState, token: &str) -> Option<KeySource> {
    let kid = decode_jwt::<serde_json::Value>(token)
        .ok()
        .and_then(|jwt| jwt.header().kid.clone());
    match state.keys.key_source_for(kid.as_deref()).await {
        Ok(keys) => Some(keys),
        Err(e) => {
            tracing::warn!(error = %e, "Could not load verification keys");
            None
        }
    }
}

fn read_inputs(headers: &HeaderMap) -> RequestAuthInputs {
    let header = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    };

    let jar = CookieJar::from_headers(headers);

    RequestAuthInputs {
        cookie_token: cookie(&jar, SESSION_COOKIE),
        client_uat: cookie(&jar, CLIENT_UAT_COOKIE).and_then(|v| v.parse().ok()),
        header_token: header(&AUTHORIZATION).and_then(|v| bearer_token(&v)),
        host: header(&HOST),
        forwarded_host: header(&FORWARDED_HOST),
        forwarded_proto: header(&FORWARDED_PROTO),
        origin: header(&ORIGIN),
        referrer: header(&REFERER),
        user_agent: header(&USER_AGENT),
        sec_fetch_dest: header(&SEC_FETCH_DEST),
        accept: header(&ACCEPT),
        request_url: None,
        dev_browser_token: cookie(&jar, DEV_BROWSER_TOKEN),
        key_source: None,
    }
}

fn cookie(jar: &CookieJar, name: &str) -> Option<String> {
    jar.get(name)
        .map(|c| c.value().trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Token from an `Authorization` value. The scheme is case-insensitive.
fn bearer_token(value: &str) -> Option<String> {
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Absolute URL of the request as the browser sees it.
fn request_url(headers: &HeaderMap, uri: &axum::http::Uri) -> Option<String> {
    let first = |name: &HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    let host = first(&FORWARDED_HOST)
        .or_else(|| first(&HOST))
        .or_else(|| uri.authority().map(|a| a.as_str()))?;
    let proto = first(&FORWARDED_PROTO)
        .or_else(|| uri.scheme_str())
        .unwrap_or("http");
    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    Some(format!("{proto}://{host}{path}"))
}

fn query_param(query: Option<&str>, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query?.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

fn strip_query_params(url: &str, names: &[&str]) -> String {
    let (before_fragment, fragment) = match url.split_once('#') {
        Some((before, fragment)) => (before, Some(fragment)),
        None => (url, None),
    };
    let Some((base, query)) = before_fragment.split_once('?') else {
        return url.to_string();
    };

    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| {
            let key = pair.split_once('=').map_or(*pair, |(key, _)| key);
            !pair.is_empty() && !names.contains(&key)
        })
        .collect();

    let mut clean = base.to_string();
    if !kept.is_empty() {
        clean.push('?');
        clean.push_str(&kept.join("&"));
    }
    if let Some(fragment) = fragment {
        clean.push('#');
        clean.push_str(fragment);
    }
    clean
}

fn redirect(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(location) => (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response(),
        Err(_) => {
            tracing::error!("Redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
