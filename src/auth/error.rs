// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authentication errors.
//!
//! [`AuthErrorReason`] is the closed taxonomy every core operation reports.
//! It is also the `reason` carried by a signed-out verdict, so a failure
//! keeps its original cause all the way to the adapter.
//!
//! [`AuthError`] is the HTTP-facing rejection used by the axum extractors.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Why a request is not signed in, or why a key/token could not be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum AuthErrorReason {
    /// No session token and no active client on the request
    #[error("No session token was found on the request")]
    NoToken,
    /// Token is not three well-formed base64url segments of JSON
    #[error("Token is malformed")]
    MalformedToken,
    /// Token header declares an algorithm we do not verify
    #[error("Token algorithm is not supported")]
    UnsupportedAlgorithm,
    /// Token signature does not verify under the supplied key
    #[error("Token signature is invalid")]
    SignatureInvalid,
    /// Token has expired (beyond the clock skew tolerance)
    #[error("Token has expired")]
    TokenExpired,
    /// Token is not valid yet (`nbf` or `iat` in the future)
    #[error("Token is not yet valid")]
    TokenNotYetValid,
    /// Token `azp` is not one of the configured authorized parties
    #[error("Token authorized party is not permitted")]
    AuthorizedPartyMismatch,
    /// Request host/origin is inconsistent with the deployment's domains
    #[error("Request domain does not match the deployment configuration")]
    DomainMismatch,
    /// Publishable key is not `pk_live_`/`pk_test_` + base64(host + `$`)
    #[error("Publishable key is invalid")]
    InvalidPublishableKey,
    /// Secret key is not `sk_live_`/`sk_test_`
    #[error("Secret key is invalid")]
    InvalidSecretKey,
    /// Token issuer does not match the configured issuer
    #[error("Token issuer is invalid")]
    InvalidIssuer,
    /// No key in the key set matches the token's key id
    #[error("No matching verification key was found")]
    KeyNotFound,
    /// Key material could not be parsed
    #[error("Verification key is invalid")]
    InvalidVerificationKey,
}

impl AuthErrorReason {
    /// Stable machine-readable code, used in logs and response bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthErrorReason::NoToken => "no_token",
            AuthErrorReason::MalformedToken => "malformed_token",
            AuthErrorReason::UnsupportedAlgorithm => "unsupported_algorithm",
            AuthErrorReason::SignatureInvalid => "signature_invalid",
            AuthErrorReason::TokenExpired => "token_expired",
            AuthErrorReason::TokenNotYetValid => "token_not_yet_valid",
            AuthErrorReason::AuthorizedPartyMismatch => "authorized_party_mismatch",
            AuthErrorReason::DomainMismatch => "domain_mismatch",
            AuthErrorReason::InvalidPublishableKey => "invalid_publishable_key",
            AuthErrorReason::InvalidSecretKey => "invalid_secret_key",
            AuthErrorReason::InvalidIssuer => "invalid_issuer",
            AuthErrorReason::KeyNotFound => "key_not_found",
            AuthErrorReason::InvalidVerificationKey => "invalid_verification_key",
        }
    }
}

/// HTTP-facing authentication error.
#[derive(Debug)]
pub enum AuthError {
    /// The request is signed out (or was never signed in)
    Unauthenticated(AuthErrorReason),
    /// The auth middleware did not run for this route
    MiddlewareMissing,
    /// Signed in, but the authorization check failed
    InsufficientPermissions,
}

#[derive(Serialize)]
struct AuthErrorBody {
    error: String,
    error_code: String,
}

impl AuthError {
    /// Get the error code for this error.
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::Unauthenticated(reason) => reason.error_code(),
            AuthError::MiddlewareMissing => "internal_error",
            AuthError::InsufficientPermissions => "insufficient_permissions",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            AuthError::InsufficientPermissions => StatusCode::FORBIDDEN,
            AuthError::MiddlewareMissing => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthError::Unauthenticated(reason) => write!(f, "{reason}"),
            AuthError::MiddlewareMissing => {
                write!(f, "Internal authentication error: auth middleware is not installed")
            }
            AuthError::InsufficientPermissions => {
                write!(f, "Insufficient permissions for this operation")
            }
        }
    }
}

impl std::error::Error for AuthError {}

impl From<AuthErrorReason> for AuthError {
    fn from(reason: AuthErrorReason) -> Self {
        AuthError::Unauthenticated(reason)
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(AuthErrorBody {
            error: self.to_string(),
            error_code: self.error_code().to_string(),
        });
        (status, body).into_response()
    }
}
