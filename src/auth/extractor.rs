// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! The middleware resolves every request once and stores an [`AuthObject`]
//! in the request extensions; these extractors only read it back.
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};
use serde::Serialize;

use super::authorization::{Authorization, OrgRole};
use super::claims::SessionClaims;
use super::error::{AuthError, AuthErrorReason};
use super::resolver::AuthVerdict;

/// A signed-in caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuthenticatedUser {
    /// `sub` claim
    pub user_id: String,
    /// `sid` claim
    pub session_id: Option<String>,
    /// Active organization, if any
    pub org_id: Option<String>,
    #[serde(skip)]
    pub claims: SessionClaims,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: SessionClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            session_id: claims.sid.clone(),
            org_id: claims.org_id.clone(),
            claims,
        }
    }

    /// Check a role or permission in the active organization.
    pub fn has(&self, requirement: &Authorization) -> bool {
        requirement.is_satisfied_by(&self.claims)
    }

    pub fn is_org_admin(&self) -> bool {
        self.has(&OrgRole::Admin.into())
    }
}

/// Per-request authentication state installed by the middleware.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthObject {
    SignedIn(AuthenticatedUser),
    SignedOut(AuthErrorReason),
}

impl AuthObject {
    /// `None` for a handshake, which never reaches a handler.
    pub fn from_verdict(verdict: AuthVerdict) -> Option<Self> {
        match verdict {
            AuthVerdict::SignedIn { claims, .. } => {
                Some(AuthObject::SignedIn(AuthenticatedUser::from_claims(claims)))
            }
            AuthVerdict::SignedOut { reason } => Some(AuthObject::SignedOut(reason)),
            AuthVerdict::Handshake { .. } => None,
        }
    }

    pub fn user(&self) -> Option<&AuthenticatedUser> {
        match self {
            AuthObject::SignedIn(user) => Some(user),
            AuthObject::SignedOut(_) => None,
        }
    }
}

/// Extractor for authenticated users. Rejects signed-out requests with 401.
pub struct Auth(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for Auth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<AuthObject>() {
            Some(AuthObject::SignedIn(user)) => Ok(Auth(user.clone())),
            Some(AuthObject::SignedOut(reason)) => Err(AuthError::Unauthenticated(*reason)),
            None => {
                tracing::error!("Auth extractor used on a route without the auth middleware");
                Err(AuthError::MiddlewareMissing)
            }
        }
    }
}

/// Extractor that requires the `org:admin` role in the active organization.
pub struct OrgAdmin(pub AuthenticatedUser);

impl<S> FromRequestParts<S> for OrgAdmin
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Auth(user) = Auth::from_request_parts(parts, state).await?;

        if !user.is_org_admin() {
            return Err(AuthError::InsufficientPermissions);
        }

        Ok(OrgAdmin(user))
    }
}

/// Optional authentication extractor.
///
/// Returns `None` for signed-out requests instead of rejecting. A missing
/// middleware is still an error.
pub struct OptionalAuth(pub Option<AuthenticatedUser>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Auth::from_request_parts(parts, state).await {
            Ok(Auth(user)) => Ok(OptionalAuth(Some(user))),
            Err(AuthError::Unauthenticated(_)) => Ok(OptionalAuth(None)),
            Err(e) => Err(e),
        }
    }
}
