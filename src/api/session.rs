// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::Json;
use serde::Serialize;

use crate::auth::{Auth, AuthenticatedUser, OptionalAuth, OrgAdmin};

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub signed_in: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<AuthenticatedUser>,
}

#[derive(Debug, Serialize)]
pub struct OrganizationResponse {
    pub org_id: Option<String>,
    pub org_role: Option<String>,
    pub permissions: Vec<String>,
}

/// The signed-in user. 401 when signed out.
pub async fn me(Auth(user): Auth) -> Json<AuthenticatedUser> {
    Json(user)
}

/// Session status; never rejects.
pub async fn session(OptionalAuth(user): OptionalAuth) -> Json<SessionResponse> {
    Json(SessionResponse {
        signed_in: user.is_some(),
        user,
    })
}

/// Active organization of an `org:admin`. 403 for other roles.
pub async fn organization(OrgAdmin(user): OrgAdmin) -> Json<OrganizationResponse> {
    Json(OrganizationResponse {
        org_id: user.org_id.clone(),
        org_role: user.claims.org_role.clone(),
        permissions: user.claims.org_permissions.clone().unwrap_or_default(),
    })
}
