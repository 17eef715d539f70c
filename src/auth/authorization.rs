// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Organization role and permission checks.
//!
//! ## Conventions
//!
//! - Roles and permissions are scoped to the session's active organization
//! - Keys carry an `org:` prefix (`org:admin`, `org:invoices:read`); a check
//!   written without it is prefixed automatically
//! - A session without an active organization satisfies no check

use serde::{Deserialize, Serialize};

use super::claims::SessionClaims;

const ORG_PREFIX: &str = "org:";

/// Built-in organization roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrgRole {
    /// `org:admin`
    Admin,
    /// `org:member`
    Member,
}

impl OrgRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrgRole::Admin => "org:admin",
            OrgRole::Member => "org:member",
        }
    }
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One authorization requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Authorization {
    Role(String),
    Permission(String),
}

impl Authorization {
    pub fn role(role: impl AsRef<str>) -> Self {
        Authorization::Role(with_org_prefix(role.as_ref()))
    }

    pub fn permission(permission: impl AsRef<str>) -> Self {
        Authorization::Permission(with_org_prefix(permission.as_ref()))
    }

    /// Check the requirement against verified claims.
    pub fn is_satisfied_by(&self, claims: &SessionClaims) -> bool {
        let Some(org) = claims.organization() else {
            return false;
        };
        match self {
            Authorization::Role(role) => org.role == Some(role.as_str()),
            Authorization::Permission(permission) => {
                org.permissions.iter().any(|p| p == permission)
            }
        }
    }
}

impl From<OrgRole> for Authorization {
    fn from(role: OrgRole) -> Self {
        Authorization::Role(role.as_str().to_string())
    }
}

/// Shorthand for [`Authorization::is_satisfied_by`].
pub fn has(claims: &SessionClaims, requirement: &Authorization) -> bool {
    requirement.is_satisfied_by(claims)
}

fn with_org_prefix(key: &str) -> String {
    if key.starts_with(ORG_PREFIX) {
        key.to_string()
    } else {
        format!("{ORG_PREFIX}{key}")
    }
}
