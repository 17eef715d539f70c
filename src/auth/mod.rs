// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Decides whether an inbound request is signed in, signed out, or needs a
//! handshake with the frontend API to re-sync its session cookies.
//!
//! ## Auth Flow
//!
//! 1. The middleware collects cookies (`__session`, `__client_uat`,
//!    `__clerk_db_jwt`), the `Authorization: Bearer` header and host
//!    information into `RequestAuthInputs`
//! 2. Verification keys are resolved: a static PEM key, or the JWKS cache
//!    (refetched once on an unknown `kid`)
//! 3. The resolver verifies the token:
//!    - signature (RSA, ECDSA P-256/P-384/secp256k1, Ed25519, HMAC)
//!    - `nbf`, `iat`, `exp` with clock skew tolerance
//!    - `azp` against the authorized parties, `iss` when configured
//! 4. The verdict is one of:
//!    - `SignedIn` → handlers receive an `AuthenticatedUser`
//!    - `SignedOut` → `Auth` rejects with 401, `OptionalAuth` yields `None`
//!    - `Handshake` → 307 to `<frontend api>/v1/client/handshake`
//!
//! ## Security
//!
//! - Header tokens never trigger a handshake
//! - Domain or origin mismatches sign the request out, never redirect
//! - Clock skew tolerance defaults to 5 seconds
//! - The core performs no I/O; only `jwks` talks to the network

pub mod authorization;
pub mod claims;
pub mod domain;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod handshake;
pub mod jwks;
pub mod middleware;
pub mod observer;
pub mod publishable_key;
pub mod resolver;
pub mod signature;
pub mod token;
pub mod verification_key;

#[cfg(test)]
pub(crate) mod test_support;

pub use authorization::{has, Authorization, OrgRole};
pub use claims::SessionClaims;
pub use engine::{AuthEngine, AuthEvent, AuthenticateInput};
pub use error::{AuthError, AuthErrorReason};
pub use extractor::{Auth, AuthObject, AuthenticatedUser, OptionalAuth, OrgAdmin};
pub use jwks::JwksManager;
pub use middleware::clerk_middleware;
pub use resolver::{AuthVerdict, DeploymentConfig, RequestAuthInputs};
