// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Relational Auth - Request Authentication Core
//!
//! Decides whether an inbound HTTP request is signed in, signed out, or
//! needs a handshake with the identity provider's frontend API, and ships
//! a thin axum adapter plus a reference server.
//!
//! ## Modules
//!
//! - `auth` - Keys, tokens, signature and claim checks, resolver, handshake
//! - `api` - Reference HTTP routes (Axum)
//! - `config` - Environment configuration
//! - `logging` - Tracing subscriber setup
//! - `refresher` - Background JWKS refresh
//! - `state` - Shared application state

pub mod api;
pub mod auth;
pub mod config;
pub mod logging;
pub mod refresher;
pub mod state;
