// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Entry point for framework adapters.
//!
//! [`AuthEngine`] pairs a [`DeploymentConfig`] with an observer list. Input
//! arrives as an explicit [`AuthenticateInput`]: either everything read from
//! a request, or a bare token from a caller with no request at hand.

use chrono::{DateTime, Utc};

use super::observer::{Observers, Subscription};
use super::resolver::{self, AuthVerdict, DeploymentConfig, RequestAuthInputs};
use super::verification_key::KeySource;

/// What to authenticate.
#[derive(Debug, Clone)]
pub enum AuthenticateInput {
    /// Cookies, headers and host information from an HTTP request
    Request(RequestAuthInputs),
    /// A session token on its own (machine clients, background jobs)
    Token { token: String, key_source: KeySource },
}

/// Emitted after every authentication.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthEvent {
    pub verdict: AuthVerdict,
    pub at: DateTime<Utc>,
}

/// Authentication engine shared by all requests of a deployment.
#[derive(Debug)]
pub struct AuthEngine {
    config: DeploymentConfig,
    observers: Observers<AuthEvent>,
}

impl AuthEngine {
    pub fn new(config: DeploymentConfig) -> Self {
        Self {
            config,
            observers: Observers::new(),
        }
    }

    pub fn config(&self) -> &DeploymentConfig {
        &self.config
    }

    /// Receive an [`AuthEvent`] for every verdict until the returned
    /// subscription is dropped.
    #[must_use = "dropping the subscription unsubscribes the listener"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription<AuthEvent>
    where
        F: Fn(&AuthEvent) + Send + Sync + 'static,
    {
        self.observers.subscribe(listener)
    }

    pub fn authenticate(&self, input: &AuthenticateInput) -> AuthVerdict {
        self.authenticate_at(input, Utc::now())
    }

    pub fn authenticate_at(&self, input: &AuthenticateInput, now: DateTime<Utc>) -> AuthVerdict {
        let verdict = match input {
            AuthenticateInput::Request(inputs) => resolver::resolve_at(inputs, &self.config, now),
            AuthenticateInput::Token { token, key_source } => {
                let inputs = RequestAuthInputs {
                    header_token: Some(token.clone()),
                    key_source: Some(key_source.clone()),
                    ..Default::default()
                };
                resolver::resolve_at(&inputs, &self.config, now)
            }
        };

        if !self.observers.is_empty() {
            self.observers.notify(&AuthEvent {
                verdict: verdict.clone(),
                at: now,
            });
        }
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::error::AuthErrorReason;
    use crate::auth::publishable_key::parse_publishable_key;
    use crate::auth::test_support::{rsa_public_key, sign_rs256};
    use base64::{engine::general_purpose::STANDARD, Engine};
    use chrono::TimeZone;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    const NOW: i64 = 1_700_000_000;

    fn engine() -> AuthEngine {
        let key = format!("pk_live_{}", STANDARD.encode("clerk.example.com$"));
        AuthEngine::new(DeploymentConfig::new(parse_publishable_key(&key).unwrap()))
    }

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(NOW, 0).unwrap()
    }

    #[test]
    fn token_input_is_verified_like_a_bearer_token() {
        let token = sign_rs256(
            None,
            &json!({ "sub": "user_1", "sid": "sess_1", "iat": NOW - 10, "exp": NOW + 60 }),
        );
        let verdict = engine().authenticate_at(
            &AuthenticateInput::Token {
                token,
                key_source: KeySource::Static(rsa_public_key()),
            },
            now(),
        );
        assert!(verdict.is_signed_in());
    }

    #[test]
    fn observers_see_every_verdict_until_unsubscribed() {
        let engine = engine();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = engine.subscribe(move |event: &AuthEvent| {
            sink.lock().push(event.verdict.clone());
        });

        let input = AuthenticateInput::Request(RequestAuthInputs::default());
        engine.authenticate_at(&input, now());
        assert_eq!(
            seen.lock().as_slice(),
            &[AuthVerdict::SignedOut {
                reason: AuthErrorReason::NoToken
            }]
        );

        drop(subscription);
        engine.authenticate_at(&input, now());
        assert_eq!(seen.lock().len(), 1);
    }
}
