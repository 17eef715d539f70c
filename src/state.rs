// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use crate::auth::engine::AuthEngine;
use crate::auth::jwks::{JwksError, JwksManager};
use crate::auth::verification_key::{KeySource, VerificationKey};
use crate::config::{AuthConfig, KeyConfig};

/// Where the middleware gets verification keys from.
#[derive(Debug, Clone)]
pub enum KeyProvider {
    Static(VerificationKey),
    Jwks(JwksManager),
}

impl KeyProvider {
    pub fn from_config(config: &KeyConfig) -> Result<Self, JwksError> {
        match config {
            KeyConfig::Static(key) => Ok(KeyProvider::Static(key.clone())),
            KeyConfig::Jwks { url, secret_key } => {
                let mut manager = JwksManager::new(url.clone())?;
                if let Some(secret_key) = secret_key {
                    manager = manager.with_secret_key(secret_key.clone());
                }
                Ok(KeyProvider::Jwks(manager))
            }
        }
    }

    /// Key material for a token with key id `kid`.
    pub async fn key_source_for(&self, kid: Option<&str>) -> Result<KeySource, JwksError> {
        match self {
            KeyProvider::Static(key) => Ok(KeySource::Static(key.clone())),
            KeyProvider::Jwks(manager) => manager.key_source_for(kid).await,
        }
    }

    pub fn jwks(&self) -> Option<&JwksManager> {
        match self {
            KeyProvider::Jwks(manager) => Some(manager),
            KeyProvider::Static(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub engine: Arc<AuthEngine>,
    pub keys: KeyProvider,
}

impl AppState {
    pub fn new(engine: AuthEngine, keys: KeyProvider) -> Self {
        Self {
            engine: Arc::new(engine),
            keys,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, JwksError> {
        let keys = KeyProvider::from_config(&config.keys)?;
        Ok(Self::new(AuthEngine::new(config.deployment.clone()), keys))
    }
}
