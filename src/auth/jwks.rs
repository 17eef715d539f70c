// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! JWKS (JSON Web Key Set) fetching and caching.
//!
//! The verifier itself never performs I/O; this module is the collaborator
//! that turns a remote key set into a [`KeySet`] snapshot the resolver can
//! use synchronously.
//!
//! ## Behavior
//!
//! - Keys are cached with a configurable TTL
//! - A token whose `kid` is missing from the cache forces one refetch (key
//!   rotation), at most once per `min_refetch_interval`
//! - A stale cache is used when a refetch fails
//! - The backend API endpoint is authenticated with the secret key; the
//!   frontend API endpoint is public
//!
//! ## Usage
//!
//! Build a `JwksManager` at startup, keep it in `AppState`, and let the
//! background refresher in `main.rs` keep it warm.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::JwkSet;
use tokio::sync::{Mutex, RwLock};

use super::verification_key::{KeySet, KeySource};

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

/// Unknown key ids never refetch more often than this (5 seconds).
pub const DEFAULT_MIN_REFETCH_INTERVAL: Duration = Duration::from_secs(5);

/// HTTP timeout for a single fetch.
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum JwksError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),

    #[error("JWKS request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("HTTP {0} from JWKS endpoint")]
    Status(reqwest::StatusCode),

    #[error("JWKS contains no usable keys")]
    NoUsableKeys,
}

/// JWKS cache entry.
struct CacheEntry {
    keys: KeySet,
    fetched_at: Instant,
}

/// JWKS manager with caching.
#[derive(Clone)]
pub struct JwksManager {
    /// JWKS URL
    jwks_url: String,
    /// Secret key sent as a bearer token (backend API endpoint only)
    secret_key: Option<String>,
    /// Cache TTL
    cache_ttl: Duration,
    /// Floor between refetches caused by unknown key ids
    min_refetch_interval: Duration,
    /// Cached keys
    cache: Arc<RwLock<Option<CacheEntry>>>,
    /// Last unknown-kid refetch attempt; the lock serializes those refetches
    last_refetch: Arc<Mutex<Option<Instant>>>,
    /// HTTP client
    client: reqwest::Client,
}

impl std::fmt::Debug for JwksManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksManager")
            .field("jwks_url", &self.jwks_url)
            .field("cache_ttl", &self.cache_ttl)
            .finish_non_exhaustive()
    }
}

impl JwksManager {
    /// Create a new JWKS manager.
    ///
    /// # Arguments
    /// - `jwks_url`: The JWKS endpoint URL (e.g., `https://clerk.example.com/.well-known/jwks.json`)
    pub fn new(jwks_url: impl Into<String>) -> Result<Self, JwksError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| JwksError::Client(e.to_string()))?;
        Ok(Self {
            jwks_url: jwks_url.into(),
            secret_key: None,
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refetch_interval: DEFAULT_MIN_REFETCH_INTERVAL,
            cache: Arc::new(RwLock::new(None)),
            last_refetch: Arc::new(Mutex::new(None)),
            client,
        })
    }

    /// Manager for the public key set of a frontend API host.
    pub fn for_frontend_api(frontend_api: &str) -> Result<Self, JwksError> {
        let base = if frontend_api.starts_with("http://") || frontend_api.starts_with("https://") {
            frontend_api.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", frontend_api.trim_end_matches('/'))
        };
        Self::new(format!("{base}/.well-known/jwks.json"))
    }

    /// Authenticate fetches with a secret key.
    pub fn with_secret_key(mut self, secret_key: impl Into<String>) -> Self {
        self.secret_key = Some(secret_key.into());
        self
    }

    /// Create with custom cache TTL.
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_min_refetch_interval(mut self, interval: Duration) -> Self {
        self.min_refetch_interval = interval;
        self
    }

    /// Get the JWKS URL.
    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    /// Current key set, from cache when fresh.
    pub async fn key_set(&self) -> Result<KeySet, JwksError> {
        {
            let cache = self.cache.read().await;
            if let Some(entry) = &*cache {
                if entry.fetched_at.elapsed() < self.cache_ttl {
                    return Ok(entry.keys.clone());
                }
            }
        }

        match self.refresh().await {
            Ok(keys) => Ok(keys),
            Err(e) => {
                let cache = self.cache.read().await;
                match &*cache {
                    Some(entry) => {
                        tracing::warn!(error = %e, "JWKS refresh failed, using stale keys");
                        Ok(entry.keys.clone())
                    }
                    None => Err(e),
                }
            }
        }
    }

    /// Key set guaranteed to be as fresh as possible for `kid`: a cache miss
    /// on the key id triggers one refetch unless the cache was filled within
    /// the last `min_refetch_interval`.
    pub async fn key_source_for(&self, kid: Option<&str>) -> Result<KeySource, JwksError> {
        let keys = self.key_set().await?;
        let Some(kid) = kid else {
            return Ok(KeySource::KeySet(keys));
        };
        if keys.find(Some(kid)).is_ok() {
            return Ok(KeySource::KeySet(keys));
        }

        let mut last_refetch = self.last_refetch.lock().await;
        if let Some(recent) = self.fetched_within(self.min_refetch_interval).await {
            tracing::debug!(kid = %kid, "Unknown key id, JWKS fetched recently, not refetching");
            return Ok(KeySource::KeySet(recent));
        }
        if last_refetch.is_some_and(|at| at.elapsed() < self.min_refetch_interval) {
            tracing::debug!(kid = %kid, "Unknown key id, refetch attempted recently");
            return Ok(KeySource::KeySet(keys));
        }
        *last_refetch = Some(Instant::now());

        tracing::debug!(kid = %kid, "Unknown key id, refetching JWKS");
        match self.refresh().await {
            Ok(keys) => Ok(KeySource::KeySet(keys)),
            Err(e) => {
                tracing::warn!(error = %e, "JWKS refetch for unknown key id failed");
                Ok(KeySource::KeySet(keys))
            }
        }
    }

    /// Force refresh the cache.
    pub async fn refresh(&self) -> Result<KeySet, JwksError> {
        let keys = self.fetch().await?;
        let mut cache = self.cache.write().await;
        *cache = Some(CacheEntry {
            keys: keys.clone(),
            fetched_at: Instant::now(),
        });
        Ok(keys)
    }

    /// Check if keys are currently cached and fresh.
    pub async fn is_cached(&self) -> bool {
        let cache = self.cache.read().await;
        if let Some(entry) = &*cache {
            entry.fetched_at.elapsed() < self.cache_ttl
        } else {
            false
        }
    }

    async fn fetched_within(&self, window: Duration) -> Option<KeySet> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < window)
            .map(|entry| entry.keys.clone())
    }

    async fn fetch(&self) -> Result<KeySet, JwksError> {
        let mut request = self.client.get(&self.jwks_url);
        if let Some(secret_key) = &self.secret_key {
            request = request.bearer_auth(secret_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(JwksError::Status(response.status()));
        }

        let jwks: JwkSet = response.json().await?;
        let keys = KeySet::from_jwks(&jwks);
        if keys.is_empty() {
            return Err(JwksError::NoUsableKeys);
        }
        tracing::debug!(count = keys.len(), url = %self.jwks_url, "Fetched JWKS");
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_support::rsa_public_key;
    use crate::auth::verification_key::VerificationKey;
    use axum::{extract::State, routing::get, Json, Router};
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn jwks_body(kid: &str) -> serde_json::Value {
        let VerificationKey::Rsa { n, e } = rsa_public_key() else {
            panic!("fixture is an RSA key");
        };
        serde_json::json!({
            "keys": [{
                "kty": "RSA",
                "kid": kid,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(n),
                "e": URL_SAFE_NO_PAD.encode(e),
            }]
        })
    }

    /// Serve a JWKS on an ephemeral port; returns the URL and a hit counter.
    async fn serve_jwks(kid: &'static str) -> (String, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let app = Router::new()
            .route(
                "/.well-known/jwks.json",
                get(move |State(hits): State<Arc<AtomicUsize>>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    Json(jwks_body(kid))
                }),
            )
            .with_state(hits.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}/.well-known/jwks.json"), hits)
    }

    #[test]
    fn jwks_manager_creation() {
        let manager = JwksManager::for_frontend_api("clerk.example.com").unwrap();
        assert_eq!(
            manager.jwks_url(),
            "https://clerk.example.com/.well-known/jwks.json"
        );
        assert_eq!(manager.cache_ttl(), DEFAULT_CACHE_TTL);
    }

    #[test]
    fn custom_cache_ttl() {
        let manager = JwksManager::new("https://example.com/.well-known/jwks.json")
            .unwrap()
            .with_cache_ttl(Duration::from_secs(60));
        assert_eq!(manager.cache_ttl(), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn cache_initially_empty() {
        let manager = JwksManager::new("https://example.com/.well-known/jwks.json").unwrap();
        assert!(!manager.is_cached().await);
    }

    #[tokio::test]
    async fn fetches_and_caches_keys() {
        let (url, hits) = serve_jwks("ins_1").await;
        let manager = JwksManager::new(url).unwrap().with_secret_key("sk_test_abc");

        let keys = manager.key_set().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys.find(Some("ins_1")).unwrap(), &rsa_public_key());
        assert!(manager.is_cached().await);

        manager.key_set().await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_kid_triggers_refetch() {
        let (url, hits) = serve_jwks("ins_1").await;
        let manager = JwksManager::new(url)
            .unwrap()
            .with_min_refetch_interval(Duration::ZERO);
        manager.key_set().await.unwrap();

        let source = manager.key_source_for(Some("ins_rotated")).await.unwrap();
        assert!(matches!(source, KeySource::KeySet(_)));
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        manager.key_source_for(Some("ins_1")).await.unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_kids_are_throttled() {
        let (url, hits) = serve_jwks("ins_1").await;
        let manager = JwksManager::new(url).unwrap();
        manager.key_set().await.unwrap();

        for i in 0..10 {
            let kid = format!("ins_bogus_{i}");
            let source = manager.key_source_for(Some(&kid)).await.unwrap();
            let KeySource::KeySet(keys) = source else {
                panic!("expected a key set");
            };
            assert_eq!(keys.find(Some(&kid)), Err(crate::auth::error::AuthErrorReason::KeyNotFound));
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stale_cache_survives_fetch_failure() {
        let (url, _) = serve_jwks("ins_1").await;
        let manager = JwksManager::new(url).unwrap().with_cache_ttl(Duration::ZERO);
        manager.refresh().await.unwrap();

        let broken = JwksManager {
            jwks_url: "http://127.0.0.1:1/.well-known/jwks.json".to_string(),
            ..manager.clone()
        };
        let keys = broken.key_set().await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn unreachable_endpoint_without_cache_errors() {
        let manager = JwksManager::new("http://127.0.0.1:1/.well-known/jwks.json").unwrap();
        assert!(matches!(
            manager.key_set().await,
            Err(JwksError::Request(_))
        ));
    }
}
