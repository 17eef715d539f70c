// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::{auth::clerk_middleware, state::AppState};

pub mod health;
pub mod session;

pub fn router(state: AppState) -> Router {
    let v1_routes = Router::new()
        .route("/me", get(session::me))
        .route("/session", get(session::session))
        .route("/organization", get(session::organization))
        .layer(middleware::from_fn_with_state(state.clone(), clerk_middleware));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::health))
        .nest("/v1", v1_routes)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(CorsLayer::permissive()),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::engine::AuthEngine;
    use crate::auth::publishable_key::parse_publishable_key;
    use crate::auth::resolver::DeploymentConfig;
    use crate::auth::test_support::{rsa_public_key, sign_rs256};
    use crate::state::KeyProvider;
    use axum::{
        body::{to_bytes, Body},
        http::{header::AUTHORIZATION, Request, StatusCode},
    };
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn app() -> Router {
        let key = format!("pk_live_{}", STANDARD.encode("clerk.example.com$"));
        let config = DeploymentConfig::new(parse_publishable_key(&key).unwrap());
        router(AppState::new(
            AuthEngine::new(config),
            KeyProvider::Static(rsa_public_key()),
        ))
    }

    fn bearer(claims: Value) -> String {
        format!("Bearer {}", sign_rs256(None, &claims))
    }

    fn claims(org_role: &str) -> Value {
        let now = chrono::Utc::now().timestamp();
        json!({
            "sub": "user_1",
            "sid": "sess_1",
            "iat": now - 10,
            "exp": now + 60,
            "org_id": "org_1",
            "org_role": org_role,
            "org_permissions": ["org:invoices:read"],
        })
    }

    async fn get_json(request: Request<Body>) -> (StatusCode, Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_is_public() {
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let (status, body) = get_json(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["keys"], "static");
        assert_eq!(body["instance"], "production");
    }

    #[tokio::test]
    async fn responses_carry_a_request_id() {
        let request = Request::builder().uri("/health/live").body(Body::empty()).unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn me_requires_a_session() {
        let request = Request::builder().uri("/v1/me").body(Body::empty()).unwrap();
        let (status, body) = get_json(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error_code"], "no_token");
    }

    #[tokio::test]
    async fn me_returns_the_user() {
        let request = Request::builder()
            .uri("/v1/me")
            .header(AUTHORIZATION, bearer(claims("org:member")))
            .body(Body::empty())
            .unwrap();
        let (status, body) = get_json(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "user_1");
        assert_eq!(body["session_id"], "sess_1");
    }

    #[tokio::test]
    async fn session_reports_signed_out() {
        let request = Request::builder().uri("/v1/session").body(Body::empty()).unwrap();
        let (status, body) = get_json(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "signed_in": false }));
    }

    #[tokio::test]
    async fn organization_requires_admin() {
        let request = Request::builder()
            .uri("/v1/organization")
            .header(AUTHORIZATION, bearer(claims("org:member")))
            .body(Body::empty())
            .unwrap();
        let (status, _) = get_json(request).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let request = Request::builder()
            .uri("/v1/organization")
            .header(AUTHORIZATION, bearer(claims("org:admin")))
            .body(Body::empty())
            .unwrap();
        let (status, body) = get_json(request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["permissions"], json!(["org:invoices:read"]));
    }
}
