// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::process::ExitCode;

use tokio_util::sync::CancellationToken;

use relational_auth::{
    api::router,
    config::{AuthConfig, ServerConfig},
    logging,
    refresher::{self, JwksRefresher},
    state::AppState,
};

#[tokio::main]
async fn main() -> ExitCode {
    let server_config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid server configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(&server_config);

    let auth_config = match AuthConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Invalid authentication configuration");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(
        frontend_api = %auth_config.deployment.publishable_key.frontend_api,
        instance = ?auth_config.deployment.publishable_key.instance_type,
        frontend_api_kind = ?auth_config.frontend_api_kind,
        satellite = auth_config.deployment.is_satellite,
        keys = ?auth_config.keys,
        "Authentication configured"
    );

    let state = match AppState::from_config(&auth_config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize verification keys");
            return ExitCode::FAILURE;
        }
    };

    let shutdown = CancellationToken::new();
    let refresher_task = state.keys.jwks().cloned().map(|jwks| {
        tokio::spawn(JwksRefresher::new(jwks).run(shutdown.clone()))
    });

    let app = router(state);
    let addr = server_config.bind_addr();
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, addr = %addr, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };
    tracing::info!(addr = %addr, "Relational auth server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    shutdown.cancel();
    if let Some(task) = refresher_task {
        refresher::join(task).await;
    }

    match served {
        Ok(()) => {
            tracing::info!("Server stopped");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Server failed");
            ExitCode::FAILURE
        }
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            match result {
                Ok(()) => tracing::info!("Shutdown signal received"),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                    shutdown.cancelled().await;
                }
            }
        }
        _ = shutdown.cancelled() => {}
    }
}
