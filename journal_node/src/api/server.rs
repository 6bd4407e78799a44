use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use log::{info, warn};
use tower_http::cors::CorsLayer;

use crate::ai_services::{Analyzer, InferenceClient};
use crate::api::handlers::{accounts, journal, status};
use crate::api::rate_limiter::enforce_rate_limit;
use crate::api::AppState;
use crate::config::NodeConfig;
use crate::storage::JournalStore;

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            // Credentialed CORS cannot answer with a wildcard
            Ok(_) if origin == "*" => {
                warn!("Ignoring wildcard CORS origin, credentials are allowed");
                None
            }
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

// API Router
pub fn build_router(state: AppState) -> Router {
    let rate_limit = middleware::from_fn_with_state(state.limiter.clone(), enforce_rate_limit);
    let cors = cors_layer(&state.config.allowed_origins);

    Router::new()
        .route("/health", get(status::health))
        // Accounts
        .route("/register", post(accounts::register))
        .route("/login", post(accounts::login))
        // Journal
        .route(
            "/journal",
            post(journal::create_entry).get(journal::list_entries),
        )
        .layer(rate_limit)
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Run the HTTP server until Ctrl-C
pub async fn serve(config: NodeConfig, store: Arc<dyn JournalStore>) -> Result<()> {
    let client = InferenceClient::new(config.inference.clone())
        .context("failed to build inference client")?;
    let analyzer = Arc::new(Analyzer::new(Arc::new(client), config.inference.max_history));

    let port = config.server_port;
    let state = AppState::new(config, store, analyzer);
    let sweeper = state.limiter.spawn_sweeper();
    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Journal API listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    sweeper.abort();
    info!("Server stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai_services::{AnalysisError, TextGenerator};
    use crate::storage::MemoryJournalStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct Silent;

    #[async_trait]
    impl TextGenerator for Silent {
        async fn generate(&self, _prompt: &str) -> std::result::Result<String, AnalysisError> {
            Err(AnalysisError::EmptyReply)
        }
    }

    fn state_with_origins(origins: &[&str]) -> AppState {
        let config = NodeConfig {
            allowed_origins: origins.iter().map(|o| o.to_string()).collect(),
            ..Default::default()
        };
        AppState::new(
            config,
            Arc::new(MemoryJournalStore::new()),
            Arc::new(Analyzer::new(Arc::new(Silent), 4)),
        )
    }

    #[tokio::test]
    async fn test_wildcard_origin_is_dropped() {
        let app = build_router(state_with_origins(&["*", "http://app.test"]));

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://app.test")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://app.test"
        );
    }

    #[tokio::test]
    async fn test_only_wildcard_origin_still_serves() {
        let app = build_router(state_with_origins(&["*"]));

        let request = Request::builder()
            .uri("/health")
            .header(header::ORIGIN, "http://evil.test")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(!response
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }
}
