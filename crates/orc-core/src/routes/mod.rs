//! API route definitions and router builder (§6). The REST/DTO layer is a
//! pure translation to the core API (§1 non-goal) — handlers stay a few
//! lines each, delegating immediately to `DeviceRegistry`, `ConfigHandle`,
//! `TaskExecutorHandle` or `DeployHistory`.

pub mod deploy;
pub mod deploy_history;
pub mod devices;
pub mod health;
pub mod provisioning;
pub mod ws;

use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health::health))
        .route(
            "/devices",
            get(devices::list_devices).post(devices::add_device),
        )
        .route(
            "/devices/{id}",
            get(devices::get_device).delete(devices::remove_device),
        )
        .route("/edge_apps", get(deploy::list_edge_apps).post(deploy::deploy_edge_app))
        .route("/firmwares", post(deploy::deploy_firmware))
        .route("/models", post(deploy::deploy_model))
        .route("/deploy_configs", post(deploy::create_deploy_config))
        .route("/deploy_configs/{id}/apply", post(deploy::apply_deploy_config))
        .route("/deploy_history", get(deploy_history::list_deploy_history))
        .route("/provisioning/qrcode", get(provisioning::qrcode))
        .route("/ws", get(ws::ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors)
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn app() -> Router {
        build_router(crate::state::test_state())
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let response = app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn list_devices_is_empty_by_default() {
        let response = app()
            .oneshot(Request::get("/devices").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: Vec<serde_json::Value> = serde_json::from_slice(&body).unwrap();
        assert!(json.is_empty());
    }
}
