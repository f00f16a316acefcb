//! Read-only HTTP admin API
//!
//! - `GET /health`
//! - `GET /admin/status`
//! - `GET /cargos`, `GET /cargos/:id`
//! - `GET /apps/:app_id`

use crate::common::Error;
use crate::manager::service::CargoManager;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.to_http_status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Admin request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

pub fn create_router(manager: Arc<CargoManager>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/admin/status", get(status))
        .route("/cargos", get(list_cargos))
        .route("/cargos/:id", get(get_cargo))
        .route("/apps/:app_id", get(get_app))
        .with_state(manager)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": crate::VERSION }))
}

async fn status(State(manager): State<Arc<CargoManager>>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(manager.status()?))
}

async fn list_cargos(
    State(manager): State<Arc<CargoManager>>,
) -> Result<impl IntoResponse, ApiError> {
    let cargos = manager.registry().list()?;
    Ok(Json(json!({ "count": cargos.len(), "cargos": cargos })))
}

async fn get_cargo(
    State(manager): State<Arc<CargoManager>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(manager.cargo(&id)?))
}

async fn get_app(
    State(manager): State<Arc<CargoManager>>,
    Path(app_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(manager.application(&app_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ManagerConfig;
    use crate::manager::registry::Registration;
    use crate::manager::service::ReplicaRequest;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn seeded() -> (Arc<CargoManager>, String) {
        let manager = Arc::new(CargoManager::new(ManagerConfig::default()).unwrap());
        let id = manager
            .register(Registration {
                host: "10.0.0.5".to_string(),
                port: 9100,
                lat: 48.8566,
                lon: 2.3522,
                total_capacity: 250.0,
            })
            .unwrap();
        manager
            .request_cargo(ReplicaRequest {
                app_id: "app1".to_string(),
                lat: 48.8566,
                lon: 2.3522,
                n_replicas: 1,
            })
            .unwrap();
        (manager, id)
    }

    #[tokio::test]
    async fn test_health() {
        let (manager, _) = seeded();
        let (status, body) = get_json(create_router(manager), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_status_and_listing() {
        let (manager, id) = seeded();

        let (status, body) = get_json(create_router(manager.clone()), "/admin/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["cargos"], 1);
        assert_eq!(body["applications"], 1);
        assert_eq!(body["rank_order"], "nearest");

        let (_, body) = get_json(create_router(manager.clone()), "/cargos").await;
        assert_eq!(body["count"], 1);
        assert_eq!(body["cargos"][0]["id"], id.as_str());

        let (status, body) = get_json(create_router(manager), &format!("/cargos/{}", id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["port"], 9100);
        assert_eq!(body["remaining_capacity"], 250.0);
    }

    #[tokio::test]
    async fn test_app_lookup() {
        let (manager, id) = seeded();
        manager.acquire_write_lock("app1", None).await.unwrap();

        let (status, body) = get_json(create_router(manager.clone()), "/apps/app1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["locked"], true);
        assert_eq!(body["replicas"]["cargo_ids"][0], id.as_str());

        let (status, body) = get_json(create_router(manager), "/apps/ghost").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn test_unknown_cargo() {
        let (manager, _) = seeded();
        let (status, _) = get_json(create_router(manager), "/cargos/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
