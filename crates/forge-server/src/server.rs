use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tower_http::cors::CorsLayer;

use forge_store::Database;

use crate::rooms::RoomRegistry;
use crate::routes;

/// Server configuration.
pub struct ServerConfig {
    pub port: u16,
    pub max_send_queue: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            max_send_queue: 256,
        }
    }
}

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub rooms: Arc<RoomRegistry>,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .merge(routes::users::router())
        .merge(routes::organizations::router())
        .merge(routes::proposals::router())
        .merge(routes::knowledge::router())
        .merge(routes::chat::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create and start the server. Returns a handle that keeps it alive.
pub async fn start(config: ServerConfig, db: Database) -> Result<ServerHandle, std::io::Error> {
    let state = AppState {
        db,
        rooms: Arc::new(RoomRegistry::new(config.max_send_queue)),
    };

    let router = build_router(state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "forge server started");

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router).await.ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        _server: server_handle,
    })
}

/// Handle returned by `start()` — keeps the serve task alive.
pub struct ServerHandle {
    pub port: u16,
    _server: tokio::task::JoinHandle<()>,
}

/// Health check HTTP endpoint.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({ "status": "healthy" }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> AppState {
        AppState {
            db: Database::in_memory().unwrap(),
            rooms: Arc::new(RoomRegistry::new(32)),
        }
    }

    #[test]
    fn build_router_creates_routes() {
        let _router = build_router(test_state());
        // If this doesn't panic, the router was built successfully
    }

    #[tokio::test]
    async fn server_starts_and_serves_health() {
        let db = Database::in_memory().unwrap();
        let config = ServerConfig {
            port: 0, // Random port
            ..Default::default()
        };

        let handle = start(config, db).await.unwrap();
        assert!(handle.port > 0);

        let url = format!("http://127.0.0.1:{}/health", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 200);

        let body: serde_json::Value = resp.json().await.unwrap();
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn requests_without_identity_are_unauthorized() {
        let db = Database::in_memory().unwrap();
        let handle = start(ServerConfig { port: 0, ..Default::default() }, db)
            .await
            .unwrap();

        let url = format!("http://127.0.0.1:{}/proposals", handle.port);
        let resp = reqwest::get(&url).await.unwrap();
        assert_eq!(resp.status(), 401);
    }

    #[tokio::test]
    async fn rest_flow_proposal_lifecycle() {
        let db = Database::in_memory().unwrap();
        let handle = start(ServerConfig { port: 0, ..Default::default() }, db)
            .await
            .unwrap();
        let base = format!("http://127.0.0.1:{}", handle.port);
        let client = reqwest::Client::new();

        // Provision a user (open endpoint; identity layer sits upstream)
        let user: serde_json::Value = client
            .post(format!("{base}/users"))
            .json(&serde_json::json!({
                "email": "amina@acme.com",
                "name": "Amina",
                "password_hash": "hash"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let user_id = user["id"].as_str().unwrap().to_string();

        // Organization
        let org: serde_json::Value = client
            .post(format!("{base}/organizations"))
            .header("x-user-id", &user_id)
            .json(&serde_json::json!({
                "name": "Acme",
                "industry": "software",
                "size": "200-500"
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        // Proposal starts in draft
        let proposal: serde_json::Value = client
            .post(format!("{base}/proposals"))
            .header("x-user-id", &user_id)
            .json(&serde_json::json!({
                "title": "Q1 Deal",
                "description": "Enterprise rollout",
                "organization_id": org["id"],
                "priority": "high",
                "deadline": "2026-12-31T00:00:00Z",
                "estimated_value": 50000.0,
                "tags": ["enterprise"]
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(proposal["status"], "draft");
        assert_eq!(proposal["current_version"], 1);
        let proposal_id = proposal["id"].as_str().unwrap().to_string();

        // Status change
        let updated: serde_json::Value = client
            .put(format!("{base}/proposals/{proposal_id}"))
            .header("x-user-id", &user_id)
            .json(&serde_json::json!({ "status": "approved" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["status"], "approved");

        // Section
        let section: serde_json::Value = client
            .post(format!("{base}/proposals/{proposal_id}/sections"))
            .header("x-user-id", &user_id)
            .json(&serde_json::json!({
                "title": "Pricing",
                "content": "...",
                "section_type": "pricing",
                "order": 1
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(section["version"], 1);

        // Activities: created, status_updated, section_created (newest first)
        let activities: serde_json::Value = client
            .get(format!("{base}/proposals/{proposal_id}/activities"))
            .header("x-user-id", &user_id)
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        let actions: Vec<&str> = activities
            .as_array()
            .unwrap()
            .iter()
            .map(|a| a["action"].as_str().unwrap())
            .collect();
        assert_eq!(actions, vec!["section_created", "status_updated", "created"]);
        assert!(activities[1]["details"].as_str().unwrap().contains("approved"));

        // Unknown proposal is a 404
        let resp = client
            .get(format!("{base}/proposals/prop_nonexistent"))
            .header("x-user-id", &user_id)
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 404);
    }
}
