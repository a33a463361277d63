//! HTTP server hosting the admission-controlled router.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::middleware::from_fn_with_state;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use super::authz::{attach_principal, authorize, Principal, RequiredRoles};
use super::error::ApiError;
use super::gate::{AdmissionLayer, RequestGate};
use crate::config::{Environment, ServerConfig};
use crate::error::{Result, TurnstileError};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// HTTP server with every route behind the request gate.
pub struct HttpServer {
    /// Server configuration
    config: ServerConfig,
    /// The gate applied to incoming requests
    gate: Arc<RequestGate>,
}

impl HttpServer {
    /// Create a new HTTP server.
    pub fn new(config: ServerConfig, gate: Arc<RequestGate>) -> Self {
        Self { config, gate }
    }

    /// Build the router.
    ///
    /// `/health` is served outside the gate so probes are never throttled.
    pub fn router(&self) -> Router {
        let principal = Principal::new(self.config.default_roles.iter().cloned());
        let expose_details = self.config.environment == Environment::Development;

        Router::new()
            .route("/", get(index))
            .route(
                "/admin",
                get(admin).route_layer(from_fn_with_state(
                    RequiredRoles::any_of(["admin"]),
                    authorize,
                )),
            )
            .route(
                "/user",
                get(user).route_layer(from_fn_with_state(
                    RequiredRoles::any_of(["user"]),
                    authorize,
                )),
            )
            .route(
                "/any",
                get(any_role).route_layer(from_fn_with_state(
                    RequiredRoles::any_of(["admin", "user"]),
                    authorize,
                )),
            )
            .fallback(move || async move { ApiError::NotFound.render(expose_details) })
            .layer(from_fn_with_state(principal, attach_principal))
            .layer(AdmissionLayer::new(self.gate.clone()))
            .route("/health", get(health))
            .layer(TraceLayer::new_for_http())
    }

    /// Start the server.
    ///
    /// This method will block until the server is shut down.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Start the server with graceful shutdown.
    ///
    /// The server will shut down when the provided signal resolves.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let app = self.router();
        let listener = TcpListener::bind(addr).await?;

        info!(addr = %addr, "Starting HTTP server");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| {
            error!(error = %e, "HTTP server failed");
            TurnstileError::Io(e)
        })
    }
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "turnstile",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn index() -> &'static str {
    "Hello from turnstile"
}

async fn admin() -> &'static str {
    "Welcome, Admin!"
}

async fn user() -> &'static str {
    "Welcome, User!"
}

async fn any_role() -> &'static str {
    "Welcome, Admin or User!"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AdmissionConfig, GateConfig};
    use crate::ratelimit::{AdmissionController, CounterStores};
    use axum::body::{to_bytes, Body};
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    fn server(admission: AdmissionConfig) -> HttpServer {
        let controller =
            Arc::new(AdmissionController::new(admission, CounterStores::in_memory()).unwrap());
        let gate = RequestGate::new(controller, GateConfig::default()).unwrap();
        HttpServer::new(ServerConfig::default(), Arc::new(gate))
    }

    fn request(uri: &str) -> Request<Body> {
        let mut request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let addr: SocketAddr = "10.1.2.3:5555".parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    #[test]
    fn test_server_creation() {
        let server = server(AdmissionConfig::default());
        assert_eq!(server.config.bind_addr.port(), 3000);
    }

    #[tokio::test]
    async fn test_default_roles_reach_user_routes() {
        let router = server(AdmissionConfig::default()).router();

        let response = router.clone().oneshot(request("/user")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.clone().oneshot(request("/any")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = router.oneshot(request("/admin")).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found() {
        let router = server(AdmissionConfig::default()).router();

        let response = router.oneshot(request("/missing")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["message"], "Resource Not Found");
    }

    #[tokio::test]
    async fn test_routes_are_gated_but_health_is_not() {
        let router = server(AdmissionConfig {
            max_requests: 1,
            burst_allowance: 0,
            ..Default::default()
        })
        .router();

        let first = router.clone().oneshot(request("/")).await.unwrap();
        assert_eq!(first.status(), StatusCode::OK);

        let second = router.clone().oneshot(request("/")).await.unwrap();
        assert_eq!(second.status(), StatusCode::TOO_MANY_REQUESTS);

        for _ in 0..5 {
            let response = router.clone().oneshot(request("/health")).await.unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }
}
