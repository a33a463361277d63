//! Per-request entry point in front of the admission controller.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use tower::{Layer, Service};
use tracing::{debug, error, warn};

use super::error::ApiError;
use super::key::KeyExtractor;
use crate::clock::{Clock, SystemClock};
use crate::config::{GateConfig, StoreFailurePolicy, UnidentifiedClients};
use crate::error::Result;
use crate::ratelimit::{AdmissionController, Decision};

/// Translates admission decisions into HTTP behaviour.
///
/// `None` from [`RequestGate::check`] means the request is forwarded
/// unchanged; `Some` carries the response to send instead.
pub struct RequestGate {
    controller: Arc<AdmissionController>,
    extractor: Arc<dyn KeyExtractor>,
    clock: Arc<dyn Clock>,
    config: GateConfig,
    expose_details: bool,
}

impl RequestGate {
    /// Create a gate using the configured key source and the system clock.
    pub fn new(controller: Arc<AdmissionController>, config: GateConfig) -> Result<Self> {
        let extractor = config.key_source.extractor()?;
        Ok(Self {
            controller,
            extractor,
            clock: Arc::new(SystemClock::new()),
            config,
            expose_details: false,
        })
    }

    /// Replace the key extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn KeyExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Include error details in failure bodies.
    pub fn with_error_details(mut self, expose: bool) -> Self {
        self.expose_details = expose;
        self
    }

    /// Determine the key a request is counted against.
    ///
    /// Unidentifiable clients either share the anonymous key or are refused,
    /// depending on configuration.
    pub fn identify(&self, request: &Request<Body>) -> std::result::Result<String, Response> {
        if let Some(key) = self.extractor.extract(request) {
            return Ok(key);
        }

        match self.config.unidentified {
            UnidentifiedClients::SharedBucket => Ok(self.config.anonymous_key.clone()),
            UnidentifiedClients::Reject => {
                debug!(path = %request.uri().path(), "Refusing unidentified client");
                Err(ApiError::Validation("unable to identify client".to_string())
                    .render(self.expose_details))
            }
        }
    }

    /// Run the admission decision for `key`.
    pub async fn check(&self, key: &str) -> Option<Response> {
        let now = self.clock.now_ms();
        match self.controller.decide(key, now).await {
            Ok(decision) => self.rejection(&decision),
            Err(e) => match self.config.on_store_error {
                StoreFailurePolicy::FailOpen => {
                    error!(key = %key, error = %e, "Admission check failed, admitting request");
                    None
                }
                StoreFailurePolicy::FailClosed => {
                    error!(key = %key, error = %e, "Admission check failed, rejecting request");
                    Some(ApiError::Unavailable(e.to_string()).render(self.expose_details))
                }
            },
        }
    }

    /// Response for a decision, or `None` when it admits.
    pub fn rejection(&self, decision: &Decision) -> Option<Response> {
        let message = match decision {
            Decision::Admit => return None,
            Decision::Throttled { .. } => &self.config.throttled_message,
            Decision::BlacklistedTemp { .. } => &self.config.blacklisted_message,
            Decision::BlacklistedPerm => &self.config.denied_message,
        };

        let response = match decision.retry_after_secs() {
            Some(secs) => (
                StatusCode::TOO_MANY_REQUESTS,
                [(header::RETRY_AFTER, secs.to_string())],
                message.clone(),
            )
                .into_response(),
            None => (StatusCode::TOO_MANY_REQUESTS, message.clone()).into_response(),
        };
        Some(response)
    }
}

/// Tower layer applying a [`RequestGate`] to every request.
#[derive(Clone)]
pub struct AdmissionLayer {
    gate: Arc<RequestGate>,
}

impl AdmissionLayer {
    pub fn new(gate: Arc<RequestGate>) -> Self {
        Self { gate }
    }
}

impl<S> Layer<S> for AdmissionLayer {
    type Service = AdmissionService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AdmissionService {
            inner,
            gate: self.gate.clone(),
        }
    }
}

/// Service produced by [`AdmissionLayer`].
#[derive(Clone)]
pub struct AdmissionService<S> {
    inner: S,
    gate: Arc<RequestGate>,
}

impl<S> Service<Request<Body>> for AdmissionService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, std::result::Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<std::result::Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let gate = self.gate.clone();
        // Use the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let key = match gate.identify(&request) {
                Ok(key) => key,
                Err(response) => return Ok(response),
            };

            if let Some(response) = gate.check(&key).await {
                warn!(key = %key, status = %response.status(), "Request rejected");
                return Ok(response);
            }

            inner.call(request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::AdmissionConfig;
    use crate::ratelimit::CounterStores;
    use crate::store::testing::FailingStore;
    use axum::body::to_bytes;
    use axum::extract::ConnectInfo;
    use axum::routing::get;
    use axum::Router;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tower::ServiceExt;

    const CLIENT: &str = "127.0.0.1:40000";
    const START: u64 = 1_700_000_000_000;

    fn admission_config() -> AdmissionConfig {
        AdmissionConfig {
            window_ms: 1_000,
            max_requests: 2,
            burst_allowance: 1,
            max_strikes: 2,
            blacklist_duration_ms: 3_000,
            ..Default::default()
        }
    }

    fn app_with(
        admission: AdmissionConfig,
        stores: CounterStores,
        gate_config: GateConfig,
    ) -> (Router, ManualClock) {
        let clock = ManualClock::new(START);
        let controller = Arc::new(AdmissionController::new(admission, stores).unwrap());
        let gate = RequestGate::new(controller, gate_config)
            .unwrap()
            .with_clock(Arc::new(clock.clone()));
        let app = Router::new()
            .route("/", get(|| async { "Hello, Dan" }))
            .layer(AdmissionLayer::new(Arc::new(gate)));
        (app, clock)
    }

    fn app(admission: AdmissionConfig) -> (Router, ManualClock) {
        app_with(admission, CounterStores::in_memory(), GateConfig::default())
    }

    fn request() -> Request<Body> {
        let mut request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let addr: SocketAddr = CLIENT.parse().unwrap();
        request.extensions_mut().insert(ConnectInfo(addr));
        request
    }

    async fn send(app: &Router) -> Response {
        app.clone().oneshot(request()).await.unwrap()
    }

    async fn text(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn retry_after(response: &Response) -> Option<&str> {
        response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
    }

    #[tokio::test]
    async fn test_requests_under_limit_are_forwarded() {
        let (app, _clock) = app(admission_config());

        for _ in 0..3 {
            let response = send(&app).await;
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(text(response).await, "Hello, Dan");
        }
    }

    #[tokio::test]
    async fn test_throttled_response() {
        let (app, clock) = app(admission_config());

        for _ in 0..3 {
            send(&app).await;
        }
        clock.advance(Duration::from_millis(200));
        let response = send(&app).await;

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after(&response), Some("1"));
        assert_eq!(
            text(response).await,
            "Too many requests, please try again later"
        );
    }

    #[tokio::test]
    async fn test_blacklist_and_recovery() {
        let (app, clock) = app(admission_config());

        for _ in 0..4 {
            send(&app).await;
        }
        clock.advance(Duration::from_millis(1_001));
        for _ in 0..3 {
            assert_eq!(send(&app).await.status(), StatusCode::OK);
        }

        let response = send(&app).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after(&response), Some("3"));
        assert_eq!(
            text(response).await,
            "Too many requests. You are temporarily blacklisted."
        );

        let response = send(&app).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            text(response).await,
            "Too many requests. You are temporarily blacklisted."
        );

        clock.advance(Duration::from_millis(3_000));
        let response = send(&app).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(text(response).await, "Hello, Dan");
    }

    #[tokio::test]
    async fn test_allow_listed_client_is_never_throttled() {
        let (app, _clock) = app(AdmissionConfig {
            allow_list: vec!["127.0.0.1".to_string()],
            ..admission_config()
        });

        for _ in 0..10 {
            assert_eq!(send(&app).await.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_deny_listed_client() {
        let (app, _clock) = app(AdmissionConfig {
            deny_list: vec!["127.0.0.1".to_string()],
            ..admission_config()
        });

        let response = send(&app).await;
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(retry_after(&response), None);
        assert_eq!(text(response).await, "Access denied.");
    }

    #[tokio::test]
    async fn test_custom_messages() {
        let gate_config = GateConfig {
            throttled_message: "Slow down".to_string(),
            ..GateConfig::default()
        };
        let (app, _clock) = app_with(
            AdmissionConfig {
                max_strikes: 5,
                ..admission_config()
            },
            CounterStores::in_memory(),
            gate_config,
        );

        for _ in 0..3 {
            send(&app).await;
        }
        assert_eq!(text(send(&app).await).await, "Slow down");
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed_by_default() {
        let stores = CounterStores {
            blacklist: Arc::new(FailingStore),
            ..CounterStores::in_memory()
        };
        let (app, _clock) = app_with(admission_config(), stores, GateConfig::default());

        let response = send(&app).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_store_failure_can_fail_open() {
        let stores = CounterStores {
            blacklist: Arc::new(FailingStore),
            ..CounterStores::in_memory()
        };
        let gate_config = GateConfig {
            on_store_error: StoreFailurePolicy::FailOpen,
            ..GateConfig::default()
        };
        let (app, _clock) = app_with(admission_config(), stores, gate_config);

        for _ in 0..10 {
            assert_eq!(send(&app).await.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn test_unidentified_client_rejected_by_default() {
        let (app, _clock) = app(admission_config());
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_unidentified_clients_share_a_bucket() {
        let gate_config = GateConfig {
            unidentified: UnidentifiedClients::SharedBucket,
            ..GateConfig::default()
        };
        let (app, _clock) = app_with(
            AdmissionConfig {
                max_strikes: 5,
                ..admission_config()
            },
            CounterStores::in_memory(),
            gate_config,
        );

        let mut statuses = Vec::new();
        for _ in 0..4 {
            let request = Request::builder().uri("/").body(Body::empty()).unwrap();
            statuses.push(app.clone().oneshot(request).await.unwrap().status());
        }

        assert_eq!(
            statuses,
            vec![
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::OK,
                StatusCode::TOO_MANY_REQUESTS
            ]
        );
    }

    #[tokio::test]
    async fn test_rejection_mapping() {
        let controller = Arc::new(
            AdmissionController::new(admission_config(), CounterStores::in_memory()).unwrap(),
        );
        let gate = RequestGate::new(controller, GateConfig::default()).unwrap();

        assert!(gate.rejection(&Decision::Admit).is_none());

        let response = gate
            .rejection(&Decision::Throttled {
                retry_after: Duration::from_millis(1_500),
                strikes: 1,
            })
            .unwrap();
        assert_eq!(retry_after(&response), Some("2"));
    }
}
