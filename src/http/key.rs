//! Client key extraction.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{HeaderName, Request};

use crate::config::KeySource;
use crate::error::{Result, TurnstileError};

/// Derives the rate limiting key of a request.
///
/// Returning `None` means the client cannot be identified.
pub trait KeyExtractor: Send + Sync {
    fn extract(&self, request: &Request<Body>) -> Option<String>;
}

impl<F> KeyExtractor for F
where
    F: Fn(&Request<Body>) -> Option<String> + Send + Sync,
{
    fn extract(&self, request: &Request<Body>) -> Option<String> {
        self(request)
    }
}

/// Keys clients by the IP address of the connection.
///
/// Needs the router to be served with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeerAddr;

impl KeyExtractor for PeerAddr {
    fn extract(&self, request: &Request<Body>) -> Option<String> {
        request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_canonical().to_string())
    }
}

/// Keys clients by the first entry of a request header.
///
/// For list-valued headers such as `X-Forwarded-For` only the first,
/// left-most value is used.
#[derive(Debug, Clone)]
pub struct HeaderKey {
    name: HeaderName,
}

impl HeaderKey {
    pub fn new(name: HeaderName) -> Self {
        Self { name }
    }
}

impl KeyExtractor for HeaderKey {
    fn extract(&self, request: &Request<Body>) -> Option<String> {
        let value = request.headers().get(&self.name)?.to_str().ok()?;
        let first = value.split(',').next()?.trim();
        if first.is_empty() {
            None
        } else {
            Some(first.to_string())
        }
    }
}

impl KeySource {
    /// Build the extractor described by this source.
    pub fn extractor(&self) -> Result<Arc<dyn KeyExtractor>> {
        match self {
            KeySource::PeerAddr => Ok(Arc::new(PeerAddr)),
            KeySource::Header(name) => {
                let name = HeaderName::try_from(name.as_str()).map_err(|e| {
                    TurnstileError::Config(format!("invalid header name '{}': {}", name, e))
                })?;
                Ok(Arc::new(HeaderKey::new(name)))
            }
        }
    }
}
