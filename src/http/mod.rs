//! HTTP request gate and the collaborators around it.

pub mod authz;
mod error;
mod gate;
mod key;
mod server;

pub use authz::{Principal, RequiredRoles};
pub use error::ApiError;
pub use gate::{AdmissionLayer, AdmissionService, RequestGate};
pub use key::{HeaderKey, KeyExtractor, PeerAddr};
pub use server::{HealthResponse, HttpServer};
