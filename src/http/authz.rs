//! Role-based authorization middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::error::ApiError;

/// Identity attached to a request by an upstream authentication layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Principal {
    pub roles: Vec<String>,
}

impl Principal {
    pub fn new<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Roles of which a principal must hold at least one.
#[derive(Debug, Clone)]
pub struct RequiredRoles(Arc<[String]>);

impl RequiredRoles {
    pub fn any_of<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(roles.into_iter().map(Into::into).collect())
    }

    /// Whether `principal` satisfies the requirement.
    pub fn permits(&self, principal: &Principal) -> bool {
        self.0.iter().any(|role| principal.has_role(role))
    }
}

/// Middleware rejecting requests whose [`Principal`] lacks the required roles.
///
/// Use with `axum::middleware::from_fn_with_state`.
pub async fn authorize(
    State(required): State<RequiredRoles>,
    request: Request,
    next: Next,
) -> Response {
    let verdict = match request.extensions().get::<Principal>() {
        None => Err(ApiError::Unauthorized),
        Some(principal) if !required.permits(principal) => Err(ApiError::Forbidden),
        Some(_) => Ok(()),
    };

    match verdict {
        Ok(()) => next.run(request).await,
        Err(e) => e.into_response(),
    }
}

/// Middleware attaching a fixed [`Principal`] to every request.
pub async fn attach_principal(
    State(principal): State<Principal>,
    mut request: Request,
    next: Next,
) -> Response {
    request.extensions_mut().insert(principal);
    next.run(request).await
}
