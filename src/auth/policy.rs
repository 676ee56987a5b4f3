//! Policy stage.
//! Enforces token presence outside the unauthenticated paths.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::auth::{AuthState, Token};
use crate::handler::result::error_object;

pub async fn policy_middleware(
    State(state): State<Arc<AuthState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    if !state.require_token
        || req.extensions().get::<Token>().is_some()
        || state.is_unauthenticated(req.uri().path())
    {
        return next.run(req).await;
    }

    warn!(path = %req.uri().path(), "Rejected request without token");
    error_object(StatusCode::FORBIDDEN, ["permission denied"]).into_response()
}
