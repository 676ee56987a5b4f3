//! Token resolution and policy stage.
//!
//! # Data Flow
//! ```text
//! Request
//!     → token.rs (read token header, attach Token to extensions)
//!     → policy.rs (reject tokenless requests outside public paths)
//!     → route table dispatch
//! ```
//!
//! # Design Decisions
//! - Unknown token ids still resolve; policy evaluation is out of scope
//! - The policy stage only checks presence, never policies

pub mod policy;
pub mod token;

use std::sync::Arc;

use axum::http::HeaderName;

use crate::config::schema::AuthConfig;
use crate::routing::template::normalize_path;

pub use policy::policy_middleware;
pub use token::{token_resolver_middleware, Token, TokenStore};

/// Shared state for both auth stages.
#[derive(Debug)]
pub struct AuthState {
    pub header: HeaderName,
    pub require_token: bool,
    pub unauthenticated_paths: Vec<String>,
    pub tokens: Arc<TokenStore>,
}

impl AuthState {
    /// Build from config. Falls back to `x-vault-token` on an invalid header name.
    pub fn from_config(config: &AuthConfig, tokens: Arc<TokenStore>) -> Self {
        let header = HeaderName::from_bytes(config.token_header.as_bytes()).unwrap_or_else(|e| {
            tracing::error!(header = %config.token_header, error = %e, "Invalid token header name");
            HeaderName::from_static("x-vault-token")
        });

        Self {
            header,
            require_token: config.require_token,
            unauthenticated_paths: config
                .unauthenticated_paths
                .iter()
                .map(|p| normalize_path(p))
                .collect(),
            tokens,
        }
    }

    /// Whether `path` is reachable without a token.
    pub fn is_unauthenticated(&self, path: &str) -> bool {
        let path = normalize_path(path);
        self.unauthenticated_paths.iter().any(|prefix| {
            path == *prefix
                || prefix.is_empty()
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}
