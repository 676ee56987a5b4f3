//! Token store and resolver middleware.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use dashmap::DashMap;
use serde::Serialize;

use crate::auth::AuthState;
use crate::config::schema::TokenConfig;

/// Client token attached to the request extensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Token {
    pub id: String,
    pub policies: Vec<String>,
}

impl Token {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            policies: Vec::new(),
        }
    }

    pub fn with_policies(mut self, policies: Vec<String>) -> Self {
        self.policies = policies;
        self
    }
}

/// Known tokens, keyed by id.
#[derive(Debug, Default)]
pub struct TokenStore {
    tokens: DashMap<String, Token>,
}

impl TokenStore {
    pub fn from_config(tokens: &[TokenConfig]) -> Self {
        let store = Self::default();
        for t in tokens {
            store.insert(Token::new(&t.id).with_policies(t.policies.clone()));
        }
        store
    }

    pub fn insert(&self, token: Token) {
        self.tokens.insert(token.id.clone(), token);
    }

    pub fn get(&self, id: &str) -> Option<Token> {
        self.tokens.get(id).map(|t| t.value().clone())
    }

    /// The known token for `id`, or a fresh token carrying only the id.
    pub fn resolve(&self, id: &str) -> Token {
        self.get(id).unwrap_or_else(|| Token::new(id))
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

pub async fn token_resolver_middleware(
    State(state): State<Arc<AuthState>>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(&state.header)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
        .map(|id| state.tokens.resolve(id));

    if let Some(token) = token {
        req.extensions_mut().insert(token);
    }

    next.run(req).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_and_unknown() {
        let store = TokenStore::from_config(&[TokenConfig {
            id: "root".into(),
            policies: vec!["root".into()],
        }]);

        assert_eq!(store.resolve("root").policies, vec!["root"]);
        let unknown = store.resolve("s.abc");
        assert_eq!(unknown.id, "s.abc");
        assert!(unknown.policies.is_empty());
        assert_eq!(store.len(), 1);
    }
}
