//! Mountable backends.
//!
//! # Responsibilities
//! - `sys`: health, init and seal status over the shared [`ServerState`]
//! - `kv`: JSON secrets in a per-mount storage compartment
//! - Build a compiled handler for a configured mount
//!
//! # Design Decisions
//! - A kv compartment is keyed by its mount prefix, so remounting the same
//!   prefix sees the same data

pub mod kv;
pub mod state;
pub mod sys;

use std::sync::Arc;

use crate::auth::TokenStore;
use crate::config::schema::{MountConfig, MountKind, ServerConfig};
use crate::handler::descriptor::CompiledHandler;
use crate::mount::MountError;
use crate::routing::template::normalize_path;
use crate::storage::InMemoryStorage;

pub use kv::KvBackend;
pub use state::ServerState;
pub use sys::SystemBackend;

/// Builds backends for mount configs.
#[derive(Clone)]
pub struct BackendFactory {
    storage: InMemoryStorage,
    state: Arc<ServerState>,
    tokens: Arc<TokenStore>,
    settings: ServerConfig,
}

impl BackendFactory {
    pub fn new(
        storage: InMemoryStorage,
        state: Arc<ServerState>,
        tokens: Arc<TokenStore>,
        settings: ServerConfig,
    ) -> Self {
        Self {
            storage,
            state,
            tokens,
            settings,
        }
    }

    pub fn build(&self, mount: &MountConfig) -> Result<Arc<CompiledHandler>, MountError> {
        let handler = match mount.kind {
            MountKind::Sys => {
                SystemBackend::new(self.state.clone(), self.tokens.clone(), self.settings.clone()).into_handler()?
            }
            MountKind::Kv => KvBackend::new(self.storage.compartment(&normalize_path(&mount.path))).into_handler()?,
        };
        Ok(Arc::new(handler))
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    pub fn storage(&self) -> &InMemoryStorage {
        &self.storage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RouteResolver;

    #[test]
    fn test_build_each_kind() {
        let factory = BackendFactory::new(
            InMemoryStorage::new(None),
            Arc::new(ServerState::from_config(&ServerConfig::default())),
            Arc::new(TokenStore::default()),
            ServerConfig::default(),
        );

        let sys = factory
            .build(&MountConfig {
                path: "v1/sys".into(),
                kind: MountKind::Sys,
            })
            .unwrap();
        let templates: Vec<String> = sys.resolve_routes().into_iter().map(|r| r.template).collect();
        assert!(templates.contains(&"health".to_string()));
        assert!(templates.contains(&"seal-status".to_string()));

        let kv = factory
            .build(&MountConfig {
                path: "/v1/secret/".into(),
                kind: MountKind::Kv,
            })
            .unwrap();
        assert_eq!(kv.resolve_routes().len(), 5);
    }
}
