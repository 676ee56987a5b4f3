//! Storage compartments.
//!
//! # Responsibilities
//! - Key/value storage for backends, one compartment per mount
//! - Container listing with the trailing-slash convention
//! - Optional JSON persistence across restarts
//!
//! # Design Decisions
//! - `a/b/` names a container, `a/b` names a value
//! - Each compartment root owns its own concurrent map; nested roots stay disjoint
//! - Persistence is load-at-boot, save-at-shutdown

pub mod memory;

use futures_util::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;

pub use memory::{InMemoryCompartment, InMemoryStorage};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid storage path `{0}`")]
    InvalidPath(String),

    #[error("unsupported storage type `{0}`")]
    Unsupported(String),
}

pub type StorageFuture<'a, T> = BoxFuture<'a, Result<T, StorageError>>;

/// An isolated key space handed to one backend.
pub trait StorageCompartment: Send + Sync {
    /// Immediate children of a container; nested containers end in `/`.
    fn list<'a>(&'a self, path: &'a str) -> StorageFuture<'a, Vec<String>>;

    fn exists<'a>(&'a self, path: &'a str) -> StorageFuture<'a, bool>;

    fn read<'a>(&'a self, path: &'a str) -> StorageFuture<'a, Option<Value>>;

    fn write<'a>(&'a self, path: &'a str, value: Value) -> StorageFuture<'a, ()>;

    fn delete<'a>(&'a self, path: &'a str) -> StorageFuture<'a, ()>;
}
