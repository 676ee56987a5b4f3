//! In-memory storage with optional file persistence.

use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use crate::config::schema::StorageConfig;
use crate::routing::template::normalize_path;
use crate::storage::{StorageCompartment, StorageError, StorageFuture};

type Compartment = Arc<DashMap<String, Value>>;

/// Process-wide storage. Each root owns its own map, so nested roots never
/// see each other's keys.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    roots: Arc<DashMap<String, Compartment>>,
    persistence_path: Option<String>,
}

impl InMemoryStorage {
    pub fn new(persistence_path: Option<String>) -> Self {
        Self {
            roots: Arc::new(DashMap::new()),
            persistence_path,
        }
    }

    /// Build storage from config, loading the persistence file if present.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        if config.kind != "in-memory" {
            return Err(StorageError::Unsupported(config.kind.clone()));
        }
        match &config.persistence_path {
            Some(path) => Self::load_from_file(path),
            None => Ok(Self::new(None)),
        }
    }

    /// Load from file if exists.
    pub fn load_from_file(path: &str) -> Result<Self, StorageError> {
        let storage = Self::new(Some(path.to_string()));
        if Path::new(path).exists() {
            let reader = BufReader::new(File::open(path)?);
            let map: HashMap<String, HashMap<String, Value>> = serde_json::from_reader(reader)?;
            for (root, entries) in map {
                let compartment = storage.root(&root);
                for (k, v) in entries {
                    compartment.insert(k, v);
                }
            }
            tracing::info!(path = %path, entries = storage.len(), "Loaded storage from file");
        }
        Ok(storage)
    }

    /// Save to the persistence file, if one is configured.
    pub fn save_to_file(&self) -> Result<(), StorageError> {
        let Some(path) = &self.persistence_path else {
            return Ok(());
        };

        let map: HashMap<String, HashMap<String, Value>> = self
            .roots
            .iter()
            .filter(|r| !r.value().is_empty())
            .map(|r| {
                let entries = r
                    .value()
                    .iter()
                    .map(|e| (e.key().clone(), e.value().clone()))
                    .collect();
                (r.key().clone(), entries)
            })
            .collect();

        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(writer, &map)?;
        tracing::info!(path = %path, entries = self.len(), "Saved storage to file");
        Ok(())
    }

    fn root(&self, root: &str) -> Compartment {
        self.roots
            .entry(normalize_path(root))
            .or_insert_with(|| Arc::new(DashMap::new()))
            .value()
            .clone()
    }

    /// A compartment rooted at `root`. The same root always yields the same key space.
    pub fn compartment(&self, root: &str) -> Arc<dyn StorageCompartment> {
        Arc::new(InMemoryCompartment {
            inner: self.root(root),
        })
    }

    /// Total entries across every compartment.
    pub fn len(&self) -> usize {
        self.roots.iter().map(|r| r.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One mount's view of [`InMemoryStorage`].
pub struct InMemoryCompartment {
    inner: Compartment,
}

impl InMemoryCompartment {
    fn key(&self, path: &str) -> String {
        normalize_path(path)
    }

    fn container_prefix(&self, path: &str) -> String {
        let key = self.key(path);
        if key.is_empty() {
            key
        } else {
            format!("{}/", key)
        }
    }

    fn children(&self, path: &str) -> BTreeSet<String> {
        let prefix = self.container_prefix(path);
        self.inner
            .iter()
            .filter_map(|r| {
                let rest = r.key().strip_prefix(&prefix)?;
                Some(match rest.split_once('/') {
                    Some((head, _)) => format!("{}/", head),
                    None => rest.to_string(),
                })
            })
            .collect()
    }
}

impl StorageCompartment for InMemoryCompartment {
    fn list<'a>(&'a self, path: &'a str) -> StorageFuture<'a, Vec<String>> {
        Box::pin(async move { Ok(self.children(path).into_iter().collect()) })
    }

    fn exists<'a>(&'a self, path: &'a str) -> StorageFuture<'a, bool> {
        Box::pin(async move {
            if path.ends_with('/') {
                Ok(!self.children(path).is_empty())
            } else {
                Ok(self.inner.contains_key(&self.key(path)))
            }
        })
    }

    fn read<'a>(&'a self, path: &'a str) -> StorageFuture<'a, Option<Value>> {
        Box::pin(async move {
            if path.ends_with('/') {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
            Ok(self.inner.get(&self.key(path)).map(|r| r.value().clone()))
        })
    }

    fn write<'a>(&'a self, path: &'a str, value: Value) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            if path.ends_with('/') || normalize_path(path).is_empty() {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
            self.inner.insert(self.key(path), value);
            Ok(())
        })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.inner.remove(&self.key(path));
            Ok(())
        })
    }
}
