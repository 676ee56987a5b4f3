//! Mount surface.
//!
//! # Responsibilities
//! - Mount a compiled handler under a path prefix
//! - Unmount by prefix, route name or entry
//! - Track which mounts came from config and which from the admin API
//! - Reconcile config-origin mounts after a config reload
//!
//! # Design Decisions
//! - Prefixes are normalized (no leading/trailing or duplicate slashes)
//! - One prefix, one mount; re-mounting requires an unmount first
//! - Every mount/unmount is a single table publish
//! - Reconcile never touches admin-origin mounts

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;

use crate::config::schema::MountConfig;
use crate::handler::descriptor::ConfigurationError;
use crate::handler::{RequestHandler, RouteResolver};
use crate::observability::metrics;
use crate::routing::entry::RouteEntry;
use crate::routing::table::RouteTable;
use crate::routing::template::{join_templates, normalize_path, TemplateError};

/// Data token key holding the mount prefix of an entry.
pub const MOUNT_TOKEN: &str = "mount";

/// Errors reported to whoever asked for a mount or unmount.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("a route named `{0}` already exists")]
    DuplicateName(String),

    #[error("prefix `{0}` is already mounted")]
    AlreadyMounted(String),

    #[error("nothing mounted at `{0}`")]
    UnknownTarget(String),

    #[error("no default handler configured")]
    MissingDefaultHandler,

    #[error(transparent)]
    InvalidTemplate(#[from] TemplateError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

/// Where a mount came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountOrigin {
    Config,
    Admin,
}

/// What to unmount.
#[derive(Debug, Clone)]
pub enum UnmountTarget {
    Prefix(String),
    Name(String),
    Entry(Arc<RouteEntry>),
}

/// Public summary of one mount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountInfo {
    pub path: String,
    pub kind: String,
    pub origin: MountOrigin,
    pub routes: usize,
}

struct MountRecord {
    kind: String,
    origin: MountOrigin,
    entries: Vec<Arc<RouteEntry>>,
}

impl MountRecord {
    fn info(&self, path: &str) -> MountInfo {
        MountInfo {
            path: path.to_string(),
            kind: self.kind.clone(),
            origin: self.origin,
            routes: self.entries.len(),
        }
    }
}

/// Mounts handlers into a shared route table.
pub struct MountManager {
    table: Arc<RouteTable>,
    mounts: DashMap<String, MountRecord>,
}

impl MountManager {
    pub fn new(table: Arc<RouteTable>) -> Self {
        Self {
            table,
            mounts: DashMap::new(),
        }
    }

    pub fn table(&self) -> &Arc<RouteTable> {
        &self.table
    }

    /// Mount `handler` under `prefix` as an admin-origin mount.
    pub fn mount<H>(&self, prefix: &str, handler: Arc<H>) -> Result<MountInfo, MountError>
    where
        H: RequestHandler + RouteResolver + 'static,
    {
        self.mount_as(prefix, handler, "custom", MountOrigin::Admin)
    }

    pub fn mount_as<H>(
        &self,
        prefix: &str,
        handler: Arc<H>,
        kind: impl Into<String>,
        origin: MountOrigin,
    ) -> Result<MountInfo, MountError>
    where
        H: RequestHandler + RouteResolver + 'static,
    {
        let prefix = normalize_path(prefix);
        let kind = kind.into();

        let vacant = match self.mounts.entry(prefix.clone()) {
            Entry::Occupied(_) => return Err(MountError::AlreadyMounted(prefix)),
            Entry::Vacant(v) => v,
        };

        let target: Arc<dyn RequestHandler> = handler.clone();
        let mut entries = Vec::new();
        for route in handler.resolve_routes() {
            let mut tokens = route.data_tokens.clone();
            tokens.insert(MOUNT_TOKEN, prefix.clone());

            let entry = RouteEntry::builder(&join_templates(&prefix, &route.template), target.clone())?
                .constraint(route.constraint.clone())
                .data_tokens(tokens)
                .build();
            entries.push(entry);
        }

        self.table.add_range(entries.clone())?;

        let record = MountRecord { kind, origin, entries };
        let info = record.info(&prefix);
        vacant.insert(record);

        metrics::record_mount_event("mount");
        tracing::info!(
            prefix = %info.path,
            kind = %info.kind,
            origin = ?info.origin,
            routes = info.routes,
            "Mounted handler"
        );
        Ok(info)
    }

    /// Remove routes; returns how many entries were removed.
    pub fn unmount(&self, target: UnmountTarget) -> Result<usize, MountError> {
        let removed = match target {
            UnmountTarget::Prefix(prefix) => {
                let prefix = normalize_path(&prefix);
                match self.mounts.entry(prefix.clone()) {
                    Entry::Vacant(_) => return Err(MountError::UnknownTarget(prefix)),
                    Entry::Occupied(occupied) => {
                        self.table
                            .remove_range(&occupied.get().entries)
                            .map_err(|_| MountError::UnknownTarget(prefix.clone()))?;
                        let record = occupied.remove();
                        tracing::info!(prefix = %prefix, routes = record.entries.len(), "Unmounted prefix");
                        record.entries.len()
                    }
                }
            }
            UnmountTarget::Name(name) => {
                let snapshot = self.table.snapshot();
                let entry = snapshot
                    .named(&name)
                    .cloned()
                    .ok_or_else(|| MountError::UnknownTarget(name.clone()))?;
                self.remove_entry(&entry, &name)?
            }
            UnmountTarget::Entry(entry) => {
                let label = entry.template().to_string();
                self.remove_entry(&entry, &label)?
            }
        };

        metrics::record_mount_event("unmount");
        Ok(removed)
    }

    fn remove_entry(&self, entry: &Arc<RouteEntry>, label: &str) -> Result<usize, MountError> {
        self.table
            .remove(entry)
            .map_err(|_| MountError::UnknownTarget(label.to_string()))?;

        // drop the entry from whichever mount owned it
        self.mounts.retain(|_, record| {
            record.entries.retain(|e| !Arc::ptr_eq(e, entry));
            !record.entries.is_empty()
        });

        tracing::info!(route = %label, "Unmounted route");
        Ok(1)
    }

    /// Every mounted route template, in match order.
    pub fn list_mounts(&self) -> Vec<String> {
        self.table
            .snapshot()
            .entries()
            .iter()
            .map(|e| e.template().to_string())
            .collect()
    }

    /// Mount records, sorted by prefix.
    pub fn mounts(&self) -> Vec<MountInfo> {
        let mut infos: Vec<MountInfo> = self.mounts.iter().map(|r| r.value().info(r.key())).collect();
        infos.sort_by(|a, b| a.path.cmp(&b.path));
        infos
    }

    pub fn is_mounted(&self, prefix: &str) -> bool {
        self.mounts.contains_key(&normalize_path(prefix))
    }

    /// Bring config-origin mounts in line with `desired`.
    ///
    /// Returns the first error after attempting every change.
    pub fn reconcile<H, F>(&self, desired: &[MountConfig], factory: F) -> Result<(), MountError>
    where
        H: RequestHandler + RouteResolver + 'static,
        F: Fn(&MountConfig) -> Result<Arc<H>, MountError>,
    {
        let mut first_error = None;

        let stale: Vec<String> = self
            .mounts
            .iter()
            .filter(|r| r.value().origin == MountOrigin::Config)
            .filter(|r| {
                !desired.iter().any(|d| {
                    normalize_path(&d.path) == *r.key() && d.kind.as_str() == r.value().kind
                })
            })
            .map(|r| r.key().clone())
            .collect();

        for prefix in stale {
            if let Err(e) = self.unmount(UnmountTarget::Prefix(prefix.clone())) {
                tracing::error!(prefix = %prefix, error = %e, "Failed to unmount stale config mount");
                first_error.get_or_insert(e);
            }
        }

        for mount in desired {
            let prefix = normalize_path(&mount.path);
            if let Some(existing) = self.mounts.get(&prefix) {
                if existing.origin == MountOrigin::Admin {
                    tracing::warn!(prefix = %prefix, "Config mount shadowed by admin mount, skipping");
                }
                continue;
            }

            let result = factory(mount).and_then(|handler| {
                self.mount_as(&prefix, handler, mount.kind.as_str(), MountOrigin::Config)
            });
            if let Err(e) = result {
                tracing::error!(prefix = %prefix, error = %e, "Failed to apply config mount");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
