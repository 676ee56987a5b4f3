//! Server lifecycle state reported by the system backend.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use uuid::Uuid;

use crate::config::schema::ServerConfig;

/// Seal/init/standby flags shared by every system backend mount.
#[derive(Debug)]
pub struct ServerState {
    initialized: AtomicBool,
    sealed: AtomicBool,
    standby: AtomicBool,
    secret_shares: AtomicU32,
    secret_threshold: AtomicU32,
    cluster_id: String,
    cluster_name: String,
}

/// Body of the health endpoint's `status` field.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub initialized: bool,
    pub sealed: bool,
    pub standby: bool,
    pub server_time_utc: u64,
    pub version: String,
    pub cluster_id: String,
    pub cluster_name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SealStatus {
    #[serde(rename = "type")]
    pub seal_type: &'static str,
    pub initialized: bool,
    pub sealed: bool,
    pub t: u32,
    pub n: u32,
    pub progress: u32,
    pub version: String,
    pub cluster_id: String,
    pub cluster_name: String,
}

impl ServerState {
    pub fn from_config(config: &ServerConfig) -> Self {
        let dev = config.dev_mode;
        Self {
            initialized: AtomicBool::new(dev),
            sealed: AtomicBool::new(!dev),
            standby: AtomicBool::new(!dev),
            secret_shares: AtomicU32::new(u32::from(dev)),
            secret_threshold: AtomicU32::new(u32::from(dev)),
            cluster_id: Uuid::new_v4().to_string(),
            cluster_name: config.cluster_name.clone(),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn is_standby(&self) -> bool {
        self.standby.load(Ordering::SeqCst)
    }

    /// Initialize, unseal and activate. Returns false if already initialized.
    pub fn initialize(&self, shares: u32, threshold: u32) -> bool {
        if self.initialized.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.secret_shares.store(shares, Ordering::SeqCst);
        self.secret_threshold.store(threshold, Ordering::SeqCst);
        self.sealed.store(false, Ordering::SeqCst);
        self.standby.store(false, Ordering::SeqCst);
        true
    }

    pub fn set_sealed(&self, sealed: bool) {
        self.sealed.store(sealed, Ordering::SeqCst);
    }

    pub fn set_standby(&self, standby: bool) {
        self.standby.store(standby, Ordering::SeqCst);
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    pub fn version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            initialized: self.is_initialized(),
            sealed: self.is_sealed(),
            standby: self.is_standby(),
            server_time_utc: server_time_utc(),
            version: Self::version().to_string(),
            cluster_id: self.cluster_id.clone(),
            cluster_name: self.cluster_name.clone(),
        }
    }

    pub fn seal_status(&self) -> SealStatus {
        SealStatus {
            seal_type: "shamir",
            initialized: self.is_initialized(),
            sealed: self.is_sealed(),
            t: self.secret_threshold.load(Ordering::SeqCst),
            n: self.secret_shares.load(Ordering::SeqCst),
            progress: 0,
            version: Self::version().to_string(),
            cluster_id: self.cluster_id.clone(),
            cluster_name: self.cluster_name.clone(),
        }
    }
}

/// Seconds since the unix epoch.
fn server_time_utc() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
