//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the mock server.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the mock server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct MockServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request size limits.
    pub limits: LimitsConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,

    /// Path generation options for the route table.
    pub routing: RoutingConfig,

    pub storage: StorageConfig,

    /// Token resolution and policy stage.
    pub auth: AuthConfig,

    pub server: ServerConfig,

    /// Backends mounted at startup and kept in sync on reload.
    pub mounts: Vec<MountConfig>,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:8200").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8200".to_string(),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum buffered body size in bytes.
    pub max_body_size: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_body_size: 2 * 1024 * 1024, // 2MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: "CHANGE_ME".to_string(),
            bind_address: "127.0.0.1:8201".to_string(),
        }
    }
}

/// Route table path-generation options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Lowercase generated paths (query string untouched).
    pub lowercase_urls: bool,

    /// Append a trailing slash to generated paths.
    pub append_trailing_slash: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage type; only "in-memory" is supported.
    pub kind: String,

    /// Optional JSON file loaded at boot and written at shutdown.
    pub persistence_path: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: "in-memory".to_string(),
            persistence_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the client token.
    pub token_header: String,

    /// Reject tokenless requests outside `unauthenticated_paths`.
    pub require_token: bool,

    /// Path prefixes reachable without a token.
    pub unauthenticated_paths: Vec<String>,

    /// Tokens known at startup.
    pub tokens: Vec<TokenConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_header: "X-Vault-Token".to_string(),
            require_token: false,
            unauthenticated_paths: vec![
                "v1/sys/health".to_string(),
                "v1/sys/init".to_string(),
                "v1/sys/seal-status".to_string(),
            ],
            tokens: Vec::new(),
        }
    }
}

/// A pre-registered token.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TokenConfig {
    pub id: String,

    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Reported by the system backend.
    pub cluster_name: String,

    /// Start initialized, unsealed and active.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cluster_name: "mock-vault".to_string(),
            dev_mode: false,
        }
    }
}

/// Backend kinds that can be mounted from config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Sys,
    Kv,
}

impl MountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MountKind::Sys => "sys",
            MountKind::Kv => "kv",
        }
    }
}

impl std::str::FromStr for MountKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sys" => Ok(MountKind::Sys),
            "kv" => Ok(MountKind::Kv),
            other => Err(format!("unknown mount kind `{}`", other)),
        }
    }
}

/// A backend mounted under a path prefix.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct MountConfig {
    pub path: String,
    pub kind: MountKind,
}

/// Mounts used when the config file declares none.
pub fn default_mounts() -> Vec<MountConfig> {
    vec![
        MountConfig {
            path: "v1/sys".to_string(),
            kind: MountKind::Sys,
        },
        MountConfig {
            path: "v1/secret".to_string(),
            kind: MountKind::Kv,
        },
    ]
}

impl MockServerConfig {
    /// Configured mounts, or the defaults when none are declared.
    pub fn effective_mounts(&self) -> Vec<MountConfig> {
        if self.mounts.is_empty() {
            default_mounts()
        } else {
            self.mounts.clone()
        }
    }
}
