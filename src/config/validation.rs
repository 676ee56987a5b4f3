//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses, timeouts and limits
//! - Detect conflicting mounts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: MockServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::MockServerConfig;
use crate::routing::template::{normalize_path, RouteTemplate};

/// One semantic problem in a config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

pub fn validate_config(config: &MockServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.limits.max_body_size == 0 {
        errors.push(ValidationError::new("limits.max_body_size", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if config.admin.enabled {
        if config.admin.bind_address.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "admin.bind_address",
                format!("`{}` is not a socket address", config.admin.bind_address),
            ));
        }
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::new("admin.api_key", "must not be empty"));
        }
    }

    if config.storage.kind != "in-memory" {
        errors.push(ValidationError::new(
            "storage.kind",
            format!("unsupported storage type `{}`", config.storage.kind),
        ));
    }

    if config.auth.token_header.trim().is_empty() {
        errors.push(ValidationError::new("auth.token_header", "must not be empty"));
    }

    let mut seen = HashSet::new();
    for (i, mount) in config.mounts.iter().enumerate() {
        let field = format!("mounts[{}].path", i);
        let path = normalize_path(&mount.path);
        if path.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
            continue;
        }
        if let Err(e) = RouteTemplate::parse(&path) {
            errors.push(ValidationError::new(field, e.to_string()));
            continue;
        }
        if !seen.insert(path.clone()) {
            errors.push(ValidationError::new(field, format!("`{}` is mounted twice", path)));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{MountConfig, MountKind};

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&MockServerConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = MockServerConfig::default();
        config.listener.bind_address = "nope".into();
        config.timeouts.request_secs = 0;
        config.storage.kind = "consul".into();
        config.mounts = vec![
            MountConfig { path: "v1/kv".into(), kind: MountKind::Kv },
            MountConfig { path: "/v1/kv/".into(), kind: MountKind::Sys },
        ];

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec!["listener.bind_address", "timeouts.request_secs", "storage.kind", "mounts[1].path"]
        );
    }
}
