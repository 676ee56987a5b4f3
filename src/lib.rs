//! Mock Vault server with a dynamic, copy-on-write route table.

pub mod admin;
pub mod auth;
pub mod backends;
pub mod config;
pub mod handler;
pub mod http;
pub mod lifecycle;
pub mod mount;
pub mod observability;
pub mod routing;
pub mod storage;

pub use config::schema::MockServerConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
