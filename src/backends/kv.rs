//! Key/value secrets backend.
//!
//! Every route sits on the catch-all `{*path}`; LIST is declared before GET
//! so that `GET ?list=1` reaches the listing handler first.

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::handler::descriptor::{CompiledHandler, ConfigurationError, HandlerBuilder, MethodSpec};
use crate::handler::result::{error_object, not_found_object, results};
use crate::handler::{Document, HandlerResult, ParameterBinding};
use crate::storage::{StorageCompartment, StorageError};

pub struct KvBackend {
    storage: Arc<dyn StorageCompartment>,
}

impl KvBackend {
    pub fn new(storage: Arc<dyn StorageCompartment>) -> Self {
        Self { storage }
    }

    pub fn into_handler(self) -> Result<CompiledHandler, ConfigurationError> {
        HandlerBuilder::new(self)
            .method(
                MethodSpec::new("list")
                    .list("{*path}")
                    .bind(ParameterBinding::route("path"))
                    .to(|kv: Arc<KvBackend>, (path,): (String,)| async move { kv.list(&path).await }),
            )
            .method(
                MethodSpec::new("read")
                    .get("{*path}")
                    .bind(ParameterBinding::route("path"))
                    .to(|kv: Arc<KvBackend>, (path,): (String,)| async move { kv.read(&path).await }),
            )
            .method(
                MethodSpec::new("write")
                    .put("{*path}")
                    .post("{*path}")
                    .bind(ParameterBinding::route("path"))
                    .bind(ParameterBinding::body("data"))
                    .to(
                        |kv: Arc<KvBackend>, (path, data): (String, Document<Value>)| async move {
                            kv.write(&path, data.into_inner()).await
                        },
                    ),
            )
            .method(
                MethodSpec::new("delete")
                    .delete("{*path}")
                    .bind(ParameterBinding::route("path"))
                    .to(|kv: Arc<KvBackend>, (path,): (String,)| async move { kv.delete(&path).await }),
            )
            .compile()
    }

    async fn list(&self, path: &str) -> HandlerResult {
        match self.storage.list(path).await {
            Ok(keys) if keys.is_empty() => not_found_object(),
            Ok(keys) => HandlerResult::object(&json!({ "data": { "keys": keys } })),
            Err(e) => storage_failure(path, e),
        }
    }

    async fn read(&self, path: &str) -> HandlerResult {
        if path.is_empty() {
            return not_found_object();
        }
        match self.storage.read(path).await {
            Ok(Some(data)) => HandlerResult::object(&json!({ "data": data })),
            Ok(None) => not_found_object(),
            Err(e) => storage_failure(path, e),
        }
    }

    async fn write(&self, path: &str, data: Value) -> HandlerResult {
        if path.is_empty() {
            return error_object(StatusCode::BAD_REQUEST, ["missing secret path"]);
        }
        if !data.is_object() {
            return error_object(StatusCode::BAD_REQUEST, ["secret data must be a JSON object"]);
        }
        match self.storage.write(path, data).await {
            Ok(()) => results::NO_CONTENT,
            Err(e) => storage_failure(path, e),
        }
    }

    async fn delete(&self, path: &str) -> HandlerResult {
        match self.storage.delete(path).await {
            Ok(()) => results::NO_CONTENT,
            Err(e) => storage_failure(path, e),
        }
    }
}

fn storage_failure(path: &str, error: StorageError) -> HandlerResult {
    match error {
        StorageError::InvalidPath(_) => error_object(StatusCode::BAD_REQUEST, [error.to_string()]),
        other => {
            tracing::error!(path = %path, error = %other, "Storage operation failed");
            error_object(StatusCode::INTERNAL_SERVER_ERROR, ["internal storage error"])
        }
    }
}
