//! Copy-on-write route table.
//!
//! # Responsibilities
//! - Hold the current immutable snapshot of route entries
//! - Publish a new snapshot on every mutation
//! - Dispatch requests against one snapshot, in insertion order
//! - Generate paths from named routes
//!
//! # Design Decisions
//! - Readers do a single `ArcSwap` load and never block
//! - Writers serialize on one mutex and republish a full copy
//! - A failed mutation publishes nothing
//! - No specificity reordering: first match in insertion order wins

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;
use axum::http::StatusCode;
use thiserror::Error;

use crate::config::schema::RoutingConfig;
use crate::handler::context::{RequestContext, RouteMatch};
use crate::handler::result::{error_object, results, HandlerResult};
use crate::handler::RequestHandler;
use crate::mount::MountError;
use crate::observability::metrics;
use crate::routing::constraint::RouteConstraint;
use crate::routing::entry::{DataTokens, RouteEntry};
use crate::routing::template::RouteValues;

/// Errors from table lookups and mutations other than mounting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("route entry not found in table")]
    NotFound,

    #[error("route `{name}` is ambiguous: `{path}` is also produced by template `{other}`")]
    Ambiguous {
        name: String,
        path: String,
        other: String,
    },

    #[error("no route named `{0}`")]
    UnknownRouteName(String),

    #[error("request cancelled")]
    Cancelled,
}

/// Path-generation options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteTableOptions {
    pub lowercase_urls: bool,
    pub append_trailing_slash: bool,
}

impl From<&RoutingConfig> for RouteTableOptions {
    fn from(config: &RoutingConfig) -> Self {
        Self {
            lowercase_urls: config.lowercase_urls,
            append_trailing_slash: config.append_trailing_slash,
        }
    }
}

/// An immutable view of the table at one point in time.
#[derive(Debug, Default)]
pub struct RouteTableSnapshot {
    entries: Vec<Arc<RouteEntry>>,
    unnamed: Vec<Arc<RouteEntry>>,
    named: HashMap<String, Arc<RouteEntry>>,
    version: u64,
}

impl RouteTableSnapshot {
    fn build(entries: Vec<Arc<RouteEntry>>, version: u64) -> Result<Self, MountError> {
        let mut unnamed = Vec::new();
        let mut named = HashMap::new();

        for entry in &entries {
            match entry.name() {
                Some(name) => {
                    let key = name.to_lowercase();
                    if named.contains_key(&key) {
                        return Err(MountError::DuplicateName(name.to_string()));
                    }
                    named.insert(key, entry.clone());
                }
                None => unnamed.push(entry.clone()),
            }
        }

        Ok(Self {
            entries,
            unnamed,
            named,
            version,
        })
    }

    /// All entries in match order.
    pub fn entries(&self) -> &[Arc<RouteEntry>] {
        &self.entries
    }

    pub fn unnamed(&self) -> &[Arc<RouteEntry>] {
        &self.unnamed
    }

    /// Case-insensitive lookup by route name.
    pub fn named(&self, name: &str) -> Option<&Arc<RouteEntry>> {
        self.named.get(&name.to_lowercase())
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, entry: &Arc<RouteEntry>) -> bool {
        self.entries.iter().any(|e| Arc::ptr_eq(e, entry))
    }
}

/// The live route table.
pub struct RouteTable {
    state: ArcSwap<RouteTableSnapshot>,
    write_lock: Mutex<()>,
    default_handler: Option<Arc<dyn RequestHandler>>,
    options: RouteTableOptions,
}

impl RouteTable {
    pub fn new(options: RouteTableOptions) -> Self {
        Self {
            state: ArcSwap::from_pointee(RouteTableSnapshot::default()),
            write_lock: Mutex::new(()),
            default_handler: None,
            options,
        }
    }

    /// Handler used when nothing matches, and target of [`RouteTable::map_route`].
    pub fn with_default_handler(mut self, handler: Arc<dyn RequestHandler>) -> Self {
        self.default_handler = Some(handler);
        self
    }

    pub fn options(&self) -> RouteTableOptions {
        self.options
    }

    /// The current snapshot. Never blocks.
    pub fn snapshot(&self) -> Arc<RouteTableSnapshot> {
        self.state.load_full()
    }

    pub fn len(&self) -> usize {
        self.state.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // the guarded data is (), a poisoned lock carries no broken state
        self.write_lock.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, entries: Vec<Arc<RouteEntry>>, version: u64) -> Result<(), MountError> {
        let next = RouteTableSnapshot::build(entries, version)?;
        let len = next.len();
        self.state.store(Arc::new(next));
        metrics::record_route_table_size(len);
        tracing::debug!(version, entries = len, "Published route table snapshot");
        Ok(())
    }

    pub fn add(&self, entry: Arc<RouteEntry>) -> Result<(), MountError> {
        self.add_range(vec![entry])
    }

    /// Append entries as one published snapshot; all or nothing.
    pub fn add_range(&self, entries: Vec<Arc<RouteEntry>>) -> Result<(), MountError> {
        let _guard = self.lock();
        let current = self.state.load();

        let mut next = current.entries.clone();
        next.extend(entries);
        self.publish(next, current.version + 1)
    }

    /// Remove by identity. Absent ⇒ `NotFound`, table unchanged.
    pub fn remove(&self, entry: &Arc<RouteEntry>) -> Result<(), RoutingError> {
        self.remove_range(std::slice::from_ref(entry))
    }

    /// Remove several entries as one published snapshot; all must be present.
    pub fn remove_range(&self, entries: &[Arc<RouteEntry>]) -> Result<(), RoutingError> {
        let _guard = self.lock();
        let current = self.state.load();

        if !entries.iter().all(|e| current.contains(e)) {
            return Err(RoutingError::NotFound);
        }

        let next: Vec<_> = current
            .entries
            .iter()
            .filter(|e| !entries.iter().any(|r| Arc::ptr_eq(*e, r)))
            .cloned()
            .collect();

        // removal cannot introduce a duplicate name
        self.publish(next, current.version + 1)
            .map_err(|_| RoutingError::NotFound)
    }

    /// Add a route that targets the table's default handler.
    pub fn map_route(
        &self,
        name: Option<&str>,
        template: &str,
        constraint: Option<Arc<dyn RouteConstraint>>,
        data_tokens: DataTokens,
    ) -> Result<Arc<RouteEntry>, MountError> {
        let handler = self
            .default_handler
            .clone()
            .ok_or(MountError::MissingDefaultHandler)?;

        let mut builder = RouteEntry::builder(template, handler)
            .map_err(MountError::InvalidTemplate)?
            .constraint(constraint)
            .data_tokens(data_tokens);
        if let Some(name) = name {
            builder = builder.name(name);
        }

        let entry = builder.build();
        self.add(entry.clone())?;
        Ok(entry)
    }

    /// Dispatch a request against the current snapshot.
    pub async fn dispatch(&self, ctx: &mut RequestContext) -> Result<HandlerResult, RoutingError> {
        let snapshot = self.snapshot();

        for entry in snapshot.entries() {
            let Some(values) = entry.template().matches(ctx.path()) else {
                continue;
            };

            ctx.enter_route(RouteMatch {
                template: entry.template().as_str().to_string(),
                values,
                data_tokens: entry.data_tokens().clone(),
            });

            if let Some(constraint) = entry.constraint() {
                if !constraint.matches(ctx) {
                    ctx.leave_route();
                    continue;
                }
            }

            if ctx.is_cancelled() {
                return Err(RoutingError::Cancelled);
            }

            let outcome = {
                let ctx: &RequestContext = ctx;
                tokio::select! {
                    biased;
                    _ = ctx.cancellation().cancelled() => return Err(RoutingError::Cancelled),
                    outcome = entry.target().handle(ctx) => outcome,
                }
            };

            match outcome {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => ctx.leave_route(),
                Err(e) => {
                    tracing::warn!(
                        path = %ctx.path(),
                        template = %entry.template(),
                        error = %e,
                        "Parameter binding failed"
                    );
                    return Ok(error_object(StatusCode::BAD_REQUEST, [e.to_string()]));
                }
            }
        }

        tracing::debug!(method = %ctx.method(), path = %ctx.path(), "No route matched");

        let Some(handler) = &self.default_handler else {
            return Ok(results::NOT_FOUND);
        };
        match handler.handle(ctx).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) => Ok(results::NOT_FOUND),
            Err(e) => Ok(error_object(StatusCode::BAD_REQUEST, [e.to_string()])),
        }
    }

    /// Build a path from the route named `name`.
    ///
    /// `Ok(None)` when `values` lack a variable the template requires.
    pub fn get_path_by_name(&self, name: &str, values: &RouteValues) -> Result<Option<String>, RoutingError> {
        let snapshot = self.snapshot();
        let entry = snapshot
            .named(name)
            .ok_or_else(|| RoutingError::UnknownRouteName(name.to_string()))?;

        let Some(path) = entry.template().reify(values) else {
            return Ok(None);
        };

        if let Some(other) = snapshot
            .unnamed()
            .iter()
            .map(|e| e.template())
            .filter(|t| *t != entry.template())
            .find(|t| t.reify(values).as_deref() == Some(path.as_str()))
        {
            return Err(RoutingError::Ambiguous {
                name: name.to_string(),
                path,
                other: other.to_string(),
            });
        }

        Ok(Some(self.normalize_generated(path)))
    }

    fn normalize_generated(&self, path: String) -> String {
        let (path_part, query) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path, None),
        };

        let mut path_part = if self.options.lowercase_urls {
            path_part.to_lowercase()
        } else {
            path_part
        };
        if self.options.append_trailing_slash && !path_part.ends_with('/') {
            path_part.push('/');
        }

        match query {
            Some(q) => format!("{}?{}", path_part, q),
            None => path_part,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::context::CancellationSignal;
    use crate::handler::FnHandler;
    use axum::http::Method;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use tokio::sync::watch;

    fn tagged(tag: &'static str) -> Arc<dyn RequestHandler> {
        Arc::new(FnHandler::new(move |_ctx| async move {
            Some(HandlerResult::object(&json!({ "tag": tag })))
        }))
    }

    fn declining() -> Arc<dyn RequestHandler> {
        Arc::new(FnHandler::new(|_ctx| async { None }))
    }

    fn entry(template: &str, target: Arc<dyn RequestHandler>) -> Arc<RouteEntry> {
        RouteEntry::builder(template, target).unwrap().build()
    }

    fn named(name: &str, template: &str) -> Arc<RouteEntry> {
        RouteEntry::builder(template, tagged("named")).unwrap().name(name).build()
    }

    async fn body_of(table: &RouteTable, path: &str) -> (StatusCode, Vec<u8>) {
        let mut ctx = RequestContext::new(Method::GET, path);
        let evaluated = table.dispatch(&mut ctx).await.unwrap().evaluate();
        (evaluated.status, evaluated.body.to_vec())
    }

    #[tokio::test]
    async fn test_insertion_order_precedence() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(entry("v1/{*path}", tagged("catch-all"))).unwrap();
        table.add(entry("v1/sys/health", tagged("literal"))).unwrap();

        let (status, body) = body_of(&table, "/v1/sys/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"{"tag":"catch-all"}"#);
    }

    #[tokio::test]
    async fn test_declining_handler_continues_scan() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(entry("v1/{*path}", declining())).unwrap();
        table.add(entry("v1/sys/health", tagged("second"))).unwrap();

        let (_, body) = body_of(&table, "/v1/sys/health").await;
        assert_eq!(body, br#"{"tag":"second"}"#);
    }

    #[tokio::test]
    async fn test_no_match_uses_default_or_404() {
        let table = RouteTable::new(RouteTableOptions::default());
        let (status, _) = body_of(&table, "/nothing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let table = RouteTable::new(RouteTableOptions::default()).with_default_handler(tagged("default"));
        let (status, body) = body_of(&table, "/nothing").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, br#"{"tag":"default"}"#);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_running_handler() {
        let table = RouteTable::new(RouteTableOptions::default());
        let slow: Arc<dyn RequestHandler> = Arc::new(FnHandler::new(|_ctx: RequestContext| async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Some(HandlerResult::object(&json!({ "late": true })))
        }));
        table.add(entry("v1/slow", slow)).unwrap();

        let (tx, rx) = watch::channel(false);
        let mut ctx = RequestContext::new(Method::GET, "/v1/slow").with_cancellation(CancellationSignal::new(rx));

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(true);
        });

        let outcome = tokio::time::timeout(Duration::from_secs(2), table.dispatch(&mut ctx))
            .await
            .expect("dispatch returns once cancelled");
        assert_eq!(outcome.err(), Some(RoutingError::Cancelled));
    }

    #[tokio::test]
    async fn test_cancelled_request_never_invokes_handler() {
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = invoked.clone();
        let table = RouteTable::new(RouteTableOptions::default());
        table
            .add(entry(
                "v1/health",
                Arc::new(FnHandler::new(move |_ctx: RequestContext| {
                    flag.store(true, Ordering::SeqCst);
                    async { Some(results::OK) }
                })),
            ))
            .unwrap();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let mut ctx = RequestContext::new(Method::GET, "/v1/health").with_cancellation(CancellationSignal::new(rx));

        assert_eq!(table.dispatch(&mut ctx).await.err(), Some(RoutingError::Cancelled));
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn test_snapshots_are_immutable() {
        let table = RouteTable::new(RouteTableOptions::default());
        let a = entry("a", tagged("a"));
        table.add(a.clone()).unwrap();

        let before = table.snapshot();
        table.add(entry("b", tagged("b"))).unwrap();
        table.remove(&a).unwrap();

        assert_eq!(before.len(), 1);
        assert!(before.contains(&a));
        let after = table.snapshot();
        assert_eq!(after.len(), 1);
        assert!(!after.contains(&a));
        assert!(after.version() > before.version());
    }

    #[test]
    fn test_remove_is_by_identity() {
        let table = RouteTable::new(RouteTableOptions::default());
        let target = tagged("x");
        let a = entry("same", target.clone());
        let twin = entry("same", target);
        table.add(a.clone()).unwrap();

        assert_eq!(table.remove(&twin), Err(RoutingError::NotFound));
        assert_eq!(table.len(), 1);
        assert!(table.remove(&a).is_ok());
        assert!(table.is_empty());
    }

    #[test]
    fn test_duplicate_name_rejected_case_insensitive() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(named("Health", "v1/sys/health")).unwrap();
        let before = table.snapshot().version();

        let err = table.add(named("HEALTH", "v1/other")).unwrap_err();
        assert!(matches!(err, MountError::DuplicateName(_)));
        assert_eq!(table.len(), 1);
        assert_eq!(table.snapshot().version(), before);
    }

    #[test]
    fn test_add_range_is_atomic() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(named("one", "a")).unwrap();

        let err = table.add_range(vec![entry("b", tagged("b")), named("ONE", "c")]);
        assert!(err.is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_get_path_by_name() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(named("secret", "v1/secret/{*path}")).unwrap();

        let mut values = RouteValues::new();
        values.insert("path".into(), "app/db".into());
        assert_eq!(
            table.get_path_by_name("SECRET", &values).unwrap().as_deref(),
            Some("/v1/secret/app/db")
        );
        assert_eq!(
            table.get_path_by_name("missing", &values),
            Err(RoutingError::UnknownRouteName("missing".into()))
        );
    }

    #[test]
    fn test_get_path_by_name_ambiguous() {
        let table = RouteTable::new(RouteTableOptions::default());
        table.add(named("secret", "v1/secret/{key}")).unwrap();
        table.add(entry("v1/{mount}/{*path}", tagged("generic"))).unwrap();

        let mut values = RouteValues::new();
        values.insert("key".into(), "db".into());
        assert!(table.get_path_by_name("secret", &values).unwrap().is_some());

        // same path from a differently shaped unnamed template
        table.add(entry("v1/secret/{*key}", tagged("other"))).unwrap();
        assert!(matches!(
            table.get_path_by_name("secret", &values),
            Err(RoutingError::Ambiguous { .. })
        ));
    }

    #[test]
    fn test_path_generation_options() {
        let options = RouteTableOptions {
            lowercase_urls: true,
            append_trailing_slash: true,
        };
        let table = RouteTable::new(options);
        table.add(named("kv", "v1/KV/{key}")).unwrap();

        let mut values = RouteValues::new();
        values.insert("key".into(), "Foo".into());
        values.insert("Version".into(), "A".into());
        assert_eq!(
            table.get_path_by_name("kv", &values).unwrap().as_deref(),
            Some("/v1/kv/foo/?Version=A")
        );
    }

    #[test]
    fn test_map_route_requires_default_handler() {
        let table = RouteTable::new(RouteTableOptions::default());
        let err = table.map_route(Some("x"), "x", None, DataTokens::new()).unwrap_err();
        assert!(matches!(err, MountError::MissingDefaultHandler));

        let table = RouteTable::new(RouteTableOptions::default()).with_default_handler(tagged("d"));
        let entry = table.map_route(Some("x"), "x/{id}", None, DataTokens::new()).unwrap();
        assert!(table.snapshot().contains(&entry));
    }
}
