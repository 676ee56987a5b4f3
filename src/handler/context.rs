//! Per-request context handed to constraints, binders and handlers.
//!
//! # Responsibilities
//! - Hold the buffered request (method, path, query, headers, body)
//! - Carry the typed per-request bag populated by middleware stages
//! - Carry the route values and data tokens of the entry being tried
//! - Expose the server-wide cancellation signal
//!
//! # Design Decisions
//! - Query keys compare case-insensitively, header names via `HeaderMap`
//! - Body is fully buffered before dispatch (`Bytes`, cheap to clone)
//! - Route state is replaced per candidate entry, never merged

use std::future::pending;

use axum::body::Bytes;
use axum::http::{request::Parts, Extensions, HeaderMap, HeaderName, HeaderValue, Method};
use tokio::sync::watch;

use crate::routing::entry::DataTokens;
use crate::routing::template::RouteValues;

/// Multi-valued query string, in arrival order.
#[derive(Debug, Clone, Default)]
pub struct QueryMap {
    pairs: Vec<(String, String)>,
}

impl QueryMap {
    /// Parse a raw (still percent-encoded) query string.
    pub fn parse(raw: &str) -> Self {
        let pairs = url::form_urlencoded::parse(raw.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        Self { pairs }
    }

    /// Every value for `name`, in order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.pairs
            .iter()
            .filter(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn first(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.first(name).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }
}

/// Flipped to `true` when the server begins shutting down.
#[derive(Debug, Clone, Default)]
pub struct CancellationSignal {
    rx: Option<watch::Receiver<bool>>,
}

impl CancellationSignal {
    pub fn new(rx: watch::Receiver<bool>) -> Self {
        Self { rx: Some(rx) }
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self { rx: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.rx.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Resolves once cancellation is requested; pends forever otherwise.
    pub async fn cancelled(&self) {
        let Some(rx) = &self.rx else {
            return pending().await;
        };

        let mut rx = rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // sender gone without cancelling
                return pending().await;
            }
        }
    }
}

/// Route state bound while an entry is being tried.
#[derive(Debug, Clone, Default)]
pub struct RouteMatch {
    pub template: String,
    pub values: RouteValues,
    pub data_tokens: DataTokens,
}

/// Everything a handler can see about the current request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    method: Method,
    path: String,
    query: QueryMap,
    headers: HeaderMap,
    body: Bytes,
    items: Extensions,
    route: Option<RouteMatch>,
    cancellation: CancellationSignal,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: QueryMap::default(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            items: Extensions::new(),
            route: None,
            cancellation: CancellationSignal::never(),
        }
    }

    /// Build a context from a request head and its buffered body.
    ///
    /// The request extensions become the per-request bag.
    pub fn from_parts(parts: Parts, body: Bytes) -> Self {
        let query = parts.uri.query().map(QueryMap::parse).unwrap_or_default();
        Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            query,
            headers: parts.headers,
            body,
            items: parts.extensions,
            route: None,
            cancellation: CancellationSignal::never(),
        }
    }

    pub fn with_query(mut self, raw: &str) -> Self {
        self.query = QueryMap::parse(raw);
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_cancellation(mut self, cancellation: CancellationSignal) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> &QueryMap {
        &self.query
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Every value of header `name`, skipping values that are not visible ASCII.
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.headers
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn items(&self) -> &Extensions {
        &self.items
    }

    pub fn items_mut(&mut self) -> &mut Extensions {
        &mut self.items
    }

    pub fn route(&self) -> Option<&RouteMatch> {
        self.route.as_ref()
    }

    pub fn route_value(&self, name: &str) -> Option<&str> {
        self.route
            .as_ref()
            .and_then(|r| r.values.get(name))
            .map(String::as_str)
    }

    pub fn data_tokens(&self) -> Option<&DataTokens> {
        self.route.as_ref().map(|r| &r.data_tokens)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    pub(crate) fn enter_route(&mut self, route: RouteMatch) {
        self.route = Some(route);
    }

    pub(crate) fn leave_route(&mut self) {
        self.route = None;
    }
}
