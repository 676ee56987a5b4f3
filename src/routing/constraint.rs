//! Route constraints.
//!
//! # Responsibilities
//! - Gate a template match with a boolean predicate over the request
//! - Verb checks, including the `LIST` convention
//! - Combine predicates with AND semantics
//!
//! # Design Decisions
//! - Verbs compare case-insensitively
//! - `LIST` also accepts `GET` carrying `list=1`
//! - No constraint = always matches

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::Method;

use crate::handler::context::RequestContext;

/// Query flag that turns a `GET` into a `LIST`.
pub const LIST_QUERY_FLAG: &str = "list";

/// Trait for gating a matched route on properties of the request.
pub trait RouteConstraint: Send + Sync + fmt::Debug {
    /// Returns true if the request satisfies this constraint.
    fn matches(&self, ctx: &RequestContext) -> bool;
}

/// Request verbs a handler method can be declared for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    Head,
    Post,
    Put,
    Delete,
    List,
}

impl Verb {
    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Get => "GET",
            Verb::Head => "HEAD",
            Verb::Post => "POST",
            Verb::Put => "PUT",
            Verb::Delete => "DELETE",
            Verb::List => "LIST",
        }
    }

    /// Plain method comparison, without the `LIST` fallback.
    pub fn is_method(&self, method: &Method) -> bool {
        method.as_str().eq_ignore_ascii_case(self.as_str())
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Verb::Get),
            "HEAD" => Ok(Verb::Head),
            "POST" => Ok(Verb::Post),
            "PUT" => Ok(Verb::Put),
            "DELETE" => Ok(Verb::Delete),
            "LIST" => Ok(Verb::List),
            other => Err(format!("unsupported verb `{}`", other)),
        }
    }
}

/// Matches the request method against a declared verb.
#[derive(Debug, Clone, Copy)]
pub struct VerbConstraint {
    verb: Verb,
}

impl VerbConstraint {
    pub fn new(verb: Verb) -> Self {
        Self { verb }
    }

    pub fn verb(&self) -> Verb {
        self.verb
    }
}

impl RouteConstraint for VerbConstraint {
    fn matches(&self, ctx: &RequestContext) -> bool {
        if self.verb.is_method(ctx.method()) {
            return true;
        }

        // GET ?list=1 is the conventional spelling of LIST
        self.verb == Verb::List
            && Verb::Get.is_method(ctx.method())
            && ctx.query().first(LIST_QUERY_FLAG) == Some("1")
    }
}

/// Combines multiple constraints with AND semantics.
#[derive(Debug, Clone)]
pub struct CompositeConstraint {
    constraints: Vec<Arc<dyn RouteConstraint>>,
}

impl CompositeConstraint {
    pub fn new(constraints: Vec<Arc<dyn RouteConstraint>>) -> Self {
        Self { constraints }
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }
}

impl RouteConstraint for CompositeConstraint {
    fn matches(&self, ctx: &RequestContext) -> bool {
        self.constraints.iter().all(|c| c.matches(ctx))
    }
}

/// A constraint backed by a closure.
pub struct FnConstraint<F> {
    label: &'static str,
    predicate: F,
}

impl<F> FnConstraint<F>
where
    F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
{
    pub fn new(label: &'static str, predicate: F) -> Self {
        Self { label, predicate }
    }
}

impl<F> fmt::Debug for FnConstraint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConstraint").field("label", &self.label).finish()
    }
}

impl<F> RouteConstraint for FnConstraint<F>
where
    F: Fn(&RequestContext) -> bool + Send + Sync + 'static,
{
    fn matches(&self, ctx: &RequestContext) -> bool {
        (self.predicate)(ctx)
    }
}

/// AND two optional constraints; if only one side is present it is used as is.
pub fn combine(
    first: Option<Arc<dyn RouteConstraint>>,
    second: Option<Arc<dyn RouteConstraint>>,
) -> Option<Arc<dyn RouteConstraint>> {
    match (first, second) {
        (Some(a), Some(b)) => Some(Arc::new(CompositeConstraint::new(vec![a, b]))),
        (a, None) => a,
        (None, b) => b,
    }
}
