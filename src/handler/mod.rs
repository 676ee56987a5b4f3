//! Request handlers.
//!
//! # Data Flow
//! ```text
//! HandlerBuilder (prefixes × methods × verbs)
//!     → descriptor.rs (compile, one id per method)
//!     → QualifiedRoute[] (template, constraint, data tokens)
//!     → mounted as RouteEntry[] targeting the CompiledHandler
//!
//! On dispatch:
//!     RequestContext (route values + data tokens bound)
//!     → CompiledHandler looks up the method by id
//!     → binding.rs binds parameters
//!     → handler future → result.rs (HandlerResult)
//! ```

pub mod binding;
pub mod context;
pub mod descriptor;
pub mod result;

use std::future::Future;

use futures_util::future::BoxFuture;

use self::binding::BindingError;
use self::context::RequestContext;
use self::descriptor::QualifiedRoute;

pub use self::binding::{BindingSource, Document, ParameterBinding};
pub use self::descriptor::{CompiledHandler, ConfigurationError, HandlerBuilder, HandlerId, MethodSpec};
pub use self::result::{EvaluatedResponse, HandlerResult, Reply};

/// Future returned by [`RequestHandler::handle`].
///
/// `Ok(None)` means the handler declined and dispatch should continue.
pub type HandlerFuture<'a> = BoxFuture<'a, Result<Option<HandlerResult>, BindingError>>;

/// Something a route entry can dispatch to.
pub trait RequestHandler: Send + Sync {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> HandlerFuture<'a>;
}

/// Something that knows which routes it wants mounted.
pub trait RouteResolver {
    fn resolve_routes(&self) -> Vec<QualifiedRoute>;
}

/// Adapts a closure into a [`RequestHandler`].
pub struct FnHandler<F> {
    f: F,
}

impl<F> FnHandler<F> {
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F, Fut> RequestHandler for FnHandler<F>
where
    F: Fn(RequestContext) -> Fut + Send + Sync,
    Fut: Future<Output = Option<HandlerResult>> + Send + 'static,
{
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> HandlerFuture<'a> {
        let fut = (self.f)(ctx.clone());
        Box::pin(async move { Ok(fut.await) })
    }
}
