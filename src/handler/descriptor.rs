//! Handler descriptor compiler.
//!
//! # Responsibilities
//! - Collect class-level route prefixes and per-method verb declarations
//! - Expand prefixes × sub-templates into qualified routes
//! - Validate parameter bindings against the invoker's parameter types
//! - Assign every method a process-unique id, carried as a data token
//!
//! # Design Decisions
//! - A sub-template defaults to the method name
//! - Verb and explicit constraints combine with AND
//! - Methods without verbs are skipped, not rejected
//! - All validation happens in `compile`; dispatch never re-checks

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::handler::binding::{BindArgs, BindingError, BindingSource, ParameterBinding};
use crate::handler::context::RequestContext;
use crate::handler::result::{HandlerResult, IntoHandlerResult};
use crate::handler::{HandlerFuture, RequestHandler, RouteResolver};
use crate::routing::constraint::{combine, RouteConstraint, Verb, VerbConstraint};
use crate::routing::entry::{DataTokens, HANDLER_ID_TOKEN};
use crate::routing::template::{join_templates, RouteTemplate, TemplateError};

/// Data token key holding the method name.
pub const METHOD_TOKEN: &str = "method";

/// Errors raised while compiling a handler. Fatal at registration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("method `{method}`: {source}")]
    InvalidTemplate {
        method: String,
        #[source]
        source: TemplateError,
    },

    #[error("method `{method}` has verbs but no invoker")]
    MissingInvoker { method: String },

    #[error("method `{method}`: {reason}")]
    InvalidBinding { method: String, reason: String },

    #[error("method `{method}` declares more than one body binding")]
    MultipleBodyBindings { method: String },
}

/// Process-unique id of one compiled handler method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(Uuid);

impl HandlerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for HandlerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A template plus constraint and tokens, ready to become a route entry.
#[derive(Debug, Clone)]
pub struct QualifiedRoute {
    pub template: String,
    pub constraint: Option<Arc<dyn RouteConstraint>>,
    pub data_tokens: DataTokens,
}

/// One compiled, routable method.
#[derive(Debug, Clone)]
pub struct HandlerDescriptor {
    pub id: HandlerId,
    pub method: String,
    pub routes: Vec<QualifiedRoute>,
    pub bindings: Vec<ParameterBinding>,
}

type ValidateFn = fn(&[ParameterBinding]) -> Result<(), String>;

type BoundCall<H> = Arc<
    dyn Fn(Arc<H>, &[ParameterBinding], &RequestContext) -> Result<BoxFuture<'static, Option<HandlerResult>>, BindingError>
        + Send
        + Sync,
>;

type ErasedCall = Arc<
    dyn Fn(&[ParameterBinding], &RequestContext) -> Result<BoxFuture<'static, Option<HandlerResult>>, BindingError>
        + Send
        + Sync,
>;

struct Invoker<H> {
    validate: ValidateFn,
    call: BoundCall<H>,
}

struct LocalRoute {
    template: String,
    constraint: Option<Arc<dyn RouteConstraint>>,
}

/// Declaration of one handler method.
pub struct MethodSpec<H> {
    name: String,
    verbs: Vec<(Verb, Option<String>)>,
    constraint: Option<Arc<dyn RouteConstraint>>,
    bindings: Vec<ParameterBinding>,
    invoker: Option<Invoker<H>>,
}

impl<H: Send + Sync + 'static> MethodSpec<H> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            verbs: Vec::new(),
            constraint: None,
            bindings: Vec::new(),
            invoker: None,
        }
    }

    /// Declare a verb; `None` uses the method name as sub-template.
    pub fn verb<'t>(mut self, verb: Verb, template: impl Into<Option<&'t str>>) -> Self {
        self.verbs.push((verb, template.into().map(str::to_string)));
        self
    }

    pub fn get<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::Get, template)
    }

    pub fn head<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::Head, template)
    }

    pub fn post<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::Post, template)
    }

    pub fn put<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::Put, template)
    }

    pub fn delete<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::Delete, template)
    }

    pub fn list<'t>(self, template: impl Into<Option<&'t str>>) -> Self {
        self.verb(Verb::List, template)
    }

    /// Extra constraint ANDed with every verb of this method.
    pub fn constraint(mut self, constraint: Arc<dyn RouteConstraint>) -> Self {
        self.constraint = Some(constraint);
        self
    }

    pub fn bind(mut self, binding: ParameterBinding) -> Self {
        self.bindings.push(binding);
        self
    }

    /// Invoke `f` with parameters bound per the declared bindings.
    pub fn to<A, F, Fut, R>(mut self, f: F) -> Self
    where
        A: BindArgs,
        F: Fn(Arc<H>, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + 'static,
    {
        let call: BoundCall<H> = Arc::new(move |instance: Arc<H>, bindings: &[ParameterBinding], ctx: &RequestContext| {
            let args = A::bind(bindings, ctx)?;
            let fut = f(instance, args);
            let boxed: BoxFuture<'static, Option<HandlerResult>> =
                Box::pin(async move { fut.await.into_handler_result() });
            Ok(boxed)
        });
        self.invoker = Some(Invoker {
            validate: A::validate,
            call,
        });
        self
    }

    /// Invoke `f` with the whole request context; no bindings allowed.
    pub fn to_raw<F, Fut, R>(mut self, f: F) -> Self
    where
        F: Fn(Arc<H>, RequestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoHandlerResult + 'static,
    {
        let call: BoundCall<H> = Arc::new(move |instance: Arc<H>, _bindings: &[ParameterBinding], ctx: &RequestContext| {
            let fut = f(instance, ctx.clone());
            let boxed: BoxFuture<'static, Option<HandlerResult>> =
                Box::pin(async move { fut.await.into_handler_result() });
            Ok(boxed)
        });
        self.invoker = Some(Invoker {
            validate: |bindings: &[ParameterBinding]| {
                if bindings.is_empty() {
                    Ok(())
                } else {
                    Err("a raw-context handler takes no other parameters".to_string())
                }
            },
            call,
        });
        self
    }
}

/// Builder collecting everything the compiler needs for one handler instance.
pub struct HandlerBuilder<H> {
    instance: Arc<H>,
    prefixes: Vec<LocalRoute>,
    methods: Vec<MethodSpec<H>>,
}

impl<H: Send + Sync + 'static> HandlerBuilder<H> {
    pub fn new(instance: H) -> Self {
        Self::from_arc(Arc::new(instance))
    }

    pub fn from_arc(instance: Arc<H>) -> Self {
        Self {
            instance,
            prefixes: Vec::new(),
            methods: Vec::new(),
        }
    }

    /// Add a class-level route prefix; `""` means no prefix.
    pub fn local_route(self, template: impl Into<String>) -> Self {
        self.push_prefix(template.into(), None)
    }

    pub fn local_route_with(self, template: impl Into<String>, constraint: Arc<dyn RouteConstraint>) -> Self {
        self.push_prefix(template.into(), Some(constraint))
    }

    fn push_prefix(mut self, template: String, constraint: Option<Arc<dyn RouteConstraint>>) -> Self {
        self.prefixes.push(LocalRoute { template, constraint });
        self
    }

    pub fn method(mut self, spec: MethodSpec<H>) -> Self {
        self.methods.push(spec);
        self
    }

    pub fn compile(self) -> Result<CompiledHandler, ConfigurationError> {
        let prefixes = if self.prefixes.is_empty() {
            vec![LocalRoute {
                template: String::new(),
                constraint: None,
            }]
        } else {
            self.prefixes
        };

        let mut descriptors = Vec::new();
        let mut methods = HashMap::new();

        for spec in self.methods {
            if spec.verbs.is_empty() {
                tracing::debug!(method = %spec.name, "Skipping method without verb declarations");
                continue;
            }

            let invoker = spec.invoker.ok_or_else(|| ConfigurationError::MissingInvoker {
                method: spec.name.clone(),
            })?;

            let body_bindings = spec
                .bindings
                .iter()
                .filter(|b| b.source() == BindingSource::Body)
                .count();
            if body_bindings > 1 {
                return Err(ConfigurationError::MultipleBodyBindings { method: spec.name });
            }

            (invoker.validate)(&spec.bindings).map_err(|reason| ConfigurationError::InvalidBinding {
                method: spec.name.clone(),
                reason,
            })?;

            let id = HandlerId::new();
            let tokens = DataTokens::new()
                .with(HANDLER_ID_TOKEN, id.to_string())
                .with(METHOD_TOKEN, spec.name.clone());

            let mut routes = Vec::new();
            for prefix in &prefixes {
                for (verb, sub) in &spec.verbs {
                    let sub = sub.as_deref().unwrap_or(&spec.name);
                    let template = join_templates(&prefix.template, sub);
                    RouteTemplate::parse(&template).map_err(|source| ConfigurationError::InvalidTemplate {
                        method: spec.name.clone(),
                        source,
                    })?;

                    let verb: Arc<dyn RouteConstraint> = Arc::new(VerbConstraint::new(*verb));
                    let constraint = combine(
                        prefix.constraint.clone(),
                        combine(Some(verb), spec.constraint.clone()),
                    );

                    routes.push(QualifiedRoute {
                        template,
                        constraint,
                        data_tokens: tokens.clone(),
                    });
                }
            }

            let instance = self.instance.clone();
            let call = invoker.call;
            let erased: ErasedCall = Arc::new(move |bindings: &[ParameterBinding], ctx: &RequestContext| {
                call(instance.clone(), bindings, ctx)
            });

            methods.insert(
                id.to_string(),
                CompiledMethod {
                    bindings: spec.bindings.clone(),
                    call: erased,
                },
            );
            descriptors.push(HandlerDescriptor {
                id,
                method: spec.name,
                routes,
                bindings: spec.bindings,
            });
        }

        Ok(CompiledHandler {
            descriptors,
            methods,
        })
    }
}

struct CompiledMethod {
    bindings: Vec<ParameterBinding>,
    call: ErasedCall,
}

/// A compiled handler instance: its descriptors plus the dispatch table.
pub struct CompiledHandler {
    descriptors: Vec<HandlerDescriptor>,
    methods: HashMap<String, CompiledMethod>,
}

impl CompiledHandler {
    pub fn descriptors(&self) -> &[HandlerDescriptor] {
        &self.descriptors
    }
}

impl fmt::Debug for CompiledHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledHandler")
            .field("descriptors", &self.descriptors)
            .finish_non_exhaustive()
    }
}

impl RequestHandler for CompiledHandler {
    fn handle<'a>(&'a self, ctx: &'a RequestContext) -> HandlerFuture<'a> {
        Box::pin(async move {
            let Some(method) = ctx
                .data_tokens()
                .and_then(DataTokens::handler_id)
                .and_then(|id| self.methods.get(id))
            else {
                return Ok(None);
            };

            let fut = (method.call)(&method.bindings, ctx)?;
            Ok(fut.await)
        })
    }
}

impl RouteResolver for CompiledHandler {
    fn resolve_routes(&self) -> Vec<QualifiedRoute> {
        self.descriptors
            .iter()
            .flat_map(|d| d.routes.iter().cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::context::RouteMatch;
    use crate::handler::result::{results, Reply};
    use axum::http::Method;
    use std::collections::HashSet;

    struct Echo;

    fn compile_echo() -> CompiledHandler {
        HandlerBuilder::new(Echo)
            .local_route("v1/test")
            .local_route("v1/alt/")
            .method(
                MethodSpec::new("echo")
                    .get(None)
                    .put("echo/{id}")
                    .bind(ParameterBinding::query("msg").with_default("none"))
                    .to(|_h: Arc<Echo>, (msg,): (String,)| async move { Reply::Value(msg) }),
            )
            .method(MethodSpec::new("ignored").to(|_h: Arc<Echo>, (): ()| async { results::OK }))
            .compile()
            .unwrap()
    }

    fn dispatch_ctx(route: &QualifiedRoute, query: &str) -> RequestContext {
        let mut ctx = RequestContext::new(Method::GET, "/").with_query(query);
        ctx.enter_route(RouteMatch {
            template: route.template.clone(),
            values: Default::default(),
            data_tokens: route.data_tokens.clone(),
        });
        ctx
    }

    #[test]
    fn test_cross_product_of_prefixes_and_verbs() {
        let handler = compile_echo();
        assert_eq!(handler.descriptors().len(), 1);

        let templates: Vec<String> = handler.resolve_routes().into_iter().map(|r| r.template).collect();
        assert_eq!(
            templates,
            vec!["v1/test/echo", "v1/test/echo/{id}", "v1/alt/echo", "v1/alt/echo/{id}"]
        );
    }

    #[test]
    fn test_one_id_per_method() {
        let handler = compile_echo();
        let ids: HashSet<String> = handler
            .resolve_routes()
            .iter()
            .filter_map(|r| r.data_tokens.handler_id().map(str::to_string))
            .collect();
        assert_eq!(ids.len(), 1);

        let other = compile_echo();
        assert_ne!(handler.descriptors()[0].id, other.descriptors()[0].id);
    }

    #[test]
    fn test_verb_constraint_applied() {
        let handler = compile_echo();
        let routes = handler.resolve_routes();
        let get_route = &routes[0];
        let put_route = &routes[1];

        let get = RequestContext::new(Method::GET, "/v1/test/echo");
        let put = RequestContext::new(Method::PUT, "/v1/test/echo/1");
        assert!(get_route.constraint.as_ref().unwrap().matches(&get));
        assert!(!get_route.constraint.as_ref().unwrap().matches(&put));
        assert!(put_route.constraint.as_ref().unwrap().matches(&put));
    }

    #[tokio::test]
    async fn test_invocation_binds_parameters() {
        let handler = compile_echo();
        let route = handler.resolve_routes().remove(0);

        let result = handler.handle(&dispatch_ctx(&route, "msg=hi")).await.unwrap().unwrap();
        assert_eq!(result.evaluate().body.as_ref(), br#""hi""#);

        let result = handler.handle(&dispatch_ctx(&route, "")).await.unwrap().unwrap();
        assert_eq!(result.evaluate().body.as_ref(), br#""none""#);
    }

    #[tokio::test]
    async fn test_unknown_handler_id_declines() {
        let handler = compile_echo();
        let route = QualifiedRoute {
            template: "x".into(),
            constraint: None,
            data_tokens: DataTokens::new().with(HANDLER_ID_TOKEN, "not-an-id"),
        };
        assert!(handler.handle(&dispatch_ctx(&route, "")).await.unwrap().is_none());
    }

    #[test]
    fn test_missing_invoker_is_rejected() {
        let err = HandlerBuilder::new(Echo)
            .method(MethodSpec::new("health").get(None))
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::MissingInvoker { .. }));
    }

    #[test]
    fn test_binding_count_mismatch_is_rejected() {
        let err = HandlerBuilder::new(Echo)
            .method(
                MethodSpec::new("health")
                    .get(None)
                    .bind(ParameterBinding::query("a"))
                    .to(|_h: Arc<Echo>, (): ()| async { results::OK }),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBinding { .. }));
    }

    #[test]
    fn test_bad_default_and_bad_template_are_rejected() {
        let err = HandlerBuilder::new(Echo)
            .method(
                MethodSpec::new("health")
                    .get(None)
                    .bind(ParameterBinding::query("code").with_default("abc"))
                    .to(|_h: Arc<Echo>, (_code,): (u16,)| async { results::OK }),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBinding { .. }));

        let err = HandlerBuilder::new(Echo)
            .method(
                MethodSpec::new("health")
                    .get("{*rest}/tail")
                    .to(|_h: Arc<Echo>, (): ()| async { results::OK }),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_raw_handler_rejects_bindings() {
        let err = HandlerBuilder::new(Echo)
            .method(
                MethodSpec::new("raw")
                    .get(None)
                    .bind(ParameterBinding::query("a"))
                    .to_raw(|_h: Arc<Echo>, _ctx: RequestContext| async { results::OK }),
            )
            .compile()
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidBinding { .. }));
    }
}
