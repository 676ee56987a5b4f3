//! Parameter binding.
//!
//! # Responsibilities
//! - Describe where each handler parameter comes from (query, header, body, route)
//! - Convert raw request values into typed parameters
//! - Check bindings against parameter types at registration time
//!
//! # Design Decisions
//! - Scalars take the first value; `Vec<T>` takes every value
//! - Body is JSON, read only when the payload is non-empty
//! - Absent ⇒ binding default, else `None` for `Option<T>`, else missing
//! - Handler parameter lists are tuples; arity is checked at registration

use std::fmt;

use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::handler::context::RequestContext;

/// Where a parameter value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingSource {
    Query,
    Header,
    Body,
    Route,
}

impl fmt::Display for BindingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BindingSource::Query => "query",
            BindingSource::Header => "header",
            BindingSource::Body => "body",
            BindingSource::Route => "route",
        })
    }
}

/// Request-local binding failure; surfaces as a 400.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindingError {
    #[error("missing required {location} parameter `{name}`")]
    Missing { location: BindingSource, name: String },

    #[error("invalid {location} parameter `{name}`: {reason}")]
    Invalid {
        location: BindingSource,
        name: String,
        reason: String,
    },

    #[error("malformed request body: {0}")]
    MalformedBody(String),

    #[error("expected {expected} bindings, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },
}

/// How one handler parameter is bound.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    source: BindingSource,
    name: String,
    alias: Option<String>,
    default: Option<Value>,
}

impl ParameterBinding {
    pub fn new(source: BindingSource, name: impl Into<String>) -> Self {
        Self {
            source,
            name: name.into(),
            alias: None,
            default: None,
        }
    }

    pub fn query(name: impl Into<String>) -> Self {
        Self::new(BindingSource::Query, name)
    }

    pub fn header(name: impl Into<String>) -> Self {
        Self::new(BindingSource::Header, name)
    }

    pub fn body(name: impl Into<String>) -> Self {
        Self::new(BindingSource::Body, name)
    }

    pub fn route(name: impl Into<String>) -> Self {
        Self::new(BindingSource::Route, name)
    }

    /// Look the value up under `alias` instead of the parameter name.
    pub fn rename(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn source(&self) -> BindingSource {
        self.source
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The key used against the request.
    pub fn lookup_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    fn invalid(&self, reason: impl Into<String>) -> BindingError {
        BindingError::Invalid {
            location: self.source,
            name: self.lookup_name().to_string(),
            reason: reason.into(),
        }
    }

    fn missing(&self) -> BindingError {
        BindingError::Missing {
            location: self.source,
            name: self.lookup_name().to_string(),
        }
    }

    fn absent<T: FromBinding>(&self) -> Result<T, BindingError> {
        match &self.default {
            Some(value) => T::from_default(value).map_err(|reason| self.invalid(reason)),
            None => Err(self.missing()),
        }
    }
}

enum Raw<'a> {
    Text(Vec<&'a str>),
    Json(&'a [u8]),
    Absent,
}

fn raw<'a>(binding: &ParameterBinding, ctx: &'a RequestContext) -> Raw<'a> {
    let name = binding.lookup_name();
    let values = match binding.source {
        BindingSource::Query => ctx.query().get_all(name),
        BindingSource::Header => ctx.header_values(name),
        BindingSource::Route => ctx.route_value(name).into_iter().collect(),
        BindingSource::Body => {
            return if ctx.body().is_empty() {
                Raw::Absent
            } else {
                Raw::Json(ctx.body().as_ref())
            };
        }
    };

    if values.is_empty() {
        Raw::Absent
    } else {
        Raw::Text(values)
    }
}

fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BindingError> {
    serde_json::from_slice(bytes).map_err(|e| BindingError::MalformedBody(e.to_string()))
}

mod sealed {
    pub trait Sealed {}
}

/// Types convertible from a single string value.
pub trait ScalarParam: DeserializeOwned + Send + 'static + sealed::Sealed {
    fn parse_param(raw: &str) -> Result<Self, String>;
}

macro_rules! impl_scalar_from_str {
    ($($t:ty),*) => {
        $(
            impl sealed::Sealed for $t {}

            impl ScalarParam for $t {
                fn parse_param(raw: &str) -> Result<Self, String> {
                    raw.trim().parse::<$t>().map_err(|e| e.to_string())
                }
            }
        )*
    };
}

impl_scalar_from_str!(i16, i32, i64, u16, u32, u64, usize, f64);

impl sealed::Sealed for String {}

impl ScalarParam for String {
    fn parse_param(raw: &str) -> Result<Self, String> {
        Ok(raw.to_string())
    }
}

impl sealed::Sealed for bool {}

impl ScalarParam for bool {
    fn parse_param(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.eq_ignore_ascii_case("true") || raw == "1" {
            Ok(true)
        } else if raw.eq_ignore_ascii_case("false") || raw == "0" {
            Ok(false)
        } else {
            Err(format!("`{}` is not a boolean", raw))
        }
    }
}

/// A JSON request body of type `T`.
#[derive(Debug, Clone, PartialEq)]
pub struct Document<T>(pub T);

impl<T> Document<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// A handler parameter type that can be produced from a binding.
pub trait FromBinding: Sized + Send + 'static {
    /// Whether this type can be read from `source`.
    fn supports(source: BindingSource) -> bool;

    /// Convert a declared default value.
    fn from_default(value: &Value) -> Result<Self, String>;

    fn from_binding(binding: &ParameterBinding, ctx: &RequestContext) -> Result<Self, BindingError>;
}

fn scalar_from_default<T: ScalarParam>(value: &Value) -> Result<T, String> {
    match value {
        Value::String(s) => T::parse_param(s),
        other => serde_json::from_value(other.clone()).map_err(|e| e.to_string()),
    }
}

macro_rules! impl_from_binding_scalar {
    ($($t:ty),*) => {
        $(
            impl FromBinding for $t {
                fn supports(_source: BindingSource) -> bool {
                    true
                }

                fn from_default(value: &Value) -> Result<Self, String> {
                    scalar_from_default(value)
                }

                fn from_binding(
                    binding: &ParameterBinding,
                    ctx: &RequestContext,
                ) -> Result<Self, BindingError> {
                    match raw(binding, ctx) {
                        Raw::Text(values) => {
                            <$t as ScalarParam>::parse_param(values[0])
                                .map_err(|reason| binding.invalid(reason))
                        }
                        Raw::Json(bytes) => parse_body(bytes),
                        Raw::Absent => binding.absent(),
                    }
                }
            }
        )*
    };
}

impl_from_binding_scalar!(String, bool, i16, i32, i64, u16, u32, u64, usize, f64);

impl<T: ScalarParam> FromBinding for Vec<T> {
    fn supports(source: BindingSource) -> bool {
        source != BindingSource::Route
    }

    fn from_default(value: &Value) -> Result<Self, String> {
        match value {
            Value::Array(items) => items.iter().map(scalar_from_default::<T>).collect(),
            single => scalar_from_default(single).map(|v| vec![v]),
        }
    }

    fn from_binding(binding: &ParameterBinding, ctx: &RequestContext) -> Result<Self, BindingError> {
        match raw(binding, ctx) {
            Raw::Text(values) => values
                .into_iter()
                .map(|v| T::parse_param(v).map_err(|reason| binding.invalid(reason)))
                .collect(),
            Raw::Json(bytes) => parse_body(bytes),
            Raw::Absent => binding.absent(),
        }
    }
}

impl<T: FromBinding> FromBinding for Option<T> {
    fn supports(source: BindingSource) -> bool {
        T::supports(source)
    }

    fn from_default(value: &Value) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_default(value).map(Some)
        }
    }

    fn from_binding(binding: &ParameterBinding, ctx: &RequestContext) -> Result<Self, BindingError> {
        match raw(binding, ctx) {
            Raw::Absent => match binding.default_value() {
                Some(value) => Self::from_default(value).map_err(|reason| binding.invalid(reason)),
                None => Ok(None),
            },
            _ => T::from_binding(binding, ctx).map(Some),
        }
    }
}

impl<T: DeserializeOwned + Send + 'static> FromBinding for Document<T> {
    fn supports(source: BindingSource) -> bool {
        source == BindingSource::Body
    }

    fn from_default(value: &Value) -> Result<Self, String> {
        serde_json::from_value(value.clone())
            .map(Document)
            .map_err(|e| e.to_string())
    }

    fn from_binding(binding: &ParameterBinding, ctx: &RequestContext) -> Result<Self, BindingError> {
        match raw(binding, ctx) {
            Raw::Json(bytes) => parse_body(bytes).map(Document),
            _ => binding.absent(),
        }
    }
}

/// Registration-time check of one binding against its parameter type.
pub fn validate_binding<T: FromBinding>(binding: &ParameterBinding) -> Result<(), String> {
    if !T::supports(binding.source()) {
        return Err(format!(
            "parameter `{}` cannot be bound from {}",
            binding.name(),
            binding.source()
        ));
    }
    if let Some(default) = binding.default_value() {
        T::from_default(default).map_err(|reason| {
            format!("default for parameter `{}` is invalid: {}", binding.name(), reason)
        })?;
    }
    Ok(())
}

/// A handler's full parameter list, bound as a tuple.
pub trait BindArgs: Sized + Send + 'static {
    const ARITY: usize;

    fn validate(bindings: &[ParameterBinding]) -> Result<(), String>;

    fn bind(bindings: &[ParameterBinding], ctx: &RequestContext) -> Result<Self, BindingError>;
}

macro_rules! impl_bind_args {
    ($arity:expr; $($ty:ident => $idx:tt),*) => {
        impl<$($ty: FromBinding),*> BindArgs for ($($ty,)*) {
            const ARITY: usize = $arity;

            fn validate(bindings: &[ParameterBinding]) -> Result<(), String> {
                if bindings.len() != Self::ARITY {
                    return Err(format!(
                        "handler takes {} parameters but {} bindings were declared",
                        Self::ARITY,
                        bindings.len()
                    ));
                }
                $( validate_binding::<$ty>(&bindings[$idx])?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn bind(bindings: &[ParameterBinding], ctx: &RequestContext) -> Result<Self, BindingError> {
                if bindings.len() != Self::ARITY {
                    return Err(BindingError::ArityMismatch {
                        expected: Self::ARITY,
                        actual: bindings.len(),
                    });
                }
                Ok(($( $ty::from_binding(&bindings[$idx], ctx)?, )*))
            }
        }
    };
}

impl_bind_args!(0;);
impl_bind_args!(1; A => 0);
impl_bind_args!(2; A => 0, B => 1);
impl_bind_args!(3; A => 0, B => 1, C => 2);
impl_bind_args!(4; A => 0, B => 1, C => 2, D => 3);
impl_bind_args!(5; A => 0, B => 1, C => 2, D => 3, E => 4);
impl_bind_args!(6; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5);
impl_bind_args!(7; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6);
impl_bind_args!(8; A => 0, B => 1, C => 2, D => 3, E => 4, F => 5, G => 6, H => 7);

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use serde::Deserialize;

    fn get(query: &str) -> RequestContext {
        RequestContext::new(Method::GET, "/v1/sys/health").with_query(query)
    }

    #[test]
    fn test_scalar_from_query() {
        let b = ParameterBinding::query("activecode").with_default(200);
        assert_eq!(u16::from_binding(&b, &get("activecode=201")).unwrap(), 201);
        assert_eq!(u16::from_binding(&b, &get("")).unwrap(), 200);

        let err = u16::from_binding(&b, &get("activecode=abc")).unwrap_err();
        assert!(matches!(err, BindingError::Invalid { .. }));
    }

    #[test]
    fn test_missing_without_default() {
        let b = ParameterBinding::query("name");
        assert!(matches!(
            String::from_binding(&b, &get("")),
            Err(BindingError::Missing { .. })
        ));
        assert_eq!(Option::<String>::from_binding(&b, &get("")).unwrap(), None);
        assert_eq!(
            Option::<String>::from_binding(&b, &get("name=x")).unwrap(),
            Some("x".to_string())
        );
    }

    #[test]
    fn test_bool_parsing() {
        let b = ParameterBinding::query("standbyok").with_default(false);
        assert!(bool::from_binding(&b, &get("standbyok=TRUE")).unwrap());
        assert!(bool::from_binding(&b, &get("standbyok=1")).unwrap());
        assert!(!bool::from_binding(&b, &get("standbyok=0")).unwrap());
        assert!(!bool::from_binding(&b, &get("")).unwrap());
        assert!(bool::from_binding(&b, &get("standbyok=maybe")).is_err());
    }

    #[test]
    fn test_vec_takes_every_value() {
        let b = ParameterBinding::query("id");
        let ids = Vec::<u32>::from_binding(&b, &get("id=1&id=2&ID=3")).unwrap();
        assert_eq!(ids, vec![1, 2, 3]);

        let names = Vec::<String>::from_binding(&b, &get("id=a&id=b")).unwrap();
        assert_eq!(names, vec!["a", "b"]);

        assert!(Vec::<u32>::from_binding(&b, &get("id=1&id=x")).is_err());
    }

    #[test]
    fn test_header_and_alias() {
        let ctx = get("").with_header("x-vault-token", "root");
        let b = ParameterBinding::header("token").rename("X-Vault-Token");
        assert_eq!(String::from_binding(&b, &ctx).unwrap(), "root");
    }

    #[test]
    fn test_body_document() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Init {
            secret_shares: u32,
        }

        let b = ParameterBinding::body("request");
        let ctx = get("").with_body(r#"{"secret_shares":5}"#);
        let Document(init) = Document::<Init>::from_binding(&b, &ctx).unwrap();
        assert_eq!(init.secret_shares, 5);

        let bad = get("").with_body("{not json");
        assert!(matches!(
            Document::<Init>::from_binding(&b, &bad),
            Err(BindingError::MalformedBody(_))
        ));

        // empty body falls back to missing
        assert!(matches!(
            Document::<Init>::from_binding(&b, &get("")),
            Err(BindingError::Missing { .. })
        ));
    }

    #[test]
    fn test_validate_binding() {
        assert!(validate_binding::<u16>(&ParameterBinding::query("x").with_default(5)).is_ok());
        assert!(validate_binding::<u16>(&ParameterBinding::query("x").with_default("abc")).is_err());
        assert!(validate_binding::<Document<Value>>(&ParameterBinding::query("x")).is_err());
        assert!(validate_binding::<Vec<String>>(&ParameterBinding::route("x")).is_err());
    }

    #[test]
    fn test_bind_args_tuple() {
        let bindings = vec![
            ParameterBinding::query("a"),
            ParameterBinding::query("b").with_default(true),
        ];
        assert!(<(u32, bool)>::validate(&bindings).is_ok());
        assert!(<(u32,)>::validate(&bindings).is_err());

        let (a, b) = <(u32, bool)>::bind(&bindings, &get("a=9")).unwrap();
        assert_eq!(a, 9);
        assert!(b);

        assert!(<()>::bind(&[], &get("")).is_ok());
    }
}
