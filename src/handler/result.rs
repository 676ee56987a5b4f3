//! Handler results and their evaluation into HTTP responses.
//!
//! # Responsibilities
//! - Tagged result variants: object, bare status, composite overrides
//! - Evaluate a result into status, content type, headers and body bytes
//! - Wrap plain handler return values into object results
//!
//! # Design Decisions
//! - Objects default to `200` and `application/json; charset=utf-8`
//! - A bare status writes no body and no content type
//! - Composite overrides apply after the inner result is evaluated

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{json, Value};

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// The outcome of a handler invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum HandlerResult {
    Object(ObjectResult),
    Status(StatusCodeResult),
    Composite(CompositeResult),
}

/// A JSON payload with optional explicit status.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectResult {
    pub value: Value,
    pub status: Option<StatusCode>,
    pub content_type: String,
}

/// Status only, no body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCodeResult(pub StatusCode);

/// Wraps another result, overriding status and adding headers.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeResult {
    pub inner: Box<HandlerResult>,
    pub status: Option<StatusCode>,
    pub headers: HeaderMap,
}

/// A fully evaluated response, ready to be written by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Common status results.
pub mod results {
    use super::{HandlerResult, StatusCodeResult};
    use axum::http::StatusCode;

    pub const OK: HandlerResult = HandlerResult::Status(StatusCodeResult(StatusCode::OK));
    pub const NO_CONTENT: HandlerResult =
        HandlerResult::Status(StatusCodeResult(StatusCode::NO_CONTENT));
    pub const BAD_REQUEST: HandlerResult =
        HandlerResult::Status(StatusCodeResult(StatusCode::BAD_REQUEST));
    pub const NOT_FOUND: HandlerResult =
        HandlerResult::Status(StatusCodeResult(StatusCode::NOT_FOUND));
    pub const METHOD_NOT_ALLOWED: HandlerResult =
        HandlerResult::Status(StatusCodeResult(StatusCode::METHOD_NOT_ALLOWED));
}

impl HandlerResult {
    /// Serialize `value` into an object result without an explicit status.
    pub fn object<T: Serialize>(value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(value) => HandlerResult::Object(ObjectResult {
                value,
                status: None,
                content_type: JSON_CONTENT_TYPE.to_string(),
            }),
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize handler value");
                error_object(StatusCode::INTERNAL_SERVER_ERROR, ["internal error"])
            }
        }
    }

    pub fn status(status: StatusCode) -> Self {
        HandlerResult::Status(StatusCodeResult(status))
    }

    /// Override the status of this result.
    pub fn with_status(self, status: StatusCode) -> Self {
        match self {
            HandlerResult::Object(mut obj) => {
                obj.status = Some(status);
                HandlerResult::Object(obj)
            }
            HandlerResult::Status(_) => HandlerResult::status(status),
            HandlerResult::Composite(mut c) => {
                c.status = Some(status);
                HandlerResult::Composite(c)
            }
        }
    }

    /// Add a response header, wrapping into a composite if needed.
    pub fn with_header(self, name: HeaderName, value: HeaderValue) -> Self {
        let mut composite = match self {
            HandlerResult::Composite(c) => c,
            other => CompositeResult {
                inner: Box::new(other),
                status: None,
                headers: HeaderMap::new(),
            },
        };
        composite.headers.append(name, value);
        HandlerResult::Composite(composite)
    }

    pub fn evaluate(self) -> EvaluatedResponse {
        match self {
            HandlerResult::Object(obj) => {
                let body = match serde_json::to_vec(&obj.value) {
                    Ok(bytes) => Bytes::from(bytes),
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to encode object result");
                        return HandlerResult::status(StatusCode::INTERNAL_SERVER_ERROR).evaluate();
                    }
                };
                EvaluatedResponse {
                    status: obj.status.unwrap_or(StatusCode::OK),
                    content_type: Some(obj.content_type),
                    headers: HeaderMap::new(),
                    body,
                }
            }
            HandlerResult::Status(StatusCodeResult(status)) => EvaluatedResponse {
                status,
                content_type: None,
                headers: HeaderMap::new(),
                body: Bytes::new(),
            },
            HandlerResult::Composite(c) => {
                let mut evaluated = c.inner.evaluate();
                if let Some(status) = c.status {
                    evaluated.status = status;
                }
                for (name, value) in c.headers.iter() {
                    evaluated.headers.append(name.clone(), value.clone());
                }
                evaluated
            }
        }
    }
}

impl IntoResponse for EvaluatedResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        let headers = response.headers_mut();
        if let Some(ct) = self.content_type.and_then(|ct| HeaderValue::from_str(&ct).ok()) {
            headers.insert(header::CONTENT_TYPE, ct);
        }
        headers.extend(self.headers);
        response
    }
}

impl IntoResponse for HandlerResult {
    fn into_response(self) -> Response {
        self.evaluate().into_response()
    }
}

/// `200` object result.
pub fn ok_object<T: Serialize>(value: &T) -> HandlerResult {
    HandlerResult::object(value).with_status(StatusCode::OK)
}

/// `404` with an empty error list.
pub fn not_found_object() -> HandlerResult {
    HandlerResult::object(&json!({ "errors": [] })).with_status(StatusCode::NOT_FOUND)
}

/// Error list body, `{"errors": [...]}`.
pub fn error_object<I, S>(status: StatusCode, messages: I) -> HandlerResult
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let errors: Vec<String> = messages.into_iter().map(Into::into).collect();
    HandlerResult::Object(ObjectResult {
        value: json!({ "errors": errors }),
        status: Some(status),
        content_type: JSON_CONTENT_TYPE.to_string(),
    })
}

/// A handler return value: either a plain value or an explicit result.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Value(T),
    Result(HandlerResult),
}

impl<T> From<HandlerResult> for Reply<T> {
    fn from(result: HandlerResult) -> Self {
        Reply::Result(result)
    }
}

/// Conversion of handler return values into an optional result.
///
/// `None` means the handler declined the request.
pub trait IntoHandlerResult {
    fn into_handler_result(self) -> Option<HandlerResult>;
}

impl IntoHandlerResult for HandlerResult {
    fn into_handler_result(self) -> Option<HandlerResult> {
        Some(self)
    }
}

impl<T: Serialize> IntoHandlerResult for Reply<T> {
    fn into_handler_result(self) -> Option<HandlerResult> {
        match self {
            Reply::Value(v) => Some(HandlerResult::object(&v)),
            Reply::Result(r) => Some(r),
        }
    }
}

impl<R: IntoHandlerResult> IntoHandlerResult for Option<R> {
    fn into_handler_result(self) -> Option<HandlerResult> {
        self.and_then(IntoHandlerResult::into_handler_result)
    }
}
