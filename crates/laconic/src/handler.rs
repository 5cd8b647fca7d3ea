//! Endpoint handlers and exception handlers.
//!
//! Endpoint handlers are async functions taking a [`Call`]:
//!
//! ```rust,ignore
//! async fn add(call: Call) -> EndpointResult<Json<Value>> {
//!     let a: i64 = call.param("a")?;
//!     let b: i64 = call.param("b")?;
//!     Ok(Json(json!({ "sum": a + b })))
//! }
//! ```
//!
//! Exception handlers are plain functions that turn an endpoint failure into
//! a reply. They are tried most specific first.

use std::any::type_name;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use laconic_core::{ApiError, ApiErrorKind, AttributeScope, Params};
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::context::Context;
use crate::request::Request;
use crate::response::{IntoReply, Reply};

/// Error type returned by endpoints.
pub type EndpointError = Box<dyn Error + Send + Sync + 'static>;

/// Result type for endpoint functions.
pub type EndpointResult<T> = Result<T, EndpointError>;

/// Boxed future returned by type-erased handlers.
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Everything an endpoint receives for one request.
#[derive(Debug, Clone)]
pub struct Call {
    params: Params,
    request: Arc<Request>,
    endpoint: Arc<str>,
    attrs: Arc<AttributeScope>,
    locals: HashMap<String, Value>,
}

impl Call {
    pub(crate) const fn new(
        params: Params,
        request: Arc<Request>,
        endpoint: Arc<str>,
        attrs: Arc<AttributeScope>,
        locals: HashMap<String, Value>,
    ) -> Self {
        Self {
            params,
            request,
            endpoint,
            attrs,
            locals,
        }
    }

    /// Resolved parameters.
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Typed value of a declared parameter.
    ///
    /// # Errors
    ///
    /// Returns an `ApiError` if the parameter is absent or has another type.
    pub fn param<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        self.params.get(name)
    }

    /// The incoming request.
    #[must_use]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Name of the endpoint being called.
    #[must_use]
    pub fn endpoint_name(&self) -> &str {
        &self.endpoint
    }

    /// Route attribute, resolved through region and app scopes.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Value stored in the request context by a hook.
    #[must_use]
    pub fn local(&self, key: &str) -> Option<&Value> {
        self.locals.get(key)
    }
}

/// An async endpoint function.
pub trait Handler: Send + Sync + 'static {
    /// Run the endpoint.
    fn call(&self, call: Call) -> BoxFuture<Result<Reply, EndpointError>>;
}

impl<F, Fut, R, E> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, E>> + Send + 'static,
    R: IntoReply,
    E: Into<EndpointError>,
{
    fn call(&self, call: Call) -> BoxFuture<Result<Reply, EndpointError>> {
        let fut = self(call);
        Box::pin(async move { fut.await.map(IntoReply::into_reply).map_err(Into::into) })
    }
}

// =============================================================================
// Exception handlers
// =============================================================================

type ErasedExceptionFn =
    dyn Fn(&(dyn Error + Send + Sync + 'static), &Context) -> Option<Reply> + Send + Sync;

/// Which errors an exception handler accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorMatcher {
    /// A concrete error type.
    Type(&'static str),
    /// An `ApiError` of this kind or a descendant kind.
    Kind(ApiErrorKind),
    /// Any error.
    Any,
}

impl ErrorMatcher {
    /// Higher is tried first.
    fn specificity(&self) -> usize {
        match self {
            Self::Type(_) => usize::MAX,
            Self::Kind(kind) => kind.depth() + 1,
            Self::Any => 0,
        }
    }
}

impl fmt::Display for ErrorMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Type(name) => f.write_str(name),
            Self::Kind(kind) => write!(f, "ApiError::{kind:?}"),
            Self::Any => f.write_str("*"),
        }
    }
}

/// Turns matching endpoint errors into replies.
#[derive(Clone)]
pub struct ExceptionHandler {
    matcher: ErrorMatcher,
    handler: Arc<ErasedExceptionFn>,
}

impl fmt::Debug for ExceptionHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExceptionHandler")
            .field("matcher", &self.matcher)
            .finish_non_exhaustive()
    }
}

impl ExceptionHandler {
    /// Handle errors of the concrete type `E`.
    pub fn for_type<E, F, R>(handler: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Self {
            matcher: ErrorMatcher::Type(type_name::<E>()),
            handler: Arc::new(move |err: &(dyn Error + Send + Sync + 'static), ctx: &Context| {
                err.downcast_ref::<E>()
                    .map(|e| handler(e, ctx).into_reply())
            }),
        }
    }

    /// Handle `ApiError`s of `kind` or any descendant kind.
    pub fn for_kind<F, R>(kind: ApiErrorKind, handler: F) -> Self
    where
        F: Fn(&ApiError, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Self {
            matcher: ErrorMatcher::Kind(kind),
            handler: Arc::new(move |err: &(dyn Error + Send + Sync + 'static), ctx: &Context| {
                err.downcast_ref::<ApiError>()
                    .filter(|e| e.kind().is_a(kind))
                    .map(|e| handler(e, ctx).into_reply())
            }),
        }
    }

    /// Handle every error.
    pub fn fallback<F, R>(handler: F) -> Self
    where
        F: Fn(&(dyn Error + Send + Sync + 'static), &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        Self {
            matcher: ErrorMatcher::Any,
            handler: Arc::new(
                move |err: &(dyn Error + Send + Sync + 'static), ctx: &Context| {
                    Some(handler(err, ctx).into_reply())
                },
            ),
        }
    }

    /// What this handler accepts.
    #[must_use]
    pub const fn matcher(&self) -> &ErrorMatcher {
        &self.matcher
    }

    /// Produce a reply if `err` is accepted.
    #[must_use]
    pub fn try_handle(
        &self,
        err: &(dyn Error + Send + Sync + 'static),
        ctx: &Context,
    ) -> Option<Reply> {
        (self.handler)(err, ctx)
    }
}

/// Exception handlers ordered most specific first.
///
/// Ties keep registration order.
#[derive(Debug, Clone, Default)]
pub struct ExceptionHandlers {
    handlers: Vec<ExceptionHandler>,
}

impl ExceptionHandlers {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler in specificity order.
    pub fn add(&mut self, handler: ExceptionHandler) {
        let specificity = handler.matcher.specificity();
        let pos = self
            .handlers
            .partition_point(|h| h.matcher.specificity() >= specificity);
        self.handlers.insert(pos, handler);
    }

    /// Append all handlers of `other`, keeping order.
    pub fn extend(&mut self, other: &Self) {
        for handler in &other.handlers {
            self.add(handler.clone());
        }
    }

    /// First reply produced by a matching handler.
    #[must_use]
    pub fn handle(&self, err: &(dyn Error + Send + Sync + 'static), ctx: &Context) -> Option<Reply> {
        self.handlers.iter().find_map(|h| h.try_handle(err, ctx))
    }

    /// Handlers in the order they are tried.
    pub fn iter(&self) -> impl Iterator<Item = &ExceptionHandler> {
        self.handlers.iter()
    }

    /// Number of handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
