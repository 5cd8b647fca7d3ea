//! Request lifecycle.
//!
//! Every request gets a [`Context`] that walks through a fixed sequence of
//! states, firing event hooks along the way:
//!
//! ```text
//! Created -> Initialized -> RequestParsed -> EndpointDetermined -> ResponseGenerated -> Finalized
//!                 \               \                  \
//!                  +---------------+------------------+--> Error -> ResponseGenerated
//! ```
//!
//! Any step (or hook) may fail, which moves the context to `Error`; the
//! error is then rendered as the response. A hook may also answer the
//! request early with [`Context::respond`].

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::http::{self, HeaderValue, header::CONTENT_LENGTH, request::Parts};
use http_body_util::LengthLimitError;
use laconic_core::{ApiError, ParamLocation, Params};
use serde_json::{Value, json};

use crate::app::AppInner;
use crate::config::LaconicConfig;
use crate::error::{lifecycle_breadcrumb, report_error};
use crate::handler::Call;
use crate::hooks::Event;
use crate::request::{REQUEST_ID_HEADER, Request, ensure_request_id, new_request_id};
use crate::response::{IntoReply, Reply, error_reply};
use crate::router::Endpoint;

/// Description of the last-resort error response.
pub const GENERIC_ERROR: &str = "An unexpected internal server error occured";

/// Where a request is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextState {
    Created,
    Initialized,
    RequestParsed,
    EndpointDetermined,
    ResponseGenerated,
    Finalized,
    Error,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// State and data of one request.
#[derive(Debug)]
pub struct Context {
    state: ContextState,
    config: Arc<LaconicConfig>,
    request_id: String,
    request: Option<Arc<Request>>,
    endpoint: Option<Arc<Endpoint>>,
    response: Option<Reply>,
    error: Option<ApiError>,
    locals: HashMap<String, Value>,
}

impl Context {
    pub(crate) fn new(config: Arc<LaconicConfig>, request_id: String) -> Self {
        Self {
            state: ContextState::Created,
            config,
            request_id,
            request: None,
            endpoint: None,
            response: None,
            error: None,
            locals: HashMap::new(),
        }
    }

    /// A context not attached to any request.
    ///
    /// Useful for exercising hooks and exception handlers directly.
    #[must_use]
    pub fn detached(config: Arc<LaconicConfig>) -> Self {
        Self::new(config, new_request_id())
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ContextState {
        self.state
    }

    /// Parsed request, once the request has been read.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_deref()
    }

    /// Endpoint serving the request, once determined.
    #[must_use]
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_deref()
    }

    /// Response generated so far.
    #[must_use]
    pub const fn response(&self) -> Option<&Reply> {
        self.response.as_ref()
    }

    /// Mutable response, for hooks that decorate it.
    pub const fn response_mut(&mut self) -> Option<&mut Reply> {
        self.response.as_mut()
    }

    /// Error that interrupted processing, if any.
    #[must_use]
    pub const fn error(&self) -> Option<&ApiError> {
        self.error.as_ref()
    }

    /// Answer the request now, skipping the remaining steps.
    pub fn respond(&mut self, reply: impl IntoReply) {
        self.response = Some(reply.into_reply());
        if self.state != ContextState::Finalized {
            self.state = ContextState::ResponseGenerated;
        }
    }

    /// Abort processing with `err`; it becomes the response.
    ///
    /// Called from an `on_response_generated` hook while an error response
    /// is being rendered, or from an `on_context_finalize` hook, the request
    /// is answered with the generic 500 instead.
    pub fn fail(&mut self, err: ApiError) {
        self.error = Some(err);
        self.state = ContextState::Error;
    }

    /// Request-scoped values, shared with the endpoint.
    #[must_use]
    pub const fn locals(&self) -> &HashMap<String, Value> {
        &self.locals
    }

    /// Mutable request-scoped values.
    pub const fn locals_mut(&mut self) -> &mut HashMap<String, Value> {
        &mut self.locals
    }

    /// Request ID (`x-request-id`).
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Application configuration.
    #[must_use]
    pub fn config(&self) -> &LaconicConfig {
        &self.config
    }

    fn expect(&self, state: ContextState) -> Result<(), ApiError> {
        if self.state == state {
            Ok(())
        } else {
            Err(ApiError::context_processing(format!(
                "Didn't expect the context to be in state {}.",
                self.state
            )))
        }
    }

    // =========================================================================
    // Steps
    // =========================================================================

    fn init(&mut self, app: &AppInner) -> Result<(), ApiError> {
        self.expect(ContextState::Created)?;
        app.hooks.trigger(Event::ContextInit, self)?;
        if self.state == ContextState::Created {
            self.state = ContextState::Initialized;
        }
        Ok(())
    }

    async fn process_request(
        &mut self,
        app: &AppInner,
        incoming: Option<(Parts, Body)>,
    ) -> Result<(), ApiError> {
        self.expect(ContextState::Initialized)?;
        let (parts, body) = incoming
            .ok_or_else(|| ApiError::context_processing("The request was already consumed."))?;
        let body = read_body(&parts, body, self.config.max_body_bytes).await?;

        self.request = Some(Arc::new(Request::from_parts(&parts, body)));
        self.state = ContextState::RequestParsed;
        app.hooks.trigger(Event::RequestParsed, self)
    }

    fn determine_endpoint(&mut self, app: &AppInner) -> Result<(), ApiError> {
        self.expect(ContextState::RequestParsed)?;
        let request = self.parsed_request()?;
        let endpoint = app
            .router
            .determine_endpoint(request.path(), request.method())?;

        tracing::Span::current().record("endpoint", endpoint.name());
        tracing::debug!(
            request_id = %self.request_id,
            endpoint = %endpoint.name(),
            "Endpoint determined"
        );

        self.endpoint = Some(endpoint);
        self.state = ContextState::EndpointDetermined;
        self.breadcrumb("Endpoint determined");
        app.hooks.trigger(Event::EndpointDetermined, self)
    }

    async fn dispatch(&mut self, app: &AppInner) -> Result<(), ApiError> {
        self.expect(ContextState::EndpointDetermined)?;
        let request = self.parsed_request()?;
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| ApiError::context_processing("No endpoint was determined."))?;

        // Parameter errors are answered directly, exception handlers never see them
        let params = resolve_params(&endpoint, &request)?;
        let call = Call::new(
            params,
            request,
            endpoint.shared_name(),
            Arc::clone(endpoint.attrs()),
            self.locals.clone(),
        );

        let reply = match endpoint.handler().call(call).await {
            Ok(reply) => Some(reply),
            Err(err) => {
                let handled = endpoint
                    .region_handlers()
                    .iter()
                    .find_map(|handlers| handlers.handle(err.as_ref(), self))
                    .or_else(|| app.exception_handlers.handle(err.as_ref(), self));
                if handled.is_some() {
                    tracing::debug!(
                        request_id = %self.request_id,
                        error = %err,
                        "Endpoint error handled"
                    );
                } else {
                    self.fail(unhandled_error(err.as_ref(), &endpoint));
                }
                handled
            }
        };

        if let Some(reply) = reply {
            self.response = Some(reply);
            self.state = ContextState::ResponseGenerated;
            self.breadcrumb("Response generated");
            app.hooks.trigger(Event::ResponseGenerated, self)?;
        }
        Ok(())
    }

    fn process_error(&mut self, app: &AppInner) -> Result<(), ApiError> {
        self.expect(ContextState::Error)?;
        let err = self
            .error
            .clone()
            .unwrap_or_else(|| ApiError::internal(GENERIC_ERROR));
        self.breadcrumb("Rendering error response");
        report_error(&err, &self.request_id);

        self.response = Some(error_reply(&err, self.config.debug));
        self.state = ContextState::ResponseGenerated;
        app.hooks.trigger(Event::ResponseGenerated, self)?;
        // The error response is rendered once; failing it again is fatal
        self.refailed()
    }

    fn finalize(&mut self, app: &AppInner) -> Result<(), ApiError> {
        self.expect(ContextState::ResponseGenerated)?;
        app.hooks.trigger(Event::ContextFinalize, self)?;
        self.refailed()?;
        self.state = ContextState::Finalized;
        Ok(())
    }

    /// Error recorded by a hook that called [`Context::fail`] and returned `Ok`.
    fn refailed(&self) -> Result<(), ApiError> {
        if self.state == ContextState::Error {
            Err(self
                .error
                .clone()
                .unwrap_or_else(|| ApiError::internal(GENERIC_ERROR)))
        } else {
            Ok(())
        }
    }

    fn breadcrumb(&self, message: &str) {
        let endpoint = self.endpoint.as_deref().map(Endpoint::name);
        sentry::add_breadcrumb(lifecycle_breadcrumb(self.state, endpoint, message));
    }

    fn parsed_request(&self) -> Result<Arc<Request>, ApiError> {
        self.request
            .clone()
            .ok_or_else(|| ApiError::context_processing("The request has not been parsed."))
    }
}

/// Turn an endpoint error no handler claimed into an API error.
///
/// Non-API errors carry the endpoint name and their `source()` chain as
/// data, shown in debug mode.
fn unhandled_error(err: &(dyn Error + 'static), endpoint: &Endpoint) -> ApiError {
    let api = ApiError::from_error(err);
    if api.data().is_some() || err.downcast_ref::<ApiError>().is_some() {
        return api;
    }

    let mut causes = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        causes.push(Value::String(cause.to_string()));
        source = cause.source();
    }
    api.with_data(json!({
        "endpoint": endpoint.name(),
        "caused_by": causes,
    }))
}

/// Collect the body, refusing anything over `limit` bytes.
async fn read_body(parts: &Parts, body: Body, limit: usize) -> Result<Bytes, ApiError> {
    let too_large = || {
        ApiError::bad_request(format!(
            "Request body exceeds the limit of {limit} bytes."
        ))
        .with_status(413)
        .with_name("Payload Too Large")
    };

    let declared = parts
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if declared.is_some_and(|len| len > limit) {
        return Err(too_large());
    }

    axum::body::to_bytes(body, limit).await.map_err(|e| {
        let source = e.into_inner();
        if source.is::<LengthLimitError>() {
            return too_large();
        }
        tracing::debug!(error = %source, "Failed to read request body");
        ApiError::bad_request(format!("Failed to read the request body: {source}"))
    })
}

/// Resolve every declared endpoint parameter from the URL or request data.
fn resolve_params(endpoint: &Endpoint, request: &Request) -> Result<Params, ApiError> {
    let url_params = endpoint.url_params(request.path());
    endpoint
        .params()
        .iter()
        .map(|param| {
            let raw = match param.location {
                ParamLocation::Path => url_params
                    .iter()
                    .find(|(name, _)| *name == param.name)
                    .map(|(_, value)| Value::String(value.clone())),
                ParamLocation::Request => request.param(&param.name),
            };
            param
                .resolve(raw.as_ref())
                .map(|value| (param.name.clone(), value))
        })
        .collect()
}

fn generic_error_reply() -> Reply {
    error_reply(&ApiError::internal(GENERIC_ERROR), false)
}

/// Take a request through the whole lifecycle and produce its response.
pub(crate) async fn process(app: &AppInner, request: http::Request<Body>) -> Reply {
    let (mut parts, body) = request.into_parts();
    let request_id = ensure_request_id(&mut parts.headers);
    let mut ctx = Context::new(Arc::clone(&app.config), request_id);
    let mut incoming = Some((parts, body));

    if let Err(err) = ctx.init(app) {
        ctx.fail(err);
    }

    while ctx.state != ContextState::ResponseGenerated {
        let step = match ctx.state {
            ContextState::Initialized => ctx.process_request(app, incoming.take()).await,
            ContextState::RequestParsed => ctx.determine_endpoint(app),
            ContextState::EndpointDetermined => ctx.dispatch(app).await,
            ContextState::Error => {
                if let Err(err) = ctx.process_error(app) {
                    tracing::error!(
                        request_id = %ctx.request_id,
                        error = %err,
                        "Failed to render error response"
                    );
                    return with_request_id(generic_error_reply(), &ctx.request_id);
                }
                Ok(())
            }
            state => Err(ApiError::context_processing(format!(
                "Didn't expect the context to be in state {state}."
            ))),
        };
        if let Err(err) = step {
            ctx.fail(err);
        }
    }

    if let Err(err) = ctx.finalize(app) {
        tracing::error!(
            request_id = %ctx.request_id,
            error = %err,
            "Failed to finalize request context"
        );
        return with_request_id(generic_error_reply(), &ctx.request_id);
    }

    let reply = ctx.response.take().unwrap_or_else(generic_error_reply);
    with_request_id(reply, &ctx.request_id)
}

fn with_request_id(mut reply: Reply, request_id: &str) -> Reply {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        reply
            .headers_mut()
            .entry(REQUEST_ID_HEADER)
            .or_insert(value);
    }
    reply
}
