//! The application builder and the service it turns into.
//!
//! ```rust,ignore
//! let mut app = Laconic::new("shop");
//! app.route("/hello/<string:name>", [Method::GET], [EndpointParam::string("name")], hello)?;
//! app.add_api_error_handler(ApiErrorKind::DoesNotExist, |err, _ctx| err.clone());
//! let service = app.into_service();
//! ```

use std::convert::Infallible;
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use axum::body::Body;
use axum::http::{self, Method, header};
use axum::response::{IntoResponse, Response};
use laconic_core::{ApiError, ApiErrorKind, AttributeScope, EndpointParam};
use tower::Service;

use crate::config::LaconicConfig;
use crate::context::{Context, process};
use crate::error::DefinitionError;
use crate::handler::{BoxFuture, ExceptionHandler, ExceptionHandlers, Handler};
use crate::hooks::{AppInfo, Event, EventHooks, HookError, MIN_PRIORITY};
use crate::region::Region;
use crate::response::{IntoReply, Reply};
use crate::router::{Endpoint, RouteDef, RouteInfo, Router};

/// Application builder.
pub struct Laconic {
    name: String,
    config: LaconicConfig,
    router: Router,
    route_attrs: AttributeScope,
    hooks: EventHooks,
    exception_handlers: ExceptionHandlers,
}

impl fmt::Debug for Laconic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Laconic")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("routes", &self.router.endpoints().len())
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl Laconic {
    /// New application with the default configuration.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, LaconicConfig::default())
    }

    /// New application with `config`.
    pub fn with_config(name: impl Into<String>, config: LaconicConfig) -> Self {
        Self {
            name: name.into(),
            config,
            router: Router::new(),
            route_attrs: AttributeScope::new(),
            hooks: EventHooks::new(),
            exception_handlers: ExceptionHandlers::new(),
        }
    }

    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration.
    #[must_use]
    pub const fn config(&self) -> &LaconicConfig {
        &self.config
    }

    /// Attributes inherited by every route.
    pub const fn route_attrs_mut(&mut self) -> &mut AttributeScope {
        &mut self.route_attrs
    }

    // =========================================================================
    // Routes
    // =========================================================================

    /// Add a route.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if the URL rule is malformed or does not
    /// agree with the declared parameters.
    pub fn route<H: Handler>(
        &mut self,
        rule: &str,
        methods: impl IntoIterator<Item = Method>,
        params: impl IntoIterator<Item = EndpointParam>,
        handler: H,
    ) -> Result<&mut Self, DefinitionError> {
        self.add_route(
            RouteDef::new(rule, handler)
                .methods(methods)
                .params(params),
        )
    }

    /// Add a route definition.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if the route is invalid.
    pub fn add_route(&mut self, mut def: RouteDef) -> Result<&mut Self, DefinitionError> {
        if self.config.auto_options_response {
            def.methods.push(Method::OPTIONS);
        }
        let endpoint = Endpoint::from_def(def)?;
        tracing::debug!(
            endpoint = %endpoint.name(),
            rule = %endpoint.rule(),
            "Route added"
        );
        self.router.add(endpoint);
        Ok(self)
    }

    /// Add several route definitions.
    ///
    /// # Errors
    ///
    /// Stops at the first invalid route.
    pub fn add_routes(
        &mut self,
        defs: impl IntoIterator<Item = RouteDef>,
    ) -> Result<&mut Self, DefinitionError> {
        for def in defs {
            self.add_route(def)?;
        }
        Ok(self)
    }

    /// Add a region and everything nested in it.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if any route of the region is invalid. No
    /// route of the region is added in that case.
    pub fn add_region(&mut self, region: Region) -> Result<&mut Self, DefinitionError> {
        for endpoint in region.into_endpoints(self.config.auto_options_response)? {
            self.router.add(endpoint);
        }
        Ok(self)
    }

    /// Registered routes.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.router.routes()
    }

    // =========================================================================
    // Exception handlers
    // =========================================================================

    /// Handle endpoint errors of type `E`.
    pub fn add_exception_handler<E, F, R>(&mut self, handler: F) -> &mut Self
    where
        E: Error + 'static,
        F: Fn(&E, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.exception_handlers
            .add(ExceptionHandler::for_type::<E, F, R>(handler));
        self
    }

    /// Handle `ApiError`s of `kind` and its descendant kinds.
    pub fn add_api_error_handler<F, R>(&mut self, kind: ApiErrorKind, handler: F) -> &mut Self
    where
        F: Fn(&ApiError, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.exception_handlers
            .add(ExceptionHandler::for_kind(kind, handler));
        self
    }

    /// Handle any endpoint error not claimed by a more specific handler.
    pub fn add_fallback_exception_handler<F, R>(&mut self, handler: F) -> &mut Self
    where
        F: Fn(&(dyn Error + Send + Sync + 'static), &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.exception_handlers
            .add(ExceptionHandler::fallback(handler));
        self
    }

    /// Add prebuilt exception handlers.
    pub fn add_exception_handlers(
        &mut self,
        handlers: impl IntoIterator<Item = ExceptionHandler>,
    ) -> &mut Self {
        for handler in handlers {
            self.exception_handlers.add(handler);
        }
        self
    }

    // =========================================================================
    // Event hooks
    // =========================================================================

    /// Add a per-request event hook.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` for `Event::AppCreated`; use
    /// [`Laconic::on_app_created`] for that event.
    pub fn add_event_hook<F>(
        &mut self,
        event: Event,
        priority: i32,
        hook: F,
    ) -> Result<&mut Self, DefinitionError>
    where
        F: Fn(&mut Context) -> Result<(), ApiError> + Send + Sync + 'static,
    {
        self.hooks.add(event, priority, hook)?;
        Ok(self)
    }

    /// Add a hook run once when the app becomes a service.
    pub fn on_app_created<F>(&mut self, priority: i32, hook: F) -> &mut Self
    where
        F: Fn(&AppInfo) + Send + Sync + 'static,
    {
        self.hooks.add_app(priority, hook);
        self
    }

    /// Fire an application-level event.
    ///
    /// # Errors
    ///
    /// Returns `HookError::WrongEvent` for per-request events.
    pub fn trigger_event(&self, event: Event) -> Result<(), HookError> {
        if event.is_per_request() {
            return Err(HookError::WrongEvent(event));
        }
        self.hooks.trigger_app(&self.app_info());
        Ok(())
    }

    fn app_info(&self) -> AppInfo {
        AppInfo {
            name: self.name.clone(),
            config: Arc::new(self.config.clone()),
            routes: self.router.routes(),
        }
    }

    // =========================================================================
    // Freezing
    // =========================================================================

    /// Freeze the application into a request-handling service.
    ///
    /// Fires `on_app_created`.
    #[must_use]
    pub fn into_service(self) -> LaconicService {
        let info = self.app_info();
        self.hooks.trigger_app(&info);

        let app_attrs = Arc::new(self.route_attrs);
        let mut router = self.router;
        router.link_attrs(&app_attrs);
        let router = Arc::new(router);

        let mut hooks = self.hooks;
        if self.config.auto_options_response {
            let options_router = Arc::clone(&router);
            hooks.insert(
                Event::EndpointDetermined,
                MIN_PRIORITY,
                Arc::new(move |ctx: &mut Context| -> Result<(), ApiError> {
                    answer_options(&options_router, ctx);
                    Ok(())
                }),
            );
        }

        tracing::info!(
            app = %self.name,
            routes = router.endpoints().len(),
            debug = self.config.debug,
            "Application created"
        );

        LaconicService {
            inner: Arc::new(AppInner {
                name: self.name,
                config: info.config,
                router,
                hooks,
                exception_handlers: self.exception_handlers,
            }),
        }
    }
}

/// Answer `OPTIONS` with the methods available on the path.
fn answer_options(router: &Router, ctx: &mut Context) {
    let allow = match ctx.request() {
        Some(request) if *request.method() == Method::OPTIONS => router
            .available_methods(request.path())
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(","),
        _ => return,
    };
    ctx.respond(Reply::empty().with_header(header::ALLOW, &allow));
}

/// Frozen application state shared by every request.
pub(crate) struct AppInner {
    pub(crate) name: String,
    pub(crate) config: Arc<LaconicConfig>,
    pub(crate) router: Arc<Router>,
    pub(crate) hooks: EventHooks,
    pub(crate) exception_handlers: ExceptionHandlers,
}

/// A running application.
///
/// Cheap to clone. Implements `tower::Service`, so it can be mounted in any
/// tower or axum stack.
#[derive(Clone)]
pub struct LaconicService {
    inner: Arc<AppInner>,
}

impl fmt::Debug for LaconicService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaconicService")
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl LaconicService {
    /// Application name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &LaconicConfig {
        &self.inner.config
    }

    /// Registered routes.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.inner.router.routes()
    }

    /// Process one request.
    pub async fn handle(&self, request: http::Request<Body>) -> Reply {
        process(&self.inner, request).await
    }
}

impl Service<http::Request<Body>> for LaconicService {
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<Result<Response, Infallible>>;

    fn poll_ready(&mut self, _cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<Body>) -> Self::Future {
        let inner = Arc::clone(&self.inner);
        Box::pin(async move { Ok(process(&inner, request).await.into_response()) })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use axum::http::StatusCode;
    use tower::ServiceExt;

    use super::*;
    use crate::handler::{Call, EndpointResult};

    async fn hello(_call: Call) -> EndpointResult<&'static str> {
        Ok("hello")
    }

    async fn request(service: LaconicService, method: Method, uri: &str) -> Response {
        service
            .oneshot(
                http::Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[test]
    fn test_route_adds_options_when_enabled() {
        let mut app = Laconic::new("test");
        app.route("/", [Method::GET], [], hello).unwrap();
        assert_eq!(app.routes()[0].methods, vec!["GET", "OPTIONS"]);

        let mut app = Laconic::with_config(
            "test",
            LaconicConfig {
                auto_options_response: false,
                ..LaconicConfig::default()
            },
        );
        app.route("/", [Method::GET], [], hello).unwrap();
        assert_eq!(app.routes()[0].methods, vec!["GET"]);
    }

    #[test]
    fn test_invalid_route_is_rejected() {
        let mut app = Laconic::new("test");
        let err = app
            .route("/users/<int:id>", [Method::GET], [], hello)
            .unwrap_err();
        assert!(matches!(err, DefinitionError::MissingUrlParam { .. }));
        assert!(app.routes().is_empty());
    }

    #[test]
    fn test_app_created_hook_fires_once() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut app = Laconic::new("shop");
        app.route("/", [Method::GET], [], hello).unwrap();
        let log = Arc::clone(&seen);
        app.on_app_created(1, move |info| {
            log.lock().unwrap().push((info.name.clone(), info.routes.len()));
        });

        let _service = app.into_service();
        assert_eq!(*seen.lock().unwrap(), vec![("shop".to_string(), 1)]);
    }

    #[test]
    fn test_trigger_event_rejects_per_request_events() {
        let app = Laconic::new("test");
        assert!(app.trigger_event(Event::AppCreated).is_ok());
        assert!(matches!(
            app.trigger_event(Event::ContextInit),
            Err(HookError::WrongEvent(Event::ContextInit))
        ));
    }

    #[test]
    fn test_per_request_hook_for_app_created_is_rejected() {
        let mut app = Laconic::new("test");
        let err = app
            .add_event_hook(Event::AppCreated, 1, |_| Ok(()))
            .unwrap_err();
        assert!(matches!(err, DefinitionError::Hook(HookError::WrongEvent(_))));
    }

    #[tokio::test]
    async fn test_options_answered_with_allow_header() {
        let mut app = Laconic::new("test");
        app.route("/items", [Method::GET], [], hello).unwrap();
        app.route("/items", [Method::POST], [], hello).unwrap();

        let response = request(app.into_service(), Method::OPTIONS, "/items").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::ALLOW).unwrap(),
            "GET,POST,OPTIONS"
        );
    }

    #[tokio::test]
    async fn test_app_attrs_visible_to_endpoints() {
        async fn show_env(call: Call) -> EndpointResult<String> {
            Ok(call
                .attr("env")
                .and_then(serde_json::Value::as_str)
                .unwrap_or("none")
                .to_string())
        }

        let mut app = Laconic::new("test");
        app.route("/env", [Method::GET], [], show_env).unwrap();
        // Set after the route was added, still inherited
        app.route_attrs_mut().insert("env", "staging");

        let response = request(app.into_service(), Method::GET, "/env").await;
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(body.as_ref(), b"staging");
    }

    #[tokio::test]
    async fn test_unknown_path_is_404() {
        let app = Laconic::new("test");
        let response = request(app.into_service(), Method::GET, "/missing").await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
