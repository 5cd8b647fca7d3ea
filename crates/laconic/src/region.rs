//! API regions.
//!
//! A region groups routes under a base URL with shared attributes (auth
//! level, caching policy, ...) and its own exception handlers. Regions nest;
//! adding one to the app flattens it into plain endpoints.

use std::error::Error;

use axum::http::Method;
use laconic_core::{ApiError, ApiErrorKind, AttributeScope};
use serde_json::Value;

use crate::context::Context;
use crate::error::DefinitionError;
use crate::handler::{ExceptionHandler, ExceptionHandlers};
use crate::response::IntoReply;
use crate::router::{Endpoint, RouteDef};

/// A section of the API with its own base URL and attributes.
#[derive(Debug, Clone)]
pub struct Region {
    name: String,
    base_url: String,
    routes: Vec<RouteDef>,
    attrs: AttributeScope,
    regions: Vec<Self>,
    exception_handlers: ExceptionHandlers,
}

impl Region {
    /// Create an empty region mounted at `base_url`.
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            routes: Vec::new(),
            attrs: AttributeScope::new(),
            regions: Vec::new(),
            exception_handlers: ExceptionHandlers::new(),
        }
    }

    /// Region name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL prefix of the region's routes.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Add a route. Its rule is relative to the base URL.
    #[must_use]
    pub fn route(mut self, def: RouteDef) -> Self {
        self.routes.push(def);
        self
    }

    /// Nest a region. Its base URL is relative to this one.
    #[must_use]
    pub fn add_region(mut self, region: Self) -> Self {
        self.regions.push(region);
        self
    }

    /// Set an attribute shared by every route in the region.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key, value);
        self
    }

    /// Region attributes.
    pub const fn attrs_mut(&mut self) -> &mut AttributeScope {
        &mut self.attrs
    }

    /// Add an exception handler for errors raised by this region's endpoints.
    #[must_use]
    pub fn exception_handler(mut self, handler: ExceptionHandler) -> Self {
        self.exception_handlers.add(handler);
        self
    }

    /// Handle errors of type `E` raised by this region's endpoints.
    #[must_use]
    pub fn on_error<E, F, R>(self, handler: F) -> Self
    where
        E: Error + 'static,
        F: Fn(&E, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.exception_handler(ExceptionHandler::for_type::<E, F, R>(handler))
    }

    /// Handle `ApiError`s of `kind` raised by this region's endpoints.
    #[must_use]
    pub fn on_api_error<F, R>(self, kind: ApiErrorKind, handler: F) -> Self
    where
        F: Fn(&ApiError, &Context) -> R + Send + Sync + 'static,
        R: IntoReply,
    {
        self.exception_handler(ExceptionHandler::for_kind(kind, handler))
    }

    /// Flatten the region tree into endpoints.
    ///
    /// With `auto_options` every route also accepts `OPTIONS`.
    pub(crate) fn into_endpoints(self, auto_options: bool) -> Result<Vec<Endpoint>, DefinitionError> {
        let mut endpoints = Vec::new();
        self.flatten("", auto_options, &mut endpoints)?;
        Ok(endpoints)
    }

    fn flatten(
        self,
        prefix: &str,
        auto_options: bool,
        out: &mut Vec<Endpoint>,
    ) -> Result<(), DefinitionError> {
        let base = format!("{prefix}{}", self.base_url);
        let start = out.len();

        for mut def in self.routes {
            def.rule = format!("{base}{}", def.rule);
            if auto_options {
                def.methods.push(Method::OPTIONS);
            }
            out.push(Endpoint::from_def(def)?);
        }
        for region in self.regions {
            region.flatten(&base, auto_options, out)?;
        }

        for endpoint in out.iter_mut().skip(start) {
            endpoint.enclose(&self.attrs, &self.exception_handlers);
        }
        tracing::debug!(region = %self.name, base_url = %base, "Region flattened");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use laconic_core::EndpointParam;

    use super::*;
    use crate::handler::{Call, EndpointResult};

    async fn status(_call: Call) -> EndpointResult<&'static str> {
        Ok("ok")
    }

    #[test]
    fn test_flatten_concatenates_base_urls() {
        let region = Region::new("api", "/api")
            .route(RouteDef::new("/health", status))
            .add_region(
                Region::new("v1", "/v1")
                    .route(RouteDef::new("/status", status))
                    .route(
                        RouteDef::new("/users/<int:id>", status).param(EndpointParam::int("id")),
                    ),
            );

        let endpoints = region.into_endpoints(false).unwrap();
        let rules: Vec<_> = endpoints.iter().map(|e| e.rule().as_str()).collect();
        assert_eq!(rules, vec!["/api/health", "/api/v1/status", "/api/v1/users/<int:id>"]);
        assert!(endpoints[2].matches_path("/api/v1/users/7"));
    }

    #[test]
    fn test_auto_options_added() {
        let endpoints = Region::new("api", "/api")
            .route(RouteDef::new("/a", status))
            .into_endpoints(true)
            .unwrap();
        assert_eq!(endpoints[0].methods(), [Method::GET, Method::OPTIONS]);
    }

    #[test]
    fn test_undeclared_param_in_base_url_is_rejected() {
        let result = Region::new("users", "/users/<int:uid>")
            .route(RouteDef::new("/posts", status))
            .into_endpoints(false);
        assert!(matches!(result, Err(DefinitionError::MissingUrlParam { .. })));
    }

    #[test]
    fn test_attrs_chain_inner_to_outer() {
        let region = Region::new("api", "/api")
            .attr("auth", "token")
            .attr("cache", 10)
            .add_region(
                Region::new("v1", "/v1")
                    .attr("cache", 60)
                    .route(RouteDef::new("/status", status).attr("public", true)),
            );
        let mut endpoints = region.into_endpoints(false).unwrap();

        let app_attrs = Arc::new([("version", "1.0")].into_iter().collect());
        endpoints[0].link_attrs(&app_attrs);
        let attrs = endpoints[0].attrs();

        assert_eq!(attrs.get("public"), Some(&Value::Bool(true)));
        assert_eq!(attrs.get("cache"), Some(&Value::from(60)));
        assert_eq!(attrs.get("auth"), Some(&Value::from("token")));
        assert_eq!(attrs.get("version"), Some(&Value::from("1.0")));
    }

    #[test]
    fn test_region_handlers_innermost_first() {
        let region = Region::new("api", "/api")
            .on_api_error(ApiErrorKind::BadRequest, |_, _| "outer")
            .add_region(
                Region::new("v1", "/v1")
                    .on_api_error(ApiErrorKind::BadRequest, |_, _| "inner")
                    .route(RouteDef::new("/status", status)),
            )
            .route(RouteDef::new("/health", status));
        let endpoints = region.into_endpoints(false).unwrap();

        let health = endpoints
            .iter()
            .find(|e| e.rule().as_str() == "/api/health")
            .unwrap();
        assert_eq!(health.region_handlers().len(), 1);

        let nested = endpoints
            .iter()
            .find(|e| e.rule().as_str() == "/api/v1/status")
            .unwrap();
        assert_eq!(nested.region_handlers().len(), 2);

        let ctx = Context::detached(Arc::new(crate::config::LaconicConfig::default()));
        let reply = nested.region_handlers()[0]
            .handle(&ApiError::bad_request("x"), &ctx)
            .unwrap();
        assert_eq!(reply.body().as_ref(), b"inner");
    }
}
