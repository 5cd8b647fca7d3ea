//! Endpoint definitions and request routing.

use std::any::type_name;
use std::fmt;
use std::sync::Arc;

use axum::http::Method;
use laconic_core::{ApiError, AttributeScope, EndpointParam, ParamLocation, UrlRule};
use serde_json::Value;

use crate::error::DefinitionError;
use crate::handler::{ExceptionHandlers, Handler};

/// A route as written by the application author, before validation.
#[derive(Clone)]
pub struct RouteDef {
    pub(crate) rule: String,
    pub(crate) name: String,
    pub(crate) methods: Vec<Method>,
    pub(crate) params: Vec<EndpointParam>,
    pub(crate) attrs: AttributeScope,
    pub(crate) handler: Arc<dyn Handler>,
}

impl fmt::Debug for RouteDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteDef")
            .field("rule", &self.rule)
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl RouteDef {
    /// A `GET` route for `rule` served by `handler`.
    ///
    /// The endpoint name defaults to the handler's function name.
    pub fn new<H: Handler>(rule: impl Into<String>, handler: H) -> Self {
        Self {
            rule: rule.into(),
            name: short_type_name::<H>().to_string(),
            methods: vec![Method::GET],
            params: Vec::new(),
            attrs: AttributeScope::new(),
            handler: Arc::new(handler),
        }
    }

    /// Override the endpoint name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the accepted methods.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Declare a parameter.
    #[must_use]
    pub fn param(mut self, param: EndpointParam) -> Self {
        self.params.push(param);
        self
    }

    /// Declare several parameters.
    #[must_use]
    pub fn params(mut self, params: impl IntoIterator<Item = EndpointParam>) -> Self {
        self.params.extend(params);
        self
    }

    /// Set a route attribute.
    #[must_use]
    pub fn attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key, value);
        self
    }
}

/// `std::any::type_name` without the module path.
fn short_type_name<T: ?Sized>() -> &'static str {
    let full = type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A validated endpoint.
#[derive(Clone)]
pub struct Endpoint {
    name: Arc<str>,
    methods: Vec<Method>,
    rule: UrlRule,
    params: Vec<EndpointParam>,
    handler: Arc<dyn Handler>,
    local_attrs: AttributeScope,
    region_attrs: Vec<AttributeScope>,
    attrs: Arc<AttributeScope>,
    region_handlers: Vec<ExceptionHandlers>,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("rule", &self.rule.as_str())
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl Endpoint {
    /// Validate a route definition.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError` if the URL rule is malformed, a parameter is
    /// declared twice or a URL parameter is not declared.
    pub fn from_def(def: RouteDef) -> Result<Self, DefinitionError> {
        let rule = UrlRule::parse(&def.rule)?;
        let mut params = def.params;

        for (i, param) in params.iter().enumerate() {
            if params.iter().take(i).any(|p| p.name == param.name) {
                return Err(DefinitionError::DuplicateParam {
                    param: param.name.clone(),
                    endpoint: def.name,
                });
            }
        }

        for (url_param, _) in rule.params() {
            let Some(param) = params.iter_mut().find(|p| p.name == *url_param) else {
                return Err(DefinitionError::MissingUrlParam {
                    param: url_param.clone(),
                    endpoint: def.name,
                });
            };
            param.location = ParamLocation::Path;
        }

        let mut methods = Vec::with_capacity(def.methods.len());
        for method in def.methods {
            if !methods.contains(&method) {
                methods.push(method);
            }
        }

        Ok(Self {
            name: Arc::from(def.name),
            methods,
            rule,
            params,
            handler: def.handler,
            attrs: Arc::new(def.attrs.clone()),
            local_attrs: def.attrs,
            region_attrs: Vec::new(),
            region_handlers: Vec::new(),
        })
    }

    /// Endpoint name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Accepted methods.
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// URL rule.
    #[must_use]
    pub const fn rule(&self) -> &UrlRule {
        &self.rule
    }

    /// Declared parameters.
    #[must_use]
    pub fn params(&self) -> &[EndpointParam] {
        &self.params
    }

    /// Route attributes, chained to the region and app scopes.
    #[must_use]
    pub const fn attrs(&self) -> &Arc<AttributeScope> {
        &self.attrs
    }

    /// Region-scoped exception handlers, innermost region first.
    #[must_use]
    pub fn region_handlers(&self) -> &[ExceptionHandlers] {
        &self.region_handlers
    }

    pub(crate) fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    /// Whether `path` matches the URL rule.
    #[must_use]
    pub fn matches_path(&self, path: &str) -> bool {
        self.rule.matches(path)
    }

    /// Whether the endpoint accepts `method`.
    #[must_use]
    pub fn accepts(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    /// Raw values of the URL parameters captured from `path`.
    #[must_use]
    pub fn url_params(&self, path: &str) -> Vec<(String, String)> {
        self.rule.extract_params(path).unwrap_or_default()
    }

    pub(crate) fn add_method(&mut self, method: Method) {
        if !self.methods.contains(&method) {
            self.methods.push(method);
        }
    }

    /// Wrap the endpoint in a region. Inner regions are enclosed first.
    pub(crate) fn enclose(&mut self, attrs: &AttributeScope, handlers: &ExceptionHandlers) {
        self.region_attrs.insert(0, attrs.clone());
        if !handlers.is_empty() {
            self.region_handlers.push(handlers.clone());
        }
    }

    /// Chain the endpoint attributes through its regions to `app_attrs`.
    pub(crate) fn link_attrs(&mut self, app_attrs: &Arc<AttributeScope>) {
        let mut parent = Arc::clone(app_attrs);
        for scope in &self.region_attrs {
            parent = Arc::new(scope.clone().with_parent(parent));
        }
        self.attrs = Arc::new(self.local_attrs.clone().with_parent(parent));
    }

    /// Summary used for listings.
    #[must_use]
    pub fn info(&self) -> RouteInfo {
        RouteInfo {
            name: self.name.to_string(),
            rule: self.rule.as_str().to_string(),
            methods: self.methods.iter().map(ToString::to_string).collect(),
        }
    }
}

/// A registered route, as listed by `laconic routes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteInfo {
    /// Endpoint name.
    pub name: String,
    /// Full URL rule.
    pub rule: String,
    /// Accepted methods.
    pub methods: Vec<String>,
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<24} {:<32} {}", self.methods.join(","), self.rule, self.name)
    }
}

/// Position of `method` in listings.
fn method_rank(method: &Method) -> u8 {
    match *method {
        Method::GET => 0,
        Method::HEAD => 1,
        Method::POST => 2,
        Method::PUT => 3,
        Method::PATCH => 4,
        Method::DELETE => 5,
        Method::OPTIONS => 6,
        _ => 7,
    }
}

/// Sort methods GET, HEAD, POST, PUT, PATCH, DELETE, OPTIONS, then the rest
/// alphabetically, dropping duplicates.
#[must_use]
pub fn sort_methods(mut methods: Vec<Method>) -> Vec<Method> {
    methods.sort_by(|a, b| {
        method_rank(a)
            .cmp(&method_rank(b))
            .then_with(|| a.as_str().cmp(b.as_str()))
    });
    methods.dedup();
    methods
}

/// Ordered endpoint table. The first registered match wins.
#[derive(Debug, Clone, Default)]
pub struct Router {
    endpoints: Vec<Arc<Endpoint>>,
}

impl Router {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an endpoint.
    pub fn add(&mut self, endpoint: Endpoint) {
        self.endpoints.push(Arc::new(endpoint));
    }

    /// Find the endpoint serving `method` on `path`.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotAllowed` if the path matches but no endpoint accepts
    /// the method, and `EndpointNotFound` if nothing matches the path.
    pub fn determine_endpoint(&self, path: &str, method: &Method) -> Result<Arc<Endpoint>, ApiError> {
        let mut path_matched = false;
        for endpoint in &self.endpoints {
            if endpoint.matches_path(path) {
                if endpoint.accepts(method) {
                    return Ok(Arc::clone(endpoint));
                }
                path_matched = true;
            }
        }

        if path_matched {
            let valid = self
                .available_methods(path)
                .iter()
                .map(ToString::to_string)
                .collect();
            Err(ApiError::method_not_allowed(method.as_str(), valid))
        } else {
            Err(ApiError::endpoint_not_found(path))
        }
    }

    /// Every method accepted on `path`, across all matching endpoints.
    #[must_use]
    pub fn available_methods(&self, path: &str) -> Vec<Method> {
        sort_methods(
            self.endpoints
                .iter()
                .filter(|e| e.matches_path(path))
                .flat_map(|e| e.methods().iter().cloned())
                .collect(),
        )
    }

    /// Registered endpoints in matching order.
    #[must_use]
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Route listing.
    #[must_use]
    pub fn routes(&self) -> Vec<RouteInfo> {
        self.endpoints.iter().map(|e| e.info()).collect()
    }

    /// Link every endpoint's attributes to the app scope.
    pub(crate) fn link_attrs(&mut self, app_attrs: &Arc<AttributeScope>) {
        for endpoint in &mut self.endpoints {
            Arc::make_mut(endpoint).link_attrs(app_attrs);
        }
    }
}
