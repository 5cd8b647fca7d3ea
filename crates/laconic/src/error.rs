//! Definition-time errors and runtime error reporting.
//!
//! Mistakes in how an API is put together (bad URL rules, undeclared URL
//! parameters, hooks registered for the wrong event) surface as
//! [`DefinitionError`] when the route or hook is added. Runtime failures are
//! [`ApiError`]s; server-side ones are captured to Sentry before the client
//! gets a response.

use laconic_core::{ApiError, UrlRuleError};
use serde_json::Value;
use thiserror::Error;

use crate::context::ContextState;
use crate::hooks::HookError;

/// An API element that cannot be added to the application.
#[derive(Debug, Error)]
pub enum DefinitionError {
    /// The URL rule does not parse.
    #[error("{0}")]
    UrlRule(#[from] UrlRuleError),

    /// A URL parameter has no matching endpoint parameter.
    #[error(
        "Parameter `{param}`, defined in the URL, is not present in endpoint function signature."
    )]
    MissingUrlParam {
        /// URL parameter name.
        param: String,
        /// Endpoint name.
        endpoint: String,
    },

    /// An endpoint declares the same parameter twice.
    #[error("Parameter `{param}` is declared more than once for endpoint `{endpoint}`.")]
    DuplicateParam {
        /// Parameter name.
        param: String,
        /// Endpoint name.
        endpoint: String,
    },

    /// An event hook cannot be registered.
    #[error("{0}")]
    Hook(#[from] HookError),
}

impl From<&DefinitionError> for ApiError {
    fn from(err: &DefinitionError) -> Self {
        Self::endpoint_definition(err.to_string())
    }
}

/// Log an error for the current request and, for server errors, capture it
/// to Sentry.
pub fn report_error(err: &ApiError, request_id: &str) {
    if err.is_server_error() {
        let event_id = sentry::capture_error(err);
        tracing::error!(
            error = %err,
            request_id = %request_id,
            sentry_event_id = %event_id,
            "Request error"
        );
    } else {
        tracing::debug!(error = %err, request_id = %request_id, "Client error");
    }
}

/// Breadcrumb marking a lifecycle step of a request.
///
/// Carries the state the context was in and, once routing is done, the
/// endpoint serving the request, so a captured server error shows how far
/// the request got.
pub(crate) fn lifecycle_breadcrumb(
    state: ContextState,
    endpoint: Option<&str>,
    message: &str,
) -> sentry::Breadcrumb {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some("laconic.lifecycle".to_string()),
        message: Some(message.to_string()),
        level: if state == ContextState::Error {
            sentry::Level::Warning
        } else {
            sentry::Level::Info
        },
        ..Default::default()
    };
    breadcrumb
        .data
        .insert("state".to_string(), Value::String(state.to_string()));
    if let Some(endpoint) = endpoint {
        breadcrumb
            .data
            .insert("endpoint".to_string(), Value::String(endpoint.to_string()));
    }
    breadcrumb
}
