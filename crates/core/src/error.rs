//! API error model.
//!
//! Every error that reaches a client is an [`ApiError`]: a kind from a small
//! hierarchy, a human readable name, a description and an HTTP status.
//! Errors render to a stable JSON document:
//!
//! ```text
//! {
//!     "description": "There is no endpoint defined for the `/nope` URL path.",
//!     "name": "Endpoint Doesn't Exist",
//!     "status_code": 404
//! }
//! ```

use core::fmt;
use std::collections::BTreeMap;

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Status used when an error carries no explicit status code.
const FALLBACK_STATUS: u16 = 500;

/// Kind of an [`ApiError`].
///
/// Kinds form a tree rooted at [`ApiErrorKind::Generic`]; exception handlers
/// registered for a kind also catch every descendant kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorKind {
    /// Root of the hierarchy.
    Generic,
    /// The request is malformed.
    BadRequest,
    /// A request parameter has the wrong type or format.
    InvalidParameter,
    /// A required request parameter is absent.
    MissingParameter,
    /// The URL exists but not for this HTTP method.
    MethodNotAllowed,
    /// The requested resource does not exist.
    DoesNotExist,
    /// No endpoint is registered for the URL path.
    EndpointNotFound,
    /// Unexpected server-side failure.
    InternalServerError,
    /// The request context was driven out of order.
    ContextProcessing,
    /// An endpoint was defined incorrectly.
    EndpointDefinition,
    /// An endpoint failed with an error nobody handled.
    EndpointRuntime,
}

impl ApiErrorKind {
    /// Parent kind, `None` for the root.
    #[must_use]
    pub const fn parent(self) -> Option<Self> {
        match self {
            Self::Generic => None,
            Self::BadRequest
            | Self::MethodNotAllowed
            | Self::DoesNotExist
            | Self::InternalServerError => Some(Self::Generic),
            Self::InvalidParameter | Self::MissingParameter => Some(Self::BadRequest),
            Self::EndpointNotFound => Some(Self::DoesNotExist),
            Self::ContextProcessing | Self::EndpointDefinition | Self::EndpointRuntime => {
                Some(Self::InternalServerError)
            }
        }
    }

    /// Distance from the root kind.
    #[must_use]
    pub fn depth(self) -> usize {
        let mut depth = 0;
        let mut current = self;
        while let Some(parent) = current.parent() {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// Whether `self` is `other` or one of its descendants.
    #[must_use]
    pub fn is_a(self, other: Self) -> bool {
        let mut current = Some(self);
        while let Some(kind) = current {
            if kind == other {
                return true;
            }
            current = kind.parent();
        }
        false
    }

    /// Default HTTP status, inherited from the parent when unset.
    #[must_use]
    pub const fn default_status(self) -> Option<u16> {
        match self {
            Self::Generic => None,
            Self::BadRequest | Self::InvalidParameter | Self::MissingParameter => Some(400),
            Self::MethodNotAllowed => Some(405),
            Self::DoesNotExist | Self::EndpointNotFound => Some(404),
            Self::InternalServerError
            | Self::ContextProcessing
            | Self::EndpointDefinition
            | Self::EndpointRuntime => Some(500),
        }
    }

    /// Default human readable name.
    #[must_use]
    pub const fn default_name(self) -> Option<&'static str> {
        match self {
            Self::Generic => None,
            Self::BadRequest => Some("Bad Request"),
            Self::InvalidParameter => Some("Invalid Request Parameter"),
            Self::MissingParameter => Some("Missing Request Parameter"),
            Self::MethodNotAllowed => Some("Method Not Allowed"),
            Self::DoesNotExist => Some("Does Not Exist"),
            Self::EndpointNotFound => Some("Endpoint Doesn't Exist"),
            Self::InternalServerError => Some("Internal Server Error"),
            Self::ContextProcessing => Some("Context Processing Error"),
            Self::EndpointDefinition => Some("Endpoint Definition Error"),
            Self::EndpointRuntime => Some("Endpoint Runtime Error"),
        }
    }

    /// Default description, used when an error is raised with an empty one.
    #[must_use]
    pub const fn default_description(self) -> Option<&'static str> {
        if self.is_internal() {
            Some(
                "The server encountered an internal error and was unable to complete the request",
            )
        } else {
            None
        }
    }

    const fn is_internal(self) -> bool {
        matches!(
            self,
            Self::InternalServerError
                | Self::ContextProcessing
                | Self::EndpointDefinition
                | Self::EndpointRuntime
        )
    }
}

/// An error rendered to API clients.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    kind: ApiErrorKind,
    description: String,
    status_code: Option<u16>,
    name: String,
    data: Option<Value>,
    valid_methods: Vec<String>,
}

impl ApiError {
    /// Create an error of the given kind, using the kind's defaults.
    #[must_use]
    pub fn new(kind: ApiErrorKind, description: impl Into<String>) -> Self {
        let description = description.into();
        let description = if description.is_empty() {
            kind.default_description().unwrap_or_default().to_string()
        } else {
            description
        };
        let name = kind.default_name().unwrap_or("Error").to_string();

        Self {
            kind,
            description,
            status_code: kind.default_status(),
            name,
            data: None,
            valid_methods: Vec::new(),
        }
    }

    /// Create a [`ApiErrorKind::Generic`] error named after a type name,
    /// e.g. `PaymentRequiredError` becomes "Payment Required".
    #[must_use]
    pub fn custom(type_name: &str, description: impl Into<String>, status_code: u16) -> Self {
        Self::new(ApiErrorKind::Generic, description)
            .with_name(make_error_name(type_name))
            .with_status(status_code)
    }

    /// 400 Bad Request.
    #[must_use]
    pub fn bad_request(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::BadRequest, description)
    }

    /// 400 for a parameter that failed conversion.
    #[must_use]
    pub fn invalid_parameter(param: &str, reason: impl fmt::Display) -> Self {
        Self::new(
            ApiErrorKind::InvalidParameter,
            format!("Request parameter `{param}` is invalid: {reason}"),
        )
    }

    /// 400 for a required parameter absent from the request.
    #[must_use]
    pub fn missing_parameter(param: &str) -> Self {
        Self::new(
            ApiErrorKind::MissingParameter,
            format!("Required parameter `{param}` is missing from the request"),
        )
    }

    /// 405 listing the methods that would have been accepted.
    #[must_use]
    pub fn method_not_allowed(method: &str, valid_methods: Vec<String>) -> Self {
        let mut err = Self::new(
            ApiErrorKind::MethodNotAllowed,
            format!(
                "HTTP method `{method}` is not allowed for this endpoint, perhaps try [{}]?",
                valid_methods.join(", ")
            ),
        );
        err.valid_methods = valid_methods;
        err
    }

    /// 404 for a missing resource.
    #[must_use]
    pub fn does_not_exist(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::DoesNotExist, description)
    }

    /// 404 for a URL path with no endpoint.
    #[must_use]
    pub fn endpoint_not_found(path: &str) -> Self {
        Self::new(
            ApiErrorKind::EndpointNotFound,
            format!("There is no endpoint defined for the `{path}` URL path."),
        )
    }

    /// 500 Internal Server Error.
    #[must_use]
    pub fn internal(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::InternalServerError, description)
    }

    /// 500 for a request context driven out of order.
    #[must_use]
    pub fn context_processing(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ContextProcessing, description)
    }

    /// 500 for an endpoint that cannot be added to the API.
    #[must_use]
    pub fn endpoint_definition(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::EndpointDefinition, description)
    }

    /// 500 wrapping an unhandled endpoint failure.
    #[must_use]
    pub fn endpoint_runtime(description: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::EndpointRuntime, description)
    }

    /// Convert any error into an `ApiError`.
    ///
    /// An `ApiError` is returned unchanged; anything else is wrapped as an
    /// [`ApiErrorKind::EndpointRuntime`] error carrying its message.
    #[must_use]
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        err.downcast_ref::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::endpoint_runtime(err.to_string()))
    }

    /// Override the HTTP status code.
    #[must_use]
    pub const fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    /// Override the human readable name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Attach extra data, shown only in verbose renderings.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Error kind.
    #[must_use]
    pub const fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    /// Error description.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Human readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Extra data, if any.
    #[must_use]
    pub const fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Methods accepted by the URL (for method-not-allowed errors).
    #[must_use]
    pub fn valid_methods(&self) -> &[String] {
        &self.valid_methods
    }

    /// Explicit status code, if any.
    #[must_use]
    pub const fn explicit_status(&self) -> Option<u16> {
        self.status_code
    }

    /// HTTP status code used when rendering a response.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        self.status_code.unwrap_or(FALLBACK_STATUS)
    }

    /// Whether the error is a server-side failure (5xx).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status_code() >= 500
    }

    /// Status line, e.g. `405 Method Not Allowed`.
    ///
    /// A code without a registered reason phrase renders as `599 ???`.
    #[must_use]
    pub fn status_line(&self) -> String {
        match self.status_code {
            Some(code) => {
                let reason = StatusCode::from_u16(code)
                    .ok()
                    .and_then(|status| status.canonical_reason());
                format!("{code} {}", reason.unwrap_or("???"))
            }
            None => "??? Unknown".to_string(),
        }
    }

    /// JSON representation with sorted keys and 4-space indentation.
    ///
    /// `data` is only included when `verbose` is set.
    #[must_use]
    pub fn as_json(&self, verbose: bool) -> String {
        let mut repr: BTreeMap<&str, Value> = BTreeMap::new();
        repr.insert("description", Value::String(self.description.clone()));
        repr.insert("name", Value::String(self.name.clone()));
        repr.insert("status_code", Value::from(self.status_code()));
        if verbose {
            repr.insert("data", self.data.clone().unwrap_or(Value::Null));
        }

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        if repr.serialize(&mut serializer).is_err() {
            return String::from("{}");
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(code) => write!(f, "<{code} {}>: {}", self.name, self.description),
            None => write!(f, "<??? {}>: {}", self.name, self.description),
        }
    }
}

impl std::error::Error for ApiError {}

/// Turn a CamelCase type name into spaced words.
///
/// `API`/`Api` prefixes and `Error`/`Exception` suffix words are dropped:
///
/// ```
/// use laconic_core::make_error_name;
///
/// assert_eq!(make_error_name("APIEndpointNotFoundError"), "Endpoint Not Found");
/// assert_eq!(make_error_name("PaymentRequired"), "Payment Required");
/// ```
#[must_use]
pub fn make_error_name(type_name: &str) -> String {
    let chars: Vec<char> = type_name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }
        let prev = i.checked_sub(1).and_then(|p| chars.get(p)).copied();
        let next = chars.get(i + 1).copied();
        let boundary = c.is_uppercase()
            && prev.is_some_and(|p| {
                p.is_lowercase()
                    || p.is_ascii_digit()
                    || (p.is_uppercase() && next.is_some_and(char::is_lowercase))
            });
        if boundary && !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    let kept: Vec<&str> = words
        .iter()
        .map(String::as_str)
        .filter(|w| !matches!(*w, "API" | "Api" | "Error" | "Exception"))
        .collect();

    if kept.is_empty() {
        type_name.to_string()
    } else {
        kept.join(" ")
    }
}
