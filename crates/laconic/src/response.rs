//! Responses produced by endpoints, hooks and exception handlers.
//!
//! Endpoints may return anything implementing [`IntoReply`]: text, JSON, an
//! [`ApiError`], a `(value, StatusCode)` pair or a fully built [`Reply`].

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use laconic_core::ApiError;
use serde::Serialize;
use serde_json::Value;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// A plain HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for Reply {
    fn default() -> Self {
        Self::empty()
    }
}

impl Reply {
    /// Response with a status and raw body, no headers.
    #[must_use]
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Empty `200 OK`.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(StatusCode::OK, Bytes::new())
    }

    /// `200 OK` with a `text/plain` body.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::new(StatusCode::OK, body.into()).with_static_header(header::CONTENT_TYPE, TEXT_PLAIN)
    }

    /// `200 OK` with a JSON body.
    ///
    /// Serialization failures become a `500` error reply.
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(StatusCode::OK, body)
                .with_static_header(header::CONTENT_TYPE, APPLICATION_JSON),
            Err(e) => error_reply(
                &ApiError::internal(format!("Response could not be serialized: {e}")),
                false,
            ),
        }
    }

    /// Replace the status code.
    #[must_use]
    pub const fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Set a header. Invalid header values are dropped with a warning.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: &str) -> Self {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.headers.insert(name, value);
            }
            Err(_) => tracing::warn!(header = %name, "Dropping invalid response header value"),
        }
        self
    }

    fn with_static_header(mut self, name: HeaderName, value: &'static str) -> Self {
        self.headers.insert(name, HeaderValue::from_static(value));
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Mutable headers.
    pub const fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// Body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Render an [`ApiError`] as a JSON reply.
///
/// `verbose` includes the error's `data`. Method-not-allowed errors carry an
/// `Allow` header listing the accepted methods.
#[must_use]
pub fn error_reply(err: &ApiError, verbose: bool) -> Reply {
    let status =
        StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut reply = Reply::new(status, err.as_json(verbose))
        .with_static_header(header::CONTENT_TYPE, APPLICATION_JSON);
    if !err.valid_methods().is_empty() {
        reply = reply.with_header(header::ALLOW, &err.valid_methods().join(", "));
    }
    reply
}

/// JSON response wrapper for endpoint outputs.
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

/// Conversion of endpoint outputs into a [`Reply`].
pub trait IntoReply {
    /// Build the reply.
    fn into_reply(self) -> Reply;
}

impl IntoReply for Reply {
    fn into_reply(self) -> Reply {
        self
    }
}

impl IntoReply for () {
    fn into_reply(self) -> Reply {
        Reply::empty()
    }
}

impl IntoReply for String {
    fn into_reply(self) -> Reply {
        Reply::text(self)
    }
}

impl IntoReply for &'static str {
    fn into_reply(self) -> Reply {
        Reply::text(self)
    }
}

impl IntoReply for Value {
    fn into_reply(self) -> Reply {
        Reply::json(&self)
    }
}

impl<T: Serialize> IntoReply for Json<T> {
    fn into_reply(self) -> Reply {
        Reply::json(&self.0)
    }
}

impl IntoReply for StatusCode {
    fn into_reply(self) -> Reply {
        Reply::empty().with_status(self)
    }
}

impl IntoReply for ApiError {
    fn into_reply(self) -> Reply {
        error_reply(&self, false)
    }
}

impl<T: IntoReply> IntoReply for (T, StatusCode) {
    fn into_reply(self) -> Reply {
        self.0.into_reply().with_status(self.1)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn content_type(reply: &Reply) -> &str {
        reply
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
    }

    #[test]
    fn test_text_reply() {
        let reply = "hello".into_reply();
        assert_eq!(reply.status(), StatusCode::OK);
        assert_eq!(reply.body().as_ref(), b"hello");
        assert_eq!(content_type(&reply), TEXT_PLAIN);
    }

    #[test]
    fn test_unit_reply_is_empty_ok() {
        let reply = ().into_reply();
        assert_eq!(reply.status(), StatusCode::OK);
        assert!(reply.body().is_empty());
    }

    #[test]
    fn test_json_reply() {
        let reply = Json(json!({"sum": 3})).into_reply();
        assert_eq!(content_type(&reply), APPLICATION_JSON);
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body, json!({"sum": 3}));
    }

    #[test]
    fn test_status_tuple() {
        let reply = ("created".to_string(), StatusCode::CREATED).into_reply();
        assert_eq!(reply.status(), StatusCode::CREATED);
        assert_eq!(reply.body().as_ref(), b"created");
    }

    #[test]
    fn test_error_reply() {
        let reply = ApiError::does_not_exist("nope").into_reply();
        assert_eq!(reply.status(), StatusCode::NOT_FOUND);
        assert_eq!(content_type(&reply), APPLICATION_JSON);
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body["name"], "Does Not Exist");
        assert!(body.get("data").is_none());
    }

    #[test]
    fn test_method_not_allowed_reply_has_allow_header() {
        let err = ApiError::method_not_allowed("PUT", vec!["GET".into(), "OPTIONS".into()]);
        let reply = error_reply(&err, true);
        assert_eq!(reply.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(reply.headers().get(header::ALLOW).unwrap(), "GET, OPTIONS");
        let body: Value = serde_json::from_slice(reply.body()).unwrap();
        assert!(body.get("data").is_some());
    }

    #[test]
    fn test_invalid_header_value_is_dropped() {
        let reply = Reply::empty().with_header(header::ALLOW, "bad\nvalue");
        assert!(reply.headers().get(header::ALLOW).is_none());
    }

    #[test]
    fn test_into_response() {
        let response = Reply::text("x").with_status(StatusCode::ACCEPTED).into_response();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), TEXT_PLAIN);
    }
}
