//! Parsed incoming request.
//!
//! [`Request`] is built once per request context, after the body has been
//! read, and shared (behind an `Arc`) between hooks, the endpoint and
//! exception handlers.

use std::sync::OnceLock;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, header, request::Parts};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use cookie::Cookie;
use serde_json::Value;
use uuid::Uuid;

/// The HTTP header name for request IDs.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// A fresh request ID (UUID v4).
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

/// Request ID carried by `headers`, generating a UUID v4 if there is none.
///
/// A generated ID is written back to `headers` so everything downstream
/// sees the same value.
pub fn ensure_request_id(headers: &mut HeaderMap) -> String {
    if let Some(id) = headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return id.to_string();
    }

    let id = new_request_id();
    if let Ok(value) = HeaderValue::from_str(&id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }
    id
}

/// Credentials from the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// `Basic base64(username:password)`
    Basic { username: String, password: String },
    /// `Bearer <token>`
    Bearer(String),
    /// Any other scheme, left uninterpreted.
    Other { scheme: String, credentials: String },
}

/// An incoming HTTP request with its body fully read.
#[derive(Debug)]
pub struct Request {
    method: Method,
    path: String,
    query_string: String,
    headers: HeaderMap,
    args: Vec<(String, String)>,
    cookies: Vec<(String, String)>,
    body: Bytes,
    request_id: String,
    json: OnceLock<Option<Value>>,
    form: OnceLock<Vec<(String, String)>>,
}

impl Request {
    /// Build a request from its head and body.
    ///
    /// The request ID is taken from `x-request-id` when an upstream proxy (or
    /// the server middleware) set one, otherwise a new UUID v4 is generated.
    #[must_use]
    pub fn from_parts(parts: &Parts, body: Bytes) -> Self {
        let query_string = parts.uri.query().unwrap_or_default().to_string();
        let args = url::form_urlencoded::parse(query_string.as_bytes())
            .into_owned()
            .collect();
        let cookies = parse_cookies(&parts.headers);
        let mut headers = parts.headers.clone();
        let request_id = ensure_request_id(&mut headers);

        Self {
            method: parts.method.clone(),
            path: parts.uri.path().to_string(),
            query_string,
            headers,
            args,
            cookies,
            body,
            request_id,
            json: OnceLock::new(),
            form: OnceLock::new(),
        }
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> &Method {
        &self.method
    }

    /// URL path, without the query string.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string (empty if none).
    #[must_use]
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// Request headers.
    #[must_use]
    pub const fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// A header value as text, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Raw body bytes.
    #[must_use]
    pub const fn body(&self) -> &Bytes {
        &self.body
    }

    /// Request ID used for log correlation.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// First query argument named `name`.
    #[must_use]
    pub fn arg(&self, name: &str) -> Option<&str> {
        lookup(&self.args, name)
    }

    /// Every query argument named `name`, in order.
    pub fn args_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.args
            .iter()
            .filter(move |(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// All query arguments.
    #[must_use]
    pub fn args(&self) -> &[(String, String)] {
        &self.args
    }

    /// Cookie value.
    #[must_use]
    pub fn cookie(&self, name: &str) -> Option<&str> {
        lookup(&self.cookies, name)
    }

    /// Media type from `Content-Type`, lowercased, without parameters.
    #[must_use]
    pub fn mimetype(&self) -> String {
        self.header(header::CONTENT_TYPE.as_str())
            .and_then(|ct| ct.split(';').next())
            .map(|m| m.trim().to_ascii_lowercase())
            .unwrap_or_default()
    }

    /// Parameters of `Content-Type`, e.g. `charset`.
    #[must_use]
    pub fn mimetype_params(&self) -> Vec<(String, String)> {
        self.header(header::CONTENT_TYPE.as_str())
            .map(|ct| {
                ct.split(';')
                    .skip(1)
                    .filter_map(|p| p.split_once('='))
                    .map(|(k, v)| {
                        (
                            k.trim().to_ascii_lowercase(),
                            v.trim().trim_matches('"').to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the body is declared as JSON (`application/json` or
    /// `application/*+json`).
    #[must_use]
    pub fn is_json(&self) -> bool {
        let mimetype = self.mimetype();
        mimetype == "application/json"
            || (mimetype.starts_with("application/") && mimetype.ends_with("+json"))
    }

    /// Body parsed as JSON, cached after the first call.
    ///
    /// Returns `None` for an empty or invalid body.
    pub fn json(&self) -> Option<&Value> {
        self.json
            .get_or_init(|| {
                if self.body.is_empty() {
                    None
                } else {
                    serde_json::from_slice(&self.body).ok()
                }
            })
            .as_ref()
    }

    /// Body parsed as an urlencoded form, cached after the first call.
    ///
    /// Empty unless the content type is `application/x-www-form-urlencoded`.
    pub fn form(&self) -> &[(String, String)] {
        self.form.get_or_init(|| {
            if self.mimetype() == "application/x-www-form-urlencoded" {
                url::form_urlencoded::parse(&self.body).into_owned().collect()
            } else {
                Vec::new()
            }
        })
    }

    /// Combined request parameter lookup.
    ///
    /// For `POST`, `PUT` and `PATCH` the JSON body and form body are
    /// searched first. Query arguments and then cookies follow. Values from
    /// non-JSON sources are strings.
    #[must_use]
    pub fn param(&self, name: &str) -> Option<Value> {
        if matches!(self.method, Method::POST | Method::PUT | Method::PATCH) {
            if let Some(Value::Object(map)) = self.json()
                && let Some(value) = map.get(name)
            {
                return Some(value.clone());
            }
            if let Some(value) = lookup(self.form(), name) {
                return Some(Value::String(value.to_string()));
            }
        }

        self.arg(name)
            .or_else(|| self.cookie(name))
            .map(|v| Value::String(v.to_string()))
    }

    /// Parsed `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> Option<Authorization> {
        let raw = self.header(header::AUTHORIZATION.as_str())?.trim();
        let (scheme, credentials) = raw.split_once(' ')?;
        let credentials = credentials.trim();

        if scheme.eq_ignore_ascii_case("basic") {
            let decoded = BASE64.decode(credentials).ok()?;
            let decoded = String::from_utf8(decoded).ok()?;
            let (username, password) = decoded.split_once(':')?;
            Some(Authorization::Basic {
                username: username.to_string(),
                password: password.to_string(),
            })
        } else if scheme.eq_ignore_ascii_case("bearer") {
            Some(Authorization::Bearer(credentials.to_string()))
        } else {
            Some(Authorization::Other {
                scheme: scheme.to_string(),
                credentials: credentials.to_string(),
            })
        }
    }
}

fn lookup<'a>(pairs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    pairs
        .iter()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.as_str())
}

fn parse_cookies(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .map(|c| (c.name().to_string(), c.value().to_string()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http;
    use serde_json::json;

    use super::*;

    fn build(method: Method, uri: &str, headers: &[(&str, &str)], body: &str) -> Request {
        let mut builder = http::Request::builder().method(method).uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        Request::from_parts(&parts, Bytes::from(body.to_string()))
    }

    #[test]
    fn test_path_and_args() {
        let req = build(Method::GET, "/search?q=tea&tag=a&tag=b", &[], "");
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), "q=tea&tag=a&tag=b");
        assert_eq!(req.arg("q"), Some("tea"));
        assert_eq!(req.args_all("tag").collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(req.arg("missing"), None);
    }

    #[test]
    fn test_request_id_from_header_or_generated() {
        let req = build(Method::GET, "/", &[("x-request-id", "abc-123")], "");
        assert_eq!(req.request_id(), "abc-123");

        let req = build(Method::GET, "/", &[], "");
        assert!(Uuid::parse_str(req.request_id()).is_ok());
        assert_eq!(req.header(REQUEST_ID_HEADER), Some(req.request_id()));
    }

    #[test]
    fn test_ensure_request_id_keeps_existing() {
        let mut headers = HeaderMap::new();
        let generated = ensure_request_id(&mut headers);
        assert_eq!(ensure_request_id(&mut headers), generated);
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_cookies_skip_malformed_pairs() {
        let req = build(
            Method::GET,
            "/",
            &[("cookie", "a=1; broken; a=2; theme=dark")],
            "",
        );
        assert_eq!(req.cookie("a"), Some("1"));
        assert_eq!(req.cookie("theme"), Some("dark"));
        assert_eq!(req.cookie("broken"), None);
    }

    #[test]
    fn test_mimetype() {
        let req = build(
            Method::POST,
            "/",
            &[("content-type", "Application/Vnd.Api+JSON; charset=\"utf-8\"")],
            "{}",
        );
        assert_eq!(req.mimetype(), "application/vnd.api+json");
        assert_eq!(
            req.mimetype_params(),
            vec![("charset".to_string(), "utf-8".to_string())]
        );
        assert!(req.is_json());
    }

    #[test]
    fn test_json_body() {
        let req = build(
            Method::POST,
            "/",
            &[("content-type", "application/json")],
            r#"{"a": 1}"#,
        );
        assert_eq!(req.json(), Some(&json!({"a": 1})));

        let req = build(Method::POST, "/", &[], "not json");
        assert_eq!(req.json(), None);
    }

    #[test]
    fn test_form_body() {
        let req = build(
            Method::POST,
            "/",
            &[("content-type", "application/x-www-form-urlencoded")],
            "name=Ada+Lovelace&x=1",
        );
        assert_eq!(req.form().len(), 2);
        assert_eq!(req.param("name"), Some(json!("Ada Lovelace")));
    }

    #[test]
    fn test_param_precedence_for_post() {
        let req = build(
            Method::POST,
            "/?a=query&b=query",
            &[("content-type", "application/json"), ("cookie", "b=cookie; c=cookie")],
            r#"{"a": 5}"#,
        );
        assert_eq!(req.param("a"), Some(json!(5)));
        assert_eq!(req.param("b"), Some(json!("query")));
        assert_eq!(req.param("c"), Some(json!("cookie")));
        assert_eq!(req.param("d"), None);
    }

    #[test]
    fn test_param_ignores_body_for_get() {
        let req = build(
            Method::GET,
            "/?a=query",
            &[("content-type", "application/json")],
            r#"{"a": 5, "b": 6}"#,
        );
        assert_eq!(req.param("a"), Some(json!("query")));
        assert_eq!(req.param("b"), None);
    }

    #[test]
    fn test_basic_authorization() {
        // "ada:secret"
        let req = build(Method::GET, "/", &[("authorization", "Basic YWRhOnNlY3JldA==")], "");
        assert_eq!(
            req.authorization(),
            Some(Authorization::Basic {
                username: "ada".to_string(),
                password: "secret".to_string()
            })
        );
    }

    #[test]
    fn test_bearer_and_other_authorization() {
        let req = build(Method::GET, "/", &[("authorization", "Bearer tok.en")], "");
        assert_eq!(req.authorization(), Some(Authorization::Bearer("tok.en".to_string())));

        let req = build(Method::GET, "/", &[("authorization", "Digest x=1")], "");
        assert!(matches!(req.authorization(), Some(Authorization::Other { .. })));

        let req = build(Method::GET, "/", &[], "");
        assert_eq!(req.authorization(), None);
    }
}
