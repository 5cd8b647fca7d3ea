//! Integration tests for Laconic.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p laconic-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `routing` - URL rules, 404/405 and automatic `OPTIONS`
//! - `params` - Parameter resolution from path, query, body and cookies
//! - `lifecycle` - Event hooks and request short-circuiting
//! - `exceptions` - Exception handlers, regions and error rendering
//! - `server` - The development server over real TCP
//!
//! Most tests drive a [`LaconicService`] in-process with `tower::ServiceExt::oneshot`;
//! the `server` tests bind an ephemeral port and talk to it with `reqwest`.

#![allow(clippy::unwrap_used, clippy::missing_panics_doc)]

use axum::body::Body;
use axum::http::{HeaderMap, Method, Request, StatusCode};
use laconic::LaconicService;
use serde_json::Value;
use tower::ServiceExt;

/// A collected response.
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    /// Body as UTF-8 text.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body parsed as JSON.
    #[must_use]
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// Header value as a string.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Request builder for in-process calls.
#[derive(Debug)]
pub struct TestRequest {
    method: Method,
    uri: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl TestRequest {
    #[must_use]
    pub fn new(method: Method, uri: &str) -> Self {
        Self {
            method,
            uri: uri.to_string(),
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    #[must_use]
    pub fn get(uri: &str) -> Self {
        Self::new(Method::GET, uri)
    }

    #[must_use]
    pub fn post(uri: &str) -> Self {
        Self::new(Method::POST, uri)
    }

    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// JSON body with the matching content type.
    #[must_use]
    pub fn json(self, value: &Value) -> Self {
        let mut req = self.header("content-type", "application/json");
        req.body = serde_json::to_vec(value).unwrap();
        req
    }

    /// Urlencoded form body.
    #[must_use]
    pub fn form(self, body: &str) -> Self {
        let mut req = self.header("content-type", "application/x-www-form-urlencoded");
        req.body = body.as_bytes().to_vec();
        req
    }

    /// Send the request through `service`.
    pub async fn send(self, service: &LaconicService) -> TestResponse {
        let mut builder = Request::builder().method(self.method).uri(self.uri);
        for (name, value) in &self.headers {
            builder = builder.header(name, value);
        }
        let request = builder.body(Body::from(self.body)).unwrap();

        let response = service.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec();
        TestResponse {
            status,
            headers,
            body,
        }
    }
}

/// A development server bound to an ephemeral local port.
#[derive(Debug)]
pub struct TestServer {
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Start serving `service` in the background.
    pub async fn start(service: LaconicService) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(laconic::server::serve(service, listener));

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
        }
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}
