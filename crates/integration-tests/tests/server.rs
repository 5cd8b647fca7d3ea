//! The development server over real TCP.

#![allow(clippy::unwrap_used)]

use laconic::{
    Call, EndpointParam, EndpointResult, Json, Laconic, LaconicService, Method, StatusCode,
};
use laconic_integration_tests::TestServer;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Deserialize)]
struct Sum {
    sum: i64,
}

async fn add(call: Call) -> EndpointResult<Json<Value>> {
    let a: i64 = call.param("a")?;
    let b: i64 = call.param("b")?;
    Ok(Json(json!({ "sum": a + b })))
}

async fn panics(_call: Call) -> EndpointResult<()> {
    panic!("endpoint bug");
}

fn service() -> LaconicService {
    let mut app = Laconic::new("server");
    app.route(
        "/add",
        [Method::GET, Method::POST],
        [EndpointParam::int("a"), EndpointParam::int("b").with_default(0)],
        add,
    )
    .unwrap()
    .route("/panic", [Method::GET], [], panics)
    .unwrap();
    app.into_service()
}

#[tokio::test]
async fn test_query_request() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .get(server.url("/add?a=2&b=3"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Sum = response.json().await.unwrap();
    assert_eq!(body.sum, 5);
}

#[tokio::test]
async fn test_json_request() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .post(server.url("/add"))
        .json(&json!({ "a": 40, "b": 2 }))
        .send()
        .await
        .unwrap();

    let body: Sum = response.json().await.unwrap();
    assert_eq!(body.sum, 42);
}

#[tokio::test]
async fn test_request_id_generated() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .get(server.url("/add?a=1"))
        .send()
        .await
        .unwrap();

    let id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_request_id_kept() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .get(server.url("/missing"))
        .header("x-request-id", "trace-123")
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()["x-request-id"], "trace-123");
}

#[tokio::test]
async fn test_panic_becomes_json_500() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .get(server.url("/panic"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(
        body["description"],
        "An unexpected internal server error occured"
    );

    // The server keeps serving after a panic
    let response = server
        .client
        .get(server.url("/add?a=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_options_over_http() {
    let server = TestServer::start(service()).await;

    let response = server
        .client
        .request(Method::OPTIONS, server.url("/add"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["allow"], "GET,POST,OPTIONS");
}
