//! Exception handling: handler selection, regions and error rendering.

#![allow(clippy::unwrap_used)]

use laconic::{
    ApiError, ApiErrorKind, Call, EndpointError, EndpointParam, EndpointResult, Json, Laconic,
    LaconicConfig, LaconicService, Method, Region, RouteDef, StatusCode,
};
use laconic_integration_tests::TestRequest;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Out of stock: {0}")]
struct OutOfStock(String);

#[derive(Debug, Error)]
#[error("Warehouse unreachable")]
struct WarehouseDown {
    #[source]
    source: std::io::Error,
}

async fn buy(call: Call) -> EndpointResult<&'static str> {
    let item: String = call.param("item")?;
    match item.as_str() {
        "pineapple" => Ok("bought"),
        "missing" => Err(ApiError::does_not_exist("No such item.").into()),
        "broken" => Err(WarehouseDown {
            source: std::io::Error::other("connection refused"),
        }
        .into()),
        _ => Err(OutOfStock(item).into()),
    }
}

async fn explode(_call: Call) -> EndpointResult<()> {
    Err(EndpointError::from("boom"))
}

fn app(config: LaconicConfig) -> Laconic {
    let mut app = Laconic::with_config("shop", config);
    app.route(
        "/buy/<string:item>",
        [Method::POST],
        [EndpointParam::string("item")],
        buy,
    )
    .unwrap();
    app
}

// =============================================================================
// Handler selection
// =============================================================================

#[tokio::test]
async fn test_type_handler() {
    let mut app = app(LaconicConfig::default());
    app.add_exception_handler::<OutOfStock, _, _>(|err, _ctx| {
        (Json(json!({ "error": err.to_string() })), StatusCode::CONFLICT)
    });
    let service = app.into_service();

    let response = TestRequest::post("/buy/mango").send(&service).await;

    assert_eq!(response.status, StatusCode::CONFLICT);
    assert_eq!(response.json()["error"], "Out of stock: mango");
}

#[tokio::test]
async fn test_kind_handler_catches_descendants() {
    let mut app = app(LaconicConfig::default());
    app.add_api_error_handler(ApiErrorKind::Generic, |err, _ctx| {
        (format!("generic: {}", err.description()), StatusCode::GONE)
    });
    let service = app.into_service();

    let response = TestRequest::post("/buy/missing").send(&service).await;

    assert_eq!(response.status, StatusCode::GONE);
    assert_eq!(response.text(), "generic: No such item.");
}

#[tokio::test]
async fn test_most_specific_handler_wins() {
    let mut app = app(LaconicConfig::default());
    app.add_fallback_exception_handler(|_err, _ctx| "fallback")
        .add_api_error_handler(ApiErrorKind::Generic, |_err, _ctx| "generic")
        .add_api_error_handler(ApiErrorKind::DoesNotExist, |_err, _ctx| "does not exist");
    let service = app.into_service();

    let missing = TestRequest::post("/buy/missing").send(&service).await;
    let sold_out = TestRequest::post("/buy/kiwi").send(&service).await;

    assert_eq!(missing.text(), "does not exist");
    assert_eq!(sold_out.text(), "fallback");
}

#[tokio::test]
async fn test_handler_reads_context() {
    let mut app = app(LaconicConfig::default());
    app.add_exception_handler::<OutOfStock, _, _>(|_err, ctx| {
        let endpoint = ctx.endpoint().map(|e| e.name().to_string());
        Json(json!({ "endpoint": endpoint, "request_id": ctx.request_id() }))
    });
    let service = app.into_service();

    let response = TestRequest::post("/buy/kiwi")
        .header("x-request-id", "req-1")
        .send(&service)
        .await;

    let body = response.json();
    assert_eq!(body["endpoint"], "buy");
    assert_eq!(body["request_id"], "req-1");
}

// =============================================================================
// Regions
// =============================================================================

fn region_service() -> LaconicService {
    let inner = Region::new("admin", "/admin")
        .route(
            RouteDef::new("/buy/<string:item>", buy)
                .name("admin_buy")
                .methods([Method::POST])
                .param(EndpointParam::string("item")),
        )
        .on_error::<OutOfStock, _, _>(|_err, _ctx| "inner");

    let outer = Region::new("shop", "/shop")
        .route(
            RouteDef::new("/buy/<string:item>", buy)
                .name("shop_buy")
                .methods([Method::POST])
                .param(EndpointParam::string("item")),
        )
        .add_region(inner)
        .on_error::<OutOfStock, _, _>(|_err, _ctx| "outer")
        .on_api_error(ApiErrorKind::DoesNotExist, |_err, _ctx| "outer kind");

    let mut app = app(LaconicConfig::default());
    app.add_region(outer).unwrap();
    app.add_exception_handler::<OutOfStock, _, _>(|_err, _ctx| "app")
        .add_fallback_exception_handler(|_err, _ctx| "app fallback");
    app.into_service()
}

#[tokio::test]
async fn test_innermost_region_handler_first() {
    let service = region_service();

    let response = TestRequest::post("/shop/admin/buy/kiwi")
        .send(&service)
        .await;

    assert_eq!(response.text(), "inner");
}

#[tokio::test]
async fn test_enclosing_region_handler_next() {
    let service = region_service();

    let outer = TestRequest::post("/shop/buy/kiwi").send(&service).await;
    let from_inner = TestRequest::post("/shop/admin/buy/missing")
        .send(&service)
        .await;

    assert_eq!(outer.text(), "outer");
    assert_eq!(from_inner.text(), "outer kind");
}

#[tokio::test]
async fn test_region_handlers_before_app_handlers() {
    let service = region_service();

    let in_region = TestRequest::post("/shop/admin/buy/broken")
        .send(&service)
        .await;
    let outside = TestRequest::post("/buy/kiwi").send(&service).await;

    // No region handler claims WarehouseDown, the app fallback does
    assert_eq!(in_region.text(), "app fallback");
    assert_eq!(outside.text(), "app");
}

// =============================================================================
// Unhandled errors
// =============================================================================

#[tokio::test]
async fn test_unhandled_api_error_is_rendered() {
    let service = app(LaconicConfig::default()).into_service();

    let response = TestRequest::post("/buy/missing").send(&service).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["description"], "No such item.");
}

#[tokio::test]
async fn test_unhandled_error_is_500_without_data() {
    let service = app(LaconicConfig::default()).into_service();

    let response = TestRequest::post("/buy/broken").send(&service).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    let body = response.json();
    assert_eq!(body["description"], "Warehouse unreachable");
    assert!(body.get("data").is_none());
}

#[tokio::test]
async fn test_debug_mode_exposes_cause_chain() {
    let config = LaconicConfig {
        debug: true,
        ..LaconicConfig::default()
    };
    let service = app(config).into_service();

    let response = TestRequest::post("/buy/broken").send(&service).await;

    let data = &response.json()["data"];
    assert_eq!(data["endpoint"], "buy");
    assert_eq!(data["caused_by"], json!(["connection refused"]));
}

#[tokio::test]
async fn test_debug_mode_api_error_data_is_null() {
    let config = LaconicConfig {
        debug: true,
        ..LaconicConfig::default()
    };
    let service = app(config).into_service();

    let response = TestRequest::post("/buy/missing").send(&service).await;

    assert_eq!(response.json()["data"], Value::Null);
}

#[tokio::test]
async fn test_boxed_string_error() {
    let mut app = Laconic::new("explode");
    app.route("/explode", [Method::GET], [], explode).unwrap();
    let service = app.into_service();

    let response = TestRequest::get("/explode").send(&service).await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["description"], "boom");
}
