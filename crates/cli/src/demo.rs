//! Demo API served by `laconic serve`.
//!
//! | Method | Rule                     | Endpoint |
//! |--------|--------------------------|----------|
//! | GET    | `/`                      | `hello`  |
//! | GET    | `/hello/<string:name>`   | `greet`  |
//! | GET    | `/add/<int:a>/<int:b>`   | `add`    |
//! | POST   | `/echo`                  | `echo`   |
//! | GET    | `/api/v1/status`         | `status` |
//! | GET    | `/api/v1/items/<int:id>` | `item`   |

use laconic::handler::{Call, EndpointResult};
use laconic::http::HeaderName;
use laconic::{
    ApiError, DefinitionError, EndpointParam, Event, Json, Laconic, LaconicConfig, Method,
    Region, RouteDef, StatusCode,
};
use serde_json::{Value, json};
use thiserror::Error;

const POWERED_BY: HeaderName = HeaderName::from_static("x-powered-by");

/// Raised by `item` for unknown IDs, answered by the `api` region.
#[derive(Debug, Error)]
#[error("No item with ID {0}")]
pub struct ItemNotFound(pub i64);

async fn hello(_call: Call) -> EndpointResult<&'static str> {
    Ok("hello")
}

async fn greet(call: Call) -> EndpointResult<String> {
    let name: String = call.param("name")?;
    Ok(format!("Hello, {name}!"))
}

async fn add(call: Call) -> EndpointResult<Json<Value>> {
    let a: i64 = call.param("a")?;
    let b: i64 = call.param("b")?;
    Ok(Json(json!({ "sum": a + b })))
}

async fn echo(call: Call) -> EndpointResult<Json<Value>> {
    let body = call
        .request()
        .json()
        .cloned()
        .ok_or_else(|| ApiError::bad_request("Expected a JSON request body."))?;
    Ok(Json(body))
}

async fn status(call: Call) -> EndpointResult<Json<Value>> {
    Ok(Json(json!({
        "status": "ok",
        "region": call.attr("region"),
        "version": call.attr("version"),
    })))
}

async fn item(call: Call) -> EndpointResult<Json<Value>> {
    let id: i64 = call.param("id")?;
    if id != 1 {
        return Err(ItemNotFound(id).into());
    }
    Ok(Json(json!({ "id": id, "name": "pineapple" })))
}

/// Build the demo application.
///
/// # Errors
///
/// Returns `DefinitionError` if a route is invalid.
pub fn build(config: LaconicConfig) -> Result<Laconic, DefinitionError> {
    let mut app = Laconic::with_config("laconic-demo", config);
    app.route_attrs_mut().insert("version", env!("CARGO_PKG_VERSION"));

    app.route("/", [Method::GET], [], hello)?
        .route(
            "/hello/<string:name>",
            [Method::GET],
            [EndpointParam::string("name")],
            greet,
        )?
        .route(
            "/add/<int:a>/<int:b>",
            [Method::GET],
            [EndpointParam::int("a"), EndpointParam::int("b")],
            add,
        )?
        .route("/echo", [Method::POST], [], echo)?;

    app.add_region(
        Region::new("api", "/api/v1")
            .attr("region", "api")
            .route(RouteDef::new("/status", status))
            .route(RouteDef::new("/items/<int:id>", item).param(EndpointParam::int("id")))
            .on_error::<ItemNotFound, _, _>(|err, _ctx| {
                (
                    Json(json!({ "error": err.to_string() })),
                    StatusCode::NOT_FOUND,
                )
            }),
    )?;

    app.add_event_hook(Event::ResponseGenerated, 1, |ctx| {
        if let Some(reply) = ctx.response_mut() {
            *reply = std::mem::take(reply).with_header(POWERED_BY, "laconic");
        }
        Ok(())
    })?;

    app.on_app_created(1, |info| {
        tracing::info!(app = %info.name, routes = info.routes.len(), "Demo API ready");
    });

    Ok(app)
}
