//! Laconic - a small REST API framework.
//!
//! Routes are URL rules with typed parameters (`/users/<int:id>`) bound to
//! async endpoint functions. Requests go through a fixed lifecycle with
//! event hooks at every step, endpoint failures are turned into responses by
//! exception handlers, and anything left over becomes a JSON API error.
//!
//! ```rust,ignore
//! use laconic::{Call, EndpointResult, Json, Laconic};
//! use laconic_core::EndpointParam;
//!
//! async fn add(call: Call) -> EndpointResult<Json<serde_json::Value>> {
//!     let a: i64 = call.param("a")?;
//!     let b: i64 = call.param("b")?;
//!     Ok(Json(serde_json::json!({ "sum": a + b })))
//! }
//!
//! let mut app = Laconic::new("calc");
//! app.route(
//!     "/add/<int:a>/<int:b>",
//!     [Method::GET],
//!     [EndpointParam::int("a"), EndpointParam::int("b")],
//!     add,
//! )?;
//! app.run().await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod context;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod logging;
pub mod region;
pub mod request;
pub mod response;
pub mod router;
pub mod server;

pub use axum::http;
pub use axum::http::{Method, StatusCode};
pub use laconic_core::{
    ApiError, ApiErrorKind, AttributeScope, EndpointParam, ParamType, Params,
};

pub use app::{Laconic, LaconicService};
pub use config::{ConfigError, LaconicConfig};
pub use context::{Context, ContextState};
pub use error::DefinitionError;
pub use handler::{Call, EndpointError, EndpointResult, ExceptionHandler, Handler};
pub use hooks::{AppInfo, DEFAULT_PRIORITY, Event, HookError};
pub use region::Region;
pub use request::{Authorization, Request};
pub use response::{IntoReply, Json, Reply};
pub use router::{RouteDef, RouteInfo};
pub use server::ServerError;

#[cfg(test)]
pub(crate) mod test_support {
    #![allow(clippy::unwrap_used)]

    use axum::body::Bytes;
    use axum::http;

    use crate::request::Request;

    /// Build a parsed request.
    pub fn request(method: &str, uri: &str, body: &str) -> Request {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(uri)
            .body(())
            .unwrap()
            .into_parts();
        Request::from_parts(&parts, Bytes::from(body.to_string()))
    }
}
