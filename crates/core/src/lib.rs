//! Laconic Core - Shared types for the Laconic REST framework.
//!
//! This crate provides the building blocks used by the `laconic` framework
//! crate and its tooling:
//! - `laconic` - Router, request context and HTTP service
//! - `laconic-cli` - Development server and route inspection
//!
//! # Architecture
//!
//! The core crate contains only types and pure logic - no I/O, no HTTP
//! stack, no async runtime. Everything here can be unit tested in isolation.
//!
//! # Modules
//!
//! - [`url_rule`] - URL templates like `/users/<int:id>` compiled to matchers
//! - [`params`] - Endpoint parameter declarations and value conversion
//! - [`scope`] - Nested attribute scopes shared by app, regions and endpoints
//! - [`priority`] - Stable priority-ordered lists (event hooks)
//! - [`error`] - The API error model rendered to clients

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod error;
pub mod params;
pub mod priority;
pub mod scope;
pub mod url_rule;

pub use error::{ApiError, ApiErrorKind, make_error_name};
pub use params::{EndpointParam, ParamLocation, ParamType, Params};
pub use priority::PriorityList;
pub use scope::AttributeScope;
pub use url_rule::{UrlParamType, UrlRule, UrlRuleError};
