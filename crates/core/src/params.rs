//! Endpoint parameter declarations and conversion.
//!
//! Endpoints declare the parameters they consume. Before dispatch the
//! framework looks each one up (URL path or request data), converts it to the
//! declared type and hands the endpoint a resolved [`Params`] map. Conversion
//! failures become client errors, never panics.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::error::ApiError;
use crate::url_rule::UrlParamType;

/// Declared type of an endpoint parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    /// 64-bit signed integer.
    Int,
    /// 64-bit float.
    Float,
    /// Text.
    Str,
    /// Boolean (`true/false/1/0/yes/no/on/off` when given as text).
    Bool,
    /// Any JSON value, passed through untouched.
    Json,
}

impl ParamType {
    /// Convert a raw value to this type.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] of kind `InvalidParameter` naming `param` if
    /// the value cannot be represented as this type.
    pub fn convert(self, param: &str, raw: &Value) -> Result<Value, ApiError> {
        let invalid = |reason: &str| ApiError::invalid_parameter(param, reason);

        match (self, raw) {
            (Self::Json, value) => Ok(value.clone()),

            (Self::Int, Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().and_then(integral_f64))
                .map(Value::from)
                .ok_or_else(|| invalid("expected an integer")),
            (Self::Int, Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| invalid(&e.to_string())),

            (Self::Float, Value::Number(n)) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("expected a number")),
            (Self::Float, Value::String(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| invalid("expected a finite number")),

            (Self::Str, Value::String(s)) => Ok(Value::String(s.clone())),
            (Self::Str, Value::Number(n)) => Ok(Value::String(n.to_string())),
            (Self::Str, Value::Bool(b)) => Ok(Value::String(b.to_string())),

            (Self::Bool, Value::Bool(b)) => Ok(Value::Bool(*b)),
            (Self::Bool, Value::String(s)) => parse_bool(s)
                .map(Value::Bool)
                .ok_or_else(|| invalid("expected a boolean")),
            (Self::Bool, Value::Number(n)) => match n.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => Err(invalid("expected a boolean")),
            },

            (ty, _) => Err(invalid(&format!("unsupported value for {}", ty.as_str()))),
        }
    }

    /// Name used in error messages and route listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "string",
            Self::Bool => "bool",
            Self::Json => "json",
        }
    }
}

impl From<UrlParamType> for ParamType {
    fn from(ty: UrlParamType) -> Self {
        match ty {
            UrlParamType::Int => Self::Int,
            UrlParamType::Float => Self::Float,
            UrlParamType::Str | UrlParamType::Path => Self::Str,
        }
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::float_cmp
)]
fn integral_f64(f: f64) -> Option<i64> {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Where a parameter value is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    /// Captured from the URL path by the endpoint's URL rule.
    Path,
    /// Looked up in the request data (JSON body, form, query args, cookies).
    #[default]
    Request,
}

/// A parameter declared by an endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointParam {
    /// Parameter name.
    pub name: String,
    /// Declared type.
    pub ty: ParamType,
    /// Value used when the request does not provide one.
    pub default: Option<Value>,
    /// Where the value comes from.
    pub location: ParamLocation,
}

impl EndpointParam {
    /// Declare a required parameter read from the request data.
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ParamType) -> Self {
        Self {
            name: name.into(),
            ty,
            default: None,
            location: ParamLocation::Request,
        }
    }

    /// Integer parameter.
    #[must_use]
    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Int)
    }

    /// Float parameter.
    #[must_use]
    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Float)
    }

    /// String parameter.
    #[must_use]
    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Str)
    }

    /// Boolean parameter.
    #[must_use]
    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Bool)
    }

    /// Untyped JSON parameter.
    #[must_use]
    pub fn json(name: impl Into<String>) -> Self {
        Self::new(name, ParamType::Json)
    }

    /// Make the parameter optional with a default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Whether the request must supply a value.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.default.is_none()
    }

    /// Resolve a raw value (if any) into the declared type.
    ///
    /// A missing or `null` value falls back to the default. The default is
    /// used as-is, without conversion.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` when there is neither a value nor a
    /// default, and `InvalidParameter` when conversion fails.
    pub fn resolve(&self, raw: Option<&Value>) -> Result<Value, ApiError> {
        match raw {
            Some(value) if !value.is_null() => self.ty.convert(&self.name, value),
            _ => self
                .default
                .clone()
                .ok_or_else(|| ApiError::missing_parameter(&self.name)),
        }
    }
}

/// Resolved parameter values handed to an endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    values: HashMap<String, Value>,
}

impl Params {
    /// Create an empty parameter map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a value.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    /// Raw JSON value of a parameter.
    #[must_use]
    pub fn raw(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    /// Typed value of a required parameter.
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if absent and `InvalidParameter` if the
    /// value does not deserialize into `T`.
    pub fn get<T: DeserializeOwned>(&self, name: &str) -> Result<T, ApiError> {
        let value = self
            .values
            .get(name)
            .ok_or_else(|| ApiError::missing_parameter(name))?;
        serde_json::from_value(value.clone()).map_err(|e| ApiError::invalid_parameter(name, e))
    }

    /// Typed value of an optional parameter (`None` when absent or `null`).
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if the value does not deserialize into `T`.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, ApiError> {
        match self.values.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| ApiError::invalid_parameter(name, e)),
        }
    }

    /// Number of resolved parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no parameters were resolved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
