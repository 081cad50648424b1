//! Calculator request construction.

use serde::ser::{SerializeStruct, Serializer};
use serde::Serialize;
use thiserror::Error;

use crate::config::QueryConfig;
use crate::core::types::{Calculator, CoordinateSystem, Parameter, SkyCoordinate};

/// Errors raised while building a request from caller input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    #[error("invalid {field}: {value:?} is not a finite number")]
    InvalidCoordinate { field: &'static str, value: String },

    #[error("unsupported {kind}: '{value}'")]
    UnsupportedOption { kind: &'static str, value: String },
}

/// Values that can be coerced to a finite `f64`.
pub trait AsFloat {
    fn as_float(&self) -> Option<f64>;

    /// Text used in error messages.
    fn describe(&self) -> String;
}

macro_rules! impl_as_float_num {
    ($($t:ty),*) => {
        $(
            impl AsFloat for $t {
                #[inline]
                fn as_float(&self) -> Option<f64> {
                    Some(*self as f64)
                }

                fn describe(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

impl_as_float_num!(f64, f32, i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);

impl AsFloat for str {
    fn as_float(&self) -> Option<f64> {
        self.trim().parse().ok()
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl AsFloat for String {
    fn as_float(&self) -> Option<f64> {
        self.as_str().as_float()
    }

    fn describe(&self) -> String {
        self.clone()
    }
}

impl AsFloat for serde_json::Value {
    fn as_float(&self) -> Option<f64> {
        match self {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.as_float(),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        self.to_string()
    }
}

impl<T: AsFloat + ?Sized> AsFloat for &T {
    fn as_float(&self) -> Option<f64> {
        (**self).as_float()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

fn coerce<T: AsFloat + ?Sized>(field: &'static str, input: &T) -> Result<f64, QueryError> {
    match input.as_float() {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(QueryError::InvalidCoordinate {
            field,
            value: input.describe(),
        }),
    }
}

fn parse_option<T>(kind: &'static str, name: &str) -> Result<T, QueryError>
where
    T: std::str::FromStr,
{
    name.parse().map_err(|_| QueryError::UnsupportedOption {
        kind,
        value: name.to_string(),
    })
}

/// A single calculator request. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryRequest {
    alpha: f64,
    delta: f64,
    system: CoordinateSystem,
    parameter: Parameter,
    value: f64,
    calculator: Calculator,
}

impl QueryRequest {
    #[inline]
    pub fn coordinate(&self) -> (f64, f64) {
        (self.alpha, self.delta)
    }

    #[inline]
    pub fn system(&self) -> CoordinateSystem {
        self.system
    }

    #[inline]
    pub fn parameter(&self) -> Parameter {
        self.parameter
    }

    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    #[inline]
    pub fn calculator(&self) -> Calculator {
        self.calculator
    }
}

// Wire body: {"coordinate": [a, d], "system": .., "parameter": .., "value": ..}.
// The calculator selects the endpoint and is not part of the body.
impl Serialize for QueryRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut body = serializer.serialize_struct("QueryRequest", 4)?;
        body.serialize_field("coordinate", &[self.alpha, self.delta])?;
        body.serialize_field("system", &self.system)?;
        body.serialize_field("parameter", &self.parameter)?;
        body.serialize_field("value", &self.value)?;
        body.end()
    }
}

/// Build a request from loosely-typed caller input.
///
/// `alpha`, `delta` and `value` must coerce to finite floats; the option
/// names are matched case-insensitively.
///
/// # Example
///
/// ```
/// use cosmicflows_pipeline::processors::query::build;
///
/// let req = build(192.25, "27.4", "supergalactic", "distance", 20, "NAM").unwrap();
/// assert_eq!(req.coordinate(), (192.25, 27.4));
/// ```
pub fn build<A, D, V>(
    alpha: A,
    delta: D,
    system: &str,
    parameter: &str,
    value: V,
    calculator: &str,
) -> Result<QueryRequest, QueryError>
where
    A: AsFloat,
    D: AsFloat,
    V: AsFloat,
{
    Ok(QueryRequest {
        alpha: coerce("alpha", &alpha)?,
        delta: coerce("delta", &delta)?,
        system: parse_option("coordinate system", system)?,
        parameter: parse_option("parameter", parameter)?,
        value: coerce("value", &value)?,
        calculator: parse_option("calculator", calculator)?,
    })
}

/// Builds requests for typed coordinates using a fixed set of options.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryBuilder {
    parameter: Parameter,
    value: f64,
    calculator: Calculator,
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self::from_config(&QueryConfig::default())
    }
}

impl QueryBuilder {
    pub fn from_config(config: &QueryConfig) -> Self {
        Self {
            parameter: config.parameter,
            value: config.value,
            calculator: config.calculator,
        }
    }

    pub fn parameter(mut self, parameter: Parameter) -> Self {
        self.parameter = parameter;
        self
    }

    pub fn value(mut self, value: f64) -> Self {
        self.value = value;
        self
    }

    pub fn calculator(mut self, calculator: Calculator) -> Self {
        self.calculator = calculator;
        self
    }

    /// Request for a coordinate, using the coordinate's own frame.
    pub fn for_coordinate(&self, coord: &SkyCoordinate) -> Result<QueryRequest, QueryError> {
        self.build(coord.alpha, coord.delta, coord.system)
    }

    /// Request for raw angles in the given frame.
    pub fn build<A: AsFloat, D: AsFloat>(
        &self,
        alpha: A,
        delta: D,
        system: CoordinateSystem,
    ) -> Result<QueryRequest, QueryError> {
        Ok(QueryRequest {
            alpha: coerce("alpha", &alpha)?,
            delta: coerce("delta", &delta)?,
            system,
            parameter: self.parameter,
            value: coerce("value", &self.value)?,
            calculator: self.calculator,
        })
    }
}
