//! Normalization of calculator responses into `GalaxyRecord` rows.
//!
//! The service is loose about shapes: `distance` may be a bare number, a
//! numeric string or a list of solutions, and `peculiar_velocity` may be an
//! object, partially filled, or missing. Every field is classified once as
//! a [`FieldValue`] here so the rest of the pipeline only sees
//! `Option<f64>` and `Option<[f64; 3]>`.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::{CalculatorConfig, SuccessMarker};
use crate::core::types::GalaxyRecord;

/// Untyped response body as returned by the calculator.
pub type RawResponse = Value;

/// Why a response could not be turned into a row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NormalizationFailure {
    /// No recognized success marker in the body.
    #[error("api_error: {detail}")]
    ApiError { detail: String },

    #[error("response body is not a JSON object")]
    NotAnObject,
}

impl NormalizationFailure {
    /// Short machine-readable reason.
    pub fn reason(&self) -> &'static str {
        match self {
            NormalizationFailure::ApiError { .. } => "api_error",
            NormalizationFailure::NotAnObject => "not_an_object",
        }
    }
}

/// Classification of one raw response field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue<T> {
    Present(T),
    Absent,
    Malformed,
}

impl<T> FieldValue<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            FieldValue::Present(v) => Some(v),
            FieldValue::Absent | FieldValue::Malformed => None,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, FieldValue::Malformed)
    }
}

const PECULIAR_KEYS: [&str; 3] = ["vx", "vy", "vz"];

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().and_then(finite),
        Value::String(s) => s.trim().parse::<f64>().ok().and_then(finite),
        _ => None,
    }
}

/// Plain number or numeric string.
fn scalar_field(body: &Map<String, Value>, key: &str) -> FieldValue<f64> {
    match body.get(key) {
        None | Some(Value::Null) => FieldValue::Absent,
        Some(v) => number(v).map_or(FieldValue::Malformed, FieldValue::Present),
    }
}

/// Number, numeric string, or a sequence whose first element is one.
fn scalar_or_first(body: &Map<String, Value>, key: &str) -> FieldValue<f64> {
    match body.get(key) {
        None | Some(Value::Null) => FieldValue::Absent,
        Some(Value::Array(items)) => items
            .first()
            .and_then(number)
            .map_or(FieldValue::Malformed, FieldValue::Present),
        Some(v) => number(v).map_or(FieldValue::Malformed, FieldValue::Present),
    }
}

/// Exactly the `vx`, `vy`, `vz` keys, all numeric, or nothing.
fn vector_field(body: &Map<String, Value>, key: &str) -> FieldValue<[f64; 3]> {
    let components = match body.get(key) {
        None | Some(Value::Null) => return FieldValue::Absent,
        Some(Value::Object(components)) if components.len() == PECULIAR_KEYS.len() => components,
        Some(_) => return FieldValue::Malformed,
    };

    let mut out = [0.0; 3];
    for (slot, name) in out.iter_mut().zip(PECULIAR_KEYS) {
        match components.get(name).and_then(number) {
            Some(v) => *slot = v,
            None => return FieldValue::Malformed,
        }
    }
    FieldValue::Present(out)
}

fn marker_matches(body: &Map<String, Value>, marker: &SuccessMarker) -> bool {
    match (body.get(&marker.key), &marker.value) {
        (Some(Value::String(got)), Value::String(want)) => got.trim().eq_ignore_ascii_case(want),
        (Some(got), want) => got == want,
        (None, _) => false,
    }
}

/// Converts raw calculator responses into table rows.
#[derive(Debug, Clone)]
pub struct ResponseNormalizer {
    success_markers: Vec<SuccessMarker>,
}

impl Default for ResponseNormalizer {
    fn default() -> Self {
        Self::from_config(&CalculatorConfig::default())
    }
}

impl ResponseNormalizer {
    pub fn new(success_markers: Vec<SuccessMarker>) -> Self {
        Self { success_markers }
    }

    pub fn from_config(config: &CalculatorConfig) -> Self {
        Self::new(config.success_markers.clone())
    }

    /// True when any configured marker is found in the body.
    pub fn is_success(&self, body: &Map<String, Value>) -> bool {
        self.success_markers
            .iter()
            .any(|marker| marker_matches(body, marker))
    }

    /// Normalize the response to query `index`.
    pub fn normalize(
        &self,
        index: usize,
        raw: &RawResponse,
    ) -> Result<GalaxyRecord, NormalizationFailure> {
        let body = raw.as_object().ok_or(NormalizationFailure::NotAnObject)?;

        if !self.is_success(body) {
            let detail = body
                .get("message")
                .map(|m| m.to_string())
                .unwrap_or_else(|| "no success marker".to_string());
            return Err(NormalizationFailure::ApiError { detail });
        }

        let ra = scalar_field(body, "RA");
        let dec = scalar_field(body, "Dec");
        let distance = scalar_or_first(body, "distance");
        let velocity = scalar_or_first(body, "velocity");
        let peculiar = vector_field(body, "peculiar_velocity");

        for (name, malformed) in [
            ("RA", ra.is_malformed()),
            ("Dec", dec.is_malformed()),
            ("distance", distance.is_malformed()),
            ("velocity", velocity.is_malformed()),
            ("peculiar_velocity", peculiar.is_malformed()),
        ] {
            if malformed {
                log::debug!("row {}: unreadable '{}', treating as null", index, name);
            }
        }

        Ok(GalaxyRecord {
            index,
            ra: ra.into_option(),
            dec: dec.into_option(),
            distance: distance.into_option(),
            velocity: velocity.into_option(),
            peculiar_velocity: peculiar.into_option(),
            position: None,
            cluster_id: None,
        })
    }
}
