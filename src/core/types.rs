//! Core data types: sky coordinates, calculator options and the galaxy table.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Angular coordinate frame used to express a sky position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSystem {
    Equatorial,
    Galactic,
    Supergalactic,
}

impl CoordinateSystem {
    pub const ALL: [CoordinateSystem; 3] = [
        CoordinateSystem::Equatorial,
        CoordinateSystem::Galactic,
        CoordinateSystem::Supergalactic,
    ];

    /// Name used on the wire and in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordinateSystem::Equatorial => "equatorial",
            CoordinateSystem::Galactic => "galactic",
            CoordinateSystem::Supergalactic => "supergalactic",
        }
    }
}

/// Quantity supplied to the calculator as the query value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parameter {
    /// Value is a distance in Mpc.
    Distance,
    /// Value is a velocity in km/s.
    Velocity,
}

impl Parameter {
    pub const ALL: [Parameter; 2] = [Parameter::Distance, Parameter::Velocity];

    pub fn as_str(&self) -> &'static str {
        match self {
            Parameter::Distance => "distance",
            Parameter::Velocity => "velocity",
        }
    }
}

/// Cosmicflows calculator backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calculator {
    #[serde(rename = "NAM", alias = "nam")]
    Nam,
    #[serde(rename = "CF3", alias = "cf3")]
    Cf3,
}

impl Calculator {
    pub const ALL: [Calculator; 2] = [Calculator::Nam, Calculator::Cf3];

    /// Name used in the service URL (`{name}calculator/api.php`).
    pub fn as_str(&self) -> &'static str {
        match self {
            Calculator::Nam => "NAM",
            Calculator::Cf3 => "CF3",
        }
    }
}

/// Error returned when an option name does not match any known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownOption {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! impl_option_str {
    ($ty:ty, $kind:literal) => {
        impl FromStr for $ty {
            type Err = UnknownOption;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let wanted = s.trim();
                <$ty>::ALL
                    .iter()
                    .copied()
                    .find(|v| v.as_str().eq_ignore_ascii_case(wanted))
                    .ok_or_else(|| UnknownOption {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

impl_option_str!(CoordinateSystem, "coordinate system");
impl_option_str!(Parameter, "parameter");
impl_option_str!(Calculator, "calculator");

/// A position on the sky in degrees, tagged with its frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyCoordinate {
    /// First angle (RA, Glon or SGL) in degrees.
    pub alpha: f64,
    /// Second angle (Dec, Glat or SGB) in degrees.
    pub delta: f64,
    pub system: CoordinateSystem,
}

impl SkyCoordinate {
    pub fn new(alpha: f64, delta: f64, system: CoordinateSystem) -> Self {
        Self {
            alpha,
            delta,
            system,
        }
    }
}

/// One normalized calculator result.
///
/// Optional fields are `None` when the service omitted them or sent a value
/// that could not be read. `peculiar_velocity` is either a full vector or
/// `None`, never a partial one.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct GalaxyRecord {
    /// Index of the query that produced this row.
    pub index: usize,
    pub ra: Option<f64>,
    pub dec: Option<f64>,
    /// Distance in Mpc.
    pub distance: Option<f64>,
    /// Velocity in km/s.
    pub velocity: Option<f64>,
    /// Peculiar velocity (vx, vy, vz) in km/s.
    pub peculiar_velocity: Option<[f64; 3]>,
    /// Cartesian position (x, y, z) in Mpc, filled by projection.
    pub position: Option<[f64; 3]>,
    /// Cluster label, filled by clustering. `-1` marks noise.
    pub cluster_id: Option<i32>,
}

impl GalaxyRecord {
    /// Empty record for the given query index.
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    #[inline]
    pub fn is_noise(&self) -> bool {
        self.cluster_id == Some(NOISE_LABEL)
    }
}

/// Cluster label reserved for points outside every dense region.
pub const NOISE_LABEL: i32 = -1;

/// Ordered collection of galaxy rows; row order follows query order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GalaxyTable {
    rows: Vec<GalaxyRecord>,
}

impl GalaxyTable {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            rows: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn push(&mut self, record: GalaxyRecord) {
        self.rows.push(record);
    }

    pub fn rows(&self) -> &[GalaxyRecord] {
        &self.rows
    }

    pub fn rows_mut(&mut self) -> &mut [GalaxyRecord] {
        &mut self.rows
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GalaxyRecord> {
        self.rows.iter()
    }

    /// Rows that have a Cartesian position, with their table offsets.
    pub fn positioned(&self) -> impl Iterator<Item = (usize, [f64; 3])> + '_ {
        self.rows
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.position.map(|p| (i, p)))
    }
}

impl FromIterator<GalaxyRecord> for GalaxyTable {
    fn from_iter<I: IntoIterator<Item = GalaxyRecord>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a GalaxyTable {
    type Item = &'a GalaxyRecord;
    type IntoIter = std::slice::Iter<'a, GalaxyRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}
