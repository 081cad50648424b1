//! Core data types and I/O operations.

pub mod loaders;
pub mod sampling;
pub mod types;
pub mod writers;

pub use loaders::{load_coordinates_csv, LoaderError};
pub use sampling::SkySampler;
pub use types::{
    Calculator, CoordinateSystem, GalaxyRecord, GalaxyTable, Parameter, SkyCoordinate,
    NOISE_LABEL,
};
pub use writers::{write_table_csv, WriteError};
