//! Data processing modules.

pub mod clustering;
pub mod normalize;
pub mod projection;
pub mod query;

// Re-export key types for convenience
pub use clustering::{label, label_table, ClusterSummary};
pub use normalize::{FieldValue, NormalizationFailure, RawResponse, ResponseNormalizer};
pub use projection::{project, spherical_to_cartesian, ProjectionSummary};
pub use query::{build, AsFloat, QueryBuilder, QueryError, QueryRequest};
