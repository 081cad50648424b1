//! Cosmicflows galaxy distance/velocity pipeline.
//!
//! This crate provides tools for:
//! - Building calculator queries for sky coordinates
//! - Fetching and normalizing calculator responses into a galaxy table
//! - Projecting sky positions and distances to Cartesian coordinates
//! - DBSCAN clustering of the projected galaxies (parallelized)
//! - Rendering the clustered table as a 3-D scene
//!
//! # Example
//!
//! ```no_run
//! use cosmicflows_pipeline::{client::HttpCalculatorClient, core::SkySampler, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::default();
//! let client = HttpCalculatorClient::new(&config.calculator).unwrap();
//! let coords: Vec<_> = SkySampler::seeded(42, config.query.system).take(100).collect();
//! let report = Pipeline::new(client, &config).run(&coords).unwrap();
//! println!("{} clusters", report.clusters.n_clusters());
//! ```

pub mod cli;
pub mod client;
pub mod config;
pub mod core;
pub mod pipeline;
pub mod processors;
pub mod visualization;

pub use client::{CalculatorClient, HttpCalculatorClient, TransportError};
pub use config::{ClusteringConfig, PipelineConfig, QueryConfig, RenderConfig};
pub use crate::core::types::{GalaxyRecord, GalaxyTable, SkyCoordinate};
pub use pipeline::{BatchReport, Pipeline, PipelineError};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
