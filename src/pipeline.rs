//! Batch orchestration: query, fetch, normalize, project, cluster.

use std::time::Instant;

use rayon::prelude::*;
use thiserror::Error;

use crate::client::{CalculatorClient, TransportError};
use crate::config::{ClusteringConfig, PipelineConfig};
use crate::core::types::{GalaxyRecord, GalaxyTable, SkyCoordinate};
use crate::processors::clustering::{label_table, ClusterSummary};
use crate::processors::normalize::{NormalizationFailure, ResponseNormalizer};
use crate::processors::projection::{project, ProjectionSummary};
use crate::processors::query::{QueryBuilder, QueryError};

/// Why a coordinate produced no table row.
#[derive(Debug, Error)]
pub enum DropReason {
    #[error("invalid query: {0}")]
    Query(#[from] QueryError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("normalization failed: {0}")]
    Normalization(#[from] NormalizationFailure),
}

/// A coordinate that was dropped from the batch.
#[derive(Debug)]
pub struct DroppedRow {
    pub index: usize,
    pub coordinate: SkyCoordinate,
    pub reason: DropReason,
}

/// Batch-level failures.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no rows survived normalization ({} of {requested} queries dropped)", dropped.len())]
    EmptyTable {
        requested: usize,
        dropped: Vec<DroppedRow>,
    },

    #[error("failed to start fetch pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of a successful batch run.
#[derive(Debug)]
pub struct BatchReport {
    pub table: GalaxyTable,
    pub dropped: Vec<DroppedRow>,
    pub projection: ProjectionSummary,
    pub clusters: ClusterSummary,
}

/// One batch run over a set of sky coordinates.
///
/// Requests are issued on a dedicated pool of `max_concurrent_requests`
/// threads. Rows are collected in query order whatever order the
/// responses arrive in, so projection and clustering are reproducible.
pub struct Pipeline<C> {
    client: C,
    builder: QueryBuilder,
    normalizer: ResponseNormalizer,
    clustering: ClusteringConfig,
    max_concurrent_requests: usize,
}

impl<C: CalculatorClient> Pipeline<C> {
    pub fn new(client: C, config: &PipelineConfig) -> Self {
        Self {
            client,
            builder: QueryBuilder::from_config(&config.query),
            normalizer: ResponseNormalizer::from_config(&config.calculator),
            clustering: config.clustering.clone(),
            max_concurrent_requests: config.calculator.max_concurrent_requests.max(1),
        }
    }

    pub fn with_builder(mut self, builder: QueryBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_clustering(mut self, clustering: ClusteringConfig) -> Self {
        self.clustering = clustering;
        self
    }

    fn fetch_row(&self, index: usize, coord: &SkyCoordinate) -> Result<GalaxyRecord, DropReason> {
        let request = self.builder.for_coordinate(coord)?;
        let raw = self.client.fetch(&request)?;
        Ok(self.normalizer.normalize(index, &raw)?)
    }

    /// Fetch and normalize every coordinate.
    ///
    /// Returns the table (query order) and the dropped coordinates. Never
    /// fails because of individual rows.
    pub fn collect(
        &self,
        coords: &[SkyCoordinate],
    ) -> Result<(GalaxyTable, Vec<DroppedRow>), PipelineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.max_concurrent_requests)
            .thread_name(|i| format!("cf-fetch-{}", i))
            .build()?;

        let outcomes: Vec<Result<GalaxyRecord, DroppedRow>> = pool.install(|| {
            coords
                .par_iter()
                .enumerate()
                .map(|(index, coord)| {
                    self.fetch_row(index, coord).map_err(|reason| {
                        log::warn!(
                            "[{:04}] ({:.3}, {:.3}) {}: dropped, {}",
                            index,
                            coord.alpha,
                            coord.delta,
                            coord.system,
                            reason
                        );
                        DroppedRow {
                            index,
                            coordinate: *coord,
                            reason,
                        }
                    })
                })
                .collect()
        });

        let mut table = GalaxyTable::with_capacity(coords.len());
        let mut dropped = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(record) => table.push(record),
                Err(row) => dropped.push(row),
            }
        }
        Ok((table, dropped))
    }

    /// Run the whole batch.
    ///
    /// # Errors
    ///
    /// [`PipelineError::EmptyTable`] when no coordinate produced a row.
    pub fn run(&self, coords: &[SkyCoordinate]) -> Result<BatchReport, PipelineError> {
        let start = Instant::now();
        log::info!(
            "querying {} coordinates ({} concurrent)",
            coords.len(),
            self.max_concurrent_requests
        );

        let (mut table, dropped) = self.collect(coords)?;
        if table.is_empty() {
            return Err(PipelineError::EmptyTable {
                requested: coords.len(),
                dropped,
            });
        }
        log::info!(
            "{} rows normalized, {} dropped in {:.2?}",
            table.len(),
            dropped.len(),
            start.elapsed()
        );

        let projection = project(&mut table);
        let clusters = label_table(&mut table, &self.clustering);

        Ok(BatchReport {
            table,
            dropped,
            projection,
            clusters,
        })
    }
}
