//! Command-line interface for the Cosmicflows pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::client::{CalculatorClient, HttpCalculatorClient};
use crate::config::SceneView;
use crate::core::loaders::load_coordinates_csv;
use crate::core::sampling::SkySampler;
use crate::core::types::{GalaxyTable, SkyCoordinate};
use crate::core::writers::write_table_csv;
use crate::pipeline::{Pipeline, PipelineError};
use crate::processors::normalize::ResponseNormalizer;
use crate::processors::projection::project;
use crate::processors::query;
use crate::visualization::{PngSceneRenderer, SceneRenderer};
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "cosmicflows")]
#[command(about = "Cosmicflows galaxy distance/velocity pipeline", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query the calculator for a single sky position
    Query {
        /// First angle in degrees (RA, Glon or SGL)
        #[arg(allow_hyphen_values = true)]
        alpha: String,
        /// Second angle in degrees (Dec, Glat or SGB)
        #[arg(allow_hyphen_values = true)]
        delta: String,
        /// Coordinate system (equatorial, galactic, supergalactic)
        #[arg(long)]
        system: Option<String>,
        /// Query parameter (distance, velocity)
        #[arg(long)]
        parameter: Option<String>,
        /// Distance in Mpc or velocity in km/s
        #[arg(long, allow_hyphen_values = true)]
        value: Option<String>,
        /// Calculator backend (NAM, CF3)
        #[arg(long)]
        calculator: Option<String>,
    },

    /// Fetch, project and cluster a batch of sky positions
    Run {
        /// CSV file of coordinates (alpha,delta[,system]); random sampling if omitted
        #[arg(long)]
        coords: Option<PathBuf>,
        /// Number of random coordinates
        #[arg(long)]
        count: Option<usize>,
        /// Seed for random sampling
        #[arg(long)]
        seed: Option<u64>,
        /// DBSCAN neighborhood radius in Mpc
        #[arg(long)]
        eps: Option<f64>,
        /// DBSCAN minimum samples per core point
        #[arg(long)]
        min_samples: Option<usize>,
        /// Write the galaxy table to this CSV file
        #[arg(long)]
        output_csv: Option<PathBuf>,
        /// Render the scene to this PNG file
        #[arg(long)]
        plot: Option<PathBuf>,
        /// Scene axes
        #[arg(long, value_enum, ignore_case = true)]
        view: Option<SceneView>,
    },

    /// Write the default configuration to a YAML file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            format!("{}...", value.chars().take(36).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn opt_cell(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.3}", v))
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Load config
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}, using defaults",
                    path.display(),
                    e
                );
                PipelineConfig::default()
            }
        },
        None => PipelineConfig::default(),
    };

    let result = match cli.command {
        Commands::Query {
            alpha,
            delta,
            system,
            parameter,
            value,
            calculator,
        } => cmd_query(
            &alpha,
            &delta,
            system,
            parameter,
            value,
            calculator,
            &config,
        ),
        Commands::Run {
            coords,
            count,
            seed,
            eps,
            min_samples,
            output_csv,
            plot,
            view,
        } => {
            let mut config = config;
            if let Some(count) = count {
                config.sampling.count = count;
            }
            if seed.is_some() {
                config.sampling.seed = seed;
            }
            if let Some(eps) = eps {
                config.clustering.eps = eps;
            }
            if let Some(min_samples) = min_samples {
                config.clustering.min_samples = min_samples;
            }
            if let Some(view) = view {
                config.render.view = view;
            }
            cmd_run(coords, output_csv, plot, &config)
        }
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    };

    if let Err(e) = result {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

fn cmd_query(
    alpha: &str,
    delta: &str,
    system: Option<String>,
    parameter: Option<String>,
    value: Option<String>,
    calculator: Option<String>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    let defaults = &config.query;

    let system = system.unwrap_or_else(|| defaults.system.to_string());
    let parameter = parameter.unwrap_or_else(|| defaults.parameter.to_string());
    let value = value.unwrap_or_else(|| defaults.value.to_string());
    let calculator = calculator.unwrap_or_else(|| defaults.calculator.to_string());

    let request = query::build(alpha, delta, &system, &parameter, value.as_str(), &calculator)
        .context("invalid query")?;
    let client = HttpCalculatorClient::new(&config.calculator)
        .context("failed to create calculator client")?;
    let endpoint = client.endpoint(request.calculator());

    let spinner = create_spinner(&format!("Querying {}...", endpoint));
    let raw = client.fetch(&request);
    spinner.finish_and_clear();
    let raw = raw.context("calculator request failed")?;

    let mut table: GalaxyTable = std::iter::once(
        ResponseNormalizer::from_config(&config.calculator)
            .normalize(0, &raw)
            .context("calculator rejected the query")?,
    )
    .collect();
    project(&mut table);

    let record = &table.rows()[0];
    if log::log_enabled!(log::Level::Debug) {
        if let Ok(json) = serde_json::to_string_pretty(record) {
            log::debug!("normalized record:\n{}", json);
        }
    }

    let pv = record
        .peculiar_velocity
        .map_or_else(|| "-".to_string(), |v| format!("({:.1}, {:.1}, {:.1})", v[0], v[1], v[2]));
    let position = record
        .position
        .map_or_else(|| "-".to_string(), |p| format!("({:.3}, {:.3}, {:.3})", p[0], p[1], p[2]));

    print_summary(
        "Query Complete",
        &[
            ("Coordinate", format!("({}, {}) {}", alpha, delta, request.system())),
            ("Query", format!("{} = {}", request.parameter(), request.value())),
            ("Calculator", request.calculator().to_string()),
            ("RA", opt_cell(record.ra)),
            ("Dec", opt_cell(record.dec)),
            ("Distance (Mpc)", opt_cell(record.distance)),
            ("Velocity (km/s)", opt_cell(record.velocity)),
            ("Peculiar velocity", pv),
            ("Position (Mpc)", position),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn load_coords(coords: Option<PathBuf>, config: &PipelineConfig) -> Result<Vec<SkyCoordinate>> {
    match coords {
        Some(path) => {
            let list = load_coordinates_csv(&path, config.query.system)
                .with_context(|| format!("failed to load coordinates from {}", path.display()))?;
            info!("Loaded {} coordinates from {}", list.len(), path.display());
            Ok(list)
        }
        None => {
            let sampler = SkySampler::from_config(&config.sampling, config.query.system);
            info!(
                "Sampling {} random coordinates (seed: {:?})",
                config.sampling.count, config.sampling.seed
            );
            Ok(sampler.take(config.sampling.count).collect())
        }
    }
}

fn cmd_run(
    coords: Option<PathBuf>,
    output_csv: Option<PathBuf>,
    plot: Option<PathBuf>,
    config: &PipelineConfig,
) -> Result<()> {
    let start = Instant::now();
    config.validate().context("invalid configuration")?;

    let coords = load_coords(coords, config)?;

    println!("Running Cosmicflows batch...");
    println!("Coordinates: {}", coords.len());
    println!(
        "Calculator: {} ({}, {} = {})",
        config.query.calculator, config.calculator.base_url, config.query.parameter, config.query.value
    );
    println!(
        "DBSCAN: eps = {}, min_samples = {}",
        config.clustering.eps, config.clustering.min_samples
    );

    let client = HttpCalculatorClient::new(&config.calculator)
        .context("failed to create calculator client")?;
    let pipeline = Pipeline::new(client, config);

    let spinner = create_spinner("Querying calculator...");
    let report = pipeline.run(&coords);
    spinner.finish_and_clear();

    let report = match report {
        Ok(report) => report,
        Err(PipelineError::EmptyTable { requested, dropped }) => {
            for row in dropped.iter().take(5) {
                error!("[{:04}] {}", row.index, row.reason);
            }
            anyhow::bail!(
                "no rows survived normalization ({} of {} queries dropped)",
                dropped.len(),
                requested
            );
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = &output_csv {
        write_table_csv(path, &report.table)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!("Wrote table to {}", path.display());
    }

    if let Some(path) = &plot {
        let spinner = create_spinner("Rendering scene...");
        let rendered = PngSceneRenderer::new(path, config.render.clone()).render(&report.table);
        spinner.finish_and_clear();
        rendered.with_context(|| format!("failed to render {}", path.display()))?;
    }

    let sizes = report
        .clusters
        .cluster_sizes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");

    print_summary(
        "Batch Complete",
        &[
            ("Queries", coords.len().to_string()),
            ("Rows", report.table.len().to_string()),
            ("Dropped", report.dropped.len().to_string()),
            ("Projected", report.projection.projected.to_string()),
            ("No position", report.projection.skipped.to_string()),
            ("Clusters found", report.clusters.n_clusters().to_string()),
            ("Cluster sizes", if sizes.is_empty() { "-".to_string() } else { sizes }),
            ("Noise points", report.clusters.noise.to_string()),
            ("Table CSV", display_opt(output_csv.as_deref())),
            ("Scene PNG", display_opt(plot.as_deref())),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );
    Ok(())
}

fn display_opt(path: Option<&Path>) -> String {
    path.map_or_else(|| "-".to_string(), |p| p.display().to_string())
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) -> Result<()> {
    if path.exists() {
        anyhow::bail!("{} already exists", path.display());
    }
    config
        .to_yaml(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Wrote configuration to {}", path.display());
    Ok(())
}
