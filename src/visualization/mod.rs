//! 3-D scene rendering of the galaxy table.
//!
//! Points are colored by cluster id and peculiar velocities are drawn as
//! arrows. Nothing here draws text, so no system fonts are needed.

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters_bitmap::BitMapBackend;
use thiserror::Error;

use crate::config::{RenderConfig, SceneView};
use crate::core::types::GalaxyTable;

/// Errors that can occur during visualization.
#[derive(Error, Debug)]
pub enum VisualizationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Plotting error: {0}")]
    PlottingError(String),

    #[error("No rows can be placed in the {0:?} view")]
    EmptyScene(SceneView),
}

/// Result type for visualization operations.
pub type Result<T> = std::result::Result<T, VisualizationError>;

/// Color palette for clusters, cycled by cluster id.
const CLUSTER_COLORS: &[(u8, u8, u8)] = &[
    (55, 126, 184),  // Blue
    (77, 175, 74),   // Green
    (152, 78, 163),  // Purple
    (255, 127, 0),   // Orange
    (166, 86, 40),   // Brown
    (247, 129, 191), // Pink
    (0, 206, 209),   // Turquoise
    (138, 43, 226),  // Blue Violet
    (50, 205, 50),   // Lime Green
    (255, 20, 147),  // Deep Pink
    (0, 191, 255),   // Deep Sky Blue
    (255, 215, 0),   // Gold
];

/// Reserved for noise and unlabeled rows; not in the palette.
const NOISE_COLOR: (u8, u8, u8) = (128, 128, 128);

const ARROW_COLOR: (u8, u8, u8) = (228, 26, 28);

const BOX_COLOR: (u8, u8, u8) = (200, 200, 200);

/// Color for a row's cluster label.
pub fn cluster_color(cluster_id: Option<i32>) -> RGBColor {
    let (r, g, b) = match cluster_id {
        Some(id) if id >= 0 => CLUSTER_COLORS[id as usize % CLUSTER_COLORS.len()],
        _ => NOISE_COLOR,
    };
    RGBColor(r, g, b)
}

/// A marker in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScenePoint {
    pub at: [f64; 3],
    pub cluster_id: Option<i32>,
}

/// A velocity arrow in scene coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneArrow {
    pub tail: [f64; 3],
    pub head: [f64; 3],
}

/// Scene position of every row that can be placed in `view`.
///
/// Cartesian uses the projected position; sky uses (RA, Dec, velocity).
pub fn scene_points(table: &GalaxyTable, view: SceneView) -> Vec<ScenePoint> {
    table
        .iter()
        .filter_map(|row| {
            let at = match view {
                SceneView::Cartesian => row.position?,
                SceneView::Sky => [row.ra?, row.dec?, row.velocity?],
            };
            Some(ScenePoint {
                at,
                cluster_id: row.cluster_id,
            })
        })
        .collect()
}

/// One arrow per placeable row that carries a peculiar velocity.
///
/// In the cartesian view the arrow is `(vx, vy, vz) * vector_scale`. In the
/// sky view the velocity is normalized and each component is stretched to
/// `sky_arrow_fraction` of the matching axis span.
pub fn scene_arrows(table: &GalaxyTable, config: &RenderConfig) -> Vec<SceneArrow> {
    match config.view {
        SceneView::Cartesian => table
            .iter()
            .filter_map(|row| {
                let tail = row.position?;
                let v = row.peculiar_velocity?;
                let head = [0, 1, 2].map(|i| tail[i] + v[i] * config.vector_scale);
                Some(SceneArrow { tail, head })
            })
            .collect(),
        SceneView::Sky => {
            let points = scene_points(table, SceneView::Sky);
            let Some(bounds) = Bounds::of(points.iter().map(|p| p.at)) else {
                return Vec::new();
            };
            let span = bounds.span();
            table
                .iter()
                .filter_map(|row| {
                    let tail = [row.ra?, row.dec?, row.velocity?];
                    let v = row.peculiar_velocity?;
                    let norm = (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]).sqrt();
                    if !(norm > 0.0) {
                        return None;
                    }
                    let head = [0, 1, 2]
                        .map(|i| tail[i] + v[i] / norm * span[i] * config.sky_arrow_fraction);
                    Some(SceneArrow { tail, head })
                })
                .collect()
        }
    }
}

/// Axis-aligned bounds of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bounds {
    min: [f64; 3],
    max: [f64; 3],
}

impl Bounds {
    fn of(points: impl Iterator<Item = [f64; 3]>) -> Option<Self> {
        let mut bounds: Option<Bounds> = None;
        for p in points.filter(|p| p.iter().all(|c| c.is_finite())) {
            let b = bounds.get_or_insert(Bounds { min: p, max: p });
            for i in 0..3 {
                b.min[i] = b.min[i].min(p[i]);
                b.max[i] = b.max[i].max(p[i]);
            }
        }
        bounds
    }

    fn include(&mut self, p: [f64; 3]) {
        for i in 0..3 {
            if p[i].is_finite() {
                self.min[i] = self.min[i].min(p[i]);
                self.max[i] = self.max[i].max(p[i]);
            }
        }
    }

    fn span(&self) -> [f64; 3] {
        [0, 1, 2].map(|i| (self.max[i] - self.min[i]).max(1.0))
    }

    /// Pad each axis by 5%, widening degenerate axes to a unit span.
    fn padded(&self) -> Self {
        let mut out = *self;
        for i in 0..3 {
            if (out.max[i] - out.min[i]).abs() < f64::EPSILON {
                out.min[i] -= 1.0;
                out.max[i] += 1.0;
            }
            let pad = (out.max[i] - out.min[i]) * 0.05;
            out.min[i] -= pad;
            out.max[i] += pad;
        }
        out
    }

    fn edges(&self) -> [([f64; 3], [f64; 3]); 12] {
        let c = |i: usize| {
            [
                if i & 1 == 0 { self.min[0] } else { self.max[0] },
                if i & 2 == 0 { self.min[1] } else { self.max[1] },
                if i & 4 == 0 { self.min[2] } else { self.max[2] },
            ]
        };
        [
            (c(0), c(1)),
            (c(2), c(3)),
            (c(4), c(5)),
            (c(6), c(7)),
            (c(0), c(2)),
            (c(1), c(3)),
            (c(4), c(6)),
            (c(5), c(7)),
            (c(0), c(4)),
            (c(1), c(5)),
            (c(2), c(6)),
            (c(3), c(7)),
        ]
    }
}

/// Consumer of the finished table.
pub trait SceneRenderer {
    fn render(&self, table: &GalaxyTable) -> Result<()>;
}

/// Renders the scene to a PNG file.
#[derive(Debug, Clone)]
pub struct PngSceneRenderer {
    path: PathBuf,
    config: RenderConfig,
}

impl PngSceneRenderer {
    pub fn new(path: impl Into<PathBuf>, config: RenderConfig) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn plot_err<E: std::fmt::Display>(e: E) -> VisualizationError {
    VisualizationError::PlottingError(e.to_string())
}

fn tuple(p: [f64; 3]) -> (f64, f64, f64) {
    (p[0], p[1], p[2])
}

impl SceneRenderer for PngSceneRenderer {
    fn render(&self, table: &GalaxyTable) -> Result<()> {
        let view = self.config.view;
        let points = scene_points(table, view);
        let arrows = scene_arrows(table, &self.config);

        let mut bounds = Bounds::of(points.iter().map(|p| p.at))
            .ok_or(VisualizationError::EmptyScene(view))?;
        for arrow in &arrows {
            bounds.include(arrow.head);
        }
        let bounds = bounds.padded();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let root = BitMapBackend::new(&self.path, (self.config.width, self.config.height))
            .into_drawing_area();
        root.fill(&WHITE).map_err(plot_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .build_cartesian_3d(
                bounds.min[0]..bounds.max[0],
                bounds.min[1]..bounds.max[1],
                bounds.min[2]..bounds.max[2],
            )
            .map_err(plot_err)?;

        let (yaw, pitch) = (self.config.yaw, self.config.pitch);
        chart.with_projection(|mut pb| {
            pb.yaw = yaw;
            pb.pitch = pitch;
            pb.scale = 0.85;
            pb.into_matrix()
        });

        let (r, g, b) = BOX_COLOR;
        chart
            .draw_series(
                bounds
                    .edges()
                    .into_iter()
                    .map(|(from, to)| PathElement::new(vec![tuple(from), tuple(to)], RGBColor(r, g, b))),
            )
            .map_err(plot_err)?;

        // Noise first so clusters stay visible on top
        let mut ordered = points;
        ordered.sort_by_key(|p| p.cluster_id.map_or(false, |id| id >= 0));
        let size = self.config.point_size;
        chart
            .draw_series(
                ordered
                    .iter()
                    .map(|p| Circle::new(tuple(p.at), size, cluster_color(p.cluster_id).filled())),
            )
            .map_err(plot_err)?;

        let (r, g, b) = ARROW_COLOR;
        let arrow_style = RGBColor(r, g, b).stroke_width(1);
        chart
            .draw_series(
                arrows
                    .iter()
                    .map(|a| PathElement::new(vec![tuple(a.tail), tuple(a.head)], arrow_style)),
            )
            .map_err(plot_err)?;
        chart
            .draw_series(
                arrows
                    .iter()
                    .map(|a| TriangleMarker::new(tuple(a.head), 3, RGBColor(r, g, b).filled())),
            )
            .map_err(plot_err)?;

        root.present().map_err(plot_err)?;
        log::info!(
            "rendered {} points and {} arrows to {}",
            ordered.len(),
            arrows.len(),
            self.path.display()
        );
        Ok(())
    }
}
