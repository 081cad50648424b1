//! Spherical to Cartesian projection of galaxy rows.

use rayon::prelude::*;

use crate::core::types::GalaxyTable;

/// Counts from one projection pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProjectionSummary {
    pub projected: usize,
    /// Rows left without a position (missing distance, RA or Dec).
    pub skipped: usize,
}

/// Convert RA/Dec in degrees and a radial distance to (x, y, z).
#[inline]
pub fn spherical_to_cartesian(ra_deg: f64, dec_deg: f64, distance: f64) -> [f64; 3] {
    let (sin_ra, cos_ra) = ra_deg.to_radians().sin_cos();
    let (sin_dec, cos_dec) = dec_deg.to_radians().sin_cos();
    [
        cos_ra * cos_dec * distance,
        sin_ra * cos_dec * distance,
        sin_dec * distance,
    ]
}

/// Fill `position` for every row that has RA, Dec and distance.
///
/// Rows missing any of the three keep `position = None` and stay in the
/// table; they are left out of clustering and vector rendering.
pub fn project(table: &mut GalaxyTable) -> ProjectionSummary {
    let projected = table
        .rows_mut()
        .par_iter_mut()
        .map(|row| {
            row.position = match (row.ra, row.dec, row.distance) {
                (Some(ra), Some(dec), Some(d)) => Some(spherical_to_cartesian(ra, dec, d)),
                _ => None,
            };
            row.position.is_some() as usize
        })
        .sum::<usize>();

    let summary = ProjectionSummary {
        projected,
        skipped: table.len() - projected,
    };
    if summary.skipped > 0 {
        log::info!(
            "projection: {} rows projected, {} rows without position",
            summary.projected,
            summary.skipped
        );
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GalaxyRecord;

    fn assert_close(actual: [f64; 3], expected: [f64; 3]) {
        for (a, e) in actual.iter().zip(expected.iter()) {
            assert!((a - e).abs() < 1e-9, "{:?} != {:?}", actual, expected);
        }
    }

    fn row(index: usize, ra: f64, dec: f64, distance: Option<f64>) -> GalaxyRecord {
        GalaxyRecord {
            ra: Some(ra),
            dec: Some(dec),
            distance,
            ..GalaxyRecord::new(index)
        }
    }

    #[test]
    fn test_cardinal_directions() {
        assert_close(spherical_to_cartesian(0.0, 0.0, 10.0), [10.0, 0.0, 0.0]);
        assert_close(spherical_to_cartesian(90.0, 0.0, 10.0), [0.0, 10.0, 0.0]);
        assert_close(spherical_to_cartesian(0.0, 90.0, 10.0), [0.0, 0.0, 10.0]);
        assert_close(spherical_to_cartesian(180.0, 0.0, 10.0), [-10.0, 0.0, 0.0]);
        assert_close(spherical_to_cartesian(0.0, -90.0, 10.0), [0.0, 0.0, -10.0]);
    }

    #[test]
    fn test_angles_are_degrees() {
        // Radian evaluation of 90 would give cos(90) ~ -0.448
        let p = spherical_to_cartesian(90.0, 0.0, 1.0);
        assert!(p[0].abs() < 1e-12);

        let p = spherical_to_cartesian(45.0, 45.0, 2.0);
        assert_close(p, [1.0, 1.0, std::f64::consts::SQRT_2]);
    }

    #[test]
    fn test_radius_is_preserved() {
        let p = spherical_to_cartesian(123.4, -56.7, 42.0);
        let r = (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt();
        assert!((r - 42.0).abs() < 1e-9);
    }

    #[test]
    fn test_project_table_skips_null_distance() {
        let mut table: GalaxyTable = vec![
            row(0, 0.0, 0.0, Some(10.0)),
            row(1, 90.0, 0.0, None),
            GalaxyRecord {
                distance: Some(5.0),
                ..GalaxyRecord::new(2)
            },
        ]
        .into_iter()
        .collect();

        let summary = project(&mut table);

        assert_eq!(summary, ProjectionSummary { projected: 1, skipped: 2 });
        assert_eq!(table.len(), 3);
        assert_close(table.rows()[0].position.unwrap(), [10.0, 0.0, 0.0]);
        assert_eq!(table.rows()[1].position, None);
        assert_eq!(table.rows()[2].position, None);
        assert_eq!(table.positioned().count(), 1);
    }

    #[test]
    fn test_project_empty_table() {
        let mut table = GalaxyTable::new();
        assert_eq!(project(&mut table), ProjectionSummary::default());
    }
}
