//! Loaders for literal coordinate lists.
//!
//! A coordinate CSV has a header row and one sky position per line:
//! `alpha,delta[,system]`. Column names are matched case-insensitively
//! (`alpha`/`ra`/`sgl`/`glon`, `delta`/`dec`/`sgb`/`glat`, `system`); when
//! they are not found the first two columns are used.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;

use crate::core::types::{CoordinateSystem, SkyCoordinate};

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Empty file: {0}")]
    EmptyFile(PathBuf),

    #[error("Parse error at line {line}: {message}")]
    ParseError { line: usize, message: String },
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

const ALPHA_NAMES: &[&str] = &["alpha", "ra", "sgl", "glon"];
const DELTA_NAMES: &[&str] = &["delta", "dec", "sgb", "glat"];

fn find_column(col_map: &HashMap<String, usize>, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|n| col_map.get(*n).copied())
}

/// Load sky coordinates from a CSV file.
///
/// Rows without a `system` column (or with an empty cell) use
/// `default_system`.
///
/// # Errors
///
/// Returns an error if the file cannot be read, a row holds a non-numeric
/// angle or an unknown system, or the file has no data rows.
pub fn load_coordinates_csv<P: AsRef<Path>>(
    path: P,
    default_system: CoordinateSystem,
) -> Result<Vec<SkyCoordinate>> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    let col_map: HashMap<String, usize> = headers
        .iter()
        .enumerate()
        .map(|(i, name)| (name.to_lowercase(), i))
        .collect();

    let alpha_idx = find_column(&col_map, ALPHA_NAMES).unwrap_or(0);
    let delta_idx = find_column(&col_map, DELTA_NAMES).unwrap_or(1);
    let system_idx = col_map.get("system").copied();

    let mut coords = Vec::new();

    for (row, result) in reader.records().enumerate() {
        let record = result?;
        // Header is line 1
        let line = row + 2;

        let angle = |idx: usize, name: &str| -> Result<f64> {
            record
                .get(idx)
                .and_then(|s| s.parse::<f64>().ok())
                .filter(|v| v.is_finite())
                .ok_or_else(|| LoaderError::ParseError {
                    line,
                    message: format!("missing or non-numeric {}", name),
                })
        };

        let alpha = angle(alpha_idx, "alpha")?;
        let delta = angle(delta_idx, "delta")?;

        let system = match system_idx.and_then(|i| record.get(i)).filter(|s| !s.is_empty()) {
            Some(name) => name.parse().map_err(|e| LoaderError::ParseError {
                line,
                message: format!("{}", e),
            })?,
            None => default_system,
        };

        coords.push(SkyCoordinate::new(alpha, delta, system));
    }

    if coords.is_empty() {
        return Err(LoaderError::EmptyFile(path.to_path_buf()));
    }

    Ok(coords)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_coordinates_csv() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "alpha,delta")?;
        writeln!(file, "192.25,27.4")?;
        writeln!(file, "13.3, -44.5")?;
        writeln!(file, "75.3,60.7")?;

        let coords = load_coordinates_csv(file.path(), CoordinateSystem::Supergalactic)?;

        assert_eq!(coords.len(), 3);
        assert_eq!(
            coords[1],
            SkyCoordinate::new(13.3, -44.5, CoordinateSystem::Supergalactic)
        );
        Ok(())
    }

    #[test]
    fn test_load_coordinates_with_system_column() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "System,RA,Dec")?;
        writeln!(file, "equatorial,10.0,20.0")?;
        writeln!(file, ",30.0,40.0")?;

        let coords = load_coordinates_csv(file.path(), CoordinateSystem::Galactic)?;

        assert_eq!(coords[0].system, CoordinateSystem::Equatorial);
        assert_eq!(coords[0].alpha, 10.0);
        assert_eq!(coords[1].system, CoordinateSystem::Galactic);
        assert_eq!(coords[1].delta, 40.0);
        Ok(())
    }

    #[test]
    fn test_load_coordinates_falls_back_to_first_columns() -> Result<()> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "a,b,note")?;
        writeln!(file, "1.5,2.5,first")?;

        let coords = load_coordinates_csv(file.path(), CoordinateSystem::Equatorial)?;
        assert_eq!(coords[0].alpha, 1.5);
        assert_eq!(coords[0].delta, 2.5);
        Ok(())
    }

    #[test]
    fn test_load_coordinates_errors() -> Result<()> {
        let mut bad = NamedTempFile::new()?;
        writeln!(bad, "alpha,delta")?;
        writeln!(bad, "1.0,2.0")?;
        writeln!(bad, "north,2.0")?;
        match load_coordinates_csv(bad.path(), CoordinateSystem::Galactic) {
            Err(LoaderError::ParseError { line, .. }) => assert_eq!(line, 3),
            other => panic!("expected parse error, got {:?}", other),
        }

        let mut unknown = NamedTempFile::new()?;
        writeln!(unknown, "alpha,delta,system")?;
        writeln!(unknown, "1.0,2.0,ecliptic")?;
        assert!(load_coordinates_csv(unknown.path(), CoordinateSystem::Galactic).is_err());

        let mut empty = NamedTempFile::new()?;
        writeln!(empty, "alpha,delta")?;
        assert!(matches!(
            load_coordinates_csv(empty.path(), CoordinateSystem::Galactic),
            Err(LoaderError::EmptyFile(_))
        ));
        Ok(())
    }
}
