//! CSV export of the galaxy table.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::Path;

use thiserror::Error;

use super::types::GalaxyTable;

/// Column order of the exported table.
pub const TABLE_HEADER: [&str; 12] = [
    "index", "ra", "dec", "distance", "velocity", "vx", "vy", "vz", "x", "y", "z", "cluster",
];

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to flush data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

fn cell(value: Option<f64>) -> String {
    value.map(|v| format!("{:.6}", v)).unwrap_or_default()
}

/// Write every table row to CSV, nulls as empty cells.
///
/// Rows keep table order; rows without a position or cluster are written
/// too so they stay available for diagnostics.
///
/// # Example
///
/// ```no_run
/// use cosmicflows_pipeline::core::types::GalaxyTable;
/// use cosmicflows_pipeline::core::writers::write_table_csv;
/// use std::path::Path;
///
/// write_table_csv(Path::new("galaxies.csv"), &GalaxyTable::new()).unwrap();
/// ```
pub fn write_table_csv(path: &Path, table: &GalaxyTable) -> Result<()> {
    ensure_parent_dirs(path)?;

    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    let mut csv_writer = csv::Writer::from_writer(BufWriter::new(file));

    let path_str = path.display().to_string();
    let csv_err = |e: csv::Error| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    csv_writer.write_record(TABLE_HEADER).map_err(csv_err)?;

    for row in table {
        let [vx, vy, vz] = row.peculiar_velocity.map_or([None; 3], |v| v.map(Some));
        let [x, y, z] = row.position.map_or([None; 3], |p| p.map(Some));
        csv_writer
            .write_record([
                row.index.to_string(),
                cell(row.ra),
                cell(row.dec),
                cell(row.distance),
                cell(row.velocity),
                cell(vx),
                cell(vy),
                cell(vz),
                cell(x),
                cell(y),
                cell(z),
                row.cluster_id.map(|c| c.to_string()).unwrap_or_default(),
            ])
            .map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::GalaxyRecord;
    use tempfile::tempdir;

    fn create_test_table() -> GalaxyTable {
        vec![
            GalaxyRecord {
                ra: Some(10.0),
                dec: Some(-5.0),
                distance: Some(12.5),
                velocity: Some(900.0),
                peculiar_velocity: Some([1.0, 2.0, 3.0]),
                position: Some([4.0, 5.0, 6.0]),
                cluster_id: Some(0),
                ..GalaxyRecord::new(0)
            },
            GalaxyRecord {
                ra: Some(20.0),
                dec: Some(5.0),
                ..GalaxyRecord::new(3)
            },
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_write_table_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("table.csv");

        write_table_csv(&path, &create_test_table()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        assert_eq!(lines[0], "index,ra,dec,distance,velocity,vx,vy,vz,x,y,z,cluster");
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0,10.000000,-5.000000,12.500000"));
        assert!(lines[1].ends_with(",0"));
        assert_eq!(lines[2], "3,20.000000,5.000000,,,,,,,,,");
    }

    #[test]
    fn test_write_table_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("nested").join("table.csv");

        write_table_csv(&path, &GalaxyTable::new()).unwrap();

        assert!(path.exists());
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
    }
}
