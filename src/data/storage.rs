//! Reading writers with clean feature flag handling.
//!
//! `SAVE_DATA` hands the accumulated readings to a [`ReadingWriter`]. The CSV
//! writer takes its header from the keys of the first reading; later readings
//! are written against that header (missing fields become empty cells, fields
//! not in the header are dropped).
use crate::core::Reading;
use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Result of a save request.
#[derive(Debug, Clone, PartialEq)]
pub enum SaveOutcome {
    /// Readings were written to `path`.
    Saved {
        /// File that was written
        path: PathBuf,
        /// Data rows, header excluded
        rows: usize,
    },
    /// There were no readings, nothing was written.
    NothingToSave,
}

/// Persistence collaborator used by `SAVE_DATA`.
#[async_trait]
pub trait ReadingWriter: Send + Sync {
    /// Persist `readings` under `destination`.
    async fn write_readings(&self, destination: &str, readings: &[Reading]) -> Result<SaveOutcome>;
}

/// Resolve `destination` against an optional base directory.
fn resolve_destination(output_dir: Option<&Path>, destination: &str) -> PathBuf {
    let path = PathBuf::from(destination);
    match output_dir {
        Some(dir) if path.is_relative() => dir.join(path),
        _ => path,
    }
}

// ============================================================================
// CSV Writer
// ============================================================================

#[cfg(feature = "storage_csv")]
mod csv_enabled {
    use super::*;
    use anyhow::Context;

    /// Writes readings as comma-separated rows with a header line.
    #[derive(Debug, Default, Clone)]
    pub struct CsvWriter {
        output_dir: Option<PathBuf>,
    }

    impl CsvWriter {
        /// Writer resolving relative destinations against the working directory.
        pub fn new() -> Self {
            Self { output_dir: None }
        }

        /// Relative destinations are placed under `dir`.
        pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
            Self {
                output_dir: Some(dir.into()),
            }
        }

        /// Where `destination` will be written.
        pub fn resolve(&self, destination: &str) -> PathBuf {
            resolve_destination(self.output_dir.as_deref(), destination)
        }
    }

    #[async_trait]
    impl ReadingWriter for CsvWriter {
        async fn write_readings(&self, destination: &str, readings: &[Reading]) -> Result<SaveOutcome> {
            let Some(first) = readings.first() else {
                tracing::debug!(destination, "No readings, skipping CSV write");
                return Ok(SaveOutcome::NothingToSave);
            };

            let path = self.resolve(destination);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create storage directory at {:?}", parent)
                    })?;
                }
            }

            let mut writer = csv::Writer::from_path(&path)
                .with_context(|| format!("Failed to create CSV file at {:?}", path))?;

            let header: Vec<&str> = first.keys().collect();
            writer
                .write_record(&header)
                .context("Failed to write CSV header")?;

            for reading in readings {
                let row: Vec<String> = header
                    .iter()
                    .map(|key| reading.get(key).map(ToString::to_string).unwrap_or_default())
                    .collect();
                writer
                    .write_record(&row)
                    .context("Failed to write reading to CSV file")?;
            }
            writer.flush().context("Failed to flush CSV writer")?;

            tracing::info!(rows = readings.len(), path = %path.display(), "CSV data written");
            Ok(SaveOutcome::Saved {
                path,
                rows: readings.len(),
            })
        }
    }
}

#[cfg(not(feature = "storage_csv"))]
mod csv_disabled {
    use super::*;
    use crate::error::SequenceError;

    /// Placeholder when built without `storage_csv`; every write fails.
    pub struct CsvWriter {
        output_dir: Option<PathBuf>,
    }

    impl CsvWriter {
        /// Writer resolving relative destinations against the working directory.
        pub fn new() -> Self {
            Self { output_dir: None }
        }

        /// Relative destinations are placed under `dir`.
        pub fn with_output_dir(dir: impl Into<PathBuf>) -> Self {
            Self {
                output_dir: Some(dir.into()),
            }
        }

        /// Where `destination` would be written.
        pub fn resolve(&self, destination: &str) -> PathBuf {
            resolve_destination(self.output_dir.as_deref(), destination)
        }
    }

    impl Default for CsvWriter {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl ReadingWriter for CsvWriter {
        async fn write_readings(&self, _destination: &str, _readings: &[Reading]) -> Result<SaveOutcome> {
            Err(SequenceError::FeatureNotEnabled("storage_csv".to_string()).into())
        }
    }
}

#[cfg(feature = "storage_csv")]
pub use csv_enabled::CsvWriter;

#[cfg(not(feature = "storage_csv"))]
pub use csv_disabled::CsvWriter;
