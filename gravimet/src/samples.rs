//! Sample-file enumeration and the parser contract.
//!
//! A measurement campaign leaves one export file per run in a flat
//! directory; the file stem is the run's identifier. Turning one such
//! file into a typed series plus its embedded header fields is the job of
//! an external parser behind [`SampleParser`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{ExternalError, Result, StoreError};
use crate::model::SampleSeries;

/// One candidate sample file: its path and declared identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleFile {
    /// Path to the measurement export file.
    pub path: PathBuf,
    /// The identifier extracted from the file name (the stem).
    pub id: String,
}

/// Parser contract for a single measurement file.
///
/// Given a file path, a parser produces the typed time-series table plus
/// whatever metadata fields the file header embeds (e.g. `name`,
/// `operator`, instrument program). Parser errors are opaque; ingestion
/// wraps them per file and moves on.
pub trait SampleParser {
    /// Parses one file into its series and embedded metadata.
    ///
    /// # Errors
    ///
    /// Any parse failure, returned opaquely.
    fn parse(
        &self,
        path: &Path,
    ) -> std::result::Result<(SampleSeries, BTreeMap<String, String>), ExternalError>;
}

/// Enumerates candidate sample files in a directory.
///
/// The scan is flat (no recursion — campaign exports land in one
/// directory) and matches on file extension, case-insensitively. Results
/// come back sorted by identifier so batch ingestion is deterministic.
#[derive(Debug, Clone)]
pub struct SampleDirectory {
    path: PathBuf,
    extension: String,
}

impl SampleDirectory {
    /// Creates a scanner for the given directory, matching `.txt` files.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            extension: "txt".to_string(),
        }
    }

    /// Changes the matched file extension (without the leading dot).
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// The scanned directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the matching sample files, sorted by identifier.
    ///
    /// A file whose stem is empty has no identifier; that is an error
    /// condition for the file, reported with a warning and excluded from
    /// the listing (never silently ingested).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirectoryAccess`] when the directory cannot
    /// be read.
    pub fn scan(&self) -> Result<Vec<SampleFile>> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| StoreError::DirectoryAccess {
            path: self.path.display().to_string(),
            source: e,
        })?;

        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::DirectoryAccess {
                path: self.path.display().to_string(),
                source: e,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let matches_extension = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case(&self.extension));
            if !matches_extension {
                continue;
            }
            let id = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .unwrap_or_default()
                .to_string();
            if id.is_empty() {
                tracing::warn!(path = %path.display(), "sample file has no identifier, skipping");
                continue;
            }
            files.push(SampleFile { path, id });
        }

        files.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(files)
    }
}
