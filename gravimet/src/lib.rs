//! # gravimet
//!
//! Columnar dataset store for thermogravimetric analysis runs.
//!
//! gravimet merges two heterogeneous sources (per-sample measurement
//! files and a remote spreadsheet of experiment metadata) into one
//! consistent on-disk dataset: a unified Parquet metadata table plus one
//! Parquet series file per sample, with a filtered query layer on top.
//!
//! The pieces the lab already has stay external: the spreadsheet
//! transport (auth, HTTP) lives behind [`SheetTransport`], and the
//! instrument-file parser behind [`SampleParser`]. gravimet owns
//! everything between those seams and the files on disk.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use gravimet::{Condition, DatasetStore, SampleDirectory, SheetSource};
//! # use gravimet::{SampleParser, SampleSeries, SheetTransport};
//! # use std::collections::BTreeMap;
//! # use std::path::Path;
//! # struct Gspread;
//! # impl SheetTransport for Gspread {
//! #     fn list_collections(&self) -> Result<Vec<String>, gravimet::ExternalError> {
//! #         Ok(vec![])
//! #     }
//! #     fn fetch(
//! #         &self,
//! #         _: &str,
//! #     ) -> Result<Vec<BTreeMap<String, String>>, gravimet::ExternalError> {
//! #         Ok(vec![])
//! #     }
//! # }
//! # struct TgaExportParser;
//! # impl SampleParser for TgaExportParser {
//! #     fn parse(
//! #         &self,
//! #         _: &Path,
//! #     ) -> Result<(SampleSeries, BTreeMap<String, String>), gravimet::ExternalError> {
//! #         Ok((SampleSeries::new(), BTreeMap::new()))
//! #     }
//! # }
//!
//! # fn main() -> gravimet::Result<()> {
//! // Initialize the worksheet source (the transport is yours).
//! let mut sheet = SheetSource::initialize(Box::new(Gspread))?;
//! sheet.load_collection("Melting Behaviour")?;
//! sheet.set_lookup_column("TGA Identifier");
//!
//! // Assemble the dataset from a directory of instrument exports.
//! let mut store = DatasetStore::open("./tga_dataset")?;
//! let report = store.create_dataset(
//!     &SampleDirectory::new("./tga_exports"),
//!     &sheet,
//!     &TgaExportParser,
//! )?;
//! println!("{} ingested, {} skipped", report.ingested.len(), report.failures.len());
//!
//! // Query it.
//! let washed = store.find("Sample Condition", "Washed", "==")?;
//! let hot = store.find_all(&[
//!     Condition::new("Sample Condition", "==", "Washed"),
//!     Condition::new("Temp", ">", "300"),
//! ])?;
//! # let _ = (washed, hot);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`store`] — dataset lifecycle, ingestion, retrieval, queries
//! - [`model`] — sample records, series tables, the metadata table
//! - [`query`] — operators, conditions, comparison policy
//! - [`codec`] — Parquet encoding of the on-disk layout
//! - [`sheet`] — remote worksheet source and background initialization
//! - [`samples`] — sample-file enumeration and the parser contract
//! - [`settings`] — persisted source settings
//! - [`error`] — error types

pub mod codec;
pub mod error;
pub mod model;
pub mod query;
pub mod samples;
pub mod settings;
pub mod sheet;
pub mod store;

// Re-export primary API types at crate root for convenience.
pub use error::{
    ExternalError, GravimetError, IngestError, QueryError, Result, SettingsError, SheetError,
    StoreError,
};
pub use model::{ID_COLUMN, MetadataTable, NAME_COLUMN, SampleRecord, SampleSeries, SeriesColumn};
pub use query::{Condition, Operator, SampleHit};
pub use samples::{SampleDirectory, SampleFile, SampleParser};
pub use settings::SourceSettings;
pub use sheet::{SheetInit, SheetSource, SheetTransport, Worksheet};
pub use store::{DatasetStore, IngestFailure, IngestReport, PreparedEntry};
