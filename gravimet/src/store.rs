//! The dataset store: directory layout, ingestion, persistence, queries.
//!
//! # Design
//!
//! The store is the aggregate root tying the other components together:
//! - owns the dataset directory and the canonical file names inside it
//! - keeps the in-memory metadata table, a mutable mirror of the on-disk
//!   metadata file (authoritative until [`DatasetStore::save`])
//! - merges worksheet rows with parser-extracted fields at ingestion
//! - answers filtered queries, hydrating series data from disk on demand
//!
//! # File Layout
//!
//! ```text
//! dataset_dir/
//! ├── metadata.parquet        <- one row per sample, unified metadata
//! ├── sample_RT12.parquet     <- series table for sample RT12
//! ├── sample_RT13.parquet
//! └── ...
//! ```
//!
//! # Consistency
//!
//! Series writes and metadata saves are deliberately not transactional
//! with each other: a crash between the two leaves a series file on disk
//! without a metadata row. `open` accepts such orphans as drift and does
//! not reclaim them; every invariant is stated in terms of the metadata
//! table pointing at *at most* one series file per row, never the
//! reverse.
//!
//! # Thread Safety
//!
//! The store is designed for single-threaded access. `add_entry` is a
//! read-modify-write of the in-memory table with no internal locking;
//! external serialization is required to share a store across threads.
//!
//! # Example
//!
//! ```rust,no_run
//! use gravimet::DatasetStore;
//!
//! # fn main() -> gravimet::Result<()> {
//! let store = DatasetStore::open("./tga_dataset")?;
//! for hit in store.find("Sample Condition", "Washed", "==")? {
//!     let rows = hit.series.map_or(0, |s| s.row_count());
//!     println!("{}: {rows} data points", hit.record.id);
//! }
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use crate::codec;
use crate::error::{GravimetError, IngestError, QueryError, Result, StoreError};
use crate::model::{MetadataTable, NAME_COLUMN, SampleRecord, SampleSeries};
use crate::query::{self, Condition, Operator, SampleHit};
use crate::samples::{SampleDirectory, SampleFile, SampleParser};
use crate::sheet::SheetSource;

/// Name of the metadata table file in the dataset directory.
const METADATA_FILE: &str = "metadata.parquet";

/// A parsed sample with its resolved worksheet row, ready for
/// [`DatasetStore::add_entry`].
///
/// The parsed fields and the resolved row are kept separate: merging
/// happens in `add_entry`, which re-fetches the row by identifier so that
/// direct `add_entry` calls behave identically.
#[derive(Debug, Clone)]
pub struct PreparedEntry {
    /// The parsed time-series table.
    pub series: SampleSeries,
    /// Metadata fields extracted from the sample file itself.
    pub parsed_metadata: BTreeMap<String, String>,
    /// The worksheet row resolved by identifier (or by the embedded name).
    pub resolved_row: BTreeMap<String, String>,
}

/// Outcome of a batch ingestion.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Identifiers ingested successfully, in ingestion order.
    pub ingested: Vec<String>,
    /// Per-file failures; these were reported and skipped, not fatal.
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    /// Whether every candidate file was ingested.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// One skipped file of a batch ingestion.
#[derive(Debug)]
pub struct IngestFailure {
    /// The sample file that could not be ingested.
    pub path: PathBuf,
    /// Why it was skipped.
    pub error: GravimetError,
}

/// The on-disk dataset: unified metadata table plus one series file per
/// sample.
#[derive(Debug)]
pub struct DatasetStore {
    /// Path to the dataset directory.
    path: PathBuf,
    /// In-memory mirror of the metadata file.
    table: MetadataTable,
    /// Columns declared numeric for query comparisons.
    numeric_columns: BTreeSet<String>,
}

impl DatasetStore {
    /// Opens a dataset directory, creating it if absent.
    ///
    /// An existing `metadata.parquet` is loaded into the in-memory table;
    /// otherwise the table starts empty (no fixed schema — the first
    /// successful [`add_entry`](Self::add_entry) establishes it).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DirectoryAccess`] when the directory cannot
    /// be created and the metadata decoding errors of
    /// [`codec::read_metadata`] when an existing table is unreadable.
    pub fn open<P: AsRef<Path>>(directory: P) -> Result<Self> {
        let path = directory.as_ref().to_path_buf();
        fs::create_dir_all(&path).map_err(|e| StoreError::DirectoryAccess {
            path: path.display().to_string(),
            source: e,
        })?;

        let metadata_path = path.join(METADATA_FILE);
        let table = if metadata_path.exists() {
            codec::read_metadata(&metadata_path)?
        } else {
            MetadataTable::new()
        };

        Ok(Self {
            path,
            table,
            numeric_columns: BTreeSet::new(),
        })
    }

    /// The dataset directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Path of the metadata table file.
    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE)
    }

    /// Path of one sample's series file.
    pub fn series_path(&self, id: &str) -> PathBuf {
        self.path.join(format!("sample_{id}.parquet"))
    }

    /// The in-memory metadata table.
    pub fn metadata(&self) -> &MetadataTable {
        &self.table
    }

    /// Declares a metadata column numeric for query comparisons.
    ///
    /// Cells of a declared column are parsed as `f64` on both sides of a
    /// comparison; a cell that fails to parse never matches. Undeclared
    /// columns compare lexically.
    pub fn declare_numeric_column(&mut self, column: impl Into<String>) {
        self.numeric_columns.insert(column.into());
    }

    /// Writes the in-memory metadata table to `metadata.parquet`,
    /// atomically overwriting any prior version.
    ///
    /// A deliberate no-op when the table is empty: saving an empty table
    /// must never truncate a previously written schema because of a
    /// construction-order accident.
    ///
    /// # Errors
    ///
    /// Returns the encoding and file-system errors of
    /// [`codec::write_metadata`].
    pub fn save(&self) -> Result<()> {
        if self.table.is_empty() {
            return Ok(());
        }
        codec::write_metadata(&self.metadata_path(), &self.table)
    }

    // -----------------------------------------------------------------------
    // Ingestion
    // -----------------------------------------------------------------------

    /// Parses a sample file and resolves its worksheet row.
    ///
    /// The row is looked up by the file's declared identifier first; when
    /// that fails, by the `name` field embedded in the parsed metadata
    /// (for sources whose declared identifier differs from the worksheet
    /// key). Merging is deferred to [`add_entry`](Self::add_entry).
    ///
    /// # Errors
    ///
    /// - [`IngestError::Parse`] when the parser rejects the file
    /// - [`IngestError::MetadataNotFound`] when neither lookup matches;
    ///   the caller must not ingest such an entry
    pub fn prepare_entry(
        &self,
        file: &SampleFile,
        sheet: &SheetSource,
        parser: &dyn SampleParser,
    ) -> Result<PreparedEntry> {
        let (series, parsed_metadata) =
            parser.parse(&file.path).map_err(|source| IngestError::Parse {
                path: file.path.clone(),
                source,
            })?;

        let resolved_row = match sheet.lookup(&file.id) {
            Ok(row) => row,
            Err(by_id) => {
                let by_name = parsed_metadata
                    .get(NAME_COLUMN)
                    .and_then(|name| sheet.lookup(name).ok());
                match by_name {
                    Some(row) => row,
                    None => {
                        tracing::debug!(
                            id = %file.id,
                            error = %by_id,
                            "identifier lookup failed and no row matched the embedded name"
                        );
                        return Err(IngestError::MetadataNotFound {
                            path: file.path.clone(),
                            id: file.id.clone(),
                        }
                        .into());
                    }
                }
            }
        };

        Ok(PreparedEntry {
            series,
            parsed_metadata,
            resolved_row,
        })
    }

    /// Ingests one sample: merges its metadata, persists its series, and
    /// upserts the unified row.
    ///
    /// Steps, in order:
    /// 1. look up the identifier's worksheet row (hard precondition — no
    ///    name fallback here; resolve beforehand via
    ///    [`prepare_entry`](Self::prepare_entry) when fallback is needed)
    /// 2. merge: worksheet row first, `parsed_metadata` overlaid
    ///    (parser wins on collision), identifier forced last
    /// 3. write `sample_<id>.parquet`, fully replacing any prior file
    /// 4. remove any existing row with this identifier, then append the
    ///    merged row (idempotent re-ingestion, no duplicates)
    /// 5. [`save`](Self::save) when `persist` is set
    ///
    /// # Errors
    ///
    /// - [`IngestError::EmptyIdentifier`] for an empty identifier
    /// - [`IngestError::SourceRowMissing`] when the worksheet has no
    ///   unique row for the identifier
    /// - the series encoding errors of [`codec::write_series`]
    pub fn add_entry(
        &mut self,
        series: &SampleSeries,
        id: &str,
        parsed_metadata: &BTreeMap<String, String>,
        sheet: &SheetSource,
        persist: bool,
    ) -> Result<()> {
        if id.is_empty() {
            return Err(IngestError::EmptyIdentifier.into());
        }

        let mut fields = sheet.lookup(id).map_err(|source| IngestError::SourceRowMissing {
            id: id.to_string(),
            source,
        })?;
        fields.extend(
            parsed_metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        let record = SampleRecord::from_fields(id, fields);

        codec::write_series(&self.series_path(id), series)?;
        self.table.upsert(record);

        if persist {
            self.save()?;
        }
        Ok(())
    }

    /// Ingests every candidate file of a sample directory.
    ///
    /// Each file goes through [`prepare_entry`](Self::prepare_entry) and
    /// [`add_entry`](Self::add_entry) with immediate persistence. A file
    /// that fails either step is reported (warning + report entry) and
    /// skipped — one corrupt or unmatched file never blocks the rest.
    ///
    /// # Errors
    ///
    /// Only enumeration itself is fatal
    /// ([`StoreError::DirectoryAccess`]); per-file failures land in the
    /// returned [`IngestReport`].
    pub fn create_dataset(
        &mut self,
        samples: &SampleDirectory,
        sheet: &SheetSource,
        parser: &dyn SampleParser,
    ) -> Result<IngestReport> {
        let files = samples.scan()?;
        let mut report = IngestReport::default();

        for file in files {
            match self.ingest_one(&file, sheet, parser) {
                Ok(()) => report.ingested.push(file.id),
                Err(error) => {
                    tracing::warn!(
                        path = %file.path.display(),
                        %error,
                        "skipping sample file"
                    );
                    report.failures.push(IngestFailure {
                        path: file.path,
                        error,
                    });
                }
            }
        }
        Ok(report)
    }

    fn ingest_one(
        &mut self,
        file: &SampleFile,
        sheet: &SheetSource,
        parser: &dyn SampleParser,
    ) -> Result<()> {
        let prepared = self.prepare_entry(file, sheet, parser)?;
        self.add_entry(
            &prepared.series,
            &file.id,
            &prepared.parsed_metadata,
            sheet,
            true,
        )
    }

    // -----------------------------------------------------------------------
    // Retrieval & query
    // -----------------------------------------------------------------------

    /// Loads one sample's series from disk.
    ///
    /// File presence is the sole source of truth: the metadata table is
    /// never consulted, and nothing is cached; every call re-reads the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::SampleNotFound`] when the series file is
    /// absent, and the decoding errors of [`codec::read_series`]
    /// otherwise.
    pub fn read_series(&self, id: &str) -> Result<SampleSeries> {
        let path = self.series_path(id);
        if !path.exists() {
            return Err(StoreError::SampleNotFound {
                id: id.to_string(),
                path,
            }
            .into());
        }
        codec::read_series(&path)
    }

    /// The metadata row(s) matching an identifier: empty when the table
    /// is empty or nothing matches (not an error).
    pub fn find_metadata(&self, id: &str) -> Vec<SampleRecord> {
        self.table.find(id).into_iter().cloned().collect()
    }

    /// Filters the metadata table by one condition and hydrates the
    /// matching rows.
    ///
    /// The operator is given in string form (`==`, `!=`, `>`, `<`, `>=`,
    /// `<=`). An unsupported operator is reported and downgraded to
    /// equality rather than aborting. Rows hydrate via
    /// [`read_series`](Self::read_series); a row whose series file is
    /// missing yields [`SampleHit`] with `series: None` (with a warning),
    /// and rows with an empty identifier are silently excluded. Results
    /// keep the table's current row order.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ColumnNotFound`] for a column absent from
    /// the table (no results, no fallback), and propagates series
    /// decoding failures.
    pub fn find(&self, column: &str, value: &str, operator: &str) -> Result<Vec<SampleHit>> {
        let op = match operator.parse::<Operator>() {
            Ok(op) => op,
            Err(error) => {
                tracing::warn!(%error, "unsupported operator, falling back to equality");
                Operator::Eq
            }
        };
        if !self.table.has_column(column) {
            return Err(QueryError::ColumnNotFound {
                column: column.to_string(),
            }
            .into());
        }

        let numeric = self.numeric_columns.contains(column);
        let matches: Vec<&SampleRecord> = self
            .table
            .rows()
            .iter()
            .filter(|record| query::cell_matches(record.get(column), value, op, numeric))
            .collect();
        self.hydrate(matches)
    }

    /// Filters the metadata table by a conjunction of conditions and
    /// hydrates the result.
    ///
    /// Conditions apply in the given order to the progressively narrowed
    /// row set. Order cannot change the result set (AND is commutative)
    /// but it makes error reporting deterministic. Unlike
    /// [`find`](Self::find), an invalid operator aborts here: the query
    /// short-circuits on the first unknown column or unsupported operator
    /// it encounters. With no conditions, every row comes back hydrated.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::ColumnNotFound`] or
    /// [`QueryError::UnsupportedOperator`] for the first bad condition,
    /// and propagates series decoding failures.
    pub fn find_all(&self, conditions: &[Condition]) -> Result<Vec<SampleHit>> {
        let mut rows: Vec<&SampleRecord> = self.table.rows().iter().collect();

        for condition in conditions {
            if !self.table.has_column(&condition.column) {
                return Err(QueryError::ColumnNotFound {
                    column: condition.column.clone(),
                }
                .into());
            }
            let op: Operator = condition.operator.parse()?;
            let numeric = self.numeric_columns.contains(condition.column.as_str());
            rows.retain(|record| {
                query::cell_matches(record.get(&condition.column), &condition.value, op, numeric)
            });
        }
        self.hydrate(rows)
    }

    /// Hydrates matching records with their series data.
    fn hydrate(&self, records: Vec<&SampleRecord>) -> Result<Vec<SampleHit>> {
        let mut hits = Vec::with_capacity(records.len());
        for record in records {
            if record.id.is_empty() {
                // No identifier, nothing to hydrate.
                continue;
            }
            let series = match self.read_series(&record.id) {
                Ok(series) => Some(series),
                Err(GravimetError::Store(StoreError::SampleNotFound { .. })) => {
                    tracing::warn!(id = %record.id, "metadata row has no series file");
                    None
                }
                Err(other) => return Err(other),
            };
            hits.push(SampleHit {
                record: record.clone(),
                series,
            });
        }
        Ok(hits)
    }
}
