//! Error types for the gravimet dataset store.

use std::path::PathBuf;

use thiserror::Error;

/// Opaque error produced by an external collaborator (transport or parser).
pub type ExternalError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The main error type for all gravimet operations.
///
/// This enum covers all error conditions that can occur from dataset
/// creation through ingestion, persistence, and querying. No gravimet
/// error terminates the process; batch operations report per-entry
/// failures and continue (see [`crate::store::IngestReport`]).
#[derive(Error, Debug)]
pub enum GravimetError {
    /// Error in store lifecycle or on-disk persistence.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Error while ingesting a single sample entry.
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestError),

    /// Error during a metadata query.
    #[error("query error: {0}")]
    Query(#[from] QueryError),

    /// Error in the remote worksheet source.
    #[error("sheet error: {0}")]
    Sheet(#[from] SheetError),

    /// Error loading or saving persisted source settings.
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),
}

/// Errors raised by store lifecycle and on-disk persistence.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The dataset directory (or a file inside it) could not be accessed.
    #[error("failed to access '{path}': {source}")]
    DirectoryAccess {
        /// The path that could not be accessed.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// No series file exists for the requested sample.
    ///
    /// File presence is the sole source of truth for this condition; the
    /// metadata table is never consulted.
    #[error("sample '{id}' not found (no series file at '{}')", path.display())]
    SampleNotFound {
        /// The sample identifier that was requested.
        id: String,
        /// The series file path that was probed.
        path: PathBuf,
    },

    /// The metadata table file could not be decoded.
    #[error("failed to read metadata table '{}': {source}", path.display())]
    MetadataRead {
        /// The metadata file path.
        path: PathBuf,
        /// The underlying Parquet error.
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// The metadata table file could not be encoded or written.
    #[error("failed to write metadata table '{}': {source}", path.display())]
    MetadataWrite {
        /// The metadata file path.
        path: PathBuf,
        /// The underlying Parquet error.
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// A per-sample series file could not be decoded.
    #[error("failed to read series file '{}': {source}", path.display())]
    SeriesRead {
        /// The series file path.
        path: PathBuf,
        /// The underlying Parquet error.
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// A per-sample series file could not be encoded or written.
    #[error("failed to write series file '{}': {source}", path.display())]
    SeriesWrite {
        /// The series file path.
        path: PathBuf,
        /// The underlying Parquet error.
        #[source]
        source: parquet::errors::ParquetError,
    },

    /// A series table is not writable as a columnar file.
    #[error("invalid series table: {reason}")]
    InvalidSeries {
        /// Description of the shape problem (ragged or empty columns).
        reason: String,
    },

    /// A persisted table exists but cannot be interpreted.
    #[error("corrupted table '{}': {reason}", path.display())]
    CorruptedTable {
        /// The offending file path.
        path: PathBuf,
        /// Description of what was invalid.
        reason: String,
    },
}

/// Errors raised while ingesting a single sample entry.
///
/// During batch ingestion these are fatal to the one entry only; the batch
/// reports them and continues.
#[derive(Error, Debug)]
pub enum IngestError {
    /// No metadata-source row matched the sample file, by declared
    /// identifier or by the file's embedded name.
    #[error("no metadata row matched sample file '{}' (id '{id}')", path.display())]
    MetadataNotFound {
        /// The sample file whose metadata could not be resolved.
        path: PathBuf,
        /// The declared identifier that was looked up.
        id: String,
    },

    /// The metadata source has no (unique) row for the identifier.
    ///
    /// Raised by `add_entry`, which looks up strictly by identifier and,
    /// unlike `prepare_entry`, never falls back to the embedded name.
    #[error("metadata source has no row for sample '{id}': {source}")]
    SourceRowMissing {
        /// The identifier that was looked up.
        id: String,
        /// The lookup failure from the worksheet source.
        #[source]
        source: SheetError,
    },

    /// The sample identifier is empty.
    #[error("sample identifier is empty")]
    EmptyIdentifier,

    /// The sample file could not be parsed.
    #[error("failed to parse sample file '{}': {source}", path.display())]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// The parser's error.
        #[source]
        source: ExternalError,
    },
}

/// Errors raised during metadata queries.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The query references a column absent from the metadata table.
    #[error("column '{column}' not found in metadata table")]
    ColumnNotFound {
        /// The unknown column name.
        column: String,
    },

    /// The comparison operator is not one of `==` `!=` `>` `<` `>=` `<=`.
    ///
    /// `find` downgrades this to equality with a warning; `find_all`
    /// aborts the query with it.
    #[error("unsupported comparison operator '{operator}'")]
    UnsupportedOperator {
        /// The operator string as given.
        operator: String,
    },
}

/// Errors raised by the remote worksheet source.
#[derive(Error, Debug)]
pub enum SheetError {
    /// The transport failed to reach the remote source.
    #[error("worksheet transport failed: {source}")]
    Transport {
        /// The transport's opaque error.
        #[source]
        source: ExternalError,
    },

    /// The named collection is not among the available collections.
    #[error("collection '{name}' not found in available collections")]
    CollectionNotFound {
        /// The requested collection name.
        name: String,
    },

    /// A lookup or column query was issued before any collection was loaded.
    #[error("no collection loaded")]
    NoCollectionLoaded,

    /// A lookup was issued with no lookup column configured.
    #[error("no lookup column configured")]
    LookupColumnUnset,

    /// No row matched the identifier in the lookup column.
    #[error("no row for id '{id}' in column '{column}'")]
    NoMatch {
        /// The identifier that was looked up.
        id: String,
        /// The lookup column that was filtered.
        column: String,
    },

    /// More than one row matched the identifier in the lookup column.
    #[error("{count} rows for id '{id}' in column '{column}', expected exactly one")]
    AmbiguousMatch {
        /// The identifier that was looked up.
        id: String,
        /// The lookup column that was filtered.
        column: String,
        /// How many rows matched.
        count: usize,
    },

    /// The background initialization worker died before handing off a result.
    #[error("background initialization failed: {reason}")]
    InitializationFailed {
        /// Description of the failure.
        reason: String,
    },
}

/// Errors raised while loading or saving persisted source settings.
#[derive(Error, Debug)]
pub enum SettingsError {
    /// Failed to read the settings file.
    #[error("failed to load settings from '{}': {source}", path.display())]
    Load {
        /// The settings file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse the settings file as JSON.
    #[error("failed to parse settings from '{}': {source}", path.display())]
    Parse {
        /// The settings file path.
        path: PathBuf,
        /// The underlying JSON parsing error.
        #[source]
        source: serde_json::Error,
    },

    /// Failed to write the settings file.
    #[error("failed to save settings to '{}': {source}", path.display())]
    Save {
        /// The settings file path.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize the settings to JSON.
    #[error("failed to serialize settings: {source}")]
    Serialize {
        /// The underlying JSON serialization error.
        #[source]
        source: serde_json::Error,
    },
}

/// Type alias for `Result<T, GravimetError>`.
pub type Result<T> = std::result::Result<T, GravimetError>;
