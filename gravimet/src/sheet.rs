//! Remote worksheet metadata source.
//!
//! The transport that actually reaches the spreadsheet service (auth,
//! HTTP, API quirks) is a black box behind [`SheetTransport`]. This module
//! owns everything above it: the list of available collections, the
//! currently loaded collection as a cleaned header/row table, the
//! configured lookup column, and identifier lookups with strict
//! exactly-one-match semantics.
//!
//! # Initialization is a distinct state
//!
//! A [`SheetSource`] value only exists *initialized* — construction runs
//! `list_collections` first, so no lookup can ever race the collection
//! listing. The fetch may be moved off the caller's thread with
//! [`SheetSource::initialize_background`], which hands the finished source
//! back through a bounded channel; the worker owns the transport and
//! touches no shared state after the handoff. There is no cancellation
//! and no internal timeout; a hanging transport hangs `wait`.
//!
//! # Header cleaning
//!
//! Header names are always stripped of embedded newlines and trimmed when
//! a collection is loaded. Spreadsheet headers wrap freely; the dataset
//! column names must not.

use std::collections::BTreeMap;
use std::fmt;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, TryRecvError, bounded};

use crate::error::{ExternalError, SheetError};
use crate::settings::SourceSettings;

/// Transport contract for the remote spreadsheet service.
///
/// Implementations return rows as string→string mappings keyed by the
/// collection's header row (how headers are detected is the transport's
/// concern). Errors are opaque; gravimet wraps them in
/// [`SheetError::Transport`].
pub trait SheetTransport: Send {
    /// Names of the collections (worksheets) available at the source.
    ///
    /// # Errors
    ///
    /// Any transport-level failure, returned opaquely.
    fn list_collections(&self) -> Result<Vec<String>, ExternalError>;

    /// All rows of one collection, in sheet order.
    ///
    /// # Errors
    ///
    /// Any transport-level failure, returned opaquely.
    fn fetch(&self, collection: &str) -> Result<Vec<BTreeMap<String, String>>, ExternalError>;
}

// ---------------------------------------------------------------------------
// Worksheet
// ---------------------------------------------------------------------------

/// One fetched collection: cleaned column names plus rows.
///
/// An empty or header-less collection loads as an empty worksheet, a
/// valid empty result rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Worksheet {
    name: String,
    columns: Vec<String>,
    rows: Vec<BTreeMap<String, String>>,
}

/// Strips embedded newlines from a header name and trims it.
fn clean_header(raw: &str) -> String {
    raw.replace('\n', "").trim().to_string()
}

impl Worksheet {
    /// Builds a worksheet from transport records, cleaning every header.
    ///
    /// Column names come from the first record; headers that clean to the
    /// empty string are dropped, and a record set with no usable headers
    /// degrades to an empty worksheet.
    pub fn from_records(name: impl Into<String>, records: Vec<BTreeMap<String, String>>) -> Self {
        let name = name.into();
        let Some(first) = records.first() else {
            return Self {
                name,
                columns: Vec::new(),
                rows: Vec::new(),
            };
        };

        let mut columns: Vec<String> = first
            .keys()
            .map(|key| clean_header(key))
            .filter(|key| !key.is_empty())
            .collect();
        columns.sort_unstable();
        columns.dedup();
        if columns.is_empty() {
            return Self {
                name,
                columns: Vec::new(),
                rows: Vec::new(),
            };
        }

        let rows = records
            .into_iter()
            .map(|record| {
                record
                    .into_iter()
                    .filter_map(|(key, value)| {
                        let key = clean_header(&key);
                        (!key.is_empty()).then_some((key, value))
                    })
                    .collect()
            })
            .collect();

        Self {
            name,
            columns,
            rows,
        }
    }

    /// The collection name this worksheet was fetched from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cleaned column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// All rows, keyed by cleaned column names.
    pub fn rows(&self) -> &[BTreeMap<String, String>] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the worksheet has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ---------------------------------------------------------------------------
// SheetSource
// ---------------------------------------------------------------------------

/// The worksheet metadata source consumed by the dataset store.
///
/// Holds the transport, the collection listing obtained at initialization,
/// at most one loaded collection, and the lookup column used by
/// [`lookup`](Self::lookup).
pub struct SheetSource {
    transport: Box<dyn SheetTransport>,
    collections: Vec<String>,
    worksheet: Option<Worksheet>,
    lookup_column: String,
}

impl fmt::Debug for SheetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetSource")
            .field("collections", &self.collections)
            .field("worksheet", &self.worksheet)
            .field("lookup_column", &self.lookup_column)
            .finish_non_exhaustive()
    }
}

impl SheetSource {
    /// Initializes the source synchronously: lists the available
    /// collections through the transport.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Transport`] when the listing fails.
    pub fn initialize(transport: Box<dyn SheetTransport>) -> Result<Self, SheetError> {
        let collections = transport
            .list_collections()
            .map_err(|source| SheetError::Transport { source })?;
        Ok(Self {
            transport,
            collections,
            worksheet: None,
            lookup_column: String::new(),
        })
    }

    /// Initializes the source on a background worker thread.
    ///
    /// The worker owns the transport, performs the collection listing, and
    /// hands the finished [`SheetSource`] (or the error) back through the
    /// returned [`SheetInit`]. The caller polls
    /// [`try_finish`](SheetInit::try_finish) or blocks on
    /// [`wait`](SheetInit::wait). No cancellation is supported; a hanging
    /// transport hangs `wait`.
    pub fn initialize_background(transport: Box<dyn SheetTransport>) -> SheetInit {
        let (sender, receiver) = bounded(1);
        let spawn_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name("gravimet-sheet-init".to_string())
            .spawn(move || {
                let outcome = SheetSource::initialize(transport);
                let _ = sender.send(outcome);
            });

        let handle = match spawned {
            Ok(handle) => Some(handle),
            Err(e) => {
                let _ = spawn_sender.send(Err(SheetError::InitializationFailed {
                    reason: format!("failed to spawn worker thread: {e}"),
                }));
                None
            }
        };
        SheetInit { receiver, handle }
    }

    /// Names of the collections available at the source.
    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// The currently loaded collection name, if any.
    pub fn collection_name(&self) -> Option<&str> {
        self.worksheet.as_ref().map(Worksheet::name)
    }

    /// Column names of the loaded collection (empty before any load).
    pub fn columns(&self) -> &[String] {
        self.worksheet.as_ref().map_or(&[], Worksheet::columns)
    }

    /// Fetches a collection and makes it the active worksheet.
    ///
    /// A previously configured lookup column is kept when the new
    /// collection still has it; otherwise the lookup column defaults to
    /// the first header. An empty collection loads as a valid empty
    /// worksheet (with a warning).
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::CollectionNotFound`] for names missing from
    /// the collection listing and [`SheetError::Transport`] when the fetch
    /// fails.
    pub fn load_collection(&mut self, name: &str) -> Result<(), SheetError> {
        if !self.collections.iter().any(|c| c == name) {
            return Err(SheetError::CollectionNotFound {
                name: name.to_string(),
            });
        }
        let records = self
            .transport
            .fetch(name)
            .map_err(|source| SheetError::Transport { source })?;
        let worksheet = Worksheet::from_records(name, records);
        if worksheet.is_empty() {
            tracing::warn!(collection = name, "collection is empty or has no usable headers");
        }
        if !worksheet.columns().contains(&self.lookup_column) {
            self.lookup_column = worksheet.columns().first().cloned().unwrap_or_default();
        }
        self.worksheet = Some(worksheet);
        Ok(())
    }

    /// The column identifiers are matched against.
    pub fn lookup_column(&self) -> &str {
        &self.lookup_column
    }

    /// Sets the lookup column.
    ///
    /// The column is not validated against the loaded worksheet (it may be
    /// configured before a load); looking up against a column the
    /// worksheet lacks yields [`SheetError::NoMatch`].
    pub fn set_lookup_column(&mut self, column: impl Into<String>) {
        self.lookup_column = column.into();
    }

    /// Returns the single row whose lookup-column value equals `id`.
    ///
    /// # Errors
    ///
    /// - [`SheetError::NoCollectionLoaded`] before any collection is loaded
    /// - [`SheetError::LookupColumnUnset`] when no lookup column is set
    /// - [`SheetError::NoMatch`] when no row matches
    /// - [`SheetError::AmbiguousMatch`] when more than one row matches
    pub fn lookup(&self, id: &str) -> Result<BTreeMap<String, String>, SheetError> {
        let worksheet = self.worksheet.as_ref().ok_or(SheetError::NoCollectionLoaded)?;
        if self.lookup_column.is_empty() {
            return Err(SheetError::LookupColumnUnset);
        }
        let mut matches = worksheet
            .rows()
            .iter()
            .filter(|row| row.get(&self.lookup_column).is_some_and(|v| v == id));
        match (matches.next(), matches.next()) {
            (Some(row), None) => Ok(row.clone()),
            (None, _) => Err(SheetError::NoMatch {
                id: id.to_string(),
                column: self.lookup_column.clone(),
            }),
            (Some(_), Some(_)) => Err(SheetError::AmbiguousMatch {
                id: id.to_string(),
                column: self.lookup_column.clone(),
                count: 2 + matches.count(),
            }),
        }
    }

    /// The lookup-column value of the first row, if any.
    ///
    /// Handy for probing whether a freshly loaded sheet matches the
    /// dataset at all.
    pub fn first_id(&self) -> Option<&str> {
        if self.lookup_column.is_empty() {
            return None;
        }
        self.worksheet
            .as_ref()?
            .rows()
            .first()
            .and_then(|row| row.get(&self.lookup_column))
            .map(String::as_str)
    }

    /// Re-applies persisted settings: loads the remembered collection when
    /// it still exists and restores the remembered lookup column when it
    /// is still a valid header (otherwise the first header stays).
    ///
    /// A remembered collection that no longer exists is skipped with a
    /// warning rather than failing the restore.
    ///
    /// # Errors
    ///
    /// Returns [`SheetError::Transport`] when fetching the remembered
    /// collection fails.
    pub fn restore(&mut self, settings: &SourceSettings) -> Result<(), SheetError> {
        let Some(collection) = settings.collection.as_deref() else {
            return Ok(());
        };
        if !self.collections.iter().any(|c| c == collection) {
            tracing::warn!(collection, "remembered collection no longer exists, skipping restore");
            return Ok(());
        }
        self.load_collection(collection)?;
        if let Some(lookup) = settings.lookup_column.as_deref()
            && self.columns().iter().any(|c| c == lookup)
        {
            self.lookup_column = lookup.to_string();
        }
        Ok(())
    }

    /// Writes the current collection and lookup column into `settings`.
    pub fn remember(&self, settings: &mut SourceSettings) {
        settings.collection = self.collection_name().map(str::to_string);
        settings.lookup_column =
            (!self.lookup_column.is_empty()).then(|| self.lookup_column.clone());
    }
}

// ---------------------------------------------------------------------------
// SheetInit
// ---------------------------------------------------------------------------

/// Handle to an in-flight background initialization.
///
/// Produces the initialized [`SheetSource`] exactly once, through
/// [`try_finish`](Self::try_finish) or [`wait`](Self::wait).
#[derive(Debug)]
pub struct SheetInit {
    receiver: Receiver<Result<SheetSource, SheetError>>,
    handle: Option<JoinHandle<()>>,
}

impl SheetInit {
    /// Polls for the initialization outcome without blocking.
    ///
    /// Returns `None` while the worker is still running, and the outcome
    /// once it finished. A worker that died without handing off a result
    /// (panicked transport) yields [`SheetError::InitializationFailed`].
    pub fn try_finish(&mut self) -> Option<Result<SheetSource, SheetError>> {
        match self.receiver.try_recv() {
            Ok(outcome) => {
                self.join_worker();
                Some(outcome)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.join_worker();
                Some(Err(SheetError::InitializationFailed {
                    reason: "worker exited without a result".to_string(),
                }))
            }
        }
    }

    /// Blocks until the worker hands off the initialization outcome.
    ///
    /// # Errors
    ///
    /// Returns the worker's error, or
    /// [`SheetError::InitializationFailed`] when the worker died without
    /// handing off a result.
    pub fn wait(mut self) -> Result<SheetSource, SheetError> {
        let outcome = self.receiver.recv().unwrap_or_else(|_| {
            Err(SheetError::InitializationFailed {
                reason: "worker exited without a result".to_string(),
            })
        });
        self.join_worker();
        outcome
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// In-memory transport for tests.
    struct FakeTransport {
        collections: Vec<String>,
        records: Vec<BTreeMap<String, String>>,
        fail_listing: bool,
    }

    impl FakeTransport {
        fn new(rows: &[&[(&str, &str)]]) -> Self {
            let records = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect();
            Self {
                collections: vec!["Melting Behaviour".to_string(), "Empty".to_string()],
                records,
                fail_listing: false,
            }
        }
    }

    impl SheetTransport for FakeTransport {
        fn list_collections(&self) -> Result<Vec<String>, ExternalError> {
            if self.fail_listing {
                return Err("service unavailable".into());
            }
            Ok(self.collections.clone())
        }

        fn fetch(&self, collection: &str) -> Result<Vec<BTreeMap<String, String>>, ExternalError> {
            if collection == "Empty" {
                return Ok(Vec::new());
            }
            Ok(self.records.clone())
        }
    }

    fn source_with(rows: &[&[(&str, &str)]]) -> SheetSource {
        let mut source = SheetSource::initialize(Box::new(FakeTransport::new(rows))).unwrap();
        source.load_collection("Melting Behaviour").unwrap();
        source
    }

    #[test]
    fn initialize_lists_collections() {
        let source = SheetSource::initialize(Box::new(FakeTransport::new(&[]))).unwrap();
        assert_eq!(source.collections(), ["Melting Behaviour", "Empty"]);
        assert!(source.collection_name().is_none());
    }

    #[test]
    fn lookup_before_load_fails() {
        let source = SheetSource::initialize(Box::new(FakeTransport::new(&[]))).unwrap();
        assert!(matches!(
            source.lookup("RT12"),
            Err(SheetError::NoCollectionLoaded)
        ));
    }

    #[test]
    fn unknown_collection_is_rejected() {
        let mut source = SheetSource::initialize(Box::new(FakeTransport::new(&[]))).unwrap();
        assert!(matches!(
            source.load_collection("Sintering"),
            Err(SheetError::CollectionNotFound { name }) if name == "Sintering"
        ));
    }

    #[test]
    fn headers_are_cleaned_unconditionally() {
        let source = source_with(&[&[
            ("TGA\nIdentifier", "RT12"),
            (" Sample Condition ", "Washed"),
        ]]);
        assert_eq!(source.columns(), ["Sample Condition", "TGAIdentifier"]);
    }

    #[test]
    fn empty_collection_is_a_valid_empty_worksheet() {
        let mut source = SheetSource::initialize(Box::new(FakeTransport::new(&[]))).unwrap();
        source.load_collection("Empty").unwrap();
        assert_eq!(source.collection_name(), Some("Empty"));
        assert!(source.columns().is_empty());
        assert!(matches!(
            source.lookup("RT12"),
            Err(SheetError::LookupColumnUnset)
        ));
    }

    #[test]
    fn lookup_requires_exactly_one_match() {
        let mut source = source_with(&[
            &[("TGA Identifier", "RT12"), ("Temp", "300")],
            &[("TGA Identifier", "RT13"), ("Temp", "450")],
            &[("TGA Identifier", "RT13"), ("Temp", "600")],
        ]);
        source.set_lookup_column("TGA Identifier");

        let row = source.lookup("RT12").unwrap();
        assert_eq!(row.get("Temp").map(String::as_str), Some("300"));

        assert!(matches!(
            source.lookup("RT99"),
            Err(SheetError::NoMatch { .. })
        ));
        assert!(matches!(
            source.lookup("RT13"),
            Err(SheetError::AmbiguousMatch { count: 2, .. })
        ));
    }

    #[test]
    fn load_defaults_lookup_column_to_first_header() {
        let source = source_with(&[&[("Beta", "1"), ("Alpha", "2")]]);
        assert_eq!(source.lookup_column(), "Alpha");
    }

    #[test]
    fn configured_lookup_column_survives_reload() {
        let mut source = source_with(&[&[("Beta", "1"), ("Alpha", "2")]]);
        source.set_lookup_column("Beta");
        source.load_collection("Melting Behaviour").unwrap();
        assert_eq!(source.lookup_column(), "Beta");
    }

    #[test]
    fn first_id_reads_the_lookup_column() {
        let mut source = source_with(&[
            &[("TGA Identifier", "RT12")],
            &[("TGA Identifier", "RT13")],
        ]);
        source.set_lookup_column("TGA Identifier");
        assert_eq!(source.first_id(), Some("RT12"));
    }

    #[test]
    fn remember_and_restore_round_trip() {
        let mut settings = SourceSettings::new();
        {
            let mut source = source_with(&[&[("TGA Identifier", "RT12"), ("Temp", "300")]]);
            source.set_lookup_column("TGA Identifier");
            source.remember(&mut settings);
        }
        assert_eq!(settings.collection.as_deref(), Some("Melting Behaviour"));

        let mut fresh = SheetSource::initialize(Box::new(FakeTransport::new(&[&[
            ("TGA Identifier", "RT12"),
            ("Temp", "300"),
        ]])))
        .unwrap();
        fresh.restore(&settings).unwrap();
        assert_eq!(fresh.collection_name(), Some("Melting Behaviour"));
        assert_eq!(fresh.lookup_column(), "TGA Identifier");
    }

    #[test]
    fn restore_skips_vanished_collection() {
        let mut settings = SourceSettings::new();
        settings.collection = Some("Sintering".to_string());

        let mut source = SheetSource::initialize(Box::new(FakeTransport::new(&[]))).unwrap();
        source.restore(&settings).unwrap();
        assert!(source.collection_name().is_none());
    }

    #[test]
    fn background_initialization_hands_off_the_source() {
        let init = SheetSource::initialize_background(Box::new(FakeTransport::new(&[&[
            ("TGA Identifier", "RT12"),
        ]])));
        let source = init.wait().unwrap();
        assert_eq!(source.collections(), ["Melting Behaviour", "Empty"]);
    }

    #[test]
    fn background_initialization_reports_transport_failure() {
        let transport = FakeTransport {
            collections: Vec::new(),
            records: Vec::new(),
            fail_listing: true,
        };
        let mut init = SheetSource::initialize_background(Box::new(transport));
        // Poll until the worker hands off its outcome.
        let outcome = loop {
            if let Some(outcome) = init.try_finish() {
                break outcome;
            }
            std::thread::sleep(std::time::Duration::from_millis(1));
        };
        assert!(matches!(outcome, Err(SheetError::Transport { .. })));
    }
}
