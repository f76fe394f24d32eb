//! In-memory data model: sample records, series tables, and the unified
//! metadata table.
//!
//! Metadata columns vary by dataset (the remote worksheet contributes an
//! arbitrary set of columns, and each sample file contributes its own
//! header fields), so a row is modeled as a small fixed subset of known
//! fields plus an open extension mapping of the remaining string-typed
//! fields. The identifier column is always present and always named
//! [`ID_COLUMN`].

use std::collections::BTreeMap;

/// Name of the identifier column in every metadata row.
pub const ID_COLUMN: &str = "id";

/// Name of the optional sample-name column.
///
/// When a sample file embeds a `name` field it is promoted to the typed
/// [`SampleRecord::name`] slot; ingestion also uses it as the fallback
/// lookup key when the declared identifier has no worksheet row.
pub const NAME_COLUMN: &str = "name";

// ---------------------------------------------------------------------------
// SampleRecord
// ---------------------------------------------------------------------------

/// One row of the unified metadata table.
///
/// A record merges the remote worksheet row for a sample with the fields
/// extracted from the sample file itself; parser-extracted fields win on
/// key collision, and the identifier is forced to the canonical value
/// last. Records are replaced whole on re-ingestion, never patched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SampleRecord {
    /// The sample identifier, the join key between all sources.
    pub id: String,
    /// The embedded sample name, when the source file declared one.
    pub name: Option<String>,
    /// All remaining metadata fields, ordered by column name.
    pub extra: BTreeMap<String, String>,
}

impl SampleRecord {
    /// Creates an empty record for the given identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            extra: BTreeMap::new(),
        }
    }

    /// Builds a record from a merged field mapping.
    ///
    /// The `id` and `name` keys are promoted to their typed slots; the
    /// identifier argument wins over any `id` value in the mapping.
    pub fn from_fields(id: impl Into<String>, mut fields: BTreeMap<String, String>) -> Self {
        fields.remove(ID_COLUMN);
        let name = fields.remove(NAME_COLUMN);
        Self {
            id: id.into(),
            name,
            extra: fields,
        }
    }

    /// Returns the value of a column, if this record has one.
    ///
    /// The typed `id` and `name` slots are addressable by their column
    /// names like any other field.
    pub fn get(&self, column: &str) -> Option<&str> {
        match column {
            ID_COLUMN => Some(&self.id),
            NAME_COLUMN => self.name.as_deref(),
            _ => self.extra.get(column).map(String::as_str),
        }
    }
}

// ---------------------------------------------------------------------------
// SampleSeries
// ---------------------------------------------------------------------------

/// One named column of a series table.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesColumn {
    /// Column name (e.g. `time_s`, `mass_mg`, `temperature_c`).
    pub name: String,
    /// Column values.
    pub values: Vec<f64>,
}

/// The time-series table for one sample.
///
/// A series is owned exclusively by its sample's on-disk file: it is
/// created or overwritten whole at ingestion time and re-read from disk
/// on every retrieval, never cached across calls.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSeries {
    columns: Vec<SeriesColumn>,
}

impl SampleSeries {
    /// Creates an empty series.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a column, builder style.
    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Self {
        self.push_column(name, values);
        self
    }

    /// Appends a column.
    pub fn push_column(&mut self, name: impl Into<String>, values: Vec<f64>) {
        self.columns.push(SeriesColumn {
            name: name.into(),
            values,
        });
    }

    /// All columns, in insertion order.
    pub fn columns(&self) -> &[SeriesColumn] {
        &self.columns
    }

    /// The values of a column by name.
    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .map(|c| c.values.as_slice())
    }

    /// Number of rows (the length of the first column).
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    /// Whether the series has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Whether all columns have equal length.
    pub fn is_rectangular(&self) -> bool {
        let rows = self.row_count();
        self.columns.iter().all(|c| c.values.len() == rows)
    }
}

// ---------------------------------------------------------------------------
// MetadataTable
// ---------------------------------------------------------------------------

/// The in-memory metadata table: a mutable mirror of the on-disk
/// metadata file.
///
/// Rows keep insertion order. Upserting a record removes any existing row
/// with the same identifier first, so the table never holds duplicate
/// identifiers and a re-ingested sample moves to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    rows: Vec<SampleRecord>,
}

impl MetadataTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table from pre-existing rows, keeping their order.
    pub fn from_rows(rows: Vec<SampleRecord>) -> Self {
        Self { rows }
    }

    /// All rows in current table order.
    pub fn rows(&self) -> &[SampleRecord] {
        &self.rows
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The table's column set: the identifier column, the name column when
    /// any row carries a name, then the union of extension columns in
    /// lexical order. Empty for an empty table.
    pub fn columns(&self) -> Vec<String> {
        if self.rows.is_empty() {
            return Vec::new();
        }
        let mut columns = vec![ID_COLUMN.to_string()];
        if self.rows.iter().any(|r| r.name.is_some()) {
            columns.push(NAME_COLUMN.to_string());
        }
        let mut extra: Vec<&str> = self
            .rows
            .iter()
            .flat_map(|r| r.extra.keys().map(String::as_str))
            .collect();
        extra.sort_unstable();
        extra.dedup();
        columns.extend(extra.into_iter().map(String::from));
        columns
    }

    /// Whether any row contributes the given column.
    pub fn has_column(&self, column: &str) -> bool {
        match column {
            ID_COLUMN => !self.rows.is_empty(),
            NAME_COLUMN => self.rows.iter().any(|r| r.name.is_some()),
            _ => self.rows.iter().any(|r| r.extra.contains_key(column)),
        }
    }

    /// Removes the row with the given identifier, if present.
    ///
    /// Returns `true` when a row was removed.
    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.rows.len();
        self.rows.retain(|r| r.id != id);
        self.rows.len() != before
    }

    /// Inserts a record, replacing any existing row with the same
    /// identifier (delete-then-reinsert; the record lands at the end).
    ///
    /// Returns `true` when an existing row was replaced.
    pub fn upsert(&mut self, record: SampleRecord) -> bool {
        let replaced = self.remove(&record.id);
        self.rows.push(record);
        replaced
    }

    /// All rows matching the given identifier. At most one can exist
    /// given the upsert invariant; callers get a `Vec` to mirror the
    /// query API.
    pub fn find(&self, id: &str) -> Vec<&SampleRecord> {
        self.rows.iter().filter(|r| r.id == id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, fields: &[(&str, &str)]) -> SampleRecord {
        let map: BTreeMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SampleRecord::from_fields(id, map)
    }

    #[test]
    fn from_fields_promotes_known_slots() {
        let rec = record("RT12", &[("name", "EAFD9"), ("Temp", "300"), ("id", "bogus")]);
        assert_eq!(rec.id, "RT12");
        assert_eq!(rec.name.as_deref(), Some("EAFD9"));
        assert_eq!(rec.get("Temp"), Some("300"));
        // The identifier argument wins over a merged-in `id` field.
        assert_eq!(rec.get("id"), Some("RT12"));
        assert!(!rec.extra.contains_key("id"));
    }

    #[test]
    fn upsert_replaces_without_duplicates() {
        let mut table = MetadataTable::new();
        assert!(!table.upsert(record("RT12", &[("Temp", "300")])));
        assert!(!table.upsert(record("RT13", &[("Temp", "450")])));
        assert!(table.upsert(record("RT12", &[("Temp", "600")])));

        assert_eq!(table.len(), 2);
        let matches = table.find("RT12");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("Temp"), Some("600"));
        // The replaced row moved to the end.
        assert_eq!(table.rows()[1].id, "RT12");
    }

    #[test]
    fn columns_are_id_name_then_sorted_union() {
        let mut table = MetadataTable::new();
        table.upsert(record("a", &[("Zeta", "1"), ("name", "x")]));
        table.upsert(record("b", &[("Alpha", "2")]));

        assert_eq!(table.columns(), vec!["id", "name", "Alpha", "Zeta"]);
        assert!(table.has_column("Alpha"));
        assert!(!table.has_column("Beta"));
    }

    #[test]
    fn empty_table_has_no_columns() {
        let table = MetadataTable::new();
        assert!(table.columns().is_empty());
        assert!(!table.has_column(ID_COLUMN));
        assert!(table.find("RT12").is_empty());
    }

    #[test]
    fn series_shape_checks() {
        let series = SampleSeries::new()
            .with_column("time_s", vec![0.0, 1.0, 2.0])
            .with_column("mass_mg", vec![10.0, 9.8, 9.5]);
        assert_eq!(series.row_count(), 3);
        assert!(series.is_rectangular());
        assert_eq!(series.column("mass_mg"), Some(&[10.0, 9.8, 9.5][..]));
        assert!(series.column("missing").is_none());

        let ragged = SampleSeries::new()
            .with_column("a", vec![1.0])
            .with_column("b", vec![1.0, 2.0]);
        assert!(!ragged.is_rectangular());
    }
}
