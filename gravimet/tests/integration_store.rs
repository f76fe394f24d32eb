//! Integration tests for the full dataset lifecycle.
//!
//! These exercise the complete flow from store creation through batch
//! ingestion, persistence, reopening, and retrieval, including the
//! crash-consistency and empty-save edge cases.

use std::collections::BTreeMap;
use std::path::Path;

use gravimet::{
    DatasetStore, ExternalError, SampleDirectory, SampleParser, SampleSeries, SheetSource,
    SheetTransport,
};
use tempfile::tempdir;

/// Worksheet transport serving one fixed "Runs" collection.
struct RunsTransport {
    rows: Vec<Vec<(String, String)>>,
}

impl RunsTransport {
    fn new(rows: &[&[(&str, &str)]]) -> Self {
        Self {
            rows: rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|(k, v)| (k.to_string(), v.to_string()))
                        .collect()
                })
                .collect(),
        }
    }
}

impl SheetTransport for RunsTransport {
    fn list_collections(&self) -> Result<Vec<String>, ExternalError> {
        Ok(vec!["Runs".to_string()])
    }

    fn fetch(&self, _collection: &str) -> Result<Vec<BTreeMap<String, String>>, ExternalError> {
        Ok(self
            .rows
            .iter()
            .map(|row| row.iter().cloned().collect())
            .collect())
    }
}

fn runs_sheet(rows: &[&[(&str, &str)]]) -> SheetSource {
    let mut sheet = SheetSource::initialize(Box::new(RunsTransport::new(rows))).unwrap();
    sheet.load_collection("Runs").unwrap();
    sheet.set_lookup_column("TGA Identifier");
    sheet
}

/// Parser stub producing a deterministic series per identifier.
struct StubParser;

fn series_for(id: &str) -> SampleSeries {
    let seed = id.len() as f64;
    SampleSeries::new()
        .with_column("time_s", vec![0.0, 1.0, 2.0])
        .with_column("mass_mg", vec![seed, seed - 0.5, seed - 1.2])
}

impl SampleParser for StubParser {
    fn parse(
        &self,
        path: &Path,
    ) -> Result<(SampleSeries, BTreeMap<String, String>), ExternalError> {
        let id = path.file_stem().unwrap().to_str().unwrap().to_string();
        let mut metadata = BTreeMap::new();
        metadata.insert("Instrument".to_string(), "TGA/DSC 3+".to_string());
        Ok((series_for(&id), metadata))
    }
}

#[test]
fn test_full_dataset_lifecycle() {
    let temp_dir = tempdir().unwrap();
    let export_dir = temp_dir.path().join("exports");
    let dataset_dir = temp_dir.path().join("dataset");
    std::fs::create_dir(&export_dir).unwrap();

    // Ten export files, eight of which have a worksheet row.
    let matched_rows: Vec<Vec<(&str, &str)>> = (0..8)
        .map(|i| {
            vec![
                ("TGA Identifier", ["RT00", "RT01", "RT02", "RT03", "RT04", "RT05", "RT06", "RT07"][i]),
                ("Temp", "300"),
            ]
        })
        .collect();
    let row_slices: Vec<&[(&str, &str)]> = matched_rows.iter().map(Vec::as_slice).collect();
    let sheet = runs_sheet(&row_slices);

    for i in 0..10 {
        std::fs::write(export_dir.join(format!("RT{i:02}.txt")), "raw export").unwrap();
    }

    // Phase 1: assemble the dataset.
    {
        let mut store = DatasetStore::open(&dataset_dir).unwrap();
        let report = store
            .create_dataset(&SampleDirectory::new(&export_dir), &sheet, &StubParser)
            .unwrap();

        assert_eq!(report.ingested.len(), 8);
        assert_eq!(report.failures.len(), 2, "two unmatched files must be reported");
        assert_eq!(store.metadata().len(), 8);
        assert!(!report.is_clean());
    }

    // Phase 2: reopen and verify everything persisted.
    {
        let store = DatasetStore::open(&dataset_dir).unwrap();
        assert_eq!(store.metadata().len(), 8);

        let rows = store.find_metadata("RT03");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("Temp"), Some("300"));
        assert_eq!(rows[0].get("Instrument"), Some("TGA/DSC 3+"));

        let series = store.read_series("RT03").unwrap();
        assert_eq!(series, series_for("RT03"));

        // The two unmatched samples never got rows or series files.
        assert!(store.find_metadata("RT08").is_empty());
        assert!(store.read_series("RT09").is_err());
    }
}

#[test]
fn test_readd_replaces_row_and_series() {
    let temp_dir = tempdir().unwrap();
    let mut store = DatasetStore::open(temp_dir.path()).unwrap();
    let sheet = runs_sheet(&[&[("TGA Identifier", "RT12"), ("Temp", "300")]]);

    let first = SampleSeries::new().with_column("time_s", vec![0.0, 1.0]);
    let parsed_a: BTreeMap<String, String> =
        [("Condition".to_string(), "Raw".to_string())].into();
    store
        .add_entry(&first, "RT12", &parsed_a, &sheet, true)
        .unwrap();

    let second = SampleSeries::new().with_column("time_s", vec![5.0, 6.0, 7.0]);
    let parsed_b: BTreeMap<String, String> =
        [("Condition".to_string(), "Washed".to_string())].into();
    store
        .add_entry(&second, "RT12", &parsed_b, &sheet, true)
        .unwrap();

    // Row replaced in place, no duplicates.
    assert_eq!(store.metadata().len(), 1);
    let rows = store.find_metadata("RT12");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("Condition"), Some("Washed"));

    // Series file overwritten, not appended.
    assert_eq!(store.read_series("RT12").unwrap(), second);
}

#[test]
fn test_save_on_empty_table_leaves_existing_file_untouched() {
    let temp_dir = tempdir().unwrap();
    let sheet = runs_sheet(&[&[("TGA Identifier", "RT12"), ("Temp", "300")]]);

    // A second handle opened before any data existed still has an empty
    // in-memory table once the first handle has written the file.
    let empty_handle = DatasetStore::open(temp_dir.path()).unwrap();

    let mut writer = DatasetStore::open(temp_dir.path()).unwrap();
    let series = SampleSeries::new().with_column("time_s", vec![0.0]);
    writer
        .add_entry(&series, "RT12", &BTreeMap::new(), &sheet, true)
        .unwrap();
    let written = std::fs::read(writer.metadata_path()).unwrap();

    assert!(empty_handle.metadata().is_empty());
    empty_handle.save().unwrap();

    let after = std::fs::read(writer.metadata_path()).unwrap();
    assert_eq!(written, after, "empty save must not truncate the table");
}

#[test]
fn test_orphaned_series_file_is_accepted_drift() {
    let temp_dir = tempdir().unwrap();
    let sheet = runs_sheet(&[&[("TGA Identifier", "RT12"), ("Temp", "300")]]);

    {
        let mut store = DatasetStore::open(temp_dir.path()).unwrap();
        let series = SampleSeries::new().with_column("time_s", vec![0.0]);
        store
            .add_entry(&series, "RT12", &BTreeMap::new(), &sheet, true)
            .unwrap();
        // Simulate a crash between series write and metadata save: a
        // series file exists for a sample the table never recorded.
        std::fs::copy(
            store.series_path("RT12"),
            store.series_path("RT99"),
        )
        .unwrap();
    }

    let store = DatasetStore::open(temp_dir.path()).unwrap();
    // Not reclaimed on open.
    assert!(store.series_path("RT99").exists());
    // Invisible to metadata queries, but readable directly — file
    // presence is the sole source of truth for read_series.
    assert!(store.find_metadata("RT99").is_empty());
    assert!(store.read_series("RT99").is_ok());
}

#[test]
fn test_persist_flag_defers_metadata_save() {
    let temp_dir = tempdir().unwrap();
    let mut store = DatasetStore::open(temp_dir.path()).unwrap();
    let sheet = runs_sheet(&[&[("TGA Identifier", "RT12"), ("Temp", "300")]]);

    let series = SampleSeries::new().with_column("time_s", vec![0.0]);
    store
        .add_entry(&series, "RT12", &BTreeMap::new(), &sheet, false)
        .unwrap();

    // The series file is written eagerly; the metadata table is not.
    assert!(store.series_path("RT12").exists());
    assert!(!store.metadata_path().exists());

    store.save().unwrap();
    assert!(store.metadata_path().exists());

    let reopened = DatasetStore::open(temp_dir.path()).unwrap();
    assert_eq!(reopened.metadata().len(), 1);
}
