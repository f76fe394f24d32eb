//! Parquet encoding and decoding for the on-disk layout.
//!
//! Two file shapes exist, and both must stay readable by (and from) the
//! lab tooling that produced existing datasets:
//!
//! - the metadata table: one row per sample, every column Utf8. Files
//!   written by older tooling may carry numeric or boolean columns; those
//!   are coerced to strings on load.
//! - per-sample series files: named Float64 columns of equal length,
//!   written with gzip (generic, non-specialized) compression.
//!
//! The metadata writer replaces the file atomically (temp file + rename)
//! so a crash mid-save leaves the previous version intact. Series files
//! are removed and rewritten whole; a crash between a series write and the
//! metadata save is the store's documented consistency gap, not hidden
//! here.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BooleanArray, Float32Array, Float64Array, Int32Array, Int64Array,
    LargeStringArray, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, GzipLevel};
use parquet::errors::ParquetError;
use parquet::file::properties::WriterProperties;

use crate::error::{Result, StoreError};
use crate::model::{ID_COLUMN, MetadataTable, SampleRecord, SampleSeries};

// ---------------------------------------------------------------------------
// Metadata table
// ---------------------------------------------------------------------------

/// Writes the metadata table to `path`, atomically overwriting any prior
/// version (write to a sibling temp file, then rename over).
///
/// The caller guards against empty tables (see `DatasetStore::save`); a
/// table with rows always has at least the identifier column.
///
/// # Errors
///
/// Returns [`StoreError::MetadataWrite`] on encoding failures and
/// [`StoreError::DirectoryAccess`] on file-system failures.
pub fn write_metadata(path: &Path, table: &MetadataTable) -> Result<()> {
    let columns = table.columns();
    let mut fields = Vec::with_capacity(columns.len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(columns.len());

    for column in &columns {
        let cells: Vec<Option<&str>> = table.rows().iter().map(|r| r.get(column)).collect();
        fields.push(Field::new(column, DataType::Utf8, column != ID_COLUMN));
        arrays.push(Arc::new(StringArray::from(cells)));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(|e| {
        StoreError::MetadataWrite {
            path: path.to_path_buf(),
            source: ParquetError::from(e),
        }
    })?;

    let tmp_path = path.with_extension("parquet.tmp");
    let file = File::create(&tmp_path).map_err(|e| StoreError::DirectoryAccess {
        path: tmp_path.display().to_string(),
        source: e,
    })?;

    let props = WriterProperties::builder().build();
    write_batch(file, schema, &batch, props).map_err(|source| StoreError::MetadataWrite {
        path: path.to_path_buf(),
        source,
    })?;

    fs::rename(&tmp_path, path).map_err(|e| StoreError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(())
}

/// Loads the metadata table from `path`.
///
/// Every cell is read back as a string; numeric and boolean columns from
/// older files are coerced. A null identifier cell loads as an empty id,
/// which queries later exclude from hydration.
///
/// # Errors
///
/// Returns [`StoreError::MetadataRead`] on decoding failures,
/// [`StoreError::CorruptedTable`] when the file lacks the identifier
/// column or holds a column type with no string rendering, and
/// [`StoreError::DirectoryAccess`] when the file cannot be opened.
pub fn read_metadata(path: &Path) -> Result<MetadataTable> {
    let file = File::open(path).map_err(|e| StoreError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|source| StoreError::MetadataRead {
            path: path.to_path_buf(),
            source,
        })?;

    let mut rows = Vec::new();
    let mut saw_id_column = false;

    for batch in reader {
        let batch = batch.map_err(|e| StoreError::MetadataRead {
            path: path.to_path_buf(),
            source: ParquetError::from(e),
        })?;
        let schema = batch.schema();
        saw_id_column = saw_id_column || schema.index_of(ID_COLUMN).is_ok();

        for row in 0..batch.num_rows() {
            let mut fields = BTreeMap::new();
            for (index, field) in schema.fields().iter().enumerate() {
                let cell = cell_to_string(batch.column(index), row).map_err(|reason| {
                    StoreError::CorruptedTable {
                        path: path.to_path_buf(),
                        reason,
                    }
                })?;
                if let Some(value) = cell {
                    fields.insert(field.name().clone(), value);
                }
            }
            let id = fields.remove(ID_COLUMN).unwrap_or_default();
            rows.push(SampleRecord::from_fields(id, fields));
        }
    }

    if !rows.is_empty() && !saw_id_column {
        return Err(StoreError::CorruptedTable {
            path: path.to_path_buf(),
            reason: format!("metadata table has no '{ID_COLUMN}' column"),
        }
        .into());
    }
    Ok(MetadataTable::from_rows(rows))
}

/// Renders one cell of an Arrow column as a string, or `None` for null.
fn cell_to_string(column: &ArrayRef, row: usize) -> std::result::Result<Option<String>, String> {
    if column.is_null(row) {
        return Ok(None);
    }
    let rendered = match column.data_type() {
        DataType::Utf8 => {
            let array = column
                .as_any()
                .downcast_ref::<StringArray>()
                .ok_or("expected StringArray")?;
            array.value(row).to_string()
        }
        DataType::LargeUtf8 => {
            let array = column
                .as_any()
                .downcast_ref::<LargeStringArray>()
                .ok_or("expected LargeStringArray")?;
            array.value(row).to_string()
        }
        DataType::Int32 => {
            let array = column
                .as_any()
                .downcast_ref::<Int32Array>()
                .ok_or("expected Int32Array")?;
            array.value(row).to_string()
        }
        DataType::Int64 => {
            let array = column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or("expected Int64Array")?;
            array.value(row).to_string()
        }
        DataType::Float32 => {
            let array = column
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or("expected Float32Array")?;
            array.value(row).to_string()
        }
        DataType::Float64 => {
            let array = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or("expected Float64Array")?;
            array.value(row).to_string()
        }
        DataType::Boolean => {
            let array = column
                .as_any()
                .downcast_ref::<BooleanArray>()
                .ok_or("expected BooleanArray")?;
            array.value(row).to_string()
        }
        other => return Err(format!("unsupported metadata column type {other:?}")),
    };
    Ok(Some(rendered))
}

// ---------------------------------------------------------------------------
// Series files
// ---------------------------------------------------------------------------

/// Writes a sample's series table to `path`, fully overwriting any prior
/// file (remove-then-write, not append). Gzip compression.
///
/// # Errors
///
/// Returns [`StoreError::InvalidSeries`] for empty or ragged series,
/// [`StoreError::SeriesWrite`] on encoding failures, and
/// [`StoreError::DirectoryAccess`] on file-system failures.
pub fn write_series(path: &Path, series: &SampleSeries) -> Result<()> {
    if series.is_empty() {
        return Err(StoreError::InvalidSeries {
            reason: "series has no columns".to_string(),
        }
        .into());
    }
    if !series.is_rectangular() {
        return Err(StoreError::InvalidSeries {
            reason: "series columns have unequal lengths".to_string(),
        }
        .into());
    }

    if path.exists() {
        fs::remove_file(path).map_err(|e| StoreError::DirectoryAccess {
            path: path.display().to_string(),
            source: e,
        })?;
    }

    let mut fields = Vec::with_capacity(series.columns().len());
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(series.columns().len());
    for column in series.columns() {
        fields.push(Field::new(&column.name, DataType::Float64, false));
        arrays.push(Arc::new(Float64Array::from(column.values.clone())));
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays).map_err(|e| {
        StoreError::SeriesWrite {
            path: path.to_path_buf(),
            source: ParquetError::from(e),
        }
    })?;

    let file = File::create(path).map_err(|e| StoreError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    let props = WriterProperties::builder()
        .set_compression(Compression::GZIP(GzipLevel::default()))
        .build();
    write_batch(file, schema, &batch, props).map_err(|source| StoreError::SeriesWrite {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// Loads a sample's series table from `path`.
///
/// Float32 and integer columns are widened to `f64`; null cells load as
/// NaN.
///
/// # Errors
///
/// Returns [`StoreError::SeriesRead`] on decoding failures,
/// [`StoreError::CorruptedTable`] for non-numeric columns, and
/// [`StoreError::DirectoryAccess`] when the file cannot be opened.
pub fn read_series(path: &Path) -> Result<SampleSeries> {
    let file = File::open(path).map_err(|e| StoreError::DirectoryAccess {
        path: path.display().to_string(),
        source: e,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .and_then(|builder| builder.build())
        .map_err(|source| StoreError::SeriesRead {
            path: path.to_path_buf(),
            source,
        })?;

    let mut names: Vec<String> = Vec::new();
    let mut values: Vec<Vec<f64>> = Vec::new();

    for batch in reader {
        let batch = batch.map_err(|e| StoreError::SeriesRead {
            path: path.to_path_buf(),
            source: ParquetError::from(e),
        })?;
        if names.is_empty() {
            names = batch
                .schema()
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .collect();
            values = vec![Vec::with_capacity(batch.num_rows()); names.len()];
        }
        for (index, sink) in values.iter_mut().enumerate() {
            extend_f64(batch.column(index), sink).map_err(|reason| {
                StoreError::CorruptedTable {
                    path: path.to_path_buf(),
                    reason,
                }
            })?;
        }
    }

    let mut series = SampleSeries::new();
    for (name, column) in names.into_iter().zip(values) {
        series.push_column(name, column);
    }
    Ok(series)
}

/// Appends one Arrow column's cells to `sink` as `f64`.
fn extend_f64(column: &ArrayRef, sink: &mut Vec<f64>) -> std::result::Result<(), String> {
    match column.data_type() {
        DataType::Float64 => {
            let array = column
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or("expected Float64Array")?;
            sink.extend(array.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
        DataType::Float32 => {
            let array = column
                .as_any()
                .downcast_ref::<Float32Array>()
                .ok_or("expected Float32Array")?;
            sink.extend(array.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        }
        DataType::Int32 => {
            let array = column
                .as_any()
                .downcast_ref::<Int32Array>()
                .ok_or("expected Int32Array")?;
            sink.extend(array.iter().map(|v| v.map_or(f64::NAN, f64::from)));
        }
        DataType::Int64 => {
            let array = column
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or("expected Int64Array")?;
            #[allow(clippy::cast_precision_loss)] // measurement counters fit in f64
            sink.extend(array.iter().map(|v| v.map_or(f64::NAN, |i| i as f64)));
        }
        other => return Err(format!("unsupported series column type {other:?}")),
    }
    Ok(())
}

/// Writes a single batch through an [`ArrowWriter`] and closes it.
fn write_batch(
    file: File,
    schema: Arc<Schema>,
    batch: &RecordBatch,
    props: WriterProperties,
) -> std::result::Result<(), ParquetError> {
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))?;
    writer.write(batch)?;
    writer.close()?;
    Ok(())
}
