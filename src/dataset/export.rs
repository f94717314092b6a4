//! JSONL, CSV and Parquet writers shared by the dataset commands.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use arrow_array::{ArrayRef, RecordBatch, StringArray};
use arrow_schema::{DataType, Field, Schema};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use serde::Serialize;

use crate::error::DatasetError;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// One JSON object per line, non-ASCII kept as-is.
pub fn write_jsonl<T: Serialize>(path: &Path, rows: &[T]) -> Result<(), DatasetError> {
    let mut out = BufWriter::new(File::create(path)?);
    for row in rows {
        serde_json::to_writer(&mut out, row)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

/// CSV with a header row. `bom` prefixes a UTF-8 byte order mark so
/// spreadsheet tools pick the right encoding.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T], bom: bool) -> Result<(), DatasetError> {
    let mut file = BufWriter::new(File::create(path)?);
    if bom {
        file.write_all(UTF8_BOM)?;
    }

    let mut writer = csv::Writer::from_writer(file);
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// A row that flattens into named text columns.
pub trait TextColumns {
    const COLUMNS: &'static [&'static str];

    /// One value per entry of [`COLUMNS`](Self::COLUMNS), in the same order.
    fn values(&self) -> Vec<&str>;
}

/// Snappy-compressed Parquet with one non-null UTF-8 column per
/// [`TextColumns::COLUMNS`] entry, readable by pandas and `datasets`.
pub fn write_parquet<T: TextColumns>(path: &Path, rows: &[T]) -> Result<(), DatasetError> {
    let schema = Arc::new(Schema::new(
        T::COLUMNS
            .iter()
            .map(|name| Field::new(*name, DataType::Utf8, false))
            .collect::<Vec<_>>(),
    ));

    let values: Vec<Vec<&str>> = rows.iter().map(|row| row.values()).collect();
    let columns: Vec<ArrayRef> = (0..T::COLUMNS.len())
        .map(|i| Arc::new(StringArray::from_iter_values(values.iter().map(|row| row[i]))) as ArrayRef)
        .collect();
    let batch = RecordBatch::try_new(schema.clone(), columns)?;

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(File::create(path)?, schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    Ok(())
}

#[cfg(test)]
pub(crate) fn read_parquet_columns(path: &Path) -> (Vec<String>, Vec<Vec<String>>) {
    use arrow_array::Array;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    let reader = ParquetRecordBatchReaderBuilder::try_new(File::open(path).unwrap())
        .unwrap()
        .build()
        .unwrap();

    let mut names = Vec::new();
    let mut rows = Vec::new();
    for batch in reader {
        let batch = batch.unwrap();
        names = batch.schema().fields().iter().map(|f| f.name().clone()).collect();
        for r in 0..batch.num_rows() {
            rows.push(
                batch
                    .columns()
                    .iter()
                    .map(|c| c.as_any().downcast_ref::<StringArray>().unwrap().value(r).to_string())
                    .collect(),
            );
        }
    }
    (names, rows)
}
