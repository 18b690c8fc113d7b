//! Entity store backed by a directory of parquet or CSV exports.

use std::fs::File;
use std::io::Seek;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::compute::concat_batches;
use arrow::csv::ReaderBuilder;
use arrow::csv::reader::Format;
use arrow::error::ArrowError;
use arrow::record_batch::{RecordBatch, RecordBatchReader};
use confluence::EntityStore;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::errors::ParquetError;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parquet error in {path}: {source}")]
    Parquet {
        path: PathBuf,
        #[source]
        source: ParquetError,
    },

    #[error("arrow error in {path}: {source}")]
    Arrow {
        path: PathBuf,
        #[source]
        source: ArrowError,
    },
}

/// Reads table `t` from `<dir>/t.parquet`, `<dir>/t.csv` or
/// `<dir>/olist_t_dataset.csv`, whichever exists first.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
    /// Rows scanned to infer CSV column types. `None` scans the whole file.
    infer_records: Option<usize>,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            infer_records: None,
        }
    }

    pub fn with_infer_records(mut self, records: usize) -> Self {
        self.infer_records = Some(records);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn candidates(&self, name: &str) -> [PathBuf; 3] {
        [
            self.dir.join(format!("{name}.parquet")),
            self.dir.join(format!("{name}.csv")),
            self.dir.join(format!("olist_{name}_dataset.csv")),
        ]
    }

    fn read_csv(&self, path: &Path) -> Result<RecordBatch, StoreError> {
        let arrow_err = |source| StoreError::Arrow {
            path: path.to_path_buf(),
            source,
        };
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let (schema, scanned) = Format::default()
            .with_header(true)
            .infer_schema(&mut file, self.infer_records)
            .map_err(arrow_err)?;
        debug!("Inferred {} columns from {scanned} records", schema.fields().len());
        file.rewind().map_err(io_err)?;

        let schema = Arc::new(schema);
        let reader = ReaderBuilder::new(schema.clone())
            .with_header(true)
            .build(file)
            .map_err(arrow_err)?;
        let batches = reader.collect::<Result<Vec<_>, _>>().map_err(arrow_err)?;
        concat_batches(&schema, &batches).map_err(arrow_err)
    }
}

fn read_parquet(path: &Path) -> Result<RecordBatch, StoreError> {
    let parquet_err = |source| StoreError::Parquet {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = ParquetRecordBatchReaderBuilder::try_new(file)
        .map_err(parquet_err)?
        .with_batch_size(1_000_000)
        .build()
        .map_err(parquet_err)?;

    let schema = reader.schema().clone();
    let batches = reader
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| StoreError::Arrow {
            path: path.to_path_buf(),
            source,
        })?;
    concat_batches(&schema, &batches).map_err(|source| StoreError::Arrow {
        path: path.to_path_buf(),
        source,
    })
}

impl EntityStore for DirectoryStore {
    type Error = StoreError;

    fn load_table(&self, name: &str) -> Result<Option<RecordBatch>, StoreError> {
        let Some(path) = self.candidates(name).into_iter().find(|p| p.is_file()) else {
            return Ok(None);
        };
        info!("  Loading {}", path.display());
        let batch = match path.extension().and_then(|e| e.to_str()) {
            Some("parquet") => read_parquet(&path)?,
            _ => self.read_csv(&path)?,
        };
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use arrow::array::{Array, AsArray, Float64Array, StringArray};
    use arrow::datatypes::{DataType, Field, Schema};

    use super::*;
    use crate::writer::write_parquet;

    const SELLERS_CSV: &str = "\
seller_id,seller_zip_code_prefix,seller_city,seller_state
s1,13023,campinas,SP
s2,01037,sao paulo,SP
";

    #[test]
    fn test_missing_table_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(store.load_table("orders").unwrap().is_none());
    }

    #[test]
    fn test_reads_csv_with_inferred_schema() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sellers.csv"), SELLERS_CSV).unwrap();

        let store = DirectoryStore::new(dir.path());
        let sellers = store.load_table("sellers").unwrap().unwrap();
        assert_eq!(sellers.num_rows(), 2);
        assert_eq!(sellers.num_columns(), 4);
        assert_eq!(
            sellers.column_by_name("seller_city").unwrap().as_string::<i32>().value(1),
            "sao paulo"
        );
    }

    #[test]
    fn test_reads_dataset_file_naming() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("olist_sellers_dataset.csv"), SELLERS_CSV).unwrap();
        let store = DirectoryStore::new(dir.path()).with_infer_records(1);
        assert_eq!(store.load_table("sellers").unwrap().unwrap().num_rows(), 2);
    }

    #[test]
    fn test_parquet_takes_precedence_over_csv() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("geolocation.csv"), "geolocation_lat\n1.0\n").unwrap();

        let schema = Arc::new(Schema::new(vec![
            Field::new("geolocation_zip_code_prefix", DataType::Utf8, true),
            Field::new("geolocation_lat", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema,
            vec![
                Arc::new(StringArray::from(vec!["1001", "1002", "1003"])),
                Arc::new(Float64Array::from(vec![Some(-23.5), None, Some(-22.9)])),
            ],
        )
        .unwrap();
        write_parquet(&dir.path().join("geolocation.parquet"), &batch).unwrap();

        let store = DirectoryStore::new(dir.path());
        let loaded = store.load_table("geolocation").unwrap().unwrap();
        assert_eq!(loaded.schema().fields(), batch.schema().fields());
        assert_eq!(loaded.columns(), batch.columns());
        assert!(loaded.column(1).is_null(1));
    }

    #[test]
    fn test_malformed_csv_is_arrow_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sellers.csv"), "a,b\n1,2\n3\n").unwrap();
        let store = DirectoryStore::new(dir.path());
        assert!(matches!(
            store.load_table("sellers"),
            Err(StoreError::Arrow { .. })
        ));
    }

    #[test]
    fn test_snapshot_from_csv_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sellers.csv"), SELLERS_CSV).unwrap();
        let store = DirectoryStore::new(dir.path());
        // Only one of six tables exists.
        let err = confluence::Snapshot::from_store(&store).unwrap_err();
        assert!(matches!(err, confluence::FeatureError::MissingTable { .. }));
    }
}
