//! Entity store interface and the normalized snapshot every builder reads.

use std::convert::Infallible;
use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::compute::cast;
use arrow::record_batch::RecordBatch;
use indexmap::IndexMap;
use tracing::{debug, info};

use crate::error::FeatureError;
use crate::schema::Table;

/// A source of named raw tables (`orders`, `order_items`, ...).
///
/// Implementations decide where tables come from; the pipeline only requires
/// that the declared key and metric columns are present.
pub trait EntityStore {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Fetch the table called `name`, or `None` if the store does not have it.
    fn load_table(&self, name: &str) -> Result<Option<RecordBatch>, Self::Error>;
}

/// Tables already held in memory, keyed by name.
impl EntityStore for IndexMap<String, RecordBatch> {
    type Error = Infallible;

    fn load_table(&self, name: &str) -> Result<Option<RecordBatch>, Infallible> {
        Ok(self.get(name).cloned())
    }
}

/// A consistent, read-only view of all six entity tables.
///
/// Building a snapshot is the only place raw data is validated: each table is
/// projected to its declared columns (see [`Table::columns`]) and every column
/// is cast to its declared type. Missing tables or columns are fatal.
///
/// All builders borrow the same snapshot, so they observe the same data and
/// nothing is loaded twice.
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// One normalized batch per table, indexed in [`Table::ALL`] order.
    tables: Vec<RecordBatch>,
}

impl Snapshot {
    pub fn from_store<S: EntityStore + ?Sized>(store: &S) -> Result<Self, FeatureError> {
        let mut tables = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let raw = store
                .load_table(table.name())
                .map_err(|e| FeatureError::Store(Box::new(e)))?
                .ok_or_else(|| FeatureError::MissingTable {
                    table: table.name().to_string(),
                })?;
            let normalized = normalize(table, &raw)?;
            info!(
                "Loaded {}: {} rows, {} columns kept of {}",
                table.name(),
                normalized.num_rows(),
                normalized.num_columns(),
                raw.num_columns()
            );
            tables.push(normalized);
        }
        Ok(Self { tables })
    }

    pub fn from_tables(tables: IndexMap<String, RecordBatch>) -> Result<Self, FeatureError> {
        Self::from_store(&tables)
    }

    /// The normalized batch for `table`.
    pub fn table(&self, table: Table) -> &RecordBatch {
        &self.tables[table as usize]
    }
}

/// Project `raw` to the declared columns of `table`, casting each one.
///
/// Extra columns are dropped. Values that cannot be parsed (e.g. a malformed
/// timestamp string) become null; a column whose type cannot be cast at all
/// is an error.
fn normalize(table: Table, raw: &RecordBatch) -> Result<RecordBatch, FeatureError> {
    let raw_schema = raw.schema();
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(table.columns().len());

    for spec in table.columns() {
        let idx = raw_schema
            .index_of(spec.name)
            .map_err(|_| FeatureError::MissingColumn {
                table: table.name().to_string(),
                column: spec.name.to_string(),
            })?;
        let source = raw.column(idx);
        let target = spec.kind.data_type();
        if source.data_type() == &target {
            columns.push(source.clone());
            continue;
        }
        debug!(
            "Casting {}.{} from {} to {}",
            table.name(),
            spec.name,
            source.data_type(),
            target
        );
        let casted = cast(source.as_ref(), &target).map_err(|e| FeatureError::ColumnType {
            table: table.name().to_string(),
            column: spec.name.to_string(),
            target: target.clone(),
            source: e,
        })?;
        columns.push(casted);
    }

    Ok(RecordBatch::try_new(Arc::new(table.schema()), columns)?)
}
