//! Small helpers over Arrow record batches: typed column access, appending a
//! derived column, and the key-uniqueness check that guards every join.

use std::collections::HashSet;
use std::sync::Arc;

use arrow::array::{Array, ArrayRef, AsArray, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Float64Type, Int64Type, Schema};
use arrow::record_batch::RecordBatch;

use crate::error::FeatureError;

/// Look up a column by name, reporting the owning table on failure.
pub fn column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<&'a ArrayRef, FeatureError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| FeatureError::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
}

fn expect_type(
    array: &ArrayRef,
    table: &str,
    name: &str,
    target: DataType,
) -> Result<(), FeatureError> {
    if array.data_type() == &target {
        Ok(())
    } else {
        Err(FeatureError::UnexpectedType {
            table: table.to_string(),
            column: name.to_string(),
            expected: target,
            found: array.data_type().clone(),
        })
    }
}

pub fn string_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<&'a StringArray, FeatureError> {
    let array = column(batch, table, name)?;
    expect_type(array, table, name, DataType::Utf8)?;
    Ok(array.as_string::<i32>())
}

pub fn f64_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<&'a Float64Array, FeatureError> {
    let array = column(batch, table, name)?;
    expect_type(array, table, name, DataType::Float64)?;
    Ok(array.as_primitive::<Float64Type>())
}

pub fn i64_column<'a>(
    batch: &'a RecordBatch,
    table: &str,
    name: &str,
) -> Result<&'a Int64Array, FeatureError> {
    let array = column(batch, table, name)?;
    expect_type(array, table, name, DataType::Int64)?;
    Ok(array.as_primitive::<Int64Type>())
}

/// Return a new batch with `array` appended as a nullable column `name`.
pub fn with_column(
    batch: &RecordBatch,
    name: &str,
    array: ArrayRef,
) -> Result<RecordBatch, FeatureError> {
    let schema = batch.schema();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields.push(Field::new(name, array.data_type().clone(), true));
    let mut columns: Vec<ArrayRef> = batch.columns().to_vec();
    columns.push(array);
    Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), columns)?)
}

/// Fail with [`FeatureError::DuplicateKey`] if any non-null value of the
/// string column `key` occurs twice.
///
/// Called on every grouped sub-result before it takes part in a join: a
/// duplicate there would silently fan out the join.
pub fn ensure_unique_key(
    batch: &RecordBatch,
    table: &str,
    key: &str,
) -> Result<(), FeatureError> {
    let keys = string_column(batch, table, key)?;
    let mut seen: HashSet<&str> = HashSet::with_capacity(keys.len());
    for value in keys.iter().flatten() {
        if !seen.insert(value) {
            return Err(FeatureError::DuplicateKey {
                table: table.to_string(),
                column: key.to_string(),
                key: value.to_string(),
            });
        }
    }
    Ok(())
}

/// True iff no column of the batch contains a null.
pub fn is_null_free(batch: &RecordBatch) -> bool {
    batch.columns().iter().all(|c| c.null_count() == 0)
}

/// Build a SQL predicate requiring every listed (qualified) column to be
/// non-null, e.g. `w.wait_time IS NOT NULL AND r.review_score IS NOT NULL`.
pub(crate) fn not_null_predicate(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| format!("{c} IS NOT NULL"))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Quote a string as a SQL literal.
pub(crate) fn sql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
