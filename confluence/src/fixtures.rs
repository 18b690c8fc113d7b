//! A small, hand-checked marketplace used across the unit tests.
//!
//! Raw tables are shaped like the CSV export: timestamps as strings, zip
//! prefixes as integers, plus a few columns the pipeline ignores.
//!
//! | order | customer | status    | purchase   | carrier          | delivered  | estimated  | review |
//! |-------|----------|-----------|------------|------------------|------------|------------|--------|
//! | o1    | c1       | delivered | 2020-01-01 | 2020-01-02 12:00 | 2020-01-05 | 2020-01-10 | 5      |
//! | o2    | c2       | delivered | 2020-01-01 | 2020-01-03       | 2020-01-15 | 2020-01-10 | 1      |
//! | o3    | c3       | delivered | 2020-02-01 | 2020-02-02       | 2020-02-04 | 2020-02-11 | -      |
//! | o4    | c1       | shipped   | 2020-03-01 | 2020-03-02       | -          | 2020-03-10 | 3      |
//! | o5    | c2       | delivered | 2020-03-05 | 2020-03-06       | 2020-03-08 | 2020-03-15 | 5      |
//!
//! A review `r9` points at order `o9`, which exists nowhere else.
//!
//! Seller `s1` sits at (lng 0, lat 0), `s2` at (lng 2, lat 0); customers
//! `c1`/`c3` at (lng 1, lat 0) and `c2` at (lng 3, lat 0). Zip prefix 1001
//! has a second, far-away geolocation row that must never be joined.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{Field, Schema};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDateTime;
use indexmap::IndexMap;

use crate::geo::EARTH_RADIUS_KM;

/// Great-circle length of one degree of longitude on the equator.
pub const ONE_DEGREE_KM: f64 = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;

/// Route pipeline logs through the test harness. Safe to call repeatedly.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init()
        .ok();
}

/// Microseconds since the epoch for a `%Y-%m-%d %H:%M:%S` string.
pub fn micros(s: &str) -> i64 {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .unwrap()
        .and_utc()
        .timestamp_micros()
}

pub fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
    let fields: Vec<Field> = columns
        .iter()
        .map(|(name, array)| Field::new(*name, array.data_type().clone(), true))
        .collect();
    let arrays: Vec<ArrayRef> = columns.into_iter().map(|(_, a)| a).collect();
    RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays).unwrap()
}

/// Copy of `batch` with column `name` swapped for `array`.
pub fn replace_column(batch: &RecordBatch, name: &str, array: ArrayRef) -> RecordBatch {
    let schema = batch.schema();
    let idx = schema.index_of(name).unwrap();
    let mut fields: Vec<Field> = schema.fields().iter().map(|f| f.as_ref().clone()).collect();
    fields[idx] = Field::new(name, array.data_type().clone(), true);
    let mut columns = batch.columns().to_vec();
    columns[idx] = array;
    RecordBatch::try_new(Arc::new(Schema::new(fields)), columns).unwrap()
}

pub fn text(values: &[Option<&str>]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn strs(values: &[&str]) -> ArrayRef {
    Arc::new(StringArray::from(values.to_vec()))
}

pub fn floats(values: &[f64]) -> ArrayRef {
    Arc::new(Float64Array::from(values.to_vec()))
}

pub fn ints(values: &[i64]) -> ArrayRef {
    Arc::new(Int64Array::from(values.to_vec()))
}

pub fn orders() -> RecordBatch {
    batch(vec![
        ("order_id", strs(&["o1", "o2", "o3", "o4", "o5"])),
        ("customer_id", strs(&["c1", "c2", "c3", "c1", "c2"])),
        (
            "order_status",
            strs(&["delivered", "delivered", "delivered", "shipped", "delivered"]),
        ),
        (
            "order_purchase_timestamp",
            strs(&[
                "2020-01-01 00:00:00",
                "2020-01-01 00:00:00",
                "2020-02-01 00:00:00",
                "2020-03-01 00:00:00",
                "2020-03-05 00:00:00",
            ]),
        ),
        (
            "order_approved_at",
            strs(&[
                "2020-01-01 01:00:00",
                "2020-01-01 01:00:00",
                "2020-02-01 01:00:00",
                "2020-03-01 01:00:00",
                "2020-03-05 01:00:00",
            ]),
        ),
        (
            "order_delivered_carrier_date",
            strs(&[
                "2020-01-02 12:00:00",
                "2020-01-03 00:00:00",
                "2020-02-02 00:00:00",
                "2020-03-02 00:00:00",
                "2020-03-06 00:00:00",
            ]),
        ),
        (
            "order_delivered_customer_date",
            text(&[
                Some("2020-01-05 00:00:00"),
                Some("2020-01-15 00:00:00"),
                Some("2020-02-04 00:00:00"),
                None,
                Some("2020-03-08 00:00:00"),
            ]),
        ),
        (
            "order_estimated_delivery_date",
            strs(&[
                "2020-01-10 00:00:00",
                "2020-01-10 00:00:00",
                "2020-02-11 00:00:00",
                "2020-03-10 00:00:00",
                "2020-03-15 00:00:00",
            ]),
        ),
    ])
}

pub fn order_items() -> RecordBatch {
    batch(vec![
        ("order_id", strs(&["o1", "o1", "o2", "o2", "o3", "o4", "o5"])),
        ("order_item_id", ints(&[1, 2, 1, 2, 1, 1, 1])),
        ("product_id", strs(&["p1", "p1", "p2", "p3", "p2", "p3", "p1"])),
        ("seller_id", strs(&["s1", "s1", "s1", "s2", "s1", "s2", "s1"])),
        (
            "shipping_limit_date",
            strs(&[
                "2020-01-03 00:00:00",
                "2020-01-03 00:00:00",
                "2020-01-02 00:00:00",
                "2020-01-02 00:00:00",
                "2020-02-03 00:00:00",
                "2020-03-03 00:00:00",
                "2020-03-07 00:00:00",
            ]),
        ),
        ("price", floats(&[10.0, 10.0, 20.0, 30.0, 25.0, 15.0, 12.0])),
        ("freight_value", floats(&[2.0, 2.0, 3.0, 4.0, 5.0, 1.0, 2.5])),
    ])
}

pub fn order_reviews() -> RecordBatch {
    batch(vec![
        ("review_id", strs(&["r1", "r2", "r4", "r5", "r9"])),
        ("order_id", strs(&["o1", "o2", "o4", "o5", "o9"])),
        ("review_score", ints(&[5, 1, 3, 5, 4])),
        (
            "review_comment_message",
            text(&[Some("great"), Some("late"), None, None, None]),
        ),
    ])
}

pub fn sellers() -> RecordBatch {
    batch(vec![
        ("seller_id", strs(&["s1", "s2", "s3"])),
        ("seller_zip_code_prefix", ints(&[1001, 2002, 3003])),
        ("seller_city", strs(&["sao paulo", "rio de janeiro", "curitiba"])),
        ("seller_state", strs(&["SP", "RJ", "PR"])),
    ])
}

pub fn customers() -> RecordBatch {
    batch(vec![
        ("customer_id", strs(&["c1", "c2", "c3"])),
        ("customer_unique_id", strs(&["u1", "u2", "u3"])),
        ("customer_zip_code_prefix", ints(&[1002, 2003, 1002])),
    ])
}

pub fn geolocation() -> RecordBatch {
    batch(vec![
        (
            "geolocation_zip_code_prefix",
            ints(&[1001, 1002, 1001, 2002, 2003, 3003]),
        ),
        ("geolocation_lat", floats(&[0.0, 0.0, 10.0, 0.0, 0.0, 5.0])),
        ("geolocation_lng", floats(&[0.0, 1.0, 10.0, 2.0, 3.0, 5.0])),
        (
            "geolocation_city",
            strs(&["sao paulo", "sao paulo", "sao paulo", "rio", "rio", "curitiba"]),
        ),
    ])
}

/// All six raw tables, keyed by entity-store name.
pub fn marketplace() -> IndexMap<String, RecordBatch> {
    let mut tables = IndexMap::new();
    tables.insert("orders".to_string(), orders());
    tables.insert("order_items".to_string(), order_items());
    tables.insert("order_reviews".to_string(), order_reviews());
    tables.insert("sellers".to_string(), sellers());
    tables.insert("customers".to_string(), customers());
    tables.insert("geolocation".to_string(), geolocation());
    tables
}

/// Rows of a result batch keyed by a string column, for order-independent
/// assertions.
pub fn row_index(batch: &RecordBatch, key: &str) -> IndexMap<String, usize> {
    use arrow::array::AsArray;
    batch
        .column_by_name(key)
        .unwrap()
        .as_string::<i32>()
        .iter()
        .enumerate()
        .map(|(i, k)| (k.unwrap().to_string(), i))
        .collect()
}

