//! Declared schemas of the entity tables the pipeline consumes.
//!
//! Every input table is projected to exactly these columns and cast to these
//! types when a [`Snapshot`](crate::store::Snapshot) is built, so the SQL in
//! the feature builders can rely on names and types without re-checking.

use arrow::datatypes::{DataType, Field, Schema, TimeUnit};

/// Logical kind of an input column. Maps one-to-one onto an Arrow type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnKind {
    /// Identifiers, statuses, cities, zip prefixes.
    Text,
    /// Naive timestamps, stored as microseconds since the epoch.
    Timestamp,
    /// Prices and coordinates.
    Float,
    /// Review scores.
    Integer,
}

impl ColumnKind {
    pub fn data_type(self) -> DataType {
        match self {
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Timestamp => DataType::Timestamp(TimeUnit::Microsecond, None),
            ColumnKind::Float => DataType::Float64,
            ColumnKind::Integer => DataType::Int64,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

const fn col(name: &'static str, kind: ColumnKind) -> ColumnSpec {
    ColumnSpec { name, kind }
}

use ColumnKind::{Float, Integer, Text, Timestamp};

const ORDERS: &[ColumnSpec] = &[
    col("order_id", Text),
    col("customer_id", Text),
    col("order_status", Text),
    col("order_purchase_timestamp", Timestamp),
    col("order_delivered_carrier_date", Timestamp),
    col("order_delivered_customer_date", Timestamp),
    col("order_estimated_delivery_date", Timestamp),
];

const ORDER_ITEMS: &[ColumnSpec] = &[
    col("order_id", Text),
    col("product_id", Text),
    col("seller_id", Text),
    col("shipping_limit_date", Timestamp),
    col("price", Float),
    col("freight_value", Float),
];

const ORDER_REVIEWS: &[ColumnSpec] = &[
    col("review_id", Text),
    col("order_id", Text),
    col("review_score", Integer),
];

const SELLERS: &[ColumnSpec] = &[
    col("seller_id", Text),
    col("seller_zip_code_prefix", Text),
    col("seller_city", Text),
    col("seller_state", Text),
];

const CUSTOMERS: &[ColumnSpec] = &[
    col("customer_id", Text),
    col("customer_zip_code_prefix", Text),
];

const GEOLOCATION: &[ColumnSpec] = &[
    col("geolocation_zip_code_prefix", Text),
    col("geolocation_lat", Float),
    col("geolocation_lng", Float),
];

// ============================================================================
// Entity tables
// ============================================================================

/// The six named tables supplied by the entity store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Orders,
    OrderItems,
    OrderReviews,
    Sellers,
    Customers,
    Geolocation,
}

impl Table {
    /// All tables, in snapshot storage order.
    pub const ALL: [Table; 6] = [
        Table::Orders,
        Table::OrderItems,
        Table::OrderReviews,
        Table::Sellers,
        Table::Customers,
        Table::Geolocation,
    ];

    /// Name under which the entity store serves this table.
    pub fn name(self) -> &'static str {
        match self {
            Table::Orders => "orders",
            Table::OrderItems => "order_items",
            Table::OrderReviews => "order_reviews",
            Table::Sellers => "sellers",
            Table::Customers => "customers",
            Table::Geolocation => "geolocation",
        }
    }

    /// Columns the pipeline reads from this table.
    pub fn columns(self) -> &'static [ColumnSpec] {
        match self {
            Table::Orders => ORDERS,
            Table::OrderItems => ORDER_ITEMS,
            Table::OrderReviews => ORDER_REVIEWS,
            Table::Sellers => SELLERS,
            Table::Customers => CUSTOMERS,
            Table::Geolocation => GEOLOCATION,
        }
    }

    /// Arrow schema of the normalized table. All columns are nullable; the
    /// raw data has gaps (e.g. undelivered orders have no delivery date).
    pub fn schema(self) -> Schema {
        Schema::new(
            self.columns()
                .iter()
                .map(|c| Field::new(c.name, c.kind.data_type(), true))
                .collect::<Vec<_>>(),
        )
    }
}

// ============================================================================
// Output column names
// ============================================================================

/// Columns of the cross-reference table, in output order.
pub const CROSS_REFERENCE_COLUMNS: [&str; 5] =
    ["order_id", "product_id", "seller_id", "review_id", "customer_id"];

/// Columns of the order training table, in output order. The distance column
/// is only present when requested.
pub const ORDER_FEATURE_COLUMNS: [&str; 12] = [
    "order_id",
    "wait_time",
    "expected_wait_time",
    "delay_vs_expected",
    "order_status",
    "dim_is_five_star",
    "dim_is_one_star",
    "review_score",
    "number_of_products",
    "number_of_sellers",
    "price",
    "freight_value",
];

pub const DISTANCE_COLUMN: &str = "distance_seller_customer";

/// Columns of the seller training table, in output order.
pub const SELLER_FEATURE_COLUMNS: [&str; 15] = [
    "seller_id",
    "seller_city",
    "seller_state",
    "delay_to_carrier",
    "wait_time",
    "date_first_sale",
    "date_last_sale",
    "share_of_one_stars",
    "share_of_five_stars",
    "review_score",
    "review_cost",
    "n_orders",
    "quantity",
    "quantity_per_order",
    "sales",
];
