//! Cross-reference table linking orders, reviews, customers, products and
//! sellers.
//!
//! Built with outer joins so that no order, review or item is lost; only used
//! to resolve geography. Counts always come from the raw item table.

use arrow::record_batch::RecordBatch;
use tracing::info;

use crate::engine::SqlEngine;
use crate::error::FeatureError;
use crate::schema::Table;
use crate::store::Snapshot;

const CROSS_REFERENCE_SQL: &str = "
WITH item_reviews AS (
    SELECT coalesce(i.order_id, r.order_id) AS order_id,
           i.product_id,
           i.seller_id,
           r.review_id
    FROM order_items i
    FULL OUTER JOIN order_reviews r ON i.order_id = r.order_id
)
SELECT * FROM (
    SELECT DISTINCT
           coalesce(ir.order_id, o.order_id) AS order_id,
           ir.product_id,
           ir.seller_id,
           ir.review_id,
           o.customer_id
    FROM item_reviews ir
    FULL OUTER JOIN orders o ON ir.order_id = o.order_id
) AS xref
ORDER BY order_id, product_id, seller_id, review_id, customer_id
";

/// Outer-join items, reviews and orders on `order_id` and drop exact
/// duplicate rows.
///
/// Every `order_id` found in any of the three tables appears at least once.
/// Columns with no join partner are null.
pub fn cross_reference(
    snapshot: &Snapshot,
    engine: &SqlEngine,
) -> Result<RecordBatch, FeatureError> {
    let table = engine.query(
        CROSS_REFERENCE_SQL,
        &[
            ("order_items", snapshot.table(Table::OrderItems)),
            ("order_reviews", snapshot.table(Table::OrderReviews)),
            ("orders", snapshot.table(Table::Orders)),
        ],
    )?;
    info!("Cross reference: {} rows", table.num_rows());
    Ok(table)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use arrow::array::{Array, AsArray};

    use super::*;
    use crate::fixtures;
    use crate::schema::CROSS_REFERENCE_COLUMNS;

    fn build() -> RecordBatch {
        let snapshot = Snapshot::from_tables(fixtures::marketplace()).unwrap();
        let engine = SqlEngine::new().unwrap();
        cross_reference(&snapshot, &engine).unwrap()
    }

    #[test]
    fn test_columns_in_declared_order() {
        let xref = build();
        let names: Vec<String> = xref
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, CROSS_REFERENCE_COLUMNS);
    }

    #[test]
    fn test_duplicate_item_rows_collapse() {
        // o1 has two identical (p1, s1) items; o2 two distinct items.
        // Rows: o1, o2 x2, o3, o4, o5, o9.
        let xref = build();
        assert_eq!(xref.num_rows(), 7);
    }

    #[test]
    fn test_every_order_from_any_input_is_retained() {
        let xref = build();
        let ids: HashSet<&str> = xref
            .column(0)
            .as_string::<i32>()
            .iter()
            .map(|v| v.unwrap())
            .collect();
        for id in ["o1", "o2", "o3", "o4", "o5", "o9"] {
            assert!(ids.contains(id), "{id} missing from cross reference");
        }
    }

    #[test]
    fn test_unmatched_columns_are_null() {
        let xref = build();
        let rows = fixtures::row_index(&xref, "order_id");
        let reviews = xref.column(3).as_string::<i32>();
        let customers = xref.column(4).as_string::<i32>();
        let products = xref.column(1).as_string::<i32>();

        // o3 has no review but is kept.
        assert!(reviews.is_null(rows["o3"]));
        assert_eq!(customers.value(rows["o3"]), "c3");

        // o9 only exists in the review table.
        assert_eq!(reviews.value(rows["o9"]), "r9");
        assert!(products.is_null(rows["o9"]));
        assert!(customers.is_null(rows["o9"]));
    }
}
