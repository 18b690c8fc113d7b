//! Seller-level metrics and the seller training table.
//!
//! Seller metrics aggregate raw item rows (quantity, sales) or item rows of
//! delivered orders (timings, active dates). Review quality is taken from
//! the order training table, so only reviewed, delivered orders count.

use std::sync::Arc;

use arrow::array::{ArrayRef, Float64Array, Int64Array};
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use crate::engine::SqlEngine;
use crate::error::FeatureError;
use crate::order::OrderFeatureBuilder;
use crate::pipeline::PipelineConfig;
use crate::schema::Table;
use crate::store::Snapshot;
use crate::table::{
    ensure_unique_key, i64_column, not_null_predicate, sql_literal, string_column, with_column,
};

/// Cost of a bad review, by score.
pub fn review_cost(score: i64) -> Result<i64, FeatureError> {
    match score {
        1 => Ok(100),
        2 => Ok(50),
        3 => Ok(40),
        4 | 5 => Ok(0),
        _ => Err(FeatureError::InvalidReviewScore { score }),
    }
}

pub struct SellerFeatureBuilder<'a> {
    snapshot: &'a Snapshot,
    engine: &'a SqlEngine,
    config: &'a PipelineConfig,
}

impl<'a> SellerFeatureBuilder<'a> {
    pub fn new(snapshot: &'a Snapshot, engine: &'a SqlEngine, config: &'a PipelineConfig) -> Self {
        Self {
            snapshot,
            engine,
            config,
        }
    }

    fn checked(&self, name: &str, table: RecordBatch) -> Result<RecordBatch, FeatureError> {
        ensure_unique_key(&table, name, "seller_id")?;
        debug!("{name}: {} sellers", table.num_rows());
        Ok(table)
    }

    /// `seller_id, seller_city, seller_state`
    pub fn seller_features(&self) -> Result<RecordBatch, FeatureError> {
        let table = self.engine.query(
            "SELECT seller_id, seller_city, seller_state FROM sellers",
            &[("sellers", self.snapshot.table(Table::Sellers))],
        )?;
        self.checked("seller_features", table)
    }

    /// `seller_id, delay_to_carrier, wait_time`, averaged over the seller's
    /// item rows in delivered orders and expressed in the configured unit.
    ///
    /// A carrier handover before the shipping limit counts as no delay. A
    /// missing timestamp leaves that row out of the mean.
    pub fn delay_wait_time(&self) -> Result<RecordBatch, FeatureError> {
        let sql = format!(
            "SELECT seller_id,
                    avg(CASE WHEN carrier_delay < 0 THEN 0.0 ELSE carrier_delay END) AS delay_to_carrier,
                    avg(wait) AS wait_time
             FROM (
                 SELECT i.seller_id,
                        (CAST(o.order_delivered_carrier_date AS BIGINT)
                            - CAST(i.shipping_limit_date AS BIGINT)) / {unit}.0 AS carrier_delay,
                        (CAST(o.order_delivered_customer_date AS BIGINT)
                            - CAST(o.order_purchase_timestamp AS BIGINT)) / {unit}.0 AS wait
                 FROM order_items i
                 JOIN orders o ON i.order_id = o.order_id
                 WHERE o.order_status = {status}
             ) AS shipped
             GROUP BY seller_id",
            unit = self.config.duration_unit.micros(),
            status = sql_literal(&self.config.delivered_status),
        );
        let table = self.engine.query(&sql, &self.items_and_orders())?;
        self.checked("delay_wait_time", table)
    }

    /// `seller_id, date_first_sale, date_last_sale`: earliest and latest
    /// purchase timestamp among the seller's delivered orders.
    pub fn active_dates(&self) -> Result<RecordBatch, FeatureError> {
        let sql = format!(
            "SELECT i.seller_id,
                    min(o.order_purchase_timestamp) AS date_first_sale,
                    max(o.order_purchase_timestamp) AS date_last_sale
             FROM order_items i
             JOIN orders o ON i.order_id = o.order_id
             WHERE o.order_status = {status}
             GROUP BY i.seller_id",
            status = sql_literal(&self.config.delivered_status),
        );
        let table = self.engine.query(&sql, &self.items_and_orders())?;
        self.checked("active_dates", table)
    }

    fn items_and_orders(&self) -> [(&'static str, &'a RecordBatch); 2] {
        [
            ("order_items", self.snapshot.table(Table::OrderItems)),
            ("orders", self.snapshot.table(Table::Orders)),
        ]
    }

    /// `seller_id, share_of_one_stars, share_of_five_stars, review_score,
    /// review_cost` from the order training table.
    ///
    /// Every distinct (order, seller) pair of the item table picks up the
    /// review rows of its order; the shares and the score are means over
    /// those rows and the cost is their sum.
    pub fn review_score(&self, order_table: &RecordBatch) -> Result<RecordBatch, FeatureError> {
        let reviewed = self.engine.query(
            "SELECT p.seller_id, o.dim_is_one_star, o.dim_is_five_star, o.review_score
             FROM (SELECT DISTINCT order_id, seller_id FROM order_items) AS p
             JOIN orders o ON p.order_id = o.order_id",
            &[
                ("order_items", self.snapshot.table(Table::OrderItems)),
                ("orders", order_table),
            ],
        )?;

        let scores = i64_column(&reviewed, "order_training_table", "review_score")?;
        let costs = scores
            .iter()
            .map(|score| score.map(review_cost).transpose())
            .collect::<Result<Int64Array, _>>()?;
        let reviewed = with_column(&reviewed, "review_cost", Arc::new(costs) as ArrayRef)?;

        let table = self.engine.query(
            "SELECT seller_id,
                    avg(dim_is_one_star) AS share_of_one_stars,
                    avg(dim_is_five_star) AS share_of_five_stars,
                    avg(review_score) AS review_score,
                    sum(review_cost) AS review_cost
             FROM reviewed
             GROUP BY seller_id",
            &[("reviewed", &reviewed)],
        )?;
        self.checked("review_score", table)
    }

    /// `seller_id, n_orders, quantity, quantity_per_order` over all item rows,
    /// whatever the order status.
    ///
    /// `n_orders` counts distinct orders and `quantity` counts item rows, so
    /// `quantity >= n_orders`.
    pub fn quantity(&self) -> Result<RecordBatch, FeatureError> {
        let counts = self.engine.query(
            "SELECT seller_id,
                    count(DISTINCT order_id) AS n_orders,
                    count(order_id) AS quantity
             FROM order_items
             WHERE seller_id IS NOT NULL
             GROUP BY seller_id",
            &[("order_items", self.snapshot.table(Table::OrderItems))],
        )?;

        let name = "quantity";
        let sellers = string_column(&counts, name, "seller_id")?;
        let n_orders = i64_column(&counts, name, "n_orders")?;
        let quantity = i64_column(&counts, name, "quantity")?;
        let per_order = (0..counts.num_rows())
            .map(|i| {
                if n_orders.value(i) == 0 {
                    return Err(FeatureError::DivisionByZero {
                        seller_id: sellers.value(i).to_string(),
                    });
                }
                Ok(Some(quantity.value(i) as f64 / n_orders.value(i) as f64))
            })
            .collect::<Result<Float64Array, _>>()?;

        let table = with_column(&counts, "quantity_per_order", Arc::new(per_order) as ArrayRef)?;
        self.checked("quantity", table)
    }

    /// `seller_id, sales`: total item price per seller.
    pub fn sales(&self) -> Result<RecordBatch, FeatureError> {
        let table = self.engine.query(
            "SELECT seller_id, sum(price) AS sales FROM order_items GROUP BY seller_id",
            &[("order_items", self.snapshot.table(Table::OrderItems))],
        )?;
        self.checked("sales", table)
    }

    /// The seller training table.
    ///
    /// Inner-joins features, delay and wait time, active dates, review score,
    /// quantity and sales on `seller_id` (in that order) and drops every row
    /// with a null. Review scores come from the order training table without
    /// distance.
    pub fn training_table(&self) -> Result<RecordBatch, FeatureError> {
        let order_table =
            OrderFeatureBuilder::new(self.snapshot, self.engine, self.config).training_table(false)?;

        let features = self.seller_features()?;
        let delay_wait_time = self.delay_wait_time()?;
        let active_dates = self.active_dates()?;
        let review_score = self.review_score(&order_table)?;
        let quantity = self.quantity()?;
        let sales = self.sales()?;

        let selected = [
            "f.seller_id",
            "f.seller_city",
            "f.seller_state",
            "d.delay_to_carrier",
            "d.wait_time",
            "a.date_first_sale",
            "a.date_last_sale",
            "r.share_of_one_stars",
            "r.share_of_five_stars",
            "r.review_score",
            "r.review_cost",
            "q.n_orders",
            "q.quantity",
            "q.quantity_per_order",
            "s.sales",
        ];
        let sql = format!(
            "SELECT {columns}
             FROM features f
             JOIN delay_wait_time d ON f.seller_id = d.seller_id
             JOIN active_dates a ON f.seller_id = a.seller_id
             JOIN review_score r ON f.seller_id = r.seller_id
             JOIN quantity q ON f.seller_id = q.seller_id
             JOIN sales s ON f.seller_id = s.seller_id
             WHERE {complete}
             ORDER BY f.seller_id",
            columns = selected.join(", "),
            complete = not_null_predicate(&selected),
        );
        let sellers = self.engine.query(
            &sql,
            &[
                ("features", &features),
                ("delay_wait_time", &delay_wait_time),
                ("active_dates", &active_dates),
                ("review_score", &review_score),
                ("quantity", &quantity),
                ("sales", &sales),
            ],
        )?;
        ensure_unique_key(&sellers, "seller_training_table", "seller_id")?;

        if sellers.num_rows() < features.num_rows() {
            debug!(
                "Dropped {} sellers with incomplete metrics",
                features.num_rows() - sellers.num_rows()
            );
        }
        info!(
            "Seller training table: {} rows, {} columns",
            sellers.num_rows(),
            sellers.num_columns()
        );
        Ok(sellers)
    }
}
