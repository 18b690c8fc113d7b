//! Order-level metrics and the order training table.
//!
//! Every metric is an independent query over the snapshot returning one row
//! per `order_id` (the review table keeps one row per review). The training
//! table inner-joins them in a fixed order and drops incomplete rows.

use std::sync::Arc;

use arrow::array::ArrayRef;
use arrow::record_batch::RecordBatch;
use tracing::{debug, info};

use crate::engine::SqlEngine;
use crate::error::FeatureError;
use crate::geo::{distance_column, reduce_geolocation};
use crate::pipeline::PipelineConfig;
use crate::schema::{DISTANCE_COLUMN, Table};
use crate::store::Snapshot;
use crate::table::{ensure_unique_key, f64_column, not_null_predicate, sql_literal, string_column};
use crate::xref::cross_reference;

const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Whole days between two timestamp columns, floored like a timedelta's
/// `days` component.
fn elapsed_days(from: &str, to: &str) -> String {
    format!(
        "CAST(floor((CAST({to} AS BIGINT) - CAST({from} AS BIGINT)) / {MICROS_PER_DAY}.0) AS BIGINT)"
    )
}

pub struct OrderFeatureBuilder<'a> {
    snapshot: &'a Snapshot,
    engine: &'a SqlEngine,
    config: &'a PipelineConfig,
}

impl<'a> OrderFeatureBuilder<'a> {
    pub fn new(snapshot: &'a Snapshot, engine: &'a SqlEngine, config: &'a PipelineConfig) -> Self {
        Self {
            snapshot,
            engine,
            config,
        }
    }

    /// `order_id, wait_time, expected_wait_time, delay_vs_expected, order_status`
    /// for delivered orders only.
    ///
    /// Wait times are whole days from purchase. `delay_vs_expected` is the
    /// positive part of `wait_time - expected_wait_time`; it is 0 when either
    /// side is missing.
    pub fn wait_time(&self) -> Result<RecordBatch, FeatureError> {
        let sql = format!(
            "SELECT order_id, wait_time, expected_wait_time,
                    CASE WHEN wait_time - expected_wait_time > 0
                         THEN wait_time - expected_wait_time
                         ELSE 0 END AS delay_vs_expected,
                    order_status
             FROM (
                 SELECT order_id,
                        {wait} AS wait_time,
                        {expected} AS expected_wait_time,
                        order_status
                 FROM orders
                 WHERE order_status = {status}
             ) AS delivered",
            wait = elapsed_days("order_purchase_timestamp", "order_delivered_customer_date"),
            expected = elapsed_days("order_purchase_timestamp", "order_estimated_delivery_date"),
            status = sql_literal(&self.config.delivered_status),
        );
        self.engine
            .query(&sql, &[("orders", self.snapshot.table(Table::Orders))])
    }

    /// `order_id, dim_is_five_star, dim_is_one_star, review_score`, one row
    /// per review. A null score sets neither flag.
    pub fn review_score(&self) -> Result<RecordBatch, FeatureError> {
        self.engine.query(
            "SELECT order_id,
                    CASE WHEN review_score = 5 THEN 1 ELSE 0 END AS dim_is_five_star,
                    CASE WHEN review_score = 1 THEN 1 ELSE 0 END AS dim_is_one_star,
                    review_score
             FROM order_reviews",
            &[("order_reviews", self.snapshot.table(Table::OrderReviews))],
        )
    }

    /// `order_id, number_of_products`: item rows per order. A product bought
    /// twice counts twice.
    pub fn number_of_products(&self) -> Result<RecordBatch, FeatureError> {
        self.grouped_items(
            "number_of_products",
            "SELECT order_id, count(*) AS number_of_products
             FROM order_items GROUP BY order_id",
        )
    }

    /// `order_id, number_of_sellers`: distinct sellers per order.
    pub fn number_of_sellers(&self) -> Result<RecordBatch, FeatureError> {
        self.grouped_items(
            "number_of_sellers",
            "SELECT order_id, count(DISTINCT seller_id) AS number_of_sellers
             FROM order_items GROUP BY order_id",
        )
    }

    /// `order_id, price, freight_value`: totals per order.
    pub fn price_and_freight(&self) -> Result<RecordBatch, FeatureError> {
        self.grouped_items(
            "price_and_freight",
            "SELECT order_id, sum(price) AS price, sum(freight_value) AS freight_value
             FROM order_items GROUP BY order_id",
        )
    }

    fn grouped_items(&self, name: &str, sql: &str) -> Result<RecordBatch, FeatureError> {
        let table = self
            .engine
            .query(sql, &[("order_items", self.snapshot.table(Table::OrderItems))])?;
        ensure_unique_key(&table, name, "order_id")?;
        Ok(table)
    }

    /// `order_id, distance_seller_customer`: mean seller-to-customer distance
    /// in kilometers.
    ///
    /// Each distinct (order, seller, customer) triple from the cross
    /// reference is located through the reduced geolocation table, once by
    /// seller zip prefix and once by customer zip prefix. An order with
    /// several sellers gets the unweighted mean over those sellers.
    pub fn distance_seller_customer(&self) -> Result<RecordBatch, FeatureError> {
        let xref = cross_reference(self.snapshot, self.engine)?;
        let geolocation = reduce_geolocation(
            self.snapshot.table(Table::Geolocation),
            self.config.geo_reducer,
        )?;
        ensure_unique_key(&geolocation, "geolocation", "geolocation_zip_code_prefix")?;

        let located = self.engine.query(
            "SELECT DISTINCT x.order_id, x.seller_id, x.customer_id,
                    sg.geolocation_lng AS seller_lng,
                    sg.geolocation_lat AS seller_lat,
                    cg.geolocation_lng AS customer_lng,
                    cg.geolocation_lat AS customer_lat
             FROM cross_reference x
             JOIN customers c ON x.customer_id = c.customer_id
             JOIN sellers s ON x.seller_id = s.seller_id
             JOIN geolocation sg ON s.seller_zip_code_prefix = sg.geolocation_zip_code_prefix
             JOIN geolocation cg ON c.customer_zip_code_prefix = cg.geolocation_zip_code_prefix
             ORDER BY x.order_id, x.seller_id, x.customer_id",
            &[
                ("cross_reference", &xref),
                ("customers", self.snapshot.table(Table::Customers)),
                ("sellers", self.snapshot.table(Table::Sellers)),
                ("geolocation", &geolocation),
            ],
        )?;

        let name = "seller_customer_locations";
        let distances = distance_column(
            f64_column(&located, name, "seller_lng")?,
            f64_column(&located, name, "seller_lat")?,
            f64_column(&located, name, "customer_lng")?,
            f64_column(&located, name, "customer_lat")?,
        );
        let order_ids = string_column(&located, name, "order_id")?.clone();
        let per_seller = RecordBatch::try_from_iter(vec![
            ("order_id", Arc::new(order_ids) as ArrayRef),
            (DISTANCE_COLUMN, Arc::new(distances) as ArrayRef),
        ])?;
        debug!("Located {} seller-customer pairs", per_seller.num_rows());

        let table = self.engine.query(
            &format!(
                "SELECT order_id, avg({DISTANCE_COLUMN}) AS {DISTANCE_COLUMN}
                 FROM seller_customer_distances
                 GROUP BY order_id
                 ORDER BY order_id"
            ),
            &[("seller_customer_distances", &per_seller)],
        )?;
        ensure_unique_key(&table, "distance_seller_customer", "order_id")?;
        Ok(table)
    }

    /// The order training table.
    ///
    /// Inner-joins wait time, review score, product count, seller count and
    /// price/freight on `order_id` (in that order) and drops every row with a
    /// null. With `with_distance`, the seller-customer distance is joined
    /// last and rows without a distance are dropped too.
    pub fn training_table(&self, with_distance: bool) -> Result<RecordBatch, FeatureError> {
        let wait_time = self.wait_time()?;
        let review_score = self.review_score()?;
        let number_of_products = self.number_of_products()?;
        let number_of_sellers = self.number_of_sellers()?;
        let price_and_freight = self.price_and_freight()?;

        let selected = [
            "w.order_id",
            "w.wait_time",
            "w.expected_wait_time",
            "w.delay_vs_expected",
            "w.order_status",
            "r.dim_is_five_star",
            "r.dim_is_one_star",
            "r.review_score",
            "p.number_of_products",
            "s.number_of_sellers",
            "f.price",
            "f.freight_value",
        ];
        let sql = format!(
            "SELECT {columns}
             FROM wait_time w
             JOIN review_score r ON w.order_id = r.order_id
             JOIN number_of_products p ON w.order_id = p.order_id
             JOIN number_of_sellers s ON w.order_id = s.order_id
             JOIN price_and_freight f ON w.order_id = f.order_id
             WHERE {complete}
             ORDER BY w.order_id, r.review_score",
            columns = selected.join(", "),
            complete = not_null_predicate(&selected),
        );
        let orders = self.engine.query(
            &sql,
            &[
                ("wait_time", &wait_time),
                ("review_score", &review_score),
                ("number_of_products", &number_of_products),
                ("number_of_sellers", &number_of_sellers),
                ("price_and_freight", &price_and_freight),
            ],
        )?;
        debug!(
            "{} delivered orders, {} with complete metrics",
            wait_time.num_rows(),
            orders.num_rows()
        );

        let orders = if with_distance {
            let distance = self.distance_seller_customer()?;
            self.engine.query(
                &format!(
                    "SELECT o.*, d.{DISTANCE_COLUMN}
                     FROM orders o
                     JOIN distance d ON o.order_id = d.order_id
                     WHERE d.{DISTANCE_COLUMN} IS NOT NULL
                     ORDER BY o.order_id, o.review_score"
                ),
                &[("orders", &orders), ("distance", &distance)],
            )?
        } else {
            orders
        };

        info!(
            "Order training table: {} rows, {} columns",
            orders.num_rows(),
            orders.num_columns()
        );
        Ok(orders)
    }
}
