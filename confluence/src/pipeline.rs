//! Pipeline configuration and the two training-table entry points.

use std::fmt;
use std::str::FromStr;

use arrow::record_batch::RecordBatch;
use tracing::info;

use crate::engine::SqlEngine;
use crate::error::FeatureError;
use crate::geo::GeoReducer;
use crate::order::OrderFeatureBuilder;
use crate::seller::SellerFeatureBuilder;
use crate::store::Snapshot;
use crate::xref::cross_reference;

// ============================================================================
// Configuration
// ============================================================================

/// Unit of the seller-level durations `delay_to_carrier` and `wait_time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationUnit {
    #[default]
    Hours,
    Days,
}

impl DurationUnit {
    pub fn micros(self) -> i64 {
        match self {
            DurationUnit::Hours => 3_600_000_000,
            DurationUnit::Days => 86_400_000_000,
        }
    }
}

impl fmt::Display for DurationUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DurationUnit::Hours => "hours",
            DurationUnit::Days => "days",
        })
    }
}

impl FromStr for DurationUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hours" | "h" => Ok(DurationUnit::Hours),
            "days" | "d" => Ok(DurationUnit::Days),
            other => Err(format!("unknown duration unit '{other}' (expected hours or days)")),
        }
    }
}

/// Knobs shared by the order and seller builders.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// How duplicate zip prefixes in the geolocation table are collapsed.
    pub geo_reducer: GeoReducer,
    /// Unit of seller-level durations.
    pub duration_unit: DurationUnit,
    /// `order_status` value that marks an order as delivered.
    pub delivered_status: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            geo_reducer: GeoReducer::First,
            duration_unit: DurationUnit::Hours,
            delivered_status: "delivered".to_string(),
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Owns a snapshot and a query engine and hands out builders over them.
pub struct Pipeline {
    snapshot: Snapshot,
    engine: SqlEngine,
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(snapshot: Snapshot, config: PipelineConfig) -> Result<Self, FeatureError> {
        info!(
            "Pipeline: geo reducer {}, durations in {}, delivered status {:?}",
            config.geo_reducer, config.duration_unit, config.delivered_status
        );
        Ok(Self {
            snapshot,
            engine: SqlEngine::new()?,
            config,
        })
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn orders(&self) -> OrderFeatureBuilder<'_> {
        OrderFeatureBuilder::new(&self.snapshot, &self.engine, &self.config)
    }

    pub fn sellers(&self) -> SellerFeatureBuilder<'_> {
        SellerFeatureBuilder::new(&self.snapshot, &self.engine, &self.config)
    }

    pub fn cross_reference(&self) -> Result<RecordBatch, FeatureError> {
        cross_reference(&self.snapshot, &self.engine)
    }

    /// One row per (delivered order, review) with every order metric present.
    pub fn order_training_table(&self, include_distance: bool) -> Result<RecordBatch, FeatureError> {
        self.orders().training_table(include_distance)
    }

    /// One row per seller with every seller metric present.
    pub fn seller_training_table(&self) -> Result<RecordBatch, FeatureError> {
        self.sellers().training_table()
    }
}
