//! Synchronous SQL over in-memory record batches.
//!
//! Joins and group-bys are delegated to DataFusion. Each query runs in a fresh
//! session that only sees the batches passed to it, so every derivation
//! declares its inputs explicitly and no state leaks between calls.

use arrow::compute::concat_batches;
use arrow::datatypes::SchemaRef;
use arrow::record_batch::RecordBatch;
use datafusion::prelude::{SessionConfig, SessionContext};
use tracing::debug;

use crate::error::FeatureError;

pub struct SqlEngine {
    runtime: tokio::runtime::Runtime,
}

impl SqlEngine {
    pub fn new() -> Result<Self, FeatureError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(Self { runtime })
    }

    /// Run `sql` against the given `(name, batch)` inputs and collect the
    /// result into a single batch.
    ///
    /// Sessions use a single target partition: aggregation order, and hence
    /// every floating-point sum and mean, is identical across runs.
    pub fn query(
        &self,
        sql: &str,
        inputs: &[(&str, &RecordBatch)],
    ) -> Result<RecordBatch, FeatureError> {
        self.runtime.block_on(async {
            let config = SessionConfig::new()
                .with_target_partitions(1)
                .set_bool("datafusion.sql_parser.enable_ident_normalization", false);
            let ctx = SessionContext::new_with_config(config);
            for (name, batch) in inputs {
                ctx.register_batch(name, (*batch).clone())?;
            }

            let df = ctx.sql(sql).await?;
            let schema: SchemaRef = df.schema().inner().clone();
            let batches = df.collect().await?;

            let result = match batches.first() {
                None => RecordBatch::new_empty(schema),
                Some(first) if batches.len() == 1 => first.clone(),
                Some(first) => concat_batches(&first.schema(), &batches)?,
            };
            debug!("query returned {} rows", result.num_rows());
            Ok::<_, FeatureError>(result)
        })
    }
}
