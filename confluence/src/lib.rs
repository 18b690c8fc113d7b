//! Order and seller feature tables for a multi-entity marketplace dataset.
//!
//! Raw entity tables come from an [`EntityStore`] and are normalized once into
//! a [`Snapshot`]. The order and seller builders derive one metric table per
//! feature, reduce each to one row per key, then inner-join them into the
//! training tables exposed by [`Pipeline`].

pub mod engine;
pub mod error;
pub mod geo;
pub mod order;
pub mod pipeline;
pub mod schema;
pub mod seller;
pub mod store;
pub mod table;
pub mod xref;

#[cfg(test)]
mod fixtures;

pub use error::FeatureError;
pub use geo::GeoReducer;
pub use pipeline::{DurationUnit, Pipeline, PipelineConfig};
pub use schema::Table;
pub use store::{EntityStore, Snapshot};
