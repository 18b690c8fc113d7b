//! Builds the order and seller training tables from a directory of
//! marketplace exports.
//!
//! ## Input
//!
//! A directory holding `orders`, `order_items`, `order_reviews`, `sellers`,
//! `customers` and `geolocation`, each as `<table>.parquet`, `<table>.csv`
//! or `olist_<table>_dataset.csv`.
//!
//! ## Output
//!
//! - `orders.parquet`: one row per delivered, reviewed order
//! - `sellers.parquet`: one row per seller with complete metrics
//!
//! ## Usage
//!
//! ```sh
//! cargo run --release --bin build_features -- --data-dir data/olist --output-dir out --with-distance
//! ```

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use confluence::{DurationUnit, GeoReducer, Pipeline, PipelineConfig, Snapshot};
use estuary::{DirectoryStore, write_parquet};
use indicatif::{HumanDuration, ProgressBar, ProgressStyle};
use tracing::info;

#[derive(Parser, Debug)]
#[command(about = "Build order and seller training tables from marketplace exports")]
struct Args {
    /// Directory containing the six entity tables.
    #[arg(long)]
    data_dir: PathBuf,

    /// Directory to write `orders.parquet` and `sellers.parquet` into.
    #[arg(long)]
    output_dir: PathBuf,

    /// Add the mean seller-customer distance to the order table.
    #[arg(long, default_value_t = false)]
    with_distance: bool,

    /// How duplicate zip prefixes in the geolocation table are collapsed
    /// (`first` or `centroid`).
    #[arg(long, default_value_t = GeoReducer::First)]
    geo_reducer: GeoReducer,

    /// Unit of seller delay and wait times (`hours` or `days`).
    #[arg(long, default_value_t = DurationUnit::Hours)]
    duration_unit: DurationUnit,

    /// Order status marking an order as delivered.
    #[arg(long, default_value = "delivered")]
    delivered_status: String,

    /// Rows scanned to infer CSV column types (default: whole file).
    #[arg(long)]
    infer_records: Option<usize>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    info!("Data dir: {}", args.data_dir.display());
    info!("Output:   {}", args.output_dir.display());
    fs::create_dir_all(&args.output_dir)?;

    let start = std::time::Instant::now();
    let pb = ProgressBar::new(3);
    pb.set_style(
        ProgressStyle::with_template("  {msg:<10} {bar:40.cyan/blue} {pos}/{len} [{elapsed_precise}]")?
            .progress_chars("##-"),
    );

    // ── Step 1: Load and normalize ─────────────────────────────────────
    pb.set_message("Loading");
    let mut store = DirectoryStore::new(&args.data_dir);
    if let Some(records) = args.infer_records {
        store = store.with_infer_records(records);
    }
    let snapshot = Snapshot::from_store(&store)?;
    pb.inc(1);

    let config = PipelineConfig {
        geo_reducer: args.geo_reducer,
        duration_unit: args.duration_unit,
        delivered_status: args.delivered_status,
    };
    let pipeline = Pipeline::new(snapshot, config)?;

    // ── Step 2: Order table ────────────────────────────────────────────
    pb.set_message("Orders");
    let orders = pipeline.order_training_table(args.with_distance)?;
    write_parquet(&args.output_dir.join("orders.parquet"), &orders)?;
    pb.inc(1);

    // ── Step 3: Seller table ───────────────────────────────────────────
    pb.set_message("Sellers");
    let sellers = pipeline.seller_training_table()?;
    write_parquet(&args.output_dir.join("sellers.parquet"), &sellers)?;
    pb.inc(1);
    pb.finish_and_clear();

    info!(
        "Orders: {} rows x {} columns, sellers: {} rows x {} columns",
        orders.num_rows(),
        orders.num_columns(),
        sellers.num_rows(),
        sellers.num_columns()
    );
    info!("Done in {}", HumanDuration(start.elapsed()));
    Ok(())
}
