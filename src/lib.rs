use mimalloc::MiMalloc;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod store;
pub mod writer;

pub use store::{DirectoryStore, StoreError};
pub use writer::write_parquet;
