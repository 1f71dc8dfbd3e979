pub mod download;
pub mod export;
pub mod loader;

pub use download::{sha256_hex, DatasetFetcher};
pub use export::{export_table, table_to_jsonl};
pub use loader::{load_store, parse_record, StoreSchema};
