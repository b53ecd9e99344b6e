// Quote Sync - Core Library
// Exposes all modules for use in the CLI, the mock server, and tests

pub mod quote;
pub mod reconciliation;
pub mod remote;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod config;

#[cfg(feature = "server")]
pub mod server;

// Re-export commonly used types
pub use quote::{
    ingest, Ingested, MalformedRecordError, Origin, Quote, QuoteRecord, RecordSet, Rejected,
};
pub use reconciliation::{MergeResult, Overwrite, ReconciliationEngine};
pub use remote::{fetch_remote, FetchError, HttpRemoteSource, PayloadFormat, RemoteSource};
pub use store::{MemoryStore, SqliteStore, Store, SyncEvent};
pub use sync::{
    add_quote, push_quote, schedule_store_sync, schedule_sync, sync_once, PushOutcome,
    SyncError, SyncHandle, SyncOutcome,
};
pub use transfer::{merge_import, read_csv, read_json, write_csv, write_json, ImportReport};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `tracing` subscriber used by both binaries.
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,quote_sync=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}
