//! # userstore — a per-account hierarchical key-value store
//!
//! Each account gets its own tree of keys: a node is either a collection
//! (an inner node) or a leaf (a blob). Clients create, update, fetch,
//! enumerate (index-only or full dump), and delete arbitrary subtrees over
//! HTTP. The tree is persisted in an embedded, single-file, bucketed
//! key-value store — one bucket per account.
//!
//! ## Layers
//!
//! 1. [`persistence`] — the embedded, file-backed key-value store.
//! 2. [`store`] — enforces the tree invariants on top of the flat store.
//! 3. [`http`] — the HTTP surface: routing, request/response shapes, errors.
//! 4. [`client`] — a wire client for callers embedding the HTTP surface.
//!
//! Dependency order (leaves first): persistence → store → http.
//!
//! ```ignore
//! use userstore::{Config, Db, StoreService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml")?;
//!     let db = Arc::new(Db::open(&config.db_path).await?);
//!     let store = Arc::new(StoreService::new(db));
//!     // ... build the router and serve it
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod config;
pub mod entry;
pub mod error;
pub mod hash;
pub mod http;
pub mod persistence;
pub mod store;

pub use client::StoreClient;
pub use config::Config;
pub use entry::Entry;
pub use error::{StoreError, StoreResult};
pub use hash::{hash_key, AccountHash, KeyHash};
pub use http::{create_router, AppState};
pub use persistence::Db;
pub use store::{Node, StoreService};

/// Initialize structured logging. Call once at process startup.
///
/// Verbosity is controlled via the `USERSTORE_LOG` environment variable
/// (`error`, `warn`, `info`, `debug`, `trace`); defaults to `info`.
pub fn init_logging() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("USERSTORE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
