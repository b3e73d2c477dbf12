//! qrcache - offline resource cache manager for the QR generator app.
//!
//! The crate persists a versioned set of application assets, serves
//! requests from that set ahead of the network, transparently populates
//! the cache from live responses, and retires stale asset generations
//! when a new version is installed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use qrcache::manifest::Manifest;
//! use qrcache::net::HttpFetcher;
//! use qrcache::{LifecycleController, Request, SqliteStore};
//!
//! # async fn example() -> qrcache::Result<()> {
//! let origin = url::Url::parse("https://qr.example.app").unwrap();
//! let store = Arc::new(SqliteStore::open_default()?);
//! let fetcher = Arc::new(HttpFetcher::new()?);
//!
//! let manifest = Manifest::current();
//! let mut controller =
//!   LifecycleController::new(&manifest, &origin, store, fetcher, "/index.html")?;
//! controller.install().await?;
//! controller.activate()?;
//!
//! let request = Request::get(origin.join("/style.css").unwrap());
//! let resolved = controller.intercept(&request).await?;
//! println!("{} bytes", resolved.snapshot.body.len());
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod manifest;
pub mod net;

pub use cache::{
  Destination, GenerationLabel, GenerationStore, LifecycleController, Phase, Request, Resolved,
  ResourceId, ServedFrom, Snapshot, SqliteStore,
};
pub use error::{CacheError, Result};
