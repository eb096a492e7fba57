//! An in-memory cache for async lookups keyed by string identifiers.
//!
//! The [`LookupCache`] does three things at once:
//!
//! - It coalesces concurrent requests, so that at most one fetch per key is running at any time.
//! - It bounds the number of stored results using two rotating generations, an approximation of
//!   least-recently-used eviction that needs no per-entry bookkeeping.
//! - It expires results, failures included, after an optional maximum age.
//!
//! The actual lookup is provided by a [`Fetcher`], which any `Fn(String) -> Future` closure
//! implements:
//!
//! ```no_run
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! use std::time::Duration;
//! use lookup_cache::{CacheConfig, LookupCache};
//!
//! let fetch = |key: String| async move { Ok::<_, String>(format!("hello {key}")) };
//! let config = CacheConfig::new(1_000).with_max_age(Duration::from_secs(60));
//! let cache = LookupCache::new(fetch, config)?;
//!
//! assert_eq!(cache.get("world").await?, "hello world");
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

#[macro_use]
pub mod metrics;

mod cache;
mod config;
mod defer;
mod entry;
mod error;
mod fetcher;
mod generations;

pub use cache::*;
pub use config::*;
pub use error::*;
pub use fetcher::*;

#[cfg(any(feature = "test", test))]
#[allow(unused)]
pub mod test;


#[cfg(any(test, feature = "test"))]
pub(crate) use tokio::time;

#[cfg(not(any(test, feature = "test")))]
pub(crate) use std::time;
