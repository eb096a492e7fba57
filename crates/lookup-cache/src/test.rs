//! Helpers for testing code that uses a [`LookupCache`](crate::LookupCache).
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all console output
//!    is captured by the test runner.
//!
//!  - Expiration is measured with `tokio::time` when this module is compiled in, so tests can
//!    use `tokio::time::pause` and `tokio::time::advance` instead of sleeping.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

use crate::Fetcher;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `lookup_cache` crate and mutes all
///    other logs.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("lookup_cache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A [`Fetcher`] that records every fetched key.
///
/// Each fetch resolves to `"{key}:{n}"`, where `n` counts all fetches of this fetcher (and its
/// clones), starting at `1`. A failing fetcher returns the same string as error.
#[derive(Clone, Debug, Default)]
pub struct CountingFetcher {
    calls: Arc<Mutex<Vec<String>>>,
    latency: Duration,
    failing: bool,
}

impl CountingFetcher {
    /// Creates a fetcher that succeeds immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every fetch by `latency`, using `tokio::time::sleep`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every fetch fail.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    /// All keys fetched so far, in the order the fetches were started.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// The number of fetches started so far.
    pub fn count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

impl Fetcher for CountingFetcher {
    type Value = String;
    type Error = String;
    type Future = BoxFuture<'static, Result<String, String>>;

    fn fetch(&self, key: String) -> Self::Future {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(key.clone());
            calls.len()
        };
        let latency = self.latency;
        let failing = self.failing;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let res = format!("{key}:{n}");
            if failing { Err(res) } else { Ok(res) }
        })
    }
}
