use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use lookup_cache::{CacheConfig, Fetcher, LookupCache};
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize, Serialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Workload {
    pub concurrency: usize,
    /// The number of distinct keys, which are requested uniformly at random.
    pub keys: usize,
    /// How long each fetch takes.
    #[serde(default, with = "humantime_serde")]
    pub latency: Duration,
    /// The probability of a fetch failing.
    #[serde(default)]
    pub failure_rate: f64,
}

/// A [`Fetcher`] that simulates a remote lookup.
#[derive(Clone, Debug)]
pub struct SyntheticFetcher {
    latency: Duration,
    failure_rate: f64,
    fetches: Arc<AtomicUsize>,
}

impl SyntheticFetcher {
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Fetcher for SyntheticFetcher {
    type Value = Arc<str>;
    type Error = Arc<str>;
    type Future = BoxFuture<'static, Result<Arc<str>, Arc<str>>>;

    fn fetch(&self, key: String) -> Self::Future {
        self.fetches.fetch_add(1, Ordering::Relaxed);
        let latency = self.latency;
        let fails = rand::rng().random_bool(self.failure_rate);

        Box::pin(async move {
            tokio::time::sleep(latency).await;
            if fails {
                Err(format!("failed to fetch {key}").into())
            } else {
                Ok(key.into())
            }
        })
    }
}

/// A workload that is ready to run against its own cache.
pub struct PreparedWorkload {
    pub concurrency: usize,
    pub keys: usize,
    pub fetcher: SyntheticFetcher,
    pub cache: LookupCache<SyntheticFetcher>,
}

pub fn prepare_workload(
    index: usize,
    cache_config: &CacheConfig,
    workload: Workload,
) -> anyhow::Result<PreparedWorkload> {
    anyhow::ensure!(workload.keys > 0, "workload {index} needs at least one key");
    anyhow::ensure!(
        (0.0..=1.0).contains(&workload.failure_rate),
        "workload {index} needs a failure rate between 0 and 1"
    );

    let fetcher = SyntheticFetcher {
        latency: workload.latency,
        failure_rate: workload.failure_rate,
        fetches: Default::default(),
    };
    let config = cache_config
        .clone()
        .with_name(format!("{}-{index}", cache_config.name));
    let cache = LookupCache::new(fetcher.clone(), config)?;

    Ok(PreparedWorkload {
        concurrency: workload.concurrency,
        keys: workload.keys,
        fetcher,
        cache,
    })
}

/// Requests a random key of the workload. Returns whether the lookup succeeded.
pub async fn process_workload(workload: &PreparedWorkload) -> bool {
    let key = rand::rng().random_range(0..workload.keys);
    workload.cache.get(&format!("key-{key}")).await.is_ok()
}
