use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use lookup_cache::CacheConfig;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::workloads::{WorkloadsConfig, prepare_workload, process_workload};

pub async fn perform_stresstest(
    cache_config: CacheConfig,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    // initialize workloads
    let workloads = workloads
        .workloads
        .into_iter()
        .enumerate()
        .map(|(i, workload)| {
            prepare_workload(i, &cache_config, workload).map(Arc::new)
        })
        .collect::<Result<Vec<_>>>()
        .context("failed to prepare workloads")?;

    // warmup: run each workload once to make sure caches are warm
    {
        let start = Instant::now();

        let futures = workloads.iter().map(|workload| {
            let workload = Arc::clone(workload);
            tokio::spawn(async move {
                process_workload(&workload).await;
            })
        });

        let _results = futures::future::join_all(futures).await;

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for workload in workloads.iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let workload = Arc::clone(workload);
        let concurrency = workload.concurrency;

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let failures = Arc::new(AtomicUsize::new(0));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let workload = Arc::clone(&workload);
                        let task_durations = Arc::clone(&task_durations);
                        let failures = Arc::clone(&failures);
                        let task_start = Instant::now();

                        tokio::spawn(async move {
                            if !process_workload(&workload).await {
                                failures.fetch_add(1, Ordering::Relaxed);
                            }

                            if let Ok(mut task_durations) = task_durations.lock() {
                                task_durations.add(task_start.elapsed().as_secs_f64());
                            }

                            drop(permit);
                        });
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations = task_durations
                .lock()
                .map(|mut task_durations| std::mem::take(&mut *task_durations))
                .unwrap_or_default();

            (task_durations, failures.load(Ordering::Relaxed))
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, (task, workload)) in finished_tasks.into_iter().zip(&workloads).enumerate() {
        let (task_durations, failures) = task.context("stresstest task panicked")?;
        let concurrency = workload.concurrency;

        let ops = task_durations.count();
        let ops_ps = ops as f32 / duration.as_secs_f32();
        let fetches = workload.fetcher.fetches();
        let hit_ratio = 1.0 - fetches as f32 / ops.max(1) as f32;
        println!("Workload {i} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");
        println!("  fetches: {fetches}; hit ratio: {hit_ratio:.2}; failed lookups: {failures}");

        if ops == 0 {
            continue;
        }
        let quantile = |q| {
            let secs = task_durations.quantile(q).ok().flatten().unwrap_or_default();
            Duration::from_secs_f64(secs)
        };
        let avg = Duration::from_secs_f64(task_durations.sum().unwrap_or_default() / ops as f64);
        let (p50, p90, p99) = (quantile(0.5), quantile(0.9), quantile(0.99));
        println!("  avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}");
        tracing::debug!(cache = ?workload.cache, "Finished workload {i}");
    }

    Ok(())
}
