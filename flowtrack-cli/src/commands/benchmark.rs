//! Benchmarking command implementation for the flowtrack CLI
//!
//! Packets are sharded by flow hash over blocking workers. Each worker owns
//! its own tracker, so no flow is ever seen by two trackers.

use anyhow::{bail, Context, Result};
use flowtrack_common::metrics::Histogram;
use flowtrack_common::{AnyFlowKey, Error, FlowKey};
use flowtrack_core::{FlowTracker, Observation, TrackerConfig};
use futures::future::join_all;
use log::{debug, info};
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::{sync::Arc, time::Instant};

use crate::utils::{format_duration, is_ipv6_flow, synthetic_key, synthetic_ttl};

/// Packets timed together as one latency sample.
const BATCH_SIZE: usize = 1024;

/// Percentage of benchmark flows that are IPv6.
const IPV6_SHARE: u8 = 25;

fn shard_of(key: &AnyFlowKey, workers: usize) -> usize {
    let hash = match key {
        AnyFlowKey::V4(k) => k.flow_hash(),
        AnyFlowKey::V6(k) => k.flow_hash(),
    };
    hash as usize % workers
}

/// Build the synthetic traffic, already split into one packet list per worker.
fn build_shards(flows: u32, packets: usize, workers: usize) -> Vec<Vec<Observation>> {
    let keys: Vec<AnyFlowKey> = (0..flows)
        .map(|n| synthetic_key(n, is_ipv6_flow(n, IPV6_SHARE)))
        .collect();

    let mut rng = StdRng::seed_from_u64(0x5eed);
    let mut shards = vec![Vec::with_capacity(packets / workers + 1); workers];

    for i in 0..packets {
        let flow = rng.gen_range(0..flows);
        let key = keys[flow as usize];
        shards[shard_of(&key, workers)].push(Observation {
            timestamp_us: i as u64,
            key,
            ttl: synthetic_ttl(flow),
        });
    }

    shards
}

/// What one worker saw
#[derive(Debug, Clone, Default)]
struct WorkerResult {
    packets: usize,
    new_flows: u64,
    rejected: u64,
}

fn run_worker(
    config: TrackerConfig,
    packets: Vec<Observation>,
    latency: Arc<Histogram>,
) -> flowtrack_common::Result<WorkerResult> {
    let mut tracker: FlowTracker = FlowTracker::with_config(config)?;
    let mut result = WorkerResult {
        packets: packets.len(),
        ..Default::default()
    };

    for batch in packets.chunks(BATCH_SIZE) {
        let start = Instant::now();
        for obs in batch {
            match tracker.analyze_observation(obs) {
                Ok(analysis) if analysis.new_flow => result.new_flows += 1,
                Ok(_) => {}
                Err(Error::CapacityExceeded { .. }) => result.rejected += 1,
                Err(e) => return Err(e),
            }
        }
        let per_packet = start.elapsed().as_nanos() as u64 / batch.len() as u64;
        latency.observe(per_packet);
    }

    debug!(
        "Worker done: {} flows, longest probe {}",
        tracker.len_v4() + tracker.len_v6(),
        tracker.max_probe_len()
    );
    Ok(result)
}

/// Run the benchmark with the specified parameters
pub async fn run_benchmark(
    flows: u32,
    packets: usize,
    workers: usize,
    config: TrackerConfig,
) -> Result<()> {
    if flows == 0 || workers == 0 {
        bail!("--flows and --workers must be at least 1");
    }

    info!(
        "Running benchmark: flows={}, packets={}, workers={}, max_flows={}",
        flows, packets, workers, config.max_flows
    );

    println!("Starting flowtrack benchmark");
    println!("============================");
    println!("Parameters:");
    println!("  Flows: {}", flows);
    println!("  Packets: {}", packets);
    println!("  Workers: {}", workers);
    println!("  Capacity per family and worker: {}", config.max_flows);
    println!();

    let shards = build_shards(flows, packets, workers);
    let latency = Arc::new(Histogram::exponential(1, 100_000, 24));

    println!("Running benchmark...");
    let start_time = Instant::now();

    let tasks = shards.into_iter().map(|shard| {
        let latency = Arc::clone(&latency);
        tokio::task::spawn_blocking(move || run_worker(config, shard, latency))
    });

    let mut total = WorkerResult::default();
    for joined in join_all(tasks).await {
        let result = joined.context("Benchmark worker panicked")??;
        total.packets += result.packets;
        total.new_flows += result.new_flows;
        total.rejected += result.rejected;
    }

    let elapsed = start_time.elapsed();
    print_benchmark_results(&total, elapsed, &latency);

    Ok(())
}

/// Print the benchmark results
fn print_benchmark_results(
    results: &WorkerResult,
    elapsed: std::time::Duration,
    latency: &Histogram,
) {
    println!("\nBenchmark Results");
    println!("=================");
    println!("Packets analyzed: {}", results.packets);
    println!("Flows created: {}", results.new_flows);
    println!("Packets rejected (table full): {} ({:.2}%)",
        results.rejected,
        (results.rejected as f64 / results.packets.max(1) as f64) * 100.0
    );

    println!("\nTiming:");
    println!("Total Time: {}", format_duration(elapsed));
    if elapsed.as_secs_f64() > 0.0 {
        println!("Throughput: {:.2} Mpps",
            results.packets as f64 / elapsed.as_secs_f64() / 1_000_000.0
        );
    }
    if latency.count() > 0 {
        println!("Per-packet latency (batch average):");
        println!("  avg: {:.1} ns", latency.average());
        println!("  p50: <= {} ns", latency.quantile(0.5));
        println!("  p99: <= {} ns", latency.quantile(0.99));
        println!("  max: {} ns", latency.max());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shards_partition_flows() {
        let shards = build_shards(100, 5_000, 4);
        assert_eq!(shards.iter().map(Vec::len).sum::<usize>(), 5_000);

        for (i, shard) in shards.iter().enumerate() {
            assert!(shard.iter().all(|obs| shard_of(&obs.key, 4) == i));
        }
    }

    #[test]
    fn test_worker_counts() {
        let shards = build_shards(50, 2_000, 1);
        let latency = Arc::new(Histogram::exponential(1, 1_000, 8));
        let result =
            run_worker(TrackerConfig::new(64), shards[0].clone(), latency.clone()).unwrap();

        assert_eq!(result.packets, 2_000);
        assert_eq!(result.rejected, 0);
        assert!(result.new_flows <= 50);
        assert_eq!(latency.count(), 2);
    }

    #[test]
    fn test_worker_reports_rejections() {
        let shards = build_shards(50, 2_000, 1);
        let latency = Arc::new(Histogram::exponential(1, 1_000, 8));
        let result = run_worker(TrackerConfig::new(2), shards[0].clone(), latency).unwrap();
        assert_eq!(result.new_flows, 4);
        assert!(result.rejected > 0);
    }
}
