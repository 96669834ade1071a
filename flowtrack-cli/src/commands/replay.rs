//! Capture replay for the flowtrack CLI

use anyhow::{Context, Result};
use flowtrack_common::capture::CaptureReader;
use flowtrack_common::metrics::MetricsSnapshot;
use flowtrack_common::{AddressFamily, AnyFlowKey, Error, FlowRecord};
use flowtrack_core::{FlowTracker, TrackerConfig};
use log::{debug, info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::utils::{format_bytes, format_micros, print_header, Timer};

/// One tracked flow in the replay output
#[derive(Debug, Clone, Serialize)]
pub struct FlowSummary {
    pub family: AddressFamily,
    pub flow: String,
    pub start_ts: u64,
    pub end_ts: u64,
    /// Span from the first to the latest packet; zero when the capture
    /// went back in time.
    pub duration_us: u64,
    pub packets: u64,
    pub average_ttl: u16,
}

impl FlowSummary {
    fn new(key: AnyFlowKey, record: &FlowRecord) -> Self {
        Self {
            family: key.family(),
            flow: key.to_string(),
            start_ts: record.start_ts,
            end_ts: record.end_ts,
            duration_us: record.duration_us(),
            packets: record.packets(),
            average_ttl: record.ttl_aggregate.checked_average().unwrap_or(0),
        }
    }
}

/// Outcome of replaying one capture
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub records: u64,
    pub undecodable: u64,
    pub rejected: u64,
    /// Whether the capture ended in a truncated record
    pub truncated: bool,
    pub max_flows: u32,
    pub flows_v4: usize,
    pub flows_v6: usize,
    pub top_flows: Vec<FlowSummary>,
    pub metrics: MetricsSnapshot,
}

/// Feed every record of `capture` through a fresh tracker.
pub fn replay_capture(
    capture: bytes::Bytes,
    config: TrackerConfig,
    top: usize,
) -> Result<ReplaySummary> {
    let mut tracker: FlowTracker = FlowTracker::with_config(config)
        .context("Failed to create flow tracker")?;

    let mut records = 0u64;
    let mut undecodable = 0u64;
    let mut rejected = 0u64;
    let mut truncated = false;

    for record in CaptureReader::new(capture) {
        let header = match record {
            Ok(header) => header,
            Err(e) => {
                warn!("Stopping at record {}: {}", records, e);
                truncated = true;
                break;
            }
        };
        records += 1;

        match tracker.analyze_packet(&header) {
            Ok(_) => {}
            Err(Error::CapacityExceeded { .. }) => rejected += 1,
            Err(e) => {
                undecodable += 1;
                warn!("Skipping record {} at {}us: {}", records - 1, header.timestamp_us(), e);
            }
        }
    }

    let mut flows: Vec<FlowSummary> = tracker
        .flows_v4()
        .map(|(k, r)| FlowSummary::new(k.into(), r))
        .chain(tracker.flows_v6().map(|(k, r)| FlowSummary::new(k.into(), r)))
        .collect();
    flows.sort_by(|a, b| b.packets.cmp(&a.packets).then(a.start_ts.cmp(&b.start_ts)));
    flows.truncate(top);

    let summary = ReplaySummary {
        records,
        undecodable,
        rejected,
        truncated,
        max_flows: tracker.capacity(),
        flows_v4: tracker.len_v4(),
        flows_v6: tracker.len_v6(),
        top_flows: flows,
        metrics: tracker.metrics_snapshot(),
    };

    debug!("Longest probe sequence: {}", tracker.max_probe_len());
    tracker.destroy();

    Ok(summary)
}

/// Replay the capture in `file` and print what was tracked
pub async fn run_replay(
    file: PathBuf,
    config: TrackerConfig,
    top: usize,
    json: bool,
) -> Result<()> {
    info!("Replaying {} with max_flows={}", file.display(), config.max_flows);

    let capture = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let size = capture.len();

    let timer = Timer::new("replay");
    let summary = replay_capture(capture.into(), config, top)?;
    let elapsed = timer.elapsed();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_header("Replay summary");
    println!("Capture: {} ({})", file.display(), format_bytes(size));
    println!("Records: {}", summary.records);
    println!("Undecodable: {}", summary.undecodable);
    println!("Rejected (table full): {}", summary.rejected);
    if summary.truncated {
        println!("Capture ends in a truncated record");
    }
    println!("Flows: {} IPv4, {} IPv6 (capacity {} per family)",
        summary.flows_v4, summary.flows_v6, summary.max_flows);
    if elapsed.as_secs_f64() > 0.0 {
        println!("Throughput: {:.0} packets/second",
            summary.records as f64 / elapsed.as_secs_f64());
    }

    if !summary.top_flows.is_empty() {
        print_header("Busiest flows");
        for flow in &summary.top_flows {
            println!(
                "{}  packets={} avg_ttl={} duration={}",
                flow.flow,
                flow.packets,
                flow.average_ttl,
                format_micros(flow.duration_us)
            );
        }
    }

    print_header("Tracker metrics");
    let m = &summary.metrics;
    println!("Inserts: {}", m.inserts);
    println!("Lookup hits: {}", m.lookup_hits);
    println!("Lookup misses: {}", m.lookup_misses);
    println!("Capacity rejections: {}", m.capacity_rejections);

    Ok(())
}
