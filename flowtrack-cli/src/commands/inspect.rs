//! Capture inspection for the flowtrack CLI

use anyhow::{Context, Result};
use flowtrack_common::capture::{CaptureReader, PacketHeader};
use flowtrack_core::extract::extract;
use log::{info, warn};
use std::path::PathBuf;

use crate::utils::print_header;

/// One line describing a capture record.
pub fn describe_record(index: usize, header: &PacketHeader) -> String {
    let flow = match extract(header) {
        Ok(obs) => format!("{} ttl {}", obs.key, obs.ttl),
        Err(e) => format!("<{}>", e),
    };
    format!(
        "#{:<6} ts={}us vlan={} len={} {}",
        index,
        header.timestamp_us(),
        header.vlan(),
        header.len(),
        flow
    )
}

/// Print up to `limit` records of the capture in `file`
pub async fn run_inspect(file: PathBuf, limit: usize) -> Result<()> {
    info!("Inspecting {}", file.display());

    let capture = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    print_header(&format!("Records in {}", file.display()));

    let mut total = 0usize;
    for record in CaptureReader::new(capture) {
        match record {
            Ok(header) => {
                if total < limit {
                    println!("{}", describe_record(total, &header));
                }
                total += 1;
            }
            Err(e) => {
                warn!("Capture truncated after {} records: {}", total, e);
                break;
            }
        }
    }

    if total > limit {
        println!("... {} more", total - limit);
    }
    println!("Total records: {}", total);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowtrack_common::FlowKeyV4;
    use flowtrack_core::extract::synthesize_frame;
    use std::net::Ipv4Addr;

    #[test]
    fn test_describe_record() {
        let key = FlowKeyV4::new(
            Ipv4Addr::new(10, 0, 0, 1),
            1111,
            Ipv4Addr::new(10, 0, 0, 2),
            80,
            6,
        );
        let header = PacketHeader::new(42, 7, synthesize_frame(&key.into(), 64, 0));
        let line = describe_record(3, &header);
        assert!(line.starts_with("#3"));
        assert!(line.contains("ts=42us vlan=7"));
        assert!(line.contains("10.0.0.1:1111 -> 10.0.0.2:80 proto 6 ttl 64"));

        let junk = PacketHeader::new(1, 0, vec![0u8; 3]);
        assert!(describe_record(0, &junk).contains('<'));
    }
}
