//! Utility functions for the flowtrack CLI

use flowtrack_common::types::{IPPROTO_ICMP, IPPROTO_ICMPV6, IPPROTO_TCP, IPPROTO_UDP};
use flowtrack_common::{AnyFlowKey, FlowKeyV4, FlowKeyV6};
use log::info;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{Duration, Instant};

/// Format a duration as a human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}.{:03}s", total_secs, duration.subsec_millis())
    } else if total_secs < 3600 {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        format!("{}m {}s", mins, secs)
    } else {
        let hours = total_secs / 3600;
        let mins = (total_secs % 3600) / 60;
        let secs = total_secs % 60;
        format!("{}h {}m {}s", hours, mins, secs)
    }
}

/// Format a microsecond span as a human-readable string
pub fn format_micros(us: u64) -> String {
    if us < 1_000 {
        format!("{}us", us)
    } else {
        format_duration(Duration::from_micros(us))
    }
}

/// Format a byte size as a human-readable string
pub fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;
    const GB: usize = MB * 1024;

    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Simple timer for measuring operations
pub struct Timer {
    start: Instant,
    operation: String,
}

impl Timer {
    /// Create a new timer for the specified operation
    pub fn new(operation: &str) -> Self {
        info!("Starting operation: {}", operation);
        Self {
            start: Instant::now(),
            operation: operation.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!(
            "Operation '{}' completed in {}",
            self.operation,
            format_duration(self.elapsed())
        );
    }
}

/// Print a section header in the CLI output
pub fn print_header(title: &str) {
    let separator = "=".repeat(title.len());
    println!("\n{}", title);
    println!("{}", separator);
}

/// Deterministic key for synthetic flow number `n`.
///
/// Flows are spread over 10.0.0.0/8 (or 2001:db8::/32) sources talking to a
/// handful of servers. Every 16th flow is ICMP, the rest alternate between
/// TCP and UDP.
pub fn synthetic_key(n: u32, ipv6: bool) -> AnyFlowKey {
    let protocol = match n % 16 {
        15 if ipv6 => IPPROTO_ICMPV6,
        15 => IPPROTO_ICMP,
        i if i % 2 == 0 => IPPROTO_TCP,
        _ => IPPROTO_UDP,
    };
    let src_port = 1024 + (n % 60_000) as u16;
    let dst_port = match protocol {
        IPPROTO_TCP => 443,
        IPPROTO_UDP => 53,
        _ => 0,
    };
    let server = (n % 4) as u8;

    if ipv6 {
        let src = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, (n >> 16) as u16, n as u16);
        let dst = Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0, 0, 0, 0, u16::from(server) + 1);
        FlowKeyV6::new(src, src_port, dst, dst_port, protocol).into()
    } else {
        let src = Ipv4Addr::from(0x0a00_0000 | (n & 0x00ff_ffff));
        let dst = Ipv4Addr::new(192, 0, 2, server + 1);
        FlowKeyV4::new(src, src_port, dst, dst_port, protocol).into()
    }
}

/// Whether synthetic flow `n` is IPv6 when `share` percent of flows are.
///
/// Each run of 100 consecutive flows holds exactly `share` IPv6 flows,
/// spread out rather than bunched at the start.
pub fn is_ipv6_flow(n: u32, share: u8) -> bool {
    (n % 100) * 37 % 100 < u32::from(share)
}

/// Initial TTL a synthetic flow's packets are seen with.
pub fn synthetic_ttl(n: u32) -> u8 {
    const INITIAL: [u8; 3] = [64, 128, 255];
    INITIAL[(n % 3) as usize] - (n % 12) as u8
}
