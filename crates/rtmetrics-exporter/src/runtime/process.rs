//! `/proc/self` readers. Each returns `None` when the value is unavailable
//! (non-Linux hosts, restricted procfs), which omits the counter from a scrape.

use std::fs;

pub fn open_fds() -> Option<u64> {
    let dir = fs::read_dir("/proc/self/fd").ok()?;
    Some(dir.count() as u64)
}

pub fn thread_count() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    parse_status_field(&status, "Threads:")
}

/// Resident set size in bytes.
pub fn resident_bytes() -> Option<u64> {
    let status = fs::read_to_string("/proc/self/status").ok()?;
    parse_status_field(&status, "VmRSS:").map(|kib| kib.saturating_mul(1024))
}

fn parse_status_field(status: &str, field: &str) -> Option<u64> {
    status
        .lines()
        .find_map(|l| l.strip_prefix(field))
        .and_then(|v| v.split_whitespace().next())
        .and_then(|v| v.parse().ok())
}
