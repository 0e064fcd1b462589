//! On-demand per-process resource sampling.
//!
//! Shells out to `ps` for each sample so no CPU-time deltas need to be
//! tracked between calls. Sampling a vanished process yields zeroes.

use tokio::process::Command;

/// CPU and memory usage of a single process.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ProcessStats {
    /// CPU utilisation in percent, as reported by `ps`.
    pub cpu_percent: f64,

    /// Resident memory in mebibytes.
    pub memory_mb: u64,
}

/// Samples CPU% and resident memory for `pid`.
///
/// Never fails: a missing process, a failed `ps` invocation, or malformed
/// output all report as zeroes so that status polling stays infallible.
pub async fn sample(pid: u32) -> ProcessStats {
    let output = Command::new("ps")
        .arg("-p")
        .arg(pid.to_string())
        .arg("-o")
        .arg("%cpu=,rss=")
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => parse_ps_output(&String::from_utf8_lossy(&out.stdout)),
        _ => ProcessStats::default(),
    }
}

/// Parses the two-column `%cpu=,rss=` output: CPU percent (float) and
/// resident set size in kilobytes. Anything unparsable reads as zero.
#[must_use]
pub fn parse_ps_output(raw: &str) -> ProcessStats {
    let mut fields = raw.split_whitespace();
    let cpu_percent = fields
        .next()
        .and_then(|f| f.parse::<f64>().ok())
        .unwrap_or(0.0);
    let rss_kb = fields
        .next()
        .and_then(|f| f.parse::<u64>().ok())
        .unwrap_or(0);
    ProcessStats {
        cpu_percent,
        memory_mb: rss_kb / 1024,
    }
}
