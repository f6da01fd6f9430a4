//! Statistics for the cluster-to-radio bridge.
//!
//! Counts what happened to each cluster line and how the radio answered,
//! and keeps an HDR histogram of radio command round-trip times.

use hdrhistogram::Histogram;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Thread-safe statistics collector.
#[derive(Debug)]
pub struct BridgeStats {
    /// Spot lines parsed successfully
    pub spots: AtomicU64,

    /// Lines that looked like spots but could not be parsed
    pub discarded_lines: AtomicU64,

    /// Non-spot lines echoed to the console
    pub text_lines: AtomicU64,

    /// Spots created on the radio
    pub adds: AtomicU64,

    /// Spots refreshed on the radio
    pub updates: AtomicU64,

    /// Updates the radio rejected as unknown and were re-added
    pub fallbacks: AtomicU64,

    /// Spots removed because of a QRT comment
    pub removals: AtomicU64,

    /// Entries dropped by the expiry sweep
    pub expired: AtomicU64,

    /// Radio commands that failed
    pub rpc_failures: AtomicU64,

    /// Round-trip time of radio commands, in microseconds
    rpc_latency: RwLock<Histogram<u64>>,

    /// When stats collection started
    start_time: Instant,
}

impl BridgeStats {
    /// Create a new statistics collector.
    pub fn new() -> Self {
        Self {
            spots: AtomicU64::new(0),
            discarded_lines: AtomicU64::new(0),
            text_lines: AtomicU64::new(0),
            adds: AtomicU64::new(0),
            updates: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
            removals: AtomicU64::new(0),
            expired: AtomicU64::new(0),
            rpc_failures: AtomicU64::new(0),
            // 1us to 60s, 3 significant figures
            rpc_latency: RwLock::new(
                Histogram::new_with_bounds(1, 60_000_000, 3)
                    .expect("Failed to create latency histogram"),
            ),
            start_time: Instant::now(),
        }
    }

    pub fn record(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_many(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    /// Record the round-trip time of one radio command.
    pub fn record_rpc_latency(&self, latency: Duration) {
        let micros = (latency.as_micros() as u64).clamp(1, 60_000_000);
        if let Ok(mut hist) = self.rpc_latency.write() {
            let _ = hist.record(micros);
        }
    }

    /// Get the elapsed time since stats collection started.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Generate a summary report.
    pub fn summary(&self) -> StatsSummary {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);

        let rpc_latency = self
            .rpc_latency
            .read()
            .ok()
            .filter(|h| h.len() > 0)
            .map(|h| LatencyPercentiles {
                p50: Duration::from_micros(h.value_at_quantile(0.50)),
                p90: Duration::from_micros(h.value_at_quantile(0.90)),
                p99: Duration::from_micros(h.value_at_quantile(0.99)),
                max: Duration::from_micros(h.max()),
                count: h.len(),
            });

        StatsSummary {
            elapsed_secs: self.elapsed().as_secs_f64(),
            spots: load(&self.spots),
            discarded_lines: load(&self.discarded_lines),
            text_lines: load(&self.text_lines),
            adds: load(&self.adds),
            updates: load(&self.updates),
            fallbacks: load(&self.fallbacks),
            removals: load(&self.removals),
            expired: load(&self.expired),
            rpc_failures: load(&self.rpc_failures),
            rpc_latency,
        }
    }
}

impl Default for BridgeStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Percentile values from the latency histogram.
#[derive(Debug, Clone)]
pub struct LatencyPercentiles {
    pub p50: Duration,
    pub p90: Duration,
    pub p99: Duration,
    pub max: Duration,
    pub count: u64,
}

/// Summary of collected statistics.
#[derive(Debug, Clone)]
pub struct StatsSummary {
    pub elapsed_secs: f64,
    pub spots: u64,
    pub discarded_lines: u64,
    pub text_lines: u64,
    pub adds: u64,
    pub updates: u64,
    pub fallbacks: u64,
    pub removals: u64,
    pub expired: u64,
    pub rpc_failures: u64,
    pub rpc_latency: Option<LatencyPercentiles>,
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Runtime: {:.1}s", self.elapsed_secs)?;
        writeln!(
            f,
            "Lines: {} spots, {} text, {} discarded",
            self.spots, self.text_lines, self.discarded_lines
        )?;
        writeln!(
            f,
            "Radio spots: {} added, {} updated ({} re-added), {} removed, {} expired",
            self.adds, self.updates, self.fallbacks, self.removals, self.expired
        )?;
        write!(f, "Radio command failures: {}", self.rpc_failures)?;

        if let Some(ref p) = self.rpc_latency {
            writeln!(f)?;
            write!(
                f,
                "Command latency over {} calls: P50 {:?}, P90 {:?}, P99 {:?}, max {:?}",
                p.count, p.p50, p.p90, p.p99, p.max
            )?;
        }

        Ok(())
    }
}
