//! Transfer progress reporting
//!
//! The sender's loop knows nothing about presentation; it calls a
//! [`TransferObserver`] after each chunk and once at completion. The
//! throughput reporter draws on stderr so the data channel can own stdout.

use indicatif::{ProgressBar, ProgressStyle};
use std::time::{Duration, Instant};

/// Callback seam between the transfer loop and any presentation.
pub trait TransferObserver {
    fn chunk_sent(&mut self, _offset: u64, _bytes: u32) {}
    fn finished(&mut self, _chunks: u64, _bytes: u64, _device_size: u64) {}
}

/// For quiet mode and tests; zero overhead in the hot loop.
pub struct NoopObserver;
impl TransferObserver for NoopObserver {}

/// Status line updated every [`REPORT_EVERY`] chunks with an instantaneous
/// throughput estimate, plus a final summary including how much of the full
/// device the diff avoided sending.
pub struct ThroughputReporter {
    spinner: ProgressBar,
    start: Instant,
    window_start: Instant,
    window_bytes: u64,
    chunks: u64,
    bytes: u64,
}

/// Update cadence, in chunks.
const REPORT_EVERY: u64 = 100;

impl ThroughputReporter {
    pub fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("  {spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        let now = Instant::now();
        Self {
            spinner,
            start: now,
            window_start: now,
            window_bytes: 0,
            chunks: 0,
            bytes: 0,
        }
    }
}

impl Default for ThroughputReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferObserver for ThroughputReporter {
    fn chunk_sent(&mut self, _offset: u64, bytes: u32) {
        self.chunks += 1;
        self.bytes += bytes as u64;
        self.window_bytes += bytes as u64;

        if self.chunks % REPORT_EVERY == 0 {
            let window_secs = self.window_start.elapsed().as_secs_f64();
            let rate = if window_secs > 0.0 {
                self.window_bytes as f64 / window_secs / 1_048_576.0
            } else {
                0.0
            };
            self.spinner.set_message(format!(
                "{} chunks, {:.1} MB sent @ {:.1} MB/s",
                self.chunks,
                self.bytes as f64 / 1_048_576.0,
                rate
            ));
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
    }

    fn finished(&mut self, chunks: u64, bytes: u64, device_size: u64) {
        let elapsed = self.start.elapsed().as_secs_f64();
        let ratio = if device_size > 0 {
            bytes as f64 / device_size as f64 * 100.0
        } else {
            0.0
        };
        self.spinner.finish_with_message(format!(
            "Completed {} chunks ({:.1} MB) in {:.1}s - {:.1}% of device transferred",
            chunks,
            bytes as f64 / 1_048_576.0,
            elapsed,
            ratio
        ));
    }
}
