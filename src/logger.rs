use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

pub trait Logger: Send + Sync {
    fn start(&self, _mode: &str, _target: &Path) {}
    fn chunk_skipped(&self, _offset: u64, _length: u32) {}
    fn error(&self, _context: &str, _msg: &str) {}
    fn done(&self, _chunks: u64, _bytes: u64, _seconds: f64) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Verbose mode: events straight to stderr. This is the only place the
/// out-of-bounds skip policy becomes visible.
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn start(&self, mode: &str, target: &Path) {
        eprintln!("{} {}", mode, target.display());
    }
    fn chunk_skipped(&self, offset: u64, length: u32) {
        eprintln!("skip offset={} length={} (beyond destination size)", offset, length);
    }
    fn error(&self, context: &str, msg: &str) {
        eprintln!("error ctx={} msg={}", context, msg);
    }
    fn done(&self, chunks: u64, bytes: u64, seconds: f64) {
        eprintln!("done chunks={} bytes={} seconds={:.3}", chunks, bytes, seconds);
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn start(&self, mode: &str, target: &Path) {
        self.line(&format!("START mode={} target={}", mode, target.display()));
    }
    fn chunk_skipped(&self, offset: u64, length: u32) {
        self.line(&format!("SKIP offset={} length={}", offset, length));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
    fn done(&self, chunks: u64, bytes: u64, seconds: f64) {
        self.line(&format!("DONE chunks={chunks} bytes={bytes} seconds={seconds:.3}"));
    }
}
