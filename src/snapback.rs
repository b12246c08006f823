//! Snapback log: pre-overwrite images captured during an apply
//!
//! The log is written in the exact wire format of the transfer stream, its
//! own handshake line first, so the finished file can be fed straight back
//! into `apply` to undo the run that produced it.

use crate::protocol::{self, ChunkHeader};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

pub struct SnapbackWriter {
    writer: BufWriter<File>,
}

impl SnapbackWriter {
    /// Create the log and write the handshake line. A log that captured
    /// zero chunks is still a valid (empty) apply stream.
    pub fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .with_context(|| format!("failed to create snapback log {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        protocol::write_handshake(&mut writer)?;
        Ok(Self { writer })
    }

    /// Append one pre-image record. `pre_image` holds the destination's
    /// contents at `header.offset` as they were before the overwrite.
    pub fn record(&mut self, header: ChunkHeader, pre_image: &[u8]) -> Result<()> {
        debug_assert_eq!(pre_image.len(), header.length as usize);
        self.writer
            .write_all(&header.encode())
            .context("failed to write snapback record header")?;
        self.writer
            .write_all(pre_image)
            .context("failed to write snapback pre-image")?;
        Ok(())
    }

    /// Flush and push the log to stable storage; the log is only trustworthy
    /// as an undo source once this returns.
    pub fn finish(mut self) -> Result<()> {
        self.writer.flush().context("failed to flush snapback log")?;
        self.writer
            .get_ref()
            .sync_all()
            .context("failed to sync snapback log")?;
        Ok(())
    }
}
