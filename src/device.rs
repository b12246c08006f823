//! Block device handles with explicit bounds-checked positioning
//!
//! Sizes come from seeking to the end of the handle rather than metadata,
//! because `metadata().len()` reports 0 for block special files.

use anyhow::{Context, Result};
use std::fs::OpenOptions;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Outcome of positioning the destination cursor for one chunk.
///
/// `OutOfBounds` is a first-class result, not an error: destinations are
/// allowed to be smaller than the origin (thinly provisioned replicas), and
/// chunks that do not fit are skipped by the applier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Positioned,
    OutOfBounds,
}

/// Read-only handle on the origin device (or its snapshot view).
pub struct OriginDevice {
    file: std::fs::File,
    size: u64,
}

impl OriginDevice {
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = std::fs::File::open(path)
            .with_context(|| format!("failed to open origin device {}", path.display()))?;
        let size = file
            .seek(SeekFrom::End(0))
            .with_context(|| format!("failed to size origin device {}", path.display()))?;
        Ok(Self { file, size })
    }

    /// Total device size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Read exactly `buf.len()` bytes starting at `offset`.
    pub fn read_range(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file
            .read_exact(buf)
            .with_context(|| format!("short read at origin offset {}", offset))?;
        Ok(())
    }
}

/// Read-write handle on the destination device.
///
/// The cursor model matches the applier's needs: position once, optionally
/// read the current contents (for snapback capture), re-position, write.
pub struct DestDevice {
    file: std::fs::File,
    size: u64,
}

impl DestDevice {
    /// Open an existing device for update. Never creates the file: a missing
    /// destination is an operator error, not something to paper over.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .with_context(|| format!("failed to open destination device {}", path.display()))?;
        let size = file
            .seek(SeekFrom::End(0))
            .with_context(|| format!("failed to size destination device {}", path.display()))?;
        Ok(Self { file, size })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Position the cursor for a `length`-byte write at `offset`.
    ///
    /// A chunk must fit entirely inside the device; one that starts or ends
    /// past the device size reports `OutOfBounds` so the caller can drain and
    /// skip it without disturbing stream framing. Writing a partial chunk
    /// would grow a file-backed replica past its fixed size.
    pub fn position(&mut self, offset: u64, length: u32) -> Result<SeekOutcome> {
        let end = match offset.checked_add(length as u64) {
            Some(end) => end,
            None => return Ok(SeekOutcome::OutOfBounds),
        };
        if end > self.size {
            return Ok(SeekOutcome::OutOfBounds);
        }
        self.file.seek(SeekFrom::Start(offset))?;
        Ok(SeekOutcome::Positioned)
    }

    /// Read the current contents at the cursor (advances it).
    pub fn read_at_cursor(&mut self, buf: &mut [u8]) -> Result<()> {
        self.file
            .read_exact(buf)
            .context("short read of destination pre-image")?;
        Ok(())
    }

    /// Write a full chunk payload at the cursor.
    pub fn write_at_cursor(&mut self, buf: &[u8]) -> Result<()> {
        self.file
            .write_all(buf)
            .context("failed to write chunk to destination")?;
        Ok(())
    }

    /// Push written chunks to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file
            .sync_data()
            .context("failed to sync destination device")?;
        Ok(())
    }
}
