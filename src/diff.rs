//! Difference-source seam: which byte ranges changed since the snapshot
//!
//! Enumeration itself belongs to the volume-management layer (snapshot
//! copy-on-write metadata, dirty bitmaps, and so on). The transfer engine
//! only consumes the result and requires ranges in ascending, non-overlapping
//! order.

use anyhow::{bail, Context, Result};
use std::io::{BufRead, BufReader, Read};

/// One contiguous span of changed bytes on the origin device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub length: u32,
}

/// Supplies the changed ranges for one origin device.
pub trait DiffSource {
    /// Next changed range, ascending; `None` when exhausted. An empty
    /// sequence is valid and means the devices are already in sync.
    fn next_range(&mut self) -> Result<Option<ByteRange>>;
}

/// A validated, in-memory range list.
#[derive(Debug)]
pub struct StaticDiffSource {
    ranges: std::vec::IntoIter<ByteRange>,
}

impl StaticDiffSource {
    /// Rejects out-of-order or overlapping input up front so the sender
    /// never has to think about it.
    pub fn new(ranges: Vec<ByteRange>) -> Result<Self> {
        let mut prev_end = 0u64;
        for range in &ranges {
            if range.length == 0 {
                bail!("zero-length range at offset {}", range.start);
            }
            if range.start < prev_end {
                bail!(
                    "range at offset {} overlaps or precedes the previous range (ends at {})",
                    range.start,
                    prev_end
                );
            }
            prev_end = match range.start.checked_add(range.length as u64) {
                Some(end) => end,
                None => bail!(
                    "range at offset {} extends past the addressable range",
                    range.start
                ),
            };
        }
        Ok(Self {
            ranges: ranges.into_iter(),
        })
    }
}

impl DiffSource for StaticDiffSource {
    fn next_range(&mut self) -> Result<Option<ByteRange>> {
        Ok(self.ranges.next())
    }
}

/// Parse a range listing as produced by the volume-management collaborator:
/// one `start length` pair per line, decimal, blank lines and `#` comments
/// ignored.
pub fn load_range_list(input: &mut dyn Read) -> Result<Vec<ByteRange>> {
    let reader = BufReader::new(input);
    let mut ranges = Vec::new();
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let mut fields = line.split_whitespace();
        let (start, length) = match (fields.next(), fields.next(), fields.next()) {
            (Some(s), Some(l), None) => (s, l),
            _ => bail!("range list line {}: expected `start length`", lineno + 1),
        };
        let start: u64 = start
            .parse()
            .with_context(|| format!("range list line {}: bad start offset", lineno + 1))?;
        let length: u32 = length
            .parse()
            .with_context(|| format!("range list line {}: bad length", lineno + 1))?;
        ranges.push(ByteRange { start, length });
    }
    Ok(ranges)
}
