//! Sender: stream each changed range as one framed chunk

use crate::device::OriginDevice;
use crate::diff::DiffSource;
use crate::logger::Logger;
use crate::progress::TransferObserver;
use crate::protocol::{self, ChunkHeader};
use anyhow::{bail, Context, Result};
use std::io::Write;
use std::time::Instant;

/// Running totals for one send.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransferStats {
    pub chunks: u64,
    pub bytes: u64,
}

/// Stream the handshake plus one chunk per changed range into `out`.
///
/// The origin is opened by the caller, so an unreadable device fails before
/// a single handshake byte reaches the channel. An empty range sequence is
/// a valid transfer: the peer sees the handshake and a clean end of stream.
pub fn send_diff(
    origin: &mut OriginDevice,
    source: &mut dyn DiffSource,
    out: &mut dyn Write,
    observer: &mut dyn TransferObserver,
    logger: &dyn Logger,
) -> Result<TransferStats> {
    let start = Instant::now();
    protocol::write_handshake(out)?;

    let mut stats = TransferStats::default();
    let mut payload = Vec::new();
    let mut prev_end = 0u64;

    while let Some(range) = source.next_range()? {
        // The diff source contract is ascending, non-overlapping ranges;
        // anything else would corrupt the destination silently.
        if range.start < prev_end {
            bail!(
                "diff source violated ordering: range at {} after range ending at {}",
                range.start,
                prev_end
            );
        }
        prev_end = match range.start.checked_add(range.length as u64) {
            Some(end) => end,
            None => bail!(
                "diff source produced a range at {} extending past the addressable range",
                range.start
            ),
        };

        payload.resize(range.length as usize, 0);
        origin
            .read_range(range.start, &mut payload)
            .with_context(|| format!("failed to read origin at offset {}", range.start))?;

        let header = ChunkHeader {
            offset: range.start,
            length: range.length,
        };
        out.write_all(&header.encode())?;
        out.write_all(&payload)?;

        stats.chunks += 1;
        stats.bytes += range.length as u64;
        observer.chunk_sent(range.start, range.length);
    }

    out.flush()?;
    observer.finished(stats.chunks, stats.bytes, origin.size());
    logger.done(stats.chunks, stats.bytes, start.elapsed().as_secs_f64());
    Ok(stats)
}
