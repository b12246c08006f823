//! Applier: consume a framed stream and write chunks to the destination
//!
//! State machine: AwaitHandshake -> StreamChunks -> Done | Failed. The
//! handshake is verified before the destination is opened, so an
//! incompatible peer can never touch the device. End of stream at a header
//! boundary is Done; anywhere else it is Failed.
//!
//! Applying a snapback log is this same operation with capture disabled:
//! the log is a structurally valid stream of pre-images.

use crate::device::{DestDevice, SeekOutcome};
use crate::logger::Logger;
use crate::protocol::{self, OFFSET_UNIT_BYTES};
use crate::snapback::SnapbackWriter;
use anyhow::{bail, Context, Result};
use std::io::{self, Read};
use std::path::Path;

/// Accounting for one apply. `chunks_seen` counts every header consumed,
/// applied or skipped, and must match the sender's chunk count.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ApplyStats {
    pub chunks_seen: u64,
    pub chunks_applied: u64,
    pub chunks_skipped: u64,
    pub bytes_written: u64,
}

pub fn apply_stream(
    input: &mut dyn Read,
    dest_path: &Path,
    snapback_path: Option<&Path>,
    logger: &dyn Logger,
) -> Result<ApplyStats> {
    let start = std::time::Instant::now();

    // AwaitHandshake: a mismatch fails here, before the destination or the
    // snapback log exist as open handles.
    protocol::check_handshake(input)?;

    let mut dest = DestDevice::open(dest_path)?;
    let mut snapback = match snapback_path {
        Some(path) => Some(SnapbackWriter::create(path)?),
        None => None,
    };
    logger.start("apply", dest_path);

    let mut stats = ApplyStats::default();
    let mut payload = Vec::new();
    let mut pre_image = Vec::new();

    // StreamChunks: each iteration consumes exactly one header plus its
    // payload, whether the chunk lands or is skipped.
    while let Some(header) = protocol::read_chunk_header(input)? {
        stats.chunks_seen += 1;
        let target = header.offset * OFFSET_UNIT_BYTES;

        match dest.position(target, header.length)? {
            SeekOutcome::OutOfBounds => {
                // Destination is smaller than the origin here. Accepted
                // policy: drop the chunk, keep the stream framed.
                drain(input, header.length)?;
                stats.chunks_skipped += 1;
                logger.chunk_skipped(header.offset, header.length);
            }
            SeekOutcome::Positioned => {
                if let Some(log) = snapback.as_mut() {
                    pre_image.resize(header.length as usize, 0);
                    dest.read_at_cursor(&mut pre_image)?;
                    log.record(header, &pre_image)?;
                    // Capturing the pre-image advanced the cursor. The same
                    // arguments just positioned; anything else means the
                    // destination changed size under us.
                    if dest.position(target, header.length)? == SeekOutcome::OutOfBounds {
                        bail!(
                            "destination no longer addressable at offset {} after pre-image capture",
                            header.offset
                        );
                    }
                }
                payload.resize(header.length as usize, 0);
                input
                    .read_exact(&mut payload)
                    .with_context(|| {
                        format!("stream ended inside the payload for offset {}", header.offset)
                    })?;
                dest.write_at_cursor(&payload)?;
                stats.chunks_applied += 1;
                stats.bytes_written += header.length as u64;
            }
        }
    }

    // Done: finalize in dependency order - the snapback log must be stable
    // before the apply is declared complete.
    if let Some(log) = snapback {
        log.finish()?;
    }
    dest.sync()?;
    logger.done(stats.chunks_seen, stats.bytes_written, start.elapsed().as_secs_f64());
    Ok(stats)
}

/// Read and discard exactly `length` payload bytes of a skipped chunk.
fn drain(input: &mut dyn Read, length: u32) -> Result<()> {
    let copied = io::copy(&mut input.take(length as u64), &mut io::sink())?;
    if copied < length as u64 {
        bail!(
            "stream ended inside a skipped payload ({} of {} bytes)",
            copied,
            length
        );
    }
    Ok(())
}
