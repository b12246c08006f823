//! Wire protocol for snapsync streams
//!
//! A stream is one handshake line followed by zero or more chunk records.
//! There is no end-of-stream marker: running out of bytes at a chunk header
//! boundary is the normal termination signal. The snapback log uses this
//! exact format, so a captured log is itself a valid apply stream.

use anyhow::{bail, Result};
use std::io::{Read, Write};

/// Protocol version line sent exactly once at the start of every stream.
/// The receiver compares it byte-for-byte; any difference is fatal.
pub const HANDSHAKE: &str = "snapsync PROTO[1]";

/// Scale factor between the offset carried in a chunk header and the byte
/// position on the destination device. Header offsets are literal byte
/// offsets, so this is 1. Kept as an explicit constant so the convention is
/// visible at the seek site: receivers that scale offsets by a chunk size
/// write every chunk to the wrong place without any other symptom.
pub const OFFSET_UNIT_BYTES: u64 = 1;

/// Wire size of an encoded chunk header: u64 offset + u32 length.
pub const HEADER_LEN: usize = 12;

/// Upper bound on a single chunk payload (64MB). A length field above this
/// means a corrupt or hostile stream, not a real diff.
pub const MAX_CHUNK_SIZE: u32 = 64 * 1024 * 1024;

/// Handshake lines longer than this are rejected without reading further.
const MAX_HANDSHAKE_LEN: usize = 128;

/// One chunk header: where the payload lands and how many bytes follow.
/// Both fields travel in network (big-endian) byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub offset: u64,
    pub length: u32,
}

impl ChunkHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&self.offset.to_be_bytes());
        buf[8..12].copy_from_slice(&self.length.to_be_bytes());
        buf
    }
}

/// Write the handshake line, newline-terminated.
pub fn write_handshake(w: &mut dyn Write) -> Result<()> {
    w.write_all(HANDSHAKE.as_bytes())?;
    w.write_all(b"\n")?;
    Ok(())
}

/// Read one newline-terminated line and require it to match [`HANDSHAKE`].
///
/// Called before the destination device is opened; a mismatch must leave the
/// destination completely untouched.
pub fn check_handshake(r: &mut dyn Read) -> Result<()> {
    let mut line = Vec::with_capacity(HANDSHAKE.len());
    let mut byte = [0u8; 1];
    loop {
        let n = r.read(&mut byte)?;
        if n == 0 {
            bail!("stream ended before a complete handshake line");
        }
        if byte[0] == b'\n' {
            break;
        }
        line.push(byte[0]);
        if line.len() > MAX_HANDSHAKE_LEN {
            bail!(
                "handshake line exceeds {} bytes; not a snapsync stream",
                MAX_HANDSHAKE_LEN
            );
        }
    }
    if line != HANDSHAKE.as_bytes() {
        bail!(
            "protocol mismatch: peer sent {:?}, expected {:?}",
            String::from_utf8_lossy(&line),
            HANDSHAKE
        );
    }
    Ok(())
}

/// Read the next chunk header from the stream.
///
/// Returns `Ok(None)` on a clean end of stream (zero header bytes available).
/// A header cut off partway through is a framing error: the sender died
/// mid-record and the remaining bytes cannot be trusted.
pub fn read_chunk_header(r: &mut dyn Read) -> Result<Option<ChunkHeader>> {
    let mut buf = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        let n = r.read(&mut buf[filled..])?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("truncated chunk header: got {} of {} bytes", filled, HEADER_LEN);
        }
        filled += n;
    }
    let offset = u64::from_be_bytes([
        buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
    ]);
    let length = u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]);
    if length > MAX_CHUNK_SIZE {
        bail!(
            "chunk length {} exceeds maximum {} (corrupt stream?)",
            length,
            MAX_CHUNK_SIZE
        );
    }
    Ok(Some(ChunkHeader { offset, length }))
}
