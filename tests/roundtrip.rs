//! End-to-end transfer tests: send a diff of an origin device, apply it to a
//! destination, and check the destination byte-for-byte.

use anyhow::Result;
use snapsync::apply::apply_stream;
use snapsync::device::OriginDevice;
use snapsync::diff::{ByteRange, StaticDiffSource};
use snapsync::logger::NoopLogger;
use snapsync::progress::NoopObserver;
use snapsync::protocol::{self, ChunkHeader};
use snapsync::send::send_diff;
use std::io::{Cursor, Read, Write};
use std::path::Path;

fn patterned(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

fn write_device(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(bytes).unwrap();
    f.sync_all().unwrap();
    path
}

/// Run one send over the given ranges and return the raw stream bytes.
fn send_to_vec(origin_path: &Path, ranges: Vec<ByteRange>) -> Result<Vec<u8>> {
    let mut origin = OriginDevice::open(origin_path)?;
    let mut source = StaticDiffSource::new(ranges)?;
    let mut out = Vec::new();
    send_diff(
        &mut origin,
        &mut source,
        &mut out,
        &mut NoopObserver,
        &NoopLogger,
    )?;
    Ok(out)
}

#[test]
fn full_apply_matches_origin_within_bounds() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(8192, 1);
    let dest_bytes = patterned(8192, 99);
    let origin = write_device(dir.path(), "origin", &origin_bytes);
    let dest = write_device(dir.path(), "dest", &dest_bytes);

    let ranges = vec![
        ByteRange { start: 0, length: 512 },
        ByteRange { start: 1024, length: 100 },
        ByteRange { start: 4096, length: 2048 },
    ];
    let stream = send_to_vec(&origin, ranges.clone())?;
    let stats = apply_stream(&mut Cursor::new(stream), &dest, None, &NoopLogger)?;
    assert_eq!(stats.chunks_applied, 3);

    let got = std::fs::read(&dest)?;
    let mut expected = dest_bytes.clone();
    for r in &ranges {
        let (s, e) = (r.start as usize, r.start as usize + r.length as usize);
        expected[s..e].copy_from_slice(&origin_bytes[s..e]);
    }
    assert_eq!(got, expected);
    Ok(())
}

#[test]
fn wire_format_matches_the_documented_layout() -> Result<()> {
    // 2048-byte origin, two changed 512-byte spans: exactly two chunks.
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(2048, 7);
    let origin = write_device(dir.path(), "origin", &origin_bytes);

    let stream = send_to_vec(
        &origin,
        vec![
            ByteRange { start: 0, length: 512 },
            ByteRange { start: 1024, length: 512 },
        ],
    )?;

    let handshake_len = protocol::HANDSHAKE.len() + 1;
    assert_eq!(stream.len(), handshake_len + 2 * (12 + 512));
    assert_eq!(&stream[..handshake_len], b"snapsync PROTO[1]\n");

    let mut cursor = Cursor::new(stream);
    protocol::check_handshake(&mut cursor)?;

    let h1 = protocol::read_chunk_header(&mut cursor)?.unwrap();
    assert_eq!(h1, ChunkHeader { offset: 0, length: 512 });
    let mut p1 = vec![0u8; 512];
    cursor.read_exact(&mut p1)?;
    assert_eq!(p1, origin_bytes[0..512]);

    let h2 = protocol::read_chunk_header(&mut cursor)?.unwrap();
    assert_eq!(h2, ChunkHeader { offset: 1024, length: 512 });
    let mut p2 = vec![0u8; 512];
    cursor.read_exact(&mut p2)?;
    assert_eq!(p2, origin_bytes[1024..1536]);

    assert!(protocol::read_chunk_header(&mut cursor)?.is_none());

    // Applying to an equal-size destination updates exactly those spans.
    let dest_bytes = patterned(2048, 200);
    let dest = write_device(dir.path(), "dest", &dest_bytes);
    cursor.set_position(0);
    apply_stream(&mut cursor, &dest, None, &NoopLogger)?;

    let got = std::fs::read(&dest)?;
    assert_eq!(got[0..512], origin_bytes[0..512]);
    assert_eq!(got[512..1024], dest_bytes[512..1024]);
    assert_eq!(got[1024..1536], origin_bytes[1024..1536]);
    assert_eq!(got[1536..], dest_bytes[1536..]);
    Ok(())
}

#[test]
fn smaller_destination_skips_chunks_without_losing_framing() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(4096, 3);
    let dest_bytes = patterned(2048, 77);
    let origin = write_device(dir.path(), "origin", &origin_bytes);
    let dest = write_device(dir.path(), "dest", &dest_bytes);

    let stream = send_to_vec(
        &origin,
        vec![
            ByteRange { start: 0, length: 256 },
            ByteRange { start: 1024, length: 256 },
            ByteRange { start: 3000, length: 512 }, // past the 2048-byte replica
        ],
    )?;

    let stats = apply_stream(&mut Cursor::new(stream), &dest, None, &NoopLogger)?;

    // Chunk accounting: every sent header was consumed, skipped or not.
    assert_eq!(stats.chunks_seen, 3);
    assert_eq!(stats.chunks_applied, 2);
    assert_eq!(stats.chunks_skipped, 1);

    let got = std::fs::read(&dest)?;
    assert_eq!(got.len(), 2048);
    assert_eq!(got[0..256], origin_bytes[0..256]);
    assert_eq!(got[256..1024], dest_bytes[256..1024]);
    assert_eq!(got[1024..1280], origin_bytes[1024..1280]);
    assert_eq!(got[1280..], dest_bytes[1280..]);
    Ok(())
}

#[test]
fn handshake_mismatch_modifies_zero_bytes() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let dest_bytes = patterned(1024, 42);
    let dest = write_device(dir.path(), "dest", &dest_bytes);

    let mut bad = b"snapsync PROTO[2]\n".to_vec();
    bad.extend_from_slice(&ChunkHeader { offset: 0, length: 4 }.encode());
    bad.extend_from_slice(b"evil");

    let err = apply_stream(&mut Cursor::new(bad), &dest, None, &NoopLogger).unwrap_err();
    assert!(err.to_string().contains("protocol mismatch"));
    assert_eq!(std::fs::read(&dest)?, dest_bytes);
    Ok(())
}

#[test]
fn snapback_round_trip_restores_pre_apply_content() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(4096, 11);
    let dest_bytes = patterned(4096, 88);
    let origin = write_device(dir.path(), "origin", &origin_bytes);
    let dest = write_device(dir.path(), "dest", &dest_bytes);
    let snapback = dir.path().join("undo.snapback");

    let stream = send_to_vec(
        &origin,
        vec![
            ByteRange { start: 128, length: 64 },
            ByteRange { start: 2048, length: 1024 },
        ],
    )?;
    apply_stream(&mut Cursor::new(stream), &dest, Some(&snapback), &NoopLogger)?;
    assert_ne!(std::fs::read(&dest)?, dest_bytes);

    // The captured log applies through the identical code path, capture off.
    let log_bytes = std::fs::read(&snapback)?;
    apply_stream(&mut Cursor::new(log_bytes), &dest, None, &NoopLogger)?;
    assert_eq!(std::fs::read(&dest)?, dest_bytes);
    Ok(())
}

#[test]
fn applying_the_same_stream_twice_is_idempotent() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(2048, 5);
    let origin = write_device(dir.path(), "origin", &origin_bytes);
    let dest = write_device(dir.path(), "dest", &patterned(2048, 66));

    let stream = send_to_vec(
        &origin,
        vec![
            ByteRange { start: 0, length: 512 },
            ByteRange { start: 1536, length: 512 },
        ],
    )?;

    apply_stream(&mut Cursor::new(stream.clone()), &dest, None, &NoopLogger)?;
    let after_once = std::fs::read(&dest)?;
    apply_stream(&mut Cursor::new(stream), &dest, None, &NoopLogger)?;
    assert_eq!(std::fs::read(&dest)?, after_once);
    Ok(())
}

#[test]
fn empty_diff_applies_as_a_noop() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin = write_device(dir.path(), "origin", &patterned(512, 1));
    let dest_bytes = patterned(512, 2);
    let dest = write_device(dir.path(), "dest", &dest_bytes);

    let stream = send_to_vec(&origin, Vec::new())?;
    let stats = apply_stream(&mut Cursor::new(stream), &dest, None, &NoopLogger)?;
    assert_eq!(stats.chunks_seen, 0);
    assert_eq!(std::fs::read(&dest)?, dest_bytes);
    Ok(())
}

#[test]
fn premature_end_of_stream_at_header_boundary_is_normal_completion() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let origin_bytes = patterned(1024, 9);
    let origin = write_device(dir.path(), "origin", &origin_bytes);
    let dest = write_device(dir.path(), "dest", &patterned(1024, 33));

    let stream = send_to_vec(
        &origin,
        vec![
            ByteRange { start: 0, length: 128 },
            ByteRange { start: 512, length: 128 },
        ],
    )?;
    // The sender died after the first complete chunk record.
    let truncated = stream[..protocol::HANDSHAKE.len() + 1 + 12 + 128].to_vec();

    let stats = apply_stream(&mut Cursor::new(truncated), &dest, None, &NoopLogger)?;
    assert_eq!(stats.chunks_applied, 1);
    assert_eq!(std::fs::read(&dest)?[..128], origin_bytes[..128]);
    Ok(())
}
