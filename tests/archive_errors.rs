use std::fs;
use std::path::Path;

use anyhow::Result;
use fqarc::{
    CompressSession, DecompressSession, Error, Record, SettingsBuilder,
    archive::{ArchiveReader, FORMAT_VERSION, HEADER_SIZE},
    error::{ArchiveError, StreamError},
};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use tempfile::TempDir;

fn records(n: usize) -> Vec<Record> {
    let mut rng = SmallRng::seed_from_u64(1);
    (0..n)
        .map(|i| {
            let sequence: Vec<u8> = (0..100).map(|_| b"ACGT"[rng.random_range(0..4)]).collect();
            let quality: Vec<u8> = (0..100).map(|_| rng.random_range(33..74)).collect();
            Record::new(format!("read:{i}").into_bytes(), sequence, quality, None)
        })
        .collect()
}

fn write_archive(path: &Path, checksum: bool) -> Result<()> {
    let settings = SettingsBuilder::default()
        .buffer_size(8 * 1024)
        .threads(2)
        .checksum(checksum)
        .build()?;
    let mut session = CompressSession::start(path, settings)?;
    for record in &records(500) {
        session.write_next_record(record)?;
    }
    session.finish()?;
    Ok(())
}

fn open_error(path: &Path) -> Error {
    match DecompressSession::start(path, 2) {
        Ok(_) => panic!("archive at {} opened", path.display()),
        Err(err) => err,
    }
}

#[test]
fn test_truncated_archive() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("full.fqa");
    write_archive(&path, false)?;
    let bytes = fs::read(&path)?;

    let truncated = dir.path().join("truncated.fqa");
    for len in [0, 32, bytes.len() / 3, bytes.len() - 40, bytes.len() - 1] {
        fs::write(&truncated, &bytes[..len])?;
        let err = open_error(&truncated);
        assert!(err.is_truncated(), "len {len}: {err}");
    }
    Ok(())
}

#[test]
fn test_aborted_archive_is_truncated() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("aborted.fqa");
    let settings = SettingsBuilder::default()
        .buffer_size(4 * 1024)
        .threads(4)
        .build()?;
    let mut session = CompressSession::start(&path, settings)?;
    for record in &records(300) {
        session.write_next_record(record)?;
    }
    session.abort();
    assert!(open_error(&path).is_truncated());
    Ok(())
}

#[test]
fn test_dropped_session_writes_no_index() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("dropped.fqa");
    {
        let mut session = CompressSession::start(&path, SettingsBuilder::default().build()?)?;
        for record in &records(10) {
            session.write_next_record(record)?;
        }
    }
    assert!(open_error(&path).is_truncated());
    Ok(())
}

#[test]
fn test_format_version_mismatch() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("version.fqa");
    write_archive(&path, false)?;
    let mut bytes = fs::read(&path)?;
    bytes[7] = FORMAT_VERSION + 1;
    fs::write(&path, &bytes)?;
    assert!(matches!(
        open_error(&path),
        Error::ArchiveError(ArchiveError::FormatVersion { .. })
    ));
    Ok(())
}

#[test]
fn test_not_an_archive() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("reads.fastq");
    let mut text = Vec::new();
    for record in &records(5) {
        fqarc::fastq::write_record(&mut text, record)?;
    }
    fs::write(&path, &text)?;
    assert!(matches!(
        open_error(&path),
        Error::ArchiveError(ArchiveError::InvalidMagic(_))
    ));
    Ok(())
}

#[test]
fn test_corrupted_block() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("corrupt.fqa");
    write_archive(&path, true)?;
    let mut bytes = fs::read(&path)?;
    bytes[HEADER_SIZE as usize + 20] ^= 0xFF;
    fs::write(&path, &bytes)?;
    assert!(matches!(
        open_error(&path),
        Error::ArchiveError(ArchiveError::ChecksumMismatch { .. })
    ));
    Ok(())
}

#[test]
fn test_block_checksum_recorded() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("crc.fqa");
    write_archive(&path, true)?;
    let reader = ArchiveReader::open(&path)?;
    assert!(reader.header().settings.has_checksums());
    assert!(reader.index().entries().iter().all(|e| e.checksum() != 0));

    // a mismatching block checksum surfaces as a stream error
    let settings = reader.settings(1)?;
    let mut codec = fqarc::codec::BlockCodec::new(&settings);
    let entry = reader.entry(0)?;
    let err = codec
        .decode(
            0,
            reader.block_segments(0)?,
            entry.record_count(),
            Some(entry.checksum() ^ 1),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        Error::StreamError(StreamError::ChecksumMismatch { block: 0, .. })
    ));
    Ok(())
}
