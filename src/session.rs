//! # Compression and decompression sessions
//!
//! A [`CompressSession`] accepts records one at a time, seals them into
//! blocks and encodes the blocks on a worker pool. Encoded blocks are written
//! to the archive by the calling thread in their original order. A
//! [`DecompressSession`] runs the same pipeline in reverse.
//!
//! [`compress`] and [`decompress`] wrap the sessions for whole files, and
//! [`compress_reader`] and [`decompress_writer`] for arbitrary streams such as
//! stdin and stdout.

use std::{
    fs::File,
    io::{BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, warn};

use crate::{
    Record, Result,
    analyze::{ANALYZE_BYTES, InputProfile},
    archive::{ArchiveReader, ArchiveWriter},
    block::{BlockBuffer, RawBlock},
    codec::{BlockCodec, EncodedBlock, StreamKind, StreamStats},
    error::ConfigError,
    fastq::{FastqReader, write_record},
    pipeline::{BlockState, Pipeline},
    settings::CompressionSettings,
};

/// Statistics of a finished compression
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Records written to the archive
    pub records: u64,
    /// Malformed records rejected by [`CompressSession::write_next_record`]
    pub rejected: u64,
    pub blocks: u64,
    /// Tags stored unfiltered because they had too few fields
    pub filter_fallbacks: u64,
    /// Size of the finished archive in bytes
    pub archive_bytes: u64,
    /// Raw and compressed bytes per stream
    pub streams: StreamStats,
}
impl ArchiveSummary {
    /// Ratio of raw stream bytes to archive bytes
    #[must_use]
    pub fn compression_ratio(&self) -> f64 {
        if self.archive_bytes == 0 {
            return 0.0;
        }
        self.streams.total_raw_bytes() as f64 / self.archive_bytes as f64
    }

    fn log(&self, path: &Path) {
        info!(
            path = %path.display(),
            records = self.records,
            rejected = self.rejected,
            blocks = self.blocks,
            filter_fallbacks = self.filter_fallbacks,
            archive_bytes = self.archive_bytes,
            ratio = format_args!("{:.2}", self.compression_ratio()),
            "archive finished"
        );
        for kind in StreamKind::ALL {
            info!(
                stream = %kind,
                raw = self.streams.raw_bytes(kind),
                compressed = self.streams.compressed_bytes(kind),
                "stream summary"
            );
        }
    }
}

/// A streaming compression session writing one archive
///
/// Dropping a session without calling [`CompressSession::finish`] behaves
/// like [`CompressSession::abort`]: no index is written and the archive is
/// rejected as truncated when reopened.
pub struct CompressSession {
    path: PathBuf,
    buffer: BlockBuffer,
    pipeline: Pipeline<RawBlock, EncodedBlock>,
    writer: ArchiveWriter<BufWriter<File>>,
    streams: StreamStats,
    /// Records seen so far, accepted or not
    seen: u64,
    rejected: u64,
}
impl CompressSession {
    /// Creates the archive at `path` and starts the worker pool
    pub fn start<P: AsRef<Path>>(path: P, settings: CompressionSettings) -> Result<Self> {
        Self::start_with_hook(path, settings, |_| {})
    }

    /// Starts a session whose workers call `hook` with the block id before
    /// encoding it
    fn start_with_hook<P, H>(path: P, settings: CompressionSettings, mut hook: H) -> Result<Self>
    where
        P: AsRef<Path>,
        H: FnMut(u64) + Clone + Send + 'static,
    {
        settings.validate()?;
        let settings = Arc::new(settings);
        let path = path.as_ref().to_path_buf();

        let writer = ArchiveWriter::new(BufWriter::new(File::create(&path)?), &settings)?;
        let mut codec = BlockCodec::new(&settings);
        let pipeline = Pipeline::spawn(settings.thread_count(), move |id, block: RawBlock| {
            hook(id);
            codec.encode(block)
        })?;
        debug!(
            path = %path.display(),
            threads = settings.thread_count(),
            buffer_size = settings.buffer_size(),
            "started compression"
        );

        Ok(Self {
            buffer: BlockBuffer::new(&settings),
            path,
            pipeline,
            writer,
            streams: StreamStats::default(),
            seen: 0,
            rejected: 0,
        })
    }

    /// Adds a record to the archive
    ///
    /// Returns `false` when the record is malformed; it is skipped and the
    /// session continues.
    pub fn write_next_record(&mut self, record: &Record) -> Result<bool> {
        let idx = self.seen;
        self.seen += 1;
        if let Err(err) = record.validate(idx) {
            warn!(%err, "rejected record");
            self.rejected += 1;
            return Ok(false);
        }
        if let Some(block) = self.buffer.push(record) {
            self.submit(block)?;
        }
        Ok(true)
    }

    /// Number of records accepted so far
    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.seen - self.rejected
    }

    /// State of a sealed block in the pipeline
    #[must_use]
    pub fn block_state(&self, id: u64) -> Option<BlockState> {
        self.pipeline.state(id)
    }

    fn submit(&mut self, block: RawBlock) -> Result<()> {
        while self.pipeline.is_saturated() {
            self.flush_next()?;
        }
        self.pipeline.submit(block)?;
        while let Some(result) = self.pipeline.try_next() {
            self.write_block(&result?)?;
        }
        Ok(())
    }

    /// Waits for the next in-order block and writes it
    fn flush_next(&mut self) -> Result<bool> {
        match self.pipeline.next() {
            Some(result) => {
                self.write_block(&result?)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn write_block(&mut self, block: &EncodedBlock) -> Result<()> {
        self.writer.write_block(block)?;
        self.streams.add(block);
        debug!(
            block = block.id,
            records = block.record_count,
            bytes = block.encoded_len(),
            "flushed block"
        );
        Ok(())
    }

    /// Flushes the remaining records, writes the index and closes the archive
    pub fn finish(mut self) -> Result<ArchiveSummary> {
        if let Some(block) = self.buffer.finish() {
            self.submit(block)?;
        }
        while self.flush_next()? {}

        let Self {
            path,
            buffer,
            pipeline,
            writer,
            streams,
            rejected,
            ..
        } = self;
        pipeline.close();

        let summary = ArchiveSummary {
            records: writer.num_records(),
            rejected,
            blocks: writer.num_blocks() as u64,
            filter_fallbacks: buffer.filter_fallbacks(),
            archive_bytes: 0,
            streams,
        };
        let mut inner = writer.finish()?;
        inner.flush()?;
        let summary = ArchiveSummary {
            archive_bytes: inner.get_ref().metadata()?.len(),
            ..summary
        };
        summary.log(&path);
        Ok(summary)
    }

    /// Stops compression without writing an index
    ///
    /// In-flight blocks are discarded. The partial archive is left on disk.
    pub fn abort(mut self) {
        self.pipeline.abort();
        warn!(
            path = %self.path.display(),
            blocks = self.writer.num_blocks(),
            "aborted compression"
        );
    }
}

/// A streaming decompression session reading one archive
pub struct DecompressSession {
    reader: Arc<ArchiveReader>,
    codec: BlockCodec,
    pipeline: Pipeline<u64, Vec<Record>>,
    /// Next block to hand to the pipeline
    next_block: u64,
    current: std::vec::IntoIter<Record>,
    records_read: u64,
}
impl DecompressSession {
    /// Opens and validates the archive at `path`
    pub fn start<P: AsRef<Path>>(path: P, thread_count: usize) -> Result<Self> {
        Self::start_with_hook(path, thread_count, |_| {})
    }

    /// Starts a session whose workers call `hook` with the block id before
    /// decoding it
    fn start_with_hook<P, H>(path: P, thread_count: usize, mut hook: H) -> Result<Self>
    where
        P: AsRef<Path>,
        H: FnMut(u64) + Clone + Send + 'static,
    {
        if thread_count == 0 {
            return Err(ConfigError::InvalidThreadCount.into());
        }
        let reader = Arc::new(ArchiveReader::open(path.as_ref())?);
        let codec = BlockCodec::new(&reader.settings(thread_count)?);
        let pipeline = {
            let reader = Arc::clone(&reader);
            let mut codec = codec.clone();
            Pipeline::spawn(thread_count, move |_, id: u64| {
                hook(id);
                reader.decode_block(id, &mut codec)
            })?
        };
        debug!(
            path = %path.as_ref().display(),
            blocks = reader.num_blocks(),
            records = reader.num_records(),
            "started decompression"
        );
        Ok(Self {
            reader,
            codec,
            pipeline,
            next_block: 0,
            current: Vec::new().into_iter(),
            records_read: 0,
        })
    }

    /// Settings the archive was written with
    pub fn settings(&self) -> Result<CompressionSettings> {
        self.reader.settings(1)
    }

    #[must_use]
    pub fn num_blocks(&self) -> usize {
        self.reader.num_blocks()
    }

    #[must_use]
    pub fn num_records(&self) -> u64 {
        self.reader.num_records()
    }

    fn fill(&mut self) -> Result<()> {
        while !self.pipeline.is_saturated() && self.next_block < self.reader.num_blocks() as u64
        {
            self.pipeline.submit(self.next_block)?;
            self.next_block += 1;
        }
        Ok(())
    }

    /// Returns the next record in archive order, or `None` at the end
    pub fn read_next_record(&mut self) -> Result<Option<Record>> {
        loop {
            if let Some(record) = self.current.next() {
                self.records_read += 1;
                return Ok(Some(record));
            }
            self.fill()?;
            match self.pipeline.next() {
                Some(result) => self.current = result?.into_iter(),
                None => return Ok(None),
            }
        }
    }

    /// Decodes a single block by id, independently of sequential reading
    pub fn read_block(&mut self, id: u64) -> Result<Vec<Record>> {
        self.reader.decode_block(id, &mut self.codec)
    }

    /// Stops the workers, returning the number of records read
    pub fn finish(self) -> Result<u64> {
        let Self {
            pipeline,
            records_read,
            ..
        } = self;
        pipeline.close();
        Ok(records_read)
    }
}

/// Compresses a (possibly compressed) FASTQ file into an archive
///
/// Returns the number of records written. Malformed records are skipped.
pub fn compress<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    settings: CompressionSettings,
) -> Result<u64> {
    compress_reader(File::open(input)?, output, settings)
}

/// Compresses (possibly compressed) FASTQ text from any reader into an archive
///
/// The first records are profiled to fill in the settings left for
/// detection before the archive is created. Returns the number of records
/// written.
pub fn compress_reader<R, Q>(input: R, output: Q, settings: CompressionSettings) -> Result<u64>
where
    R: Read + Send + 'static,
    Q: AsRef<Path>,
{
    let mut reader = FastqReader::from_reader(Box::new(input))?;
    let mut head = Vec::new();
    let mut head_bytes = 0;
    while head_bytes < ANALYZE_BYTES {
        let Some(record) = reader.next_record()? else {
            break;
        };
        head_bytes += record.size();
        head.push(record);
    }
    let settings = InputProfile::from_records(&head).apply(settings);

    let mut session = CompressSession::start(output, settings)?;
    for record in &head {
        session.write_next_record(record)?;
    }
    while let Some(record) = reader.next_record()? {
        session.write_next_record(&record)?;
    }
    let summary = session.finish()?;
    Ok(summary.records)
}

/// Decompresses an archive into a FASTQ file
///
/// Returns the number of records written.
pub fn decompress<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    thread_count: usize,
) -> Result<u64> {
    decompress_writer(input, File::create(output)?, thread_count)
}

/// Decompresses an archive as FASTQ text into any writer
///
/// Returns the number of records written.
pub fn decompress_writer<P: AsRef<Path>, W: Write>(
    input: P,
    output: W,
    thread_count: usize,
) -> Result<u64> {
    let mut session = DecompressSession::start(input, thread_count)?;
    let mut writer = BufWriter::new(output);
    while let Some(record) = session.read_next_record()? {
        write_record(&mut writer, &record)?;
    }
    writer.flush()?;
    session.finish()
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::SettingsBuilder;

    fn record(i: usize) -> Record {
        Record::new(
            format!("r.{i}").into_bytes(),
            b"ACGTACGT".to_vec(),
            b"IIIIFFFF".to_vec(),
            None,
        )
    }

    #[test]
    fn test_session_roundtrip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("reads.fqa");
        let settings = SettingsBuilder::default()
            .buffer_size(64)
            .threads(2)
            .build()?;
        let mut session = CompressSession::start(&path, settings)?;
        for i in 0..100 {
            assert!(session.write_next_record(&record(i))?);
        }
        let bad = Record::new(b"bad".to_vec(), b"ACGT".to_vec(), b"II".to_vec(), None);
        assert!(!session.write_next_record(&bad)?);
        assert_eq!(session.num_records(), 100);
        let summary = session.finish()?;
        assert_eq!(summary.records, 100);
        assert_eq!(summary.rejected, 1);
        assert!(summary.blocks > 1);
        assert_eq!(summary.streams.raw_bytes(StreamKind::Sequence), 800);

        let mut session = DecompressSession::start(&path, 3)?;
        assert_eq!(session.num_records(), 100);
        for i in 0..100 {
            assert_eq!(session.read_next_record()?, Some(record(i)));
        }
        assert_eq!(session.read_next_record()?, None);
        assert_eq!(session.read_block(0)?.first(), Some(&record(0)));
        assert_eq!(session.finish()?, 100);
        Ok(())
    }

    /// Sleeps longest on the lowest ids so later blocks finish first
    fn stagger(id: u64) {
        let delay = 8 - (id % 8).min(7);
        std::thread::sleep(std::time::Duration::from_millis(delay * 2));
    }

    #[test]
    fn test_order_with_delayed_blocks() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let records: Vec<Record> = (0..400).map(record).collect();
        for threads in [1, 2, 8] {
            let path = dir.path().join(format!("delayed_{threads}.fqa"));
            let settings = SettingsBuilder::default()
                .buffer_size(96)
                .dna_level(1)
                .threads(threads)
                .build()?;
            let mut session = CompressSession::start_with_hook(&path, settings, stagger)?;
            for record in &records {
                session.write_next_record(record)?;
            }
            let summary = session.finish()?;
            assert!(summary.blocks > 16, "{} blocks", summary.blocks);

            for read_threads in [1, 2, 8] {
                let mut session = DecompressSession::start_with_hook(&path, read_threads, stagger)?;
                let mut decoded = Vec::new();
                while let Some(record) = session.read_next_record()? {
                    decoded.push(record);
                }
                assert_eq!(decoded, records, "{threads} writers, {read_threads} readers");
                session.finish()?;
            }
        }
        Ok(())
    }

    #[test]
    fn test_reader_and_writer_streams() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("stream.fqa");
        let mut text = Vec::new();
        for i in 0..50 {
            write_record(&mut text, &record(i))?;
        }

        let settings = SettingsBuilder::default().threads(2).build()?;
        assert_eq!(compress_reader(std::io::Cursor::new(text.clone()), &path, settings)?, 50);
        let mut out = Vec::new();
        assert_eq!(decompress_writer(&path, &mut out, 2)?, 50);
        assert_eq!(out, text);
        Ok(())
    }

    #[test]
    fn test_zero_threads() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("empty.fqa");
        CompressSession::start(&path, SettingsBuilder::default().build()?)?.finish()?;
        assert!(DecompressSession::start(&path, 0).is_err());
        Ok(())
    }
}
