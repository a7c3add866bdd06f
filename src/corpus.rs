//! Compressed corpus: the replay log written during the first pass.
//!
//! Each document is appended as
//!
//! ```text
//! i32 tokenCount
//! i32 unfilteredTokenCount
//! tokenCount × i32 termId      (-1 = filtered token, position kept)
//! ```
//!
//! big-endian, back to back, with no header, footer or sync marker. A
//! damaged record therefore ends the replay: there is nothing to resync on.
//!
//! The store is write-then-read. [`CorpusWriter::seal`] consumes the writer
//! and hands back a [`CompressedCorpus`], so no append can race a replay.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{Result, RiError};

/// Term id written for a token whose position matters but whose term does not.
pub const FILTERED: i32 = -1;

const HEADER_BYTES: usize = 8;

const WRITE_BUFFER_BYTES: usize = 64 * 1024;

/// One document as a sequence of term ids.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompressedDocument {
    ids: Vec<i32>,
    unfiltered: usize,
}

impl CompressedDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a full id sequence, counting the non-sentinel ids.
    ///
    /// # Examples
    ///
    /// ```
    /// use semvec::corpus::CompressedDocument;
    ///
    /// let doc = CompressedDocument::from_ids(vec![5, 12, -1, 7]);
    /// assert_eq!(doc.token_count(), 4);
    /// assert_eq!(doc.unfiltered_count(), 3);
    /// ```
    pub fn from_ids(ids: Vec<i32>) -> Self {
        let unfiltered = ids.iter().filter(|&&id| id != FILTERED).count();
        CompressedDocument { ids, unfiltered }
    }

    pub fn push(&mut self, id: i32) {
        debug_assert!(id >= 0);
        self.ids.push(id);
        self.unfiltered += 1;
    }

    pub fn push_filtered(&mut self) {
        self.ids.push(FILTERED);
    }

    /// Every position, sentinels included.
    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    /// Non-sentinel ids in document order.
    pub fn terms(&self) -> impl Iterator<Item = i32> + '_ {
        self.ids.iter().copied().filter(|&id| id != FILTERED)
    }

    pub fn token_count(&self) -> usize {
        self.ids.len()
    }

    pub fn unfiltered_count(&self) -> usize {
        self.unfiltered
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Serialize the record in the on-disk layout.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_BYTES + 4 * self.ids.len());
        out.extend_from_slice(&(self.ids.len() as i32).to_be_bytes());
        out.extend_from_slice(&(self.unfiltered as i32).to_be_bytes());
        for id in &self.ids {
            out.extend_from_slice(&id.to_be_bytes());
        }
        out
    }
}

/// Append-only writer used by concurrent first-pass workers.
///
/// Records are encoded outside the lock; only the physical write of one
/// record is serialized. The first failed write poisons the writer.
pub struct CorpusWriter {
    file: NamedTempFile,
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    documents: AtomicUsize,
    poisoned: AtomicBool,
}

impl CorpusWriter {
    /// Create a writer over a fresh temporary file, in `dir` or the system
    /// temp directory. The file is removed when the store is dropped.
    pub fn create(dir: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("semvec-corpus-").suffix(".bin");
        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let handle = file.reopen()?;
        debug!(path = %file.path().display(), "opened compressed corpus");
        Ok(Self::over(file, Box::new(handle), WRITE_BUFFER_BYTES))
    }

    /// Writer whose records go to `sink`; `file` is what [`seal`](Self::seal)
    /// hands to the replay.
    fn over(file: NamedTempFile, sink: Box<dyn Write + Send>, capacity: usize) -> Self {
        CorpusWriter {
            file,
            writer: Mutex::new(BufWriter::with_capacity(capacity, sink)),
            documents: AtomicUsize::new(0),
            poisoned: AtomicBool::new(false),
        }
    }

    /// Append one document. Empty documents are skipped.
    pub fn append(&self, document: &CompressedDocument) -> Result<()> {
        if self.poisoned.load(Ordering::Acquire) {
            return Err(RiError::CorpusPoisoned);
        }
        if document.is_empty() {
            return Ok(());
        }

        let record = document.encode();
        let mut writer = self.writer.lock();
        // Re-check under the lock: another thread may have failed meanwhile
        if self.poisoned.load(Ordering::Acquire) {
            return Err(RiError::CorpusPoisoned);
        }
        if let Err(e) = writer.write_all(&record) {
            self.poison(&e);
            return Err(e.into());
        }
        self.documents.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn poison(&self, err: &io::Error) {
        self.poisoned.store(true, Ordering::Release);
        warn!(error = %err, "compressed corpus write failed; writer poisoned");
    }

    /// Documents appended so far.
    pub fn len(&self) -> usize {
        self.documents.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    /// Flush and close the writer, making the corpus readable.
    pub fn seal(self) -> Result<CompressedCorpus> {
        if self.is_poisoned() {
            return Err(RiError::CorpusPoisoned);
        }
        let CorpusWriter {
            file,
            writer,
            documents,
            ..
        } = self;

        let mut writer = writer.into_inner();
        writer.flush()?;
        drop(writer.into_inner().map_err(|e| e.into_error())?);
        file.as_file().sync_all()?;

        let documents = documents.into_inner();
        debug!(documents, path = %file.path().display(), "sealed compressed corpus");
        Ok(CompressedCorpus { file, documents })
    }
}

/// A sealed, read-only compressed corpus.
pub struct CompressedCorpus {
    file: NamedTempFile,
    documents: usize,
}

impl CompressedCorpus {
    /// Number of documents in the corpus.
    pub fn len(&self) -> usize {
        self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents == 0
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Iterate the documents in append order.
    ///
    /// Every call opens an independent read cursor.
    pub fn documents(&self) -> Result<DocumentReader<File>> {
        let handle = self.file.reopen()?;
        Ok(DocumentReader::new(handle, Some(self.documents)))
    }
}

/// Streaming decoder for the compressed corpus layout.
///
/// Yields `Err` once on the first malformed record, then stops.
pub struct DocumentReader<R> {
    reader: BufReader<R>,
    expected: Option<usize>,
    next: usize,
    done: bool,
}

impl<R: Read> DocumentReader<R> {
    /// `expected` is the sealed document count, when known; ending short of
    /// it is reported as a truncated corpus.
    pub fn new(reader: R, expected: Option<usize>) -> Self {
        DocumentReader {
            reader: BufReader::new(reader),
            expected,
            next: 0,
            done: false,
        }
    }

    fn malformed(&self, reason: impl Into<String>) -> RiError {
        RiError::MalformedCorpus {
            document: self.next,
            reason: reason.into(),
        }
    }

    /// Reads the two count fields; `None` on a clean end of input.
    fn read_header(&mut self) -> Result<Option<(i32, i32)>> {
        let mut buf = [0u8; HEADER_BYTES];
        let mut filled = 0;
        while filled < HEADER_BYTES {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        match filled {
            0 => Ok(None),
            HEADER_BYTES => Ok(Some((
                i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
                i32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ))),
            n => Err(self.malformed(format!("record header truncated after {} bytes", n))),
        }
    }

    fn read_document(&mut self) -> Result<Option<CompressedDocument>> {
        let (tokens, unfiltered) = match self.read_header()? {
            Some(header) => header,
            None => {
                return match self.expected {
                    Some(expected) if self.next < expected => Err(self.malformed(format!(
                        "corpus ended after {} of {} documents",
                        self.next, expected
                    ))),
                    _ => Ok(None),
                };
            }
        };

        if let Some(expected) = self.expected {
            if self.next >= expected {
                return Err(self.malformed(format!("data past the {} sealed documents", expected)));
            }
        }
        if tokens < 0 {
            return Err(self.malformed(format!("negative token count {}", tokens)));
        }
        if unfiltered < 0 || unfiltered > tokens {
            return Err(self.malformed(format!(
                "unfiltered count {} outside [0, {}]",
                unfiltered, tokens
            )));
        }

        let byte_len = tokens as u64 * 4;
        let mut bytes = Vec::new();
        (&mut self.reader).take(byte_len).read_to_end(&mut bytes)?;
        if bytes.len() as u64 != byte_len {
            return Err(self.malformed(format!(
                "expected {} term ids, found {} bytes",
                tokens,
                bytes.len()
            )));
        }

        let ids: Vec<i32> = bytes
            .chunks_exact(4)
            .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        if let Some(bad) = ids.iter().find(|&&id| id < FILTERED) {
            return Err(self.malformed(format!("invalid term id {}", bad)));
        }
        let document = CompressedDocument::from_ids(ids);
        if document.unfiltered_count() != unfiltered as usize {
            return Err(self.malformed(format!(
                "header claims {} unfiltered tokens, record has {}",
                unfiltered,
                document.unfiltered_count()
            )));
        }
        Ok(Some(document))
    }
}

impl<R: Read> Iterator for DocumentReader<R> {
    type Item = Result<CompressedDocument>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_document() {
            Ok(Some(document)) => {
                self.next += 1;
                Some(Ok(document))
            }
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::sync::Arc;
    use std::thread;

    fn read_all(bytes: Vec<u8>, expected: Option<usize>) -> Vec<Result<CompressedDocument>> {
        DocumentReader::new(Cursor::new(bytes), expected).collect()
    }

    #[test]
    fn test_round_trip_keeps_sentinel() {
        let writer = CorpusWriter::create(None).unwrap();
        let doc = CompressedDocument::from_ids(vec![5, 12, -1, 7]);
        writer.append(&doc).unwrap();
        let corpus = writer.seal().unwrap();
        assert_eq!(corpus.len(), 1);

        let docs: Vec<_> = corpus.documents().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(docs, vec![doc]);
        assert_eq!(docs[0].ids(), &[5, 12, -1, 7]);
        assert_eq!(docs[0].token_count(), 4);
        assert_eq!(docs[0].unfiltered_count(), 3);
    }

    #[test]
    fn test_layout_is_big_endian() {
        let bytes = CompressedDocument::from_ids(vec![1, -1]).encode();
        assert_eq!(
            bytes,
            vec![0, 0, 0, 2, 0, 0, 0, 1, 0, 0, 0, 1, 0xff, 0xff, 0xff, 0xff]
        );
    }

    #[test]
    fn test_empty_documents_are_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let writer = CorpusWriter::create(Some(dir.path())).unwrap();
        writer.append(&CompressedDocument::new()).unwrap();
        writer.append(&CompressedDocument::from_ids(vec![0])).unwrap();
        assert_eq!(writer.len(), 1);
        let corpus = writer.seal().unwrap();
        assert!(corpus.path().starts_with(dir.path()));
        assert_eq!(corpus.documents().unwrap().count(), 1);
    }

    #[test]
    fn test_each_replay_starts_from_the_beginning() {
        let writer = CorpusWriter::create(None).unwrap();
        for ids in [vec![0, 1], vec![2], vec![-1, 3]] {
            writer.append(&CompressedDocument::from_ids(ids)).unwrap();
        }
        let corpus = writer.seal().unwrap();
        let first: Vec<_> = corpus.documents().unwrap().collect::<Result<_>>().unwrap();
        let second: Vec<_> = corpus.documents().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);
    }

    #[test]
    fn test_concurrent_appends_keep_records_whole() {
        let writer = Arc::new(CorpusWriter::create(None).unwrap());
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let writer = Arc::clone(&writer);
                thread::spawn(move || {
                    for _ in 0..50 {
                        let ids = vec![t; 1 + t as usize];
                        writer.append(&CompressedDocument::from_ids(ids)).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        let writer = Arc::try_unwrap(writer).ok().unwrap();
        let corpus = writer.seal().unwrap();
        assert_eq!(corpus.len(), 200);
        for doc in corpus.documents().unwrap() {
            let doc = doc.unwrap();
            let first = doc.ids()[0];
            assert_eq!(doc.token_count(), 1 + first as usize);
            assert!(doc.ids().iter().all(|&id| id == first));
        }
    }

    struct FailingSink;

    impl Write for FailingSink {
        fn write(&mut self, _: &[u8]) -> io::Result<usize> {
            Err(io::Error::new(ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_poisons_the_writer() {
        let file = NamedTempFile::new().unwrap();
        // Unbuffered, so the first record reaches the sink
        let writer = CorpusWriter::over(file, Box::new(FailingSink), 0);
        let doc = CompressedDocument::from_ids(vec![3, 1]);

        assert!(matches!(writer.append(&doc), Err(RiError::CorpusIo(_))));
        assert!(writer.is_poisoned());
        assert!(matches!(writer.append(&doc), Err(RiError::CorpusPoisoned)));
        // Empty documents are refused too once poisoned
        assert!(matches!(
            writer.append(&CompressedDocument::new()),
            Err(RiError::CorpusPoisoned)
        ));
        assert_eq!(writer.len(), 0);
        assert!(matches!(writer.seal(), Err(RiError::CorpusPoisoned)));
    }

    #[test]
    fn test_truncated_record_is_malformed() {
        let mut bytes = CompressedDocument::from_ids(vec![1, 2, 3]).encode();
        bytes.truncate(bytes.len() - 2);
        let docs = read_all(bytes, None);
        assert_eq!(docs.len(), 1);
        assert!(matches!(docs[0], Err(RiError::MalformedCorpus { document: 0, .. })));
    }

    #[test]
    fn test_truncated_header_is_malformed() {
        let mut bytes = CompressedDocument::from_ids(vec![4]).encode();
        bytes.extend_from_slice(&[0, 0, 0]);
        let docs = read_all(bytes, None);
        assert!(docs[0].is_ok());
        assert!(matches!(docs[1], Err(RiError::MalformedCorpus { document: 1, .. })));
    }

    #[test]
    fn test_missing_documents_are_malformed() {
        let bytes = CompressedDocument::from_ids(vec![4]).encode();
        let docs = read_all(bytes, Some(2));
        assert!(docs[0].is_ok());
        assert!(matches!(docs[1], Err(RiError::MalformedCorpus { document: 1, .. })));
    }

    #[test]
    fn test_inconsistent_counts_are_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(&2i32.to_be_bytes());
        bytes.extend_from_slice(&3i32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        let docs = read_all(bytes, None);
        assert_eq!(docs.len(), 1);
        assert!(docs[0].is_err());

        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-4i32).to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        assert!(read_all(bytes, None)[0].is_err());
    }

    #[test]
    fn test_invalid_ids_are_malformed() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&1i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&(-7i32).to_be_bytes());
        assert!(read_all(bytes, None)[0].is_err());
    }
}
