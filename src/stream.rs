//! File streaming engine.
//!
//! Serves one named file to the connected companion as a sequence of
//! fixed-size notifications, one chunk per timer tick, closed by a literal
//! `$$EOT$$` marker. At most one stream exists at a time and the open file
//! handle must be released on every exit path: completion, read failure,
//! or the companion dropping the connection mid-transfer.

use crate::config::STREAM_CHUNK_BYTES;
use crate::error::StorageError;
use crate::storage::Storage;
use heapless::Vec;

/// Outcome of one stream tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStep {
    /// A chunk was read; notify it and re-arm the tick timer.
    Chunk(Vec<u8, STREAM_CHUNK_BYTES>),
    /// End of file. The end marker must be sent exactly once; the file is
    /// already closed.
    End,
    /// The read failed. The file is already closed and nothing more is
    /// sent; the companion reads the silence as failure.
    Failed,
}

/// One in-flight file transfer.
pub struct StreamSession<F> {
    file: Option<F>,
}

impl<F> StreamSession<F> {
    /// Open the named file for streaming.
    pub fn open<S: Storage<File = F>>(storage: &mut S, name: &str) -> Result<Self, StorageError> {
        let file = storage.open(name)?;
        Ok(Self { file: Some(file) })
    }

    /// Pull the next chunk. On `End` and `Failed` the file handle has been
    /// closed and the session is inert.
    pub fn next_chunk<S: Storage<File = F>>(&mut self, storage: &mut S) -> StreamStep {
        let Some(file) = self.file.as_mut() else {
            return StreamStep::Failed;
        };
        let mut buf = [0u8; STREAM_CHUNK_BYTES];
        match storage.read(file, &mut buf) {
            Ok(0) => {
                self.close(storage);
                StreamStep::End
            }
            Ok(n) => {
                let mut chunk = Vec::new();
                // Infallible: n is bounded by the chunk-sized read buffer.
                let _ = chunk.extend_from_slice(&buf[..n]);
                StreamStep::Chunk(chunk)
            }
            Err(_) => {
                self.close(storage);
                StreamStep::Failed
            }
        }
    }

    /// Release the file handle if still held. Safe to call more than once.
    pub fn close<S: Storage<File = F>>(&mut self, storage: &mut S) {
        if let Some(file) = self.file.take() {
            storage.close(file);
        }
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::string::String;
    use std::vec::Vec as StdVec;

    struct MemFile {
        data: StdVec<u8>,
        pos: usize,
        fail_next_read: bool,
    }

    #[derive(Default)]
    struct MemStorage {
        files: BTreeMap<String, StdVec<u8>>,
        open_files: usize,
        fail_reads: bool,
    }

    impl MemStorage {
        fn with_file(name: &str, content: &[u8]) -> Self {
            let mut s = Self::default();
            s.files.insert(name.into(), content.into());
            s
        }
    }

    impl Storage for MemStorage {
        type File = MemFile;

        fn open(&mut self, name: &str) -> Result<MemFile, StorageError> {
            let data = self.files.get(name).ok_or(StorageError::NotFound)?.clone();
            self.open_files += 1;
            Ok(MemFile {
                data,
                pos: 0,
                fail_next_read: self.fail_reads,
            })
        }

        fn read(&mut self, file: &mut MemFile, buf: &mut [u8]) -> Result<usize, StorageError> {
            if file.fail_next_read {
                return Err(StorageError::Read);
            }
            let n = buf.len().min(file.data.len() - file.pos);
            buf[..n].copy_from_slice(&file.data[file.pos..file.pos + n]);
            file.pos += n;
            Ok(n)
        }

        fn close(&mut self, _file: MemFile) {
            self.open_files -= 1;
        }

        fn append(&mut self, name: &str, data: &str) -> Result<(), StorageError> {
            self.files
                .entry(name.into())
                .or_default()
                .extend_from_slice(data.as_bytes());
            Ok(())
        }
    }

    #[test]
    fn missing_file_does_not_open_a_handle() {
        let mut storage = MemStorage::default();
        assert!(StreamSession::open(&mut storage, "nope.txt").is_err());
        assert_eq!(storage.open_files, 0);
    }

    #[test]
    fn chunks_then_end_marker_then_closed() {
        let mut storage = MemStorage::with_file("log.txt", &[0xAB; 100]);
        let mut stream = StreamSession::open(&mut storage, "log.txt").unwrap();

        match stream.next_chunk(&mut storage) {
            StreamStep::Chunk(c) => assert_eq!(c.len(), STREAM_CHUNK_BYTES),
            other => panic!("unexpected step {other:?}"),
        }
        match stream.next_chunk(&mut storage) {
            StreamStep::Chunk(c) => assert_eq!(c.len(), 36),
            other => panic!("unexpected step {other:?}"),
        }
        assert_eq!(stream.next_chunk(&mut storage), StreamStep::End);
        assert!(!stream.is_open());
        assert_eq!(storage.open_files, 0);
    }

    #[test]
    fn empty_file_ends_immediately() {
        let mut storage = MemStorage::with_file("empty", b"");
        let mut stream = StreamSession::open(&mut storage, "empty").unwrap();
        assert_eq!(stream.next_chunk(&mut storage), StreamStep::End);
        assert_eq!(storage.open_files, 0);
    }

    #[test]
    fn read_failure_closes_the_file() {
        let mut storage = MemStorage::with_file("log.txt", &[1, 2, 3]);
        storage.fail_reads = true;
        let mut stream = StreamSession::open(&mut storage, "log.txt").unwrap();
        assert_eq!(stream.next_chunk(&mut storage), StreamStep::Failed);
        assert!(!stream.is_open());
        assert_eq!(storage.open_files, 0);
    }

    #[test]
    fn explicit_close_is_idempotent() {
        let mut storage = MemStorage::with_file("log.txt", &[1, 2, 3]);
        let mut stream = StreamSession::open(&mut storage, "log.txt").unwrap();
        stream.close(&mut storage);
        stream.close(&mut storage);
        assert_eq!(storage.open_files, 0);
        // A tick after close yields nothing further.
        assert_eq!(stream.next_chunk(&mut storage), StreamStep::Failed);
    }
}
