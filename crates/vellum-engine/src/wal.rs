//! Commit log persisted between checkpoints.
//!
//! On-disk format, one frame per commit:
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized CommitRecord)]
//! ```

use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SyncMode;
use crate::error::{EngineError, EngineResult};
use crate::snapshot::Record;

const HEADER_SIZE: u64 = 8;

/// One mutation inside a commit record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalOp {
    Set {
        collection: String,
        key: String,
        record: Record,
    },
    Remove {
        collection: String,
        key: String,
    },
    Clear {
        collection: String,
    },
}

/// All mutations of one committed write transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    pub commit: u64,
    pub ops: Vec<WalOp>,
}

/// Append-only, CRC-framed log of commit records.
///
/// Only the writer holding the engine's write gate touches the log, so the
/// log itself carries no lock.
pub struct WriteAheadLog {
    path: PathBuf,
    writer: BufWriter<File>,
    offset: u64,
    sync_mode: SyncMode,
}

impl WriteAheadLog {
    /// Open (or create) the log file at `path`.
    pub fn open(path: &Path, sync_mode: SyncMode) -> EngineResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(path)?;
        let offset = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            offset,
            sync_mode,
        })
    }

    /// Append one commit record. Returns the byte offset of its frame.
    pub fn append(&mut self, record: &CommitRecord) -> EngineResult<u64> {
        let payload =
            bincode::serialize(record).map_err(|e| EngineError::Serialization(e.to_string()))?;
        let length = u32::try_from(payload.len()).map_err(|_| {
            EngineError::Serialization(format!("commit record too large: {} bytes", payload.len()))
        })?;
        let crc = crc32fast::hash(&payload);

        let frame_offset = self.offset;
        self.writer.write_all(&length.to_le_bytes())?;
        self.writer.write_all(&crc.to_le_bytes())?;
        self.writer.write_all(&payload)?;
        self.writer.flush()?;
        if self.sync_mode == SyncMode::EveryCommit {
            self.writer.get_ref().sync_data()?;
        }

        self.offset += HEADER_SIZE + payload.len() as u64;
        debug!(commit = record.commit, offset = frame_offset, len = payload.len(), "wal append");
        Ok(frame_offset)
    }

    /// Read every intact commit record, front to back.
    ///
    /// Recovery ends at the first damaged frame: a torn write, a checksum
    /// mismatch or an unreadable record. Later frames depend on it and are
    /// discarded too. The file is cut back to the end of the last intact frame
    /// so later appends follow it directly.
    pub fn recover(&mut self) -> EngineResult<Vec<CommitRecord>> {
        self.writer.flush()?;
        let mut reader = BufReader::new(File::open(&self.path)?);
        let file_len = reader.get_ref().metadata()?.len();
        let mut records = Vec::new();
        let mut offset = 0u64;

        while offset + HEADER_SIZE <= file_len {
            let mut header = [0u8; HEADER_SIZE as usize];
            match reader.read_exact(&mut header) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as u64;
            let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

            if length == 0 || offset + HEADER_SIZE + length > file_len {
                warn!(offset, length, file_len, "torn wal frame; stopping recovery");
                break;
            }

            let mut payload = vec![0u8; length as usize];
            reader.read_exact(&mut payload)?;

            let actual_crc = crc32fast::hash(&payload);
            if actual_crc != expected_crc {
                warn!(offset, expected = expected_crc, actual = actual_crc, "wal crc mismatch; stopping recovery");
                break;
            }
            match bincode::deserialize::<CommitRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(offset, error = %e, "unreadable wal frame; stopping recovery");
                    break;
                }
            }
            offset += HEADER_SIZE + length;
        }

        if offset < file_len {
            self.cut(offset)?;
            warn!(
                path = %self.path.display(),
                kept = offset,
                discarded = file_len - offset,
                "wal tail discarded"
            );
        }
        debug!(recovered = records.len(), "wal recovery complete");
        Ok(records)
    }

    /// Shorten the file to `len` bytes and append from there.
    fn cut(&mut self, len: u64) -> EngineResult<()> {
        self.writer.flush()?;
        let file = OpenOptions::new().write(true).open(&self.path)?;
        file.set_len(len)?;
        file.sync_all()?;
        self.offset = len;
        Ok(())
    }

    /// Drop every frame. Called once a checkpoint covers the whole log.
    pub fn truncate(&mut self) -> EngineResult<()> {
        self.writer.flush()?;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        file.sync_all()?;
        drop(file);

        let file = OpenOptions::new().read(true).append(true).open(&self.path)?;
        self.writer = BufWriter::new(file);
        self.offset = 0;
        debug!(path = %self.path.display(), "wal truncated");
        Ok(())
    }

    /// Bytes currently in the log.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
