//! Append-only log manager. Records are framed as
//! `[total_len u32 | crc u32 | bincode payload]` and addressed by their byte
//! offset (the LSN). The coordinator appends and flushes; replay is the
//! recovery subsystem's business, not this crate's.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crc32fast::Hasher;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::Rid;

/// A Log Sequence Number: the record's byte offset in the log file.
pub type Lsn = u64;

const RECORD_HDR_SIZE: usize = 8;

/// One logical event in the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogRecord {
    Begin {
        txn_id: u32,
    },
    Commit {
        txn_id: u32,
    },
    Abort {
        txn_id: u32,
    },
    InsertRecord {
        txn_id: u32,
        table: String,
        rid: Rid,
    },
    DeleteRecord {
        txn_id: u32,
        table: String,
        rid: Rid,
        record: Vec<u8>,
    },
    UpdateRecord {
        txn_id: u32,
        table: String,
        rid: Rid,
        old_record: Vec<u8>,
    },
}

pub struct LogManager {
    file: Mutex<File>,
    next_lsn: AtomicU64,
}

impl LogManager {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let next_lsn = AtomicU64::new(file.metadata()?.len());
        Ok(Self {
            file: Mutex::new(file),
            next_lsn,
        })
    }

    /// Appends one record and returns its LSN. Not durable until `flush`.
    pub fn append(&self, record: &LogRecord) -> Result<Lsn> {
        let payload = bincode::serialize(record).map_err(io::Error::other)?;
        let total_len = (RECORD_HDR_SIZE + payload.len()) as u32;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        let crc = hasher.finalize();

        let lsn = self.next_lsn.fetch_add(total_len as u64, Ordering::SeqCst);

        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start(lsn))?;
        file.write_all(&total_len.to_le_bytes())?;
        file.write_all(&crc.to_le_bytes())?;
        file.write_all(&payload)?;
        crate::basalt_debug_log!("[LogManager::append] lsn {lsn}, {total_len} bytes");
        Ok(lsn)
    }

    pub fn flush(&self) -> Result<()> {
        self.file.lock().unwrap().sync_all()?;
        Ok(())
    }

    /// Reads the record at `lsn`, verifying its checksum. Returns the record
    /// and the LSN following it, or `None` past the end of the log.
    pub fn read_record(&self, lsn: Lsn) -> Result<Option<(LogRecord, Lsn)>> {
        let mut file = self.file.lock().unwrap();
        if lsn >= file.metadata()?.len() {
            return Ok(None);
        }
        file.seek(SeekFrom::Start(lsn))?;
        let mut header = [0u8; RECORD_HDR_SIZE];
        file.read_exact(&mut header)?;
        let total_len = u32::from_le_bytes(header[0..4].try_into().unwrap()) as usize;
        let crc = u32::from_le_bytes(header[4..8].try_into().unwrap());

        let mut payload = vec![0u8; total_len - RECORD_HDR_SIZE];
        file.read_exact(&mut payload)?;

        let mut hasher = Hasher::new();
        hasher.update(&payload);
        if hasher.finalize() != crc {
            return Err(
                io::Error::new(io::ErrorKind::InvalidData, "log record CRC mismatch").into(),
            );
        }

        let record = bincode::deserialize(&payload).map_err(io::Error::other)?;
        Ok(Some((record, lsn + total_len as u64)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn records_round_trip_in_order() {
        let dir = tempdir().unwrap();
        let log = LogManager::open(dir.path().join("basalt.log")).unwrap();

        let records = vec![
            LogRecord::Begin { txn_id: 1 },
            LogRecord::InsertRecord {
                txn_id: 1,
                table: "t".into(),
                rid: Rid::new(1, 3),
            },
            LogRecord::DeleteRecord {
                txn_id: 1,
                table: "t".into(),
                rid: Rid::new(1, 4),
                record: vec![7, 7, 7],
            },
            LogRecord::UpdateRecord {
                txn_id: 1,
                table: "t".into(),
                rid: Rid::new(1, 5),
                old_record: vec![9; 8],
            },
            LogRecord::Commit { txn_id: 1 },
        ];
        for record in &records {
            log.append(record).unwrap();
        }
        log.flush().unwrap();

        let mut lsn = 0;
        let mut seen = Vec::new();
        while let Some((record, next)) = log.read_record(lsn).unwrap() {
            seen.push(record);
            lsn = next;
        }
        assert_eq!(seen, records);
    }

    #[test]
    fn reopen_appends_after_existing_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basalt.log");
        {
            let log = LogManager::open(&path).unwrap();
            log.append(&LogRecord::Begin { txn_id: 7 }).unwrap();
            log.flush().unwrap();
        }
        let log = LogManager::open(&path).unwrap();
        let lsn = log.append(&LogRecord::Abort { txn_id: 7 }).unwrap();
        assert!(lsn > 0);

        let (first, next) = log.read_record(0).unwrap().unwrap();
        assert_eq!(first, LogRecord::Begin { txn_id: 7 });
        let (second, _) = log.read_record(next).unwrap().unwrap();
        assert_eq!(second, LogRecord::Abort { txn_id: 7 });
    }

    #[test]
    fn corrupted_payload_fails_the_checksum() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("basalt.log");
        let log = LogManager::open(&path).unwrap();
        log.append(&LogRecord::Commit { txn_id: 3 }).unwrap();
        log.flush().unwrap();
        drop(log);

        // Flip one payload byte on disk.
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        let log = LogManager::open(&path).unwrap();
        assert!(log.read_record(0).is_err());
    }
}
