//! Positional page I/O over a set of open files, plus per-file page
//! allocation. Durability is the caller's business: nothing here fsyncs
//! unless `sync_file` is called.

use std::collections::HashMap;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::error::{Result, StorageError};
use crate::failpoint::{self, FailPoint};
use crate::{FileId, PageNo, PAGE_SIZE};

struct FileEntry {
    file: File,
    /// The next page number this file will hand out.
    next_page_no: PageNo,
}

pub struct Pager {
    files: Mutex<HashMap<FileId, FileEntry>>,
    next_file_id: AtomicU32,
}

impl Default for Pager {
    fn default() -> Self {
        Self::new()
    }
}

impl Pager {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            next_file_id: AtomicU32::new(0),
        }
    }

    /// Opens (creating if missing) a paged file and registers it under a
    /// fresh [`FileId`]. The allocator starts past the highest existing page.
    pub fn open_file<P: AsRef<Path>>(&self, path: P) -> Result<FileId> {
        let path_ref = path.as_ref();
        if let Some(parent) = path_ref.parent() {
            create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path_ref)?;

        let file_size = file.metadata()?.len();
        let next_page_no = (file_size / PAGE_SIZE as u64) as PageNo;
        let id = self.next_file_id.fetch_add(1, Ordering::SeqCst);
        crate::basalt_debug_log!(
            "[Pager::open_file] {path_ref:?} -> file {id}, {next_page_no} existing pages"
        );

        self.files
            .lock()
            .unwrap()
            .insert(id, FileEntry { file, next_page_no });
        Ok(id)
    }

    /// Syncs and forgets the file. Callers flush their cached pages first.
    pub fn close_file(&self, file: FileId) -> Result<()> {
        let entry = self
            .files
            .lock()
            .unwrap()
            .remove(&file)
            .ok_or(StorageError::FileNotOpen(file))?;
        entry.file.sync_all()?;
        Ok(())
    }

    fn with_file<T>(&self, file: FileId, f: impl FnOnce(&mut FileEntry) -> Result<T>) -> Result<T> {
        let mut files = self.files.lock().unwrap();
        let entry = files.get_mut(&file).ok_or(StorageError::FileNotOpen(file))?;
        f(entry)
    }

    /// Positional read of one page. A page past the end of the file (or a
    /// short tail) reads back as zeroes.
    pub fn read_page(&self, file: FileId, page_no: PageNo, buf: &mut [u8]) -> Result<()> {
        debug_assert!(page_no >= 0);
        debug_assert!(buf.len() <= PAGE_SIZE);
        failpoint::hit(FailPoint::PagerRead)?;
        self.with_file(file, |entry| {
            let offset = page_no as u64 * PAGE_SIZE as u64;
            entry.file.seek(SeekFrom::Start(offset))?;
            let mut read_total = 0;
            while read_total < buf.len() {
                let n = entry.file.read(&mut buf[read_total..])?;
                if n == 0 {
                    break;
                }
                read_total += n;
            }
            if read_total < buf.len() {
                buf[read_total..].fill(0);
            }
            Ok(())
        })
    }

    /// Positional write of one page. No implicit fsync.
    pub fn write_page(&self, file: FileId, page_no: PageNo, buf: &[u8]) -> Result<()> {
        debug_assert!(page_no >= 0);
        debug_assert!(buf.len() <= PAGE_SIZE);
        failpoint::hit(FailPoint::PagerWrite)?;
        self.with_file(file, |entry| {
            let offset = page_no as u64 * PAGE_SIZE as u64;
            entry.file.seek(SeekFrom::Start(offset))?;
            entry.file.write_all(buf)?;
            if page_no >= entry.next_page_no {
                entry.next_page_no = page_no + 1;
            }
            Ok(())
        })
    }

    /// Returns the next page number for this file and advances the counter.
    pub fn allocate_page(&self, file: FileId) -> Result<PageNo> {
        self.with_file(file, |entry| {
            let page_no = entry.next_page_no;
            entry.next_page_no += 1;
            crate::basalt_debug_log!("[Pager::allocate_page] file {file} -> page {page_no}");
            Ok(page_no)
        })
    }

    /// Re-seeds the allocator, typically from a file header's page count
    /// after opening a file whose highest live page is `page_no - 1`.
    pub fn set_next_page_no(&self, file: FileId, page_no: PageNo) -> Result<()> {
        self.with_file(file, |entry| {
            entry.next_page_no = page_no;
            Ok(())
        })
    }

    pub fn next_page_no(&self, file: FileId) -> Result<PageNo> {
        self.with_file(file, |entry| Ok(entry.next_page_no))
    }
}
