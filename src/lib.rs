//! # Basalt Storage Core
//! Disk-based storage core for a relational engine.
//! This crate manages the on-disk and in-memory representation of data:
//! a page buffer pool, a B+tree index, a slotted heap record store, and a
//! transaction coordinator on top.

/// The B+tree index implementation.
pub mod btree;
/// The buffer pool manager.
pub mod buffer_pool;
/// The crate-wide error type.
pub mod error;
/// Fault injection for error-path tests.
pub mod failpoint;
/// The slotted-page heap record store.
pub mod heap;
/// The append-only log manager.
pub mod log;
/// The page layout and field accessors.
pub mod page;
/// The pager for reading and writing pages to disk.
pub mod pager;
/// Frame replacement policies for the buffer pool.
pub mod replacer;
/// The transaction coordinator and its collaborator seams.
pub mod transaction;

use serde::{Deserialize, Serialize};

/// The size of a single page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Handle for an open paged file, vended by the pager.
pub type FileId = u32;

/// A page number within one file. Negative values are sentinels.
pub type PageNo = i32;

/// Index of a frame inside the buffer pool.
pub type FrameId = usize;

/// Page number of a frame that is not bound to any on-disk page.
pub const INVALID_PAGE_NO: PageNo = -1;

/// A unique identifier for a page: which file it lives in, and where.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    pub file: FileId,
    pub page_no: PageNo,
}

impl PageId {
    pub fn new(file: FileId, page_no: PageNo) -> Self {
        Self { file, page_no }
    }

    /// The unbound id a frame carries between rebinds.
    pub fn invalid(file: FileId) -> Self {
        Self {
            file,
            page_no: INVALID_PAGE_NO,
        }
    }
}

/// A record identifier inside a heap file.
///
/// Inside an internal index node the same shape carries a child page number
/// in `page_no`, with `slot_no` unused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rid {
    pub page_no: PageNo,
    pub slot_no: i32,
}

impl Rid {
    /// Sentinel rid marking "no record", e.g. a finished heap scan.
    pub const INVALID: Rid = Rid {
        page_no: -1,
        slot_no: -1,
    };

    pub fn new(page_no: PageNo, slot_no: i32) -> Self {
        Self { page_no, slot_no }
    }
}

pub use buffer_pool::{BufferPoolManager, PageGuard};
pub use error::{Result, StorageError};
pub use page::Page;
pub use pager::Pager;

/// Diagnostic tracing, compiled in but silent unless `BASALT_DEBUG_LOG` is
/// set in the environment. Goes to stderr so it never mixes with data output.
#[macro_export]
macro_rules! basalt_debug_log {
    ($($arg:tt)*) => {
        if ::std::env::var_os("BASALT_DEBUG_LOG").is_some() {
            eprintln!($($arg)*);
        }
    };
}
