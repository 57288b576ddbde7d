//! Manages the buffer pool, a fixed set of in-memory frames that cache disk
//! pages. Structural state (page table, free list, replacer) lives behind one
//! mutex; page payloads live behind per-frame locks so pinned frames can be
//! read and written without blocking the pool.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::{Result, StorageError};
use crate::pager::Pager;
use crate::replacer::{ClockReplacer, Replacer};
use crate::{FileId, FrameId, Page, PageId, INVALID_PAGE_NO};

pub const DEFAULT_POOL_SIZE: usize = 256;

#[derive(Debug)]
struct FrameMeta {
    /// Current binding; `page_no == INVALID_PAGE_NO` when unbound.
    id: PageId,
    pin_count: u32,
    is_dirty: bool,
}

struct Frame {
    page: RwLock<Page>,
    meta: Mutex<FrameMeta>,
}

struct PoolState {
    page_table: HashMap<PageId, FrameId>,
    free_list: Vec<FrameId>,
    replacer: Box<dyn Replacer>,
}

pub struct BufferPoolManager {
    pager: Arc<Pager>,
    frames: Vec<Arc<Frame>>,
    state: Mutex<PoolState>,
}

/// An RAII guard for a pinned page. Dropping it unpins; `write` access marks
/// the frame dirty.
pub struct PageGuard<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    frame: Arc<Frame>,
}

impl PageGuard<'_> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.frame.page.read().unwrap()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        self.frame.meta.lock().unwrap().is_dirty = true;
        self.frame.page.write().unwrap()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.bpm.unpin_page(self.page_id, false);
    }
}

impl BufferPoolManager {
    pub fn new(pager: Arc<Pager>, pool_size: usize, replacer: Box<dyn Replacer>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = Vec::with_capacity(pool_size);
        for i in 0..pool_size {
            frames.push(Arc::new(Frame {
                page: RwLock::new(Page::unbound(0)),
                meta: Mutex::new(FrameMeta {
                    id: PageId::invalid(0),
                    pin_count: 0,
                    is_dirty: false,
                }),
            }));
            free_list.push(i);
        }
        // Free frames are handed out in index order.
        free_list.reverse();
        Self {
            pager,
            frames,
            state: Mutex::new(PoolState {
                page_table: HashMap::new(),
                free_list,
                replacer,
            }),
        }
    }

    pub fn with_clock(pager: Arc<Pager>, pool_size: usize) -> Self {
        let replacer = Box::new(ClockReplacer::new(pool_size));
        Self::new(pager, pool_size, replacer)
    }

    pub fn pager(&self) -> &Arc<Pager> {
        &self.pager
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    fn find_victim(state: &mut PoolState) -> Option<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Some(frame_id);
        }
        state.replacer.victim()
    }

    /// Rebinds a victim frame to `new_id`: flush-if-dirty, drop the old page
    /// table entry, zero the payload, insert the new entry. A failed flush
    /// leaves the old binding and dirty flag untouched so a later
    /// `flush_page` can retry.
    fn rebind_frame(&self, state: &mut PoolState, frame_id: FrameId, new_id: PageId) -> Result<()> {
        let frame = &self.frames[frame_id];
        let mut meta = frame.meta.lock().unwrap();
        let old_id = meta.id;
        if meta.is_dirty && old_id.page_no != INVALID_PAGE_NO {
            let flushed = {
                let page = frame.page.read().unwrap();
                self.pager.write_page(old_id.file, old_id.page_no, &page.data)
            };
            if let Err(e) = flushed {
                drop(meta);
                state.replacer.unpin(frame_id);
                return Err(e);
            }
            meta.is_dirty = false;
        }
        if old_id.page_no != INVALID_PAGE_NO {
            state.page_table.remove(&old_id);
        }
        let mut page = frame.page.write().unwrap();
        page.reset();
        page.id = new_id;
        meta.id = new_id;
        meta.pin_count = 0;
        meta.is_dirty = false;
        state.page_table.insert(new_id, frame_id);
        Ok(())
    }

    /// Drops a freshly made binding again, e.g. after a failed disk read.
    fn unbind_frame(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) {
        state.page_table.remove(&page_id);
        let frame = &self.frames[frame_id];
        let mut meta = frame.meta.lock().unwrap();
        meta.id = PageId::invalid(page_id.file);
        meta.pin_count = 0;
        meta.is_dirty = false;
        frame.page.write().unwrap().reset();
        state.free_list.push(frame_id);
    }

    /// Returns the page pinned. A cached page is pinned in place; otherwise a
    /// victim frame is rebound and the page is read from disk.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = self.frames[frame_id].clone();
            frame.meta.lock().unwrap().pin_count += 1;
            state.replacer.pin(frame_id);
            return Ok(PageGuard {
                bpm: self,
                page_id,
                frame,
            });
        }

        let frame_id = Self::find_victim(&mut state).ok_or(StorageError::PoolExhausted)?;
        self.rebind_frame(&mut state, frame_id, page_id)?;

        let frame = self.frames[frame_id].clone();
        let read = {
            let mut page = frame.page.write().unwrap();
            self.pager
                .read_page(page_id.file, page_id.page_no, &mut page.data)
        };
        if let Err(e) = read {
            self.unbind_frame(&mut state, frame_id, page_id);
            return Err(e);
        }

        frame.meta.lock().unwrap().pin_count = 1;
        state.replacer.pin(frame_id);
        crate::basalt_debug_log!("[BufferPool::fetch_page] {page_id:?} -> frame {frame_id}");
        Ok(PageGuard {
            bpm: self,
            page_id,
            frame,
        })
    }

    /// Allocates a fresh page on `file` and returns it pinned, zeroed, and
    /// dirty.
    pub fn new_page(&self, file: FileId) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock().unwrap();
        let frame_id = Self::find_victim(&mut state).ok_or(StorageError::PoolExhausted)?;
        let page_no = self.pager.allocate_page(file)?;
        let page_id = PageId::new(file, page_no);
        self.rebind_frame(&mut state, frame_id, page_id)?;

        let frame = self.frames[frame_id].clone();
        {
            let mut meta = frame.meta.lock().unwrap();
            meta.pin_count = 1;
            meta.is_dirty = true;
        }
        state.replacer.pin(frame_id);
        crate::basalt_debug_log!("[BufferPool::new_page] {page_id:?} -> frame {frame_id}");
        Ok(PageGuard {
            bpm: self,
            page_id,
            frame,
        })
    }

    /// Drops one pin. Returns `false` for a page that is not cached or not
    /// pinned. The dirty flag is OR-ed in.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.state.lock().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };
        let mut meta = self.frames[frame_id].meta.lock().unwrap();
        if meta.pin_count == 0 {
            return false;
        }
        meta.pin_count -= 1;
        if is_dirty {
            meta.is_dirty = true;
        }
        if meta.pin_count == 0 {
            state.replacer.unpin(frame_id);
        }
        true
    }

    /// Writes the bound frame back unconditionally and clears its dirty flag.
    /// Returns `false` when the page is not cached.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let state = self.state.lock().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id];
        {
            let page = frame.page.read().unwrap();
            self.pager
                .write_page(page_id.file, page_id.page_no, &page.data)?;
        }
        frame.meta.lock().unwrap().is_dirty = false;
        Ok(true)
    }

    /// Writes back every cached page of `file` and clears the dirty flags.
    pub fn flush_all_pages(&self, file: FileId) -> Result<()> {
        let state = self.state.lock().unwrap();
        for (&page_id, &frame_id) in state.page_table.iter() {
            if page_id.file != file {
                continue;
            }
            let frame = &self.frames[frame_id];
            {
                let page = frame.page.read().unwrap();
                self.pager
                    .write_page(page_id.file, page_id.page_no, &page.data)?;
            }
            frame.meta.lock().unwrap().is_dirty = false;
        }
        Ok(())
    }

    /// Evicts the page from the pool, writing it back first if dirty.
    /// Returns `false` when the page is pinned; an uncached page succeeds
    /// trivially.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };
        let frame = &self.frames[frame_id];
        {
            let meta = frame.meta.lock().unwrap();
            if meta.pin_count > 0 {
                return Ok(false);
            }
        }
        state.replacer.pin(frame_id);
        let dirty = frame.meta.lock().unwrap().is_dirty;
        if dirty {
            let flushed = {
                let page = frame.page.read().unwrap();
                self.pager.write_page(page_id.file, page_id.page_no, &page.data)
            };
            if let Err(e) = flushed {
                state.replacer.unpin(frame_id);
                return Err(e);
            }
        }
        self.unbind_frame(&mut state, frame_id, page_id);
        Ok(true)
    }

    /// Pin count of a cached page, `None` when absent. Test and debug surface.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock().unwrap();
        let &frame_id = state.page_table.get(&page_id)?;
        Some(self.frames[frame_id].meta.lock().unwrap().pin_count)
    }
}
