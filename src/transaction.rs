//! Transaction coordinator. Executors bracket their work with
//! `begin`/`commit`/`abort` and record every heap mutation in the
//! transaction's write set; abort undoes that set in LIFO order through the
//! system manager's compensation hooks, and both outcomes release the
//! transaction's locks through the lock manager.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Result, StorageError};
use crate::log::{LogManager, LogRecord};
use crate::{FileId, PageId, Rid};

pub type TxnId = u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Default,
    Growing,
    Shrinking,
    Committed,
    Aborted,
}

/// This core runs every transaction serializable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Insert,
    Delete,
    Update,
}

/// One undo obligation: what happened, where, and the prior bytes when the
/// mutation destroyed any.
#[derive(Debug, Clone)]
pub struct WriteRecord {
    pub kind: WriteKind,
    pub table: String,
    pub rid: Rid,
    pub record: Option<Vec<u8>>,
}

impl WriteRecord {
    pub fn insert(table: impl Into<String>, rid: Rid) -> Self {
        Self {
            kind: WriteKind::Insert,
            table: table.into(),
            rid,
            record: None,
        }
    }

    pub fn delete(table: impl Into<String>, rid: Rid, record: Vec<u8>) -> Self {
        Self {
            kind: WriteKind::Delete,
            table: table.into(),
            rid,
            record: Some(record),
        }
    }

    pub fn update(table: impl Into<String>, rid: Rid, old_record: Vec<u8>) -> Self {
        Self {
            kind: WriteKind::Update,
            table: table.into(),
            rid,
            record: Some(old_record),
        }
    }
}

/// Identity of a lock as handed out by the lock manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockId {
    Table(FileId),
    Record(FileId, Rid),
}

/// The lock manager is an external collaborator; the coordinator only ever
/// releases.
pub trait LockManager: Send + Sync {
    fn unlock(&self, txn: &Transaction, lock: LockId) -> bool;
}

/// Compensation hooks the coordinator invokes while undoing a write set.
pub trait SystemManager: Send + Sync {
    /// Undo an insert: remove the record at `rid`.
    fn rollback_insert(&self, table: &str, rid: Rid) -> Result<()>;
    /// Undo a delete: restore `record` at its original `rid`.
    fn rollback_delete(&self, table: &str, rid: Rid, record: &[u8]) -> Result<()>;
    /// Undo an update: write `record` back over `rid`.
    fn rollback_update(&self, table: &str, rid: Rid, record: &[u8]) -> Result<()>;
}

pub struct Transaction {
    id: TxnId,
    isolation: IsolationLevel,
    state: Mutex<TransactionState>,
    write_set: Mutex<Vec<WriteRecord>>,
    lock_set: Mutex<HashSet<LockId>>,
    /// Index pages orphaned by coalescing, freed by the caller after commit.
    index_deleted_pages: Mutex<Vec<PageId>>,
}

impl Transaction {
    pub fn new(id: TxnId) -> Self {
        Self {
            id,
            isolation: IsolationLevel::Serializable,
            state: Mutex::new(TransactionState::Default),
            write_set: Mutex::new(Vec::new()),
            lock_set: Mutex::new(HashSet::new()),
            index_deleted_pages: Mutex::new(Vec::new()),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TransactionState {
        *self.state.lock().unwrap()
    }

    pub fn set_state(&self, state: TransactionState) {
        *self.state.lock().unwrap() = state;
    }

    /// Appended by executors after every successful heap mutation.
    pub fn append_write_record(&self, record: WriteRecord) {
        self.write_set.lock().unwrap().push(record);
    }

    pub fn write_set_len(&self) -> usize {
        self.write_set.lock().unwrap().len()
    }

    /// Recorded by executors when the lock manager grants a lock.
    pub fn append_lock(&self, lock: LockId) {
        self.lock_set.lock().unwrap().insert(lock);
    }

    pub fn lock_set_len(&self) -> usize {
        self.lock_set.lock().unwrap().len()
    }

    pub fn append_index_deleted_page(&self, page_id: PageId) {
        self.index_deleted_pages.lock().unwrap().push(page_id);
    }

    /// Drains the deleted-page list, e.g. to free the pages after commit.
    pub fn take_index_deleted_pages(&self) -> Vec<PageId> {
        std::mem::take(&mut self.index_deleted_pages.lock().unwrap())
    }
}

/// Hands out transaction ids and drives commit/abort. The global transaction
/// table maps live ids to their objects; entries exist from `begin` until the
/// transaction finishes.
pub struct TransactionManager {
    next_txn_id: AtomicU32,
    txn_map: Mutex<HashMap<TxnId, Arc<Transaction>>>,
    lock_manager: Arc<dyn LockManager>,
    system: Arc<dyn SystemManager>,
    log: Option<Arc<LogManager>>,
}

impl TransactionManager {
    pub fn new(
        lock_manager: Arc<dyn LockManager>,
        system: Arc<dyn SystemManager>,
        log: Option<Arc<LogManager>>,
    ) -> Self {
        Self {
            next_txn_id: AtomicU32::new(0),
            txn_map: Mutex::new(HashMap::new()),
            lock_manager,
            system,
            log,
        }
    }

    /// Starts a transaction. `None` allocates a fresh one; either way the
    /// transaction is registered in the global table and returned.
    pub fn begin(&self, txn: Option<Arc<Transaction>>) -> Arc<Transaction> {
        let txn = txn.unwrap_or_else(|| {
            let id = self.next_txn_id.fetch_add(1, Ordering::SeqCst);
            Arc::new(Transaction::new(id))
        });
        self.txn_map.lock().unwrap().insert(txn.id(), txn.clone());
        crate::basalt_debug_log!("[TransactionManager::begin] txn {}", txn.id());
        txn
    }

    pub fn get_transaction(&self, id: TxnId) -> Option<Arc<Transaction>> {
        self.txn_map.lock().unwrap().get(&id).cloned()
    }

    pub fn active_count(&self) -> usize {
        self.txn_map.lock().unwrap().len()
    }

    /// Commits: the write set is dropped (nothing to undo), locks are
    /// released, and a commit record is appended and flushed when a log
    /// manager is attached.
    pub fn commit(&self, txn: &Arc<Transaction>) -> Result<()> {
        txn.write_set.lock().unwrap().clear();
        self.release_locks(txn);
        txn.set_state(TransactionState::Committed);
        if let Some(log) = &self.log {
            log.append(&LogRecord::Commit { txn_id: txn.id() })?;
            log.flush()?;
        }
        self.txn_map.lock().unwrap().remove(&txn.id());
        crate::basalt_debug_log!("[TransactionManager::commit] txn {}", txn.id());
        Ok(())
    }

    /// Aborts: the write set is undone in LIFO order through the system
    /// manager, locks are released, and an abort record is appended and
    /// flushed when a log manager is attached.
    pub fn abort(&self, txn: &Arc<Transaction>) -> Result<()> {
        loop {
            let record = txn.write_set.lock().unwrap().pop();
            let Some(record) = record else {
                break;
            };
            match record.kind {
                WriteKind::Insert => self.system.rollback_insert(&record.table, record.rid)?,
                WriteKind::Delete => {
                    let prior = record
                        .record
                        .as_deref()
                        .ok_or(StorageError::RecordNotFound(record.rid))?;
                    self.system
                        .rollback_delete(&record.table, record.rid, prior)?;
                }
                WriteKind::Update => {
                    let prior = record
                        .record
                        .as_deref()
                        .ok_or(StorageError::RecordNotFound(record.rid))?;
                    self.system
                        .rollback_update(&record.table, record.rid, prior)?;
                }
            }
        }
        self.release_locks(txn);
        txn.set_state(TransactionState::Aborted);
        if let Some(log) = &self.log {
            log.append(&LogRecord::Abort { txn_id: txn.id() })?;
            log.flush()?;
        }
        self.txn_map.lock().unwrap().remove(&txn.id());
        crate::basalt_debug_log!("[TransactionManager::abort] txn {}", txn.id());
        Ok(())
    }

    fn release_locks(&self, txn: &Arc<Transaction>) {
        let locks: Vec<LockId> = txn.lock_set.lock().unwrap().drain().collect();
        for lock in locks {
            self.lock_manager.unlock(txn, lock);
        }
    }
}
