//! Index store interface and the in-memory backend.
//!
//! A store keeps exactly one committed snapshot visible to readers. A rebuild
//! stages new tables with `clear_all` + `put_*` and only becomes visible on
//! `commit`; `abort` (or a failed write) leaves the previous snapshot intact.

use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::index::{DocId, IndexSnapshot, IndexTables, Posting, SnapshotMeta};

/// Read access to one committed snapshot.
pub trait IndexReader {
    fn meta(&self) -> &SnapshotMeta;

    fn get_postings(&self, term: &str) -> StoreResult<Vec<Posting>>;

    /// 0 when the term is not indexed.
    fn get_doc_freq(&self, term: &str) -> StoreResult<u32>;

    /// 0 when the document is unknown.
    fn get_doc_length(&self, doc_id: DocId) -> StoreResult<u32>;

    fn get_document(&self, doc_id: DocId) -> StoreResult<Option<String>>;

    fn get_all_documents(&self) -> StoreResult<BTreeMap<DocId, String>>;

    fn get_doc_count(&self) -> StoreResult<u32>;
}

pub trait IndexStore: Send + Sync {
    type Reader: IndexReader;

    /// Start a rebuild: open an empty staging area, discarding any previous one.
    fn clear_all(&self) -> StoreResult<()>;

    fn put_document(&self, doc_id: DocId, path: &str) -> StoreResult<()>;

    fn put_doc_length(&self, doc_id: DocId, length: u32) -> StoreResult<()>;

    fn put_posting(&self, term: &str, doc_id: DocId, freq: u32) -> StoreResult<()>;

    fn put_doc_freq(&self, term: &str, df: u32) -> StoreResult<()>;

    /// Atomically replace the committed snapshot with the staged tables.
    fn commit(&self, meta: &SnapshotMeta) -> StoreResult<()>;

    /// Drop the staging area without touching the committed snapshot.
    fn abort(&self);

    /// Pin the committed snapshot, or `None` if nothing was ever committed.
    fn reader(&self) -> StoreResult<Option<Self::Reader>>;
}

/// Write a built snapshot into `store` as a single rebuild.
pub fn install<S: IndexStore>(store: &S, snapshot: &IndexSnapshot) -> StoreResult<()> {
    store.clear_all()?;
    let written = write_tables(store, &snapshot.tables).and_then(|()| store.commit(&snapshot.meta));
    if let Err(err) = written {
        tracing::warn!(error = %err, "index install failed; keeping previous snapshot");
        store.abort();
        return Err(err);
    }
    tracing::info!(
        num_docs = snapshot.meta.num_docs,
        num_terms = snapshot.tables.doc_freq.len(),
        normalizer = %snapshot.meta.normalizer,
        "index snapshot committed"
    );
    Ok(())
}

fn write_tables<S: IndexStore>(store: &S, tables: &IndexTables) -> StoreResult<()> {
    for (&doc_id, path) in &tables.documents {
        store.put_document(doc_id, path)?;
    }
    for (&doc_id, &length) in &tables.doc_lengths {
        store.put_doc_length(doc_id, length)?;
    }
    for (term, postings) in &tables.postings {
        for p in postings {
            store.put_posting(term, p.doc_id, p.freq)?;
        }
    }
    for (term, &df) in &tables.doc_freq {
        store.put_doc_freq(term, df)?;
    }
    Ok(())
}

impl IndexReader for IndexSnapshot {
    fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    fn get_postings(&self, term: &str) -> StoreResult<Vec<Posting>> {
        Ok(self.tables.postings.get(term).cloned().unwrap_or_default())
    }

    fn get_doc_freq(&self, term: &str) -> StoreResult<u32> {
        Ok(self.tables.doc_freq.get(term).copied().unwrap_or(0))
    }

    fn get_doc_length(&self, doc_id: DocId) -> StoreResult<u32> {
        Ok(self.tables.doc_lengths.get(&doc_id).copied().unwrap_or(0))
    }

    fn get_document(&self, doc_id: DocId) -> StoreResult<Option<String>> {
        Ok(self.tables.documents.get(&doc_id).cloned())
    }

    fn get_all_documents(&self) -> StoreResult<BTreeMap<DocId, String>> {
        Ok(self.tables.documents.clone())
    }

    fn get_doc_count(&self) -> StoreResult<u32> {
        Ok(self.tables.documents.len() as u32)
    }
}

impl<R: IndexReader + ?Sized> IndexReader for Arc<R> {
    fn meta(&self) -> &SnapshotMeta {
        (**self).meta()
    }

    fn get_postings(&self, term: &str) -> StoreResult<Vec<Posting>> {
        (**self).get_postings(term)
    }

    fn get_doc_freq(&self, term: &str) -> StoreResult<u32> {
        (**self).get_doc_freq(term)
    }

    fn get_doc_length(&self, doc_id: DocId) -> StoreResult<u32> {
        (**self).get_doc_length(doc_id)
    }

    fn get_document(&self, doc_id: DocId) -> StoreResult<Option<String>> {
        (**self).get_document(doc_id)
    }

    fn get_all_documents(&self) -> StoreResult<BTreeMap<DocId, String>> {
        (**self).get_all_documents()
    }

    fn get_doc_count(&self) -> StoreResult<u32> {
        (**self).get_doc_count()
    }
}

/// Committed snapshot plus staging area, shared by the in-process backends.
#[derive(Default)]
pub(crate) struct SnapshotCell {
    committed: RwLock<Option<Arc<IndexSnapshot>>>,
    staging: Mutex<Option<IndexTables>>,
}

impl SnapshotCell {
    pub(crate) fn with_committed(snapshot: Option<IndexSnapshot>) -> Self {
        Self { committed: RwLock::new(snapshot.map(Arc::new)), staging: Mutex::new(None) }
    }

    pub(crate) fn begin(&self) {
        *self.staging.lock() = Some(IndexTables::new());
    }

    pub(crate) fn stage(&self, f: impl FnOnce(&mut IndexTables)) -> StoreResult<()> {
        let mut guard = self.staging.lock();
        let tables = guard.as_mut().ok_or(StoreError::NoRebuildInProgress)?;
        f(tables);
        Ok(())
    }

    /// Close the staging area and pair its tables with `meta`.
    pub(crate) fn take_staged(&self, meta: &SnapshotMeta) -> StoreResult<IndexSnapshot> {
        let tables = self.staging.lock().take().ok_or(StoreError::NoRebuildInProgress)?;
        Ok(IndexSnapshot { meta: meta.clone(), tables })
    }

    pub(crate) fn publish(&self, snapshot: IndexSnapshot) {
        *self.committed.write() = Some(Arc::new(snapshot));
    }

    pub(crate) fn discard(&self) {
        self.staging.lock().take();
    }

    pub(crate) fn current(&self) -> Option<Arc<IndexSnapshot>> {
        self.committed.read().clone()
    }
}

/// Keeps the index in process memory. Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    cell: SnapshotCell,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IndexStore for MemoryStore {
    type Reader = Arc<IndexSnapshot>;

    fn clear_all(&self) -> StoreResult<()> {
        self.cell.begin();
        Ok(())
    }

    fn put_document(&self, doc_id: DocId, path: &str) -> StoreResult<()> {
        self.cell.stage(|t| t.put_document(doc_id, path))
    }

    fn put_doc_length(&self, doc_id: DocId, length: u32) -> StoreResult<()> {
        self.cell.stage(|t| t.put_doc_length(doc_id, length))
    }

    fn put_posting(&self, term: &str, doc_id: DocId, freq: u32) -> StoreResult<()> {
        self.cell.stage(|t| t.put_posting(term, doc_id, freq))
    }

    fn put_doc_freq(&self, term: &str, df: u32) -> StoreResult<()> {
        self.cell.stage(|t| t.put_doc_freq(term, df))
    }

    fn commit(&self, meta: &SnapshotMeta) -> StoreResult<()> {
        let snapshot = self.cell.take_staged(meta)?;
        self.cell.publish(snapshot);
        Ok(())
    }

    fn abort(&self) {
        self.cell.discard();
    }

    fn reader(&self) -> StoreResult<Option<Self::Reader>> {
        Ok(self.cell.current())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::NormalizerKind;

    fn meta(num_docs: u32) -> SnapshotMeta {
        SnapshotMeta::new(num_docs, 0, NormalizerKind::Lowercase)
    }

    #[test]
    fn put_without_clear_all_is_rejected() {
        let store = MemoryStore::new();
        let err = store.put_document(0, "a.txt").unwrap_err();
        assert!(matches!(err, StoreError::NoRebuildInProgress));
    }

    #[test]
    fn staged_writes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        store.clear_all().unwrap();
        store.put_document(0, "a.txt").unwrap();
        store.put_posting("hello", 0, 2).unwrap();
        assert!(store.reader().unwrap().is_none());

        store.commit(&meta(1)).unwrap();
        let reader = store.reader().unwrap().unwrap();
        assert_eq!(reader.get_doc_count().unwrap(), 1);
        assert_eq!(reader.get_postings("hello").unwrap(), vec![Posting { doc_id: 0, freq: 2 }]);
    }

    #[test]
    fn abort_keeps_previous_snapshot() {
        let store = MemoryStore::new();
        store.clear_all().unwrap();
        store.put_document(0, "old.txt").unwrap();
        store.commit(&meta(1)).unwrap();

        store.clear_all().unwrap();
        store.put_document(0, "new.txt").unwrap();
        store.abort();

        let reader = store.reader().unwrap().unwrap();
        assert_eq!(reader.get_document(0).unwrap().as_deref(), Some("old.txt"));
        assert!(matches!(store.commit(&meta(1)), Err(StoreError::NoRebuildInProgress)));
    }

    #[test]
    fn pinned_reader_survives_a_rebuild() {
        let store = MemoryStore::new();
        store.clear_all().unwrap();
        store.put_document(0, "first.txt").unwrap();
        store.commit(&meta(1)).unwrap();
        let pinned = store.reader().unwrap().unwrap();

        store.clear_all().unwrap();
        store.put_document(0, "second.txt").unwrap();
        store.commit(&meta(1)).unwrap();

        assert_eq!(pinned.get_document(0).unwrap().as_deref(), Some("first.txt"));
        let fresh = store.reader().unwrap().unwrap();
        assert_eq!(fresh.get_document(0).unwrap().as_deref(), Some("second.txt"));
    }

    #[test]
    fn unknown_lookups_default_to_zero() {
        let store = MemoryStore::new();
        store.clear_all().unwrap();
        store.commit(&meta(0)).unwrap();
        let reader = store.reader().unwrap().unwrap();
        assert!(reader.get_postings("nothing").unwrap().is_empty());
        assert_eq!(reader.get_doc_freq("nothing").unwrap(), 0);
        assert_eq!(reader.get_doc_length(42).unwrap(), 0);
    }
}
