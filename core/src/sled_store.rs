//! sled-backed index store.
//!
//! Every rebuild writes into a fresh generation of four trees
//! (`documents.N`, `doc_lengths.N`, `postings.N`, `doc_freq.N`). Commit stores
//! the generation's metadata and then flips the `current` key, so readers see
//! either the old generation or the new one, never a mix.

use parking_lot::{Mutex, RwLock};
use sled::{Db, Tree};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::index::{DocId, Posting, SnapshotMeta};
use crate::store::{IndexReader, IndexStore};

const CURRENT_KEY: &[u8] = b"current";
const TABLES: [&str; 4] = ["documents", "doc_lengths", "postings", "doc_freq"];

fn tree_name(table: &str, generation: u64) -> String {
    format!("{table}.{generation}")
}

fn meta_key(generation: u64) -> String {
    format!("meta.{generation}")
}

/// Generation encoded in a tree name, if it is one of ours.
fn generation_of(name: &[u8]) -> Option<u64> {
    let name = std::str::from_utf8(name).ok()?;
    let (table, generation) = name.rsplit_once('.')?;
    if !TABLES.contains(&table) {
        return None;
    }
    generation.parse().ok()
}

fn posting_key(term: &str, doc_id: DocId) -> Vec<u8> {
    let mut key = term_prefix(term);
    key.extend_from_slice(&doc_id.to_be_bytes());
    key
}

/// Terms never contain NUL, so `term\0` delimits a term's postings.
fn term_prefix(term: &str) -> Vec<u8> {
    let mut key = Vec::with_capacity(term.len() + 5);
    key.extend_from_slice(term.as_bytes());
    key.push(0);
    key
}

fn decode_u32(bytes: &[u8]) -> StoreResult<u32> {
    <[u8; 4]>::try_from(bytes)
        .map(u32::from_be_bytes)
        .map_err(|_| StoreError::Corrupt(format!("expected 4 bytes, found {}", bytes.len())))
}

fn decode_u64(bytes: &[u8]) -> StoreResult<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| StoreError::Corrupt(format!("expected 8 bytes, found {}", bytes.len())))
}

#[derive(Clone)]
struct GenerationTrees {
    id: u64,
    documents: Tree,
    doc_lengths: Tree,
    postings: Tree,
    doc_freq: Tree,
}

impl GenerationTrees {
    fn open(db: &Db, id: u64) -> StoreResult<Self> {
        Ok(Self {
            id,
            documents: db.open_tree(tree_name("documents", id))?,
            doc_lengths: db.open_tree(tree_name("doc_lengths", id))?,
            postings: db.open_tree(tree_name("postings", id))?,
            doc_freq: db.open_tree(tree_name("doc_freq", id))?,
        })
    }
}

/// A committed generation pinned for reading.
pub struct SledReader {
    trees: GenerationTrees,
    meta: SnapshotMeta,
}

impl SledReader {
    fn load(db: &Db, id: u64) -> StoreResult<Self> {
        let raw = db
            .get(meta_key(id))?
            .ok_or_else(|| StoreError::Corrupt(format!("generation {id} has no metadata")))?;
        let meta = serde_json::from_slice(&raw)?;
        Ok(Self { trees: GenerationTrees::open(db, id)?, meta })
    }

    pub fn generation(&self) -> u64 {
        self.trees.id
    }
}

impl IndexReader for SledReader {
    fn meta(&self) -> &SnapshotMeta {
        &self.meta
    }

    fn get_postings(&self, term: &str) -> StoreResult<Vec<Posting>> {
        if term.contains('\0') {
            return Ok(Vec::new());
        }
        let prefix = term_prefix(term);
        let mut out = Vec::new();
        for entry in self.trees.postings.scan_prefix(&prefix) {
            let (key, value) = entry?;
            let doc_id = decode_u32(&key[prefix.len()..])?;
            out.push(Posting { doc_id, freq: decode_u32(&value)? });
        }
        Ok(out)
    }

    fn get_doc_freq(&self, term: &str) -> StoreResult<u32> {
        match self.trees.doc_freq.get(term.as_bytes())? {
            Some(v) => decode_u32(&v),
            None => Ok(0),
        }
    }

    fn get_doc_length(&self, doc_id: DocId) -> StoreResult<u32> {
        match self.trees.doc_lengths.get(doc_id.to_be_bytes())? {
            Some(v) => decode_u32(&v),
            None => Ok(0),
        }
    }

    fn get_document(&self, doc_id: DocId) -> StoreResult<Option<String>> {
        match self.trees.documents.get(doc_id.to_be_bytes())? {
            Some(v) => String::from_utf8(v.to_vec())
                .map(Some)
                .map_err(|e| StoreError::Corrupt(format!("document path is not UTF-8: {e}"))),
            None => Ok(None),
        }
    }

    fn get_all_documents(&self) -> StoreResult<BTreeMap<DocId, String>> {
        let mut docs = BTreeMap::new();
        for entry in self.trees.documents.iter() {
            let (key, value) = entry?;
            let path = String::from_utf8(value.to_vec())
                .map_err(|e| StoreError::Corrupt(format!("document path is not UTF-8: {e}")))?;
            docs.insert(decode_u32(&key)?, path);
        }
        Ok(docs)
    }

    fn get_doc_count(&self) -> StoreResult<u32> {
        Ok(self.meta.num_docs)
    }
}

pub struct SledStore {
    db: Db,
    current: RwLock<Option<Arc<SledReader>>>,
    staging: Mutex<Option<GenerationTrees>>,
    /// Replaced generations; their trees live until no reader holds them.
    retired: Mutex<Vec<Arc<SledReader>>>,
    #[cfg(test)]
    fail_cleanup: std::sync::atomic::AtomicBool,
}

impl SledStore {
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// A store deleted when dropped. Used by tests and throwaway indexes.
    pub fn temporary() -> StoreResult<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: Db) -> StoreResult<Self> {
        let current = match db.get(CURRENT_KEY)? {
            Some(raw) => Some(Arc::new(SledReader::load(&db, decode_u64(&raw)?)?)),
            None => None,
        };
        let store = Self {
            db,
            current: RwLock::new(current),
            staging: Mutex::new(None),
            retired: Mutex::new(Vec::new()),
            #[cfg(test)]
            fail_cleanup: std::sync::atomic::AtomicBool::new(false),
        };
        // leftovers of rebuilds that never committed
        let keep: Vec<u64> = store.current_generation().into_iter().collect();
        store.drop_generations_except(&keep)?;
        Ok(store)
    }

    pub fn current_generation(&self) -> Option<u64> {
        self.current.read().as_ref().map(|r| r.generation())
    }

    /// Generations that still have trees in the database, ascending.
    pub fn generations(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.db.tree_names().iter().filter_map(|name| generation_of(name)).collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }

    fn drop_generation(&self, id: u64) -> StoreResult<()> {
        for table in TABLES {
            self.db.drop_tree(tree_name(table, id))?;
        }
        self.db.remove(meta_key(id))?;
        Ok(())
    }

    fn drop_generations_except(&self, keep: &[u64]) -> StoreResult<()> {
        for id in self.generations().into_iter().filter(|g| !keep.contains(g)) {
            tracing::debug!(generation = id, "dropping stale index generation");
            self.drop_generation(id)?;
        }
        Ok(())
    }

    /// Drop every generation that is neither current, staged, nor held by a reader.
    fn collect_garbage(&self) -> StoreResult<()> {
        if self.cleanup_blocked() {
            return Err(StoreError::Corrupt("generation cleanup blocked".into()));
        }
        let mut retired = self.retired.lock();
        retired.retain(|r| Arc::strong_count(r) > 1);
        let mut keep: Vec<u64> = retired.iter().map(|r| r.generation()).collect();
        keep.extend(self.current_generation());
        keep.extend(self.staging.lock().as_ref().map(|t| t.id));
        self.drop_generations_except(&keep)
    }

    #[cfg(test)]
    fn cleanup_blocked(&self) -> bool {
        self.fail_cleanup.load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn cleanup_blocked(&self) -> bool {
        false
    }

    fn stage(&self, f: impl FnOnce(&GenerationTrees) -> sled::Result<Option<sled::IVec>>) -> StoreResult<()> {
        let guard = self.staging.lock();
        let trees = guard.as_ref().ok_or(StoreError::NoRebuildInProgress)?;
        f(trees)?;
        Ok(())
    }

    /// Make `trees` the current generation. On `Err` the current generation is unchanged.
    fn publish(&self, trees: GenerationTrees, meta: &SnapshotMeta) -> StoreResult<Option<Arc<SledReader>>> {
        let id = trees.id;
        self.db.insert(meta_key(id), serde_json::to_vec(meta)?)?;
        self.db.flush()?;
        self.db.insert(CURRENT_KEY, &id.to_be_bytes()[..])?;
        let replaced = self.current.write().replace(Arc::new(SledReader { trees, meta: meta.clone() }));
        if let Err(err) = self.db.flush() {
            tracing::warn!(error = %err, generation = id, "generation is live but the pointer flush failed");
        }
        Ok(replaced)
    }
}

impl IndexStore for SledStore {
    type Reader = Arc<SledReader>;

    fn clear_all(&self) -> StoreResult<()> {
        let mut staging = self.staging.lock();
        if let Some(old) = staging.take() {
            self.drop_generation(old.id)?;
        }
        let id = self.db.generate_id()?;
        *staging = Some(GenerationTrees::open(&self.db, id)?);
        Ok(())
    }

    fn put_document(&self, doc_id: DocId, path: &str) -> StoreResult<()> {
        self.stage(|t| t.documents.insert(doc_id.to_be_bytes(), path.as_bytes()))
    }

    fn put_doc_length(&self, doc_id: DocId, length: u32) -> StoreResult<()> {
        self.stage(|t| t.doc_lengths.insert(doc_id.to_be_bytes(), &length.to_be_bytes()[..]))
    }

    fn put_posting(&self, term: &str, doc_id: DocId, freq: u32) -> StoreResult<()> {
        self.stage(|t| t.postings.insert(posting_key(term, doc_id), &freq.to_be_bytes()[..]))
    }

    fn put_doc_freq(&self, term: &str, df: u32) -> StoreResult<()> {
        self.stage(|t| t.doc_freq.insert(term.as_bytes(), &df.to_be_bytes()[..]))
    }

    fn commit(&self, meta: &SnapshotMeta) -> StoreResult<()> {
        let trees = self.staging.lock().take().ok_or(StoreError::NoRebuildInProgress)?;
        let id = trees.id;
        let replaced = match self.publish(trees, meta) {
            Ok(replaced) => replaced,
            Err(err) => {
                if let Err(drop_err) = self.drop_generation(id) {
                    tracing::warn!(error = %drop_err, generation = id, "could not drop unpublished generation");
                }
                return Err(err);
            }
        };
        tracing::debug!(generation = id, "sled generation committed");

        // the new generation is live from here on; cleanup problems are not commit failures
        if let Some(old) = replaced {
            self.retired.lock().push(old);
        }
        if let Err(err) = self.collect_garbage() {
            tracing::warn!(error = %err, "could not drop retired generations; retrying at next commit");
        }
        Ok(())
    }

    fn abort(&self) {
        if let Some(trees) = self.staging.lock().take() {
            if let Err(err) = self.drop_generation(trees.id) {
                tracing::warn!(error = %err, generation = trees.id, "could not drop aborted generation");
            }
        }
    }

    fn reader(&self) -> StoreResult<Option<Self::Reader>> {
        Ok(self.current.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_names_round_trip() {
        assert_eq!(generation_of(tree_name("postings", 17).as_bytes()), Some(17));
        assert_eq!(generation_of(b"__sled__default"), None);
        assert_eq!(generation_of(b"other.3"), None);
    }

    #[test]
    fn posting_keys_sort_by_term_then_doc() {
        let a = posting_key("ab", 1);
        let b = posting_key("ab", 256);
        let c = posting_key("abc", 0);
        assert!(a < b);
        assert!(b < c);
        assert!(b.starts_with(&term_prefix("ab")));
        assert!(!c.starts_with(&term_prefix("ab")));
    }

    fn meta(num_docs: u32) -> SnapshotMeta {
        SnapshotMeta::new(num_docs, u64::from(num_docs), crate::tokenizer::NormalizerKind::Lowercase)
    }

    fn commit_one(store: &SledStore, path: &str) {
        store.clear_all().unwrap();
        store.put_document(0, path).unwrap();
        store.commit(&meta(1)).unwrap();
    }

    #[test]
    fn failed_cleanup_does_not_fail_a_published_commit() {
        let store = SledStore::temporary().unwrap();
        commit_one(&store, "old.txt");

        store.fail_cleanup.store(true, std::sync::atomic::Ordering::SeqCst);
        commit_one(&store, "new.txt");
        let reader = store.reader().unwrap().unwrap();
        assert_eq!(reader.get_document(0).unwrap().as_deref(), Some("new.txt"));
        drop(reader);
        assert_eq!(store.generations().len(), 2);

        // the leftover generation goes at the next successful cleanup
        store.fail_cleanup.store(false, std::sync::atomic::Ordering::SeqCst);
        commit_one(&store, "newest.txt");
        assert_eq!(store.generations(), store.current_generation().into_iter().collect::<Vec<_>>());
    }

    #[test]
    fn doc_count_comes_from_the_generation_meta() {
        let store = SledStore::temporary().unwrap();
        store.clear_all().unwrap();
        for id in 0..3 {
            store.put_document(id, &format!("{id}.txt")).unwrap();
        }
        store.commit(&meta(3)).unwrap();
        assert_eq!(store.reader().unwrap().unwrap().get_doc_count().unwrap(), 3);
    }
}
