//! Flat-file index store: one bincode snapshot plus a JSON meta sidecar.

use bincode::Options;
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::index::{DocId, IndexSnapshot, SnapshotMeta, SNAPSHOT_VERSION};
use crate::store::{IndexStore, SnapshotCell};

pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn snapshot(&self) -> PathBuf { self.root.join("snapshot.bin") }
    fn snapshot_tmp(&self) -> PathBuf { self.root.join("snapshot.bin.tmp") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

/// Fixed-width, size-capped bincode; the same options on both ends.
fn codec(limit: u64) -> impl Options {
    bincode::DefaultOptions::new().with_fixint_encoding().with_limit(limit)
}

/// Write the snapshot next to the live one, then rename it into place.
///
/// The file starts with the layout version so a reader can reject an
/// incompatible snapshot before decoding the rest.
pub fn save_snapshot(paths: &IndexPaths, snapshot: &IndexSnapshot) -> StoreResult<()> {
    create_dir_all(&paths.root)?;
    let tmp = paths.snapshot_tmp();
    {
        let mut w = BufWriter::new(File::create(&tmp)?);
        codec(u64::MAX).serialize_into(&mut w, &SNAPSHOT_VERSION)?;
        codec(u64::MAX).serialize_into(&mut w, snapshot)?;
        w.flush()?;
        w.get_ref().sync_all()?;
    }
    fs::rename(&tmp, paths.snapshot())?;
    Ok(())
}

/// `Ok(None)` when no snapshot was ever saved under `paths`.
pub fn load_snapshot(paths: &IndexPaths) -> StoreResult<Option<IndexSnapshot>> {
    let f = match File::open(paths.snapshot()) {
        Ok(f) => f,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    // nothing in the file can decode to more bytes than the file holds
    let size = f.metadata()?.len();
    let mut r = BufReader::new(f);
    let corrupt = |e: bincode::Error| StoreError::Corrupt(format!("undecodable snapshot: {e}"));

    let version: u32 = codec(size).deserialize_from(&mut r).map_err(corrupt)?;
    if version != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt(format!("snapshot version {version} (expected {SNAPSHOT_VERSION})")));
    }
    let snapshot: IndexSnapshot = codec(size).deserialize_from(&mut r).map_err(corrupt)?;
    if snapshot.meta.version != SNAPSHOT_VERSION {
        return Err(StoreError::Corrupt(format!(
            "snapshot meta version {} (expected {SNAPSHOT_VERSION})",
            snapshot.meta.version
        )));
    }
    Ok(Some(snapshot))
}

/// Human-readable copy of the snapshot metadata. Not read back by the store.
pub fn save_meta(paths: &IndexPaths, meta: &SnapshotMeta) -> StoreResult<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    fs::write(paths.meta(), json)?;
    Ok(())
}

pub fn load_meta(paths: &IndexPaths) -> StoreResult<SnapshotMeta> {
    let buf = fs::read_to_string(paths.meta())?;
    Ok(serde_json::from_str(&buf)?)
}

/// Keeps the whole index in memory and persists it to a single file on commit.
pub struct FileStore {
    paths: IndexPaths,
    cell: SnapshotCell,
}

impl FileStore {
    pub fn open<P: AsRef<Path>>(root: P) -> StoreResult<Self> {
        let paths = IndexPaths::new(root);
        let snapshot = load_snapshot(&paths)?;
        if let Some(s) = &snapshot {
            tracing::debug!(root = %paths.root.display(), num_docs = s.meta.num_docs, "loaded file index");
        }
        Ok(Self { paths, cell: SnapshotCell::with_committed(snapshot) })
    }
}

impl IndexStore for FileStore {
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
        save_snapshot(&self.paths, &snapshot)?;
        if let Err(err) = save_meta(&self.paths, meta) {
            tracing::warn!(error = %err, "could not write meta.json");
        }
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
