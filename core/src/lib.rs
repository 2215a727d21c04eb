//! Local full-text search: an inverted index over a document collection,
//! flat boolean queries (`AND`/`OR`/`NOT`) and BM25 or TF-IDF ranking.
//!
//! - [`builder`] turns `(path, text)` documents into an [`IndexSnapshot`]
//! - [`store`], [`persist`], [`sled_store`] hold committed snapshots
//! - [`query`] parses queries and resolves candidate doc ids
//! - [`rank`] scores candidates
//! - [`engine`] ties it together behind [`SearchEngine`]

pub mod builder;
pub mod config;
pub mod engine;
pub mod error;
pub mod index;
pub mod persist;
pub mod query;
pub mod rank;
pub mod sled_store;
pub mod source;
pub mod store;
pub mod tokenizer;

pub use builder::{BuildReport, IndexBuilder, UnreadablePolicy};
pub use config::EngineConfig;
pub use engine::{SearchEngine, SearchHit};
pub use error::{Result, SearchError, StoreError};
pub use index::{DocId, IndexSnapshot, IndexTables, Posting, SnapshotMeta};
pub use persist::FileStore;
pub use rank::{Bm25Params, Scorer, ScoringMethod};
pub use sled_store::SledStore;
pub use source::{DirectorySource, DocumentSource, SourceDocument};
pub use store::{IndexReader, IndexStore, MemoryStore};
pub use tokenizer::{Normalizer, NormalizerKind, StemLanguage};
