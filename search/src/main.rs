use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use sift_core::{
    DirectorySource, EngineConfig, FileStore, IndexStore, NormalizerKind, ScoringMethod, SearchEngine, SledStore,
    UnreadablePolicy,
};
use std::path::PathBuf;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// sled database with per-rebuild generations
    Sled,
    /// single bincode snapshot file
    File,
}

impl Backend {
    fn default_path(self) -> PathBuf {
        match self {
            Self::Sled => PathBuf::from("data/index.sled"),
            Self::File => PathBuf::from("data/index"),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "search")]
#[command(about = "Search local text files with boolean queries and BM25 ranking", long_about = None)]
struct Cli {
    /// Query words; AND, OR and NOT (any case) are operators
    query: Vec<String>,
    /// Rebuild the index from the documents folder
    #[arg(long, default_value_t = false)]
    reindex: bool,
    /// Folder with documents to index
    #[arg(long, default_value = "data/docs")]
    docs: PathBuf,
    /// How many results to show
    #[arg(long)]
    top: Option<usize>,
    /// Index location (defaults depend on the backend)
    #[arg(long)]
    index: Option<PathBuf>,
    /// Storage backend for the index
    #[arg(long, value_enum, default_value_t = Backend::Sled)]
    backend: Backend,
    /// Rank with TF-IDF instead of BM25
    #[arg(long, default_value_t = false)]
    tfidf: bool,
    /// Build without stemming (lowercase only)
    #[arg(long, default_value_t = false)]
    no_stem: bool,
    /// Abort the reindex on the first unreadable document instead of skipping it
    #[arg(long, default_value_t = false)]
    strict: bool,
}

impl Cli {
    fn config(&self) -> Result<EngineConfig> {
        let mut config = EngineConfig::from_env()?;
        if self.tfidf {
            config.scoring = ScoringMethod::TfIdf;
        }
        if self.no_stem {
            config.normalizer = NormalizerKind::Lowercase;
        }
        if self.strict {
            config.on_unreadable = UnreadablePolicy::Abort;
        }
        if let Some(top) = self.top {
            config.top_k = top;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).with_writer(std::io::stderr).init();
    let cli = Cli::parse();
    let config = cli.config()?;
    let index = cli.index.clone().unwrap_or_else(|| cli.backend.default_path());
    tracing::debug!(index = %index.display(), backend = ?cli.backend, "opening index");

    match cli.backend {
        Backend::Sled => {
            let store = SledStore::open(&index).with_context(|| format!("opening sled index at {}", index.display()))?;
            run(&cli, SearchEngine::new(store, config))
        }
        Backend::File => {
            let store = FileStore::open(&index).with_context(|| format!("opening file index at {}", index.display()))?;
            run(&cli, SearchEngine::new(store, config))
        }
    }
}

fn run<S: IndexStore>(cli: &Cli, engine: SearchEngine<S>) -> Result<()> {
    if cli.reindex {
        anyhow::ensure!(cli.docs.is_dir(), "documents folder not found: {}", cli.docs.display());
        println!("Indexing directory: {} ...", cli.docs.display());
        let source = DirectorySource::new(&cli.docs, &engine.config().extensions);
        let report = engine.reindex(&source).context("reindex failed")?;
        if report.skipped > 0 {
            eprintln!("warning: skipped {} unreadable document(s)", report.skipped);
        }
        println!("Indexing complete.");
        tracing::info!(docs = report.num_docs, terms = report.num_terms, postings = report.num_postings, "index summary");
    }

    if cli.query.is_empty() {
        if !cli.reindex {
            println!("Enter search query. Example:");
            println!("  search \"example query\"");
        }
        return Ok(());
    }

    let query = cli.query.join(" ");
    let hits = engine.search(&query, engine.config().top_k).context("search failed")?;
    if hits.is_empty() {
        println!("No results found.");
    } else {
        println!("Search results:");
        for (i, hit) in hits.iter().enumerate() {
            println!("{}. {} (score: {:.3})", i + 1, hit.path, hit.score);
        }
    }
    Ok(())
}
