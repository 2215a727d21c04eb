use scraper::Html;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Result, SearchError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDocument {
    pub path: String,
    pub text: String,
}

impl SourceDocument {
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        Self { path: path.into(), text: text.into() }
    }
}

/// Supplies raw document text in a stable traversal order.
pub trait DocumentSource {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<SourceDocument>> + '_>;
}

impl DocumentSource for Vec<SourceDocument> {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<SourceDocument>> + '_> {
        Box::new(self.iter().cloned().map(Ok))
    }
}

/// Every file under a root whose extension is eligible, sorted by file name per directory.
pub struct DirectorySource {
    root: PathBuf,
    extensions: Vec<String>,
}

impl DirectorySource {
    /// `extensions` are matched case-insensitively, with or without a leading dot.
    pub fn new<P: AsRef<Path>>(root: P, extensions: &[String]) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        Self { root: root.as_ref().to_path_buf(), extensions }
    }

    fn eligible(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|s| s.to_str())
            .map(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
            .unwrap_or(false)
    }
}

impl DocumentSource for DirectorySource {
    fn documents(&self) -> Box<dyn Iterator<Item = Result<SourceDocument>> + '_> {
        let walk = WalkDir::new(&self.root).sort_by_file_name().into_iter();
        Box::new(walk.filter_map(move |entry| match entry {
            Ok(e) if e.file_type().is_file() && self.eligible(e.path()) => Some(read_document(e.path())),
            Ok(_) => None,
            Err(err) => {
                let path = err.path().map(Path::to_path_buf).unwrap_or_else(|| self.root.clone());
                Some(Err(SearchError::unreadable(path, io::Error::from(err))))
            }
        }))
    }
}

fn is_html(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|s| s.to_str()).map(str::to_ascii_lowercase).as_deref(),
        Some("html" | "htm")
    )
}

/// Read one file as UTF-8; HTML files are reduced to their visible text.
pub fn read_document(path: &Path) -> Result<SourceDocument> {
    let bytes = fs::read(path).map_err(|e| SearchError::unreadable(path, e))?;
    let text = String::from_utf8(bytes)
        .map_err(|e| SearchError::unreadable(path, io::Error::new(ErrorKind::InvalidData, e)))?;
    let text = if is_html(path) { extract_html_text(&text) } else { text };
    Ok(SourceDocument::new(path.to_string_lossy(), text))
}

/// Text nodes of the document joined by single spaces.
pub fn extract_html_text(html: &str) -> String {
    let doc = Html::parse_document(html);
    doc.root_element()
        .text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
