//! Bulk import of a directory tree into the document store.
//!
//! Layout: one subdirectory per topic, one `*.txt` file per document.
//!
//! ```text
//! docs/
//!   cinema-x/
//!     hours.txt      → topic "cinema-x", title "hours"
//!     prices.txt
//!   cinema-y/
//!     faq.txt
//! ```
//!
//! Files are imported in sorted path order so document ids are
//! deterministic. Other files and deeper directories are skipped.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use ragdesk_core::store::DocumentStore;

#[derive(Debug, Default, Serialize)]
pub struct ImportReport {
    pub documents: usize,
    pub skipped: usize,
    pub topics: Vec<String>,
}

pub async fn import_dir(store: &dyn DocumentStore, root: &Path) -> Result<ImportReport> {
    if !root.is_dir() {
        bail!("import root is not a directory: {}", root.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(2).max_depth(2) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("txt") {
            continue;
        }
        files.push(path.to_path_buf());
    }
    files.sort();

    let mut report = ImportReport::default();
    for path in files {
        let topic = path
            .parent()
            .and_then(|p| p.file_name())
            .and_then(|n| n.to_str())
            .map(str::to_string);
        let title = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
        let (topic, title) = match (topic, title) {
            (Some(topic), Some(title)) => (topic, title),
            _ => {
                report.skipped += 1;
                continue;
            }
        };

        let text = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        if text.trim().is_empty() {
            debug!(path = %path.display(), "skipping empty file");
            report.skipped += 1;
            continue;
        }

        store.append(&topic, &title, &text).await?;
        report.documents += 1;
        if !report.topics.contains(&topic) {
            report.topics.push(topic);
        }
    }

    info!(
        documents = report.documents,
        topics = report.topics.len(),
        skipped = report.skipped,
        "import finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdesk_core::store::memory::InMemoryDocumentStore;

    #[tokio::test]
    async fn test_import_topics_and_titles() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("cinema-y")).unwrap();
        std::fs::create_dir_all(root.join("cinema-x/nested")).unwrap();
        std::fs::write(root.join("cinema-y/faq.txt"), "Parking is free.").unwrap();
        std::fs::write(root.join("cinema-x/prices.txt"), "Tickets cost 5.").unwrap();
        std::fs::write(root.join("cinema-x/hours.txt"), "Open 10:00-22:00.").unwrap();
        std::fs::write(root.join("cinema-x/logo.png"), [0u8, 1, 2]).unwrap();
        std::fs::write(root.join("cinema-x/blank.txt"), "  \n").unwrap();
        std::fs::write(root.join("cinema-x/nested/deep.txt"), "ignored").unwrap();
        std::fs::write(root.join("top.txt"), "ignored").unwrap();

        let store = InMemoryDocumentStore::new();
        let report = import_dir(&store, root).await.unwrap();

        assert_eq!(report.documents, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.topics, vec!["cinema-x", "cinema-y"]);

        let docs = store.list_documents().await.unwrap();
        let titles: Vec<_> = docs.iter().map(|d| d.title.as_str()).collect();
        assert_eq!(titles, vec!["hours", "prices", "faq"]);
    }

    #[tokio::test]
    async fn test_import_missing_dir_fails() {
        let store = InMemoryDocumentStore::new();
        assert!(import_dir(&store, Path::new("/nonexistent/ragdesk")).await.is_err());
    }
}
