//! File-backed document store keeping one JSON record per line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use switchyard_protocol::{CollaboratorError, DocumentStore, RetrievalAnswer};
use uuid::Uuid;

/// One indexed text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: Uuid,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct JsonlDocumentStore {
    path: PathBuf,
    top_k: usize,
    write_lock: Mutex<()>,
}

impl JsonlDocumentStore {
    /// Open (or prepare) a store at `path`; parent directories are created.
    pub fn new(path: impl AsRef<Path>, top_k: usize) -> Result<Self, CollaboratorError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(storage_error)?;
        }
        info!("initialized document store (path={})", path.display());
        Ok(Self {
            path,
            top_k: top_k.max(1),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every readable record; malformed lines are skipped.
    pub fn load(&self) -> Result<Vec<StoredDocument>, CollaboratorError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(storage_error)?;
        let mut documents = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(storage_error)?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredDocument>(&line) {
                Ok(document) => documents.push(document),
                Err(err) => warn!(
                    "skipping malformed document record (path={}, line={}, err={})",
                    self.path.display(),
                    index + 1,
                    err
                ),
            }
        }
        Ok(documents)
    }

    /// Records sharing at least one term with `text`, best first.
    pub fn search(&self, text: &str) -> Result<Vec<StoredDocument>, CollaboratorError> {
        let query_terms = terms(text);
        if query_terms.is_empty() {
            return Ok(Vec::new());
        }
        let mut scored: Vec<(usize, StoredDocument)> = self
            .load()?
            .into_iter()
            .filter_map(|document| {
                let overlap = terms(&document.text).intersection(&query_terms).count();
                (overlap > 0).then_some((overlap, document))
            })
            .collect();
        scored.sort_by(|(left_score, left), (right_score, right)| {
            right_score
                .cmp(left_score)
                .then_with(|| right.created_at.cmp(&left.created_at))
        });
        Ok(scored
            .into_iter()
            .take(self.top_k)
            .map(|(_, document)| document)
            .collect())
    }
}

const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "any", "can", "was", "our", "out",
    "what", "with", "that", "this", "from", "about", "into", "have", "how", "why", "who",
];

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|term| term.len() >= 3 && !STOPWORDS.contains(&term.as_str()))
        .collect()
}

fn storage_error(err: impl std::fmt::Display) -> CollaboratorError {
    CollaboratorError::Storage(err.to_string())
}

#[async_trait]
impl DocumentStore for JsonlDocumentStore {
    async fn query(&self, text: &str) -> Result<RetrievalAnswer, CollaboratorError> {
        let documents = self.search(text)?;
        debug!(
            "document query (path={}, matches={})",
            self.path.display(),
            documents.len()
        );
        Ok(RetrievalAnswer {
            answer: documents
                .iter()
                .map(|document| document.text.as_str())
                .collect::<Vec<_>>()
                .join("\n\n"),
            sources: documents
                .iter()
                .map(|document| document.id.to_string())
                .collect(),
        })
    }

    async fn index_text(&self, text: &str) -> Result<(), CollaboratorError> {
        let record = StoredDocument {
            id: Uuid::new_v4(),
            text: text.to_string(),
            created_at: Utc::now(),
        };
        let line = serde_json::to_string(&record).map_err(storage_error)?;
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(storage_error)?;
        writeln!(file, "{line}").map_err(storage_error)?;
        debug!(
            "indexed document (id={}, text_len={})",
            record.id,
            record.text.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    #[tokio::test]
    async fn ranks_by_term_overlap() {
        let temp = tempdir().expect("tempdir");
        let store = JsonlDocumentStore::new(temp.path().join("docs/store.jsonl"), 2).expect("store");
        store
            .index_text("Tool calling patterns describe how agents select tools.")
            .await
            .expect("index");
        store
            .index_text("Bread recipes need flour and water.")
            .await
            .expect("index");
        store
            .index_text("Agents sequence tool calling steps.")
            .await
            .expect("index");

        let answer = store
            .query("tool calling patterns")
            .await
            .expect("query");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(
            answer.answer.starts_with("Tool calling patterns describe"),
            true
        );
        assert_eq!(answer.answer.contains("Bread"), false);
    }

    #[tokio::test]
    async fn missing_file_and_bad_lines_are_tolerated() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("store.jsonl");
        let store = JsonlDocumentStore::new(&path, 3).expect("store");
        assert_eq!(store.query("anything").await.expect("query").sources.len(), 0);

        std::fs::write(&path, "not json\n\n").expect("write");
        store.index_text("kept record").await.expect("index");
        let documents = store.load().expect("load");
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].text, "kept record");
    }
}
