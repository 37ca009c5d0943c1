//! Persistent test set of questions for batch evaluation.
//!
//! Stored as a pretty-printed JSON array:
//! ```json
//! [
//!   {
//!     "id": 1,
//!     "question": "What was Q3 revenue?",
//!     "ground_truth": "$81.4 billion",
//!     "reference_docs": ["apple_10q.pdf"]
//!   }
//! ]
//! ```

use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A single evaluation question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: u32,
    pub question: String,
    /// Expected answer; may be empty.
    #[serde(default)]
    pub ground_truth: String,
    #[serde(default)]
    pub reference_docs: Vec<String>,
}

/// Test cases backed by a JSON file. Every mutation is written through.
#[derive(Debug)]
pub struct TestSetStore {
    path: PathBuf,
    cases: Vec<TestCase>,
}

impl TestSetStore {
    /// Open the store at `path`, loading existing cases.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let mut store = Self {
            path: path.into(),
            cases: Vec::new(),
        };
        store.load();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload from disk.
    ///
    /// A missing file is an empty set. So is an unreadable or malformed
    /// one, with a warning naming the file.
    pub fn load(&mut self) -> &[TestCase] {
        self.cases = match fs::read_to_string(&self.path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(cases) => cases,
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "malformed test set, starting empty");
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "unreadable test set, starting empty");
                Vec::new()
            }
        };
        debug!(cases = self.cases.len(), "loaded test set");
        &self.cases
    }

    fn write(&self, cases: &[TestCase]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| RagError::persistence(parent, e))?;
            }
        }

        let content = serde_json::to_string_pretty(cases)
            .map_err(|e| RagError::Serialization(e.to_string()))?;
        fs::write(&self.path, content).map_err(|e| RagError::persistence(&self.path, e))
    }

    fn next_id(&self) -> Result<u32> {
        let max = self.cases.iter().map(|c| c.id).max().unwrap_or(0);
        max.checked_add(1).ok_or_else(|| {
            RagError::Config(format!(
                "test set '{}' has no free id above {}",
                self.path.display(),
                max
            ))
        })
    }

    /// Append a case and persist. Returns the stored case.
    ///
    /// The in-memory set only changes once the file is written.
    pub fn add(
        &mut self,
        question: impl Into<String>,
        ground_truth: impl Into<String>,
        reference_docs: Vec<String>,
    ) -> Result<TestCase> {
        let case = TestCase {
            id: self.next_id()?,
            question: question.into(),
            ground_truth: ground_truth.into(),
            reference_docs,
        };

        let mut cases = self.cases.clone();
        cases.push(case.clone());
        self.write(&cases)?;
        self.cases = cases;
        Ok(case)
    }

    pub fn all(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn get(&self, id: u32) -> Option<&TestCase> {
        self.cases.iter().find(|c| c.id == id)
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Remove every case with `id` and persist. Returns how many were removed.
    pub fn delete(&mut self, id: u32) -> Result<usize> {
        let remaining: Vec<TestCase> =
            self.cases.iter().filter(|c| c.id != id).cloned().collect();
        let removed = self.cases.len() - remaining.len();

        self.write(&remaining)?;
        self.cases = remaining;
        Ok(removed)
    }
}
