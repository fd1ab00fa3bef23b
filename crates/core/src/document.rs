// Pipeline data types
//
// These are the payloads passed between the pipeline steps. They are
// persisted inside workflow events, so their serialized shape is stable.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::naming::output_name;

/// Identifier of a source document: the blob name inside the input container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self(identifier.into())
    }

    /// Derive the identifier from a `<container>/<name>` blob path.
    ///
    /// Everything up to and including the first `/` is dropped. A path with
    /// no `/` is taken as the identifier unchanged.
    pub fn from_blob_path(path: &str) -> Self {
        match path.split_once('/') {
            Some((_, name)) => Self(name.to_string()),
            None => Self(path.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkItem {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A line recognized by document analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedLine {
    pub content: String,
}

/// A page recognized by document analysis, lines in reading order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedPage {
    #[serde(default)]
    pub lines: Vec<AnalyzedLine>,
}

/// Layout analysis result, pages in document order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedDocument {
    #[serde(default)]
    pub pages: Vec<AnalyzedPage>,
}

impl AnalyzedDocument {
    /// Build a document from per-page line contents
    pub fn from_lines<P, L>(pages: P) -> Self
    where
        P: IntoIterator<Item = L>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        Self {
            pages: pages
                .into_iter()
                .map(|lines| AnalyzedPage {
                    lines: lines
                        .into_iter()
                        .map(|content| AnalyzedLine {
                            content: content.into(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|p| p.lines.len()).sum()
    }
}

/// Text extracted from a document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedText(String);

impl ExtractedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Concatenate every line of every page, page-major, with no separator
    pub fn from_document(document: &AnalyzedDocument) -> Self {
        let text = document
            .pages
            .iter()
            .flat_map(|page| page.lines.iter())
            .map(|line| line.content.as_str())
            .collect::<String>();
        Self(text)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Output of the summarization step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryResult {
    pub content: String,
}

impl SummaryResult {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// Input of the writing step: the source identifier plus its summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    #[serde(rename = "blobName")]
    pub blob_name: String,
    pub summary: SummaryResult,
}

impl WriteRequest {
    pub fn new(item: &WorkItem, summary: SummaryResult) -> Self {
        Self {
            blob_name: item.as_str().to_string(),
            summary,
        }
    }
}

/// The artifact uploaded to the output container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArtifact {
    pub name: String,
    pub content: String,
}

impl OutputArtifact {
    /// Name the summary after its source document and the write time
    pub fn for_request(request: WriteRequest, at: DateTime<Utc>) -> Self {
        Self {
            name: output_name(&request.blob_name, at),
            content: request.summary.content,
        }
    }
}
