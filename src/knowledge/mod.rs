//! Tag-separated knowledge retrieval.
//!
//! Drafting a structural patch script needs two different kinds of grounding:
//! grammar/syntax reference material and worked example scripts. They play
//! different roles in the prompt, so retrieval keeps them in separate
//! bundles instead of letting one crowd the other out of a shared top-k.

pub mod embeddings;
mod index;

pub use embeddings::{EmbeddingError, EmbeddingProvider, HttpEmbeddings};
pub use index::{InMemoryIndex, load_corpus};

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::KnowledgeError;

/// Corpus document classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentTag {
    /// Grammar and syntax reference material.
    Rule,
    /// A worked example script.
    Example,
}

impl std::fmt::Display for DocumentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentTag::Rule => write!(f, "rule"),
            DocumentTag::Example => write!(f, "example"),
        }
    }
}

/// Metadata carried alongside each corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Which half of the bundle this document belongs to.
    #[serde(rename = "type")]
    pub tag: DocumentTag,
    /// Where the document came from (file path, URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Short human description, if the ingester extracted one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One corpus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Convenience constructor for a document with just a tag.
    pub fn new(content: impl Into<String>, tag: DocumentTag) -> Self {
        Self {
            content: content.into(),
            metadata: DocumentMetadata {
                tag,
                source: None,
                description: None,
            },
        }
    }
}

/// A document with its similarity score for a particular query.
#[derive(Debug, Clone)]
pub struct ScoredDocument {
    pub document: Document,
    pub score: f32,
}

/// The consumed search interface over an embedded corpus.
///
/// Implementations must return hits in descending similarity order with ties
/// broken by the corpus insertion order.
#[async_trait]
pub trait DocumentIndex: Send + Sync {
    async fn search(
        &self,
        query: &str,
        tag: DocumentTag,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, KnowledgeError>;
}

/// The two retrieved text blocks grounding one session.
///
/// Retrieved once per task and read-only afterwards. Either half may be
/// empty when the corpus has nothing under that tag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnowledgeBundle {
    pub rules: String,
    pub examples: String,
}

impl KnowledgeBundle {
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.examples.is_empty()
    }
}

/// Similarity retrieval returning separate rule and example bundles.
pub struct KnowledgeStore {
    index: Arc<dyn DocumentIndex>,
    top_k: usize,
}

impl KnowledgeStore {
    /// Create a store over the given index with the default `top_k` of 3.
    pub fn new(index: Arc<dyn DocumentIndex>) -> Self {
        Self { index, top_k: 3 }
    }

    /// Set how many hits each bundle half concatenates.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    /// Retrieve the rule and example bundles for a query.
    ///
    /// Each half degrades to an empty string when its search fails; a
    /// half-empty or fully empty bundle is a valid retrieval result, not an
    /// error, and the session proceeds ungrounded.
    pub async fn retrieve(&self, query: &str) -> KnowledgeBundle {
        let rules = self.retrieve_half(query, DocumentTag::Rule).await;
        let examples = self.retrieve_half(query, DocumentTag::Example).await;

        tracing::debug!(
            rules_len = rules.len(),
            examples_len = examples.len(),
            "retrieved knowledge bundle"
        );

        KnowledgeBundle { rules, examples }
    }

    async fn retrieve_half(&self, query: &str, tag: DocumentTag) -> String {
        match self.index.search(query, tag, self.top_k).await {
            Ok(hits) => join_hits(&hits),
            Err(e) => {
                tracing::warn!(%tag, error = %e, "knowledge search failed, continuing without it");
                String::new()
            }
        }
    }
}

fn join_hits(hits: &[ScoredDocument]) -> String {
    hits.iter()
        .map(|hit| hit.document.content.trim())
        .filter(|content| !content.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}
