//! In-memory cosine similarity index.
//!
//! Holds the whole corpus in memory with one embedding per document. Corpora
//! here are hundreds of scripts, not millions of chunks, so a linear scan
//! beats carrying an ANN dependency.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::KnowledgeError;
use crate::knowledge::embeddings::EmbeddingProvider;
use crate::knowledge::{Document, DocumentIndex, DocumentTag, ScoredDocument};

struct IndexedEntry {
    document: Document,
    embedding: Vec<f32>,
}

/// Linear-scan cosine index over pre-embedded documents.
pub struct InMemoryIndex {
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    entries: Vec<IndexedEntry>,
}

impl InMemoryIndex {
    /// Embed `documents` and build an index over them.
    ///
    /// Insertion order is preserved and breaks similarity ties at search
    /// time.
    pub async fn build(
        embedder: Arc<dyn EmbeddingProvider>,
        documents: Vec<Document>,
    ) -> Result<Self, KnowledgeError> {
        let texts: Vec<String> = documents.iter().map(|d| d.content.clone()).collect();
        let embeddings = embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        if embeddings.len() != documents.len() {
            return Err(KnowledgeError::Embedding(format!(
                "embedded {} of {} documents",
                embeddings.len(),
                documents.len()
            )));
        }

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(document, embedding)| IndexedEntry {
                document,
                embedding,
            })
            .collect();

        Ok(Self {
            embedder: Some(embedder),
            entries,
        })
    }

    /// An index with no documents. Searches return nothing and need no
    /// embedder, so ungrounded runs work without embedding credentials.
    pub fn empty() -> Self {
        Self {
            embedder: None,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DocumentIndex for InMemoryIndex {
    async fn search(
        &self,
        query: &str,
        tag: DocumentTag,
        k: usize,
    ) -> Result<Vec<ScoredDocument>, KnowledgeError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let Some(embedder) = &self.embedder else {
            return Ok(Vec::new());
        };

        let query_embedding = embedder
            .embed(query)
            .await
            .map_err(|e| KnowledgeError::Embedding(e.to_string()))?;

        let mut hits: Vec<ScoredDocument> = self
            .entries
            .iter()
            .filter(|entry| entry.document.metadata.tag == tag)
            .map(|entry| ScoredDocument {
                document: entry.document.clone(),
                score: cosine_similarity(&query_embedding, &entry.embedding),
            })
            .collect();

        // Stable sort keeps corpus insertion order for equal scores.
        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }
}

/// Load a corpus file: a JSON array of documents.
pub fn load_corpus(path: &Path) -> Result<Vec<Document>, KnowledgeError> {
    let raw = std::fs::read_to_string(path)?;
    let documents: Vec<Document> = serde_json::from_str(&raw)?;
    Ok(documents)
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::embeddings::EmbeddingError;
    use std::collections::HashMap;

    /// Deterministic embedder: fixed vectors per known text, a zero vector
    /// otherwise.
    struct FixtureEmbedder {
        vectors: HashMap<String, Vec<f32>>,
    }

    impl FixtureEmbedder {
        fn new(pairs: &[(&str, Vec<f32>)]) -> Self {
            Self {
                vectors: pairs
                    .iter()
                    .map(|(text, v)| (text.to_string(), v.clone()))
                    .collect(),
            }
        }
    }

    #[async_trait]
    impl EmbeddingProvider for FixtureEmbedder {
        fn dimension(&self) -> usize {
            3
        }

        fn model_name(&self) -> &str {
            "fixture"
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(self
                .vectors
                .get(text)
                .cloned()
                .unwrap_or_else(|| vec![0.0, 0.0, 0.0]))
        }
    }

    fn rule(content: &str) -> Document {
        Document::new(content, DocumentTag::Rule)
    }

    #[tokio::test]
    async fn search_orders_by_similarity() {
        let embedder = Arc::new(FixtureEmbedder::new(&[
            ("query", vec![1.0, 0.0, 0.0]),
            ("close", vec![0.9, 0.1, 0.0]),
            ("far", vec![0.0, 1.0, 0.0]),
            ("middling", vec![0.5, 0.5, 0.0]),
        ]));

        let index = InMemoryIndex::build(
            embedder,
            vec![rule("far"), rule("middling"), rule("close")],
        )
        .await
        .unwrap();

        let hits = index.search("query", DocumentTag::Rule, 3).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.document.content.as_str()).collect();
        assert_eq!(contents, vec!["close", "middling", "far"]);
    }

    #[tokio::test]
    async fn search_filters_by_tag() {
        let embedder = Arc::new(FixtureEmbedder::new(&[
            ("query", vec![1.0, 0.0, 0.0]),
            ("a rule", vec![1.0, 0.0, 0.0]),
            ("an example", vec![1.0, 0.0, 0.0]),
        ]));

        let index = InMemoryIndex::build(
            embedder,
            vec![
                rule("a rule"),
                Document::new("an example", DocumentTag::Example),
            ],
        )
        .await
        .unwrap();

        let hits = index.search("query", DocumentTag::Example, 5).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].document.content, "an example");
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let embedder = Arc::new(FixtureEmbedder::new(&[
            ("query", vec![1.0, 0.0, 0.0]),
            ("first", vec![1.0, 0.0, 0.0]),
            ("second", vec![1.0, 0.0, 0.0]),
            ("third", vec![1.0, 0.0, 0.0]),
        ]));

        let index = InMemoryIndex::build(
            embedder,
            vec![rule("first"), rule("second"), rule("third")],
        )
        .await
        .unwrap();

        let hits = index.search("query", DocumentTag::Rule, 2).await.unwrap();
        let contents: Vec<&str> = hits.iter().map(|h| h.document.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn empty_index_returns_nothing() {
        let index = InMemoryIndex::empty();
        assert!(index.is_empty());

        let hits = index.search("query", DocumentTag::Rule, 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn cosine_similarity_handles_degenerate_input() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn load_corpus_reads_json_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"[
                {"content": "@@ expression E; @@", "metadata": {"type": "rule", "source": "grammar.tex"}},
                {"content": "- kfree(E);", "metadata": {"type": "example"}}
            ]"#,
        )
        .unwrap();

        let documents = load_corpus(&path).unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].metadata.tag, DocumentTag::Rule);
        assert_eq!(documents[0].metadata.source.as_deref(), Some("grammar.tex"));
        assert_eq!(documents[1].metadata.tag, DocumentTag::Example);
    }
}
