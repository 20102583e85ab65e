//! In-process knowledge index over product documents.
//!
//! Documents are chunked on whitespace boundaries, embedded once at startup and
//! kept in an immutable, `Arc`-shared index. Retrieval is brute-force cosine
//! similarity, which is plenty for a catalog of a few dozen documents.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use kopi_core::config::RetrievalConfig;
use kopi_core::domain::product::ProductDocument;
use kopi_core::errors::AgentError;
use serde::Serialize;
use tracing::debug;

use crate::llm::{ChatMessage, LlmClient};
use crate::prompt::render_product_answer;
use crate::tools::PRODUCT_INFORMATION;

/// A synthesized answer plus the material it was derived from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Answer {
    pub answer: String,
    pub context: String,
}

/// Capability shared by the retrieval-backed tools.
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn answer(&self, question: &str) -> Result<Answer, AgentError>;
}

pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Vec<f32>;
}

/// Bag-of-words embedding: each normalised token is hashed into one of
/// `dimensions` buckets, then the vector is L2-normalised.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }
}

impl Embedder for HashingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(|token| {
            let lower = token.to_lowercase();
            // Crude plural folding so "mugs" matches "mug".
            if let Some(stem) = lower.strip_suffix('s') {
                if stem.chars().count() >= 3 && !stem.ends_with('s') {
                    return stem.to_string();
                }
            }
            lower
        })
}

/// One retrieved chunk with its similarity score.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Passage {
    pub source: String,
    pub text: String,
    pub score: f64,
}

struct IndexedChunk {
    source: String,
    text: String,
    embedding: Vec<f32>,
}

pub struct ProductKnowledgeBase {
    chunks: Arc<[IndexedChunk]>,
    embedder: Arc<dyn Embedder>,
    llm: Arc<dyn LlmClient>,
    top_k: usize,
}

impl ProductKnowledgeBase {
    pub fn build(
        documents: &[ProductDocument],
        embedder: Arc<dyn Embedder>,
        llm: Arc<dyn LlmClient>,
        settings: &RetrievalConfig,
    ) -> Result<Self, AgentError> {
        if documents.is_empty() {
            return Err(AgentError::validation(
                "cannot build the product knowledge index from zero documents",
            ));
        }

        let mut chunks = Vec::new();
        for document in documents {
            let heading = document.heading();
            let budget = settings.chunk_size.saturating_sub(heading.chars().count() + 2).max(1);
            for piece in chunk_text(&document.body, budget, settings.chunk_overlap) {
                let text = format!("{heading}: {piece}");
                let embedding = embedder.embed(&text);
                chunks.push(IndexedChunk { source: document.slug.clone(), text, embedding });
            }
        }

        if chunks.is_empty() {
            return Err(AgentError::validation("product documents contained no indexable text"));
        }

        debug!(
            event_name = "agent.retrieval.index_built",
            documents = documents.len(),
            chunks = chunks.len(),
            dimensions = embedder.dimensions(),
            "product knowledge index built"
        );

        Ok(Self { chunks: chunks.into(), embedder, llm, top_k: settings.top_k.max(1) })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top `top_k` passages by cosine similarity; equal scores keep index order.
    pub fn retrieve(&self, question: &str) -> Vec<Passage> {
        let query = self.embedder.embed(question);
        let mut scored: Vec<Passage> = self
            .chunks
            .iter()
            .map(|chunk| Passage {
                source: chunk.source.clone(),
                text: chunk.text.clone(),
                score: cosine_similarity(&query, &chunk.embedding),
            })
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(self.top_k);
        scored
    }
}

#[async_trait]
impl QuestionAnswerer for ProductKnowledgeBase {
    async fn answer(&self, question: &str) -> Result<Answer, AgentError> {
        let passages = self.retrieve(question);
        let context = passages
            .iter()
            .map(|passage| passage.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");

        let prompt = render_product_answer(question, &context)
            .map_err(|error| AgentError::tool(PRODUCT_INFORMATION, error.to_string()))?;
        let answer = self
            .llm
            .chat(&[ChatMessage::user(prompt)])
            .await
            .map_err(|error| AgentError::tool(PRODUCT_INFORMATION, error.to_string()))?;

        Ok(Answer { answer: answer.trim().to_string(), context })
    }
}

/// Splits text into windows of at most `chunk_size` characters on whitespace
/// boundaries, carrying up to `overlap` trailing characters into the next window.
fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let mut end = start;
        let mut length = 0;
        while end < words.len() {
            let added = words[end].chars().count() + usize::from(end > start);
            if end > start && length + added > chunk_size {
                break;
            }
            length += added;
            end += 1;
        }
        chunks.push(words[start..end].join(" "));
        if end >= words.len() {
            break;
        }

        let mut next = end;
        let mut carried = 0;
        while next > start + 1 {
            let added = words[next - 1].chars().count() + 1;
            if carried + added > overlap {
                break;
            }
            carried += added;
            next -= 1;
        }
        start = next;
    }

    chunks
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let mag_a = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let mag_b = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();

    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }

    dot / (mag_a * mag_b)
}
