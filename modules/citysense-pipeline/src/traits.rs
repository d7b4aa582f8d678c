// Capability boundaries for the pipeline.
//
// Every model call (sentiment, emotion, zero-shot, embedding, partitioning,
// cause tagging, headline writing) sits behind one trait so the pipeline can
// be driven by hosted models in production and by the in-memory doubles in
// `testing` under `cargo test`.

use anyhow::{bail, Result};
use async_trait::async_trait;

use citysense_common::{CauseTagSet, EnvironmentReading, Sentiment};

// ---------------------------------------------------------------------------
// Capability outputs
// ---------------------------------------------------------------------------

/// Top-1 output of a single-label classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredLabel {
    pub label: String,
    pub score: f64,
}

impl ScoredLabel {
    pub fn new(label: impl Into<String>, score: f64) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Zero-shot output: `labels[i]` scored `scores[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ZeroShotResult {
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

impl ZeroShotResult {
    /// Validate the label/score pairing.
    pub fn new(labels: Vec<String>, scores: Vec<f64>) -> Result<Self> {
        if labels.is_empty() {
            bail!("zero-shot result has no labels");
        }
        if labels.len() != scores.len() {
            bail!(
                "zero-shot result has {} labels but {} scores",
                labels.len(),
                scores.len()
            );
        }
        Ok(Self { labels, scores })
    }

    /// Highest-scoring label; the earliest wins a tie.
    pub fn top(&self) -> Option<(&str, f64)> {
        let mut best: Option<(&str, f64)> = None;
        for (label, &score) in self.labels.iter().zip(&self.scores) {
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((label.as_str(), score));
            }
        }
        best
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, f64)> {
        self.labels
            .iter()
            .map(String::as_str)
            .zip(self.scores.iter().copied())
    }
}

/// A partition of vectors into clusters: one cluster id per input vector and
/// one centroid per cluster id.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub assignments: Vec<usize>,
    pub centroids: Vec<Vec<f32>>,
}

// ---------------------------------------------------------------------------
// Classifiers
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn sentiment(&self, text: &str) -> Result<ScoredLabel>;
}

#[async_trait]
pub trait EmotionClassifier: Send + Sync {
    async fn emotion(&self, text: &str) -> Result<ScoredLabel>;
}

#[async_trait]
pub trait ZeroShotClassifier: Send + Sync {
    /// Score `text` against `labels`. With `multi_label`, scores are
    /// independent per label rather than a distribution.
    async fn zero_shot(
        &self,
        text: &str,
        labels: &[&str],
        multi_label: bool,
    ) -> Result<ZeroShotResult>;
}

// ---------------------------------------------------------------------------
// Vectors
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    /// One fixed-dimension vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Unsupervised partitioning of vectors into `k` clusters. CPU-bound, so
/// synchronous.
pub trait VectorPartitioner: Send + Sync {
    fn partition(&self, vectors: &[Vec<f32>], k: usize) -> Result<Partition>;
}

// ---------------------------------------------------------------------------
// Narrative
// ---------------------------------------------------------------------------

#[async_trait]
pub trait CauseTagger: Send + Sync {
    /// Multi-label cause hypotheses for `text`, keeping scores ≥ `threshold`.
    async fn cause_tags(&self, text: &str, taxonomy: &[&str], threshold: f64)
        -> Result<CauseTagSet>;
}

#[async_trait]
pub trait HeadlineWriter: Send + Sync {
    /// Rewrite a newsfeed line as a short headline.
    async fn headline(
        &self,
        base_line: &str,
        sentiment: Sentiment,
        environment: Option<&EnvironmentReading>,
    ) -> Result<String>;
}
