// Test doubles for the pipeline capabilities.
//
// - KeywordSentiment (SentimentClassifier): keyword lists → label
// - FixedEmotion (EmotionClassifier): one label for everything
// - KeywordZeroShot (ZeroShotClassifier): keyword → (label, score) rules
// - FixedEmbedder (TextEmbedder): registered vectors, hash-based otherwise
// - KeywordCauseTagger (CauseTagger): keyword → cause tag rules
// - CountingCauseTagger (CauseTagger): no tags, records peak concurrent calls
// - RecordingHeadlineWriter (HeadlineWriter): prefixes and records lines
// - Failing: every capability returns Err
//
// Keyword matching is case-insensitive substring matching. Any double can
// be told to fail for messages containing a trigger word via `.fail_on()`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::Poll;

use anyhow::{bail, Result};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use citysense_common::{CauseTagSet, EnvironmentReading, FeedbackRow, Sentiment};

use crate::analysis::Capabilities;
use crate::partition::KMeans;
use crate::traits::{
    CauseTagger, EmotionClassifier, HeadlineWriter, Partition, ScoredLabel, SentimentClassifier,
    TextEmbedder, VectorPartitioner, ZeroShotClassifier, ZeroShotResult,
};

/// Standard embedding dimension for test vectors.
pub const TEST_EMBEDDING_DIM: usize = 8;

/// Seeded generator for reproducible representative picks.
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

pub fn rows(pairs: &[(&str, &str)]) -> Vec<FeedbackRow> {
    pairs
        .iter()
        .map(|(message, district)| FeedbackRow::new(*message, *district))
        .collect()
}

fn contains(text: &str, keyword: &str) -> bool {
    text.to_lowercase().contains(&keyword.to_lowercase())
}

fn triggered(text: &str, triggers: &[String]) -> bool {
    triggers.iter().any(|t| contains(text, t))
}

// ---------------------------------------------------------------------------
// KeywordSentiment
// ---------------------------------------------------------------------------

/// Negative keywords win over positive ones; no match yields NEUTRAL.
#[derive(Default)]
pub struct KeywordSentiment {
    negative: Vec<String>,
    positive: Vec<String>,
    fail_on: Vec<String>,
    calls: AtomicUsize,
}

impl KeywordSentiment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn negative(mut self, keywords: &[&str]) -> Self {
        self.negative.extend(keywords.iter().map(|k| k.to_string()));
        self
    }

    pub fn positive(mut self, keywords: &[&str]) -> Self {
        self.positive.extend(keywords.iter().map(|k| k.to_string()));
        self
    }

    pub fn fail_on(mut self, trigger: &str) -> Self {
        self.fail_on.push(trigger.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SentimentClassifier for KeywordSentiment {
    async fn sentiment(&self, text: &str) -> Result<ScoredLabel> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if triggered(text, &self.fail_on) {
            bail!("KeywordSentiment: forced failure for {text:?}");
        }
        let sentiment = if self.negative.iter().any(|k| contains(text, k)) {
            Sentiment::Negative
        } else if self.positive.iter().any(|k| contains(text, k)) {
            Sentiment::Positive
        } else {
            Sentiment::Neutral
        };
        Ok(ScoredLabel::new(sentiment.as_str(), 0.9))
    }
}

// ---------------------------------------------------------------------------
// FixedEmotion
// ---------------------------------------------------------------------------

pub struct FixedEmotion {
    label: String,
}

impl FixedEmotion {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
        }
    }
}

#[async_trait]
impl EmotionClassifier for FixedEmotion {
    async fn emotion(&self, _text: &str) -> Result<ScoredLabel> {
        Ok(ScoredLabel::new(self.label.clone(), 0.8))
    }
}

// ---------------------------------------------------------------------------
// KeywordZeroShot
// ---------------------------------------------------------------------------

/// Each candidate label scores the highest score of any rule that names it
/// and whose keyword appears in the text, else 0.0.
#[derive(Default)]
pub struct KeywordZeroShot {
    rules: Vec<(String, String, f64)>,
    fail_on: Vec<String>,
    calls: AtomicUsize,
}

impl KeywordZeroShot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_keyword(mut self, keyword: &str, label: &str, score: f64) -> Self {
        self.rules
            .push((keyword.to_string(), label.to_string(), score));
        self
    }

    pub fn fail_on(mut self, trigger: &str) -> Self {
        self.fail_on.push(trigger.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ZeroShotClassifier for KeywordZeroShot {
    async fn zero_shot(
        &self,
        text: &str,
        labels: &[&str],
        _multi_label: bool,
    ) -> Result<ZeroShotResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if triggered(text, &self.fail_on) {
            bail!("KeywordZeroShot: forced failure for {text:?}");
        }
        let scores = labels
            .iter()
            .map(|label| {
                self.rules
                    .iter()
                    .filter(|(keyword, l, _)| l == label && contains(text, keyword))
                    .map(|(_, _, score)| *score)
                    .fold(0.0, f64::max)
            })
            .collect();
        ZeroShotResult::new(labels.iter().map(|l| l.to_string()).collect(), scores)
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Registered texts get exact vectors; anything else gets a deterministic
/// hash-based unit vector.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
    fail: bool,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
            fail: false,
        }
    }

    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    /// Every call fails.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let mut state = hasher.finish();

        let mut vec = vec![0.0f32; self.dimension];
        for v in vec.iter_mut() {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *v = ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.fail {
            bail!("FixedEmbedder: forced failure");
        }
        Ok(texts
            .iter()
            .map(|t| {
                self.vectors
                    .get(t.as_str())
                    .cloned()
                    .unwrap_or_else(|| self.hash_vector(t))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// KeywordCauseTagger
// ---------------------------------------------------------------------------

/// Tags every cause whose keyword appears in the text, subject to the
/// threshold and the requested taxonomy.
#[derive(Default)]
pub struct KeywordCauseTagger {
    rules: Vec<(String, String, f64)>,
    fail_on: Vec<String>,
}

impl KeywordCauseTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_keyword(mut self, keyword: &str, cause: &str, score: f64) -> Self {
        self.rules
            .push((keyword.to_string(), cause.to_string(), score));
        self
    }

    pub fn fail_on(mut self, trigger: &str) -> Self {
        self.fail_on.push(trigger.to_string());
        self
    }
}

#[async_trait]
impl CauseTagger for KeywordCauseTagger {
    async fn cause_tags(
        &self,
        text: &str,
        taxonomy: &[&str],
        threshold: f64,
    ) -> Result<CauseTagSet> {
        if triggered(text, &self.fail_on) {
            bail!("KeywordCauseTagger: forced failure for {text:?}");
        }
        Ok(CauseTagSet::from_scores(
            self.rules
                .iter()
                .filter(|(keyword, cause, _)| {
                    taxonomy.contains(&cause.as_str()) && contains(text, keyword)
                })
                .map(|(_, cause, score)| (cause.clone(), *score)),
            threshold,
        ))
    }
}

// ---------------------------------------------------------------------------
// CountingCauseTagger
// ---------------------------------------------------------------------------

/// Returns no tags. Each call yields once before answering, so calls that
/// overlap are counted together in `peak_in_flight`.
#[derive(Default)]
pub struct CountingCauseTagger {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl CountingCauseTagger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CauseTagger for CountingCauseTagger {
    async fn cause_tags(
        &self,
        _text: &str,
        _taxonomy: &[&str],
        _threshold: f64,
    ) -> Result<CauseTagSet> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);

        let mut yielded = false;
        futures::future::poll_fn(|cx| {
            if yielded {
                Poll::Ready(())
            } else {
                yielded = true;
                cx.waker().wake_by_ref();
                Poll::Pending
            }
        })
        .await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(CauseTagSet::default())
    }
}

// ---------------------------------------------------------------------------
// RecordingHeadlineWriter
// ---------------------------------------------------------------------------

/// Returns `"HEADLINE: <line>"` and records every line it was asked about.
#[derive(Default)]
pub struct RecordingHeadlineWriter {
    seen: Mutex<Vec<(String, Sentiment, Option<EnvironmentReading>)>>,
    fail: bool,
}

impl RecordingHeadlineWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails (after being recorded).
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn seen(&self) -> Vec<(String, Sentiment, Option<EnvironmentReading>)> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl HeadlineWriter for RecordingHeadlineWriter {
    async fn headline(
        &self,
        base_line: &str,
        sentiment: Sentiment,
        environment: Option<&EnvironmentReading>,
    ) -> Result<String> {
        self.seen
            .lock()
            .unwrap()
            .push((base_line.to_string(), sentiment, environment.cloned()));
        if self.fail {
            bail!("RecordingHeadlineWriter: forced failure");
        }
        Ok(format!("HEADLINE: {base_line}"))
    }
}

// ---------------------------------------------------------------------------
// Failing
// ---------------------------------------------------------------------------

/// Fails every call, for every capability.
pub struct Failing;

#[async_trait]
impl SentimentClassifier for Failing {
    async fn sentiment(&self, _text: &str) -> Result<ScoredLabel> {
        bail!("sentiment provider unavailable")
    }
}

#[async_trait]
impl EmotionClassifier for Failing {
    async fn emotion(&self, _text: &str) -> Result<ScoredLabel> {
        bail!("emotion provider unavailable")
    }
}

#[async_trait]
impl ZeroShotClassifier for Failing {
    async fn zero_shot(&self, _text: &str, _labels: &[&str], _multi_label: bool) -> Result<ZeroShotResult> {
        bail!("zero-shot provider unavailable")
    }
}

#[async_trait]
impl TextEmbedder for Failing {
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("embedding provider unavailable")
    }
}

impl VectorPartitioner for Failing {
    fn partition(&self, _vectors: &[Vec<f32>], _k: usize) -> Result<Partition> {
        bail!("partitioner unavailable")
    }
}

#[async_trait]
impl CauseTagger for Failing {
    async fn cause_tags(&self, _text: &str, _taxonomy: &[&str], _threshold: f64) -> Result<CauseTagSet> {
        bail!("cause tagger unavailable")
    }
}

// ---------------------------------------------------------------------------
// Capability bundles
// ---------------------------------------------------------------------------

/// A working bundle: keyword sentiment and topics, hash embeddings, seeded
/// k-means, keyword cause tags, no headline writer.
pub fn capabilities(
    sentiment: KeywordSentiment,
    topics: KeywordZeroShot,
    causes: KeywordCauseTagger,
) -> Capabilities {
    Capabilities {
        sentiment: Arc::new(sentiment),
        emotion: Arc::new(FixedEmotion::new("neutral")),
        zero_shot: Arc::new(topics),
        embedder: Arc::new(FixedEmbedder::new(TEST_EMBEDDING_DIM)),
        partitioner: Arc::new(KMeans::new()),
        cause_tagger: Arc::new(causes),
        headline_writer: None,
    }
}
