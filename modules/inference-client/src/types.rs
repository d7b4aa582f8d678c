use serde::{Deserialize, Serialize};

// =============================================================================
// Classification
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    pub label: String,
    pub score: f64,
}

/// Text-classification answers come nested per input (`[[...]]`) or flat.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ClassificationResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

impl ClassificationResponse {
    pub(crate) fn into_scores(self) -> Vec<LabelScore> {
        let mut scores = match self {
            ClassificationResponse::Nested(outer) => outer.into_iter().next().unwrap_or_default(),
            ClassificationResponse::Flat(scores) => scores,
        };
        sort_desc(&mut scores);
        scores
    }
}

// =============================================================================
// Zero-shot
// =============================================================================

/// Ranked zero-shot result; `labels[i]` scored `scores[i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZeroShotOutput {
    #[serde(default)]
    pub sequence: Option<String>,
    pub labels: Vec<String>,
    pub scores: Vec<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ZeroShotResponse {
    Single(ZeroShotOutput),
    Batch(Vec<ZeroShotOutput>),
    Pairs(Vec<LabelScore>),
}

impl ZeroShotResponse {
    pub(crate) fn into_output(self) -> Option<ZeroShotOutput> {
        match self {
            ZeroShotResponse::Single(output) => Some(output),
            ZeroShotResponse::Batch(outputs) => outputs.into_iter().next(),
            ZeroShotResponse::Pairs(mut pairs) => {
                sort_desc(&mut pairs);
                let (labels, scores) = pairs.into_iter().map(|p| (p.label, p.score)).unzip();
                Some(ZeroShotOutput {
                    sequence: None,
                    labels,
                    scores,
                })
            }
        }
    }
}

// =============================================================================
// Feature extraction
// =============================================================================

/// Sentence-transformer models return one pooled vector per input; raw
/// encoders return one vector per token, which we mean-pool.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum EmbeddingResponse {
    Pooled(Vec<Vec<f32>>),
    TokenLevel(Vec<Vec<Vec<f32>>>),
}

impl EmbeddingResponse {
    pub(crate) fn into_vectors(self) -> Vec<Vec<f32>> {
        match self {
            EmbeddingResponse::Pooled(vectors) => vectors,
            EmbeddingResponse::TokenLevel(per_input) => {
                per_input.into_iter().map(|tokens| mean_pool(&tokens)).collect()
            }
        }
    }
}

fn mean_pool(tokens: &[Vec<f32>]) -> Vec<f32> {
    let Some(first) = tokens.first() else {
        return Vec::new();
    };
    let mut pooled = vec![0.0f32; first.len()];
    for token in tokens {
        for (acc, x) in pooled.iter_mut().zip(token) {
            *acc += x;
        }
    }
    let n = tokens.len() as f32;
    pooled.iter_mut().for_each(|x| *x /= n);
    pooled
}

fn sort_desc(scores: &mut [LabelScore]) {
    scores.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
}

// =============================================================================
// Chat completion
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_completion_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ChatMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatMessage,
}
