use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::environment::{AirPayload, EnvironmentMap, EnvironmentReading, WeatherPayload};

// =============================================================================
// Label sets and thresholds
// =============================================================================

/// Sentinel topic for messages no candidate topic was confident about.
pub const MISC_TOPIC: &str = "Misc";

/// Topics every message is scored against during classification.
pub const CANDIDATE_TOPICS: &[&str] = &[
    "Traffic",
    "Rent",
    "Pollution",
    "Weather",
    "Environment",
    "Noise",
];

/// Topics offered when naming an auto-discovered cluster of Misc messages.
pub const EXTENDED_TOPICS: &[&str] = &[
    "Waste",
    "Safety",
    "Animals",
    "Public Services",
    "Housing",
    "Healthcare",
    "Transport",
];

/// Causal hypotheses that can be tagged on a message.
pub const CAUSE_LABELS: &[&str] = &[
    "weather: rain",
    "weather: heat",
    "weather: cold",
    "weather: storm",
    "air quality: pollution",
    "accident",
    "operational delay",
    "infrastructure failure",
];

/// Minimum top score for a candidate topic to be accepted.
pub const TOPIC_THRESHOLD: f64 = 0.4;

/// Minimum score for a cause tag to count as confident.
pub const CAUSE_THRESHOLD: f64 = 0.45;

/// Newsfeed returned when nothing qualifies.
pub const NO_NEWS: &str = "No news today.";

// =============================================================================
// Sentiment
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sentiment {
    #[serde(alias = "negative")]
    Negative,
    #[serde(alias = "neutral")]
    Neutral,
    #[serde(alias = "positive")]
    Positive,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Negative => "NEGATIVE",
            Sentiment::Neutral => "NEUTRAL",
            Sentiment::Positive => "POSITIVE",
        }
    }

    /// Parse a provider label. Unknown labels return `None`.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "NEGATIVE" | "NEG" => Some(Sentiment::Negative),
            "NEUTRAL" | "NEU" => Some(Sentiment::Neutral),
            "POSITIVE" | "POS" => Some(Sentiment::Positive),
            _ => None,
        }
    }

    /// Whether rows with this sentiment take part in newsfeed grouping.
    pub fn is_polar(&self) -> bool {
        matches!(self, Sentiment::Negative | Sentiment::Positive)
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Feedback rows
// =============================================================================

/// A feedback row as it arrives from the caller. Rows from the mood store
/// use `suburb` and `explaination`; both are accepted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRow {
    #[serde(default, alias = "explaination", deserialize_with = "null_as_empty")]
    pub message: String,
    #[serde(default, alias = "suburb", deserialize_with = "null_as_empty")]
    pub district: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
}

impl FeedbackRow {
    pub fn new(message: impl Into<String>, district: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            district: district.into(),
            ..Default::default()
        }
    }

    /// The caller-supplied topic, if it is a real (non-Misc) label.
    pub fn settled_topic(&self) -> Option<&str> {
        self.topic
            .as_deref()
            .filter(|t| !t.is_empty() && *t != MISC_TOPIC)
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A row after classification. `id` is the row's index in the input batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledFeedback {
    pub id: usize,
    pub message: String,
    pub district: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    pub sentiment: Option<Sentiment>,
    pub emotion: Option<String>,
    pub topic: String,
}

impl LabeledFeedback {
    pub fn is_misc(&self) -> bool {
        self.topic == MISC_TOPIC
    }

    pub fn with_topic(self, topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..self
        }
    }
}

impl From<&LabeledFeedback> for FeedbackRow {
    fn from(row: &LabeledFeedback) -> Self {
        FeedbackRow {
            message: row.message.clone(),
            district: row.district.clone(),
            timestamp: row.timestamp,
            sentiment: row.sentiment,
            emotion: row.emotion.clone(),
            topic: Some(row.topic.clone()),
        }
    }
}

// =============================================================================
// Cause tags
// =============================================================================

/// Confident cause hypotheses for one message, label → score.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CauseTagSet(BTreeMap<String, f64>);

impl CauseTagSet {
    /// Keep only the scores at or above `threshold`.
    pub fn from_scores(scores: impl IntoIterator<Item = (String, f64)>, threshold: f64) -> Self {
        Self(
            scores
                .into_iter()
                .filter(|(_, score)| *score >= threshold)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn score(&self, label: &str) -> Option<f64> {
        self.0.get(label).copied()
    }

    /// Any tag in the family, e.g. `"weather: rain"` matches `"weather: rain (heavy)"`.
    pub fn has_family(&self, prefix: &str) -> bool {
        self.0.keys().any(|label| label.starts_with(prefix))
    }

    /// Any tag whose label mentions `fragment` anywhere.
    pub fn mentions(&self, fragment: &str) -> bool {
        self.0.keys().any(|label| label.contains(fragment))
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for CauseTagSet {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(l, s)| (l.into(), s)).collect())
    }
}

// =============================================================================
// Newsfeed groups
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GroupKey {
    pub district: String,
    pub topic: String,
    pub sentiment: Sentiment,
}

/// All feedback sharing one (district, topic, sentiment) triple.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsGroup {
    pub key: GroupKey,
    pub messages: Vec<String>,
}

impl NewsGroup {
    pub fn count(&self) -> usize {
        self.messages.len()
    }
}

// =============================================================================
// Request / result contract
// =============================================================================

/// Environment conditions for a single district in the wire payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DistrictConditions {
    #[serde(default)]
    pub weather: Option<WeatherPayload>,
    #[serde(default)]
    pub air: Option<AirPayload>,
}

/// Wire payload accepted by the entry point.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisPayload {
    #[serde(default)]
    pub weather: Option<WeatherPayload>,
    #[serde(default)]
    pub air: Option<AirPayload>,
    #[serde(default)]
    pub moods: Vec<FeedbackRow>,
    #[serde(default)]
    pub districts: BTreeMap<String, DistrictConditions>,
}

/// Normalized input to one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct AnalysisRequest {
    pub rows: Vec<FeedbackRow>,
    pub environment: EnvironmentMap,
}

impl From<AnalysisPayload> for AnalysisRequest {
    fn from(payload: AnalysisPayload) -> Self {
        let global = (payload.weather.is_some() || payload.air.is_some()).then(|| {
            EnvironmentReading::from_payloads(payload.weather.as_ref(), payload.air.as_ref())
        });

        let mut environment = EnvironmentMap::default();
        for (district, conditions) in &payload.districts {
            let reading = EnvironmentReading::from_payloads(
                conditions.weather.as_ref(),
                conditions.air.as_ref(),
            );
            // A partial district entry inherits what it leaves out.
            let reading = match &global {
                Some(global) => reading.fill_from(global),
                None => reading,
            };
            environment.insert_district(district.clone(), reading);
        }
        if let Some(global) = global {
            environment = environment.with_global(global);
        }
        AnalysisRequest {
            rows: payload.moods,
            environment,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Topic → count over NEGATIVE rows.
    pub complaints: BTreeMap<String, usize>,
    /// Topic → count over POSITIVE rows.
    pub positives: BTreeMap<String, usize>,
    pub newsfeed: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub headlines: Vec<String>,
}

impl AnalysisResult {
    /// Result for a run with nothing to report.
    pub fn empty() -> Self {
        Self {
            newsfeed: vec![NO_NEWS.to_string()],
            ..Default::default()
        }
    }

    /// Structured failure: empty aggregates and one diagnostic line.
    pub fn failed(diagnostic: impl fmt::Display) -> Self {
        Self {
            newsfeed: vec![format!("⚠️ Analysis failed: {diagnostic}")],
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistrictTotals {
    pub district: String,
    pub complaints: usize,
    pub positives: usize,
}

/// Per-district results merged into one report.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DistrictSummary {
    pub complaints: BTreeMap<String, usize>,
    pub positives: BTreeMap<String, usize>,
    pub districts: Vec<DistrictTotals>,
    pub newsfeed: Vec<String>,
}
