use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{info, warn};

use citysense_common::{
    CitySenseError, FeedbackRow, LabeledFeedback, Sentiment, CANDIDATE_TOPICS, MISC_TOPIC,
    TOPIC_THRESHOLD,
};

use crate::discovery::{DiscoveredCluster, TopicDiscoverer};
use crate::traits::{EmotionClassifier, SentimentClassifier, ZeroShotClassifier};

/// What to do when a capability call fails for one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Record the failure and keep going with a degraded label.
    #[default]
    Degrade,
    /// Abort the batch on the first failure.
    FailFast,
}

/// A capability failure recorded against one row.
#[derive(Debug, Clone, PartialEq)]
pub struct RowFailure {
    pub row: usize,
    pub capability: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Classified {
    pub rows: Vec<LabeledFeedback>,
    pub failures: Vec<RowFailure>,
    /// Rows labeled Misc before topic discovery ran.
    pub misc_before_discovery: usize,
    pub clusters: Vec<DiscoveredCluster>,
    /// Set when discovery failed and the Misc rows were left as Misc.
    pub discovery_error: Option<String>,
}

/// Labels every row with sentiment, emotion and topic, then names the
/// leftover Misc rows through topic discovery.
pub struct Classifier {
    sentiment: Arc<dyn SentimentClassifier>,
    emotion: Arc<dyn EmotionClassifier>,
    topics: Arc<dyn ZeroShotClassifier>,
    discoverer: TopicDiscoverer,
    topic_threshold: f64,
    policy: FailurePolicy,
    concurrency: usize,
}

impl Classifier {
    pub fn new(
        sentiment: Arc<dyn SentimentClassifier>,
        emotion: Arc<dyn EmotionClassifier>,
        topics: Arc<dyn ZeroShotClassifier>,
        discoverer: TopicDiscoverer,
    ) -> Self {
        Self {
            sentiment,
            emotion,
            topics,
            discoverer,
            topic_threshold: TOPIC_THRESHOLD,
            policy: FailurePolicy::default(),
            concurrency: 1,
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_topic_threshold(mut self, threshold: f64) -> Self {
        self.topic_threshold = threshold;
        self
    }

    /// Rows classified at once. Output order never depends on this.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn classify(&self, rows: Vec<FeedbackRow>) -> Result<Classified, CitySenseError> {
        let total = rows.len();

        let labeled: Vec<(LabeledFeedback, Vec<RowFailure>)> =
            stream::iter(rows.into_iter().enumerate().map(|(id, row)| self.label_row(id, row)))
                .buffered(self.concurrency)
                .try_collect()
                .await?;

        let mut failures = Vec::new();
        let mut rows = Vec::with_capacity(labeled.len());
        for (row, row_failures) in labeled {
            failures.extend(row_failures);
            rows.push(row);
        }

        let misc_before_discovery = rows.iter().filter(|r| r.is_misc()).count();
        info!(
            rows = total,
            failures = failures.len(),
            misc = misc_before_discovery,
            "Per-row classification complete"
        );

        // Discovery consumes the rows; keep a copy to fall back on.
        let fallback = match self.policy {
            FailurePolicy::Degrade => Some(rows.clone()),
            FailurePolicy::FailFast => None,
        };

        match self.discoverer.discover(rows).await {
            Ok(outcome) => Ok(Classified {
                rows: outcome.rows,
                failures,
                misc_before_discovery,
                clusters: outcome.clusters,
                discovery_error: None,
            }),
            Err(e) => match fallback {
                Some(rows) => {
                    warn!(error = %e, misc = misc_before_discovery, "Topic discovery failed, leaving rows as Misc");
                    Ok(Classified {
                        rows,
                        failures,
                        misc_before_discovery,
                        clusters: Vec::new(),
                        discovery_error: Some(e.to_string()),
                    })
                }
                None => Err(e),
            },
        }
    }

    /// Label one row. Labels the caller already supplied are kept, so
    /// re-running over labeled rows changes nothing.
    async fn label_row(
        &self,
        id: usize,
        row: FeedbackRow,
    ) -> Result<(LabeledFeedback, Vec<RowFailure>), CitySenseError> {
        let mut failures = Vec::new();

        let sentiment = match row.sentiment {
            Some(s) => Some(s),
            None => {
                let result = self.sentiment.sentiment(&row.message).await.and_then(|scored| {
                    Sentiment::from_label(&scored.label)
                        .ok_or_else(|| anyhow::anyhow!("unknown sentiment label {:?}", scored.label))
                });
                self.settle(id, "sentiment", result, &mut failures)?
            }
        };

        let topic = match row.settled_topic() {
            Some(t) => t.to_string(),
            None => {
                let result = self
                    .topics
                    .zero_shot(&row.message, CANDIDATE_TOPICS, false)
                    .await
                    .map(|r| match r.top() {
                        Some((label, score)) if score >= self.topic_threshold => label.to_string(),
                        _ => MISC_TOPIC.to_string(),
                    });
                self.settle(id, "topic", result, &mut failures)?
                    .unwrap_or_else(|| MISC_TOPIC.to_string())
            }
        };

        let emotion = match row.emotion {
            Some(e) => Some(e),
            None => {
                let result = self.emotion.emotion(&row.message).await.map(|s| s.label);
                self.settle(id, "emotion", result, &mut failures)?
            }
        };

        Ok((
            LabeledFeedback {
                id,
                message: row.message,
                district: row.district,
                timestamp: row.timestamp,
                sentiment,
                emotion,
                topic,
            },
            failures,
        ))
    }

    /// Apply the failure policy to one capability result.
    fn settle<T>(
        &self,
        row: usize,
        capability: &'static str,
        result: anyhow::Result<T>,
        failures: &mut Vec<RowFailure>,
    ) -> Result<Option<T>, CitySenseError> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) => match self.policy {
                FailurePolicy::FailFast => Err(CitySenseError::capability(
                    capability,
                    format!("row {row}: {e}"),
                )),
                FailurePolicy::Degrade => {
                    warn!(row, capability, error = %e, "Classification failed, degrading label");
                    failures.push(RowFailure {
                        row,
                        capability,
                        message: e.to_string(),
                    });
                    Ok(None)
                }
            },
        }
    }
}
