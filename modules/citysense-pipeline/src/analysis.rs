use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use citysense_common::{
    AnalysisRequest, AnalysisResult, CitySenseError, Config, DistrictSummary, EnvironmentMap,
    FeedbackRow, LabeledFeedback, Sentiment, CAUSE_THRESHOLD, TOPIC_THRESHOLD,
};
use inference_client::ChatClient;

use crate::cause::ZeroShotCauseTagger;
use crate::classify::{Classifier, FailurePolicy};
use crate::discovery::TopicDiscoverer;
use crate::newsfeed::{Newsfeed, Synthesizer};
use crate::partition::KMeans;
use crate::providers::HostedModels;
use crate::stats::RunStats;
use crate::summary::summarize_districts;
use crate::traits::{
    CauseTagger, EmotionClassifier, HeadlineWriter, SentimentClassifier, TextEmbedder,
    VectorPartitioner, ZeroShotClassifier,
};

/// Tunables for one analyzer. Library code never reads the environment;
/// the binary maps [`Config`] onto these.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub top_n: usize,
    pub num_clusters: usize,
    pub topic_threshold: f64,
    pub cause_threshold: f64,
    /// Capability calls in flight at once, in classification and in
    /// newsfeed cause tagging.
    pub concurrency: usize,
    pub fail_fast: bool,
    pub seed: Option<u64>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            top_n: 3,
            num_clusters: 3,
            topic_threshold: TOPIC_THRESHOLD,
            cause_threshold: CAUSE_THRESHOLD,
            concurrency: 4,
            fail_fast: false,
            seed: None,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_n: config.newsfeed_top_n,
            num_clusters: config.num_clusters,
            topic_threshold: config.topic_threshold,
            cause_threshold: config.cause_threshold,
            concurrency: config.classify_concurrency,
            fail_fast: config.fail_fast,
            seed: config.rng_seed,
        }
    }

    fn policy(&self) -> FailurePolicy {
        if self.fail_fast {
            FailurePolicy::FailFast
        } else {
            FailurePolicy::Degrade
        }
    }
}

/// Every capability the pipeline calls out to.
#[derive(Clone)]
pub struct Capabilities {
    pub sentiment: Arc<dyn SentimentClassifier>,
    pub emotion: Arc<dyn EmotionClassifier>,
    pub zero_shot: Arc<dyn ZeroShotClassifier>,
    pub embedder: Arc<dyn TextEmbedder>,
    pub partitioner: Arc<dyn VectorPartitioner>,
    pub cause_tagger: Arc<dyn CauseTagger>,
    pub headline_writer: Option<Arc<dyn HeadlineWriter>>,
}

impl Capabilities {
    /// Hosted models for every classifier, the built-in k-means, and a chat
    /// headline writer when an OpenAI key is configured.
    pub fn hosted(config: &Config) -> Result<Self> {
        let models = Arc::new(HostedModels::from_config(config)?);
        let partitioner = match config.rng_seed {
            Some(seed) => KMeans::new().with_seed(seed),
            None => KMeans::new(),
        };
        let headline_writer: Option<Arc<dyn HeadlineWriter>> = match &config.openai_api_key {
            Some(key) => Some(Arc::new(ChatClient::new(key.clone(), config.headline_model.clone())?)),
            None => None,
        };

        Ok(Self {
            sentiment: models.clone(),
            emotion: models.clone(),
            zero_shot: models.clone(),
            embedder: models.clone(),
            partitioner: Arc::new(partitioner),
            cause_tagger: Arc::new(ZeroShotCauseTagger::new(models)),
            headline_writer,
        })
    }
}

/// Everything one run produced, for callers that need more than the result.
#[derive(Debug, Clone)]
pub struct AnalysisReport {
    pub result: AnalysisResult,
    pub rows: Vec<LabeledFeedback>,
    pub stats: RunStats,
}

/// The request/response cycle: classify, synthesize the newsfeed, count.
pub struct Analyzer {
    classifier: Classifier,
    synthesizer: Synthesizer,
    headline_writer: Option<Arc<dyn HeadlineWriter>>,
    options: PipelineOptions,
}

impl Analyzer {
    pub fn new(capabilities: Capabilities, options: PipelineOptions) -> Self {
        let discoverer = TopicDiscoverer::new(
            capabilities.embedder,
            capabilities.partitioner,
            options.num_clusters,
        )
        .with_labeler(capabilities.zero_shot.clone());

        let classifier = Classifier::new(
            capabilities.sentiment,
            capabilities.emotion,
            capabilities.zero_shot,
            discoverer,
        )
        .with_policy(options.policy())
        .with_topic_threshold(options.topic_threshold)
        .with_concurrency(options.concurrency);

        let synthesizer = Synthesizer::new(capabilities.cause_tagger)
            .with_cause_threshold(options.cause_threshold)
            .with_concurrency(options.concurrency);

        Self {
            classifier,
            synthesizer,
            headline_writer: capabilities.headline_writer,
            options,
        }
    }

    /// Run the pipeline. Never fails: a batch-level error comes back as
    /// [`AnalysisResult::failed`].
    pub async fn analyze<R: Rng + Send>(&self, request: AnalysisRequest, rng: &mut R) -> AnalysisResult {
        match self.analyze_detailed(request, rng).await {
            Ok(report) => report.result,
            Err(e) => AnalysisResult::failed(e),
        }
    }

    pub async fn analyze_detailed<R: Rng + Send>(
        &self,
        request: AnalysisRequest,
        rng: &mut R,
    ) -> Result<AnalysisReport, CitySenseError> {
        let run_id = Uuid::new_v4();
        let AnalysisRequest { rows, environment } = request;

        info!(%run_id, rows = rows.len(), top_n = self.options.top_n, "Analysis started");

        if rows.is_empty() {
            info!(%run_id, "No feedback rows, nothing to analyze");
            return Ok(AnalysisReport {
                result: AnalysisResult::empty(),
                rows: Vec::new(),
                stats: RunStats::default(),
            });
        }

        let mut stats = RunStats::default();

        let classified = match self.classifier.classify(rows).await {
            Ok(classified) => classified,
            Err(e) => {
                warn!(%run_id, error = %e, "Analysis aborted");
                return Err(e);
            }
        };
        stats.record_classification(&classified);

        let (complaints, positives) = count_topics(&classified.rows);

        let newsfeed = self
            .synthesizer
            .synthesize(&classified.rows, &environment, self.options.top_n, rng)
            .await;
        stats.record_newsfeed(&newsfeed);

        let headlines = match &self.headline_writer {
            Some(writer) => write_headlines(writer.as_ref(), &newsfeed, &environment).await,
            None => Vec::new(),
        };

        info!(%run_id, "{stats}");

        Ok(AnalysisReport {
            result: AnalysisResult {
                complaints,
                positives,
                newsfeed: newsfeed.render(),
                headlines,
            },
            rows: classified.rows,
            stats,
        })
    }

    /// Run the pipeline once per district and merge the results.
    pub async fn analyze_by_district<R: Rng + Send>(
        &self,
        request: AnalysisRequest,
        rng: &mut R,
    ) -> DistrictSummary {
        let AnalysisRequest { rows, environment } = request;

        let mut by_district: BTreeMap<String, Vec<FeedbackRow>> = BTreeMap::new();
        for row in rows {
            by_district.entry(row.district.clone()).or_default().push(row);
        }

        let mut results = BTreeMap::new();
        for (district, rows) in by_district {
            let request = AnalysisRequest {
                rows,
                environment: environment.scoped_to(&district),
            };
            let result = self.analyze(request, rng).await;
            results.insert(district, result);
        }

        summarize_districts(results)
    }
}

/// Topic counts over NEGATIVE rows (complaints) and POSITIVE rows (positives).
pub fn count_topics(
    rows: &[LabeledFeedback],
) -> (BTreeMap<String, usize>, BTreeMap<String, usize>) {
    let mut complaints = BTreeMap::new();
    let mut positives = BTreeMap::new();
    for row in rows {
        let counts = match row.sentiment {
            Some(Sentiment::Negative) => &mut complaints,
            Some(Sentiment::Positive) => &mut positives,
            _ => continue,
        };
        *counts.entry(row.topic.clone()).or_insert(0) += 1;
    }
    (complaints, positives)
}

/// One headline per newsfeed line. A failed rewrite or a placeholder line
/// keeps the line's own text.
async fn write_headlines(
    writer: &dyn HeadlineWriter,
    newsfeed: &Newsfeed,
    environment: &EnvironmentMap,
) -> Vec<String> {
    let mut headlines = Vec::with_capacity(newsfeed.lines.len());
    for line in &newsfeed.lines {
        if line.is_placeholder() {
            headlines.push(line.text.clone());
            continue;
        }
        let env = environment.for_district(&line.key.district);
        match writer.headline(&line.text, line.key.sentiment, env).await {
            Ok(headline) => headlines.push(headline),
            Err(e) => {
                warn!(district = line.key.district.as_str(), error = %e, "Headline rewrite failed, using base line");
                headlines.push(line.text.clone());
            }
        }
    }
    headlines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(topic: &str, sentiment: Option<Sentiment>) -> LabeledFeedback {
        LabeledFeedback {
            id: 0,
            message: String::new(),
            district: "Riverside".into(),
            timestamp: None,
            sentiment,
            emotion: None,
            topic: topic.into(),
        }
    }

    #[test]
    fn test_count_topics_splits_by_sentiment() {
        let rows = vec![
            row("Traffic", Some(Sentiment::Negative)),
            row("Traffic", Some(Sentiment::Negative)),
            row("Rent", Some(Sentiment::Negative)),
            row("Traffic", Some(Sentiment::Positive)),
            row("Noise", Some(Sentiment::Neutral)),
            row("Noise", None),
        ];
        let (complaints, positives) = count_topics(&rows);
        assert_eq!(complaints.get("Traffic"), Some(&2));
        assert_eq!(complaints.get("Rent"), Some(&1));
        assert_eq!(positives.get("Traffic"), Some(&1));
        assert!(!complaints.contains_key("Noise"));
        assert!(!positives.contains_key("Noise"));
    }

    #[test]
    fn test_options_map_fail_fast_to_policy() {
        let options = PipelineOptions {
            fail_fast: true,
            ..Default::default()
        };
        assert_eq!(options.policy(), FailurePolicy::FailFast);
        assert_eq!(PipelineOptions::default().policy(), FailurePolicy::Degrade);
    }
}
