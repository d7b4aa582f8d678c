//! Topic discovery over the Misc subset: clustering, representative
//! labeling, lexical fallback, and failure handling.

use std::sync::Arc;

use citysense_common::{CitySenseError, LabeledFeedback, MISC_TOPIC};
use citysense_pipeline::discovery::{LabelSource, TopicDiscoverer};
use citysense_pipeline::partition::KMeans;
use citysense_pipeline::testing::{Failing, FixedEmbedder, KeywordZeroShot};

fn labeled(rows: &[(&str, &str)]) -> Vec<LabeledFeedback> {
    rows.iter()
        .enumerate()
        .map(|(id, (message, topic))| LabeledFeedback {
            id,
            message: message.to_string(),
            district: "Riverside".to_string(),
            timestamp: None,
            sentiment: None,
            emotion: None,
            topic: topic.to_string(),
        })
        .collect()
}

fn sample_rows() -> Vec<LabeledFeedback> {
    labeled(&[
        ("Trash piling up behind shops", MISC_TOPIC),
        ("Bins overflowing on Main St", MISC_TOPIC),
        ("Buses late again", "Traffic"),
        ("Stray dogs in the park", MISC_TOPIC),
        ("Dogs barking all night", MISC_TOPIC),
    ])
}

fn sample_embedder() -> FixedEmbedder {
    FixedEmbedder::new(2)
        .on_text("Trash piling up behind shops", vec![1.0, 0.0])
        .on_text("Bins overflowing on Main St", vec![0.9, 0.1])
        .on_text("Stray dogs in the park", vec![0.0, 1.0])
        .on_text("Dogs barking all night", vec![0.1, 0.9])
}

fn sample_labeler() -> KeywordZeroShot {
    KeywordZeroShot::new()
        .on_keyword("trash", "Waste", 0.8)
        .on_keyword("bins", "Waste", 0.7)
        .on_keyword("dogs", "Animals", 0.9)
}

#[tokio::test]
async fn every_misc_row_gets_its_cluster_label() {
    let discoverer = TopicDiscoverer::new(Arc::new(sample_embedder()), Arc::new(KMeans::new()), 2)
        .with_labeler(Arc::new(sample_labeler()));

    let outcome = discoverer.discover(sample_rows()).await.unwrap();

    let topics: Vec<&str> = outcome.rows.iter().map(|r| r.topic.as_str()).collect();
    assert_eq!(topics, vec!["Waste", "Waste", "Traffic", "Animals", "Animals"]);
    assert!(outcome.rows.iter().all(|r| !r.is_misc()));

    assert_eq!(outcome.clusters.len(), 2);
    for cluster in &outcome.clusters {
        assert_eq!(cluster.source, LabelSource::ZeroShot);
        assert!(cluster.members.contains(&cluster.representative));
        assert!(!cluster.members.contains(&2), "non-Misc rows are never clustered");
    }
}

#[tokio::test]
async fn without_labeler_clusters_are_named_by_content_words() {
    let discoverer =
        TopicDiscoverer::new(Arc::new(sample_embedder()), Arc::new(KMeans::new()), 2);

    let outcome = discoverer.discover(sample_rows()).await.unwrap();

    let topics: Vec<&str> = outcome.rows.iter().map(|r| r.topic.as_str()).collect();
    assert_eq!(topics, vec!["Trash", "Trash", "Traffic", "Dogs", "Dogs"]);
    assert!(outcome
        .clusters
        .iter()
        .all(|c| c.source == LabelSource::Lexical));
}

#[tokio::test]
async fn failing_labeler_falls_back_to_content_words() {
    let discoverer = TopicDiscoverer::new(Arc::new(sample_embedder()), Arc::new(KMeans::new()), 2)
        .with_labeler(Arc::new(Failing));

    let outcome = discoverer.discover(sample_rows()).await.unwrap();
    assert_eq!(outcome.rows[3].topic, "Dogs");
    assert!(outcome
        .clusters
        .iter()
        .all(|c| c.source == LabelSource::Lexical));
}

#[tokio::test]
async fn single_misc_row_forms_one_cluster_and_ignores_threshold() {
    let rows = labeled(&[("Rent doubled", "Rent"), ("Landlord ignores repairs", MISC_TOPIC)]);
    let labeler = KeywordZeroShot::new().on_keyword("landlord", "Housing", 0.1);
    let discoverer = TopicDiscoverer::new(
        Arc::new(FixedEmbedder::new(4)),
        Arc::new(KMeans::new()),
        3,
    )
    .with_labeler(Arc::new(labeler));

    let outcome = discoverer.discover(rows).await.unwrap();
    assert_eq!(outcome.clusters.len(), 1);
    assert_eq!(outcome.clusters[0].representative, 1);
    assert_eq!(outcome.rows[1].topic, "Housing");
    assert_eq!(outcome.rows[0].topic, "Rent");
}

#[tokio::test]
async fn collapsed_embeddings_share_one_label() {
    let rows = labeled(&[
        ("Streetlights out on Elm", MISC_TOPIC),
        ("Streetlights out near school", MISC_TOPIC),
        ("Streetlights flicker", MISC_TOPIC),
    ]);
    let embedder = FixedEmbedder::new(2)
        .on_text("Streetlights out on Elm", vec![0.5, 0.5])
        .on_text("Streetlights out near school", vec![0.5, 0.5])
        .on_text("Streetlights flicker", vec![0.5, 0.5]);
    let discoverer = TopicDiscoverer::new(Arc::new(embedder), Arc::new(KMeans::new()), 3);

    let outcome = discoverer.discover(rows).await.unwrap();
    assert_eq!(outcome.clusters.len(), 1);
    assert_eq!(outcome.clusters[0].members, vec![0, 1, 2]);
    assert_eq!(outcome.clusters[0].representative, 0);
    assert!(outcome.rows.iter().all(|r| r.topic == "Streetlights"));
}

#[tokio::test]
async fn no_misc_rows_is_a_no_op() {
    let rows = labeled(&[("Buses late", "Traffic"), ("Rent doubled", "Rent")]);
    let discoverer = TopicDiscoverer::new(
        Arc::new(FixedEmbedder::new(2).failing()),
        Arc::new(Failing),
        3,
    );

    let outcome = discoverer.discover(rows.clone()).await.unwrap();
    assert_eq!(outcome.rows, rows);
    assert!(outcome.clusters.is_empty());
}

#[tokio::test]
async fn embedding_failure_is_a_capability_error() {
    let discoverer = TopicDiscoverer::new(
        Arc::new(FixedEmbedder::new(2).failing()),
        Arc::new(KMeans::new()),
        2,
    );

    let err = discoverer.discover(sample_rows()).await.unwrap_err();
    assert!(matches!(
        err,
        CitySenseError::Capability {
            capability: "embedding",
            ..
        }
    ));
}

#[tokio::test]
async fn partition_failure_is_a_capability_error() {
    let discoverer = TopicDiscoverer::new(Arc::new(sample_embedder()), Arc::new(Failing), 2);

    let err = discoverer.discover(sample_rows()).await.unwrap_err();
    assert!(matches!(
        err,
        CitySenseError::Capability {
            capability: "partition",
            ..
        }
    ));
}
