use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{info, warn};

use citysense_common::{CitySenseError, LabeledFeedback, EXTENDED_TOPICS};

use crate::partition::squared_distance;
use crate::traits::{TextEmbedder, VectorPartitioner, ZeroShotClassifier};

static CONTENT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-z]{4,}\b").expect("valid regex"));

/// How a discovered cluster got its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelSource {
    ZeroShot,
    Lexical,
}

/// One cluster of formerly-Misc rows.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredCluster {
    pub cluster_id: usize,
    /// Row ids (`LabeledFeedback::id`) of every member, ascending.
    pub members: Vec<usize>,
    /// Row id of the member nearest the centroid.
    pub representative: usize,
    pub label: String,
    pub source: LabelSource,
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    pub rows: Vec<LabeledFeedback>,
    pub clusters: Vec<DiscoveredCluster>,
}

/// Names the "Misc" rows of a batch by clustering their embeddings and
/// labeling each cluster from its most central message.
pub struct TopicDiscoverer {
    embedder: Arc<dyn TextEmbedder>,
    partitioner: Arc<dyn VectorPartitioner>,
    labeler: Option<Arc<dyn ZeroShotClassifier>>,
    num_clusters: usize,
}

impl TopicDiscoverer {
    /// A discoverer without a zero-shot labeler names clusters by their most
    /// frequent content word.
    pub fn new(
        embedder: Arc<dyn TextEmbedder>,
        partitioner: Arc<dyn VectorPartitioner>,
        num_clusters: usize,
    ) -> Self {
        Self {
            embedder,
            partitioner,
            labeler: None,
            num_clusters: num_clusters.max(1),
        }
    }

    pub fn with_labeler(mut self, labeler: Arc<dyn ZeroShotClassifier>) -> Self {
        self.labeler = Some(labeler);
        self
    }

    /// Relabel every Misc row with its cluster's label. Non-Misc rows pass
    /// through untouched, and an empty Misc subset is a no-op.
    pub async fn discover(
        &self,
        rows: Vec<LabeledFeedback>,
    ) -> Result<DiscoveryOutcome, CitySenseError> {
        let misc: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_misc())
            .map(|(i, _)| i)
            .collect();

        if misc.is_empty() {
            return Ok(DiscoveryOutcome {
                rows,
                clusters: Vec::new(),
            });
        }

        let texts: Vec<String> = misc.iter().map(|&i| rows[i].message.clone()).collect();
        let embeddings = self
            .embedder
            .embed(&texts)
            .await
            .map_err(|e| CitySenseError::capability("embedding", e))?;
        if embeddings.len() != texts.len() {
            return Err(CitySenseError::capability(
                "embedding",
                format!("{} vectors for {} messages", embeddings.len(), texts.len()),
            ));
        }

        let k = self.num_clusters.min(misc.len());
        let partition = self
            .partitioner
            .partition(&embeddings, k)
            .map_err(|e| CitySenseError::capability("partition", e))?;
        if partition.assignments.len() != misc.len()
            || partition
                .assignments
                .iter()
                .any(|&c| c >= partition.centroids.len())
        {
            return Err(CitySenseError::capability(
                "partition",
                "assignments do not match the input or the centroid list",
            ));
        }

        // cluster id → positions within the Misc subset, ascending
        let mut by_cluster: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (pos, &cluster_id) in partition.assignments.iter().enumerate() {
            by_cluster.entry(cluster_id).or_default().push(pos);
        }

        let mut clusters = Vec::with_capacity(by_cluster.len());
        let mut label_for_row: HashMap<usize, String> = HashMap::new();

        for (cluster_id, positions) in &by_cluster {
            let Some(rep_pos) =
                representative(positions, &embeddings, &partition.centroids[*cluster_id])
            else {
                continue;
            };
            let rep_row = &rows[misc[rep_pos]];

            let (label, source) = self
                .label_cluster(*cluster_id, &rep_row.message, positions, &texts)
                .await;

            for &pos in positions {
                label_for_row.insert(misc[pos], label.clone());
            }

            info!(
                cluster_id,
                members = positions.len(),
                representative = rep_row.id,
                label = label.as_str(),
                "Discovered topic for Misc cluster"
            );

            clusters.push(DiscoveredCluster {
                cluster_id: *cluster_id,
                members: positions.iter().map(|&p| rows[misc[p]].id).collect(),
                representative: rep_row.id,
                label,
                source,
            });
        }

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| match label_for_row.remove(&i) {
                Some(label) => row.with_topic(label),
                None => row,
            })
            .collect();

        Ok(DiscoveryOutcome { rows, clusters })
    }

    async fn label_cluster(
        &self,
        cluster_id: usize,
        representative_text: &str,
        positions: &[usize],
        texts: &[String],
    ) -> (String, LabelSource) {
        if let Some(labeler) = &self.labeler {
            match labeler.zero_shot(representative_text, EXTENDED_TOPICS, false).await {
                Ok(result) => {
                    if let Some((label, _)) = result.top() {
                        return (label.to_string(), LabelSource::ZeroShot);
                    }
                }
                Err(e) => {
                    warn!(cluster_id, error = %e, "Zero-shot cluster labeling failed, using content words");
                }
            }
        }

        let members: Vec<&str> = positions.iter().map(|&p| texts[p].as_str()).collect();
        (lexical_label(&members, cluster_id), LabelSource::Lexical)
    }
}

/// Member closest (squared Euclidean) to `centroid`. Members are scanned in
/// ascending order and only a strictly smaller distance replaces the
/// current pick, so the lowest index wins ties.
pub fn representative(members: &[usize], embeddings: &[Vec<f32>], centroid: &[f32]) -> Option<usize> {
    let mut best: Option<(usize, f32)> = None;
    for &m in members {
        let d = squared_distance(&embeddings[m], centroid);
        if best.map_or(true, |(_, b)| d < b) {
            best = Some((m, d));
        }
    }
    best.map(|(m, _)| m)
}

/// Most frequent word of four or more letters across the cluster,
/// capitalized. Ties go to the word seen first. `Cluster_<id>` when no
/// word qualifies.
pub fn lexical_label(messages: &[&str], cluster_id: usize) -> String {
    let joined = messages.join(" ").to_lowercase();

    let mut order: Vec<&str> = Vec::new();
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for m in CONTENT_WORD.find_iter(&joined) {
        let word = m.as_str();
        let count = counts.entry(word).or_insert(0);
        if *count == 0 {
            order.push(word);
        }
        *count += 1;
    }

    let mut best: Option<(&str, usize)> = None;
    for word in order {
        let count = counts[word];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((word, count));
        }
    }

    match best {
        Some((word, _)) => capitalize(word),
        None => format!("Cluster_{cluster_id}"),
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_representative_is_nearest_to_centroid() {
        let embeddings = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![3.0, 3.0]];
        assert_eq!(representative(&[0, 1, 2], &embeddings, &[1.2, 1.2]), Some(1));
    }

    #[test]
    fn test_representative_tie_goes_to_lowest_index() {
        let embeddings = vec![vec![0.0], vec![2.0], vec![2.0], vec![0.0]];
        assert_eq!(representative(&[1, 2, 3], &embeddings, &[1.0]), Some(1));
        assert_eq!(representative(&[], &embeddings, &[1.0]), None);
    }

    #[test]
    fn test_lexical_label_most_common_word() {
        let label = lexical_label(
            &["Stray dogs near the park", "More stray dogs barking", "dogs everywhere"],
            0,
        );
        assert_eq!(label, "Dogs");
    }

    #[test]
    fn test_lexical_label_tie_prefers_first_seen() {
        assert_eq!(lexical_label(&["Bins overflowing", "overflowing bins"], 3), "Bins");
    }

    #[test]
    fn test_lexical_label_without_content_words() {
        assert_eq!(lexical_label(&["ok", "no", "bad"], 2), "Cluster_2");
        assert_eq!(lexical_label(&[], 0), "Cluster_0");
    }
}
