use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt, TryStreamExt};
use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::{debug, warn};

use citysense_common::{
    CauseTagSet, CitySenseError, EnvironmentMap, GroupKey, LabeledFeedback, NewsGroup, Sentiment,
    CAUSE_LABELS, CAUSE_THRESHOLD, NO_NEWS,
};

use crate::cause::infer_context;
use crate::traits::CauseTagger;

/// Extra groups admitted past `top_n` when sizes tie at the cutoff.
///
/// The value is arbitrary: with many ties at the cutoff, lower-ranked groups
/// beyond this cap are dropped without notice. Kept as-is rather than tuned.
pub const TIE_OVERFETCH: usize = 3;

/// One emitted newsfeed line and the group it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct NewsLine {
    pub key: GroupKey,
    pub count: usize,
    /// The chosen message; `None` for a placeholder line.
    pub representative: Option<String>,
    pub text: String,
}

impl NewsLine {
    pub fn is_placeholder(&self) -> bool {
        self.representative.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Newsfeed {
    pub lines: Vec<NewsLine>,
    pub groups_formed: usize,
    pub groups_selected: usize,
}

impl Newsfeed {
    /// Rendered lines, or the single sentinel line when nothing was emitted.
    pub fn render(&self) -> Vec<String> {
        if self.lines.is_empty() {
            return vec![NO_NEWS.to_string()];
        }
        self.lines.iter().map(|l| l.text.clone()).collect()
    }
}

/// Group rows by (district, topic, sentiment). Rows without a POSITIVE or
/// NEGATIVE sentiment are left out. Groups come back in key order.
pub fn group_rows(rows: &[LabeledFeedback]) -> Vec<NewsGroup> {
    let mut groups: BTreeMap<GroupKey, Vec<String>> = BTreeMap::new();
    for row in rows {
        let Some(sentiment) = row.sentiment.filter(Sentiment::is_polar) else {
            continue;
        };
        groups
            .entry(GroupKey {
                district: row.district.clone(),
                topic: row.topic.clone(),
                sentiment,
            })
            .or_default()
            .push(row.message.clone());
    }
    groups
        .into_iter()
        .map(|(key, messages)| NewsGroup { key, messages })
        .collect()
}

/// Rank groups by size and keep every group at least as large as the one at
/// rank `top_n`, capped at `top_n + TIE_OVERFETCH`. Equal sizes keep their
/// incoming (key) order.
pub fn rank_groups(mut groups: Vec<NewsGroup>, top_n: usize) -> Vec<NewsGroup> {
    if top_n == 0 || groups.is_empty() {
        return Vec::new();
    }
    groups.sort_by(|a, b| b.count().cmp(&a.count()));

    let cutoff = groups[(top_n - 1).min(groups.len() - 1)].count();
    groups
        .into_iter()
        .take_while(|g| g.count() >= cutoff)
        .take(top_n + TIE_OVERFETCH)
        .collect()
}

/// Renders the ranked groups into newsfeed lines with validated context.
pub struct Synthesizer {
    cause_tagger: Arc<dyn CauseTagger>,
    cause_threshold: f64,
    concurrency: usize,
}

impl Synthesizer {
    pub fn new(cause_tagger: Arc<dyn CauseTagger>) -> Self {
        Self {
            cause_tagger,
            cause_threshold: CAUSE_THRESHOLD,
            concurrency: 1,
        }
    }

    pub fn with_cause_threshold(mut self, threshold: f64) -> Self {
        self.cause_threshold = threshold;
        self
    }

    /// Cause-tagging calls in flight at once, per group.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Build at most `top_n` lines. The representative of each group is a
    /// uniformly random pick, drawn from `rng`, among the members with the
    /// most confident cause tags. A group that fails yields a placeholder
    /// line and synthesis carries on.
    pub async fn synthesize<R: Rng + Send>(
        &self,
        rows: &[LabeledFeedback],
        environment: &EnvironmentMap,
        top_n: usize,
        rng: &mut R,
    ) -> Newsfeed {
        let groups = group_rows(rows);
        let groups_formed = groups.len();
        let selected = rank_groups(groups, top_n);
        let groups_selected = selected.len();

        let mut lines = Vec::with_capacity(top_n.min(groups_selected));
        for group in selected {
            if lines.len() >= top_n {
                break;
            }
            let line = match self.compose(&group, environment, rng).await {
                Ok(line) => line,
                Err(e) => {
                    warn!(
                        district = group.key.district.as_str(),
                        topic = group.key.topic.as_str(),
                        error = %e,
                        "Newsfeed line failed, emitting placeholder"
                    );
                    NewsLine {
                        text: placeholder_line(&group.key.district),
                        count: group.count(),
                        key: group.key,
                        representative: None,
                    }
                }
            };
            lines.push(line);
        }

        debug!(groups_formed, groups_selected, lines = lines.len(), "Newsfeed synthesized");

        Newsfeed {
            lines,
            groups_formed,
            groups_selected,
        }
    }

    async fn compose<R: Rng + Send>(
        &self,
        group: &NewsGroup,
        environment: &EnvironmentMap,
        rng: &mut R,
    ) -> Result<NewsLine, CitySenseError> {
        let tagged: Vec<CauseTagSet> = stream::iter(group.messages.iter())
            .map(|m| {
                self.cause_tagger
                    .cause_tags(m, CAUSE_LABELS, self.cause_threshold)
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
            .map_err(|e| CitySenseError::capability("cause_tags", e))?;

        let richest = tagged.iter().map(CauseTagSet::len).max().unwrap_or(0);
        let candidates: Vec<usize> = tagged
            .iter()
            .enumerate()
            .filter(|(_, tags)| tags.len() == richest)
            .map(|(i, _)| i)
            .collect();
        let Some(&pick) = candidates.choose(rng) else {
            return Err(CitySenseError::EmptyInput(format!(
                "group [{}][{}] has no members",
                group.key.district, group.key.topic
            )));
        };

        let representative = &group.messages[pick];
        let context = infer_context(
            &tagged[pick],
            &group.key.district,
            environment.for_district(&group.key.district),
            representative,
        );

        Ok(NewsLine {
            text: format_line(&group.key, representative, group.count(), &context),
            key: group.key.clone(),
            count: group.count(),
            representative: Some(representative.clone()),
        })
    }
}

pub fn format_line(key: &GroupKey, representative: &str, count: usize, context: &str) -> String {
    let glyph = match key.sentiment {
        Sentiment::Negative => "📰",
        _ => "🌟",
    };
    format!(
        "{glyph} [{}][{}][{}] {representative} ({count} mentions){context}",
        key.sentiment, key.district, key.topic
    )
}

pub fn placeholder_line(district: &str) -> String {
    format!("⚠️ [{district}] News for this group is unavailable.")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn group(district: &str, topic: &str, size: usize) -> NewsGroup {
        NewsGroup {
            key: GroupKey {
                district: district.into(),
                topic: topic.into(),
                sentiment: Sentiment::Negative,
            },
            messages: (0..size).map(|i| format!("{topic} {i}")).collect(),
        }
    }

    fn row(id: usize, district: &str, topic: &str, sentiment: Option<Sentiment>) -> LabeledFeedback {
        LabeledFeedback {
            id,
            message: format!("message {id}"),
            district: district.into(),
            timestamp: None,
            sentiment,
            emotion: None,
            topic: topic.into(),
        }
    }

    #[test]
    fn test_rank_includes_ties_at_cutoff() {
        let groups = vec![group("A", "Rent", 5), group("B", "Noise", 3), group("C", "Traffic", 5), group("D", "Waste", 1)];
        let ranked = rank_groups(groups, 2);
        let sizes: Vec<usize> = ranked.iter().map(NewsGroup::count).collect();
        assert_eq!(sizes, vec![5, 5]);
    }

    #[test]
    fn test_rank_cutoff_admits_extra_ties() {
        let groups = vec![group("A", "Rent", 4), group("B", "Rent", 2), group("C", "Rent", 2), group("D", "Rent", 2), group("E", "Rent", 1)];
        let ranked = rank_groups(groups, 2);
        let districts: Vec<&str> = ranked.iter().map(|g| g.key.district.as_str()).collect();
        assert_eq!(districts, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_rank_caps_at_top_n_plus_overfetch() {
        let groups: Vec<NewsGroup> = (0..10).map(|i| group(&format!("D{i}"), "Rent", 2)).collect();
        assert_eq!(rank_groups(groups, 1).len(), 1 + TIE_OVERFETCH);
    }

    #[test]
    fn test_rank_clamps_cutoff_to_group_count() {
        let groups = vec![group("A", "Rent", 3), group("B", "Rent", 1)];
        assert_eq!(rank_groups(groups, 10).len(), 2);
        assert!(rank_groups(vec![group("A", "Rent", 3)], 0).is_empty());
        assert!(rank_groups(Vec::new(), 3).is_empty());
    }

    #[test]
    fn test_group_rows_skips_neutral_and_unlabeled() {
        let rows = vec![
            row(0, "A", "Rent", Some(Sentiment::Negative)),
            row(1, "A", "Rent", Some(Sentiment::Negative)),
            row(2, "A", "Rent", Some(Sentiment::Positive)),
            row(3, "A", "Rent", Some(Sentiment::Neutral)),
            row(4, "A", "Rent", None),
        ];
        let groups = group_rows(&rows);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups.iter().map(NewsGroup::count).sum::<usize>(), 3);
    }

    #[test]
    fn test_format_line_glyphs() {
        let key = GroupKey {
            district: "Riverside".into(),
            topic: "Traffic".into(),
            sentiment: Sentiment::Negative,
        };
        assert_eq!(
            format_line(&key, "Buses late", 4, ""),
            "📰 [NEGATIVE][Riverside][Traffic] Buses late (4 mentions)"
        );

        let key = GroupKey {
            sentiment: Sentiment::Positive,
            ..key
        };
        assert!(format_line(&key, "New park", 2, " Context: x.").starts_with("🌟 [POSITIVE]"));
    }

    #[test]
    fn test_render_empty_is_sentinel() {
        assert_eq!(Newsfeed::default().render(), vec![NO_NEWS.to_string()]);
    }
}
