use crate::classify::Classified;
use crate::newsfeed::Newsfeed;

/// Counters for one pipeline run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunStats {
    pub rows: u32,
    pub sentiment_failures: u32,
    pub emotion_failures: u32,
    pub topic_failures: u32,
    pub misc_before_discovery: u32,
    pub clusters_discovered: u32,
    pub discovery_failed: bool,
    pub groups_formed: u32,
    pub groups_selected: u32,
    pub lines_emitted: u32,
    pub placeholder_lines: u32,
}

impl RunStats {
    pub fn record_classification(&mut self, classified: &Classified) {
        self.rows = classified.rows.len() as u32;
        for failure in &classified.failures {
            match failure.capability {
                "sentiment" => self.sentiment_failures += 1,
                "emotion" => self.emotion_failures += 1,
                _ => self.topic_failures += 1,
            }
        }
        self.misc_before_discovery = classified.misc_before_discovery as u32;
        self.clusters_discovered = classified.clusters.len() as u32;
        self.discovery_failed = classified.discovery_error.is_some();
    }

    pub fn record_newsfeed(&mut self, newsfeed: &Newsfeed) {
        self.groups_formed = newsfeed.groups_formed as u32;
        self.groups_selected = newsfeed.groups_selected as u32;
        self.lines_emitted = newsfeed.lines.len() as u32;
        self.placeholder_lines = newsfeed.lines.iter().filter(|l| l.is_placeholder()).count() as u32;
    }

    pub fn failures(&self) -> u32 {
        self.sentiment_failures + self.emotion_failures + self.topic_failures
    }
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\n=== Analysis Run Complete ===")?;
        writeln!(f, "Rows:               {}", self.rows)?;
        writeln!(
            f,
            "Failures:           {} (sentiment {}, emotion {}, topic {})",
            self.failures(),
            self.sentiment_failures,
            self.emotion_failures,
            self.topic_failures
        )?;
        writeln!(f, "Misc before disc.:  {}", self.misc_before_discovery)?;
        if self.discovery_failed {
            writeln!(f, "Clusters:           discovery failed")?;
        } else {
            writeln!(f, "Clusters:           {}", self.clusters_discovered)?;
        }
        writeln!(f, "Groups formed:      {}", self.groups_formed)?;
        writeln!(f, "Groups selected:    {}", self.groups_selected)?;
        writeln!(
            f,
            "Lines emitted:      {} ({} placeholder)",
            self.lines_emitted, self.placeholder_lines
        )?;
        Ok(())
    }
}
