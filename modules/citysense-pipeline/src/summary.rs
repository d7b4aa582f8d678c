use std::collections::BTreeMap;

use citysense_common::{AnalysisResult, DistrictSummary, DistrictTotals, NO_NEWS};

/// Merge per-district results into one report. Topic counts are summed
/// across districts; newsfeed lines are prefixed with their district.
/// Districts that had no news contribute no lines.
pub fn summarize_districts(results: BTreeMap<String, AnalysisResult>) -> DistrictSummary {
    let mut summary = DistrictSummary::default();

    for (district, result) in results {
        let complaints = merge_counts(&mut summary.complaints, &result.complaints);
        let positives = merge_counts(&mut summary.positives, &result.positives);

        summary.districts.push(DistrictTotals {
            district: district.clone(),
            complaints,
            positives,
        });

        summary.newsfeed.extend(
            result
                .newsfeed
                .iter()
                .filter(|line| line.as_str() != NO_NEWS)
                .map(|line| format!("[{district}] {line}")),
        );
    }

    if summary.newsfeed.is_empty() {
        summary.newsfeed.push(NO_NEWS.to_string());
    }
    summary
}

/// Add `counts` into `totals` and return their sum.
fn merge_counts(totals: &mut BTreeMap<String, usize>, counts: &BTreeMap<String, usize>) -> usize {
    let mut sum = 0;
    for (topic, count) in counts {
        *totals.entry(topic.clone()).or_insert(0) += count;
        sum += count;
    }
    sum
}
