//! Markdown and JSON report generation.
//!
//! Builds a complete view of the reconciled study data: population means,
//! per-group statistics, box-plot quartiles, the score histogram, and the
//! per-participant listing.

use crate::analysis::{
    comprehension_scatter, efficiency_points, group_stats, improvement_scatter, overall_stats,
    quartile_summary, score_histogram, EfficiencyPoint, GroupQuartiles, GroupStats, OverallStats,
    ScatterSeries, ScoreHistogram,
};
use crate::config::ReportConfig;
use crate::models::{ParticipantRecord, ParticipantSource};
use crate::reconcile::Reconciled;
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata about one report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportMetadata {
    pub generated_at: DateTime<Utc>,
    pub data_source: ParticipantSource,
    pub participant_count: usize,
    pub dropped_partial: usize,
    pub dropped_malformed: usize,
    pub dropped_filtered: usize,
    pub duration_seconds: f64,
}

/// The complete derived view of a reconciled participant set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub metadata: ReportMetadata,
    pub overall: OverallStats,
    pub groups: Vec<GroupStats>,
    pub quartiles: Vec<GroupQuartiles>,
    pub histogram: ScoreHistogram,
    pub efficiency: Vec<EfficiencyPoint>,
    pub improvement_scatter: Vec<ScatterSeries>,
    pub comprehension_scatter: Vec<ScatterSeries>,
    pub participants: Vec<ParticipantRecord>,
}

impl Report {
    /// Derive every statistic from a reconciliation outcome.
    pub fn build(reconciled: &Reconciled, duration_seconds: f64) -> Self {
        let participants = &reconciled.participants;

        Self {
            metadata: ReportMetadata {
                generated_at: Utc::now(),
                data_source: reconciled.source,
                participant_count: participants.len(),
                dropped_partial: reconciled.dropped_partial,
                dropped_malformed: reconciled.dropped_malformed,
                dropped_filtered: reconciled.dropped_filtered,
                duration_seconds,
            },
            overall: overall_stats(participants),
            groups: group_stats(participants),
            quartiles: quartile_summary(participants),
            histogram: score_histogram(participants),
            efficiency: efficiency_points(participants),
            improvement_scatter: improvement_scatter(participants),
            comprehension_scatter: comprehension_scatter(participants),
            participants: participants.clone(),
        }
    }
}

/// Generate a complete Markdown report.
pub fn generate_markdown_report(report: &Report, config: &ReportConfig) -> String {
    let mut output = String::new();

    output.push_str("# Reading Study Report\n\n");
    output.push_str(&generate_metadata_section(&report.metadata));
    output.push_str(&generate_overall_section(&report.overall));
    output.push_str(&generate_groups_section(&report.groups));

    if config.include_quartiles {
        output.push_str(&generate_quartiles_section(&report.quartiles));
    }
    if config.include_histogram {
        output.push_str(&generate_histogram_section(&report.histogram));
    }
    if config.include_participants {
        output.push_str(&generate_participants_section(&report.participants));
    }

    output.push_str(&generate_footer());

    output
}

/// Generate a JSON report.
pub fn generate_json_report(report: &Report) -> Result<String> {
    serde_json::to_string_pretty(report).map_err(Into::into)
}

fn generate_metadata_section(metadata: &ReportMetadata) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Generated:** {}\n",
        metadata.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Data Source:** {}\n", metadata.data_source));
    section.push_str(&format!(
        "- **Participants:** {}\n",
        metadata.participant_count
    ));
    if metadata.dropped_partial > 0 {
        section.push_str(&format!(
            "- **Dropped (missing a phase):** {}\n",
            metadata.dropped_partial
        ));
    }
    if metadata.dropped_malformed > 0 {
        section.push_str(&format!(
            "- **Dropped (malformed numbers):** {}\n",
            metadata.dropped_malformed
        ));
    }
    if metadata.dropped_filtered > 0 {
        section.push_str(&format!(
            "- **Excluded (group filter):** {}\n",
            metadata.dropped_filtered
        ));
    }
    section.push_str(&format!(
        "- **Duration:** {:.1}s\n\n",
        metadata.duration_seconds
    ));

    section
}

fn generate_overall_section(overall: &OverallStats) -> String {
    let mut section = String::new();

    section.push_str("## Summary\n\n");
    section.push_str(&format!(
        "{} participants ({} speed reading, {} normal reading).\n\n",
        overall.total_participants,
        overall.speed_reading_participants,
        overall.normal_reading_participants
    ));
    section.push_str("| Metric | Phase 1 | Phase 2 |\n");
    section.push_str("|:---|---:|---:|\n");
    section.push_str(&format!(
        "| Mean reading time (s) | {:.1} | {:.1} |\n",
        overall.mean_phase1_time, overall.mean_phase2_time
    ));
    section.push_str(&format!(
        "| Mean score | {:.1} | {:.1} |\n",
        overall.mean_phase1_score, overall.mean_phase2_score
    ));
    section.push_str(&format!(
        "\n**Average improvement:** {:.1}% reading-time reduction\n\n",
        overall.mean_improvement
    ));

    section
}

fn generate_groups_section(groups: &[GroupStats]) -> String {
    let mut section = String::new();

    section.push_str("## Group Statistics\n\n");

    if groups.is_empty() {
        section.push_str("No groups to report.\n\n");
        return section;
    }

    section.push_str(
        "| Group | N | Mean P1 Time | Mean P2 Time | Mean P1 Score | Mean P2 Score \
         | Time Improvement | Accuracy Change |\n",
    );
    section.push_str("|:---:|---:|---:|---:|---:|---:|---:|---:|\n");

    for group in groups {
        section.push_str(&format!(
            "| {} | {} | {:.1}s | {:.1}s | {:.1} | {:.1} | {:.1}% | {:.1}% |\n",
            group.test_group,
            group.participants,
            group.mean_phase1_time,
            group.mean_phase2_time,
            group.mean_phase1_score,
            group.mean_phase2_score,
            group.time_improvement,
            group.accuracy_change
        ));
    }
    section.push('\n');

    section
}

fn generate_quartiles_section(quartiles: &[GroupQuartiles]) -> String {
    let mut section = String::new();

    section.push_str("## Reading-Time Quartiles\n\n");

    if quartiles.is_empty() {
        section.push_str("No data.\n\n");
        return section;
    }

    section.push_str("| Group | Phase | Min | Q1 | Median | Q3 | Max |\n");
    section.push_str("|:---:|:---:|---:|---:|---:|---:|---:|\n");

    for group in quartiles {
        for (label, q) in [("1", &group.phase1), ("2", &group.phase2)] {
            section.push_str(&format!(
                "| {} | {} | {:.1} | {:.1} | {:.1} | {:.1} | {:.1} |\n",
                group.test_group, label, q.min, q.q1, q.median, q.q3, q.max
            ));
        }
    }
    section.push('\n');

    section
}

fn generate_histogram_section(histogram: &ScoreHistogram) -> String {
    let mut section = String::new();

    section.push_str("## Score Distribution\n\n");
    section.push_str("| Score | Phase 1 | Phase 2 |\n");
    section.push_str("|:---:|---:|---:|\n");

    for (score, (p1, p2)) in histogram
        .phase1
        .iter()
        .zip(histogram.phase2.iter())
        .enumerate()
    {
        section.push_str(&format!("| {} | {} | {} |\n", score, p1, p2));
    }
    section.push('\n');

    section
}

fn generate_participants_section(participants: &[ParticipantRecord]) -> String {
    let mut section = String::new();

    section.push_str("## Participants\n\n");

    if participants.is_empty() {
        section.push_str("No participant data available.\n\n");
        return section;
    }

    section.push_str(
        "| Nickname | Group | Technique | P1 Time | P1 Score | P2 Time | P2 Score | Improvement |\n",
    );
    section.push_str("|:---|:---:|:---|---:|---:|---:|---:|---:|\n");

    for p in participants {
        section.push_str(&format!(
            "| {} | {} | {} | {:.1}s | {:.0}/10 | {:.1}s | {:.0}/10 | {:.1}% |\n",
            p.nickname,
            p.test_group,
            p.technique,
            p.phase1_time,
            p.phase1_score,
            p.phase2_time,
            p.phase2_score,
            p.improvement
        ));
    }
    section.push('\n');

    section
}

fn generate_footer() -> String {
    "---\n\n*Report generated by readstat*\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::sample_participants;

    fn test_report() -> Report {
        let reconciled = Reconciled {
            participants: sample_participants(),
            source: ParticipantSource::SampleFallback,
            dropped_partial: 2,
            dropped_malformed: 0,
            dropped_filtered: 1,
        };
        Report::build(&reconciled, 1.5)
    }

    #[test]
    fn test_report_build_derives_all_sections() {
        let report = test_report();

        assert_eq!(report.metadata.participant_count, 5);
        assert_eq!(report.overall.total_participants, 5);
        assert!(!report.groups.is_empty());
        assert!(!report.quartiles.is_empty());
        assert_eq!(report.histogram.phase1.len(), 11);
        // Sample phase-1 scores are 7, 8, 7, 9, 7.
        assert_eq!(report.histogram.phase1[7], 3);
        assert_eq!(report.histogram.phase1[8], 1);
        assert_eq!(report.histogram.phase1[9], 1);
        assert_eq!(report.efficiency.len(), 5);
        assert_eq!(report.participants.len(), 5);
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = test_report();
        let markdown = generate_markdown_report(&report, &ReportConfig::default());

        assert!(markdown.contains("# Reading Study Report"));
        assert!(markdown.contains("## Metadata"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("## Group Statistics"));
        assert!(markdown.contains("## Reading-Time Quartiles"));
        assert!(markdown.contains("## Score Distribution"));
        assert!(markdown.contains("Alice Johnson"));
        assert!(markdown.contains("built-in sample data"));
        assert!(markdown.contains("Dropped (missing a phase):** 2"));
    }

    #[test]
    fn test_markdown_sections_are_optional() {
        let report = test_report();
        let config = ReportConfig {
            include_participants: false,
            include_quartiles: false,
            include_histogram: false,
            ..ReportConfig::default()
        };
        let markdown = generate_markdown_report(&report, &config);

        assert!(!markdown.contains("## Participants"));
        assert!(!markdown.contains("## Reading-Time Quartiles"));
        assert!(!markdown.contains("## Score Distribution"));
        assert!(markdown.contains("## Summary"));
    }

    #[test]
    fn test_generate_markdown_report_empty_set() {
        let reconciled = Reconciled {
            participants: Vec::new(),
            source: ParticipantSource::Nested,
            dropped_partial: 0,
            dropped_malformed: 0,
            dropped_filtered: 0,
        };
        let report = Report::build(&reconciled, 0.1);
        let markdown = generate_markdown_report(&report, &ReportConfig::default());

        assert!(markdown.contains("No participant data available."));
        assert!(markdown.contains("No groups to report."));
    }

    #[test]
    fn test_generate_json_report() {
        let report = test_report();
        let json = generate_json_report(&report).unwrap();

        assert!(json.contains("\"metadata\""));
        assert!(json.contains("\"participants\""));
        assert!(json.contains("\"timeImprovement\""));
        assert!(json.contains("\"dataSource\""));
    }
}
