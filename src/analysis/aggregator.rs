//! Participant aggregation and statistics.
//!
//! All functions are total over their input: an empty participant set
//! produces zeroed/empty defaults rather than an error, because a dashboard
//! with no data is still a valid dashboard.

use crate::models::{efficiency, improvement_pct, ParticipantRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Highest attainable quiz score; the histogram has `MAX_SCORE + 1` buckets.
pub const MAX_SCORE: usize = 10;

/// Test groups above this number use normal (untrained) reading.
const SPEED_GROUP_CEILING: i64 = 3;

/// Population-level means across all participants.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
    pub total_participants: usize,
    pub speed_reading_participants: usize,
    pub normal_reading_participants: usize,
    pub mean_phase1_time: f64,
    pub mean_phase2_time: f64,
    pub mean_phase1_score: f64,
    pub mean_phase2_score: f64,
    pub mean_improvement: f64,
}

/// Means and derived deltas for one test group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupStats {
    pub test_group: i64,
    pub participants: usize,
    pub mean_phase1_time: f64,
    pub mean_phase2_time: f64,
    pub mean_phase1_score: f64,
    pub mean_phase2_score: f64,
    pub mean_improvement: f64,
    /// Reading-time reduction between the group's phase means, in percent.
    pub time_improvement: f64,
    /// Mistake-ratio reduction between the group's phase means, in percent.
    pub accuracy_change: f64,
}

/// Nearest-rank five-number summary.
///
/// Indices are `floor(n * q)` on the ascending-sorted values, never
/// interpolated; chart parity with the historical exports depends on this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Quartiles {
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Box-plot data for one group, both phases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuartiles {
    pub test_group: i64,
    pub phase1: Quartiles,
    pub phase2: Quartiles,
}

/// Score frequencies for integer scores `0..=MAX_SCORE`, per phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreHistogram {
    pub phase1: Vec<usize>,
    pub phase2: Vec<usize>,
}

/// Comprehension-per-second figures for one participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EfficiencyPoint {
    pub id: String,
    pub nickname: String,
    pub test_group: i64,
    pub phase1_efficiency: f64,
    pub phase2_efficiency: f64,
}

/// One point of a scatter projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
}

/// Scatter points for one test group. No fitting is performed; trend
/// interpretation is left to the viewer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScatterSeries {
    pub test_group: i64,
    pub points: Vec<ScatterPoint>,
}

/// Population means over all participants.
pub fn overall_stats(participants: &[ParticipantRecord]) -> OverallStats {
    if participants.is_empty() {
        return OverallStats::default();
    }

    OverallStats {
        total_participants: participants.len(),
        speed_reading_participants: participants
            .iter()
            .filter(|p| p.test_group <= SPEED_GROUP_CEILING)
            .count(),
        normal_reading_participants: participants
            .iter()
            .filter(|p| p.test_group > SPEED_GROUP_CEILING)
            .count(),
        mean_phase1_time: mean(participants.iter().map(|p| p.phase1_time)),
        mean_phase2_time: mean(participants.iter().map(|p| p.phase2_time)),
        mean_phase1_score: mean(participants.iter().map(|p| p.phase1_score)),
        mean_phase2_score: mean(participants.iter().map(|p| p.phase2_score)),
        mean_improvement: mean(participants.iter().map(|p| p.improvement)),
    }
}

/// Per-group means plus the two derived deltas, sorted by group number.
pub fn group_stats(participants: &[ParticipantRecord]) -> Vec<GroupStats> {
    partition_by_group(participants)
        .into_iter()
        .map(|(group, members)| {
            let mean_p1_time = mean(members.iter().map(|p| p.phase1_time));
            let mean_p2_time = mean(members.iter().map(|p| p.phase2_time));
            let mean_p1_mistakes = mean(members.iter().map(|p| p.phase1_mistake_ratio));
            let mean_p2_mistakes = mean(members.iter().map(|p| p.phase2_mistake_ratio));

            GroupStats {
                test_group: group,
                participants: members.len(),
                mean_phase1_time: mean_p1_time,
                mean_phase2_time: mean_p2_time,
                mean_phase1_score: mean(members.iter().map(|p| p.phase1_score)),
                mean_phase2_score: mean(members.iter().map(|p| p.phase2_score)),
                mean_improvement: mean(members.iter().map(|p| p.improvement)),
                time_improvement: improvement_pct(mean_p1_time, mean_p2_time),
                accuracy_change: ratio_delta_pct(mean_p1_mistakes, mean_p2_mistakes),
            }
        })
        .collect()
}

/// Box-plot quartiles of reading times per group, both phases.
pub fn quartile_summary(participants: &[ParticipantRecord]) -> Vec<GroupQuartiles> {
    partition_by_group(participants)
        .into_iter()
        .map(|(group, members)| GroupQuartiles {
            test_group: group,
            phase1: nearest_rank_quartiles(members.iter().map(|p| p.phase1_time).collect()),
            phase2: nearest_rank_quartiles(members.iter().map(|p| p.phase2_time).collect()),
        })
        .collect()
}

/// Counts of participants at each integer score `0..=MAX_SCORE`, per phase.
/// Scores outside the range are ignored.
pub fn score_histogram(participants: &[ParticipantRecord]) -> ScoreHistogram {
    let mut histogram = ScoreHistogram {
        phase1: vec![0; MAX_SCORE + 1],
        phase2: vec![0; MAX_SCORE + 1],
    };

    for p in participants {
        if let Some(bucket) = score_bucket(p.phase1_score) {
            histogram.phase1[bucket] += 1;
        }
        if let Some(bucket) = score_bucket(p.phase2_score) {
            histogram.phase2[bucket] += 1;
        }
    }

    histogram
}

/// Per-participant comprehension-per-second figures.
pub fn efficiency_points(participants: &[ParticipantRecord]) -> Vec<EfficiencyPoint> {
    participants
        .iter()
        .map(|p| EfficiencyPoint {
            id: p.id.clone(),
            nickname: p.nickname.clone(),
            test_group: p.test_group,
            phase1_efficiency: efficiency(p.phase1_score, p.phase1_time),
            phase2_efficiency: efficiency(p.phase2_score, p.phase2_time),
        })
        .collect()
}

/// `(phase1Time, improvement)` pairs grouped by test group.
pub fn improvement_scatter(participants: &[ParticipantRecord]) -> Vec<ScatterSeries> {
    scatter_by_group(participants, |p| ScatterPoint {
        x: p.phase1_time,
        y: p.improvement,
    })
}

/// `(phase2Time, phase-2 efficiency)` pairs grouped by test group.
pub fn comprehension_scatter(participants: &[ParticipantRecord]) -> Vec<ScatterSeries> {
    scatter_by_group(participants, |p| ScatterPoint {
        x: p.phase2_time,
        y: efficiency(p.phase2_score, p.phase2_time),
    })
}

fn scatter_by_group(
    participants: &[ParticipantRecord],
    project: impl Fn(&ParticipantRecord) -> ScatterPoint,
) -> Vec<ScatterSeries> {
    partition_by_group(participants)
        .into_iter()
        .map(|(group, members)| ScatterSeries {
            test_group: group,
            points: members.iter().map(|p| project(p)).collect(),
        })
        .collect()
}

/// Partition by test group, ordered by group number.
fn partition_by_group(
    participants: &[ParticipantRecord],
) -> BTreeMap<i64, Vec<&ParticipantRecord>> {
    let mut groups: BTreeMap<i64, Vec<&ParticipantRecord>> = BTreeMap::new();
    for p in participants {
        groups.entry(p.test_group).or_default().push(p);
    }
    groups
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// `(before - after) / before * 100`, short-circuiting to 0 when the
/// denominator is 0.
fn ratio_delta_pct(before: f64, after: f64) -> f64 {
    if before == 0.0 {
        0.0
    } else {
        (before - after) / before * 100.0
    }
}

/// Index-based quartiles: `q1 = a[floor(n*0.25)]`, `median = a[floor(n*0.5)]`,
/// `q3 = a[floor(n*0.75)]`.
fn nearest_rank_quartiles(mut values: Vec<f64>) -> Quartiles {
    if values.is_empty() {
        return Quartiles::default();
    }

    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();

    Quartiles {
        min: values[0],
        q1: values[(n as f64 * 0.25).floor() as usize],
        median: values[(n as f64 * 0.5).floor() as usize],
        q3: values[(n as f64 * 0.75).floor() as usize],
        max: values[n - 1],
    }
}

fn score_bucket(score: f64) -> Option<usize> {
    let rounded = score.round();
    if (0.0..=MAX_SCORE as f64).contains(&rounded) {
        Some(rounded as usize)
    } else {
        None
    }
}
