//! Ingestion reconciler.
//!
//! The store holds study results in two inconsistent shapes: a structured
//! per-user subcollection and a legacy flat collection with one document per
//! (session, phase). This module merges them into one canonical participant
//! set under a strict precedence rule: nested beats flat, and a built-in
//! sample dataset is the last resort so downstream consumers always have
//! something to render.
//!
//! Everything here is pure over already-fetched in-memory inputs; fetching
//! lives in [`crate::store`].

mod sample;

pub use sample::sample_participants;

use crate::models::{
    improvement_pct, NumberPolicy, ParticipantRecord, ParticipantSource, PhaseResult,
    RawResultRecord, UserRecord,
};
use chrono::Utc;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Knobs for the reconciliation pass.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    /// Participants with `testGroup` above this are excluded.
    /// Deployments have used 2, 3, and 4 (4 = keep everything).
    pub group_ceiling: i64,
    /// How missing/malformed numeric fields are handled.
    pub policy: NumberPolicy,
    /// Substituted when a record carries no technique label.
    pub default_technique: String,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            group_ceiling: 4,
            policy: NumberPolicy::Coerce,
            default_technique: "Speed Reading".to_string(),
        }
    }
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone)]
pub struct Reconciled {
    /// Complete participants, one per user/session.
    pub participants: Vec<ParticipantRecord>,
    /// Which source actually produced the set.
    pub source: ParticipantSource,
    /// Participants dropped for lacking one phase.
    pub dropped_partial: usize,
    /// Participants dropped under [`NumberPolicy::Strict`].
    pub dropped_malformed: usize,
    /// Participants excluded by the group ceiling.
    pub dropped_filtered: usize,
}

/// Merge both sources into one canonical participant set.
///
/// Tries the nested user records first, falls back to the flat collection
/// only when the nested source yields zero complete participants, and
/// substitutes the sample dataset when both are empty.
pub fn reconcile(
    users: &[UserRecord],
    flat_results: &[RawResultRecord],
    options: &ReconcileOptions,
) -> Reconciled {
    let mut result = from_nested(users, options);

    if result.participants.is_empty() {
        debug!("Nested source yielded no complete participants, trying flat collection");
        result = from_flat(flat_results, options);
    }

    if result.participants.is_empty() {
        warn!("No complete participants in either source, using built-in sample data");
        result = Reconciled {
            participants: sample_participants(),
            source: ParticipantSource::SampleFallback,
            dropped_partial: result.dropped_partial,
            dropped_malformed: result.dropped_malformed,
            dropped_filtered: result.dropped_filtered,
        };
    }

    debug!(
        "Reconciled {} participants from {}",
        result.participants.len(),
        result.source
    );

    result
}

/// Step 1: the structured per-user source.
fn from_nested(users: &[UserRecord], options: &ReconcileOptions) -> Reconciled {
    let mut out = Reconciled {
        participants: Vec::new(),
        source: ParticipantSource::Nested,
        dropped_partial: 0,
        dropped_malformed: 0,
        dropped_filtered: 0,
    };

    for user in users {
        let (phase1, phase2) = match (&user.results.phase1, &user.results.phase2) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                out.dropped_partial += 1;
                continue;
            }
        };

        let test_group = match resolve_group(user.test_group, options) {
            Some(g) => g,
            None => {
                out.dropped_malformed += 1;
                continue;
            }
        };
        if test_group > options.group_ceiling {
            out.dropped_filtered += 1;
            continue;
        }

        let (p1, p2) = match (
            resolve_phase(phase1, options.policy),
            resolve_phase(phase2, options.policy),
        ) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                out.dropped_malformed += 1;
                continue;
            }
        };

        out.participants.push(ParticipantRecord {
            id: user.id.clone(),
            nickname: user
                .nickname
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| default_nickname(&user.id)),
            test_group,
            technique: user
                .technique
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| options.default_technique.clone()),
            phase1_time: p1.time,
            phase1_score: p1.score,
            phase2_time: p2.time,
            phase2_score: p2.score,
            phase1_mistake_ratio: p1.mistake_ratio,
            phase2_mistake_ratio: p2.mistake_ratio,
            timestamp: user.created_at.unwrap_or_else(Utc::now),
            improvement: improvement_pct(p1.time, p2.time),
        });
    }

    out
}

/// Step 2: the legacy flat source.
///
/// Records are walked most-recent-first; the first record seen for a session
/// establishes the identity fields, and the first record seen for a phase
/// wins, so a re-run of a phase supersedes older entries.
fn from_flat(flat_results: &[RawResultRecord], options: &ReconcileOptions) -> Reconciled {
    let mut out = Reconciled {
        participants: Vec::new(),
        source: ParticipantSource::Flat,
        dropped_partial: 0,
        dropped_malformed: 0,
        dropped_filtered: 0,
    };

    let mut ordered: Vec<&RawResultRecord> = flat_results.iter().collect();
    ordered.sort_by_key(|r| std::cmp::Reverse(r.timestamp));

    // session id -> (identity record, phase1, phase2), insertion-ordered
    let mut sessions: Vec<String> = Vec::new();
    let mut merged: HashMap<String, SessionMerge<'_>> = HashMap::new();

    for record in ordered {
        let session_id = match record.session_id.as_deref() {
            Some(id) if !id.is_empty() => id,
            _ => {
                debug!("Skipping flat record without sessionId");
                continue;
            }
        };

        let entry = merged.entry(session_id.to_string()).or_insert_with(|| {
            sessions.push(session_id.to_string());
            SessionMerge {
                first: record,
                phase1: None,
                phase2: None,
            }
        });

        match record.phase {
            Some(1) if entry.phase1.is_none() => entry.phase1 = Some(record),
            Some(2) if entry.phase2.is_none() => entry.phase2 = Some(record),
            Some(1) | Some(2) => debug!("Ignoring superseded phase entry for {}", session_id),
            _ => debug!("Skipping flat record with unknown phase for {}", session_id),
        }
    }

    for session_id in sessions {
        let entry = &merged[&session_id];

        let (phase1, phase2) = match (entry.phase1, entry.phase2) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                out.dropped_partial += 1;
                continue;
            }
        };

        let test_group = match resolve_group(entry.first.test_group, options) {
            Some(g) => g,
            None => {
                out.dropped_malformed += 1;
                continue;
            }
        };
        if test_group > options.group_ceiling {
            out.dropped_filtered += 1;
            continue;
        }

        let (p1, p2) = match (
            resolve_raw_phase(phase1, options.policy),
            resolve_raw_phase(phase2, options.policy),
        ) {
            (Some(p1), Some(p2)) => (p1, p2),
            _ => {
                out.dropped_malformed += 1;
                continue;
            }
        };

        out.participants.push(ParticipantRecord {
            id: session_id.clone(),
            nickname: entry
                .first
                .nickname
                .clone()
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| default_nickname(&session_id)),
            test_group,
            technique: entry
                .first
                .technique
                .clone()
                .filter(|t| !t.is_empty())
                .unwrap_or_else(|| options.default_technique.clone()),
            phase1_time: p1.time,
            phase1_score: p1.score,
            phase2_time: p2.time,
            phase2_score: p2.score,
            phase1_mistake_ratio: p1.mistake_ratio,
            phase2_mistake_ratio: p2.mistake_ratio,
            timestamp: entry.first.timestamp.unwrap_or_else(Utc::now),
            improvement: improvement_pct(p1.time, p2.time),
        });
    }

    out
}

struct SessionMerge<'a> {
    first: &'a RawResultRecord,
    phase1: Option<&'a RawResultRecord>,
    phase2: Option<&'a RawResultRecord>,
}

/// Resolved numeric measurements for one phase.
struct ResolvedPhase {
    time: f64,
    score: f64,
    mistake_ratio: f64,
}

fn resolve_phase(phase: &PhaseResult, policy: NumberPolicy) -> Option<ResolvedPhase> {
    Some(ResolvedPhase {
        time: policy.resolve(phase.reading_time)?,
        score: policy.resolve(phase.score)?,
        mistake_ratio: policy.resolve(phase.mistake_ratio)?,
    })
}

fn resolve_raw_phase(record: &RawResultRecord, policy: NumberPolicy) -> Option<ResolvedPhase> {
    Some(ResolvedPhase {
        time: policy.resolve(record.reading_time)?,
        score: policy.resolve(record.score)?,
        mistake_ratio: policy.resolve(record.mistake_ratio)?,
    })
}

fn resolve_group(group: Option<i64>, options: &ReconcileOptions) -> Option<i64> {
    options
        .policy
        .resolve(group.map(|g| g as f64))
        .map(|g| g as i64)
}

fn default_nickname(id: &str) -> String {
    let prefix: String = id.chars().take(6).collect();
    format!("User {}", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PhaseResult, UserResults};
    use chrono::TimeZone;

    fn phase(time: f64, score: f64, mistakes: f64) -> PhaseResult {
        PhaseResult {
            reading_time: Some(time),
            score: Some(score),
            mistake_ratio: Some(mistakes),
        }
    }

    fn user(id: &str, group: i64, p1: Option<PhaseResult>, p2: Option<PhaseResult>) -> UserRecord {
        UserRecord {
            id: id.to_string(),
            nickname: Some(format!("nick-{}", id)),
            test_group: Some(group),
            technique: Some("Speed Reading".to_string()),
            created_at: None,
            results: UserResults {
                phase1: p1,
                phase2: p2,
            },
        }
    }

    fn flat(
        session: &str,
        phase_no: i64,
        time: f64,
        score: f64,
        ts_day: u32,
    ) -> RawResultRecord {
        RawResultRecord {
            session_id: Some(session.to_string()),
            nickname: Some(format!("nick-{}", session)),
            phase: Some(phase_no),
            reading_time: Some(time),
            score: Some(score),
            total_questions: Some(10.0),
            mistake_ratio: Some((10.0 - score) / 10.0),
            test_group: Some(1),
            technique: Some("Speed Reading".to_string()),
            timestamp: Some(Utc.with_ymd_and_hms(2024, 1, ts_day, 0, 0, 0).unwrap()),
        }
    }

    #[test]
    fn test_nested_drops_partial_participants() {
        let users = vec![
            user("u1", 1, Some(phase(120.0, 8.0, 0.2)), Some(phase(90.0, 9.0, 0.1))),
            user("u2", 1, Some(phase(150.0, 7.0, 0.3)), None),
        ];

        let result = reconcile(&users, &[], &ReconcileOptions::default());

        assert_eq!(result.source, ParticipantSource::Nested);
        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].id, "u1");
        assert_eq!(result.dropped_partial, 1);
    }

    #[test]
    fn test_improvement_computed_for_nested() {
        let users = vec![user(
            "u1",
            1,
            Some(phase(120.0, 8.0, 0.2)),
            Some(phase(90.0, 9.0, 0.1)),
        )];

        let result = reconcile(&users, &[], &ReconcileOptions::default());
        assert_eq!(result.participants[0].improvement, 25.0);
    }

    #[test]
    fn test_nested_beats_flat_precedence() {
        let users = vec![user(
            "u1",
            1,
            Some(phase(120.0, 8.0, 0.2)),
            Some(phase(90.0, 9.0, 0.1)),
        )];
        // Flat source has a different, complete session; it must be ignored.
        let flat_records = vec![flat("s1", 1, 200.0, 5.0, 1), flat("s1", 2, 180.0, 6.0, 2)];

        let result = reconcile(&users, &flat_records, &ReconcileOptions::default());

        assert_eq!(result.source, ParticipantSource::Nested);
        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].id, "u1");
    }

    #[test]
    fn test_flat_fallback_merges_sessions() {
        let flat_records = vec![
            flat("s1", 1, 120.0, 8.0, 1),
            flat("s1", 2, 90.0, 9.0, 2),
            flat("s2", 1, 150.0, 7.0, 3), // phase 2 never recorded
        ];

        let result = reconcile(&[], &flat_records, &ReconcileOptions::default());

        assert_eq!(result.source, ParticipantSource::Flat);
        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].id, "s1");
        assert_eq!(result.participants[0].improvement, 25.0);
        assert_eq!(result.dropped_partial, 1);
    }

    #[test]
    fn test_flat_most_recent_phase_wins() {
        // Two phase-1 entries for the same session; the newer one (day 5)
        // must win over the day-1 entry.
        let flat_records = vec![
            flat("s1", 1, 300.0, 4.0, 1),
            flat("s1", 1, 120.0, 8.0, 5),
            flat("s1", 2, 90.0, 9.0, 6),
        ];

        let result = reconcile(&[], &flat_records, &ReconcileOptions::default());

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].phase1_time, 120.0);
    }

    #[test]
    fn test_group_ceiling_filter() {
        let users = vec![
            user("u1", 2, Some(phase(120.0, 8.0, 0.2)), Some(phase(90.0, 9.0, 0.1))),
            user("u2", 4, Some(phase(130.0, 8.0, 0.2)), Some(phase(95.0, 9.0, 0.1))),
        ];

        let options = ReconcileOptions {
            group_ceiling: 3,
            ..ReconcileOptions::default()
        };
        let result = reconcile(&users, &[], &options);

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].id, "u1");
        assert_eq!(result.dropped_filtered, 1);
    }

    #[test]
    fn test_coerce_policy_zero_fills() {
        let users = vec![user(
            "u1",
            1,
            Some(PhaseResult {
                reading_time: Some(120.0),
                score: None,
                mistake_ratio: None,
            }),
            Some(phase(90.0, 9.0, 0.1)),
        )];

        let result = reconcile(&users, &[], &ReconcileOptions::default());

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].phase1_score, 0.0);
        assert_eq!(result.participants[0].phase1_mistake_ratio, 0.0);
    }

    #[test]
    fn test_strict_policy_drops_malformed() {
        let users = vec![
            user(
                "u1",
                1,
                Some(PhaseResult {
                    reading_time: Some(120.0),
                    score: None,
                    mistake_ratio: Some(0.2),
                }),
                Some(phase(90.0, 9.0, 0.1)),
            ),
            user("u2", 1, Some(phase(150.0, 7.0, 0.3)), Some(phase(100.0, 8.0, 0.2))),
        ];

        let options = ReconcileOptions {
            policy: NumberPolicy::Strict,
            ..ReconcileOptions::default()
        };
        let result = reconcile(&users, &[], &options);

        assert_eq!(result.participants.len(), 1);
        assert_eq!(result.participants[0].id, "u2");
        assert_eq!(result.dropped_malformed, 1);
    }

    #[test]
    fn test_sample_fallback_when_both_sources_empty() {
        let result = reconcile(&[], &[], &ReconcileOptions::default());

        assert_eq!(result.source, ParticipantSource::SampleFallback);
        assert!(!result.participants.is_empty());
    }

    #[test]
    fn test_default_nickname_and_technique() {
        let users = vec![UserRecord {
            id: "abcdef123456".to_string(),
            nickname: None,
            test_group: Some(1),
            technique: None,
            created_at: None,
            results: UserResults {
                phase1: Some(phase(120.0, 8.0, 0.2)),
                phase2: Some(phase(90.0, 9.0, 0.1)),
            },
        }];

        let result = reconcile(&users, &[], &ReconcileOptions::default());

        assert_eq!(result.participants[0].nickname, "User abcdef");
        assert_eq!(result.participants[0].technique, "Speed Reading");
    }

    #[test]
    fn test_no_partial_participant_ever_emitted() {
        let users = vec![
            user("u1", 1, Some(phase(120.0, 8.0, 0.2)), None),
            user("u2", 1, None, Some(phase(90.0, 9.0, 0.1))),
            user("u3", 1, None, None),
        ];
        let flat_records = vec![flat("s1", 2, 90.0, 9.0, 1)];

        let result = reconcile(&users, &flat_records, &ReconcileOptions::default());

        // Both real sources are incomplete, so only the sample set remains.
        assert_eq!(result.source, ParticipantSource::SampleFallback);
    }
}
