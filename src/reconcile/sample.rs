//! Built-in demo dataset.
//!
//! Used when the store is unreachable or holds no complete participants so
//! reports and exports always have something to show. Explicitly a demo
//! fallback, never mixed with real data.

use crate::models::{improvement_pct, ParticipantRecord};
use chrono::{TimeZone, Utc};

struct SampleRow {
    id: &'static str,
    nickname: &'static str,
    test_group: i64,
    technique: &'static str,
    phase1_time: f64,
    phase1_score: f64,
    phase2_time: f64,
    phase2_score: f64,
    phase1_mistake_ratio: f64,
    phase2_mistake_ratio: f64,
    day: u32,
}

const SAMPLE_ROWS: &[SampleRow] = &[
    SampleRow {
        id: "sample-1",
        nickname: "Alice Johnson",
        test_group: 1,
        technique: "Speed Reading",
        phase1_time: 180.0,
        phase1_score: 7.0,
        phase2_time: 120.0,
        phase2_score: 8.0,
        phase1_mistake_ratio: 0.15,
        phase2_mistake_ratio: 0.08,
        day: 15,
    },
    SampleRow {
        id: "sample-2",
        nickname: "Bob Smith",
        test_group: 4,
        technique: "Normal Reading",
        phase1_time: 200.0,
        phase1_score: 8.0,
        phase2_time: 190.0,
        phase2_score: 8.0,
        phase1_mistake_ratio: 0.12,
        phase2_mistake_ratio: 0.10,
        day: 16,
    },
    SampleRow {
        id: "sample-3",
        nickname: "Carol Davis",
        test_group: 2,
        technique: "Speed Reading",
        phase1_time: 170.0,
        phase1_score: 7.0,
        phase2_time: 100.0,
        phase2_score: 9.0,
        phase1_mistake_ratio: 0.18,
        phase2_mistake_ratio: 0.06,
        day: 17,
    },
    SampleRow {
        id: "sample-4",
        nickname: "David Wilson",
        test_group: 4,
        technique: "Normal Reading",
        phase1_time: 220.0,
        phase1_score: 9.0,
        phase2_time: 210.0,
        phase2_score: 9.0,
        phase1_mistake_ratio: 0.10,
        phase2_mistake_ratio: 0.08,
        day: 18,
    },
    SampleRow {
        id: "sample-5",
        nickname: "Eva Brown",
        test_group: 3,
        technique: "Speed Reading",
        phase1_time: 160.0,
        phase1_score: 7.0,
        phase2_time: 95.0,
        phase2_score: 9.0,
        phase1_mistake_ratio: 0.20,
        phase2_mistake_ratio: 0.07,
        day: 19,
    },
];

/// The fixed demo participant set.
pub fn sample_participants() -> Vec<ParticipantRecord> {
    SAMPLE_ROWS
        .iter()
        .map(|row| ParticipantRecord {
            id: row.id.to_string(),
            nickname: row.nickname.to_string(),
            test_group: row.test_group,
            technique: row.technique.to_string(),
            phase1_time: row.phase1_time,
            phase1_score: row.phase1_score,
            phase2_time: row.phase2_time,
            phase2_score: row.phase2_score,
            phase1_mistake_ratio: row.phase1_mistake_ratio,
            phase2_mistake_ratio: row.phase2_mistake_ratio,
            timestamp: Utc.with_ymd_and_hms(2024, 1, row.day, 12, 0, 0).unwrap(),
            improvement: improvement_pct(row.phase1_time, row.phase2_time),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_participants_are_complete() {
        let participants = sample_participants();

        assert_eq!(participants.len(), 5);
        for p in &participants {
            assert!(p.phase1_time > 0.0);
            assert!(p.phase2_time > 0.0);
            assert_eq!(
                p.improvement,
                (p.phase1_time - p.phase2_time) / p.phase1_time * 100.0
            );
        }
    }

    #[test]
    fn test_sample_covers_speed_and_normal_groups() {
        let participants = sample_participants();

        assert!(participants.iter().any(|p| p.test_group <= 3));
        assert!(participants.iter().any(|p| p.test_group == 4));
    }
}
