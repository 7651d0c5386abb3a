//! CSV export.
//!
//! Column set and formatting match the historical dashboard export:
//! times to one decimal, improvement to two, timestamps in RFC 3339.

use crate::models::ParticipantRecord;
use anyhow::{Context, Result};

const CSV_HEADER: [&str; 9] = [
    "Nickname",
    "Test Group",
    "Technique",
    "Phase 1 Time",
    "Phase 1 Score",
    "Phase 2 Time",
    "Phase 2 Score",
    "Improvement %",
    "Timestamp",
];

/// Render the participant set as CSV.
pub fn generate_csv(participants: &[ParticipantRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer
        .write_record(CSV_HEADER)
        .context("Failed to write CSV header")?;

    for p in participants {
        writer
            .write_record([
                p.nickname.clone(),
                p.test_group.to_string(),
                p.technique.clone(),
                format!("{:.1}", p.phase1_time),
                format!("{:.0}", p.phase1_score),
                format!("{:.1}", p.phase2_time),
                format!("{:.0}", p.phase2_score),
                format!("{:.2}", p.improvement),
                p.timestamp.to_rfc3339(),
            ])
            .with_context(|| format!("Failed to write CSV row for {}", p.id))?;
    }

    let bytes = writer.into_inner().context("Failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::improvement_pct;
    use chrono::{TimeZone, Utc};

    fn participant() -> ParticipantRecord {
        ParticipantRecord {
            id: "u1".to_string(),
            nickname: "Alice".to_string(),
            test_group: 1,
            technique: "Speed Reading".to_string(),
            phase1_time: 120.0,
            phase1_score: 8.0,
            phase2_time: 90.0,
            phase2_score: 9.0,
            phase1_mistake_ratio: 0.2,
            phase2_mistake_ratio: 0.1,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap(),
            improvement: improvement_pct(120.0, 90.0),
        }
    }

    #[test]
    fn test_csv_header_row() {
        let csv = generate_csv(&[]).unwrap();
        assert_eq!(
            csv.trim_end(),
            "Nickname,Test Group,Technique,Phase 1 Time,Phase 1 Score,\
             Phase 2 Time,Phase 2 Score,Improvement %,Timestamp"
        );
    }

    #[test]
    fn test_csv_row_formatting() {
        let csv = generate_csv(&[participant()]).unwrap();
        let row = csv.lines().nth(1).unwrap();

        assert_eq!(
            row,
            "Alice,1,Speed Reading,120.0,8,90.0,9,25.00,2024-01-15T12:00:00+00:00"
        );
    }

    #[test]
    fn test_csv_one_row_per_participant() {
        let participants = vec![participant(), participant()];
        let csv = generate_csv(&participants).unwrap();
        assert_eq!(csv.lines().count(), 3);
    }
}
