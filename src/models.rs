//! Data models for the reading-study pipeline.
//!
//! This module contains the two raw shapes the document store hands back
//! (flat session results and nested per-user results) and the canonical
//! participant record everything downstream consumes.

use chrono::{DateTime, Utc};
use serde::de::Deserializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Which source a reconciled participant set came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParticipantSource {
    /// The structured per-user subcollection (preferred).
    Nested,
    /// The legacy flat results collection (fallback).
    Flat,
    /// Built-in demo dataset (last resort, store empty or unreachable).
    SampleFallback,
}

impl fmt::Display for ParticipantSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParticipantSource::Nested => write!(f, "nested user records"),
            ParticipantSource::Flat => write!(f, "flat results collection"),
            ParticipantSource::SampleFallback => write!(f, "built-in sample data"),
        }
    }
}

/// Policy for numeric fields that are missing or not parseable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumberPolicy {
    /// Substitute 0 for anything missing or malformed (legacy behavior).
    /// Can silently skew averages when bad data sneaks in.
    #[default]
    Coerce,
    /// Drop the affected participant instead of inventing a zero.
    Strict,
}

impl NumberPolicy {
    /// Resolve an optional numeric field under this policy.
    ///
    /// Returns `None` only under `Strict` when the value is absent; under
    /// `Coerce` every input resolves to a finite number.
    pub fn resolve(&self, value: Option<f64>) -> Option<f64> {
        let finite = value.filter(|v| v.is_finite());
        match self {
            NumberPolicy::Coerce => Some(finite.unwrap_or(0.0)),
            NumberPolicy::Strict => finite,
        }
    }
}

/// One row of the legacy flat `reading_study_results` collection.
///
/// One document per (session, phase). The store has accumulated documents
/// with missing or string-typed numeric fields, so every numeric field is
/// optional and decoded leniently.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawResultRecord {
    pub session_id: Option<String>,
    pub nickname: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub phase: Option<i64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub reading_time: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub total_questions: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub mistake_ratio: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub test_group: Option<i64>,
    pub technique: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A single phase's measurements inside a user's `results` subcollection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PhaseResult {
    #[serde(deserialize_with = "lenient_f64")]
    pub reading_time: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub score: Option<f64>,
    #[serde(deserialize_with = "lenient_f64")]
    pub mistake_ratio: Option<f64>,
}

/// A document from the `users` collection plus its `results` subcollection.
///
/// The `id` is the document id, filled in by the store layer after decoding
/// the fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    #[serde(skip_deserializing)]
    pub id: String,
    pub nickname: Option<String>,
    #[serde(deserialize_with = "lenient_i64")]
    pub test_group: Option<i64>,
    pub technique: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub results: UserResults,
}

/// The two phase documents of a user's `results` subcollection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserResults {
    pub phase1: Option<PhaseResult>,
    pub phase2: Option<PhaseResult>,
}

impl UserRecord {
    /// Whether both phases have been recorded for this user.
    pub fn is_complete(&self) -> bool {
        self.results.phase1.is_some() && self.results.phase2.is_some()
    }
}

/// Canonical per-participant record produced by the reconciler.
///
/// Exists only when both phases are present; partial participants are
/// dropped during reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
    pub id: String,
    pub nickname: String,
    pub test_group: i64,
    pub technique: String,
    pub phase1_time: f64,
    pub phase1_score: f64,
    pub phase2_time: f64,
    pub phase2_score: f64,
    pub phase1_mistake_ratio: f64,
    pub phase2_mistake_ratio: f64,
    pub timestamp: DateTime<Utc>,
    pub improvement: f64,
}

/// Reading-time improvement as a percentage of the phase-1 time.
///
/// Zero phase-1 time short-circuits to 0 rather than dividing by zero.
pub fn improvement_pct(phase1_time: f64, phase2_time: f64) -> f64 {
    if phase1_time == 0.0 {
        0.0
    } else {
        (phase1_time - phase2_time) / phase1_time * 100.0
    }
}

/// Comprehension per second, scaled: `score / readingTime * 100`.
pub fn efficiency(score: f64, reading_time: f64) -> f64 {
    if reading_time == 0.0 {
        0.0
    } else {
        score / reading_time * 100.0
    }
}

/// Accept a JSON number or a numeric string; anything else decodes as `None`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64))
}

/// Like [`lenient_f64`] but truncates to an integer.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(coerce_f64).map(|v| v as i64))
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}
