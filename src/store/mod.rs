//! Document-store access.
//!
//! Everything the pipeline needs from the hosted store is expressed through
//! the [`DocumentStore`] trait: list all documents of a collection, list a
//! named subcollection under a parent document, and the two write
//! primitives. The HTTP implementation lives in [`client`]; reconciliation
//! and aggregation never touch this layer.

pub mod client;

pub use client::HttpDocumentStore;

use crate::config::StoreConfig;
use crate::models::{PhaseResult, RawResultRecord, UserRecord, UserResults};
use chrono::Utc;
use futures::future::join_all;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from the store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned status {status} for {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("could not decode store response from {url}: {message}")]
    Decode { url: String, message: String },
}

/// A document as the store returns it: an id plus an untyped field map.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub fields: Value,
}

/// Read/write contract against the hosted document store.
///
/// The pipeline awaits these futures in place and never spawns them, so no
/// `Send` bound is required.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// All documents of a collection. `collection` may be a nested path
    /// such as `users/{id}/results`.
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError>;

    /// Append a new document with a store-assigned id; returns the id.
    async fn create_document(&self, collection: &str, fields: Value)
        -> Result<String, StoreError>;

    /// Create or overwrite the document with the given id.
    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError>;
}

/// Both raw sources, freshly fetched.
#[derive(Debug, Default)]
pub struct FetchedSources {
    pub users: Vec<UserRecord>,
    pub flat_results: Vec<RawResultRecord>,
    /// Documents that could not be decoded at all.
    pub undecodable: usize,
}

/// Fetch the flat collection and the per-user subcollections.
///
/// Each snapshot is independent and wholly replaces prior state; nothing is
/// cached between calls. The per-user subcollection fetches carry no
/// ordering dependency, so they are issued concurrently.
pub async fn fetch_sources(
    store: &impl DocumentStore,
    config: &StoreConfig,
    show_progress: bool,
) -> Result<FetchedSources, StoreError> {
    let mut fetched = FetchedSources::default();

    // Legacy flat collection, most recent first.
    let flat_docs = store.list_documents(&config.results_collection).await?;
    debug!(
        "Fetched {} documents from {}",
        flat_docs.len(),
        config.results_collection
    );
    for doc in flat_docs {
        match decode_fields::<RawResultRecord>(&doc) {
            Some(record) => fetched.flat_results.push(record),
            None => fetched.undecodable += 1,
        }
    }
    fetched
        .flat_results
        .sort_by_key(|r| std::cmp::Reverse(r.timestamp));

    // Structured users collection plus one subcollection fetch per user.
    let user_docs = store.list_documents(&config.users_collection).await?;
    debug!(
        "Fetched {} documents from {}",
        user_docs.len(),
        config.users_collection
    );

    let progress = subcollection_progress(user_docs.len() as u64, show_progress);

    let fetches = user_docs.iter().map(|doc| {
        let path = format!(
            "{}/{}/{}",
            config.users_collection, doc.id, config.results_subcollection
        );
        let progress = progress.clone();
        async move {
            let result = store.list_documents(&path).await;
            progress.inc(1);
            (doc, result)
        }
    });

    for (doc, result) in join_all(fetches).await {
        let mut user = match decode_fields::<UserRecord>(doc) {
            Some(user) => user,
            None => {
                fetched.undecodable += 1;
                continue;
            }
        };
        user.id = doc.id.clone();
        user.results = match result {
            Ok(phase_docs) => decode_phases(&phase_docs, &mut fetched.undecodable),
            Err(e) => {
                // A missing subcollection just means an incomplete user.
                warn!("Could not fetch results for user {}: {}", doc.id, e);
                UserResults::default()
            }
        };
        fetched.users.push(user);
    }

    progress.finish_and_clear();

    if fetched.undecodable > 0 {
        warn!("Skipped {} undecodable documents", fetched.undecodable);
    }
    info!(
        "Fetched {} users and {} flat results",
        fetched.users.len(),
        fetched.flat_results.len()
    );

    Ok(fetched)
}

/// A manually entered participant, persisted in both storage shapes the way
/// the study flow writes them.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualEntry {
    pub nickname: String,
    pub test_group: i64,
    pub phase1_time: f64,
    pub phase1_score: f64,
    pub phase2_time: f64,
    pub phase2_score: f64,
}

impl ManualEntry {
    pub fn technique(&self) -> &'static str {
        if self.test_group <= 3 {
            "Speed Reading"
        } else {
            "Normal Reading"
        }
    }
}

const TOTAL_QUESTIONS: f64 = 10.0;

/// Persist a manual entry: a user document with both phase results in its
/// subcollection, plus two flat records for backward compatibility.
pub async fn submit_entry(
    store: &impl DocumentStore,
    config: &StoreConfig,
    entry: &ManualEntry,
) -> Result<String, StoreError> {
    let session_id = format!("manual_{}", Utc::now().timestamp_millis());
    let timestamp = Utc::now();
    let technique = entry.technique();

    store
        .put_document(
            &config.users_collection,
            &session_id,
            json!({
                "nickname": entry.nickname,
                "testGroup": entry.test_group,
                "technique": technique,
                "createdAt": timestamp,
            }),
        )
        .await?;

    let phases = [
        (1, entry.phase1_time, entry.phase1_score),
        (2, entry.phase2_time, entry.phase2_score),
    ];

    for (phase, reading_time, score) in phases {
        let mistake_ratio = (TOTAL_QUESTIONS - score) / TOTAL_QUESTIONS;
        let sub_path = format!(
            "{}/{}/{}",
            config.users_collection, session_id, config.results_subcollection
        );

        store
            .put_document(
                &sub_path,
                &format!("phase{}", phase),
                json!({
                    "phase": phase,
                    "readingTime": reading_time,
                    "score": score,
                    "totalQuestions": TOTAL_QUESTIONS,
                    "mistakeRatio": mistake_ratio,
                    "technique": technique,
                    "timestamp": timestamp,
                }),
            )
            .await?;

        store
            .create_document(
                &config.results_collection,
                json!({
                    "sessionId": session_id,
                    "nickname": entry.nickname,
                    "phase": phase,
                    "readingTime": reading_time,
                    "score": score,
                    "totalQuestions": TOTAL_QUESTIONS,
                    "mistakeRatio": mistake_ratio,
                    "testGroup": entry.test_group,
                    "technique": technique,
                    "timestamp": timestamp,
                }),
            )
            .await?;
    }

    info!("Recorded manual entry as session {}", session_id);
    Ok(session_id)
}

fn decode_phases(phase_docs: &[Document], undecodable: &mut usize) -> UserResults {
    let mut results = UserResults::default();
    for doc in phase_docs {
        let decoded = match decode_fields::<PhaseResult>(doc) {
            Some(p) => p,
            None => {
                *undecodable += 1;
                continue;
            }
        };
        match doc.id.as_str() {
            "phase1" => results.phase1 = Some(decoded),
            "phase2" => results.phase2 = Some(decoded),
            other => debug!("Ignoring unexpected phase document id {:?}", other),
        }
    }
    results
}

fn decode_fields<T: DeserializeOwned>(doc: &Document) -> Option<T> {
    match serde_json::from_value(doc.fields.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("Skipping undecodable document {}: {}", doc.id, e);
            None
        }
    }
}

fn subcollection_progress(total: u64, show: bool) -> ProgressBar {
    if !show || total == 0 {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} fetching user results [{bar:40.cyan/blue}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// In-memory store for exercising the fetch/write paths.
    #[derive(Default)]
    struct MemoryStore {
        collections: Mutex<HashMap<String, Vec<Document>>>,
    }

    impl MemoryStore {
        fn with(collections: &[(&str, Vec<Document>)]) -> Self {
            let map = collections
                .iter()
                .map(|(name, docs)| (name.to_string(), docs.clone()))
                .collect();
            Self {
                collections: Mutex::new(map),
            }
        }

        fn doc(id: &str, fields: Value) -> Document {
            Document {
                id: id.to_string(),
                fields,
            }
        }
    }

    impl DocumentStore for MemoryStore {
        async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
            Ok(self
                .collections
                .lock()
                .unwrap()
                .get(collection)
                .cloned()
                .unwrap_or_default())
        }

        async fn create_document(
            &self,
            collection: &str,
            fields: Value,
        ) -> Result<String, StoreError> {
            let mut collections = self.collections.lock().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();
            let id = format!("auto-{}", docs.len() + 1);
            docs.push(Document {
                id: id.clone(),
                fields,
            });
            Ok(id)
        }

        async fn put_document(
            &self,
            collection: &str,
            id: &str,
            fields: Value,
        ) -> Result<(), StoreError> {
            let mut collections = self.collections.lock().unwrap();
            let docs = collections.entry(collection.to_string()).or_default();
            docs.retain(|d| d.id != id);
            docs.push(Document {
                id: id.to_string(),
                fields,
            });
            Ok(())
        }
    }

    fn store_config() -> StoreConfig {
        StoreConfig::default()
    }

    #[test]
    fn test_fetch_sources_decodes_both_shapes() {
        let store = MemoryStore::with(&[
            (
                "reading_study_results",
                vec![MemoryStore::doc(
                    "r1",
                    json!({
                        "sessionId": "s1",
                        "nickname": "Alice",
                        "phase": 1,
                        "readingTime": 120.0,
                        "score": 8,
                        "testGroup": 1
                    }),
                )],
            ),
            (
                "users",
                vec![MemoryStore::doc("u1", json!({ "nickname": "Bob", "testGroup": 2 }))],
            ),
            (
                "users/u1/results",
                vec![
                    MemoryStore::doc("phase1", json!({ "readingTime": 100.0, "score": 7 })),
                    MemoryStore::doc("phase2", json!({ "readingTime": 80.0, "score": 9 })),
                ],
            ),
        ]);

        let fetched =
            tokio_test::block_on(fetch_sources(&store, &store_config(), false)).unwrap();

        assert_eq!(fetched.flat_results.len(), 1);
        assert_eq!(fetched.flat_results[0].session_id.as_deref(), Some("s1"));

        assert_eq!(fetched.users.len(), 1);
        let user = &fetched.users[0];
        assert_eq!(user.id, "u1");
        assert!(user.is_complete());
        assert_eq!(
            user.results.phase1.as_ref().unwrap().reading_time,
            Some(100.0)
        );
    }

    #[test]
    fn test_fetch_sources_user_without_results_is_incomplete() {
        let store = MemoryStore::with(&[(
            "users",
            vec![MemoryStore::doc("u1", json!({ "nickname": "Bob" }))],
        )]);

        let fetched =
            tokio_test::block_on(fetch_sources(&store, &store_config(), false)).unwrap();

        assert_eq!(fetched.users.len(), 1);
        assert!(!fetched.users[0].is_complete());
    }

    #[test]
    fn test_fetch_sources_orders_flat_most_recent_first() {
        let store = MemoryStore::with(&[(
            "reading_study_results",
            vec![
                MemoryStore::doc(
                    "old",
                    json!({ "sessionId": "s1", "phase": 1, "timestamp": "2024-01-01T00:00:00Z" }),
                ),
                MemoryStore::doc(
                    "new",
                    json!({ "sessionId": "s2", "phase": 1, "timestamp": "2024-02-01T00:00:00Z" }),
                ),
            ],
        )]);

        let fetched =
            tokio_test::block_on(fetch_sources(&store, &store_config(), false)).unwrap();

        assert_eq!(fetched.flat_results[0].session_id.as_deref(), Some("s2"));
        assert_eq!(fetched.flat_results[1].session_id.as_deref(), Some("s1"));
    }

    #[test]
    fn test_submit_entry_writes_both_shapes() {
        let store = MemoryStore::default();
        let config = store_config();
        let entry = ManualEntry {
            nickname: "Mallory".to_string(),
            test_group: 2,
            phase1_time: 130.0,
            phase1_score: 7.0,
            phase2_time: 100.0,
            phase2_score: 9.0,
        };

        let session_id =
            tokio_test::block_on(submit_entry(&store, &config, &entry)).unwrap();
        assert!(session_id.starts_with("manual_"));

        let fetched = tokio_test::block_on(fetch_sources(&store, &config, false)).unwrap();
        assert_eq!(fetched.flat_results.len(), 2);
        assert_eq!(fetched.users.len(), 1);
        assert!(fetched.users[0].is_complete());

        // The flat records carry the derived mistake ratio.
        let phase1 = fetched
            .flat_results
            .iter()
            .find(|r| r.phase == Some(1))
            .unwrap();
        assert_eq!(phase1.mistake_ratio, Some(0.3));
    }

    #[test]
    fn test_manual_entry_technique_by_group() {
        let mut entry = ManualEntry {
            nickname: "x".to_string(),
            test_group: 3,
            phase1_time: 1.0,
            phase1_score: 1.0,
            phase2_time: 1.0,
            phase2_score: 1.0,
        };
        assert_eq!(entry.technique(), "Speed Reading");
        entry.test_group = 4;
        assert_eq!(entry.technique(), "Normal Reading");
    }
}
