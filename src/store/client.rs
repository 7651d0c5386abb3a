//! HTTP document-store client.
//!
//! Speaks a minimal REST dialect: `GET {base}/{collection}` returns
//! `{"documents": [{"id": ..., "fields": {...}}, ...]}`, `POST` appends a
//! document, `PUT {base}/{collection}/{id}` creates or overwrites one.
//! Nested collection paths (`users/{id}/results`) are passed through as-is.

use crate::config::StoreConfig;
use crate::store::{Document, DocumentStore, StoreError};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Client against the hosted store's REST endpoint.
pub struct HttpDocumentStore {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    documents: Vec<Document>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

impl HttpDocumentStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn check_status(
        response: reqwest::Response,
        url: &str,
    ) -> Result<reqwest::Response, StoreError> {
        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Status {
                status,
                url: url.to_string(),
            });
        }
        Ok(response)
    }
}

impl DocumentStore for HttpDocumentStore {
    async fn list_documents(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        let url = self.url(collection);
        debug!("GET {}", url);

        let response = self.authorize(self.client.get(&url)).send().await?;
        let response = Self::check_status(response, &url)?;

        let list: ListResponse = response.json().await.map_err(|e| StoreError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;

        Ok(list.documents)
    }

    async fn create_document(
        &self,
        collection: &str,
        fields: Value,
    ) -> Result<String, StoreError> {
        let url = self.url(collection);
        debug!("POST {}", url);

        let response = self
            .authorize(self.client.post(&url))
            .json(&fields)
            .send()
            .await?;
        let response = Self::check_status(response, &url)?;

        let created: CreateResponse = response.json().await.map_err(|e| StoreError::Decode {
            url: url.clone(),
            message: e.to_string(),
        })?;

        Ok(created.id)
    }

    async fn put_document(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        let url = format!("{}/{}", self.url(collection), id);
        debug!("PUT {}", url);

        let response = self
            .authorize(self.client.put(&url))
            .json(&fields)
            .send()
            .await?;
        Self::check_status(response, &url)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(base_url: &str) -> StoreConfig {
        StoreConfig {
            base_url: base_url.to_string(),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_url_building_strips_trailing_slash() {
        let store = HttpDocumentStore::new(&config("http://localhost:8080/")).unwrap();
        assert_eq!(store.url("users"), "http://localhost:8080/users");
        assert_eq!(
            store.url("users/u1/results"),
            "http://localhost:8080/users/u1/results"
        );
    }

    #[test]
    fn test_list_response_tolerates_missing_documents_key() {
        let list: ListResponse = serde_json::from_str("{}").unwrap();
        assert!(list.documents.is_empty());
    }

    #[test]
    fn test_document_decodes_without_fields() {
        let doc: Document = serde_json::from_str(r#"{"id": "u1"}"#).unwrap();
        assert_eq!(doc.id, "u1");
        assert!(doc.fields.is_null());
    }
}
