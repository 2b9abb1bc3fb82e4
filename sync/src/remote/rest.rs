//! Per-collection REST adapter.
//!
//! Talks to a backend that exposes one endpoint per collection:
//! `GET {base}/{collection}` returns every record as a JSON array and
//! `PUT {base}/{collection}` replaces the collection. Requests carry a
//! bearer token and a bounded timeout; a timed-out request is retried
//! once with a longer deadline before the failure is reported.

use crate::config::SyncConfig;
use crate::error::{Result, SyncError};
use crate::remote::{Granularity, RemoteAdapter, RemoteHandle};
use async_trait::async_trait;
use reqwest::StatusCode;
use satchel_engine::{Bundle, Record};
use serde_json::Value;
use std::time::Duration;

/// Remote adapter for per-collection REST endpoints.
#[derive(Debug)]
pub struct RestAdapter {
    client: reqwest::Client,
    base_url: String,
    token: String,
    collections: Vec<String>,
    retry_timeout: Duration,
}

impl RestAdapter {
    /// Create an adapter for `base_url`, authenticating with `token`.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        config: &SyncConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let base_url: String = base_url.into();
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.into(),
            collections: config.collections.clone(),
            retry_timeout: config.retry_request_timeout,
        })
    }

    fn collection_url(&self, collection: &str) -> String {
        format!("{}/{}", self.base_url, collection)
    }

    /// Send a request; on timeout, retry once with the longer deadline.
    async fn send_with_retry(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let retry = request.try_clone();
        match request.send().await {
            Ok(response) => check_status(response),
            Err(err) if err.is_timeout() => {
                let Some(retry) = retry else {
                    return Err(err.into());
                };
                tracing::warn!("request timed out, retrying with a longer deadline");
                let response = retry.timeout(self.retry_timeout).send().await?;
                check_status(response)
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetch every record of one collection.
    ///
    /// Rows without an id are dropped and logged, never fatal.
    async fn get_all(&self, collection: &str) -> Result<Vec<Record>> {
        let request = self
            .client
            .get(self.collection_url(collection))
            .bearer_auth(&self.token);
        let response = self.send_with_retry(request).await?;
        let rows: Vec<Value> = response.json().await?;

        let mut records = Vec::with_capacity(rows.len());
        let mut skipped = 0usize;
        for row in rows {
            match Record::from_value(row) {
                Ok(record) => records.push(record),
                Err(err) => {
                    skipped += 1;
                    tracing::warn!(collection, %err, "skipping malformed remote record");
                }
            }
        }
        if skipped > 0 {
            tracing::warn!(collection, skipped, "dropped malformed remote records");
        }
        Ok(records)
    }

    /// Replace one remote collection.
    async fn save(&self, collection: &str, records: &[Record]) -> Result<()> {
        let request = self
            .client
            .put(self.collection_url(collection))
            .bearer_auth(&self.token)
            .json(records);
        self.send_with_retry(request).await?;
        Ok(())
    }
}

fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Unauthorized);
    }
    if !status.is_success() {
        return Err(SyncError::Protocol(format!("unexpected status {status}")));
    }
    Ok(response)
}

#[async_trait]
impl RemoteAdapter for RestAdapter {
    async fn ensure_handle(&self) -> Result<RemoteHandle> {
        // The backend is the container; nothing to create.
        Ok(RemoteHandle(self.base_url.clone()))
    }

    async fn download(&self, _handle: &RemoteHandle) -> Result<Option<Bundle>> {
        let mut created_at = 0;
        let mut bundle = Bundle::new(created_at);
        for collection in &self.collections {
            bundle.ensure_collection(collection);
            for record in self.get_all(collection).await? {
                created_at = created_at.max(record.updated_at);
                bundle.add_record(collection, record);
            }
        }
        bundle.created_at = created_at;
        Ok(Some(bundle))
    }

    async fn upload(&self, _handle: &RemoteHandle, bundle: &Bundle) -> Result<()> {
        for (name, records) in &bundle.collections {
            let records: Vec<Record> = records.values().cloned().collect();
            self.save(name, &records).await?;
        }
        Ok(())
    }

    fn granularity(&self) -> Granularity {
        Granularity::PerCollection
    }

    async fn save_collection(
        &self,
        _handle: &RemoteHandle,
        name: &str,
        records: &[Record],
    ) -> Result<()> {
        self.save(name, records).await
    }
}
