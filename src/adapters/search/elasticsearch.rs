//! Elasticsearch search backend
//!
//! Full exports page through a point-in-time snapshot (`_pit`) sorted by
//! `_shard_doc`, continuing with the sort values of the last hit
//! (`search_after`). Counts come from `_count` with the same query.

use super::traits::{PointInTime, SearchAfter, SearchBackend, SearchFilter, SearchPage};
use crate::config::SearchConfig;
use crate::domain::{DwcaError, Observation, Result, SearchError};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

pub struct ElasticsearchBackend {
    base_url: String,
    client: Client,
    config: SearchConfig,
}

#[derive(Debug, Deserialize)]
struct PitResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    pit_id: Option<String>,
    hits: Hits,
}

#[derive(Debug, Deserialize)]
struct Hits {
    #[serde(default)]
    total: Option<TotalHits>,
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct TotalHits {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: Observation,
    #[serde(default)]
    sort: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ClusterHealth {
    status: String,
}

impl ElasticsearchBackend {
    /// Create a backend for the configured cluster and index
    ///
    /// # Errors
    ///
    /// Returns `SearchError::ConnectionFailed` if the HTTP client cannot be built
    pub fn new(config: SearchConfig) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| SearchError::ConnectionFailed(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.url.trim_end_matches('/').to_string(),
            client,
            config,
        })
    }

    fn auth_header_value(&self) -> Option<String> {
        match (&self.config.username, &self.config.password) {
            (Some(username), Some(password)) => {
                let credentials = format!("{username}:{}", password.expose_secret().as_ref());
                let encoded = general_purpose::STANDARD.encode(credentials.as_bytes());
                Some(format!("Basic {encoded}"))
            }
            _ => None,
        }
    }

    /// Only connection problems, timeouts and 5xx responses are retried
    fn is_retryable(error: &DwcaError) -> bool {
        matches!(
            error,
            DwcaError::Search(
                SearchError::ConnectionFailed(_)
                    | SearchError::Timeout(_)
                    | SearchError::ServerError { .. }
            )
        )
    }

    /// Retry a request with exponential backoff
    async fn retry_request<F, T, Fut>(&self, operation: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let retry = &self.config.retry;
        let max_retries = retry.max_retries.max(1);
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) => {
                    attempt += 1;
                    if attempt >= max_retries || !Self::is_retryable(&e) {
                        return Err(e);
                    }

                    let factor = retry.backoff_multiplier.powi(attempt as i32 - 1);
                    let delay_ms = ((retry.initial_delay_ms as f64 * factor) as u64)
                        .min(retry.max_delay_ms);

                    crate::log_retry_attempt!(attempt, max_retries, delay_ms, e);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    /// Send one JSON request and decode the response body
    async fn send<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        let mut request = self.client.request(method, url);
        if let Some(auth) = self.auth_header_value() {
            request = request.header("Authorization", auth);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout(e.to_string())
            } else {
                SearchError::ConnectionFailed(e.to_string())
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            let error = match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SearchError::AuthenticationFailed(format!("{status}: {message}"))
                }
                s if s.is_server_error() => SearchError::ServerError {
                    status: s.as_u16(),
                    message,
                },
                s => SearchError::ClientError {
                    status: s.as_u16(),
                    message,
                },
            };
            return Err(error.into());
        }

        resp.json::<T>()
            .await
            .map_err(|e| SearchError::InvalidResponse(e.to_string()).into())
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
    ) -> Result<T> {
        self.retry_request(|| self.send(method.clone(), url, body))
            .await
    }
}

/// Elasticsearch query for a filter; restricted observations never match
pub fn build_query(filter: &SearchFilter) -> Value {
    let mut clauses = Vec::new();

    if !filter.data_provider_ids.is_empty() {
        clauses.push(json!({ "terms": { "dataProviderId": filter.data_provider_ids } }));
    }
    if !filter.taxon_ids.is_empty() {
        clauses.push(json!({ "terms": { "taxon.taxonId": filter.taxon_ids } }));
    }
    if let Some(start) = filter.start_date {
        clauses.push(json!({ "range": { "event.startDate": { "gte": start.to_rfc3339() } } }));
    }
    if let Some(end) = filter.end_date {
        clauses.push(json!({ "range": { "event.endDate": { "lte": end.to_rfc3339() } } }));
    }
    if let Some(ref country) = filter.country_code {
        clauses.push(json!({ "term": { "location.countryCode": country } }));
    }

    json!({
        "bool": {
            "filter": clauses,
            "must_not": [ { "term": { "restricted": true } } ]
        }
    })
}

#[async_trait]
impl SearchBackend for ElasticsearchBackend {
    async fn open_point_in_time(&self) -> Result<PointInTime> {
        let url = format!(
            "{}/{}/_pit?keep_alive={}",
            self.base_url, self.config.index, self.config.keep_alive
        );
        let pit: PitResponse = self.request(Method::POST, &url, None).await.map_err(|e| match e {
            DwcaError::Search(inner) => {
                DwcaError::Search(SearchError::PointInTime(format!("Failed to open: {inner}")))
            }
            other => other,
        })?;

        tracing::debug!(index = %self.config.index, "Opened point-in-time");
        Ok(PointInTime { id: pit.id })
    }

    async fn search_page(
        &self,
        filter: &SearchFilter,
        pit: &PointInTime,
        search_after: Option<&SearchAfter>,
        size: usize,
    ) -> Result<SearchPage> {
        let url = format!("{}/_search", self.base_url);
        let mut body = json!({
            "size": size,
            "query": build_query(filter),
            "pit": { "id": pit.id, "keep_alive": self.config.keep_alive },
            "sort": [ { "_shard_doc": "asc" } ],
            "track_total_hits": false
        });
        if let Some(after) = search_after {
            body["search_after"] = after.0.clone();
        }

        let response: SearchResponse = self.request(Method::POST, &url, Some(&body)).await?;

        let search_after = response
            .hits
            .hits
            .last()
            .and_then(|hit| hit.sort.clone())
            .map(SearchAfter);
        let records: Vec<Observation> =
            response.hits.hits.into_iter().map(|hit| hit.source).collect();

        tracing::trace!(records = records.len(), "Fetched search page");
        Ok(SearchPage {
            records,
            search_after,
            point_in_time: response
                .pit_id
                .filter(|id| *id != pit.id)
                .map(|id| PointInTime { id }),
            total_hint: response.hits.total.map(|t| t.value),
        })
    }

    async fn count(&self, filter: &SearchFilter) -> Result<u64> {
        let url = format!("{}/{}/_count", self.base_url, self.config.index);
        let body = json!({ "query": build_query(filter) });
        let response: CountResponse = self.request(Method::POST, &url, Some(&body)).await?;
        Ok(response.count)
    }

    async fn close_point_in_time(&self, pit: &PointInTime) -> Result<()> {
        let url = format!("{}/_pit", self.base_url);
        let body = json!({ "id": pit.id });
        match self.request::<Value>(Method::DELETE, &url, Some(&body)).await {
            Ok(_) => Ok(()),
            // Already expired
            Err(DwcaError::Search(SearchError::ClientError { status: 404, .. })) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn health_check(&self) -> Result<()> {
        let url = format!("{}/_cluster/health", self.base_url);
        let health: ClusterHealth = self.request(Method::GET, &url, None).await?;
        if health.status == "red" {
            return Err(SearchError::ServerError {
                status: 503,
                message: "Cluster health is red".to_string(),
            }
            .into());
        }
        Ok(())
    }
}
