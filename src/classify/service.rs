use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Method, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::client::HttpClient;
use super::{SentimentClassifier, SentimentInput, TopicClassifier};
use crate::record::{Sentiment, TopicCandidate};

#[derive(Serialize)]
struct BatchRequest<'a> {
    items: Vec<ItemRequest<'a>>,
}

#[derive(Serialize)]
struct ItemRequest<'a> {
    id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse<T> {
    items: Vec<T>,
}

#[derive(Deserialize)]
struct SentimentItem {
    id: String,
    sentiment: Sentiment,
}

#[derive(Deserialize)]
struct TopicItem {
    id: String,
    #[serde(default)]
    topics: Vec<TopicCandidate>,
}

/// Client for an HTTP inference service exposing `/predict/sentiment` and
/// `/predict/topics` batch endpoints.
pub struct NlpServiceClient<C> {
    base_url: String,
    http: C,
}

impl<C: HttpClient> NlpServiceClient<C> {
    pub fn new(base_url: &str, http: C) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    async fn post_batch<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &BatchRequest<'_>,
    ) -> Result<Vec<T>> {
        let url = format!("{}{}", self.base_url, path);
        let mut req = Request::new(
            Method::POST,
            url.parse().with_context(|| format!("invalid service URL '{url}'"))?,
        );
        req.headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        *req.body_mut() = Some(serde_json::to_vec(body)?.into());

        let response = self
            .http
            .execute(req)
            .await
            .map_err(|e| anyhow!("Failed to send request to {}: {}", url, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("{} returned status {}: {}", url, status, body));
        }

        let parsed: BatchResponse<T> = response
            .json()
            .await
            .map_err(|e| anyhow!("Failed to parse response from {}: {}", url, e))?;

        debug!(url = %url, items = parsed.items.len(), "Service batch answered");
        Ok(parsed.items)
    }
}

#[async_trait]
impl<C: HttpClient> SentimentClassifier for NlpServiceClient<C> {
    #[tracing::instrument(skip_all, fields(batch = items.len()))]
    async fn classify(&self, items: &[SentimentInput]) -> Result<HashMap<String, Sentiment>> {
        let body = BatchRequest {
            items: items
                .iter()
                .map(|i| ItemRequest {
                    id: &i.id,
                    text: &i.text,
                })
                .collect(),
        };

        let answered: Vec<SentimentItem> = self.post_batch("/predict/sentiment", &body).await?;
        Ok(answered
            .into_iter()
            .map(|item| (item.id, item.sentiment))
            .collect())
    }
}

#[async_trait]
impl<C: HttpClient> TopicClassifier for NlpServiceClient<C> {
    #[tracing::instrument(skip_all, fields(batch = texts.len()))]
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TopicCandidate>>> {
        // The service is keyed by id; positional ids map answers back to texts.
        let ids: Vec<String> = (0..texts.len()).map(|i| i.to_string()).collect();
        let body = BatchRequest {
            items: ids
                .iter()
                .zip(texts)
                .map(|(id, text)| ItemRequest { id, text })
                .collect(),
        };

        let answered: Vec<TopicItem> = self.post_batch("/predict/topics", &body).await?;
        let mut by_id: HashMap<String, Vec<TopicCandidate>> = answered
            .into_iter()
            .map(|item| (item.id, item.topics))
            .collect();

        Ok(ids
            .iter()
            .map(|id| by_id.remove(id).unwrap_or_default())
            .collect())
    }
}
