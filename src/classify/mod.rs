//! Sentiment and topic classifiers consumed by the batch enricher.
//!
//! [`SentimentClassifier`] and [`TopicClassifier`] are the seams to the NLP
//! engines. [`NlpServiceClient`] talks to an HTTP inference service;
//! [`LexiconClassifier`] is a deterministic keyword classifier for offline
//! runs and tests.

mod client;
mod lexicon;
mod policy;
mod service;

pub use client::{BasicClient, Bearer, HttpClient};
pub use lexicon::LexiconClassifier;
pub use policy::NeutralPolicy;
pub use service::NlpServiceClient;

use anyhow::Result;
use serde::Serialize;
use std::collections::HashMap;

use crate::record::{Sentiment, TopicCandidate};

/// Request unit for sentiment classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SentimentInput {
    pub id: String,
    pub text: String,
}

/// Classifies a batch of texts into positive / neutral / negative.
///
/// The whole batch succeeds or fails as a unit. Ids missing from the
/// returned map are treated as unclassified.
#[async_trait::async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, items: &[SentimentInput]) -> Result<HashMap<String, Sentiment>>;
}

/// Proposes raw topic candidates for a batch of texts.
///
/// Returns one candidate list per input text, in input order. Candidates
/// are not policy-filtered.
#[async_trait::async_trait]
pub trait TopicClassifier: Send + Sync {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TopicCandidate>>>;
}
