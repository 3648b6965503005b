//! Batch enrichment: sentiment + topics per record, label policy, and the
//! hand-off of accepted topics into the aggregation store.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::aggregate::AggregationStore;
use crate::classify::{SentimentClassifier, SentimentInput, TopicClassifier};
use crate::labels::{LabelPolicy, TopicGroups, select};
use crate::record::{EnrichedRecord, Sentiment, TopicCandidate, WorkRecord};

pub struct BatchEnricher {
    sentiment: Arc<dyn SentimentClassifier>,
    topics: Arc<dyn TopicClassifier>,
    policy: LabelPolicy,
    groups: TopicGroups,
    store: Arc<AggregationStore>,
}

impl BatchEnricher {
    pub fn new(
        sentiment: Arc<dyn SentimentClassifier>,
        topics: Arc<dyn TopicClassifier>,
        policy: LabelPolicy,
        groups: TopicGroups,
        store: Arc<AggregationStore>,
    ) -> Self {
        Self {
            sentiment,
            topics,
            policy,
            groups,
            store,
        }
    }

    pub async fn enrich(&self, records: Vec<WorkRecord>) -> HashMap<String, EnrichedRecord> {
        self.enrich_at(records, Utc::now()).await
    }

    /// Enriches `records`, stamping aggregation observations with `now`.
    ///
    /// A failing classifier degrades its own signal for the whole batch
    /// (no sentiment, or no topics); it never aborts the other one.
    #[tracing::instrument(skip_all, fields(batch = records.len()))]
    pub async fn enrich_at(
        &self,
        records: Vec<WorkRecord>,
        now: DateTime<Utc>,
    ) -> HashMap<String, EnrichedRecord> {
        if records.is_empty() {
            return HashMap::new();
        }

        let sentiment_inputs: Vec<SentimentInput> = records
            .iter()
            .map(|r| SentimentInput {
                id: r.id.clone(),
                text: r.text.clone(),
            })
            .collect();
        let texts: Vec<String> = records.iter().map(|r| r.text.clone()).collect();

        let (sentiments, topics) = tokio::join!(
            self.sentiment.classify(&sentiment_inputs),
            self.topics.classify(&texts),
        );

        let mut sentiments: HashMap<String, Sentiment> = sentiments.unwrap_or_else(|e| {
            warn!(error = %e, "Sentiment classifier failed, batch continues without sentiment");
            HashMap::new()
        });

        let topics: Vec<Vec<TopicCandidate>> = match topics {
            Ok(t) if t.len() == records.len() => t,
            Ok(t) => {
                warn!(
                    expected = records.len(),
                    got = t.len(),
                    "Topic classifier answered the wrong number of texts, batch continues without topics"
                );
                vec![Vec::new(); records.len()]
            }
            Err(e) => {
                warn!(error = %e, "Topic classifier failed, batch continues without topics");
                vec![Vec::new(); records.len()]
            }
        };

        let mut out = HashMap::with_capacity(records.len());
        for (record, candidates) in records.into_iter().zip(topics) {
            let sentiment = sentiments.remove(&record.id);
            let labels = select(&candidates, &self.policy, &self.groups);

            self.observe(&record, &labels, sentiment, now);

            out.insert(
                record.id.clone(),
                EnrichedRecord {
                    record,
                    sentiment,
                    topics: labels,
                },
            );
        }
        out
    }

    fn observe(
        &self,
        record: &WorkRecord,
        labels: &[String],
        sentiment: Option<Sentiment>,
        now: DateTime<Utc>,
    ) {
        if labels.is_empty() {
            return;
        }
        let Some(city) = record.aggregation_city() else {
            debug!(id = %record.id, "Record has no city, not aggregated");
            return;
        };
        let district = record.aggregation_district();
        let label = sentiment.map(|s| s.label);
        for topic in labels {
            self.store.insert(city, district, topic, now, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::Level;
    use crate::classify::LexiconClassifier;
    use crate::record::SentimentLabel;
    use anyhow::{Result, anyhow};

    struct FailingSentiment;

    #[async_trait::async_trait]
    impl SentimentClassifier for FailingSentiment {
        async fn classify(&self, _items: &[SentimentInput]) -> Result<HashMap<String, Sentiment>> {
            Err(anyhow!("model not loaded"))
        }
    }

    struct FailingTopics;

    #[async_trait::async_trait]
    impl TopicClassifier for FailingTopics {
        async fn classify(&self, _texts: &[String]) -> Result<Vec<Vec<TopicCandidate>>> {
            Err(anyhow!("timeout"))
        }
    }

    struct ShortTopics;

    #[async_trait::async_trait]
    impl TopicClassifier for ShortTopics {
        async fn classify(&self, _texts: &[String]) -> Result<Vec<Vec<TopicCandidate>>> {
            Ok(vec![vec![TopicCandidate::new("sel", 0.9)]])
        }
    }

    fn record(id: &str, text: &str, city: Option<&str>, district: Option<&str>) -> WorkRecord {
        WorkRecord {
            id: id.to_string(),
            text: text.to_string(),
            ts: "2025-03-01T12:00:00Z".to_string(),
            city: city.map(str::to_string),
            district: district.map(str::to_string),
        }
    }

    fn enricher(
        sentiment: Arc<dyn SentimentClassifier>,
        topics: Arc<dyn TopicClassifier>,
        store: Arc<AggregationStore>,
    ) -> BatchEnricher {
        BatchEnricher::new(sentiment, topics, LabelPolicy::default(), TopicGroups::default(), store)
    }

    #[tokio::test]
    async fn test_enrich_merges_signals_and_feeds_store() {
        let store = Arc::new(AggregationStore::default());
        let lexicon = Arc::new(LexiconClassifier::default());
        let e = enricher(lexicon.clone(), lexicon, store.clone());

        let out = e
            .enrich(vec![
                record("1", "Kadıköy'de trafik kilit, kaza var", Some("İstanbul"), Some("Kadıköy")),
                record("2", "sıradan bir gün", Some("İstanbul"), None),
            ])
            .await;

        assert_eq!(out.len(), 2);
        assert_eq!(out["1"].topics, vec!["trafik"]);
        assert_eq!(out["1"].sentiment.map(|s| s.label), Some(SentimentLabel::Negative));
        assert!(out["2"].topics.is_empty());
        assert_eq!(out["2"].sentiment.map(|s| s.label), Some(SentimentLabel::Neutral));

        let city = store.snapshot(Level::City, None);
        let district = store.snapshot(Level::District, None);
        assert_eq!(city.total_count(), 1);
        assert_eq!(district.total_count(), 1);
        assert_eq!(district.items[0].district.as_deref(), Some("Kadıköy"));
    }

    #[tokio::test]
    async fn test_sentiment_failure_keeps_topics() {
        let store = Arc::new(AggregationStore::default());
        let e = enricher(
            Arc::new(FailingSentiment),
            Arc::new(LexiconClassifier::default()),
            store.clone(),
        );

        let out = e.enrich(vec![record("1", "yangın var", Some("Muğla"), None)]).await;
        assert_eq!(out["1"].sentiment, None);
        assert_eq!(out["1"].topics, vec!["yangın"]);

        // observation still recorded, just without a sentiment label
        let snap = store.snapshot(Level::City, None);
        assert_eq!(snap.items[0].count, 1);
        assert_eq!(snap.items[0].sentiment_summary, Default::default());
    }

    #[tokio::test]
    async fn test_topic_failure_keeps_sentiment() {
        let store = Arc::new(AggregationStore::default());
        let e = enricher(
            Arc::new(LexiconClassifier::default()),
            Arc::new(FailingTopics),
            store.clone(),
        );

        let out = e.enrich(vec![record("1", "enkaz altında yaralı var", Some("Hatay"), None)]).await;
        assert!(out["1"].topics.is_empty());
        assert_eq!(out["1"].sentiment.map(|s| s.label), Some(SentimentLabel::Negative));
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_misaligned_topic_answer_degrades_to_no_topics() {
        let store = Arc::new(AggregationStore::default());
        let e = enricher(
            Arc::new(LexiconClassifier::default()),
            Arc::new(ShortTopics),
            store.clone(),
        );

        let out = e
            .enrich(vec![
                record("1", "a", Some("Rize"), None),
                record("2", "b", Some("Rize"), None),
            ])
            .await;
        assert!(out.values().all(|r| r.topics.is_empty()));
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_record_without_city_is_enriched_not_aggregated() {
        let store = Arc::new(AggregationStore::default());
        let lexicon = Arc::new(LexiconClassifier::default());
        let e = enricher(lexicon.clone(), lexicon, store.clone());

        let out = e.enrich(vec![record("1", "deprem oldu", None, Some("Merkez"))]).await;
        assert_eq!(out["1"].topics, vec!["deprem"]);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_classifiers() {
        let store = Arc::new(AggregationStore::default());
        let e = enricher(Arc::new(FailingSentiment), Arc::new(FailingTopics), store);
        assert!(e.enrich(Vec::new()).await.is_empty());
    }
}
