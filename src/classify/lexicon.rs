use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;

use super::{NeutralPolicy, SentimentClassifier, SentimentInput, TopicClassifier};
use crate::record::{Sentiment, TopicCandidate};

/// Topic labels and the lowercase stems that signal them.
static TOPIC_LEXICON: &[(&str, &[&str])] = &[
    ("altyapı", &["altyapı", "yol çalışması", "kanalizasyon", "çukur"]),
    ("trafik", &["trafik", "kaza", "sıkışık", "kilit"]),
    ("ulaşım", &["otobüs", "metro", "vapur", "ulaşım", "durak"]),
    ("yağış", &["yağmur", "yağış", "sağanak", "dolu"]),
    ("sel", &["sel", "su baskını", "taşkın"]),
    ("elektrik kesintisi", &["elektrik kesintisi", "elektrikler kesildi", "karanlık"]),
    ("su kesintisi", &["su kesintisi", "sular kesildi"]),
    ("enerji", &["enerji", "doğalgaz", "trafo"]),
    ("yangın", &["yangın", "duman", "alev"]),
    ("deprem", &["deprem", "sarsıntı", "artçı"]),
    ("yardım", &["yardım", "acil", "kurtarma"]),
    ("barınma", &["barınma", "çadır", "konteyner"]),
    ("sağlık", &["hastane", "ambulans", "yaralı", "sağlık"]),
    ("gürültü", &["gürültü", "korna", "inşaat sesi"]),
    ("çevre kirliliği", &["kirlilik", "çöp", "koku", "atık"]),
];

static NEGATIVE_WORDS: &[&str] = &[
    "yardım", "acil", "deprem", "sel", "yangın", "yıkım", "enkaz", "kayıp", "yaralı", "hasar",
    "tehlike", "risk", "felaket", "kesinti", "kaza", "berbat", "rezalet",
];

static POSITIVE_WORDS: &[&str] = &[
    "güvenli", "kurtarıldı", "başarılı", "teşekkür", "destek", "dayanışma", "yardımlaşma",
    "toparlanma", "harika", "düzeldi", "açıldı",
];

const BASE_TOPIC_SCORE: f64 = 0.45;
const PER_HIT_SCORE: f64 = 0.15;
const MAX_TOPIC_SCORE: f64 = 0.95;

/// Deterministic keyword classifier.
///
/// Topic score grows with the number of matching stems; sentiment uses
/// Laplace-smoothed positive/negative hit counts run through a
/// [`NeutralPolicy`].
#[derive(Debug, Clone, Default)]
pub struct LexiconClassifier {
    policy: NeutralPolicy,
}

impl LexiconClassifier {
    pub fn new(policy: NeutralPolicy) -> Self {
        Self { policy }
    }

    pub fn topics_for(&self, text: &str) -> Vec<TopicCandidate> {
        let lowered = text.to_lowercase();
        let words = tokenize(&lowered);
        TOPIC_LEXICON
            .iter()
            .filter_map(|(label, stems)| {
                let hits = count_hits(&words, stems);
                (hits > 0).then(|| {
                    let score = (BASE_TOPIC_SCORE + PER_HIT_SCORE * hits as f64).min(MAX_TOPIC_SCORE);
                    TopicCandidate::new(*label, score)
                })
            })
            .collect()
    }

    pub fn sentiment_for(&self, text: &str) -> Sentiment {
        let lowered = text.to_lowercase();
        let words = tokenize(&lowered);
        let pos = count_hits(&words, POSITIVE_WORDS) as f64;
        let neg = count_hits(&words, NEGATIVE_WORDS) as f64;
        let p_pos = (pos + 1.0) / (pos + neg + 2.0);
        self.policy.apply(p_pos, 1.0 - p_pos)
    }
}

/// Splits lowercased text into words. U+0307 stays inside a word since
/// lowercasing `İ` produces it.
fn tokenize(lowered: &str) -> Vec<&str> {
    lowered
        .split(|c: char| !(c.is_alphanumeric() || c == '\u{307}'))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Counts stems that occur as whole words; a multi-word stem must appear as
/// consecutive words.
fn count_hits(words: &[&str], stems: &[&str]) -> usize {
    stems
        .iter()
        .filter(|stem| {
            let parts: Vec<&str> = stem.split_whitespace().collect();
            words.windows(parts.len()).any(|w| w == parts.as_slice())
        })
        .count()
}

#[async_trait]
impl SentimentClassifier for LexiconClassifier {
    async fn classify(&self, items: &[SentimentInput]) -> Result<HashMap<String, Sentiment>> {
        Ok(items
            .iter()
            .map(|item| (item.id.clone(), self.sentiment_for(&item.text)))
            .collect())
    }
}

#[async_trait]
impl TopicClassifier for LexiconClassifier {
    async fn classify(&self, texts: &[String]) -> Result<Vec<Vec<TopicCandidate>>> {
        Ok(texts.iter().map(|t| self.topics_for(t)).collect())
    }
}
