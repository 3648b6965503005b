use chrono::{DateTime, Duration, Utc};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::debug;

use crate::aggregate::types::{
    AggregateItem, AggregationKey, Level, Observation, SentimentSummary, Snapshot,
};
use crate::aggregate::window::{DEFAULT_WINDOW_SECS, window_secs_or_default};
use crate::record::SentimentLabel;

/// Sliding-window store of topic/sentiment observations per city and district.
///
/// One lock guards the key map and every series. Inserts append at the back;
/// eviction pops from the front, since arrival order is timestamp order.
/// Stale entries are dropped lazily by [`snapshot`](Self::snapshot) and by
/// [`purge`](Self::purge), never by a timer.
pub struct AggregationStore {
    inner: Mutex<StoreInner>,
}

struct StoreInner {
    series: BTreeMap<AggregationKey, VecDeque<Observation>>,
    /// Largest window any caller has asked for; nothing inside it is evicted.
    retention_secs: u64,
}

impl Default for AggregationStore {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SECS)
    }
}

impl AggregationStore {
    /// Creates an empty store that retains at least `retention_secs` of history.
    pub fn new(retention_secs: u64) -> Self {
        Self {
            inner: Mutex::new(StoreInner {
                series: BTreeMap::new(),
                retention_secs,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // Series stay structurally valid even if a holder panicked mid-call.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records one observation for `(city, topic)` and, when a district is
    /// given, for `(city, district, topic)` as well. Both appends happen
    /// under one critical section.
    ///
    /// Returns `false` (and records nothing) if `city` or `topic` is blank.
    pub fn insert(
        &self,
        city: &str,
        district: Option<&str>,
        topic: &str,
        at: DateTime<Utc>,
        sentiment: Option<SentimentLabel>,
    ) -> bool {
        if city.trim().is_empty() || topic.trim().is_empty() {
            debug!(city, topic, "Skipping aggregation insert with blank key");
            return false;
        }

        let observation = Observation { at, sentiment };
        let district = district.filter(|d| !d.trim().is_empty());

        let mut inner = self.lock();
        inner
            .series
            .entry(AggregationKey::city_level(city, topic))
            .or_default()
            .push_back(observation);
        if let Some(district) = district {
            inner
                .series
                .entry(AggregationKey::district_level(city, district, topic))
                .or_default()
                .push_back(observation);
        }
        true
    }

    /// Snapshot at the current wall-clock time.
    pub fn snapshot(&self, level: Level, window: Option<&str>) -> Snapshot {
        self.snapshot_at(level, window, Utc::now())
    }

    /// Evicts stale entries for every key at `level`, then aggregates what is
    /// left inside the window ending at `now`.
    pub fn snapshot_at(&self, level: Level, window: Option<&str>, now: DateTime<Utc>) -> Snapshot {
        let window_sec = window_secs_or_default(window);
        let count_cutoff = cutoff(now, window_sec);

        let mut inner = self.lock();
        inner.retention_secs = inner.retention_secs.max(window_sec);
        let evict_cutoff = cutoff(now, inner.retention_secs);

        let mut items = Vec::new();
        let mut purged_count = 0;

        for (key, series) in inner.series.iter_mut() {
            if key.level() != level {
                continue;
            }
            purged_count += evict_front(series, evict_cutoff);

            let mut count = 0;
            let mut sentiment_summary = SentimentSummary::default();
            for obs in series.iter().filter(|o| o.at >= count_cutoff) {
                count += 1;
                if let Some(label) = obs.sentiment {
                    sentiment_summary.tally(label);
                }
            }

            if count > 0 {
                items.push(AggregateItem {
                    city: key.city.clone(),
                    district: key.district.clone(),
                    topic: key.topic.clone(),
                    count,
                    sentiment_summary,
                });
            }
        }
        drop(inner);

        debug!(?level, window_sec, items = items.len(), purged_count, "Snapshot taken");

        Snapshot {
            level,
            window_sec,
            items,
            purged_count,
            taken_at: now,
        }
    }

    /// Evicts entries older than the retention horizon from every series.
    /// Returns the number of entries removed.
    pub fn purge(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.lock();
        let evict_cutoff = cutoff(now, inner.retention_secs);
        inner
            .series
            .values_mut()
            .map(|series| evict_front(series, evict_cutoff))
            .sum()
    }

    /// Number of keys ever written. Keys are never removed.
    pub fn key_count(&self) -> usize {
        self.lock().series.len()
    }

    /// Number of entries currently held for `key`.
    pub fn series_len(&self, key: &AggregationKey) -> usize {
        self.lock().series.get(key).map_or(0, VecDeque::len)
    }

    pub fn retention_secs(&self) -> u64 {
        self.lock().retention_secs
    }
}

fn cutoff(now: DateTime<Utc>, window_sec: u64) -> DateTime<Utc> {
    let secs = i64::try_from(window_sec).unwrap_or(i64::MAX);
    Duration::try_seconds(secs)
        .and_then(|span| now.checked_sub_signed(span))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn evict_front(series: &mut VecDeque<Observation>, cutoff: DateTime<Utc>) -> usize {
    let mut evicted = 0;
    while series.front().is_some_and(|o| o.at < cutoff) {
        series.pop_front();
        evicted += 1;
    }
    evicted
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
    }

    fn secs(n: i64) -> Duration {
        Duration::seconds(n)
    }

    #[test]
    fn test_city_and_district_scenario() {
        let store = AggregationStore::default();
        store.insert("İstanbul", Some("Kadıköy"), "trafik", t0(), Some(SentimentLabel::Negative));
        store.insert("İstanbul", None, "trafik", t0() + secs(1), Some(SentimentLabel::Positive));

        let district = store.snapshot_at(Level::District, Some("15m"), t0() + secs(2));
        assert_eq!(district.items.len(), 1);
        let item = &district.items[0];
        assert_eq!(item.district.as_deref(), Some("Kadıköy"));
        assert_eq!(item.count, 1);
        assert_eq!(
            item.sentiment_summary,
            SentimentSummary { positive: 0, neutral: 0, negative: 1 }
        );

        let city = store.snapshot_at(Level::City, Some("15m"), t0() + secs(2));
        assert_eq!(city.items.len(), 1);
        let item = &city.items[0];
        assert_eq!(item.district, None);
        assert_eq!(item.count, 2);
        assert_eq!(
            item.sentiment_summary,
            SentimentSummary { positive: 1, neutral: 0, negative: 1 }
        );
    }

    #[test]
    fn test_unlabeled_observations_count_but_do_not_tally() {
        let store = AggregationStore::default();
        store.insert("Ankara", None, "sel", t0(), None);
        store.insert("Ankara", None, "sel", t0(), Some(SentimentLabel::Neutral));

        let snap = store.snapshot_at(Level::City, None, t0() + secs(5));
        assert_eq!(snap.items[0].count, 2);
        assert_eq!(snap.items[0].sentiment_summary.neutral, 1);
        assert_eq!(snap.items[0].sentiment_summary.positive + snap.items[0].sentiment_summary.negative, 0);
    }

    #[test]
    fn test_entries_outside_window_are_not_counted() {
        let store = AggregationStore::default();
        for i in 0..5 {
            store.insert("İzmir", None, "yangın", t0() + secs(i * 60), None);
        }

        // window 2m ending at t0+4m keeps entries at 2m, 3m, 4m
        let snap = store.snapshot_at(Level::City, Some("2m"), t0() + secs(240));
        assert_eq!(snap.total_count(), 3);
        // retention is still the default 15m, so nothing was evicted
        assert_eq!(snap.purged_count, 0);
    }

    #[test]
    fn test_entry_exactly_at_cutoff_is_kept() {
        let store = AggregationStore::new(60);
        store.insert("Bursa", None, "trafik", t0(), None);

        let snap = store.snapshot_at(Level::City, Some("60s"), t0() + secs(60));
        assert_eq!(snap.total_count(), 1);
        assert_eq!(snap.purged_count, 0);

        let snap = store.snapshot_at(Level::City, Some("60s"), t0() + secs(61));
        assert_eq!(snap.total_count(), 0);
        assert_eq!(snap.purged_count, 1);
        assert!(snap.items.is_empty());
    }

    #[test]
    fn test_eviction_is_monotonic_and_converges() {
        let store = AggregationStore::new(60);
        let key = AggregationKey::city_level("Konya", "enerji");
        for i in 0..10 {
            store.insert("Konya", None, "enerji", t0() + secs(i * 10), None);
        }

        let now = t0() + secs(120);
        let first = store.snapshot_at(Level::City, Some("1m"), now);
        let len_after_first = store.series_len(&key);
        let second = store.snapshot_at(Level::City, Some("1m"), now);
        let len_after_second = store.series_len(&key);

        // entries at 0..=50s are older than now-60s
        assert_eq!(first.purged_count, 6);
        assert_eq!(second.purged_count, 0);
        assert!(len_after_second <= len_after_first);
        assert_eq!(len_after_second, 4);
    }

    #[test]
    fn test_short_window_query_does_not_destroy_long_window_data() {
        let store = AggregationStore::new(60);
        store.insert("Van", None, "deprem", t0(), None);
        assert_eq!(store.retention_secs(), 60);

        let long = store.snapshot_at(Level::City, Some("1h"), t0() + secs(30));
        assert_eq!(long.total_count(), 1);
        assert_eq!(store.retention_secs(), 3600);

        let short = store.snapshot_at(Level::City, Some("10s"), t0() + secs(600));
        assert_eq!(short.total_count(), 0);
        assert_eq!(short.purged_count, 0);
        assert_eq!(store.retention_secs(), 3600);

        let long = store.snapshot_at(Level::City, Some("1h"), t0() + secs(600));
        assert_eq!(long.total_count(), 1);
    }

    #[test]
    fn test_snapshot_only_purges_requested_level() {
        let store = AggregationStore::new(60);
        store.insert("Adana", Some("Seyhan"), "sel", t0(), None);

        let snap = store.snapshot_at(Level::City, Some("1m"), t0() + secs(120));
        assert_eq!(snap.purged_count, 1);
        assert_eq!(store.series_len(&AggregationKey::district_level("Adana", "Seyhan", "sel")), 1);
    }

    #[test]
    fn test_purge_sweeps_all_levels() {
        let store = AggregationStore::new(60);
        store.insert("Adana", Some("Seyhan"), "sel", t0(), None);
        store.insert("Adana", Some("Seyhan"), "sel", t0() + secs(100), None);

        assert_eq!(store.purge(t0() + secs(120)), 2);
        assert_eq!(store.purge(t0() + secs(120)), 0);
        // keys survive with trimmed series
        assert_eq!(store.key_count(), 2);
    }

    #[test]
    fn test_blank_key_is_rejected() {
        let store = AggregationStore::default();
        assert!(!store.insert(" ", None, "sel", t0(), None));
        assert!(!store.insert("Muğla", None, "", t0(), None));
        assert_eq!(store.key_count(), 0);
    }

    #[test]
    fn test_blank_district_only_writes_city_level() {
        let store = AggregationStore::default();
        store.insert("Muğla", Some(""), "yangın", t0(), None);
        assert_eq!(store.key_count(), 1);
    }

    #[test]
    fn test_invalid_window_falls_back_to_default() {
        let store = AggregationStore::default();
        let snap = store.snapshot_at(Level::City, Some("soon"), t0());
        assert_eq!(snap.window_sec, 900);
    }

    #[test]
    fn test_items_ordered_by_key() {
        let store = AggregationStore::default();
        store.insert("İzmir", None, "sel", t0(), None);
        store.insert("Ankara", None, "trafik", t0(), None);
        store.insert("Ankara", None, "enerji", t0(), None);

        let snap = store.snapshot_at(Level::City, None, t0());
        let keys: Vec<_> = snap
            .items
            .iter()
            .map(|i| (i.city.as_str(), i.topic.as_str()))
            .collect();
        assert_eq!(keys, vec![("Ankara", "enerji"), ("Ankara", "trafik"), ("İzmir", "sel")]);
    }

    #[test]
    fn test_concurrent_writers_and_readers_see_paired_inserts() {
        let store = Arc::new(AggregationStore::default());
        let now = Utc::now();

        let writers: Vec<_> = (0..4)
            .map(|w| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        store.insert("Trabzon", Some(&format!("d{w}")), "yağış", now, None);
                    }
                })
            })
            .collect();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let city = store.snapshot_at(Level::City, Some("1h"), now);
                    let district = store.snapshot_at(Level::District, Some("1h"), now);
                    assert!(city.total_count() <= 1000);
                    assert!(district.total_count() <= 1000);
                }
            })
        };

        for w in writers {
            w.join().unwrap();
        }
        reader.join().unwrap();

        let city = store.snapshot_at(Level::City, Some("1h"), now);
        let district = store.snapshot_at(Level::District, Some("1h"), now);
        assert_eq!(city.total_count(), 1000);
        assert_eq!(district.total_count(), 1000);
    }
}
