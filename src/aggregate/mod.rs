//! Sliding-window aggregation of topic/sentiment activity.
//!
//! [`AggregationStore`] is created once at startup and shared by the
//! ingestion worker (writer) and snapshot callers (readers).

mod store;
pub mod types;
pub mod window;

pub use store::AggregationStore;
pub use types::{AggregateItem, AggregationKey, Level, SentimentSummary, Snapshot};
pub use window::{DEFAULT_WINDOW_SECS, parse_window};
