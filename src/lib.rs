pub mod aggregate;
pub mod classify;
pub mod config;
pub mod enrich;
pub mod error;
pub mod labels;
pub mod output;
pub mod pipeline;
pub mod record;
pub mod validate;
