//! # Search Requests and Terms Responses
//!
//! Controls talk to the backing index through [`SearchService`]: they hand over a
//! [`SearchRequest`] (the search-source configuration) and get a
//! [`SearchResponse`] whose `aggregations.termsAgg.buckets` become options.
//!
//! ## Request Shape
//!
//! ```text
//! {
//!   "timeout": "1s",
//!   "terminate_after": 100000,
//!   "size": 0,
//!   "index": {"id": "logs", "title": "logs-*", "fields": [...]},
//!   "filter": [...],
//!   "aggs": {"termsAgg": {"terms": {...}}}
//! }
//! ```
//!
//! Requests never inherit ambient time ranges or global query state; the only
//! filters applied are the ones listed in `filter`.

pub mod redisearch;

use serde::{Deserialize, Serialize};

use crate::{
    aggregation::TermsAggregation,
    errors::ControlError,
    filters::Filter,
    index_pattern::IndexPattern,
    types::{OptionSet, OptionValue},
};

pub use redisearch::RediSearchService;

/// Per-request time budget handed to the backend.
pub const DEFAULT_TIMEOUT: &str = "1s";
/// Per-shard document count after which the backend stops collecting.
pub const DEFAULT_TERMINATE_AFTER: u64 = 100_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Search-source configuration for one aggregation-only query.
#[derive(Debug, Clone, Serialize)]
pub struct SearchRequest {
    pub timeout: String,
    pub terminate_after: u64,
    /// Number of hits to return; always zero for option discovery.
    pub size: u64,
    pub index: IndexPattern,
    pub filter: Vec<Filter>,
    pub aggs: TermsAggregation,
}

impl SearchRequest {
    /// Aggregation-only request with the default cost bounds.
    pub fn terms(index: IndexPattern, filter: Vec<Filter>, aggs: TermsAggregation) -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT.to_string(),
            terminate_after: DEFAULT_TERMINATE_AFTER,
            size: 0,
            index,
            filter,
            aggs,
        }
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: impl Into<String>) -> Self {
        self.timeout = timeout.into();
        self
    }

    #[inline]
    pub fn with_terminate_after(mut self, terminate_after: u64) -> Self {
        self.terminate_after = terminate_after;
        self
    }

    /// Parse `timeout` (`"1s"`, `"250ms"`, `"2m"`, or bare milliseconds) into milliseconds.
    pub fn timeout_millis(&self) -> Result<u64, ControlError> {
        parse_duration_millis(&self.timeout)
    }
}

pub(crate) fn parse_duration_millis(raw: &str) -> Result<u64, ControlError> {
    let trimmed = raw.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(trimmed.len());
    let (digits, unit) = trimmed.split_at(split);
    let amount = digits
        .parse::<u64>()
        .map_err(|_| ControlError::invalid(format!("Invalid timeout: {raw}")))?;
    let factor = match unit {
        "" | "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        other => {
            return Err(ControlError::invalid(format!("Unsupported timeout unit: {other}")));
        }
    };
    Ok(amount.saturating_mul(factor))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bucket {
    pub key: OptionValue,
    #[serde(default)]
    pub doc_count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TermsBuckets {
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregations {
    #[serde(rename = "termsAgg", default, skip_serializing_if = "Option::is_none")]
    pub terms_agg: Option<TermsBuckets>,
}

/// Backend response; every level may be absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Aggregations>,
}

impl SearchResponse {
    pub fn from_buckets(buckets: Vec<Bucket>) -> Self {
        Self {
            aggregations: Some(Aggregations {
                terms_agg: Some(TermsBuckets { buckets }),
            }),
        }
    }

    pub fn buckets(&self) -> &[Bucket] {
        self.aggregations
            .as_ref()
            .and_then(|aggs| aggs.terms_agg.as_ref())
            .map(|terms| terms.buckets.as_slice())
            .unwrap_or_default()
    }

    /// Bucket keys in response order; empty when the terms path is missing.
    pub fn bucket_keys(&self) -> OptionSet {
        self.buckets().iter().map(|bucket| bucket.key.clone()).collect()
    }
}

/// Executes aggregation requests against the backing index.
#[allow(async_fn_in_trait)]
pub trait SearchService {
    async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, ControlError>;
}
