//! Terms-aggregation construction.
//!
//! A terms aggregation groups matching documents by the distinct values of one
//! field (or scripted value) and returns the most frequent groups. The wire shape
//! produced here is:
//!
//! ```text
//! {"termsAgg": {"terms": {"field": "status", "order": {"_count": "desc"}, "size": 5}}}
//! ```

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};

use crate::search::SortOrder;

/// Name the aggregation is registered under in requests and responses.
pub const TERMS_AGG_NAME: &str = "termsAgg";

/// What a terms aggregation groups on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    Named(String),
    Scripted {
        source: String,
        lang: String,
        value_type: String,
    },
}

/// A bounded terms aggregation over one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsAggregation {
    pub source: FieldSource,
    pub order: SortOrder,
    /// Bucket cap; `None` leaves the backend default in place.
    pub size: Option<u64>,
    /// Pattern restricting which term values produce buckets.
    pub include: Option<String>,
}

impl TermsAggregation {
    #[inline]
    pub fn with_include(mut self, pattern: impl Into<String>) -> Self {
        self.include = Some(pattern.into());
        self
    }
}

/// Build a terms aggregation for `field`, ordered by bucket count.
///
/// `size` of `None` or `0` sets no cap; negative sizes clamp to `1`.
///
/// # Examples
///
/// ```
/// use list_control::aggregation::{FieldSource, build_terms_agg};
/// use list_control::search::SortOrder;
///
/// let agg = build_terms_agg(&FieldSource::Named("status".into()), Some(5), SortOrder::Desc);
/// assert_eq!(
///     serde_json::to_value(&agg).unwrap(),
///     serde_json::json!({"termsAgg": {"terms": {"field": "status", "order": {"_count": "desc"}, "size": 5}}})
/// );
/// ```
pub fn build_terms_agg(field: &FieldSource, size: Option<i64>, direction: SortOrder) -> TermsAggregation {
    let size = match size {
        None | Some(0) => None,
        Some(n) if n < 1 => Some(1),
        Some(n) => Some(n.unsigned_abs()),
    };

    TermsAggregation {
        source: field.clone(),
        order: direction,
        size,
        include: None,
    }
}

#[derive(Serialize)]
struct TermsBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    field: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    script: Option<ScriptBody<'a>>,
    #[serde(rename = "valueType", skip_serializing_if = "Option::is_none")]
    value_type: Option<&'a str>,
    order: CountOrder,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    include: Option<&'a str>,
}

#[derive(Serialize)]
struct ScriptBody<'a> {
    source: &'a str,
    lang: &'a str,
}

#[derive(Serialize)]
struct CountOrder {
    #[serde(rename = "_count")]
    count: SortOrder,
}

#[derive(Serialize)]
struct TermsWrapper<'a> {
    terms: TermsBody<'a>,
}

impl Serialize for TermsAggregation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (field, script, value_type) = match &self.source {
            FieldSource::Named(name) => (Some(name.as_str()), None, None),
            FieldSource::Scripted {
                source,
                lang,
                value_type,
            } => (
                None,
                Some(ScriptBody {
                    source: source.as_str(),
                    lang: lang.as_str(),
                }),
                Some(value_type.as_str()),
            ),
        };

        let body = TermsWrapper {
            terms: TermsBody {
                field,
                script,
                value_type,
                order: CountOrder { count: self.order },
                size: self.size,
                include: self.include.as_deref(),
            },
        };

        let mut map = BTreeMap::new();
        map.insert(TERMS_AGG_NAME, body);
        map.serialize(serializer)
    }
}
