//! # RediSearch-backed terms aggregation
//!
//! Runs a [`SearchRequest`] as an `FT.AGGREGATE` pipeline:
//!
//! ```text
//! FT.AGGREGATE <title> <filter query>
//!     [APPLY <script> AS __list_control_script]
//!     GROUPBY 1 @<field> REDUCE COUNT 0 AS doc_count
//!     [FILTER startswith(@<field>, "<prefix>")]
//!     SORTBY 2 @doc_count DESC
//!     [MAX <size>]
//!     TIMEOUT <ms> DIALECT 2
//! ```
//!
//! Active filters become query clauses: TAG equality for string fields,
//! numeric equality for number fields, boolean tags for boolean fields.
//! `terminate_after` has no RediSearch counterpart and is ignored.

use std::borrow::Cow;

use redis::{Value, aio::ConnectionManager, cmd, from_redis_value};

use crate::{
    aggregation::{FieldSource, TermsAggregation},
    errors::ControlError,
    escape::unescape_query,
    filters::{Filter, FilterClause},
    index_pattern::{FieldType, IndexPattern},
    search::{Bucket, SearchRequest, SearchResponse, SearchService},
    types::OptionValue,
};

const SCRIPT_ALIAS: &str = "__list_control_script";
const COUNT_ALIAS: &str = "doc_count";
const TAG_SEPARATOR: &str = "|";
const QUERY_DIALECT: u32 = 2;

/// A composable filter condition for RediSearch queries.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterCondition {
    TagEquals {
        field: String,
        values: Vec<String>,
    },
    NumericRange {
        field: String,
        min: Option<f64>,
        max: Option<f64>,
    },
    BooleanEquals {
        field: String,
        value: bool,
    },
    And(Vec<FilterCondition>),
    Or(Vec<FilterCondition>),
    Not(Box<FilterCondition>),
}

impl FilterCondition {
    /// Create a TAG field filter matching any of the given values (OR within field).
    #[inline]
    pub fn tag_in<S: Into<String>>(field: impl Into<String>, values: impl IntoIterator<Item = S>) -> Self {
        Self::TagEquals {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[inline]
    pub fn numeric_eq(field: impl Into<String>, value: f64) -> Self {
        Self::NumericRange {
            field: field.into(),
            min: Some(value),
            max: Some(value),
        }
    }

    #[inline]
    pub fn bool_eq(field: impl Into<String>, value: bool) -> Self {
        Self::BooleanEquals {
            field: field.into(),
            value,
        }
    }

    #[inline]
    pub fn or(conditions: impl IntoIterator<Item = FilterCondition>) -> Self {
        Self::Or(conditions.into_iter().collect())
    }

    #[inline]
    pub fn negate(condition: FilterCondition) -> Self {
        Self::Not(Box::new(condition))
    }

    /// Convert this condition to a RediSearch query clause.
    pub fn to_query_clause(&self) -> String {
        match self {
            Self::TagEquals { field, values } => {
                let escaped: Vec<String> = values.iter().map(|v| escape_for_tag_query(v)).collect();
                format!("(@{}:{{{}}})", field, escaped.join(TAG_SEPARATOR))
            }
            Self::NumericRange { field, min, max } => {
                let min_s = min.map(format_numeric).unwrap_or_else(|| "-inf".to_string());
                let max_s = max.map(format_numeric).unwrap_or_else(|| "+inf".to_string());
                format!("(@{}:[{} {}])", field, min_s, max_s)
            }
            Self::BooleanEquals { field, value } => {
                let normalized = if *value { "true" } else { "false" };
                format!("(@{}:{{{}}})", field, normalized)
            }
            Self::And(conditions) => join_clauses(conditions, " "),
            Self::Or(conditions) => join_clauses(conditions, "|"),
            Self::Not(inner) => {
                let clause = inner.to_query_clause();
                if clause.is_empty() { clause } else { format!("-{clause}") }
            }
        }
    }
}

fn join_clauses(conditions: &[FilterCondition], separator: &str) -> String {
    let clauses: Vec<String> = conditions
        .iter()
        .map(FilterCondition::to_query_clause)
        .filter(|s| !s.is_empty())
        .collect();
    match clauses.len() {
        0 => String::new(),
        1 => clauses.into_iter().next().unwrap_or_default(),
        _ => format!("({})", clauses.join(separator)),
    }
}

/// Translate a stored filter into a query condition.
///
/// Disabled filters and script filters yield `None`; scripted values only exist
/// inside the aggregation pipeline, so the query cannot constrain them. Filters
/// owned by another index pattern, or on a field `index` lacks, also yield `None`
/// since RediSearch rejects queries naming unknown fields.
pub fn filter_condition(filter: &Filter, index: &IndexPattern) -> Result<Option<FilterCondition>, ControlError> {
    if filter.meta.disabled {
        return Ok(None);
    }
    if !filter.meta.index.is_empty() && filter.meta.index != index.id {
        log::debug!(
            "skipping filter on {} from index pattern {}: query targets {}",
            filter.clause.field(),
            filter.meta.index,
            index.id
        );
        return Ok(None);
    }

    let (field, values) = match &filter.clause {
        FilterClause::Phrase { field, value } => (field, std::slice::from_ref(value)),
        FilterClause::Phrases { field, values } => (field, values.as_slice()),
        FilterClause::ScriptPhrase { field, .. } => {
            log::warn!("skipping script filter on {field}: not expressible as a RediSearch query");
            return Ok(None);
        }
    };

    let Some(descriptor) = index.field_by_name(field) else {
        log::debug!("skipping filter on {field}: not a field of {}", index.title);
        return Ok(None);
    };
    let field_type = descriptor.field_type.clone();

    let condition = match field_type {
        FieldType::Number => {
            let conditions = values
                .iter()
                .map(|value| {
                    value
                        .as_f64()
                        .map(|n| FilterCondition::numeric_eq(field.as_str(), n))
                        .ok_or_else(|| ControlError::invalid(format!("Invalid numeric value for {field}: {value}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            FilterCondition::or(conditions)
        }
        FieldType::Boolean => {
            let conditions = values
                .iter()
                .map(|value| {
                    value
                        .as_bool()
                        .map(|b| FilterCondition::bool_eq(field.as_str(), b))
                        .ok_or_else(|| ControlError::invalid(format!("Invalid boolean value for {field}: {value}")))
                })
                .collect::<Result<Vec<_>, _>>()?;
            FilterCondition::or(conditions)
        }
        _ => FilterCondition::tag_in(field.as_str(), values.iter().map(ToString::to_string)),
    };

    Ok(Some(if filter.meta.negate {
        FilterCondition::negate(condition)
    } else {
        condition
    }))
}

/// Build the `FT.AGGREGATE` query string for the request's filters.
pub fn build_query(filters: &[Filter], index: &IndexPattern) -> Result<String, ControlError> {
    let mut conditions = Vec::with_capacity(filters.len());
    for filter in filters {
        if let Some(condition) = filter_condition(filter, index)? {
            conditions.push(condition);
        }
    }

    let query = FilterCondition::And(conditions).to_query_clause();
    if query.is_empty() { Ok("*".to_string()) } else { Ok(query) }
}

/// Arguments following `FT.AGGREGATE` for `request`.
pub fn aggregate_args(request: &SearchRequest) -> Result<Vec<String>, ControlError> {
    let aggs = &request.aggs;
    let mut args = vec![request.index.title.clone(), build_query(&request.filter, &request.index)?];

    let key = match &aggs.source {
        FieldSource::Named(name) => name.clone(),
        FieldSource::Scripted { source, lang, .. } => {
            log::debug!("applying {lang} script as RediSearch expression");
            args.extend(["APPLY".to_string(), source.clone(), "AS".to_string(), SCRIPT_ALIAS.to_string()]);
            SCRIPT_ALIAS.to_string()
        }
    };

    args.extend([
        "GROUPBY".to_string(),
        "1".to_string(),
        format!("@{key}"),
        "REDUCE".to_string(),
        "COUNT".to_string(),
        "0".to_string(),
        "AS".to_string(),
        COUNT_ALIAS.to_string(),
    ]);

    if let Some(pattern) = &aggs.include {
        let prefix = include_prefix(pattern)?;
        args.push("FILTER".to_string());
        args.push(format!("startswith(@{key}, \"{}\")", escape_expression_string(&prefix)));
    }

    args.extend([
        "SORTBY".to_string(),
        "2".to_string(),
        format!("@{COUNT_ALIAS}"),
        aggs.order.as_str().to_string(),
    ]);

    if let Some(size) = aggs.size {
        args.push("MAX".to_string());
        args.push(size.to_string());
    }

    args.push("TIMEOUT".to_string());
    args.push(request.timeout_millis()?.to_string());
    args.push("DIALECT".to_string());
    args.push(QUERY_DIALECT.to_string());

    if request.terminate_after > 0 {
        log::debug!(
            "terminate_after={} has no RediSearch equivalent; relying on TIMEOUT",
            request.terminate_after
        );
    }

    Ok(args)
}

/// Literal prefix encoded by an include pattern of the form `<escaped text>.*`.
fn include_prefix(pattern: &str) -> Result<String, ControlError> {
    pattern
        .strip_suffix(".*")
        .and_then(unescape_query)
        .ok_or_else(|| ControlError::invalid(format!("include pattern is not a literal prefix: {pattern}")))
}

fn escape_expression_string(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '\\' | '"') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyKind {
    Text,
    Number,
    Bool,
}

fn key_kind(aggs: &TermsAggregation, index: &IndexPattern) -> KeyKind {
    match &aggs.source {
        FieldSource::Scripted { value_type, .. } => match value_type.as_str() {
            "float" | "number" | "long" | "double" => KeyKind::Number,
            "boolean" => KeyKind::Bool,
            _ => KeyKind::Text,
        },
        FieldSource::Named(name) => match index.field_by_name(name).map(|f| &f.field_type) {
            Some(FieldType::Number) => KeyKind::Number,
            Some(FieldType::Boolean) => KeyKind::Bool,
            _ => KeyKind::Text,
        },
    }
}

fn key_alias(aggs: &TermsAggregation) -> &str {
    match &aggs.source {
        FieldSource::Named(name) => name,
        FieldSource::Scripted { .. } => SCRIPT_ALIAS,
    }
}

fn convert_key(raw: String, kind: KeyKind) -> OptionValue {
    match kind {
        KeyKind::Number => raw
            .parse::<serde_json::Number>()
            .map(OptionValue::Number)
            .unwrap_or(OptionValue::Text(raw)),
        KeyKind::Bool => match raw.as_str() {
            "true" | "1" => OptionValue::Bool(true),
            "false" | "0" => OptionValue::Bool(false),
            _ => OptionValue::Text(raw),
        },
        KeyKind::Text => OptionValue::Text(raw),
    }
}

/// Parse an `FT.AGGREGATE` reply into terms buckets.
pub fn parse_aggregate_response(raw: &Value, request: &SearchRequest) -> Result<SearchResponse, ControlError> {
    let rows = match raw {
        Value::Array(values) => values,
        Value::Nil => return Ok(SearchResponse::from_buckets(Vec::new())),
        other => {
            return Err(ControlError::Other {
                message: Cow::Owned(format!("Unexpected aggregate response: {:?}", other)),
            });
        }
    };

    let alias = key_alias(&request.aggs);
    let kind = key_kind(&request.aggs, &request.index);
    let mut buckets = Vec::with_capacity(rows.len().saturating_sub(1));

    // First element is the total group count.
    for row in rows.iter().skip(1) {
        let mut key = None;
        let mut doc_count = 0_u64;
        for (name, value) in row_pairs(row)? {
            if name == alias {
                if matches!(value, Value::Nil) {
                    continue;
                }
                key = Some(value_to_string(value)?);
            } else if name == COUNT_ALIAS {
                doc_count = value_to_string(value)?.parse::<u64>().map_err(|err| ControlError::Other {
                    message: Cow::Owned(format!("Invalid bucket count in aggregate response: {}", err)),
                })?;
            }
        }

        if let Some(key) = key {
            buckets.push(Bucket {
                key: convert_key(key, kind),
                doc_count,
            });
        }
    }

    Ok(SearchResponse::from_buckets(buckets))
}

fn row_pairs(row: &Value) -> Result<Vec<(String, &Value)>, ControlError> {
    let mut pairs = Vec::new();
    match row {
        Value::Array(items) => {
            for chunk in items.chunks(2) {
                if chunk.len() == 2 {
                    pairs.push((value_to_string(&chunk[0])?, &chunk[1]));
                }
            }
        }
        Value::Map(entries) => {
            for (name, value) in entries {
                pairs.push((value_to_string(name)?, value));
            }
        }
        other => {
            return Err(ControlError::Other {
                message: Cow::Owned(format!("Unexpected aggregate row: {:?}", other)),
            });
        }
    }
    Ok(pairs)
}

fn value_to_string(value: &Value) -> Result<String, ControlError> {
    match value {
        Value::BulkString(bytes) => String::from_utf8(bytes.clone()).map_err(|err| ControlError::Other {
            message: Cow::Owned(format!("Invalid UTF-8 in aggregate response: {}", err)),
        }),
        Value::SimpleString(status) => Ok(status.clone()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Double(v) => Ok(v.to_string()),
        Value::Boolean(v) => Ok(v.to_string()),
        Value::VerbatimString { text, .. } => Ok(text.clone()),
        _ => from_redis_value::<String>(value).map_err(|err| ControlError::Other {
            message: Cow::Owned(format!("Unexpected aggregate value type: {}", err)),
        }),
    }
}

/// Escape a value for RediSearch TAG field queries.
///
/// # Examples
///
/// ```
/// use list_control::search::redisearch::escape_for_tag_query;
///
/// assert_eq!(escape_for_tag_query("active"), "active");
/// assert_eq!(escape_for_tag_query("test-user"), "test\\-user");
/// assert_eq!(escape_for_tag_query("a|b"), "a\\|b");
/// assert_eq!(escape_for_tag_query("list.test"), "list\\.test");
/// ```
pub fn escape_for_tag_query(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '$' | '{' | '}' | '\\' | '|' | '.' | '-' => {
                escaped.push('\\');
                escaped.push(ch);
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

fn format_numeric(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        value.to_string()
    }
}

/// [`SearchService`] running terms aggregations through RediSearch.
#[derive(Clone)]
pub struct RediSearchService {
    conn: ConnectionManager,
}

impl RediSearchService {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Connect to the Redis instance at `url`.
    pub async fn connect(url: &str) -> Result<Self, ControlError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self::new(conn))
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl SearchService for RediSearchService {
    async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, ControlError> {
        let args = aggregate_args(request)?;
        let mut command = cmd("FT.AGGREGATE");
        for arg in &args {
            command.arg(arg);
        }

        let mut conn = self.conn.clone();
        let raw: Value = command
            .query_async(&mut conn)
            .await
            .map_err(|err| ControlError::SearchExecution {
                message: err.to_string(),
            })?;

        let response = parse_aggregate_response(&raw, request)?;
        log::debug!(
            "FT.AGGREGATE on {} returned {} bucket(s)",
            request.index.title,
            response.buckets().len()
        );
        Ok(response)
    }
}
