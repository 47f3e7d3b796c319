use std::collections::HashMap;
use std::fmt;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::{aggregation::FieldSource, errors::ControlError};

/// Field type as reported by index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Ip,
    GeoPoint,
    Other(String),
}

impl FieldType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Ip => "ip",
            Self::GeoPoint => "geo_point",
            Self::Other(name) => name,
        }
    }

    /// Aggregation value type for scripted values of this type.
    pub fn value_type(&self) -> &str {
        match self {
            Self::Number => "float",
            other => other.as_str(),
        }
    }
}

impl From<String> for FieldType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "string" => Self::String,
            "number" => Self::Number,
            "boolean" => Self::Boolean,
            "date" => Self::Date,
            "ip" => Self::Ip,
            "geo_point" => Self::GeoPoint,
            _ => Self::Other(value),
        }
    }
}

impl From<FieldType> for String {
    fn from(value: FieldType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field metadata resolved from an index pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub scripted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lang: Option<String>,
}

impl FieldDescriptor {
    pub fn named(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            scripted: false,
            script: None,
            lang: None,
        }
    }

    pub fn scripted(
        name: impl Into<String>,
        field_type: FieldType,
        script: impl Into<String>,
        lang: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            field_type,
            scripted: true,
            script: Some(script.into()),
            lang: Some(lang.into()),
        }
    }

    /// Convert the descriptor into an aggregation source.
    ///
    /// A scripted descriptor without its script or language is rejected here, so an
    /// aggregation can never be built with neither a field nor a script.
    pub fn source(&self) -> Result<FieldSource, ControlError> {
        if !self.scripted {
            if self.name.is_empty() {
                return Err(ControlError::invalid("field descriptor has no name"));
            }
            return Ok(FieldSource::Named(self.name.clone()));
        }

        match (&self.script, &self.lang) {
            (Some(script), Some(lang)) => Ok(FieldSource::Scripted {
                source: script.clone(),
                lang: lang.clone(),
                value_type: self.field_type.value_type().to_string(),
            }),
            _ => Err(ControlError::invalid(format!(
                "scripted field \"{}\" is missing its script or script language",
                self.name
            ))),
        }
    }
}

/// A searchable index and the fields it exposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexPattern {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

impl IndexPattern {
    pub fn new(id: impl Into<String>, title: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            fields,
        }
    }

    pub fn field_by_name(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|field| field.name == name)
    }
}

/// Resolves index pattern ids into index metadata.
#[allow(async_fn_in_trait)]
pub trait IndexPatternProvider {
    /// Fails with [`ControlError::IndexPatternNotFound`] for unknown ids.
    async fn get(&self, id: &str) -> Result<IndexPattern, ControlError>;
}

/// Process-local index pattern registry.
#[derive(Debug, Default)]
pub struct InMemoryIndexPatterns {
    patterns: RwLock<HashMap<String, IndexPattern>>,
}

impl InMemoryIndexPatterns {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pattern(self, pattern: IndexPattern) -> Self {
        self.register(pattern);
        self
    }

    pub fn register(&self, pattern: IndexPattern) {
        self.patterns
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern.id.clone(), pattern);
    }

    pub fn unregister(&self, id: &str) -> Option<IndexPattern> {
        self.patterns.write().unwrap_or_else(PoisonError::into_inner).remove(id)
    }
}

impl IndexPatternProvider for InMemoryIndexPatterns {
    async fn get(&self, id: &str) -> Result<IndexPattern, ControlError> {
        self.patterns
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| ControlError::IndexPatternNotFound { id: id.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_type_round_trips_through_strings() {
        let parsed: FieldType = serde_json::from_str("\"geo_point\"").expect("valid json");
        assert_eq!(parsed, FieldType::GeoPoint);
        let other: FieldType = serde_json::from_str("\"murmur3\"").expect("valid json");
        assert_eq!(other, FieldType::Other("murmur3".to_string()));
        assert_eq!(serde_json::to_string(&FieldType::Number).expect("serializes"), "\"number\"");
    }

    #[test]
    fn number_scripts_aggregate_as_float() {
        let field = FieldDescriptor::scripted("bytes_kb", FieldType::Number, "doc['bytes'].value / 1024", "painless");
        match field.source().expect("valid scripted field") {
            FieldSource::Scripted { value_type, .. } => assert_eq!(value_type, "float"),
            other => panic!("expected scripted source, got {other:?}"),
        }
    }

    #[test]
    fn scripted_field_without_script_is_rejected() {
        let mut field = FieldDescriptor::scripted("broken", FieldType::String, "x", "painless");
        field.script = None;
        let err = field.source().expect_err("missing script should fail");
        assert!(matches!(err, ControlError::InvalidRequest { message } if message.contains("broken")));
    }

    #[test]
    fn field_descriptor_reads_metadata_json() {
        let field: FieldDescriptor =
            serde_json::from_str(r#"{"name":"status","type":"string"}"#).expect("valid descriptor");
        assert_eq!(field, FieldDescriptor::named("status", FieldType::String));
    }

    #[tokio::test]
    async fn registry_resolves_and_reports_missing_ids() {
        let patterns = InMemoryIndexPatterns::new().with_pattern(IndexPattern::new(
            "logs",
            "logs-*",
            vec![FieldDescriptor::named("status", FieldType::String)],
        ));

        let pattern = patterns.get("logs").await.expect("registered pattern");
        assert_eq!(pattern.title, "logs-*");
        assert!(pattern.field_by_name("status").is_some());
        assert!(pattern.field_by_name("missing").is_none());

        let err = patterns.get("metrics").await.expect_err("unknown id");
        assert!(matches!(err, ControlError::IndexPatternNotFound { id } if id == "metrics"));
    }
}
