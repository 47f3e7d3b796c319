use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Number;

/// A single selectable value: a terms bucket key or a selected filter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Number(Number),
    Text(String),
}

impl OptionValue {
    /// Float view of the value, parsing text when it holds a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => n.as_f64(),
            Self::Text(s) => s.trim().parse::<f64>().ok(),
            Self::Bool(_) => None,
        }
    }

    /// Boolean view of the value, accepting `"true"`/`"false"` text.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Self::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<f64> for OptionValue {
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or_else(|| Self::Text(value.to_string()), Self::Number)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Ordered option list shown by a list control.
///
/// Built from terms buckets, so entries are unique and ordered by bucket count.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionSet(Vec<OptionValue>);

impl OptionSet {
    pub fn new(values: Vec<OptionValue>) -> Self {
        Self(values)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OptionValue> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[OptionValue] {
        &self.0
    }

    pub fn contains(&self, value: &OptionValue) -> bool {
        self.0.contains(value)
    }

    pub fn into_vec(self) -> Vec<OptionValue> {
        self.0
    }
}

impl FromIterator<OptionValue> for OptionSet {
    fn from_iter<I: IntoIterator<Item = OptionValue>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a OptionSet {
    type Item = &'a OptionValue;
    type IntoIter = std::slice::Iter<'a, OptionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Current selection of a list control: one value or a multi-select sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ControlValue {
    Multi(Vec<OptionValue>),
    Single(OptionValue),
}

impl ControlValue {
    /// Whether the selection carries anything to filter on.
    ///
    /// Sequences and text count by length; numbers and booleans are present once set.
    pub fn has_value(&self) -> bool {
        match self {
            Self::Multi(values) => !values.is_empty(),
            Self::Single(OptionValue::Text(text)) => !text.is_empty(),
            Self::Single(_) => true,
        }
    }

    pub fn values(&self) -> &[OptionValue] {
        match self {
            Self::Multi(values) => values,
            Self::Single(value) => std::slice::from_ref(value),
        }
    }

    /// Render the selection for display, joining multi-select values.
    pub fn join(&self, delimiter: &str) -> String {
        self.values()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(delimiter)
    }
}

impl From<OptionValue> for ControlValue {
    fn from(value: OptionValue) -> Self {
        Self::Single(value)
    }
}

impl From<&str> for ControlValue {
    fn from(value: &str) -> Self {
        Self::Single(value.into())
    }
}

impl From<Vec<OptionValue>> for ControlValue {
    fn from(values: Vec<OptionValue>) -> Self {
        Self::Multi(values)
    }
}
