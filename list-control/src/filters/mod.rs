//! Filter clauses and the shared filter store controls read and write.
//!
//! The store is an injected capability: each control receives an explicit
//! `Arc<dyn FilterStore>` handle, so several controls can share one store and
//! tests can substitute their own.

pub mod phrase;

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::types::OptionValue;

pub use phrase::PhraseFilterManager;

/// Bookkeeping attached to every filter clause.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterMeta {
    /// Index pattern id the filter was built against.
    pub index: String,
    /// Id of the control that owns this filter, if any.
    #[serde(default, rename = "controlledBy", skip_serializing_if = "Option::is_none")]
    pub controlled_by: Option<String>,
    #[serde(default)]
    pub disabled: bool,
    #[serde(default)]
    pub negate: bool,
}

/// Constraint a filter applies to one field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterClause {
    /// Field equals one exact value.
    Phrase { field: String, value: OptionValue },
    /// Field equals any of several exact values.
    Phrases { field: String, values: Vec<OptionValue> },
    /// Scripted field value equals any of the given values.
    ScriptPhrase {
        field: String,
        script: String,
        lang: String,
        values: Vec<OptionValue>,
    },
}

impl FilterClause {
    pub fn field(&self) -> &str {
        match self {
            Self::Phrase { field, .. } | Self::Phrases { field, .. } | Self::ScriptPhrase { field, .. } => field,
        }
    }

    pub fn values(&self) -> &[OptionValue] {
        match self {
            Self::Phrase { value, .. } => std::slice::from_ref(value),
            Self::Phrases { values, .. } | Self::ScriptPhrase { values, .. } => values,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub meta: FilterMeta,
    #[serde(flatten)]
    pub clause: FilterClause,
}

impl Filter {
    pub fn new(meta: FilterMeta, clause: FilterClause) -> Self {
        Self { meta, clause }
    }

    #[inline]
    pub fn is_controlled_by(&self, control_id: &str) -> bool {
        self.meta.controlled_by.as_deref() == Some(control_id)
    }
}

/// Shared store of active filters.
///
/// Adding a filter owned by a control replaces that control's previous filter.
/// Removing a filter that is not present is a no-op.
pub trait FilterStore: Send + Sync {
    fn get_filters(&self) -> Vec<Filter>;

    fn add_filter(&self, filter: Filter);

    /// Remove every filter owned by `control_id`, returning how many were dropped.
    fn remove_filter(&self, control_id: &str) -> usize;
}

/// Process-local filter store.
#[derive(Debug, Default)]
pub struct InMemoryFilterStore {
    filters: RwLock<Vec<Filter>>,
}

impl InMemoryFilterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_filters(filters: impl IntoIterator<Item = Filter>) -> Self {
        Self {
            filters: RwLock::new(filters.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FilterStore for InMemoryFilterStore {
    fn get_filters(&self) -> Vec<Filter> {
        self.filters.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn add_filter(&self, filter: Filter) {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(owner) = filter.meta.controlled_by.as_deref() {
            filters.retain(|existing| !existing.is_controlled_by(owner));
        }
        filters.push(filter);
    }

    fn remove_filter(&self, control_id: &str) -> usize {
        let mut filters = self.filters.write().unwrap_or_else(PoisonError::into_inner);
        let before = filters.len();
        filters.retain(|existing| !existing.is_controlled_by(control_id));
        before - filters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned_phrase(owner: &str, value: &str) -> Filter {
        Filter::new(
            FilterMeta {
                index: "logs".to_string(),
                controlled_by: Some(owner.to_string()),
                ..FilterMeta::default()
            },
            FilterClause::Phrase {
                field: "status".to_string(),
                value: value.into(),
            },
        )
    }

    #[test]
    fn adding_for_same_control_replaces() {
        let store = InMemoryFilterStore::new();
        store.add_filter(owned_phrase("c1", "ok"));
        store.add_filter(owned_phrase("c1", "err"));
        store.add_filter(owned_phrase("c2", "ok"));

        let filters = store.get_filters();
        assert_eq!(filters.len(), 2);
        assert_eq!(filters[0].clause.values(), &[OptionValue::from("err")]);
    }

    #[test]
    fn removing_absent_filter_is_noop() {
        let store = InMemoryFilterStore::with_filters([owned_phrase("c1", "ok")]);
        assert_eq!(store.remove_filter("missing"), 0);
        assert_eq!(store.len(), 1);
        assert_eq!(store.remove_filter("c1"), 1);
        assert!(store.is_empty());
    }

    #[test]
    fn filter_serializes_flat() {
        let value = serde_json::to_value(owned_phrase("c1", "ok")).expect("filter serializes");
        assert_eq!(
            value,
            serde_json::json!({
                "meta": {"index": "logs", "controlledBy": "c1", "disabled": false, "negate": false},
                "type": "phrase",
                "field": "status",
                "value": "ok"
            })
        );
    }
}
