use std::sync::Arc;

use crate::{
    errors::ControlError,
    filters::{Filter, FilterClause, FilterMeta, FilterStore},
    index_pattern::IndexPattern,
    types::{ControlValue, OptionValue},
};

/// Default separator used to render multi-select values.
pub const DEFAULT_DELIMITER: &str = ",";

/// Maps a control's selection onto phrase filters in the shared filter store.
#[derive(Clone)]
pub struct PhraseFilterManager {
    control_id: String,
    field_name: String,
    index_pattern: IndexPattern,
    store: Arc<dyn FilterStore>,
    delimiter: String,
}

impl std::fmt::Debug for PhraseFilterManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhraseFilterManager")
            .field("control_id", &self.control_id)
            .field("field_name", &self.field_name)
            .field("index_pattern", &self.index_pattern.id)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl PhraseFilterManager {
    pub fn new(
        control_id: impl Into<String>,
        field_name: impl Into<String>,
        index_pattern: IndexPattern,
        store: Arc<dyn FilterStore>,
    ) -> Self {
        Self {
            control_id: control_id.into(),
            field_name: field_name.into(),
            index_pattern,
            store,
            delimiter: DEFAULT_DELIMITER.to_string(),
        }
    }

    #[inline]
    pub fn with_delimiter(mut self, delimiter: impl Into<String>) -> Self {
        self.delimiter = delimiter.into();
        self
    }

    pub fn control_id(&self) -> &str {
        &self.control_id
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn index_pattern(&self) -> &IndexPattern {
        &self.index_pattern
    }

    pub fn store(&self) -> &Arc<dyn FilterStore> {
        &self.store
    }

    /// Build the phrase filter for `value` without touching the store.
    pub fn build_filter(&self, value: &ControlValue) -> Result<Filter, ControlError> {
        let values: Vec<OptionValue> = value.values().to_vec();
        if values.is_empty() {
            return Err(ControlError::invalid(format!(
                "phrase filter on {} requires at least one value",
                self.field_name
            )));
        }

        let field = self.field_name.clone();
        let scripted = self.index_pattern.field_by_name(&self.field_name).filter(|f| f.scripted);
        let clause = match scripted {
            Some(descriptor) => {
                let (Some(script), Some(lang)) = (&descriptor.script, &descriptor.lang) else {
                    return Err(ControlError::invalid(format!(
                        "scripted field \"{}\" is missing its script or script language",
                        descriptor.name
                    )));
                };
                FilterClause::ScriptPhrase {
                    field,
                    script: script.clone(),
                    lang: lang.clone(),
                    values,
                }
            }
            None => match <[OptionValue; 1]>::try_from(values) {
                Ok([value]) => FilterClause::Phrase { field, value },
                Err(values) => FilterClause::Phrases { field, values },
            },
        };

        let meta = FilterMeta {
            index: self.index_pattern.id.clone(),
            controlled_by: Some(self.control_id.clone()),
            disabled: false,
            negate: false,
        };

        Ok(Filter::new(meta, clause))
    }

    /// Add (or replace) this control's filter in the shared store.
    pub fn create_filter(&self, value: &ControlValue) -> Result<Filter, ControlError> {
        let filter = self.build_filter(value)?;
        self.store.add_filter(filter.clone());
        log::debug!(
            "control {} set filter on {} to [{}]",
            self.control_id,
            self.field_name,
            value.join(&self.delimiter)
        );
        Ok(filter)
    }

    /// Remove this control's filter from the shared store; absent filters are ignored.
    pub fn remove_filter(&self) {
        let removed = self.store.remove_filter(&self.control_id);
        if removed > 0 {
            log::debug!("control {} removed {} filter(s)", self.control_id, removed);
        }
    }

    /// Read this control's current selection back out of the filter store.
    pub fn get_value_from_filter_bar(&self) -> Option<ControlValue> {
        let mut values: Vec<OptionValue> = self
            .store
            .get_filters()
            .into_iter()
            .filter(|filter| filter.is_controlled_by(&self.control_id) && filter.clause.field() == self.field_name)
            .flat_map(|filter| filter.clause.values().to_vec())
            .collect();

        match values.len() {
            0 => None,
            1 => values.pop().map(ControlValue::Single),
            _ => Some(ControlValue::Multi(values)),
        }
    }
}
