//! List controls: a field's most frequent values offered as selectable options.
//!
//! A [`ListControl`] is built by [`create_list_control`], which resolves the
//! field, runs a terms aggregation, and disables the control when the field has
//! no values. Refreshing is a two-step transaction: [`ListControl::fetch`]
//! computes a new [`ControlState`] tagged with a request token, and
//! [`ListControl::apply`] installs it only if no newer fetch was issued since.

pub mod factory;

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::{
    config::ListControlConfig,
    errors::ControlError,
    escape::escape_query,
    filters::PhraseFilterManager,
    search::SearchService,
    types::{ControlValue, OptionSet},
};

pub use factory::{ControlServices, FieldLookup, create_list_control, lookup_field};

const FALLBACK_DISABLED_REASON: &str = "Control is disabled.";

/// Reason shown when a field has no values in its index pattern.
pub fn no_values_disable_msg(field_name: &str, index_pattern_title: &str) -> String {
    format!(
        "Filtering occurs on the \"{field_name}\" field, which doesn't exist on any documents in the \
         \"{index_pattern_title}\" index pattern. Choose a different field or index documents that contain \
         values for this field."
    )
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlOptions {
    /// Number of options to request; falls back to the configured default.
    #[serde(default)]
    pub size: Option<i64>,
    /// Query the index for matching options as the user types.
    ///
    /// Only honoured for string fields; the factory turns it off for other types.
    #[serde(default = "default_true")]
    pub dynamic_options: bool,
    #[serde(default = "default_true")]
    pub multiselect: bool,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self {
            size: None,
            dynamic_options: true,
            multiselect: true,
        }
    }
}

/// Saved parameters describing one list control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlParams {
    pub id: String,
    pub field_name: String,
    /// Id of the index pattern the field belongs to.
    pub index_pattern: String,
    #[serde(default)]
    pub options: ControlOptions,
}

impl ControlParams {
    pub fn new(id: impl Into<String>, field_name: impl Into<String>, index_pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            field_name: field_name.into(),
            index_pattern: index_pattern.into(),
            options: ControlOptions::default(),
        }
    }

    #[inline]
    pub fn with_options(mut self, options: ControlOptions) -> Self {
        self.options = options;
        self
    }
}

/// Whether a control accepts interaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ControlStatus {
    Enabled,
    /// Always carries a non-empty reason.
    Disabled { reason: String },
}

impl ControlStatus {
    pub fn disabled(reason: impl Into<String>) -> Self {
        let reason = reason.into();
        if reason.trim().is_empty() {
            Self::Disabled {
                reason: FALLBACK_DISABLED_REASON.to_string(),
            }
        } else {
            Self::Disabled { reason }
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Enabled => None,
            Self::Disabled { reason } => Some(reason),
        }
    }
}

/// Options and status produced by one option-discovery run.
#[derive(Debug, Clone, PartialEq)]
pub struct ControlState {
    pub options: OptionSet,
    pub status: ControlStatus,
}

impl ControlState {
    /// Enabled when there is at least one option, otherwise disabled with a no-values reason.
    pub fn from_options(options: OptionSet, field_name: &str, index_pattern_title: &str) -> Self {
        let status = if options.is_empty() {
            ControlStatus::disabled(no_values_disable_msg(field_name, index_pattern_title))
        } else {
            ControlStatus::Enabled
        };
        Self { options, status }
    }

    pub fn disabled(reason: impl Into<String>) -> Self {
        Self {
            options: OptionSet::default(),
            status: ControlStatus::disabled(reason),
        }
    }
}

/// Result of [`ListControl::fetch`], to be handed to [`ListControl::apply`].
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    token: u64,
    state: ControlState,
}

impl FetchOutcome {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn state(&self) -> &ControlState {
        &self.state
    }
}

/// Stateful list control bound to one field of one index pattern.
#[derive(Debug)]
pub struct ListControl {
    params: ControlParams,
    filter_manager: PhraseFilterManager,
    config: ListControlConfig,
    use_time_filter: bool,
    options: OptionSet,
    value: Option<ControlValue>,
    status: ControlStatus,
    /// Bumped by `fetch`, which only borrows the control.
    issued: AtomicU64,
    applied: u64,
}

impl ListControl {
    /// Build an enabled control with `options`, picking up any value already in the filter store.
    pub fn new(
        params: ControlParams,
        filter_manager: PhraseFilterManager,
        config: ListControlConfig,
        use_time_filter: bool,
        options: OptionSet,
    ) -> Self {
        let value = filter_manager.get_value_from_filter_bar();
        Self {
            params,
            filter_manager,
            config,
            use_time_filter,
            options,
            value,
            status: ControlStatus::Enabled,
            issued: AtomicU64::new(0),
            applied: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.params.id
    }

    pub fn params(&self) -> &ControlParams {
        &self.params
    }

    pub fn field_name(&self) -> &str {
        self.filter_manager.field_name()
    }

    pub fn filter_manager(&self) -> &PhraseFilterManager {
        &self.filter_manager
    }

    pub fn use_time_filter(&self) -> bool {
        self.use_time_filter
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn value(&self) -> Option<&ControlValue> {
        self.value.as_ref()
    }

    pub fn status(&self) -> &ControlStatus {
        &self.status
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.status.is_enabled()
    }

    pub fn disabled_reason(&self) -> Option<&str> {
        self.status.reason()
    }

    /// True when a value is set and non-empty.
    pub fn has_value(&self) -> bool {
        self.value.as_ref().is_some_and(ControlValue::has_value)
    }

    pub fn get_multi_select_delimiter(&self) -> &str {
        self.filter_manager.delimiter()
    }

    pub fn disable(&mut self, reason: impl Into<String>) {
        self.status = ControlStatus::disabled(reason);
        log::debug!(
            "control {} disabled: {}",
            self.params.id,
            self.status.reason().unwrap_or_default()
        );
    }

    pub fn enable(&mut self) {
        self.status = ControlStatus::Enabled;
    }

    /// Select `value`; rejected while the control is disabled.
    pub fn set_value(&mut self, value: impl Into<ControlValue>) -> Result<(), ControlError> {
        if let ControlStatus::Disabled { reason } = &self.status {
            return Err(ControlError::invalid(format!(
                "control {} is disabled: {reason}",
                self.params.id
            )));
        }
        self.value = Some(value.into());
        Ok(())
    }

    pub fn clear(&mut self) {
        self.value = None;
    }

    /// Reload the value from the shared filter store.
    pub fn reset(&mut self) {
        self.value = self.filter_manager.get_value_from_filter_bar();
    }

    /// Push the current value to the filter store, or drop this control's filter when empty.
    pub fn commit(&mut self) -> Result<(), ControlError> {
        match &self.value {
            Some(value) if value.has_value() => {
                self.filter_manager.create_filter(value)?;
            }
            _ => self.filter_manager.remove_filter(),
        }
        Ok(())
    }

    /// Re-run option discovery against the current filter context.
    ///
    /// With dynamic options on and a non-empty `query`, only terms starting with the
    /// query are requested and no size cap applies. The returned outcome is not
    /// installed until passed to [`ListControl::apply`].
    pub async fn fetch<S: SearchService>(&self, search: &S, query: Option<&str>) -> Result<FetchOutcome, ControlError> {
        let token = self.issued.fetch_add(1, Ordering::AcqRel) + 1;

        let query = query.filter(|q| !q.is_empty());
        let (size, include) = match query {
            Some(text) if self.params.options.dynamic_options => (None, Some(format!("{}.*", escape_query(Some(text))))),
            _ => (Some(self.params.options.size.unwrap_or(self.config.default_size)), None),
        };

        let state = factory::discover_options(search, &self.filter_manager, size, include, &self.config).await?;
        Ok(FetchOutcome { token, state })
    }

    /// Install a fetched state unless a newer fetch has been issued or applied.
    pub fn apply(&mut self, outcome: FetchOutcome) -> bool {
        let latest = *self.issued.get_mut();
        if outcome.token != latest || outcome.token <= self.applied {
            log::debug!(
                "control {} discarded stale fetch {} (latest {latest})",
                self.params.id,
                outcome.token
            );
            return false;
        }
        self.applied = outcome.token;

        let ControlState { options, status } = outcome.state;
        self.options = options;
        match status {
            ControlStatus::Enabled => self.enable(),
            ControlStatus::Disabled { reason } => self.disable(reason),
        }
        true
    }

    /// Fetch and apply in one step; returns whether the new state was installed.
    pub async fn refresh<S: SearchService>(&mut self, search: &S, query: Option<&str>) -> Result<bool, ControlError> {
        let outcome = self.fetch(search, query).await?;
        Ok(self.apply(outcome))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::filters::{FilterStore, InMemoryFilterStore};
    use crate::index_pattern::{FieldDescriptor, FieldType, IndexPattern};
    use crate::search::{Bucket, SearchRequest, SearchResponse};
    use crate::types::OptionValue;

    /// Search fake returning queued bucket lists and recording requests.
    #[derive(Default)]
    struct QueuedSearch {
        responses: Mutex<Vec<Vec<&'static str>>>,
        requests: Mutex<Vec<SearchRequest>>,
    }

    impl QueuedSearch {
        fn with(responses: Vec<Vec<&'static str>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                requests: Mutex::new(Vec::new()),
            }
        }

        fn last_request(&self) -> SearchRequest {
            self.requests.lock().expect("lock").last().cloned().expect("a request was made")
        }
    }

    impl SearchService for QueuedSearch {
        async fn fetch(&self, request: &SearchRequest) -> Result<SearchResponse, ControlError> {
            self.requests.lock().expect("lock").push(request.clone());
            let mut responses = self.responses.lock().expect("lock");
            let keys = if responses.is_empty() { Vec::new() } else { responses.remove(0) };
            Ok(SearchResponse::from_buckets(
                keys.into_iter()
                    .map(|key| Bucket {
                        key: key.into(),
                        doc_count: 1,
                    })
                    .collect(),
            ))
        }
    }

    fn control(field: FieldDescriptor, options: ControlOptions) -> (ListControl, Arc<InMemoryFilterStore>) {
        let store = Arc::new(InMemoryFilterStore::new());
        let pattern = IndexPattern::new("logs", "logs-*", vec![field.clone()]);
        let manager = PhraseFilterManager::new("ctrl", field.name.clone(), pattern, store.clone());
        let params = ControlParams::new("ctrl", field.name, "logs").with_options(options);
        let control = ListControl::new(params, manager, ListControlConfig::default(), false, OptionSet::default());
        (control, store)
    }

    fn status_control() -> (ListControl, Arc<InMemoryFilterStore>) {
        control(FieldDescriptor::named("status", FieldType::String), ControlOptions::default())
    }

    #[test]
    fn disabled_status_always_has_reason() {
        assert_eq!(ControlStatus::disabled("").reason(), Some(FALLBACK_DISABLED_REASON));
        assert_eq!(ControlStatus::disabled("no data").reason(), Some("no data"));
        assert_eq!(ControlStatus::Enabled.reason(), None);
    }

    #[test]
    fn disable_and_enable_toggle_status() {
        let (mut control, _) = status_control();
        assert!(control.is_enabled());
        control.disable("index is empty");
        assert!(!control.is_enabled());
        assert_eq!(control.disabled_reason(), Some("index is empty"));
        control.enable();
        assert!(control.is_enabled());
        assert_eq!(control.disabled_reason(), None);
    }

    #[test]
    fn has_value_requires_non_empty_selection() {
        let (mut control, _) = status_control();
        assert!(!control.has_value());
        control.set_value(ControlValue::Multi(Vec::new())).expect("enabled");
        assert!(!control.has_value());
        control.set_value(ControlValue::Multi(vec!["ok".into()])).expect("enabled");
        assert!(control.has_value());
        control.clear();
        assert!(!control.has_value());
    }

    #[test]
    fn disabled_control_rejects_values() {
        let (mut control, _) = status_control();
        control.disable("nothing to pick");
        let err = control.set_value("ok").expect_err("disabled");
        assert!(matches!(err, ControlError::InvalidRequest { message } if message.contains("nothing to pick")));
    }

    #[test]
    fn commit_writes_and_clears_filter() {
        let (mut control, store) = status_control();
        control.set_value(ControlValue::Multi(vec!["ok".into(), "err".into()])).expect("enabled");
        control.commit().expect("commit");
        assert_eq!(store.get_filters().len(), 1);

        control.clear();
        control.reset();
        assert_eq!(control.value(), Some(&ControlValue::Multi(vec!["ok".into(), "err".into()])));

        control.clear();
        control.commit().expect("commit");
        assert!(store.is_empty());
    }

    #[test]
    fn delimiter_comes_from_filter_manager() {
        let (control, _) = status_control();
        assert_eq!(control.get_multi_select_delimiter(), ",");
    }

    #[tokio::test]
    async fn refresh_repopulates_and_enables() {
        let (mut control, _) = status_control();
        control.disable("stale");
        let search = QueuedSearch::with(vec![vec!["ok", "err"]]);

        assert!(control.refresh(&search, None).await.expect("refresh"));
        assert!(control.is_enabled());
        assert_eq!(control.options().as_slice(), &[OptionValue::from("ok"), OptionValue::from("err")]);
        assert_eq!(search.last_request().aggs.size, Some(5));
    }

    #[tokio::test]
    async fn refresh_with_no_buckets_disables() {
        let (mut control, _) = status_control();
        let search = QueuedSearch::with(vec![Vec::new()]);

        assert!(control.refresh(&search, None).await.expect("refresh"));
        assert!(!control.is_enabled());
        let reason = control.disabled_reason().expect("reason present");
        assert!(reason.contains("status") && reason.contains("logs-*"));
    }

    #[tokio::test]
    async fn dynamic_query_sets_prefix_include_without_size() {
        let (control, _) = status_control();
        let search = QueuedSearch::default();

        control.fetch(&search, Some("web.0")).await.expect("fetch");
        let request = search.last_request();
        assert_eq!(request.aggs.include.as_deref(), Some("web\\.0.*"));
        assert_eq!(request.aggs.size, None);
    }

    #[tokio::test]
    async fn static_control_ignores_query_text() {
        let options = ControlOptions {
            size: Some(3),
            dynamic_options: false,
            multiselect: true,
        };
        let (control, _) = control(FieldDescriptor::named("status", FieldType::String), options);
        let search = QueuedSearch::default();

        control.fetch(&search, Some("web")).await.expect("fetch");
        let request = search.last_request();
        assert_eq!(request.aggs.include, None);
        assert_eq!(request.aggs.size, Some(3));
    }

    #[tokio::test]
    async fn stale_fetch_is_discarded() {
        let (mut control, _) = status_control();
        let search = QueuedSearch::with(vec![vec!["old"], vec!["new"]]);

        let first = control.fetch(&search, None).await.expect("first fetch");
        let second = control.fetch(&search, None).await.expect("second fetch");
        assert!(second.token() > first.token());

        assert!(control.apply(second.clone()));
        assert!(!control.apply(first));
        assert!(!control.apply(second));
        assert_eq!(control.options().as_slice(), &[OptionValue::from("new")]);
    }

    #[tokio::test]
    async fn fetch_applies_active_filters() {
        let (control, store) = status_control();
        let other = PhraseFilterManager::new(
            "other",
            "status",
            control.filter_manager().index_pattern().clone(),
            store.clone(),
        );
        other.create_filter(&"ok".into()).expect("filter added");
        let search = QueuedSearch::default();

        control.fetch(&search, None).await.expect("fetch");
        let request = search.last_request();
        assert_eq!(request.filter.len(), 1);
        assert_eq!(request.size, 0);
        assert_eq!(request.timeout, "1s");
        assert_eq!(request.terminate_after, 100_000);
    }
}
