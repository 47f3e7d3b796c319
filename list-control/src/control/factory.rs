use std::sync::Arc;

use crate::{
    aggregation::build_terms_agg,
    config::ListControlConfig,
    control::{ControlParams, ControlState, ListControl},
    errors::ControlError,
    filters::{FilterStore, PhraseFilterManager},
    index_pattern::{FieldDescriptor, FieldType, IndexPattern, IndexPatternProvider},
    search::{SearchRequest, SearchService, SortOrder},
};

/// Collaborators a list control is built against.
pub struct ControlServices<P, S> {
    pub index_patterns: P,
    pub search: S,
    pub filter_store: Arc<dyn FilterStore>,
    pub config: ListControlConfig,
}

impl<P, S> ControlServices<P, S> {
    pub fn new(index_patterns: P, search: S, filter_store: Arc<dyn FilterStore>) -> Self {
        Self {
            index_patterns,
            search,
            filter_store,
            config: ListControlConfig::default(),
        }
    }

    #[inline]
    pub fn with_config(mut self, config: ListControlConfig) -> Self {
        self.config = config;
        self
    }
}

/// Outcome of resolving a control's field in its index pattern.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldLookup<'a> {
    Found(&'a FieldDescriptor),
    /// Field is absent or unusable; the control is built disabled with `reason`.
    Degraded { reason: String },
}

/// Resolve `field_name`, degrading instead of failing when it cannot be aggregated on.
pub fn lookup_field<'a>(pattern: &'a IndexPattern, field_name: &str) -> FieldLookup<'a> {
    let Some(field) = pattern.field_by_name(field_name) else {
        let err = ControlError::FieldNotFound {
            field: field_name.to_string(),
            index_pattern: pattern.title.clone(),
        };
        log::warn!("{err}");
        return FieldLookup::Degraded { reason: err.to_string() };
    };

    match field.source() {
        Ok(_) => FieldLookup::Found(field),
        Err(err) => {
            log::warn!("field \"{field_name}\" in \"{}\" cannot be aggregated: {err}", pattern.title);
            FieldLookup::Degraded { reason: err.to_string() }
        }
    }
}

/// Build a list control for `params`.
///
/// Fails only when the index pattern cannot be resolved or the search itself
/// fails. A missing field or a field without values yields a disabled control.
pub async fn create_list_control<P, S>(
    mut params: ControlParams,
    services: &ControlServices<P, S>,
    use_time_filter: bool,
) -> Result<ListControl, ControlError>
where
    P: IndexPatternProvider,
    S: SearchService,
{
    let pattern = services.index_patterns.get(&params.index_pattern).await?;

    // Any present field counts here, even one that cannot be aggregated on.
    if let Some(field) = pattern.field_by_name(&params.field_name) {
        if field.field_type != FieldType::String && params.options.dynamic_options {
            log::debug!(
                "control {}: dynamic options disabled for {} field \"{}\"",
                params.id,
                field.field_type,
                field.name
            );
            params.options.dynamic_options = false;
        }
    }

    let filter_manager = PhraseFilterManager::new(
        params.id.clone(),
        params.field_name.clone(),
        pattern,
        Arc::clone(&services.filter_store),
    )
    .with_delimiter(services.config.delimiter.clone());

    let size = params.options.size.unwrap_or(services.config.default_size);
    let state = discover_options(&services.search, &filter_manager, Some(size), None, &services.config).await?;

    let ControlState { options, status } = state;
    let mut control = ListControl::new(
        params,
        filter_manager,
        services.config.clone(),
        use_time_filter,
        options,
    );
    if let Some(reason) = status.reason() {
        control.disable(reason);
    }
    Ok(control)
}

/// Run one terms aggregation for the manager's field under every active filter.
pub(crate) async fn discover_options<S: SearchService>(
    search: &S,
    manager: &PhraseFilterManager,
    size: Option<i64>,
    include: Option<String>,
    config: &ListControlConfig,
) -> Result<ControlState, ControlError> {
    let pattern = manager.index_pattern();
    let field = match lookup_field(pattern, manager.field_name()) {
        FieldLookup::Found(field) => field,
        FieldLookup::Degraded { reason } => return Ok(ControlState::disabled(reason)),
    };

    let mut aggs = build_terms_agg(&field.source()?, size, SortOrder::Desc);
    if let Some(include) = include {
        aggs = aggs.with_include(include);
    }

    let request = SearchRequest::terms(pattern.clone(), manager.store().get_filters(), aggs)
        .with_timeout(config.timeout.clone())
        .with_terminate_after(config.terminate_after);
    let response = search.fetch(&request).await?;
    let options = response.bucket_keys();

    log::debug!(
        "control {}: {} options for \"{}\" in \"{}\"",
        manager.control_id(),
        options.len(),
        field.name,
        pattern.title
    );
    Ok(ControlState::from_options(options, manager.field_name(), &pattern.title))
}
