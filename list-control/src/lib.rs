//! List filter controls backed by terms aggregations.
//!
//! A list control discovers the most frequent values of one field, offers them
//! as options, and turns the user's selection into phrase filters in a shared
//! filter store. Option discovery runs through [`search::SearchService`];
//! [`RediSearchService`] executes it with `FT.AGGREGATE`.

pub mod aggregation;
pub mod config;
pub mod control;
pub mod errors;
pub mod escape;
pub mod filters;
pub mod index_pattern;
pub mod search;
pub mod types;

pub use config::ListControlConfig;
pub use control::{
    ControlOptions, ControlParams, ControlServices, ControlState, ControlStatus, FetchOutcome, FieldLookup,
    ListControl, create_list_control, lookup_field,
};
pub use errors::*;
pub use filters::{Filter, FilterStore, InMemoryFilterStore, PhraseFilterManager};
pub use index_pattern::{FieldDescriptor, FieldType, IndexPattern, IndexPatternProvider, InMemoryIndexPatterns};
pub use search::{RediSearchService, SearchRequest, SearchResponse, SearchService, SortOrder};
pub use types::{ControlValue, OptionSet, OptionValue};

pub use redis;
pub use redis::aio::ConnectionManager;
