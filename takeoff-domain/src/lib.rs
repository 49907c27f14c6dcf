//! Domain logic: select elements, extract quantities, aggregate and derive metrics.
//!
//! This crate owns *what* a configuration means. Mutating stores is the job of
//! `takeoff-edit`; loading and writing files is the job of `takeoff-core`.

mod aggregate;
mod condition;
mod derived;
mod error;
mod expr;
mod extract;
mod filter;
mod metric;
mod path;
mod store;
mod validate;

pub use aggregate::{
    Aggregation, Selection, aggregate, aggregate_all, evaluate, select, working_set,
};
pub use condition::{CompareOp, Condition};
pub use derived::{DerivedDefinition, DerivedSet, Formula, evaluate_all};
pub use error::ConfigError;
pub use extract::{QuantitySource, extract, extract_property};
pub use filter::{Filter, matches, matches_spec};
pub use metric::{
    GroupingKey, MetricDefaults, MetricDefinition, MetricKind, MetricSet, RelationRef,
};
pub use path::FieldPath;
pub use store::{EntityStore, StoreError};
pub use validate::validate_metrics;
