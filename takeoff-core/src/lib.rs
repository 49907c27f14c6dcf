//! Embeddable core library for takeoff.
//!
//! Provides a clap-free, I/O-abstracted entry point for the metrics and
//! repair pipelines.
//!
//! # Port traits
//!
//! All I/O is abstracted behind port traits in [`ports`]:
//! - [`ElementSource`](ports::ElementSource): load element stores
//! - [`WritePort`](ports::WritePort): write files and create directories
//!
//! The [`adapters`] module provides default filesystem-backed implementations.
//!
//! # Entry points
//!
//! - [`run_metrics`](pipeline::run_metrics): evaluate metrics for every store
//! - [`run_repairs`](pipeline::run_repairs): repair every store, dry-run by default
//! - [`validate`](pipeline::validate): collect configuration findings without stores

pub mod adapters;
pub mod load;
pub mod pipeline;
pub mod ports;
pub mod settings;

pub use load::LoadedStore;

// Re-export so embedders don't need takeoff-domain for the common types.
pub use takeoff_domain::{EntityStore, MetricDefaults};
