//! Shared DTOs (schemas-as-code) for the takeoff workspace.
//!
//! # Design constraints
//! - Element and artifact types are serialized to disk.
//! - Configuration records mirror the YAML surface one to one; compilation into
//!   evaluable definitions happens in `takeoff-domain`.
//! - Prefer adding optional fields over changing semantics.

pub mod config;
pub mod diagnostic;
pub mod element;
pub mod named;
pub mod repair;
pub mod report;
pub mod result;

pub use element::{Element, ElementId, Scalar};
pub use named::Named;

/// Schema identifiers.
pub mod schema {
    pub const TAKEOFF_ELEMENTS_V1: &str = "takeoff.elements.v1";
    pub const TAKEOFF_RESULTS_V1: &str = "takeoff.results.v1";
    pub const TAKEOFF_CHANGES_V1: &str = "takeoff.changes.v1";
    pub const TAKEOFF_REPORT_V1: &str = "takeoff.report.v1";
}
