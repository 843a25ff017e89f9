//! ortforge-core — generation and validation engine for bilingual ORT items.
//!
//! This crate defines the item data model, the layout-aware validator, the
//! constraint solver for quantitative-comparison items, distractor scoring,
//! batch planning and template-driven generation.

pub mod autofix;
pub mod config;
pub mod distractor;
pub mod engine;
pub mod error;
pub mod expr;
pub mod generator;
pub mod items;
pub mod model;
pub mod planner;
pub mod report;
pub mod solver;
pub mod statistics;
pub mod template;
pub mod validator;

pub use error::{GenerateError, PatchError, PlanError, SchemaError};
pub use model::Item;
pub use report::ValidationReport;
pub use validator::{Diagnostic, Severity, ValidationResult, Validator};
