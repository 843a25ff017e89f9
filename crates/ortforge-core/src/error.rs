//! Error types for item decoding, logic-engine solving, planning and generation.
//!
//! Content defects (a missing translation, a second correct choice) are never
//! errors in this sense: they are collected as [`Diagnostic`]s by the
//! validator. The types here describe input that cannot be processed at all.
//!
//! [`Diagnostic`]: crate::validator::Diagnostic

use std::collections::BTreeMap;

use thiserror::Error;

/// Structurally malformed input. Aborts processing of a single item only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// The raw document could not be decoded into an item.
    #[error("malformed item: {0}")]
    Malformed(String),

    /// A symbolic expression or predicate failed to parse or evaluate.
    #[error("invalid expression `{source_text}`: {message}")]
    InvalidExpression {
        source_text: String,
        message: String,
    },

    /// An expression references a variable the logic engine does not declare.
    #[error("expression `{source_text}` references undeclared variable `{variable}`")]
    UndeclaredVariable {
        source_text: String,
        variable: String,
    },

    /// A variable domain is empty, inverted or non-finite.
    #[error("invalid domain for `{variable}`: {message}")]
    InvalidDomain { variable: String, message: String },

    /// A required named expression is absent from the logic engine.
    #[error("logic engine is missing expression `{0}`")]
    MissingExpression(String),

    /// A sample drawn from the declared domains violates a declared constraint.
    #[error("solver inconsistency: constraint `{constraint}` fails at {}", format_sample(.sample))]
    SolverInconsistency {
        constraint: String,
        sample: BTreeMap<String, f64>,
    },

    /// The cartesian product of sample points exceeds the iteration cap.
    #[error("{combinations} sample combinations exceed the cap of {cap}")]
    TooManySamples { combinations: usize, cap: usize },
}

/// Failure to turn a target count and ratios into an allocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    #[error("no categories to allocate {0} items across")]
    EmptyRatios(usize),

    #[error("ratio for `{category}` must be finite and non-negative, got {ratio}")]
    InvalidRatio { category: String, ratio: f64 },

    #[error("ratios must sum to 1.0, got {0:.4}")]
    BadSum(f64),

    #[error("difficulty key `{0}` is not a level between 1 and 5")]
    BadDifficulty(String),
}

/// Failure to produce an item from a template.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("no template registered for category `{0}`")]
    NoTemplate(String),

    #[error("template `{template}` declares placeholder `{variable}` with min {min} > max {max}")]
    BadPlaceholder {
        template: String,
        variable: String,
        min: i64,
        max: i64,
    },

    #[error("template `{template}` produced a malformed item: {source}")]
    Decode {
        template: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure to apply an auto-fix patch operation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PatchError {
    #[error("`{0}` is not a JSON pointer (must start with `/`)")]
    InvalidPointer(String),

    #[error("cannot descend into `{pointer}`: not an object or array")]
    NotAContainer { pointer: String },

    #[error("array index `{token}` in `{pointer}` is out of range")]
    BadIndex { pointer: String, token: String },

    #[error("item ids are immutable")]
    ImmutableId,

    #[error("expected `/pointer=value`, got `{0}`")]
    BadAssignment(String),
}

pub(crate) fn format_sample(sample: &BTreeMap<String, f64>) -> String {
    let parts: Vec<String> = sample.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", parts.join(", "))
}
