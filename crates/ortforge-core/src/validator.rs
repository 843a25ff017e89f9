//! Item validation: structural, bilingual, layout, distractor and solver checks.
//!
//! Validation never mutates the item and never fails on well-typed input.
//! Every defect becomes a [`Diagnostic`]; only malformed logic-engine input
//! surfaces as a [`SchemaError`].

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::distractor::{DistractorConfig, DistractorModel};
use crate::error::SchemaError;
use crate::expr::{Expr, Predicate};
use crate::model::{BilingualText, Item, Layout, Locale, MathText, Relation, CHOICE_COUNT};
use crate::solver::{Solver, SolverConfig, SolverResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// Which family of rule produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Structure,
    Bilingual,
    Classification,
    Layout,
    Distractor,
    Solver,
    Schema,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::Structure => "structure",
            Category::Bilingual => "bilingual",
            Category::Classification => "classification",
            Category::Layout => "layout",
            Category::Distractor => "distractor",
            Category::Solver => "solver",
            Category::Schema => "schema",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub category: Category,
    pub message: String,
}

impl Diagnostic {
    pub fn error(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            category,
            message: message.into(),
        }
    }

    pub fn warning(category: Category, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            category,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}] {}", self.severity, self.category, self.message)
    }
}

/// Outcome of validating one item.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    /// Present when the item declares a logic engine.
    pub solver: Option<SolverResult>,
}

impl ValidationResult {
    /// Route a diagnostic by its severity.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors.push(diagnostic),
            Severity::Warning => self.warnings.push(diagnostic),
        }
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
        if other.solver.is_some() {
            self.solver = other.solver;
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Errors first, then warnings.
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.errors.iter().chain(self.warnings.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Relative locale length difference above which a parity warning fires.
    pub parity_tolerance: f64,
    /// Passage-based stimulus shorter than this draws a warning.
    pub min_passage_chars: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            parity_tolerance: 0.30,
            min_passage_chars: 100,
        }
    }
}

/// Validator with its distractor model and solver, built once and shared.
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
    distractor: DistractorModel,
    solver: Solver,
}

impl Validator {
    pub fn new(config: ValidatorConfig, distractor: DistractorConfig, solver: SolverConfig) -> Self {
        Self {
            config,
            distractor: DistractorModel::new(distractor),
            solver: Solver::new(solver),
        }
    }

    pub fn distractor_model(&self) -> &DistractorModel {
        &self.distractor
    }

    pub fn solver(&self) -> &Solver {
        &self.solver
    }

    /// Validate a decoded item.
    pub fn validate(&self, item: &Item) -> Result<ValidationResult, SchemaError> {
        let mut result = ValidationResult::default();
        self.check_text(&mut result, "text", &item.text);
        self.check_text(&mut result, "explanation", &item.explanation);
        check_choices(&mut result, item);
        check_classification(&mut result, item);
        self.check_layout(&mut result, item);
        result.merge(self.distractor.assert_trap_coverage(item));
        self.check_logic(&mut result, item)?;
        Ok(result)
    }

    /// Decode then validate a raw document.
    pub fn validate_value(&self, value: &serde_json::Value) -> Result<ValidationResult, SchemaError> {
        let item = Item::from_value(value)?;
        self.validate(&item)
    }

    fn check_text(&self, result: &mut ValidationResult, field: &str, text: &BilingualText) {
        if text.is_empty() {
            result.push(Diagnostic::error(
                Category::Structure,
                format!("item {field} is empty"),
            ));
            return;
        }
        let missing = text.missing_locales();
        for locale in &missing {
            result.push(Diagnostic::error(
                Category::Bilingual,
                format!("{field} is missing the {locale} translation"),
            ));
        }
        if missing.is_empty() {
            let (ru, ky) = text.char_counts();
            let longer = ru.max(ky) as f64;
            let diff = (ru as f64 - ky as f64).abs() / longer;
            if diff > self.config.parity_tolerance {
                result.push(Diagnostic::warning(
                    Category::Bilingual,
                    format!(
                        "{field} locale lengths differ by {:.0}% (ru {ru}, ky {ky} chars)",
                        diff * 100.0
                    ),
                ));
            }
        }
    }

    fn check_layout(&self, result: &mut ValidationResult, item: &Item) {
        let rendering = &item.rendering;
        match &rendering.layout {
            Layout::Standard => {}
            Layout::ComparisonTable { columns, condition } => {
                for (label, column) in [("A", &columns.a), ("B", &columns.b)] {
                    match column {
                        None => result.push(Diagnostic::error(
                            Category::Layout,
                            format!("comparison table is missing column {label}"),
                        )),
                        Some(m) if !m.is_supplied() => result.push(Diagnostic::error(
                            Category::Layout,
                            format!(
                                "column {label} gives neither a symbolic expression nor a text fallback"
                            ),
                        )),
                        Some(m) => check_symbolic_column(result, label, m),
                    }
                }
                match condition {
                    Some(c) if c.is_supplied() => {
                        if let Some(src) = nonblank(&c.symbolic) {
                            if let Err(e) = Predicate::parse(src) {
                                result.push(Diagnostic::error(
                                    Category::Layout,
                                    format!("condition `{src}` does not parse: {e}"),
                                ));
                            }
                        }
                    }
                    _ => result.push(Diagnostic::warning(
                        Category::Layout,
                        "comparison table has no condition",
                    )),
                }
            }
            Layout::PassageBased { passage } => {
                let stimulus = |locale: Locale| {
                    let passage_len = passage
                        .as_ref()
                        .map_or(0, |p| p.get(locale).chars().count());
                    item.text.get(locale).chars().count() + passage_len
                };
                let shortest = stimulus(Locale::Ru).min(stimulus(Locale::Ky));
                if shortest < self.config.min_passage_chars {
                    result.push(Diagnostic::warning(
                        Category::Layout,
                        format!(
                            "passage-based stimulus is {shortest} characters, expected at least {}",
                            self.config.min_passage_chars
                        ),
                    ));
                }
            }
            Layout::Geometry { diagram } => {
                if !diagram.as_ref().is_some_and(|d| d.is_supplied()) {
                    result.push(Diagnostic::error(
                        Category::Layout,
                        "geometry item has no diagram (svg markup or image reference)",
                    ));
                }
            }
            Layout::Chart { chart } => match chart {
                None => result.push(Diagnostic::error(
                    Category::Layout,
                    "chart item has no chart data",
                )),
                Some(data) => {
                    if data.chart_type.is_none() {
                        result.push(Diagnostic::error(
                            Category::Layout,
                            "chart data does not declare a chart type",
                        ));
                    }
                    if data.series.is_empty() {
                        result.push(Diagnostic::warning(
                            Category::Layout,
                            "chart data has no series",
                        ));
                    }
                }
            },
        }

        if rendering.requires_symbolic_notation && rendering.symbolic_expressions().is_empty() {
            result.push(Diagnostic::warning(
                Category::Layout,
                "symbolic notation is required but the rendering carries no symbolic expression",
            ));
        }
    }

    fn check_logic(&self, result: &mut ValidationResult, item: &Item) -> Result<(), SchemaError> {
        let Some(engine) = &item.logic_engine else {
            return Ok(());
        };
        let solved = self.solver.solve(engine)?;

        if !solved.passed() {
            let message = match engine.relation {
                Relation::Undetermined => format!(
                    "relation is {} at every sample, so it is not undetermined",
                    solved
                        .observed
                        .first()
                        .map_or_else(|| "constant".to_string(), |r| r.to_string())
                ),
                relation => {
                    let first = solved
                        .counterexamples
                        .first()
                        .map(|c| format!("; first {c}"))
                        .unwrap_or_default();
                    format!(
                        "declared relation {relation} fails at {} of {} samples{first}",
                        solved.counterexamples.len(),
                        solved.samples_checked
                    )
                }
            };
            result.push(Diagnostic::error(Category::Solver, message));
        }

        if matches!(item.rendering.layout, Layout::ComparisonTable { .. }) {
            if let Some(correct) = item.correct_choice() {
                match Relation::for_choice_letter(&correct.letter) {
                    Some(claimed) if claimed != engine.relation => {
                        result.push(Diagnostic::error(
                            Category::Solver,
                            format!(
                                "correct choice {} means {claimed} but the logic engine declares {}",
                                correct.letter, engine.relation
                            ),
                        ));
                    }
                    Some(_) => {}
                    None => result.push(Diagnostic::warning(
                        Category::Solver,
                        format!(
                            "correct choice {} is not one of the comparison answers A-D",
                            correct.letter
                        ),
                    )),
                }
            }
        }

        result.solver = Some(solved);
        Ok(())
    }
}

fn check_choices(result: &mut ValidationResult, item: &Item) {
    if item.choices.is_empty() {
        result.push(Diagnostic::error(Category::Structure, "item has no choices"));
        return;
    }
    if item.choices.len() != CHOICE_COUNT {
        result.push(Diagnostic::error(
            Category::Structure,
            format!(
                "expected {CHOICE_COUNT} choices, found {}",
                item.choices.len()
            ),
        ));
    }

    let mut seen = BTreeSet::new();
    for (i, choice) in item.choices.iter().enumerate() {
        let letter = choice.letter.trim();
        if letter.is_empty() {
            result.push(Diagnostic::error(
                Category::Structure,
                format!("choice #{} has no letter", i + 1),
            ));
        } else if !seen.insert(letter) {
            result.push(Diagnostic::error(
                Category::Structure,
                format!("choice letter {letter} is used more than once"),
            ));
        }
        if choice.text.is_empty() {
            result.push(Diagnostic::error(
                Category::Structure,
                format!("choice {letter} has no text"),
            ));
        } else {
            for locale in choice.text.missing_locales() {
                result.push(Diagnostic::error(
                    Category::Bilingual,
                    format!("choice {letter} is missing the {locale} text"),
                ));
            }
        }
    }

    let correct = item.choices.iter().filter(|c| c.is_correct).count();
    if correct != 1 {
        result.push(Diagnostic::error(
            Category::Structure,
            format!("exactly one choice must be correct, found {correct}"),
        ));
    }
}

fn check_classification(result: &mut ValidationResult, item: &Item) {
    let Some(class) = &item.classification else {
        result.push(Diagnostic::error(
            Category::Structure,
            "item has no classification",
        ));
        return;
    };
    if class.section.trim().is_empty() {
        result.push(Diagnostic::error(
            Category::Classification,
            "classification has no section code",
        ));
    }
    if class.subsection.trim().is_empty() {
        result.push(Diagnostic::error(
            Category::Classification,
            "classification has no subsection code",
        ));
    }
    if !(1..=5).contains(&class.difficulty) {
        result.push(Diagnostic::error(
            Category::Classification,
            format!("difficulty {} is outside 1-5", class.difficulty),
        ));
    }
}

fn check_symbolic_column(result: &mut ValidationResult, label: &str, column: &MathText) {
    if let Some(src) = nonblank(&column.symbolic) {
        if let Err(e) = Expr::parse(src) {
            result.push(Diagnostic::error(
                Category::Layout,
                format!("column {label} expression `{src}` does not parse: {e}"),
            ));
        }
    }
}

fn nonblank(s: &Option<String>) -> Option<&str> {
    s.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const RATIONALE: &str =
        "Путает направление неравенства: для 0 < x < 1 корень больше самого числа.";

    fn comparison_item() -> Value {
        let rationale = json!({
            "cognitiveTrap": "boundary_confusion",
            "description": RATIONALE,
            "plausibilityScore": 0.9
        });
        json!({
            "id": "math-cmp-0001",
            "text": {
                "ru": "Сравните величины в колонках A и B при условии 0 < x < 1.",
                "ky": "A жана B мамычаларындагы чоңдуктарды салыштыргыла."
            },
            "choices": [
                { "letter": "A", "text": { "ru": "A больше", "ky": "A чоң" }, "isCorrect": false },
                { "letter": "B", "text": { "ru": "B больше", "ky": "B чоң" }, "isCorrect": true },
                { "letter": "C", "text": { "ru": "Равны", "ky": "Барабар" }, "isCorrect": false },
                { "letter": "D", "text": { "ru": "Нельзя определить", "ky": "Аныктоого болбойт" }, "isCorrect": false }
            ],
            "explanation": {
                "ru": "При 0 < x < 1 верно √x > x.",
                "ky": "0 < x < 1 болгондо √x > x."
            },
            "classification": {
                "section": "math",
                "subsection": "comparison",
                "difficulty": 3,
                "cognitiveLoad": "strategic"
            },
            "rendering": {
                "layout": "comparison_table",
                "requiresSymbolicNotation": true,
                "columns": { "A": { "symbolic": "x" }, "B": { "symbolic": "sqrt(x)" } },
                "condition": { "symbolic": "0 < x < 1" }
            },
            "distractorRationale": { "A": rationale, "C": rationale, "D": rationale },
            "logicEngine": {
                "variables": { "x": { "min": 0.0, "max": 1.0 } },
                "constraints": ["x > 0 ∧ x < 1"],
                "expressions": { "column_a": "x", "column_b": "sqrt(x)" },
                "relation": "b_greater"
            }
        })
    }

    fn validate(value: &Value) -> ValidationResult {
        Validator::default().validate_value(value).unwrap()
    }

    #[test]
    fn clean_comparison_item_passes() {
        let result = validate(&comparison_item());
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert!(result.warnings.is_empty(), "{:?}", result.warnings);
        assert!(result.solver.unwrap().passed());
    }

    #[test]
    fn deeply_nested_column_is_a_layout_error() {
        let mut raw = comparison_item();
        let deep = format!("{}x{}", "(".repeat(10_000), ")".repeat(10_000));
        raw["rendering"]["columns"]["A"]["symbolic"] = json!(deep);
        let result = validate(&raw);
        assert_eq!(result.errors.len(), 1, "{:?}", result.errors);
        assert_eq!(result.errors[0].category, Category::Layout);
        assert!(result.errors[0].message.starts_with("column A expression"));
        assert!(result.solver.unwrap().passed());
    }

    #[test]
    fn zero_or_two_correct_choices_is_an_error() {
        let mut raw = comparison_item();
        raw["choices"][1]["isCorrect"] = json!(false);
        let result = validate(&raw);
        assert!(result
            .errors
            .iter()
            .any(|d| d.message == "exactly one choice must be correct, found 0"));

        let mut raw = comparison_item();
        raw["choices"][0]["isCorrect"] = json!(true);
        let result = validate(&raw);
        assert!(result
            .errors
            .iter()
            .any(|d| d.message == "exactly one choice must be correct, found 2"));
    }

    #[test]
    fn missing_column_b_is_exactly_one_error() {
        let mut raw = comparison_item();
        raw.as_object_mut().unwrap().remove("logicEngine");
        raw["rendering"]["columns"]
            .as_object_mut()
            .unwrap()
            .remove("B");
        let result = validate(&raw);
        let mentions: Vec<_> = result
            .errors
            .iter()
            .filter(|d| d.message.contains("column B"))
            .collect();
        assert_eq!(mentions.len(), 1);
        assert_eq!(result.errors.len(), 1);

        raw["rendering"]["columns"]["B"] = json!({ "text": "квадратный корень из x" });
        let result = validate(&raw);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
    }

    #[test]
    fn missing_condition_is_a_warning() {
        let mut raw = comparison_item();
        raw["rendering"].as_object_mut().unwrap().remove("condition");
        let result = validate(&raw);
        assert!(result.errors.is_empty());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].category, Category::Layout);
    }

    #[test]
    fn unparseable_symbolic_column_is_an_error() {
        let mut raw = comparison_item();
        raw["rendering"]["columns"]["A"] = json!({ "symbolic": "x +* 2" });
        let result = validate(&raw);
        assert!(result
            .errors
            .iter()
            .any(|d| d.message.starts_with("column A expression")));
    }

    #[test]
    fn symbolic_notation_flag_without_expressions_warns() {
        let mut raw = comparison_item();
        raw.as_object_mut().unwrap().remove("logicEngine");
        raw["rendering"] = json!({
            "layout": "comparison_table",
            "requiresSymbolicNotation": true,
            "columns": { "A": { "text": "x" }, "B": { "text": "корень из x" } },
            "condition": { "text": "x между 0 и 1" }
        });
        let result = validate(&raw);
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|d| d.message.contains("symbolic notation is required")));
    }

    #[test]
    fn missing_translation_and_parity() {
        let mut raw = comparison_item();
        raw["explanation"]["ky"] = json!("");
        let result = validate(&raw);
        assert!(result
            .errors
            .iter()
            .any(|d| d.category == Category::Bilingual && d.message.contains("ky")));

        let mut raw = comparison_item();
        raw["text"]["ky"] = json!("Салыштыр.");
        let result = validate(&raw);
        assert!(result.errors.is_empty());
        assert!(result
            .warnings
            .iter()
            .any(|d| d.message.starts_with("text locale lengths differ")));
    }

    #[test]
    fn classification_bounds() {
        let mut raw = comparison_item();
        raw["classification"]["difficulty"] = json!(7);
        raw["classification"]["subsection"] = json!("");
        let result = validate(&raw);
        let classification: Vec<_> = result
            .errors
            .iter()
            .filter(|d| d.category == Category::Classification)
            .collect();
        assert_eq!(classification.len(), 2);

        let mut raw = comparison_item();
        raw.as_object_mut().unwrap().remove("classification");
        assert!(validate(&raw)
            .errors
            .iter()
            .any(|d| d.message == "item has no classification"));
    }

    #[test]
    fn layout_specific_requirements() {
        let mut raw = comparison_item();
        raw.as_object_mut().unwrap().remove("logicEngine");

        raw["rendering"] = json!({ "layout": "geometry" });
        assert_eq!(validate(&raw).errors.len(), 1);
        raw["rendering"] = json!({ "layout": "geometry", "diagram": { "svg": "<svg/>" } });
        assert!(validate(&raw).errors.is_empty());

        raw["rendering"] = json!({ "layout": "chart", "chart": { "series": [] } });
        let result = validate(&raw);
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.warnings.len(), 1);

        raw["rendering"] = json!({ "layout": "passage_based" });
        let result = validate(&raw);
        assert!(result.errors.is_empty());
        assert!(result.warnings[0].message.starts_with("passage-based stimulus"));
    }

    #[test]
    fn solver_failure_and_answer_key_mismatch() {
        let mut raw = comparison_item();
        raw["logicEngine"]["relation"] = json!("a_greater");
        let result = validate(&raw);
        let solver: Vec<_> = result
            .errors
            .iter()
            .filter(|d| d.category == Category::Solver)
            .collect();
        assert_eq!(solver.len(), 2);
        assert!(solver[0].message.contains("fails at 5 of 5 samples"));
        assert!(solver[1].message.contains("correct choice B"));
        assert!(!result.solver.unwrap().passed());
    }

    #[test]
    fn inconsistent_logic_is_a_schema_error() {
        let mut raw = comparison_item();
        raw["logicEngine"]["variables"]["x"]["minInclusive"] = json!(true);
        let err = Validator::default().validate_value(&raw).unwrap_err();
        assert!(matches!(err, SchemaError::SolverInconsistency { .. }));
    }

    #[test]
    fn validation_does_not_mutate() {
        let raw = comparison_item();
        let item = Item::from_value(&raw).unwrap();
        let before = item.clone();
        let _ = Validator::default().validate(&item);
        assert_eq!(item, before);
    }
}
