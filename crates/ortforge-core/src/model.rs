//! Core data model for bilingual multiple-choice items.
//!
//! Field names and nesting are part of the serialized compatibility surface:
//! items travel between the template library, the validator and persistence
//! as camelCase JSON documents.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::solver::SolverResult;

/// Number of choices every item carries.
pub const CHOICE_COUNT: usize = 4;

/// Item identifier: an integer or a string, immutable once assigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Int(u64),
    Text(String),
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Int(n) => write!(f, "{n}"),
            ItemId::Text(s) => write!(f, "{s}"),
        }
    }
}

/// The two locales every item is authored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    Ru,
    Ky,
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Locale::Ru => write!(f, "ru"),
            Locale::Ky => write!(f, "ky"),
        }
    }
}

/// A string pair in both required locales.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BilingualText {
    #[serde(default)]
    pub ru: String,
    #[serde(default)]
    pub ky: String,
}

impl BilingualText {
    pub fn new(ru: impl Into<String>, ky: impl Into<String>) -> Self {
        Self {
            ru: ru.into(),
            ky: ky.into(),
        }
    }

    pub fn get(&self, locale: Locale) -> &str {
        match locale {
            Locale::Ru => &self.ru,
            Locale::Ky => &self.ky,
        }
    }

    /// Locales whose string is empty or whitespace.
    pub fn missing_locales(&self) -> Vec<Locale> {
        [Locale::Ru, Locale::Ky]
            .into_iter()
            .filter(|l| self.get(*l).trim().is_empty())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.missing_locales().len() == 2
    }

    /// Character counts as `(ru, ky)`.
    pub fn char_counts(&self) -> (usize, usize) {
        (self.ru.chars().count(), self.ky.chars().count())
    }
}

/// A single answer option.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Choice {
    pub letter: String,
    #[serde(default)]
    pub text: BilingualText,
    #[serde(default)]
    pub is_correct: bool,
}

/// Cognitive-load tier of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CognitiveLoad {
    Recall,
    Strategic,
    Extended,
}

impl fmt::Display for CognitiveLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CognitiveLoad::Recall => write!(f, "recall"),
            CognitiveLoad::Strategic => write!(f, "strategic"),
            CognitiveLoad::Extended => write!(f, "extended"),
        }
    }
}

impl FromStr for CognitiveLoad {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recall" => Ok(CognitiveLoad::Recall),
            "strategic" => Ok(CognitiveLoad::Strategic),
            "extended" => Ok(CognitiveLoad::Extended),
            other => Err(format!("unknown cognitive load tier: {other}")),
        }
    }
}

/// Hierarchical placement of an item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub subsection: String,
    /// Ordinal 1–5.
    #[serde(default)]
    pub difficulty: u8,
    #[serde(default)]
    pub cognitive_load: Option<CognitiveLoad>,
}

/// Rendering shape of an item plus the cross-layout notation flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderingConfig {
    #[serde(flatten)]
    pub layout: Layout,
    #[serde(default, skip_serializing_if = "is_false")]
    pub requires_symbolic_notation: bool,
}

impl Default for RenderingConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Standard,
            requires_symbolic_notation: false,
        }
    }
}

impl RenderingConfig {
    /// Every symbolic expression present in the payload (condition first,
    /// then columns A and B).
    pub fn symbolic_expressions(&self) -> Vec<&str> {
        match &self.layout {
            Layout::ComparisonTable { columns, condition } => condition
                .iter()
                .chain(columns.a.iter())
                .chain(columns.b.iter())
                .filter_map(|m| m.symbolic.as_deref())
                .filter(|s| !s.trim().is_empty())
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Layout variants. The tag selects which fields exist; whether a field that
/// belongs to the layout is actually filled in is checked by the validator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum Layout {
    Standard,
    ComparisonTable {
        #[serde(default)]
        columns: Columns,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<MathText>,
    },
    PassageBased {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        passage: Option<BilingualText>,
    },
    Geometry {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        diagram: Option<Diagram>,
    },
    Chart {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        chart: Option<ChartData>,
    },
}

impl Layout {
    pub fn name(&self) -> &'static str {
        match self {
            Layout::Standard => "standard",
            Layout::ComparisonTable { .. } => "comparison_table",
            Layout::PassageBased { .. } => "passage_based",
            Layout::Geometry { .. } => "geometry",
            Layout::Chart { .. } => "chart",
        }
    }
}

/// The two columns of a quantitative-comparison table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Columns {
    #[serde(rename = "A", default, skip_serializing_if = "Option::is_none")]
    pub a: Option<MathText>,
    #[serde(rename = "B", default, skip_serializing_if = "Option::is_none")]
    pub b: Option<MathText>,
}

/// A quantity given symbolically, as plain text, or both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MathText {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbolic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl MathText {
    pub fn symbolic(expr: impl Into<String>) -> Self {
        Self {
            symbolic: Some(expr.into()),
            text: None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self {
            symbolic: None,
            text: Some(text.into()),
        }
    }

    /// True when at least one non-blank form is supplied.
    pub fn is_supplied(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        filled(&self.symbolic) || filled(&self.text)
    }
}

/// Diagram descriptor for geometry items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagram {
    /// Inline vector markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub svg: Option<String>,
    /// Reference to an image asset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl Diagram {
    pub fn is_supplied(&self) -> bool {
        let filled = |s: &Option<String>| s.as_deref().is_some_and(|v| !v.trim().is_empty());
        filled(&self.svg) || filled(&self.image)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
    Histogram,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_type: Option<ChartType>,
    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub label: String,
    #[serde(default)]
    pub values: Vec<f64>,
}

/// Fixed taxonomy of misconceptions a distractor can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitiveTrap {
    SignError,
    BoundaryConfusion,
    ConstraintFailure,
    Overgeneralization,
    SuperficialSimilarity,
    PartialUnderstanding,
    CalculationError,
    FalseEquivalence,
}

impl CognitiveTrap {
    pub const ALL: [CognitiveTrap; 8] = [
        CognitiveTrap::SignError,
        CognitiveTrap::BoundaryConfusion,
        CognitiveTrap::ConstraintFailure,
        CognitiveTrap::Overgeneralization,
        CognitiveTrap::SuperficialSimilarity,
        CognitiveTrap::PartialUnderstanding,
        CognitiveTrap::CalculationError,
        CognitiveTrap::FalseEquivalence,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CognitiveTrap::SignError => "sign_error",
            CognitiveTrap::BoundaryConfusion => "boundary_confusion",
            CognitiveTrap::ConstraintFailure => "constraint_failure",
            CognitiveTrap::Overgeneralization => "overgeneralization",
            CognitiveTrap::SuperficialSimilarity => "superficial_similarity",
            CognitiveTrap::PartialUnderstanding => "partial_understanding",
            CognitiveTrap::CalculationError => "calculation_error",
            CognitiveTrap::FalseEquivalence => "false_equivalence",
        }
    }
}

impl fmt::Display for CognitiveTrap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CognitiveTrap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        CognitiveTrap::ALL
            .into_iter()
            .find(|t| t.as_str() == needle)
            .ok_or_else(|| format!("unknown cognitive trap: {s}"))
    }
}

/// Why an incorrect choice is attractive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistractorInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cognitive_trap: Option<CognitiveTrap>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub plausibility_score: f64,
    /// The distractor follows a real rule that is misapplied here.
    #[serde(default, skip_serializing_if = "is_false")]
    pub exploits_valid_rule: bool,
}

/// Relation between column A and column B of a comparison item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    AGreater,
    BGreater,
    Equal,
    /// The relation depends on the values chosen ("not enough information").
    Undetermined,
}

impl Relation {
    /// Standard answer key of comparison items: A, B, C (equal), D (cannot be determined).
    pub fn for_choice_letter(letter: &str) -> Option<Relation> {
        match letter.trim().to_uppercase().as_str() {
            "A" => Some(Relation::AGreater),
            "B" => Some(Relation::BGreater),
            "C" => Some(Relation::Equal),
            "D" => Some(Relation::Undetermined),
            _ => None,
        }
    }

    pub fn choice_letter(&self) -> &'static str {
        match self {
            Relation::AGreater => "A",
            Relation::BGreater => "B",
            Relation::Equal => "C",
            Relation::Undetermined => "D",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Relation::AGreater => write!(f, "A > B"),
            Relation::BGreater => write!(f, "B > A"),
            Relation::Equal => write!(f, "A = B"),
            Relation::Undetermined => write!(f, "undetermined"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainKind {
    #[default]
    Real,
    Integer,
}

/// Domain of a single logic-engine variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDomain {
    #[serde(default)]
    pub kind: DomainKind,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub min_inclusive: bool,
    #[serde(default)]
    pub max_inclusive: bool,
    /// Explicit sample points overriding the derived ones.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub samples: Option<Vec<f64>>,
}

impl VariableDomain {
    /// Open real interval `(min, max)`.
    pub fn open(min: f64, max: f64) -> Self {
        Self {
            kind: DomainKind::Real,
            min,
            max,
            min_inclusive: false,
            max_inclusive: false,
            samples: None,
        }
    }

    /// Closed real interval `[min, max]`.
    pub fn closed(min: f64, max: f64) -> Self {
        Self {
            min_inclusive: true,
            max_inclusive: true,
            ..Self::open(min, max)
        }
    }

    pub fn contains(&self, v: f64) -> bool {
        let above = if self.min_inclusive { v >= self.min } else { v > self.min };
        let below = if self.max_inclusive { v <= self.max } else { v < self.max };
        above && below
    }
}

/// Symbolic rule set for items whose correctness is numerically checkable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogicEngine {
    pub variables: BTreeMap<String, VariableDomain>,
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Named expressions; comparison items use `column_a` and `column_b`.
    pub expressions: BTreeMap<String, String>,
    /// The relation the item claims as correct.
    pub relation: Relation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_result: Option<SolverResult>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationMethod {
    Template,
    #[default]
    External,
}

/// Provenance. Informational only.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMeta {
    #[serde(default)]
    pub method: GenerationMethod,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_id: Option<String>,
    /// Planned category of the slot the item filled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,
}

/// A bilingual multiple-choice test item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    #[serde(default)]
    pub text: BilingualText,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub explanation: BilingualText,
    #[serde(default)]
    pub classification: Option<Classification>,
    #[serde(default)]
    pub rendering: RenderingConfig,
    /// Incorrect-choice letter → rationale.
    #[serde(default)]
    pub distractor_rationale: BTreeMap<String, DistractorInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logic_engine: Option<LogicEngine>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_meta: Option<GenerationMeta>,
}

impl Item {
    /// Decode a raw document. Wrong types and missing required fields are
    /// schema errors; empty-but-typed content is left to the validator.
    pub fn from_value(value: &serde_json::Value) -> Result<Item, SchemaError> {
        Item::deserialize(value).map_err(|e| SchemaError::Malformed(e.to_string()))
    }

    /// The single correct choice, if exactly one is marked.
    pub fn correct_choice(&self) -> Option<&Choice> {
        let mut correct = self.choices.iter().filter(|c| c.is_correct);
        match (correct.next(), correct.next()) {
            (Some(c), None) => Some(c),
            _ => None,
        }
    }

    pub fn incorrect_choices(&self) -> impl Iterator<Item = &Choice> {
        self.choices.iter().filter(|c| !c.is_correct)
    }
}

/// Label for a raw item in diagnostics: its `id` when readable, otherwise its
/// 1-based position in the batch.
pub fn item_label(value: &serde_json::Value, index: usize) -> String {
    match value.get("id") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => s.clone(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        _ => format!("#{}", index + 1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cognitive_trap_display_and_parse() {
        assert_eq!(CognitiveTrap::BoundaryConfusion.to_string(), "boundary_confusion");
        assert_eq!(
            "sign_error".parse::<CognitiveTrap>().unwrap(),
            CognitiveTrap::SignError
        );
        assert_eq!(
            " False_Equivalence ".parse::<CognitiveTrap>().unwrap(),
            CognitiveTrap::FalseEquivalence
        );
        assert!("guessing".parse::<CognitiveTrap>().is_err());
    }

    #[test]
    fn relation_answer_key() {
        assert_eq!(Relation::for_choice_letter("b"), Some(Relation::BGreater));
        assert_eq!(Relation::for_choice_letter("D"), Some(Relation::Undetermined));
        assert_eq!(Relation::for_choice_letter("E"), None);
        assert_eq!(Relation::Equal.choice_letter(), "C");
    }

    #[test]
    fn item_id_accepts_int_or_string() {
        let id: ItemId = serde_json::from_value(json!(7)).unwrap();
        assert_eq!(id, ItemId::Int(7));
        let id: ItemId = serde_json::from_value(json!("math-0001")).unwrap();
        assert_eq!(id.to_string(), "math-0001");
    }

    #[test]
    fn comparison_rendering_decodes_from_layout_tag() {
        let rendering: RenderingConfig = serde_json::from_value(json!({
            "layout": "comparison_table",
            "requiresSymbolicNotation": true,
            "columns": { "A": { "symbolic": "x" }, "B": { "text": "квадратный корень из x" } },
            "condition": { "symbolic": "0 < x < 1" }
        }))
        .unwrap();
        assert!(rendering.requires_symbolic_notation);
        assert_eq!(rendering.layout.name(), "comparison_table");
        assert_eq!(rendering.symbolic_expressions(), vec!["0 < x < 1", "x"]);
    }

    #[test]
    fn unknown_layout_is_a_schema_error() {
        let raw = json!({ "id": 1, "rendering": { "layout": "hologram" } });
        assert!(matches!(Item::from_value(&raw), Err(SchemaError::Malformed(_))));
    }

    #[test]
    fn non_list_choices_is_a_schema_error() {
        let raw = json!({ "id": 1, "choices": "A) 1 B) 2" });
        let err = Item::from_value(&raw).unwrap_err();
        assert!(err.to_string().contains("malformed item"));
    }

    #[test]
    fn missing_content_decodes_as_empty() {
        let item = Item::from_value(&json!({ "id": "bare" })).unwrap();
        assert!(item.text.is_empty());
        assert!(item.choices.is_empty());
        assert!(item.classification.is_none());
        assert_eq!(item.rendering.layout, Layout::Standard);
    }

    #[test]
    fn bilingual_missing_locales() {
        let text = BilingualText::new("Сравните величины", " ");
        assert_eq!(text.missing_locales(), vec![Locale::Ky]);
        assert!(!text.is_empty());
    }

    #[test]
    fn item_label_falls_back_to_position() {
        assert_eq!(item_label(&json!({ "id": "q-1" }), 0), "q-1");
        assert_eq!(item_label(&json!({ "id": 12 }), 0), "12");
        assert_eq!(item_label(&json!({ "choices": 3 }), 4), "#5");
    }

    #[test]
    fn domain_membership_respects_bounds() {
        let open = VariableDomain::open(0.0, 1.0);
        assert!(!open.contains(0.0));
        assert!(open.contains(0.5));
        assert!(!open.contains(1.0));
        let closed = VariableDomain::closed(0.0, 1.0);
        assert!(closed.contains(0.0) && closed.contains(1.0));
    }
}
