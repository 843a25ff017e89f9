//! Distractor engineering: plausibility scoring and trap coverage.
//!
//! Scores are a fixed weighted sum, so the same rationale always scores the
//! same.

use serde::{Deserialize, Serialize};

use crate::model::{CognitiveTrap, DistractorInfo, Item};
use crate::validator::{Category, Diagnostic, ValidationResult};

const BASE_SCORE: f64 = 0.5;
const TRAP_WEIGHT: f64 = 0.2;
const DESCRIPTION_WEIGHT: f64 = 0.2;
const VALID_RULE_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistractorConfig {
    /// Descriptions at least this long (in characters) count as specific.
    pub min_description_chars: usize,
    /// Average plausibility below this raises a warning.
    pub plausibility_floor: f64,
}

impl Default for DistractorConfig {
    fn default() -> Self {
        Self {
            min_description_chars: 50,
            plausibility_floor: 0.6,
        }
    }
}

/// Plausibility of a single distractor rationale, in `[0, 1]`.
pub fn score_distractor(info: &DistractorInfo, config: &DistractorConfig) -> f64 {
    let mut score = BASE_SCORE;
    if info.cognitive_trap.is_some() {
        score += TRAP_WEIGHT;
    }
    if info.description.trim().chars().count() >= config.min_description_chars {
        score += DESCRIPTION_WEIGHT;
    }
    if info.exploits_valid_rule {
        score += VALID_RULE_WEIGHT;
    }
    score.clamp(0.0, 1.0)
}

/// Scores and checks distractor rationales against one immutable config.
#[derive(Debug, Clone, Default)]
pub struct DistractorModel {
    config: DistractorConfig,
}

impl DistractorModel {
    pub fn new(config: DistractorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistractorConfig {
        &self.config
    }

    pub fn score(&self, info: &DistractorInfo) -> f64 {
        score_distractor(info, &self.config)
    }

    /// Build a rationale with its computed plausibility score filled in.
    pub fn engineer(
        &self,
        trap: Option<CognitiveTrap>,
        description: impl Into<String>,
        exploits_valid_rule: bool,
    ) -> DistractorInfo {
        let mut info = DistractorInfo {
            cognitive_trap: trap,
            description: description.into(),
            plausibility_score: 0.0,
            exploits_valid_rule,
        };
        info.plausibility_score = self.score(&info);
        info
    }

    /// Every incorrect choice needs a rationale (error when missing); a weak
    /// average across the rationales present is only a warning.
    pub fn assert_trap_coverage(&self, item: &Item) -> ValidationResult {
        let mut result = ValidationResult::default();
        let correct: Vec<&str> = item
            .choices
            .iter()
            .filter(|c| c.is_correct)
            .map(|c| c.letter.as_str())
            .collect();

        let mut scores = Vec::new();
        for choice in item.incorrect_choices() {
            match item.distractor_rationale.get(&choice.letter) {
                Some(info) => scores.push(self.score(info)),
                None => result.push(Diagnostic::error(
                    Category::Distractor,
                    format!(
                        "incorrect choice {} has no distractor rationale",
                        choice.letter
                    ),
                )),
            }
        }

        for (letter, info) in &item.distractor_rationale {
            if correct.contains(&letter.as_str()) {
                result.push(Diagnostic::warning(
                    Category::Distractor,
                    format!("distractor rationale given for the correct choice {letter}"),
                ));
            } else if !item.choices.iter().any(|c| &c.letter == letter) {
                result.push(Diagnostic::warning(
                    Category::Distractor,
                    format!("distractor rationale for unknown choice {letter}"),
                ));
            }
            let declared = info.plausibility_score;
            if !declared.is_finite() || !(0.0..=1.0).contains(&declared) {
                result.push(Diagnostic::error(
                    Category::Distractor,
                    format!("plausibility score {declared} for choice {letter} is outside [0, 1]"),
                ));
            }
        }

        if let Some(avg) = average(&scores) {
            if avg < self.config.plausibility_floor {
                result.push(Diagnostic::warning(
                    Category::Distractor,
                    format!(
                        "average distractor plausibility {avg:.2} is below the floor of {:.2}",
                        self.config.plausibility_floor
                    ),
                ));
            }
        }
        result
    }

    /// Mean computed plausibility over the item's incorrect-choice rationales.
    pub fn average_plausibility(&self, item: &Item) -> Option<f64> {
        let scores: Vec<f64> = item
            .incorrect_choices()
            .filter_map(|c| item.distractor_rationale.get(&c.letter))
            .map(|info| self.score(info))
            .collect();
        average(&scores)
    }
}

fn average(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
