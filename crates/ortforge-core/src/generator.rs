//! Template-driven item generation.
//!
//! Generation is a pure function of `(template, slot, seed, timestamp)`.
//! Randomness comes from a `ChaCha8Rng` seeded with the batch seed and
//! switched to the slot's own stream, so slots can be generated in any order
//! or in parallel and still reproduce byte for byte.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Deserialize;
use serde_json::Value;

use crate::distractor::DistractorModel;
use crate::error::GenerateError;
use crate::model::{
    Choice, Classification, GenerationMeta, GenerationMethod, Item, ItemId,
};
use crate::planner::Slot;
use crate::template::{Template, TemplateRegistry};

/// Word offset in the slot stream where placeholder draws begin. Template
/// selection uses the words before it.
const PLACEHOLDER_WORD_POS: u128 = 1 << 32;

/// Fills templates into items. Holds no mutable state.
#[derive(Debug, Clone)]
pub struct Generator {
    distractor: DistractorModel,
    seed: u64,
}

impl Generator {
    pub fn new(distractor: DistractorModel, seed: u64) -> Self {
        Self { distractor, seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    fn slot_rng(&self, slot_id: u64) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(slot_id);
        rng
    }

    /// Choose a template for a slot: one covering the slot's difficulty when
    /// possible, otherwise any template of the category.
    pub fn pick_template<'r>(
        &self,
        registry: &'r TemplateRegistry,
        slot: &Slot,
    ) -> Result<&'r Template, GenerateError> {
        let all = registry.for_category(&slot.category);
        if all.is_empty() {
            return Err(GenerateError::NoTemplate(slot.category.clone()));
        }
        let covering: Vec<&Template> = all
            .iter()
            .copied()
            .filter(|t| t.covers(slot.difficulty))
            .collect();
        let candidates = if covering.is_empty() { all } else { covering };

        let mut rng = self.slot_rng(slot.id);
        let index = rng.gen_range(0..candidates.len());
        Ok(candidates[index])
    }

    /// Pick a template for the slot and generate from it.
    pub fn generate_slot(
        &self,
        registry: &TemplateRegistry,
        slot: &Slot,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Item, GenerateError> {
        let template = self.pick_template(registry, slot)?;
        self.generate(&slot.category, template, slot.id, slot.difficulty, timestamp)
    }

    /// Produce one item from a template. The generator only populates fields;
    /// the caller validates the result.
    pub fn generate(
        &self,
        category: &str,
        template: &Template,
        slot_id: u64,
        difficulty: u8,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Item, GenerateError> {
        let values = self.draw_placeholders(template, slot_id)?;

        let choices = template
            .choices
            .iter()
            .map(|c| Choice {
                letter: c.letter.clone(),
                text: c.text.clone(),
                is_correct: c.correct,
            })
            .collect();

        let distractor_rationale = template
            .choices
            .iter()
            .filter(|c| !c.correct && (c.trap.is_some() || c.rationale.is_some()))
            .map(|c| {
                let info = self.distractor.engineer(
                    c.trap,
                    c.rationale.clone().unwrap_or_default(),
                    c.valid_rule,
                );
                (c.letter.clone(), info)
            })
            .collect();

        let item = Item {
            id: ItemId::Text(format!("{}-{slot_id:04}", template.id)),
            text: template.text.clone(),
            choices,
            explanation: template.explanation.clone(),
            classification: Some(Classification {
                section: template.section.clone(),
                subsection: template.subsection.clone(),
                difficulty: template.clamp_difficulty(difficulty),
                cognitive_load: template.cognitive_load,
            }),
            rendering: template.rendering.clone(),
            distractor_rationale,
            logic_engine: template.logic.clone(),
            generation_meta: Some(GenerationMeta {
                method: GenerationMethod::Template,
                timestamp,
                template_id: Some(template.id.clone()),
                category: Some(category.to_string()),
                seed: Some(self.seed),
                slot: Some(slot_id),
            }),
        };

        if values.is_empty() {
            return Ok(item);
        }
        let decode = |source| GenerateError::Decode {
            template: template.id.clone(),
            source,
        };
        let mut value = serde_json::to_value(&item).map_err(decode)?;
        substitute(&mut value, &values);
        let item = Item::deserialize(value).map_err(decode)?;
        tracing::trace!(template = %template.id, slot = slot_id, category, "filled template");
        Ok(item)
    }

    fn draw_placeholders(
        &self,
        template: &Template,
        slot_id: u64,
    ) -> Result<BTreeMap<String, i64>, GenerateError> {
        let mut rng = self.slot_rng(slot_id);
        rng.set_word_pos(PLACEHOLDER_WORD_POS);
        template
            .vars
            .iter()
            .map(|(name, range)| {
                if range.min > range.max {
                    return Err(GenerateError::BadPlaceholder {
                        template: template.id.clone(),
                        variable: name.clone(),
                        min: range.min,
                        max: range.max,
                    });
                }
                Ok((name.clone(), rng.gen_range(range.min..=range.max)))
            })
            .collect()
    }
}

/// Replace `{name}` in every string leaf.
fn substitute(value: &mut Value, values: &BTreeMap<String, i64>) {
    match value {
        Value::String(s) => {
            if s.contains('{') {
                for (name, v) in values {
                    let needle = format!("{{{name}}}");
                    if s.contains(&needle) {
                        *s = s.replace(&needle, &v.to_string());
                    }
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|v| substitute(v, values)),
        Value::Object(map) => map.values_mut().for_each(|v| substitute(v, values)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Layout;
    use crate::template::{parse_library_str, TEST_LIBRARY};
    use crate::validator::Validator;
    use std::path::PathBuf;

    fn registry() -> TemplateRegistry {
        let lib = parse_library_str(TEST_LIBRARY, &PathBuf::from("lib.toml")).unwrap();
        TemplateRegistry::from_libraries(vec![lib])
    }

    fn slot(id: u64, category: &str, difficulty: u8) -> Slot {
        Slot {
            id,
            category: category.into(),
            difficulty,
        }
    }

    #[test]
    fn identical_inputs_produce_identical_bytes() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 7);
        let ts = "2026-03-01T09:00:00Z".parse().ok();
        let a = generator.generate_slot(&registry, &slot(3, "math", 3), ts).unwrap();
        let b = generator.generate_slot(&registry, &slot(3, "math", 3), ts).unwrap();
        assert_eq!(
            serde_json::to_vec(&a).unwrap(),
            serde_json::to_vec(&b).unwrap()
        );
    }

    #[test]
    fn placeholders_are_substituted_everywhere() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 42);
        let item = generator.generate_slot(&registry, &slot(1, "math", 3), None).unwrap();
        let json = serde_json::to_string(&item).unwrap();
        assert!(!json.contains("{k}"));

        let logic = item.logic_engine.as_ref().unwrap();
        let k: i64 = logic.expressions["column_a"]
            .trim_end_matches("*x")
            .parse()
            .unwrap();
        assert!((2..=9).contains(&k));
        assert!(item.text.ru.contains(&format!("{k}x")));
        match &item.rendering.layout {
            Layout::ComparisonTable { columns, .. } => {
                assert_eq!(
                    columns.a.as_ref().unwrap().symbolic.as_deref(),
                    Some(format!("{k}*x").as_str())
                );
            }
            other => panic!("unexpected layout {other:?}"),
        }
    }

    #[test]
    fn item_metadata() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 42);
        let item = generator.generate_slot(&registry, &slot(12, "math", 5), None).unwrap();
        assert_eq!(item.id.to_string(), "cmp-scale-0012");
        let class = item.classification.unwrap();
        assert_eq!(class.difficulty, 4);
        assert_eq!(class.section, "math");
        let meta = item.generation_meta.unwrap();
        assert_eq!(meta.method, GenerationMethod::Template);
        assert_eq!(meta.seed, Some(42));
        assert_eq!(meta.slot, Some(12));
        assert_eq!(meta.template_id.as_deref(), Some("cmp-scale"));
        assert_eq!(meta.category.as_deref(), Some("math"));
    }

    #[test]
    fn placeholder_draws_use_their_own_words() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 42);
        let template = registry.get("cmp-scale").unwrap();
        let values = generator.draw_placeholders(template, 3).unwrap();

        let mut rng = generator.slot_rng(3);
        rng.set_word_pos(PLACEHOLDER_WORD_POS);
        let range = &template.vars["k"];
        assert_eq!(values["k"], rng.gen_range(range.min..=range.max));

        let mut pick = generator.slot_rng(3);
        for _ in 0..64 {
            let _ = pick.gen_range(0..usize::MAX);
        }
        assert!(pick.get_word_pos() < PLACEHOLDER_WORD_POS);
    }

    #[test]
    fn rationale_scores_come_from_the_distractor_model() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 1);
        let item = generator.generate_slot(&registry, &slot(1, "math", 2), None).unwrap();
        assert_eq!(item.distractor_rationale.len(), 3);
        assert!(!item.distractor_rationale.contains_key("A"));
        assert!((item.distractor_rationale["D"].plausibility_score - 0.8).abs() < 1e-12);
    }

    #[test]
    fn generated_items_validate() {
        let registry = registry();
        let generator = Generator::new(DistractorModel::default(), 99);
        let validator = Validator::default();
        for id in 1..=20 {
            let item = generator.generate_slot(&registry, &slot(id, "math", 3), None).unwrap();
            let result = validator.validate(&item).unwrap();
            assert!(result.errors.is_empty(), "{}: {:?}", item.id, result.errors);
            assert!(result.solver.unwrap().passed());
        }
    }

    #[test]
    fn unknown_category_has_no_template() {
        let generator = Generator::new(DistractorModel::default(), 1);
        let err = generator
            .generate_slot(&registry(), &slot(1, "reading", 3), None)
            .unwrap_err();
        assert!(matches!(err, GenerateError::NoTemplate(c) if c == "reading"));
    }

    #[test]
    fn inverted_placeholder_range_is_an_error() {
        let mut template = registry().get("cmp-scale").unwrap().clone();
        template.vars.get_mut("k").unwrap().min = 10;
        let generator = Generator::new(DistractorModel::default(), 1);
        let err = generator.generate("math", &template, 1, 3, None).unwrap_err();
        assert!(matches!(err, GenerateError::BadPlaceholder { .. }));
    }
}
