//! Batch distribution planning.
//!
//! A target count is split across categories by truncating `total * ratio`
//! and handing the whole shortfall to the overflow category (largest ratio,
//! ties to the lexicographically first name). The result always sums to the
//! target and depends only on `(total, ratios)`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;

/// Allowed deviation of a ratio sum from 1.0.
pub const RATIO_SUM_TOLERANCE: f64 = 0.01;

/// Guards against `total * ratio` landing just below an integer.
const TRUNCATION_EPSILON: f64 = 1e-9;

/// Split `total` across the keys of `ratios`.
pub fn plan(total: usize, ratios: &BTreeMap<String, f64>) -> Result<BTreeMap<String, usize>, PlanError> {
    if ratios.is_empty() {
        return if total == 0 {
            Ok(BTreeMap::new())
        } else {
            Err(PlanError::EmptyRatios(total))
        };
    }
    for (category, &ratio) in ratios {
        if !ratio.is_finite() || ratio < 0.0 {
            return Err(PlanError::InvalidRatio {
                category: category.clone(),
                ratio,
            });
        }
    }
    let sum: f64 = ratios.values().sum();
    if (sum - 1.0).abs() > RATIO_SUM_TOLERANCE {
        return Err(PlanError::BadSum(sum));
    }

    let mut counts: BTreeMap<String, usize> = ratios
        .iter()
        .map(|(category, ratio)| {
            let share = total as f64 * ratio / sum;
            (category.clone(), (share + TRUNCATION_EPSILON).floor() as usize)
        })
        .collect();

    let overflow = overflow_category(ratios);
    let assigned: usize = counts.values().sum();
    if let Some(count) = counts.get_mut(overflow) {
        if assigned <= total {
            *count += total - assigned;
        } else {
            *count = count.saturating_sub(assigned - total);
        }
    }
    Ok(counts)
}

/// Category with the largest ratio; the first name wins a tie.
fn overflow_category(ratios: &BTreeMap<String, f64>) -> &str {
    let mut best: Option<(&str, f64)> = None;
    for (category, &ratio) in ratios {
        if best.map_or(true, |(_, r)| ratio > r) {
            best = Some((category, ratio));
        }
    }
    best.map_or("", |(c, _)| c)
}

/// One unit of generation work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: u64,
    pub category: String,
    pub difficulty: u8,
}

/// Category ratios plus the difficulty spread applied within each category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub category_ratios: BTreeMap<String, f64>,
    /// Keys are difficulty levels `"1"` through `"5"`.
    pub difficulty_ratios: BTreeMap<String, f64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let category_ratios = [
            ("math", 0.35),
            ("analogies", 0.15),
            ("reading", 0.25),
            ("grammar", 0.25),
        ];
        let difficulty_ratios = [("1", 0.1), ("2", 0.2), ("3", 0.4), ("4", 0.2), ("5", 0.1)];
        Self {
            category_ratios: category_ratios
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            difficulty_ratios: difficulty_ratios
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

/// A two-level allocation and the slots it expands to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchPlan {
    pub total: usize,
    pub categories: BTreeMap<String, usize>,
    /// Category → difficulty → count.
    pub difficulties: BTreeMap<String, BTreeMap<u8, usize>>,
    pub slots: Vec<Slot>,
}

/// Expand a category × difficulty allocation into sequential slots, numbered from 1.
pub fn plan_slots(
    total: usize,
    category_ratios: &BTreeMap<String, f64>,
    difficulty_ratios: &BTreeMap<String, f64>,
) -> Result<Vec<Slot>, PlanError> {
    Ok(plan_batch(total, category_ratios, difficulty_ratios)?.slots)
}

/// Plan a whole batch.
pub fn plan_batch(
    total: usize,
    category_ratios: &BTreeMap<String, f64>,
    difficulty_ratios: &BTreeMap<String, f64>,
) -> Result<BatchPlan, PlanError> {
    for key in difficulty_ratios.keys() {
        parse_difficulty(key)?;
    }
    let categories = plan(total, category_ratios)?;

    let mut difficulties = BTreeMap::new();
    let mut slots = Vec::with_capacity(total);
    for (category, &count) in &categories {
        let by_level: BTreeMap<u8, usize> = plan(count, difficulty_ratios)?
            .into_iter()
            .map(|(key, n)| parse_difficulty(&key).map(|level| (level, n)))
            .collect::<Result<_, _>>()?;
        for (&difficulty, &n) in &by_level {
            for _ in 0..n {
                slots.push(Slot {
                    id: slots.len() as u64 + 1,
                    category: category.clone(),
                    difficulty,
                });
            }
        }
        difficulties.insert(category.clone(), by_level);
    }

    tracing::debug!(total, slots = slots.len(), "planned batch");
    Ok(BatchPlan {
        total,
        categories,
        difficulties,
        slots,
    })
}

fn parse_difficulty(key: &str) -> Result<u8, PlanError> {
    match key.trim().parse::<u8>() {
        Ok(level) if (1..=5).contains(&level) => Ok(level),
        _ => Err(PlanError::BadDifficulty(key.to_string())),
    }
}
