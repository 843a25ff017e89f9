//! Batch statistics: distribution histograms and plan drift.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::distractor::DistractorModel;
use crate::model::Item;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub items: usize,
    pub layouts: BTreeMap<String, usize>,
    pub difficulties: BTreeMap<u8, usize>,
    pub sections: BTreeMap<String, usize>,
    /// Planned category of generated items, or the section for items
    /// without generation metadata.
    pub categories: BTreeMap<String, usize>,
    /// Mean of the per-item average distractor plausibility.
    pub average_plausibility: Option<f64>,
}

/// Histograms over a set of decoded items.
pub fn compute_batch_statistics(items: &[Item], distractor: &DistractorModel) -> BatchStatistics {
    let mut stats = BatchStatistics {
        items: items.len(),
        ..Default::default()
    };
    let mut plausibility = Vec::new();

    for item in items {
        *stats
            .layouts
            .entry(item.rendering.layout.name().to_string())
            .or_insert(0) += 1;
        let section = item.classification.as_ref().map(|class| {
            *stats.difficulties.entry(class.difficulty).or_insert(0) += 1;
            *stats.sections.entry(class.section.clone()).or_insert(0) += 1;
            &class.section
        });
        let category = item
            .generation_meta
            .as_ref()
            .and_then(|meta| meta.category.as_ref())
            .or(section);
        if let Some(category) = category {
            *stats.categories.entry(category.clone()).or_insert(0) += 1;
        }
        if let Some(avg) = distractor.average_plausibility(item) {
            plausibility.push(avg);
        }
    }

    if !plausibility.is_empty() {
        stats.average_plausibility =
            Some(plausibility.iter().sum::<f64>() / plausibility.len() as f64);
    }
    stats
}

/// Realised minus planned count per category. Categories present on only one
/// side are included.
pub fn plan_drift(
    planned: &BTreeMap<String, usize>,
    realised: &BTreeMap<String, usize>,
) -> BTreeMap<String, i64> {
    planned
        .keys()
        .chain(realised.keys())
        .map(|category| {
            let p = planned.get(category).copied().unwrap_or(0) as i64;
            let r = realised.get(category).copied().unwrap_or(0) as i64;
            (category.clone(), r - p)
        })
        .collect()
}
