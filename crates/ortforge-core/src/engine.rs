//! Batch orchestration.
//!
//! Items are independent, so validation and generation fan out over a rayon
//! pool sized by `parallelism`. Workers share only read-only state (config,
//! validator, template registry) and return their results; the caller's
//! collect is the single merge point. Output order always follows input order.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;

use crate::config::OrtConfig;
use crate::generator::Generator;
use crate::model::{item_label, Item};
use crate::planner::{plan_batch, BatchPlan, Slot};
use crate::report::{ItemReport, ValidationReport};
use crate::template::TemplateRegistry;
use crate::validator::Validator;

/// Progress reporting trait.
pub trait ProgressReporter: Send + Sync {
    fn on_item_complete(&self, report: &ItemReport);
    fn on_batch_complete(&self, total: usize, errors: usize, elapsed: Duration);
}

/// No-op progress reporter.
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_item_complete(&self, _: &ItemReport) {}
    fn on_batch_complete(&self, _: usize, _: usize, _: Duration) {}
}

/// Output of a generation run.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedBatch {
    pub plan: BatchPlan,
    /// Items with no errors, solver results attached.
    pub accepted: Vec<Item>,
    /// Ids of items (or slots) excluded from the output.
    pub rejected: Vec<String>,
    pub report: ValidationReport,
}

/// Validate one raw item. Schema errors stay scoped to this item.
pub fn validate_value(validator: &Validator, index: usize, value: &Value) -> ItemReport {
    let label = item_label(value, index);
    let item = match Item::from_value(value) {
        Ok(item) => item,
        Err(e) => {
            tracing::debug!(item = %label, "schema error: {e}");
            return ItemReport::schema_error(label, index, &e);
        }
    };
    match validator.validate(&item) {
        Ok(result) => ItemReport::from_result(label, index, Some(item.rendering.layout.name()), &result),
        Err(e) => {
            tracing::debug!(item = %label, "schema error: {e}");
            ItemReport::schema_error(label, index, &e)
        }
    }
}

/// Validate a batch on the calling thread.
pub fn validate_values(validator: &Validator, source: &str, values: &[Value]) -> ValidationReport {
    let items = values
        .iter()
        .enumerate()
        .map(|(i, v)| validate_value(validator, i, v))
        .collect();
    ValidationReport::new(source, items)
}

/// The batch engine.
pub struct BatchEngine {
    config: OrtConfig,
    validator: Validator,
    registry: Option<TemplateRegistry>,
    pool: rayon::ThreadPool,
}

impl BatchEngine {
    pub fn new(config: OrtConfig) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.parallelism.max(1))
            .thread_name(|i| format!("ortforge-worker-{i}"))
            .build()
            .context("failed to build worker pool")?;
        Ok(Self {
            validator: config.validator(),
            config,
            registry: None,
            pool,
        })
    }

    pub fn with_registry(mut self, registry: TemplateRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(&self) -> &OrtConfig {
        &self.config
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Validate raw items in parallel.
    #[tracing::instrument(skip_all, fields(source = %source, items = values.len()))]
    pub fn validate_batch(
        &self,
        source: &str,
        values: &[Value],
        progress: &dyn ProgressReporter,
    ) -> ValidationReport {
        let start = Instant::now();
        let items: Vec<ItemReport> = self.pool.install(|| {
            values
                .par_iter()
                .enumerate()
                .map(|(i, v)| {
                    let report = validate_value(&self.validator, i, v);
                    progress.on_item_complete(&report);
                    report
                })
                .collect()
        });
        let report = ValidationReport::new(source, items);
        progress.on_batch_complete(report.summary.total, report.summary.errors, start.elapsed());
        tracing::info!(
            passed = report.passed,
            errors = report.summary.errors,
            warnings = report.summary.warnings,
            "validated batch"
        );
        report
    }

    /// Plan, generate and validate `total` items.
    #[tracing::instrument(skip_all, fields(total, seed = self.config.seed))]
    pub fn generate_batch(
        &self,
        total: usize,
        timestamp: Option<DateTime<Utc>>,
        progress: &dyn ProgressReporter,
    ) -> Result<GeneratedBatch> {
        let start = Instant::now();
        let registry = self
            .registry
            .as_ref()
            .context("generation needs a template registry")?;
        let plan = plan_batch(
            total,
            &self.config.planner.category_ratios,
            &self.config.planner.difficulty_ratios,
        )
        .context("failed to plan batch")?;

        let generator = Generator::new(self.validator.distractor_model().clone(), self.config.seed);
        let outcomes: Vec<(ItemReport, Option<Item>)> = self.pool.install(|| {
            plan.slots
                .par_iter()
                .enumerate()
                .map(|(index, slot)| {
                    let outcome = self.generate_one(&generator, registry, index, slot, timestamp);
                    progress.on_item_complete(&outcome.0);
                    outcome
                })
                .collect()
        });

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut reports = Vec::with_capacity(outcomes.len());
        for (report, item) in outcomes {
            match item {
                Some(item) => accepted.push(item),
                None => rejected.push(report.item_id.clone()),
            }
            reports.push(report);
        }

        let report = ValidationReport::new(format!("generated (seed {})", self.config.seed), reports);
        progress.on_batch_complete(total, report.summary.errors, start.elapsed());
        tracing::info!(
            accepted = accepted.len(),
            rejected = rejected.len(),
            "generated batch"
        );

        Ok(GeneratedBatch {
            plan,
            accepted,
            rejected,
            report,
        })
    }

    fn generate_one(
        &self,
        generator: &Generator,
        registry: &TemplateRegistry,
        index: usize,
        slot: &Slot,
        timestamp: Option<DateTime<Utc>>,
    ) -> (ItemReport, Option<Item>) {
        let mut item = match generator.generate_slot(registry, slot, timestamp) {
            Ok(item) => item,
            Err(e) => {
                tracing::warn!(slot = slot.id, "generation failed: {e}");
                let id = format!("slot-{:04}", slot.id);
                return (ItemReport::generation_error(id, index, &e), None);
            }
        };
        let id = item.id.to_string();
        match self.validator.validate(&item) {
            Ok(result) => {
                let report =
                    ItemReport::from_result(id, index, Some(item.rendering.layout.name()), &result);
                if !result.is_valid() {
                    return (report, None);
                }
                if let Some(engine) = item.logic_engine.as_mut() {
                    engine.solver_result = result.solver;
                }
                (report, Some(item))
            }
            Err(e) => (ItemReport::schema_error(id, index, &e), None),
        }
    }
}
