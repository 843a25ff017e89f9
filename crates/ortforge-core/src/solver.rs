//! Numeric verification of quantitative-comparison items.
//!
//! Every declared variable gets a small, fixed set of sample points from its
//! domain. Constraints must hold at every sample combination (a violation
//! means the domain and constraints disagree, which is malformed input), and
//! the declared relation between `column_a` and `column_b` must hold at every
//! combination for the solve to pass.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{format_sample, SchemaError};
use crate::expr::{Env, Expr, Predicate};
use crate::model::{DomainKind, LogicEngine, Relation, VariableDomain};

pub const COLUMN_A: &str = "column_a";
pub const COLUMN_B: &str = "column_b";

const MAX_COUNTEREXAMPLES: usize = 10;

/// Solver tuning. Sample counts are small and fixed so a solve always terminates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Absolute tolerance for equality.
    pub tolerance: f64,
    /// Upper bound on the cartesian product of sample points.
    pub max_combinations: usize,
    /// Interior points of a real domain as fractions of its width.
    pub interior_fractions: Vec<f64>,
    /// Integer domains up to this size are sampled exhaustively.
    pub max_integer_points: usize,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            tolerance: 1e-9,
            max_combinations: 4096,
            interior_fractions: vec![0.01, 0.25, 0.5, 0.75, 0.99],
            max_integer_points: 11,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SolverStatus {
    Passed,
    Failed,
}

/// A sample combination at which the declared relation does not hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Counterexample {
    pub sample: BTreeMap<String, f64>,
    pub column_a: f64,
    pub column_b: f64,
    pub observed: Relation,
}

impl std::fmt::Display for Counterexample {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "at {}: column_a={}, column_b={} ({})",
            format_sample(&self.sample),
            self.column_a,
            self.column_b,
            self.observed
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SolverResult {
    pub status: SolverStatus,
    /// The relation the item claims.
    pub relation: Relation,
    /// Distinct relations seen across all samples.
    pub observed: Vec<Relation>,
    pub samples_checked: usize,
    pub sample_points: BTreeMap<String, Vec<f64>>,
    #[serde(default)]
    pub counterexamples: Vec<Counterexample>,
}

impl SolverResult {
    pub fn passed(&self) -> bool {
        self.status == SolverStatus::Passed
    }
}

/// Constraint solver over a logic engine's declared domains.
#[derive(Debug, Clone, Default)]
pub struct Solver {
    config: SolverConfig,
}

impl Solver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }

    #[tracing::instrument(level = "debug", skip_all, fields(relation = %engine.relation))]
    pub fn solve(&self, engine: &LogicEngine) -> Result<SolverResult, SchemaError> {
        let declared: BTreeSet<String> = engine.variables.keys().cloned().collect();

        let constraints = engine
            .constraints
            .iter()
            .map(|src| {
                let p = Predicate::parse(src).map_err(|e| invalid(src, e))?;
                check_declared(src, p.variables(), &declared)?;
                Ok((src.as_str(), p))
            })
            .collect::<Result<Vec<_>, SchemaError>>()?;

        let mut compiled = BTreeMap::new();
        for (name, src) in &engine.expressions {
            let e = Expr::parse(src).map_err(|err| invalid(src, err))?;
            check_declared(src, e.variables(), &declared)?;
            compiled.insert(name.as_str(), (src.as_str(), e));
        }
        let (src_a, column_a) = compiled
            .get(COLUMN_A)
            .ok_or_else(|| SchemaError::MissingExpression(COLUMN_A.into()))?;
        let (src_b, column_b) = compiled
            .get(COLUMN_B)
            .ok_or_else(|| SchemaError::MissingExpression(COLUMN_B.into()))?;

        let mut sample_points = BTreeMap::new();
        for (name, domain) in &engine.variables {
            sample_points.insert(name.clone(), self.sample_points(name, domain)?);
        }
        let total = sample_points
            .values()
            .try_fold(1usize, |acc, pts| acc.checked_mul(pts.len()))
            .unwrap_or(usize::MAX);
        if total > self.config.max_combinations {
            return Err(SchemaError::TooManySamples {
                combinations: total,
                cap: self.config.max_combinations,
            });
        }

        let names: Vec<&String> = sample_points.keys().collect();
        let points: Vec<&Vec<f64>> = sample_points.values().collect();
        let mut cursor = vec![0usize; names.len()];
        let tol = self.config.tolerance;

        let mut observed = BTreeSet::new();
        let mut counterexamples = Vec::new();
        let mut violations = 0usize;

        for _ in 0..total {
            let env: Env = names
                .iter()
                .zip(&points)
                .zip(&cursor)
                .map(|((name, pts), &i)| ((*name).clone(), pts[i]))
                .collect();

            for (src, constraint) in &constraints {
                let holds = constraint
                    .eval(&env, tol)
                    .map_err(|e| invalid_at(src, e, &env))?;
                if !holds {
                    return Err(SchemaError::SolverInconsistency {
                        constraint: (*src).to_string(),
                        sample: env,
                    });
                }
            }

            let a = column_a.eval(&env).map_err(|e| invalid_at(src_a, e, &env))?;
            let b = column_b.eval(&env).map_err(|e| invalid_at(src_b, e, &env))?;
            let seen = classify(a, b, tol);
            observed.insert(seen);

            let holds = match engine.relation {
                Relation::AGreater => a > b,
                Relation::BGreater => b > a,
                Relation::Equal => (a - b).abs() <= tol,
                // Decided once all samples are in.
                Relation::Undetermined => true,
            };
            if !holds {
                violations += 1;
                if counterexamples.len() < MAX_COUNTEREXAMPLES {
                    counterexamples.push(Counterexample {
                        sample: env.clone(),
                        column_a: a,
                        column_b: b,
                        observed: seen,
                    });
                }
            }

            advance(&mut cursor, &points);
        }

        let passed = match engine.relation {
            Relation::Undetermined => {
                if observed.len() < 2 && total > 0 {
                    // A constant relation is a counterexample to "cannot be determined".
                    let env: Env = names
                        .iter()
                        .zip(&points)
                        .map(|(name, pts)| ((*name).clone(), pts[0]))
                        .collect();
                    let a = column_a.eval(&env).map_err(|e| invalid_at(src_a, e, &env))?;
                    let b = column_b.eval(&env).map_err(|e| invalid_at(src_b, e, &env))?;
                    counterexamples.push(Counterexample {
                        sample: env,
                        column_a: a,
                        column_b: b,
                        observed: classify(a, b, tol),
                    });
                }
                observed.len() >= 2
            }
            _ => violations == 0,
        };

        tracing::debug!(
            samples = total,
            violations,
            passed,
            "solved comparison for relation {}",
            engine.relation
        );

        Ok(SolverResult {
            status: if passed {
                SolverStatus::Passed
            } else {
                SolverStatus::Failed
            },
            relation: engine.relation,
            observed: observed.into_iter().collect(),
            samples_checked: total,
            sample_points,
            counterexamples,
        })
    }

    /// Deterministic sample points for one variable, sorted and deduplicated.
    /// Inclusive bounds are sampled; exclusive bounds never are.
    pub fn sample_points(
        &self,
        name: &str,
        domain: &VariableDomain,
    ) -> Result<Vec<f64>, SchemaError> {
        let bad = |message: String| SchemaError::InvalidDomain {
            variable: name.to_string(),
            message,
        };
        if !domain.min.is_finite() || !domain.max.is_finite() {
            return Err(bad("bounds must be finite".into()));
        }
        let degenerate = domain.min == domain.max && domain.min_inclusive && domain.max_inclusive;
        if domain.min > domain.max || (domain.min == domain.max && !degenerate) {
            return Err(bad(format!(
                "empty interval between {} and {}",
                domain.min, domain.max
            )));
        }

        let mut points = match &domain.samples {
            Some(explicit) => {
                if explicit.is_empty() {
                    return Err(bad("explicit sample list is empty".into()));
                }
                for &v in explicit {
                    if !v.is_finite() || !domain.contains(v) {
                        return Err(bad(format!("sample {v} lies outside the domain")));
                    }
                    if domain.kind == DomainKind::Integer && v.fract() != 0.0 {
                        return Err(bad(format!("sample {v} is not an integer")));
                    }
                }
                explicit.clone()
            }
            None => match domain.kind {
                DomainKind::Real => self.real_points(domain),
                DomainKind::Integer => self.integer_points(domain).ok_or_else(|| {
                    bad(format!(
                        "no integers between {} and {}",
                        domain.min, domain.max
                    ))
                })?,
            },
        };

        points.sort_by(f64::total_cmp);
        points.dedup();
        if points.is_empty() {
            return Err(bad("no sample points".into()));
        }
        Ok(points)
    }

    fn real_points(&self, domain: &VariableDomain) -> Vec<f64> {
        let width = domain.max - domain.min;
        let mut points = Vec::with_capacity(self.config.interior_fractions.len() + 2);
        if domain.min_inclusive {
            points.push(domain.min);
        }
        points.extend(
            self.config
                .interior_fractions
                .iter()
                .filter(|f| **f > 0.0 && **f < 1.0)
                .map(|f| domain.min + f * width)
                .filter(|v| domain.contains(*v)),
        );
        if domain.max_inclusive {
            points.push(domain.max);
        }
        points
    }

    fn integer_points(&self, domain: &VariableDomain) -> Option<Vec<f64>> {
        let lo = if domain.min_inclusive {
            domain.min.ceil()
        } else {
            (domain.min + 1.0).floor()
        };
        let hi = if domain.max_inclusive {
            domain.max.floor()
        } else {
            (domain.max - 1.0).ceil()
        };
        if lo > hi {
            return None;
        }
        let width = hi - lo;
        if width < self.config.max_integer_points as f64 {
            let count = width as usize + 1;
            return Some((0..count).map(|i| lo + i as f64).collect());
        }
        let mut points = vec![lo, hi];
        points.extend(
            self.config
                .interior_fractions
                .iter()
                .filter(|f| **f > 0.0 && **f < 1.0)
                .map(|f| (lo + f * width).round())
                .filter(|v| domain.contains(*v)),
        );
        Some(points)
    }
}

/// Solve with the default configuration.
pub fn solve(engine: &LogicEngine) -> Result<SolverResult, SchemaError> {
    Solver::default().solve(engine)
}

fn classify(a: f64, b: f64, tol: f64) -> Relation {
    if (a - b).abs() <= tol {
        Relation::Equal
    } else if a > b {
        Relation::AGreater
    } else {
        Relation::BGreater
    }
}

/// Odometer step over the per-variable sample indices.
fn advance(cursor: &mut [usize], points: &[&Vec<f64>]) {
    for k in (0..cursor.len()).rev() {
        cursor[k] += 1;
        if cursor[k] < points[k].len() {
            return;
        }
        cursor[k] = 0;
    }
}

fn check_declared(
    src: &str,
    used: BTreeSet<String>,
    declared: &BTreeSet<String>,
) -> Result<(), SchemaError> {
    match used.into_iter().find(|v| !declared.contains(v)) {
        Some(variable) => Err(SchemaError::UndeclaredVariable {
            source_text: src.to_string(),
            variable,
        }),
        None => Ok(()),
    }
}

fn invalid(src: &str, err: crate::expr::ExprError) -> SchemaError {
    SchemaError::InvalidExpression {
        source_text: src.to_string(),
        message: err.to_string(),
    }
}

fn invalid_at(src: &str, err: crate::expr::ExprError, env: &Env) -> SchemaError {
    SchemaError::InvalidExpression {
        source_text: src.to_string(),
        message: format!("{err} at {}", format_sample(env)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine(domain: VariableDomain, a: &str, b: &str, relation: Relation) -> LogicEngine {
        LogicEngine {
            variables: [("x".to_string(), domain)].into_iter().collect(),
            constraints: vec!["x > 0 ∧ x < 1".into()],
            expressions: [
                (COLUMN_A.to_string(), a.to_string()),
                (COLUMN_B.to_string(), b.to_string()),
            ]
            .into_iter()
            .collect(),
            relation,
            solver_result: None,
        }
    }

    #[test]
    fn open_unit_interval_samples_interior_points() {
        let pts = Solver::default()
            .sample_points("x", &VariableDomain::open(0.0, 1.0))
            .unwrap();
        assert_eq!(pts, vec![0.01, 0.25, 0.5, 0.75, 0.99]);
    }

    #[test]
    fn inclusive_bounds_are_sampled() {
        let pts = Solver::default()
            .sample_points("x", &VariableDomain::closed(0.0, 2.0))
            .unwrap();
        assert_eq!(pts.first(), Some(&0.0));
        assert_eq!(pts.last(), Some(&2.0));
        assert_eq!(pts.len(), 7);
    }

    #[test]
    fn sqrt_exceeds_x_on_unit_interval() {
        let result = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "x",
            "sqrt(x)",
            Relation::BGreater,
        ))
        .unwrap();
        assert!(result.passed());
        assert_eq!(result.samples_checked, 5);
        assert_eq!(result.observed, vec![Relation::BGreater]);
        assert!(result.counterexamples.is_empty());
    }

    #[test]
    fn flipped_relation_fails_with_counterexamples() {
        let result = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "x",
            "sqrt(x)",
            Relation::AGreater,
        ))
        .unwrap();
        assert_eq!(result.status, SolverStatus::Failed);
        assert!(!result.counterexamples.is_empty());
        let first = &result.counterexamples[0];
        assert_eq!(first.sample["x"], 0.01);
        assert_eq!(first.observed, Relation::BGreater);
    }

    #[test]
    fn equality_within_tolerance() {
        let result = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "sqrt(x) * sqrt(x)",
            "x",
            Relation::Equal,
        ))
        .unwrap();
        assert!(result.passed());
    }

    #[test]
    fn sign_flip_fails_a_definite_relation() {
        let result = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "x",
            "0.5",
            Relation::BGreater,
        ))
        .unwrap();
        assert!(!result.passed());
        assert_eq!(
            result.observed,
            vec![Relation::AGreater, Relation::BGreater, Relation::Equal]
        );
    }

    #[test]
    fn undetermined_passes_only_when_relation_varies() {
        let varies = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "x",
            "0.5",
            Relation::Undetermined,
        ))
        .unwrap();
        assert!(varies.passed());

        let constant = solve(&engine(
            VariableDomain::open(0.0, 1.0),
            "x",
            "sqrt(x)",
            Relation::Undetermined,
        ))
        .unwrap();
        assert!(!constant.passed());
        assert_eq!(constant.counterexamples.len(), 1);
    }

    #[test]
    fn constraint_violated_by_sample_is_inconsistency() {
        let err = solve(&engine(
            VariableDomain::closed(0.0, 1.0),
            "x",
            "sqrt(x)",
            Relation::BGreater,
        ))
        .unwrap_err();
        match err {
            SchemaError::SolverInconsistency { constraint, sample } => {
                assert_eq!(constraint, "x > 0 ∧ x < 1");
                assert_eq!(sample["x"], 0.0);
            }
            other => panic!("expected inconsistency, got {other:?}"),
        }
    }

    #[test]
    fn integer_domains() {
        let solver = Solver::default();
        let small = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::closed(1.0, 5.0)
        };
        assert_eq!(
            solver.sample_points("n", &small).unwrap(),
            vec![1.0, 2.0, 3.0, 4.0, 5.0]
        );

        let exclusive = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::open(0.0, 4.0)
        };
        assert_eq!(
            solver.sample_points("n", &exclusive).unwrap(),
            vec![1.0, 2.0, 3.0]
        );

        let wide = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::closed(0.0, 100.0)
        };
        assert_eq!(
            solver.sample_points("n", &wide).unwrap(),
            vec![0.0, 1.0, 25.0, 50.0, 75.0, 99.0, 100.0]
        );

        let empty = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::open(0.0, 1.0)
        };
        assert!(matches!(
            solver.sample_points("n", &empty),
            Err(SchemaError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn huge_integer_domain_is_sampled_not_enumerated() {
        let domain = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::closed(0.0, 1e30)
        };
        let pts = Solver::default().sample_points("x", &domain).unwrap();
        assert_eq!(pts.len(), 7);
        assert_eq!(pts.first(), Some(&0.0));
        assert_eq!(pts.last(), Some(&1e30));

        let mut e = engine(domain, "x", "x + 1", Relation::BGreater);
        e.constraints.clear();
        let result = solve(&e).unwrap();
        assert_eq!(result.samples_checked, 7);
        assert_eq!(result.status, SolverStatus::Failed);
    }

    #[test]
    fn wide_integer_sampling_stays_inside_the_domain() {
        let solver = Solver::new(SolverConfig {
            interior_fractions: vec![-0.5, 0.5, 1.0, 1.5],
            ..SolverConfig::default()
        });
        let domain = VariableDomain {
            kind: DomainKind::Integer,
            ..VariableDomain::closed(0.0, 40.0)
        };
        assert_eq!(
            solver.sample_points("n", &domain).unwrap(),
            vec![0.0, 20.0, 40.0]
        );
    }

    #[test]
    fn empty_sample_set_is_rejected() {
        let solver = Solver::new(SolverConfig {
            interior_fractions: vec![],
            ..SolverConfig::default()
        });
        let e = engine(VariableDomain::open(0.0, 1.0), "x", "sqrt(x)", Relation::AGreater);
        match solver.solve(&e).unwrap_err() {
            SchemaError::InvalidDomain { variable, message } => {
                assert_eq!(variable, "x");
                assert_eq!(message, "no sample points");
            }
            other => panic!("expected invalid domain, got {other:?}"),
        }

        let sliver = VariableDomain::open(1.0, 1.0 + f64::EPSILON);
        assert!(matches!(
            Solver::default().sample_points("x", &sliver),
            Err(SchemaError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn explicit_samples_replace_generated_points() {
        let domain = VariableDomain {
            samples: Some(vec![0.9, 0.1, 0.1]),
            ..VariableDomain::open(0.0, 1.0)
        };
        assert_eq!(
            Solver::default().sample_points("x", &domain).unwrap(),
            vec![0.1, 0.9]
        );

        let e = engine(domain, "x", "sqrt(x)", Relation::BGreater);
        let result = solve(&e).unwrap();
        assert_eq!(result.samples_checked, 2);
        assert_eq!(result.sample_points["x"], vec![0.1, 0.9]);
    }

    #[test]
    fn explicit_samples_must_respect_exclusive_bounds() {
        let domain = VariableDomain {
            samples: Some(vec![0.0, 0.5]),
            ..VariableDomain::open(0.0, 1.0)
        };
        assert!(matches!(
            Solver::default().sample_points("x", &domain),
            Err(SchemaError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn combination_cap_bounds_the_search() {
        let mut e = engine(VariableDomain::closed(0.0, 1.0), "x", "x", Relation::Equal);
        e.constraints.clear();
        for name in ["p", "q", "r", "s", "t"] {
            e.variables
                .insert(name.to_string(), VariableDomain::closed(0.0, 1.0));
        }
        assert!(matches!(
            solve(&e),
            Err(SchemaError::TooManySamples { .. })
        ));
    }

    #[test]
    fn malformed_logic_is_rejected() {
        let mut e = engine(VariableDomain::open(0.0, 1.0), "x", "y", Relation::BGreater);
        assert!(matches!(
            solve(&e),
            Err(SchemaError::UndeclaredVariable { .. })
        ));

        e.expressions.remove(COLUMN_B);
        assert_eq!(
            solve(&e).unwrap_err(),
            SchemaError::MissingExpression(COLUMN_B.into())
        );

        let e = engine(VariableDomain::open(0.0, 1.0), "x", "sqrt(x - 2)", Relation::BGreater);
        assert!(matches!(
            solve(&e),
            Err(SchemaError::InvalidExpression { .. })
        ));
    }
}
