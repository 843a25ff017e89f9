//! Configuration loading.
//!
//! One `OrtConfig` is built at startup and handed to every component; nothing
//! reads configuration from global state afterwards.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::distractor::DistractorConfig;
use crate::planner::PlannerConfig;
use crate::solver::SolverConfig;
use crate::validator::{Validator, ValidatorConfig};

pub const CONFIG_FILE_NAME: &str = "ortforge.toml";

/// Top-level ortforge configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrtConfig {
    /// Batch seed for template selection and placeholder values.
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Worker threads for batch validation and generation.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Output directory for generated items and reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub distractor: DistractorConfig,
    #[serde(default)]
    pub solver: SolverConfig,
    #[serde(default)]
    pub planner: PlannerConfig,
}

fn default_seed() -> u64 {
    42
}
fn default_parallelism() -> usize {
    4
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./ortforge-output")
}

impl Default for OrtConfig {
    fn default() -> Self {
        Self {
            seed: default_seed(),
            parallelism: default_parallelism(),
            output_dir: default_output_dir(),
            validator: ValidatorConfig::default(),
            distractor: DistractorConfig::default(),
            solver: SolverConfig::default(),
            planner: PlannerConfig::default(),
        }
    }
}

impl OrtConfig {
    /// A validator wired with this configuration.
    pub fn validator(&self) -> Validator {
        Validator::new(
            self.validator.clone(),
            self.distractor.clone(),
            self.solver.clone(),
        )
    }

    /// The configuration as a TOML document, for `init`.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to serialize config")
    }

    /// Apply `ORTFORGE_SEED` and `ORTFORGE_PARALLELISM` from `lookup`.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(seed) = lookup("ORTFORGE_SEED") {
            self.seed = seed
                .trim()
                .parse()
                .with_context(|| format!("ORTFORGE_SEED is not an integer: {seed}"))?;
        }
        if let Some(n) = lookup("ORTFORGE_PARALLELISM") {
            self.parallelism = n
                .trim()
                .parse()
                .with_context(|| format!("ORTFORGE_PARALLELISM is not an integer: {n}"))?;
        }
        Ok(())
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `ortforge.toml` in the current directory
/// 2. `~/.config/ortforge/config.toml`
///
/// Environment variable overrides: `ORTFORGE_SEED`, `ORTFORGE_PARALLELISM`.
pub fn load_config() -> Result<OrtConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<OrtConfig> {
    let config_path = if let Some(p) = path {
        if p.exists() {
            Some(p.to_path_buf())
        } else {
            anyhow::bail!("config file not found: {}", p.display());
        }
    } else {
        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            Some(local)
        } else {
            dirs_path()
                .map(|home| home.join("config.toml"))
                .filter(|global| global.exists())
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = toml::from_str::<OrtConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!("loaded config from {}", path.display());
            config
        }
        None => OrtConfig::default(),
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    if config.parallelism == 0 {
        anyhow::bail!("parallelism must be at least 1");
    }

    Ok(config)
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("ortforge"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = OrtConfig::default();
        assert_eq!(config.seed, 42);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.validator.parity_tolerance, 0.30);
        assert_eq!(config.distractor.min_description_chars, 50);
        assert_eq!(config.solver.max_combinations, 4096);
        assert_eq!(config.planner.difficulty_ratios.len(), 5);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let toml_str = r#"
seed = 7

[distractor]
plausibility_floor = 0.75

[planner.category_ratios]
math = 0.6
reading = 0.4
"#;
        let config: OrtConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.parallelism, 4);
        assert_eq!(config.distractor.plausibility_floor, 0.75);
        assert_eq!(config.distractor.min_description_chars, 50);
        assert_eq!(config.planner.category_ratios.len(), 2);
        assert_eq!(config.planner.difficulty_ratios.len(), 5);
    }

    #[test]
    fn env_overrides() {
        let mut config = OrtConfig::default();
        config
            .apply_env_overrides(|key| match key {
                "ORTFORGE_SEED" => Some("1234".into()),
                "ORTFORGE_PARALLELISM" => Some(" 8 ".into()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.seed, 1234);
        assert_eq!(config.parallelism, 8);

        let err = config
            .apply_env_overrides(|key| (key == "ORTFORGE_SEED").then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("ORTFORGE_SEED"));
    }

    #[test]
    fn toml_roundtrip() {
        let config = OrtConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: OrtConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = load_config_from(Some(Path::new("/nonexistent/ortforge.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn explicit_path_is_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "parallelism = 2\n[solver]\nmax_integer_points = 5\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.solver.max_integer_points, 5);
        assert_eq!(config.solver.tolerance, 1e-9);
    }
}
