//! TOML template libraries and the immutable template registry.
//!
//! A library file has a `[library]` header and any number of `[[templates]]`.
//! Text may contain `{name}` placeholders for integer variables declared under
//! `[templates.vars.<name>]`; the generator substitutes them everywhere,
//! including logic-engine expressions.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{
    BilingualText, CognitiveLoad, CognitiveTrap, LogicEngine, RenderingConfig, CHOICE_COUNT,
};

// ---------------------------------------------------------------------------
// Parsed model
// ---------------------------------------------------------------------------

/// Inclusive integer range a placeholder is drawn from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceholderRange {
    pub min: i64,
    pub max: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateChoice {
    pub letter: String,
    pub text: BilingualText,
    pub correct: bool,
    pub trap: Option<CognitiveTrap>,
    pub rationale: Option<String>,
    /// The distractor applies a real rule in the wrong place.
    pub valid_rule: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    pub id: String,
    pub category: String,
    pub section: String,
    pub subsection: String,
    pub cognitive_load: Option<CognitiveLoad>,
    pub min_difficulty: u8,
    pub max_difficulty: u8,
    pub text: BilingualText,
    pub explanation: BilingualText,
    pub rendering: RenderingConfig,
    pub choices: Vec<TemplateChoice>,
    pub logic: Option<LogicEngine>,
    pub vars: BTreeMap<String, PlaceholderRange>,
}

impl Template {
    pub fn covers(&self, difficulty: u8) -> bool {
        (self.min_difficulty..=self.max_difficulty).contains(&difficulty)
    }

    pub fn clamp_difficulty(&self, difficulty: u8) -> u8 {
        difficulty.clamp(self.min_difficulty, self.max_difficulty)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemplateLibrary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub templates: Vec<Template>,
}

// ---------------------------------------------------------------------------
// TOML structure
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct TomlLibraryFile {
    library: TomlLibraryHeader,
    #[serde(default)]
    templates: Vec<TomlTemplate>,
}

#[derive(Debug, Deserialize)]
struct TomlLibraryHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlTemplate {
    id: String,
    category: String,
    #[serde(default)]
    section: Option<String>,
    subsection: String,
    #[serde(default)]
    cognitive_load: Option<String>,
    #[serde(default = "default_min_difficulty")]
    min_difficulty: u8,
    #[serde(default = "default_max_difficulty")]
    max_difficulty: u8,
    text: BilingualText,
    explanation: BilingualText,
    #[serde(default)]
    rendering: Option<RenderingConfig>,
    #[serde(default)]
    choices: Vec<TomlChoice>,
    #[serde(default)]
    logic: Option<LogicEngine>,
    #[serde(default)]
    vars: BTreeMap<String, PlaceholderRange>,
}

fn default_min_difficulty() -> u8 {
    1
}

fn default_max_difficulty() -> u8 {
    5
}

#[derive(Debug, Deserialize)]
struct TomlChoice {
    letter: String,
    ru: String,
    ky: String,
    #[serde(default)]
    correct: bool,
    #[serde(default)]
    trap: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    #[serde(default)]
    valid_rule: bool,
}

/// Parse a single TOML template library file.
pub fn parse_library(path: &Path) -> Result<TemplateLibrary> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read template library: {}", path.display()))?;

    parse_library_str(&content, path)
}

/// Parse a TOML string into a `TemplateLibrary`.
pub fn parse_library_str(content: &str, source_path: &Path) -> Result<TemplateLibrary> {
    let parsed: TomlLibraryFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let templates = parsed
        .templates
        .into_iter()
        .map(|t| {
            let cognitive_load = t
                .cognitive_load
                .map(|l| l.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
                .transpose()
                .with_context(|| format!("template `{}`", t.id))?;

            if t.min_difficulty < 1 || t.max_difficulty > 5 || t.min_difficulty > t.max_difficulty
            {
                anyhow::bail!(
                    "template `{}`: difficulty range {}..={} is not within 1..=5",
                    t.id,
                    t.min_difficulty,
                    t.max_difficulty
                );
            }

            let choices = t
                .choices
                .into_iter()
                .map(|c| {
                    let trap = c
                        .trap
                        .map(|s| s.parse().map_err(|e: String| anyhow::anyhow!("{}", e)))
                        .transpose()?;
                    Ok(TemplateChoice {
                        letter: c.letter,
                        text: BilingualText::new(c.ru, c.ky),
                        correct: c.correct,
                        trap,
                        rationale: c.rationale,
                        valid_rule: c.valid_rule,
                    })
                })
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("template `{}`", t.id))?;

            Ok(Template {
                section: t.section.unwrap_or_else(|| t.category.clone()),
                id: t.id,
                category: t.category,
                subsection: t.subsection,
                cognitive_load,
                min_difficulty: t.min_difficulty,
                max_difficulty: t.max_difficulty,
                text: t.text,
                explanation: t.explanation,
                rendering: t.rendering.unwrap_or_default(),
                choices,
                logic: t.logic,
                vars: t.vars,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(TemplateLibrary {
        id: parsed.library.id,
        name: parsed.library.name,
        description: parsed.library.description,
        templates,
    })
}

/// Recursively load all `.toml` libraries under a directory. Files that fail
/// to parse are skipped with a warning.
pub fn load_library_directory(dir: &Path) -> Result<Vec<TemplateLibrary>> {
    let mut libraries = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut entries = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|e| e.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    entries.sort();

    for path in entries {
        if path.is_dir() {
            libraries.extend(load_library_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_library(&path) {
                Ok(library) => libraries.push(library),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(libraries)
}

/// Load a single library file or every library under a directory.
pub fn load_libraries(path: &Path) -> Result<Vec<TemplateLibrary>> {
    if path.is_dir() {
        load_library_directory(path)
    } else {
        Ok(vec![parse_library(path)?])
    }
}

// ---------------------------------------------------------------------------
// Lint
// ---------------------------------------------------------------------------

/// A problem found in a template library before any generation happens.
#[derive(Debug, Clone)]
pub struct TemplateWarning {
    pub template_id: Option<String>,
    pub message: String,
}

/// Check a library for issues that would make every generated item fail.
pub fn lint_library(library: &TemplateLibrary) -> Vec<TemplateWarning> {
    let mut warnings = Vec::new();
    let mut seen_ids = BTreeSet::new();

    for t in &library.templates {
        let warn = |message: String| TemplateWarning {
            template_id: Some(t.id.clone()),
            message,
        };

        if !seen_ids.insert(&t.id) {
            warnings.push(warn(format!("duplicate template ID: {}", t.id)));
        }
        if t.choices.len() != CHOICE_COUNT {
            warnings.push(warn(format!(
                "{} choices, expected {CHOICE_COUNT}",
                t.choices.len()
            )));
        }
        let correct = t.choices.iter().filter(|c| c.correct).count();
        if correct != 1 {
            warnings.push(warn(format!("{correct} choices marked correct")));
        }
        for (name, range) in &t.vars {
            if range.min > range.max {
                warnings.push(warn(format!(
                    "placeholder `{name}` has min {} > max {}",
                    range.min, range.max
                )));
            }
        }
    }

    warnings
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Read-only template lookup shared by all generation workers.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: Vec<Template>,
    by_category: BTreeMap<String, Vec<usize>>,
}

impl TemplateRegistry {
    /// Build a registry. A template whose id was already registered is
    /// dropped with a warning.
    pub fn new(templates: impl IntoIterator<Item = Template>) -> Self {
        let mut registry = Self::default();
        let mut ids = BTreeSet::new();
        for template in templates {
            if !ids.insert(template.id.clone()) {
                tracing::warn!("ignoring duplicate template `{}`", template.id);
                continue;
            }
            registry
                .by_category
                .entry(template.category.clone())
                .or_default()
                .push(registry.templates.len());
            registry.templates.push(template);
        }
        registry
    }

    pub fn from_libraries(libraries: Vec<TemplateLibrary>) -> Self {
        Self::new(libraries.into_iter().flat_map(|l| l.templates))
    }

    /// Templates for a category, in registration order.
    pub fn for_category(&self, category: &str) -> Vec<&Template> {
        self.by_category
            .get(category)
            .map(|idx| idx.iter().map(|&i| &self.templates[i]).collect())
            .unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<&Template> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.by_category.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Template> {
        self.templates.iter()
    }
}

/// Small library shared by unit tests across the crate.
#[cfg(test)]
pub(crate) const TEST_LIBRARY: &str = r#"
[library]
id = "test-lib"
name = "Test library"

[[templates]]
id = "cmp-scale"
category = "math"
subsection = "comparison"
cognitive_load = "strategic"
min_difficulty = 2
max_difficulty = 4
text = { ru = "Сравните {k}x и x при 0 < x < 1.", ky = "0 < x < 1 болгондо {k}x жана x салыштыргыла." }
explanation = { ru = "{k}x больше x для положительных x.", ky = "Оң x үчүн {k}x x тен чоң." }

[templates.vars.k]
min = 2
max = 9

[templates.rendering]
layout = "comparison_table"
requiresSymbolicNotation = true
columns = { A = { symbolic = "{k}*x" }, B = { symbolic = "x" } }
condition = { symbolic = "0 < x < 1" }

[templates.logic]
constraints = ["x > 0 && x < 1"]
relation = "a_greater"
expressions = { column_a = "{k}*x", column_b = "x" }
variables = { x = { min = 0.0, max = 1.0 } }

[[templates.choices]]
letter = "A"
ru = "A больше"
ky = "A чоң"
correct = true

[[templates.choices]]
letter = "B"
ru = "B больше"
ky = "B чоң"
trap = "sign_error"
rationale = "Считает, что умножение всегда уменьшает дробь."

[[templates.choices]]
letter = "C"
ru = "Равны"
ky = "Барабар"
trap = "false_equivalence"

[[templates.choices]]
letter = "D"
ru = "Нельзя определить"
ky = "Аныктоого болбойт"
trap = "boundary_confusion"
valid_rule = true
"#;
