/// Configuration for the learner: process-wide tunables plus the JSON task
/// description (target/background relations and their files).
///
/// A single `FoilConfig` is captured at learner creation and threaded through
/// construction; operators never consult globals in inner loops.
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FoilError, FoilResult};

/// Process-wide tunable knobs with their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct FoilConfig {
    /// Stop when `covered >= positive_threshold * |positives|`
    pub positive_threshold: f64,

    /// Maximum number of rule search iterations
    pub max_iterations: usize,

    /// Minimum precision calculated on bindings for a literal to close a clause
    pub minimum_inflated_precision: f64,

    /// Minimum precision calculated on examples for a learnt clause
    pub minimum_true_precision: f64,

    /// Minimum F score calculated on examples for a learnt clause
    pub minimum_f_score: f64,

    /// Maximum number of body literals in one learnt clause
    pub maximum_clause_length: usize,

    /// Maximum number of random literals in one learnt clause
    pub maximum_random_literals: usize,

    /// Maximum number of failed random literals for a rule search iteration
    pub maximum_random_trials: usize,

    /// Minimum ratio of covered bindings to uncovered examples for a saved tied literal
    pub minimum_coverage_for_tied_literal: f64,

    /// Number of top literals kept by the selector
    pub num_saved_literals: usize,

    /// A literal with an MCC score in (-random_margin, random_margin) is a random candidate
    pub random_margin: f64,

    /// Number of radix bits used for partitioning
    pub num_radix_bits: u32,

    /// Tuples per chunk emitted by the partition assigner
    pub partition_chunk_size: usize,

    /// Probe tuples per chunk in the multi-column hash join
    pub join_chunk_size: usize,

    /// Probe tuples per chunk in the left semi-join
    pub semijoin_chunk_size: usize,

    /// Initial column capacity when loading relation files
    pub initial_block_size: usize,

    /// Soft memory quota in bytes; `None` disables the memory monitor
    pub memory_quota: Option<usize>,
}

impl Default for FoilConfig {
    fn default() -> Self {
        Self {
            positive_threshold: 0.8,
            max_iterations: 1000,
            minimum_inflated_precision: 0.85,
            minimum_true_precision: 0.8,
            minimum_f_score: 0.85,
            maximum_clause_length: 25,
            maximum_random_literals: 2,
            maximum_random_trials: 5,
            minimum_coverage_for_tied_literal: 0.1,
            num_saved_literals: 5,
            random_margin: 0.03,
            num_radix_bits: 5,
            partition_chunk_size: 32768,
            join_chunk_size: 32768,
            semijoin_chunk_size: 32768,
            initial_block_size: 327680,
            memory_quota: None,
        }
    }
}

impl FoilConfig {
    pub fn from_file(path: &Path) -> FoilResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FoilError::config_invalid_with_path(e.to_string(), path.display().to_string())
        })?;
        serde_json::from_str(&content).map_err(|e| {
            FoilError::config_invalid_with_path(e.to_string(), path.display().to_string())
        })
    }
}

/// One attribute of a relation file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttributeConfig {
    /// Domain type id; arguments join only within one domain type
    pub domain_type: i32,

    /// Skipped attributes are present in the file but not loaded
    #[serde(default)]
    pub skip: bool,
}

/// One relation: a name, a `|`-delimited fact file, and its attributes.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationConfig {
    pub name: String,
    pub file: PathBuf,
    pub attributes: Vec<AttributeConfig>,

    /// Key argument position, or -1/absent when the relation has no key
    #[serde(default)]
    pub key: Option<i64>,

    /// Length of the positive prefix; required for the target relation
    #[serde(default)]
    pub num_positive: Option<i64>,
}

impl RelationConfig {
    pub fn key_position(&self) -> Option<usize> {
        match self.key {
            Some(k) if k >= 0 => Some(k as usize),
            _ => None,
        }
    }

    /// Domain types of the attributes that are actually loaded.
    pub fn loaded_argument_types(&self) -> Vec<i32> {
        self.attributes
            .iter()
            .filter(|a| !a.skip)
            .map(|a| a.domain_type)
            .collect()
    }
}

/// Held-out test data for the learned rule set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestConfig {
    pub file: PathBuf,
    pub num_positive: i64,
}

/// The task description: which relation to learn and from what.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TaskConfig {
    pub target: String,
    pub background: Vec<String>,
    pub relations: Vec<RelationConfig>,
    #[serde(default)]
    pub test: Option<TestConfig>,
}

impl TaskConfig {
    pub fn from_file(path: &Path) -> FoilResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            FoilError::config_invalid_with_path(e.to_string(), path.display().to_string())
        })?;
        let task: TaskConfig = serde_json::from_str(&content).map_err(|e| {
            FoilError::config_invalid_with_path(e.to_string(), path.display().to_string())
        })?;
        task.validate()?;
        Ok(task)
    }

    pub fn validate(&self) -> FoilResult<()> {
        let mut seen = std::collections::HashSet::new();
        for relation in &self.relations {
            if !seen.insert(relation.name.as_str()) {
                return Err(FoilError::logic(format!(
                    "duplicate predicate name: {}",
                    relation.name
                )));
            }
            if relation.attributes.is_empty() {
                return Err(FoilError::config_invalid(format!(
                    "relation {} has no attributes",
                    relation.name
                )));
            }
        }
        let target = self
            .relation(&self.target)
            .ok_or_else(|| {
                FoilError::config_invalid(format!("target relation {} not defined", self.target))
            })?;
        match target.num_positive {
            Some(n) if n > 0 => {}
            Some(_) => {
                return Err(FoilError::config_invalid(
                    "num_positive must be a positive number",
                ))
            }
            None => {
                return Err(FoilError::config_invalid(format!(
                    "target relation {} needs num_positive",
                    self.target
                )))
            }
        }
        for name in &self.background {
            if self.relation(name).is_none() {
                return Err(FoilError::config_invalid(format!(
                    "background relation {name} not defined"
                )));
            }
        }
        if let Some(test) = &self.test {
            if test.num_positive <= 0 {
                return Err(FoilError::config_invalid(
                    "test num_positive must be a positive number",
                ));
            }
        }
        Ok(())
    }

    pub fn relation(&self, name: &str) -> Option<&RelationConfig> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn target_relation(&self) -> &RelationConfig {
        // Checked by validate().
        self.relations
            .iter()
            .find(|r| r.name == self.target)
            .unwrap_or(&self.relations[0])
    }
}
