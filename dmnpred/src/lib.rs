//! Probabilistic outcome prediction for decision tables.
//!
//! A decision table is turned into a discrete graphical model: one prior factor per input
//! (learned from historical executions) and one deterministic factor selecting the rule that
//! fires for a full input assignment. Posteriors over the outcome (`$rule`) or any input, given
//! the inputs already known, are computed exactly by variable elimination.

pub mod catalog;
pub mod distribution;
pub mod evidence;
pub mod factor;
pub mod inference;
pub mod model;
pub mod predictor;
pub mod table;

pub use catalog::{IndexCoder, Scope, VarId, Variable, VariableCatalog};
pub use distribution::{
    Distribution, DistributionLearner, LearnedDistributions, ObservationCounts,
    ObservationSource,
};
pub use evidence::Evidence;
pub use factor::{Factor, FactorError};
pub use inference::{EliminationHeuristic, Inferencer};
pub use model::{DistributionSource, Model, ModelBuilder};
pub use predictor::Predictor;
pub use table::{DecisionTable, Entry, Rule};

/// Name of the implicit outcome variable, whose values are the rule identifiers.
pub const RULE_VARIABLE: &str = "$rule";

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PredictionError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("Malformed decision table: {0}.")]
    MalformedDecisionTable(String),
    #[error("The decision table has no rule.")]
    EmptyDecisionTable,
    #[error("Rules {first} and {second} both match the input assignment {assignment:?}.")]
    AmbiguousDecisionTable {
        first: String,
        second: String,
        assignment: Vec<String>,
    },
    #[error("No variable named {0}.")]
    UnknownVariable(String),
    #[error("Value {value} is not in the domain of variable {variable}.")]
    UnknownValue { variable: String, value: String },
    #[error("Value {value} is given twice for variable {variable}.")]
    DuplicateValue { variable: String, value: String },
    #[error("No rule with id {0}.")]
    UnknownRule(String),
    #[error("Smoothing pseudo-count must be finite and positive, got {0}.")]
    InvalidSmoothing(f64),
    #[error("The evidence has probability zero, the posterior is undefined.")]
    UndefinedPosterior,
    #[error("Too many joint assignments of the {variables} model variables (limit: {limit}).")]
    TooManyAssignments { variables: usize, limit: usize },
    #[error("Invalid model: {0}.")]
    InvalidModel(String),
    #[error(transparent)]
    Factor(#[from] FactorError),
}

#[derive(Clone, Debug)]
pub struct Config {
    /// Heuristic choosing the order in which variables are summed out.
    pub heuristic: EliminationHeuristic,
    /// Fail model construction when two rules match the same full input assignment, instead of
    /// letting the first rule (in table order) win.
    pub strict_hit_policy: bool,
    /// Largest number of entries of the selection table (one per joint assignment of the inputs
    /// and `$rule`).
    pub max_table_size: usize,
}

impl Config {
    pub fn strict() -> Self {
        Self {
            strict_hit_policy: true,
            ..Self::default()
        }
    }
    pub fn with_heuristic(self, heuristic: EliminationHeuristic) -> Self {
        Self { heuristic, ..self }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            heuristic: EliminationHeuristic::MinFill,
            strict_hit_policy: false,
            max_table_size: 1 << 26,
        }
    }
}
