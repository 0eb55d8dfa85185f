//! Discrete distributions over a variable's domain, and their estimation from historical
//! observations.

use crate::factor::FactorError;
use crate::model::DistributionSource;
use crate::table::DecisionTable;
use crate::{PredictionError, Result};
use indexmap::IndexMap;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

type NamedList<T> = IndexMap<String, T>;

/// Probability of every value of one variable. Values are kept in canonical (sorted) order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    variable: String,
    values: Vec<String>,
    probabilities: Array1<f64>,
}

impl Distribution {
    /// Distribution given by (value, probability) pairs, e.g. supplied by an external source.
    pub fn from_pairs<V: Into<String>>(
        variable: impl Into<String>,
        pairs: impl IntoIterator<Item = (V, f64)>,
    ) -> Result<Self> {
        let mut pairs: Vec<(String, f64)> = pairs.into_iter().map(|(v, p)| (v.into(), p)).collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));
        let variable = variable.into();
        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(PredictionError::DuplicateValue {
                variable,
                value: w[0].0.clone(),
            });
        }
        let (values, probabilities): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        Self::from_domain(variable, values, Array1::from(probabilities))
    }

    /// `values` must be sorted and deduplicated (as the domains of a catalog are).
    pub(crate) fn from_domain(
        variable: impl Into<String>,
        values: Vec<String>,
        probabilities: Array1<f64>,
    ) -> Result<Self> {
        if values.len() != probabilities.len() {
            return Err(FactorError::TableSize {
                expected: values.len(),
                got: probabilities.len(),
            }
            .into());
        }
        if let Some(p) = probabilities.iter().find(|p| !(**p >= 0.0)) {
            return Err(FactorError::NegativeWeight(*p).into());
        }
        Ok(Self {
            variable: variable.into(),
            values,
            probabilities,
        })
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }
    pub fn values(&self) -> &[String] {
        &self.values
    }
    pub fn probabilities(&self) -> ArrayView1<'_, f64> {
        self.probabilities.view()
    }
    pub fn len(&self) -> usize {
        self.values.len()
    }
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
    pub fn probability(&self, value: &str) -> Result<f64> {
        self.values
            .binary_search_by(|v| v.as_str().cmp(value))
            .map(|i| self.probabilities[i])
            .map_err(|_| PredictionError::UnknownValue {
                variable: self.variable.clone(),
                value: value.to_owned(),
            })
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values
            .iter()
            .map(String::as_str)
            .zip(self.probabilities.iter().copied())
    }
    /// Most probable value, the first one in canonical order in case of ties.
    pub fn most_likely(&self) -> Option<(&str, f64)> {
        self.iter()
            .fold(None, |best: Option<(&str, f64)>, (v, p)| match best {
                Some((_, bp)) if bp >= p => best,
                _ => Some((v, p)),
            })
    }
}

/// Historical (value, occurrence count) pairs of the input variables.
pub trait ObservationSource {
    /// Observations of `variable`; an empty list when there is no history for it.
    fn observations(&self, variable: &str) -> Result<Vec<(String, u64)>>;
}

/// In-memory occurrence counts per variable and value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservationCounts {
    counts: NamedList<IndexMap<String, u64>>,
}

impl ObservationCounts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, variable: &str, value: &str, count: u64) {
        *self
            .counts
            .entry(variable.to_owned())
            .or_default()
            .entry(value.to_owned())
            .or_default() += count;
    }

    /// Counts derived from historical executions, each given by the id of the rule it matched.
    ///
    /// Every literal entry of the matched rule counts one occurrence of that value for its
    /// column. Wildcard entries say nothing about the actual input value and are skipped.
    pub fn from_matched_rules<S: AsRef<str>>(
        table: &DecisionTable,
        matched_rules: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let mut res = Self::new();
        for rule_id in matched_rules {
            let rule = table.rule(rule_id.as_ref())?;
            for (input, entry) in table.inputs.iter().zip(rule.entries.iter()) {
                if let Some(value) = entry.as_literal() {
                    res.record(input, value, 1);
                }
            }
        }
        Ok(res)
    }

    pub fn count(&self, variable: &str, value: &str) -> u64 {
        self.counts
            .get(variable)
            .and_then(|c| c.get(value))
            .copied()
            .unwrap_or(0)
    }
}

impl ObservationSource for ObservationCounts {
    fn observations(&self, variable: &str) -> Result<Vec<(String, u64)>> {
        Ok(self
            .counts
            .get(variable)
            .map(|c| c.iter().map(|(v, n)| (v.clone(), *n)).collect())
            .unwrap_or_default())
    }
}

/// Smoothed maximum-likelihood estimation of a marginal distribution.
///
/// P(v) = (count[v] + alpha) / sum_v' (count[v'] + alpha), so that values never observed still
/// get a non-zero probability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistributionLearner {
    alpha: f64,
}

impl Default for DistributionLearner {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

impl DistributionLearner {
    pub fn new(alpha: f64) -> Result<Self> {
        if !(alpha > 0.0 && alpha.is_finite()) {
            return Err(PredictionError::InvalidSmoothing(alpha));
        }
        Ok(Self { alpha })
    }
    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// `domain` must be in canonical order. Observations of values outside the domain are
    /// ignored.
    pub fn learn<S: AsRef<str>>(
        &self,
        variable: &str,
        domain: &[String],
        observations: impl IntoIterator<Item = (S, u64)>,
    ) -> Result<Distribution> {
        let mut counts = Array1::<f64>::zeros(domain.len());
        for (value, n) in observations {
            let value = value.as_ref();
            match domain.binary_search_by(|v| v.as_str().cmp(value)) {
                Ok(i) => counts[i] += n as f64,
                Err(_) => {
                    tracing::debug!(variable, value, count = n, "Ignoring observation outside of domain");
                }
            }
        }
        counts.mapv_inplace(|c| c + self.alpha);
        let norm_f = 1.0 / counts.sum();
        counts.mapv_inplace(|c| c * norm_f);
        Distribution::from_domain(variable, domain.to_vec(), counts)
    }
}

/// Distributions learned on demand from an [`ObservationSource`].
#[derive(Debug, Clone)]
pub struct LearnedDistributions<O> {
    observations: O,
    learner: DistributionLearner,
}

impl<O: ObservationSource> LearnedDistributions<O> {
    pub fn new(observations: O, learner: DistributionLearner) -> Self {
        Self {
            observations,
            learner,
        }
    }
}

impl<O: ObservationSource> DistributionSource for LearnedDistributions<O> {
    fn distribution(&self, variable: &str, domain: &[String]) -> Result<Distribution> {
        let observations = self.observations.observations(variable)?;
        self.learner.learn(variable, domain, observations)
    }
}
