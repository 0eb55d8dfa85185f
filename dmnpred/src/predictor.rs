use crate::distribution::Distribution;
use crate::evidence::Evidence;
use crate::inference::Inferencer;
use crate::model::Model;
use crate::{Config, Result, RULE_VARIABLE};
use rayon::prelude::*;
use std::sync::Arc;

/// Posterior queries on a built model.
///
/// The model is shared read-only, so a predictor can be cloned cheaply and queried from several
/// threads at once.
#[derive(Debug, Clone)]
pub struct Predictor {
    model: Arc<Model>,
    inferencer: Inferencer,
}

impl Predictor {
    pub fn new(model: Arc<Model>, config: &Config) -> Self {
        Self {
            model,
            inferencer: Inferencer::new(config.heuristic),
        }
    }
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Distribution of `variable` given the evidence. Names and values of the evidence are
    /// checked against the catalog before any inference work.
    pub fn posterior(&self, variable: &str, evidence: &Evidence) -> Result<Distribution> {
        let catalog = self.model.catalog();
        let var = catalog.var_id(variable)?;
        let evidence = evidence.resolve(catalog)?;
        let probabilities = self.inferencer.posterior(&self.model, var, &evidence)?;
        Distribution::from_domain(
            variable,
            catalog.variable(var)?.values().to_vec(),
            probabilities,
        )
    }

    /// Distribution of the rule that will fire.
    pub fn outcome(&self, evidence: &Evidence) -> Result<Distribution> {
        self.posterior(RULE_VARIABLE, evidence)
    }

    /// Posteriors of several variables under the same evidence, computed in parallel.
    pub fn posteriors(&self, variables: &[&str], evidence: &Evidence) -> Result<Vec<Distribution>> {
        variables
            .par_iter()
            .map(|variable| self.posterior(variable, evidence))
            .collect()
    }

    /// Pr(assignment | evidence), where `assignment` fixes the value of some variables.
    pub fn joint_probability(&self, assignment: &Evidence, evidence: &Evidence) -> Result<f64> {
        let catalog = self.model.catalog();
        let assignment = assignment.resolve(catalog)?;
        let evidence = evidence.resolve(catalog)?;
        let (vars, values): (Vec<_>, Vec<_>) = assignment.into_iter().unzip();
        let joint = self.inferencer.joint_posterior(&self.model, &vars, &evidence)?;
        Ok(joint.value(&values)?)
    }

    /// Probability of observing the evidence.
    pub fn evidence_probability(&self, evidence: &Evidence) -> Result<f64> {
        let evidence = evidence.resolve(self.model.catalog())?;
        self.inferencer.evidence_probability(&self.model, &evidence)
    }
}

impl From<Model> for Predictor {
    fn from(model: Model) -> Self {
        Self::new(Arc::new(model), &Config::default())
    }
}
