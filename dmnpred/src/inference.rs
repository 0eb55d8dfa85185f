//! Exact inference by variable elimination.
//!
//! Evidence is applied by restricting the factors, then every variable that is neither queried
//! nor observed is summed out, one at a time, in an order chosen by a greedy heuristic on the
//! interaction graph (two variables interact when they appear in the scope of a common factor).
//! The remaining factors, over the query variables only, are multiplied and normalized.

use crate::catalog::VarId;
use crate::factor::{Factor, FactorError};
use crate::model::Model;
use crate::{PredictionError, Result};
use itertools::Itertools;
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Greedy criterion for the next variable to eliminate. Ties are broken by variable name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EliminationHeuristic {
    /// Fewest interactions added between the neighbours of the variable.
    #[default]
    MinFill,
    /// Fewest neighbours.
    MinNeighbors,
    /// Smallest factor created (product of the cardinalities of the neighbours).
    MinWeight,
}

/// Interaction graph of a set of factors.
struct InteractionGraph {
    adjacency: BTreeMap<VarId, BTreeSet<VarId>>,
}

impl InteractionGraph {
    fn new(factors: &[Factor]) -> Self {
        let mut adjacency: BTreeMap<VarId, BTreeSet<VarId>> = BTreeMap::new();
        for factor in factors {
            let vars = factor.scope().vars();
            for v in vars {
                adjacency
                    .entry(*v)
                    .or_default()
                    .extend(vars.iter().filter(|w| *w != v));
            }
        }
        Self { adjacency }
    }
    fn contains(&self, var: VarId) -> bool {
        self.adjacency.contains_key(&var)
    }
    fn neighbors(&self, var: VarId) -> &BTreeSet<VarId> {
        &self.adjacency[&var]
    }
    fn fill_in(&self, var: VarId) -> usize {
        self.neighbors(var)
            .iter()
            .tuple_combinations()
            .filter(|(a, b)| !self.adjacency[*a].contains(*b))
            .count()
    }
    /// Connect the neighbours of `var` pairwise, then drop `var`.
    fn eliminate(&mut self, var: VarId) {
        let neighbors = self.adjacency.remove(&var).unwrap_or_default();
        for n in neighbors.iter() {
            if let Some(adj) = self.adjacency.get_mut(n) {
                adj.remove(&var);
                adj.extend(neighbors.iter().filter(|w| *w != n));
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Inferencer {
    heuristic: EliminationHeuristic,
}

impl Inferencer {
    pub fn new(heuristic: EliminationHeuristic) -> Self {
        Self { heuristic }
    }
    pub fn heuristic(&self) -> EliminationHeuristic {
        self.heuristic
    }

    /// Order in which `to_eliminate` would be summed out of `factors`. Variables that appear in
    /// no factor are left out.
    pub fn elimination_order(
        &self,
        model: &Model,
        factors: &[Factor],
        to_eliminate: &[VarId],
    ) -> Vec<VarId> {
        let catalog = model.catalog();
        let mut graph = InteractionGraph::new(factors);
        let mut candidates: BTreeSet<VarId> = to_eliminate
            .iter()
            .copied()
            .filter(|v| graph.contains(*v))
            .collect();
        let mut order = Vec::with_capacity(candidates.len());
        loop {
            let Some(var) = candidates
                .iter()
                .copied()
                .min_by_key(|v| (self.cost(&graph, model, *v), catalog.name(*v)))
            else {
                break;
            };
            graph.eliminate(var);
            candidates.remove(&var);
            order.push(var);
        }
        order
    }

    fn cost(&self, graph: &InteractionGraph, model: &Model, var: VarId) -> usize {
        match self.heuristic {
            EliminationHeuristic::MinFill => graph.fill_in(var),
            EliminationHeuristic::MinNeighbors => graph.neighbors(var).len(),
            EliminationHeuristic::MinWeight => graph
                .neighbors(var)
                .iter()
                .map(|n| model.scope().cardinality(*n).unwrap_or(1))
                .fold(1usize, usize::saturating_mul),
        }
    }

    /// Factors of the model with the evidence applied.
    fn reduce(model: &Model, evidence: &[(VarId, usize)]) -> Result<Vec<Factor>> {
        model
            .factors()
            .iter()
            .map(|factor| {
                evidence
                    .iter()
                    .filter(|(var, _)| factor.scope().contains(*var))
                    .try_fold(factor.clone(), |f, (var, value)| f.restrict(*var, *value))
                    .map_err(PredictionError::from)
            })
            .collect()
    }

    fn check_evidence(model: &Model, evidence: &[(VarId, usize)]) -> Result<()> {
        let catalog = model.catalog();
        for (var, value) in evidence {
            let cardinality = catalog.variable(*var)?.cardinality();
            if *value >= cardinality {
                return Err(FactorError::ValueOutOfRange {
                    value: *value,
                    cardinality,
                }
                .into());
            }
        }
        if let Some(var) = evidence.iter().map(|(var, _)| var).duplicates().next() {
            return Err(FactorError::DuplicateVariable(*var).into());
        }
        Ok(())
    }

    /// Unnormalized joint weight of the assignments of `keep` consistent with the evidence: all
    /// the other variables are summed out. `keep` must not contain evidence variables.
    fn eliminate_all_but(
        &self,
        model: &Model,
        keep: &[VarId],
        evidence: &[(VarId, usize)],
    ) -> Result<Factor> {
        let mut factors = Self::reduce(model, evidence)?;
        let to_eliminate: Vec<VarId> = (0..model.catalog().len())
            .filter(|v| !keep.contains(v) && !evidence.iter().any(|(e, _)| e == v))
            .collect();
        let order = self.elimination_order(model, &factors, &to_eliminate);
        tracing::debug!(
            order = ?order.iter().map(|v| model.catalog().name(*v)).collect::<Vec<_>>(),
            "Elimination order"
        );
        for var in order {
            let (mentioning, rest): (Vec<Factor>, Vec<Factor>) = factors
                .into_iter()
                .partition(|f| f.scope().contains(var));
            let summed = Factor::product(mentioning.iter())?.sum_out(var)?;
            tracing::trace!(
                variable = model.catalog().name(var),
                factors = mentioning.len(),
                result_size = summed.scope().size(),
                "Eliminated variable"
            );
            factors = rest;
            factors.push(summed);
        }
        let mut res = Factor::product(factors.iter())?;
        // Kept variables that no factor mentions are unconstrained.
        for var in keep {
            if !res.scope().contains(*var) {
                res = res.multiply(&Factor::ones(model.catalog().scope([*var])?))?;
            }
        }
        Ok(res)
    }

    /// Normalized joint posterior of the `query` variables given the evidence.
    ///
    /// Query variables fixed by the evidence get a point mass. Fails with
    /// `UndefinedPosterior` when the evidence has probability zero.
    pub fn joint_posterior(
        &self,
        model: &Model,
        query: &[VarId],
        evidence: &[(VarId, usize)],
    ) -> Result<Factor> {
        Self::check_evidence(model, evidence)?;
        if let Some(var) = query.iter().find(|v| **v >= model.catalog().len()) {
            return Err(FactorError::NotInScope(*var).into());
        }
        let query_scope = model.catalog().scope(query.iter().copied())?;
        let (pinned, keep): (Vec<VarId>, Vec<VarId>) = query_scope
            .vars()
            .iter()
            .copied()
            .partition(|v| evidence.iter().any(|(e, _)| e == v));
        let joint = self.eliminate_all_but(model, &keep, evidence)?;
        let mut res = joint.normalized().map_err(|e| match e {
            FactorError::ZeroMass => PredictionError::UndefinedPosterior,
            e => e.into(),
        })?;
        for var in pinned {
            let value = evidence
                .iter()
                .find_map(|(e, value)| (*e == var).then_some(*value))
                .unwrap_or_default();
            let scope = model.catalog().scope([var])?;
            let mut point = vec![0.0; scope.size()];
            point[value] = 1.0;
            res = res.multiply(&Factor::new(scope, point)?)?;
        }
        Ok(res)
    }

    /// Pr(query = v | evidence) for every value v, in canonical order.
    pub fn posterior(
        &self,
        model: &Model,
        query: VarId,
        evidence: &[(VarId, usize)],
    ) -> Result<Array1<f64>> {
        Ok(Array1::from(
            self.joint_posterior(model, &[query], evidence)?.values(),
        ))
    }

    /// Probability of the evidence under the (normalized) model.
    pub fn evidence_probability(&self, model: &Model, evidence: &[(VarId, usize)]) -> Result<f64> {
        Self::check_evidence(model, evidence)?;
        let total = self.eliminate_all_but(model, &[], &[])?.total();
        if !(total > 0.0) {
            return Err(PredictionError::UndefinedPosterior);
        }
        Ok(self.eliminate_all_but(model, &[], evidence)?.total() / total)
    }
}
