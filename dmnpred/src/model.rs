//! Construction of the graphical model of a decision table.
//!
//! The model has one variable per input column and the outcome variable `$rule`. Its joint
//! distribution is the (unnormalized) product of
//! - one prior factor P(input) per input, learned from history, and
//! - one deterministic selection factor over (all inputs, `$rule`), which is 1 when `$rule` is
//!   the rule matching the input assignment and 0 otherwise.

use crate::catalog::{Scope, VarId, Variable, VariableCatalog};
use crate::distribution::Distribution;
use crate::factor::{Factor, FactorError};
use crate::table::{DecisionTable, Entry};
use crate::{Config, PredictionError, Result, RULE_VARIABLE};
use itertools::Itertools;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supplier of the marginal distribution of each input variable.
pub trait DistributionSource {
    /// Distribution of `variable`, whose canonical domain is `domain`. Values of `domain` the
    /// returned distribution does not know are given probability zero.
    fn distribution(&self, variable: &str, domain: &[String]) -> Result<Distribution>;
}

impl DistributionSource for HashMap<String, Distribution> {
    fn distribution(&self, variable: &str, _domain: &[String]) -> Result<Distribution> {
        self.get(variable)
            .cloned()
            .ok_or_else(|| PredictionError::UnknownVariable(variable.to_owned()))
    }
}

/// Unnormalized joint distribution, as a product of factors over the variables of a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ModelRepr")]
pub struct Model {
    catalog: VariableCatalog,
    scope: Scope,
    factors: Vec<Factor>,
}

#[derive(Deserialize)]
struct ModelRepr {
    catalog: VariableCatalog,
    scope: Scope,
    factors: Vec<Factor>,
}

impl TryFrom<ModelRepr> for Model {
    type Error = PredictionError;
    fn try_from(repr: ModelRepr) -> Result<Self> {
        let model = Model::new(repr.catalog, repr.factors)?;
        if model.scope != repr.scope {
            return Err(PredictionError::InvalidModel(
                "scope does not match the catalog".to_owned(),
            ));
        }
        Ok(model)
    }
}

impl Model {
    pub fn new(catalog: VariableCatalog, factors: Vec<Factor>) -> Result<Self> {
        for factor in factors.iter() {
            for (var, card) in factor
                .scope()
                .vars()
                .iter()
                .zip(factor.scope().cardinalities())
            {
                let expected = catalog.variable(*var)?.cardinality();
                if expected != *card {
                    return Err(FactorError::CardinalityMismatch {
                        var: *var,
                        left: expected,
                        right: *card,
                    }
                    .into());
                }
            }
        }
        Ok(Self {
            scope: catalog.full_scope()?,
            catalog,
            factors,
        })
    }
    pub fn catalog(&self) -> &VariableCatalog {
        &self.catalog
    }
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
    pub fn factors(&self) -> &[Factor] {
        &self.factors
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    config: Config,
}

impl ModelBuilder {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Build the model of `table`, with input priors taken from `source`.
    ///
    /// Domains are the sorted distinct literals of each column, and the sorted rule ids for
    /// `$rule`. Inputs enter the catalog in sorted label order, `$rule` comes last.
    pub fn build<S>(&self, table: &DecisionTable, source: &S) -> Result<Model>
    where
        S: DistributionSource + Sync,
    {
        table.validate()?;
        let columns: Vec<usize> = (0..table.inputs.len())
            .sorted_by(|a, b| table.inputs[*a].cmp(&table.inputs[*b]))
            .collect();
        let catalog = VariableCatalog::new(
            columns
                .iter()
                .map(|c| (table.inputs[*c].clone(), Variable::new(table.literals(*c))))
                .chain(std::iter::once((
                    RULE_VARIABLE.to_owned(),
                    Variable::new(table.rules.iter().map(|r| r.id.as_str())),
                ))),
        )?;
        let limit = self.config.max_table_size;
        catalog
            .iter()
            .try_fold(1usize, |size, (_, _, var)| size.checked_mul(var.cardinality()))
            .filter(|size| *size <= limit)
            .ok_or(PredictionError::TooManyAssignments {
                variables: catalog.len(),
                limit,
            })?;
        let priors = (0..columns.len())
            .into_par_iter()
            .map(|var| prior_factor(&catalog, var, source))
            .collect::<Result<Vec<_>>>()?;
        let selection = self.selection_factor(&catalog, table, &columns)?;
        tracing::debug!(
            inputs = columns.len(),
            rules = table.rules.len(),
            selection_size = selection.scope().size(),
            "Built decision table model"
        );
        let mut factors = priors;
        factors.push(selection);
        Model::new(catalog, factors)
    }

    /// Deterministic factor over (all inputs, `$rule`). `columns[var]` is the table column of
    /// input variable `var`.
    fn selection_factor(
        &self,
        catalog: &VariableCatalog,
        table: &DecisionTable,
        columns: &[usize],
    ) -> Result<Factor> {
        let rule_var: VarId = catalog.var_id(RULE_VARIABLE)?;
        let scope = catalog.full_scope()?;
        let coder = scope.coder();
        let input_coder = catalog.scope(0..columns.len())?.coder();
        let mut values = vec![0.0; coder.size()];
        // Rule (table position) claiming each full input assignment.
        let mut claimed: Vec<Option<usize>> = vec![None; input_coder.size()];
        for (rule_pos, rule) in table.rules.iter().enumerate() {
            let rule_value = catalog.index(RULE_VARIABLE, &rule.id)?;
            let matching = columns
                .iter()
                .enumerate()
                .map(|(var, column)| {
                    let variable = catalog.variable(var)?;
                    match &rule.entries[*column] {
                        Entry::Literal(v) => catalog
                            .index(catalog.name(var), v)
                            .map(|i| vec![i]),
                        Entry::Any => Ok((0..variable.cardinality()).collect()),
                    }
                })
                .collect::<Result<Vec<Vec<usize>>>>()?;
            for mut assignment in matching
                .into_iter()
                .map(Vec::into_iter)
                .multi_cartesian_product()
            {
                let input_index = input_coder.encode(&assignment)?;
                if let Some(first) = claimed[input_index] {
                    if self.config.strict_hit_policy {
                        return Err(PredictionError::AmbiguousDecisionTable {
                            first: table.rules[first].id.clone(),
                            second: rule.id.clone(),
                            assignment: assignment
                                .iter()
                                .enumerate()
                                .map(|(var, i)| Ok(catalog.variable(var)?.values()[*i].clone()))
                                .collect::<Result<_>>()?,
                        });
                    }
                    tracing::trace!(
                        first = table.rules[first].id.as_str(),
                        shadowed = rule.id.as_str(),
                        "Overlapping rules, the first one wins"
                    );
                    continue;
                }
                claimed[input_index] = Some(rule_pos);
                assignment.push(rule_value);
                debug_assert_eq!(assignment.len(), rule_var + 1);
                values[coder.encode(&assignment)?] = 1.0;
            }
        }
        let unmatched = claimed.iter().filter(|c| c.is_none()).count();
        if unmatched > 0 {
            tracing::debug!(unmatched, "Input assignments matched by no rule");
        }
        Ok(Factor::new(scope, values)?)
    }
}

fn prior_factor<S: DistributionSource>(
    catalog: &VariableCatalog,
    var: VarId,
    source: &S,
) -> Result<Factor> {
    let name = catalog.name(var);
    let domain = catalog.variable(var)?.values();
    let distribution = source.distribution(name, domain)?;
    let values: Vec<f64> = domain
        .iter()
        .map(|v| distribution.probability(v).unwrap_or(0.0))
        .collect();
    if !values.iter().any(|p| *p > 0.0) {
        tracing::warn!(variable = name, "Prior distribution has no mass on the domain");
    }
    Ok(Factor::new(catalog.scope([var])?, values)?)
}
