//! Dense factors: non-negative weight tables over a scope.
//!
//! The table has one axis per scope variable, in scope order, and is indexed by the canonical
//! value indices. Products are computed by broadcasting each operand over the union scope.

use crate::catalog::{Scope, VarId};
use ndarray::{ArrayD, ArrayViewD, Axis, IxDyn, Zip};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FactorError {
    #[error("Wrong table size: got {got}, expected {expected}.")]
    TableSize { expected: usize, got: usize },
    #[error("Factor weights must be non-negative, got {0}.")]
    NegativeWeight(f64),
    #[error("Variable {0} appears twice in a scope.")]
    DuplicateVariable(VarId),
    #[error("Variable {var} has cardinality {left} in one factor and {right} in the other.")]
    CardinalityMismatch {
        var: VarId,
        left: usize,
        right: usize,
    },
    #[error("Variable {0} is not in the scope of the factor.")]
    NotInScope(VarId),
    #[error("Value index {value} out of range for a variable of cardinality {cardinality}.")]
    ValueOutOfRange { value: usize, cardinality: usize },
    #[error("Wrong number of values in assignment: got {got}, expected {expected}.")]
    AssignmentArity { expected: usize, got: usize },
    #[error("Linear index {index} out of range for a table of size {size}.")]
    IndexOutOfRange { index: usize, size: usize },
    #[error("The factor has no probability mass.")]
    ZeroMass,
    #[error("Too many joint assignments for a dense table.")]
    TooManyAssignments,
    #[error("Scope variables must be distinct, sorted and have one cardinality each.")]
    MalformedScope,
}

type Result<T> = std::result::Result<T, FactorError>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FactorRepr")]
pub struct Factor {
    scope: Scope,
    table: ArrayD<f64>,
}

#[derive(Deserialize)]
struct FactorRepr {
    scope: Scope,
    table: ArrayD<f64>,
}

impl TryFrom<FactorRepr> for Factor {
    type Error = FactorError;
    fn try_from(repr: FactorRepr) -> Result<Self> {
        if repr.table.shape() != repr.scope.cardinalities() {
            return Err(FactorError::TableSize {
                expected: repr.scope.size(),
                got: repr.table.len(),
            });
        }
        Factor::new(repr.scope, repr.table.iter().copied().collect())
    }
}

impl Factor {
    /// Build a factor from its weights, listed in [`crate::IndexCoder`] order.
    pub fn new(scope: Scope, values: Vec<f64>) -> Result<Self> {
        if values.len() != scope.size() {
            return Err(FactorError::TableSize {
                expected: scope.size(),
                got: values.len(),
            });
        }
        if let Some(w) = values.iter().find(|w| !(**w >= 0.0)) {
            return Err(FactorError::NegativeWeight(*w));
        }
        let table = ArrayD::from_shape_vec(IxDyn(scope.cardinalities()), values).map_err(|_| {
            FactorError::TableSize {
                expected: scope.size(),
                got: scope.size(),
            }
        })?;
        Ok(Self { scope, table })
    }
    pub fn ones(scope: Scope) -> Self {
        let table = ArrayD::ones(IxDyn(scope.cardinalities()));
        Self { scope, table }
    }
    /// Factor over the empty scope.
    pub fn scalar(weight: f64) -> Self {
        Self {
            scope: Scope::empty(),
            table: ArrayD::from_elem(IxDyn(&[]), weight),
        }
    }
    pub fn scope(&self) -> &Scope {
        &self.scope
    }
    pub fn table(&self) -> ArrayViewD<'_, f64> {
        self.table.view()
    }
    /// Weights in [`crate::IndexCoder`] order.
    pub fn values(&self) -> Vec<f64> {
        self.table.iter().copied().collect()
    }
    /// Weight of a full assignment of the scope (value indices in scope order).
    pub fn value(&self, assignment: &[usize]) -> Result<f64> {
        if assignment.len() != self.scope.len() {
            return Err(FactorError::AssignmentArity {
                expected: self.scope.len(),
                got: assignment.len(),
            });
        }
        for (value, card) in assignment.iter().zip(self.scope.cardinalities()) {
            if value >= card {
                return Err(FactorError::ValueOutOfRange {
                    value: *value,
                    cardinality: *card,
                });
            }
        }
        Ok(self.table[IxDyn(assignment)])
    }
    pub fn total(&self) -> f64 {
        self.table.sum()
    }

    /// View of the table with a length-1 axis for every variable of `scope` that is not in the
    /// scope of this factor. `scope` must be a superset of `self.scope`.
    fn expanded(&self, scope: &Scope) -> ArrayViewD<'_, f64> {
        let mut view = self.table.view();
        for (axis, var) in scope.vars().iter().enumerate() {
            if !self.scope.contains(*var) {
                view.insert_axis_inplace(Axis(axis));
            }
        }
        view
    }

    pub fn multiply(&self, other: &Factor) -> Result<Factor> {
        let scope = self.scope.union(&other.scope)?;
        let mut table = ArrayD::zeros(IxDyn(scope.cardinalities()));
        Zip::from(&mut table)
            .and_broadcast(&self.expanded(&scope))
            .and_broadcast(&other.expanded(&scope))
            .for_each(|res, a, b| *res = a * b);
        Ok(Factor { scope, table })
    }

    /// Product of all the factors (the unit scalar factor if there are none).
    pub fn product<'a>(factors: impl IntoIterator<Item = &'a Factor>) -> Result<Factor> {
        let mut factors = factors.into_iter();
        let Some(first) = factors.next() else {
            return Ok(Factor::scalar(1.0));
        };
        factors.try_fold(first.clone(), |acc, f| acc.multiply(f))
    }

    pub fn sum_out(&self, var: VarId) -> Result<Factor> {
        let pos = self.scope.position(var).ok_or(FactorError::NotInScope(var))?;
        Ok(Factor {
            scope: self.scope.without(var),
            table: self.table.sum_axis(Axis(pos)),
        })
    }

    /// Fix `var` to the value of index `value` and drop it from the scope.
    pub fn restrict(&self, var: VarId, value: usize) -> Result<Factor> {
        let pos = self.scope.position(var).ok_or(FactorError::NotInScope(var))?;
        let cardinality = self.scope.cardinalities()[pos];
        if value >= cardinality {
            return Err(FactorError::ValueOutOfRange { value, cardinality });
        }
        Ok(Factor {
            scope: self.scope.without(var),
            table: self
                .table
                .index_axis(Axis(pos), value)
                .as_standard_layout()
                .into_owned(),
        })
    }

    /// Scale the weights so that they sum to one.
    pub fn normalized(&self) -> Result<Factor> {
        let total = self.total();
        if !(total > 0.0 && total.is_finite()) {
            return Err(FactorError::ZeroMass);
        }
        Ok(Factor {
            scope: self.scope.clone(),
            table: self.table.mapv(|x| x / total),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn scope(vars: &[(VarId, usize)]) -> Scope {
        Scope::new(vars.iter().copied()).unwrap()
    }

    #[test]
    fn table_size_is_checked() {
        assert_eq!(
            Factor::new(scope(&[(0, 2), (1, 3)]), vec![0.0; 5]),
            Err(FactorError::TableSize {
                expected: 6,
                got: 5
            })
        );
        assert!(matches!(
            Factor::new(scope(&[(0, 2)]), vec![0.5, -0.1]),
            Err(FactorError::NegativeWeight(_))
        ));
        assert!(matches!(
            Factor::new(scope(&[(0, 2)]), vec![0.5, f64::NAN]),
            Err(FactorError::NegativeWeight(_))
        ));
    }

    #[test]
    fn multiply_disjoint_and_shared() {
        // f(a, b) * g(b, c)
        let f = Factor::new(scope(&[(0, 2), (1, 2)]), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let g = Factor::new(scope(&[(1, 2), (2, 3)]), vec![1.0, 0.0, 2.0, 0.5, 1.0, 3.0])
            .unwrap();
        let h = f.multiply(&g).unwrap();
        assert_eq!(h.scope().vars(), [0, 1, 2]);
        for a in 0..2 {
            for b in 0..2 {
                for c in 0..3 {
                    assert_eq!(
                        h.value(&[a, b, c]).unwrap(),
                        f.value(&[a, b]).unwrap() * g.value(&[b, c]).unwrap()
                    );
                }
            }
        }
        assert_eq!(h, g.multiply(&f).unwrap());
    }

    #[test]
    fn multiply_checks_cardinalities() {
        let f = Factor::ones(scope(&[(0, 2)]));
        let g = Factor::ones(scope(&[(0, 3)]));
        assert_eq!(
            f.multiply(&g),
            Err(FactorError::CardinalityMismatch {
                var: 0,
                left: 2,
                right: 3
            })
        );
    }

    #[test]
    fn sum_out_and_restrict() {
        let f = Factor::new(
            scope(&[(0, 2), (3, 3)]),
            vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
        )
        .unwrap();
        let s = f.sum_out(3).unwrap();
        assert_eq!(s.scope().vars(), [0]);
        assert_abs_diff_eq!(s.value(&[0]).unwrap(), 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(s.value(&[1]).unwrap(), 1.5, epsilon = 1e-12);
        let s = f.sum_out(0).unwrap();
        assert_eq!(s.values().len(), 3);
        assert_abs_diff_eq!(s.value(&[2]).unwrap(), 0.9, epsilon = 1e-12);

        let r = f.restrict(0, 1).unwrap();
        assert_eq!(r.scope().vars(), [3]);
        assert_eq!(r.values(), vec![0.4, 0.5, 0.6]);
        let r = f.restrict(3, 2).unwrap();
        assert_eq!(r.values(), vec![0.3, 0.6]);

        assert_eq!(f.sum_out(1), Err(FactorError::NotInScope(1)));
        assert_eq!(
            f.restrict(3, 3),
            Err(FactorError::ValueOutOfRange {
                value: 3,
                cardinality: 3
            })
        );
    }

    #[test]
    fn scalars_and_normalization() {
        let f = Factor::new(scope(&[(0, 2)]), vec![1.0, 3.0]).unwrap();
        let t = f.sum_out(0).unwrap();
        assert!(t.scope().is_empty());
        assert_eq!(t.value(&[]).unwrap(), 4.0);
        assert_eq!(Factor::product([&f, &Factor::scalar(2.0)]).unwrap().values(), vec![2.0, 6.0]);
        assert_eq!(Factor::product(Vec::<&Factor>::new()).unwrap(), Factor::scalar(1.0));
        assert_eq!(f.normalized().unwrap().values(), vec![0.25, 0.75]);
        let z = Factor::new(scope(&[(0, 2)]), vec![0.0, 0.0]).unwrap();
        assert_eq!(z.normalized(), Err(FactorError::ZeroMass));
    }

    #[derive(Serialize)]
    struct RawFactor {
        scope: Scope,
        table: ArrayD<f64>,
    }

    #[test]
    fn deserialization_checks_invariants() {
        let f = Factor::new(scope(&[(0, 2), (1, 3)]), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        let restored: Factor = bincode::deserialize(&bincode::serialize(&f).unwrap()).unwrap();
        assert_eq!(restored, f);

        let raw = |scope: Scope, table: ArrayD<f64>| {
            bincode::serialize(&RawFactor { scope, table }).unwrap()
        };
        let negative = ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.5, -0.5]).unwrap();
        assert!(bincode::deserialize::<Factor>(&raw(scope(&[(0, 2)]), negative)).is_err());
        let wrong_shape = ArrayD::from_elem(IxDyn(&[3]), 1.0);
        assert!(bincode::deserialize::<Factor>(&raw(scope(&[(0, 2)]), wrong_shape)).is_err());
    }
}
