//! Canonical variable indexing.
//!
//! Every variable has a finite domain of string values, stored in lexicographic order: the
//! position of a value in that order is its index in every factor table. The catalog fixes one
//! global ordering of the variables (their insertion order, `VarId`), and every [`Scope`] keeps
//! its variables sorted by it, so that factor tables over the same variables always share the
//! same layout.

use crate::factor::FactorError;
use crate::{PredictionError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub type VarId = usize;

type NamedList<T> = IndexMap<String, T>;

/// Finite domain of a discrete variable, in canonical (lexicographic) order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "VariableRepr")]
pub struct Variable {
    values: Vec<String>,
}

impl Variable {
    /// Sort and deduplicate the values. The resulting order is never changed afterwards.
    pub fn new<S: Into<String>>(values: impl IntoIterator<Item = S>) -> Self {
        let mut values: Vec<String> = values.into_iter().map(Into::into).collect();
        values.sort_unstable();
        values.dedup();
        Self { values }
    }
    pub fn values(&self) -> &[String] {
        &self.values
    }
    pub fn cardinality(&self) -> usize {
        self.values.len()
    }
    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.values
            .binary_search_by(|v| v.as_str().cmp(value))
            .ok()
    }
}

#[derive(Deserialize)]
struct VariableRepr {
    values: Vec<String>,
}

impl TryFrom<VariableRepr> for Variable {
    type Error = PredictionError;
    fn try_from(repr: VariableRepr) -> Result<Self> {
        // Factor tables are laid out along the stored order, it cannot be fixed by sorting.
        if repr.values.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PredictionError::InvalidModel(
                "domain values are not sorted and distinct".to_owned(),
            ));
        }
        Ok(Self {
            values: repr.values,
        })
    }
}

/// Immutable name -> domain mapping, built once per decision table version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogRepr")]
pub struct VariableCatalog {
    vars: NamedList<Variable>,
}

#[derive(Deserialize)]
struct CatalogRepr {
    vars: NamedList<Variable>,
}

impl TryFrom<CatalogRepr> for VariableCatalog {
    type Error = PredictionError;
    fn try_from(repr: CatalogRepr) -> Result<Self> {
        Self::new(repr.vars)
    }
}

impl VariableCatalog {
    pub fn new<S: Into<String>>(variables: impl IntoIterator<Item = (S, Variable)>) -> Result<Self> {
        let mut vars = NamedList::new();
        for (name, var) in variables {
            let name = name.into();
            if var.cardinality() == 0 {
                return Err(PredictionError::MalformedDecisionTable(format!(
                    "variable {} has an empty domain",
                    name
                )));
            }
            if vars.contains_key(&name) {
                return Err(PredictionError::MalformedDecisionTable(format!(
                    "variable {} is declared twice",
                    name
                )));
            }
            vars.insert(name, var);
        }
        Ok(Self { vars })
    }
    pub fn len(&self) -> usize {
        self.vars.len()
    }
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (VarId, &str, &Variable)> {
        self.vars
            .iter()
            .enumerate()
            .map(|(id, (name, var))| (id, name.as_str(), var))
    }
    pub fn var_id(&self, name: &str) -> Result<VarId> {
        self.vars
            .get_index_of(name)
            .ok_or_else(|| PredictionError::UnknownVariable(name.to_owned()))
    }
    /// Name of a variable, empty if `var` is not in the catalog.
    pub fn name(&self, var: VarId) -> &str {
        self.vars.get_index(var).map_or("", |(name, _)| name.as_str())
    }
    pub fn variable(&self, var: VarId) -> Result<&Variable> {
        self.vars
            .get_index(var)
            .map(|(_, v)| v)
            .ok_or_else(|| FactorError::NotInScope(var).into())
    }
    pub fn get(&self, name: &str) -> Result<&Variable> {
        self.vars
            .get(name)
            .ok_or_else(|| PredictionError::UnknownVariable(name.to_owned()))
    }
    pub fn values(&self, name: &str) -> Result<&[String]> {
        Ok(self.get(name)?.values())
    }
    pub fn cardinality(&self, name: &str) -> Result<usize> {
        Ok(self.get(name)?.cardinality())
    }
    /// Index of `value` in the canonical domain of `name`.
    pub fn index(&self, name: &str, value: &str) -> Result<usize> {
        self.get(name)?
            .index_of(value)
            .ok_or_else(|| PredictionError::UnknownValue {
                variable: name.to_owned(),
                value: value.to_owned(),
            })
    }
    pub fn scope(&self, vars: impl IntoIterator<Item = VarId>) -> Result<Scope> {
        let pairs = vars
            .into_iter()
            .map(|v| Ok((v, self.variable(v)?.cardinality())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Scope::new(pairs)?)
    }
    pub fn scope_of<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<Scope> {
        let ids = names
            .into_iter()
            .map(|n| self.var_id(n))
            .collect::<Result<Vec<_>>>()?;
        self.scope(ids)
    }
    /// Scope over every variable of the catalog.
    pub fn full_scope(&self) -> Result<Scope> {
        Ok(Scope::new(
            self.vars
                .values()
                .enumerate()
                .map(|(id, var)| (id, var.cardinality())),
        )?)
    }
}

/// Product of cardinalities, `None` on overflow.
fn checked_size(cards: &[usize]) -> Option<usize> {
    cards.iter().try_fold(1usize, |acc, card| acc.checked_mul(*card))
}

/// Set of variables, sorted by `VarId`, with their cardinalities. The number of joint
/// assignments always fits in a `usize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ScopeRepr")]
pub struct Scope {
    vars: Vec<VarId>,
    cards: Vec<usize>,
}

#[derive(Deserialize)]
struct ScopeRepr {
    vars: Vec<VarId>,
    cards: Vec<usize>,
}

impl TryFrom<ScopeRepr> for Scope {
    type Error = FactorError;
    fn try_from(repr: ScopeRepr) -> std::result::Result<Self, FactorError> {
        if repr.vars.len() != repr.cards.len() || repr.vars.windows(2).any(|w| w[0] >= w[1]) {
            return Err(FactorError::MalformedScope);
        }
        Scope::new(repr.vars.into_iter().zip(repr.cards))
    }
}

impl Scope {
    pub fn empty() -> Self {
        Self::default()
    }
    pub fn new(vars: impl IntoIterator<Item = (VarId, usize)>) -> std::result::Result<Self, FactorError> {
        let mut pairs: Vec<(VarId, usize)> = vars.into_iter().collect();
        pairs.sort_unstable_by_key(|(v, _)| *v);
        if let Some(w) = pairs.windows(2).find(|w| w[0].0 == w[1].0) {
            return Err(FactorError::DuplicateVariable(w[0].0));
        }
        let (vars, cards): (Vec<_>, Vec<_>) = pairs.into_iter().unzip();
        if checked_size(&cards).is_none() {
            return Err(FactorError::TooManyAssignments);
        }
        Ok(Self { vars, cards })
    }
    pub fn vars(&self) -> &[VarId] {
        &self.vars
    }
    pub fn cardinalities(&self) -> &[usize] {
        &self.cards
    }
    pub fn len(&self) -> usize {
        self.vars.len()
    }
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
    /// Number of joint assignments (1 for the empty scope).
    pub fn size(&self) -> usize {
        self.cards.iter().product()
    }
    pub fn position(&self, var: VarId) -> Option<usize> {
        self.vars.binary_search(&var).ok()
    }
    pub fn contains(&self, var: VarId) -> bool {
        self.position(var).is_some()
    }
    pub fn cardinality(&self, var: VarId) -> Option<usize> {
        self.position(var).map(|p| self.cards[p])
    }
    pub fn union(&self, other: &Scope) -> std::result::Result<Scope, FactorError> {
        let mut vars = Vec::with_capacity(self.len() + other.len());
        let mut cards = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.len() || j < other.len() {
            let left = self.vars.get(i).copied();
            let right = other.vars.get(j).copied();
            match (left, right) {
                (Some(l), Some(r)) if l == r => {
                    if self.cards[i] != other.cards[j] {
                        return Err(FactorError::CardinalityMismatch {
                            var: l,
                            left: self.cards[i],
                            right: other.cards[j],
                        });
                    }
                    vars.push(l);
                    cards.push(self.cards[i]);
                    i += 1;
                    j += 1;
                }
                (Some(l), Some(r)) if l < r => {
                    vars.push(l);
                    cards.push(self.cards[i]);
                    i += 1;
                }
                (Some(l), None) => {
                    vars.push(l);
                    cards.push(self.cards[i]);
                    i += 1;
                }
                (_, Some(r)) => {
                    vars.push(r);
                    cards.push(other.cards[j]);
                    j += 1;
                }
                (None, None) => unreachable!(),
            }
        }
        if checked_size(&cards).is_none() {
            return Err(FactorError::TooManyAssignments);
        }
        Ok(Scope { vars, cards })
    }
    pub fn without(&self, var: VarId) -> Scope {
        let mut res = self.clone();
        if let Some(p) = self.position(var) {
            res.vars.remove(p);
            res.cards.remove(p);
        }
        res
    }
    pub fn coder(&self) -> IndexCoder {
        IndexCoder {
            strides: strides(&self.cards),
            cards: self.cards.clone(),
            size: self.size(),
        }
    }
}

/// Mixed-radix coding of joint assignments over a list of cardinalities.
///
/// The last position varies fastest, which is the layout of a standard (row-major) `ndarray`
/// table with one axis per variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexCoder {
    cards: Vec<usize>,
    strides: Vec<usize>,
    size: usize,
}

/// Row-major strides. The product of `cards` must not overflow.
fn strides(cards: &[usize]) -> Vec<usize> {
    let mut strides = vec![0; cards.len()];
    let mut size = 1;
    for (stride, card) in strides.iter_mut().zip(cards).rev() {
        *stride = size;
        size *= card;
    }
    strides
}

impl IndexCoder {
    pub fn new(cards: &[usize]) -> std::result::Result<Self, FactorError> {
        let size = checked_size(cards).ok_or(FactorError::TooManyAssignments)?;
        Ok(Self {
            cards: cards.to_vec(),
            strides: strides(cards),
            size,
        })
    }
    pub fn size(&self) -> usize {
        self.size
    }
    pub fn encode(&self, assignment: &[usize]) -> std::result::Result<usize, FactorError> {
        if assignment.len() != self.cards.len() {
            return Err(FactorError::AssignmentArity {
                expected: self.cards.len(),
                got: assignment.len(),
            });
        }
        let mut index = 0;
        for ((a, card), stride) in assignment.iter().zip(&self.cards).zip(&self.strides) {
            if a >= card {
                return Err(FactorError::ValueOutOfRange {
                    value: *a,
                    cardinality: *card,
                });
            }
            index += a * stride;
        }
        Ok(index)
    }
    pub fn decode(&self, index: usize) -> std::result::Result<Vec<usize>, FactorError> {
        if index >= self.size {
            return Err(FactorError::IndexOutOfRange {
                index,
                size: self.size,
            });
        }
        Ok(self
            .strides
            .iter()
            .zip(&self.cards)
            .map(|(stride, card)| (index / stride) % card)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> VariableCatalog {
        VariableCatalog::new([
            ("season", Variable::new(["Winter", "Summer", "Winter"])),
            ("hungry", Variable::new(["yes", "no"])),
            ("$rule", Variable::new(["r3", "r1", "r2"])),
        ])
        .unwrap()
    }

    #[test]
    fn domains_are_sorted() {
        let c = catalog();
        assert_eq!(c.values("season").unwrap(), ["Summer", "Winter"]);
        assert_eq!(c.index("hungry", "yes").unwrap(), 1);
        assert_eq!(c.cardinality("$rule").unwrap(), 3);
        assert_eq!(c.name(1), "hungry");
        assert_eq!(
            c.index("hungry", "maybe"),
            Err(PredictionError::UnknownValue {
                variable: "hungry".to_owned(),
                value: "maybe".to_owned()
            })
        );
        assert_eq!(
            c.index("thirsty", "yes"),
            Err(PredictionError::UnknownVariable("thirsty".to_owned()))
        );
    }

    #[test]
    fn duplicate_and_empty_variables() {
        assert!(matches!(
            VariableCatalog::new([("a", Variable::new(["x"])), ("a", Variable::new(["y"]))]),
            Err(PredictionError::MalformedDecisionTable(_))
        ));
        assert!(matches!(
            VariableCatalog::new([("a", Variable::new(Vec::<String>::new()))]),
            Err(PredictionError::MalformedDecisionTable(_))
        ));
    }

    #[test]
    fn scope_is_a_set() {
        let c = catalog();
        let s1 = c.scope([2, 0]).unwrap();
        let s2 = c.scope_of(["season", "$rule"]).unwrap();
        assert_eq!(s1, s2);
        assert_eq!(s1.vars(), [0, 2]);
        assert_eq!(s1.cardinalities(), [2, 3]);
        assert_eq!(s1.size(), 6);
        assert_eq!(
            Scope::new([(1, 2), (1, 2)]),
            Err(FactorError::DuplicateVariable(1))
        );
    }

    #[test]
    fn scope_union() {
        let a = Scope::new([(0, 2), (3, 4)]).unwrap();
        let b = Scope::new([(1, 3), (3, 4)]).unwrap();
        let u = a.union(&b).unwrap();
        assert_eq!(u.vars(), [0, 1, 3]);
        assert_eq!(u.cardinalities(), [2, 3, 4]);
        let bad = Scope::new([(3, 5)]).unwrap();
        assert_eq!(
            a.union(&bad),
            Err(FactorError::CardinalityMismatch {
                var: 3,
                left: 4,
                right: 5
            })
        );
        assert_eq!(u.without(1), Scope::new([(0, 2), (3, 4)]).unwrap());
    }

    #[test]
    fn index_coder() {
        let coder = IndexCoder::new(&[2, 3, 4]).unwrap();
        assert_eq!(coder.size(), 24);
        assert_eq!(coder.encode(&[0, 0, 1]).unwrap(), 1);
        assert_eq!(coder.encode(&[1, 2, 3]).unwrap(), 23);
        for i in 0..coder.size() {
            assert_eq!(coder.encode(&coder.decode(i).unwrap()).unwrap(), i);
        }
        assert!(coder.encode(&[0, 3, 0]).is_err());
        assert!(coder.encode(&[0, 0]).is_err());
        assert!(coder.decode(24).is_err());
        let empty = IndexCoder::new(&[]).unwrap();
        assert_eq!(empty.size(), 1);
        assert_eq!(empty.encode(&[]).unwrap(), 0);
        assert_eq!(Scope::new([(0, 2), (1, 3), (2, 4)]).unwrap().coder(), coder);
    }

    #[test]
    fn size_overflow() {
        assert_eq!(
            IndexCoder::new(&[usize::MAX, 2]),
            Err(FactorError::TooManyAssignments)
        );
        assert_eq!(
            Scope::new((0..16).map(|v| (v, 1 << 8))),
            Err(FactorError::TooManyAssignments)
        );
        let a = Scope::new((0..4).map(|v| (v, 1 << 16))).unwrap();
        let b = Scope::new((4..8).map(|v| (v, 1 << 16))).unwrap();
        assert_eq!(a.union(&b), Err(FactorError::TooManyAssignments));
    }

    #[test]
    fn unknown_var_id() {
        let c = catalog();
        assert_eq!(
            c.variable(3),
            Err(PredictionError::Factor(FactorError::NotInScope(3)))
        );
        assert_eq!(
            c.scope([0, 7]),
            Err(PredictionError::Factor(FactorError::NotInScope(7)))
        );
        assert_eq!(c.name(3), "");
        assert_eq!(c.full_scope().unwrap().vars(), [0, 1, 2]);
    }

    #[derive(Serialize)]
    struct RawScope {
        vars: Vec<VarId>,
        cards: Vec<usize>,
    }

    #[test]
    fn deserialization_checks_invariants() {
        let sorted = bincode::serialize(&Variable::new(["b", "a"])).unwrap();
        let variable: Variable = bincode::deserialize(&sorted).unwrap();
        assert_eq!(variable.values(), ["a", "b"]);
        let unsorted = bincode::serialize(&["b", "a"].map(String::from).to_vec()).unwrap();
        assert!(bincode::deserialize::<Variable>(&unsorted).is_err());

        let c = catalog();
        let restored: VariableCatalog =
            bincode::deserialize(&bincode::serialize(&c).unwrap()).unwrap();
        assert_eq!(restored, c);

        let raw = |vars: Vec<VarId>, cards: Vec<usize>| {
            bincode::serialize(&RawScope { vars, cards }).unwrap()
        };
        let scope: Scope = bincode::deserialize(&raw(vec![0, 2], vec![2, 3])).unwrap();
        assert_eq!(scope, Scope::new([(2, 3), (0, 2)]).unwrap());
        assert!(bincode::deserialize::<Scope>(&raw(vec![2, 0], vec![3, 2])).is_err());
        assert!(bincode::deserialize::<Scope>(&raw(vec![0, 2], vec![2])).is_err());
        assert!(bincode::deserialize::<Scope>(&raw((0..16).collect(), vec![256; 16])).is_err());
    }
}
