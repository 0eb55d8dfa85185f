use crate::catalog::{VarId, VariableCatalog};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Known values of some of the variables of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evidence {
    assignments: BTreeMap<String, String>,
}

impl Evidence {
    pub fn new() -> Self {
        Self::default()
    }
    /// Set the value of `variable`, replacing any previous one.
    pub fn submit(&mut self, variable: impl Into<String>, value: impl Into<String>) {
        self.assignments.insert(variable.into(), value.into());
    }
    pub fn with(mut self, variable: impl Into<String>, value: impl Into<String>) -> Self {
        self.submit(variable, value);
        self
    }
    pub fn get(&self, variable: &str) -> Option<&str> {
        self.assignments.get(variable).map(String::as_str)
    }
    pub fn len(&self) -> usize {
        self.assignments.len()
    }
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.assignments
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Resolve names and values to catalog indices, sorted by variable.
    ///
    /// Fails on the first variable or value that is not in the catalog.
    pub fn resolve(&self, catalog: &VariableCatalog) -> Result<Vec<(VarId, usize)>> {
        let mut res = self
            .iter()
            .map(|(var, value)| Ok((catalog.var_id(var)?, catalog.index(var, value)?)))
            .collect::<Result<Vec<_>>>()?;
        res.sort_unstable();
        Ok(res)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Evidence {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            assignments: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
