//! Structure of a decision table, as handed over by the parser of its source format.

use crate::{PredictionError, Result, RULE_VARIABLE};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Condition of a rule on one input column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Entry {
    /// Matches exactly this raw value text.
    Literal(String),
    /// Matches any value of the column.
    Any,
}

impl Entry {
    pub fn literal(value: impl Into<String>) -> Self {
        Entry::Literal(value.into())
    }
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Entry::Literal(v) => Some(v.as_str()),
            Entry::Any => None,
        }
    }
}

impl From<&str> for Entry {
    fn from(value: &str) -> Self {
        Entry::literal(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    /// One entry per input column, in column order.
    pub entries: Vec<Entry>,
}

impl Rule {
    pub fn new<E: Into<Entry>>(id: impl Into<String>, entries: impl IntoIterator<Item = E>) -> Self {
        Self {
            id: id.into(),
            entries: entries.into_iter().map(Into::into).collect(),
        }
    }
}

/// Input columns and rules of a decision table whose hit policy lets at most one rule match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionTable {
    pub inputs: Vec<String>,
    pub rules: Vec<Rule>,
}

impl DecisionTable {
    pub fn new<S: Into<String>>(
        inputs: impl IntoIterator<Item = S>,
        rules: impl IntoIterator<Item = Rule>,
    ) -> Self {
        Self {
            inputs: inputs.into_iter().map(Into::into).collect(),
            rules: rules.into_iter().collect(),
        }
    }

    pub fn rule(&self, id: &str) -> Result<&Rule> {
        self.rules
            .iter()
            .find(|r| r.id == id)
            .ok_or_else(|| PredictionError::UnknownRule(id.to_owned()))
    }

    /// Distinct literal values of column `column` over all rules, in no particular order.
    pub fn literals(&self, column: usize) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .filter_map(move |r| r.entries.get(column).and_then(Entry::as_literal))
            .unique()
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.is_empty() {
            return Err(PredictionError::EmptyDecisionTable);
        }
        if self.inputs.is_empty() {
            return Err(PredictionError::MalformedDecisionTable(
                "the table has no input column".to_owned(),
            ));
        }
        if let Some(input) = self.inputs.iter().duplicates().next() {
            return Err(PredictionError::MalformedDecisionTable(format!(
                "input column {} is declared twice",
                input
            )));
        }
        if self.inputs.iter().any(|i| i == RULE_VARIABLE) {
            return Err(PredictionError::MalformedDecisionTable(format!(
                "input column cannot be named {}",
                RULE_VARIABLE
            )));
        }
        if let Some(id) = self.rules.iter().map(|r| &r.id).duplicates().next() {
            return Err(PredictionError::MalformedDecisionTable(format!(
                "rule id {} is used twice",
                id
            )));
        }
        for rule in self.rules.iter() {
            if rule.entries.len() != self.inputs.len() {
                return Err(PredictionError::MalformedDecisionTable(format!(
                    "rule {} has {} entries for {} input columns",
                    rule.id,
                    rule.entries.len(),
                    self.inputs.len()
                )));
            }
        }
        for (column, input) in self.inputs.iter().enumerate() {
            if self.literals(column).next().is_none() {
                return Err(PredictionError::MalformedDecisionTable(format!(
                    "input column {} has no literal value in any rule",
                    input
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lunch() -> DecisionTable {
        DecisionTable::new(
            ["season", "hungry"],
            [
                Rule::new("r1", ["Summer", "yes"]),
                Rule::new("r2", [Entry::literal("Winter"), Entry::Any]),
                Rule::new("r3", ["Summer", "no"]),
            ],
        )
    }

    #[test]
    fn valid_table() {
        let t = lunch();
        t.validate().unwrap();
        assert_eq!(t.literals(0).collect::<Vec<_>>(), ["Summer", "Winter"]);
        assert_eq!(t.literals(1).collect::<Vec<_>>(), ["yes", "no"]);
        assert_eq!(t.rule("r2").unwrap().entries[1], Entry::Any);
        assert_eq!(
            t.rule("r9"),
            Err(PredictionError::UnknownRule("r9".to_owned()))
        );
    }

    #[test]
    fn malformed_tables() {
        let mut t = lunch();
        t.rules[1].entries.pop();
        assert!(matches!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(_))
        ));

        let mut t = lunch();
        t.rules[2].id = "r1".to_owned();
        assert!(matches!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(_))
        ));

        let t = DecisionTable::new(["a"], [Rule::new("r1", [Entry::Any])]);
        assert!(matches!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(_))
        ));

        let t = DecisionTable::new(["a"], Vec::<Rule>::new());
        assert_eq!(t.validate(), Err(PredictionError::EmptyDecisionTable));
    }

    #[test]
    fn malformed_columns() {
        let t = DecisionTable::new(["a", "a"], [Rule::new("r1", ["x", "y"])]);
        assert_eq!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(
                "input column a is declared twice".to_owned()
            ))
        );

        let t = DecisionTable::new([RULE_VARIABLE], [Rule::new("r1", ["x"])]);
        assert_eq!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(format!(
                "input column cannot be named {}",
                RULE_VARIABLE
            )))
        );

        let t = DecisionTable::new(Vec::<String>::new(), [Rule::new("r1", Vec::<Entry>::new())]);
        assert_eq!(
            t.validate(),
            Err(PredictionError::MalformedDecisionTable(
                "the table has no input column".to_owned()
            ))
        );
        // No rules is reported first.
        let t = DecisionTable::new(Vec::<String>::new(), Vec::<Rule>::new());
        assert_eq!(t.validate(), Err(PredictionError::EmptyDecisionTable));
    }
}
