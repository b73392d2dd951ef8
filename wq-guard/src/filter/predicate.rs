//! Store-neutral row predicates and their SQL rendering.

use crate::error::Result;
use crate::model::{NumericField, Observation, DATE_COLUMN};
use crate::security::SqlSecurity;

/// A boolean condition over stored observations.
///
/// Range comparisons never match a null reading.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Matches every row.
    All,
    /// The field has a reading.
    NotNull(NumericField),
    /// Exact match on the date token.
    DateEquals(String),
    /// `field >= bound`
    AtLeast(NumericField, f64),
    /// `field <= bound`
    AtMost(NumericField, f64),
    /// Every inner predicate holds.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Conjunction of `self` and `other`, flattening nested `And`s.
    pub fn and(self, other: Predicate) -> Predicate {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (Predicate::And(mut left), Predicate::And(right)) => {
                left.extend(right);
                Predicate::And(left)
            }
            (Predicate::And(mut left), p) => {
                left.push(p);
                Predicate::And(left)
            }
            (p, Predicate::And(mut right)) => {
                right.insert(0, p);
                Predicate::And(right)
            }
            (a, b) => Predicate::And(vec![a, b]),
        }
    }

    /// Evaluates the predicate against one observation.
    pub fn matches(&self, observation: &Observation) -> bool {
        match self {
            Predicate::All => true,
            Predicate::NotNull(field) => observation.value(*field).is_some(),
            Predicate::DateEquals(date) => observation.date.as_deref() == Some(date.as_str()),
            Predicate::AtLeast(field, bound) => {
                observation.value(*field).is_some_and(|v| v >= *bound)
            }
            Predicate::AtMost(field, bound) => {
                observation.value(*field).is_some_and(|v| v <= *bound)
            }
            Predicate::And(inner) => inner.iter().all(|p| p.matches(observation)),
        }
    }

    /// Renders the predicate as a SQL boolean expression.
    pub fn to_sql(&self) -> Result<String> {
        Ok(match self {
            Predicate::All => "TRUE".to_string(),
            Predicate::NotNull(field) => {
                format!("{} IS NOT NULL", SqlSecurity::escape_identifier(field.as_str())?)
            }
            Predicate::DateEquals(date) => format!(
                "{} = {}",
                SqlSecurity::escape_identifier(DATE_COLUMN)?,
                SqlSecurity::quote_literal(date)?
            ),
            Predicate::AtLeast(field, bound) => format!(
                "{} >= {}",
                SqlSecurity::escape_identifier(field.as_str())?,
                float_literal(*bound)
            ),
            Predicate::AtMost(field, bound) => format!(
                "{} <= {}",
                SqlSecurity::escape_identifier(field.as_str())?,
                float_literal(*bound)
            ),
            Predicate::And(inner) if inner.is_empty() => "TRUE".to_string(),
            Predicate::And(inner) => {
                let parts = inner
                    .iter()
                    .map(|p| p.to_sql().map(|sql| format!("({sql})")))
                    .collect::<Result<Vec<_>>>()?;
                parts.join(" AND ")
            }
        })
    }
}

fn float_literal(value: f64) -> String {
    format!("CAST({value:?} AS DOUBLE)")
}
