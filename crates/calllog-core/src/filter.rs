//! Structured call-log filter
//!
//! Stores receive the filter as typed clauses and bind the values as
//! parameters. The [`fmt::Display`] rendering of the legacy predicate text
//! exists for logs only.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, BridgeResult};
use crate::record::{CallLogRow, CallType};

/// Filterable call-log column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Column {
    Date,
    Type,
}

impl Column {
    pub fn name(self) -> &'static str {
        match self {
            Column::Date => "DATE",
            Column::Type => "TYPE",
        }
    }
}

/// Comparison operator of a clause
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    GreaterThan,
    LessThan,
    Equal,
}

impl Comparison {
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::GreaterThan => ">",
            Comparison::LessThan => "<",
            Comparison::Equal => "=",
        }
    }

    fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Comparison::GreaterThan => left > right,
            Comparison::LessThan => left < right,
            Comparison::Equal => left == right,
        }
    }
}

/// A single `column op value` term; clauses are always AND-joined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Clause {
    pub column: Column,
    pub comparison: Comparison,
    pub value: i64,
}

/// Call-log filter with optional exclusive date bounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallLogFilter {
    /// Exclusive lower bound, epoch milliseconds
    pub date_from: Option<i64>,
    /// Exclusive upper bound, epoch milliseconds
    pub date_to: Option<i64>,
    /// Restrict to one call type
    pub call_type: Option<CallType>,
}

impl CallLogFilter {
    /// Filter matching every row
    pub fn all() -> Self {
        Self::default()
    }

    /// Build a date filter from the wire strings of a `query` call
    pub fn from_strings(date_from: Option<&str>, date_to: Option<&str>) -> BridgeResult<Self> {
        Ok(Self {
            date_from: parse_bound("dateFrom", date_from)?,
            date_to: parse_bound("dateTo", date_to)?,
            call_type: None,
        })
    }

    pub fn with_call_type(mut self, call_type: CallType) -> Self {
        self.call_type = Some(call_type);
        self
    }

    /// True when the filter constrains nothing
    pub fn is_empty(&self) -> bool {
        self.date_from.is_none() && self.date_to.is_none() && self.call_type.is_none()
    }

    /// Clauses in ascending precedence: lower bound, upper bound, type
    pub fn clauses(&self) -> Vec<Clause> {
        let mut clauses = Vec::with_capacity(3);
        if let Some(from) = self.date_from {
            clauses.push(Clause {
                column: Column::Date,
                comparison: Comparison::GreaterThan,
                value: from,
            });
        }
        if let Some(to) = self.date_to {
            clauses.push(Clause {
                column: Column::Date,
                comparison: Comparison::LessThan,
                value: to,
            });
        }
        if let Some(call_type) = self.call_type {
            clauses.push(Clause {
                column: Column::Type,
                comparison: Comparison::Equal,
                value: i64::from(call_type.code()),
            });
        }
        clauses
    }

    /// Evaluate the filter against a row
    pub fn matches(&self, row: &CallLogRow) -> bool {
        self.clauses().iter().all(|clause| {
            let left = match clause.column {
                Column::Date => row.date,
                Column::Type => i64::from(row.call_type),
            };
            clause.comparison.holds(left, clause.value)
        })
    }
}

impl fmt::Display for CallLogFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses().iter().enumerate() {
            if i > 0 {
                f.write_str(" AND ")?;
            }
            write!(
                f,
                "{} {} '{}'",
                clause.column.name(),
                clause.comparison.symbol(),
                clause.value
            )?;
        }
        Ok(())
    }
}

fn parse_bound(argument: &str, raw: Option<&str>) -> BridgeResult<Option<i64>> {
    match raw {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| BridgeError::invalid_arg(argument, "expected epoch milliseconds")),
    }
}
