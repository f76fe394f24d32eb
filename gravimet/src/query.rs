//! Query types for filtering the metadata table.
//!
//! Queries compare string-typed metadata cells against a probe value with
//! one of six comparison operators. Comparison is lexical by default; a
//! column can be declared numeric on the store
//! ([`crate::store::DatasetStore::declare_numeric_column`]), in which case
//! both sides are parsed as `f64` and a cell that fails to parse never
//! matches. A record lacking the queried column never matches any
//! operator (null semantics).

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::QueryError;
use crate::model::{SampleRecord, SampleSeries};

// ---------------------------------------------------------------------------
// Operator
// ---------------------------------------------------------------------------

/// A comparison operator, written in its spreadsheet string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `>=`
    Ge,
    /// `<=`
    Le,
}

impl Operator {
    /// The operator's string form, as accepted by [`FromStr`].
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
        }
    }

    /// Whether an ordering between cell and probe satisfies this operator.
    fn accepts(self, ordering: Ordering) -> bool {
        match self {
            Operator::Eq => ordering == Ordering::Equal,
            Operator::Ne => ordering != Ordering::Equal,
            Operator::Gt => ordering == Ordering::Greater,
            Operator::Lt => ordering == Ordering::Less,
            Operator::Ge => ordering != Ordering::Less,
            Operator::Le => ordering != Ordering::Greater,
        }
    }
}

impl FromStr for Operator {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "==" => Ok(Operator::Eq),
            "!=" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            "<" => Ok(Operator::Lt),
            ">=" => Ok(Operator::Ge),
            "<=" => Ok(Operator::Le),
            other => Err(QueryError::UnsupportedOperator {
                operator: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// One column filter of a conjunctive query.
///
/// The operator is kept in string form and parsed at query time, so an
/// invalid operator surfaces as a per-query error rather than a
/// construction failure (`find_all` aborts on the first one it meets).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// The metadata column to filter.
    pub column: String,
    /// The comparison operator in string form (`==`, `!=`, `>`, ...).
    pub operator: String,
    /// The probe value to compare cells against.
    pub value: String,
}

impl Condition {
    /// Creates a condition.
    pub fn new(
        column: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            column: column.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// SampleHit
// ---------------------------------------------------------------------------

/// One query result: a metadata row and its hydrated series.
///
/// `series` is `None` when the row's series file is absent on disk (the
/// row survives in the metadata table, the data does not — an accepted
/// crash-consistency gap).
#[derive(Debug, Clone, PartialEq)]
pub struct SampleHit {
    /// The matching metadata row.
    pub record: SampleRecord,
    /// The sample's series, freshly loaded from disk, or `None` when the
    /// series file is missing.
    pub series: Option<SampleSeries>,
}

// ---------------------------------------------------------------------------
// Cell comparison
// ---------------------------------------------------------------------------

/// Whether a cell satisfies `cell <op> probe` under the given policy.
///
/// An absent cell never matches. Under the numeric policy both sides must
/// parse as `f64`; `total_cmp` keeps the comparison deterministic for the
/// odd not-a-number cell.
pub(crate) fn cell_matches(cell: Option<&str>, probe: &str, op: Operator, numeric: bool) -> bool {
    let Some(cell) = cell else {
        return false;
    };
    let ordering = if numeric {
        match (cell.trim().parse::<f64>(), probe.trim().parse::<f64>()) {
            (Ok(c), Ok(p)) => c.total_cmp(&p),
            _ => return false,
        }
    } else {
        cell.cmp(probe)
    };
    op.accepts(ordering)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_round_trips_through_symbol() {
        for op in [
            Operator::Eq,
            Operator::Ne,
            Operator::Gt,
            Operator::Lt,
            Operator::Ge,
            Operator::Le,
        ] {
            assert_eq!(op.symbol().parse::<Operator>().unwrap(), op);
        }
    }

    #[test]
    fn unsupported_operator_is_rejected() {
        let err = "~=".parse::<Operator>().unwrap_err();
        assert!(matches!(
            err,
            QueryError::UnsupportedOperator { operator } if operator == "~="
        ));
    }

    #[test]
    fn lexical_and_numeric_comparison_differ() {
        // Lexically "1000" < "300"; numerically 1000 > 300.
        assert!(cell_matches(Some("1000"), "300", Operator::Lt, false));
        assert!(cell_matches(Some("1000"), "300", Operator::Gt, true));
    }

    #[test]
    fn absent_cell_never_matches() {
        assert!(!cell_matches(None, "300", Operator::Eq, false));
        assert!(!cell_matches(None, "300", Operator::Ne, false));
    }

    #[test]
    fn unparseable_numeric_cell_never_matches() {
        assert!(!cell_matches(Some("washed"), "300", Operator::Gt, true));
        assert!(!cell_matches(Some("300"), "washed", Operator::Gt, true));
        // The same cell still matches lexically.
        assert!(cell_matches(Some("washed"), "300", Operator::Gt, false));
    }

    #[test]
    fn boundary_operators() {
        assert!(cell_matches(Some("300"), "300", Operator::Ge, true));
        assert!(cell_matches(Some("300"), "300", Operator::Le, true));
        assert!(!cell_matches(Some("300"), "300", Operator::Gt, true));
        assert!(!cell_matches(Some("300"), "300", Operator::Lt, true));
    }
}
