//! Reference schema checks
//!
//! A reference schema is taken from a row of a known-good table version: its
//! column names in order and the type of each non-null value. Rows checked
//! against it must carry every reference column with a compatible type.

use crate::rules::Violation;
use vel_core::{ColumnType, Row};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceSchema {
    columns: Vec<(String, Option<ColumnType>)>,
}

impl ReferenceSchema {
    /// Schema of `row`. Null cells carry no type and accept any value.
    pub fn from_row(row: &Row) -> Self {
        Self {
            columns: row
                .iter()
                .map(|(name, value)| (name.to_string(), value.column_type()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Structural violations of `row`, in reference column order.
    pub fn check(&self, row: &Row) -> Vec<Violation> {
        let mut violations = Vec::new();
        for (name, expected) in &self.columns {
            let Some(value) = row.get(name) else {
                violations.push(Violation::new(name, None, "column missing from reference schema"));
                continue;
            };
            let (Some(expected), Some(found)) = (expected, value.column_type()) else {
                continue;
            };
            if !compatible(*expected, found) {
                violations.push(Violation::new(
                    name,
                    Some(value),
                    format!("expected {}, found {}", expected.name(), found.name()),
                ));
            }
        }
        violations
    }
}

/// Integers are accepted where the reference holds a float.
fn compatible(expected: ColumnType, found: ColumnType) -> bool {
    expected == found || (expected == ColumnType::Float && found == ColumnType::Int)
}
