//! Row-set comparator
//!
//! Joins two row sets by natural identifier (first column) and reports every
//! difference as a [`Discrepancy`]:
//!
//! ```text
//! source row, no target match   → Missing
//! both sides, value differs     → Mismatch (one per column)
//! target row, no source match   → Extra
//! ```
//!
//! Output order is source iteration order (Missing/Mismatch, columns in row
//! order) followed by Extra entries in target iteration order, so identical
//! inputs always yield identical output.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use vel_core::{ColumnType, Discrepancy, Row, Value};

/// Comparison settings. The default is exact equality with no coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompareOptions {
    /// Absolute tolerance for float-vs-float comparisons. `None` means exact.
    #[serde(default)]
    pub float_tolerance: Option<f64>,

    /// Declared column types. Values of a declared column are normalized to
    /// the type before comparison, so `1` and `"1"` match in an `int` column.
    #[serde(default)]
    pub column_types: BTreeMap<String, ColumnType>,
}

/// Result of a comparison, with join statistics.
#[derive(Debug, Clone, Default)]
pub struct Comparison {
    pub discrepancies: Vec<Discrepancy>,
    /// Source rows that found a target row with the same identifier.
    pub matched_rows: usize,
    pub source_rows: usize,
    pub target_rows: usize,
}

impl Comparison {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Comparator {
    options: CompareOptions,
}

impl Comparator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompareOptions) -> Self {
        Self { options }
    }

    /// Ordered discrepancies between `source` and `target`.
    pub fn compare<'a, S, T>(&self, source: S, target: T) -> Vec<Discrepancy>
    where
        S: IntoIterator<Item = &'a Row>,
        T: IntoIterator<Item = &'a Row>,
    {
        self.compare_detailed(source, target).discrepancies
    }

    pub fn compare_detailed<'a, S, T>(&self, source: S, target: T) -> Comparison
    where
        S: IntoIterator<Item = &'a Row>,
        T: IntoIterator<Item = &'a Row>,
    {
        let target: Vec<&Row> = target.into_iter().collect();
        let mut index: HashMap<String, &Row> = HashMap::with_capacity(target.len());
        for &row in &target {
            if let Some(key) = self.join_key(row) {
                index.entry(key).or_insert(row);
            }
        }

        let mut out = Comparison {
            target_rows: target.len(),
            ..Comparison::default()
        };
        let mut seen: HashSet<String> = HashSet::new();

        for row in source {
            out.source_rows += 1;
            let (Some(id), Some(key)) = (row.id(), self.join_key(row)) else {
                continue;
            };
            seen.insert(key.clone());

            match index.get(&key) {
                None => out.discrepancies.push(Discrepancy::missing(id.clone())),
                Some(other) => {
                    out.matched_rows += 1;
                    self.diff_columns(id, row, other, &mut out.discrepancies);
                }
            }
        }

        for row in target {
            let (Some(id), Some(key)) = (row.id(), self.join_key(row)) else {
                continue;
            };
            if !seen.contains(&key) {
                out.discrepancies.push(Discrepancy::extra(id.clone()));
            }
        }

        out
    }

    /// Compare the union of both rows' columns, source order first, skipping
    /// the identifier columns.
    fn diff_columns(&self, id: &Value, source: &Row, target: &Row, out: &mut Vec<Discrepancy>) {
        let skip = [source.id_column(), target.id_column()];
        let columns = source
            .column_names()
            .chain(target.column_names().filter(|c| !source.contains(c)))
            .filter(|c| !skip.contains(&Some(*c)));

        for column in columns {
            let left = source.get(column);
            let right = target.get(column);
            if !self.values_equal(column, left, right) {
                out.push(Discrepancy::mismatch(
                    id.clone(),
                    column,
                    left.cloned(),
                    right.cloned(),
                ));
            }
        }
    }

    fn join_key(&self, row: &Row) -> Option<String> {
        let id = row.id()?;
        let declared = row
            .id_column()
            .and_then(|c| self.options.column_types.get(c).copied());
        let key = match declared.and_then(|t| t.normalize(id)) {
            Some(normalized) => normalized.join_key(),
            None => id.join_key(),
        };
        Some(key)
    }

    fn values_equal(&self, column: &str, left: Option<&Value>, right: Option<&Value>) -> bool {
        let (left, right) = match (left, right) {
            (None, None) => return true,
            (Some(l), Some(r)) => (l, r),
            _ => return false,
        };

        if let Some(declared) = self.options.column_types.get(column) {
            if let (Some(l), Some(r)) = (declared.normalize(left), declared.normalize(right)) {
                return self.scalar_equal(&l, &r);
            }
        }
        self.scalar_equal(left, right)
    }

    fn scalar_equal(&self, left: &Value, right: &Value) -> bool {
        match (left, right, self.options.float_tolerance) {
            (Value::Float(l), Value::Float(r), _) if l.is_nan() || r.is_nan() => {
                l.is_nan() && r.is_nan()
            }
            (Value::Float(l), Value::Float(r), Some(tolerance)) => (l - r).abs() <= tolerance,
            (Value::Float(l), Value::Float(r), None) => l == r,
            _ => left == right,
        }
    }
}

/// Exact comparison with default options.
pub fn compare(source: &[Row], target: &[Row]) -> Vec<Discrepancy> {
    Comparator::new().compare(source, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vel_core::DiscrepancyKind;

    fn row(id: i64, amt: i64) -> Row {
        Row::new().with("id", id).with("amt", amt)
    }

    #[test]
    fn test_mismatch_missing_extra() {
        let source = vec![row(1, 10), row(2, 20)];
        let target = vec![row(1, 15), row(3, 5)];

        let diffs = compare(&source, &target);
        assert_eq!(
            diffs,
            vec![
                Discrepancy::mismatch(Value::Int(1), "amt", Some(Value::Int(10)), Some(Value::Int(15))),
                Discrepancy::missing(Value::Int(2)),
                Discrepancy::extra(Value::Int(3)),
            ]
        );
    }

    #[test]
    fn test_identical_inputs_are_clean() {
        let rows = vec![row(1, 10), row(2, 20)];
        let result = Comparator::new().compare_detailed(&rows, &rows);
        assert!(result.is_clean());
        assert_eq!(result.matched_rows, 2);
    }

    #[test]
    fn test_role_swap_symmetry() {
        let a = vec![row(1, 1), row(2, 2), row(4, 4)];
        let b = vec![row(2, 2), row(3, 3), row(5, 5)];

        let ids = |diffs: &[Discrepancy], kind: DiscrepancyKind| -> Vec<Value> {
            diffs.iter().filter(|d| d.kind == kind).map(|d| d.row_id.clone()).collect()
        };
        let ab = compare(&a, &b);
        let ba = compare(&b, &a);

        let mut missing_ab = ids(&ab, DiscrepancyKind::Missing);
        let mut extra_ba = ids(&ba, DiscrepancyKind::Extra);
        let mut extra_ab = ids(&ab, DiscrepancyKind::Extra);
        let mut missing_ba = ids(&ba, DiscrepancyKind::Missing);
        for v in [&mut missing_ab, &mut extra_ba, &mut extra_ab, &mut missing_ba] {
            v.sort_by_key(|id| id.join_key());
        }
        assert_eq!(missing_ab, extra_ba);
        assert_eq!(extra_ab, missing_ba);
    }

    #[test]
    fn test_deterministic() {
        let source: Vec<Row> = (0..50).map(|i| row(i, i % 7)).collect();
        let target: Vec<Row> = (25..75).map(|i| row(i, i % 5)).collect();
        let first = compare(&source, &target);
        for _ in 0..5 {
            assert_eq!(compare(&source, &target), first);
        }
    }

    #[test]
    fn test_no_implicit_coercion() {
        let source = vec![Row::new().with("id", 1).with("code", 1)];
        let target = vec![Row::new().with("id", 1).with("code", "1")];
        let diffs = compare(&source, &target);
        assert_eq!(diffs.len(), 1);
        assert_eq!(diffs[0].column.as_deref(), Some("code"));
    }

    #[test]
    fn test_declared_type_normalizes() {
        let mut options = CompareOptions::default();
        options.column_types.insert("code".to_string(), ColumnType::Int);
        options.column_types.insert("id".to_string(), ColumnType::Int);

        let source = vec![Row::new().with("id", 1).with("code", 1)];
        let target = vec![Row::new().with("id", "1").with("code", "1")];
        let diffs = Comparator::with_options(options).compare(&source, &target);
        assert!(diffs.is_empty(), "unexpected: {:?}", diffs);
    }

    #[test]
    fn test_float_tolerance_is_opt_in() {
        let source = vec![Row::new().with("id", 1).with("x", 1.0)];
        let target = vec![Row::new().with("id", 1).with("x", 1.0004)];
        assert_eq!(compare(&source, &target).len(), 1);

        let options = CompareOptions {
            float_tolerance: Some(0.001),
            ..CompareOptions::default()
        };
        assert!(Comparator::with_options(options).compare(&source, &target).is_empty());
    }

    #[test]
    fn test_nan_and_signed_zero_are_stable() {
        let source = vec![
            Row::new().with("id", 1).with("x", f64::NAN),
            Row::new().with("id", 0.0).with("x", 2.0),
        ];
        let target = vec![
            Row::new().with("id", 1).with("x", f64::NAN),
            Row::new().with("id", -0.0).with("x", 2.0),
        ];
        assert!(compare(&source, &target).is_empty());

        let tolerant = Comparator::with_options(CompareOptions {
            float_tolerance: Some(0.1),
            ..CompareOptions::default()
        });
        assert!(tolerant.compare(&source, &target).is_empty());

        let real = vec![Row::new().with("id", 1).with("x", 1.0)];
        assert_eq!(compare(&source[..1], &real).len(), 1);
    }

    #[test]
    fn test_column_presence_differences() {
        let source = vec![Row::new().with("id", 1).with("a", 1).with("b", Value::Null)];
        let target = vec![Row::new().with("id", 1).with("c", 3).with("a", 1)];
        let diffs = compare(&source, &target);

        let columns: Vec<_> = diffs.iter().filter_map(|d| d.column.as_deref()).collect();
        assert_eq!(columns, vec!["b", "c"]);
        assert_eq!(diffs[0].source_value, Some(Value::Null));
        assert_eq!(diffs[0].target_value, None);
        assert_eq!(diffs[1].source_value, None);
        assert_eq!(diffs[1].target_value, Some(Value::Int(3)));
    }

    #[test]
    fn test_duplicate_target_ids_use_first_row() {
        let source = vec![row(1, 10)];
        let target = vec![row(1, 10), row(1, 99)];
        assert!(compare(&source, &target).is_empty());
    }

    #[test]
    fn test_empty_rows_are_ignored() {
        let source = vec![Row::new(), row(1, 1)];
        let target = vec![row(1, 1), Row::new()];
        let result = Comparator::new().compare_detailed(&source, &target);
        assert!(result.is_clean());
        assert_eq!(result.source_rows, 2);
    }
}
