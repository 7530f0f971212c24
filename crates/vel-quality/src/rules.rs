//! Row validation rules
//!
//! A [`RuleSet`] is an ordered list of per-row checks. Rules are plain data
//! (serde-tagged), so deployments can replace the default transcript rules
//! from configuration.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use thiserror::Error;
use vel_core::{Row, Value};

static LANGUAGE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z]{2}(-[A-Z]{2})?$").unwrap());

/// Tones a transcript row may carry.
pub const KNOWN_TONES: &[&str] = &[
    "positive",
    "enthusiastic",
    "neutral",
    "mixed",
    "concerned",
    "frustrated",
    "negative",
];

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("RULE/invalid pattern for column '{column}': {source}")]
    InvalidPattern {
        column: String,
        #[source]
        source: regex::Error,
    },
}

/// A single per-row check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum Rule {
    /// Column must be present and not null.
    Required { column: String },
    /// If present, column must not be null, blank text or `[]`.
    NonEmpty { column: String },
    /// If present and not null, column must be numeric within bounds.
    Range {
        column: String,
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    /// If present and not null, column must be one of `values` (case-insensitive).
    OneOf { column: String, values: Vec<String> },
    /// If present and not null, column must be text matching `pattern`.
    Pattern { column: String, pattern: String },
    /// When both are present, `before` must not be greater than `after`.
    Ordered { before: String, after: String },
}

impl Rule {
    pub fn required(column: impl Into<String>) -> Self {
        Rule::Required { column: column.into() }
    }

    pub fn non_empty(column: impl Into<String>) -> Self {
        Rule::NonEmpty { column: column.into() }
    }

    pub fn range(column: impl Into<String>, min: Option<f64>, max: Option<f64>) -> Self {
        Rule::Range {
            column: column.into(),
            min,
            max,
        }
    }

    pub fn one_of(column: impl Into<String>, values: &[&str]) -> Self {
        Rule::OneOf {
            column: column.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn pattern(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Rule::Pattern {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    pub fn ordered(before: impl Into<String>, after: impl Into<String>) -> Self {
        Rule::Ordered {
            before: before.into(),
            after: after.into(),
        }
    }

    /// Column a violation of this rule is reported against.
    pub fn column(&self) -> &str {
        match self {
            Rule::Required { column }
            | Rule::NonEmpty { column }
            | Rule::Range { column, .. }
            | Rule::OneOf { column, .. }
            | Rule::Pattern { column, .. } => column,
            Rule::Ordered { after, .. } => after,
        }
    }
}

/// A failed check on one row.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub column: String,
    /// Offending value, `None` when the column is absent.
    pub value: Option<Value>,
    pub message: String,
}

impl Violation {
    pub fn new(column: impl Into<String>, value: Option<&Value>, message: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.cloned(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    rule: Rule,
    regex: Option<Regex>,
}

/// Ordered, compiled collection of rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
}

impl RuleSet {
    /// Compile `rules`; fails on an invalid `Pattern`.
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleError> {
        let rules = rules
            .into_iter()
            .map(|rule| {
                let regex = match &rule {
                    Rule::Pattern { column, pattern } => {
                        Some(Regex::new(pattern).map_err(|source| RuleError::InvalidPattern {
                            column: column.clone(),
                            source,
                        })?)
                    }
                    _ => None,
                };
                Ok(CompiledRule { rule, regex })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        Ok(Self { rules })
    }

    /// Default checks for generated transcript rows.
    pub fn transcript_defaults() -> Self {
        let plain = |rule: Rule| CompiledRule { rule, regex: None };
        Self {
            rules: vec![
                plain(Rule::required("conversation_id")),
                plain(Rule::required("raw_transcript")),
                plain(Rule::required("recording_start")),
                plain(Rule::required("recording_end")),
                plain(Rule::non_empty("raw_transcript")),
                plain(Rule::range("duration_minutes", Some(0.0), Some(600.0))),
                plain(Rule::one_of("creator_tone", KNOWN_TONES)),
                CompiledRule {
                    rule: Rule::pattern("language_code", LANGUAGE_CODE.as_str()),
                    regex: Some(LANGUAGE_CODE.clone()),
                },
                plain(Rule::ordered("recording_start", "recording_end")),
            ],
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Every violation of every rule on `row`, in rule order.
    pub fn check(&self, row: &Row) -> Vec<Violation> {
        self.rules
            .iter()
            .filter_map(|compiled| check_rule(compiled, row))
            .collect()
    }
}

fn check_rule(compiled: &CompiledRule, row: &Row) -> Option<Violation> {
    match &compiled.rule {
        Rule::Required { column } => match row.get(column) {
            None => Some(Violation::new(column, None, "required column is missing")),
            Some(v) if v.is_null() => Some(Violation::new(column, Some(v), "required column is null")),
            Some(_) => None,
        },
        Rule::NonEmpty { column } => {
            let value = row.get(column)?;
            let empty = match value {
                Value::Null => true,
                Value::Text(s) => s.trim().is_empty() || s.trim() == "[]",
                _ => false,
            };
            empty.then(|| Violation::new(column, Some(value), "value is empty"))
        }
        Rule::Range { column, min, max } => {
            let value = row.get_present(column)?;
            let Some(n) = value.as_f64() else {
                return Some(Violation::new(
                    column,
                    Some(value),
                    format!("expected a number, found {}", value.type_name()),
                ));
            };
            let below = min.map_or(false, |m| n < m);
            let above = max.map_or(false, |m| n > m);
            (below || above).then(|| {
                Violation::new(
                    column,
                    Some(value),
                    format!("{} outside range [{}, {}]", n, bound(*min), bound(*max)),
                )
            })
        }
        Rule::OneOf { column, values } => {
            let value = row.get_present(column)?;
            let allowed = value
                .as_str()
                .map(|s| values.iter().any(|v| v.eq_ignore_ascii_case(s.trim())))
                .unwrap_or(false);
            (!allowed).then(|| {
                Violation::new(
                    column,
                    Some(value),
                    format!("expected one of {}", values.join(", ")),
                )
            })
        }
        Rule::Pattern { column, pattern } => {
            let value = row.get_present(column)?;
            let matched = match (&compiled.regex, value.as_str()) {
                (Some(re), Some(s)) => re.is_match(s),
                _ => false,
            };
            (!matched).then(|| {
                Violation::new(column, Some(value), format!("does not match /{}/", pattern))
            })
        }
        Rule::Ordered { before, after } => {
            let first = row.get_present(before)?;
            let second = row.get_present(after)?;
            match order(first, second) {
                Some(Ordering::Greater) => Some(Violation::new(
                    after,
                    Some(second),
                    format!("must not precede {}", before),
                )),
                Some(_) => None,
                None => Some(Violation::new(
                    after,
                    Some(second),
                    format!("not comparable with {}", before),
                )),
            }
        }
    }
}

fn bound(b: Option<f64>) -> String {
    b.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

/// Order two values: numbers numerically, timestamps chronologically, other
/// text lexically.
fn order(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Some(x), Some(y)) = (a.as_f64(), b.as_f64()) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (a.as_timestamp(), b.as_timestamp()) {
        return Some(x.cmp(&y));
    }
    Some(a.as_str()?.cmp(b.as_str()?))
}
