//! VEL Quality: row comparison and validation
//!
//! Used by the validator stages.
//!
//! # Example
//!
//! ```
//! use vel_core::{Row, DiscrepancyKind};
//! use vel_quality::Comparator;
//!
//! let production = vec![Row::new().with("id", 1).with("amt", 10)];
//! let shadow = vec![Row::new().with("id", 1).with("amt", 15)];
//!
//! let diffs = Comparator::new().compare(&production, &shadow);
//! assert_eq!(diffs.len(), 1);
//! assert_eq!(diffs[0].kind, DiscrepancyKind::Mismatch);
//! ```

pub mod comparator;
pub mod rules;
pub mod schema;

pub use comparator::{compare, CompareOptions, Comparator, Comparison};
pub use rules::{Rule, RuleError, RuleSet, Violation, KNOWN_TONES};
pub use schema::ReferenceSchema;
