//! Constraint expression evaluator
//!
//! A small template-based boolean expression language with a fixed predicate
//! library. Constraint text is data, not code: the predicate names, arities,
//! and coercion rules here are a compatibility contract with existing policy
//! text and must not drift.
//!
//! Text is a sequence of literals and `{{ expression }}` actions; text with
//! no delimiters is auto-wrapped as one boolean expression. The rendered
//! output is trimmed, and a match is exactly the literal `true`. Missing
//! context keys evaluate as empty/zero rather than erroring.

pub mod evaluator;
pub mod functions;
pub mod parser;
pub mod value;

pub use evaluator::Evaluator;
pub use parser::{parse_template, Expr, ParseError, Segment, Template};
pub use value::Value;
