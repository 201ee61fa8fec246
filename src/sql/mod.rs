//! SQL parsing substrate.
//!
//! Incoming statements and calculated-field expressions share one AST: the
//! `sqlparser` AST parsed under the generic dialect. Generated SQL fragments
//! are produced as text and re-parsed when they must be spliced into a
//! statement, so the planner never assembles large AST nodes by hand.

pub mod ident;
pub mod visitor;

use sqlparser::ast::{Expr, Statement};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::error::{excerpt, PlanError, PlanResult};

/// Upper bound on input SQL (1 MiB).
pub const MAX_SQL_BYTES: usize = 1024 * 1024;

/// Parse exactly one SQL statement, enforcing the input bound.
pub fn parse_statement(sql: &str) -> PlanResult<Statement> {
    if sql.len() > MAX_SQL_BYTES {
        return Err(PlanError::InputTooLarge(format!(
            "SQL is {} bytes, limit is {}",
            sql.len(),
            MAX_SQL_BYTES
        )));
    }
    let mut statements = Parser::parse_sql(&GenericDialect {}, sql)
        .map_err(|e| PlanError::Parse(format!("{} in: {}", e, excerpt(sql))))?;
    match statements.len() {
        1 => Ok(statements.remove(0)),
        0 => Err(PlanError::Parse("empty statement".into())),
        n => Err(PlanError::Parse(format!(
            "expected a single statement, got {}",
            n
        ))),
    }
}

/// Parse a calculated-field or join-condition expression.
pub fn parse_expression(expr: &str) -> PlanResult<Expr> {
    Parser::new(&GenericDialect {})
        .try_with_sql(expr)
        .and_then(|mut parser| parser.parse_expr())
        .map_err(|e| PlanError::Parse(format!("{} in expression: {}", e, excerpt(expr))))
}

/// Aggregate functions of the calculated-field language. Traversal does not
/// stop below these; they matter for to-one/to-many classification and for
/// `count(*)` handling.
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "array_agg",
    "avg",
    "bool_and",
    "bool_or",
    "count",
    "count_if",
    "max",
    "min",
    "stddev",
    "stddev_pop",
    "stddev_samp",
    "sum",
    "var_pop",
    "var_samp",
    "variance",
];

/// Is `name` an aggregate function of the calculated-field language?
pub fn is_aggregate_function(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    AGGREGATE_FUNCTIONS.binary_search(&lower.as_str()).is_ok()
}
