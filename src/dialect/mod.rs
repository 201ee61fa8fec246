//! Dialect adapters.
//!
//! The planner emits engine-neutral SQL; a dialect adapter is the final
//! pass that rewrites engine-specific constructs (function names, array
//! literals, identifier quoting) for the physical backend. Adapters are
//! idempotent and preserve semantics; constructs they do not recognize pass
//! through untouched.

mod duckdb;

use std::fmt;
use std::str::FromStr;

pub use duckdb::DuckDb;

use crate::error::{PlanError, PlanResult};

/// The target engines this build can emit for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Identity adapter; emit the planner's neutral SQL unchanged.
    Generic,
    DuckDb,
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect::Generic
    }
}

/// A dialect-specific SQL rewriter.
pub trait DialectAdapter: fmt::Debug {
    /// Dialect name for display and logging.
    fn name(&self) -> &'static str;

    /// Rewrite `sql` for the target engine. Must be idempotent:
    /// `rewrite(rewrite(sql)) == rewrite(sql)`.
    fn rewrite(&self, sql: &str) -> PlanResult<String>;
}

/// The identity adapter.
#[derive(Debug, Clone, Copy, Default)]
pub struct Generic;

impl DialectAdapter for Generic {
    fn name(&self) -> &'static str {
        "generic"
    }

    fn rewrite(&self, sql: &str) -> PlanResult<String> {
        Ok(sql.to_string())
    }
}

static GENERIC: Generic = Generic;
static DUCKDB: DuckDb = DuckDb;

impl Dialect {
    pub fn adapter(&self) -> &'static dyn DialectAdapter {
        match self {
            Dialect::Generic => &GENERIC,
            Dialect::DuckDb => &DUCKDB,
        }
    }

    pub fn rewrite(&self, sql: &str) -> PlanResult<String> {
        self.adapter().rewrite(sql)
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.adapter().name())
    }
}

impl FromStr for Dialect {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "generic" => Ok(Dialect::Generic),
            "duckdb" => Ok(Dialect::DuckDb),
            other => Err(PlanError::UnsupportedDialect(other.to_string())),
        }
    }
}
