//! # Strata
//!
//! A semantic SQL planner. Clients write ordinary SQL against a logical
//! catalog of models, metrics and views - the **manifest** - and Strata
//! rewrites each referenced logical relation into a common table expression
//! implementing its semantics, producing SQL any standard engine can run.
//!
//! ## Quick start
//!
//! ```
//! use strata::manifest::{Column, Manifest, Model};
//! use strata::mdl::{AnalysisMode, AnalyzedManifest, SessionProperties};
//! use strata::{plan, SessionContext};
//!
//! let manifest = Manifest::builder("memory", "tpch")
//!     .model(Model::with_ref_sql(
//!         "Orders",
//!         "select * from tpch.orders",
//!         vec![
//!             Column::physical("orderkey", "INTEGER"),
//!             Column::physical("totalprice", "INTEGER"),
//!         ],
//!         Some("orderkey"),
//!     ))
//!     .build();
//!
//! let analyzed = AnalyzedManifest::analyze(
//!     manifest,
//!     SessionProperties::new(),
//!     AnalysisMode::Full,
//! )
//! .unwrap();
//!
//! let sql = plan(
//!     "SELECT orderkey FROM Orders LIMIT 200",
//!     &SessionContext::new(),
//!     &analyzed,
//! )
//! .unwrap();
//! assert!(sql.starts_with("WITH \"Orders\" AS ("));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! incoming SQL
//!     |  analyzer          referenced objects, collected columns, scopes
//!     v
//!  lineage            required base columns per object (on demand)
//!     |
//!     v
//!  descriptor         one CTE specification per referenced object
//!     |
//!     v
//!  rewrite            dependency-ordered WITH clause, reference rewriting
//!     |
//!     v
//!  dialect            engine-specific final pass
//! ```
//!
//! The planner is synchronous and stateless per request. An
//! [`mdl::AnalyzedManifest`] is built once per manifest (memoized, see
//! [`cache`]) and shared read-only across threads.

pub mod analyzer;
pub mod cache;
pub mod descriptor;
pub mod dialect;
pub mod error;
pub mod lineage;
pub mod manifest;
pub mod mdl;
pub mod plan;
pub mod rewrite;
pub mod session;
pub mod sql;
pub mod validation;

pub use dialect::Dialect;
pub use error::{ErrorCode, PlanError, PlanResult, WireError};
pub use plan::{dry_plan, dry_run, plan, OutputColumn};
pub use session::SessionContext;
pub use validation::{validate, ValidationResult, ValidationRule, ValidationStatus};

/// Re-exports for convenient embedding.
pub mod prelude {
    pub use crate::dialect::Dialect;
    pub use crate::error::{ErrorCode, PlanError, PlanResult};
    pub use crate::lineage::QualifiedColumn;
    pub use crate::manifest::{
        Column, CumulativeMetric, JoinType, Manifest, Metric, Model, Relationship, TimeUnit, View,
    };
    pub use crate::mdl::{AnalysisMode, AnalyzedManifest, SessionProperties};
    pub use crate::plan::{dry_plan, dry_run, plan, OutputColumn};
    pub use crate::session::SessionContext;
    pub use crate::validation::{validate, ValidationResult, ValidationRule, ValidationStatus};
}
