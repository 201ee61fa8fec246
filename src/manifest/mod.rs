//! Typed manifest model.
//!
//! The manifest is the declarative description of the logical catalog: its
//! models, metrics, cumulative metrics, views, relationships, enums and
//! macros. It deserializes from a lowerCamelCase JSON document (unknown
//! fields rejected) and is immutable once analyzed.
//!
//! # Programmatic construction
//!
//! ```
//! use strata::manifest::{Column, Manifest, Model};
//!
//! let manifest = Manifest::builder("memory", "tpch")
//!     .model(Model::with_ref_sql(
//!         "Orders",
//!         "select * from tpch.orders",
//!         vec![
//!             Column::physical("orderkey", "INTEGER"),
//!             Column::physical("custkey", "INTEGER"),
//!         ],
//!         Some("orderkey"),
//!     ))
//!     .build();
//! assert!(manifest.validate().is_ok());
//! ```

pub mod metric;
pub mod model;
pub mod relationship;
pub mod view;

use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};

pub use metric::{CumulativeMetric, DateSpine, Measure, Metric, TimeUnit, Window};
pub use model::{Column, ColumnKind, Model, ModelOrigin, TableReference};
pub use relationship::{JoinType, Relationship};
pub use view::{EnumDefinition, EnumValue, Macro, Parameter, ParameterType, View};

/// Upper bound on the serialized manifest (16 MiB).
pub const MAX_MANIFEST_BYTES: usize = 16 * 1024 * 1024;

/// The logical catalog consumed by the planner.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Manifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<Model>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cumulative_metrics: Vec<CumulativeMetric>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub views: Vec<View>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub enum_definitions: Vec<EnumDefinition>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub macros: Vec<Macro>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_spine: Option<DateSpine>,
}

impl Manifest {
    /// Parse a manifest from its JSON wire form, enforcing the size bound.
    pub fn from_json(json: &str) -> PlanResult<Self> {
        if json.len() > MAX_MANIFEST_BYTES {
            return Err(PlanError::InputTooLarge(format!(
                "manifest JSON is {} bytes, limit is {}",
                json.len(),
                MAX_MANIFEST_BYTES
            )));
        }
        serde_json::from_str(json)
            .map_err(|e| PlanError::manifest_invalid(format!("malformed manifest JSON: {}", e)))
    }

    pub fn builder(catalog: impl Into<String>, schema: impl Into<String>) -> ManifestBuilder {
        ManifestBuilder {
            manifest: Manifest {
                catalog: Some(catalog.into()),
                schema: Some(schema.into()),
                ..Manifest::default()
            },
        }
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.iter().find(|m| m.name == name)
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.name == name)
    }

    pub fn cumulative_metric(&self, name: &str) -> Option<&CumulativeMetric> {
        self.cumulative_metrics.iter().find(|m| m.name == name)
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.iter().find(|v| v.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// Is `name` a model, metric, cumulative metric or view?
    pub fn is_object(&self, name: &str) -> bool {
        self.model(name).is_some()
            || self.metric(name).is_some()
            || self.cumulative_metric(name).is_some()
            || self.view(name).is_some()
    }

    /// The spine cumulative metrics densify against.
    pub fn date_spine(&self) -> DateSpine {
        self.date_spine.clone().unwrap_or_default()
    }

    /// Check the construction-time invariants: unique names, resolvable
    /// references, exactly one origin per model, well-formed windows.
    /// Calculated-field acyclicity is deliberately *not* checked here; it is
    /// detected lazily during lineage traversal.
    pub fn validate(&self) -> PlanResult<()> {
        self.check_unique_names()?;
        for (i, model) in self.models.iter().enumerate() {
            self.check_model(model, i)?;
        }
        for (i, metric) in self.metrics.iter().enumerate() {
            self.check_metric(metric, i)?;
        }
        for (i, cm) in self.cumulative_metrics.iter().enumerate() {
            self.check_cumulative_metric(cm, i)?;
        }
        for (i, rel) in self.relationships.iter().enumerate() {
            self.check_relationship(rel, i)?;
        }
        for (i, mac) in self.macros.iter().enumerate() {
            mac.parameters()
                .map_err(|msg| PlanError::manifest_invalid_at(msg, format!("macros[{}]", i)))?;
        }
        Ok(())
    }

    fn check_unique_names(&self) -> PlanResult<()> {
        let mut seen = BTreeSet::new();
        let objects = self
            .models
            .iter()
            .map(|m| ("model", m.name.as_str()))
            .chain(self.metrics.iter().map(|m| ("metric", m.name.as_str())))
            .chain(
                self.cumulative_metrics
                    .iter()
                    .map(|m| ("cumulative metric", m.name.as_str())),
            )
            .chain(self.views.iter().map(|v| ("view", v.name.as_str())));
        for (kind, name) in objects {
            if !seen.insert(name) {
                return Err(PlanError::manifest_invalid(format!(
                    "duplicate {} name: '{}'",
                    kind, name
                )));
            }
        }

        let mut rel_names = BTreeSet::new();
        for rel in &self.relationships {
            if !rel_names.insert(rel.name.as_str()) {
                return Err(PlanError::manifest_invalid(format!(
                    "duplicate relationship name: '{}'",
                    rel.name
                )));
            }
        }
        Ok(())
    }

    fn check_model(&self, model: &Model, index: usize) -> PlanResult<()> {
        let path = format!("models[{}]", index);
        match model.origin() {
            Some(ModelOrigin::BaseObject(base)) => {
                if self.model(base).is_none()
                    && self.metric(base).is_none()
                    && self.cumulative_metric(base).is_none()
                {
                    return Err(PlanError::manifest_invalid_at(
                        format!("model '{}' baseObject '{}' does not resolve", model.name, base),
                        path,
                    ));
                }
            }
            Some(_) => {}
            None => {
                return Err(PlanError::manifest_invalid_at(
                    format!(
                        "model '{}' must declare exactly one of refSql, baseObject, tableReference",
                        model.name
                    ),
                    path,
                ));
            }
        }

        if let Some(pk) = &model.primary_key {
            if model.column(pk).is_none() {
                return Err(PlanError::manifest_invalid_at(
                    format!("model '{}' primaryKey '{}' is not a column", model.name, pk),
                    path,
                ));
            }
        }

        for (j, column) in model.columns.iter().enumerate() {
            let col_path = format!("{}.columns[{}]", path, j);
            match column.kind() {
                ColumnKind::Relationship => {
                    let rel_name = column.relationship.as_deref().unwrap_or_default();
                    let rel = self.relationship(rel_name).ok_or_else(|| {
                        PlanError::manifest_invalid_at(
                            format!(
                                "column '{}.{}' references unknown relationship '{}'",
                                model.name, column.name, rel_name
                            ),
                            col_path.clone(),
                        )
                    })?;
                    if self.model(&column.r#type).is_none() {
                        return Err(PlanError::manifest_invalid_at(
                            format!(
                                "column '{}.{}' targets unknown model '{}'",
                                model.name, column.name, column.r#type
                            ),
                            col_path,
                        ));
                    }
                    if rel.other_side(&model.name).is_none() {
                        return Err(PlanError::manifest_invalid_at(
                            format!(
                                "relationship '{}' does not connect model '{}'",
                                rel.name, model.name
                            ),
                            col_path,
                        ));
                    }
                }
                ColumnKind::Calculated => {
                    if column.expression.is_none() {
                        return Err(PlanError::manifest_invalid_at(
                            format!(
                                "calculated column '{}.{}' is missing an expression",
                                model.name, column.name
                            ),
                            col_path,
                        ));
                    }
                }
                ColumnKind::Physical => {}
            }
        }
        Ok(())
    }

    fn check_metric(&self, metric: &Metric, index: usize) -> PlanResult<()> {
        let path = format!("metrics[{}]", index);
        if !self.is_base_object(&metric.base_object) {
            return Err(PlanError::manifest_invalid_at(
                format!(
                    "metric '{}' baseObject '{}' does not resolve",
                    metric.name, metric.base_object
                ),
                path,
            ));
        }
        let mut names = BTreeSet::new();
        for column in metric.dimensions.iter().chain(metric.measures.iter()) {
            if !names.insert(column.name.as_str()) {
                return Err(PlanError::manifest_invalid_at(
                    format!(
                        "metric '{}' declares column '{}' more than once",
                        metric.name, column.name
                    ),
                    path,
                ));
            }
        }
        Ok(())
    }

    fn check_cumulative_metric(&self, cm: &CumulativeMetric, index: usize) -> PlanResult<()> {
        let path = format!("cumulativeMetrics[{}]", index);
        if !self.is_base_object(&cm.base_object) {
            return Err(PlanError::manifest_invalid_at(
                format!(
                    "cumulative metric '{}' baseObject '{}' does not resolve",
                    cm.name, cm.base_object
                ),
                path,
            ));
        }
        let (start, end) = match (cm.window.start_date(), cm.window.end_date()) {
            (Some(start), Some(end)) => (start, end),
            _ => {
                return Err(PlanError::manifest_invalid_at(
                    format!(
                        "cumulative metric '{}' window bounds must be ISO dates, got '{}'..'{}'",
                        cm.name, cm.window.start, cm.window.end
                    ),
                    path,
                ));
            }
        };
        if start > end {
            return Err(PlanError::manifest_invalid_at(
                format!(
                    "cumulative metric '{}' window start {} is after end {}",
                    cm.name, cm.window.start, cm.window.end
                ),
                path,
            ));
        }
        Ok(())
    }

    fn check_relationship(&self, rel: &Relationship, index: usize) -> PlanResult<()> {
        let path = format!("relationships[{}]", index);
        if rel.models.len() != 2 {
            return Err(PlanError::manifest_invalid_at(
                format!(
                    "relationship '{}' must connect exactly two models, got {}",
                    rel.name,
                    rel.models.len()
                ),
                path,
            ));
        }
        for endpoint in &rel.models {
            if self.model(endpoint).is_none() {
                return Err(PlanError::manifest_invalid_at(
                    format!(
                        "relationship '{}' endpoint '{}' does not resolve",
                        rel.name, endpoint
                    ),
                    path,
                ));
            }
        }
        Ok(())
    }

    fn is_base_object(&self, name: &str) -> bool {
        self.model(name).is_some()
            || self.metric(name).is_some()
            || self.cumulative_metric(name).is_some()
    }

    /// Structural content hash, stable across processes.
    ///
    /// Hashes the canonical JSON serialization so that any definitional
    /// change produces a different key.
    pub fn content_hash(&self) -> u64 {
        let json = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = DefaultHasher::new();
        json.hash(&mut hasher);
        hasher.finish()
    }
}

/// Fluent construction helper used by tests and embedders.
pub struct ManifestBuilder {
    manifest: Manifest,
}

impl ManifestBuilder {
    pub fn model(mut self, model: Model) -> Self {
        self.manifest.models.push(model);
        self
    }

    pub fn metric(mut self, metric: Metric) -> Self {
        self.manifest.metrics.push(metric);
        self
    }

    pub fn cumulative_metric(mut self, cm: CumulativeMetric) -> Self {
        self.manifest.cumulative_metrics.push(cm);
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.manifest.views.push(view);
        self
    }

    pub fn relationship(mut self, relationship: Relationship) -> Self {
        self.manifest.relationships.push(relationship);
        self
    }

    pub fn enum_definition(mut self, def: EnumDefinition) -> Self {
        self.manifest.enum_definitions.push(def);
        self
    }

    pub fn macro_def(mut self, mac: Macro) -> Self {
        self.manifest.macros.push(mac);
        self
    }

    pub fn date_spine(mut self, spine: DateSpine) -> Self {
        self.manifest.date_spine = Some(spine);
        self
    }

    pub fn build(self) -> Manifest {
        self.manifest
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn orders() -> Model {
        Model::with_ref_sql(
            "Orders",
            "select * from tpch.orders",
            vec![
                Column::physical("orderkey", "INTEGER"),
                Column::physical("custkey", "INTEGER"),
                Column::physical("totalprice", "INTEGER"),
            ],
            Some("orderkey"),
        )
    }

    fn customer() -> Model {
        Model::with_ref_sql(
            "Customer",
            "select * from tpch.customer",
            vec![
                Column::physical("custkey", "INTEGER"),
                Column::physical("name", "VARCHAR"),
            ],
            Some("custkey"),
        )
    }

    fn sample() -> Manifest {
        Manifest::builder("memory", "tpch")
            .model(orders())
            .model(customer())
            .relationship(Relationship::new(
                "OrdersCustomer",
                vec!["Orders", "Customer"],
                JoinType::ManyToOne,
                "Orders.custkey = Customer.custkey",
            ))
            .build()
    }

    #[test]
    fn test_validate_ok() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let manifest = Manifest::builder("memory", "tpch")
            .model(orders())
            .model(orders())
            .build();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate model name: 'Orders'"));
    }

    #[test]
    fn test_duplicate_across_kinds_rejected() {
        let manifest = Manifest::builder("memory", "tpch")
            .model(orders())
            .view(View::new("Orders", "SELECT 1"))
            .build();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_origin_violation_rejected() {
        let mut model = orders();
        model.base_object = Some("Customer".into());
        let manifest = Manifest::builder("memory", "tpch")
            .model(model)
            .model(customer())
            .build();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("exactly one of"));
    }

    #[test]
    fn test_unknown_base_object_rejected() {
        let model = Model::with_base_object("OnOrders", "Ghost", vec![], None);
        let manifest = Manifest::builder("memory", "tpch").model(model).build();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_unknown_relationship_rejected() {
        let mut model = orders();
        model
            .columns
            .push(Column::relationship("customer", "Customer", "Ghost"));
        let manifest = Manifest::builder("memory", "tpch")
            .model(model)
            .model(customer())
            .build();
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_window_bounds_checked() {
        let cm = CumulativeMetric {
            name: "Weekly".into(),
            base_object: "Orders".into(),
            measure: Measure {
                name: "total".into(),
                r#type: "BIGINT".into(),
                operator: "sum".into(),
                ref_column: "totalprice".into(),
            },
            window: Window {
                name: "w".into(),
                ref_column: "orderdate".into(),
                time_unit: TimeUnit::Week,
                start: "1995-01-01".into(),
                end: "1994-01-01".into(),
            },
            cached: false,
            refresh_time: None,
        };
        let manifest = Manifest::builder("memory", "tpch")
            .model(orders())
            .cumulative_metric(cm)
            .build();
        let err = manifest.validate().unwrap_err();
        assert!(err.to_string().contains("after end"));
    }

    #[test]
    fn test_from_json_rejects_unknown_fields() {
        let json = r#"{"catalog":"memory","schema":"tpch","surprise":true}"#;
        assert!(Manifest::from_json(json).is_err());
    }

    #[test]
    fn test_from_json_size_bound() {
        let oversized = format!(
                "{{\"catalog\":\"memory\",\"schema\":\"{}\"}}",
                "x".repeat(MAX_MANIFEST_BYTES)
        );
        let err = Manifest::from_json(&oversized).unwrap_err();
        assert!(matches!(err, PlanError::InputTooLarge(_)));
    }

    #[test]
    fn test_content_hash_changes_with_content() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a.content_hash(), b.content_hash());
        b.models[0].columns.push(Column::physical("clerk", "VARCHAR"));
        assert_ne!(a.content_hash(), b.content_hash());
    }

    #[test]
    fn test_wire_round_trip() {
        let manifest = sample();
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(!json.contains("cumulative_metrics"), "wire form is camelCase");
        let back = Manifest::from_json(&json).unwrap();
        assert_eq!(back, manifest);
    }
}
