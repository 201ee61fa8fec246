//! The analyzed manifest: a validated manifest plus its derived lineage and
//! name indexes, shared read-only across concurrent planning operations.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::cache;
use crate::error::PlanResult;
use crate::lineage::Lineage;
use crate::manifest::{
    CumulativeMetric, EnumDefinition, Macro, Manifest, Metric, Model, Relationship, View,
};

/// Analysis mode, part of the memoization key.
///
/// `ModelingOnly` backs `dry_plan(modeling_only = true)`: planning runs the
/// same pipeline but skips the dialect adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisMode {
    Full,
    ModelingOnly,
}

/// Free-form session properties carried into analysis. Keys are sorted so
/// the structural hash is stable.
pub type SessionProperties = BTreeMap<String, Option<String>>;

/// A manifest that passed validation, with O(1) name lookups and the
/// lineage graph attached. Immutable; carries no interior mutability.
pub struct AnalyzedManifest {
    manifest: Arc<Manifest>,
    lineage: Arc<Lineage>,
    properties: SessionProperties,
    mode: AnalysisMode,
    models: HashMap<String, usize>,
    metrics: HashMap<String, usize>,
    cumulative_metrics: HashMap<String, usize>,
    views: HashMap<String, usize>,
    relationships: HashMap<String, usize>,
    enum_definitions: HashMap<String, usize>,
    macros: HashMap<String, usize>,
}

impl AnalyzedManifest {
    /// Analyze a manifest, memoized on `(manifest hash, properties, mode)`.
    ///
    /// Total: returns either an analyzed manifest satisfying every
    /// invariant or the specific violation. Duplicate concurrent
    /// computations are possible; the cached value is last-write-wins.
    pub fn analyze(
        manifest: Manifest,
        properties: SessionProperties,
        mode: AnalysisMode,
    ) -> PlanResult<Arc<AnalyzedManifest>> {
        cache::compute_analyzed_cached(manifest, properties, mode)
    }

    pub(crate) fn analyze_uncached(
        manifest: Arc<Manifest>,
        properties: SessionProperties,
        mode: AnalysisMode,
    ) -> PlanResult<AnalyzedManifest> {
        manifest.validate()?;
        let lineage = cache::compute_lineage_cached(&manifest)?;

        fn index<T>(items: &[T], name: impl Fn(&T) -> &str) -> HashMap<String, usize> {
            items
                .iter()
                .enumerate()
                .map(|(i, item)| (name(item).to_string(), i))
                .collect()
        }

        Ok(AnalyzedManifest {
            models: index(&manifest.models, |m: &Model| &m.name),
            metrics: index(&manifest.metrics, |m: &Metric| &m.name),
            cumulative_metrics: index(&manifest.cumulative_metrics, |m: &CumulativeMetric| {
                &m.name
            }),
            views: index(&manifest.views, |v: &View| &v.name),
            relationships: index(&manifest.relationships, |r: &Relationship| &r.name),
            enum_definitions: index(&manifest.enum_definitions, |e: &EnumDefinition| &e.name),
            macros: index(&manifest.macros, |m: &Macro| &m.name),
            manifest,
            lineage,
            properties,
            mode,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn lineage(&self) -> &Lineage {
        &self.lineage
    }

    pub fn properties(&self) -> &SessionProperties {
        &self.properties
    }

    pub fn mode(&self) -> AnalysisMode {
        self.mode
    }

    /// The implicit qualifying prefix of manifest object references.
    pub fn catalog_schema_prefix(&self) -> (Option<&str>, Option<&str>) {
        (
            self.manifest.catalog.as_deref(),
            self.manifest.schema.as_deref(),
        )
    }

    pub fn model(&self, name: &str) -> Option<&Model> {
        self.models.get(name).map(|&i| &self.manifest.models[i])
    }

    pub fn metric(&self, name: &str) -> Option<&Metric> {
        self.metrics.get(name).map(|&i| &self.manifest.metrics[i])
    }

    pub fn cumulative_metric(&self, name: &str) -> Option<&CumulativeMetric> {
        self.cumulative_metrics
            .get(name)
            .map(|&i| &self.manifest.cumulative_metrics[i])
    }

    pub fn view(&self, name: &str) -> Option<&View> {
        self.views.get(name).map(|&i| &self.manifest.views[i])
    }

    pub fn relationship(&self, name: &str) -> Option<&Relationship> {
        self.relationships
            .get(name)
            .map(|&i| &self.manifest.relationships[i])
    }

    pub fn enum_definition(&self, name: &str) -> Option<&EnumDefinition> {
        self.enum_definitions
            .get(name)
            .map(|&i| &self.manifest.enum_definitions[i])
    }

    pub fn macro_def(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name).map(|&i| &self.manifest.macros[i])
    }

    pub fn list_models(&self) -> &[Model] {
        &self.manifest.models
    }
}

impl std::fmt::Debug for AnalyzedManifest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalyzedManifest")
            .field("models", &self.manifest.models.len())
            .field("metrics", &self.manifest.metrics.len())
            .field("cumulative_metrics", &self.manifest.cumulative_metrics.len())
            .field("views", &self.manifest.views.len())
            .field("mode", &self.mode)
            .finish()
    }
}
