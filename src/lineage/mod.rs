//! Column-level data lineage over calculated fields.
//!
//! The lineage graph answers one question for the rewrite engine: given the
//! columns a statement touches, which base columns must each referenced
//! object's CTE project for those columns to be computable. Vertices are
//! `(object, column)` pairs; traversing a calculated expression records the
//! relationship columns it walks through, the terminal columns it reads,
//! and an object-level dependency edge for every hop.
//!
//! Cycles are detected lazily, during traversal: a manifest may declare
//! mutually referencing calculated columns, and only a request that needs
//! both together fails.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use petgraph::algo::has_path_connecting;
use petgraph::graph::{DiGraph, NodeIndex};
use sqlparser::ast::Expr;

use crate::error::{PlanError, PlanResult};
use crate::manifest::{ColumnKind, Manifest, Model, ModelOrigin};
use crate::sql::{parse_expression, visitor::for_each_expr};

/// A column qualified by the manifest object that declares it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedColumn {
    pub object: String,
    pub column: String,
}

impl QualifiedColumn {
    pub fn new(object: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            object: object.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for QualifiedColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.object, self.column)
    }
}

/// Required base columns per object, ordered so that an object precedes
/// everything that depends on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RequiredFields {
    entries: Vec<(String, BTreeSet<String>)>,
}

impl RequiredFields {
    pub fn get(&self, object: &str) -> Option<&BTreeSet<String>> {
        self.entries
            .iter()
            .find(|(name, _)| name == object)
            .map(|(_, columns)| columns)
    }

    pub fn contains(&self, object: &str) -> bool {
        self.get(object).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BTreeSet<String>)> {
        self.entries
            .iter()
            .map(|(name, columns)| (name.as_str(), columns))
    }

    pub fn objects(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Add `column` to `object`'s set, appending a new entry when the
    /// object is not present yet. The rewrite engine uses this to pull
    /// relationship join keys and source-node projections into the plan.
    pub(crate) fn add(&mut self, object: &str, column: impl Into<String>) {
        match self.entries.iter_mut().find(|(name, _)| name == object) {
            Some((_, columns)) => {
                columns.insert(column.into());
            }
            None => {
                let mut columns = BTreeSet::new();
                columns.insert(column.into());
                self.entries.push((object.to_string(), columns));
            }
        }
    }

    /// Append an object with no required columns if absent.
    pub(crate) fn ensure(&mut self, object: &str) {
        if !self.contains(object) {
            self.entries.push((object.to_string(), BTreeSet::new()));
        }
    }
}

/// The analyzed lineage of one manifest.
///
/// Construction parses every calculated, derived and metric expression once;
/// traversal is pure over the parsed forms. The value is immutable and
/// shared across concurrent planning operations.
pub struct Lineage {
    manifest: Arc<Manifest>,
    /// Pre-parsed expressions keyed by qualified column.
    expressions: BTreeMap<QualifiedColumn, Expr>,
}

impl Lineage {
    /// Parse every manifest expression and build the lineage value.
    ///
    /// Fails only on malformed expressions; acyclicity is *not* checked
    /// here.
    pub fn analyze(manifest: Arc<Manifest>) -> PlanResult<Self> {
        let mut expressions = BTreeMap::new();

        for model in &manifest.models {
            for column in &model.columns {
                let needs_parse = match column.kind() {
                    ColumnKind::Calculated => true,
                    // Physical columns of derived models resolve their
                    // expressions against the base object.
                    ColumnKind::Physical => {
                        matches!(model.origin(), Some(ModelOrigin::BaseObject(_)))
                    }
                    ColumnKind::Relationship => false,
                };
                if needs_parse {
                    let expr = parse_expression(column.source_expression()).map_err(|e| {
                        PlanError::manifest_invalid(format!(
                            "column '{}.{}': {}",
                            model.name, column.name, e
                        ))
                    })?;
                    expressions.insert(QualifiedColumn::new(&model.name, &column.name), expr);
                }
            }
        }

        for metric in &manifest.metrics {
            for column in metric.dimensions.iter().chain(metric.measures.iter()) {
                let expr = parse_expression(column.source_expression()).map_err(|e| {
                    PlanError::manifest_invalid(format!(
                        "metric column '{}.{}': {}",
                        metric.name, column.name, e
                    ))
                })?;
                expressions.insert(QualifiedColumn::new(&metric.name, &column.name), expr);
            }
        }

        Ok(Self {
            manifest,
            expressions,
        })
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Union of required base columns per object across `columns`, in
    /// dependency order. Detects cycles closed by the combined traversal.
    pub fn required_fields(&self, columns: &[QualifiedColumn]) -> PlanResult<RequiredFields> {
        let mut walker = Walker::new(self);
        for start in columns {
            walker.start = Some(start.clone());
            walker.visit_column(&start.object, &start.column)?;
        }
        walker.into_required_fields()
    }

    /// Immediate (one-hop) source columns of a single column, keyed by the
    /// object that declares them. Used for lineage visualization.
    pub fn source_columns(
        &self,
        column: &QualifiedColumn,
    ) -> PlanResult<BTreeMap<String, BTreeSet<String>>> {
        let mut sources: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        let Some((resolver, expr)) = self.expression_context(&column.object, &column.column)? else {
            return Ok(sources);
        };

        for_each_expr(expr, |e| {
            match e {
                Expr::Identifier(ident) => {
                    if self.object_column_exists(&resolver, &ident.value) {
                        sources
                            .entry(resolver.clone())
                            .or_default()
                            .insert(ident.value.clone());
                    }
                }
                Expr::CompoundIdentifier(parts) => {
                    let names: Vec<String> = parts.iter().map(|p| p.value.clone()).collect();
                    if let Some((target, terminal, markers)) = self.resolve_chain(&resolver, &names) {
                        for (owner, rel_col) in markers {
                            sources.entry(owner).or_default().insert(rel_col);
                        }
                        if let Some(terminal) = terminal {
                            sources.entry(target).or_default().insert(terminal);
                        }
                    }
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(sources)
    }

    /// The object whose columns a stored expression resolves against, and
    /// the parsed expression, if the column has one.
    fn expression_context(&self, object: &str, column: &str) -> PlanResult<Option<(String, &Expr)>> {
        let key = QualifiedColumn::new(object, column);

        if let Some(model) = self.manifest.model(object) {
            let col = model.column(column).ok_or_else(|| {
                PlanError::UnknownObject(format!("{}.{}", object, column))
            })?;
            return Ok(match col.kind() {
                ColumnKind::Calculated => {
                    self.expressions.get(&key).map(|e| (object.to_string(), e))
                }
                ColumnKind::Physical => match model.origin() {
                    Some(ModelOrigin::BaseObject(base)) => {
                        self.expressions.get(&key).map(|e| (base.to_string(), e))
                    }
                    _ => None,
                },
                ColumnKind::Relationship => None,
            });
        }

        if let Some(metric) = self.manifest.metric(object) {
            if metric.column(column).is_none() {
                return Err(PlanError::UnknownObject(format!("{}.{}", object, column)));
            }
            return Ok(self
                .expressions
                .get(&key)
                .map(|e| (metric.base_object.clone(), e)));
        }

        if let Some(cm) = self.manifest.cumulative_metric(object) {
            // Cumulative measures and windows map straight to base columns;
            // there is no stored expression to walk.
            if column != cm.measure.name && column != cm.window.name {
                return Err(PlanError::UnknownObject(format!("{}.{}", object, column)));
            }
            return Ok(None);
        }

        Err(PlanError::UnknownObject(object.to_string()))
    }

    fn object_column_exists(&self, object: &str, column: &str) -> bool {
        if let Some(model) = self.manifest.model(object) {
            return model.column(column).is_some();
        }
        if let Some(metric) = self.manifest.metric(object) {
            return metric.column(column).is_some();
        }
        if let Some(cm) = self.manifest.cumulative_metric(object) {
            return column == cm.measure.name || column == cm.window.name;
        }
        false
    }

    /// Follow a dereference chain `r.x.y` from `owner`. Returns the final
    /// target object, the terminal column (None when the chain ends on a
    /// relationship column) and the `(owner, relationship column)` markers
    /// recorded along the way. Returns None when the chain does not start
    /// with a relationship column of `owner`.
    fn resolve_chain(
        &self,
        owner: &str,
        parts: &[String],
    ) -> Option<(String, Option<String>, Vec<(String, String)>)> {
        let model = self.manifest.model(owner)?;
        let first = model.column(parts.first()?)?;
        if first.kind() != ColumnKind::Relationship {
            return None;
        }

        let mut markers = Vec::new();
        let mut current: &Model = model;
        let mut idx = 0;
        while idx < parts.len() {
            let column = current.column(&parts[idx])?;
            match column.kind() {
                ColumnKind::Relationship => {
                    markers.push((current.name.clone(), column.name.clone()));
                    current = self.manifest.model(&column.r#type)?;
                    idx += 1;
                }
                _ => {
                    if idx + 1 != parts.len() {
                        // Dereferencing through a non-relationship column.
                        return None;
                    }
                    return Some((current.name.clone(), Some(column.name.clone()), markers));
                }
            }
        }
        Some((current.name.clone(), None, markers))
    }
}

/// One `required_fields` traversal: accumulates per-object column sets and
/// the object-level dependency graph used for ordering and cycle detection.
struct Walker<'a> {
    lineage: &'a Lineage,
    required: BTreeMap<String, BTreeSet<String>>,
    graph: DiGraph<String, ()>,
    nodes: HashMap<String, NodeIndex>,
    /// Objects in first-visit order, for stable topological output.
    visit_order: Vec<String>,
    stack: Vec<QualifiedColumn>,
    start: Option<QualifiedColumn>,
}

impl<'a> Walker<'a> {
    fn new(lineage: &'a Lineage) -> Self {
        Self {
            lineage,
            required: BTreeMap::new(),
            graph: DiGraph::new(),
            nodes: HashMap::new(),
            visit_order: Vec::new(),
            stack: Vec::new(),
            start: None,
        }
    }

    fn cycle_error(&self) -> PlanError {
        let name = self
            .start
            .as_ref()
            .map(|c| c.to_string())
            .unwrap_or_default();
        PlanError::Cycle(name)
    }

    fn node(&mut self, object: &str) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(object) {
            return idx;
        }
        let idx = self.graph.add_node(object.to_string());
        self.nodes.insert(object.to_string(), idx);
        self.visit_order.push(object.to_string());
        idx
    }

    fn ensure_entry(&mut self, object: &str) {
        self.node(object);
        self.required.entry(object.to_string()).or_default();
    }

    fn add_required(&mut self, object: &str, column: &str) {
        self.node(object);
        self.required
            .entry(object.to_string())
            .or_default()
            .insert(column.to_string());
    }

    /// Record that `dependent`'s CTE reads from `dependency`'s CTE.
    fn add_dependency(&mut self, dependency: &str, dependent: &str) -> PlanResult<()> {
        if dependency == dependent {
            return Ok(());
        }
        let from = self.node(dependency);
        let to = self.node(dependent);
        if self.graph.find_edge(from, to).is_some() {
            return Ok(());
        }
        if has_path_connecting(&self.graph, to, from, None) {
            return Err(self.cycle_error());
        }
        self.graph.add_edge(from, to, ());
        Ok(())
    }

    fn visit_column(&mut self, object: &str, column: &str) -> PlanResult<()> {
        let key = QualifiedColumn::new(object, column);
        if self.stack.contains(&key) {
            return Err(self.cycle_error());
        }
        if self
            .required
            .get(object)
            .map(|set| set.contains(column))
            .unwrap_or(false)
        {
            return Ok(());
        }
        self.add_required(object, column);
        self.stack.push(key);
        let result = self.visit_column_inner(object, column);
        self.stack.pop();
        result
    }

    fn visit_column_inner(&mut self, object: &str, column: &str) -> PlanResult<()> {
        // Cumulative metrics have no stored expression; wire their measure
        // and window columns to the base object directly.
        if let Some(cm) = self.lineage.manifest.cumulative_metric(object) {
            if column != cm.measure.name && column != cm.window.name {
                return Err(PlanError::UnknownObject(format!("{}.{}", object, column)));
            }
            let base = cm.base_object.clone();
            self.add_dependency(&base, object)?;
            let ref_column = if column == cm.measure.name {
                cm.measure.ref_column.clone()
            } else {
                cm.window.ref_column.clone()
            };
            return self.visit_column(&base, &ref_column);
        }

        let Some((resolver, expr)) = self.lineage.expression_context(object, column)? else {
            return Ok(());
        };
        let expr = expr.clone();
        if resolver != object {
            self.add_dependency(&resolver, object)?;
        }
        self.walk_expr(object, &resolver, &expr)
    }

    /// Walk one expression. `owner` declares the expression; `resolver` is
    /// the object unqualified identifiers resolve against.
    fn walk_expr(&mut self, owner: &str, resolver: &str, expr: &Expr) -> PlanResult<()> {
        // Collect references first so the borrow on the walked expression
        // ends before recursion mutates the accumulator.
        let mut plain: Vec<String> = Vec::new();
        let mut chains: Vec<Vec<String>> = Vec::new();
        for_each_expr(expr, |e| {
            match e {
                Expr::Identifier(ident) => plain.push(ident.value.clone()),
                Expr::CompoundIdentifier(parts) => {
                    chains.push(parts.iter().map(|p| p.value.clone()).collect())
                }
                _ => {}
            }
            Ok(())
        })?;

        for name in plain {
            if self.lineage.object_column_exists(resolver, &name) {
                if resolver != owner {
                    self.add_dependency(resolver, owner)?;
                }
                self.visit_column(resolver, &name)?;
            }
            // Anything else may be a remote column or enum member; it passes
            // through untouched.
        }

        for chain in chains {
            let Some((target, terminal, markers)) =
                self.lineage.resolve_chain(resolver, &chain)
            else {
                continue;
            };
            for (marker_owner, rel_col) in &markers {
                self.add_required(marker_owner, rel_col);
            }
            // Every hop target becomes a CTE the owner's CTE reads.
            for window in markers.windows(2) {
                let hop_target = &window[1].0;
                self.add_dependency(hop_target, owner)?;
            }
            self.add_dependency(&target, owner)?;
            self.ensure_entry(&target);
            if let Some(terminal) = terminal {
                self.visit_column(&target, &terminal)?;
            }
        }
        Ok(())
    }

    fn into_required_fields(self) -> PlanResult<RequiredFields> {
        // Stable topological order: repeatedly emit the first-visited object
        // whose dependencies are all emitted.
        let mut remaining: Vec<String> = self
            .visit_order
            .iter()
            .filter(|name| self.required.contains_key(*name))
            .cloned()
            .collect();
        let mut emitted: BTreeSet<String> = BTreeSet::new();
        let mut entries = Vec::with_capacity(remaining.len());
        let mut required = self.required;

        while !remaining.is_empty() {
            let position = remaining.iter().position(|name| {
                let idx = self.nodes[name];
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .all(|dep| {
                        let dep_name = &self.graph[dep];
                        emitted.contains(dep_name) || !required.contains_key(dep_name)
                    })
            });
            let Some(position) = position else {
                // Unreachable: insertion-time checks reject cyclic edges.
                return Err(PlanError::Internal(
                    "dependency graph had a residual cycle".into(),
                ));
            };
            let name = remaining.remove(position);
            let columns = required.remove(&name).unwrap_or_default();
            emitted.insert(name.clone());
            entries.push((name, columns));
        }

        Ok(RequiredFields { entries })
    }
}
