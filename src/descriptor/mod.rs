//! Per-object CTE specifications.
//!
//! A [`QueryDescriptor`] is the recipe for one common table expression: its
//! name, the other objects its body reads from, and the SQL of the body.
//! Descriptors are built on demand from the required-field sets the lineage
//! analyzer computes (dynamic mode) or from the full column lists
//! (full-materialization mode).
//!
//! Shapes, by object kind:
//!
//! - **Model**: projects the origin's columns; to-one calculated fields
//!   become `LEFT JOIN`s against the target CTEs with the expression
//!   substituted inline; to-many calculated fields become an aggregated
//!   subselect keyed by the owning model's primary key and `LEFT JOIN`ed
//!   back, preserving the owner's row cardinality.
//! - **Metric**: `SELECT dims, aggregated measures FROM base GROUP BY dims`.
//! - **Cumulative metric**: a cumulative join between the bucketed date
//!   spine and the base object.
//! - **Dummy**: `SELECT NULL AS dummy_` for objects referenced without any
//!   column requirement.

use std::collections::BTreeSet;

use sqlparser::ast::{Expr, Ident, Value};

use crate::error::{PlanError, PlanResult};
use crate::manifest::{
    Column, ColumnKind, CumulativeMetric, DateSpine, Metric, Model, ModelOrigin,
};
use crate::mdl::AnalyzedManifest;
use crate::sql::ident::quote_ident;
use crate::sql::parse_expression;
use crate::sql::visitor::for_each_expr_mut;

/// Name of the per-statement date spine CTE.
pub const DATE_SPINE_NAME: &str = "date_spine";

/// The specification of one CTE.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub name: String,
    /// Objects whose CTEs this body reads, in first-use order, deduplicated.
    pub required_objects: Vec<String>,
    /// The CTE body.
    pub sql: String,
}

impl QueryDescriptor {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required_objects: Vec::new(),
            sql: String::new(),
        }
    }

    fn require(&mut self, object: &str) {
        if !self.required_objects.iter().any(|o| o == object) {
            self.required_objects.push(object.to_string());
        }
    }
}

/// Placeholder CTE for an object whose presence matters but whose columns
/// are never touched.
pub fn dummy_descriptor(name: &str) -> QueryDescriptor {
    QueryDescriptor {
        name: name.to_string(),
        required_objects: Vec::new(),
        sql: "SELECT NULL AS dummy_".to_string(),
    }
}

/// The date spine CTE, emitted at most once per statement.
pub fn date_spine_descriptor(spine: &DateSpine) -> QueryDescriptor {
    QueryDescriptor {
        name: DATE_SPINE_NAME.to_string(),
        required_objects: Vec::new(),
        sql: format!(
            "SELECT unnest(generate_array(DATE '{}', DATE '{}', INTERVAL '1' {})) AS \"metric_time\"",
            spine.start,
            spine.end,
            spine.unit.sql_name().to_ascii_uppercase()
        ),
    }
}

/// Build the CTE for a model. `fields` is the required-field set in dynamic
/// mode; `None` projects every column (full materialization).
pub fn model_descriptor(
    model: &Model,
    fields: Option<&BTreeSet<String>>,
    analyzed: &AnalyzedManifest,
) -> PlanResult<QueryDescriptor> {
    let mut descriptor = QueryDescriptor::new(&model.name);
    let origin = origin_sql(model, &mut descriptor)?;

    let mut selected: BTreeSet<String> = match fields {
        Some(fields) => fields.clone(),
        None => model.columns.iter().map(|c| c.name.clone()).collect(),
    };

    // The primary key carries the to-many aggregate joins; make sure it is
    // part of the projection whenever such a join can occur.
    let has_calculated = model
        .columns
        .iter()
        .any(|c| c.kind() == ColumnKind::Calculated && selected.contains(&c.name));
    if has_calculated {
        if let Some(pk) = &model.primary_key {
            selected.insert(pk.clone());
        }
    }

    let mut rewriter = ModelRewriter::new(model, analyzed);
    let mut projections: Vec<String> = Vec::new();
    let mut agg_joins: Vec<String> = Vec::new();

    for column in &model.columns {
        if !selected.contains(&column.name) {
            continue;
        }
        match column.kind() {
            ColumnKind::Relationship => {}
            ColumnKind::Physical => {
                let expr = rewriter.rewrite_physical(column)?;
                projections.push(format!("{} AS {}", expr, quote_ident(&column.name)));
            }
            ColumnKind::Calculated => {
                if rewriter.is_to_many(column)? {
                    let (join_sql, projection) =
                        to_many_aggregate(model, column, &origin, analyzed)?;
                    projections.push(projection);
                    agg_joins.push(join_sql.sql);
                    for object in join_sql.required_objects {
                        descriptor.require(&object);
                    }
                } else {
                    let expr = rewriter.rewrite_calculated(column)?;
                    projections.push(format!("{} AS {}", expr, quote_ident(&column.name)));
                }
            }
        }
    }

    if projections.is_empty() {
        return Ok(dummy_descriptor(&model.name));
    }

    for target in rewriter.join_targets() {
        descriptor.require(&target);
    }

    let mut sql = format!("SELECT {} FROM {}", projections.join(", "), origin);
    for join in rewriter.join_clauses() {
        sql.push(' ');
        sql.push_str(&join);
    }
    for join in agg_joins {
        sql.push(' ');
        sql.push_str(&join);
    }
    descriptor.sql = sql;
    Ok(descriptor)
}

/// Build the CTE for a metric: dimensions grouped, measures aggregated.
pub fn metric_descriptor(
    metric: &Metric,
    fields: Option<&BTreeSet<String>>,
) -> PlanResult<QueryDescriptor> {
    let mut descriptor = QueryDescriptor::new(&metric.name);
    descriptor.require(&metric.base_object);
    let base = quote_ident(&metric.base_object);

    let wanted = |column: &Column| match fields {
        Some(fields) => fields.contains(&column.name),
        None => true,
    };

    let mut projections: Vec<String> = Vec::new();
    let mut group_by: Vec<String> = Vec::new();
    for dim in metric.dimensions.iter().filter(|c| wanted(*c)) {
        let expr = qualify_with(&base_expr(dim)?, &metric.base_object)?;
        projections.push(format!("{} AS {}", expr, quote_ident(&dim.name)));
        group_by.push(expr.to_string());
    }
    for measure in metric.measures.iter().filter(|c| wanted(*c)) {
        let expr = qualify_with(&base_expr(measure)?, &metric.base_object)?;
        projections.push(format!("{} AS {}", expr, quote_ident(&measure.name)));
    }

    if projections.is_empty() {
        return Ok(dummy_descriptor(&metric.name));
    }

    let mut sql = format!("SELECT {} FROM {}", projections.join(", "), base);
    if !group_by.is_empty() {
        sql.push_str(&format!(" GROUP BY {}", group_by.join(", ")));
    }
    descriptor.sql = sql;
    Ok(descriptor)
}

/// Build the CTE for a cumulative metric: every spine bucket of the window
/// carries the running aggregate of the base rows up to that bucket.
pub fn cumulative_metric_descriptor(cm: &CumulativeMetric) -> PlanResult<QueryDescriptor> {
    let mut descriptor = QueryDescriptor::new(&cm.name);
    descriptor.require(DATE_SPINE_NAME);
    descriptor.require(&cm.base_object);

    let unit = cm.window.time_unit.sql_name();
    let base = quote_ident(&cm.base_object);
    let spine_bucket = format!(
        "date_trunc('{}', {}.\"metric_time\")",
        unit,
        quote_ident(DATE_SPINE_NAME)
    );
    descriptor.sql = format!(
        "SELECT \"spine\".\"metric_time\" AS {window}, {op}({base}.{refcol}) AS {measure} \
         FROM (SELECT {bucket} AS \"metric_time\" FROM {spine} \
         WHERE {spine}.\"metric_time\" BETWEEN DATE '{start}' AND DATE '{end}' \
         GROUP BY {bucket}) AS \"spine\" \
         LEFT JOIN {base} ON date_trunc('{unit}', {base}.{window_ref}) <= \"spine\".\"metric_time\" \
         GROUP BY \"spine\".\"metric_time\"",
        window = quote_ident(&cm.window.name),
        op = cm.measure.operator,
        base = base,
        refcol = quote_ident(&cm.measure.ref_column),
        measure = quote_ident(&cm.measure.name),
        bucket = spine_bucket,
        spine = quote_ident(DATE_SPINE_NAME),
        start = cm.window.start,
        end = cm.window.end,
        unit = unit,
        window_ref = quote_ident(&cm.window.ref_column),
    );
    Ok(descriptor)
}

/// The FROM clause of a model's origin, aliased by the model name.
fn origin_sql(model: &Model, descriptor: &mut QueryDescriptor) -> PlanResult<String> {
    let alias = quote_ident(&model.name);
    match model.origin() {
        Some(ModelOrigin::RefSql(sql)) => Ok(format!("({}) AS {}", sql, alias)),
        Some(ModelOrigin::BaseObject(base)) => {
            descriptor.require(base);
            Ok(format!("{} AS {}", quote_ident(base), alias))
        }
        Some(ModelOrigin::TableReference(table)) => {
            let mut parts = Vec::new();
            if let Some(catalog) = &table.catalog {
                parts.push(quote_ident(catalog));
            }
            if let Some(schema) = &table.schema {
                parts.push(quote_ident(schema));
            }
            parts.push(quote_ident(&table.table));
            Ok(format!("{} AS {}", parts.join("."), alias))
        }
        None => Err(PlanError::manifest_invalid(format!(
            "model '{}' must declare exactly one of refSql, baseObject, tableReference",
            model.name
        ))),
    }
}

/// Parse the stored expression of a metric dimension or measure.
fn base_expr(column: &Column) -> PlanResult<Expr> {
    parse_expression(column.source_expression())
}

/// Qualify every bare identifier of `expr` with `relation`.
fn qualify_with(expr: &Expr, relation: &str) -> PlanResult<Expr> {
    let mut rewritten = expr.clone();
    for_each_expr_mut(&mut rewritten, |e| {
        if let Expr::Identifier(ident) = e {
            *e = Expr::CompoundIdentifier(vec![
                Ident::with_quote('"', relation.to_string()),
                Ident::with_quote('"', ident.value.clone()),
            ]);
        }
        Ok(())
    })?;
    Ok(rewritten)
}

/// One LEFT JOIN against a target model's CTE.
#[derive(Debug, Clone)]
struct JoinSpec {
    alias: String,
    target: String,
    condition: String,
}

/// Rewrites a model's column expressions into the flattened CTE namespace,
/// accumulating the to-one join chain as it goes. A chain `r.x.y` walks the
/// relationship columns, joining each target CTE under an alias derived
/// from the relationship-column path; the expression is substituted with a
/// reference to the final alias.
struct ModelRewriter<'a> {
    model: &'a Model,
    analyzed: &'a AnalyzedManifest,
    joins: Vec<JoinSpec>,
}

impl<'a> ModelRewriter<'a> {
    fn new(model: &'a Model, analyzed: &'a AnalyzedManifest) -> Self {
        Self {
            model,
            analyzed,
            joins: Vec::new(),
        }
    }

    fn join_targets(&self) -> Vec<String> {
        self.joins.iter().map(|j| j.target.clone()).collect()
    }

    fn join_clauses(&self) -> Vec<String> {
        self.joins
            .iter()
            .map(|j| {
                format!(
                    "LEFT JOIN {} AS {} ON {}",
                    quote_ident(&j.target),
                    quote_ident(&j.alias),
                    j.condition
                )
            })
            .collect()
    }

    /// Does this calculated column traverse any to-many relationship?
    /// Recurses through same-model calculated references.
    fn is_to_many(&self, column: &Column) -> PlanResult<bool> {
        let mut visited = BTreeSet::new();
        self.is_to_many_inner(column, &mut visited)
    }

    fn is_to_many_inner(
        &self,
        column: &Column,
        visited: &mut BTreeSet<String>,
    ) -> PlanResult<bool> {
        if !visited.insert(column.name.clone()) {
            // Already classified on another path; a genuine self-cycle was
            // rejected by lineage before descriptors are built.
            return Ok(false);
        }
        let expr = parse_expression(column.source_expression())?;
        let mut chains: Vec<Vec<String>> = Vec::new();
        let mut plain: Vec<String> = Vec::new();
        collect_references(&expr, &mut plain, &mut chains)?;

        for chain in &chains {
            if self.chain_is_to_many(chain)? {
                return Ok(true);
            }
        }
        for name in &plain {
            if let Some(col) = self.model.column(name) {
                if col.kind() == ColumnKind::Calculated && self.is_to_many_inner(col, visited)? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    fn chain_is_to_many(&self, parts: &[String]) -> PlanResult<bool> {
        let mut current = self.model;
        for part in parts {
            let Some(column) = current.column(part) else {
                return Ok(false);
            };
            if column.kind() != ColumnKind::Relationship {
                return Ok(false);
            }
            let rel_name = column.relationship.as_deref().unwrap_or_default();
            let rel = self
                .analyzed
                .relationship(rel_name)
                .ok_or_else(|| PlanError::UnknownObject(rel_name.to_string()))?;
            let direction = rel.join_type_from(&current.name).ok_or_else(|| {
                PlanError::manifest_invalid(format!(
                    "relationship '{}' does not connect model '{}'",
                    rel.name, current.name
                ))
            })?;
            if direction.to_many() {
                return Ok(true);
            }
            current = self
                .analyzed
                .model(&column.r#type)
                .ok_or_else(|| PlanError::UnknownObject(column.r#type.clone()))?;
        }
        Ok(false)
    }

    /// Rewrite a physical column's source expression against the origin
    /// alias.
    fn rewrite_physical(&self, column: &Column) -> PlanResult<Expr> {
        let expr = parse_expression(column.source_expression())?;
        qualify_with(&expr, &self.model.name)
    }

    /// Rewrite a calculated expression into the flattened namespace,
    /// accumulating to-one joins.
    fn rewrite_calculated(&mut self, column: &Column) -> PlanResult<Expr> {
        let expr = parse_expression(column.source_expression())?;
        self.rewrite_expr(&expr)
    }

    fn rewrite_expr(&mut self, expr: &Expr) -> PlanResult<Expr> {
        let mut rewritten = expr.clone();
        // Split the borrow: the closure needs &mut self.joins while reading
        // model/analyzed.
        let model = self.model;
        let analyzed = self.analyzed;
        let joins = &mut self.joins;
        for_each_expr_mut(&mut rewritten, |e| {
            match e {
                Expr::CompoundIdentifier(parts) => {
                    let names: Vec<String> = parts.iter().map(|p| p.value.clone()).collect();
                    if let Some(replacement) =
                        resolve_chain_expr(model, analyzed, joins, &names)?
                    {
                        *e = replacement;
                    } else if names.len() == 2 {
                        if let Some(def) = analyzed.enum_definition(&names[0]) {
                            if let Some(value) = def.value_of(&names[1]) {
                                *e = Expr::Value(Value::SingleQuotedString(value.to_string()));
                            }
                        }
                    }
                }
                Expr::Identifier(ident) => {
                    let name = ident.value.clone();
                    if let Some(col) = model.column(&name) {
                        match col.kind() {
                            ColumnKind::Physical => {
                                let source = parse_expression(col.source_expression())?;
                                *e = qualify_with(&source, &model.name)?;
                            }
                            ColumnKind::Calculated => {
                                // Inline the sibling's definition; the CTE
                                // projection cannot reference its own
                                // select aliases.
                                let source = parse_expression(col.source_expression())?;
                                let mut inlined = source;
                                inline_rewrite(model, analyzed, joins, &mut inlined)?;
                                *e = inlined;
                            }
                            ColumnKind::Relationship => {}
                        }
                    }
                }
                _ => {}
            }
            Ok(())
        })?;
        Ok(rewritten)
    }
}

/// Rewrite `expr` in place the same way [`ModelRewriter::rewrite_expr`]
/// does. Free function so the visitor closure can recurse without aliasing
/// the rewriter.
fn inline_rewrite(
    model: &Model,
    analyzed: &AnalyzedManifest,
    joins: &mut Vec<JoinSpec>,
    expr: &mut Expr,
) -> PlanResult<()> {
    for_each_expr_mut(expr, |e| {
        match e {
            Expr::CompoundIdentifier(parts) => {
                let names: Vec<String> = parts.iter().map(|p| p.value.clone()).collect();
                if let Some(replacement) = resolve_chain_expr(model, analyzed, joins, &names)? {
                    *e = replacement;
                }
            }
            Expr::Identifier(ident) => {
                let name = ident.value.clone();
                if let Some(col) = model.column(&name) {
                    if col.kind() == ColumnKind::Physical {
                        let source = parse_expression(col.source_expression())?;
                        *e = qualify_with(&source, &model.name)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    })
}

/// Walk a dereference chain, record the joins it needs, and produce the
/// substituted reference. Returns `None` when the chain does not start at a
/// relationship column of `model`.
fn resolve_chain_expr(
    model: &Model,
    analyzed: &AnalyzedManifest,
    joins: &mut Vec<JoinSpec>,
    parts: &[String],
) -> PlanResult<Option<Expr>> {
    let Some(first) = parts.first().and_then(|p| model.column(p)) else {
        return Ok(None);
    };
    if first.kind() != ColumnKind::Relationship {
        return Ok(None);
    }

    let mut current = model;
    let mut current_alias = model.name.clone();
    let mut is_root = true;
    for (idx, part) in parts.iter().enumerate() {
        let Some(column) = current.column(part) else {
            return Ok(None);
        };
        match column.kind() {
            ColumnKind::Relationship => {
                let rel_name = column.relationship.as_deref().unwrap_or_default();
                let rel = analyzed
                    .relationship(rel_name)
                    .ok_or_else(|| PlanError::UnknownObject(rel_name.to_string()))?;
                let target = analyzed
                    .model(&column.r#type)
                    .ok_or_else(|| PlanError::UnknownObject(column.r#type.clone()))?;
                let alias = if is_root {
                    part.clone()
                } else {
                    format!("{}_{}", current_alias, part)
                };
                if !joins.iter().any(|j| j.alias == alias) {
                    let condition = rewrite_join_condition(
                        &rel.condition,
                        current,
                        &current_alias,
                        is_root,
                        &target.name,
                        &alias,
                    )?;
                    joins.push(JoinSpec {
                        alias: alias.clone(),
                        target: target.name.clone(),
                        condition,
                    });
                }
                current = target;
                current_alias = alias;
                is_root = false;
            }
            _ => {
                if idx + 1 != parts.len() {
                    return Ok(None);
                }
                return Ok(Some(Expr::CompoundIdentifier(vec![
                    Ident::with_quote('"', current_alias),
                    Ident::with_quote('"', column.name.clone()),
                ])));
            }
        }
    }
    // Chain ended on a relationship column; nothing to substitute.
    Ok(None)
}

/// Rewrite a relationship condition's model-name qualifiers into the
/// aliases in scope for one join hop.
///
/// The owning side of the hop may be the origin subquery, whose namespace
/// is the raw source; physical columns are mapped through their source
/// expressions there. Target-side references use the target CTE's output
/// namespace unchanged.
fn rewrite_join_condition(
    condition: &str,
    owner: &Model,
    owner_alias: &str,
    owner_is_origin: bool,
    target: &str,
    target_alias: &str,
) -> PlanResult<String> {
    let mut expr = parse_expression(condition)?;
    for_each_expr_mut(&mut expr, |e| {
        if let Expr::CompoundIdentifier(parts) = e {
            if parts.len() == 2 {
                let qualifier = parts[0].value.clone();
                let column = parts[1].value.clone();
                if qualifier == owner.name {
                    if owner_is_origin {
                        if let Some(col) = owner.column(&column) {
                            if col.kind() == ColumnKind::Physical {
                                let source = parse_expression(col.source_expression())?;
                                *e = qualify_with(&source, owner_alias)?;
                                return Ok(());
                            }
                        }
                    }
                    *e = Expr::CompoundIdentifier(vec![
                        Ident::with_quote('"', owner_alias.to_string()),
                        Ident::with_quote('"', column),
                    ]);
                } else if qualifier == target {
                    *e = Expr::CompoundIdentifier(vec![
                        Ident::with_quote('"', target_alias.to_string()),
                        Ident::with_quote('"', column),
                    ]);
                }
            }
        }
        Ok(())
    })?;
    Ok(expr.to_string())
}

/// The aggregated subselect realizing one to-many calculated column, plus
/// the projection that reads it.
struct AggJoin {
    sql: String,
    required_objects: Vec<String>,
}

fn to_many_aggregate(
    model: &Model,
    column: &Column,
    origin: &str,
    analyzed: &AnalyzedManifest,
) -> PlanResult<(AggJoin, String)> {
    let pk = model.primary_key.as_deref().ok_or_else(|| {
        PlanError::manifest_invalid(format!(
            "model '{}' needs a primaryKey to carry to-many calculated field '{}'",
            model.name, column.name
        ))
    })?;

    let mut inner = ModelRewriter::new(model, analyzed);
    let expr = inner.rewrite_calculated(column)?;

    let agg_alias = format!("{}_agg", column.name);
    let mut sql = format!(
        "LEFT JOIN (SELECT {owner}.{pk} AS {pk}, {expr} AS {name} FROM {origin}",
        owner = quote_ident(&model.name),
        pk = quote_ident(pk),
        expr = expr,
        name = quote_ident(&column.name),
        origin = origin,
    );
    for join in inner.join_clauses() {
        sql.push(' ');
        sql.push_str(&join);
    }
    sql.push_str(&format!(
        " GROUP BY {owner}.{pk}) AS {agg} ON {owner}.{pk} = {agg}.{pk}",
        owner = quote_ident(&model.name),
        pk = quote_ident(pk),
        agg = quote_ident(&agg_alias),
    ));

    let projection = format!(
        "{}.{} AS {}",
        quote_ident(&agg_alias),
        quote_ident(&column.name),
        quote_ident(&column.name)
    );
    Ok((
        AggJoin {
            sql,
            required_objects: inner.join_targets(),
        },
        projection,
    ))
}

/// Collect the plain identifiers and dereference chains of an expression.
fn collect_references(
    expr: &Expr,
    plain: &mut Vec<String>,
    chains: &mut Vec<Vec<String>>,
) -> PlanResult<()> {
    crate::sql::visitor::for_each_expr(expr, |e| {
        match e {
            Expr::Identifier(ident) => plain.push(ident.value.clone()),
            Expr::CompoundIdentifier(parts) => {
                chains.push(parts.iter().map(|p| p.value.clone()).collect())
            }
            _ => {}
        }
        Ok(())
    })
}
