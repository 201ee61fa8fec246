//! The planning API.
//!
//! - [`plan`]: rewrite a statement into executable SQL for the session's
//!   dialect.
//! - [`dry_plan`]: as `plan`, optionally skipping the dialect adapter.
//! - [`dry_run`]: parse and check a statement, returning its output shape
//!   without producing executable SQL.

use serde::Serialize;
use sqlparser::ast::{Expr, SelectItem, SetExpr, Statement, TableFactor, Value};

use crate::error::PlanResult;
use crate::lineage::QualifiedColumn;
use crate::mdl::AnalyzedManifest;
use crate::analyzer::analyze_statement;
use crate::rewrite::rewrite_statement;
use crate::session::SessionContext;
use crate::sql::ident::{object_name_parts, resolve_table};
use crate::sql::parse_statement;
use crate::manifest::ColumnKind;

/// One column of a statement's output shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputColumn {
    pub name: String,
    #[serde(rename = "type")]
    pub r#type: String,
}

impl OutputColumn {
    fn new(name: impl Into<String>, r#type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
        }
    }
}

/// Rewrite `sql` against the analyzed manifest and adapt it to the
/// session's dialect. Deterministic: identical inputs produce byte-identical
/// output.
pub fn plan(
    sql: &str,
    session: &SessionContext,
    analyzed: &AnalyzedManifest,
) -> PlanResult<String> {
    dry_plan(sql, session, analyzed, false)
}

/// As [`plan`], but `modeling_only` skips the dialect adapter and returns
/// the planner's neutral SQL.
pub fn dry_plan(
    sql: &str,
    session: &SessionContext,
    analyzed: &AnalyzedManifest,
    modeling_only: bool,
) -> PlanResult<String> {
    let statement = parse_statement(sql)?;
    let rewritten = rewrite_statement(statement, session, analyzed)?;
    let neutral = rewritten.to_string();
    if modeling_only {
        return Ok(neutral);
    }
    session.dialect().rewrite(&neutral)
}

/// Parse and check a statement, returning the columns it would produce.
/// Runs the same analysis as planning (ambiguity and cycle detection
/// included) but emits no SQL.
pub fn dry_run(
    sql: &str,
    session: &SessionContext,
    analyzed: &AnalyzedManifest,
) -> PlanResult<Vec<OutputColumn>> {
    let statement = parse_statement(sql)?;
    let analysis = analyze_statement(&statement, session, analyzed.manifest())?;

    // Surface lineage failures (cycles, unknown columns) exactly as a real
    // plan would.
    let mut columns: Vec<QualifiedColumn> = Vec::new();
    for (object, names) in &analysis.collected_columns {
        for name in names {
            columns.push(QualifiedColumn::new(object, name));
        }
    }
    analyzed.lineage().required_fields(&columns)?;

    Ok(output_shape(&statement, session, analyzed))
}

/// Best-effort output shape of the statement's top-level projection.
fn output_shape(
    statement: &Statement,
    session: &SessionContext,
    analyzed: &AnalyzedManifest,
) -> Vec<OutputColumn> {
    let Statement::Query(query) = statement else {
        return Vec::new();
    };
    let mut body: &SetExpr = &query.body;
    // The left-most branch names a set operation's output.
    while let SetExpr::SetOperation { left, .. } = body {
        body = left.as_ref();
    }
    let SetExpr::Select(select) = body else {
        return Vec::new();
    };

    // Qualifier -> manifest object, top level only.
    let mut bindings: Vec<(Option<String>, String)> = Vec::new();
    for table in &select.from {
        for factor in std::iter::once(&table.relation)
            .chain(table.joins.iter().map(|j| &j.relation))
        {
            if let TableFactor::Table { name, alias, .. } = factor {
                let parts = object_name_parts(name);
                let manifest = analyzed.manifest();
                let resolved = resolve_table(
                    &parts,
                    session.catalog().or(manifest.catalog.as_deref()),
                    session.schema().or(manifest.schema.as_deref()),
                );
                if let Some(resolved) = resolved {
                    if resolved
                        .under_prefix(manifest.catalog.as_deref(), manifest.schema.as_deref())
                        && manifest.is_object(&resolved.table)
                    {
                        let qualifier = alias
                            .as_ref()
                            .map(|a| a.name.value.clone())
                            .or_else(|| parts.last().cloned());
                        bindings.push((qualifier, resolved.table));
                    }
                }
            }
        }
    }

    let mut output = Vec::new();
    for (index, item) in select.projection.iter().enumerate() {
        match item {
            SelectItem::Wildcard(_) => {
                for (_, object) in &bindings {
                    expand_object_columns(object, analyzed, &mut output);
                }
                if bindings.is_empty() {
                    output.push(OutputColumn::new("*", "UNKNOWN"));
                }
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let qualifier = object_name_parts(name).last().cloned();
                let object = bindings
                    .iter()
                    .find(|(q, _)| *q == qualifier)
                    .map(|(_, o)| o.clone());
                match object {
                    Some(object) => expand_object_columns(&object, analyzed, &mut output),
                    None => output.push(OutputColumn::new("*", "UNKNOWN")),
                }
            }
            SelectItem::UnnamedExpr(expr) => {
                output.push(describe_expr(expr, index, &bindings, analyzed));
            }
            SelectItem::ExprWithAlias { expr, alias } => {
                let described = describe_expr(expr, index, &bindings, analyzed);
                output.push(OutputColumn::new(alias.value.clone(), described.r#type));
            }
        }
    }
    output
}

fn expand_object_columns(object: &str, analyzed: &AnalyzedManifest, output: &mut Vec<OutputColumn>) {
    if let Some(model) = analyzed.model(object) {
        for column in model.columns.iter().filter(|c| c.kind() == ColumnKind::Physical) {
            output.push(OutputColumn::new(column.name.clone(), column.r#type.clone()));
        }
    } else if let Some(metric) = analyzed.metric(object) {
        for column in metric.dimensions.iter().chain(metric.measures.iter()) {
            output.push(OutputColumn::new(column.name.clone(), column.r#type.clone()));
        }
    } else if let Some(cm) = analyzed.cumulative_metric(object) {
        output.push(OutputColumn::new(cm.window.name.clone(), "DATE"));
        output.push(OutputColumn::new(cm.measure.name.clone(), cm.measure.r#type.clone()));
    }
}

fn column_type(object: &str, column: &str, analyzed: &AnalyzedManifest) -> Option<String> {
    if let Some(model) = analyzed.model(object) {
        return model.column(column).map(|c| c.r#type.clone());
    }
    if let Some(metric) = analyzed.metric(object) {
        return metric.column(column).map(|c| c.r#type.clone());
    }
    if let Some(cm) = analyzed.cumulative_metric(object) {
        if column == cm.measure.name {
            return Some(cm.measure.r#type.clone());
        }
        if column == cm.window.name {
            return Some("DATE".to_string());
        }
    }
    None
}

fn describe_expr(
    expr: &Expr,
    index: usize,
    bindings: &[(Option<String>, String)],
    analyzed: &AnalyzedManifest,
) -> OutputColumn {
    match expr {
        Expr::Identifier(ident) => {
            let r#type = bindings
                .iter()
                .find_map(|(_, object)| column_type(object, &ident.value, analyzed))
                .unwrap_or_else(|| "UNKNOWN".to_string());
            OutputColumn::new(ident.value.clone(), r#type)
        }
        Expr::CompoundIdentifier(parts) if parts.len() == 2 => {
            let qualifier = &parts[0].value;
            let column = &parts[1].value;
            let r#type = bindings
                .iter()
                .filter(|(q, _)| q.as_deref() == Some(qualifier.as_str()))
                .find_map(|(_, object)| column_type(object, column, analyzed))
                .unwrap_or_else(|| "UNKNOWN".to_string());
            OutputColumn::new(column.clone(), r#type)
        }
        Expr::Function(func) => {
            let name = crate::sql::visitor::function_name(func);
            let r#type = if name == "count" {
                "BIGINT".to_string()
            } else {
                "UNKNOWN".to_string()
            };
            OutputColumn::new(name, r#type)
        }
        Expr::Value(value) => {
            let r#type = match value {
                Value::Number(_, _) => "INTEGER",
                Value::SingleQuotedString(_) | Value::DoubleQuotedString(_) => "VARCHAR",
                Value::Boolean(_) => "BOOLEAN",
                Value::Null => "NULL",
                _ => "UNKNOWN",
            };
            OutputColumn::new(format!("_col{}", index), r#type)
        }
        _ => OutputColumn::new(format!("_col{}", index), "UNKNOWN"),
    }
}
