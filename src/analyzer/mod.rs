//! Statement analysis.
//!
//! Walks an incoming statement's scopes and records which manifest objects
//! it references, which of their columns it mentions, and which relations
//! are consumed without enumerating columns (`SELECT *`, `count(*)`). The
//! rewrite engine turns this record into the set of CTEs to emit.
//!
//! Identifiers that resolve to nothing in the manifest pass through
//! untouched: they may belong to statement CTEs or remote tables. An
//! unqualified identifier that resolves to columns of two or more in-scope
//! manifest relations is rejected as ambiguous.

pub mod scope;

use std::collections::{BTreeMap, BTreeSet};

use sqlparser::ast::{
    Expr, GroupByExpr, Join, JoinConstraint, JoinOperator, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, Value,
};

use crate::error::{PlanError, PlanResult};
use crate::manifest::Manifest;
use crate::session::SessionContext;
use crate::sql::ident::{object_name_parts, resolve_table};
use crate::sql::visitor::{for_each_expr, for_each_expr_mut, is_count_star};

use scope::Scope;

/// What one statement references in the manifest.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Analysis {
    pub models: BTreeSet<String>,
    pub metrics: BTreeSet<String>,
    pub cumulative_metrics: BTreeSet<String>,
    pub views: BTreeSet<String>,
    /// Columns mentioned per referenced object.
    pub collected_columns: BTreeMap<String, BTreeSet<String>>,
    /// Objects consumed without column enumeration; their CTEs must project
    /// every non-calculated column.
    pub source_required: BTreeSet<String>,
    /// Objects in first-reference order; the rewrite engine's tie-break.
    pub reference_order: Vec<String>,
}

impl Analysis {
    /// Does the statement touch the manifest at all?
    pub fn is_empty(&self) -> bool {
        self.reference_order.is_empty()
    }

    pub fn is_referenced(&self, object: &str) -> bool {
        self.reference_order.iter().any(|o| o == object)
    }
}

/// Analyze one statement against the manifest under the session's
/// catalog/schema defaults.
pub fn analyze_statement(
    statement: &Statement,
    session: &SessionContext,
    manifest: &Manifest,
) -> PlanResult<Analysis> {
    let mut analyzer = Analyzer {
        manifest,
        session,
        analysis: Analysis::default(),
    };
    if let Statement::Query(query) = statement {
        analyzer.walk_query(query, &Scope::new())?;
    }
    Ok(analyzer.analysis)
}

struct Analyzer<'a> {
    manifest: &'a Manifest,
    session: &'a SessionContext,
    analysis: Analysis,
}

impl<'a> Analyzer<'a> {
    fn walk_query(&mut self, query: &Query, parent: &Scope) -> PlanResult<()> {
        let mut scope = parent.child();
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                self.walk_query(&cte.query, &scope)?;
                scope.add_cte(cte.alias.name.value.clone());
            }
        }
        let body_scope = self.walk_set_expr(&query.body, &scope)?;
        for order in &query.order_by {
            self.collect_expr(&order.expr, &body_scope)?;
        }
        if let Some(limit) = &query.limit {
            self.collect_expr(limit, &body_scope)?;
        }
        Ok(())
    }

    fn walk_set_expr(&mut self, body: &SetExpr, scope: &Scope) -> PlanResult<Scope> {
        match body {
            SetExpr::Select(select) => self.walk_select(select, scope),
            SetExpr::Query(query) => {
                self.walk_query(query, scope)?;
                Ok(scope.child())
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.walk_set_expr(left, scope)?;
                self.walk_set_expr(right, scope)?;
                Ok(scope.child())
            }
            _ => Ok(scope.child()),
        }
    }

    fn walk_select(&mut self, select: &Select, parent: &Scope) -> PlanResult<Scope> {
        let mut scope = parent.child();
        for table in &select.from {
            self.bind_table_factor(&table.relation, &mut scope)?;
            for join in &table.joins {
                self.bind_table_factor(&join.relation, &mut scope)?;
            }
        }
        for table in &select.from {
            for join in &table.joins {
                self.collect_join_constraint(join, &scope)?;
            }
        }

        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => {
                    let objects: Vec<String> =
                        scope.local_objects().map(String::from).collect();
                    for object in objects {
                        self.require_source(&object);
                    }
                }
                SelectItem::QualifiedWildcard(name, _) => {
                    let parts = object_name_parts(name);
                    if let Some(qualifier) = parts.last() {
                        let object = scope
                            .resolve_qualifier(qualifier)
                            .and_then(|b| b.object.clone());
                        if let Some(object) = object {
                            self.require_source(&object);
                        }
                    }
                }
                SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } => {
                    self.collect_expr(expr, &scope)?;
                }
            }
        }

        if let Some(selection) = &select.selection {
            self.collect_expr(selection, &scope)?;
        }
        if let GroupByExpr::Expressions(exprs) = &select.group_by {
            for expr in exprs {
                self.collect_expr(expr, &scope)?;
            }
        }
        if let Some(having) = &select.having {
            self.collect_expr(having, &scope)?;
        }
        if let Some(qualify) = &select.qualify {
            self.collect_expr(qualify, &scope)?;
        }
        for expr in &select.sort_by {
            self.collect_expr(expr, &scope)?;
        }
        Ok(scope)
    }

    fn collect_join_constraint(&mut self, join: &Join, scope: &Scope) -> PlanResult<()> {
        let constraint = match &join.join_operator {
            JoinOperator::Inner(c)
            | JoinOperator::LeftOuter(c)
            | JoinOperator::RightOuter(c)
            | JoinOperator::FullOuter(c) => c,
            _ => return Ok(()),
        };
        if let JoinConstraint::On(expr) = constraint {
            self.collect_expr(expr, scope)?;
        }
        Ok(())
    }

    fn bind_table_factor(&mut self, factor: &TableFactor, scope: &mut Scope) -> PlanResult<()> {
        match factor {
            TableFactor::Table {
                name, alias, args, ..
            } => {
                let qualifier = alias
                    .as_ref()
                    .map(|a| a.name.value.clone())
                    .or_else(|| name.0.last().map(|ident| ident.value.clone()));
                if args.is_some() {
                    // Table function; never a manifest object.
                    scope.bind(qualifier, None);
                    return Ok(());
                }
                let parts = object_name_parts(name);
                let object = self.resolve_manifest_object(&parts, scope);
                if let Some(object) = &object {
                    self.record_reference(object);
                }
                scope.bind(qualifier, object);
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                self.walk_query(subquery, scope)?;
                let qualifier = alias.as_ref().map(|a| a.name.value.clone());
                scope.bind(qualifier, None);
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.bind_table_factor(&table_with_joins.relation, scope)?;
                for join in &table_with_joins.joins {
                    self.bind_table_factor(&join.relation, scope)?;
                }
                for join in &table_with_joins.joins {
                    self.collect_join_constraint(join, scope)?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Resolve a table reference to a manifest object name, honoring CTE
    /// shadowing and the session/manifest catalog-schema prefix.
    fn resolve_manifest_object(&self, parts: &[String], scope: &Scope) -> Option<String> {
        if parts.len() == 1 && scope.is_cte(&parts[0]) {
            return None;
        }
        let default_catalog = self.session.catalog().or(self.manifest.catalog.as_deref());
        let default_schema = self.session.schema().or(self.manifest.schema.as_deref());
        let resolved = resolve_table(parts, default_catalog, default_schema)?;
        if resolved.under_prefix(
            self.manifest.catalog.as_deref(),
            self.manifest.schema.as_deref(),
        ) && self.manifest.is_object(&resolved.table)
        {
            Some(resolved.table)
        } else {
            None
        }
    }

    fn record_reference(&mut self, object: &str) {
        if self.manifest.model(object).is_some() {
            self.analysis.models.insert(object.to_string());
        } else if self.manifest.metric(object).is_some() {
            self.analysis.metrics.insert(object.to_string());
        } else if self.manifest.cumulative_metric(object).is_some() {
            self.analysis.cumulative_metrics.insert(object.to_string());
        } else if self.manifest.view(object).is_some() {
            self.analysis.views.insert(object.to_string());
        }
        if !self.analysis.is_referenced(object) {
            self.analysis.reference_order.push(object.to_string());
        }
    }

    fn require_source(&mut self, object: &str) {
        if self.manifest.view(object).is_none() {
            self.analysis.source_required.insert(object.to_string());
        }
    }

    fn collect(&mut self, object: &str, column: &str) {
        self.analysis
            .collected_columns
            .entry(object.to_string())
            .or_default()
            .insert(column.to_string());
    }

    fn has_column(&self, object: &str, column: &str) -> bool {
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

    fn collect_expr(&mut self, expr: &Expr, scope: &Scope) -> PlanResult<()> {
        let (scrubbed, subqueries) = extract_subqueries(expr)?;
        for subquery in &subqueries {
            self.walk_query(subquery, scope)?;
        }

        let manifest = self.manifest;
        let mut plain: Vec<String> = Vec::new();
        let mut compound: Vec<Vec<String>> = Vec::new();
        let mut count_star = false;
        for_each_expr(&scrubbed, |e| {
            match e {
                Expr::Identifier(ident) => plain.push(ident.value.clone()),
                Expr::CompoundIdentifier(parts) => {
                    compound.push(parts.iter().map(|p| p.value.clone()).collect())
                }
                Expr::Function(func) if is_count_star(func) => count_star = true,
                _ => {}
            }
            Ok(())
        })?;

        for name in plain {
            let has_column = |object: &str, column: &str| self.has_column(object, column);
            let candidates: Vec<String> = scope
                .resolve_unqualified(&has_column, &name)
                .into_iter()
                .map(String::from)
                .collect();
            match candidates.as_slice() {
                [] => {} // remote or CTE column, pass through
                [object] => {
                    let object = object.clone();
                    self.collect(&object, &name);
                }
                many => {
                    return Err(PlanError::ambiguous(name, many));
                }
            }
        }

        for mut parts in compound {
            strip_prefix_strings(&mut parts, manifest);
            if parts.len() != 2 {
                continue;
            }
            let (qualifier, column) = (&parts[0], &parts[1]);
            let object = scope
                .resolve_qualifier(qualifier)
                .and_then(|b| b.object.clone());
            if let Some(object) = object {
                if self.has_column(&object, column) {
                    self.collect(&object, column);
                }
            }
        }

        if count_star {
            let objects: Vec<String> = scope.local_objects().map(String::from).collect();
            for object in objects {
                self.require_source(&object);
            }
        }
        Ok(())
    }
}

/// Strip the manifest's catalog/schema prefix from a compound identifier's
/// string parts.
fn strip_prefix_strings(parts: &mut Vec<String>, manifest: &Manifest) {
    let (Some(catalog), Some(schema)) = (&manifest.catalog, &manifest.schema) else {
        return;
    };
    if parts.len() > 2 && &parts[0] == catalog && &parts[1] == schema {
        parts.drain(0..2);
    } else if parts.len() > 1 && &parts[0] == schema {
        parts.drain(0..1);
    }
}

/// Replace subquery expressions with placeholders, returning the scrubbed
/// expression and the extracted queries. The `IN (subquery)` probe
/// expression stays in the scrubbed tree; it belongs to the outer scope.
fn extract_subqueries(expr: &Expr) -> PlanResult<(Expr, Vec<Query>)> {
    let mut scrubbed = expr.clone();
    let mut queries = Vec::new();
    for_each_expr_mut(&mut scrubbed, |e| {
        match e {
            Expr::Subquery(q) | Expr::ArraySubquery(q) => {
                queries.push((**q).clone());
                *e = Expr::Value(Value::Null);
            }
            Expr::InSubquery { expr, subquery, .. } => {
                queries.push((**subquery).clone());
                let probe = (**expr).clone();
                *e = probe;
            }
            Expr::Exists { subquery, .. } => {
                queries.push((**subquery).clone());
                *e = Expr::Value(Value::Null);
            }
            _ => {}
        }
        Ok(())
    })?;
    Ok((scrubbed, queries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Column, JoinType, Model, Relationship};
    use crate::sql::parse_statement;

    fn manifest() -> Manifest {
        Manifest::builder("memory", "tpch")
            .model(Model::with_ref_sql(
                "Customer",
                "select * from main.customer",
                vec![
                    Column::physical("custkey", "INTEGER"),
                    Column::physical("name", "VARCHAR"),
                    Column::relationship("orders", "Orders", "OrdersCustomer"),
                    Column::calculated("total_price", "BIGINT", "sum(orders.totalprice)"),
                ],
                Some("custkey"),
            ))
            .model(Model::with_ref_sql(
                "Orders",
                "select * from main.orders",
                vec![
                    Column::physical("orderkey", "INTEGER"),
                    Column::physical("custkey", "INTEGER"),
                    Column::physical("totalprice", "INTEGER"),
                ],
                Some("orderkey"),
            ))
            .relationship(Relationship::new(
                "OrdersCustomer",
                vec!["Orders", "Customer"],
                JoinType::ManyToOne,
                "Orders.custkey = Customer.custkey",
            ))
            .build()
    }

    fn analyze(sql: &str) -> PlanResult<Analysis> {
        let statement = parse_statement(sql).unwrap();
        analyze_statement(&statement, &SessionContext::new(), &manifest())
    }

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_simple_select() {
        let analysis = analyze("SELECT orderkey FROM Orders LIMIT 200").unwrap();
        assert_eq!(analysis.models, set(&["Orders"]));
        assert_eq!(
            analysis.collected_columns.get("Orders"),
            Some(&set(&["orderkey"]))
        );
        assert!(analysis.source_required.is_empty());
    }

    #[test]
    fn test_qualified_reference_under_prefix() {
        let analysis = analyze("SELECT orderkey FROM memory.tpch.Orders").unwrap();
        assert_eq!(analysis.models, set(&["Orders"]));
        let analysis = analyze("SELECT orderkey FROM tpch.Orders").unwrap();
        assert_eq!(analysis.models, set(&["Orders"]));
    }

    #[test]
    fn test_foreign_table_passes_through() {
        let analysis = analyze("SELECT * FROM unknown_table").unwrap();
        assert!(analysis.is_empty());
        let analysis = analyze("SELECT orderkey FROM other_catalog.tpch.Orders").unwrap();
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_alias_qualified_columns() {
        let analysis =
            analyze("SELECT o.totalprice FROM Orders o JOIN Customer c ON o.custkey = c.custkey")
                .unwrap();
        assert_eq!(analysis.models, set(&["Orders", "Customer"]));
        assert_eq!(
            analysis.collected_columns.get("Orders"),
            Some(&set(&["custkey", "totalprice"]))
        );
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["custkey"]))
        );
        assert_eq!(analysis.reference_order, vec!["Orders", "Customer"]);
    }

    #[test]
    fn test_ambiguous_unqualified_identifier() {
        let err = analyze("SELECT custkey FROM Orders, Customer").unwrap_err();
        assert!(matches!(err, PlanError::AmbiguousIdentifier { .. }));
    }

    #[test]
    fn test_unambiguous_unqualified_identifier() {
        let analysis = analyze("SELECT name FROM Orders, Customer").unwrap();
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["name"]))
        );
    }

    #[test]
    fn test_wildcard_requires_source() {
        let analysis = analyze("SELECT * FROM Orders").unwrap();
        assert_eq!(analysis.source_required, set(&["Orders"]));
        assert!(analysis.collected_columns.is_empty());
    }

    #[test]
    fn test_count_star_requires_source() {
        let analysis = analyze("SELECT count(*) FROM Orders WHERE orderkey = 1").unwrap();
        assert_eq!(analysis.source_required, set(&["Orders"]));
        assert_eq!(
            analysis.collected_columns.get("Orders"),
            Some(&set(&["orderkey"]))
        );
    }

    #[test]
    fn test_cte_shadows_manifest_object() {
        let analysis = analyze(
            "WITH Orders AS (SELECT 1 AS x) SELECT x FROM Orders",
        )
        .unwrap();
        assert!(analysis.is_empty());
    }

    #[test]
    fn test_statement_cte_body_is_analyzed() {
        let analysis = analyze(
            "WITH top AS (SELECT orderkey FROM Orders) SELECT orderkey FROM top",
        )
        .unwrap();
        assert_eq!(analysis.models, set(&["Orders"]));
        assert_eq!(
            analysis.collected_columns.get("Orders"),
            Some(&set(&["orderkey"]))
        );
    }

    #[test]
    fn test_subquery_scopes() {
        let analysis = analyze(
            "SELECT name FROM Customer WHERE custkey IN (SELECT custkey FROM Orders)",
        )
        .unwrap();
        assert_eq!(analysis.models, set(&["Customer", "Orders"]));
        assert_eq!(
            analysis.collected_columns.get("Orders"),
            Some(&set(&["custkey"]))
        );
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["custkey", "name"]))
        );
    }

    #[test]
    fn test_union_branches_both_analyzed() {
        let analysis = analyze(
            "SELECT name FROM Customer UNION SELECT name FROM Customer WHERE custkey = 1",
        )
        .unwrap();
        assert_eq!(analysis.models, set(&["Customer"]));
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["custkey", "name"]))
        );
    }

    #[test]
    fn test_calculated_column_collection() {
        let analysis = analyze("SELECT total_price FROM Customer WHERE custkey = 370").unwrap();
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["custkey", "total_price"]))
        );
    }

    #[test]
    fn test_order_by_resolves_in_select_scope() {
        let analysis = analyze("SELECT name FROM Customer ORDER BY total_price").unwrap();
        assert_eq!(
            analysis.collected_columns.get("Customer"),
            Some(&set(&["name", "total_price"]))
        );
    }

    #[test]
    fn test_non_query_statement_is_ignored() {
        let statement = parse_statement("INSERT INTO t VALUES (1)").unwrap();
        let analysis =
            analyze_statement(&statement, &SessionContext::new(), &manifest()).unwrap();
        assert!(analysis.is_empty());
    }
}
