//! Fallible wrappers over the `sqlparser` visitor machinery.
//!
//! The statement analyzer, lineage builder and rewrite engine all traverse
//! the same AST; each supplies its own accumulator through these helpers
//! instead of implementing the visitor trait per pass.

use std::ops::ControlFlow;

use sqlparser::ast::{
    visit_expressions, visit_expressions_mut, visit_relations, visit_relations_mut, Expr,
    Function, FunctionArg, FunctionArgExpr, ObjectName, Visit, VisitMut,
};

use crate::error::PlanResult;

/// Visit every expression under `node` pre-order, stopping at the first
/// error.
pub fn for_each_expr<N: Visit>(
    node: &N,
    mut f: impl FnMut(&Expr) -> PlanResult<()>,
) -> PlanResult<()> {
    into_result(visit_expressions(node, |expr| match f(expr) {
        Ok(()) => ControlFlow::Continue(()),
        Err(err) => ControlFlow::Break(err),
    }))
}

/// Mutably visit every expression under `node` pre-order.
pub fn for_each_expr_mut<N: VisitMut>(
    node: &mut N,
    mut f: impl FnMut(&mut Expr) -> PlanResult<()>,
) -> PlanResult<()> {
    into_result(visit_expressions_mut(node, |expr| match f(expr) {
        Ok(()) => ControlFlow::Continue(()),
        Err(err) => ControlFlow::Break(err),
    }))
}

/// Visit every table reference under `node`.
pub fn for_each_relation<N: Visit>(
    node: &N,
    mut f: impl FnMut(&ObjectName) -> PlanResult<()>,
) -> PlanResult<()> {
    into_result(visit_relations(node, |name| match f(name) {
        Ok(()) => ControlFlow::Continue(()),
        Err(err) => ControlFlow::Break(err),
    }))
}

/// Mutably visit every table reference under `node`.
pub fn for_each_relation_mut<N: VisitMut>(
    node: &mut N,
    mut f: impl FnMut(&mut ObjectName) -> PlanResult<()>,
) -> PlanResult<()> {
    into_result(visit_relations_mut(node, |name| match f(name) {
        Ok(()) => ControlFlow::Continue(()),
        Err(err) => ControlFlow::Break(err),
    }))
}

fn into_result<E>(flow: ControlFlow<E>) -> Result<(), E> {
    match flow {
        ControlFlow::Continue(()) => Ok(()),
        ControlFlow::Break(err) => Err(err),
    }
}

/// Unqualified, lowercased name of a function call.
pub fn function_name(func: &Function) -> String {
    func.name
        .0
        .last()
        .map(|ident| ident.value.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Is this a `count(*)`-style call: an aggregate whose only argument is a
/// wildcard?
pub fn is_count_star(func: &Function) -> bool {
    function_name(func) == "count"
        && func
            .args
            .iter()
            .all(|arg| matches!(arg, FunctionArg::Unnamed(FunctionArgExpr::Wildcard)))
        && !func.args.is_empty()
}
