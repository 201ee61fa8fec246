//! Views expand inline: their bodies are rewritten and hoisted as CTEs,
//! never reified.

mod common;

use common::{add_columns, analyze};
use strata::manifest::{Column, Manifest, View};
use strata::{plan, SessionContext};

fn manifest() -> Manifest {
    let orders = add_columns(
        common::orders(),
        vec![
            Column::relationship("customer", "Customer", "OrdersCustomer"),
            Column::calculated("customer_name", "VARCHAR", "customer.name"),
        ],
    );
    Manifest::builder("memory", "tpch")
        .model(orders)
        .model(common::customer())
        .relationship(common::orders_customer())
        .view(View::new(
            "BigOrders",
            "SELECT orderkey, totalprice FROM Orders WHERE totalprice > 1000",
        ))
        .view(View::new(
            "BigOrderKeys",
            "SELECT orderkey FROM BigOrders",
        ))
        .build()
}

#[test]
fn test_view_becomes_cte_with_rewritten_body() {
    let analyzed = analyze(manifest());
    let sql = plan(
        "SELECT orderkey FROM BigOrders",
        &SessionContext::new(),
        &analyzed,
    )
    .unwrap();
    assert!(
        sql.contains("\"BigOrders\" AS (SELECT orderkey, totalprice FROM Orders WHERE totalprice > 1000)"),
        "{}",
        sql
    );
    // The model CTE the view depends on comes first.
    assert!(
        sql.find("\"Orders\" AS (").unwrap() < sql.find("\"BigOrders\" AS (").unwrap(),
        "{}",
        sql
    );
    assert!(sql.ends_with("SELECT orderkey FROM BigOrders"), "{}", sql);
}

#[test]
fn test_view_body_columns_feed_lineage() {
    let analyzed = analyze(manifest());
    let sql = plan(
        "SELECT orderkey FROM BigOrders",
        &SessionContext::new(),
        &analyzed,
    )
    .unwrap();
    // The view touches totalprice; the Orders CTE must project it.
    let orders_cte = sql
        .split("\"Orders\" AS (")
        .nth(1)
        .and_then(|rest| rest.split(") ").next())
        .expect("orders cte");
    assert!(orders_cte.contains("\"totalprice\""), "{}", sql);
}

#[test]
fn test_nested_views() {
    let analyzed = analyze(manifest());
    let sql = plan(
        "SELECT orderkey FROM BigOrderKeys",
        &SessionContext::new(),
        &analyzed,
    )
    .unwrap();
    let orders = sql.find("\"Orders\" AS (").expect("orders cte");
    let big = sql.find("\"BigOrders\" AS (").expect("big orders cte");
    let keys = sql.find("\"BigOrderKeys\" AS (").expect("keys cte");
    assert!(orders < big && big < keys, "{}", sql);
    assert!(
        sql.contains("\"BigOrderKeys\" AS (SELECT orderkey FROM BigOrders)"),
        "{}",
        sql
    );
}

#[test]
fn test_view_over_calculated_field() {
    let mut m = manifest();
    m.views.push(View::new(
        "NamedOrders",
        "SELECT orderkey, customer_name FROM Orders",
    ));
    let analyzed = analyze(m);
    let sql = plan(
        "SELECT customer_name FROM NamedOrders",
        &SessionContext::new(),
        &analyzed,
    )
    .unwrap();
    // The calculated field's machinery lives in the model CTE, not the view.
    assert!(sql.contains("\"Customer\" AS ("), "{}", sql);
    assert!(
        sql.contains("LEFT JOIN \"Customer\" AS \"customer\""),
        "{}",
        sql
    );
    assert!(
        sql.contains("\"NamedOrders\" AS (SELECT orderkey, customer_name FROM Orders)"),
        "{}",
        sql
    );
}

#[test]
fn test_view_referencing_qualified_model() {
    let mut m = manifest();
    m.views.push(View::new(
        "Qualified",
        "SELECT orderkey FROM memory.tpch.Orders",
    ));
    let analyzed = analyze(m);
    let sql = plan(
        "SELECT orderkey FROM Qualified",
        &SessionContext::new(),
        &analyzed,
    )
    .unwrap();
    // The view body's qualified reference collapses to the CTE name.
    assert!(
        sql.contains("\"Qualified\" AS (SELECT orderkey FROM Orders)"),
        "{}",
        sql
    );
}
