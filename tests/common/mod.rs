//! Shared fixtures: a small TPC-H flavored manifest with to-one and
//! to-many calculated fields.
#![allow(dead_code)]

use std::sync::Arc;

use strata::manifest::{Column, JoinType, Manifest, Model, Relationship};
use strata::mdl::{AnalysisMode, AnalyzedManifest, SessionProperties};

pub fn customer() -> Model {
    Model::with_ref_sql(
        "Customer",
        "select * from main.customer",
        vec![
            Column::physical("custkey", "INTEGER"),
            Column::physical("name", "VARCHAR"),
            Column::physical("nationkey", "INTEGER"),
            Column::physical("acctbal", "INTEGER"),
        ],
        Some("custkey"),
    )
}

pub fn orders() -> Model {
    Model::with_ref_sql(
        "Orders",
        "select * from main.orders",
        vec![
            Column::physical("orderkey", "INTEGER"),
            Column::physical("custkey", "INTEGER"),
            Column::physical("orderstatus", "VARCHAR"),
            Column::physical("totalprice", "INTEGER"),
            Column::physical("orderdate", "DATE"),
        ],
        Some("orderkey"),
    )
}

pub fn lineitem() -> Model {
    Model::with_ref_sql(
        "Lineitem",
        "select * from main.lineitem",
        vec![
            Column::physical("orderkey", "INTEGER"),
            Column::physical("linenumber", "INTEGER"),
            Column::physical("extendedprice", "INTEGER"),
            Column::physical("discount", "INTEGER"),
            Column::physical_expr(
                "orderkey_linenumber",
                "VARCHAR",
                "concat(orderkey, '-', linenumber)",
            ),
        ],
        Some("orderkey_linenumber"),
    )
}

pub fn orders_customer() -> Relationship {
    Relationship::new(
        "OrdersCustomer",
        vec!["Orders", "Customer"],
        JoinType::ManyToOne,
        "Orders.custkey = Customer.custkey",
    )
}

pub fn orders_lineitem() -> Relationship {
    Relationship::new(
        "OrdersLineitem",
        vec!["Orders", "Lineitem"],
        JoinType::OneToMany,
        "Orders.orderkey = Lineitem.orderkey",
    )
}

pub fn add_columns(mut model: Model, columns: Vec<Column>) -> Model {
    model.columns.extend(columns);
    model
}

pub fn analyze(manifest: Manifest) -> Arc<AnalyzedManifest> {
    AnalyzedManifest::analyze(manifest, SessionProperties::new(), AnalysisMode::Full)
        .expect("manifest analyzes")
}

/// Customer/Orders/Lineitem with the calculated fields the rewrite tests
/// exercise: a to-one dereference on Orders and a to-many aggregate on
/// Customer.
pub fn tpch_manifest() -> Manifest {
    let customer = add_columns(
        customer(),
        vec![
            Column::relationship("orders", "Orders", "OrdersCustomer"),
            Column::calculated("total_price", "BIGINT", "sum(orders.totalprice)"),
            Column::calculated(
                "lineitem_totalprice",
                "BIGINT",
                "sum(orders.lineitem.discount * orders.lineitem.extendedprice)",
            ),
        ],
    );
    let orders = add_columns(
        orders(),
        vec![
            Column::relationship("customer", "Customer", "OrdersCustomer"),
            Column::relationship("lineitem", "Lineitem", "OrdersLineitem"),
            Column::calculated("customer_name", "VARCHAR", "customer.name"),
        ],
    );
    Manifest::builder("memory", "tpch")
        .model(customer)
        .model(orders)
        .model(lineitem())
        .relationship(orders_customer())
        .relationship(orders_lineitem())
        .build()
}

pub fn tpch() -> Arc<AnalyzedManifest> {
    analyze(tpch_manifest())
}
