//! Manifest JSON wire form: camelCase fields, unknown-field rejection,
//! case-insensitive enums, size bounds, error shapes.

use strata::manifest::{JoinType, Manifest, TimeUnit};
use strata::mdl::{AnalysisMode, AnalyzedManifest, SessionProperties};
use strata::{ErrorCode, PlanError};

const WIRE: &str = r#"{
    "catalog": "memory",
    "schema": "tpch",
    "models": [
        {
            "name": "Orders",
            "refSql": "select * from main.orders",
            "columns": [
                {"name": "orderkey", "type": "INTEGER", "notNull": true},
                {"name": "custkey", "type": "INTEGER"},
                {"name": "totalprice", "type": "INTEGER"},
                {"name": "customer", "type": "Customer", "relationship": "OrdersCustomer"},
                {"name": "customer_name", "type": "VARCHAR", "isCalculated": true,
                 "expression": "customer.name"}
            ],
            "primaryKey": "orderkey"
        },
        {
            "name": "Customer",
            "tableReference": {"catalog": "memory", "schema": "main", "table": "customer"},
            "columns": [
                {"name": "custkey", "type": "INTEGER"},
                {"name": "name", "type": "VARCHAR"}
            ],
            "primaryKey": "custkey"
        }
    ],
    "relationships": [
        {"name": "OrdersCustomer", "models": ["Orders", "Customer"],
         "joinType": "many_to_one", "condition": "Orders.custkey = Customer.custkey"}
    ],
    "cumulativeMetrics": [
        {
            "name": "DailyRevenue",
            "baseObject": "Orders",
            "measure": {"name": "total", "type": "BIGINT", "operator": "sum",
                        "refColumn": "totalprice"},
            "window": {"name": "orderdate", "refColumn": "orderdate", "timeUnit": "Day",
                       "start": "1994-01-01", "end": "1994-12-31"}
        }
    ],
    "enumDefinitions": [
        {"name": "Status", "values": [{"name": "OPEN"}, {"name": "CLOSED", "value": "F"}]}
    ],
    "macros": [
        {"name": "addOne", "definition": "(text: Expression) => {{ text }} + 1"}
    ]
}"#;

#[test]
fn test_wire_document_parses_and_analyzes() {
    let manifest = Manifest::from_json(WIRE).unwrap();
    assert_eq!(manifest.models.len(), 2);
    assert_eq!(
        manifest.relationship("OrdersCustomer").unwrap().join_type,
        JoinType::ManyToOne
    );
    assert_eq!(
        manifest.cumulative_metric("DailyRevenue").unwrap().window.time_unit,
        TimeUnit::Day
    );
    let analyzed =
        AnalyzedManifest::analyze(manifest, SessionProperties::new(), AnalysisMode::Full).unwrap();
    assert!(analyzed.model("Orders").is_some());
    assert!(analyzed.enum_definition("Status").is_some());
    assert!(analyzed.macro_def("addOne").is_some());
}

#[test]
fn test_enums_canonical_on_output() {
    let manifest = Manifest::from_json(WIRE).unwrap();
    let json = serde_json::to_string(&manifest).unwrap();
    assert!(json.contains("\"joinType\":\"MANY_TO_ONE\""), "{}", json);
    assert!(json.contains("\"timeUnit\":\"DAY\""), "{}", json);
}

#[test]
fn test_round_trip_preserves_value() {
    let manifest = Manifest::from_json(WIRE).unwrap();
    let json = serde_json::to_string(&manifest).unwrap();
    let back = Manifest::from_json(&json).unwrap();
    assert_eq!(back, manifest);
    assert_eq!(back.content_hash(), manifest.content_hash());
}

#[test]
fn test_unknown_field_rejected() {
    let json = WIRE.replace("\"catalog\": \"memory\"", "\"catalog\": \"memory\", \"zzz\": 1");
    let err = Manifest::from_json(&json).unwrap_err();
    assert_eq!(err.code(), ErrorCode::ManifestInvalid);
}

#[test]
fn test_unknown_join_type_rejected() {
    let json = WIRE.replace("many_to_one", "sideways");
    assert!(Manifest::from_json(&json).is_err());
}

#[test]
fn test_manifest_size_bound() {
    let padding = "x".repeat(strata::manifest::MAX_MANIFEST_BYTES);
    let oversized = format!("{{\"catalog\":\"{}\"}}", padding);
    let err = Manifest::from_json(&oversized).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InputTooLarge);
}

#[test]
fn test_invalid_origin_reported_with_path() {
    let json = WIRE.replace(
        "\"refSql\": \"select * from main.orders\",",
        "",
    );
    let manifest = Manifest::from_json(&json).unwrap();
    let err = manifest.validate().unwrap_err();
    let wire = err.to_wire();
    assert_eq!(wire.code, ErrorCode::ManifestInvalid);
    assert_eq!(wire.path.as_deref(), Some("models[0]"));
}

#[test]
fn test_error_wire_codes() {
    let cases = vec![
        (PlanError::UnknownObject("X".into()), "UNKNOWN_OBJECT"),
        (PlanError::Cycle("M.c".into()), "CYCLE"),
        (PlanError::Parse("bad".into()), "PARSE"),
        (PlanError::InputTooLarge("big".into()), "INPUT_TOO_LARGE"),
        (PlanError::UnsupportedDialect("oracle".into()), "UNSUPPORTED_DIALECT"),
        (
            PlanError::ambiguous("custkey", &["Orders".into(), "Customer".into()]),
            "AMBIGUOUS_IDENTIFIER",
        ),
    ];
    for (err, code) in cases {
        let json = serde_json::to_value(err.to_wire()).unwrap();
        assert_eq!(json["code"], code);
        assert!(json["message"].as_str().is_some());
    }
}
