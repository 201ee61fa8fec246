//! Qualified-name helpers.
//!
//! Manifest object names are case-sensitive; a statement reference matches
//! an object only when its identifier value (quoted or not) is byte-equal
//! to the declared name.

use sqlparser::ast::{Ident, ObjectName};

/// Quote an identifier for emission into generated SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The identifier values of a possibly-qualified object name.
pub fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0.iter().map(|ident| ident.value.clone()).collect()
}

/// A table reference resolved against session defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub catalog: Option<String>,
    pub schema: Option<String>,
    pub table: String,
}

/// Resolve a 1-3 part table reference, filling missing qualifiers from the
/// given defaults.
pub fn resolve_table(
    parts: &[String],
    default_catalog: Option<&str>,
    default_schema: Option<&str>,
) -> Option<ResolvedTable> {
    match parts {
        [table] => Some(ResolvedTable {
            catalog: default_catalog.map(String::from),
            schema: default_schema.map(String::from),
            table: table.clone(),
        }),
        [schema, table] => Some(ResolvedTable {
            catalog: default_catalog.map(String::from),
            schema: Some(schema.clone()),
            table: table.clone(),
        }),
        [catalog, schema, table] => Some(ResolvedTable {
            catalog: Some(catalog.clone()),
            schema: Some(schema.clone()),
            table: table.clone(),
        }),
        _ => None,
    }
}

impl ResolvedTable {
    /// Does this reference sit under the manifest's catalog.schema prefix?
    ///
    /// A missing qualifier matches (it was filled from session defaults or
    /// left bare); an explicit qualifier must be byte-equal.
    pub fn under_prefix(&self, catalog: Option<&str>, schema: Option<&str>) -> bool {
        let catalog_ok = match (self.catalog.as_deref(), catalog) {
            (Some(a), Some(b)) => a == b,
            (None, _) => true,
            (Some(_), None) => false,
        };
        let schema_ok = match (self.schema.as_deref(), schema) {
            (Some(a), Some(b)) => a == b,
            (None, _) => true,
            (Some(_), None) => false,
        };
        catalog_ok && schema_ok
    }
}

/// Strip a leading `catalog.schema` (or bare `schema`) prefix from a
/// compound identifier, in place. Returns whether anything was removed.
///
/// Only fires when both prefix parts are declared by the manifest; a
/// partial manifest prefix never strips anything.
pub fn strip_prefix(idents: &mut Vec<Ident>, catalog: Option<&str>, schema: Option<&str>) -> bool {
    let (Some(catalog), Some(schema)) = (catalog, schema) else {
        return false;
    };
    if idents.len() > 2 && idents[0].value == catalog && idents[1].value == schema {
        idents.drain(0..2);
        return true;
    }
    if idents.len() > 1 && idents[0].value == schema {
        idents.drain(0..1);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::parse_expression;
    use sqlparser::ast::Expr;

    fn idents(parts: &[&str]) -> Vec<Ident> {
        parts.iter().map(|p| Ident::new(*p)).collect()
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("Orders"), "\"Orders\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_resolve_table() {
        let resolved = resolve_table(&["Orders".into()], Some("memory"), Some("tpch")).unwrap();
        assert_eq!(resolved.catalog.as_deref(), Some("memory"));
        assert_eq!(resolved.table, "Orders");

        let resolved = resolve_table(&["other".into(), "Orders".into()], Some("memory"), None).unwrap();
        assert_eq!(resolved.schema.as_deref(), Some("other"));

        assert!(resolve_table(&[], None, None).is_none());
    }

    #[test]
    fn test_under_prefix() {
        let bare = resolve_table(&["Orders".into()], None, None).unwrap();
        assert!(bare.under_prefix(Some("memory"), Some("tpch")));

        let qualified =
            resolve_table(&["memory".into(), "tpch".into(), "Orders".into()], None, None).unwrap();
        assert!(qualified.under_prefix(Some("memory"), Some("tpch")));
        assert!(!qualified.under_prefix(Some("memory"), Some("other")));

        let foreign = resolve_table(&["remote".into(), "Orders".into()], None, None).unwrap();
        assert!(!foreign.under_prefix(Some("memory"), Some("tpch")));
    }

    #[test]
    fn test_strip_prefix() {
        let mut parts = idents(&["memory", "tpch", "Orders", "custkey"]);
        assert!(strip_prefix(&mut parts, Some("memory"), Some("tpch")));
        assert_eq!(parts, idents(&["Orders", "custkey"]));

        let mut parts = idents(&["tpch", "Orders", "custkey"]);
        assert!(strip_prefix(&mut parts, Some("memory"), Some("tpch")));
        assert_eq!(parts, idents(&["Orders", "custkey"]));

        let mut parts = idents(&["other", "Orders", "custkey"]);
        assert!(!strip_prefix(&mut parts, Some("memory"), Some("tpch")));
        assert_eq!(parts.len(), 3);

        // Without a full manifest prefix nothing strips.
        let mut parts = idents(&["tpch", "Orders", "custkey"]);
        assert!(!strip_prefix(&mut parts, None, Some("tpch")));
    }

    #[test]
    fn test_object_name_parts_preserves_quoted_values() {
        let expr = parse_expression("\"Order\".albumId").unwrap();
        match expr {
            Expr::CompoundIdentifier(parts) => {
                assert_eq!(parts[0].value, "Order");
                assert_eq!(parts[1].value, "albumId");
            }
            other => panic!("unexpected expression: {:?}", other),
        }
    }
}
