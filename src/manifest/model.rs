//! Model and column definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A physical `(catalog, schema, table)` triple a model can bind to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TableReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub table: String,
}

impl fmt::Display for TableReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(catalog) = &self.catalog {
            write!(f, "{}.", catalog)?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        f.write_str(&self.table)
    }
}

/// The three mutually exclusive ways a column sources its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Bound to a source column of the model's origin (expression defaults
    /// to the column name).
    Physical,
    /// Pointer to another model through a named relationship.
    Relationship,
    /// Derived by an expression that may traverse relationships.
    Calculated,
}

/// A column of a model, metric dimension list, or metric measure list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Column {
    pub name: String,
    /// Semantic type; for relationship columns this is the target model name.
    #[serde(rename = "type")]
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relationship: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_calculated: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub not_null: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

fn is_false(b: &bool) -> bool {
    !*b
}

impl Column {
    /// A physical column mapping straight to a source column of `name`.
    pub fn physical(name: impl Into<String>, r#type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            r#type: r#type.into(),
            relationship: None,
            is_calculated: false,
            not_null: false,
            expression: None,
            properties: BTreeMap::new(),
        }
    }

    /// A physical column mapping to an explicit source expression.
    pub fn physical_expr(
        name: impl Into<String>,
        r#type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            expression: Some(expression.into()),
            ..Self::physical(name, r#type)
        }
    }

    /// A relationship pointer column: `type` names the target model,
    /// `relationship` the edge binding the two models.
    pub fn relationship(
        name: impl Into<String>,
        target_model: impl Into<String>,
        relationship: impl Into<String>,
    ) -> Self {
        Self {
            relationship: Some(relationship.into()),
            ..Self::physical(name, target_model)
        }
    }

    /// A calculated column derived by `expression`.
    pub fn calculated(
        name: impl Into<String>,
        r#type: impl Into<String>,
        expression: impl Into<String>,
    ) -> Self {
        Self {
            is_calculated: true,
            expression: Some(expression.into()),
            ..Self::physical(name, r#type)
        }
    }

    pub fn with_not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    pub fn kind(&self) -> ColumnKind {
        if self.relationship.is_some() {
            ColumnKind::Relationship
        } else if self.is_calculated {
            ColumnKind::Calculated
        } else {
            ColumnKind::Physical
        }
    }

    /// Source expression of a physical column (the column name when no
    /// explicit expression is declared).
    pub fn source_expression(&self) -> &str {
        self.expression.as_deref().unwrap_or(&self.name)
    }
}

/// A logical relation with an origin and a typed column list.
///
/// Exactly one of `ref_sql`, `base_object`, `table_reference` must be set;
/// [`crate::manifest::Manifest::validate`] rejects anything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Model {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_sql: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_object: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_reference: Option<TableReference>,
    pub columns: Vec<Column>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Accepted for wire compatibility; the planner does not interpret it.
    #[serde(default, skip_serializing_if = "is_false")]
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_time: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

/// The origin a model descriptor emits its base rows from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelOrigin<'a> {
    RefSql(&'a str),
    BaseObject(&'a str),
    TableReference(&'a TableReference),
}

impl Model {
    /// A model producing its base rows from a raw SQL expression.
    pub fn with_ref_sql(
        name: impl Into<String>,
        ref_sql: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Option<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            ref_sql: Some(ref_sql.into()),
            base_object: None,
            table_reference: None,
            columns,
            primary_key: primary_key.map(String::from),
            cached: false,
            refresh_time: None,
            properties: BTreeMap::new(),
        }
    }

    /// A model deriving from another model or metric.
    pub fn with_base_object(
        name: impl Into<String>,
        base_object: impl Into<String>,
        columns: Vec<Column>,
        primary_key: Option<&str>,
    ) -> Self {
        Self {
            ref_sql: None,
            base_object: Some(base_object.into()),
            ..Self::with_ref_sql(name, String::new(), columns, primary_key)
        }
    }

    /// A model bound to a physical table.
    pub fn with_table_reference(
        name: impl Into<String>,
        table: TableReference,
        columns: Vec<Column>,
        primary_key: Option<&str>,
    ) -> Self {
        Self {
            ref_sql: None,
            table_reference: Some(table),
            ..Self::with_ref_sql(name, String::new(), columns, primary_key)
        }
    }

    /// The model's origin, when exactly one is declared.
    pub fn origin(&self) -> Option<ModelOrigin<'_>> {
        match (&self.ref_sql, &self.base_object, &self.table_reference) {
            (Some(sql), None, None) => Some(ModelOrigin::RefSql(sql)),
            (None, Some(base), None) => Some(ModelOrigin::BaseObject(base)),
            (None, None, Some(table)) => Some(ModelOrigin::TableReference(table)),
            _ => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Column names in declaration order, excluding relationship pointers.
    pub fn selectable_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns
            .iter()
            .filter(|c| c.kind() != ColumnKind::Relationship)
    }
}
