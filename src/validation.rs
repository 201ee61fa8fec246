//! Built-in validation rules.
//!
//! Rules check manifest definitions against an analyzed manifest without
//! planning a statement. Each check yields a named result with a PASS, FAIL
//! or ERROR status; ERROR means the rule could not run (bad parameters),
//! never that a definition is wrong.

use std::str::FromStr;

use serde::Serialize;

use crate::error::PlanError;
use crate::lineage::QualifiedColumn;
use crate::manifest::ColumnKind;
use crate::mdl::AnalyzedManifest;
use crate::sql::parse_expression;
use crate::sql::visitor::for_each_expr;

/// The built-in rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationRule {
    /// `column_is_valid(model[, column])`: the column resolves, and its
    /// calculated expression (if any) has computable lineage.
    ColumnIsValid,
    /// `relationship_is_valid(name)`: endpoints resolve and the condition
    /// references both of them.
    RelationshipIsValid,
}

impl FromStr for ValidationRule {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "column_is_valid" => Ok(ValidationRule::ColumnIsValid),
            "relationship_is_valid" => Ok(ValidationRule::RelationshipIsValid),
            other => Err(PlanError::UnknownObject(format!(
                "validation rule '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Pass,
    Fail,
    Error,
}

/// One rule outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub name: String,
    pub status: ValidationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ValidationResult {
    fn pass(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ValidationStatus::Pass,
            message: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ValidationStatus::Fail,
            message: Some(message.into()),
        }
    }

    fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: ValidationStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// Run a rule with positional parameters.
pub fn validate(
    rule: ValidationRule,
    params: &[String],
    analyzed: &AnalyzedManifest,
) -> Vec<ValidationResult> {
    match rule {
        ValidationRule::ColumnIsValid => column_is_valid(params, analyzed),
        ValidationRule::RelationshipIsValid => relationship_is_valid(params, analyzed),
    }
}

fn column_is_valid(params: &[String], analyzed: &AnalyzedManifest) -> Vec<ValidationResult> {
    match params {
        [model, column] => vec![check_column(model, column, analyzed)],
        [model] => {
            let Some(model_def) = analyzed.model(model) else {
                return vec![ValidationResult::fail(
                    format!("column_is_valid:{}", model),
                    format!("model '{}' not found", model),
                )];
            };
            model_def
                .columns
                .iter()
                .map(|c| check_column(model, &c.name, analyzed))
                .collect()
        }
        _ => vec![ValidationResult::error(
            "column_is_valid",
            "expected parameters: model[, column]",
        )],
    }
}

fn check_column(model: &str, column: &str, analyzed: &AnalyzedManifest) -> ValidationResult {
    let name = format!("column_is_valid:{}.{}", model, column);
    let Some(model_def) = analyzed.model(model) else {
        return ValidationResult::fail(name, format!("model '{}' not found", model));
    };
    let Some(column_def) = model_def.column(column) else {
        return ValidationResult::fail(
            name,
            format!("column '{}' not found on model '{}'", column, model),
        );
    };
    match column_def.kind() {
        ColumnKind::Physical | ColumnKind::Relationship => ValidationResult::pass(name),
        ColumnKind::Calculated => {
            match analyzed
                .lineage()
                .required_fields(&[QualifiedColumn::new(model, column)])
            {
                Ok(_) => ValidationResult::pass(name),
                Err(err) => ValidationResult::fail(name, err.to_string()),
            }
        }
    }
}

fn relationship_is_valid(params: &[String], analyzed: &AnalyzedManifest) -> Vec<ValidationResult> {
    let [rel_name] = params else {
        return vec![ValidationResult::error(
            "relationship_is_valid",
            "expected parameters: relationship",
        )];
    };
    let name = format!("relationship_is_valid:{}", rel_name);
    let Some(rel) = analyzed.relationship(rel_name) else {
        return vec![ValidationResult::fail(
            name,
            format!("relationship '{}' not found", rel_name),
        )];
    };
    for endpoint in &rel.models {
        if analyzed.model(endpoint).is_none() {
            return vec![ValidationResult::fail(
                name,
                format!("endpoint '{}' not found", endpoint),
            )];
        }
    }
    let condition = match parse_expression(&rel.condition) {
        Ok(expr) => expr,
        Err(err) => return vec![ValidationResult::fail(name, err.to_string())],
    };
    let mut referenced: Vec<String> = Vec::new();
    let collect = for_each_expr(&condition, |e| {
        if let sqlparser::ast::Expr::CompoundIdentifier(parts) = e {
            if let Some(first) = parts.first() {
                referenced.push(first.value.clone());
            }
        }
        Ok(())
    });
    if collect.is_err() {
        return vec![ValidationResult::fail(name, "condition walk failed")];
    }
    let both_sides = rel
        .models
        .iter()
        .all(|endpoint| referenced.iter().any(|r| r == endpoint));
    if both_sides {
        vec![ValidationResult::pass(name)]
    } else {
        vec![ValidationResult::fail(
            name,
            "condition must reference both endpoint models",
        )]
    }
}
