//! Views, string enums and macro definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A named SQL statement expanded inline at rewrite time, never reified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct View {
    pub name: String,
    pub statement: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, String>,
}

impl View {
    pub fn new(name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            statement: statement.into(),
            properties: BTreeMap::new(),
        }
    }
}

/// One member of a string enum; `value` defaults to the member name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumValue {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// A named string enum referenced by manifest expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct EnumDefinition {
    pub name: String,
    pub values: Vec<EnumValue>,
}

impl EnumDefinition {
    pub fn value_of(&self, member: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|v| v.name == member)
            .map(|v| v.value.as_deref().unwrap_or(&v.name))
    }
}

/// Declared type of a macro parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Expression,
    Macro,
}

/// A typed macro parameter parsed out of the definition header.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub r#type: ParameterType,
}

/// A parametric expression template, `(<params>) => <body>`.
///
/// Template expansion happens outside the planner; here the definition is
/// parsed for its parameter list so the manifest can validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Macro {
    pub name: String,
    pub definition: String,
}

impl Macro {
    pub fn new(name: impl Into<String>, definition: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            definition: definition.into(),
        }
    }

    /// Parse the parameter list of the definition header.
    ///
    /// Accepts `() => body`, `(a: Expression) => body`,
    /// `(a: Expression, b: Macro) => body`. Returns a message describing the
    /// first violation otherwise.
    pub fn parameters(&self) -> Result<Vec<Parameter>, String> {
        let def = self.definition.trim();
        let open = def
            .strip_prefix('(')
            .ok_or_else(|| format!("macro '{}' definition is invalid", self.name))?;
        let close = open
            .find(')')
            .ok_or_else(|| format!("macro '{}' definition is invalid", self.name))?;
        let header = &open[..close];
        let rest = open[close + 1..].trim_start();
        if !rest.starts_with("=>") {
            return Err(format!("macro '{}' definition is invalid", self.name));
        }

        let mut parameters = Vec::new();
        for raw in header.split(',') {
            let raw = raw.trim();
            if raw.is_empty() {
                if header.trim().is_empty() {
                    break;
                }
                return Err(format!("macro '{}' has an empty parameter", self.name));
            }
            let (name, r#type) = raw
                .split_once(':')
                .ok_or_else(|| format!("macro '{}' parameter '{}' is missing a type", self.name, raw))?;
            let r#type = match r#type.trim() {
                "Expression" => ParameterType::Expression,
                "Macro" => ParameterType::Macro,
                other => {
                    return Err(format!(
                        "macro '{}' parameter '{}' has undefined type '{}'",
                        self.name,
                        name.trim(),
                        other
                    ))
                }
            };
            parameters.push(Parameter {
                name: name.trim().to_string(),
                r#type,
            });
        }
        Ok(parameters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macro_parameters() {
        let single = Macro::new("addOne", "(text: Expression) => {{ text }} + 1");
        assert_eq!(
            single.parameters().unwrap(),
            vec![Parameter {
                name: "text".into(),
                r#type: ParameterType::Expression,
            }]
        );

        let multi = Macro::new("pass", "(a: Expression, b: Macro) => {{b(a)}}");
        let params = multi.parameters().unwrap();
        assert_eq!(params.len(), 2);
        assert_eq!(params[1].r#type, ParameterType::Macro);

        let none = Macro::new("one", "() => 1");
        assert!(none.parameters().unwrap().is_empty());
    }

    #[test]
    fn test_macro_invalid_definitions() {
        assert!(Macro::new("m", "xxxxx").parameters().is_err());
        assert!(Macro::new("m", "(xxxxx) => a").parameters().is_err());
        assert!(Macro::new("m", "(a: Expression, xxxxx) => a").parameters().is_err());
        let undefined = Macro::new("m", "(a: Expression, b: UnDefined) => a + b");
        let err = undefined.parameters().unwrap_err();
        assert!(err.contains("undefined type"));
    }

    #[test]
    fn test_enum_value_defaults_to_name() {
        let def = EnumDefinition {
            name: "Status".into(),
            values: vec![
                EnumValue {
                    name: "OPEN".into(),
                    value: None,
                },
                EnumValue {
                    name: "CLOSED".into(),
                    value: Some("F".into()),
                },
            ],
        };
        assert_eq!(def.value_of("OPEN"), Some("OPEN"));
        assert_eq!(def.value_of("CLOSED"), Some("F"));
        assert_eq!(def.value_of("MISSING"), None);
    }

    #[test]
    fn test_view_wire() {
        let json = r#"{"name":"TopCustomers","statement":"SELECT custkey FROM Customer"}"#;
        let view: View = serde_json::from_str(json).unwrap();
        assert_eq!(view.name, "TopCustomers");
    }
}
