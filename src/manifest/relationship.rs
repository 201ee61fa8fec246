//! Relationship definitions: named join edges between models.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// Cardinality of a relationship edge.
///
/// Wire form is case-insensitive on input (`many_to_one`, `MANY_TO_ONE`,
/// `Many_To_One` all accepted) and canonical SCREAMING_SNAKE on output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

impl JoinType {
    /// Does traversing this edge from the first endpoint multiply rows?
    pub fn to_many(&self) -> bool {
        matches!(self, JoinType::OneToMany | JoinType::ManyToMany)
    }

    /// Cardinality seen when the edge is walked from its second endpoint.
    pub fn reverse(&self) -> Self {
        match self {
            JoinType::OneToOne => JoinType::OneToOne,
            JoinType::OneToMany => JoinType::ManyToOne,
            JoinType::ManyToOne => JoinType::OneToMany,
            JoinType::ManyToMany => JoinType::ManyToMany,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JoinType::OneToOne => "ONE_TO_ONE",
            JoinType::OneToMany => "ONE_TO_MANY",
            JoinType::ManyToOne => "MANY_TO_ONE",
            JoinType::ManyToMany => "MANY_TO_MANY",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ONE_TO_ONE" => Some(JoinType::OneToOne),
            "ONE_TO_MANY" => Some(JoinType::OneToMany),
            "MANY_TO_ONE" => Some(JoinType::ManyToOne),
            "MANY_TO_MANY" => Some(JoinType::ManyToMany),
            _ => None,
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for JoinType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JoinType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        JoinType::parse(&s).ok_or_else(|| {
            de::Error::custom(format!(
                "unknown join type '{}', expected one of ONE_TO_ONE, ONE_TO_MANY, MANY_TO_ONE, MANY_TO_MANY",
                s
            ))
        })
    }
}

/// A named join edge between two models.
///
/// `models` lists the two endpoint model names in declaration order;
/// `join_type` is read from the first endpoint's side. The `condition` is a
/// SQL boolean expression qualifying columns by endpoint model name, e.g.
/// `Orders.custkey = Customer.custkey`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Relationship {
    pub name: String,
    pub models: Vec<String>,
    pub join_type: JoinType,
    pub condition: String,
}

impl Relationship {
    pub fn new(
        name: impl Into<String>,
        models: Vec<&str>,
        join_type: JoinType,
        condition: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            models: models.into_iter().map(String::from).collect(),
            join_type,
            condition: condition.into(),
        }
    }

    /// The endpoint reached by following this edge away from `from`.
    ///
    /// Returns `None` if `from` is not an endpoint.
    pub fn other_side(&self, from: &str) -> Option<&str> {
        match self.models.as_slice() {
            [a, b] if a == from => Some(b),
            [a, b] if b == from => Some(a),
            _ => None,
        }
    }

    /// Cardinality of the edge when walked from `from` towards the other
    /// endpoint.
    pub fn join_type_from(&self, from: &str) -> Option<JoinType> {
        match self.models.as_slice() {
            [a, _] if a == from => Some(self.join_type),
            [_, b] if b == from => Some(self.join_type.reverse()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_type_case_insensitive_input() {
        for raw in ["\"many_to_one\"", "\"MANY_TO_ONE\"", "\"Many_To_One\""] {
            let jt: JoinType = serde_json::from_str(raw).unwrap();
            assert_eq!(jt, JoinType::ManyToOne);
        }
        assert!(serde_json::from_str::<JoinType>("\"SIDEWAYS\"").is_err());
    }

    #[test]
    fn test_join_type_canonical_output() {
        let json = serde_json::to_string(&JoinType::OneToMany).unwrap();
        assert_eq!(json, "\"ONE_TO_MANY\"");
    }

    #[test]
    fn test_reverse() {
        assert_eq!(JoinType::OneToMany.reverse(), JoinType::ManyToOne);
        assert_eq!(JoinType::ManyToOne.reverse(), JoinType::OneToMany);
        assert_eq!(JoinType::OneToOne.reverse(), JoinType::OneToOne);
        assert_eq!(JoinType::ManyToMany.reverse(), JoinType::ManyToMany);
    }

    #[test]
    fn test_other_side_and_direction() {
        let rel = Relationship::new(
            "OrdersCustomer",
            vec!["Orders", "Customer"],
            JoinType::ManyToOne,
            "Orders.custkey = Customer.custkey",
        );
        assert_eq!(rel.other_side("Orders"), Some("Customer"));
        assert_eq!(rel.other_side("Customer"), Some("Orders"));
        assert_eq!(rel.other_side("Lineitem"), None);
        assert_eq!(rel.join_type_from("Orders"), Some(JoinType::ManyToOne));
        assert_eq!(rel.join_type_from("Customer"), Some(JoinType::OneToMany));
    }

    #[test]
    fn test_wire_round_trip() {
        let rel = Relationship::new(
            "OrdersCustomer",
            vec!["Orders", "Customer"],
            JoinType::ManyToOne,
            "Orders.custkey = Customer.custkey",
        );
        let json = serde_json::to_string(&rel).unwrap();
        assert!(json.contains("\"joinType\":\"MANY_TO_ONE\""));
        let back: Relationship = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rel);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let json = r#"{"name":"r","models":["A","B"],"joinType":"ONE_TO_ONE","condition":"A.x = B.x","extra":1}"#;
        assert!(serde_json::from_str::<Relationship>(json).is_err());
    }
}
