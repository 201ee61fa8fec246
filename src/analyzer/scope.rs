//! Name environments for statement analysis.
//!
//! Each query level owns a scope: the relations its FROM clause binds, the
//! CTE names visible to it, and a link to the enclosing scope for
//! correlated references. CTE names shadow manifest objects.

use std::collections::BTreeSet;

/// One relation bound in a FROM clause.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    /// The name this relation answers to: its alias when present, otherwise
    /// the last part of its table name. Derived tables without aliases bind
    /// anonymously.
    pub qualifier: Option<String>,
    /// The manifest object this relation resolved to, if any.
    pub object: Option<String>,
}

impl Binding {
    pub fn matches(&self, qualifier: &str) -> bool {
        self.qualifier.as_deref() == Some(qualifier)
    }
}

/// A lexical scope for identifier resolution.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    pub bindings: Vec<Binding>,
    /// CTE names visible at this level (includes enclosing levels).
    pub ctes: BTreeSet<String>,
    parent: Option<Box<Scope>>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child scope: sees this scope's CTEs and falls back to it for
    /// correlated identifier resolution.
    pub fn child(&self) -> Scope {
        Scope {
            bindings: Vec::new(),
            ctes: self.ctes.clone(),
            parent: Some(Box::new(self.clone())),
        }
    }

    pub fn add_cte(&mut self, name: impl Into<String>) {
        self.ctes.insert(name.into());
    }

    pub fn is_cte(&self, name: &str) -> bool {
        self.ctes.contains(name)
    }

    pub fn bind(&mut self, qualifier: Option<String>, object: Option<String>) {
        self.bindings.push(Binding { qualifier, object });
    }

    /// Find the relation a qualifier refers to, innermost scope first.
    pub fn resolve_qualifier(&self, qualifier: &str) -> Option<&Binding> {
        if let Some(binding) = self.bindings.iter().find(|b| b.matches(qualifier)) {
            return Some(binding);
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.resolve_qualifier(qualifier))
    }

    /// Manifest objects bound at this level only (wildcards and `count(*)`
    /// bind to the current level, never to enclosing scopes).
    pub fn local_objects(&self) -> impl Iterator<Item = &str> {
        self.bindings
            .iter()
            .filter_map(|b| b.object.as_deref())
    }

    /// Candidate objects an unqualified identifier could belong to, from
    /// the innermost level that has at least one manifest-bound relation
    /// whose column set contains it.
    pub fn resolve_unqualified<'a>(
        &'a self,
        has_column: &dyn Fn(&str, &str) -> bool,
        identifier: &str,
    ) -> Vec<&'a str> {
        let local: Vec<&str> = self
            .bindings
            .iter()
            .filter_map(|b| b.object.as_deref())
            .filter(|object| has_column(object, identifier))
            .collect();
        if !local.is_empty() {
            return local;
        }
        match &self.parent {
            Some(parent) => parent.resolve_unqualified(has_column, identifier),
            None => Vec::new(),
        }
    }
}
