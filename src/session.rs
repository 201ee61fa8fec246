//! Per-request session settings.

use crate::dialect::Dialect;

/// Settings a client supplies with each planning request.
///
/// `catalog` and `schema` qualify bare table references in the incoming
/// statement; a reference already carrying the manifest's catalog/schema
/// prefix is treated as unqualified. `enable_dynamic_fields` selects the
/// narrow-CTE planning mode; turning it off projects every column of every
/// referenced object.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionContext {
    catalog: Option<String>,
    schema: Option<String>,
    enable_dynamic_fields: bool,
    dialect: Dialect,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self {
            catalog: None,
            schema: None,
            enable_dynamic_fields: true,
            dialect: Dialect::Generic,
        }
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_catalog(mut self, catalog: impl Into<String>) -> Self {
        self.catalog = Some(catalog.into());
        self
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    pub fn with_dynamic_fields(mut self, enabled: bool) -> Self {
        self.enable_dynamic_fields = enabled;
        self
    }

    pub fn with_dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn catalog(&self) -> Option<&str> {
        self.catalog.as_deref()
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn enable_dynamic_fields(&self) -> bool {
        self.enable_dynamic_fields
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }
}
