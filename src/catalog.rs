// ABOUTME: Relation catalog and creation statement types shared by the migration phases
// ABOUTME: Classifies source relations as tables or views and carries their normalized DDL

use anyhow::{bail, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a named relation in a MySQL schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    /// Classify an `information_schema.TABLES.TABLE_TYPE` value
    ///
    /// Returns `None` for relation types this tool does not migrate.
    ///
    /// # Examples
    ///
    /// ```
    /// # use mysql_clone_migrator::catalog::RelationKind;
    /// assert_eq!(RelationKind::from_table_type("BASE TABLE"), Some(RelationKind::Table));
    /// assert_eq!(RelationKind::from_table_type("VIEW"), Some(RelationKind::View));
    /// assert_eq!(RelationKind::from_table_type("SEQUENCE"), None);
    /// ```
    pub fn from_table_type(table_type: &str) -> Option<Self> {
        match table_type.trim().to_ascii_uppercase().as_str() {
            "BASE TABLE" => Some(RelationKind::Table),
            "VIEW" | "SYSTEM VIEW" => Some(RelationKind::View),
            _ => None,
        }
    }

    /// SQL keyword used by `SHOW CREATE <keyword>`
    pub fn keyword(&self) -> &'static str {
        match self {
            RelationKind::Table => "TABLE",
            RelationKind::View => "VIEW",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationKind::Table => write!(f, "table"),
            RelationKind::View => write!(f, "view"),
        }
    }
}

/// Mapping from relation name to kind for one source schema
///
/// Enumeration is sorted by name so repeated runs see the same order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationCatalog {
    relations: BTreeMap<String, RelationKind>,
}

impl RelationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a relation; a name may only be registered once
    pub fn insert(&mut self, name: impl Into<String>, kind: RelationKind) -> Result<()> {
        let name = name.into();
        if let Some(existing) = self.relations.get(&name) {
            bail!(
                "Relation '{}' listed twice in source metadata (as {} and {})",
                name,
                existing,
                kind
            );
        }
        self.relations.insert(name, kind);
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Option<RelationKind> {
        self.relations.remove(name)
    }

    pub fn kind_of(&self, name: &str) -> Option<RelationKind> {
        self.relations.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, RelationKind)> {
        self.relations.iter().map(|(name, kind)| (name.as_str(), *kind))
    }

    /// Names of every relation of `kind`, in catalog order
    pub fn names_of(&self, kind: RelationKind) -> Vec<String> {
        self.iter()
            .filter(|(_, k)| *k == kind)
            .map(|(name, _)| name.to_string())
            .collect()
    }
}

/// A normalized `CREATE` statement bound to one relation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationStatement {
    pub name: String,
    pub kind: RelationKind,
    pub sql: String,
}

impl CreationStatement {
    pub fn new(name: impl Into<String>, kind: RelationKind, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            sql: sql.into(),
        }
    }
}

impl fmt::Display for CreationStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}'", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_table_type_is_case_insensitive() {
        assert_eq!(
            RelationKind::from_table_type("base table"),
            Some(RelationKind::Table)
        );
        assert_eq!(
            RelationKind::from_table_type(" System View "),
            Some(RelationKind::View)
        );
    }

    #[test]
    fn test_catalog_enumerates_in_name_order() {
        let mut catalog = RelationCatalog::new();
        catalog.insert("orders", RelationKind::Table).unwrap();
        catalog.insert("active_orders", RelationKind::View).unwrap();
        catalog.insert("customers", RelationKind::Table).unwrap();

        let names: Vec<&str> = catalog.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["active_orders", "customers", "orders"]);
        assert_eq!(
            catalog.names_of(RelationKind::Table),
            vec!["customers".to_string(), "orders".to_string()]
        );
        assert_eq!(catalog.names_of(RelationKind::View), vec!["active_orders"]);
    }

    #[test]
    fn test_catalog_rejects_duplicate_names() {
        let mut catalog = RelationCatalog::new();
        catalog.insert("orders", RelationKind::Table).unwrap();
        let err = catalog.insert("orders", RelationKind::View).unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_statement_display_names_kind_and_relation() {
        let stmt = CreationStatement::new("orders", RelationKind::Table, "CREATE TABLE `orders` (id int)");
        assert_eq!(stmt.to_string(), "table 'orders'");
    }
}
