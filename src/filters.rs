// ABOUTME: Relation filtering for selective migration
// ABOUTME: Handles include/exclude lists of table and view names

use anyhow::{bail, Result};

/// Which relations of the source schema take part in a migration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationFilter {
    include: Option<Vec<String>>,
    exclude: Option<Vec<String>>,
}

impl RelationFilter {
    /// Creates a filter from CLI arguments or configuration
    pub fn new(include: Option<Vec<String>>, exclude: Option<Vec<String>>) -> Result<Self> {
        if include.is_some() && exclude.is_some() {
            bail!("Cannot use both --include and --exclude");
        }

        for names in include.iter().chain(exclude.iter()) {
            if let Some(blank) = names.iter().find(|name| name.trim().is_empty()) {
                bail!("Relation names in filters cannot be empty (got '{}')", blank);
            }
            if let Some(qualified) = names.iter().find(|name| name.contains('.')) {
                bail!(
                    "Filter entries are plain relation names within the source schema, got '{}'",
                    qualified
                );
            }
        }

        Ok(Self { include, exclude })
    }

    /// Creates an empty filter (migrate everything)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Checks if any filters are active
    pub fn is_empty(&self) -> bool {
        self.include.is_none() && self.exclude.is_none()
    }

    /// Determines if a relation should be migrated
    pub fn includes(&self, name: &str) -> bool {
        if let Some(ref include) = self.include {
            return include.iter().any(|n| n == name);
        }
        if let Some(ref exclude) = self.exclude {
            return !exclude.iter().any(|n| n == name);
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_includes_everything() {
        let filter = RelationFilter::empty();
        assert!(filter.is_empty());
        assert!(filter.includes("orders"));
    }

    #[test]
    fn test_include_list() {
        let filter =
            RelationFilter::new(Some(vec!["orders".to_string(), "customers".to_string()]), None)
                .unwrap();
        assert!(filter.includes("orders"));
        assert!(!filter.includes("audit_log"));
    }

    #[test]
    fn test_exclude_list() {
        let filter = RelationFilter::new(None, Some(vec!["audit_log".to_string()])).unwrap();
        assert!(filter.includes("orders"));
        assert!(!filter.includes("audit_log"));
    }

    #[test]
    fn test_include_and_exclude_are_exclusive() {
        let result = RelationFilter::new(
            Some(vec!["orders".to_string()]),
            Some(vec!["audit_log".to_string()]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_qualified_and_blank_names() {
        assert!(RelationFilter::new(Some(vec!["shop.orders".to_string()]), None).is_err());
        assert!(RelationFilter::new(None, Some(vec![" ".to_string()])).is_err());
    }
}
