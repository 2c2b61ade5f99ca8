//! Record sources
//!
//! A record source enumerates migration definitions. The engine never
//! relies on enumeration order; the graph builder sorts.

use std::collections::BTreeMap;

use crate::definitions::MigrationRecord;
use crate::error::{MigrationError, MigrationResult};

/// Enumerates the available migrations
pub trait RecordSource: Send + Sync {
    /// Load every migration definition; names must be unique
    fn load_records(&self) -> MigrationResult<Vec<MigrationRecord>>;
}

/// Explicit in-memory registry of migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationRegistry {
    records: BTreeMap<String, MigrationRecord>,
}

impl MigrationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(
        records: impl IntoIterator<Item = MigrationRecord>,
    ) -> MigrationResult<Self> {
        let mut registry = Self::new();
        for record in records {
            registry.register(record)?;
        }
        Ok(registry)
    }

    /// Add a record, rejecting a name that is already registered
    pub fn register(&mut self, record: MigrationRecord) -> MigrationResult<()> {
        if self.records.contains_key(record.name()) {
            return Err(MigrationError::DuplicateMigration(record.name().to_string()));
        }
        self.records.insert(record.name().to_string(), record);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl RecordSource for MigrationRegistry {
    fn load_records(&self) -> MigrationResult<Vec<MigrationRecord>> {
        Ok(self.records.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = MigrationRegistry::new();
        registry.register(MigrationRecord::new("0001_initial")).unwrap();
        let err = registry
            .register(MigrationRecord::new("0001_initial"))
            .unwrap_err();
        assert!(matches!(err, MigrationError::DuplicateMigration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_loads_all_records() {
        let registry = MigrationRegistry::from_records([
            MigrationRecord::new("0002_b").with_dependencies(["0001_a"]),
            MigrationRecord::new("0001_a"),
        ])
        .unwrap();

        let names: Vec<String> = registry
            .load_records()
            .unwrap()
            .iter()
            .map(|r| r.name().to_string())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"0001_a".to_string()));
    }
}
