use std::collections::HashMap;

use ccp_protocol::ApplicationRecord;

/// Declared metadata of the connected applications.
#[derive(Debug, Default)]
pub struct ApplicationDirectory {
    records: HashMap<String, ApplicationRecord>,
}

impl ApplicationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert, or overwrite an existing record with the same id.
    pub fn register(&mut self, record: ApplicationRecord) {
        self.records.insert(record.software_id.clone(), record);
    }

    pub fn unregister(&mut self, software_id: &str) -> Option<ApplicationRecord> {
        self.records.remove(software_id)
    }

    pub fn get(&self, software_id: &str) -> Option<&ApplicationRecord> {
        self.records.get(software_id)
    }

    /// All records, sorted by id.
    pub fn list(&self) -> Vec<ApplicationRecord> {
        let mut list: Vec<ApplicationRecord> = self.records.values().cloned().collect();
        list.sort_by(|a, b| a.software_id.cmp(&b.software_id));
        list
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, name: &str) -> ApplicationRecord {
        ApplicationRecord::new(id, name, "demo", vec![])
    }

    #[test]
    fn test_reregistration_overwrites() {
        let mut dir = ApplicationDirectory::new();
        dir.register(record("shop-1", "Old"));
        dir.register(record("shop-1", "New"));
        assert_eq!(dir.len(), 1);
        assert_eq!(dir.get("shop-1").unwrap().name, "New");
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut dir = ApplicationDirectory::new();
        dir.register(record("shop-1", "Shop"));
        assert!(dir.unregister("shop-1").is_some());
        assert!(dir.unregister("shop-1").is_none());
        assert!(dir.is_empty());
    }

    #[test]
    fn test_list_is_sorted() {
        let mut dir = ApplicationDirectory::new();
        dir.register(record("b", "B"));
        dir.register(record("a", "A"));
        let ids: Vec<_> = dir.list().into_iter().map(|r| r.software_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }
}
