use crate::types::{DynamoError, Record};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Exact-key, versioned record table local to one node.
///
/// Each call is a single operation under the store's own locking; callers
/// that need read-modify-write must serialize it themselves.
pub trait LocalStore: Send + Sync + 'static {
    fn get(&self, key: &str) -> Result<Option<Record>, DynamoError>;

    fn get_all(&self) -> Result<Vec<Record>, DynamoError>;

    /// Replaces any existing record with the same key.
    fn upsert(&self, record: Record) -> Result<(), DynamoError>;

    /// Returns the number of records removed.
    fn delete_by_key(&self, key: &str) -> Result<usize, DynamoError>;

    fn delete_all(&self) -> Result<usize, DynamoError>;
}

/// In-memory store. Contents do not survive a restart, which is what
/// anti-entropy assumes.
#[derive(Default)]
pub struct MemStore {
    data: RwLock<HashMap<String, Record>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Record>>, DynamoError> {
        self.data
            .read()
            .map_err(|_| DynamoError::LocalStore("store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Record>>, DynamoError> {
        self.data
            .write()
            .map_err(|_| DynamoError::LocalStore("store lock poisoned".to_string()))
    }
}

impl LocalStore for MemStore {
    fn get(&self, key: &str) -> Result<Option<Record>, DynamoError> {
        Ok(self.read()?.get(key).cloned())
    }

    fn get_all(&self) -> Result<Vec<Record>, DynamoError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn upsert(&self, record: Record) -> Result<(), DynamoError> {
        self.write()?.insert(record.key.clone(), record);
        Ok(())
    }

    fn delete_by_key(&self, key: &str) -> Result<usize, DynamoError> {
        Ok(self.write()?.remove(key).map_or(0, |_| 1))
    }

    fn delete_all(&self) -> Result<usize, DynamoError> {
        let mut data = self.write()?;
        let removed = data.len();
        data.clear();
        Ok(removed)
    }
}
