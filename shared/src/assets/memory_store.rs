use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

use super::{DeleteOutcome, ObjectStore, StorageError};

/// In-process object store that records every delete attempt
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: DashMap<String, Vec<u8>>,
    /// Remaining injected failures per key
    failures: DashMap<String, u32>,
    calls: Mutex<Vec<String>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_objects<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let store = Self::new();
        for key in keys {
            store.put(key, Vec::new());
        }
        store
    }

    pub fn put(&self, key: impl Into<String>, bytes: Vec<u8>) {
        self.objects.insert(key.into(), bytes);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.contains_key(key)
    }

    /// Fail the next `times` deletes of `key`
    pub fn fail_next(&self, key: impl Into<String>, times: u32) {
        self.failures.insert(key.into(), times);
    }

    /// Every key passed to `delete`, in call order
    pub fn delete_calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Delete attempts for `key`, failed ones included
    pub fn attempts_for(&self, key: &str) -> usize {
        self.delete_calls().iter().filter(|k| *k == key).count()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn delete(&self, key: &str) -> Result<DeleteOutcome, StorageError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(key.to_string());
        }

        if let Some(mut remaining) = self.failures.get_mut(key) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(StorageError::Unavailable(format!("injected failure for {}", key)));
            }
        }

        Ok(match self.objects.remove(key) {
            Some(_) => DeleteOutcome::Deleted,
            None => DeleteOutcome::NotFound,
        })
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
