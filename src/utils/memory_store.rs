use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{Result, UnexpectedStatusSnafu};
use crate::utils::s3::{ListPage, ObjectStore};

/// In-memory [`ObjectStore`] for tests. Keys list in lexical order,
/// like S3 does, and listings are split into pages of `page_size`.
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    failing: Mutex<HashSet<String>>,
    page_size: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        MemoryStore::with_page_size(1000)
    }
}

impl MemoryStore {
    pub fn with_page_size(page_size: usize) -> Self {
        MemoryStore {
            objects: Mutex::new(BTreeMap::new()),
            failing: Mutex::new(HashSet::new()),
            page_size,
        }
    }

    pub fn insert(&self, key: &str, data: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), data);
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    /// Make every get or put of `key` fail with HTTP 500.
    pub fn fail_on(&self, key: &str) {
        self.failing.lock().unwrap().insert(key.to_string());
    }

    fn check(&self, key: &str) -> Result<()> {
        if self.failing.lock().unwrap().contains(key) {
            return UnexpectedStatusSnafu { key, code: 500u16 }.fail();
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn list_page(&self, prefix: &str, continuation: Option<String>) -> Result<ListPage> {
        let start: usize = continuation.and_then(|t| t.parse().ok()).unwrap_or(0);
        let matching: Vec<String> = self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        let end = (start + self.page_size).min(matching.len());
        let keys = matching[start.min(end)..end].to_vec();
        let next_continuation = (end < matching.len()).then(|| end.to_string());
        Ok(ListPage {
            keys,
            next_continuation,
        })
    }

    async fn get_object(&self, key: &str) -> Result<Vec<u8>> {
        self.check(key)?;
        match self.get(key) {
            Some(data) => Ok(data),
            None => UnexpectedStatusSnafu { key, code: 404u16 }.fail(),
        }
    }

    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        self.check(key)?;
        self.insert(key, data.to_vec());
        Ok(())
    }
}
