mod sqlite;

use std::collections::HashMap;

use crate::ClientResult;

pub use sqlite::SqliteBlobStore;

/// Named text blobs persisted between the two halves of a period.
pub trait BlobStore {
    fn write_blob(&mut self, name: &str, body: &str) -> ClientResult<()>;
    fn read_blob(&self, name: &str) -> ClientResult<Option<String>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryBlobStore {
    blobs: HashMap<String, String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn write_blob(&mut self, name: &str, body: &str) -> ClientResult<()> {
        self.blobs.insert(name.to_string(), body.to_string());
        Ok(())
    }

    fn read_blob(&self, name: &str) -> ClientResult<Option<String>> {
        Ok(self.blobs.get(name).cloned())
    }
}
