use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;

use super::ProjectDetail;

/// Loaded project details keyed by project directory.
///
/// Entries are never patched: any change under the data root clears the whole
/// cache, because one edited session file can reorder sessions and change the
/// derived summary fields.
#[derive(Debug, Default)]
pub struct DetailCache {
    data: DashMap<PathBuf, Arc<ProjectDetail>>,
}

impl DetailCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &Path) -> Option<Arc<ProjectDetail>> {
        self.data.get(key).map(|entry| Arc::clone(entry.value()))
    }

    /// Store a freshly loaded detail; racing loads for the same key overwrite each other.
    pub fn insert(&self, key: PathBuf, detail: Arc<ProjectDetail>) {
        self.data.insert(key, detail);
    }

    pub fn contains(&self, key: &Path) -> bool {
        self.data.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}
