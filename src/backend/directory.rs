//! # Group directory.
//!
//! A [`Group`] is one compose workload: an id (the compose project name), a
//! working location and the services its manifest declares. The core only
//! reads the directory; populating it (scanning, parsing manifests) happens
//! elsewhere.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Serialize;

/// A known group of components.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    /// Group identifier; matches the runtime's group label.
    pub id: String,
    /// Working location the executor runs in.
    pub path: PathBuf,
    /// Services declared by the manifest.
    pub services: Vec<String>,
}

impl Group {
    pub fn new(id: impl Into<String>, path: impl Into<PathBuf>, services: Vec<String>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            services,
        }
    }

    /// Number of members the manifest expects.
    #[inline]
    pub fn expected(&self) -> usize {
        self.services.len()
    }
}

/// Read-only access to known groups.
#[async_trait]
pub trait GroupDirectory: Send + Sync + 'static {
    /// All groups, sorted by id.
    async fn list_groups(&self) -> Vec<Group>;

    async fn get_group(&self, id: &str) -> Option<Group>;
}

/// Directory held in memory.
#[derive(Default)]
pub struct InMemoryDirectory {
    groups: RwLock<BTreeMap<String, Group>>,
}

impl InMemoryDirectory {
    pub fn new(groups: impl IntoIterator<Item = Group>) -> Self {
        let dir = Self::default();
        for g in groups {
            dir.insert(g);
        }
        dir
    }

    /// Adds or replaces a group.
    pub fn insert(&self, group: Group) {
        let mut groups = self
            .groups
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        groups.insert(group.id.clone(), group);
    }
}

#[async_trait]
impl GroupDirectory for InMemoryDirectory {
    async fn list_groups(&self) -> Vec<Group> {
        let groups = self
            .groups
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        groups.values().cloned().collect()
    }

    async fn get_group(&self, id: &str) -> Option<Group> {
        let groups = self
            .groups
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        groups.get(id).cloned()
    }
}
