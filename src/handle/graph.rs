//! Non-owning dependency links between handles.
//!
//! Parent links are keys in a side table with a reverse index, so handle lifetime is
//! decided only by the owning manager. Removing a node keeps its children's links to it;
//! a later restore of such a child fails with `NotFound`.

use super::HandleKey;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct HandleGraph {
    parents: BTreeMap<HandleKey, Vec<HandleKey>>,
    children: BTreeMap<HandleKey, Vec<HandleKey>>,
}

impl HandleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `child` with its ordered parent list
    pub fn insert(&mut self, child: HandleKey, parents: Vec<HandleKey>) {
        for parent in &parents {
            self.children.entry(*parent).or_default().push(child);
        }
        self.parents.insert(child, parents);
    }

    pub fn parents_of(&self, key: &HandleKey) -> &[HandleKey] {
        self.parents.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn children_of(&self, key: &HandleKey) -> &[HandleKey] {
        self.children.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, key: &HandleKey) -> bool {
        self.parents.contains_key(key)
    }

    /// Drop `key` and its outgoing links
    pub fn remove(&mut self, key: &HandleKey) {
        if let Some(parents) = self.parents.remove(key) {
            for parent in parents {
                if let Some(siblings) = self.children.get_mut(&parent) {
                    siblings.retain(|child| child != key);
                    if siblings.is_empty() {
                        self.children.remove(&parent);
                    }
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}
