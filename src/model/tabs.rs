//! Open editor tabs.
//!
//! [`TabStore`] is a persistent value: every mutating operation returns a new
//! store and leaves the receiver untouched, so a renderer holding the previous
//! store can detect changes with [`TabStore::ptr_eq`] and never observes a
//! half-applied update.

use crate::primitives::path_utils;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tab {
    pub path: String,
    pub content: String,
    pub dirty: bool,
}

impl Tab {
    pub fn new(path: &str, content: impl Into<String>) -> Self {
        Self {
            path: path_utils::normalize(path),
            content: content.into(),
            dirty: false,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TabStore {
    tabs: Arc<IndexMap<String, Tab>>,
    active: Option<String>,
}

impl TabStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when both stores share the same tab mapping.
    pub fn ptr_eq(&self, other: &TabStore) -> bool {
        Arc::ptr_eq(&self.tabs, &other.tabs) && self.active == other.active
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&Tab> {
        self.tabs.get(&path_utils::normalize(path))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active.as_deref().and_then(|p| self.tabs.get(p))
    }

    /// Tabs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Tab> {
        self.tabs.values()
    }

    pub fn paths(&self) -> Vec<String> {
        self.tabs.keys().cloned().collect()
    }

    /// Dirty tabs at `path` or below it.
    pub fn dirty_within(&self, path: &str) -> Vec<&Tab> {
        self.tabs
            .values()
            .filter(|tab| tab.dirty && path_utils::is_within(&tab.path, path))
            .collect()
    }

    /// Open `path` (or focus it when already open) and make it active.
    pub fn open(&self, path: &str, content: impl Into<String>) -> Self {
        let key = path_utils::normalize(path);
        let mut tabs = self.tabs.clone();
        if !tabs.contains_key(&key) {
            Arc::make_mut(&mut tabs).insert(key.clone(), Tab::new(&key, content));
        }
        Self {
            tabs,
            active: Some(key),
        }
    }

    pub fn activate(&self, path: &str) -> Self {
        let key = path_utils::normalize(path);
        if !self.tabs.contains_key(&key) {
            return self.clone();
        }
        Self {
            tabs: self.tabs.clone(),
            active: Some(key),
        }
    }

    /// Replace the content of an open tab and mark it dirty.
    pub fn edit(&self, path: &str, content: impl Into<String>) -> Self {
        self.update(path, |tab| {
            tab.content = content.into();
            tab.dirty = true;
        })
    }

    pub fn mark_saved(&self, path: &str) -> Self {
        self.update(path, |tab| tab.dirty = false)
    }

    /// Close `path`. Closing the active tab activates the first remaining tab.
    pub fn close(&self, path: &str) -> Self {
        let key = path_utils::normalize(path);
        if !self.tabs.contains_key(&key) {
            return self.clone();
        }
        let mut tabs = self.tabs.clone();
        Arc::make_mut(&mut tabs).shift_remove(&key);
        let active = match &self.active {
            Some(active) if *active == key => tabs.keys().next().cloned(),
            other => other.clone(),
        };
        Self { tabs, active }
    }

    /// Close every tab at `path` or below it.
    pub fn close_within(&self, path: &str) -> Self {
        if !self.tabs.keys().any(|k| path_utils::is_within(k, path)) {
            return self.clone();
        }
        let tabs: IndexMap<String, Tab> = self
            .tabs
            .iter()
            .filter(|(k, _)| !path_utils::is_within(k, path))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let active = match &self.active {
            Some(active) if tabs.contains_key(active) => Some(active.clone()),
            _ => tabs.keys().next().cloned(),
        };
        Self {
            tabs: Arc::new(tabs),
            active,
        }
    }

    /// Move every tab at `from` or below it to the corresponding path under
    /// `to`, keeping content, dirty state and position. The active pointer
    /// follows its tab.
    ///
    /// A tab already open at a destination path is kept; the tab that would
    /// replace it is dropped.
    pub fn relabel(&self, from: &str, to: &str) -> Self {
        if !self.tabs.keys().any(|k| path_utils::is_within(k, from)) {
            return self.clone();
        }
        let staying: HashSet<&str> = self
            .tabs
            .keys()
            .filter(|k| !path_utils::is_within(k, from))
            .map(String::as_str)
            .collect();
        let mut tabs: IndexMap<String, Tab> = IndexMap::with_capacity(self.tabs.len());
        for (key, tab) in self.tabs.iter() {
            match path_utils::rebase(key, from, to) {
                Some(new_key) if staying.contains(new_key.as_str()) => {
                    tracing::warn!("'{}' is already open; closing moved tab '{}'", new_key, key);
                }
                Some(new_key) => {
                    tabs.insert(
                        new_key.clone(),
                        Tab {
                            path: new_key,
                            ..tab.clone()
                        },
                    );
                }
                None => {
                    tabs.insert(key.clone(), tab.clone());
                }
            }
        }
        let active = self
            .active
            .as_deref()
            .map(|a| path_utils::rebase(a, from, to).unwrap_or_else(|| a.to_string()));
        Self {
            tabs: Arc::new(tabs),
            active,
        }
    }

    fn update(&self, path: &str, f: impl FnOnce(&mut Tab)) -> Self {
        let key = path_utils::normalize(path);
        let mut tabs = self.tabs.clone();
        match Arc::make_mut(&mut tabs).get_mut(&key) {
            Some(tab) => f(tab),
            None => return self.clone(),
        }
        Self {
            tabs,
            active: self.active.clone(),
        }
    }
}
