//! The aggregate of every imported coverage file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::{Cancelled, CoverageModel, Listeners, ModelListener, ModelState, Progress, Snapshot};
use crate::address::AddressRange;
use crate::ranges::CoverageRangeSet;

/// Raw covered ranges as published by [`CoverageAggregateModel`].
pub type RawRanges = Vec<AddressRange>;

#[derive(Debug)]
struct FileEntry {
    set: CoverageRangeSet,
    enabled: bool,
}

/// Per-file view used by frontends to list what is loaded.
#[derive(Debug, Clone, Serialize)]
pub struct FileStatus {
    pub path: PathBuf,
    pub digest: String,
    pub ranges: usize,
    pub enabled: bool,
}

/// Owns one [`CoverageRangeSet`] per imported file and publishes their union.
///
/// The union keeps duplicates across files: two files reporting the same
/// range contribute it twice. Duplicates inside a single file were already
/// collapsed when that file was parsed.
#[derive(Debug)]
pub struct CoverageAggregateModel {
    files: BTreeMap<PathBuf, FileEntry>,
    current: Arc<RawRanges>,
    snapshot: Snapshot<RawRanges>,
    state: ModelState,
    listeners: Listeners,
}

impl Default for CoverageAggregateModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CoverageAggregateModel {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            current: Arc::new(Vec::new()),
            snapshot: Snapshot::new(),
            state: ModelState::Empty,
            listeners: Listeners::new(),
        }
    }

    /// Handle dependents read the published union from.
    pub fn snapshot(&self) -> Snapshot<RawRanges> {
        self.snapshot.clone()
    }

    /// Drops one file. Takes effect on the next `update`.
    pub fn remove(&mut self, path: &Path) -> bool {
        self.files.remove(path).is_some()
    }

    /// Includes or excludes a file from the union without discarding it.
    /// Takes effect on the next `update`.
    pub fn set_enabled(&mut self, path: &Path, enabled: bool) -> bool {
        match self.files.get_mut(path) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn is_enabled(&self, path: &Path) -> Option<bool> {
        self.files.get(path).map(|entry| entry.enabled)
    }

    pub fn file(&self, path: &Path) -> Option<&CoverageRangeSet> {
        self.files.get(path).map(|entry| &entry.set)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> Vec<FileStatus> {
        self.files
            .values()
            .map(|entry| FileStatus {
                path: entry.set.path().to_path_buf(),
                digest: entry.set.source().digest.clone(),
                ranges: entry.set.len(),
                enabled: entry.enabled,
            })
            .collect()
    }

    fn union(&self, progress: &dyn Progress) -> Result<RawRanges, Cancelled> {
        let mut union = Vec::new();
        for (path, entry) in &self.files {
            progress.check_cancelled()?;
            if !entry.enabled {
                tracing::debug!(file = %path.display(), "skipping disabled coverage file");
                continue;
            }
            progress.set_message(&format!("merging {}", path.display()));
            union.extend(entry.set.sorted_ranges());
        }
        Ok(union)
    }
}

impl CoverageModel for CoverageAggregateModel {
    type Input = CoverageRangeSet;
    type Output = RawRanges;

    /// Adds a file, replacing any earlier import of the same path wholesale.
    fn load(&mut self, set: CoverageRangeSet) {
        let path = set.path().to_path_buf();
        if self.files.insert(path.clone(), FileEntry { set, enabled: true }).is_some() {
            tracing::debug!(file = %path.display(), "replaced previously imported coverage");
        }
        self.state = ModelState::Loaded;
    }

    fn update(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        let union = match self.union(progress) {
            Ok(union) => union,
            Err(cancelled) => {
                tracing::warn!("coverage merge cancelled; keeping previous union");
                return Err(cancelled);
            }
        };

        self.current = Arc::new(union);
        if self.files.is_empty() {
            self.state = ModelState::Empty;
            self.snapshot.publish(None);
        } else {
            self.state = ModelState::Loaded;
            self.snapshot.publish(Some(Arc::clone(&self.current)));
        }
        tracing::info!(
            files = self.files.len(),
            ranges = self.current.len(),
            "coverage union updated"
        );
        self.listeners.notify(progress)
    }

    fn clear(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        self.files.clear();
        self.current = Arc::new(Vec::new());
        self.snapshot.publish(None);
        self.state = ModelState::Empty;
        tracing::info!("coverage cleared");
        self.listeners.notify(progress)
    }

    fn model_data(&self) -> &RawRanges {
        &self.current
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn add_listener(&mut self, listener: Arc<dyn ModelListener>) {
        self.listeners.add(listener);
    }
}
