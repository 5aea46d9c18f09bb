//! One coverage chain (aggregate → instruction alignment) plus the rules for
//! running operations against it.
//!
//! At most one mutating operation runs at a time; a second request while one
//! is in flight is rejected with [`SessionError::Busy`] rather than queued.
//! Work inside an operation is sequential. Imports can run on a worker thread
//! via [`CoverageSession::spawn_import`] so a frontend stays responsive.
//!
//! Subscribers are told about new instruction hits once the operation has
//! released the models, so they may read the session back from inside the
//! notification. The session stays busy until they return.
//!
//! A cancelled operation leaves each model at its last consistent state. If
//! the cancel landed after the aggregate published but before alignment
//! finished, the alignment model keeps its previous hits until the next
//! [`CoverageSession::refresh`].

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use crate::address::AddressRange;
use crate::listing::Listing;
use crate::model::coverage::FileStatus;
use crate::model::{
    CancellationToken, Cancelled, CoverageAggregateModel, CoverageModel,
    InstructionAlignmentModel, Listeners, ModelListener, ModelState, Outcome, Progress,
};
use crate::ranges::{CoverageRangeSet, HexRangeDecoder, ImportError, RangeLineDecoder};
use crate::report::{summarize, CoverageSummary};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("another coverage operation is already running")]
    Busy,

    #[error("coverage file is not loaded: {}", .0.display())]
    UnknownFile(PathBuf),

    #[error("coverage model lock poisoned")]
    Poisoned,

    #[error("failed to start worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Result of importing a batch of files.
///
/// Each file succeeds or fails on its own. When `outcome` is `Cancelled` the
/// published union is unchanged: a cancel during parsing loads nothing, and a
/// cancel during the merge leaves the parsed files loaded but unpublished
/// until the next refresh.
#[derive(Debug)]
pub struct ImportReport {
    pub imported: Vec<FileStatus>,
    pub failed: Vec<ImportError>,
    pub outcome: Outcome,
}

impl ImportReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.outcome == Outcome::Completed
    }
}

struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, SessionError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SessionError::Busy)?;
        Ok(Self { flag: Arc::clone(flag) })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Records that the alignment model published new hits.
#[derive(Debug, Default)]
struct ChangeFlag(AtomicBool);

impl ChangeFlag {
    fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

impl ModelListener for ChangeFlag {
    fn model_changed(&self, _progress: &dyn Progress) -> Result<(), Cancelled> {
        self.0.store(true, Ordering::Release);
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, SessionError> {
    mutex.lock().map_err(|_| SessionError::Poisoned)
}

/// Coverage chain for one program listing. Clones share the same models.
#[derive(Clone)]
pub struct CoverageSession {
    aggregate: Arc<Mutex<CoverageAggregateModel>>,
    alignment: Arc<Mutex<InstructionAlignmentModel>>,
    listing: Arc<dyn Listing>,
    decoder: Arc<dyn RangeLineDecoder>,
    busy: Arc<AtomicBool>,
    changed: Arc<ChangeFlag>,
    subscribers: Arc<Mutex<Listeners>>,
}

impl std::fmt::Debug for CoverageSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoverageSession")
            .field("decoder", &self.decoder.name())
            .field("busy", &self.is_busy())
            .finish()
    }
}

impl CoverageSession {
    pub fn new(listing: Arc<dyn Listing>) -> Self {
        let mut aggregate = CoverageAggregateModel::new();
        let changed = Arc::new(ChangeFlag::default());
        let mut alignment =
            InstructionAlignmentModel::new(Arc::clone(&listing), aggregate.snapshot());
        alignment.add_listener(changed.clone());
        let alignment = Arc::new(Mutex::new(alignment));
        aggregate.add_listener(alignment.clone());
        Self {
            aggregate: Arc::new(Mutex::new(aggregate)),
            alignment,
            listing,
            decoder: Arc::new(HexRangeDecoder),
            busy: Arc::new(AtomicBool::new(false)),
            changed,
            subscribers: Arc::new(Mutex::new(Listeners::new())),
        }
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn RangeLineDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Registers a listener notified after the instruction hits change.
    pub fn subscribe(&self, listener: Arc<dyn ModelListener>) -> Result<(), SessionError> {
        lock(&self.subscribers)?.add(listener);
        Ok(())
    }

    /// Notifies subscribers if the last recompute changed the hits. Must be
    /// called with no model lock held.
    fn publish(&self, outcome: Outcome, progress: &dyn Progress) -> Result<Outcome, SessionError> {
        if !self.changed.take() {
            return Ok(outcome);
        }
        let subscribers = lock(&self.subscribers)?.clone();
        match subscribers.notify(progress) {
            Ok(()) => Ok(outcome),
            Err(Cancelled) => Ok(Outcome::Cancelled),
        }
    }

    /// Parses `paths` and loads every file that parses cleanly.
    pub fn import<P: AsRef<Path>>(
        &self,
        paths: &[P],
        progress: &dyn Progress,
    ) -> Result<ImportReport, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        self.import_unguarded(paths, progress)
    }

    /// Runs [`import`](Self::import) on a worker thread.
    ///
    /// The busy check happens before the thread starts, so a second request
    /// fails immediately.
    pub fn spawn_import(
        &self,
        paths: Vec<PathBuf>,
        token: CancellationToken,
    ) -> Result<JoinHandle<Result<ImportReport, SessionError>>, SessionError> {
        let guard = BusyGuard::acquire(&self.busy)?;
        let session = self.clone();
        thread::Builder::new()
            .name("coverage-import".into())
            .spawn(move || {
                let _guard = guard;
                session.import_unguarded(paths.as_slice(), &token)
            })
            .map_err(SessionError::Spawn)
    }

    fn import_unguarded<P: AsRef<Path>>(
        &self,
        paths: &[P],
        progress: &dyn Progress,
    ) -> Result<ImportReport, SessionError> {
        let mut parsed = Vec::new();
        let mut failed = Vec::new();
        for path in paths {
            let path = path.as_ref();
            progress.set_message(&format!("importing {}", path.display()));
            match CoverageRangeSet::import(path, self.decoder.as_ref(), progress) {
                Ok(set) => parsed.push(set),
                Err(err) if err.is_cancelled() => {
                    return Ok(ImportReport {
                        imported: Vec::new(),
                        failed,
                        outcome: Outcome::Cancelled,
                    });
                }
                Err(err) => {
                    tracing::warn!(error = %err, "coverage file rejected");
                    failed.push(err);
                }
            }
        }

        let imported: Vec<FileStatus> = parsed
            .iter()
            .map(|set| FileStatus {
                path: set.path().to_path_buf(),
                digest: set.source().digest.clone(),
                ranges: set.len(),
                enabled: true,
            })
            .collect();

        let outcome = if parsed.is_empty() {
            Outcome::Completed
        } else if progress.check_cancelled().is_err() {
            return Ok(ImportReport { imported: Vec::new(), failed, outcome: Outcome::Cancelled });
        } else {
            let merged = {
                let mut aggregate = lock(&self.aggregate)?;
                for set in parsed {
                    aggregate.load(set);
                }
                Outcome::from(aggregate.update(progress))
            };
            self.publish(merged, progress)?
        };
        tracing::info!(
            imported = imported.len(),
            failed = failed.len(),
            outcome = ?outcome,
            "coverage import finished"
        );
        Ok(ImportReport { imported, failed, outcome })
    }

    /// Recomputes the whole chain from what is loaded.
    pub fn refresh(&self, progress: &dyn Progress) -> Result<Outcome, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let outcome = Outcome::from(lock(&self.aggregate)?.update(progress));
        self.publish(outcome, progress)
    }

    /// Drops every imported file.
    pub fn clear(&self, progress: &dyn Progress) -> Result<Outcome, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let outcome = Outcome::from(lock(&self.aggregate)?.clear(progress));
        self.publish(outcome, progress)
    }

    /// Drops one imported file and recomputes.
    pub fn remove(&self, path: &Path, progress: &dyn Progress) -> Result<Outcome, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let outcome = {
            let mut aggregate = lock(&self.aggregate)?;
            if !aggregate.remove(path) {
                return Err(SessionError::UnknownFile(path.to_path_buf()));
            }
            Outcome::from(aggregate.update(progress))
        };
        self.publish(outcome, progress)
    }

    /// Includes or excludes one imported file and recomputes.
    pub fn set_enabled(
        &self,
        path: &Path,
        enabled: bool,
        progress: &dyn Progress,
    ) -> Result<Outcome, SessionError> {
        let _guard = BusyGuard::acquire(&self.busy)?;
        let outcome = {
            let mut aggregate = lock(&self.aggregate)?;
            if !aggregate.set_enabled(path, enabled) {
                return Err(SessionError::UnknownFile(path.to_path_buf()));
            }
            Outcome::from(aggregate.update(progress))
        };
        self.publish(outcome, progress)
    }

    pub fn files(&self) -> Result<Vec<FileStatus>, SessionError> {
        Ok(lock(&self.aggregate)?.files())
    }

    /// Current union of raw ranges, as published by the aggregate.
    pub fn raw_ranges(&self) -> Result<Vec<AddressRange>, SessionError> {
        Ok(lock(&self.aggregate)?.model_data().clone())
    }

    /// Current instruction hits, sorted by address.
    pub fn hits(&self) -> Result<Vec<AddressRange>, SessionError> {
        Ok(lock(&self.alignment)?.sorted_hits())
    }

    pub fn states(&self) -> Result<(ModelState, ModelState), SessionError> {
        let aggregate = lock(&self.aggregate)?.state();
        let alignment = lock(&self.alignment)?.state();
        Ok((aggregate, alignment))
    }

    pub fn summary(&self) -> Result<CoverageSummary, SessionError> {
        let alignment = lock(&self.alignment)?;
        Ok(summarize(self.listing.as_ref(), alignment.model_data()))
    }
}
