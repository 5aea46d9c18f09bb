//! Incrementally recomputed models and change notification.
//!
//! Every model moves through the same lifecycle:
//!
//! - `Empty`: nothing loaded.
//! - `Loaded`: data present and consistent with the last `update`.
//! - `Stale`: an upstream model changed and this one has not caught up yet.
//!   Only dependents pass through it, and only for the duration of a
//!   notification.
//!
//! `load` stores input without recomputing. `update` recomputes derived data
//! and then notifies listeners. `clear` drops everything and notifies.
//! A cancelled `update` leaves the previous data in place and notifies no one.
//!
//! Producers publish their current output through a [`Snapshot`], a cheap
//! shared handle that dependents read from when notified. The producer is
//! never locked by its dependents.

use std::sync::{Arc, Mutex, RwLock};

use serde::Serialize;

pub mod coverage;
pub mod instruction;
mod progress;

pub use coverage::CoverageAggregateModel;
pub use instruction::InstructionAlignmentModel;
pub use progress::{CancellationToken, Cancelled, Progress, Unbounded};

/// Lifecycle state shared by all models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelState {
    Empty,
    Loaded,
    Stale,
}

/// Outcome of a recompute that may have been cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Completed,
    Cancelled,
}

impl From<Result<(), Cancelled>> for Outcome {
    fn from(result: Result<(), Cancelled>) -> Self {
        match result {
            Ok(()) => Outcome::Completed,
            Err(Cancelled) => Outcome::Cancelled,
        }
    }
}

/// Common contract of the coverage models.
///
/// `Input` is what `load` accepts; `Output` is the derived data exposed after
/// `update`.
pub trait CoverageModel {
    type Input;
    type Output;

    /// Stores input. Derived data is not recomputed until `update`.
    fn load(&mut self, input: Self::Input);

    /// Recomputes derived data from what is loaded, then notifies listeners.
    fn update(&mut self, progress: &dyn Progress) -> Result<(), Cancelled>;

    /// Discards loaded and derived data, then notifies listeners.
    fn clear(&mut self, progress: &dyn Progress) -> Result<(), Cancelled>;

    /// Derived data as of the last successful `update`.
    fn model_data(&self) -> &Self::Output;

    fn state(&self) -> ModelState;

    fn add_listener(&mut self, listener: Arc<dyn ModelListener>);
}

/// Anything that wants to hear about a model's data changing.
pub trait ModelListener: Send + Sync {
    fn model_changed(&self, progress: &dyn Progress) -> Result<(), Cancelled>;
}

/// A model that recomputes itself when the model it depends on changes.
///
/// Shared as `Arc<Mutex<M>>`, such a model is a [`ModelListener`] and can be
/// registered directly on its producer.
pub trait DependentModel: Send {
    fn model_changed(&mut self, progress: &dyn Progress) -> Result<(), Cancelled>;
}

impl<M: DependentModel> ModelListener for Mutex<M> {
    fn model_changed(&self, progress: &dyn Progress) -> Result<(), Cancelled> {
        match self.lock() {
            Ok(mut model) => model.model_changed(progress),
            Err(poisoned) => {
                tracing::warn!("dependent model lock poisoned; recomputing anyway");
                poisoned.into_inner().model_changed(progress)
            }
        }
    }
}

/// Registered listeners, notified in registration order.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Vec<Arc<dyn ModelListener>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Arc<dyn ModelListener>) {
        self.inner.push(listener);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Notifies every listener. Stops at the first one that was cancelled.
    pub fn notify(&self, progress: &dyn Progress) -> Result<(), Cancelled> {
        for listener in &self.inner {
            listener.model_changed(progress)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners").field("count", &self.inner.len()).finish()
    }
}

/// Shared read handle on a producer's most recently published data.
///
/// `None` means the producer is empty. Publishing swaps in a new `Arc`, so a
/// reader holding an older one keeps a consistent view.
#[derive(Debug)]
pub struct Snapshot<T> {
    cell: Arc<RwLock<Option<Arc<T>>>>,
}

impl<T> Clone for Snapshot<T> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self { cell: Arc::new(RwLock::new(None)) }
    }
}

impl<T> Snapshot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        match self.cell.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub(crate) fn publish(&self, value: Option<Arc<T>>) {
        match self.cell.write() {
            Ok(mut guard) => *guard = value,
            Err(poisoned) => *poisoned.into_inner() = value,
        }
    }
}
