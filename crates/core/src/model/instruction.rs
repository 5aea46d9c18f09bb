//! Instruction-aligned hits derived from raw coverage and a listing.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use super::coverage::RawRanges;
use super::{
    Cancelled, CoverageAggregateModel, CoverageModel, DependentModel, Listeners, ModelListener,
    ModelState, Progress, Snapshot,
};
use crate::address::AddressRange;
use crate::listing::Listing;

/// Maps raw covered ranges onto instruction boundaries.
///
/// An instruction is hit when it starts inside a raw range and ends no later
/// than that range's maximum. Each hit is recorded as the instruction's own
/// span, not the raw range's.
pub struct InstructionAlignmentModel {
    listing: Arc<dyn Listing>,
    upstream: Snapshot<RawRanges>,
    ranges: Option<Arc<RawRanges>>,
    aligned_from: Option<Arc<RawRanges>>,
    hits: HashSet<AddressRange>,
    state: ModelState,
    listeners: Listeners,
}

impl std::fmt::Debug for InstructionAlignmentModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionAlignmentModel")
            .field("ranges", &self.ranges.as_ref().map(|r| r.len()))
            .field("hits", &self.hits.len())
            .field("state", &self.state)
            .finish()
    }
}

impl InstructionAlignmentModel {
    pub fn new(listing: Arc<dyn Listing>, upstream: Snapshot<RawRanges>) -> Self {
        Self {
            listing,
            upstream,
            ranges: None,
            aligned_from: None,
            hits: HashSet::new(),
            state: ModelState::Empty,
            listeners: Listeners::new(),
        }
    }

    /// Creates a model reading from `aggregate` and registers it as a listener.
    pub fn attach(
        aggregate: &mut CoverageAggregateModel,
        listing: Arc<dyn Listing>,
    ) -> Arc<Mutex<Self>> {
        let model = Arc::new(Mutex::new(Self::new(listing, aggregate.snapshot())));
        aggregate.add_listener(model.clone());
        model
    }

    pub fn listing(&self) -> &Arc<dyn Listing> {
        &self.listing
    }

    /// Raw ranges the current hits were computed from. Input loaded since
    /// the last successful recompute is not reflected here.
    pub fn raw_ranges(&self) -> Option<&RawRanges> {
        self.aligned_from.as_deref()
    }

    /// Hits ordered by address.
    pub fn sorted_hits(&self) -> Vec<AddressRange> {
        let mut hits: Vec<AddressRange> = self.hits.iter().copied().collect();
        hits.sort();
        hits
    }

    fn align(
        &self,
        ranges: &[AddressRange],
        progress: &dyn Progress,
    ) -> Result<HashSet<AddressRange>, Cancelled> {
        let mut hits = HashSet::new();
        for range in ranges {
            progress.check_cancelled()?;
            for insn in self.listing.instructions_from(range.start()) {
                if insn.end() > range.end() {
                    break;
                }
                hits.insert(insn.span());
            }
        }
        Ok(hits)
    }

    /// Recomputes hits from the loaded ranges and swaps them in, without notifying.
    fn rebuild(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        let hits = match &self.ranges {
            Some(ranges) => self.align(ranges, progress)?,
            None => HashSet::new(),
        };
        self.hits = hits;
        self.aligned_from = self.ranges.clone();
        self.state = if self.ranges.is_some() { ModelState::Loaded } else { ModelState::Empty };
        tracing::debug!(
            ranges = self.ranges.as_ref().map(|r| r.len()).unwrap_or(0),
            hits = self.hits.len(),
            "instruction hits recomputed"
        );
        Ok(())
    }
}

impl CoverageModel for InstructionAlignmentModel {
    type Input = Arc<RawRanges>;
    type Output = HashSet<AddressRange>;

    fn load(&mut self, ranges: Arc<RawRanges>) {
        self.ranges = Some(ranges);
        self.state = ModelState::Loaded;
    }

    fn update(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        self.rebuild(progress)?;
        self.listeners.notify(progress)
    }

    fn clear(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        self.ranges = None;
        self.aligned_from = None;
        self.hits = HashSet::new();
        self.state = ModelState::Empty;
        self.listeners.notify(progress)
    }

    fn model_data(&self) -> &HashSet<AddressRange> {
        &self.hits
    }

    fn state(&self) -> ModelState {
        self.state
    }

    fn add_listener(&mut self, listener: Arc<dyn ModelListener>) {
        self.listeners.add(listener);
    }
}

impl DependentModel for InstructionAlignmentModel {
    /// Re-reads the upstream union, then reloads and recomputes.
    ///
    /// If the recompute is cancelled the previous ranges, hits and state are
    /// kept and no one is notified.
    fn model_changed(&mut self, progress: &dyn Progress) -> Result<(), Cancelled> {
        let previous_state = self.state;
        let previous_ranges = self.ranges.clone();
        self.state = ModelState::Stale;

        let Some(ranges) = self.upstream.get() else {
            return self.clear(progress);
        };
        self.load(ranges);
        if let Err(cancelled) = self.rebuild(progress) {
            tracing::warn!("instruction alignment cancelled; keeping previous hits");
            self.ranges = previous_ranges;
            self.state = previous_state;
            return Err(cancelled);
        }
        self.listeners.notify(progress)
    }
}
