use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use covkeeper_core::model::{
    Cancelled, CoverageAggregateModel, CoverageModel, ModelListener, ModelState, Progress,
    Unbounded,
};
use covkeeper_core::ranges::{CoverageRangeSet, CoverageSource};
use covkeeper_core::{Address, AddressRange};

#[derive(Default)]
struct CountingListener {
    calls: AtomicUsize,
}

impl CountingListener {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ModelListener for CountingListener {
    fn model_changed(&self, _progress: &dyn Progress) -> Result<(), Cancelled> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Allows a fixed number of polls, then reports cancellation.
struct CancelAfter {
    remaining: AtomicUsize,
}

impl CancelAfter {
    fn new(polls: usize) -> Self {
        Self { remaining: AtomicUsize::new(polls) }
    }
}

impl Progress for CancelAfter {
    fn check_cancelled(&self) -> Result<(), Cancelled> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(Cancelled);
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        Ok(())
    }
}

fn range(min: u64, max: u64) -> AddressRange {
    AddressRange::new(Address::new(min), Address::new(max)).unwrap()
}

fn set(path: &str, ranges: &[(u64, u64)]) -> CoverageRangeSet {
    CoverageRangeSet::from_ranges(
        CoverageSource::from_bytes(path, path.as_bytes()),
        ranges.iter().map(|&(min, max)| range(min, max)),
    )
}

#[test]
fn starts_empty_and_load_does_not_publish() {
    let mut model = CoverageAggregateModel::new();
    assert_eq!(model.state(), ModelState::Empty);
    assert!(model.snapshot().get().is_none());

    model.load(set("a.cov", &[(0x10, 0x1f)]));
    assert_eq!(model.state(), ModelState::Loaded);
    assert!(model.model_data().is_empty(), "load must not recompute");
    assert!(model.snapshot().get().is_none());
}

#[test]
fn update_publishes_union_and_notifies_once() {
    let mut model = CoverageAggregateModel::new();
    let listener = Arc::new(CountingListener::default());
    model.add_listener(listener.clone());

    model.load(set("b.cov", &[(0x40, 0x40)]));
    model.load(set("a.cov", &[(0x10, 0x1f)]));
    model.update(&Unbounded).unwrap();

    assert_eq!(listener.calls(), 1);
    assert_eq!(model.model_data(), &vec![range(0x10, 0x1f), range(0x40, 0x40)]);
    let published = model.snapshot().get().expect("published union");
    assert_eq!(published.as_slice(), model.model_data().as_slice());
}

#[test]
fn duplicates_across_files_are_kept() {
    let mut model = CoverageAggregateModel::new();
    model.load(set("a.cov", &[(0x10, 0x1f)]));
    model.load(set("b.cov", &[(0x10, 0x1f)]));
    model.update(&Unbounded).unwrap();
    assert_eq!(model.model_data().len(), 2);
}

#[test]
fn reimport_replaces_file_wholesale() {
    let mut model = CoverageAggregateModel::new();
    model.load(set("a.cov", &[(0x10, 0x1f), (0x30, 0x3f)]));
    model.load(set("a.cov", &[(0x50, 0x5f)]));
    model.update(&Unbounded).unwrap();
    assert_eq!(model.file_count(), 1);
    assert_eq!(model.model_data(), &vec![range(0x50, 0x5f)]);
}

#[test]
fn disabled_files_leave_the_union_until_reenabled() {
    let mut model = CoverageAggregateModel::new();
    model.load(set("a.cov", &[(0x10, 0x1f)]));
    model.load(set("b.cov", &[(0x40, 0x4f)]));

    assert!(model.set_enabled(Path::new("a.cov"), false));
    model.update(&Unbounded).unwrap();
    assert_eq!(model.model_data(), &vec![range(0x40, 0x4f)]);
    assert_eq!(model.is_enabled(Path::new("a.cov")), Some(false));

    assert!(model.set_enabled(Path::new("a.cov"), true));
    model.update(&Unbounded).unwrap();
    assert_eq!(model.model_data().len(), 2);

    assert!(!model.set_enabled(Path::new("missing.cov"), true));
}

#[test]
fn removing_the_last_file_returns_to_empty() {
    let mut model = CoverageAggregateModel::new();
    model.load(set("a.cov", &[(0x10, 0x1f)]));
    model.update(&Unbounded).unwrap();

    assert!(model.remove(Path::new("a.cov")));
    model.update(&Unbounded).unwrap();
    assert_eq!(model.state(), ModelState::Empty);
    assert!(model.snapshot().get().is_none());
}

#[test]
fn cancelled_update_keeps_previous_union_and_does_not_notify() {
    let mut model = CoverageAggregateModel::new();
    let listener = Arc::new(CountingListener::default());
    model.add_listener(listener.clone());
    model.load(set("a.cov", &[(0x10, 0x1f)]));
    model.update(&Unbounded).unwrap();
    assert_eq!(listener.calls(), 1);

    model.load(set("b.cov", &[(0x40, 0x4f)]));
    let result = model.update(&CancelAfter::new(1));
    assert_eq!(result, Err(Cancelled));
    assert_eq!(listener.calls(), 1);
    assert_eq!(model.model_data(), &vec![range(0x10, 0x1f)]);
    assert_eq!(model.snapshot().get().expect("still published").len(), 1);
}

#[test]
fn clear_on_empty_model_notifies_exactly_once() {
    let mut model = CoverageAggregateModel::new();
    let listener = Arc::new(CountingListener::default());
    model.add_listener(listener.clone());

    model.clear(&Unbounded).unwrap();
    assert_eq!(model.state(), ModelState::Empty);
    assert_eq!(listener.calls(), 1);
}

#[test]
fn files_lists_status_per_file() {
    let mut model = CoverageAggregateModel::new();
    model.load(set("a.cov", &[(0x10, 0x1f), (0x20, 0x2f)]));
    model.set_enabled(Path::new("a.cov"), false);
    let files = model.files();
    assert_eq!(files.len(), 1);
    assert_eq!(files[0].ranges, 2);
    assert!(!files[0].enabled);
    assert_eq!(files[0].digest.len(), 64);
}
