use std::num::NonZeroUsize;

use feedline_primitives::{CollectionId, Cursor, Record, RecordId, Timestamp};
use feedline_worker::Generation;
use proptest::prelude::*;
use proptest::sample::Index;
use rustc_hash::FxHashSet;

use super::*;
use crate::{BackendError, BoundaryPolicy, FeedConfig, FeedErrorKind};

#[derive(Debug, Clone)]
enum Op {
	/// Append `n` records newer than everything in the collection.
	Insert(u8),
	DeleteNewest,
	DeleteAt(Index),
	LoadOlder,
	/// Resolve the outstanding page read, if any.
	Resolve { ok: bool },
	Refresh,
}

fn op_strategy() -> impl Strategy<Value = Op> {
	prop_oneof![
		3 => (1u8..=3).prop_map(Op::Insert),
		1 => Just(Op::DeleteNewest),
		1 => any::<Index>().prop_map(Op::DeleteAt),
		3 => Just(Op::LoadOlder),
		3 => any::<bool>().prop_map(|ok| Op::Resolve { ok }),
		1 => Just(Op::Refresh),
	]
}

fn boundary_strategy() -> impl Strategy<Value = BoundaryPolicy> {
	prop_oneof![Just(BoundaryPolicy::Fold), Just(BoundaryPolicy::Accept)]
}

fn rec(n: i64) -> Record<()> {
	Record::new(format!("r{n}"), Timestamp::from_micros(n), ())
}

/// Drives a [`FeedState`] against an in-test collection, executing effects
/// synchronously the way the merger actor would.
struct Harness {
	/// Ascending.
	collection: Vec<Record<()>>,
	next: i64,
	state: FeedState<()>,
	subscribed: Option<Generation>,
	pending: Option<(Generation, Cursor)>,
	last_cursor: Option<(Generation, Cursor)>,
	/// Removed from the collection while part of the live window.
	deleted_from_live: FxHashSet<RecordId>,
	/// Ids delivered in a live window since the last refresh.
	shown: FxHashSet<RecordId>,
}

impl Harness {
	fn new(size: usize, boundary: BoundaryPolicy, initial: usize) -> Self {
		let size = NonZeroUsize::new(size).expect("size strategies start at 1");
		let next = i64::try_from(initial).expect("small collection");
		let mut harness = Self {
			collection: (1..=next).map(rec).collect(),
			next,
			state: FeedState::new(FeedConfig::with_size(size).boundary(boundary)),
			subscribed: None,
			pending: None,
			last_cursor: None,
			deleted_from_live: FxHashSet::default(),
			shown: FxHashSet::default(),
		};
		let applied = harness.state.apply(FeedEvent::Observe(CollectionId::from("feed")));
		harness.process(applied);
		harness.check();
		harness
	}

	fn process(&mut self, applied: Applied) {
		for effect in applied.effects {
			match effect {
				Effect::Subscribe { generation, .. } => {
					self.subscribed = Some(generation);
					self.push_snapshot();
				}
				Effect::Unsubscribe => self.subscribed = None,
				Effect::FetchOlder { generation, cursor, .. } => self.pending = Some((generation, cursor)),
			}
		}
	}

	fn push_snapshot(&mut self) {
		let Some(generation) = self.subscribed else {
			return;
		};
		let window = self.state.config().window_size.get();
		let records = self.collection.iter().rev().take(window).cloned().collect();
		let applied = self.state.apply(FeedEvent::Snapshot { generation, records });
		self.process(applied);
	}

	fn page_before(&self, cursor: &Cursor) -> Vec<Record<()>> {
		let limit = self.state.config().page_size.get();
		self.collection.iter().rev().filter(|record| cursor.is_after(record)).take(limit).cloned().collect()
	}

	fn step(&mut self, op: &Op) {
		match op {
			Op::Insert(count) => {
				for _ in 0..*count {
					self.next += 1;
					self.collection.push(rec(self.next));
				}
				self.push_snapshot();
			}
			Op::DeleteNewest => {
				if let Some(removed) = self.collection.pop() {
					self.deleted(removed);
				}
			}
			Op::DeleteAt(index) => {
				if !self.collection.is_empty() {
					let removed = self.collection.remove(index.index(self.collection.len()));
					self.deleted(removed);
				}
			}
			Op::LoadOlder => {
				let applied = self.state.apply(FeedEvent::LoadOlder);
				self.process(applied);
			}
			Op::Resolve { ok } => {
				if let Some((generation, cursor)) = self.pending.take() {
					let event = if *ok {
						FeedEvent::PageLoaded {
							generation,
							records: self.page_before(&cursor),
						}
					} else {
						FeedEvent::PageFailed {
							generation,
							error: BackendError::Unavailable("offline".into()),
						}
					};
					let applied = self.state.apply(event);
					self.process(applied);
				}
			}
			Op::Refresh => {
				self.shown.clear();
				let applied = self.state.apply(FeedEvent::Refresh);
				self.process(applied);
			}
		}
		self.check();
	}

	fn deleted(&mut self, removed: Record<()>) {
		if self.state.live.iter().any(|record| record.id == removed.id) {
			self.deleted_from_live.insert(removed.id);
		}
		self.push_snapshot();
	}

	fn check(&mut self) {
		self.shown.extend(self.state.live.iter().map(|record| record.id.clone()));
		let state = &self.state;
		let combined: Vec<_> = state.combined().collect();
		for record in &combined {
			assert!(!self.deleted_from_live.contains(&record.id), "{} came back after its deletion was delivered", record.id);
		}
		if state.config().boundary == BoundaryPolicy::Fold {
			let held: FxHashSet<_> = combined.iter().map(|record| &record.id).collect();
			for record in &self.collection {
				assert!(
					!self.shown.contains(&record.id) || held.contains(&record.id),
					"{} was shown and still exists but left the feed",
					record.id
				);
			}
		}
		assert!(combined.windows(2).all(|pair| pair[0].key() < pair[1].key()), "combined not strictly ascending: {combined:?}");
		let unique: FxHashSet<_> = combined.iter().map(|record| &record.id).collect();
		assert_eq!(unique.len(), combined.len(), "duplicate ids in {combined:?}");
		if let (Some(newest_older), Some(oldest_live)) = (state.older.last(), state.live.first()) {
			assert!(newest_older.key() < oldest_live.key());
		}

		if state.reached_beginning() {
			assert!(!state.has_more());
		}
		if state.is_loading_more() {
			assert!(matches!(&self.pending, Some((generation, _)) if *generation == state.generation()));
		}

		// An emptied collection clears the cursor; tracking restarts from there.
		match state.cursor() {
			Some(cursor) => {
				if let Some((generation, previous)) = &self.last_cursor
					&& *generation == state.generation()
				{
					assert!(cursor <= previous, "cursor moved forward from {previous:?} to {cursor:?}");
				}
				self.last_cursor = Some((state.generation(), cursor.clone()));
			}
			None => self.last_cursor = None,
		}
	}
}

proptest! {
	#![proptest_config(ProptestConfig::with_cases(256))]

	#[test]
	fn combined_stays_ordered_and_disjoint(
		size in 1usize..6,
		boundary in boundary_strategy(),
		initial in 0usize..20,
		ops in prop::collection::vec(op_strategy(), 0..60),
	) {
		let mut harness = Harness::new(size, boundary, initial);
		for op in &ops {
			harness.step(op);
		}
	}

	#[test]
	fn paging_terminates_within_page_bound(
		size in 1usize..8,
		boundary in boundary_strategy(),
		total in 0usize..60,
	) {
		let mut harness = Harness::new(size, boundary, total);
		let bound = total.div_ceil(size);
		let mut reads = 0;
		while !harness.state.reached_beginning() && reads <= bound {
			harness.step(&Op::LoadOlder);
			harness.step(&Op::Resolve { ok: true });
			reads += 1;
		}
		prop_assert!(harness.state.reached_beginning());
		prop_assert!(reads <= bound, "{reads} reads for {total} records at page size {size}");
		let ids: Vec<_> = harness.state.combined().map(|record| record.id.clone()).collect();
		let expected: Vec<_> = harness.collection.iter().map(|record| record.id.clone()).collect();
		prop_assert_eq!(ids, expected);
		prop_assert_eq!(harness.state.apply(FeedEvent::LoadOlder).skipped, Some(SkipReason::ReachedBeginning));
	}

	#[test]
	fn stale_page_never_alters_fresh_generation(
		size in 1usize..6,
		boundary in boundary_strategy(),
		total in 1usize..40,
		ok in any::<bool>(),
		inserts in 0u8..3,
	) {
		let mut stale = Harness::new(size, boundary, total);
		stale.step(&Op::LoadOlder);
		let pending = stale.pending.take();
		stale.step(&Op::Refresh);

		let mut fresh = Harness::new(size, boundary, total);
		fresh.step(&Op::Refresh);
		if inserts > 0 {
			stale.step(&Op::Insert(inserts));
			fresh.step(&Op::Insert(inserts));
		}
		prop_assert_eq!(&stale.state, &fresh.state);

		if let Some((generation, cursor)) = pending {
			prop_assert_ne!(generation, stale.state.generation());
			let event = if ok {
				FeedEvent::PageLoaded { generation, records: stale.page_before(&cursor) }
			} else {
				FeedEvent::PageFailed { generation, error: BackendError::Terminated }
			};
			let applied = stale.state.apply(event);
			prop_assert!(!applied.changed);
			prop_assert!(applied.effects.is_empty());
		}
		prop_assert_eq!(&stale.state, &fresh.state);
	}

	#[test]
	fn failed_page_only_sets_error(
		size in 1usize..6,
		boundary in boundary_strategy(),
		initial in 0usize..20,
		ops in prop::collection::vec(op_strategy(), 0..30),
	) {
		let mut harness = Harness::new(size, boundary, initial);
		for op in &ops {
			harness.step(op);
		}
		harness.step(&Op::Resolve { ok: true });

		let before = harness.state.clone();
		harness.step(&Op::LoadOlder);
		if harness.pending.is_some() {
			harness.step(&Op::Resolve { ok: false });
			prop_assert_eq!(harness.state.last_error(), Some(FeedErrorKind::LoadOlderFailed));
			let mut after = harness.state.clone();
			after.last_error = before.last_error;
			prop_assert_eq!(after, before);
		} else {
			prop_assert_eq!(&harness.state, &before);
		}
	}
}
