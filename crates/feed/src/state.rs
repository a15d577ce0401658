use std::sync::Arc;

use feedline_primitives::{CollectionId, Cursor, Record};
use feedline_worker::Generation;
use smallvec::SmallVec;

use crate::{BackendError, FeedConfig, FeedErrorKind, live, pager};

#[cfg(test)]
mod proptests;

/// Lifecycle phase of a feed, derived from its flags.
///
/// `Idle → Loading → Ready ⇄ LoadingMore`. A refresh or collection change
/// resets any phase back to `Loading` at the next generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeedPhase {
	/// No collection is observed.
	Idle,
	/// Waiting for the first live snapshot of the generation.
	Loading,
	/// Live data (or a terminal live error) is present.
	Ready,
	/// One historical read is outstanding.
	LoadingMore,
}

/// Why a `load_older` request was ignored. None of these is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
	/// No collection is observed.
	Idle,
	/// No record has been observed yet, so there is nothing to page before.
	NoCursorAvailable,
	/// A historical read is already outstanding for this generation.
	InFlight,
	/// The oldest record of the collection is already held.
	ReachedBeginning,
}

/// Input to [`FeedState::apply`].
#[derive(Debug)]
pub enum FeedEvent<P> {
	/// Start (or switch to) observing a collection.
	Observe(CollectionId),
	/// Extend history by one page.
	LoadOlder,
	/// Drop everything and restart the live subscription.
	Refresh,
	/// Stop observing.
	Teardown,
	/// A live window snapshot, newest first, as delivered by the backend.
	Snapshot { generation: Generation, records: Vec<Record<P>> },
	/// The live stream failed or ended.
	SubscriptionFailed { generation: Generation, error: BackendError },
	/// A historical read resolved, newest first.
	PageLoaded { generation: Generation, records: Vec<Record<P>> },
	/// A historical read failed.
	PageFailed { generation: Generation, error: BackendError },
}

/// Side effect requested by the reducer, executed by the merger actor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
	/// Start a live subscription whose deliveries are tagged `generation`.
	Subscribe { generation: Generation, collection: CollectionId },
	/// Cancel the current live subscription, if any.
	Unsubscribe,
	/// Issue one historical read strictly older than `cursor`.
	FetchOlder {
		generation: Generation,
		collection: CollectionId,
		cursor: Cursor,
	},
}

/// Outcome of one reducer step.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Applied {
	/// Observable state changed; a new view should be published.
	pub changed: bool,
	/// Effects to execute, in order.
	pub effects: SmallVec<[Effect; 2]>,
	/// Set when a `LoadOlder` request was ignored.
	pub skipped: Option<SkipReason>,
}

impl Applied {
	pub(crate) fn changed() -> Self {
		Self {
			changed: true,
			..Self::default()
		}
	}

	pub(crate) fn skipped(reason: SkipReason) -> Self {
		Self {
			skipped: Some(reason),
			..Self::default()
		}
	}

	#[must_use]
	pub(crate) fn effect(mut self, effect: Effect) -> Self {
		self.effects.push(effect);
		self
	}
}

/// The complete state of one feed.
///
/// Mutated only through [`FeedState::apply`]. Live snapshots own `live`;
/// resolved pages own `older` and `cursor`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedState<P> {
	pub(crate) config: FeedConfig,
	pub(crate) collection: Option<CollectionId>,
	pub(crate) generation: Generation,
	pub(crate) live: Vec<Record<P>>,
	pub(crate) older: Vec<Record<P>>,
	pub(crate) cursor: Option<Cursor>,
	pub(crate) reached_beginning: bool,
	pub(crate) has_more: bool,
	pub(crate) loading: bool,
	pub(crate) loading_more: bool,
	pub(crate) last_error: Option<FeedErrorKind>,
	/// The live stream of this generation failed; later snapshots are ignored.
	pub(crate) live_terminated: bool,
	/// At least one historical page was applied in this generation.
	pub(crate) pages_loaded: bool,
}

impl<P> FeedState<P> {
	pub fn new(config: FeedConfig) -> Self {
		Self {
			config,
			collection: None,
			generation: Generation::ZERO,
			live: Vec::new(),
			older: Vec::new(),
			cursor: None,
			reached_beginning: false,
			has_more: false,
			loading: false,
			loading_more: false,
			last_error: None,
			live_terminated: false,
			pages_loaded: false,
		}
	}

	pub fn config(&self) -> &FeedConfig {
		&self.config
	}

	pub fn collection(&self) -> Option<&CollectionId> {
		self.collection.as_ref()
	}

	pub fn generation(&self) -> Generation {
		self.generation
	}

	pub fn live_records(&self) -> &[Record<P>] {
		&self.live
	}

	pub fn older_records(&self) -> &[Record<P>] {
		&self.older
	}

	pub fn cursor(&self) -> Option<&Cursor> {
		self.cursor.as_ref()
	}

	pub fn reached_beginning(&self) -> bool {
		self.reached_beginning
	}

	pub fn has_more(&self) -> bool {
		self.has_more
	}

	pub fn is_loading(&self) -> bool {
		self.loading
	}

	pub fn is_loading_more(&self) -> bool {
		self.loading_more
	}

	pub fn last_error(&self) -> Option<FeedErrorKind> {
		self.last_error
	}

	pub fn phase(&self) -> FeedPhase {
		if self.collection.is_none() {
			FeedPhase::Idle
		} else if self.loading {
			FeedPhase::Loading
		} else if self.loading_more {
			FeedPhase::LoadingMore
		} else {
			FeedPhase::Ready
		}
	}

	/// `older ++ live`, ascending.
	pub fn combined(&self) -> impl Iterator<Item = &Record<P>> {
		self.older.iter().chain(&self.live)
	}

	/// Advances the state by one event and returns the effects to execute.
	pub fn apply(&mut self, event: FeedEvent<P>) -> Applied {
		match event {
			FeedEvent::Observe(collection) => self.observe(collection),
			FeedEvent::LoadOlder => self.load_older(),
			FeedEvent::Refresh => self.refresh(),
			FeedEvent::Teardown => self.teardown(),
			FeedEvent::Snapshot { generation, records } => {
				if !self.accepts(generation, "snapshot") {
					return Applied::default();
				}
				if self.live_terminated {
					tracing::trace!(generation = %generation, "ignoring snapshot after live stream failure");
					return Applied::default();
				}
				live::apply_snapshot(self, records)
			}
			FeedEvent::SubscriptionFailed { generation, error } => {
				if !self.accepts(generation, "subscription failure") || self.live_terminated {
					return Applied::default();
				}
				live::apply_failure(self, &error)
			}
			FeedEvent::PageLoaded { generation, records } => {
				if !self.accepts(generation, "page") || !self.loading_more {
					return Applied::default();
				}
				pager::apply_page(self, records)
			}
			FeedEvent::PageFailed { generation, error } => {
				if !self.accepts(generation, "page failure") || !self.loading_more {
					return Applied::default();
				}
				pager::apply_failure(self, &error)
			}
		}
	}

	fn accepts(&self, generation: Generation, what: &'static str) -> bool {
		if self.collection.is_none() || generation.is_stale(self.generation) {
			tracing::trace!(generation = %generation, current = %self.generation, what, "discarding stale feed result");
			return false;
		}
		true
	}

	fn observe(&mut self, collection: CollectionId) -> Applied {
		if self.collection.as_ref() == Some(&collection) {
			return Applied::default();
		}
		if self.collection.is_some() {
			self.reset(Some(collection.clone()));
			tracing::debug!(generation = %self.generation, %collection, "feed switched collection");
			return Applied::changed().effect(Effect::Unsubscribe).effect(Effect::Subscribe {
				generation: self.generation,
				collection,
			});
		}
		self.collection = Some(collection.clone());
		self.loading = true;
		tracing::debug!(generation = %self.generation, %collection, "feed observing collection");
		Applied::changed().effect(Effect::Subscribe {
			generation: self.generation,
			collection,
		})
	}

	fn load_older(&mut self) -> Applied {
		let reason = if self.collection.is_none() {
			Some(SkipReason::Idle)
		} else if self.loading_more {
			Some(SkipReason::InFlight)
		} else if self.reached_beginning {
			Some(SkipReason::ReachedBeginning)
		} else {
			None
		};
		match reason {
			Some(reason) => {
				tracing::trace!(generation = %self.generation, ?reason, "load_older skipped");
				Applied::skipped(reason)
			}
			None => pager::begin_fetch(self),
		}
	}

	fn refresh(&mut self) -> Applied {
		let Some(collection) = self.collection.clone() else {
			return Applied::default();
		};
		self.reset(Some(collection.clone()));
		tracing::debug!(generation = %self.generation, %collection, "feed refreshed");
		Applied::changed().effect(Effect::Unsubscribe).effect(Effect::Subscribe {
			generation: self.generation,
			collection,
		})
	}

	fn teardown(&mut self) -> Applied {
		if self.collection.is_none() {
			return Applied::default();
		}
		self.reset(None);
		tracing::debug!(generation = %self.generation, "feed torn down");
		Applied::changed().effect(Effect::Unsubscribe)
	}

	/// Drops all accumulated records and flags and enters the next generation.
	pub(crate) fn reset(&mut self, collection: Option<CollectionId>) {
		let config = self.config;
		let generation = self.generation.next();
		let loading = collection.is_some();
		*self = Self {
			collection,
			generation,
			loading,
			..Self::new(config)
		};
	}
}

impl<P: Clone> FeedState<P> {
	/// Immutable snapshot of everything a consumer renders.
	pub fn view(&self) -> FeedView<P> {
		FeedView {
			collection: self.collection.clone(),
			generation: self.generation,
			phase: self.phase(),
			combined: self.combined().cloned().collect(),
			loading: self.loading,
			loading_more: self.loading_more,
			has_more: self.has_more,
			reached_beginning: self.reached_beginning,
			last_error: self.last_error,
		}
	}
}

/// Published view of a feed: the combined sequence plus progress flags.
#[derive(Debug, Clone)]
pub struct FeedView<P> {
	pub collection: Option<CollectionId>,
	pub generation: Generation,
	pub phase: FeedPhase,
	/// `older ++ live`, ascending by `(timestamp, id)`.
	pub combined: Arc<[Record<P>]>,
	pub loading: bool,
	pub loading_more: bool,
	pub has_more: bool,
	pub reached_beginning: bool,
	pub last_error: Option<FeedErrorKind>,
}

impl<P> Default for FeedView<P> {
	fn default() -> Self {
		Self {
			collection: None,
			generation: Generation::ZERO,
			phase: FeedPhase::Idle,
			combined: Arc::from(Vec::new()),
			loading: false,
			loading_more: false,
			has_more: false,
			reached_beginning: false,
			last_error: None,
		}
	}
}

impl<P> FeedView<P> {
	pub fn len(&self) -> usize {
		self.combined.len()
	}

	pub fn is_empty(&self) -> bool {
		self.combined.is_empty()
	}

	/// Record ids in display order.
	pub fn ids(&self) -> Vec<&str> {
		self.combined.iter().map(|record| record.id.as_str()).collect()
	}
}
