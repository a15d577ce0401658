//! Historical pages: one-shot reads strictly older than the cursor.

use std::num::NonZeroUsize;
use std::sync::Arc;

use feedline_primitives::{CollectionId, Cursor, Record, RecordId, sort_ascending};
use feedline_worker::{Generation, TaskClass};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{PageQuery, PageSource};
use crate::state::{Applied, Effect, FeedEvent, FeedState, SkipReason};
use crate::{BackendError, FeedErrorKind};

/// Issues historical reads and posts their results, tagged with the
/// generation they were issued under, into the merger queue.
///
/// Reads are never aborted; a result that arrives after a reset is simply
/// discarded by the reducer.
#[derive(Debug)]
pub struct HistoricalPager<B> {
	backend: Arc<B>,
	page_size: NonZeroUsize,
}

impl<B> HistoricalPager<B> {
	pub fn new(backend: Arc<B>, page_size: NonZeroUsize) -> Self {
		Self { backend, page_size }
	}

	/// Performs exactly one remote read in the background.
	pub fn fetch<P>(&self, generation: Generation, collection: CollectionId, cursor: Cursor, events: mpsc::UnboundedSender<FeedEvent<P>>) -> JoinHandle<()>
	where
		P: Send + 'static,
		B: PageSource<P>,
	{
		let backend = Arc::clone(&self.backend);
		let query = PageQuery {
			collection,
			before: cursor,
			limit: self.page_size.get(),
		};
		tracing::debug!(generation = %generation, collection = %query.collection, before = %query.before.id, "fetching older page");
		feedline_worker::spawn(TaskClass::Background, async move {
			let event = match backend.fetch_older(query).await {
				Ok(records) => FeedEvent::PageLoaded { generation, records },
				Err(error) => FeedEvent::PageFailed { generation, error },
			};
			let _ = events.send(event);
		})
	}
}

/// Claims the single in-flight slot and requests a read before the cursor.
pub(crate) fn begin_fetch<P>(state: &mut FeedState<P>) -> Applied {
	let (Some(collection), Some(cursor)) = (state.collection.clone(), state.cursor.clone()) else {
		tracing::trace!(generation = %state.generation, "load_older skipped: no cursor yet");
		return Applied::skipped(SkipReason::NoCursorAvailable);
	};
	state.loading_more = true;
	Applied::changed().effect(Effect::FetchOlder {
		generation: state.generation,
		collection,
		cursor,
	})
}

/// Merges a resolved page into the historical half.
///
/// Records already held (in either half) or not strictly below the live
/// window are dropped; the rest are merged by key.
pub(crate) fn apply_page<P>(state: &mut FeedState<P>, records: Vec<Record<P>>) -> Applied {
	let page_size = state.config.page_size.get();
	let delivered = records.len();
	let oldest_live = state.live.first().map(Cursor::at);
	let held: FxHashSet<RecordId> = state.combined().map(|record| record.id.clone()).collect();
	let mut batch: Vec<_> = records
		.into_iter()
		.filter(|record| oldest_live.as_ref().is_none_or(|bound| bound.is_after(record)))
		.collect();
	sort_ascending(&mut batch);
	batch.dedup_by(|next, prev| next.id == prev.id);

	if let Some(oldest) = batch.first() {
		state.cursor = Some(Cursor::older(state.cursor.take(), Cursor::at(oldest)));
	}
	batch.retain(|record| !held.contains(&record.id));
	let added = batch.len();
	if added > 0 {
		state.older.append(&mut batch);
		sort_ascending(&mut state.older);
	}
	state.loading_more = false;
	state.pages_loaded = true;
	if state.last_error == Some(FeedErrorKind::LoadOlderFailed) {
		state.last_error = None;
	}

	if delivered < page_size {
		state.reached_beginning = true;
		state.has_more = false;
	} else {
		state.has_more = true;
	}

	tracing::debug!(
		generation = %state.generation,
		delivered,
		added,
		older = state.older.len(),
		reached_beginning = state.reached_beginning,
		"older page applied"
	);
	Applied::changed()
}

/// Releases the in-flight slot after a failed read; records stay untouched.
pub(crate) fn apply_failure<P>(state: &mut FeedState<P>, error: &BackendError) -> Applied {
	tracing::warn!(generation = %state.generation, collection = ?state.collection, %error, "loading older page failed");
	state.loading_more = false;
	state.last_error = Some(FeedErrorKind::LoadOlderFailed);
	Applied::changed()
}
