//! Live window: the pushed "most recent N" half of a feed.

use feedline_primitives::{CollectionId, Cursor, Record, RecordId, sort_ascending};
use feedline_worker::{Generation, GenerationToken, TaskClass};
use rustc_hash::FxHashSet;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::backend::{LiveEvent, LiveQuery, LiveSource, SnapshotSink, Subscription};
use crate::state::{Applied, Effect, FeedEvent, FeedState};
use crate::{BackendError, BoundaryPolicy, FeedErrorKind};

/// Running live subscription of one generation.
///
/// Drains the backend's snapshot stream on a forwarder task and posts each
/// delivery into the merger queue tagged with the subscription's generation.
/// Cancelling (or dropping) stops the forwarder and unsubscribes.
#[derive(Debug)]
pub struct LiveWindowSubscriber {
	subscription: Subscription,
	token: GenerationToken,
	_forwarder: JoinHandle<()>,
}

impl LiveWindowSubscriber {
	pub fn start<P, B>(
		backend: &B, collection: CollectionId, window_size: usize, generation: Generation, events: mpsc::UnboundedSender<FeedEvent<P>>,
	) -> Result<Self, BackendError>
	where
		P: Send + 'static,
		B: LiveSource<P> + ?Sized,
	{
		let (sink, mut rx) = SnapshotSink::channel();
		let subscription = backend.subscribe(
			LiveQuery {
				collection: collection.clone(),
				limit: window_size,
			},
			sink,
		)?;
		tracing::debug!(generation = %generation, %collection, window_size, "live subscription started");

		let token = GenerationToken::new(generation);
		let forwarder_token = token.clone();
		let forwarder = feedline_worker::spawn(TaskClass::Stream, async move {
			loop {
				tokio::select! {
					biased;
					() = forwarder_token.cancelled() => break,
					delivery = rx.recv() => {
						let event = match delivery {
							Some(LiveEvent::Snapshot(records)) => FeedEvent::Snapshot { generation, records },
							Some(LiveEvent::Failed(error)) => FeedEvent::SubscriptionFailed { generation, error },
							None => FeedEvent::SubscriptionFailed {
								generation,
								error: BackendError::Terminated,
							},
						};
						let terminal = !matches!(event, FeedEvent::Snapshot { .. });
						if events.send(event).is_err() || terminal {
							break;
						}
					}
				}
			}
			tracing::trace!(generation = %generation, "live forwarder stopped");
		});

		Ok(Self {
			subscription,
			token,
			_forwarder: forwarder,
		})
	}

	pub fn generation(&self) -> Generation {
		self.token.generation()
	}

	pub fn cancel(&self) {
		self.token.cancel();
		self.subscription.cancel();
	}
}

impl Drop for LiveWindowSubscriber {
	fn drop(&mut self) {
		self.cancel();
	}
}

/// Replaces the live half with a delivered snapshot.
pub(crate) fn apply_snapshot<P>(state: &mut FeedState<P>, records: Vec<Record<P>>) -> Applied {
	let window = state.config.window_size.get();
	let delivered = records.len();
	let full = delivered >= window;
	let mut incoming = records;
	sort_ascending(&mut incoming);
	incoming.dedup_by(|next, prev| next.id == prev.id);

	let mut applied = Applied::changed();
	if state.config.boundary == BoundaryPolicy::Fold && skips_unobserved(&state.live, &incoming, full) {
		applied = restart_below_window(state, applied);
	}

	state.loading = false;
	let previous = std::mem::replace(&mut state.live, incoming);
	reconcile_history(state, previous, full);

	if full {
		if let Some(oldest) = state.live.first() {
			state.cursor = Some(Cursor::older(state.cursor.take(), Cursor::at(oldest)));
		}
		if !state.reached_beginning {
			state.has_more = true;
		}
	} else if delivered == 0 && state.older.is_empty() {
		state.cursor = None;
		state.reached_beginning = true;
		state.has_more = false;
	} else if !state.pages_loaded {
		state.reached_beginning = true;
		state.has_more = false;
	}

	tracing::debug!(
		generation = %state.generation,
		live = state.live.len(),
		older = state.older.len(),
		reached_beginning = state.reached_beginning,
		"live snapshot applied"
	);
	applied
}

/// Enters the next generation with every record shown so far kept as history.
///
/// The cursor restarts at the new window, so paging walks down through the
/// possibly skipped records first; pages merge into history by id.
fn restart_below_window<P>(state: &mut FeedState<P>, applied: Applied) -> Applied {
	let collection = state.collection.clone();
	let mut shown = std::mem::take(&mut state.older);
	shown.append(&mut state.live);
	state.reset(collection.clone());
	state.older = shown;
	tracing::debug!(generation = %state.generation, older = state.older.len(), "live window jumped past unobserved records, paging restarts below it");
	match collection {
		Some(collection) => applied.effect(Effect::Unsubscribe).effect(Effect::Subscribe {
			generation: state.generation,
			collection,
		}),
		None => applied,
	}
}

/// Marks the live stream of the current generation as failed.
pub(crate) fn apply_failure<P>(state: &mut FeedState<P>, error: &BackendError) -> Applied {
	tracing::warn!(generation = %state.generation, collection = ?state.collection, %error, "live subscription failed");
	state.live_terminated = true;
	state.loading = false;
	state.last_error = Some(FeedErrorKind::SubscriptionError);
	Applied::changed().effect(Effect::Unsubscribe)
}

/// A full window whose oldest record is newer than everything previously shown
/// may have skipped records that were never delivered.
fn skips_unobserved<P>(previous: &[Record<P>], incoming: &[Record<P>], full: bool) -> bool {
	match (previous.last(), incoming.first()) {
		(Some(newest_seen), Some(oldest_new)) => full && oldest_new.key() > newest_seen.key(),
		_ => false,
	}
}

/// Keeps `older` strictly below the new live window and, under
/// [`BoundaryPolicy::Fold`], moves records evicted from a full window into it.
///
/// A short window holds the whole collection, so records missing from it were
/// deleted upstream and are not kept.
fn reconcile_history<P>(state: &mut FeedState<P>, previous: Vec<Record<P>>, full: bool) {
	let Some(oldest_live) = state.live.first() else {
		return;
	};
	let bound = oldest_live.key();
	let live_ids: FxHashSet<&RecordId> = state.live.iter().map(|record| &record.id).collect();

	state.older.retain(|record| record.key() < bound && !live_ids.contains(&record.id));
	if full && state.config.boundary == BoundaryPolicy::Fold {
		let evicted = previous.into_iter().filter(|record| record.key() < bound && !live_ids.contains(&record.id));
		state.older.extend(evicted);
	}
}
