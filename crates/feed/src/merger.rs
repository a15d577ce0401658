//! Feed merger actor and its consumer-facing handle.
//!
//! # Mental model
//!
//! * One actor task owns the [`FeedState`] and is the only place it mutates.
//! * Consumer operations, live deliveries, and page results all enter the
//!   actor through one queue as [`FeedEvent`]s and are applied in receive order.
//! * Effects returned by the reducer are executed right after each step:
//!   subscriptions are started or cancelled, page reads are spawned.
//! * A fresh [`FeedView`] is published on a `watch` channel whenever a step
//!   reports a change.
//!
//! # Concurrency & ordering
//!
//! * Live snapshots of one subscription pass through a single forwarder and
//!   keep delivery order; each one replaces the live half.
//! * Page reads run concurrently with live delivery. The in-flight flag in the
//!   state serializes them, so history mutations are totally ordered.
//! * Nothing in flight is aborted on reset; generation tags make late results inert.

use std::sync::Arc;

use feedline_primitives::CollectionId;
use feedline_worker::TaskClass;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::backend::FeedBackend;
use crate::live::LiveWindowSubscriber;
use crate::pager::HistoricalPager;
use crate::state::{Effect, FeedEvent, FeedState, FeedView};
use crate::{FeedConfig, FeedError};

struct MergerActor<P, B> {
	backend: Arc<B>,
	pager: HistoricalPager<B>,
	state: FeedState<P>,
	live: Option<LiveWindowSubscriber>,
	events_tx: mpsc::UnboundedSender<FeedEvent<P>>,
	view_tx: watch::Sender<FeedView<P>>,
}

impl<P, B> MergerActor<P, B>
where
	P: Clone + Send + Sync + 'static,
	B: FeedBackend<P>,
{
	async fn run(mut self, mut events_rx: mpsc::UnboundedReceiver<FeedEvent<P>>, shutdown: CancellationToken) {
		loop {
			tokio::select! {
				biased;
				() = shutdown.cancelled() => {
					self.handle(FeedEvent::Teardown);
					break;
				}
				maybe_event = events_rx.recv() => match maybe_event {
					Some(event) => self.handle(event),
					None => break,
				},
			}
		}
		tracing::debug!(generation = %self.state.generation(), "feed merger stopped");
	}

	fn handle(&mut self, event: FeedEvent<P>) {
		let applied = self.state.apply(event);
		for effect in applied.effects {
			self.execute(effect);
		}
		if applied.changed {
			self.view_tx.send_replace(self.state.view());
		}
	}

	fn execute(&mut self, effect: Effect) {
		match effect {
			Effect::Unsubscribe => {
				if let Some(live) = self.live.take() {
					tracing::trace!(generation = %live.generation(), "cancelling live subscription");
					live.cancel();
				}
			}
			Effect::Subscribe { generation, collection } => {
				let window_size = self.state.config().window_size.get();
				match LiveWindowSubscriber::start(self.backend.as_ref(), collection, window_size, generation, self.events_tx.clone()) {
					Ok(live) => self.live = Some(live),
					Err(error) => {
						let _ = self.events_tx.send(FeedEvent::SubscriptionFailed { generation, error });
					}
				}
			}
			Effect::FetchOlder {
				generation,
				collection,
				cursor,
			} => {
				self.pager.fetch(generation, collection, cursor, self.events_tx.clone());
			}
		}
	}
}

/// Consumer handle of one feed.
///
/// Every operation enqueues work for the actor and returns immediately.
/// Operations return `false` only when the actor has already stopped.
/// Dropping the handle tears the feed down.
pub struct FeedMerger<P> {
	events_tx: mpsc::UnboundedSender<FeedEvent<P>>,
	view_rx: watch::Receiver<FeedView<P>>,
	shutdown: CancellationToken,
	/// Taken only by `shutdown`; `Drop` forbids moving it out of `self` directly.
	actor_task: Option<JoinHandle<()>>,
}

impl<P> FeedMerger<P>
where
	P: Clone + Send + Sync + 'static,
{
	pub fn new<B>(backend: Arc<B>, config: FeedConfig) -> Self
	where
		B: FeedBackend<P>,
	{
		let (events_tx, events_rx) = mpsc::unbounded_channel();
		let state = FeedState::new(config);
		let (view_tx, view_rx) = watch::channel(state.view());
		let shutdown = CancellationToken::new();

		let actor = MergerActor {
			pager: HistoricalPager::new(Arc::clone(&backend), config.page_size),
			backend,
			state,
			live: None,
			events_tx: events_tx.clone(),
			view_tx,
		};
		let actor_task = feedline_worker::spawn(TaskClass::Interactive, actor.run(events_rx, shutdown.clone()));

		Self {
			events_tx,
			view_rx,
			shutdown,
			actor_task: Some(actor_task),
		}
	}

	/// Starts observing `collection` and returns the live view.
	///
	/// Observing the collection already observed is a no-op; a different
	/// collection restarts the feed at the next generation.
	pub fn observe(&self, collection: impl Into<CollectionId>) -> watch::Receiver<FeedView<P>> {
		self.send(FeedEvent::Observe(collection.into()));
		self.view_rx.clone()
	}

	/// Requests one older page. Safe to call at any time: it is ignored while
	/// a read is outstanding, before any record was seen, or once the
	/// beginning was reached.
	pub fn load_older(&self) -> bool {
		self.send(FeedEvent::LoadOlder)
	}

	/// Drops every accumulated record and restarts the live subscription.
	pub fn refresh(&self) -> bool {
		self.send(FeedEvent::Refresh)
	}

	/// Cancels the live subscription and discards anything still in flight.
	pub fn teardown(&self) -> bool {
		self.send(FeedEvent::Teardown)
	}

	/// Latest published view.
	pub fn view(&self) -> FeedView<P> {
		self.view_rx.borrow().clone()
	}

	pub fn subscribe_view(&self) -> watch::Receiver<FeedView<P>> {
		self.view_rx.clone()
	}

	/// Tears down and waits for the actor to stop.
	pub async fn shutdown(mut self) -> Result<(), FeedError> {
		self.shutdown.cancel();
		if let Some(task) = self.actor_task.take() {
			task.await?;
		}
		Ok(())
	}

	fn send(&self, event: FeedEvent<P>) -> bool {
		self.events_tx.send(event).is_ok()
	}
}

impl<P> Drop for FeedMerger<P> {
	fn drop(&mut self) {
		self.shutdown.cancel();
	}
}
