//! Capabilities consumed from the backend collaborator.
//!
//! The engine needs exactly two read primitives: a push subscription of the
//! most recent `limit` records, and a one-shot read of up to `limit` records
//! strictly older than a cursor. Both return records newest first.

use async_trait::async_trait;
use feedline_primitives::{CollectionId, Cursor, Record};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::BackendError;

/// Parameters of a live "most recent N" subscription, ordered by timestamp descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
	pub collection: CollectionId,
	pub limit: usize,
}

/// Parameters of a one-shot historical read, ordered by timestamp descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
	pub collection: CollectionId,
	/// Only records strictly older than this cursor are returned.
	pub before: Cursor,
	pub limit: usize,
}

/// One delivery from a live subscription.
#[derive(Debug)]
pub enum LiveEvent<P> {
	/// Full replacement of the window, newest first.
	Snapshot(Vec<Record<P>>),
	/// The stream failed; no further snapshots follow.
	Failed(BackendError),
}

/// Push handle given to a backend for one subscription.
#[derive(Debug)]
pub struct SnapshotSink<P> {
	tx: mpsc::UnboundedSender<LiveEvent<P>>,
}

impl<P> Clone for SnapshotSink<P> {
	fn clone(&self) -> Self {
		Self { tx: self.tx.clone() }
	}
}

impl<P> SnapshotSink<P> {
	/// Creates a sink and the receiving end drained by the subscriber.
	pub fn channel() -> (Self, mpsc::UnboundedReceiver<LiveEvent<P>>) {
		let (tx, rx) = mpsc::unbounded_channel();
		(Self { tx }, rx)
	}

	/// Delivers a full window snapshot. Returns false once nobody listens.
	pub fn snapshot(&self, records: Vec<Record<P>>) -> bool {
		self.tx.send(LiveEvent::Snapshot(records)).is_ok()
	}

	/// Terminates the stream with an error. Returns false once nobody listens.
	pub fn fail(&self, error: BackendError) -> bool {
		self.tx.send(LiveEvent::Failed(error)).is_ok()
	}

	pub fn is_closed(&self) -> bool {
		self.tx.is_closed()
	}
}

/// Cancellation handle of a live subscription.
///
/// Cancelling, or dropping the handle, unsubscribes. Backends observe the
/// token handed to [`Subscription::new`] and stop delivering once it fires.
#[derive(Debug)]
pub struct Subscription {
	cancel: CancellationToken,
}

impl Subscription {
	pub fn new(cancel: CancellationToken) -> Self {
		Self { cancel }
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	pub fn is_cancelled(&self) -> bool {
		self.cancel.is_cancelled()
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		self.cancel.cancel();
	}
}

/// Live "most recent N" query capability.
pub trait LiveSource<P>: Send + Sync + 'static {
	/// Starts pushing window snapshots into `sink` until the returned handle is cancelled.
	fn subscribe(&self, query: LiveQuery, sink: SnapshotSink<P>) -> Result<Subscription, BackendError>;
}

/// One-shot paginated read capability.
#[async_trait]
pub trait PageSource<P: Send + 'static>: Send + Sync + 'static {
	/// Reads up to `query.limit` records strictly older than `query.before`, newest first.
	async fn fetch_older(&self, query: PageQuery) -> Result<Vec<Record<P>>, BackendError>;
}

/// Full backend collaborator required by [`FeedMerger`](crate::FeedMerger).
pub trait FeedBackend<P: Send + 'static>: LiveSource<P> + PageSource<P> {}

impl<P: Send + 'static, B> FeedBackend<P> for B where B: LiveSource<P> + PageSource<P> {}
