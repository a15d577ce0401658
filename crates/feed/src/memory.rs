//! In-process backend holding collections in memory.
//!
//! Implements both read capabilities with the same semantics a managed
//! backend provides: subscriptions receive a full newest-first window on
//! subscribe and after every write to their collection; page reads return
//! records strictly older than the cursor, newest first.
//!
//! Test hooks can fail subscriptions, fail the next read, or hold reads until
//! released so a read can be kept in flight across a refresh.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use feedline_primitives::{CollectionId, Record, RecordId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::BackendError;
use crate::backend::{LiveQuery, LiveSource, PageQuery, PageSource, SnapshotSink, Subscription};

struct Subscriber<P> {
	query: LiveQuery,
	sink: SnapshotSink<P>,
	cancel: CancellationToken,
}

impl<P> Subscriber<P> {
	fn is_active(&self) -> bool {
		!self.cancel.is_cancelled() && !self.sink.is_closed()
	}
}

struct Inner<P> {
	/// Each collection is kept ascending by record key.
	collections: FxHashMap<CollectionId, Vec<Record<P>>>,
	subscribers: Vec<Subscriber<P>>,
	fail_next_fetch: Option<BackendError>,
}

impl<P: Clone> Inner<P> {
	fn window(&self, query: &LiveQuery) -> Vec<Record<P>> {
		self.collections
			.get(&query.collection)
			.map(|records| records.iter().rev().take(query.limit).cloned().collect())
			.unwrap_or_default()
	}

	fn publish(&mut self, collection: &CollectionId) {
		self.subscribers.retain(Subscriber::is_active);
		for subscriber in self.subscribers.iter().filter(|s| &s.query.collection == collection) {
			subscriber.sink.snapshot(self.window(&subscriber.query));
		}
	}
}

/// Backend collaborator backed by in-memory collections.
pub struct MemoryBackend<P> {
	inner: Mutex<Inner<P>>,
	hold_fetches: AtomicBool,
	release: Notify,
	fetches: AtomicUsize,
}

impl<P> Default for MemoryBackend<P> {
	fn default() -> Self {
		Self {
			inner: Mutex::new(Inner {
				collections: FxHashMap::default(),
				subscribers: Vec::new(),
				fail_next_fetch: None,
			}),
			hold_fetches: AtomicBool::new(false),
			release: Notify::new(),
			fetches: AtomicUsize::new(0),
		}
	}
}

impl<P: Clone> MemoryBackend<P> {
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds many records at once, publishing a single snapshot afterwards.
	pub fn seed(&self, collection: &CollectionId, records: impl IntoIterator<Item = Record<P>>) {
		let mut inner = self.inner.lock();
		let stored = inner.collections.entry(collection.clone()).or_default();
		for record in records {
			upsert(stored, record);
		}
		inner.publish(collection);
	}

	/// Adds (or replaces by id) one record and publishes the new window.
	pub fn insert(&self, collection: &CollectionId, record: Record<P>) {
		let mut inner = self.inner.lock();
		upsert(inner.collections.entry(collection.clone()).or_default(), record);
		inner.publish(collection);
	}

	/// Deletes a record and publishes the new window.
	pub fn remove(&self, collection: &CollectionId, id: &RecordId) -> Option<Record<P>> {
		let mut inner = self.inner.lock();
		let stored = inner.collections.get_mut(collection)?;
		let index = stored.iter().position(|record| &record.id == id)?;
		let removed = stored.remove(index);
		inner.publish(collection);
		Some(removed)
	}

	pub fn len(&self, collection: &CollectionId) -> usize {
		self.inner.lock().collections.get(collection).map_or(0, Vec::len)
	}

	/// Ascending copy of a collection.
	pub fn records(&self, collection: &CollectionId) -> Vec<Record<P>> {
		self.inner.lock().collections.get(collection).cloned().unwrap_or_default()
	}

	/// Live subscriptions on `collection` that are still delivering.
	pub fn active_subscriptions(&self, collection: &CollectionId) -> usize {
		let mut inner = self.inner.lock();
		inner.subscribers.retain(Subscriber::is_active);
		inner.subscribers.iter().filter(|s| &s.query.collection == collection).count()
	}

	/// Terminates every subscription on `collection` with `error`.
	pub fn fail_subscriptions(&self, collection: &CollectionId, error: BackendError) -> usize {
		let mut inner = self.inner.lock();
		let (failed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut inner.subscribers)
			.into_iter()
			.partition(|s| &s.query.collection == collection);
		inner.subscribers = kept;
		failed.iter().filter(|s| s.is_active() && s.sink.fail(error.clone())).count()
	}

	/// Makes the next page read fail with `error`.
	pub fn fail_next_fetch(&self, error: BackendError) {
		self.inner.lock().fail_next_fetch = Some(error);
	}

	/// Blocks page reads until [`Self::release_fetch`] or [`Self::resume_fetches`].
	pub fn hold_fetches(&self) {
		self.hold_fetches.store(true, Ordering::Release);
	}

	/// Lets one held page read proceed.
	pub fn release_fetch(&self) {
		self.release.notify_one();
	}

	/// Stops holding page reads and releases any waiting one.
	pub fn resume_fetches(&self) {
		self.hold_fetches.store(false, Ordering::Release);
		self.release.notify_waiters();
	}

	/// Page reads started so far.
	pub fn fetch_count(&self) -> usize {
		self.fetches.load(Ordering::Acquire)
	}
}

fn upsert<P>(stored: &mut Vec<Record<P>>, record: Record<P>) {
	if let Some(index) = stored.iter().position(|existing| existing.id == record.id) {
		stored.remove(index);
	}
	let at = stored.partition_point(|existing| existing.key() < record.key());
	stored.insert(at, record);
}

impl<P> LiveSource<P> for MemoryBackend<P>
where
	P: Clone + Send + 'static,
{
	fn subscribe(&self, query: LiveQuery, sink: SnapshotSink<P>) -> Result<Subscription, BackendError> {
		let cancel = CancellationToken::new();
		let mut inner = self.inner.lock();
		sink.snapshot(inner.window(&query));
		inner.subscribers.push(Subscriber {
			query,
			sink,
			cancel: cancel.clone(),
		});
		Ok(Subscription::new(cancel))
	}
}

#[async_trait]
impl<P> PageSource<P> for MemoryBackend<P>
where
	P: Clone + Send + 'static,
{
	async fn fetch_older(&self, query: PageQuery) -> Result<Vec<Record<P>>, BackendError> {
		self.fetches.fetch_add(1, Ordering::AcqRel);
		if self.hold_fetches.load(Ordering::Acquire) {
			self.release.notified().await;
		}

		let mut inner = self.inner.lock();
		if let Some(error) = inner.fail_next_fetch.take() {
			return Err(error);
		}
		Ok(inner
			.collections
			.get(&query.collection)
			.map(|records| {
				records
					.iter()
					.rev()
					.filter(|record| query.before.is_after(record))
					.take(query.limit)
					.cloned()
					.collect()
			})
			.unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use feedline_primitives::{Cursor, Timestamp};

	use super::*;

	fn rec(n: i64) -> Record<()> {
		Record::new(format!("r{n}"), Timestamp::from_micros(n), ())
	}

	fn ids(records: &[Record<()>]) -> Vec<&str> {
		records.iter().map(|r| r.id.as_str()).collect()
	}

	#[tokio::test]
	async fn subscribe_delivers_newest_first_and_republishes_on_write() {
		let backend = MemoryBackend::new();
		let chat = CollectionId::from("chat");
		backend.seed(&chat, (1..=5).map(rec));

		let (sink, mut rx) = SnapshotSink::channel();
		let _subscription = backend
			.subscribe(
				LiveQuery {
					collection: chat.clone(),
					limit: 3,
				},
				sink,
			)
			.unwrap();
		let Some(crate::LiveEvent::Snapshot(first)) = rx.recv().await else {
			panic!("expected initial snapshot");
		};
		assert_eq!(ids(&first), ["r5", "r4", "r3"]);

		backend.insert(&chat, rec(6));
		let Some(crate::LiveEvent::Snapshot(second)) = rx.recv().await else {
			panic!("expected snapshot after insert");
		};
		assert_eq!(ids(&second), ["r6", "r5", "r4"]);
	}

	#[tokio::test]
	async fn cancelled_subscription_is_pruned() {
		let backend = MemoryBackend::<()>::new();
		let chat = CollectionId::from("chat");
		let (sink, _rx) = SnapshotSink::channel();
		let subscription = backend
			.subscribe(
				LiveQuery {
					collection: chat.clone(),
					limit: 3,
				},
				sink,
			)
			.unwrap();
		assert_eq!(backend.active_subscriptions(&chat), 1);
		drop(subscription);
		assert_eq!(backend.active_subscriptions(&chat), 0);
	}

	#[tokio::test]
	async fn fetch_older_is_strict_and_limited() {
		let backend = MemoryBackend::new();
		let chat = CollectionId::from("chat");
		backend.seed(&chat, (1..=5).map(rec));

		let page = backend
			.fetch_older(PageQuery {
				collection: chat.clone(),
				before: Cursor::at(&rec(4)),
				limit: 2,
			})
			.await
			.unwrap();
		assert_eq!(ids(&page), ["r3", "r2"]);
		assert_eq!(backend.fetch_count(), 1);

		backend.fail_next_fetch(BackendError::Unavailable("offline".into()));
		let failed = backend
			.fetch_older(PageQuery {
				collection: chat,
				before: Cursor::at(&rec(4)),
				limit: 2,
			})
			.await;
		assert_eq!(failed, Err(BackendError::Unavailable("offline".into())));
	}

	#[test]
	fn insert_replaces_by_id_and_keeps_order() {
		let backend = MemoryBackend::new();
		let chat = CollectionId::from("chat");
		backend.seed(&chat, [rec(3), rec(1)]);
		backend.insert(&chat, Record::new("r1", Timestamp::from_micros(7), ()));
		assert_eq!(ids(&backend.records(&chat)), ["r3", "r1"]);
		assert!(backend.remove(&chat, &RecordId::from("r3")).is_some());
		assert_eq!(backend.len(&chat), 1);
	}
}
