//! Feed synchronizer: one gapless, duplicate-free, ascending sequence of
//! records built from a pushed live window plus on-demand older pages.
//!
//! # Purpose
//!
//! * Presents `older ++ live` as a single combined sequence to a consumer.
//! * Keeps the live half current through a push subscription of the most
//!   recent `window_size` records.
//! * Extends the historical half with one-shot reads strictly older than a
//!   cursor, one at a time.
//!
//! # Mental model
//!
//! * [`FeedState`] is the whole feed, advanced by [`FeedState::apply`] on each
//!   [`FeedEvent`]. The reducer performs no I/O; it returns [`Effect`]s.
//! * [`FeedMerger`] runs the reducer inside one actor task and executes the
//!   effects: starting or cancelling the live subscription and issuing page reads.
//! * Every asynchronous result is tagged with the [`Generation`] it was issued
//!   under. A refresh, a collection change, or a teardown bumps the generation,
//!   so late results from before it are discarded without effect.
//!
//! # Invariants
//!
//! * `live` and `older` are each strictly ascending by `(timestamp, id)`.
//! * Every key in `older` is below every key in `live`; no id appears in both.
//! * The cursor only moves older within one generation.
//! * `reached_beginning` implies `!has_more`, and no further page read is issued.
//! * At most one page read is outstanding per generation.
//!
//! # Failure modes & recovery
//!
//! * Live stream failure: `last_error = SubscriptionError`; terminal for the
//!   generation. The consumer recovers with `refresh`.
//! * Page read failure: `last_error = LoadOlderFailed`; state is otherwise
//!   untouched and `load_older` may be called again.
//! * `load_older` without a cursor, while a read is outstanding, or after the
//!   beginning was reached is a silent no-op ([`SkipReason`]).

pub mod backend;
pub mod config;
mod error;
mod live;
pub mod memory;
mod merger;
mod pager;
mod state;

pub use backend::{FeedBackend, LiveEvent, LiveQuery, LiveSource, PageQuery, PageSource, SnapshotSink, Subscription};
pub use config::{BoundaryPolicy, ConfigError, FeedConfig};
pub use error::{BackendError, FeedError, FeedErrorKind};
pub use feedline_primitives::{CollectionId, Cursor, Record, RecordId, RecordKey, Timestamp};
pub use feedline_worker::Generation;
pub use live::LiveWindowSubscriber;
pub use memory::MemoryBackend;
pub use merger::FeedMerger;
pub use pager::HistoricalPager;
pub use state::{Applied, Effect, FeedEvent, FeedPhase, FeedState, FeedView, SkipReason};
