use serde::Serialize;

/// Failure reported by the backend collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
	/// The backend could not be reached.
	#[error("backend unavailable: {0}")]
	Unavailable(String),
	/// The live stream ended without being cancelled by the consumer.
	#[error("live stream terminated by the backend")]
	Terminated,
	/// The backend refused the query (permissions, invalid path, ...).
	#[error("query rejected: {0}")]
	Rejected(String),
}

/// Observable error of a feed, surfaced as `last_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorKind {
	/// The live stream failed or was terminated; recover with `refresh`.
	#[error("live subscription failed")]
	SubscriptionError,
	/// A historical read failed; `load_older` may be retried.
	#[error("loading older records failed")]
	LoadOlderFailed,
}

/// Errors from the [`FeedMerger`](crate::FeedMerger) handle itself.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum FeedError {
	/// The merger actor panicked or was aborted.
	#[error("feed merger task failed: {0}")]
	Join(#[from] tokio::task::JoinError),
}
