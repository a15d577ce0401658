use std::fmt;

use tokio_util::sync::CancellationToken;

/// Monotonic epoch counter of one feed pipeline.
///
/// Starts at 0 and only moves forward. A result tagged with a generation
/// other than the current one is stale and must be discarded unapplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(u64);

impl Generation {
	pub const ZERO: Self = Self(0);

	pub const fn new(value: u64) -> Self {
		Self(value)
	}

	pub const fn get(self) -> u64 {
		self.0
	}

	/// Returns the following generation.
	#[must_use]
	pub const fn next(self) -> Self {
		Self(self.0.saturating_add(1))
	}

	/// Returns true when a result tagged `self` may not be applied at `current`.
	pub fn is_stale(self, current: Self) -> bool {
		self != current
	}
}

impl fmt::Display for Generation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Generation-scoped cancellation token for subscription forwarders.
///
/// Cancelling stops delivery from the owning task; it never aborts remote
/// work already in flight. Stale results are filtered by generation instead.
#[derive(Debug, Clone)]
pub struct GenerationToken {
	generation: Generation,
	cancel: CancellationToken,
}

impl GenerationToken {
	pub fn new(generation: Generation) -> Self {
		Self {
			generation,
			cancel: CancellationToken::new(),
		}
	}

	pub const fn generation(&self) -> Generation {
		self.generation
	}

	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Future resolving when cancellation is requested.
	pub async fn cancelled(&self) {
		self.cancel.cancelled().await;
	}
}
