use serde::{Deserialize, Serialize};

use crate::{RecordId, Timestamp};

/// Unit of synchronized data: a chat message, a media item, etc.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record<P> {
	pub id: RecordId,
	pub timestamp: Timestamp,
	pub payload: P,
}

impl<P> Record<P> {
	pub fn new(id: impl Into<RecordId>, timestamp: Timestamp, payload: P) -> Self {
		Self {
			id: id.into(),
			timestamp,
			payload,
		}
	}

	/// Ordering key of this record.
	pub fn key(&self) -> RecordKey<'_> {
		RecordKey {
			timestamp: self.timestamp,
			id: &self.id,
		}
	}
}

/// Total order over records: timestamp first, id as tie-breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey<'a> {
	pub timestamp: Timestamp,
	pub id: &'a RecordId,
}

/// Sorts records ascending by [`RecordKey`].
pub fn sort_ascending<P>(records: &mut [Record<P>]) {
	records.sort_by(|a, b| a.key().cmp(&b.key()));
}

/// Returns true when every adjacent pair is strictly ascending by key.
///
/// Strictness also rules out duplicate ids at equal timestamps.
pub fn is_strictly_ascending<P>(records: &[Record<P>]) -> bool {
	records.windows(2).all(|pair| pair[0].key() < pair[1].key())
}
