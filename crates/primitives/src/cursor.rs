use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::{Record, RecordId, RecordKey, Timestamp};

/// Reference to one record, bounding reads of records strictly older than it.
///
/// Cursors compare by the referenced record's [`RecordKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor {
	pub id: RecordId,
	pub timestamp: Timestamp,
}

impl Cursor {
	pub fn at<P>(record: &Record<P>) -> Self {
		Self {
			id: record.id.clone(),
			timestamp: record.timestamp,
		}
	}

	pub fn key(&self) -> RecordKey<'_> {
		RecordKey {
			timestamp: self.timestamp,
			id: &self.id,
		}
	}

	/// Returns true when `record` lies strictly before this cursor.
	pub fn is_after<P>(&self, record: &Record<P>) -> bool {
		record.key() < self.key()
	}

	/// Keeps whichever of `current` and `candidate` is older.
	pub fn older(current: Option<Cursor>, candidate: Cursor) -> Cursor {
		match current {
			Some(current) if current <= candidate => current,
			_ => candidate,
		}
	}
}

impl PartialOrd for Cursor {
	fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for Cursor {
	fn cmp(&self, other: &Self) -> Ordering {
		self.key().cmp(&other.key())
	}
}
