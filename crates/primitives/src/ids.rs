use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of a record, unique within its collection.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Arc<str>);

impl RecordId {
	pub fn new(id: impl Into<Arc<str>>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "RecordId({})", self.0)
	}
}

impl fmt::Display for RecordId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for RecordId {
	fn from(id: &str) -> Self {
		Self::new(id)
	}
}

impl From<String> for RecordId {
	fn from(id: String) -> Self {
		Self::new(id)
	}
}

/// Path of a remote collection (e.g. `rooms/42/messages`).
///
/// Two ids compare equal iff they name the same collection; the merger
/// restarts its pipeline whenever the observed id changes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionId(Arc<str>);

impl CollectionId {
	pub fn new(path: impl Into<Arc<str>>) -> Self {
		Self(path.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl fmt::Debug for CollectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "CollectionId({})", self.0)
	}
}

impl fmt::Display for CollectionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl From<&str> for CollectionId {
	fn from(path: &str) -> Self {
		Self::new(path)
	}
}

impl From<String> for CollectionId {
	fn from(path: String) -> Self {
		Self::new(path)
	}
}
