use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Instant at which a record was created, in microseconds since the Unix epoch.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
	pub const fn from_micros(micros: i64) -> Self {
		Self(micros)
	}

	pub const fn as_micros(self) -> i64 {
		self.0
	}

	/// Current wall-clock time.
	pub fn now() -> Self {
		Self::from(Utc::now())
	}

	/// Converts back to a UTC datetime; `None` when out of chrono's range.
	pub fn to_datetime(self) -> Option<DateTime<Utc>> {
		DateTime::from_timestamp_micros(self.0)
	}
}

impl From<DateTime<Utc>> for Timestamp {
	fn from(at: DateTime<Utc>) -> Self {
		Self(at.timestamp_micros())
	}
}

impl fmt::Debug for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "Timestamp({})", self.0)
	}
}

impl fmt::Display for Timestamp {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.to_datetime() {
			Some(at) => write!(f, "{}", at.to_rfc3339()),
			None => write!(f, "{}us", self.0),
		}
	}
}
