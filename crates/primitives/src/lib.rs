//! Record model for the feed synchronizer.
//!
//! Every record carries a unique id and a totally ordered timestamp; the
//! payload is opaque to the engine. All ordering in the workspace goes
//! through [`RecordKey`], which breaks timestamp ties by id.

/// Cursors bounding historical reads.
pub mod cursor;
/// Identifier newtypes for records and collections.
pub mod ids;
/// Records, ordering keys and sequence helpers.
pub mod record;
/// Totally ordered instants.
pub mod time;

pub use cursor::Cursor;
pub use ids::{CollectionId, RecordId};
pub use record::{Record, RecordKey, is_strictly_ascending, sort_ascending};
pub use time::Timestamp;
