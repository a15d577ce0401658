//! Worker primitives shared by feed pipelines.
//!
//! * [`TaskClass`] tags spawned work for scheduling and tracing.
//! * [`spawn`] runs a future on the ambient tokio runtime, falling back to a
//!   shared global runtime when called outside one.
//! * [`Generation`] and [`GenerationToken`] implement the generation guard:
//!   every asynchronous result is tagged with the generation it was issued
//!   under and is discarded when that generation is no longer current.

mod class;
mod spawn;
mod token;

pub use class::TaskClass;
pub use spawn::spawn;
pub use token::{Generation, GenerationToken};
