/// Shared execution classes used for worker scheduling and observability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// The single task context that owns feed state and applies events.
	Interactive,
	/// One-shot remote reads whose results are posted back to the owner.
	Background,
	/// Forwarders draining a push subscription into the owner's queue.
	Stream,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Interactive => "interactive",
			Self::Background => "background",
			Self::Stream => "stream",
		}
	}
}
