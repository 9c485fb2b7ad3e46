/// Execution classes attached to every spawned pipeline task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskClass {
	/// Generates work items on its own cadence.
	Producer,
	/// Forwards one source stream into a shared output.
	Relay,
	/// Drives pacing, consumption or shutdown from the controlling side.
	Control,
}

impl TaskClass {
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Producer => "producer",
			Self::Relay => "relay",
			Self::Control => "control",
		}
	}
}

impl std::fmt::Display for TaskClass {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(self.as_str())
	}
}
