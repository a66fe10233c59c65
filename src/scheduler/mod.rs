//! Poll scheduler: lifecycle, dedup memory, and the fetch/evaluate/send cycle.

pub mod dedup;
pub mod poller;
pub mod state;

pub use dedup::DedupMemory;
pub use poller::{AutoResponder, CycleReport};
pub use state::{PollStats, SchedulerState, SchedulerStatus};
