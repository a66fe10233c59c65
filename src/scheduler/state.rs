//! Scheduler lifecycle state and status snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of the poll scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    /// No poll task is active.
    Stopped,
    /// A poll task is active.
    Running,
}

impl SchedulerState {
    /// Check if this state allows transitioning to another state.
    pub fn can_transition_to(&self, target: SchedulerState) -> bool {
        use SchedulerState::*;

        matches!((self, target), (Stopped, Running) | (Running, Stopped))
    }
}

impl std::fmt::Display for SchedulerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
        };
        write!(f, "{s}")
    }
}

/// Counters published by the poll task after every cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollStats {
    /// Watermark after the most recent cycle.
    pub last_check_time: Option<DateTime<Utc>>,
    pub cycles_completed: u64,
    pub messages_processed: u64,
    pub responses_sent: u64,
    pub send_failures: u64,
    /// Error that aborted the most recent cycle, if any.
    pub last_error: Option<String>,
}

/// Point-in-time view of the scheduler.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub check_interval_secs: u64,
    #[serde(flatten)]
    pub stats: PollStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions() {
        use SchedulerState::*;
        assert!(Stopped.can_transition_to(Running));
        assert!(Running.can_transition_to(Stopped));
        assert!(!Running.can_transition_to(Running));
        assert!(!Stopped.can_transition_to(Stopped));
    }

    #[test]
    fn status_serializes_flat() {
        let status = SchedulerStatus {
            state: SchedulerState::Running,
            check_interval_secs: 60,
            stats: PollStats {
                responses_sent: 3,
                ..Default::default()
            },
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "running");
        assert_eq!(json["responses_sent"], 3);
        assert!(json["last_check_time"].is_null());
    }
}
