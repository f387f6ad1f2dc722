//! Event types published by the batch orchestrator
//!
//! The host shell subscribes to these; the core never knows who listens.
//! Event names mirror the host's IPC channels (`progress-update`, `badge-update`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::badges::BadgeStats;

/// Lifecycle of one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// No batch is running
    #[default]
    Idle,
    /// Codes are being processed
    Running,
    /// Every code was processed
    Completed,
    /// Stopped by user between codes
    Stopped,
    /// Aborted by a fatal surface error
    Error,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped"),
            Self::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// End-of-run summary shown to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub state: RunState,
    pub total: usize,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub badges: BadgeStats,
}

impl BatchSummary {
    pub fn message(&self) -> String {
        format!(
            "Processed {}/{} codes: {} ok, {} errors",
            self.processed, self.total, self.succeeded, self.failed
        )
    }
}

/// Typed stream element delivered to subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum BatchEvent {
    ProgressUpdate {
        current: usize,
        total: usize,
    },
    StatusUpdate {
        message: String,
    },
    BadgeUpdate {
        badges: BadgeStats,
    },
    LogMessage {
        level: LogLevel,
        message: String,
        timestamp: DateTime<Utc>,
    },
    ProcessingComplete {
        run_id: Uuid,
        state: RunState,
    },
    Summary(BatchSummary),
    StateChanged {
        from: RunState,
        to: RunState,
    },
}

impl BatchEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::LogMessage {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn status(message: impl Into<String>) -> Self {
        Self::StatusUpdate {
            message: message.into(),
        }
    }

    /// Channel name the host shell listens on
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ProgressUpdate { .. } => "progress-update",
            Self::StatusUpdate { .. } => "status-update",
            Self::BadgeUpdate { .. } => "badge-update",
            Self::LogMessage { .. } => "log-message",
            Self::ProcessingComplete { .. } => "processing-complete",
            Self::Summary(_) => "summary",
            Self::StateChanged { .. } => "state-changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_tag_matches_channel_name() {
        let events = vec![
            BatchEvent::ProgressUpdate { current: 1, total: 2 },
            BatchEvent::status("hi"),
            BatchEvent::BadgeUpdate { badges: BadgeStats::default() },
            BatchEvent::log(LogLevel::Info, "x"),
            BatchEvent::ProcessingComplete { run_id: Uuid::new_v4(), state: RunState::Completed },
            BatchEvent::StateChanged { from: RunState::Idle, to: RunState::Running },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.name());
        }
    }

    #[test]
    fn test_summary_message() {
        let summary = BatchSummary {
            run_id: Uuid::nil(),
            state: RunState::Completed,
            total: 5,
            processed: 5,
            succeeded: 4,
            failed: 1,
            badges: BadgeStats::default(),
        };
        assert_eq!(summary.message(), "Processed 5/5 codes: 4 ok, 1 errors");
    }
}
