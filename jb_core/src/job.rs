use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Job priority. Lower `rank()` sorts first, so the default board
/// iteration order is (priority rank, created_on).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Lexicographic rank used in board path/index construction: 0=HIGH,
    /// 1=NORMAL, 2=LOW.
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

/// A reference to the logbook a job's flow detail lives under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRef {
    pub name: String,
    pub uuid: String,
}

/// Free-form inputs and scheduling metadata carried alongside a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct JobDetails {
    #[serde(default)]
    pub store: BTreeMap<String, Value>,
    pub flow_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
}

/// Immutable posted-job descriptor, serialized to the board as JSON and
/// treated as an opaque blob by the backing store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: String,
    pub name: String,
    pub priority: Priority,
    pub book: BookRef,
    pub details: JobDetails,
    pub created_on: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl Job {
    pub fn book_uuid(&self) -> &str {
        &self.book.uuid
    }

    /// True when `details.run_at` is in the future relative to `now`;
    /// such a job is ineligible to claim even if unclaimed (I5).
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        match self.details.run_at {
            Some(run_at) => run_at > now.timestamp(),
            None => false,
        }
    }

    /// Whether `details.store` is a superset of `filter` (used by `search`).
    pub fn store_matches(&self, filter: &BTreeMap<String, Value>) -> bool {
        filter
            .iter()
            .all(|(k, v)| self.details.store.get(k) == Some(v))
    }
}
