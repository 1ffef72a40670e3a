//! ABOUTME: Core types, errors, IDs, and tracing utilities
//! ABOUTME: Foundation crate used by all jobboard/conductor components

pub mod entity;
pub mod error;
pub mod id;
pub mod job;
pub mod notifier;
pub mod scheduler;
pub mod telemetry;
pub mod time;

pub use entity::{Entity, CONDUCTOR_KIND};
pub use error::{pformat, Error, Result};
pub use id::Id;
pub use job::{BookRef, Job, JobDetails, Priority};
pub use notifier::{Handler, Notifier};
pub use time::{now_iso8601, to_rfc3339, utc_now, MonotonicTimer};
