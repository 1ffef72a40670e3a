//! ABOUTME: Abstract board contract realized by jb_board_sqlite and jb_board_redis
//! ABOUTME: post / iterate / claim / consume / abandon / trash / search / killall / scheduled

pub mod naming;

use async_trait::async_trait;
use jb_core::{Entity, Job, Notifier, Priority, Result};
use jb_engine::{FlowFactory, Store};
use std::collections::BTreeMap;

/// Emitted by the board's notifier whenever a job is posted.
pub const POSTED: &str = "POSTED";
/// Emitted whenever a job leaves the board (consume, trash, or killall).
pub const REMOVAL: &str = "REMOVAL";

/// A reconciliation target for [`Board::reset_schedule`]: one entry per
/// schedule name.
#[derive(Clone)]
pub struct ScheduleSpec {
    pub schedule: String,
    pub factory: FlowFactory,
    pub store: Store,
}

/// The abstract jobboard protocol. Both the sqlite-backed ephemeral-node
/// realization and the redis-backed leased-lock realization implement
/// this trait identically from the conductor's point of view.
#[async_trait]
pub trait Board: Send + Sync {
    /// Idempotent connect, serialized by the implementation's own mutex.
    async fn connect(&self) -> Result<()>;

    /// Idempotent close.
    async fn close(&self) -> Result<()>;

    /// True once `connect()` has succeeded and `close()` hasn't run since.
    fn is_connected(&self) -> bool;

    async fn post(
        &self,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job>;

    /// As `post`, but `details.run_at = now() + delay_seconds`.
    async fn post_delayed(
        &self,
        delay_seconds: i64,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job>;

    /// Parses `cron_expr`; the next fire time must be `>= now()` or
    /// `JobFailure` is raised.
    async fn post_scheduled(
        &self,
        cron_expr: &str,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job>;

    /// Idempotent reconciliation of named scheduled jobs: keep jobs whose
    /// `(name, schedule, store)` already matches, claim-and-replace
    /// otherwise. `UnclaimableJob` if a stale match is currently claimed.
    async fn reset_schedule(&self, specs: BTreeMap<String, ScheduleSpec>) -> Result<Vec<Job>>;

    /// Eligible jobs in (priority, created_on) order, excluding jobs with
    /// a future `run_at`. `ensure_fresh` forces a full re-scan.
    async fn iterjobs(&self, only_unclaimed: bool, ensure_fresh: bool) -> Result<Vec<Job>>;

    /// Linear scan: `store_filter` matches when every key/value pair is
    /// present with an equal value in `details.store`; `exclude` skips
    /// book uuids.
    async fn search(
        &self,
        store_filter: Option<Store>,
        exclude: &[String],
        only_unclaimed: bool,
    ) -> Result<Vec<Job>>;

    /// Atomically create the job's lock with `{owner}` payload.
    /// `UnclaimableJob` if already (live-)locked by someone else.
    async fn claim(&self, job: &Job, owner: &str) -> Result<()>;

    /// Verify current lock names `owner`; delete job + lock; re-post the
    /// next occurrence first if the job has a `schedule`.
    async fn consume(&self, job: &Job, owner: &str) -> Result<()>;

    /// Verify ownership; delete the lock only.
    async fn abandon(&self, job: &Job, owner: &str) -> Result<()>;

    /// Verify ownership; move the job record and lock under `.trash/`.
    async fn trash(&self, job: &Job, owner: &str) -> Result<()>;

    /// Trash every job regardless of state or `run_at`; returns the
    /// trashed list.
    async fn killall(&self) -> Result<Vec<Job>>;

    /// Idempotent create of the entity's registry entry.
    async fn register_entity(&self, entity: &Entity) -> Result<()>;

    fn notifier(&self) -> &Notifier;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_posted_removal_constants_are_distinct() {
        assert_ne!(POSTED, REMOVAL);
    }
}
