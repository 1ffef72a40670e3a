/// Redis key layout for the leased-lock board realization.
///
/// Every key is namespaced under a configurable `root` (default `jb`) so
/// a single Redis instance can host more than one board without key
/// collisions.
pub fn job_key(root: &str, uuid: &str) -> String {
    format!("{root}:jobs:{uuid}")
}

/// Sorted set of live job uuids, scored by `jb_board::naming::sort_key` so
/// `ZRANGE` already yields (priority, created_on) order.
pub fn index_key(root: &str) -> String {
    format!("{root}:jobs:index")
}

pub fn lock_key(root: &str, uuid: &str) -> String {
    format!("{root}:locks:{uuid}")
}

/// Maps a scheduled job's `name` to its current job uuid, for
/// `reset_schedule` reconciliation.
pub fn schedule_key(root: &str, name: &str) -> String {
    format!("{root}:schedule:{name}")
}

/// Hash of every registered entity, keyed by `"<kind>/<name>"`.
pub fn entities_key(root: &str) -> String {
    format!("{root}:entities")
}

pub fn entity_field(kind: &str, name: &str) -> String {
    format!("{kind}/{name}")
}

pub fn flow_key(root: &str, flow_uuid: &str) -> String {
    format!("{root}:flows:{flow_uuid}")
}

/// Quarantine namespace a trashed/killed job's record moves into. Mirrors
/// `job_key`/`index_key` so a trashed job stays browsable instead of
/// vanishing outright.
pub fn trash_job_key(root: &str, uuid: &str) -> String {
    format!("{root}:trash:jobs:{uuid}")
}

pub fn trash_index_key(root: &str) -> String {
    format!("{root}:trash:jobs:index")
}
