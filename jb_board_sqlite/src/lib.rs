//! ABOUTME: Ephemeral-node jobboard realization on a SQLite substrate
//! ABOUTME: session_id + heartbeat_at columns emulate ZooKeeper ephemeral node death

pub mod board;
pub mod persistence;
pub mod session;

pub use board::{SqliteBoard, SqliteBoardConfig};
pub use persistence::SqlitePersistence;
pub use session::SessionId;

#[cfg(test)]
mod tests {
    use super::*;
    use jb_board::{Board, ScheduleSpec};
    use jb_core::{Entity, Priority};
    use jb_engine::{Flow, FlowFactory};
    use std::collections::BTreeMap;

    async fn memory_board() -> SqliteBoard {
        let board = SqliteBoard::open("sqlite::memory:", SqliteBoardConfig::default())
            .await
            .unwrap();
        board.connect().await.unwrap();
        board
    }

    fn echo_factory(name: &'static str) -> FlowFactory {
        FlowFactory::from_fn(move |store| Ok(Flow::new(name, store.clone())))
    }

    #[tokio::test]
    async fn test_post_then_iterjobs_returns_it() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        let jobs = board.iterjobs(true, true).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].uuid, job.uuid);
    }

    #[tokio::test]
    async fn test_claim_then_second_claim_fails() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        let err = board.claim(&job, "owner-b").await.unwrap_err();
        assert!(matches!(err, jb_core::Error::UnclaimableJob(_)));
    }

    #[tokio::test]
    async fn test_claimed_job_excluded_from_unclaimed_scan() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        let jobs = board.iterjobs(true, true).await.unwrap();
        assert!(jobs.is_empty());
        let all = board.iterjobs(false, true).await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_consume_removes_job_and_notifies_removal() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();

        let seen = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let seen_clone = seen.clone();
        board.notifier().register(
            jb_board::REMOVAL,
            std::sync::Arc::new(move |_event, _details| {
                seen_clone.store(true, std::sync::atomic::Ordering::SeqCst);
            }),
        );

        board.consume(&job, "owner-a").await.unwrap();
        assert!(seen.load(std::sync::atomic::Ordering::SeqCst));
        let jobs = board.iterjobs(false, true).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_consume_wrong_owner_fails() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        let err = board.consume(&job, "owner-b").await.unwrap_err();
        assert!(matches!(err, jb_core::Error::NotClaimed(_)));
    }

    #[tokio::test]
    async fn test_consume_scheduled_job_reposts_next_occurrence() {
        let board = memory_board().await;
        let job = board
            .post_scheduled(
                "0 0 * * * * *",
                "hourly",
                echo_factory("hourly"),
                BTreeMap::new(),
                Priority::Normal,
            )
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        board.consume(&job, "owner-a").await.unwrap();

        let jobs = board.iterjobs(false, false).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_ne!(jobs[0].uuid, job.uuid);
        assert_eq!(jobs[0].name, "hourly");
    }

    #[tokio::test]
    async fn test_abandon_releases_lock_without_removal_notification() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        board.abandon(&job, "owner-a").await.unwrap();
        let jobs = board.iterjobs(true, true).await.unwrap();
        assert_eq!(jobs.len(), 1);
    }

    #[tokio::test]
    async fn test_trash_removes_job_from_scans() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();
        board.trash(&job, "owner-a").await.unwrap();
        let jobs = board.iterjobs(false, true).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_killall_trashes_everything_regardless_of_owner() {
        let board = memory_board().await;
        let a = board
            .post("a", echo_factory("a"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board
            .post("b", echo_factory("b"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&a, "owner-a").await.unwrap();

        let trashed = board.killall().await.unwrap();
        assert_eq!(trashed.len(), 2);
        assert!(board.iterjobs(false, true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_future_run_at_job_excluded_until_due() {
        let board = memory_board().await;
        board
            .post_delayed(3600, "later", echo_factory("later"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        let jobs = board.iterjobs(true, true).await.unwrap();
        assert!(jobs.is_empty());
    }

    #[tokio::test]
    async fn test_search_filters_by_store_and_excludes_book() {
        let board = memory_board().await;
        let mut store_a = BTreeMap::new();
        store_a.insert("region".to_string(), serde_json::Value::String("us".to_string()));
        let job_a = board
            .post("a", echo_factory("a"), store_a, Priority::Normal)
            .await
            .unwrap();
        let mut store_b = BTreeMap::new();
        store_b.insert("region".to_string(), serde_json::Value::String("eu".to_string()));
        board
            .post("b", echo_factory("b"), store_b, Priority::Normal)
            .await
            .unwrap();

        let mut filter = BTreeMap::new();
        filter.insert("region".to_string(), serde_json::Value::String("us".to_string()));
        let found = board.search(Some(filter), &[], false).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uuid, job_a.uuid);

        let excluded = board
            .search(None, &[job_a.book_uuid().to_string()], false)
            .await
            .unwrap();
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].name, "b");
    }

    #[tokio::test]
    async fn test_reset_schedule_keeps_identical_and_replaces_changed() {
        let board = memory_board().await;
        let mut specs = BTreeMap::new();
        specs.insert(
            "nightly".to_string(),
            ScheduleSpec {
                schedule: "0 0 0 * * * *".to_string(),
                factory: echo_factory("nightly"),
                store: BTreeMap::new(),
            },
        );
        let first = board.reset_schedule(specs.clone()).await.unwrap();
        assert_eq!(first.len(), 1);

        let second = board.reset_schedule(specs).await.unwrap();
        assert_eq!(second[0].uuid, first[0].uuid);

        let mut changed = BTreeMap::new();
        changed.insert(
            "nightly".to_string(),
            ScheduleSpec {
                schedule: "0 0 1 * * * *".to_string(),
                factory: echo_factory("nightly"),
                store: BTreeMap::new(),
            },
        );
        let third = board.reset_schedule(changed).await.unwrap();
        assert_ne!(third[0].uuid, first[0].uuid);
    }

    #[tokio::test]
    async fn test_reset_schedule_rejects_when_matching_job_claimed() {
        let board = memory_board().await;
        let mut specs = BTreeMap::new();
        specs.insert(
            "nightly".to_string(),
            ScheduleSpec {
                schedule: "0 0 0 * * * *".to_string(),
                factory: echo_factory("nightly"),
                store: BTreeMap::new(),
            },
        );
        let first = board.reset_schedule(specs.clone()).await.unwrap();
        board.claim(&first[0], "owner-a").await.unwrap();

        let err = board.reset_schedule(specs).await.unwrap_err();
        assert!(matches!(err, jb_core::Error::UnclaimableJob(_)));
    }

    #[tokio::test]
    async fn test_register_entity_is_idempotent() {
        let board = memory_board().await;
        let entity = Entity::new("conductor", "worker-1", BTreeMap::new()).unwrap();
        board.register_entity(&entity).await.unwrap();
        board.register_entity(&entity).await.unwrap();
    }

    #[tokio::test]
    async fn test_stale_session_lock_is_reclaimable() {
        let board = memory_board().await;
        let job = board
            .post("poke", echo_factory("poke"), BTreeMap::new(), Priority::Normal)
            .await
            .unwrap();
        board.claim(&job, "owner-a").await.unwrap();

        // Simulate the owning session dying: its heartbeat stops advancing
        // and eventually falls behind the TTL, at which point a fresh
        // claim must be able to reclaim the lock.
        sqlx::query("UPDATE locks SET heartbeat_at = ? WHERE job_uuid = ?")
            .bind((chrono::Utc::now() - chrono::Duration::seconds(3600)).to_rfc3339())
            .bind(&job.uuid)
            .execute(board.pool_for_test())
            .await
            .unwrap();

        board.claim(&job, "owner-b").await.unwrap();
    }
}
