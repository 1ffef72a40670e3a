use jb_board::Board;
use jb_board_sqlite::{SqliteBoard, SqliteBoardConfig};
use jb_conductor::{Conductor, ConductorOptions, DispatchMode};
use jb_core::{Handler, Priority};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use test_support::fake_engine::{
    always_revert_factory, always_succeed_factory, compiler_blowup_factory, crash_factory,
    sleep_then_succeed_factory, FakeEngineLoader,
};

async fn new_conductor(options: ConductorOptions) -> (Arc<Conductor>, Arc<SqliteBoard>) {
    let board = Arc::new(
        SqliteBoard::open("sqlite::memory:", SqliteBoardConfig::default())
            .await
            .unwrap(),
    );
    let board_dyn: Arc<dyn Board> = board.clone();
    let persistence = board.persistence();
    let conductor = Arc::new(
        Conductor::new(
            "test-conductor",
            board_dyn,
            persistence,
            Arc::new(FakeEngineLoader),
            options,
        )
        .unwrap(),
    );
    conductor.connect().await.unwrap();
    (conductor, board)
}

fn flag_handler(flag: Arc<AtomicBool>) -> Handler {
    Arc::new(move |_event, _details| {
        flag.store(true, Ordering::SeqCst);
    })
}

fn counter_handler(counter: Arc<AtomicUsize>) -> Handler {
    Arc::new(move |_event, _details| {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[tokio::test]
async fn test_connection_propagates_to_board() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    assert!(board.is_connected());
    conductor.close().await.unwrap();
    assert!(!board.is_connected());
}

#[tokio::test]
async fn test_run_empty_stops_cleanly() {
    let (conductor, _board) = new_conductor(ConductorOptions::default()).await;
    let runner = conductor.clone();
    let handle = tokio::spawn(async move { runner.run(None).await.unwrap() });

    tokio::time::sleep(Duration::from_millis(20)).await;
    conductor.stop();

    assert!(conductor.wait(Duration::from_secs(1)).await);
    assert!(!conductor.dispatching());
    handle.await.unwrap();
}

#[tokio::test]
async fn test_run_consumes_successful_job() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    let consumed = Arc::new(AtomicBool::new(false));
    let abandoned = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("job_consumed", flag_handler(consumed.clone()));
    conductor
        .notifier()
        .register("job_abandoned", flag_handler(abandoned.clone()));

    board
        .post(
            "poke",
            always_succeed_factory("poke"),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    let runner = conductor.clone();
    let handle = tokio::spawn(async move { runner.run(None).await.unwrap() });
    tokio::time::sleep(Duration::from_millis(100)).await;
    conductor.stop();
    assert!(conductor.wait(Duration::from_secs(1)).await);
    handle.await.unwrap();

    assert!(consumed.load(Ordering::SeqCst));
    assert!(!abandoned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_run_max_dispatches_bounds_consumption() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    for i in 0..6 {
        board
            .post(
                &format!("job-{i}"),
                always_succeed_factory(&format!("job-{i}")),
                Default::default(),
                Priority::Normal,
            )
            .await
            .unwrap();
    }

    let consumed_count = Arc::new(AtomicUsize::new(0));
    conductor
        .notifier()
        .register("job_consumed", counter_handler(consumed_count.clone()));

    conductor.run(Some(5)).await.unwrap();

    assert_eq!(consumed_count.load(Ordering::SeqCst), 5);
    let remaining = board.iterjobs(true, true).await.unwrap();
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn test_fail_run_is_consumed_not_abandoned() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    let consumed = Arc::new(AtomicBool::new(false));
    let abandoned = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("job_consumed", flag_handler(consumed.clone()));
    conductor
        .notifier()
        .register("job_abandoned", flag_handler(abandoned.clone()));

    board
        .post(
            "blowup",
            always_revert_factory("blowup"),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    conductor.run(Some(1)).await.unwrap();

    assert!(consumed.load(Ordering::SeqCst));
    assert!(!abandoned.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_engine_crash_is_abandoned_not_consumed() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    let consumed = Arc::new(AtomicBool::new(false));
    let abandoned = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("job_consumed", flag_handler(consumed.clone()));
    conductor
        .notifier()
        .register("job_abandoned", flag_handler(abandoned.clone()));

    board
        .post(
            "crashy",
            crash_factory("crashy"),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    conductor.run(Some(1)).await.unwrap();

    assert!(abandoned.load(Ordering::SeqCst));
    assert!(!consumed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_delayed_job_not_dispatched_before_due() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    let claimed = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("job_claimed", flag_handler(claimed.clone()));

    board
        .post_delayed(
            180,
            "later",
            always_succeed_factory("later"),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    let runner = conductor.clone();
    let handle = tokio::spawn(async move { runner.run(None).await.unwrap() });
    tokio::time::sleep(Duration::from_millis(100)).await;
    conductor.stop();
    conductor.wait(Duration::from_secs(1)).await;
    handle.await.unwrap();

    assert!(!claimed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_stop_aborts_in_flight_engine() {
    let (conductor, board) = new_conductor(ConductorOptions::default()).await;
    let running = Arc::new(AtomicBool::new(false));
    let consumed = Arc::new(AtomicBool::new(false));
    let abandoned = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("running_start", flag_handler(running.clone()));
    conductor
        .notifier()
        .register("job_consumed", flag_handler(consumed.clone()));
    conductor
        .notifier()
        .register("job_abandoned", flag_handler(abandoned.clone()));

    board
        .post(
            "sleepy",
            sleep_then_succeed_factory("sleepy", Duration::from_secs(2)),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    let runner = conductor.clone();
    let handle = tokio::spawn(async move { runner.run(None).await.unwrap() });

    for _ in 0..100 {
        if running.load(Ordering::SeqCst) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(running.load(Ordering::SeqCst));

    conductor.stop();
    assert!(conductor.wait(Duration::from_secs(2)).await);
    handle.await.unwrap();

    assert!(abandoned.load(Ordering::SeqCst));
    assert!(!consumed.load(Ordering::SeqCst));
}

#[tokio::test]
async fn test_compile_failure_exceeding_limit_trashes_job() {
    let mut options = ConductorOptions::default();
    options.job_compiler_error_limit = 1;
    let (conductor, board) = new_conductor(options).await;

    let abandoned = Arc::new(AtomicBool::new(false));
    let trashed = Arc::new(AtomicBool::new(false));
    conductor
        .notifier()
        .register("job_abandoned", flag_handler(abandoned.clone()));
    conductor
        .notifier()
        .register("job_trashed", flag_handler(trashed.clone()));

    board
        .post(
            "bad",
            compiler_blowup_factory("bad"),
            Default::default(),
            Priority::Normal,
        )
        .await
        .unwrap();

    conductor.run(Some(1)).await.unwrap();

    assert!(abandoned.load(Ordering::SeqCst));
    assert!(trashed.load(Ordering::SeqCst));
    let remaining = board.iterjobs(false, true).await.unwrap();
    assert!(remaining.is_empty());
}

#[tokio::test]
async fn test_non_blocking_mode_dispatches_concurrently() {
    let mut options = ConductorOptions::default();
    options.dispatch_mode = DispatchMode::NonBlocking;
    let (conductor, board) = new_conductor(options).await;

    for i in 0..3 {
        board
            .post(
                &format!("job-{i}"),
                sleep_then_succeed_factory(&format!("job-{i}"), Duration::from_millis(100)),
                Default::default(),
                Priority::Normal,
            )
            .await
            .unwrap();
    }

    let consumed_count = Arc::new(AtomicUsize::new(0));
    conductor
        .notifier()
        .register("job_consumed", counter_handler(consumed_count.clone()));

    let start = std::time::Instant::now();
    conductor.run(Some(3)).await.unwrap();
    let elapsed = start.elapsed();

    assert_eq!(consumed_count.load(Ordering::SeqCst), 3);
    assert!(elapsed < Duration::from_millis(280));
}
