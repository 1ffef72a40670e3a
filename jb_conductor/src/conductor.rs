use jb_board::Board;
use jb_core::{Entity, Error, Job, Notifier, Result, CONDUCTOR_KIND};
use jb_engine::engines::{load_from_detail, EngineLoader, EngineOptions};
use jb_engine::{merge_store, EngineKind, EngineOutcome, EngineState, Persistence};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Invoked once per dispatched job, mirroring a listener attaching to the
/// engine before it runs. The real engine's listenable internals are out
/// of scope, so a factory only observes the job being dispatched.
pub type ListenerFactory = Arc<dyn Fn(&Job) + Send + Sync>;

/// Whether dispatched jobs run one at a time on the run-loop task, or are
/// each spawned onto their own task so the loop keeps scanning for more
/// work while earlier dispatches are still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    Blocking,
    NonBlocking,
}

/// Construction options for a [`Conductor`].
///
/// `wait_timeout`/`job_compiler_error_limit` take plain `Duration`/`u32`
/// values rather than the source system's loosely-typed keyword
/// arguments, so the construction-time type validation the original
/// performs (reject a non-numeric timeout, a non-callable executor
/// factory) has no Rust analogue: the type system already rejects those
/// inputs at the call site.
pub struct ConductorOptions {
    pub engine_kind: EngineKind,
    pub engine_options: EngineOptions,
    pub listener_factories: Vec<ListenerFactory>,
    pub wait_timeout: StdDuration,
    pub job_compiler_error_limit: u32,
    pub dispatch_mode: DispatchMode,
    /// Caps how many dispatches [`DispatchMode::NonBlocking`] runs
    /// concurrently. Ignored in [`DispatchMode::Blocking`], which already
    /// runs one dispatch at a time. `0` is treated as unbounded.
    pub worker_pool_size: usize,
}

impl Default for ConductorOptions {
    fn default() -> Self {
        Self {
            engine_kind: EngineKind::Serial,
            engine_options: EngineOptions::new(),
            listener_factories: Vec::new(),
            wait_timeout: StdDuration::from_millis(50),
            job_compiler_error_limit: 1,
            dispatch_mode: DispatchMode::Blocking,
            worker_pool_size: 4,
        }
    }
}

fn job_details(job: &Job) -> BTreeMap<String, Value> {
    let mut details = BTreeMap::new();
    details.insert("uuid".to_string(), Value::String(job.uuid.clone()));
    details.insert("name".to_string(), Value::String(job.name.clone()));
    details
}

/// Finds, claims, and runs jobs off a [`Board`] until stopped.
///
/// One struct realizes both the blocking and non-blocking dispatch
/// strategies from `examples/original_source/zag/conductors/base.py`'s
/// `BlockingConductor`/`NonBlockingConductor` split: the only behavioral
/// difference between them is whether a claimed job's engine run is
/// awaited inline or spawned onto its own task, which [`DispatchMode`]
/// captures without needing two near-duplicate structs.
pub struct Conductor {
    board: Arc<dyn Board>,
    persistence: Arc<dyn Persistence>,
    engine_loader: Arc<dyn EngineLoader>,
    entity: Entity,
    options: ConductorOptions,
    notifier: Notifier,
    cancel_token: CancellationToken,
    dispatching: AtomicBool,
    compile_failures: Mutex<HashMap<String, u32>>,
}

impl Conductor {
    pub fn new(
        name: impl Into<String>,
        board: Arc<dyn Board>,
        persistence: Arc<dyn Persistence>,
        engine_loader: Arc<dyn EngineLoader>,
        options: ConductorOptions,
    ) -> Result<Self> {
        let name = name.into();
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let pid = std::process::id();
        let entity_name = format!("{name}@{hostname}:{pid}");
        let mut metadata = BTreeMap::new();
        metadata.insert("hostname".to_string(), hostname);
        metadata.insert("pid".to_string(), pid.to_string());
        let entity = Entity::new(CONDUCTOR_KIND, entity_name, metadata)?;

        Ok(Self {
            board,
            persistence,
            engine_loader,
            entity,
            options,
            notifier: Notifier::new(),
            cancel_token: CancellationToken::new(),
            dispatching: AtomicBool::new(false),
            compile_failures: Mutex::new(HashMap::new()),
        })
    }

    /// Convenience constructor pinning [`DispatchMode::Blocking`].
    pub fn blocking(
        name: impl Into<String>,
        board: Arc<dyn Board>,
        persistence: Arc<dyn Persistence>,
        engine_loader: Arc<dyn EngineLoader>,
        mut options: ConductorOptions,
    ) -> Result<Self> {
        options.dispatch_mode = DispatchMode::Blocking;
        Self::new(name, board, persistence, engine_loader, options)
    }

    /// Convenience constructor pinning [`DispatchMode::NonBlocking`].
    pub fn non_blocking(
        name: impl Into<String>,
        board: Arc<dyn Board>,
        persistence: Arc<dyn Persistence>,
        engine_loader: Arc<dyn EngineLoader>,
        mut options: ConductorOptions,
    ) -> Result<Self> {
        options.dispatch_mode = DispatchMode::NonBlocking;
        Self::new(name, board, persistence, engine_loader, options)
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn owner_id(&self) -> String {
        self.entity.registry_key()
    }

    /// Idempotent connect, delegating to the board and announcing this
    /// conductor's entity.
    pub async fn connect(&self) -> Result<()> {
        self.board.connect().await?;
        self.board.register_entity(&self.entity).await
    }

    pub async fn close(&self) -> Result<()> {
        self.board.close().await
    }

    /// Signal the run loop to stop claiming new jobs and abandon whatever
    /// is in flight. A stopped conductor cannot be restarted: its
    /// cancellation token, like the board connections it coordinates, is
    /// single-use.
    pub fn stop(&self) {
        self.cancel_token.cancel();
    }

    /// True while `run()` is executing.
    pub fn dispatching(&self) -> bool {
        self.dispatching.load(Ordering::SeqCst)
    }

    /// Poll until `dispatching()` goes false or `timeout` elapses.
    /// Returns whether the loop actually settled before the deadline.
    pub async fn wait(&self, timeout: StdDuration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if !self.dispatching() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
    }

    /// Claim and dispatch jobs until `stop()` is called or `max_dispatches`
    /// is reached. `None`/`0` means unbounded.
    pub async fn run(self: &Arc<Self>, max_dispatches: Option<u64>) -> Result<()> {
        self.dispatching.store(true, Ordering::SeqCst);
        let mut dispatched: u64 = 0;
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if self.cancel_token.is_cancelled() {
                break;
            }
            if let Some(max) = max_dispatches {
                if max > 0 && dispatched >= max {
                    break;
                }
            }

            match self.find_and_claim_one().await {
                Ok(Some(job)) => {
                    dispatched += 1;
                    match self.options.dispatch_mode {
                        DispatchMode::Blocking => {
                            self.dispatch_job(job).await;
                        }
                        DispatchMode::NonBlocking => {
                            let pool_size = self.options.worker_pool_size;
                            if pool_size > 0 && in_flight.len() >= pool_size {
                                in_flight.join_next().await;
                            }
                            let this = Arc::clone(self);
                            in_flight.spawn(async move {
                                this.dispatch_job(job).await;
                            });
                        }
                    }
                }
                Ok(None) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.wait_timeout) => {}
                        _ = self.cancel_token.cancelled() => break,
                    }
                }
                Err(e) => {
                    warn!(error = %e, "conductor failed to scan board for eligible jobs");
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.wait_timeout) => {}
                        _ = self.cancel_token.cancelled() => break,
                    }
                }
            }
        }

        while in_flight.join_next().await.is_some() {}

        self.dispatching.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn find_and_claim_one(&self) -> Result<Option<Job>> {
        let jobs = self.board.iterjobs(true, true).await?;
        let owner = self.owner_id();
        for job in jobs {
            match self.board.claim(&job, &owner).await {
                Ok(()) => return Ok(Some(job)),
                Err(Error::UnclaimableJob(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(None)
    }

    /// Build an engine for `job` and run it to resolution.
    ///
    /// Racing `engine.run()` against `self.cancel_token.cancelled()` in a
    /// single `select!` is what lets `stop()` abort an in-flight dispatch
    /// without any second task ever touching the boxed engine: when the
    /// token wins, tokio drops the `run()` future at its current await
    /// point and `suspend()` is called for bookkeeping only.
    async fn dispatch_job(&self, job: Job) {
        let owner = self.owner_id();
        self.notifier.notify("job_claimed", &job_details(&job));

        let flow_detail = match self
            .persistence
            .load_flow_detail(&job.details.flow_uuid)
            .await
        {
            Ok(fd) => fd,
            Err(e) => {
                self.handle_compile_failure(&job, e).await;
                return;
            }
        };
        let flow_uuid = flow_detail.flow_uuid.clone();
        let merged_store = merge_store(&flow_detail.meta.store, &job.details.store);

        let mut engine = match load_from_detail(
            flow_detail,
            merged_store,
            self.options.engine_kind,
            self.engine_loader.as_ref(),
            &self.options.engine_options,
        ) {
            Ok(engine) => engine,
            Err(e) => {
                self.handle_compile_failure(&job, e).await;
                return;
            }
        };

        for factory in &self.options.listener_factories {
            factory(&job);
        }
        self.notifier.notify("running_start", &job_details(&job));

        let outcome = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => {
                engine.suspend();
                None
            }
            result = engine.run() => Some(result),
        };

        match outcome {
            None => {
                let _ = self
                    .persistence
                    .update_flow_state(&flow_uuid, EngineState::Reverted)
                    .await;
                self.resolve_abandon(&job, &owner).await;
            }
            Some(Ok(EngineOutcome(state))) => {
                let _ = self.persistence.update_flow_state(&flow_uuid, state).await;
                self.resolve_consume(&job, &owner).await;
            }
            Some(Err(e)) => {
                warn!(job = %job.uuid, error = %e, "engine failed while running job");
                let _ = self
                    .persistence
                    .update_flow_state(&flow_uuid, EngineState::Failure)
                    .await;
                self.resolve_abandon(&job, &owner).await;
            }
        }
    }

    /// A job that failed to compile (flow detail missing, or the engine
    /// loader itself errored building the engine) is always reported as
    /// `job_abandoned`. Only once its failure count reaches
    /// `job_compiler_error_limit` is it actually trashed; below the limit
    /// it's left for another dispatch attempt. The counter lives only in
    /// this conductor's memory — `job_compiler_error_limit` has no board
    /// representation in the source system either, so no board schema
    /// needs to carry it.
    async fn handle_compile_failure(&self, job: &Job, err: Error) {
        warn!(job = %job.uuid, error = %err, "job failed to compile");
        let owner = self.owner_id();
        self.notifier.notify("job_abandoned", &job_details(job));

        let exceeded = {
            let mut failures = self.compile_failures.lock();
            let count = failures.entry(job.uuid.clone()).or_insert(0);
            *count += 1;
            *count >= self.options.job_compiler_error_limit
        };

        if exceeded {
            self.compile_failures.lock().remove(&job.uuid);
            match self.board.trash(job, &owner).await {
                Ok(()) => self.notifier.notify("job_trashed", &job_details(job)),
                Err(e) => {
                    warn!(job = %job.uuid, error = %e, "failed to trash job after repeated compile failures")
                }
            }
        } else if let Err(e) = self.board.abandon(job, &owner).await {
            warn!(job = %job.uuid, error = %e, "failed to abandon job after compile failure");
        }
    }

    async fn resolve_consume(&self, job: &Job, owner: &str) {
        match self.board.consume(job, owner).await {
            Ok(()) => self.notifier.notify("job_consumed", &job_details(job)),
            Err(e) => warn!(job = %job.uuid, error = %e, "failed to consume resolved job"),
        }
    }

    async fn resolve_abandon(&self, job: &Job, owner: &str) {
        match self.board.abandon(job, owner).await {
            Ok(()) => self.notifier.notify("job_abandoned", &job_details(job)),
            Err(e) => warn!(job = %job.uuid, error = %e, "failed to abandon job"),
        }
    }
}
