use crate::keys::{
    entities_key, entity_field, index_key, job_key, lock_key, schedule_key, trash_index_key,
    trash_job_key,
};
use crate::persistence::RedisPersistence;
use async_trait::async_trait;
use chrono::Utc;
use deadpool_redis::Pool;
use jb_board::naming::sort_key;
use jb_board::{Board, ScheduleSpec, POSTED, REMOVAL};
use jb_core::{Entity, Error, Id, Job, Notifier, Priority, Result};
use jb_engine::{FlowFactory, Persistence, Store};
use parking_lot::Mutex as SyncMutex;
use redis::AsyncCommands;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

fn redis_err(context: impl AsRef<str>, err: impl std::fmt::Display) -> Error {
    Error::Config(format!("{}: {err}", context.as_ref()))
}

#[derive(Debug, Clone)]
pub struct RedisBoardConfig {
    /// How long a claim survives without renewal before Redis expires it.
    pub lease_seconds: i64,
    /// Key namespace prefix, so one Redis instance can host more than one
    /// board without collisions.
    pub root: String,
}

impl Default for RedisBoardConfig {
    fn default() -> Self {
        Self {
            lease_seconds: 30,
            root: "jb".to_string(),
        }
    }
}

/// Leased-lock board realization: a claim is a `SET NX EX` key whose
/// expiry *is* the liveness check, so unlike the sqlite board there is no
/// separate staleness computation — a lock that still exists is live by
/// construction. The per-claim heartbeat task renews the lease until the
/// lock is released or the process dies, in which case Redis reclaims it
/// on its own once the lease lapses.
pub struct RedisBoard {
    pool: Pool,
    persistence: Arc<RedisPersistence>,
    config: RedisBoardConfig,
    connected: AtomicBool,
    heartbeats: SyncMutex<HashMap<String, JoinHandle<()>>>,
    notifier: Notifier,
}

impl RedisBoard {
    pub fn new(pool: Pool, config: RedisBoardConfig) -> Self {
        Self {
            persistence: Arc::new(RedisPersistence::new(pool.clone(), config.root.clone())),
            pool,
            config,
            connected: AtomicBool::new(false),
            heartbeats: SyncMutex::new(HashMap::new()),
            notifier: Notifier::new(),
        }
    }

    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.persistence.clone()
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| redis_err("failed to get redis connection", e))
    }

    fn start_heartbeat(&self, job_uuid: &str) {
        let pool = self.pool.clone();
        let key = lock_key(&self.config.root, job_uuid);
        let lease_seconds = self.config.lease_seconds;
        let interval = StdDuration::from_secs((lease_seconds / 3).max(1) as u64);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let Ok(mut conn) = pool.get().await else {
                    warn!(key = %key, "lease renewal could not reach redis");
                    continue;
                };
                let result: std::result::Result<bool, redis::RedisError> =
                    conn.expire(&key, lease_seconds).await;
                if let Err(e) = result {
                    warn!(key = %key, error = %e, "lease renewal failed");
                }
            }
        });
        self.heartbeats.lock().insert(job_uuid.to_string(), handle);
    }

    fn stop_heartbeat(&self, job_uuid: &str) {
        if let Some(handle) = self.heartbeats.lock().remove(job_uuid) {
            handle.abort();
        }
    }

    async fn fetch_job(&self, uuid: &str) -> Result<Option<Job>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn
            .get(job_key(&self.config.root, uuid))
            .await
            .map_err(|e| redis_err("failed to fetch job", e))?;
        payload
            .map(|p| {
                serde_json::from_str(&p)
                    .map_err(|e| Error::Codec(format!("failed to deserialize job {uuid}: {e}")))
            })
            .transpose()
    }

    async fn is_claimed(&self, uuid: &str) -> Result<bool> {
        let mut conn = self.conn().await?;
        conn.exists(lock_key(&self.config.root, uuid))
            .await
            .map_err(|e| redis_err("failed to check lock", e))
    }

    async fn insert_job(
        &self,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
        run_at: Option<i64>,
        schedule: Option<String>,
    ) -> Result<Job> {
        let flow = factory.generate(&store)?;
        let flow_detail = self.persistence.save_flow_detail(flow, store.clone()).await?;

        let now = Utc::now();
        let job = Job {
            uuid: Id::new().to_string(),
            name: name.to_string(),
            priority,
            book: jb_core::BookRef {
                name: format!("{name}-book"),
                uuid: Id::new().to_string(),
            },
            details: jb_core::JobDetails {
                store,
                flow_uuid: flow_detail.flow_uuid.clone(),
                run_at,
                schedule: schedule.clone(),
            },
            created_on: now,
            last_modified: now,
        };

        let payload = serde_json::to_string(&job)
            .map_err(|e| Error::Codec(format!("failed to serialize job {}: {e}", job.uuid)))?;

        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(job_key(&self.config.root, &job.uuid), payload)
            .await
            .map_err(|e| redis_err("failed to insert job", e))?;
        conn.zadd::<_, _, _, ()>(index_key(&self.config.root), &job.uuid, sort_key(priority, now))
            .await
            .map_err(|e| redis_err("failed to index job", e))?;
        if schedule.is_some() {
            conn.set::<_, _, ()>(schedule_key(&self.config.root, name), &job.uuid)
                .await
                .map_err(|e| redis_err("failed to index scheduled job", e))?;
        }

        self.notifier.notify(POSTED, &BTreeMap::new());
        Ok(job)
    }

    async fn delete_job(&self, uuid: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(job_key(&self.config.root, uuid))
            .await
            .map_err(|e| redis_err("failed to delete job", e))?;
        conn.zrem::<_, _, ()>(index_key(&self.config.root), uuid)
            .await
            .map_err(|e| redis_err("failed to unindex job", e))?;
        conn.del::<_, ()>(lock_key(&self.config.root, uuid))
            .await
            .map_err(|e| redis_err("failed to delete lock", e))?;
        self.stop_heartbeat(uuid);
        Ok(())
    }

    /// Moves `job`'s record into the trash namespace, then removes it from
    /// the live job/index/lock keys. The record stays readable at
    /// `trash_job_key` instead of being erased outright.
    async fn move_to_trash(&self, job: &Job) -> Result<()> {
        let payload = serde_json::to_string(job)
            .map_err(|e| Error::Codec(format!("failed to serialize job {}: {e}", job.uuid)))?;

        let mut conn = self.conn().await?;
        conn.set::<_, _, ()>(trash_job_key(&self.config.root, &job.uuid), payload)
            .await
            .map_err(|e| redis_err("failed to write trashed job record", e))?;
        conn.zadd::<_, _, _, ()>(
            trash_index_key(&self.config.root),
            &job.uuid,
            sort_key(job.priority, job.created_on),
        )
        .await
        .map_err(|e| redis_err("failed to index trashed job", e))?;

        self.delete_job(&job.uuid).await
    }

    async fn verify_ownership(&self, job_uuid: &str, owner: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let current: Option<String> = conn
            .get(lock_key(&self.config.root, job_uuid))
            .await
            .map_err(|e| redis_err("failed to read lock", e))?;
        match current {
            Some(current_owner) if current_owner == owner => Ok(()),
            _ => Err(Error::NotClaimed(job_uuid.to_string())),
        }
    }
}

#[async_trait]
impl Board for RedisBoard {
    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_err("failed to ping redis", e))?;
        info!("redis board connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let mut heartbeats = self.heartbeats.lock();
        for (_, handle) in heartbeats.drain() {
            handle.abort();
        }
        debug!("redis board closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn post(
        &self,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job> {
        self.insert_job(name, factory, store, priority, None, None).await
    }

    async fn post_delayed(
        &self,
        delay_seconds: i64,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job> {
        let run_at = jb_core::scheduler::delay_from_now(delay_seconds).timestamp();
        self.insert_job(name, factory, store, priority, Some(run_at), None)
            .await
    }

    async fn post_scheduled(
        &self,
        cron_expr: &str,
        name: &str,
        factory: FlowFactory,
        store: Store,
        priority: Priority,
    ) -> Result<Job> {
        let next = jb_core::scheduler::next_fire_after(cron_expr, Utc::now())?;
        self.insert_job(
            name,
            factory,
            store,
            priority,
            Some(next.timestamp()),
            Some(cron_expr.to_string()),
        )
        .await
    }

    async fn reset_schedule(&self, specs: BTreeMap<String, ScheduleSpec>) -> Result<Vec<Job>> {
        let mut results = Vec::with_capacity(specs.len());
        for (name, spec) in specs {
            let mut conn = self.conn().await?;
            let prior_uuid: Option<String> = conn
                .get(schedule_key(&self.config.root, &name))
                .await
                .map_err(|e| redis_err("failed to look up scheduled job", e))?;

            let Some(prior_uuid) = prior_uuid else {
                let job = self
                    .post_scheduled(&spec.schedule, &name, spec.factory, spec.store, Priority::Normal)
                    .await?;
                results.push(job);
                continue;
            };

            let Some(prior_job) = self.fetch_job(&prior_uuid).await? else {
                let job = self
                    .post_scheduled(&spec.schedule, &name, spec.factory, spec.store, Priority::Normal)
                    .await?;
                results.push(job);
                continue;
            };

            if self.is_claimed(&prior_uuid).await? {
                return Err(Error::UnclaimableJob(name));
            }

            if prior_job.details.schedule.as_deref() == Some(spec.schedule.as_str())
                && prior_job.details.store == spec.store
            {
                results.push(prior_job);
                continue;
            }

            self.delete_job(&prior_uuid).await?;
            let job = self
                .post_scheduled(&spec.schedule, &name, spec.factory, spec.store, Priority::Normal)
                .await?;
            results.push(job);
        }
        Ok(results)
    }

    async fn iterjobs(&self, only_unclaimed: bool, _ensure_fresh: bool) -> Result<Vec<Job>> {
        let mut conn = self.conn().await?;
        let uuids: Vec<String> = conn
            .zrange(index_key(&self.config.root), 0, -1)
            .await
            .map_err(|e| redis_err("failed to scan job index", e))?;

        let now = Utc::now();
        let mut jobs = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            let Some(job) = self.fetch_job(&uuid).await? else { continue };
            if job.is_future(now) {
                continue;
            }
            if only_unclaimed && self.is_claimed(&uuid).await? {
                continue;
            }
            jobs.push(job);
        }
        Ok(jobs)
    }

    async fn search(
        &self,
        store_filter: Option<Store>,
        exclude: &[String],
        only_unclaimed: bool,
    ) -> Result<Vec<Job>> {
        let mut conn = self.conn().await?;
        let uuids: Vec<String> = conn
            .zrange(index_key(&self.config.root), 0, -1)
            .await
            .map_err(|e| redis_err("failed to scan job index", e))?;

        let mut jobs = Vec::new();
        for uuid in uuids {
            let Some(job) = self.fetch_job(&uuid).await? else { continue };
            if exclude.contains(&job.book_uuid().to_string()) {
                continue;
            }
            if let Some(filter) = &store_filter {
                if !job.store_matches(filter) {
                    continue;
                }
            }
            if only_unclaimed && self.is_claimed(&uuid).await? {
                continue;
            }
            jobs.push(job);
        }
        Ok(jobs)
    }

    async fn claim(&self, job: &Job, owner: &str) -> Result<()> {
        if self.fetch_job(&job.uuid).await?.is_none() {
            return Err(Error::NotFound(job.uuid.clone()));
        }

        let mut conn = self.conn().await?;
        let result: Option<String> = redis::cmd("SET")
            .arg(lock_key(&self.config.root, &job.uuid))
            .arg(owner)
            .arg("NX")
            .arg("EX")
            .arg(self.config.lease_seconds)
            .query_async(&mut *conn)
            .await
            .map_err(|e| redis_err("failed to claim job", e))?;

        if result.is_none() {
            return Err(Error::UnclaimableJob(job.uuid.clone()));
        }

        self.start_heartbeat(&job.uuid);
        Ok(())
    }

    async fn consume(&self, job: &Job, owner: &str) -> Result<()> {
        self.verify_ownership(&job.uuid, owner).await?;

        if let Some(schedule) = &job.details.schedule {
            let next = jb_core::scheduler::next_fire_after(schedule, Utc::now())?;
            let flow_detail = self.persistence.load_flow_detail(&job.details.flow_uuid).await?;
            self.insert_job(
                &job.name,
                FlowFactory::from_fn(move |_store| Ok(flow_detail.flow.clone())),
                job.details.store.clone(),
                job.priority,
                Some(next.timestamp()),
                Some(schedule.clone()),
            )
            .await?;
        }

        self.delete_job(&job.uuid).await?;
        self.notifier.notify(REMOVAL, &BTreeMap::new());
        Ok(())
    }

    async fn abandon(&self, job: &Job, owner: &str) -> Result<()> {
        self.verify_ownership(&job.uuid, owner).await?;
        let mut conn = self.conn().await?;
        conn.del::<_, ()>(lock_key(&self.config.root, &job.uuid))
            .await
            .map_err(|e| redis_err("failed to abandon lock", e))?;
        self.stop_heartbeat(&job.uuid);
        Ok(())
    }

    async fn trash(&self, job: &Job, owner: &str) -> Result<()> {
        self.verify_ownership(&job.uuid, owner).await?;
        self.move_to_trash(job).await?;
        self.notifier.notify(REMOVAL, &BTreeMap::new());
        Ok(())
    }

    async fn killall(&self) -> Result<Vec<Job>> {
        let mut conn = self.conn().await?;
        let uuids: Vec<String> = conn
            .zrange(index_key(&self.config.root), 0, -1)
            .await
            .map_err(|e| redis_err("failed to scan job index for killall", e))?;

        let mut trashed = Vec::with_capacity(uuids.len());
        for uuid in uuids {
            if let Some(job) = self.fetch_job(&uuid).await? {
                self.move_to_trash(&job).await?;
                trashed.push(job);
            }
        }
        if !trashed.is_empty() {
            self.notifier.notify(REMOVAL, &BTreeMap::new());
        }
        Ok(trashed)
    }

    async fn register_entity(&self, entity: &Entity) -> Result<()> {
        let metadata_json = serde_json::to_string(&entity.metadata)
            .map_err(|e| Error::Codec(format!("failed to serialize entity metadata: {e}")))?;
        let mut conn = self.conn().await?;
        conn.hset::<_, _, _, ()>(
            entities_key(&self.config.root),
            entity_field(&entity.kind, &entity.name),
            metadata_json,
        )
        .await
        .map_err(|e| redis_err("failed to register entity", e))?;
        Ok(())
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
