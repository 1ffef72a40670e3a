use crate::persistence::SqlitePersistence;
use crate::session::SessionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jb_board::naming::sort_key;
use jb_board::{Board, ScheduleSpec, POSTED, REMOVAL};
use jb_core::{BookRef, Entity, Error, Id, Job, JobDetails, Notifier, Priority, Result};
use jb_engine::{FlowFactory, Persistence, Store};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration as StdDuration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Tuning for the sqlite realization's session-heartbeat emulation of
/// ephemeral-node semantics.
#[derive(Debug, Clone)]
pub struct SqliteBoardConfig {
    /// How long a session's locks survive without a heartbeat before
    /// they're treated as belonging to a dead session.
    pub session_ttl_seconds: i64,
    /// How often the background heartbeat refreshes this session's own
    /// locks. Defaults to a third of the TTL, matching the redis board's
    /// lease-renewal cadence.
    pub heartbeat_interval: StdDuration,
}

impl Default for SqliteBoardConfig {
    fn default() -> Self {
        let ttl = 30;
        Self {
            session_ttl_seconds: ttl,
            heartbeat_interval: StdDuration::from_secs((ttl / 3).max(1) as u64),
        }
    }
}

/// Ephemeral-node board realization on a sqlite substrate. See
/// `jb_board_sqlite::session` for how session-boundedness is emulated.
pub struct SqliteBoard {
    pool: SqlitePool,
    persistence: Arc<SqlitePersistence>,
    session: SessionId,
    config: SqliteBoardConfig,
    connected: AtomicBool,
    heartbeat_handle: AsyncMutex<Option<JoinHandle<()>>>,
    notifier: Notifier,
}

struct JobRow {
    job: Job,
    lock_owner: Option<String>,
    lock_heartbeat_at: Option<String>,
}

impl SqliteBoard {
    /// Open a sqlite board at the given sqlx DSN, e.g.
    /// `"sqlite://path/to/board.db?mode=rwc"` or `"sqlite::memory:"` for an
    /// ephemeral, test-only board.
    pub async fn open(dsn: &str, config: SqliteBoardConfig) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(dsn)
            .await
            .map_err(|e| Error::Config(format!("failed to open sqlite board at {dsn}: {e}")))?;
        Self::from_pool(pool, config).await
    }

    pub async fn from_pool(pool: SqlitePool, config: SqliteBoardConfig) -> Result<Self> {
        let board = Self {
            persistence: Arc::new(SqlitePersistence::new(pool.clone())),
            pool,
            session: SessionId::new(),
            config,
            connected: AtomicBool::new(false),
            heartbeat_handle: AsyncMutex::new(None),
            notifier: Notifier::new(),
        };
        board.migrate().await?;
        Ok(board)
    }

    pub fn persistence(&self) -> Arc<dyn Persistence> {
        self.persistence.clone()
    }

    #[cfg(test)]
    pub(crate) fn pool_for_test(&self) -> &SqlitePool {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                uuid TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                priority TEXT NOT NULL,
                book_name TEXT NOT NULL,
                book_uuid TEXT NOT NULL,
                flow_uuid TEXT NOT NULL,
                store_json TEXT NOT NULL,
                run_at INTEGER,
                schedule TEXT,
                sort_key INTEGER NOT NULL,
                created_on TEXT NOT NULL,
                last_modified TEXT NOT NULL,
                trashed INTEGER NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to migrate jobs table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_jobs_sort_key ON jobs(sort_key)")
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to create sort_key index: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS locks (
                job_uuid TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                session_id TEXT NOT NULL,
                locked_at TEXT NOT NULL,
                heartbeat_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to migrate locks table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS entities (
                kind TEXT NOT NULL,
                name TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                PRIMARY KEY (kind, name)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to migrate entities table: {e}")))?;

        self.persistence.migrate().await
    }

    fn row_is_claimed(&self, owner: &Option<String>, heartbeat_at: &Option<String>, now: DateTime<Utc>) -> bool {
        match owner {
            Some(o) if !o.is_empty() => {}
            _ => return false,
        }
        let heartbeat_at = match heartbeat_at {
            Some(h) => h,
            None => return false,
        };
        match DateTime::parse_from_rfc3339(heartbeat_at) {
            Ok(hb) => (now - hb.with_timezone(&Utc)).num_seconds() <= self.config.session_ttl_seconds,
            Err(_) => false,
        }
    }

    async fn fetch_job_row(&self, uuid: &str) -> Result<Option<JobRow>> {
        let row = sqlx::query(
            r#"
            SELECT j.uuid, j.name, j.priority, j.book_name, j.book_uuid, j.flow_uuid,
                   j.store_json, j.run_at, j.schedule, j.created_on, j.last_modified,
                   l.owner as lock_owner, l.heartbeat_at as lock_heartbeat_at
            FROM jobs j
            LEFT JOIN locks l ON l.job_uuid = j.uuid
            WHERE j.uuid = ? AND j.trashed = 0
            "#,
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to fetch job {uuid}: {e}")))?;

        row.map(|r| self.row_to_job_row(r)).transpose()
    }

    fn row_to_job_row(&self, row: sqlx::sqlite::SqliteRow) -> Result<JobRow> {
        let store_json: String = row.try_get("store_json").unwrap_or_default();
        let store: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&store_json).unwrap_or_default();
        let priority_str: String = row.try_get("priority").unwrap_or_default();
        let priority = match priority_str.as_str() {
            "HIGH" => Priority::High,
            "LOW" => Priority::Low,
            _ => Priority::Normal,
        };
        let created_on: String = row.try_get("created_on").unwrap_or_default();
        let last_modified: String = row.try_get("last_modified").unwrap_or_default();

        let job = Job {
            uuid: row.try_get("uuid").unwrap_or_default(),
            name: row.try_get("name").unwrap_or_default(),
            priority,
            book: BookRef {
                name: row.try_get("book_name").unwrap_or_default(),
                uuid: row.try_get("book_uuid").unwrap_or_default(),
            },
            details: JobDetails {
                store,
                flow_uuid: row.try_get("flow_uuid").unwrap_or_default(),
                run_at: row.try_get("run_at").ok(),
                schedule: row.try_get("schedule").ok(),
            },
            created_on: DateTime::parse_from_rfc3339(&created_on)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
            last_modified: DateTime::parse_from_rfc3339(&last_modified)
                .map(|d| d.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        };

        Ok(JobRow {
            job,
            lock_owner: row.try_get("lock_owner").ok(),
            lock_heartbeat_at: row.try_get("lock_heartbeat_at").ok(),
        })
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
            book: BookRef {
                name: format!("{name}-book"),
                uuid: Id::new().to_string(),
            },
            details: JobDetails {
                store,
                flow_uuid: flow_detail.flow_uuid.clone(),
                run_at,
                schedule: schedule.clone(),
            },
            created_on: now,
            last_modified: now,
        };

        let store_json = serde_json::to_string(&job.details.store)
            .map_err(|e| Error::Codec(format!("failed to serialize job store: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO jobs (
                uuid, name, priority, book_name, book_uuid, flow_uuid, store_json,
                run_at, schedule, sort_key, created_on, last_modified
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&job.uuid)
        .bind(&job.name)
        .bind(priority_str(priority))
        .bind(&job.book.name)
        .bind(&job.book.uuid)
        .bind(&job.details.flow_uuid)
        .bind(&store_json)
        .bind(job.details.run_at)
        .bind(&schedule)
        .bind(sort_key(priority, now))
        .bind(job.created_on.to_rfc3339())
        .bind(job.last_modified.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to insert job {}: {e}", job.uuid)))?;

        self.notifier.notify(POSTED, &Default::default());
        Ok(job)
    }

    async fn delete_job_and_lock(&self, uuid: &str) -> Result<()> {
        sqlx::query("DELETE FROM locks WHERE job_uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to delete lock for {uuid}: {e}")))?;
        sqlx::query("DELETE FROM jobs WHERE uuid = ?")
            .bind(uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to delete job {uuid}: {e}")))?;
        Ok(())
    }

    async fn verify_ownership(&self, job_uuid: &str, owner: &str) -> Result<()> {
        let row = sqlx::query("SELECT owner FROM locks WHERE job_uuid = ?")
            .bind(job_uuid)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to read lock for {job_uuid}: {e}")))?;

        match row {
            Some(r) => {
                let current_owner: String = r.try_get("owner").unwrap_or_default();
                if current_owner == owner {
                    Ok(())
                } else {
                    Err(Error::NotClaimed(job_uuid.to_string()))
                }
            }
            None => Err(Error::NotClaimed(job_uuid.to_string())),
        }
    }

    fn start_heartbeat(&self) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let session = self.session.clone();
        let interval = self.config.heartbeat_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let now = Utc::now().to_rfc3339();
                let result = sqlx::query("UPDATE locks SET heartbeat_at = ? WHERE session_id = ?")
                    .bind(&now)
                    .bind(session.as_str())
                    .execute(&pool)
                    .await;
                if let Err(e) = result {
                    warn!(error = %e, "session heartbeat update failed");
                }
            }
        })
    }
}

fn priority_str(priority: Priority) -> &'static str {
    match priority {
        Priority::High => "HIGH",
        Priority::Normal => "NORMAL",
        Priority::Low => "LOW",
    }
}

#[async_trait]
impl Board for SqliteBoard {
    async fn connect(&self) -> Result<()> {
        if self.connected.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let handle = self.start_heartbeat();
        *self.heartbeat_handle.lock().await = Some(handle);
        info!(session = %self.session, "sqlite board connected");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.connected.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        if let Some(handle) = self.heartbeat_handle.lock().await.take() {
            handle.abort();
        }
        debug!(session = %self.session, "sqlite board closed");
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
            let prior_row = sqlx::query(
                r#"
                SELECT j.uuid, j.schedule, j.store_json, l.owner as lock_owner, l.heartbeat_at as lock_heartbeat_at
                FROM jobs j
                LEFT JOIN locks l ON l.job_uuid = j.uuid
                WHERE j.name = ? AND j.trashed = 0
                "#,
            )
            .bind(&name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to look up scheduled job {name}: {e}")))?;

            let Some(prior_row) = prior_row else {
                let job = self
                    .post_scheduled(&spec.schedule, &name, spec.factory, spec.store, Priority::Normal)
                    .await?;
                results.push(job);
                continue;
            };

            let prior_uuid: String = prior_row.try_get("uuid").unwrap_or_default();
            let lock_owner: Option<String> = prior_row.try_get("lock_owner").ok();
            let lock_heartbeat_at: Option<String> = prior_row.try_get("lock_heartbeat_at").ok();
            if self.row_is_claimed(&lock_owner, &lock_heartbeat_at, Utc::now()) {
                return Err(Error::UnclaimableJob(name));
            }

            let prior_schedule: Option<String> = prior_row.try_get("schedule").ok();
            let prior_store_json: String = prior_row.try_get("store_json").unwrap_or_default();
            let spec_store_json = serde_json::to_string(&spec.store).unwrap_or_default();

            if prior_schedule.as_deref() == Some(spec.schedule.as_str())
                && prior_store_json == spec_store_json
            {
                if let Some(row) = self.fetch_job_row(&prior_uuid).await? {
                    results.push(row.job);
                }
                continue;
            }

            self.delete_job_and_lock(&prior_uuid).await?;
            let job = self
                .post_scheduled(&spec.schedule, &name, spec.factory, spec.store, Priority::Normal)
                .await?;
            results.push(job);
        }
        Ok(results)
    }

    async fn iterjobs(&self, only_unclaimed: bool, _ensure_fresh: bool) -> Result<Vec<Job>> {
        // No cache layer exists in this implementation, so every call is
        // already a fresh read; `ensure_fresh` is accepted for interface
        // parity with a future caching board.
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            SELECT j.uuid, j.name, j.priority, j.book_name, j.book_uuid, j.flow_uuid,
                   j.store_json, j.run_at, j.schedule, j.created_on, j.last_modified,
                   l.owner as lock_owner, l.heartbeat_at as lock_heartbeat_at
            FROM jobs j
            LEFT JOIN locks l ON l.job_uuid = j.uuid
            WHERE j.trashed = 0 AND (j.run_at IS NULL OR j.run_at <= ?)
            ORDER BY j.sort_key ASC
            "#,
        )
        .bind(now.timestamp())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to scan jobs: {e}")))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let job_row = self.row_to_job_row(row)?;
            let claimed = self.row_is_claimed(&job_row.lock_owner, &job_row.lock_heartbeat_at, now);
            if only_unclaimed && claimed {
                continue;
            }
            jobs.push(job_row.job);
        }
        Ok(jobs)
    }

    async fn search(
        &self,
        store_filter: Option<Store>,
        exclude: &[String],
        only_unclaimed: bool,
    ) -> Result<Vec<Job>> {
        let now = Utc::now();
        let rows = sqlx::query(
            r#"
            SELECT j.uuid, j.name, j.priority, j.book_name, j.book_uuid, j.flow_uuid,
                   j.store_json, j.run_at, j.schedule, j.created_on, j.last_modified,
                   l.owner as lock_owner, l.heartbeat_at as lock_heartbeat_at
            FROM jobs j
            LEFT JOIN locks l ON l.job_uuid = j.uuid
            WHERE j.trashed = 0
            ORDER BY j.sort_key ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to search jobs: {e}")))?;

        let mut jobs = Vec::new();
        for row in rows {
            let job_row = self.row_to_job_row(row)?;
            if exclude.contains(&job_row.job.book_uuid().to_string()) {
                continue;
            }
            if let Some(filter) = &store_filter {
                if !job_row.job.store_matches(filter) {
                    continue;
                }
            }
            let claimed = self.row_is_claimed(&job_row.lock_owner, &job_row.lock_heartbeat_at, now);
            if only_unclaimed && claimed {
                continue;
            }
            jobs.push(job_row.job);
        }
        Ok(jobs)
    }

    async fn claim(&self, job: &Job, owner: &str) -> Result<()> {
        if self.fetch_job_row(&job.uuid).await?.is_none() {
            return Err(Error::NotFound(job.uuid.clone()));
        }

        let now = Utc::now().to_rfc3339();
        let attempt = sqlx::query(
            "INSERT INTO locks (job_uuid, owner, session_id, locked_at, heartbeat_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&job.uuid)
        .bind(owner)
        .bind(self.session.as_str())
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await;

        match attempt {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().to_lowercase().contains("unique") => {
                let existing = sqlx::query("SELECT owner, heartbeat_at FROM locks WHERE job_uuid = ?")
                    .bind(&job.uuid)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| Error::Config(format!("failed to re-read lock for {}: {e}", job.uuid)))?;

                let stale = match &existing {
                    Some(row) => {
                        let lock_owner: Option<String> = row.try_get("owner").ok();
                        let heartbeat: Option<String> = row.try_get("heartbeat_at").ok();
                        !self.row_is_claimed(&lock_owner, &heartbeat, Utc::now())
                    }
                    None => true,
                };

                if !stale {
                    return Err(Error::UnclaimableJob(job.uuid.clone()));
                }

                sqlx::query("DELETE FROM locks WHERE job_uuid = ?")
                    .bind(&job.uuid)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| Error::Config(format!("failed to clear stale lock for {}: {e}", job.uuid)))?;

                sqlx::query(
                    "INSERT INTO locks (job_uuid, owner, session_id, locked_at, heartbeat_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(&job.uuid)
                .bind(owner)
                .bind(self.session.as_str())
                .bind(&now)
                .bind(&now)
                .execute(&self.pool)
                .await
                .map_err(|_| Error::UnclaimableJob(job.uuid.clone()))?;
                Ok(())
            }
            Err(e) => Err(Error::Config(format!("failed to claim {}: {e}", job.uuid))),
        }
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

        self.delete_job_and_lock(&job.uuid).await?;
        self.notifier.notify(REMOVAL, &Default::default());
        Ok(())
    }

    async fn abandon(&self, job: &Job, owner: &str) -> Result<()> {
        self.verify_ownership(&job.uuid, owner).await?;
        sqlx::query("DELETE FROM locks WHERE job_uuid = ?")
            .bind(&job.uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to abandon {}: {e}", job.uuid)))?;
        Ok(())
    }

    async fn trash(&self, job: &Job, owner: &str) -> Result<()> {
        self.verify_ownership(&job.uuid, owner).await?;
        sqlx::query("UPDATE jobs SET trashed = 1 WHERE uuid = ?")
            .bind(&job.uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to trash {}: {e}", job.uuid)))?;
        sqlx::query("DELETE FROM locks WHERE job_uuid = ?")
            .bind(&job.uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to clear lock while trashing {}: {e}", job.uuid)))?;
        self.notifier.notify(REMOVAL, &Default::default());
        Ok(())
    }

    async fn killall(&self) -> Result<Vec<Job>> {
        let rows = sqlx::query(
            r#"
            SELECT uuid, name, priority, book_name, book_uuid, flow_uuid, store_json,
                   run_at, schedule, created_on, last_modified
            FROM jobs WHERE trashed = 0
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to scan jobs for killall: {e}")))?;

        let mut trashed = Vec::with_capacity(rows.len());
        for row in rows {
            let job_row = self.row_to_job_row(row)?;
            sqlx::query("UPDATE jobs SET trashed = 1 WHERE uuid = ?")
                .bind(&job_row.job.uuid)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Config(format!("failed to trash {}: {e}", job_row.job.uuid)))?;
            sqlx::query("DELETE FROM locks WHERE job_uuid = ?")
                .bind(&job_row.job.uuid)
                .execute(&self.pool)
                .await
                .map_err(|e| Error::Config(format!("failed to clear lock for {}: {e}", job_row.job.uuid)))?;
            trashed.push(job_row.job);
        }
        if !trashed.is_empty() {
            self.notifier.notify(REMOVAL, &Default::default());
        }
        Ok(trashed)
    }

    async fn register_entity(&self, entity: &Entity) -> Result<()> {
        let metadata_json = serde_json::to_string(&entity.metadata)
            .map_err(|e| Error::Codec(format!("failed to serialize entity metadata: {e}")))?;
        sqlx::query("INSERT OR IGNORE INTO entities (kind, name, metadata_json) VALUES (?, ?, ?)")
            .bind(&entity.kind)
            .bind(&entity.name)
            .bind(&metadata_json)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to register entity {}: {e}", entity.registry_key())))?;
        Ok(())
    }

    fn notifier(&self) -> &Notifier {
        &self.notifier
    }
}
