use crate::keys::flow_key;
use async_trait::async_trait;
use deadpool_redis::Pool;
use jb_core::{Error, Id, Result};
use jb_engine::{EngineState, Flow, FlowDetail, FlowMeta, Persistence, Store};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

fn redis_err(context: &str, err: impl std::fmt::Display) -> Error {
    Error::Config(format!("{context}: {err}"))
}

#[derive(Serialize, Deserialize)]
struct FlowRecord {
    flow_name: String,
    store: Store,
    state: String,
}

fn state_to_str(state: EngineState) -> &'static str {
    match state {
        EngineState::Pending => "pending",
        EngineState::Success => "success",
        EngineState::Reverted => "reverted",
        EngineState::Failure => "failure",
    }
}

fn state_from_str(s: &str) -> EngineState {
    match s {
        "success" => EngineState::Success,
        "reverted" => EngineState::Reverted,
        "failure" => EngineState::Failure,
        _ => EngineState::Pending,
    }
}

/// Flow detail storage on the same Redis pool the board uses, mirroring
/// `jb_board_sqlite::SqlitePersistence`'s role as the board's own
/// `jb_engine::Persistence` collaborator.
pub struct RedisPersistence {
    pool: Pool,
    root: String,
}

impl RedisPersistence {
    pub fn new(pool: Pool, root: String) -> Self {
        Self { pool, root }
    }
}

#[async_trait]
impl Persistence for RedisPersistence {
    async fn save_flow_detail(&self, flow: Flow, store: Store) -> Result<FlowDetail> {
        let flow_uuid = Id::new().to_string();
        let record = FlowRecord {
            flow_name: flow.name.clone(),
            store: store.clone(),
            state: state_to_str(EngineState::Pending).to_string(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|e| Error::Codec(format!("failed to serialize flow_detail: {e}")))?;

        let mut conn = self.pool.get().await.map_err(|e| redis_err("failed to get redis connection", e))?;
        conn.set::<_, _, ()>(flow_key(&self.root, &flow_uuid), payload)
            .await
            .map_err(|e| redis_err("failed to save flow_detail", e))?;

        Ok(FlowDetail {
            flow_uuid,
            flow,
            meta: FlowMeta { store },
            state: EngineState::Pending,
        })
    }

    async fn load_flow_detail(&self, flow_uuid: &str) -> Result<FlowDetail> {
        let mut conn = self.pool.get().await.map_err(|e| redis_err("failed to get redis connection", e))?;
        let payload: Option<String> = conn
            .get(flow_key(&self.root, flow_uuid))
            .await
            .map_err(|e| redis_err("failed to load flow_detail", e))?;
        let payload = payload.ok_or_else(|| Error::NotFound(format!("flow_detail {flow_uuid}")))?;
        let record: FlowRecord = serde_json::from_str(&payload)
            .map_err(|e| Error::Codec(format!("failed to deserialize flow_detail: {e}")))?;

        Ok(FlowDetail {
            flow_uuid: flow_uuid.to_string(),
            flow: Flow::new(record.flow_name, record.store.clone()),
            meta: FlowMeta { store: record.store },
            state: state_from_str(&record.state),
        })
    }

    async fn update_flow_state(&self, flow_uuid: &str, state: EngineState) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| redis_err("failed to get redis connection", e))?;
        let payload: Option<String> = conn
            .get(flow_key(&self.root, flow_uuid))
            .await
            .map_err(|e| redis_err("failed to load flow_detail for update", e))?;
        let payload = payload.ok_or_else(|| Error::NotFound(format!("flow_detail {flow_uuid}")))?;
        let mut record: FlowRecord = serde_json::from_str(&payload)
            .map_err(|e| Error::Codec(format!("failed to deserialize flow_detail: {e}")))?;
        record.state = state_to_str(state).to_string();
        let payload = serde_json::to_string(&record)
            .map_err(|e| Error::Codec(format!("failed to serialize flow_detail: {e}")))?;
        conn.set::<_, _, ()>(flow_key(&self.root, flow_uuid), payload)
            .await
            .map_err(|e| redis_err("failed to update flow_detail state", e))?;
        Ok(())
    }
}
