use async_trait::async_trait;
use jb_core::Error;
use jb_engine::{EngineState, Flow, FlowDetail, FlowMeta, Persistence, Store};
use sqlx::{Row, SqlitePool};

/// Flow detail storage on the same sqlite pool the board uses. Out of
/// scope as a subsystem, but something real has to back `post`'s
/// "create a flow_detail in persistence" step, so this is the sqlite
/// board's own collaborator implementing the `jb_engine::Persistence`
/// interface boundary.
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> jb_core::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS flow_details (
                flow_uuid TEXT PRIMARY KEY,
                flow_name TEXT NOT NULL,
                store_json TEXT NOT NULL,
                state TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to migrate flow_details: {e}")))?;
        Ok(())
    }
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

#[async_trait]
impl Persistence for SqlitePersistence {
    async fn save_flow_detail(&self, flow: Flow, store: Store) -> jb_core::Result<FlowDetail> {
        let flow_uuid = jb_core::Id::new().to_string();
        let store_json = serde_json::to_string(&store)
            .map_err(|e| Error::Codec(format!("failed to serialize flow store: {e}")))?;

        sqlx::query(
            "INSERT INTO flow_details (flow_uuid, flow_name, store_json, state) VALUES (?, ?, ?, ?)",
        )
        .bind(&flow_uuid)
        .bind(&flow.name)
        .bind(&store_json)
        .bind(state_to_str(EngineState::Pending))
        .execute(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to insert flow_detail: {e}")))?;

        Ok(FlowDetail {
            flow_uuid,
            flow,
            meta: FlowMeta { store },
            state: EngineState::Pending,
        })
    }

    async fn load_flow_detail(&self, flow_uuid: &str) -> jb_core::Result<FlowDetail> {
        let row = sqlx::query(
            "SELECT flow_uuid, flow_name, store_json, state FROM flow_details WHERE flow_uuid = ?",
        )
        .bind(flow_uuid)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Error::Config(format!("failed to load flow_detail: {e}")))?
        .ok_or_else(|| Error::NotFound(format!("flow_detail {flow_uuid}")))?;

        let store_json: String = row.try_get("store_json").unwrap_or_default();
        let store: Store = serde_json::from_str(&store_json).unwrap_or_default();
        let flow_name: String = row.try_get("flow_name").unwrap_or_default();
        let state: String = row.try_get("state").unwrap_or_default();

        Ok(FlowDetail {
            flow_uuid: flow_uuid.to_string(),
            flow: Flow::new(flow_name, store.clone()),
            meta: FlowMeta { store },
            state: state_from_str(&state),
        })
    }

    async fn update_flow_state(&self, flow_uuid: &str, state: EngineState) -> jb_core::Result<()> {
        sqlx::query("UPDATE flow_details SET state = ? WHERE flow_uuid = ?")
            .bind(state_to_str(state))
            .bind(flow_uuid)
            .execute(&self.pool)
            .await
            .map_err(|e| Error::Config(format!("failed to update flow_detail state: {e}")))?;
        Ok(())
    }
}
