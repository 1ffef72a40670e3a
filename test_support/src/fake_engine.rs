//! ABOUTME: Fake `Engine`/`EngineLoader` test double standing in for the out-of-scope task runner
//! ABOUTME: Behavior is selected by the flow's name so tests just pick a factory

use async_trait::async_trait;
use jb_core::{Error, Result};
use jb_engine::engines::{EngineLoader, EngineOptions};
use jb_engine::{Engine, EngineKind, EngineOutcome, EngineState, Flow, FlowDetail, FlowFactory, Store};
use std::time::Duration;

/// What a dispatched fake engine does once it's handed control.
#[derive(Debug, Clone, Copy)]
pub enum FakeBehavior {
    /// Runs to completion successfully.
    Succeed,
    /// Runs to completion but the flow itself failed (still a resolved
    /// dispatch: the conductor consumes it, it just lands in `Reverted`).
    Revert,
    /// The engine itself blows up; a genuine infrastructure failure.
    Crash,
    /// Sleeps for the given duration, then succeeds. Used to exercise
    /// `stop()` racing an in-flight dispatch.
    SleepThenSucceed(Duration),
}

pub struct FakeEngine {
    behavior: FakeBehavior,
    state: EngineState,
}

impl FakeEngine {
    pub fn new(behavior: FakeBehavior) -> Self {
        Self {
            behavior,
            state: EngineState::Pending,
        }
    }
}

#[async_trait]
impl Engine for FakeEngine {
    async fn run(&mut self) -> Result<EngineOutcome> {
        match self.behavior {
            FakeBehavior::Succeed => {
                self.state = EngineState::Success;
                Ok(EngineOutcome(EngineState::Success))
            }
            FakeBehavior::Revert => {
                self.state = EngineState::Reverted;
                Ok(EngineOutcome(EngineState::Reverted))
            }
            FakeBehavior::Crash => Err(Error::EngineFailure("fake engine crashed".to_string())),
            FakeBehavior::SleepThenSucceed(duration) => {
                tokio::time::sleep(duration).await;
                self.state = EngineState::Success;
                Ok(EngineOutcome(EngineState::Success))
            }
        }
    }

    fn suspend(&mut self) {
        self.state = EngineState::Reverted;
    }

    fn state(&self) -> EngineState {
        self.state
    }
}

const SUCCEED_PREFIX: &str = "fake-succeed:";
const REVERT_PREFIX: &str = "fake-revert:";
const CRASH_PREFIX: &str = "fake-crash:";
const SLEEP_PREFIX: &str = "fake-sleep:";
const COMPILE_BLOWUP_PREFIX: &str = "fake-compile-blowup:";
const SLEEP_MS_KEY: &str = "__fake_sleep_ms";

/// Builds a `FakeEngine` according to the dispatched flow's name. Compile
/// failures happen here, not in the flow factory: the factory already ran
/// successfully once at post time (it had to, to persist a flow detail);
/// what `compiler_blowup_factory` actually exercises is the engine build
/// step failing at dispatch time.
pub struct FakeEngineLoader;

impl EngineLoader for FakeEngineLoader {
    fn load(
        &self,
        flow_detail: FlowDetail,
        store: Store,
        _engine_kind: EngineKind,
        _options: &EngineOptions,
    ) -> Result<Box<dyn Engine>> {
        let name = flow_detail.flow.name.as_str();
        if let Some(rest) = name.strip_prefix(COMPILE_BLOWUP_PREFIX) {
            return Err(Error::CompilationFailure(format!(
                "engine build blew up for {rest}"
            )));
        }
        if name.starts_with(SUCCEED_PREFIX) {
            return Ok(Box::new(FakeEngine::new(FakeBehavior::Succeed)));
        }
        if name.starts_with(REVERT_PREFIX) {
            return Ok(Box::new(FakeEngine::new(FakeBehavior::Revert)));
        }
        if name.starts_with(CRASH_PREFIX) {
            return Ok(Box::new(FakeEngine::new(FakeBehavior::Crash)));
        }
        if name.starts_with(SLEEP_PREFIX) {
            let ms = store
                .get(SLEEP_MS_KEY)
                .and_then(|v| v.as_u64())
                .unwrap_or(1_000);
            return Ok(Box::new(FakeEngine::new(FakeBehavior::SleepThenSucceed(
                Duration::from_millis(ms),
            ))));
        }
        Ok(Box::new(FakeEngine::new(FakeBehavior::Succeed)))
    }
}

/// A flow factory whose flow always runs to `Success`.
pub fn always_succeed_factory(name: &str) -> FlowFactory {
    let flow_name = format!("{SUCCEED_PREFIX}{name}");
    FlowFactory::from_fn(move |store| Ok(Flow::new(flow_name.clone(), store.clone())))
}

/// A flow factory whose flow runs to completion but ends `Reverted`
/// (the internal-task-failure scenario: still consumed, not abandoned).
pub fn always_revert_factory(name: &str) -> FlowFactory {
    let flow_name = format!("{REVERT_PREFIX}{name}");
    FlowFactory::from_fn(move |store| Ok(Flow::new(flow_name.clone(), store.clone())))
}

/// A flow factory whose engine crashes mid-run (`Engine::run` returns
/// `Err`), distinct from a `Revert` outcome: this is an abandon, not a
/// consume.
pub fn crash_factory(name: &str) -> FlowFactory {
    let flow_name = format!("{CRASH_PREFIX}{name}");
    FlowFactory::from_fn(move |store| Ok(Flow::new(flow_name.clone(), store.clone())))
}

/// A flow factory whose engine sleeps for `duration` before succeeding.
/// Used to give a test a window to call `stop()` mid-dispatch.
pub fn sleep_then_succeed_factory(name: &str, duration: Duration) -> FlowFactory {
    let flow_name = format!("{SLEEP_PREFIX}{name}");
    let ms = duration.as_millis() as u64;
    FlowFactory::from_fn(move |store| {
        let mut store = store.clone();
        store.insert(SLEEP_MS_KEY.to_string(), serde_json::Value::from(ms));
        Ok(Flow::new(flow_name.clone(), store))
    })
}

/// A flow factory whose flow builds fine, but whose *engine* fails to
/// build at dispatch time (a compile failure, distinct from a run-time
/// crash).
pub fn compiler_blowup_factory(name: &str) -> FlowFactory {
    let flow_name = format!("{COMPILE_BLOWUP_PREFIX}{name}");
    FlowFactory::from_fn(move |store| Ok(Flow::new(flow_name.clone(), store.clone())))
}
