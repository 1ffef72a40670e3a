//! ABOUTME: Flow/engine collaborator surface the conductor dispatches through
//! ABOUTME: The real task-graph runner is out of scope; this crate is its interface boundary

use async_trait::async_trait;
use jb_core::Result;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Key-value inputs made available to a running flow.
pub type Store = BTreeMap<String, Value>;

/// Merge `flow_store` and `job_store`, with the job's entries winning on
/// key collision (job overrides flow, per the dispatch algorithm).
pub fn merge_store(flow_store: &Store, job_store: &Store) -> Store {
    let mut merged = flow_store.clone();
    merged.extend(job_store.clone());
    merged
}

/// An opaque task-graph handle produced by a [`FlowFactory`]. The engine
/// that actually runs atoms is out of scope here; `Flow` is just the
/// boundary value this crate's interface passes around.
#[derive(Debug, Clone)]
pub struct Flow {
    pub name: String,
    pub store: Store,
}

impl Flow {
    pub fn new(name: impl Into<String>, store: Store) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }
}

/// An object exposing a `generate` method, for flow factories that need
/// constructor-style state instead of a bare function.
pub trait FlowGenerator: Send + Sync {
    fn generate(&self, store: &Store) -> Result<Flow>;
}

/// Tagged variant of "thing that produces a [`Flow`] given a store".
///
/// The source system used a class whose constructor returned a flow
/// object instead of an instance of itself; that trick doesn't have a
/// sound Rust equivalent, so callers pick one of these two shapes
/// explicitly and the dispatcher matches on the variant instead of
/// relying on what a constructor happens to return.
#[derive(Clone)]
pub enum FlowFactory {
    Function(Arc<dyn Fn(&Store) -> Result<Flow> + Send + Sync>),
    Generator(Arc<dyn FlowGenerator>),
}

impl fmt::Debug for FlowFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowFactory::Function(_) => write!(f, "FlowFactory::Function(..)"),
            FlowFactory::Generator(_) => write!(f, "FlowFactory::Generator(..)"),
        }
    }
}

impl FlowFactory {
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&Store) -> Result<Flow> + Send + Sync + 'static,
    {
        FlowFactory::Function(Arc::new(f))
    }

    pub fn from_generator<G: FlowGenerator + 'static>(generator: G) -> Self {
        FlowFactory::Generator(Arc::new(generator))
    }

    pub fn generate(&self, store: &Store) -> Result<Flow> {
        match self {
            FlowFactory::Function(f) => f(store),
            FlowFactory::Generator(g) => g.generate(store),
        }
    }
}

/// Persisted snapshot of a flow, keyed by `flow_uuid`.
#[derive(Debug, Clone)]
pub struct FlowDetail {
    pub flow_uuid: String,
    pub flow: Flow,
    pub meta: FlowMeta,
    pub state: EngineState,
}

#[derive(Debug, Clone, Default)]
pub struct FlowMeta {
    pub store: Store,
}

/// Which scheduling strategy the engine should use: `Serial` maps to the
/// blocking conductor, `Parallel` to the non-blocking one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineKind {
    Serial,
    Parallel,
}

impl Default for EngineKind {
    fn default() -> Self {
        EngineKind::Serial
    }
}

/// Terminal state an engine run leaves a flow in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Pending,
    Success,
    Reverted,
    Failure,
}

/// The result of a single `Engine::run` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOutcome(pub EngineState);

/// The collaborator the conductor drives per dispatched job.
///
/// `suspend` is cooperative: it sets a flag the engine's own run loop is
/// expected to observe at its next scheduling decision. A suspended
/// engine finishes its current atom, then reports `Reverted` rather than
/// stopping mid-atom.
#[async_trait]
pub trait Engine: Send {
    async fn run(&mut self) -> Result<EngineOutcome>;
    fn suspend(&mut self);
    fn state(&self) -> EngineState;
}

/// The persistence collaborator: stores/loads flow detail records.
/// Specified only at its interface boundary, per the purpose & scope.
#[async_trait]
pub trait Persistence: Send + Sync {
    async fn save_flow_detail(&self, flow: Flow, store: Store) -> Result<FlowDetail>;
    async fn load_flow_detail(&self, flow_uuid: &str) -> Result<FlowDetail>;
    async fn update_flow_state(&self, flow_uuid: &str, state: EngineState) -> Result<()>;
}

pub mod engines {
    use super::*;

    /// Free-form options forwarded from `engine_options` to the loader.
    pub type EngineOptions = BTreeMap<String, Value>;

    /// Build a runnable [`Engine`] from a persisted flow detail, a merged
    /// store, and the requested engine kind. The real task-graph runner
    /// is out of scope; this function is the seam the conductor calls
    /// through, and production code supplies its own implementation of
    /// [`super::Engine`] behind it.
    pub fn load_from_detail(
        flow_detail: FlowDetail,
        store: Store,
        engine_kind: EngineKind,
        loader: &dyn EngineLoader,
        options: &EngineOptions,
    ) -> Result<Box<dyn Engine>> {
        loader.load(flow_detail, store, engine_kind, options)
    }

    /// Pluggable strategy for turning a [`FlowDetail`] into a runnable
    /// [`Engine`]. Production code and test doubles both implement this;
    /// [`load_from_detail`] is just the stable call site the conductor uses.
    pub trait EngineLoader: Send + Sync {
        fn load(
            &self,
            flow_detail: FlowDetail,
            store: Store,
            engine_kind: EngineKind,
            options: &EngineOptions,
        ) -> Result<Box<dyn Engine>>;
    }
}

/// A trivial [`engines::EngineLoader`] that resolves every flow as an
/// immediate success without running anything.
///
/// The real task-graph runner is out of scope for this crate; this loader
/// exists so a binary can stand up a working conductor without one, the
/// same way job-queue frameworks ship an echo/no-op worker for smoke
/// testing. Operators who need flows to actually do work replace this
/// with their own [`engines::EngineLoader`] impl.
pub struct NoopEngineLoader;

struct NoopEngine;

#[async_trait]
impl Engine for NoopEngine {
    async fn run(&mut self) -> Result<EngineOutcome> {
        Ok(EngineOutcome(EngineState::Success))
    }

    fn suspend(&mut self) {}

    fn state(&self) -> EngineState {
        EngineState::Success
    }
}

impl engines::EngineLoader for NoopEngineLoader {
    fn load(
        &self,
        _flow_detail: FlowDetail,
        _store: Store,
        _engine_kind: EngineKind,
        _options: &engines::EngineOptions,
    ) -> Result<Box<dyn Engine>> {
        Ok(Box::new(NoopEngine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_store_job_overrides_flow() {
        let mut flow_store = Store::new();
        flow_store.insert("a".to_string(), Value::from(1));
        flow_store.insert("b".to_string(), Value::from(2));
        let mut job_store = Store::new();
        job_store.insert("b".to_string(), Value::from(99));

        let merged = merge_store(&flow_store, &job_store);
        assert_eq!(merged.get("a"), Some(&Value::from(1)));
        assert_eq!(merged.get("b"), Some(&Value::from(99)));
    }

    #[test]
    fn test_function_flow_factory() {
        let factory = FlowFactory::from_fn(|store| Ok(Flow::new("poke", store.clone())));
        let flow = factory.generate(&Store::new()).unwrap();
        assert_eq!(flow.name, "poke");
    }

    struct Gen;
    impl FlowGenerator for Gen {
        fn generate(&self, store: &Store) -> Result<Flow> {
            Ok(Flow::new("class-based", store.clone()))
        }
    }

    #[test]
    fn test_generator_flow_factory() {
        let factory = FlowFactory::from_generator(Gen);
        let flow = factory.generate(&Store::new()).unwrap();
        assert_eq!(flow.name, "class-based");
    }

    #[tokio::test]
    async fn test_noop_engine_loader_always_succeeds() {
        let flow_detail = FlowDetail {
            flow_uuid: "f1".to_string(),
            flow: Flow::new("anything", Store::new()),
            meta: FlowMeta::default(),
            state: EngineState::Pending,
        };
        let mut engine = engines::load_from_detail(
            flow_detail,
            Store::new(),
            EngineKind::Serial,
            &NoopEngineLoader,
            &engines::EngineOptions::new(),
        )
        .unwrap();
        let outcome = engine.run().await.unwrap();
        assert_eq!(outcome.0, EngineState::Success);
    }
}
