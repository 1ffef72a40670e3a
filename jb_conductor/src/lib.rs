//! ABOUTME: Dispatch loop that claims jobs off a board and drives them through an engine
//! ABOUTME: Blocking and non-blocking realizations share one claim/build/run/resolve core

mod conductor;

pub use conductor::{Conductor, ConductorOptions, DispatchMode, ListenerFactory};
