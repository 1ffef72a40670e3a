//! ABOUTME: Leased-lock jobboard realization on a Redis substrate
//! ABOUTME: SET NX EX claims replace the sqlite board's session-heartbeat emulation

pub mod board;
pub mod keys;
pub mod persistence;

pub use board::{RedisBoard, RedisBoardConfig};
pub use persistence::RedisPersistence;
