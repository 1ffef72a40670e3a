/// Identifies the connection session a board instance owns.
///
/// A real ZooKeeper ephemeral node vanishes the instant its owning TCP
/// session dies; sqlite has no such primitive, so session-boundedness is
/// emulated here: every lock row records the `SessionId` that created it,
/// and a background heartbeat refreshes that session's locks on an
/// interval. A lock whose `heartbeat_at` falls behind `session_ttl` is
/// treated as if the owning session (and its ephemeral nodes) had died.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let pid = std::process::id();
        let unique = jb_core::Id::new();
        Self(format!("{hostname}:{pid}:{unique}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
