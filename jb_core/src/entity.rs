use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Only kind currently accepted by the board's entity registry.
pub const CONDUCTOR_KIND: &str = "conductor";

/// An identity record registered on the board — today, always a conductor
/// process announcing itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub kind: String,
    pub name: String,
    pub metadata: BTreeMap<String, String>,
}

impl Entity {
    /// Build a conductor entity. Any other `kind` is rejected: the board's
    /// entity registry has never supported more than one kind.
    pub fn new(
        kind: impl Into<String>,
        name: impl Into<String>,
        metadata: BTreeMap<String, String>,
    ) -> Result<Self> {
        let kind = kind.into();
        if kind != CONDUCTOR_KIND {
            return Err(Error::Unsupported(format!(
                "entity kind {kind:?} is not supported"
            )));
        }
        Ok(Self {
            kind,
            name: name.into(),
            metadata,
        })
    }

    /// The path-like key an entity is registered under: `<kind>/<name>`.
    pub fn registry_key(&self) -> String {
        format!("{}/{}", self.kind, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conductor_entity_accepted() {
        let entity = Entity::new("conductor", "worker-1", BTreeMap::new()).unwrap();
        assert_eq!(entity.registry_key(), "conductor/worker-1");
    }

    #[test]
    fn test_other_kind_rejected() {
        let err = Entity::new("widget", "worker-1", BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
    }
}
