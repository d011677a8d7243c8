//! The demo entity type: a toy "machine" with a status string.

use serde::{Deserialize, Serialize};

use revwatch_core::{EntityId, EntityInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: String,
    pub status: String,
}

impl Machine {
    pub fn new(id: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: status.into(),
        }
    }
}

impl EntityInfo for Machine {
    fn entity_id(&self) -> EntityId {
        EntityId::new("machine", self.id.clone())
    }
}
