//! Links between connectors.

use thiserror::Error;
use uuid::Uuid;

use crate::interaction::ConnectorId;

/// Hint shown while a valid connection is pending.
pub const READY_HINT: &str = "release to connect";

/// A materialized link from an output connector to an input connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    pub id: Uuid,
    /// Output side.
    pub source: ConnectorId,
    /// Input side.
    pub target: ConnectorId,
}

impl Connection {
    pub fn new(source: ConnectorId, target: ConnectorId) -> Self {
        Self {
            id: Uuid::new_v4(),
            source,
            target,
        }
    }

    /// Whether this connection ends at `connector`.
    pub fn touches(&self, connector: ConnectorId) -> bool {
        self.source == connector || self.target == connector
    }
}

/// Why two connectors cannot be linked. The message is the user-facing hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConnectionRejection {
    #[error("drag to connect")]
    NoTarget,
    #[error("cannot connect two connectors of the same direction")]
    SameDirection,
    #[error("cannot connect a node to itself")]
    SameNode,
    #[error("connector {0} does not exist")]
    UnknownConnector(ConnectorId),
}

/// A connection being dragged out, as seen by the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionDraft {
    pub source: Option<ConnectorId>,
    pub target: Option<ConnectorId>,
    /// Feedback for the user, updated on every validation.
    pub hint: String,
}

impl ConnectionDraft {
    pub fn new(source: ConnectorId) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn is_active(&self) -> bool {
        self.source.is_some()
    }
}
