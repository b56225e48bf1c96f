use crate::layer::LayerId;
use crate::registry::ClientHandle;

/// Errors that can occur in registry and pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum StackError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] bridge6_transport::TransportError),

    /// The client behind this handle has already disconnected.
    #[error("client {0:?} is disconnected")]
    Disconnected(ClientHandle),

    /// A layer already has a neighbor in the requested direction.
    #[error("layer {0:?} is already bound in that direction")]
    AlreadyBound(LayerId),

    /// A layer cannot be bound to itself.
    #[error("layer {0:?} cannot be its own neighbor")]
    SelfBind(LayerId),

    /// The layer id does not name a layer in this stack.
    #[error("unknown layer {0:?}")]
    UnknownLayer(LayerId),

    /// I/O error while writing to a client.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, StackError>;
