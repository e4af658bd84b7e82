//! Error types for the Calvin runtime

use super::config::ConfigError;
use super::migration::MigrationError;
use crate::action::ActionError;
use crate::capability::CapabilityError;
use crate::queue::QueueError;
use crate::types::ActorId;
use thiserror::Error;

/// Top-level runtime error
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Actor-related errors
    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    /// Queue refused an operation (harness writes into a full queue, unknown ids)
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

/// Actor lifecycle and wiring errors
#[derive(Debug, Error)]
pub enum ActorError {
    /// Actor not found
    #[error("Actor {0} not found")]
    NotFound(ActorId),

    #[error("Actor {0} already exists")]
    AlreadyExists(ActorId),

    #[error("Unknown actor type {0}")]
    UnknownType(String),

    #[error("Actor type {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Actor {actor} has no {direction}-port named {port}")]
    PortNotFound {
        actor: ActorId,
        port: String,
        direction: crate::types::Direction,
    },

    #[error("No port with id {0}")]
    UnknownPort(crate::types::PortId),

    /// Rejected at registration
    #[error("Invalid action table for {actor_type}: {reason}")]
    InvalidActionTable { actor_type: String, reason: String },

    #[error("Invalid properties for port {port}: {reason}")]
    InvalidPortProperties { port: String, reason: String },

    #[error("Actor type {actor_type} requires capability {capability}")]
    MissingCapability {
        actor_type: String,
        capability: String,
    },

    /// The type's initializer rejected its arguments
    #[error("Initialization of {actor_type} failed: {source}")]
    InitFailed {
        actor_type: String,
        #[source]
        source: ActionError,
    },
}

/// Result type using RuntimeError
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Result type using ActorError
pub type ActorResult<T> = std::result::Result<T, ActorError>;
