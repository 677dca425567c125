//! Engine error type
//!
//! Aggregates the per-component errors into one enum for callers that go
//! through the command facade. Every failure is synchronous and
//! caller-recoverable; the engine never retries internally.

use hexa_registry::RegistryError;
use hexa_scenes::SceneError;
use hexa_state_store::StateError;
use hexa_timers::TimerError;
use thiserror::Error;

/// Errors returned by engine commands
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Timer error: {0}")]
    Timer(#[from] TimerError),

    #[error("Scene error: {0}")]
    Scene(#[from] SceneError),
}

/// Result type for engine commands
pub type EngineResult<T> = Result<T, EngineError>;
