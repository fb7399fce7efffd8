//! Error types for the simulation layer
//!
//! Resource and measurement failures are reported to the interpreter, which
//! logs them and carries on. Kernel and setup failures abort the run.

use thiserror::Error;

use crate::model::{ContainerId, ModelError};

/// Top-level simulation error
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SimulationError {
    /// The system model is inconsistent
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Resource environment could not be built
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// The executor refused a new process
    #[error("Failed to spawn simulated process '{process}': {detail}")]
    Spawn {
        /// Name of the process
        process: String,
        /// Executor message
        detail: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Failures of the simulated resource environment
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResourceError {
    /// No such container
    #[error("Resource container '{0}' is not simulated")]
    UnknownContainer(ContainerId),

    /// The container has no resource of this type
    #[error("Container '{container}' has no processing resource '{resource}'")]
    UnknownResource {
        /// Container id
        container: ContainerId,
        /// Requested resource type
        resource: String,
    },

    /// Demand is negative or not a number
    #[error("Invalid demand {demand} for resource '{resource}'")]
    InvalidDemand {
        /// Resource type
        resource: String,
        /// Offending demand
        demand: f64,
    },

    /// Processing rate or server count is unusable
    #[error("Resource '{resource}' on '{container}' is misconfigured: {detail}")]
    Misconfigured {
        /// Container id
        container: ContainerId,
        /// Resource type
        resource: String,
        /// Description of the problem
        detail: String,
    },

    /// The resource stopped accepting demands
    #[error("Resource '{0}' is closed")]
    Closed(String),
}

/// Failures of the measurement sink
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MeasurementError {
    /// Probe identifiers must not be empty
    #[error("Probe id must not be empty (label '{0}')")]
    EmptyProbe(String),

    /// A calculator with the same name but different probes already exists
    #[error("Calculator '{0}' is already registered with different probes")]
    ConflictingCalculator(String),
}
