//! Perfsim – an interpreter for performance-annotated component behavior models
//!
//! Component services are described by behaviors: chains of actions that
//! demand simulated resources, call other components, branch, loop, iterate
//! over collections and fork. This crate interprets those behaviors on top of
//! a discrete-event simulation:
//! - Stochastic expressions for demands, loop counts, guards and parameters
//! - A per-process variable stack with late-bound collection characterisations
//! - External calls resolved through the assembly's connectors
//! - Synchronous and asynchronous forks joined on the simulated clock
//! - FCFS and delay resources, response-time probes and a reconfiguration hook

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Behavior interpreter
pub mod interpreter;
/// System model: behaviors, components, assembly, allocation
pub mod model;
/// Discrete-event kernel, resources, measurements and the simulation driver
pub mod simulation;
/// Stochastic expression language
pub mod stoex;

// Re-export key types for convenience
pub use interpreter::{BehaviorInterpreter, InterpreterContext, InterpreterError};
pub use model::{BehaviorBuilder, ModelAccess, SystemModel};
pub use simulation::{RequestSpec, Simulation, SimulationConfig, SimulationReport};
pub use stoex::{StoEx, Value};

/// Current version of perfsim
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
