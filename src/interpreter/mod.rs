//! Behavior interpreter.
//!
//! Walks a behavior's action chain on behalf of one simulated process. Every
//! action kind is handled by a single dispatch in [`behavior`]: internal
//! actions load simulated resources, external calls descend into the callee's
//! behavior with a fresh input frame, branches and loops re-enter the walk
//! for their nested behaviors, and forks hand their behaviors to the
//! [`fork::ForkCoordinator`]. Expressions are evaluated against the top frame
//! of the process's [`stack::VariableStack`].

/// The action dispatcher.
pub mod behavior;
/// Per-process interpreter state and shared collaborators.
pub mod context;
/// Forked processes and the synchronous join barrier.
pub mod fork;
/// Stack frames and bindings.
pub mod frame;
/// Variable stack and usage binding helpers.
pub mod stack;
/// Branch transition selection.
pub mod transition;

pub use behavior::BehaviorInterpreter;
pub use context::{Collaborators, InterpreterContext, SharedRng};
pub use fork::{ForkCoordinator, ForkMode, ForkedProcess, JoinBarrier};
pub use frame::{Binding, Frame, FrameId, LateBinding};
pub use stack::{VariableStack, bind_usages, resolve_inner};
pub use transition::{PROBABILITY_TOLERANCE, TransitionDeterminer};

use thiserror::Error;

use crate::model::ModelError;
use crate::simulation::SimulationError;
use crate::stoex::EvalError;

/// Convenience result alias for interpreter operations.
pub type Result<T> = std::result::Result<T, InterpreterError>;

/// Errors that abort the interpretation of a request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InterpreterError {
    /// The model is malformed (bad probabilities, negative loop count, ...).
    #[error("model error: {0}")]
    Model(#[from] ModelError),

    /// Frames were not popped in the order they were pushed.
    #[error("stack discipline violated: {0}")]
    StackDiscipline(String),

    /// A specification could not be evaluated.
    #[error("evaluation failed: {0}")]
    Evaluation(#[from] EvalError),

    /// The simulation kernel refused an operation.
    #[error("simulation error: {0}")]
    Simulation(#[from] SimulationError),

    /// A synchronously forked behavior failed.
    #[error("forked behavior '{process}' failed: {source}")]
    Fork {
        /// Name of the forked process.
        process: String,
        /// Failure of the forked behavior.
        source: Box<InterpreterError>,
    },
}
