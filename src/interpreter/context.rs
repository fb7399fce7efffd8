use parking_lot::Mutex;
use rand::rngs::StdRng;
use std::sync::Arc;

use super::frame::Frame;
use super::stack::VariableStack;
use super::{InterpreterError, Result};
use crate::model::{AssemblyContextId, ModelAccess};
use crate::simulation::{MeasurementSink, Reconfigurator, ResourceRegistry, SimProcess};

/// Random source shared by every process of one simulation run.
pub type SharedRng = Arc<Mutex<StdRng>>;

/// Services the interpreter calls out to.
#[derive(Clone)]
pub struct Collaborators {
    /// Read-only model.
    pub model: Arc<ModelAccess>,
    /// Simulated resources loaded by internal actions.
    pub resources: Arc<dyn ResourceRegistry>,
    /// Probe and calculator sink.
    pub measurements: Arc<dyn MeasurementSink>,
    /// Notified after monitored calls complete.
    pub reconfigurator: Arc<dyn Reconfigurator>,
    /// Sampling source for stochastic expressions.
    pub rng: SharedRng,
}

/// State of one simulated process while it interprets behaviors.
///
/// The variable stack and the assembly context stack belong to the process.
/// Forked processes receive deep copies via [`InterpreterContext::fork`].
pub struct InterpreterContext {
    process: SimProcess,
    stack: VariableStack,
    assembly: Vec<AssemblyContextId>,
    collaborators: Collaborators,
}

impl InterpreterContext {
    /// Context entering the system in `entry` with `root` as the bottom frame.
    pub fn new(
        process: SimProcess,
        entry: AssemblyContextId,
        root: Frame,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            process,
            stack: VariableStack::with_root(root),
            assembly: vec![entry],
            collaborators,
        }
    }

    /// Copy of this context running as `process`.
    pub fn fork(&self, process: SimProcess) -> Self {
        Self {
            process,
            stack: self.stack.clone(),
            assembly: self.assembly.clone(),
            collaborators: self.collaborators.clone(),
        }
    }

    /// The simulated process.
    pub fn process(&self) -> &SimProcess {
        &self.process
    }

    /// The variable stack.
    pub fn stack(&self) -> &VariableStack {
        &self.stack
    }

    /// The variable stack, mutably.
    pub fn stack_mut(&mut self) -> &mut VariableStack {
        &mut self.stack
    }

    /// Assembly context the process currently executes in.
    pub fn assembly_context(&self) -> Result<&AssemblyContextId> {
        self.assembly.last().ok_or_else(|| {
            InterpreterError::StackDiscipline("no current assembly context".to_string())
        })
    }

    /// Enter `context` for the duration of an external call.
    pub fn enter_assembly_context(&mut self, context: AssemblyContextId) {
        self.assembly.push(context);
    }

    /// Return to the caller's assembly context.
    pub fn leave_assembly_context(&mut self) -> Result<AssemblyContextId> {
        self.assembly.pop().ok_or_else(|| {
            InterpreterError::StackDiscipline("left more assembly contexts than entered".to_string())
        })
    }

    /// Depth of the assembly context stack.
    pub fn assembly_depth(&self) -> usize {
        self.assembly.len()
    }

    /// Shared collaborators.
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Handle to the shared random source.
    pub fn rng(&self) -> SharedRng {
        Arc::clone(&self.collaborators.rng)
    }
}
