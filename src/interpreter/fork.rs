use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;

use super::behavior::BehaviorInterpreter;
use super::context::InterpreterContext;
use super::{InterpreterError, Result};
use crate::model::{Action, Behavior};
use crate::simulation::SimProcess;

/// Whether the forking process waits for a forked behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkMode {
    /// The caller continues immediately.
    Asynchronous,
    /// The caller waits at the join barrier.
    Synchronous,
}

/// A forked behavior together with its own process and context copy.
pub struct ForkedProcess {
    mode: ForkMode,
    behavior: Arc<Behavior>,
    context: InterpreterContext,
}

impl ForkedProcess {
    /// Fork `behavior` off `caller`.
    pub fn new(caller: &InterpreterContext, behavior: Arc<Behavior>, mode: ForkMode, index: usize) -> Self {
        let label = match mode {
            ForkMode::Asynchronous => format!("async-{}", index),
            ForkMode::Synchronous => format!("sync-{}", index),
        };
        let process = caller.process().child(&label);
        Self {
            mode,
            behavior,
            context: caller.fork(process),
        }
    }

    /// The forked process.
    pub fn process(&self) -> &SimProcess {
        self.context.process()
    }

    /// Fork mode.
    pub fn mode(&self) -> ForkMode {
        self.mode
    }

    /// Interpret the forked behavior. Its result frame is discarded.
    pub async fn run(mut self) -> Result<()> {
        tracing::debug!(
            "Forked process {} runs '{}'",
            self.context.process().name(),
            self.behavior.name()
        );
        BehaviorInterpreter::new(&mut self.context)
            .interpret(&self.behavior)
            .await?;
        Ok(())
    }
}

/// Join point for the synchronous part of a fork.
///
/// Counts arrivals down from the number of synchronous processes and wakes
/// the waiting caller once all of them have arrived.
pub struct JoinBarrier {
    remaining: Mutex<usize>,
    failures: Mutex<Vec<InterpreterError>>,
    notify: Notify,
}

impl JoinBarrier {
    /// Barrier expecting `parties` arrivals.
    pub fn new(parties: usize) -> Self {
        Self {
            remaining: Mutex::new(parties),
            failures: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Arrivals still outstanding.
    pub fn remaining(&self) -> usize {
        *self.remaining.lock()
    }

    /// Record the outcome of one process.
    pub fn arrive(&self, outcome: Result<()>) {
        if let Err(err) = outcome {
            self.failures.lock().push(err);
        }
        let done = {
            let mut remaining = self.remaining.lock();
            *remaining = remaining.saturating_sub(1);
            *remaining == 0
        };
        if done {
            self.notify.notify_waiters();
        }
    }

    /// Wait for every arrival, then report the first failure, if any.
    pub async fn wait(&self) -> Result<()> {
        loop {
            let notified = self.notify.notified();
            if self.remaining() == 0 {
                break;
            }
            notified.await;
        }
        let first = self.failures.lock().drain(..).next();
        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Runs the behaviors of a fork action.
pub struct ForkCoordinator;

impl ForkCoordinator {
    /// Spawn every behavior of the fork on the kernel and wait for the
    /// synchronous ones.
    ///
    /// Asynchronous failures are logged. The first synchronous failure is
    /// returned once all synchronous processes have finished.
    pub async fn fork(
        caller: &InterpreterContext,
        action: &Action,
        asynchronous: &[Arc<Behavior>],
        synchronous: &[Arc<Behavior>],
    ) -> Result<()> {
        let processes: Vec<ForkedProcess> = asynchronous
            .iter()
            .map(|behavior| (behavior, ForkMode::Asynchronous))
            .chain(synchronous.iter().map(|behavior| (behavior, ForkMode::Synchronous)))
            .enumerate()
            .map(|(index, (behavior, mode))| {
                ForkedProcess::new(caller, Arc::clone(behavior), mode, index)
            })
            .collect();
        tracing::debug!(
            "{} forks {} asynchronous and {} synchronous behaviors",
            action,
            asynchronous.len(),
            synchronous.len()
        );

        let barrier = Arc::new(JoinBarrier::new(synchronous.len()));
        let kernel = caller.process().kernel().clone();
        for forked in processes {
            let name = forked.process().name().to_string();
            let joined = (forked.mode() == ForkMode::Synchronous).then(|| Arc::clone(&barrier));
            let process = name.clone();
            kernel.spawn(&name, async move {
                let outcome = forked.run().await.map_err(|err| InterpreterError::Fork {
                    process,
                    source: Box::new(err),
                });
                match joined {
                    Some(barrier) => barrier.arrive(outcome),
                    None => {
                        if let Err(err) = outcome {
                            tracing::error!("Asynchronous {}", err);
                        }
                    }
                }
            })?;
        }

        barrier.wait().await
    }
}
