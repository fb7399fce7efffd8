use futures::future::{FutureExt, LocalBoxFuture};
use std::sync::Arc;

use super::context::InterpreterContext;
use super::fork::ForkCoordinator;
use super::frame::{Frame, FrameId};
use super::stack::{bind_usages, resolve_inner};
use super::transition::TransitionDeterminer;
use super::{InterpreterError, Result};
use crate::model::{
    Action, ActionKind, Behavior, BranchTransition, ExternalCall, MetricKind, ModelError,
    ResourceDemand, VariableUsage,
};
use crate::simulation::{ModelElement, ResponseTimeCalculator};
use crate::stoex::{StoEx, evaluate_f64, evaluate_i64};

/// Interprets one behavior invocation.
///
/// Owns the invocation's result frame, which set-variable actions write to
/// and which is handed back to the caller. Branch targets and loop bodies
/// run inside the same invocation; external calls and forks get their own.
pub struct BehaviorInterpreter<'c> {
    ctx: &'c mut InterpreterContext,
    result: Frame,
    transitions: TransitionDeterminer,
}

impl<'c> BehaviorInterpreter<'c> {
    /// Interpreter running on `ctx` with an empty result frame.
    pub fn new(ctx: &'c mut InterpreterContext) -> Self {
        Self {
            ctx,
            result: Frame::new(),
            transitions: TransitionDeterminer::default(),
        }
    }

    /// Walk `behavior` from its start action to the end of the chain.
    ///
    /// Returns the result frame. Fails if the behavior leaves the variable
    /// stack at a different depth than it found it.
    pub async fn interpret(mut self, behavior: &Behavior) -> Result<Frame> {
        tracing::debug!("Interpret behavior '{}'", behavior.name());
        self.walk(behavior).await?;
        Ok(self.result)
    }

    fn walk<'a>(&'a mut self, behavior: &'a Behavior) -> LocalBoxFuture<'a, Result<()>> {
        async move {
            let depth = self.ctx.stack().depth();
            let mut next = Some(behavior.start());
            while let Some(action) = next {
                self.dispatch(action).await?;
                next = behavior.successor(action);
            }
            let after = self.ctx.stack().depth();
            if after != depth {
                return Err(InterpreterError::StackDiscipline(format!(
                    "behavior '{}' left {} frames on the stack, found {} on entry",
                    behavior.name(),
                    after,
                    depth
                )));
            }
            Ok(())
        }
        .boxed_local()
    }

    async fn dispatch(&mut self, action: &Action) -> Result<()> {
        tracing::debug!("Interpret {}", action);
        match &action.kind {
            ActionKind::Start | ActionKind::Stop => {}
            ActionKind::Internal { demands } => self.internal(action, demands).await?,
            ActionKind::ExternalCall(call) => self.external_call(action, call).await?,
            ActionKind::Branch { transitions } => self.branch(action, transitions).await?,
            ActionKind::Loop { iterations, body } => self.repeat(action, iterations, body).await?,
            ActionKind::CollectionIterator { parameter, body } => {
                self.iterate(action, parameter, body).await?
            }
            ActionKind::SetVariable { usages } => self.set_variable(usages)?,
            ActionKind::Fork {
                asynchronous,
                synchronous,
            } => ForkCoordinator::fork(&*self.ctx, action, asynchronous, synchronous).await?,
        }
        tracing::debug!("Finished {}", action);
        Ok(())
    }

    async fn internal(&mut self, action: &Action, demands: &[ResourceDemand]) -> Result<()> {
        let collaborators = self.ctx.collaborators().clone();
        let container = collaborators.model.container_of(self.ctx.assembly_context()?)?;
        for demand in demands {
            let amount = {
                let rng = self.ctx.rng();
                let mut rng = rng.lock();
                evaluate_f64(&demand.specification, self.ctx.stack().current()?, &mut *rng)?
            };
            tracing::debug!(
                "{} demands {} of '{}' on '{}'",
                action,
                amount,
                demand.resource,
                container
            );
            let loaded = collaborators
                .resources
                .load_active_resource(self.ctx.process(), container, &demand.resource, amount)
                .await;
            if let Err(err) = loaded {
                tracing::warn!("Resource demand of {} failed: {}", action, err);
            }
        }
        Ok(())
    }

    async fn external_call(&mut self, action: &Action, call: &ExternalCall) -> Result<()> {
        let collaborators = self.ctx.collaborators().clone();
        let caller = collaborators
            .model
            .assembly_context(self.ctx.assembly_context()?)?;
        let callee = collaborators
            .model
            .resolve_call(&caller.id, &call.role, &call.service)?;

        let calculator = format!(
            "call: {} (id: {}), AssemblyCtx: {}(id: {})",
            action.name, action.id, caller.name, caller.id
        );
        let start_probe = format!("{}_resp1", calculator);
        let stop_probe = format!("{}_resp2", calculator);
        let monitored = collaborators
            .model
            .monitoring(&action.id, MetricKind::ResponseTime)
            .is_some();
        if monitored {
            let registered = collaborators
                .measurements
                .create_response_time_calculator(ResponseTimeCalculator {
                    name: calculator.clone(),
                    start_probe: start_probe.clone(),
                    stop_probe: stop_probe.clone(),
                    action: action.id.clone(),
                    metric: MetricKind::ResponseTime,
                });
            if let Err(err) = registered {
                tracing::warn!("Could not register calculator for {}: {}", action, err);
            }
        }
        self.sample(&start_probe, &calculator);

        let input = {
            let mut input = Frame::new();
            let rng = self.ctx.rng();
            let mut rng = rng.lock();
            bind_usages(&call.inputs, self.ctx.stack().current()?, &mut input, &mut *rng)?;
            input
        };
        let pushed = self.ctx.stack_mut().push(input);
        self.ctx.enter_assembly_context(callee.context.clone());
        tracing::debug!(
            "{} calls '{}' provided by '{}'",
            action,
            call.service,
            callee.context
        );
        let output = BehaviorInterpreter::new(&mut *self.ctx)
            .interpret(&callee.behavior)
            .await;
        self.ctx.leave_assembly_context()?;
        let output = output?;
        self.leave_frame(pushed)?;
        self.bind_returns(call, &output)?;

        self.sample(&stop_probe, &calculator);
        if monitored {
            let element = ModelElement::Action(action.id.clone());
            let reconfigured = collaborators.reconfigurator.on_state_change(&element);
            tracing::debug!("Reconfiguration check for {}: {}", element, reconfigured);
        }
        Ok(())
    }

    fn bind_returns(&mut self, call: &ExternalCall, output: &Frame) -> Result<()> {
        let rng = self.ctx.rng();
        let mut rng = rng.lock();
        let target = self.ctx.stack_mut().current_mut()?;
        if call.returns.is_empty() {
            for (name, binding) in output.own_bindings() {
                target.bind(name.clone(), binding.clone());
            }
        } else {
            bind_usages(&call.returns, output, target, &mut *rng)?;
        }
        Ok(())
    }

    fn sample(&self, probe: &str, label: &str) {
        let sampled = self
            .ctx
            .collaborators()
            .measurements
            .take_current_time_sample(probe, label, self.ctx.process());
        if let Err(err) = sampled {
            tracing::warn!("Time sample '{}' failed: {}", probe, err);
        }
    }

    async fn branch(&mut self, action: &Action, transitions: &[BranchTransition]) -> Result<()> {
        let selected = {
            let rng = self.ctx.rng();
            let mut rng = rng.lock();
            self.transitions.determine(
                &action.id,
                transitions,
                self.ctx.stack().current()?,
                &mut *rng,
            )?
        };
        match selected {
            Some(transition) => self.walk(&transition.behavior).await,
            None => {
                tracing::debug!("No branch condition holds, no transition taken at {}", action);
                Ok(())
            }
        }
    }

    fn iteration_count(&self, action: &Action, expression: &StoEx) -> Result<i64> {
        let rng = self.ctx.rng();
        let mut rng = rng.lock();
        let count = evaluate_i64(expression, self.ctx.stack().current()?, &mut *rng)?;
        if count < 0 {
            return Err(ModelError::NegativeIterationCount {
                action: action.id.clone(),
                count,
            }
            .into());
        }
        Ok(count)
    }

    async fn repeat(&mut self, action: &Action, iterations: &StoEx, body: &Behavior) -> Result<()> {
        let count = self.iteration_count(action, iterations)?;
        tracing::debug!("Determined {} iterations for {}", count, action);
        for iteration in 1..=count {
            tracing::trace!("Iteration {} of {}", iteration, action);
            self.walk(body).await?;
        }
        Ok(())
    }

    async fn iterate(&mut self, action: &Action, parameter: &str, body: &Behavior) -> Result<()> {
        let elements = StoEx::variable(&format!("{}.NUMBER_OF_ELEMENTS", parameter));
        let count = self.iteration_count(action, &elements)?;
        let prefix = format!("{}.", parameter);
        tracing::debug!("Iterating {} elements of '{}' in {}", count, parameter, action);

        for _ in 0..count {
            let element = {
                let current = self.ctx.stack().current()?;
                let mut element = Frame::with_parent(Arc::new(current.clone()));
                let rng = self.ctx.rng();
                let mut rng = rng.lock();
                resolve_inner(current, &prefix, &mut element, &mut *rng)?;
                element
            };
            let pushed = self.ctx.stack_mut().push(element);
            self.walk(body).await?;
            self.leave_frame(pushed)?;
        }
        Ok(())
    }

    /// Pop the frame pushed as `pushed`; any other top frame aborts the request.
    fn leave_frame(&mut self, pushed: FrameId) -> Result<()> {
        if let Err(err) = self.ctx.stack_mut().pop_expecting(pushed) {
            tracing::error!("Left {} on a foreign frame: {}", pushed, err);
            return Err(err);
        }
        Ok(())
    }

    fn set_variable(&mut self, usages: &[VariableUsage]) -> Result<()> {
        let rng = self.ctx.rng();
        let mut rng = rng.lock();
        bind_usages(usages, self.ctx.stack().current()?, &mut self.result, &mut *rng)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::context::Collaborators;
    use crate::model::builder::usage;
    use crate::model::{
        AssemblyContext, BehaviorBuilder, CharacterisationKind, Component, ModelAccess,
        ServiceEffect, SystemModel,
    };
    use crate::simulation::{Kernel, NoReconfiguration, RecordingSink, SimProcess, SimulatedResources};
    use crate::stoex::Value;
    use parking_lot::Mutex;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn collaborators(behavior: &Behavior) -> Collaborators {
        let model = SystemModel {
            components: vec![Component {
                id: "c".into(),
                name: "C".to_string(),
                services: vec![ServiceEffect {
                    service: "s".to_string(),
                    behavior: Arc::new(behavior.clone()),
                }],
            }],
            assembly_contexts: vec![AssemblyContext {
                id: "ctx".into(),
                name: "Ctx".to_string(),
                component: "c".into(),
            }],
            ..SystemModel::default()
        };
        Collaborators {
            resources: Arc::new(SimulatedResources::from_model(&model).unwrap()),
            model: Arc::new(ModelAccess::new(model).unwrap()),
            measurements: Arc::new(RecordingSink::new()),
            reconfigurator: Arc::new(NoReconfiguration),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(11))),
        }
    }

    fn run(behavior: Behavior) -> (Result<Frame>, usize) {
        let collaborators = collaborators(&behavior);

        let mut kernel = Kernel::new();
        let process = SimProcess::new("request", kernel.handle());
        let outcome = Rc::new(RefCell::new(None));
        let slot = Rc::clone(&outcome);
        kernel
            .handle()
            .spawn("request", async move {
                let mut ctx = InterpreterContext::new(process, "ctx".into(), Frame::new(), collaborators);
                let result = BehaviorInterpreter::new(&mut ctx).interpret(&behavior).await;
                *slot.borrow_mut() = Some((result, ctx.stack().depth()));
            })
            .unwrap();
        kernel.run(None);
        let finished = outcome.borrow_mut().take();
        finished.unwrap()
    }

    #[test]
    fn test_set_variable_writes_result_frame() {
        let behavior = BehaviorBuilder::new("svc")
            .set_variable(
                "result",
                vec![usage("RETURN", CharacterisationKind::Value, "6 * 7").unwrap()],
            )
            .build()
            .unwrap();
        let (result, depth) = run(behavior);
        let frame = result.unwrap();
        assert_eq!(frame.value("RETURN.VALUE"), Some(&Value::Int(42)));
        assert_eq!(depth, 1);
    }

    #[test]
    fn test_negative_loop_count_is_a_model_error() {
        let body = BehaviorBuilder::new("body").build().unwrap();
        let behavior = BehaviorBuilder::new("svc").repeat("loop", "0 - 2", body).build().unwrap();
        let (result, _) = run(behavior);
        assert!(matches!(
            result,
            Err(InterpreterError::Model(ModelError::NegativeIterationCount { count: -2, .. }))
        ));
    }

    #[test]
    fn test_zero_iterations_skip_body() {
        let body = BehaviorBuilder::new("body")
            .set_variable("mark", vec![usage("seen", CharacterisationKind::Value, "true").unwrap()])
            .build()
            .unwrap();
        let behavior = BehaviorBuilder::new("svc").repeat("loop", "0", body).build().unwrap();
        let (result, _) = run(behavior);
        assert!(!result.unwrap().contains("seen.VALUE"));
    }

    #[test]
    fn test_foreign_element_frame_is_fatal() {
        let behavior = BehaviorBuilder::new("svc").build().unwrap();
        let kernel = Kernel::new();
        let process = SimProcess::new("request", kernel.handle());
        let mut ctx =
            InterpreterContext::new(process, "ctx".into(), Frame::new(), collaborators(&behavior));
        let mut interpreter = BehaviorInterpreter::new(&mut ctx);

        let pushed = interpreter.ctx.stack_mut().push(Frame::new());
        interpreter.ctx.stack_mut().pop().unwrap();
        let foreign = interpreter.ctx.stack_mut().push(Frame::new());

        let err = interpreter.leave_frame(pushed).unwrap_err();
        assert!(matches!(err, InterpreterError::StackDiscipline(_)));
        assert_eq!(interpreter.ctx.stack().depth(), 2);
        assert_eq!(interpreter.ctx.stack().current().unwrap().id(), foreign);

        assert!(interpreter.leave_frame(foreign).is_ok());
        assert_eq!(interpreter.ctx.stack().depth(), 1);
    }

    #[test]
    fn test_unallocated_context_is_fatal() {
        let behavior = BehaviorBuilder::new("svc")
            .internal("work", &[("CPU", "1.0")])
            .build()
            .unwrap();
        let (result, _) = run(behavior);
        assert!(matches!(
            result,
            Err(InterpreterError::Model(ModelError::Unallocated(_)))
        ));
    }
}
