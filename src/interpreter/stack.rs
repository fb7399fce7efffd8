//! Variable stack and binding helpers

use rand::Rng;
use std::sync::Arc;

use super::frame::{Binding, Frame, FrameId, LateBinding};
use super::{InterpreterError, Result};
use crate::model::VariableUsage;
use crate::stoex::{self, EvalError, ExpectedType};

/// Stack of frames owned by one simulated process.
///
/// The top frame is the current frame expressions are evaluated against.
#[derive(Debug, Clone, Default)]
pub struct VariableStack {
    frames: Vec<Frame>,
}

impl VariableStack {
    /// Empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack holding `root` as its only frame.
    pub fn with_root(root: Frame) -> Self {
        Self { frames: vec![root] }
    }

    /// Number of frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Push `frame`, returning its identity for [`VariableStack::pop_expecting`].
    pub fn push(&mut self, frame: Frame) -> FrameId {
        let id = frame.id();
        self.frames.push(frame);
        id
    }

    /// Pop the current frame.
    pub fn pop(&mut self) -> Result<Frame> {
        self.frames
            .pop()
            .ok_or_else(|| InterpreterError::StackDiscipline("pop from an empty stack".to_string()))
    }

    /// Pop the current frame, failing if it is not `expected`.
    ///
    /// On mismatch the stack is left untouched.
    pub fn pop_expecting(&mut self, expected: FrameId) -> Result<Frame> {
        let found = self.current()?.id();
        if found != expected {
            return Err(InterpreterError::StackDiscipline(format!(
                "expected {} on top of the stack, found {}",
                expected, found
            )));
        }
        self.pop()
    }

    /// The current frame.
    pub fn current(&self) -> Result<&Frame> {
        self.frames
            .last()
            .ok_or_else(|| InterpreterError::StackDiscipline("no current frame".to_string()))
    }

    /// The current frame, mutably.
    pub fn current_mut(&mut self) -> Result<&mut Frame> {
        self.frames
            .last_mut()
            .ok_or_else(|| InterpreterError::StackDiscipline("no current frame".to_string()))
    }
}

/// Bind every characterisation of `usages` into `target`.
///
/// Names are `<reference>.<KIND>`. Ordinary characterisations are evaluated
/// against `context` immediately. Characterisations of `INNER` references
/// stay unevaluated and are bound to a snapshot of `context`, so every read
/// draws a fresh sample in the scope they were declared in.
pub fn bind_usages<R: Rng + ?Sized>(
    usages: &[VariableUsage],
    context: &Frame,
    target: &mut Frame,
    rng: &mut R,
) -> std::result::Result<(), EvalError> {
    let mut snapshot: Option<Arc<Frame>> = None;
    for usage in usages {
        for characterisation in &usage.characterisations {
            let name = format!("{}.{}", usage.reference, characterisation.kind.suffix());
            let binding = if usage.is_inner() {
                let origin = snapshot.get_or_insert_with(|| Arc::new(context.clone()));
                Binding::Late(LateBinding::new(
                    characterisation.specification.clone(),
                    Arc::clone(origin),
                ))
            } else {
                Binding::Value(stoex::evaluate(
                    &characterisation.specification,
                    context,
                    ExpectedType::Any,
                    rng,
                )?)
            };
            tracing::trace!("Bind {}", name);
            target.bind(name, binding);
        }
    }
    Ok(())
}

/// Evaluate every late binding visible in `source` whose name starts with
/// `prefix`, and bind the sampled values into `target`.
///
/// Used once per collection element so that all reads of an inner
/// characterisation within one iteration see the same sample.
pub fn resolve_inner<R: Rng + ?Sized>(
    source: &Frame,
    prefix: &str,
    target: &mut Frame,
    rng: &mut R,
) -> std::result::Result<(), EvalError> {
    for (name, binding) in source.contents() {
        if !name.starts_with(prefix) {
            continue;
        }
        if let Binding::Late(late) = binding {
            let value = stoex::evaluate(late.expression(), late.origin(), ExpectedType::Any, rng)?;
            target.set(name, value);
        }
    }
    Ok(())
}
