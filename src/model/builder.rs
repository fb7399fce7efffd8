use std::sync::Arc;
use thiserror::Error;

use super::{
    Action, ActionId, ActionKind, Behavior, BranchTransition, CharacterisationKind, ExternalCall,
    ModelError, ResourceDemand, TransitionCondition, VariableUsage,
};
use crate::stoex::{EvalError, StoEx};

/// Errors surfaced while building a behavior.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    /// A specification string did not parse.
    #[error("invalid specification: {0}")]
    Expression(#[from] EvalError),

    /// The resulting behavior is invalid.
    #[error(transparent)]
    Model(#[from] ModelError),
}

/// Parse a usage with a single characterisation.
pub fn usage(
    reference: &str,
    kind: CharacterisationKind,
    specification: &str,
) -> Result<VariableUsage, EvalError> {
    Ok(VariableUsage::new(reference, kind, StoEx::parse(specification)?))
}

struct Step {
    name: String,
    kind: Result<ActionKind, EvalError>,
}

/// Builds a linear behavior `start -> steps... -> stop`.
///
/// Action ids are `<behavior>/<step>`, so step names must be unique within
/// one builder. Specifications are parsed eagerly, but errors surface from
/// [`BehaviorBuilder::build`] to keep the chain fluent.
pub struct BehaviorBuilder {
    name: String,
    steps: Vec<Step>,
}

impl BehaviorBuilder {
    /// Start a new behavior.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
        }
    }

    fn push(mut self, name: &str, kind: Result<ActionKind, EvalError>) -> Self {
        self.steps.push(Step {
            name: name.to_string(),
            kind,
        });
        self
    }

    /// Append an action with an already-built payload.
    pub fn action(self, name: &str, kind: ActionKind) -> Self {
        self.push(name, Ok(kind))
    }

    /// Append an internal action issuing `(resource, specification)` demands.
    pub fn internal(self, name: &str, demands: &[(&str, &str)]) -> Self {
        let kind = demands
            .iter()
            .map(|(resource, specification)| {
                Ok(ResourceDemand {
                    resource: resource.to_string(),
                    specification: StoEx::parse(specification)?,
                })
            })
            .collect::<Result<Vec<_>, EvalError>>()
            .map(|demands| ActionKind::Internal { demands });
        self.push(name, kind)
    }

    /// Append a set-variable action.
    pub fn set_variable(self, name: &str, usages: Vec<VariableUsage>) -> Self {
        self.push(name, Ok(ActionKind::SetVariable { usages }))
    }

    /// Append an external call.
    pub fn call(self, name: &str, call: ExternalCall) -> Self {
        self.push(name, Ok(ActionKind::ExternalCall(call)))
    }

    /// Append a loop repeating `body` as often as `iterations` evaluates to.
    pub fn repeat(self, name: &str, iterations: &str, body: Behavior) -> Self {
        let kind = StoEx::parse(iterations).map(|iterations| ActionKind::Loop {
            iterations,
            body: Arc::new(body),
        });
        self.push(name, kind)
    }

    /// Append a collection iterator over `parameter`.
    pub fn for_each(self, name: &str, parameter: &str, body: Behavior) -> Self {
        self.push(
            name,
            Ok(ActionKind::CollectionIterator {
                parameter: parameter.to_string(),
                body: Arc::new(body),
            }),
        )
    }

    /// Append a branch whose transitions are guarded by boolean expressions.
    pub fn guarded_branch(self, name: &str, transitions: Vec<(&str, Behavior)>) -> Self {
        let kind = transitions
            .into_iter()
            .map(|(guard, behavior)| {
                Ok(BranchTransition {
                    condition: TransitionCondition::Guard(StoEx::parse(guard)?),
                    behavior: Arc::new(behavior),
                })
            })
            .collect::<Result<Vec<_>, EvalError>>()
            .map(|transitions| ActionKind::Branch { transitions });
        self.push(name, kind)
    }

    /// Append a branch whose transitions carry probabilities.
    pub fn probabilistic_branch(self, name: &str, transitions: Vec<(f64, Behavior)>) -> Self {
        let transitions = transitions
            .into_iter()
            .map(|(probability, behavior)| BranchTransition {
                condition: TransitionCondition::Probability(probability),
                behavior: Arc::new(behavior),
            })
            .collect();
        self.push(name, Ok(ActionKind::Branch { transitions }))
    }

    /// Append a fork action.
    pub fn fork(self, name: &str, asynchronous: Vec<Behavior>, synchronous: Vec<Behavior>) -> Self {
        self.push(
            name,
            Ok(ActionKind::Fork {
                asynchronous: asynchronous.into_iter().map(Arc::new).collect(),
                synchronous: synchronous.into_iter().map(Arc::new).collect(),
            }),
        )
    }

    /// Chain the steps between a start and a stop action and validate.
    pub fn build(self) -> Result<Behavior, BuildError> {
        let id = |step: &str| ActionId::new(format!("{}/{}", self.name, step));

        let mut names = vec!["start".to_string()];
        names.extend(self.steps.iter().map(|step| step.name.clone()));
        names.push("stop".to_string());

        let mut kinds = vec![ActionKind::Start];
        for step in self.steps {
            kinds.push(step.kind?);
        }
        kinds.push(ActionKind::Stop);

        let actions = names
            .iter()
            .zip(kinds)
            .enumerate()
            .map(|(position, (name, kind))| Action {
                id: id(name.as_str()),
                name: name.clone(),
                successor: names.get(position + 1).map(|next| id(next.as_str())),
                kind,
            })
            .collect();

        Ok(Behavior::new(self.name.clone(), actions)?)
    }
}
