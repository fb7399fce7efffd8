//! Behavior models and the system they are deployed in.
//!
//! A [`Behavior`] is a chain of [`Action`]s starting at a single `Start`
//! action. Composite actions (branches, loops, collection iterators, forks)
//! own nested behaviors. Components provide services implemented by
//! behaviors; assembly contexts instantiate components, connectors wire a
//! context's required roles to providing contexts, and the allocation maps
//! every context onto a resource container.
//!
//! Everything in here is immutable once built and shared across all
//! simulated requests.

/// Read-only lookups used by the interpreter.
pub mod access;
/// Fluent construction of behaviors.
pub mod builder;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::stoex::StoEx;

pub use access::ModelAccess;
pub use builder::BehaviorBuilder;

/// Convenience result alias for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Malformed or inconsistent model data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    /// A behavior has no start action, or more than one.
    #[error("behavior '{behavior}' must contain exactly one start action (found {found})")]
    StartAction {
        /// Behavior name.
        behavior: String,
        /// Number of start actions found.
        found: usize,
    },

    /// Two actions of one behavior share an identifier.
    #[error("behavior '{behavior}' contains duplicate action id '{action}'")]
    DuplicateAction {
        /// Behavior name.
        behavior: String,
        /// Duplicated action id.
        action: ActionId,
    },

    /// A successor pointer names an action outside the behavior.
    #[error("action '{action}' in behavior '{behavior}' points to unknown successor '{successor}'")]
    MissingSuccessor {
        /// Behavior name.
        behavior: String,
        /// Action holding the dangling pointer.
        action: ActionId,
        /// Unknown successor id.
        successor: ActionId,
    },

    /// Following successors from the start action revisits an action.
    #[error("behavior '{behavior}' loops back to action '{action}' through its successors")]
    SuccessorCycle {
        /// Behavior name.
        behavior: String,
        /// First revisited action.
        action: ActionId,
    },

    /// Two actions name the same successor.
    #[error("action '{action}' in behavior '{behavior}' is the successor of more than one action")]
    SharedSuccessor {
        /// Behavior name.
        behavior: String,
        /// Action with several predecessors.
        action: ActionId,
    },

    /// Branch probabilities do not form a distribution.
    #[error("branch '{action}' has invalid transition probabilities: {detail}")]
    InvalidBranchProbabilities {
        /// Branch action id.
        action: ActionId,
        /// Description of the problem.
        detail: String,
    },

    /// A branch mixes guarded and probabilistic transitions.
    #[error("branch '{0}' mixes guarded and probabilistic transitions")]
    MixedBranchTransitions(ActionId),

    /// A loop count evaluated to a negative number.
    #[error("loop '{action}' evaluated a negative iteration count {count}")]
    NegativeIterationCount {
        /// Loop action id.
        action: ActionId,
        /// Evaluated count.
        count: i64,
    },

    /// Unknown assembly context.
    #[error("assembly context '{0}' is not part of the system")]
    UnknownAssemblyContext(AssemblyContextId),

    /// Unknown component.
    #[error("component '{0}' is not part of the repository")]
    UnknownComponent(ComponentId),

    /// Unknown resource container.
    #[error("resource container '{0}' is not part of the resource environment")]
    UnknownContainer(ContainerId),

    /// No connector binds the required role of an assembly context.
    #[error("role '{role}' of assembly context '{context}' is not connected")]
    UnboundRole {
        /// Requiring assembly context.
        context: AssemblyContextId,
        /// Required role name.
        role: String,
    },

    /// The providing component does not implement the requested service.
    #[error("component '{component}' does not provide service '{service}'")]
    UnknownService {
        /// Component id.
        component: ComponentId,
        /// Service name.
        service: String,
    },

    /// The assembly context is not allocated on any container.
    #[error("assembly context '{0}' is not allocated")]
    Unallocated(AssemblyContextId),
}

macro_rules! model_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the inner string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

model_id!(
    /// Identifier of an action within the model.
    ActionId
);
model_id!(
    /// Identifier of a deployed component instance.
    AssemblyContextId
);
model_id!(
    /// Identifier of a component type.
    ComponentId
);
model_id!(
    /// Identifier of a resource container (a simulated server).
    ContainerId
);

/// Characterisation attached to a variable name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterisationKind {
    /// Value of the variable.
    Value,
    /// Size in bytes.
    Bytesize,
    /// Number of elements of a collection.
    NumberOfElements,
    /// Structure descriptor.
    Structure,
    /// Type descriptor.
    Type,
}

impl CharacterisationKind {
    /// Suffix appended to the variable reference when binding.
    pub fn suffix(self) -> &'static str {
        match self {
            CharacterisationKind::Value => "VALUE",
            CharacterisationKind::Bytesize => "BYTESIZE",
            CharacterisationKind::NumberOfElements => "NUMBER_OF_ELEMENTS",
            CharacterisationKind::Structure => "STRUCTURE",
            CharacterisationKind::Type => "TYPE",
        }
    }
}

/// One characterisation of a variable usage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Characterisation {
    /// Which property is characterised.
    pub kind: CharacterisationKind,
    /// Specification evaluated to obtain the property.
    pub specification: StoEx,
}

/// Binding of characterisations to a (possibly dotted) variable reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableUsage {
    /// Variable reference, e.g. `files` or `files.INNER`.
    pub reference: String,
    /// Characterisations bound for this reference.
    pub characterisations: Vec<Characterisation>,
}

impl VariableUsage {
    /// Usage with a single characterisation.
    pub fn new(reference: impl Into<String>, kind: CharacterisationKind, specification: StoEx) -> Self {
        Self {
            reference: reference.into(),
            characterisations: vec![Characterisation {
                kind,
                specification,
            }],
        }
    }

    /// Usage binding `<reference>.VALUE`.
    pub fn value(reference: impl Into<String>, specification: StoEx) -> Self {
        Self::new(reference, CharacterisationKind::Value, specification)
    }

    /// Add another characterisation.
    pub fn with(mut self, kind: CharacterisationKind, specification: StoEx) -> Self {
        self.characterisations.push(Characterisation {
            kind,
            specification,
        });
        self
    }

    /// Whether the reference describes the inner elements of a collection.
    ///
    /// Inner characterisations are bound lazily and re-evaluated per read.
    pub fn is_inner(&self) -> bool {
        self.reference.rsplit('.').next() == Some("INNER")
    }
}

/// Demand for a processing resource issued by an internal action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceDemand {
    /// Resource type identifier (e.g. `CPU`, `HDD`).
    pub resource: String,
    /// Amount of work, evaluated as a double.
    pub specification: StoEx,
}

/// How a branch transition is chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionCondition {
    /// Boolean guard evaluated against the current frame.
    Guard(StoEx),
    /// Selection probability.
    Probability(f64),
}

/// One alternative of a branch action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchTransition {
    /// Guard or probability.
    pub condition: TransitionCondition,
    /// Behavior interpreted when this transition is selected.
    pub behavior: Arc<Behavior>,
}

/// Call to a service reached through a required role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalCall {
    /// Required role of the calling component.
    pub role: String,
    /// Service name on the providing component.
    pub service: String,
    /// Input parameters, evaluated against the caller's frame.
    #[serde(default)]
    pub inputs: Vec<VariableUsage>,
    /// Return bindings, evaluated against the callee's result frame.
    #[serde(default)]
    pub returns: Vec<VariableUsage>,
}

/// Kind-specific payload of an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    /// Entry point of a behavior.
    Start,
    /// Explicit end of a behavior.
    Stop,
    /// Issues resource demands.
    Internal {
        /// Demands issued in order.
        demands: Vec<ResourceDemand>,
    },
    /// Invokes another component's service.
    ExternalCall(ExternalCall),
    /// Chooses one of several behaviors.
    Branch {
        /// Alternatives in declaration order.
        transitions: Vec<BranchTransition>,
    },
    /// Repeats a body a number of times.
    Loop {
        /// Iteration count, evaluated as an integer.
        iterations: StoEx,
        /// Loop body.
        body: Arc<Behavior>,
    },
    /// Repeats a body once per element of a collection parameter.
    CollectionIterator {
        /// Collection parameter name.
        parameter: String,
        /// Loop body.
        body: Arc<Behavior>,
    },
    /// Binds result variables of the current behavior invocation.
    SetVariable {
        /// Usages written to the result frame.
        usages: Vec<VariableUsage>,
    },
    /// Spawns concurrent behaviors.
    Fork {
        /// Behaviors the caller does not wait for.
        #[serde(default)]
        asynchronous: Vec<Arc<Behavior>>,
        /// Behaviors joined before the caller continues.
        #[serde(default)]
        synchronous: Vec<Arc<Behavior>>,
    },
}

impl ActionKind {
    /// Short name used in logs.
    pub fn label(&self) -> &'static str {
        match self {
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Internal { .. } => "internal",
            ActionKind::ExternalCall(_) => "external call",
            ActionKind::Branch { .. } => "branch",
            ActionKind::Loop { .. } => "loop",
            ActionKind::CollectionIterator { .. } => "collection iterator",
            ActionKind::SetVariable { .. } => "set variable",
            ActionKind::Fork { .. } => "fork",
        }
    }
}

/// Node of a behavior's action chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier.
    pub id: ActionId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Next action in the chain, `None` for the last one.
    #[serde(default)]
    pub successor: Option<ActionId>,
    /// Kind-specific payload.
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' ({})", self.kind.label(), self.name, self.id)
    }
}

#[derive(Serialize, Deserialize)]
struct RawBehavior {
    #[serde(default)]
    name: String,
    actions: Vec<Action>,
}

/// Validated chain of actions with a unique start action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawBehavior", into = "RawBehavior")]
pub struct Behavior {
    name: String,
    actions: Vec<Action>,
    start: usize,
    index: HashMap<ActionId, usize>,
}

impl Behavior {
    /// Validate `actions` and build a behavior.
    pub fn new(name: impl Into<String>, actions: Vec<Action>) -> Result<Self> {
        let name = name.into();
        let mut index = HashMap::with_capacity(actions.len());
        for (position, action) in actions.iter().enumerate() {
            if index.insert(action.id.clone(), position).is_some() {
                return Err(ModelError::DuplicateAction {
                    behavior: name,
                    action: action.id.clone(),
                });
            }
        }

        let starts: Vec<usize> = actions
            .iter()
            .enumerate()
            .filter(|(_, action)| matches!(action.kind, ActionKind::Start))
            .map(|(position, _)| position)
            .collect();
        if starts.len() != 1 {
            return Err(ModelError::StartAction {
                behavior: name,
                found: starts.len(),
            });
        }

        for action in &actions {
            if let Some(successor) = &action.successor {
                if !index.contains_key(successor) {
                    return Err(ModelError::MissingSuccessor {
                        behavior: name,
                        action: action.id.clone(),
                        successor: successor.clone(),
                    });
                }
            }
        }

        let start = starts[0];
        {
            let mut visited = HashSet::with_capacity(actions.len());
            let mut cursor = Some(&actions[start]);
            while let Some(action) = cursor {
                if !visited.insert(&action.id) {
                    return Err(ModelError::SuccessorCycle {
                        behavior: name,
                        action: action.id.clone(),
                    });
                }
                cursor = action
                    .successor
                    .as_ref()
                    .and_then(|id| index.get(id))
                    .map(|&position| &actions[position]);
            }

            let mut predecessors: HashMap<&ActionId, usize> = HashMap::new();
            for successor in actions.iter().filter_map(|action| action.successor.as_ref()) {
                let count = predecessors.entry(successor).or_default();
                *count += 1;
                if *count > 1 {
                    return Err(ModelError::SharedSuccessor {
                        behavior: name,
                        action: successor.clone(),
                    });
                }
            }
        }

        Ok(Self {
            name,
            actions,
            start,
            index,
        })
    }

    /// Behavior name (may be empty).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All actions in declaration order.
    pub fn actions(&self) -> &[Action] {
        &self.actions
    }

    /// The start action.
    pub fn start(&self) -> &Action {
        &self.actions[self.start]
    }

    /// Look up an action by id.
    pub fn action(&self, id: &ActionId) -> Option<&Action> {
        self.index.get(id).map(|&position| &self.actions[position])
    }

    /// Successor of `action`, `None` at the end of the chain.
    pub fn successor(&self, action: &Action) -> Option<&Action> {
        action.successor.as_ref().and_then(|id| self.action(id))
    }
}

impl TryFrom<RawBehavior> for Behavior {
    type Error = ModelError;

    fn try_from(raw: RawBehavior) -> Result<Self> {
        Behavior::new(raw.name, raw.actions)
    }
}

impl From<Behavior> for RawBehavior {
    fn from(behavior: Behavior) -> Self {
        RawBehavior {
            name: behavior.name,
            actions: behavior.actions,
        }
    }
}

/// Service provided by a component, implemented by a behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceEffect {
    /// Service (operation signature) name.
    pub service: String,
    /// Behavior interpreted when the service is called.
    pub behavior: Arc<Behavior>,
}

/// Component type with its provided services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    /// Identifier.
    pub id: ComponentId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Provided services.
    pub services: Vec<ServiceEffect>,
}

/// Deployed instance of a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyContext {
    /// Identifier.
    pub id: AssemblyContextId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Instantiated component.
    pub component: ComponentId,
}

/// Wiring of a required role to a providing assembly context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssemblyConnector {
    /// Context whose component requires the role.
    pub requiring: AssemblyContextId,
    /// Required role name.
    pub role: String,
    /// Context providing the service.
    pub providing: AssemblyContextId,
}

/// Scheduling discipline of a processing resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingPolicy {
    /// First come, first served over a fixed number of servers.
    #[default]
    Fcfs,
    /// Pure delay: every demand is served immediately.
    Delay,
}

fn default_servers() -> usize {
    1
}

/// Processing resource of a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResource {
    /// Resource type identifier matched against demands.
    pub resource: String,
    /// Units of demand processed per simulated second.
    pub processing_rate: f64,
    /// Number of parallel servers.
    #[serde(default = "default_servers")]
    pub servers: usize,
    /// Scheduling discipline.
    #[serde(default)]
    pub scheduling: SchedulingPolicy,
}

/// Simulated server hosting assembly contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceContainer {
    /// Identifier.
    pub id: ContainerId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Processing resources.
    pub resources: Vec<ProcessingResource>,
}

/// Deployment of an assembly context on a container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationContext {
    /// Deployed context.
    pub assembly_context: AssemblyContextId,
    /// Hosting container.
    pub container: ContainerId,
}

/// Metric a monitoring specification asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// Response time of an external call.
    ResponseTime,
}

/// Request to measure a metric on an action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSpec {
    /// Monitored action.
    pub action: ActionId,
    /// Metric to measure.
    pub metric: MetricKind,
}

/// Complete system: repository, assembly, resource environment, allocation
/// and monitoring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemModel {
    /// Model name.
    #[serde(default)]
    pub name: String,
    /// Component types.
    #[serde(default)]
    pub components: Vec<Component>,
    /// Component instances.
    #[serde(default)]
    pub assembly_contexts: Vec<AssemblyContext>,
    /// Role wiring.
    #[serde(default)]
    pub connectors: Vec<AssemblyConnector>,
    /// Simulated servers.
    #[serde(default)]
    pub containers: Vec<ResourceContainer>,
    /// Context deployment.
    #[serde(default)]
    pub allocation: Vec<AllocationContext>,
    /// Monitored actions.
    #[serde(default)]
    pub monitoring: Vec<MonitoringSpec>,
}

impl SystemModel {
    /// Check cross references between the model parts.
    pub fn validate(&self) -> Result<()> {
        let components: HashSet<&ComponentId> = self.components.iter().map(|c| &c.id).collect();
        let contexts: HashSet<&AssemblyContextId> =
            self.assembly_contexts.iter().map(|c| &c.id).collect();
        let containers: HashSet<&ContainerId> = self.containers.iter().map(|c| &c.id).collect();

        for context in &self.assembly_contexts {
            if !components.contains(&context.component) {
                return Err(ModelError::UnknownComponent(context.component.clone()));
            }
        }
        for connector in &self.connectors {
            for end in [&connector.requiring, &connector.providing] {
                if !contexts.contains(end) {
                    return Err(ModelError::UnknownAssemblyContext(end.clone()));
                }
            }
        }
        for allocation in &self.allocation {
            if !contexts.contains(&allocation.assembly_context) {
                return Err(ModelError::UnknownAssemblyContext(
                    allocation.assembly_context.clone(),
                ));
            }
            if !containers.contains(&allocation.container) {
                return Err(ModelError::UnknownContainer(allocation.container.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(id: &str, successor: Option<&str>, kind: ActionKind) -> Action {
        Action {
            id: ActionId::new(id),
            name: id.to_string(),
            successor: successor.map(ActionId::new),
            kind,
        }
    }

    #[test]
    fn behavior_requires_single_start() {
        let err = Behavior::new("empty", vec![action("stop", None, ActionKind::Stop)]).unwrap_err();
        assert_eq!(
            err,
            ModelError::StartAction {
                behavior: "empty".to_string(),
                found: 0
            }
        );

        let err = Behavior::new(
            "twice",
            vec![
                action("a", None, ActionKind::Start),
                action("b", None, ActionKind::Start),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::StartAction { found: 2, .. }));
    }

    #[test]
    fn behavior_rejects_dangling_successor() {
        let err = Behavior::new("dangling", vec![action("start", Some("nowhere"), ActionKind::Start)])
            .unwrap_err();
        assert!(matches!(err, ModelError::MissingSuccessor { .. }));
    }

    #[test]
    fn behavior_rejects_successor_cycles() {
        let err = Behavior::new(
            "cyclic",
            vec![
                action("s", Some("a"), ActionKind::Start),
                action("a", Some("a"), ActionKind::Stop),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::SuccessorCycle {
                behavior: "cyclic".to_string(),
                action: ActionId::new("a"),
            }
        );

        let err = Behavior::new(
            "restart",
            vec![
                action("s", Some("a"), ActionKind::Start),
                action("a", Some("s"), ActionKind::Internal { demands: Vec::new() }),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::SuccessorCycle { action, .. } if action.as_str() == "s"));
    }

    #[test]
    fn behavior_rejects_shared_successors() {
        let err = Behavior::new(
            "merge",
            vec![
                action("s", Some("e"), ActionKind::Start),
                action("side", Some("e"), ActionKind::Internal { demands: Vec::new() }),
                action("e", None, ActionKind::Stop),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::SharedSuccessor {
                behavior: "merge".to_string(),
                action: ActionId::new("e"),
            }
        );
    }

    #[test]
    fn behavior_follows_successors() {
        let behavior = Behavior::new(
            "chain",
            vec![
                action("stop", None, ActionKind::Stop),
                action("start", Some("stop"), ActionKind::Start),
            ],
        )
        .unwrap();
        let start = behavior.start();
        assert_eq!(start.id.as_str(), "start");
        let next = behavior.successor(start).unwrap();
        assert_eq!(next.id.as_str(), "stop");
        assert!(behavior.successor(next).is_none());
    }

    #[test]
    fn behavior_round_trips_through_json() {
        let json = r#"{
            "name": "demo",
            "actions": [
                {"id": "s", "type": "start", "successor": "work"},
                {"id": "work", "type": "internal", "successor": "e",
                 "demands": [{"resource": "CPU", "specification": "2.0 * 3"}]},
                {"id": "e", "type": "stop"}
            ]
        }"#;
        let behavior: Behavior = serde_json::from_str(json).unwrap();
        assert_eq!(behavior.actions().len(), 3);
        let text = serde_json::to_string(&behavior).unwrap();
        let again: Behavior = serde_json::from_str(&text).unwrap();
        assert_eq!(again, behavior);
    }

    #[test]
    fn malformed_specifications_fail_to_load() {
        let json = r#"{"actions": [
            {"id": "s", "type": "start", "successor": "l"},
            {"id": "l", "type": "loop", "iterations": "3 +",
             "body": {"actions": [{"id": "b", "type": "start"}]}}
        ]}"#;
        assert!(serde_json::from_str::<Behavior>(json).is_err());
    }

    #[test]
    fn inner_usages_are_detected() {
        let usage = VariableUsage::value("files.INNER", StoEx::parse("1").unwrap());
        assert!(usage.is_inner());
        let usage = VariableUsage::value("inner", StoEx::parse("1").unwrap());
        assert!(!usage.is_inner());
    }

    #[test]
    fn system_validation_checks_references() {
        let model = SystemModel {
            assembly_contexts: vec![AssemblyContext {
                id: "ctx".into(),
                name: String::new(),
                component: "missing".into(),
            }],
            ..SystemModel::default()
        };
        assert_eq!(
            model.validate().unwrap_err(),
            ModelError::UnknownComponent("missing".into())
        );
    }
}
