use std::collections::HashMap;
use std::sync::Arc;

use super::{
    ActionId, AssemblyContext, AssemblyContextId, Behavior, Component, ComponentId, ContainerId,
    MetricKind, ModelError, MonitoringSpec, Result, SystemModel,
};

/// Callee of an external call after resolving the connector.
#[derive(Debug, Clone)]
pub struct ResolvedCall {
    /// Assembly context providing the service.
    pub context: AssemblyContextId,
    /// Behavior implementing the service.
    pub behavior: Arc<Behavior>,
}

/// Indexed, read-only view over a validated [`SystemModel`].
#[derive(Debug)]
pub struct ModelAccess {
    model: SystemModel,
    contexts: HashMap<AssemblyContextId, usize>,
    components: HashMap<ComponentId, usize>,
    allocation: HashMap<AssemblyContextId, ContainerId>,
    connectors: HashMap<(AssemblyContextId, String), AssemblyContextId>,
    monitoring: HashMap<(ActionId, MetricKind), usize>,
}

impl ModelAccess {
    /// Validate `model` and build the lookup indexes.
    pub fn new(model: SystemModel) -> Result<Self> {
        model.validate()?;

        let contexts = model
            .assembly_contexts
            .iter()
            .enumerate()
            .map(|(position, context)| (context.id.clone(), position))
            .collect();
        let components = model
            .components
            .iter()
            .enumerate()
            .map(|(position, component)| (component.id.clone(), position))
            .collect();
        let allocation = model
            .allocation
            .iter()
            .map(|entry| (entry.assembly_context.clone(), entry.container.clone()))
            .collect();
        let connectors = model
            .connectors
            .iter()
            .map(|connector| {
                (
                    (connector.requiring.clone(), connector.role.clone()),
                    connector.providing.clone(),
                )
            })
            .collect();
        let monitoring = model
            .monitoring
            .iter()
            .enumerate()
            .map(|(position, spec)| ((spec.action.clone(), spec.metric), position))
            .collect();

        Ok(Self {
            model,
            contexts,
            components,
            allocation,
            connectors,
            monitoring,
        })
    }

    /// The underlying model.
    pub fn model(&self) -> &SystemModel {
        &self.model
    }

    /// Look up an assembly context.
    pub fn assembly_context(&self, id: &AssemblyContextId) -> Result<&AssemblyContext> {
        self.contexts
            .get(id)
            .map(|&position| &self.model.assembly_contexts[position])
            .ok_or_else(|| ModelError::UnknownAssemblyContext(id.clone()))
    }

    fn component(&self, id: &ComponentId) -> Result<&Component> {
        self.components
            .get(id)
            .map(|&position| &self.model.components[position])
            .ok_or_else(|| ModelError::UnknownComponent(id.clone()))
    }

    /// Container hosting the given assembly context.
    pub fn container_of(&self, context: &AssemblyContextId) -> Result<&ContainerId> {
        self.allocation
            .get(context)
            .ok_or_else(|| ModelError::Unallocated(context.clone()))
    }

    /// Behavior implementing `service` on the component instantiated by `context`.
    pub fn provided_service(
        &self,
        context: &AssemblyContextId,
        service: &str,
    ) -> Result<Arc<Behavior>> {
        let component = self.component(&self.assembly_context(context)?.component)?;
        component
            .services
            .iter()
            .find(|effect| effect.service == service)
            .map(|effect| Arc::clone(&effect.behavior))
            .ok_or_else(|| ModelError::UnknownService {
                component: component.id.clone(),
                service: service.to_string(),
            })
    }

    /// Resolve the callee reached from `context` through `role`.
    pub fn resolve_call(
        &self,
        context: &AssemblyContextId,
        role: &str,
        service: &str,
    ) -> Result<ResolvedCall> {
        let providing = self
            .connectors
            .get(&(context.clone(), role.to_string()))
            .ok_or_else(|| ModelError::UnboundRole {
                context: context.clone(),
                role: role.to_string(),
            })?;
        Ok(ResolvedCall {
            context: providing.clone(),
            behavior: self.provided_service(providing, service)?,
        })
    }

    /// Monitoring specification for `action` and `metric`, if any.
    pub fn monitoring(&self, action: &ActionId, metric: MetricKind) -> Option<&MonitoringSpec> {
        self.monitoring
            .get(&(action.clone(), metric))
            .map(|&position| &self.model.monitoring[position])
    }
}
