#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use perfsim::model::{
    AllocationContext, AssemblyConnector, AssemblyContext, Behavior, Component, ContainerId,
    ProcessingResource, ResourceContainer, SchedulingPolicy, ServiceEffect, SystemModel,
};
use perfsim::simulation::{
    RequestSpec, ResourceError, ResourceRegistry, SimProcess, Simulation, SimulationConfig,
    SimulationReport,
};
use std::sync::Arc;

/// One demand seen by [`RecordingRegistry`].
#[derive(Debug, Clone, PartialEq)]
pub struct Demand {
    pub process: String,
    pub container: ContainerId,
    pub resource: String,
    pub amount: f64,
    pub at: f64,
}

/// Registry that records every demand and holds the process for `amount` seconds.
#[derive(Default)]
pub struct RecordingRegistry {
    demands: Mutex<Vec<Demand>>,
}

impl RecordingRegistry {
    pub fn demands(&self) -> Vec<Demand> {
        self.demands.lock().clone()
    }

    pub fn amounts(&self) -> Vec<f64> {
        self.demands.lock().iter().map(|d| d.amount).collect()
    }

    pub fn on(&self, resource: &str) -> Vec<Demand> {
        self.demands
            .lock()
            .iter()
            .filter(|d| d.resource == resource)
            .cloned()
            .collect()
    }
}

#[async_trait(?Send)]
impl ResourceRegistry for RecordingRegistry {
    async fn load_active_resource(
        &self,
        process: &SimProcess,
        container: &ContainerId,
        resource: &str,
        demand: f64,
    ) -> Result<(), ResourceError> {
        self.demands.lock().push(Demand {
            process: process.name().to_string(),
            container: container.clone(),
            resource: resource.to_string(),
            amount: demand,
            at: process.now().as_secs(),
        });
        process.hold(demand).await;
        Ok(())
    }
}

fn component(id: &str, name: &str, services: Vec<(&str, Behavior)>) -> Component {
    Component {
        id: id.into(),
        name: name.to_string(),
        services: services
            .into_iter()
            .map(|(service, behavior)| ServiceEffect {
                service: service.to_string(),
                behavior: Arc::new(behavior),
            })
            .collect(),
    }
}

fn server(policy: SchedulingPolicy) -> ResourceContainer {
    ResourceContainer {
        id: "server".into(),
        name: "Server".to_string(),
        resources: ["CPU", "HDD", "MARK"]
            .into_iter()
            .map(|resource| ProcessingResource {
                resource: resource.to_string(),
                processing_rate: 1.0,
                servers: 1,
                scheduling: policy,
            })
            .collect(),
    }
}

/// One component `app` deployed as `app-1` on `server`.
pub fn single_tier(services: Vec<(&str, Behavior)>) -> SystemModel {
    SystemModel {
        name: "single-tier".to_string(),
        components: vec![component("app", "App", services)],
        assembly_contexts: vec![AssemblyContext {
            id: "app-1".into(),
            name: "App".to_string(),
            component: "app".into(),
        }],
        containers: vec![server(SchedulingPolicy::Delay)],
        allocation: vec![AllocationContext {
            assembly_context: "app-1".into(),
            container: "server".into(),
        }],
        ..SystemModel::default()
    }
}

/// `web-1` requiring role `storage`, wired to `db-1`; both on `server`.
pub fn two_tier(web: Vec<(&str, Behavior)>, db: Vec<(&str, Behavior)>) -> SystemModel {
    SystemModel {
        name: "two-tier".to_string(),
        components: vec![component("web", "Web", web), component("db", "Database", db)],
        assembly_contexts: vec![
            AssemblyContext {
                id: "web-1".into(),
                name: "Web".to_string(),
                component: "web".into(),
            },
            AssemblyContext {
                id: "db-1".into(),
                name: "Database".to_string(),
                component: "db".into(),
            },
        ],
        connectors: vec![AssemblyConnector {
            requiring: "web-1".into(),
            role: "storage".to_string(),
            providing: "db-1".into(),
        }],
        containers: vec![server(SchedulingPolicy::Fcfs)],
        allocation: vec![
            AllocationContext {
                assembly_context: "web-1".into(),
                container: "server".into(),
            },
            AllocationContext {
                assembly_context: "db-1".into(),
                container: "server".into(),
            },
        ],
        ..SystemModel::default()
    }
}

/// Run `requests` against `model` with a recording registry.
pub fn simulate(
    model: SystemModel,
    requests: Vec<RequestSpec>,
) -> (SimulationReport, Arc<RecordingRegistry>) {
    let registry = Arc::new(RecordingRegistry::default());
    let mut simulation = Simulation::new(SimulationConfig::default(), model)
        .unwrap()
        .with_resources(Arc::clone(&registry) as Arc<dyn ResourceRegistry>);
    for request in requests {
        simulation.submit(request).unwrap();
    }
    (simulation.run(), registry)
}
