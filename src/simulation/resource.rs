//! Simulated processing resources
//!
//! The interpreter only sees [`ResourceRegistry`]. [`SimulatedResources`]
//! is the stock implementation built from a model's resource environment:
//! FCFS resources queue demands on a fair semaphore with one permit per
//! server, delay resources serve every demand at once.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;

use super::error::ResourceError;
use super::kernel::SimProcess;
use crate::model::{ContainerId, ProcessingResource, SchedulingPolicy, SystemModel};

/// Place where internal actions load their demands
#[async_trait(?Send)]
pub trait ResourceRegistry {
    /// Issue `demand` units of work on `resource` of `container` and return
    /// once the simulated process has been served.
    async fn load_active_resource(
        &self,
        process: &SimProcess,
        container: &ContainerId,
        resource: &str,
        demand: f64,
    ) -> Result<(), ResourceError>;
}

/// Utilisation counters of one resource
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResourceStats {
    /// Hosting container
    pub container: ContainerId,
    /// Resource type
    pub resource: String,
    /// Demands fully served
    pub demands_served: u64,
    /// Sum of all demands
    pub total_demand: f64,
    /// Simulated seconds spent serving
    pub busy_time: f64,
    /// Simulated seconds spent queueing
    pub waiting_time: f64,
}

struct ActiveResource {
    rate: f64,
    servers: Option<Semaphore>,
    stats: Mutex<ResourceStats>,
}

impl ActiveResource {
    fn new(container: &ContainerId, spec: &ProcessingResource) -> Result<Self, ResourceError> {
        let misconfigured = |detail: String| ResourceError::Misconfigured {
            container: container.clone(),
            resource: spec.resource.clone(),
            detail,
        };
        if !(spec.processing_rate > 0.0 && spec.processing_rate.is_finite()) {
            return Err(misconfigured(format!(
                "processing rate {} must be positive",
                spec.processing_rate
            )));
        }
        let servers = match spec.scheduling {
            SchedulingPolicy::Fcfs if spec.servers == 0 => {
                return Err(misconfigured("at least one server is required".to_string()));
            }
            SchedulingPolicy::Fcfs => Some(Semaphore::new(spec.servers)),
            SchedulingPolicy::Delay => None,
        };
        Ok(Self {
            rate: spec.processing_rate,
            servers,
            stats: Mutex::new(ResourceStats {
                container: container.clone(),
                resource: spec.resource.clone(),
                ..ResourceStats::default()
            }),
        })
    }
}

/// Resource environment simulated on the kernel clock
pub struct SimulatedResources {
    containers: HashMap<ContainerId, HashMap<String, ActiveResource>>,
}

impl SimulatedResources {
    /// Build the resources of every container in `model`
    pub fn from_model(model: &SystemModel) -> Result<Self, ResourceError> {
        let mut containers = HashMap::with_capacity(model.containers.len());
        for container in &model.containers {
            let mut resources = HashMap::with_capacity(container.resources.len());
            for spec in &container.resources {
                resources.insert(spec.resource.clone(), ActiveResource::new(&container.id, spec)?);
            }
            containers.insert(container.id.clone(), resources);
        }
        Ok(Self { containers })
    }

    /// Counters of every resource, ordered by container then resource
    pub fn statistics(&self) -> Vec<ResourceStats> {
        let mut stats: Vec<ResourceStats> = self
            .containers
            .values()
            .flat_map(|resources| resources.values())
            .map(|resource| resource.stats.lock().clone())
            .collect();
        stats.sort_by(|a, b| {
            (a.container.as_str(), a.resource.as_str()).cmp(&(b.container.as_str(), b.resource.as_str()))
        });
        stats
    }

    fn lookup(&self, container: &ContainerId, resource: &str) -> Result<&ActiveResource, ResourceError> {
        self.containers
            .get(container)
            .ok_or_else(|| ResourceError::UnknownContainer(container.clone()))?
            .get(resource)
            .ok_or_else(|| ResourceError::UnknownResource {
                container: container.clone(),
                resource: resource.to_string(),
            })
    }
}

#[async_trait(?Send)]
impl ResourceRegistry for SimulatedResources {
    async fn load_active_resource(
        &self,
        process: &SimProcess,
        container: &ContainerId,
        resource: &str,
        demand: f64,
    ) -> Result<(), ResourceError> {
        if !(demand >= 0.0 && demand.is_finite()) {
            return Err(ResourceError::InvalidDemand {
                resource: resource.to_string(),
                demand,
            });
        }
        let active = self.lookup(container, resource)?;
        let service_time = demand / active.rate;
        let arrived = process.now();

        let _permit = match &active.servers {
            Some(servers) => Some(
                servers
                    .acquire()
                    .await
                    .map_err(|_| ResourceError::Closed(resource.to_string()))?,
            ),
            None => None,
        };
        let started = process.now();
        tracing::trace!(
            "{} serves {} on {}/{} for {}s",
            started,
            process.name(),
            container,
            resource,
            service_time
        );
        process.hold(service_time).await;

        let mut stats = active.stats.lock();
        stats.demands_served += 1;
        stats.total_demand += demand;
        stats.busy_time += service_time;
        stats.waiting_time += started.since(arrived);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceContainer;
    use crate::simulation::clock::SimTime;
    use crate::simulation::kernel::Kernel;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn model(policy: SchedulingPolicy, servers: usize) -> SystemModel {
        SystemModel {
            containers: vec![ResourceContainer {
                id: "server".into(),
                name: "Server".to_string(),
                resources: vec![ProcessingResource {
                    resource: "CPU".to_string(),
                    processing_rate: 2.0,
                    servers,
                    scheduling: policy,
                }],
            }],
            ..SystemModel::default()
        }
    }

    fn finish_times(policy: SchedulingPolicy, servers: usize, jobs: usize) -> (Vec<f64>, ResourceStats) {
        let mut kernel = Kernel::new();
        let resources = Rc::new(SimulatedResources::from_model(&model(policy, servers)).unwrap());
        let finished = Rc::new(RefCell::new(Vec::new()));
        for job in 0..jobs {
            let process = SimProcess::new(format!("job-{}", job), kernel.handle());
            let resources = Rc::clone(&resources);
            let finished = Rc::clone(&finished);
            kernel
                .handle()
                .spawn("job", async move {
                    resources
                        .load_active_resource(&process, &"server".into(), "CPU", 4.0)
                        .await
                        .unwrap();
                    finished.borrow_mut().push(process.now().as_secs());
                })
                .unwrap();
        }
        kernel.run(None);
        let stats = resources.statistics().remove(0);
        let times = finished.borrow().clone();
        (times, stats)
    }

    #[test]
    fn test_fcfs_queues_demands() {
        let (times, stats) = finish_times(SchedulingPolicy::Fcfs, 1, 3);
        assert_eq!(times, vec![2.0, 4.0, 6.0]);
        assert_eq!(stats.demands_served, 3);
        assert_eq!(stats.busy_time, 6.0);
        assert_eq!(stats.waiting_time, 6.0);
    }

    #[test]
    fn test_multiple_servers_share_load() {
        let (times, _) = finish_times(SchedulingPolicy::Fcfs, 2, 3);
        assert_eq!(times, vec![2.0, 2.0, 4.0]);
    }

    #[test]
    fn test_delay_serves_immediately() {
        let (times, stats) = finish_times(SchedulingPolicy::Delay, 1, 3);
        assert_eq!(times, vec![2.0, 2.0, 2.0]);
        assert_eq!(stats.waiting_time, 0.0);
    }

    #[test]
    fn test_rejects_unknown_resources_and_bad_demands() {
        let mut kernel = Kernel::new();
        let resources = Rc::new(SimulatedResources::from_model(&model(SchedulingPolicy::Fcfs, 1)).unwrap());
        let process = SimProcess::new("p", kernel.handle());
        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&errors);
        kernel
            .handle()
            .spawn("p", async move {
                for (container, resource, demand) in
                    [("server", "HDD", 1.0), ("other", "CPU", 1.0), ("server", "CPU", -1.0)]
                {
                    let result = resources
                        .load_active_resource(&process, &container.into(), resource, demand)
                        .await;
                    sink.borrow_mut().push(result.unwrap_err());
                }
            })
            .unwrap();
        assert_eq!(kernel.run(None), SimTime::ZERO);

        let errors = errors.borrow();
        assert!(matches!(errors[0], ResourceError::UnknownResource { .. }));
        assert!(matches!(errors[1], ResourceError::UnknownContainer(_)));
        assert!(matches!(errors[2], ResourceError::InvalidDemand { .. }));
    }

    #[test]
    fn test_rejects_misconfigured_resources() {
        assert!(matches!(
            SimulatedResources::from_model(&model(SchedulingPolicy::Fcfs, 0)),
            Err(ResourceError::Misconfigured { .. })
        ));
    }
}
