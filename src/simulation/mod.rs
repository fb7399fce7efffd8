//! Simulation driver and collaborators
//!
//! A [`Simulation`] wires a validated model to the discrete-event
//! [`Kernel`], a resource registry, a measurement sink and a reconfiguration
//! trigger. Requests are submitted as simulated processes entering one
//! assembly context's service at a given arrival time; [`Simulation::run`]
//! drives the kernel and summarises the outcome of every request.

use chrono::{DateTime, Utc};
use futures::channel::oneshot;
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub mod clock;
pub mod config;
pub mod error;
pub mod kernel;
pub mod measurement;
pub mod reconfiguration;
pub mod resource;

pub use clock::SimTime;
pub use config::SimulationConfig;
pub use error::{MeasurementError, ResourceError, SimulationError};
pub use kernel::{Hold, Kernel, KernelHandle, ProcessId, SimProcess};
pub use measurement::{
    MeasurementSink, RecordingSink, ResponseTimeCalculator, ResponseTimeMeasurement, TimeSample,
};
pub use reconfiguration::{
    ModelElement, NoReconfiguration, RecordingReconfigurator, Reconfigurator,
};
pub use resource::{ResourceRegistry, ResourceStats, SimulatedResources};

use crate::interpreter::{
    BehaviorInterpreter, Collaborators, Frame, InterpreterContext, InterpreterError, bind_usages,
};
use crate::model::{AssemblyContextId, Behavior, ModelAccess, SystemModel, VariableUsage};
use crate::stoex::Value;

/// A request entering the system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSpec {
    /// Entry assembly context
    pub assembly_context: AssemblyContextId,
    /// Service called on the entry context
    pub service: String,
    /// Input parameters, evaluated in an empty scope
    #[serde(default)]
    pub inputs: Vec<VariableUsage>,
    /// Simulated arrival time
    #[serde(default)]
    pub arrival: f64,
}

impl RequestSpec {
    /// Request for `service` of `assembly_context` arriving at time zero
    pub fn new(assembly_context: impl Into<AssemblyContextId>, service: impl Into<String>) -> Self {
        Self {
            assembly_context: assembly_context.into(),
            service: service.into(),
            inputs: Vec::new(),
            arrival: 0.0,
        }
    }

    /// Add an input parameter
    pub fn with_input(mut self, usage: VariableUsage) -> Self {
        self.inputs.push(usage);
        self
    }

    /// Set the arrival time
    pub fn arriving_at(mut self, arrival: f64) -> Self {
        self.arrival = arrival;
        self
    }
}

/// Final state of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// The entry behavior ran to its end
    Completed,
    /// Interpretation aborted with an error
    Failed,
    /// Still running when the simulation stopped
    Incomplete,
}

/// Outcome of one submitted request
#[derive(Debug, Clone, Serialize)]
pub struct RequestOutcome {
    /// Submission index
    pub request: usize,
    /// Process that served the request
    pub process: ProcessId,
    /// Entry assembly context
    pub assembly_context: AssemblyContextId,
    /// Entry service
    pub service: String,
    /// Final state
    pub status: RequestStatus,
    /// Arrival time
    pub arrival: SimTime,
    /// Time the entry behavior finished or failed
    pub completion: Option<SimTime>,
    /// `completion - arrival`
    pub response_time: Option<f64>,
    /// Concrete values of the entry behavior's result frame
    pub results: BTreeMap<String, Value>,
    /// Failure message
    pub error: Option<String>,
}

/// Summary of a simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Model name
    pub model: String,
    /// Seed used for sampling
    pub seed: u64,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Wall-clock end
    pub finished_at: DateTime<Utc>,
    /// Simulated time at the end of the run
    pub simulated_time: SimTime,
    /// Per-request outcomes in submission order
    pub requests: Vec<RequestOutcome>,
    /// Resource counters (empty with a custom registry)
    pub resources: Vec<ResourceStats>,
    /// Paired response times (empty with a custom measurement sink)
    pub response_times: Vec<ResponseTimeMeasurement>,
}

impl SimulationReport {
    /// Number of requests with the given status
    pub fn count(&self, status: RequestStatus) -> usize {
        self.requests.iter().filter(|r| r.status == status).count()
    }

    /// Mean response time of completed requests
    pub fn mean_response_time(&self) -> Option<f64> {
        let times: Vec<f64> = self
            .requests
            .iter()
            .filter(|r| r.status == RequestStatus::Completed)
            .filter_map(|r| r.response_time)
            .collect();
        if times.is_empty() {
            None
        } else {
            Some(times.iter().sum::<f64>() / times.len() as f64)
        }
    }
}

struct Completion {
    finished: SimTime,
    result: Result<Frame, InterpreterError>,
}

struct PendingRequest {
    index: usize,
    process: ProcessId,
    assembly_context: AssemblyContextId,
    service: String,
    arrival: SimTime,
    receiver: oneshot::Receiver<Completion>,
}

impl PendingRequest {
    fn finish(mut self) -> RequestOutcome {
        let mut outcome = RequestOutcome {
            request: self.index,
            process: self.process,
            assembly_context: self.assembly_context,
            service: self.service,
            status: RequestStatus::Incomplete,
            arrival: self.arrival,
            completion: None,
            response_time: None,
            results: BTreeMap::new(),
            error: None,
        };
        match self.receiver.try_recv() {
            Ok(Some(completion)) => {
                outcome.completion = Some(completion.finished);
                outcome.response_time = Some(completion.finished.since(self.arrival));
                match completion.result {
                    Ok(frame) => {
                        outcome.status = RequestStatus::Completed;
                        outcome.results = frame
                            .own_bindings()
                            .filter_map(|(name, binding)| {
                                binding.value().map(|value| (name.clone(), value.clone()))
                            })
                            .collect();
                    }
                    Err(err) => {
                        tracing::error!("Request {} failed: {}", self.index, err);
                        outcome.status = RequestStatus::Failed;
                        outcome.error = Some(err.to_string());
                    }
                }
            }
            Ok(None) => {
                tracing::warn!("Request {} did not complete before the simulation stopped", self.index);
            }
            Err(_) => {
                outcome.status = RequestStatus::Failed;
                outcome.error = Some("request process was dropped".to_string());
            }
        }
        outcome
    }
}

/// A configured simulation run
pub struct Simulation {
    config: SimulationConfig,
    kernel: Kernel,
    collaborators: Collaborators,
    statistics: Option<Arc<SimulatedResources>>,
    recorder: Option<Arc<RecordingSink>>,
    pending: Vec<PendingRequest>,
    submitted: usize,
}

impl Simulation {
    /// Create a simulation of `model` with simulated resources, a recording
    /// measurement sink and no reconfiguration.
    pub fn new(config: SimulationConfig, model: SystemModel) -> Result<Self, SimulationError> {
        let resources = Arc::new(SimulatedResources::from_model(&model)?);
        let recorder = Arc::new(RecordingSink::new());
        let collaborators = Collaborators {
            model: Arc::new(ModelAccess::new(model)?),
            resources: Arc::clone(&resources) as Arc<dyn ResourceRegistry>,
            measurements: Arc::clone(&recorder) as Arc<dyn MeasurementSink>,
            reconfigurator: Arc::new(NoReconfiguration),
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(config.seed))),
        };
        Ok(Self {
            config,
            kernel: Kernel::new(),
            collaborators,
            statistics: Some(resources),
            recorder: Some(recorder),
            pending: Vec::new(),
            submitted: 0,
        })
    }

    /// Replace the resource registry
    pub fn with_resources(mut self, resources: Arc<dyn ResourceRegistry>) -> Self {
        self.collaborators.resources = resources;
        self.statistics = None;
        self
    }

    /// Replace the measurement sink
    pub fn with_measurements(mut self, measurements: Arc<dyn MeasurementSink>) -> Self {
        self.collaborators.measurements = measurements;
        self.recorder = None;
        self
    }

    /// Replace the reconfiguration trigger
    pub fn with_reconfigurator(mut self, reconfigurator: Arc<dyn Reconfigurator>) -> Self {
        self.collaborators.reconfigurator = reconfigurator;
        self
    }

    /// Run configuration
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Collaborators handed to every request
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    /// Handle to the kernel
    pub fn kernel(&self) -> KernelHandle {
        self.kernel.handle()
    }

    /// The default recording sink, unless replaced
    pub fn recorder(&self) -> Option<&RecordingSink> {
        self.recorder.as_deref()
    }

    /// Schedule a request. Fails if the entry service does not exist.
    pub fn submit(&mut self, request: RequestSpec) -> Result<ProcessId, SimulationError> {
        let behavior = self
            .collaborators
            .model
            .provided_service(&request.assembly_context, &request.service)?;
        let index = self.submitted;
        let name = format!("request-{}", index);
        let process = SimProcess::new(name.clone(), self.kernel.handle());
        let id = process.id();
        let arrival = SimTime::new(request.arrival).max(self.kernel.now());

        let (sender, receiver) = oneshot::channel();
        let collaborators = self.collaborators.clone();
        let entry = request.assembly_context.clone();
        let inputs = request.inputs;
        self.kernel.handle().spawn(&name, async move {
            process.hold(arrival.since(process.now())).await;
            let clock = process.clone();
            let result = serve(process, entry, &inputs, &behavior, collaborators).await;
            let _ = sender.send(Completion {
                finished: clock.now(),
                result,
            });
        })?;

        self.pending.push(PendingRequest {
            index,
            process: id,
            assembly_context: request.assembly_context,
            service: request.service,
            arrival,
            receiver,
        });
        self.submitted += 1;
        Ok(id)
    }

    /// Run the kernel until every request finished or the stop time is reached.
    ///
    /// Reports on the requests submitted since the previous run.
    pub fn run(&mut self) -> SimulationReport {
        let started_at = Utc::now();
        tracing::info!(
            "Simulating {} requests (seed {})",
            self.pending.len(),
            self.config.seed
        );
        let stop = self.config.stop_time.map(SimTime::new);
        let simulated_time = self.kernel.run(stop);

        let requests: Vec<RequestOutcome> =
            self.pending.drain(..).map(PendingRequest::finish).collect();
        let report = SimulationReport {
            model: self.collaborators.model.model().name.clone(),
            seed: self.config.seed,
            started_at,
            finished_at: Utc::now(),
            simulated_time,
            requests,
            resources: self
                .statistics
                .as_ref()
                .map(|resources| resources.statistics())
                .unwrap_or_default(),
            response_times: self
                .recorder
                .as_ref()
                .map(|recorder| recorder.response_times())
                .unwrap_or_default(),
        };
        tracing::info!(
            "Simulation ended at {}: {} completed, {} failed, {} incomplete",
            report.simulated_time,
            report.count(RequestStatus::Completed),
            report.count(RequestStatus::Failed),
            report.count(RequestStatus::Incomplete)
        );
        report
    }
}

async fn serve(
    process: SimProcess,
    entry: AssemblyContextId,
    inputs: &[VariableUsage],
    behavior: &Behavior,
    collaborators: Collaborators,
) -> Result<Frame, InterpreterError> {
    let mut root = Frame::new();
    {
        let rng = Arc::clone(&collaborators.rng);
        let mut rng = rng.lock();
        bind_usages(inputs, &Frame::new(), &mut root, &mut *rng)?;
    }
    let mut ctx = InterpreterContext::new(process, entry, root, collaborators);
    BehaviorInterpreter::new(&mut ctx).interpret(behavior).await
}
