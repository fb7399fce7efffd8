//! Probes and response-time calculators

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use super::clock::SimTime;
use super::error::MeasurementError;
use super::kernel::{ProcessId, SimProcess};
use crate::model::{ActionId, MetricKind};

/// Calculator pairing a start probe with a stop probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimeCalculator {
    /// Calculator name, unique per monitored call site
    pub name: String,
    /// Probe sampled before the call
    pub start_probe: String,
    /// Probe sampled after the call
    pub stop_probe: String,
    /// Monitored action
    pub action: ActionId,
    /// Metric measured
    pub metric: MetricKind,
}

/// Where the interpreter reports probe samples
pub trait MeasurementSink {
    /// Record the current simulated time of `process` under `probe_id`
    fn take_current_time_sample(
        &self,
        probe_id: &str,
        label: &str,
        process: &SimProcess,
    ) -> Result<(), MeasurementError>;

    /// Register a calculator. Registering the same calculator twice is a no-op.
    fn create_response_time_calculator(
        &self,
        calculator: ResponseTimeCalculator,
    ) -> Result<(), MeasurementError>;
}

/// One probe sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSample {
    /// Probe id
    pub probe_id: String,
    /// Human-readable label
    pub label: String,
    /// Sampling process
    pub process: ProcessId,
    /// Sample time
    pub time: SimTime,
}

/// A completed start/stop pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseTimeMeasurement {
    /// Calculator name
    pub calculator: String,
    /// Measured process
    pub process: ProcessId,
    /// Start probe time
    pub start: SimTime,
    /// Stop probe time
    pub stop: SimTime,
    /// `stop - start`
    pub response_time: f64,
}

#[derive(Default)]
struct Recorded {
    samples: Vec<TimeSample>,
    calculators: BTreeMap<String, ResponseTimeCalculator>,
    probes: HashSet<String>,
}

/// In-memory sink keeping calculators and the samples of their probes.
///
/// Samples for probes no calculator uses are dropped.
#[derive(Default)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    /// Create an empty sink
    pub fn new() -> Self {
        Self::default()
    }

    /// Kept samples in recording order
    pub fn samples(&self) -> Vec<TimeSample> {
        self.recorded.lock().samples.clone()
    }

    /// Registered calculators ordered by name
    pub fn calculators(&self) -> Vec<ResponseTimeCalculator> {
        self.recorded.lock().calculators.values().cloned().collect()
    }

    /// Pair start and stop samples of every calculator.
    ///
    /// Pairing is per process and last-in-first-out, so nested invocations
    /// of the same call site pair with their own start sample. Stop samples
    /// without an open start are ignored.
    pub fn response_times(&self) -> Vec<ResponseTimeMeasurement> {
        let recorded = self.recorded.lock();
        let mut measurements = Vec::new();
        for calculator in recorded.calculators.values() {
            let mut open: HashMap<ProcessId, Vec<SimTime>> = HashMap::new();
            for sample in &recorded.samples {
                if sample.probe_id == calculator.start_probe {
                    open.entry(sample.process).or_default().push(sample.time);
                } else if sample.probe_id == calculator.stop_probe {
                    let Some(start) = open.get_mut(&sample.process).and_then(Vec::pop) else {
                        continue;
                    };
                    measurements.push(ResponseTimeMeasurement {
                        calculator: calculator.name.clone(),
                        process: sample.process,
                        start,
                        stop: sample.time,
                        response_time: sample.time.since(start),
                    });
                }
            }
        }
        measurements
    }
}

impl MeasurementSink for RecordingSink {
    fn take_current_time_sample(
        &self,
        probe_id: &str,
        label: &str,
        process: &SimProcess,
    ) -> Result<(), MeasurementError> {
        if probe_id.is_empty() {
            return Err(MeasurementError::EmptyProbe(label.to_string()));
        }
        let mut recorded = self.recorded.lock();
        if !recorded.probes.contains(probe_id) {
            tracing::trace!("Dropped sample of unmeasured probe '{}'", probe_id);
            return Ok(());
        }
        recorded.samples.push(TimeSample {
            probe_id: probe_id.to_string(),
            label: label.to_string(),
            process: process.id(),
            time: process.now(),
        });
        Ok(())
    }

    fn create_response_time_calculator(
        &self,
        calculator: ResponseTimeCalculator,
    ) -> Result<(), MeasurementError> {
        let mut recorded = self.recorded.lock();
        match recorded.calculators.get(&calculator.name) {
            Some(existing) if *existing == calculator => Ok(()),
            Some(_) => Err(MeasurementError::ConflictingCalculator(calculator.name)),
            None => {
                tracing::debug!("Registered response time calculator '{}'", calculator.name);
                recorded.probes.insert(calculator.start_probe.clone());
                recorded.probes.insert(calculator.stop_probe.clone());
                recorded.calculators.insert(calculator.name.clone(), calculator);
                Ok(())
            }
        }
    }
}
