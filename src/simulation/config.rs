//! Simulation configuration and JSON file handling

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use crate::model::SystemModel;

/// Configuration for a simulation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Seed of the random source used for every stochastic expression
    pub seed: u64,

    /// Simulated time after which the run stops (default: run to completion)
    pub stop_time: Option<f64>,

    /// Enable debug tracing
    pub debug: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            stop_time: None,
            debug: false,
        }
    }
}

impl SimulationConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> Result<Self> {
        read_json(path).context("Failed to load simulation config")
    }

    /// Write configuration to a JSON file
    pub fn save(&self, path: &Path) -> Result<()> {
        write_json(path, self).context("Failed to save simulation config")
    }
}

/// Load and validate a system model from a JSON file
pub fn load_model(path: &Path) -> Result<SystemModel> {
    let model: SystemModel = read_json(path).context("Failed to load system model")?;
    model
        .validate()
        .with_context(|| format!("Invalid system model: {:?}", path))?;
    Ok(model)
}

/// Deserialize a JSON file
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let data = fs::read(path).with_context(|| format!("Failed to read file: {:?}", path))?;
    serde_json::from_slice(&data).with_context(|| format!("Failed to deserialize {:?}", path))
}

/// Serialize to pretty JSON, writing through a temporary file and a rename
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value).context("Failed to serialize")?;
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file: {:?}", temp_path))?;
    file.write_all(&json).context("Failed to write data")?;
    file.sync_all().context("Failed to sync file")?;
    drop(file);

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;
    Ok(())
}
