//! Simulated time.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Point on the simulated clock, in simulated seconds.
///
/// Ordered with `f64::total_cmp` so it can key the kernel's timer heap.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SimTime(f64);

impl SimTime {
    /// Start of every simulation.
    pub const ZERO: SimTime = SimTime(0.0);

    /// Create a time from seconds.
    pub fn new(seconds: f64) -> Self {
        Self(seconds)
    }

    /// Seconds since the start of the simulation.
    pub fn as_secs(self) -> f64 {
        self.0
    }

    /// The time `delay` seconds later. Non-positive or NaN delays yield `self`.
    pub fn after(self, delay: f64) -> Self {
        if delay > 0.0 { Self(self.0 + delay) } else { self }
    }

    /// Seconds elapsed since `earlier`.
    pub fn since(self, earlier: SimTime) -> f64 {
        self.0 - earlier.0
    }
}

impl PartialEq for SimTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SimTime {}

impl PartialOrd for SimTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SimTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}s", self.0)
    }
}
