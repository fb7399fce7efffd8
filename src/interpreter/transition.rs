//! Branch transition selection

use rand::Rng;

use super::frame::Frame;
use super::{InterpreterError, Result};
use crate::model::{ActionId, BranchTransition, ModelError, TransitionCondition};
use crate::stoex::evaluate_bool;

/// Allowed deviation of branch probabilities from a total of one.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

/// Picks the transition a branch follows.
#[derive(Debug, Clone, Copy)]
pub struct TransitionDeterminer {
    tolerance: f64,
}

impl Default for TransitionDeterminer {
    fn default() -> Self {
        Self::new(PROBABILITY_TOLERANCE)
    }
}

impl TransitionDeterminer {
    /// Determiner accepting probability sums within `tolerance` of one.
    pub fn new(tolerance: f64) -> Self {
        Self { tolerance }
    }

    /// Select one of `transitions` of `branch`, or none.
    ///
    /// Guarded transitions are tried in order and the first guard that holds
    /// wins. Probabilistic transitions are drawn by cumulative weight.
    pub fn determine<'t, R: Rng + ?Sized>(
        &self,
        branch: &ActionId,
        transitions: &'t [BranchTransition],
        frame: &Frame,
        rng: &mut R,
    ) -> Result<Option<&'t BranchTransition>> {
        let Some(first) = transitions.first() else {
            return Ok(None);
        };
        let guarded = matches!(first.condition, TransitionCondition::Guard(_));
        let uniform = transitions
            .iter()
            .all(|t| matches!(t.condition, TransitionCondition::Guard(_)) == guarded);
        if !uniform {
            return Err(ModelError::MixedBranchTransitions(branch.clone()).into());
        }

        if guarded {
            self.first_true_guard(transitions, frame, rng)
        } else {
            self.weighted(branch, transitions, rng)
        }
    }

    fn first_true_guard<'t, R: Rng + ?Sized>(
        &self,
        transitions: &'t [BranchTransition],
        frame: &Frame,
        rng: &mut R,
    ) -> Result<Option<&'t BranchTransition>> {
        for transition in transitions {
            if let TransitionCondition::Guard(guard) = &transition.condition {
                if evaluate_bool(guard, frame, rng)? {
                    return Ok(Some(transition));
                }
            }
        }
        Ok(None)
    }

    fn weighted<'t, R: Rng + ?Sized>(
        &self,
        branch: &ActionId,
        transitions: &'t [BranchTransition],
        rng: &mut R,
    ) -> Result<Option<&'t BranchTransition>> {
        let invalid = |detail: String| -> InterpreterError {
            ModelError::InvalidBranchProbabilities {
                action: branch.clone(),
                detail,
            }
            .into()
        };

        let mut weights = Vec::with_capacity(transitions.len());
        for transition in transitions {
            if let TransitionCondition::Probability(p) = transition.condition {
                if !(p.is_finite() && p >= 0.0) {
                    return Err(invalid(format!("probability {} is not a finite non-negative number", p)));
                }
                weights.push(p);
            }
        }
        let total: f64 = weights.iter().sum();
        if (total - 1.0).abs() > self.tolerance {
            return Err(invalid(format!("probabilities sum to {}", total)));
        }

        let draw: f64 = rng.r#gen();
        let mut cumulative = 0.0;
        for (transition, weight) in transitions.iter().zip(&weights) {
            cumulative += weight;
            if draw < cumulative {
                return Ok(Some(transition));
            }
        }
        // Draws in the rounding gap go to the last transition that can be taken.
        Ok(transitions
            .iter()
            .zip(&weights)
            .rev()
            .find(|(_, weight)| **weight > 0.0)
            .map(|(transition, _)| transition))
    }
}
