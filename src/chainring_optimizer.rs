//! Chainring optimizer
//!
//! Every candidate chainring is scored independently: each sample with usable
//! power is put through the gear selector, the per-sample losses are summed,
//! and time spent on preferred cogs is rewarded:
//!
//!   score = total_power_loss - reward_weight * preferred_count / total_samples
//!
//! The denominator is the full sample count, including samples that were not
//! scored. The lowest score wins; ties go to the candidate listed first.

use std::collections::BTreeSet;

use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::enrichment::KinematicSample;
use crate::gear_selector::select_gear;
use crate::power_loss::{PowerLossTable, TrainingZones};

/// Everything the optimizer needs besides the samples.
#[derive(Debug, Clone)]
pub struct Drivetrain {
    pub candidate_chainrings: Vec<u32>,
    pub cassette: Vec<u32>,
    pub tire_circumference_mm: f64,
    pub losses: PowerLossTable,
    pub zones: TrainingZones,
    pub preferred_cogs: BTreeSet<u32>,
    pub reward_weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChainringScore {
    pub chainring: u32,
    pub total_power_loss_w: f64,
    pub preferred_gear_count: usize,
    pub scored_samples: usize,
    pub total_samples: usize,
    pub fraction_preferred: f64,
    pub score: f64,
}

/// Score one chainring over the whole ride.
pub fn score_chainring(
    samples: &[KinematicSample],
    chainring: u32,
    drivetrain: &Drivetrain,
) -> ChainringScore {
    let mut total_power_loss_w = 0.0;
    let mut preferred_gear_count = 0usize;
    let mut scored_samples = 0usize;

    for sample in samples.iter().filter(|s| s.has_scorable_power()) {
        let gear = select_gear(
            sample.speed_kmh,
            sample.cadence_rpm,
            chainring,
            &drivetrain.cassette,
            drivetrain.tire_circumference_mm,
            &drivetrain.losses,
            &drivetrain.zones,
        );

        total_power_loss_w += gear.power_loss_w;
        scored_samples += 1;
        if drivetrain.preferred_cogs.contains(&gear.cog) {
            preferred_gear_count += 1;
        }
    }

    let fraction_preferred = if samples.is_empty() {
        0.0
    } else {
        preferred_gear_count as f64 / samples.len() as f64
    };
    let score = total_power_loss_w - drivetrain.reward_weight * fraction_preferred;

    debug!(
        chainring,
        total_power_loss_w, preferred_gear_count, scored_samples, score, "scored chainring"
    );

    ChainringScore {
        chainring,
        total_power_loss_w,
        preferred_gear_count,
        scored_samples,
        total_samples: samples.len(),
        fraction_preferred,
        score,
    }
}

/// Score every candidate, in candidate order. Candidates are independent,
/// so they are evaluated in parallel.
pub fn score_chainrings(samples: &[KinematicSample], drivetrain: &Drivetrain) -> Vec<ChainringScore> {
    drivetrain
        .candidate_chainrings
        .par_iter()
        .map(|&chainring| score_chainring(samples, chainring, drivetrain))
        .collect()
}

/// First-seen minimum. A score must beat the running minimum strictly,
/// and non-finite scores never win.
pub fn best_score(scores: &[ChainringScore]) -> Option<&ChainringScore> {
    scores
        .iter()
        .fold((None, f64::MAX), |(best, min), candidate| {
            if candidate.score < min {
                (Some(candidate), candidate.score)
            } else {
                (best, min)
            }
        })
        .0
}

/// Tooth count of the chainring with the lowest weighted loss.
pub fn optimal_chainring(samples: &[KinematicSample], drivetrain: &Drivetrain) -> Option<u32> {
    let scores = score_chainrings(samples, drivetrain);
    best_score(&scores).map(|best| best.chainring)
}
