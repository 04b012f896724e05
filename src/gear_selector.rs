//! Gear selection: the cog whose ratio best matches the ratio the rider
//! must have been in, given road speed and cadence.
//!
//! required_ratio = speed_m_s / (cadence_rpm * tire_circumference_mm / 60000)
//!
//! Cogs that make the ratio undefined (zero teeth, zero cadence) are skipped.
//! If nothing is usable the result is the all-zero "no gear" choice.

use serde::Serialize;

use crate::enrichment::KMH_PER_MS;
use crate::power_loss::{power_loss, PowerLossTable, TrainingZones};

/// mm/min of tire travel -> m/s (1000 mm/m * 60 s/min)
pub const TIRE_MM_PER_MIN_TO_MS: f64 = 60_000.0;

/// The gear picked for one sample under one chainring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct GearChoice {
    /// 1-based cassette position; 0 when no gear was found
    pub gear_number: usize,
    pub chainring: u32,
    pub cog: u32,
    pub speed_ms: f64,
    pub cadence_rpm: f64,
    pub ratio_error: f64,
    pub power_loss_w: f64,
}

impl GearChoice {
    pub fn is_engaged(&self) -> bool {
        self.gear_number != 0
    }

    pub fn ratio(&self) -> f64 {
        if self.cog == 0 {
            return 0.0;
        }
        self.chainring as f64 / self.cog as f64
    }

    /// Rough power figure fed to the zone lookup: km/h * rpm * ratio.
    /// NaN for the "no gear" choice.
    pub fn power_proxy(&self) -> f64 {
        self.speed_ms * KMH_PER_MS * self.cadence_rpm * self.chainring as f64 / self.cog as f64
    }
}

/// Ratio the drivetrain must have had to produce `speed_ms` at `cadence_rpm`.
pub fn required_ratio(speed_ms: f64, cadence_rpm: f64, tire_circumference_mm: f64) -> f64 {
    speed_ms / (cadence_rpm * tire_circumference_mm / TIRE_MM_PER_MIN_TO_MS)
}

/// Nearest-ratio search over the cassette, without the loss estimate.
/// Ties keep the lowest cassette position.
pub fn nearest_gear(
    speed_kmh: f64,
    cadence_rpm: f64,
    chainring: u32,
    cassette: &[u32],
    tire_circumference_mm: f64,
) -> GearChoice {
    let speed_ms = speed_kmh / KMH_PER_MS;
    let mut best: Option<GearChoice> = None;

    for (i, &cog) in cassette.iter().enumerate() {
        if cadence_rpm == 0.0 || chainring == 0 || cog == 0 {
            continue;
        }

        let gear_ratio = chainring as f64 / cog as f64;
        let required = required_ratio(speed_ms, cadence_rpm, tire_circumference_mm);
        if gear_ratio.is_nan() || required.is_nan() {
            continue;
        }

        let difference = (gear_ratio - required).abs();
        if !difference.is_finite() {
            continue;
        }

        let closer = best.map_or(true, |b| difference < b.ratio_error);
        if closer {
            best = Some(GearChoice {
                gear_number: i + 1,
                chainring,
                cog,
                speed_ms,
                cadence_rpm,
                ratio_error: difference,
                power_loss_w: 0.0,
            });
        }
    }

    best.unwrap_or_default()
}

/// Pick the best-fitting gear and attach its estimated power loss.
pub fn select_gear(
    speed_kmh: f64,
    cadence_rpm: f64,
    chainring: u32,
    cassette: &[u32],
    tire_circumference_mm: f64,
    losses: &PowerLossTable,
    zones: &TrainingZones,
) -> GearChoice {
    let mut choice = nearest_gear(speed_kmh, cadence_rpm, chainring, cassette, tire_circumference_mm);
    choice.power_loss_w = power_loss(&choice, choice.power_proxy(), losses, zones);
    choice
}
