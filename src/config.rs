//! Drivetrain configuration.
//!
//! Loaded from TOML; every field falls back to the stock road setup below.
//! `build` validates and turns the config into the keyed tables the
//! optimizer runs on.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chainring_optimizer::Drivetrain;
use crate::power_loss::{LossTableError, PowerLossEntry, PowerLossTable, TrainingZone, TrainingZones, ZoneError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no candidate chainrings configured")]
    NoCandidateChainrings,
    #[error("cassette is empty")]
    EmptyCassette,
    #[error("{0} contains a zero tooth count")]
    ZeroTeeth(&'static str),
    #[error("tire circumference must be positive and finite, got {0} mm")]
    InvalidTireCircumference(f64),
    #[error("reward weight must be finite, got {0}")]
    InvalidRewardWeight(f64),
    #[error(transparent)]
    LossTable(#[from] LossTableError),
    #[error(transparent)]
    Zones(#[from] ZoneError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    pub candidate_chainrings: Vec<u32>,
    pub cassette: Vec<u32>,
    pub tire_circumference_mm: f64,
    /// One entry per cassette position, in cassette order
    pub power_loss: Vec<PowerLossEntry>,
    pub training_zones: Vec<TrainingZone>,
    pub preferred_cogs: Vec<u32>,
    pub reward_weight: f64,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        DrivetrainConfig {
            candidate_chainrings: (30..=50).collect(),
            cassette: vec![11, 12, 13, 14, 15, 16, 17, 19, 21, 24, 27, 30],
            tire_circumference_mm: 2171.0,
            power_loss: vec![
                PowerLossEntry::new(1, 9.0, 1.5),
                PowerLossEntry::new(2, 8.2, 1.35),
                PowerLossEntry::new(3, 7.5, 1.2),
                PowerLossEntry::new(4, 7.0, 1.0),
                PowerLossEntry::new(5, 7.0, 1.0),
                PowerLossEntry::new(6, 7.0, 1.0),
                PowerLossEntry::new(7, 7.0, 1.0),
                PowerLossEntry::new(8, 7.0, 1.0),
                PowerLossEntry::new(9, 7.5, 1.0),
                PowerLossEntry::new(10, 8.0, 1.2),
                PowerLossEntry::new(11, 8.8, 1.35),
                PowerLossEntry::new(12, 9.0, 1.5),
            ],
            // Sweet Spot starts where Tempo ends
            training_zones: vec![
                TrainingZone::new("Active Recovery", 0.0, 174.0, 0.0),
                TrainingZone::new("Endurance", 174.0, 241.0, 0.5),
                TrainingZone::new("Tempo", 241.0, 286.0, 0.75),
                TrainingZone::new("Sweet Spot", 286.0, 333.0, 1.0),
                TrainingZone::new("VO2 max", 333.0, 381.0, 1.5),
                TrainingZone::new("Anaerobic capacity", 381.0, 477.0, 2.0),
                TrainingZone::new("Neuromuscular", 477.0, 2000.0, 3.0),
            ],
            preferred_cogs: vec![12, 13, 14, 15],
            reward_weight: 1.0,
        }
    }
}

impl DrivetrainConfig {
    /// Read, parse and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: DrivetrainConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.build().map(|_| ())
    }

    /// Validate and produce the optimizer's view of the drivetrain.
    pub fn build(&self) -> Result<Drivetrain, ConfigError> {
        if self.candidate_chainrings.is_empty() {
            return Err(ConfigError::NoCandidateChainrings);
        }
        if self.candidate_chainrings.contains(&0) {
            return Err(ConfigError::ZeroTeeth("candidate_chainrings"));
        }
        if self.cassette.is_empty() {
            return Err(ConfigError::EmptyCassette);
        }
        if self.cassette.contains(&0) {
            return Err(ConfigError::ZeroTeeth("cassette"));
        }
        if self.preferred_cogs.contains(&0) {
            return Err(ConfigError::ZeroTeeth("preferred_cogs"));
        }
        if !(self.tire_circumference_mm.is_finite() && self.tire_circumference_mm > 0.0) {
            return Err(ConfigError::InvalidTireCircumference(self.tire_circumference_mm));
        }
        if !self.reward_weight.is_finite() {
            return Err(ConfigError::InvalidRewardWeight(self.reward_weight));
        }

        let losses = PowerLossTable::from_positional(&self.cassette, &self.power_loss)?;
        let zones = TrainingZones::new(self.training_zones.clone());
        zones.validate()?;

        Ok(Drivetrain {
            candidate_chainrings: self.candidate_chainrings.clone(),
            cassette: self.cassette.clone(),
            tire_circumference_mm: self.tire_circumference_mm,
            losses,
            zones,
            preferred_cogs: self.preferred_cogs.iter().copied().collect::<BTreeSet<u32>>(),
            reward_weight: self.reward_weight,
        })
    }
}
