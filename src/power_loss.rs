//! Power-loss model: drivetrain loss tables and training-zone weighting.
//!
//! The loss of a chosen gear is `base_loss * bad_gear_factor * zone_coefficient`,
//! where the zone is the first half-open `[min, max)` band containing the
//! rider power. Power outside every band contributes no loss.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::gear_selector::GearChoice;

/// Mechanical loss for one cassette position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerLossEntry {
    /// 1-based cassette position
    pub gear: u32,
    pub base_loss_w: f64,
    pub bad_gear_factor: f64,
}

impl PowerLossEntry {
    pub fn new(gear: u32, base_loss_w: f64, bad_gear_factor: f64) -> Self {
        PowerLossEntry { gear, base_loss_w, bad_gear_factor }
    }

    pub fn penalised_loss_w(&self) -> f64 {
        self.base_loss_w * self.bad_gear_factor
    }

    fn is_valid(&self) -> bool {
        self.base_loss_w.is_finite()
            && self.base_loss_w >= 0.0
            && self.bad_gear_factor.is_finite()
            && self.bad_gear_factor >= 0.0
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum LossTableError {
    #[error("power-loss table has {entries} entries but the cassette has {cogs} cogs")]
    LengthMismatch { cogs: usize, entries: usize },
    #[error("cog with {0} teeth appears more than once in the cassette")]
    DuplicateCog(u32),
    #[error("entry {position} is labelled gear {gear}")]
    GearOutOfPlace { position: u32, gear: u32 },
    #[error("gear {gear} needs a finite, non-negative loss (base {base_loss_w} W, factor {bad_gear_factor})")]
    InvalidEntry {
        gear: u32,
        base_loss_w: f64,
        bad_gear_factor: f64,
    },
}

/// Loss entries keyed by cog tooth count.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PowerLossTable {
    by_cog: BTreeMap<u32, PowerLossEntry>,
}

impl PowerLossTable {
    /// Key a positional table (one entry per cassette position) by cog teeth.
    pub fn from_positional(
        cassette: &[u32],
        entries: &[PowerLossEntry],
    ) -> Result<Self, LossTableError> {
        if cassette.len() != entries.len() {
            return Err(LossTableError::LengthMismatch {
                cogs: cassette.len(),
                entries: entries.len(),
            });
        }

        let mut by_cog = BTreeMap::new();
        for (position, (&cog, entry)) in (1u32..).zip(cassette.iter().zip(entries)) {
            if entry.gear != position {
                return Err(LossTableError::GearOutOfPlace { position, gear: entry.gear });
            }
            if !entry.is_valid() {
                return Err(LossTableError::InvalidEntry {
                    gear: entry.gear,
                    base_loss_w: entry.base_loss_w,
                    bad_gear_factor: entry.bad_gear_factor,
                });
            }
            if by_cog.insert(cog, *entry).is_some() {
                return Err(LossTableError::DuplicateCog(cog));
            }
        }

        Ok(PowerLossTable { by_cog })
    }

    pub fn entry(&self, cog: u32) -> Option<&PowerLossEntry> {
        self.by_cog.get(&cog)
    }

    pub fn len(&self) -> usize {
        self.by_cog.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_cog.is_empty()
    }
}

/// A power band `[min_w, max_w)` and its loss coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingZone {
    pub name: String,
    pub min_w: f64,
    pub max_w: f64,
    pub coefficient: f64,
}

impl TrainingZone {
    pub fn new(name: &str, min_w: f64, max_w: f64, coefficient: f64) -> Self {
        TrainingZone {
            name: name.to_string(),
            min_w,
            max_w,
            coefficient,
        }
    }

    pub fn contains(&self, power_w: f64) -> bool {
        power_w >= self.min_w && power_w < self.max_w
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum ZoneError {
    #[error("no training zones configured")]
    Empty,
    #[error("zone '{name}' has an empty or non-finite range [{min_w}, {max_w})")]
    InvalidRange { name: String, min_w: f64, max_w: f64 },
    #[error("zone '{name}' has a non-finite coefficient")]
    InvalidCoefficient { name: String },
    #[error("zone '{next}' starts at {next_min_w} W but '{previous}' ends at {previous_max_w} W")]
    NotContiguous {
        previous: String,
        previous_max_w: f64,
        next: String,
        next_min_w: f64,
    },
}

/// Ordered training zones, scanned first-match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingZones {
    zones: Vec<TrainingZone>,
}

impl TrainingZones {
    /// Wrap zones as given. See [`TrainingZones::validate`] for the coverage check.
    pub fn new(zones: Vec<TrainingZone>) -> Self {
        TrainingZones { zones }
    }

    /// Every band must be non-empty and start exactly where the previous one ends.
    pub fn validate(&self) -> Result<(), ZoneError> {
        if self.zones.is_empty() {
            return Err(ZoneError::Empty);
        }

        for zone in &self.zones {
            if !zone.min_w.is_finite() || !zone.max_w.is_finite() || zone.min_w >= zone.max_w {
                return Err(ZoneError::InvalidRange {
                    name: zone.name.clone(),
                    min_w: zone.min_w,
                    max_w: zone.max_w,
                });
            }
            if !zone.coefficient.is_finite() {
                return Err(ZoneError::InvalidCoefficient { name: zone.name.clone() });
            }
        }

        for pair in self.zones.windows(2) {
            if pair[1].min_w != pair[0].max_w {
                return Err(ZoneError::NotContiguous {
                    previous: pair[0].name.clone(),
                    previous_max_w: pair[0].max_w,
                    next: pair[1].name.clone(),
                    next_min_w: pair[1].min_w,
                });
            }
        }

        Ok(())
    }

    pub fn zone_for(&self, power_w: f64) -> Option<&TrainingZone> {
        self.zones.iter().find(|zone| zone.contains(power_w))
    }

    /// Coefficient of the first matching zone, 0.0 when none matches.
    pub fn coefficient_for(&self, power_w: f64) -> f64 {
        self.zone_for(power_w).map_or(0.0, |zone| zone.coefficient)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainingZone> {
        self.zones.iter()
    }
}

/// Estimated drivetrain loss in watts for `choice` at `power_w`.
///
/// A choice whose cog has no table entry (including the "no gear found"
/// choice) costs nothing. NaN power always yields 0.
pub fn power_loss(
    choice: &GearChoice,
    power_w: f64,
    table: &PowerLossTable,
    zones: &TrainingZones,
) -> f64 {
    let base = table
        .entry(choice.cog)
        .map_or(0.0, PowerLossEntry::penalised_loss_w);
    let coefficient = zones.coefficient_for(power_w);
    let loss = base * coefficient;

    if power_w.is_nan() {
        return 0.0;
    }
    loss
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> PowerLossTable {
        PowerLossTable::from_positional(
            &[12, 13, 14],
            &[
                PowerLossEntry::new(1, 8.2, 1.35),
                PowerLossEntry::new(2, 7.5, 1.2),
                PowerLossEntry::new(3, 7.0, 1.0),
            ],
        )
        .unwrap()
    }

    fn zones() -> TrainingZones {
        TrainingZones::new(vec![
            TrainingZone::new("Recovery", 100.0, 200.0, 0.5),
            TrainingZone::new("Tempo", 200.0, 300.0, 1.0),
            TrainingZone::new("Threshold", 300.0, 400.0, 2.0),
        ])
    }

    fn choice(cog: u32) -> GearChoice {
        GearChoice {
            gear_number: 2,
            chainring: 34,
            cog,
            ..GearChoice::default()
        }
    }

    #[test]
    fn test_loss_in_zone() {
        let loss = power_loss(&choice(13), 250.0, &table(), &zones());
        assert!((loss - 7.5 * 1.2 * 1.0).abs() < 1e-12);

        let loss = power_loss(&choice(12), 350.0, &table(), &zones());
        assert!((loss - 8.2 * 1.35 * 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_nan_power_is_zero() {
        assert_eq!(power_loss(&choice(13), f64::NAN, &table(), &zones()), 0.0);
    }

    #[test]
    fn test_below_lowest_zone_is_zero() {
        assert_eq!(zones().coefficient_for(50.0), 0.0);
        assert_eq!(power_loss(&choice(13), 50.0, &table(), &zones()), 0.0);
    }

    #[test]
    fn test_zone_bounds_are_half_open() {
        let zones = zones();
        assert_eq!(zones.coefficient_for(200.0), 1.0);
        assert_eq!(zones.coefficient_for(199.999), 0.5);
        assert_eq!(zones.coefficient_for(400.0), 0.0);
    }

    #[test]
    fn test_first_match_wins_on_overlap() {
        let zones = TrainingZones::new(vec![
            TrainingZone::new("A", 0.0, 300.0, 1.0),
            TrainingZone::new("B", 250.0, 400.0, 3.0),
        ]);
        assert_eq!(zones.coefficient_for(275.0), 1.0);
        assert!(matches!(zones.validate(), Err(ZoneError::NotContiguous { .. })));
    }

    #[test]
    fn test_no_gear_costs_nothing() {
        let none = GearChoice::default();
        assert_eq!(power_loss(&none, 250.0, &table(), &zones()), 0.0);
    }

    #[test]
    fn test_positional_table_must_match_cassette() {
        let err = PowerLossTable::from_positional(&[12, 13], &[PowerLossEntry::new(1, 7.0, 1.0)]);
        assert_eq!(err, Err(LossTableError::LengthMismatch { cogs: 2, entries: 1 }));

        let dup = PowerLossTable::from_positional(
            &[13, 13],
            &[PowerLossEntry::new(1, 7.0, 1.0), PowerLossEntry::new(2, 7.0, 1.0)],
        );
        assert_eq!(dup, Err(LossTableError::DuplicateCog(13)));
    }

    #[test]
    fn test_gear_labels_follow_cassette_order() {
        let swapped = PowerLossTable::from_positional(
            &[12, 13],
            &[PowerLossEntry::new(2, 7.0, 1.0), PowerLossEntry::new(1, 7.0, 1.0)],
        );
        assert_eq!(swapped, Err(LossTableError::GearOutOfPlace { position: 1, gear: 2 }));
    }

    #[test]
    fn test_non_finite_or_negative_loss_rejected() {
        for (base, factor) in [(f64::INFINITY, 1.0), (-1.0, 1.0), (7.0, -0.5), (7.0, f64::INFINITY)] {
            let result = PowerLossTable::from_positional(
                &[12, 13],
                &[PowerLossEntry::new(1, 7.0, 1.0), PowerLossEntry::new(2, base, factor)],
            );
            assert!(
                matches!(result, Err(LossTableError::InvalidEntry { gear: 2, .. })),
                "base {} factor {} accepted",
                base,
                factor
            );
        }

        // NaN never compares equal, so match on the variant alone
        let nan = PowerLossTable::from_positional(&[12], &[PowerLossEntry::new(1, f64::NAN, 1.0)]);
        assert!(matches!(nan, Err(LossTableError::InvalidEntry { gear: 1, .. })));

        let free = PowerLossTable::from_positional(&[12], &[PowerLossEntry::new(1, 0.0, 0.0)]);
        assert!(free.is_ok());
    }

    #[test]
    fn test_table_keyed_by_cog() {
        let table = table();
        assert_eq!(table.len(), 3);
        assert_eq!(table.entry(14).map(|e| e.gear), Some(3));
        assert!(table.entry(11).is_none());
    }

    #[test]
    fn test_zone_validation() {
        assert!(zones().validate().is_ok());
        assert_eq!(TrainingZones::default().validate(), Err(ZoneError::Empty));

        let gap = TrainingZones::new(vec![
            TrainingZone::new("A", 0.0, 100.0, 1.0),
            TrainingZone::new("B", 120.0, 200.0, 1.0),
        ]);
        assert!(matches!(gap.validate(), Err(ZoneError::NotContiguous { .. })));

        let inverted = TrainingZones::new(vec![TrainingZone::new("A", 100.0, 100.0, 1.0)]);
        assert!(matches!(inverted.validate(), Err(ZoneError::InvalidRange { .. })));
    }
}
