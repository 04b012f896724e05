//! Chainring recommendation from recorded GPX rides.
//!
//! Pipeline: [`track_reader`] decodes a ride, [`enrichment`] derives speed,
//! [`chainring_optimizer`] scores every candidate chainring through
//! [`gear_selector`] and [`power_loss`], and [`ride_processor`] reports.

pub mod chainring_optimizer;
pub mod config;
pub mod enrichment;
pub mod gear_selector;
pub mod geodesic;
pub mod power_loss;
pub mod ride_processor;
pub mod ride_summary;
pub mod track_reader;
