//! # Reduction Configuration
//!
//! Per-run tunables. Every field has a default from `primitives`, so a
//! configuration file only needs the keys it changes.

use crate::HvacError;
use crate::patterns::Pattern;
use crate::primitives::{
    MAX_ENUMERATED_CYCLES, PARALLEL_PUMP_POWER_THRESHOLD, UFH_MAX_KPI, UFH_MAX_SPACING_MM,
    UFH_MIN_AREA_MM2, UFH_MIN_ELEMENTS, UFH_MIN_KPI, UFH_MIN_SPACING_MM, UFH_MIN_Z_SHARE,
    UFH_RUN_TOLERANCE_MM, UFH_Z_TOLERANCE_MM,
};
use serde::{Deserialize, Serialize};

/// Filters applied to underfloor-heating candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnderfloorHeatingConfig {
    pub min_elements: usize,
    pub min_z_share: f64,
    pub z_tolerance_mm: f64,
    pub min_area_mm2: f64,
    pub min_spacing_mm: f64,
    pub max_spacing_mm: f64,
    pub run_tolerance_mm: f64,
    pub min_kpi: f64,
    pub max_kpi: f64,
}

impl Default for UnderfloorHeatingConfig {
    fn default() -> Self {
        Self {
            min_elements: UFH_MIN_ELEMENTS,
            min_z_share: UFH_MIN_Z_SHARE,
            z_tolerance_mm: UFH_Z_TOLERANCE_MM,
            min_area_mm2: UFH_MIN_AREA_MM2,
            min_spacing_mm: UFH_MIN_SPACING_MM,
            max_spacing_mm: UFH_MAX_SPACING_MM,
            run_tolerance_mm: UFH_RUN_TOLERANCE_MM,
            min_kpi: UFH_MIN_KPI,
            max_kpi: UFH_MAX_KPI,
        }
    }
}

/// Configuration of one reduction run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReductionConfig {
    /// Patterns in the order they are applied.
    pub order: Vec<Pattern>,
    pub underfloor_heating: UnderfloorHeatingConfig,
    /// Relative rated-power tolerance for grouping parallel pumps.
    pub parallel_pump_threshold: f64,
    /// Bound on simple cycles enumerated for generator detection.
    pub max_generator_cycles: usize,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            order: Pattern::DEFAULT_ORDER.to_vec(),
            underfloor_heating: UnderfloorHeatingConfig::default(),
            parallel_pump_threshold: PARALLEL_PUMP_POWER_THRESHOLD,
            max_generator_cycles: MAX_ENUMERATED_CYCLES,
        }
    }
}

impl ReductionConfig {
    /// Configuration applying only the given patterns, in order.
    #[must_use]
    pub fn with_order(order: impl IntoIterator<Item = Pattern>) -> Self {
        Self {
            order: order.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Reject values that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<(), HvacError> {
        let ufh = &self.underfloor_heating;
        if ufh.min_elements == 0 {
            return Err(HvacError::Config(
                "underfloor_heating.min_elements must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&ufh.min_z_share) {
            return Err(HvacError::Config(
                "underfloor_heating.min_z_share must lie in [0, 1]".into(),
            ));
        }
        if ufh.min_spacing_mm > ufh.max_spacing_mm {
            return Err(HvacError::Config(
                "underfloor_heating spacing window is empty".into(),
            ));
        }
        if ufh.min_kpi >= ufh.max_kpi {
            return Err(HvacError::Config(
                "underfloor_heating kpi window is empty".into(),
            ));
        }
        if ufh.z_tolerance_mm < 0.0 || ufh.run_tolerance_mm < 0.0 {
            return Err(HvacError::Config("tolerances must not be negative".into()));
        }
        if !(0.0..1.0).contains(&self.parallel_pump_threshold) {
            return Err(HvacError::Config(
                "parallel_pump_threshold must lie in [0, 1)".into(),
            ));
        }
        Ok(())
    }
}
