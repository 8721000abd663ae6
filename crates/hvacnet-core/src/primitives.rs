//! # Engine Primitives
//!
//! Compile-time defaults for the reduction engine. `ReductionConfig` starts
//! from these values; a configuration file may override them per run.
//!
//! Geometric limits are expressed in millimetres because IFC models are
//! usually authored in mm.

// =============================================================================
// UNDERFLOOR HEATING
// =============================================================================

/// Minimum number of elements in a chain before it is considered.
pub const UFH_MIN_ELEMENTS: usize = 20;

/// Share of port z-coordinates that must lie in the dominant plane.
pub const UFH_MIN_Z_SHARE: f64 = 0.8;

/// Two z-coordinates closer than this belong to the same plane.
pub const UFH_Z_TOLERANCE_MM: f64 = 1.0;

/// Minimum bounding-rectangle area (1 m²).
pub const UFH_MIN_AREA_MM2: f64 = 1.0e6;

/// Accepted pipe spacing window.
pub const UFH_MIN_SPACING_MM: f64 = 90.0;
pub const UFH_MAX_SPACING_MM: f64 = 210.0;

/// Open interval for `(total_length * avg_diameter) / heating_area`.
pub const UFH_MIN_KPI: f64 = 0.01;
pub const UFH_MAX_KPI: f64 = 0.09;

/// Two parallel pipe runs closer than this are the same run.
pub const UFH_RUN_TOLERANCE_MM: f64 = 1.0;

/// Pipe orientations within this many degrees share a direction.
pub const UFH_ANGLE_TOLERANCE_DEG: f64 = 5.0;

// =============================================================================
// PARALLEL PUMPS
// =============================================================================

/// Relative rated-power difference below which two pumps are equivalent.
pub const PARALLEL_PUMP_POWER_THRESHOLD: f64 = 0.05;

// =============================================================================
// COMPUTATIONAL BOUNDS
// =============================================================================

/// Maximum number of simple cycles enumerated for generator detection.
pub const MAX_ENUMERATED_CYCLES: usize = 10_000;

/// Maximum number of nodes on a single search path.
pub const MAX_PATH_LENGTH: usize = 1000;

/// Maximum number of resume attempts for one suspended aggregate.
pub const MAX_DECISION_ROUNDS: usize = 8;

// =============================================================================
// AGGREGATES
// =============================================================================

/// An aggregate must keep at least this many connections to the outside.
pub const MIN_EDGE_PORTS: usize = 2;
