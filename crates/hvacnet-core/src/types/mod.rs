//! # Core Type Definitions
//!
//! This module contains the core vocabulary of the reduction engine:
//! - Arena handles (`ElementId`, `PortId`) and external identity (`Guid`)
//! - Classification (`ElementKind`) and port flow direction (`FlowDirection`)
//! - Attribute keys and values (`Attribute`, `Value`)
//! - Error types (`HvacError`)
//!
//! ## Determinism Guarantees
//!
//! All identifiers implement `Ord` so they can key `BTreeMap`/`BTreeSet`.
//! Handles are allocated from monotonically increasing counters and are
//! never reused, so a removed node can never be confused with a new one.

use crate::patterns::Pattern;
use crate::quantity::{Dimension, Quantity};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// =============================================================================
// ARENA HANDLES & IDENTITY
// =============================================================================

/// Handle of an element (or aggregate) inside a graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub u64);

/// Handle of a port inside a graph arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Stable external identifier (IFC GlobalId or a synthetic one).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Guid(pub String);

impl Guid {
    /// Create a guid from any string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive a synthetic guid from a namespace and a set of member guids.
    ///
    /// The members are sorted first, so the result does not depend on the
    /// order in which a matcher discovered them.
    #[must_use]
    pub fn derive<'a>(namespace: &str, members: impl IntoIterator<Item = &'a Guid>) -> Self {
        let mut sorted: Vec<&str> = members.into_iter().map(Guid::as_str).collect();
        sorted.sort_unstable();

        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        for member in sorted {
            hasher.update(&[0]);
            hasher.update(member.as_bytes());
        }
        let hex = hasher.finalize().to_hex();
        Self(format!("{}-{}", namespace, &hex.as_str()[..22]))
    }

    /// Get the guid as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// FLOW DIRECTION
// =============================================================================

/// Directional classification of a port.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum FlowDirection {
    /// Medium leaves the element through this port.
    Source,
    /// Medium enters the element through this port.
    Sink,
    /// Direction not known.
    #[default]
    Unknown,
    /// Bidirectional port that imposes the direction on its partner.
    FlowMaster,
}

impl FlowDirection {
    /// The direction seen from the other side of a connection.
    #[must_use]
    pub fn opposite(self) -> Self {
        match self {
            Self::Source => Self::Sink,
            Self::Sink => Self::Source,
            other => other,
        }
    }

    /// Whether this is a definite source or sink.
    #[must_use]
    pub fn is_definite(self) -> bool {
        matches!(self, Self::Source | Self::Sink)
    }
}

// =============================================================================
// ELEMENT KIND
// =============================================================================

/// Classification of an HVAC element or aggregate.
///
/// Matchers query capabilities (`is_pump_like`, `is_fitting`, ...) instead
/// of inspecting concrete types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Pipe,
    PipeFitting,
    Junction,
    Valve,
    ThreeWayValve,
    Pump,
    SpaceHeater,
    ParallelSpaceHeater,
    Distributor,
    Boiler,
    Chiller,
    Chp,
    HeatPump,
    CoolingTower,
    Storage,
    // Aggregates
    PipeStrand,
    UnderfloorHeating,
    ParallelPump,
    AggregatedPipeFitting,
    Consumer,
    ConsumerHeatingDistributorModule,
    GeneratorOneFluid,
}

impl ElementKind {
    /// Every kind, base kinds first.
    pub const ALL: [ElementKind; 22] = [
        Self::Pipe,
        Self::PipeFitting,
        Self::Junction,
        Self::Valve,
        Self::ThreeWayValve,
        Self::Pump,
        Self::SpaceHeater,
        Self::ParallelSpaceHeater,
        Self::Distributor,
        Self::Boiler,
        Self::Chiller,
        Self::Chp,
        Self::HeatPump,
        Self::CoolingTower,
        Self::Storage,
        Self::PipeStrand,
        Self::UnderfloorHeating,
        Self::ParallelPump,
        Self::AggregatedPipeFitting,
        Self::Consumer,
        Self::ConsumerHeatingDistributorModule,
        Self::GeneratorOneFluid,
    ];

    /// The classification tag used by the loading collaborator.
    #[must_use]
    pub fn ifc_classification(self) -> &'static str {
        match self {
            Self::Pipe => "Pipe",
            Self::PipeFitting => "PipeFitting",
            Self::Junction => "Junction",
            Self::Valve => "Valve",
            Self::ThreeWayValve => "ThreeWayValve",
            Self::Pump => "Pump",
            Self::SpaceHeater => "SpaceHeater",
            Self::ParallelSpaceHeater => "ParallelSpaceHeater",
            Self::Distributor => "Distributor",
            Self::Boiler => "Boiler",
            Self::Chiller => "Chiller",
            Self::Chp => "CHP",
            Self::HeatPump => "HeatPump",
            Self::CoolingTower => "CoolingTower",
            Self::Storage => "Storage",
            Self::PipeStrand => "PipeStrand",
            Self::UnderfloorHeating => "UnderfloorHeating",
            Self::ParallelPump => "ParallelPump",
            Self::AggregatedPipeFitting => "AggregatedPipeFitting",
            Self::Consumer => "Consumer",
            Self::ConsumerHeatingDistributorModule => "ConsumerHeatingDistributorModule",
            Self::GeneratorOneFluid => "GeneratorOneFluid",
        }
    }

    /// Parse a classification tag (case-insensitive, `Ifc` prefix allowed).
    #[must_use]
    pub fn from_classification(tag: &str) -> Option<Self> {
        let tag = tag.strip_prefix("Ifc").unwrap_or(tag);
        Self::ALL
            .into_iter()
            .find(|kind| kind.ifc_classification().eq_ignore_ascii_case(tag))
    }

    /// Whether this kind is produced by aggregation.
    #[must_use]
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Self::PipeStrand
                | Self::UnderfloorHeating
                | Self::ParallelPump
                | Self::AggregatedPipeFitting
                | Self::Consumer
                | Self::ConsumerHeatingDistributorModule
                | Self::GeneratorOneFluid
        )
    }

    /// The base kind an element of this kind behaves as during export.
    #[must_use]
    pub fn behaves_as(self) -> Self {
        match self {
            Self::PipeStrand => Self::Pipe,
            Self::ParallelPump => Self::Pump,
            Self::AggregatedPipeFitting => Self::PipeFitting,
            other => other,
        }
    }

    /// Pumps and pump aggregates.
    #[must_use]
    pub fn is_pump_like(self) -> bool {
        matches!(self, Self::Pump | Self::ParallelPump)
    }

    /// Fittings and junctions, i.e. potential branching points.
    #[must_use]
    pub fn is_fitting(self) -> bool {
        matches!(
            self,
            Self::PipeFitting | Self::Junction | Self::AggregatedPipeFitting
        )
    }

    /// Kinds that carry a meaningful length and diameter.
    #[must_use]
    pub fn has_length(self) -> bool {
        matches!(self, Self::Pipe | Self::PipeStrand | Self::UnderfloorHeating)
    }

    /// Heat or cold producers.
    #[must_use]
    pub fn is_generator(self) -> bool {
        matches!(
            self,
            Self::Boiler
                | Self::Chiller
                | Self::Chp
                | Self::HeatPump
                | Self::CoolingTower
                | Self::GeneratorOneFluid
        )
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.ifc_classification())
    }
}

// =============================================================================
// ATTRIBUTES
// =============================================================================

/// Attribute key of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Attribute {
    Length,
    Diameter,
    RatedPower,
    RatedPumpPower,
    RatedVolumeFlow,
    RatedMassFlow,
    RatedHeight,
    FlowTemperature,
    ReturnTemperature,
    HeatingArea,
    XSpacing,
    YSpacing,
    HasPump,
    HasBypass,
    UndefinedConsumerPorts,
}

impl Attribute {
    /// Dimension of a quantity attribute, `None` for flags and counts.
    #[must_use]
    pub fn dimension(self) -> Option<Dimension> {
        match self {
            Self::Length | Self::Diameter | Self::RatedHeight | Self::XSpacing | Self::YSpacing => {
                Some(Dimension::Length)
            }
            Self::RatedPower | Self::RatedPumpPower => Some(Dimension::Power),
            Self::RatedVolumeFlow => Some(Dimension::VolumeRate),
            Self::RatedMassFlow => Some(Dimension::MassRate),
            Self::FlowTemperature | Self::ReturnTemperature => Some(Dimension::Temperature),
            Self::HeatingArea => Some(Dimension::Area),
            Self::HasPump | Self::HasBypass | Self::UndefinedConsumerPorts => None,
        }
    }

    /// Whether `value` has the shape this attribute stores.
    #[must_use]
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (Self::HasPump | Self::HasBypass, Value::Flag(_)) => true,
            (Self::UndefinedConsumerPorts, Value::Count(_)) => true,
            (_, Value::Quantity(q)) => self.dimension() == Some(q.dimension()),
            _ => false,
        }
    }
}

/// Attribute value: a dimensioned quantity, a flag or a count.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Flag(bool),
    Count(u64),
    Quantity(Quantity),
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur while loading or reducing a network.
///
/// - No silent failures
/// - Use `Result<T, HvacError>` for fallible operations
/// - `is_recoverable()` separates candidate-local failures from fatal ones
#[derive(Debug, Error)]
pub enum HvacError {
    /// A candidate match could not be turned into an aggregate.
    #[error("{pattern} candidate rejected: {reason}")]
    MatchConstruction { pattern: Pattern, reason: String },

    /// A structural invariant of the graph was violated.
    #[error("Graph invariant violated: {0}")]
    GraphInvariant(String),

    /// The decision handler cancelled a question.
    #[error("Decision cancelled: {key}")]
    DecisionCancelled { key: String },

    /// An answer failed the validation of its question.
    #[error("Invalid answer for {key}: {reason}")]
    InvalidAnswer { key: String, reason: String },

    /// The input network is malformed.
    #[error("Invalid network: {0}")]
    InvalidNetwork(String),

    /// The requested element was not found.
    #[error("Element not found: {0}")]
    ElementNotFound(ElementId),

    /// The requested port was not found.
    #[error("Port not found: {0}")]
    PortNotFound(PortId),

    /// The configuration is invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),
}

impl HvacError {
    /// Shorthand for a candidate-local construction failure.
    pub fn rejected(pattern: Pattern, reason: impl Into<String>) -> Self {
        Self::MatchConstruction {
            pattern,
            reason: reason.into(),
        }
    }

    /// Whether the orchestrator may drop the candidate and continue.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MatchConstruction { .. })
    }
}

// =============================================================================
// TESTS
// =============================================================================
