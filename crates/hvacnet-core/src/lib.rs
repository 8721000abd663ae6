//! # hvacnet-core
//!
//! The deterministic reduction engine for HVAC connectivity graphs.
//!
//! A loaded network of classified elements (pipes, fittings, pumps,
//! emitters, distributors, generators) is reduced to a compact graph of
//! aggregates: pipe strands, underfloor heating circuits, parallel pumps,
//! consumers, distributor modules and generator loops. The reduced graph
//! is what the simulation code generator consumes.
//!
//! ## Architectural Constraints
//!
//! - Deterministic: `BTreeMap`/`BTreeSet` only, synthetic guids derived
//!   from member guids, answers replayable by stable key
//! - Single-threaded: matchers only read, the `Reducer` alone merges
//! - Closed: external input enters only through `DecisionHandler`
//! - No async, no network, no process-wide mutable state

// =============================================================================
// MODULES
// =============================================================================

pub mod aggregate;
pub mod config;
pub mod decision;
pub mod element;
pub mod export;
pub mod formats;
pub mod graph;
pub mod patterns;
pub mod primitives;
pub mod quantity;
pub mod reducer;
pub mod system;
pub mod topology;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    Attribute, ElementId, ElementKind, FlowDirection, Guid, HvacError, PortId, Value,
};

// =============================================================================
// RE-EXPORTS: Reduction Engine
// =============================================================================

pub use aggregate::{AggregatePlan, BuildContext, PlannedPort};
pub use config::{ReductionConfig, UnderfloorHeatingConfig};
pub use decision::{
    Answer, DecisionBook, DecisionHandler, DecisionRequest, DefaultsHandler, Outcome,
    ReplayHandler, Validation,
};
pub use element::{Attributes, Element, Network, Port};
pub use export::{
    CanonicalHeader, CanonicalNetwork, canonical_checksum, export_canonical, import_canonical,
};
pub use graph::{HvacGraph, Parallels};
pub use patterns::{Match, Matcher, Pattern, Scan, matcher};
pub use quantity::{Dimension, Quantity};
pub use reducer::Reducer;
pub use topology::Topology;

// =============================================================================
// RE-EXPORTS: Formats & System
// =============================================================================

pub use formats::{AttributeRecord, ElementRecord, NetworkDocument, PortRecord, QuantityRecord};
pub use system::{NetworkMetrics, PatternStats, ReductionReport};
