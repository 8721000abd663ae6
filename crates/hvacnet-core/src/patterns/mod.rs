//! # Pattern Matchers
//!
//! One matcher per aggregate family. A matcher only reads the graph: it
//! returns candidate node sets plus whatever construction hints the
//! aggregate builder needs, and it computes the attributes of an aggregate
//! once the builder has fixed its members.
//!
//! The `Reducer` looks matchers up through [`matcher`]; no matcher holds
//! state, so they are plain unit structs behind `&'static dyn Matcher`.

mod consumer;
mod distributor_module;
mod generator;
mod parallel_pump;
mod pipe_fitting;
mod pipe_strand;
mod underfloor_heating;

pub use consumer::ConsumerMatcher;
pub use distributor_module::DistributorModuleMatcher;
pub use generator::GeneratorMatcher;
pub use parallel_pump::ParallelPumpMatcher;
pub use pipe_fitting::PipeFittingMatcher;
pub use pipe_strand::PipeStrandMatcher;
pub use underfloor_heating::{UnderfloorSurvey, UnderfloorHeatingMatcher};

use crate::aggregate::BuildContext;
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{ElementId, ElementKind, HvacError, PortId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

// =============================================================================
// PATTERN
// =============================================================================

/// The aggregate families the engine can detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pattern {
    UnderfloorHeating,
    Consumer,
    PipeStrand,
    ParallelPump,
    AggregatedPipeFitting,
    ConsumerHeatingDistributorModule,
    GeneratorOneFluid,
}

impl Pattern {
    /// Priority order of a reduction run. Specialised patterns come before
    /// the pipe-strand catch-all so they are not pre-empted by it.
    /// `AggregatedPipeFitting` runs as a helper of `ParallelPump` and is
    /// only applied on its own when configured.
    pub const DEFAULT_ORDER: [Pattern; 6] = [
        Self::UnderfloorHeating,
        Self::Consumer,
        Self::PipeStrand,
        Self::ParallelPump,
        Self::ConsumerHeatingDistributorModule,
        Self::GeneratorOneFluid,
    ];

    /// The kind of the aggregate this pattern produces.
    #[must_use]
    pub fn kind(self) -> ElementKind {
        match self {
            Self::UnderfloorHeating => ElementKind::UnderfloorHeating,
            Self::Consumer => ElementKind::Consumer,
            Self::PipeStrand => ElementKind::PipeStrand,
            Self::ParallelPump => ElementKind::ParallelPump,
            Self::AggregatedPipeFitting => ElementKind::AggregatedPipeFitting,
            Self::ConsumerHeatingDistributorModule => {
                ElementKind::ConsumerHeatingDistributorModule
            }
            Self::GeneratorOneFluid => ElementKind::GeneratorOneFluid,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        self.kind().ifc_classification()
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// MATCHES
// =============================================================================

/// Pattern-specific construction hints.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchMeta {
    /// Generator bypass elements folded into the match.
    pub bypass: BTreeSet<ElementId>,
    /// Distributor ports that face neither consumers nor generators.
    pub undefined_ports: usize,
}

/// A candidate aggregate found by a matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    pub pattern: Pattern,
    /// Elements to absorb.
    pub nodes: BTreeSet<ElementId>,
    /// Member ports that must collapse onto one aggregation port each.
    /// Every other crossing port gets its own aggregation port.
    pub port_groups: Vec<Vec<PortId>>,
    pub meta: MatchMeta,
    /// Helper aggregates merged right before this one.
    pub prelude: Vec<Match>,
}

impl Match {
    #[must_use]
    pub fn new(pattern: Pattern, nodes: BTreeSet<ElementId>) -> Self {
        Self {
            pattern,
            nodes,
            port_groups: Vec::new(),
            meta: MatchMeta::default(),
            prelude: Vec::new(),
        }
    }
}

/// A component a matcher deliberately left alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub nodes: BTreeSet<ElementId>,
    pub reason: String,
}

/// Result of one matcher scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Scan {
    pub matches: Vec<Match>,
    pub skipped: Vec<Skipped>,
}

impl Scan {
    #[must_use]
    pub fn from_matches(matches: Vec<Match>) -> Self {
        Self {
            matches,
            skipped: Vec::new(),
        }
    }
}

// =============================================================================
// MATCHER TRAIT
// =============================================================================

/// A detector for one aggregate family.
pub trait Matcher: Sync {
    fn pattern(&self) -> Pattern;

    /// Scan the current graph for candidates. Never mutates.
    fn find_matches(&self, graph: &HvacGraph, config: &ReductionConfig) -> Scan;

    /// Compute the aggregate's attributes from its members.
    ///
    /// May suspend on a decision, or reject the candidate with a
    /// `MatchConstruction` error.
    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError>;
}

static UNDERFLOOR_HEATING: UnderfloorHeatingMatcher = UnderfloorHeatingMatcher;
static CONSUMER: ConsumerMatcher = ConsumerMatcher;
static PIPE_STRAND: PipeStrandMatcher = PipeStrandMatcher;
static PARALLEL_PUMP: ParallelPumpMatcher = ParallelPumpMatcher;
static PIPE_FITTING: PipeFittingMatcher = PipeFittingMatcher;
static DISTRIBUTOR_MODULE: DistributorModuleMatcher = DistributorModuleMatcher;
static GENERATOR: GeneratorMatcher = GeneratorMatcher;

/// The matcher responsible for `pattern`.
#[must_use]
pub fn matcher(pattern: Pattern) -> &'static dyn Matcher {
    match pattern {
        Pattern::UnderfloorHeating => &UNDERFLOOR_HEATING,
        Pattern::Consumer => &CONSUMER,
        Pattern::PipeStrand => &PIPE_STRAND,
        Pattern::ParallelPump => &PARALLEL_PUMP,
        Pattern::AggregatedPipeFitting => &PIPE_FITTING,
        Pattern::ConsumerHeatingDistributorModule => &DISTRIBUTOR_MODULE,
        Pattern::GeneratorOneFluid => &GENERATOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_pattern_has_its_matcher() {
        for pattern in Pattern::DEFAULT_ORDER
            .into_iter()
            .chain([Pattern::AggregatedPipeFitting])
        {
            assert_eq!(matcher(pattern).pattern(), pattern);
            assert!(pattern.kind().is_aggregate());
        }
    }

    #[test]
    fn display_uses_classification() {
        assert_eq!(Pattern::GeneratorOneFluid.to_string(), "GeneratorOneFluid");
        let json = serde_json::to_string(&Pattern::PipeStrand).expect("serialize");
        assert_eq!(json, "\"pipe_strand\"");
    }
}
