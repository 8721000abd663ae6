//! # Parallel Pumps
//!
//! Pumps of equal rated power on parallel branches between two common
//! boundary elements.
//!
//! A boundary with at most two connections away from the branches is
//! absorbed into the aggregate. A boundary that fans out further stays
//! outside: an `AggregatedPipeFitting` prelude collapses its branch-facing
//! ports into one port, and the aggregate groups the branch ends facing it
//! into one port as well, so the two meet on a single connection.

use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{self, BuildContext};
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::{HvacGraph, Parallels};
use crate::{Attribute, ElementId, ElementKind, HvacError, PortId, Value};
use std::collections::BTreeSet;
use tracing::debug;

/// Outward connections up to which a boundary is absorbed.
const MAX_ABSORBED_OUTWARD: usize = 2;

const INERT_KINDS: [ElementKind; 6] = [
    ElementKind::Pump,
    ElementKind::Pipe,
    ElementKind::PipeFitting,
    ElementKind::PipeStrand,
    ElementKind::Junction,
    ElementKind::AggregatedPipeFitting,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct ParallelPumpMatcher;

impl ParallelPumpMatcher {
    fn candidate(graph: &HvacGraph, parallels: &Parallels) -> Match {
        let branch_nodes: BTreeSet<ElementId> =
            parallels.branches.iter().flatten().copied().collect();
        let mut candidate = Match::new(Pattern::ParallelPump, branch_nodes.clone());

        for boundary in [parallels.boundaries.0, parallels.boundaries.1] {
            let mut facing = Vec::new();
            let mut branch_ends = Vec::new();
            let mut outward = 0usize;
            for port in graph.contracted_ports(boundary) {
                let mut faces_branch = false;
                for partner in graph.partners(*port) {
                    let Some(parent) = graph.port(partner).map(|p| p.parent) else {
                        continue;
                    };
                    if branch_nodes.contains(&parent) {
                        faces_branch = true;
                        branch_ends.push(partner);
                    } else {
                        outward += 1;
                    }
                }
                if faces_branch {
                    facing.push(*port);
                }
            }

            if outward <= MAX_ABSORBED_OUTWARD {
                candidate.nodes.insert(boundary);
                continue;
            }

            debug!(%boundary, outward, "boundary fans out, grouping its branch ports");
            let mut prelude = Match::new(Pattern::AggregatedPipeFitting, BTreeSet::from([boundary]));
            prelude.port_groups.push(facing);
            candidate.prelude.push(prelude);
            candidate.port_groups.push(dedup(branch_ends));
        }

        candidate
    }
}

fn dedup(mut ports: Vec<PortId>) -> Vec<PortId> {
    ports.sort_unstable();
    ports.dedup();
    ports
}

impl Matcher for ParallelPumpMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::ParallelPump
    }

    fn find_matches(&self, graph: &HvacGraph, config: &ReductionConfig) -> Scan {
        let wanted = BTreeSet::from([ElementKind::Pump]);
        let inert = BTreeSet::from(INERT_KINDS);
        Scan::from_matches(
            graph
                .get_parallels(
                    &wanted,
                    &inert,
                    Some(Attribute::RatedPower),
                    config.parallel_pump_threshold,
                )
                .iter()
                .map(|parallels| Self::candidate(graph, parallels))
                .collect(),
        )
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let pumps: Vec<_> = ctx.members().filter(|e| e.kind.is_pump_like()).collect();
        let mut attributes = Attributes::new();
        attributes.set_quantity(
            Attribute::RatedPower,
            aggregate::sum(pumps.iter().copied(), Attribute::RatedPower),
        );
        attributes.set_quantity(
            Attribute::RatedVolumeFlow,
            aggregate::sum(pumps.iter().copied(), Attribute::RatedVolumeFlow),
        );
        attributes.set_quantity(
            Attribute::RatedMassFlow,
            aggregate::sum(pumps.iter().copied(), Attribute::RatedMassFlow),
        );
        attributes.set_quantity(
            Attribute::RatedHeight,
            aggregate::max(pumps.iter().copied(), Attribute::RatedHeight),
        );
        attributes.set(Attribute::HasPump, Value::Flag(true));
        aggregate::set_pipe_geometry(&mut attributes, ctx.members());
        Ok(Outcome::Ready(attributes))
    }
}
