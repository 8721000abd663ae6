//! Fittings and junctions joined only through pipes collapse into one
//! fitting.

use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{BuildContext, set_pipe_geometry};
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{ElementKind, HvacError};
use std::collections::BTreeSet;

const FITTING_KINDS: [ElementKind; 3] = [
    ElementKind::PipeFitting,
    ElementKind::Junction,
    ElementKind::AggregatedPipeFitting,
];

const CONNECTOR_KINDS: [ElementKind; 3] =
    [ElementKind::Pipe, ElementKind::PipeStrand, ElementKind::Valve];

#[derive(Debug, Clone, Copy, Default)]
pub struct PipeFittingMatcher;

impl Matcher for PipeFittingMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::AggregatedPipeFitting
    }

    fn find_matches(&self, graph: &HvacGraph, _config: &ReductionConfig) -> Scan {
        Scan::from_matches(
            graph
                .get_connections_between(
                    &BTreeSet::from(FITTING_KINDS),
                    &BTreeSet::from(CONNECTOR_KINDS),
                )
                .into_iter()
                .map(|nodes| Match::new(Pattern::AggregatedPipeFitting, nodes))
                .collect(),
        )
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let mut attributes = Attributes::new();
        set_pipe_geometry(&mut attributes, ctx.members());
        Ok(Outcome::Ready(attributes))
    }
}
