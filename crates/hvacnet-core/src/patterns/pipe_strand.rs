//! Pipe strands: unbranched runs of pipes, fittings and valves.

use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{BuildContext, set_pipe_geometry};
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{ElementKind, HvacError};
use std::collections::BTreeSet;

/// Kinds a strand may be made of.
pub(crate) const STRAND_KINDS: [ElementKind; 4] = [
    ElementKind::Pipe,
    ElementKind::PipeFitting,
    ElementKind::Valve,
    ElementKind::PipeStrand,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct PipeStrandMatcher;

impl Matcher for PipeStrandMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::PipeStrand
    }

    fn find_matches(&self, graph: &HvacGraph, _config: &ReductionConfig) -> Scan {
        let kinds = BTreeSet::from(STRAND_KINDS);
        Scan::from_matches(
            graph
                .get_type_chains(&kinds, false)
                .into_iter()
                .filter(|chain| chain.len() > 1)
                .map(|chain| Match::new(Pattern::PipeStrand, chain.into_iter().collect()))
                .collect(),
        )
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let mut attributes = Attributes::new();
        set_pipe_geometry(&mut attributes, ctx.members());
        Ok(Outcome::Ready(attributes))
    }
}
