//! # Generator With One Fluid
//!
//! A boiler or CHP together with the hydraulic loop that connects it to a
//! distributor.
//!
//! Candidate loops are simple cycles through a generator that also pass a
//! boarder element (distributor or distributor module). Each candidate is
//! cleaned of every node that another candidate also uses and of the
//! boarder itself, then cut down to the component around its generator.
//! Cycle nodes that end up in no cleaned loop are non-relevant; a
//! generator cycle that leaves a loop only through non-relevant nodes is a
//! bypass, and those nodes are folded back into the loop.

use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{self, BuildContext};
use crate::config::ReductionConfig;
use crate::decision::{Answer, DecisionRequest, Outcome};
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{Attribute, ElementId, ElementKind, HvacError, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const WANTED: [ElementKind; 2] = [ElementKind::Boiler, ElementKind::Chp];

const INERT: [ElementKind; 9] = [
    ElementKind::Pipe,
    ElementKind::PipeFitting,
    ElementKind::Junction,
    ElementKind::Valve,
    ElementKind::ThreeWayValve,
    ElementKind::Pump,
    ElementKind::PipeStrand,
    ElementKind::ParallelPump,
    ElementKind::AggregatedPipeFitting,
];

const BOARDER: [ElementKind; 2] = [
    ElementKind::Distributor,
    ElementKind::ConsumerHeatingDistributorModule,
];

#[derive(Debug, Clone, Copy, Default)]
pub struct GeneratorMatcher;

impl Matcher for GeneratorMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::GeneratorOneFluid
    }

    fn find_matches(&self, graph: &HvacGraph, config: &ReductionConfig) -> Scan {
        let wanted = BTreeSet::from(WANTED);
        let boarder_kinds = BTreeSet::from(BOARDER);
        let passable: BTreeSet<ElementKind> = INERT.into_iter().chain(BOARDER).collect();

        let topology = graph.remove_not_wanted_nodes(&wanted, &passable);
        let limit = config.max_generator_cycles;
        let cycles: Vec<BTreeSet<ElementId>> = graph
            .get_all_cycles_with_wanted(&topology, &wanted, limit)
            .into_iter()
            .map(|cycle| cycle.into_iter().collect())
            .collect();
        if cycles.len() >= limit {
            warn!(limit, "generator cycle enumeration truncated");
        }

        let generators = graph.nodes_of_kinds(&wanted);
        let boarders = graph.nodes_of_kinds(&boarder_kinds);
        let candidates: Vec<&BTreeSet<ElementId>> = cycles
            .iter()
            .filter(|cycle| !cycle.is_disjoint(&boarders))
            .collect();

        let mut cleaned: Vec<BTreeSet<ElementId>> = Vec::new();
        for (i, cycle) in candidates.iter().enumerate() {
            let mut own: BTreeSet<ElementId> = cycle.difference(&boarders).copied().collect();
            for (j, other) in candidates.iter().enumerate() {
                if i != j {
                    own.retain(|id| !other.contains(id));
                }
            }
            let Some(root) = own.iter().copied().find(|id| generators.contains(id)) else {
                continue;
            };
            let Some(component) = topology
                .induced(&own)
                .connected_components()
                .into_iter()
                .find(|c| c.contains(&root))
            else {
                continue;
            };
            if !cleaned.contains(&component) {
                cleaned.push(component);
            }
        }

        let in_cleaned: BTreeSet<ElementId> = cleaned.iter().flatten().copied().collect();
        let non_relevant: BTreeSet<ElementId> = cycles
            .iter()
            .flatten()
            .copied()
            .filter(|id| !in_cleaned.contains(id) && !boarders.contains(id))
            .collect();

        let mut claimed = BTreeSet::new();
        let mut matches = Vec::new();
        for nodes in cleaned {
            let mut bypass = BTreeSet::new();
            for cycle in &cycles {
                if cycle.is_disjoint(&nodes) {
                    continue;
                }
                let outside: BTreeSet<ElementId> = cycle.difference(&nodes).copied().collect();
                if !outside.is_empty()
                    && outside.is_subset(&non_relevant)
                    && outside.is_disjoint(&claimed)
                {
                    bypass.extend(outside);
                }
            }
            claimed.extend(bypass.iter().copied());
            debug!(elements = nodes.len(), bypass = bypass.len(), "generator loop");

            let mut candidate = Match::new(Pattern::GeneratorOneFluid, &nodes | &bypass);
            candidate.meta.bypass = bypass;
            matches.push(candidate);
        }

        Scan::from_matches(matches)
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let has_bypass = if !ctx.candidate.meta.bypass.is_empty() {
            true
        } else if ctx.members().any(|e| e.kind == ElementKind::ThreeWayValve) {
            let request = DecisionRequest::boolean(
                ctx.decision_key("has_bypass"),
                format!(
                    "Generator loop {} contains a three-way valve but no bypass was found. Does it have a bypass?",
                    ctx.guid
                ),
            )
            .with_default(Answer::Bool(false));
            match ctx.book.ask_bool(request) {
                Outcome::Ready(answer) => answer,
                Outcome::Pending(requests) => return Ok(Outcome::Pending(requests)),
            }
        } else {
            false
        };

        let generators: Vec<_> = ctx.members().filter(|e| e.kind.is_generator()).collect();
        let pumps: Vec<_> = ctx.members().filter(|e| e.kind.is_pump_like()).collect();

        let mut attributes = Attributes::new();
        attributes.set_quantity(
            Attribute::RatedPower,
            aggregate::sum(generators.iter().copied(), Attribute::RatedPower),
        );
        attributes.set_quantity(
            Attribute::FlowTemperature,
            aggregate::mean(generators.iter().copied(), Attribute::FlowTemperature),
        );
        attributes.set_quantity(
            Attribute::ReturnTemperature,
            aggregate::mean(generators.iter().copied(), Attribute::ReturnTemperature),
        );
        attributes.set(Attribute::HasPump, Value::Flag(aggregate::has_pump(ctx.members())));
        attributes.set_quantity(
            Attribute::RatedPumpPower,
            aggregate::sum(pumps.iter().copied(), Attribute::RatedPower),
        );
        attributes.set_quantity(
            Attribute::RatedHeight,
            aggregate::max(pumps.iter().copied(), Attribute::RatedHeight),
        );
        attributes.set(Attribute::HasBypass, Value::Flag(has_bypass));
        Ok(Outcome::Ready(attributes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Network;

    /// dist - flow - t1, two boilers in parallel between t1 and t2,
    /// t2 - back - dist.
    fn parallel_boilers() -> (HvacGraph, [ElementId; 2], [ElementId; 2]) {
        let mut net = Network::new();
        let dist = net.add_element("dist", ElementKind::Distributor, 2).expect("add");
        let flow = net.add_element("flow", ElementKind::Pipe, 2).expect("add");
        let t1 = net.add_element("t1", ElementKind::Junction, 3).expect("add");
        let b1 = net.add_element("b1", ElementKind::Boiler, 2).expect("add");
        let b2 = net.add_element("b2", ElementKind::Boiler, 2).expect("add");
        let t2 = net.add_element("t2", ElementKind::Junction, 3).expect("add");
        let back = net.add_element("back", ElementKind::Pipe, 2).expect("add");
        net.chain(&[dist, flow, t1, b1, t2, back, dist]).expect("chain");
        net.chain(&[t1, b2, t2]).expect("chain");
        (HvacGraph::build(net).expect("build"), [b1, b2], [t1, t2])
    }

    #[test]
    fn overlapping_loops_keep_only_their_own_nodes() {
        let (graph, [b1, b2], [t1, t2]) = parallel_boilers();
        let scan = GeneratorMatcher.find_matches(&graph, &ReductionConfig::default());
        assert_eq!(scan.matches.len(), 2);
        let nodes: BTreeSet<_> = scan.matches.iter().map(|m| m.nodes.clone()).collect();
        assert_eq!(nodes, BTreeSet::from([BTreeSet::from([b1]), BTreeSet::from([b2])]));
        for m in &scan.matches {
            assert!(m.meta.bypass.is_empty());
            assert!(!m.nodes.contains(&t1) && !m.nodes.contains(&t2));
        }
    }

    #[test]
    fn loop_without_distributor_is_ignored() {
        let mut net = Network::new();
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let flow = net.add_element("flow", ElementKind::Pipe, 2).expect("add");
        let back = net.add_element("back", ElementKind::Pipe, 2).expect("add");
        net.chain(&[boiler, flow, back, boiler]).expect("chain");
        let graph = HvacGraph::build(net).expect("build");

        let scan = GeneratorMatcher.find_matches(&graph, &ReductionConfig::default());
        assert!(scan.matches.is_empty());
    }

    #[test]
    fn single_loop_takes_everything_but_the_distributor() {
        let mut net = Network::new();
        let dist = net.add_element("dist", ElementKind::Distributor, 2).expect("add");
        let flow = net.add_element("flow", ElementKind::Pipe, 2).expect("add");
        let chp = net.add_element("chp", ElementKind::Chp, 2).expect("add");
        let back = net.add_element("back", ElementKind::Pipe, 2).expect("add");
        net.chain(&[dist, flow, chp, back, dist]).expect("chain");
        let graph = HvacGraph::build(net).expect("build");

        let scan = GeneratorMatcher.find_matches(&graph, &ReductionConfig::default());
        assert_eq!(scan.matches.len(), 1);
        assert_eq!(scan.matches[0].nodes, BTreeSet::from([flow, chp, back]));
    }
}
