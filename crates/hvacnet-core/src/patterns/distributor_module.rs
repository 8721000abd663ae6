//! # Consumer Heating Distributor Module
//!
//! A distributor together with every consumer loop hanging off it.
//!
//! Each component left after removing the distributor is classified:
//! consumer loops hold an emitter (or a `Consumer` aggregate) and no
//! producer, generator sides hold a producer (as the consumer matcher
//! defines it), and anything else is an
//! undefined stub. Distributor ports facing undefined stubs come in
//! supply/return pairs; an odd count rejects the candidate.

use super::consumer::{WHITELIST, is_producer};
use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{self, BuildContext};
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{Attribute, ElementId, ElementKind, HvacError, Value};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Consumer,
    Generator,
    Undefined,
}

fn is_consumer_kind(kind: ElementKind) -> bool {
    WHITELIST.contains(&kind) || kind == ElementKind::Consumer
}

fn classify(graph: &HvacGraph, component: &BTreeSet<ElementId>) -> Side {
    let kinds: BTreeSet<ElementKind> = component.iter().filter_map(|id| graph.kind(*id)).collect();
    if kinds.iter().any(|k| is_producer(*k)) {
        Side::Generator
    } else if kinds.iter().any(|k| is_consumer_kind(*k)) {
        Side::Consumer
    } else {
        Side::Undefined
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DistributorModuleMatcher;

impl Matcher for DistributorModuleMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::ConsumerHeatingDistributorModule
    }

    fn find_matches(&self, graph: &HvacGraph, _config: &ReductionConfig) -> Scan {
        let topology = graph.topology();
        let mut matches = Vec::new();

        for distributor in graph.nodes_of_kinds(&BTreeSet::from([ElementKind::Distributor])) {
            let rest = topology.without(&BTreeSet::from([distributor]));
            let adjacent: BTreeSet<ElementId> = topology.neighbors(distributor).collect();

            let mut nodes = BTreeSet::from([distributor]);
            let mut undefined = BTreeSet::new();
            let mut consumers = 0usize;
            for component in rest.connected_components() {
                if component.is_disjoint(&adjacent) {
                    continue;
                }
                match classify(graph, &component) {
                    Side::Consumer => {
                        consumers += 1;
                        nodes.extend(component);
                    }
                    Side::Undefined => undefined.extend(component),
                    Side::Generator => {}
                }
            }
            if consumers == 0 {
                continue;
            }

            let undefined_ports = graph
                .contracted_ports(distributor)
                .iter()
                .filter(|port| {
                    graph
                        .partners(**port)
                        .filter_map(|p| graph.port(p))
                        .any(|p| undefined.contains(&p.parent))
                })
                .count();
            debug!(%distributor, consumers, undefined_ports, "distributor module candidate");

            let mut candidate = Match::new(Pattern::ConsumerHeatingDistributorModule, nodes);
            candidate.meta.undefined_ports = undefined_ports;
            matches.push(candidate);
        }

        Scan::from_matches(matches)
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let undefined = ctx.candidate.meta.undefined_ports;
        if undefined % 2 != 0 {
            return Err(HvacError::rejected(
                Pattern::ConsumerHeatingDistributorModule,
                format!("{} undefined consumer ports, expected pairs", undefined),
            ));
        }

        let consumers: Vec<_> = ctx
            .members()
            .filter(|e| is_consumer_kind(e.kind))
            .collect();
        let pumps: Vec<_> = ctx.members().filter(|e| e.kind.is_pump_like()).collect();

        let mut attributes = Attributes::new();
        attributes.set_quantity(
            Attribute::RatedPower,
            aggregate::sum(consumers.iter().copied(), Attribute::RatedPower),
        );
        attributes.set_quantity(
            Attribute::FlowTemperature,
            aggregate::mean(consumers.iter().copied(), Attribute::FlowTemperature),
        );
        attributes.set_quantity(
            Attribute::ReturnTemperature,
            aggregate::mean(consumers.iter().copied(), Attribute::ReturnTemperature),
        );
        attributes.set(Attribute::HasPump, Value::Flag(aggregate::has_pump(ctx.members())));
        attributes.set_quantity(
            Attribute::RatedPumpPower,
            aggregate::sum(pumps.iter().copied(), Attribute::RatedPower),
        );
        attributes.set(
            Attribute::UndefinedConsumerPorts,
            Value::Count(undefined as u64),
        );
        Ok(Outcome::Ready(attributes))
    }
}
