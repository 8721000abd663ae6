//! # Consumers
//!
//! With every distributor removed, a connected component that holds a heat
//! emitter and no heat producer becomes a `Consumer`.
//!
//! Components holding both emitters and producers are not merged. They
//! are reported as skipped so the run summary can count them.

use super::{Match, Matcher, Pattern, Scan, Skipped};
use crate::aggregate::{self, BuildContext};
use crate::config::ReductionConfig;
use crate::decision::Outcome;
use crate::element::Attributes;
use crate::graph::HvacGraph;
use crate::{Attribute, ElementKind, HvacError, Value};
use std::collections::BTreeSet;
use tracing::warn;

/// Heat emitters.
pub(crate) const WHITELIST: [ElementKind; 3] = [
    ElementKind::SpaceHeater,
    ElementKind::ParallelSpaceHeater,
    ElementKind::UnderfloorHeating,
];

/// Producers that keep a component from being a consumer.
const BLACKLIST: [ElementKind; 3] = [
    ElementKind::Chiller,
    ElementKind::Boiler,
    ElementKind::CoolingTower,
];

/// A blacklisted producer, or a generator loop already aggregated.
///
/// Shared with the distributor module so both matchers agree on which
/// side of a distributor is a generator.
pub(crate) fn is_producer(kind: ElementKind) -> bool {
    BLACKLIST.contains(&kind) || kind == ElementKind::GeneratorOneFluid
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConsumerMatcher;

impl Matcher for ConsumerMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::Consumer
    }

    fn find_matches(&self, graph: &HvacGraph, _config: &ReductionConfig) -> Scan {
        let distributors = graph.nodes_of_kinds(&BTreeSet::from([ElementKind::Distributor]));
        let rest = graph.topology().without(&distributors);

        let mut scan = Scan::default();
        for component in rest.connected_components() {
            let kinds: BTreeSet<ElementKind> =
                component.iter().filter_map(|id| graph.kind(*id)).collect();
            let emits = WHITELIST.iter().any(|k| kinds.contains(k));
            let produces = kinds.iter().any(|k| is_producer(*k));

            match (emits, produces) {
                (true, false) => scan.matches.push(Match::new(Pattern::Consumer, component)),
                (true, true) => {
                    warn!(
                        elements = component.len(),
                        "component mixes consumers and generators, left unreduced"
                    );
                    scan.skipped.push(Skipped {
                        nodes: component,
                        reason: "mixed consumer and generator".into(),
                    });
                }
                _ => {}
            }
        }
        scan
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let emitters: Vec<_> = ctx
            .members()
            .filter(|e| WHITELIST.contains(&e.kind))
            .collect();
        let pumps: Vec<_> = ctx.members().filter(|e| e.kind.is_pump_like()).collect();

        let mut attributes = Attributes::new();
        attributes.set_quantity(
            Attribute::RatedPower,
            aggregate::sum(emitters.iter().copied(), Attribute::RatedPower),
        );
        attributes.set_quantity(
            Attribute::RatedVolumeFlow,
            aggregate::sum(emitters.iter().copied(), Attribute::RatedVolumeFlow),
        );
        attributes.set_quantity(
            Attribute::FlowTemperature,
            aggregate::mean(emitters.iter().copied(), Attribute::FlowTemperature),
        );
        attributes.set_quantity(
            Attribute::ReturnTemperature,
            aggregate::mean(emitters.iter().copied(), Attribute::ReturnTemperature),
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
        Ok(Outcome::Ready(attributes))
    }
}
