//! # Aggregate Builder
//!
//! Turns a `Match` into one or more `AggregatePlan`s: the derived
//! attributes, the external ports and the original-port mapping that
//! `HvacGraph::merge` consumes.
//!
//! Building never mutates the graph. A match with a prelude yields the
//! prelude plans first; all plans are built against the same graph state
//! and merged by the `Reducer` in order, so nothing is committed while any
//! of them still waits for a decision.

use crate::config::ReductionConfig;
use crate::decision::{Answer, DecisionBook, DecisionRequest, Outcome};
use crate::element::{Attributes, Element};
use crate::graph::HvacGraph;
use crate::patterns::{Match, Pattern, matcher};
use crate::primitives::MIN_EDGE_PORTS;
use crate::quantity::{Dimension, Quantity};
use crate::{Attribute, ElementId, ElementKind, FlowDirection, Guid, HvacError, PortId, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;
use uom::si::area::square_meter;
use uom::si::f64::{Area, Length};
use uom::si::length::meter;

// =============================================================================
// PLAN
// =============================================================================

/// An aggregation port to be minted by the merge.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedPort {
    /// Member ports this port stands for.
    pub originals: Vec<PortId>,
    pub flow_direction: FlowDirection,
    pub position: Option<[f64; 3]>,
}

/// Everything `HvacGraph::merge` needs to contract one aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatePlan {
    pub pattern: Pattern,
    pub kind: ElementKind,
    pub guid: Guid,
    pub members: BTreeSet<ElementId>,
    pub attributes: Attributes,
    pub ports: Vec<PlannedPort>,
    /// Every member port: `Some(index)` into `ports`, or `None` to drop it.
    pub mapping: BTreeMap<PortId, Option<usize>>,
    /// Member port pairs that become interior, each reported once.
    pub inner_connections: Vec<(PortId, PortId)>,
}

/// Read-only view handed to a matcher's attribute computation.
#[derive(Debug, Clone, Copy)]
pub struct BuildContext<'a> {
    pub graph: &'a HvacGraph,
    pub candidate: &'a Match,
    pub guid: &'a Guid,
    pub config: &'a ReductionConfig,
    pub book: &'a DecisionBook,
}

impl<'a> BuildContext<'a> {
    /// Member elements in handle order.
    pub fn members(&self) -> impl Iterator<Item = &'a Element> + 'a {
        let graph = self.graph;
        self.candidate
            .nodes
            .iter()
            .filter_map(move |id| graph.element(*id))
    }

    /// Stable decision key scoped to this aggregate.
    #[must_use]
    pub fn decision_key(&self, topic: &str) -> String {
        format!("{}/{}/{}", self.candidate.pattern, self.guid, topic)
    }
}

// =============================================================================
// BUILD
// =============================================================================

/// Build the plans of a match, prelude first.
///
/// Recoverable failures come back as `MatchConstruction`; inconsistencies
/// between the match and the graph as `GraphInvariant`.
pub fn build(
    graph: &HvacGraph,
    candidate: &Match,
    config: &ReductionConfig,
    book: &DecisionBook,
) -> Result<Outcome<Vec<AggregatePlan>>, HvacError> {
    let mut plans = Vec::new();
    let mut pending = Vec::new();

    for step in candidate.prelude.iter().chain(std::iter::once(candidate)) {
        match build_one(graph, step, config, book)? {
            Outcome::Ready(plan) => plans.push(plan),
            Outcome::Pending(requests) => pending.extend(requests),
        }
    }

    if pending.is_empty() {
        Ok(Outcome::Ready(plans))
    } else {
        Ok(Outcome::Pending(pending))
    }
}

fn build_one(
    graph: &HvacGraph,
    candidate: &Match,
    config: &ReductionConfig,
    book: &DecisionBook,
) -> Result<Outcome<AggregatePlan>, HvacError> {
    let pattern = candidate.pattern;
    if candidate.nodes.is_empty() {
        return Err(HvacError::rejected(pattern, "empty match"));
    }
    if let Some(stale) = candidate.nodes.iter().find(|id| !graph.is_active(**id)) {
        return Err(HvacError::rejected(
            pattern,
            format!("element {} was already absorbed", stale),
        ));
    }

    let guid = Guid::derive(
        pattern.name(),
        candidate
            .nodes
            .iter()
            .filter_map(|id| graph.element(*id))
            .map(|e| &e.guid),
    );

    let edges = resolve_edge_ports(graph, candidate)?;
    if edges.groups.len() < MIN_EDGE_PORTS {
        return Err(HvacError::rejected(
            pattern,
            format!(
                "only {} edge port(s), need {}",
                edges.groups.len(),
                MIN_EDGE_PORTS
            ),
        ));
    }

    let ctx = BuildContext {
        graph,
        candidate,
        guid: &guid,
        config,
        book,
    };

    let mut ports: Vec<PlannedPort> = edges
        .groups
        .iter()
        .map(|group| planned_port(graph, group))
        .collect();
    let mut pending = Vec::new();

    if let Some(request) = flow_side_conflict(&ctx, &ports) {
        match book.ask_choice(request) {
            Outcome::Ready(supply) => orient_flow_sides(graph, &mut ports, &supply),
            Outcome::Pending(requests) => pending.extend(requests),
        }
    }

    let attributes = match matcher(pattern).attributes(&ctx)? {
        Outcome::Ready(attributes) => Some(attributes),
        Outcome::Pending(requests) => {
            pending.extend(requests);
            None
        }
    };

    let Some(attributes) = attributes.filter(|_| pending.is_empty()) else {
        return Ok(Outcome::Pending(pending));
    };

    let mut mapping = edges.dropped;
    for (index, port) in ports.iter().enumerate() {
        for original in &port.originals {
            mapping.insert(*original, Some(index));
        }
    }

    Ok(Outcome::Ready(AggregatePlan {
        pattern,
        kind: pattern.kind(),
        guid,
        members: candidate.nodes.clone(),
        attributes,
        ports,
        mapping,
        inner_connections: edges.inner,
    }))
}

// =============================================================================
// EDGE PORTS
// =============================================================================

struct EdgePorts {
    /// Groups of crossing member ports, one aggregation port each.
    groups: Vec<Vec<PortId>>,
    /// Dangling and interior member ports.
    dropped: BTreeMap<PortId, Option<usize>>,
    inner: Vec<(PortId, PortId)>,
}

/// Classify every member port as dangling, interior or crossing and group
/// the crossing ones.
fn resolve_edge_ports(graph: &HvacGraph, candidate: &Match) -> Result<EdgePorts, HvacError> {
    let members = &candidate.nodes;
    let mut crossing = BTreeSet::new();
    let mut dropped = BTreeMap::new();
    let mut inner = Vec::new();

    for member in members {
        for port in graph.contracted_ports(*member) {
            let mut inside = false;
            let mut outside = false;
            for partner in graph.partners(*port) {
                let parent = graph
                    .port(partner)
                    .ok_or(HvacError::PortNotFound(partner))?
                    .parent;
                if members.contains(&parent) {
                    inside = true;
                    if *port < partner {
                        inner.push((*port, partner));
                    }
                } else {
                    outside = true;
                }
            }
            if inside && outside {
                return Err(HvacError::GraphInvariant(format!(
                    "port {} of {} connects both inside and outside the aggregate",
                    port, candidate.pattern
                )));
            }
            if outside {
                crossing.insert(*port);
            } else {
                dropped.insert(*port, None);
            }
        }
    }

    let mut groups: Vec<Vec<PortId>> = Vec::new();
    let mut grouped = BTreeSet::new();
    for group in &candidate.port_groups {
        for port in group {
            if !crossing.contains(port) || !grouped.insert(*port) {
                return Err(HvacError::GraphInvariant(format!(
                    "{} groups port {} that does not cross the aggregate boundary",
                    candidate.pattern, port
                )));
            }
        }
        if !group.is_empty() {
            let mut sorted = group.clone();
            sorted.sort_unstable();
            groups.push(sorted);
        }
    }
    groups.extend(
        crossing
            .iter()
            .filter(|port| !grouped.contains(*port))
            .map(|port| vec![*port]),
    );
    groups.sort();

    Ok(EdgePorts {
        groups,
        dropped,
        inner,
    })
}

fn planned_port(graph: &HvacGraph, group: &[PortId]) -> PlannedPort {
    let originals: Vec<_> = group.iter().filter_map(|p| graph.port(*p)).collect();
    let mut directions = originals.iter().map(|p| p.flow_direction);
    let first = directions.next().unwrap_or_default();
    let flow_direction = if directions.all(|d| d == first) {
        first
    } else {
        FlowDirection::Unknown
    };
    PlannedPort {
        originals: group.to_vec(),
        flow_direction,
        position: originals.iter().find_map(|p| p.position),
    }
}

/// Two edge ports with the same definite direction: ask which one is the
/// supply side.
fn flow_side_conflict(ctx: &BuildContext<'_>, ports: &[PlannedPort]) -> Option<DecisionRequest> {
    let [a, b] = ports else {
        return None;
    };
    if !a.flow_direction.is_definite() || a.flow_direction != b.flow_direction {
        return None;
    }
    let options: Vec<String> = ports
        .iter()
        .filter_map(|p| p.originals.first())
        .filter_map(|p| ctx.graph.port(*p))
        .map(|p| p.guid.to_string())
        .collect();
    let default = options.first().cloned()?;
    Some(
        DecisionRequest::choice(
            ctx.decision_key("flow_side"),
            format!(
                "Both edge ports of {} {} are marked {:?}. Which port is the supply side?",
                ctx.candidate.pattern, ctx.guid, a.flow_direction
            ),
            options,
        )
        .with_default(Answer::Choice(default)),
    )
}

/// The supply port becomes the aggregate's inlet, the other its outlet.
fn orient_flow_sides(graph: &HvacGraph, ports: &mut [PlannedPort], supply: &str) {
    for port in ports {
        let is_supply = port
            .originals
            .first()
            .and_then(|p| graph.port(*p))
            .is_some_and(|p| p.guid.as_str() == supply);
        port.flow_direction = if is_supply {
            FlowDirection::Sink
        } else {
            FlowDirection::Source
        };
    }
}

// =============================================================================
// ATTRIBUTE POLICIES
// =============================================================================

/// Total length and length-weighted mean diameter of the members that
/// carry a length.
///
/// Members missing length or diameter are skipped with a warning. With a
/// total length of zero the diameter is zero.
pub fn pipe_geometry<'a>(elements: impl IntoIterator<Item = &'a Element>) -> (Length, Length) {
    let mut total = Length::new::<meter>(0.0);
    let mut weighted = Area::new::<square_meter>(0.0);

    for element in elements {
        let length = element.quantity(Attribute::Length);
        if !element.kind.has_length() && length.is_none() {
            continue;
        }
        let diameter = element.quantity(Attribute::Diameter);
        let (Some(length), Some(diameter)) = (
            length.and_then(Quantity::length),
            diameter.and_then(Quantity::length),
        ) else {
            warn!(guid = %element.guid, kind = %element.kind, "missing length or diameter, skipped");
            continue;
        };
        total += length;
        weighted += diameter * length;
    }

    let diameter = if total.get::<meter>() == 0.0 {
        Length::new::<meter>(0.0)
    } else {
        weighted / total
    };
    (total, diameter)
}

/// SI values of `attribute` in the dimension of the first one found.
fn collect<'a>(
    elements: impl IntoIterator<Item = &'a Element>,
    attribute: Attribute,
) -> Option<(Dimension, Vec<f64>)> {
    let mut dimension = None;
    let mut values = Vec::new();
    for element in elements {
        let Some(quantity) = element.quantity(attribute) else {
            continue;
        };
        let expected = *dimension.get_or_insert(quantity.dimension());
        if quantity.dimension() == expected {
            values.push(quantity.si_value());
        } else {
            warn!(guid = %element.guid, ?attribute, %expected, "mismatched dimension, skipped");
        }
    }
    dimension.map(|d| (d, values))
}

/// Sum of `attribute`, `None` when no element carries it.
pub fn sum<'a>(
    elements: impl IntoIterator<Item = &'a Element>,
    attribute: Attribute,
) -> Option<Quantity> {
    collect(elements, attribute).map(|(dimension, values)| {
        Quantity::from_si(dimension, values.iter().sum())
    })
}

/// Arithmetic mean of `attribute`. Temperatures average on the absolute
/// scale.
pub fn mean<'a>(
    elements: impl IntoIterator<Item = &'a Element>,
    attribute: Attribute,
) -> Option<Quantity> {
    let (dimension, values) = collect(elements, attribute)?;
    if values.is_empty() {
        return None;
    }
    Some(Quantity::from_si(
        dimension,
        values.iter().sum::<f64>() / values.len() as f64,
    ))
}

/// Maximum of `attribute`.
pub fn max<'a>(
    elements: impl IntoIterator<Item = &'a Element>,
    attribute: Attribute,
) -> Option<Quantity> {
    let (dimension, values) = collect(elements, attribute)?;
    values
        .into_iter()
        .reduce(f64::max)
        .map(|v| Quantity::from_si(dimension, v))
}

/// Whether any element is a pump or already contains one.
pub fn has_pump<'a>(elements: impl IntoIterator<Item = &'a Element>) -> bool {
    elements.into_iter().any(|e| {
        e.kind.is_pump_like() || e.attributes.flag(Attribute::HasPump) == Some(true)
    })
}

/// Set `Length` and `Diameter` from `pipe_geometry`.
pub fn set_pipe_geometry<'a>(
    attributes: &mut Attributes,
    elements: impl IntoIterator<Item = &'a Element>,
) {
    let (length, diameter) = pipe_geometry(elements);
    attributes.set(Attribute::Length, Value::Quantity(length.into()));
    attributes.set(Attribute::Diameter, Value::Quantity(diameter.into()));
}

// =============================================================================
// TESTS
// =============================================================================
