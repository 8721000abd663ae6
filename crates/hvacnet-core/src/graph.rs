//! # Connectivity Graph
//!
//! The mutable HVAC graph of one reduction run.
//!
//! Elements and ports live in arenas keyed by stable handles. Elements are
//! never deleted: an absorbed element stays in the arena with `absorbed_by`
//! set and leaves the `active` set. The port-level edge relation is the
//! single source of truth; the element-level `Topology` is derived from it
//! on demand by contracting every port into its parent.
//!
//! Only `merge` mutates the graph after `build`.

use crate::aggregate::AggregatePlan;
use crate::element::{Element, Network, Port};
use crate::topology::Topology;
use crate::{Attribute, ElementId, ElementKind, Guid, HvacError, PortId};
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// A set of parallel branches between two boundary elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parallels {
    /// The two elements every branch starts and ends at, smaller first.
    pub boundaries: (ElementId, ElementId),
    /// Branch interiors, boundaries excluded.
    pub branches: Vec<BTreeSet<ElementId>>,
}

/// The HVAC connectivity graph.
///
/// Uses `BTreeMap`/`BTreeSet` exclusively for deterministic ordering.
#[derive(Debug, Clone, Default)]
pub struct HvacGraph {
    /// Element arena, absorbed elements included.
    elements: BTreeMap<ElementId, Element>,

    /// Port arena, ports of absorbed elements included.
    ports: BTreeMap<PortId, Port>,

    /// Elements that are currently nodes of the graph.
    active: BTreeSet<ElementId>,

    /// Symmetric port adjacency. Ports without partners have no entry.
    port_edges: BTreeMap<PortId, BTreeSet<PortId>>,

    /// Reverse lookup: Guid -> ElementId
    guid_index: BTreeMap<Guid, ElementId>,

    next_element_id: u64,
    next_port_id: u64,
}

impl HvacGraph {
    // =========================================================================
    // CONSTRUCTION
    // =========================================================================

    /// Build the graph from a loaded network.
    ///
    /// Ports without a connection simply stay unconnected.
    pub fn build(network: Network) -> Result<Self, HvacError> {
        let Network {
            elements,
            ports,
            connections,
            ..
        } = network;

        let mut graph = Self {
            next_element_id: elements
                .last_key_value()
                .map_or(0, |(id, _)| id.0.saturating_add(1)),
            next_port_id: ports
                .last_key_value()
                .map_or(0, |(id, _)| id.0.saturating_add(1)),
            ..Self::default()
        };

        for (id, element) in &elements {
            for port in &element.ports {
                let owner = ports.get(port).ok_or(HvacError::PortNotFound(*port))?;
                if owner.parent != *id {
                    return Err(HvacError::InvalidNetwork(format!(
                        "port {} listed by {} belongs to {}",
                        owner.guid, element.guid, owner.parent
                    )));
                }
            }
            if graph.guid_index.insert(element.guid.clone(), *id).is_some() {
                return Err(HvacError::InvalidNetwork(format!(
                    "duplicate element guid {}",
                    element.guid
                )));
            }
            if element.absorbed_by.is_none() {
                graph.active.insert(*id);
            }
        }
        graph.elements = elements;
        graph.ports = ports;

        for (a, b) in connections {
            let parent_a = graph.ports.get(&a).ok_or(HvacError::PortNotFound(a))?.parent;
            let parent_b = graph.ports.get(&b).ok_or(HvacError::PortNotFound(b))?.parent;
            if parent_a == parent_b {
                return Err(HvacError::InvalidNetwork(format!(
                    "ports {} and {} belong to the same element",
                    a, b
                )));
            }
            graph.link(a, b);
        }

        Ok(graph)
    }

    fn link(&mut self, a: PortId, b: PortId) {
        self.port_edges.entry(a).or_default().insert(b);
        self.port_edges.entry(b).or_default().insert(a);
    }

    /// Remove `b` from the partners of `a`, dropping empty entries.
    fn unlink_half(&mut self, a: PortId, b: PortId) {
        if let Some(set) = self.port_edges.get_mut(&a) {
            set.remove(&b);
            if set.is_empty() {
                self.port_edges.remove(&a);
            }
        }
    }

    // =========================================================================
    // LOOKUPS
    // =========================================================================

    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(&id)
    }

    #[must_use]
    pub fn port(&self, id: PortId) -> Option<&Port> {
        self.ports.get(&id)
    }

    #[must_use]
    pub fn kind(&self, id: ElementId) -> Option<ElementKind> {
        self.elements.get(&id).map(|e| e.kind)
    }

    #[must_use]
    pub fn element_by_guid(&self, guid: &str) -> Option<ElementId> {
        self.guid_index.get(&Guid::new(guid)).copied()
    }

    #[must_use]
    pub fn is_active(&self, id: ElementId) -> bool {
        self.active.contains(&id)
    }

    /// Active elements in handle order.
    pub fn active_elements(&self) -> impl Iterator<Item = &Element> {
        self.active.iter().filter_map(|id| self.elements.get(id))
    }

    /// Number of active elements.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.active.len()
    }

    /// Active elements whose kind is in `kinds`.
    #[must_use]
    pub fn nodes_of_kinds(&self, kinds: &BTreeSet<ElementKind>) -> BTreeSet<ElementId> {
        self.active_elements()
            .filter(|e| kinds.contains(&e.kind))
            .map(|e| e.id)
            .collect()
    }

    /// The ports contracted into an element node.
    #[must_use]
    pub fn contracted_ports(&self, id: ElementId) -> &[PortId] {
        self.elements
            .get(&id)
            .map(|e| e.ports.as_slice())
            .unwrap_or_default()
    }

    /// Ports connected to `port`.
    pub fn partners(&self, port: PortId) -> impl Iterator<Item = PortId> + '_ {
        self.port_edges
            .get(&port)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// The first port connected to `port`.
    #[must_use]
    pub fn connection(&self, port: PortId) -> Option<PortId> {
        self.partners(port).next()
    }

    /// Partners of `port` whose parent is not in `members`.
    pub fn external_partners<'a>(
        &'a self,
        port: PortId,
        members: &'a BTreeSet<ElementId>,
    ) -> impl Iterator<Item = PortId> + 'a {
        self.partners(port).filter(move |p| {
            self.ports
                .get(p)
                .is_some_and(|partner| !members.contains(&partner.parent))
        })
    }

    /// Active elements adjacent to `id` through any port.
    #[must_use]
    pub fn element_neighbors(&self, id: ElementId) -> BTreeSet<ElementId> {
        self.contracted_ports(id)
            .iter()
            .flat_map(|port| self.partners(*port))
            .filter_map(|partner| self.ports.get(&partner).map(|p| p.parent))
            .filter(|parent| *parent != id)
            .collect()
    }

    /// Flat, sorted list of port-to-port connections, each reported once.
    #[must_use]
    pub fn get_connections(&self) -> Vec<(PortId, PortId)> {
        self.port_edges
            .iter()
            .flat_map(|(a, partners)| {
                partners
                    .iter()
                    .filter(move |b| a < *b)
                    .map(move |b| (*a, *b))
            })
            .collect()
    }

    // =========================================================================
    // ELEMENT-LEVEL QUERIES
    // =========================================================================

    /// The element graph: ports contracted into their parents.
    #[must_use]
    pub fn topology(&self) -> Topology {
        let mut topology = Topology::new();
        for id in &self.active {
            topology.add_node(*id);
        }
        for (a, b) in self.get_connections() {
            if let (Some(pa), Some(pb)) = (self.ports.get(&a), self.ports.get(&b))
                && self.active.contains(&pa.parent)
                && self.active.contains(&pb.parent)
            {
                topology.add_edge(pa.parent, pb.parent);
            }
        }
        topology
    }

    /// Cycle basis of the element graph.
    #[must_use]
    pub fn get_cycles(&self) -> Vec<Vec<ElementId>> {
        self.topology().cycle_basis()
    }

    /// Maximal unbranched chains of elements whose kind is in `types`.
    ///
    /// Only elements of degree <= 2 in the full element graph take part.
    /// Single elements are reported only with `include_singles`.
    #[must_use]
    pub fn get_type_chains(
        &self,
        types: &BTreeSet<ElementKind>,
        include_singles: bool,
    ) -> Vec<Vec<ElementId>> {
        let topology = self.topology();
        let candidates: BTreeSet<ElementId> = self
            .nodes_of_kinds(types)
            .into_iter()
            .filter(|id| topology.degree(*id) <= 2)
            .collect();
        let sub = topology.induced(&candidates);

        sub.connected_components()
            .into_iter()
            .filter(|component| include_singles || component.len() > 1)
            .filter_map(|component| sub.walk(&component))
            .collect()
    }

    /// Restrict the element graph to elements of the wanted or inert kinds.
    #[must_use]
    pub fn remove_not_wanted_nodes(
        &self,
        wanted: &BTreeSet<ElementKind>,
        inert: &BTreeSet<ElementKind>,
    ) -> Topology {
        let kinds: BTreeSet<ElementKind> = wanted.union(inert).copied().collect();
        self.topology().induced(&self.nodes_of_kinds(&kinds))
    }

    /// Simple cycles of `topology` that contain a node of a wanted kind.
    #[must_use]
    pub fn get_all_cycles_with_wanted(
        &self,
        topology: &Topology,
        wanted: &BTreeSet<ElementKind>,
        limit: usize,
    ) -> Vec<Vec<ElementId>> {
        let wanted_nodes: BTreeSet<ElementId> = topology
            .nodes()
            .filter(|id| self.kind(*id).is_some_and(|k| wanted.contains(&k)))
            .collect();
        topology.simple_cycles_with(&wanted_nodes, limit)
    }

    /// Components holding at least two wanted elements that are connected
    /// only through inert elements. Inert dead ends are pruned.
    #[must_use]
    pub fn get_connections_between(
        &self,
        wanted: &BTreeSet<ElementKind>,
        inert: &BTreeSet<ElementKind>,
    ) -> Vec<BTreeSet<ElementId>> {
        let restricted = self.remove_not_wanted_nodes(wanted, inert);
        let is_wanted = |id: ElementId| self.kind(id).is_some_and(|k| wanted.contains(&k));

        restricted
            .connected_components()
            .into_iter()
            .filter(|component| component.iter().filter(|id| is_wanted(**id)).count() >= 2)
            .map(|component| {
                let mut sub = restricted.induced(&component);
                sub.prune_leaves(|id| !is_wanted(id));
                sub.nodes().collect()
            })
            .collect()
    }

    /// Parallel branches between two common boundary elements.
    ///
    /// A branch is the open arc of a basis cycle between the cycle's two
    /// branching elements; it may only hold wanted and inert kinds and must
    /// hold exactly one wanted element. With `grouping`, branches are
    /// clustered by the wanted element's attribute: a branch joins a cluster
    /// while its relative difference to the cluster's first value is at most
    /// `threshold`. Branches without the attribute stay ungrouped. Only
    /// clusters of two or more branches are returned.
    #[must_use]
    pub fn get_parallels(
        &self,
        wanted: &BTreeSet<ElementKind>,
        inert: &BTreeSet<ElementKind>,
        grouping: Option<Attribute>,
        threshold: f64,
    ) -> Vec<Parallels> {
        let full = self.topology();
        let restricted = self.remove_not_wanted_nodes(wanted, inert);
        let is_wanted = |id: &ElementId| self.kind(*id).is_some_and(|k| wanted.contains(&k));

        let mut by_boundary: BTreeMap<(ElementId, ElementId), BTreeSet<BTreeSet<ElementId>>> =
            BTreeMap::new();

        for cycle in restricted.cycle_basis() {
            let hubs: Vec<usize> = cycle
                .iter()
                .enumerate()
                .filter(|(_, id)| full.degree(**id) >= 3)
                .map(|(i, _)| i)
                .collect();
            let [first, second] = hubs[..] else {
                continue;
            };
            let arcs = [
                cycle[first + 1..second].iter().copied().collect::<BTreeSet<_>>(),
                cycle[second + 1..]
                    .iter()
                    .chain(cycle[..first].iter())
                    .copied()
                    .collect::<BTreeSet<_>>(),
            ];
            if arcs
                .iter()
                .any(|arc| arc.is_empty() || arc.iter().filter(|id| is_wanted(*id)).count() != 1)
            {
                continue;
            }
            let (a, b) = (cycle[first], cycle[second]);
            let key = if a < b { (a, b) } else { (b, a) };
            by_boundary.entry(key).or_default().extend(arcs);
        }

        let mut result = Vec::new();
        for (boundaries, branches) in by_boundary {
            let branches: Vec<BTreeSet<ElementId>> = branches.into_iter().collect();
            let clusters = match grouping {
                Some(attribute) => self.cluster_branches(branches, attribute, threshold, &is_wanted),
                None => vec![branches],
            };
            result.extend(
                clusters
                    .into_iter()
                    .filter(|cluster| cluster.len() >= 2)
                    .map(|branches| Parallels {
                        boundaries,
                        branches,
                    }),
            );
        }
        result
    }

    fn cluster_branches(
        &self,
        branches: Vec<BTreeSet<ElementId>>,
        attribute: Attribute,
        threshold: f64,
        is_wanted: &impl Fn(&ElementId) -> bool,
    ) -> Vec<Vec<BTreeSet<ElementId>>> {
        let mut reference = None;
        let mut valued: Vec<(f64, BTreeSet<ElementId>)> = Vec::new();
        for branch in branches {
            let quantity = branch
                .iter()
                .find(|id| is_wanted(*id))
                .and_then(|id| self.elements.get(id))
                .and_then(|e| e.quantity(attribute));
            let Some(quantity) = quantity else {
                debug!(attribute = ?attribute, "branch left ungrouped");
                continue;
            };
            let dimension = *reference.get_or_insert(quantity.dimension());
            if quantity.dimension() == dimension {
                valued.push((quantity.si_value(), branch));
            }
        }
        valued.sort_by(|a, b| a.0.total_cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut clusters: Vec<Vec<BTreeSet<ElementId>>> = Vec::new();
        let mut anchor: Option<f64> = None;
        for (value, branch) in valued {
            let joins = anchor.is_some_and(|first| relative_difference(first, value) <= threshold);
            if joins && let Some(cluster) = clusters.last_mut() {
                cluster.push(branch);
                continue;
            }
            anchor = Some(value);
            clusters.push(vec![branch]);
        }
        clusters
    }

    // =========================================================================
    // MERGE
    // =========================================================================

    /// Contract the members of `plan` into a new aggregate element.
    ///
    /// Edges crossing the member boundary are rewired to the aggregate's
    /// ports; edges between members are dropped. Returns the new handle.
    ///
    /// Fails with `GraphInvariant` when the plan is inconsistent with the
    /// graph; the graph is untouched in that case.
    pub fn merge(&mut self, plan: &AggregatePlan) -> Result<ElementId, HvacError> {
        self.check_plan(plan)?;

        let id = ElementId(self.next_element_id);
        self.next_element_id = self.next_element_id.saturating_add(1);

        let mut new_ports = Vec::with_capacity(plan.ports.len());
        for (index, planned) in plan.ports.iter().enumerate() {
            let port_id = PortId(self.next_port_id);
            self.next_port_id = self.next_port_id.saturating_add(1);
            self.ports.insert(
                port_id,
                Port {
                    id: port_id,
                    guid: Guid::new(format!("{}:{}", plan.guid, index)),
                    parent: id,
                    position: planned.position,
                    flow_direction: planned.flow_direction,
                    originals: planned.originals.clone(),
                },
            );
            new_ports.push(port_id);
        }

        for member in &plan.members {
            let member_ports = self.contracted_ports(*member).to_vec();
            for port in member_ports {
                let target = plan
                    .mapping
                    .get(&port)
                    .copied()
                    .flatten()
                    .and_then(|index| new_ports.get(index).copied());
                let partners = self.port_edges.remove(&port).unwrap_or_default();
                for partner in partners {
                    self.unlink_half(partner, port);
                    let crossing = self
                        .ports
                        .get(&partner)
                        .is_some_and(|p| !plan.members.contains(&p.parent));
                    if crossing && let Some(new_port) = target {
                        self.link(new_port, partner);
                    }
                }
            }
        }

        for member in &plan.members {
            if let Some(element) = self.elements.get_mut(member) {
                element.absorbed_by = Some(id);
            }
            self.active.remove(member);
        }

        self.elements.insert(
            id,
            Element {
                id,
                guid: plan.guid.clone(),
                kind: plan.kind,
                attributes: plan.attributes.clone(),
                ports: new_ports,
                members: plan.members.iter().copied().collect(),
                inner_connections: plan.inner_connections.clone(),
                absorbed_by: None,
            },
        );
        self.active.insert(id);
        self.guid_index.insert(plan.guid.clone(), id);

        debug!(
            pattern = %plan.pattern,
            guid = %plan.guid,
            members = plan.members.len(),
            ports = plan.ports.len(),
            "merged aggregate"
        );
        Ok(id)
    }

    fn check_plan(&self, plan: &AggregatePlan) -> Result<(), HvacError> {
        if plan.members.is_empty() {
            return Err(HvacError::GraphInvariant(format!(
                "aggregate {} has no members",
                plan.guid
            )));
        }
        if self.guid_index.contains_key(&plan.guid) {
            return Err(HvacError::GraphInvariant(format!(
                "guid {} already exists",
                plan.guid
            )));
        }
        for member in &plan.members {
            if !self.active.contains(member) {
                return Err(HvacError::GraphInvariant(format!(
                    "member {} is not an active element",
                    member
                )));
            }
        }

        for (port, target) in &plan.mapping {
            let parent = self.ports.get(port).ok_or(HvacError::PortNotFound(*port))?.parent;
            if !plan.members.contains(&parent) {
                return Err(HvacError::GraphInvariant(format!(
                    "mapped port {} does not belong to a member",
                    port
                )));
            }
            let Some(index) = target else {
                continue;
            };
            let planned = plan.ports.get(*index).ok_or_else(|| {
                HvacError::GraphInvariant(format!("port {} maps to missing index {}", port, index))
            })?;
            if !planned.originals.contains(port) {
                return Err(HvacError::GraphInvariant(format!(
                    "port {} is not an original of aggregation port {}",
                    port, index
                )));
            }
            if self.external_partners(*port, &plan.members).next().is_none() {
                return Err(HvacError::GraphInvariant(format!(
                    "port {} is mapped but has no crossing edge",
                    port
                )));
            }
        }

        for member in &plan.members {
            for port in self.contracted_ports(*member) {
                let crossing = self.external_partners(*port, &plan.members).next().is_some();
                if crossing && !matches!(plan.mapping.get(port), Some(Some(_))) {
                    return Err(HvacError::GraphInvariant(format!(
                        "crossing port {} is not mapped",
                        port
                    )));
                }
            }
        }

        for (index, planned) in plan.ports.iter().enumerate() {
            for original in &planned.originals {
                if plan.mapping.get(original) != Some(&Some(index)) {
                    return Err(HvacError::GraphInvariant(format!(
                        "original {} of aggregation port {} is not mapped to it",
                        original, index
                    )));
                }
            }
        }

        Ok(())
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Check the structural invariants of the graph.
    pub fn validate(&self) -> Result<(), HvacError> {
        for (port, partners) in &self.port_edges {
            let parent = self.ports.get(port).ok_or(HvacError::PortNotFound(*port))?.parent;
            if !self.active.contains(&parent) {
                return Err(HvacError::GraphInvariant(format!(
                    "port {} of inactive element {} still has edges",
                    port, parent
                )));
            }
            if partners.len() > 1 {
                return Err(HvacError::GraphInvariant(format!(
                    "port {} has {} connections",
                    port,
                    partners.len()
                )));
            }
            for partner in partners {
                let other = self
                    .ports
                    .get(partner)
                    .ok_or(HvacError::PortNotFound(*partner))?
                    .parent;
                if other == parent {
                    return Err(HvacError::GraphInvariant(format!(
                        "ports {} and {} form a self-loop on {}",
                        port, partner, parent
                    )));
                }
                if !self
                    .port_edges
                    .get(partner)
                    .is_some_and(|back| back.contains(port))
                {
                    return Err(HvacError::GraphInvariant(format!(
                        "edge {} -> {} is not symmetric",
                        port, partner
                    )));
                }
            }
        }

        for id in &self.active {
            let element = self.elements.get(id).ok_or(HvacError::ElementNotFound(*id))?;
            if element.absorbed_by.is_some() {
                return Err(HvacError::GraphInvariant(format!(
                    "active element {} is marked absorbed",
                    id
                )));
            }
            for port in &element.ports {
                let owner = self.ports.get(port).ok_or(HvacError::PortNotFound(*port))?;
                if owner.parent != *id {
                    return Err(HvacError::GraphInvariant(format!(
                        "port {} of {} names {} as parent",
                        port, id, owner.parent
                    )));
                }
            }
        }

        Ok(())
    }
}

/// `|a - b| / max(|a|, |b|)`, zero when both are zero.
fn relative_difference(a: f64, b: f64) -> f64 {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        0.0
    } else {
        (a - b).abs() / scale
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::PlannedPort;
    use crate::element::Attributes;
    use crate::patterns::Pattern;
    use crate::quantity::Quantity;
    use crate::{FlowDirection, Value};

    fn pipes_in_series(n: usize) -> (Network, Vec<ElementId>) {
        let mut net = Network::new();
        let ids: Vec<ElementId> = (0..n)
            .map(|i| {
                net.add_element(format!("pipe-{}", i), ElementKind::Pipe, 2)
                    .expect("add")
            })
            .collect();
        net.chain(&ids).expect("chain");
        (net, ids)
    }

    fn ring(n: usize) -> HvacGraph {
        let (mut net, ids) = pipes_in_series(n);
        let first = ids[0];
        let last = ids[n - 1];
        net.link(last, first).expect("close ring");
        HvacGraph::build(net).expect("build")
    }

    /// Contract the middle elements of a series, mapping the two outward
    /// ports to separate aggregation ports.
    fn plan_for(graph: &HvacGraph, members: &[ElementId]) -> AggregatePlan {
        let members: BTreeSet<ElementId> = members.iter().copied().collect();
        let mut plan = AggregatePlan {
            pattern: Pattern::PipeStrand,
            kind: ElementKind::PipeStrand,
            guid: Guid::derive("PipeStrand", members.iter().filter_map(|m| graph.element(*m).map(|e| &e.guid))),
            members: members.clone(),
            attributes: Attributes::new(),
            ports: Vec::new(),
            mapping: BTreeMap::new(),
            inner_connections: Vec::new(),
        };
        for member in &members {
            for port in graph.contracted_ports(*member) {
                if graph.external_partners(*port, &members).next().is_some() {
                    plan.mapping.insert(*port, Some(plan.ports.len()));
                    plan.ports.push(PlannedPort {
                        originals: vec![*port],
                        flow_direction: FlowDirection::Unknown,
                        position: None,
                    });
                } else {
                    plan.mapping.insert(*port, None);
                    if let Some(partner) = graph.connection(*port)
                        && *port < partner
                    {
                        plan.inner_connections.push((*port, partner));
                    }
                }
            }
        }
        plan
    }

    #[test]
    fn build_contracts_ports_into_elements() {
        let (net, ids) = pipes_in_series(3);
        let graph = HvacGraph::build(net).expect("build");
        let topology = graph.topology();
        assert_eq!(topology.node_count(), 3);
        assert_eq!(topology.edge_count(), 2);
        assert_eq!(graph.element_neighbors(ids[1]), BTreeSet::from([ids[0], ids[2]]));
        assert_eq!(graph.get_connections().len(), 2);
        graph.validate().expect("valid");
    }

    #[test]
    fn unconnected_ports_are_allowed() {
        let mut net = Network::new();
        net.add_element("lonely", ElementKind::Valve, 2).expect("add");
        let graph = HvacGraph::build(net).expect("build");
        assert_eq!(graph.element_count(), 1);
        assert!(graph.get_connections().is_empty());
    }

    #[test]
    fn ring_has_single_cycle() {
        for n in [3, 4, 7] {
            let graph = ring(n);
            let cycles = graph.get_cycles();
            assert_eq!(cycles.len(), 1);
            assert_eq!(cycles[0].len(), n);
        }
    }

    #[test]
    fn type_chains_stop_at_branches_and_other_kinds() {
        let mut net = Network::new();
        let a = net.add_element("a", ElementKind::Pipe, 2).expect("add");
        let b = net.add_element("b", ElementKind::Pipe, 2).expect("add");
        let tee = net.add_element("tee", ElementKind::PipeFitting, 3).expect("add");
        let c = net.add_element("c", ElementKind::Pipe, 2).expect("add");
        let d = net.add_element("d", ElementKind::Pipe, 2).expect("add");
        let pump = net.add_element("pump", ElementKind::Pump, 2).expect("add");
        net.chain(&[a, b, tee, c]).expect("chain");
        net.link(tee, d).expect("link");
        net.link(d, pump).expect("link");

        let graph = HvacGraph::build(net).expect("build");
        let types = BTreeSet::from([ElementKind::Pipe, ElementKind::PipeFitting]);

        let chains = graph.get_type_chains(&types, false);
        assert_eq!(chains, vec![vec![a, b]]);

        let with_singles = graph.get_type_chains(&types, true);
        assert_eq!(with_singles.len(), 3);
        assert!(with_singles.contains(&vec![c]));
        assert!(with_singles.contains(&vec![d]));
    }

    #[test]
    fn merge_rewires_crossing_edges() {
        let (net, ids) = pipes_in_series(4);
        let mut graph = HvacGraph::build(net).expect("build");
        let before = graph.get_connections();

        let plan = plan_for(&graph, &ids[1..3]);
        let aggregate = graph.merge(&plan).expect("merge");

        assert_eq!(graph.element_count(), 3);
        assert!(!graph.is_active(ids[1]));
        assert_eq!(
            graph.element(ids[1]).and_then(|e| e.absorbed_by),
            Some(aggregate)
        );
        assert_eq!(
            graph.element_neighbors(aggregate),
            BTreeSet::from([ids[0], ids[3]])
        );
        assert_eq!(graph.get_connections().len(), before.len() - 1);
        assert_eq!(
            graph.element(aggregate).map(|e| e.inner_connections.len()),
            Some(1)
        );
        graph.validate().expect("valid");
    }

    #[test]
    fn merge_rejects_unmapped_crossing_port() {
        let (net, ids) = pipes_in_series(3);
        let mut graph = HvacGraph::build(net).expect("build");
        let mut plan = plan_for(&graph, &ids[1..2]);
        let dropped = plan.ports.remove(1);
        for original in dropped.originals {
            plan.mapping.insert(original, None);
        }
        let result = graph.merge(&plan);
        assert!(matches!(result, Err(HvacError::GraphInvariant(_))));
        assert!(graph.is_active(ids[1]));
        graph.validate().expect("untouched");
    }

    #[test]
    fn merge_rejects_mapping_without_crossing_edge() {
        let (net, ids) = pipes_in_series(3);
        let mut graph = HvacGraph::build(net).expect("build");
        let mut plan = plan_for(&graph, &ids);
        let interior = graph.contracted_ports(ids[1])[0];
        plan.mapping.insert(interior, Some(plan.ports.len()));
        plan.ports.push(PlannedPort {
            originals: vec![interior],
            flow_direction: FlowDirection::Unknown,
            position: None,
        });
        assert!(matches!(
            graph.merge(&plan),
            Err(HvacError::GraphInvariant(_))
        ));
    }

    #[test]
    fn merge_rejects_inactive_member() {
        let (net, ids) = pipes_in_series(4);
        let mut graph = HvacGraph::build(net).expect("build");
        let first = plan_for(&graph, &ids[1..3]);
        let stale = plan_for(&graph, &ids[2..4]);
        graph.merge(&first).expect("merge");
        assert!(graph.merge(&stale).is_err());
    }

    #[test]
    fn parallels_group_by_relative_power() {
        // hub_a -> {pump_i} -> hub_b, plus one feed on each hub.
        let mut net = Network::new();
        let feed = net.add_element("feed", ElementKind::Pipe, 2).expect("add");
        let ret = net.add_element("ret", ElementKind::Pipe, 2).expect("add");
        let hub_a = net.add_element("hub-a", ElementKind::PipeFitting, 4).expect("add");
        let hub_b = net.add_element("hub-b", ElementKind::PipeFitting, 4).expect("add");
        net.link(feed, hub_a).expect("link");
        net.link(hub_b, ret).expect("link");
        let mut pumps = Vec::new();
        for (i, power) in [1000.0, 1020.0, 2000.0].into_iter().enumerate() {
            let pump = net.add_element(format!("pump-{}", i), ElementKind::Pump, 2).expect("add");
            net.set_quantity(pump, Attribute::RatedPower, Quantity::watt(power))
                .expect("set");
            net.link(hub_a, pump).expect("link");
            net.link(pump, hub_b).expect("link");
            pumps.push(pump);
        }
        let graph = HvacGraph::build(net).expect("build");

        let wanted = BTreeSet::from([ElementKind::Pump]);
        let inert = BTreeSet::from([ElementKind::Pump, ElementKind::Pipe, ElementKind::PipeFitting]);
        let found = graph.get_parallels(&wanted, &inert, Some(Attribute::RatedPower), 0.05);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].boundaries, (hub_a, hub_b));
        assert_eq!(
            found[0].branches,
            vec![BTreeSet::from([pumps[0]]), BTreeSet::from([pumps[1]])]
        );

        let ungrouped = graph.get_parallels(&wanted, &inert, None, 0.0);
        assert_eq!(ungrouped[0].branches.len(), 3);
    }

    #[test]
    fn connections_between_prune_inert_dead_ends() {
        let mut net = Network::new();
        let f1 = net.add_element("f1", ElementKind::PipeFitting, 3).expect("add");
        let p = net.add_element("p", ElementKind::Pipe, 2).expect("add");
        let f2 = net.add_element("f2", ElementKind::PipeFitting, 3).expect("add");
        let stub = net.add_element("stub", ElementKind::Pipe, 2).expect("add");
        net.chain(&[f1, p, f2, stub]).expect("chain");

        let graph = HvacGraph::build(net).expect("build");
        let found = graph.get_connections_between(
            &BTreeSet::from([ElementKind::PipeFitting]),
            &BTreeSet::from([ElementKind::Pipe]),
        );
        assert_eq!(found, vec![BTreeSet::from([f1, p, f2])]);
    }

    #[test]
    fn cycles_with_wanted_kind() {
        let mut net = Network::new();
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let a = net.add_element("a", ElementKind::Pipe, 2).expect("add");
        let b = net.add_element("b", ElementKind::Pipe, 2).expect("add");
        net.chain(&[boiler, a, b]).expect("chain");
        net.link(b, boiler).expect("close");
        let graph = HvacGraph::build(net).expect("build");

        let topology = graph.remove_not_wanted_nodes(
            &BTreeSet::from([ElementKind::Boiler]),
            &BTreeSet::from([ElementKind::Pipe]),
        );
        let cycles = graph.get_all_cycles_with_wanted(
            &topology,
            &BTreeSet::from([ElementKind::Boiler]),
            10,
        );
        assert_eq!(cycles.len(), 1);
        assert!(
            graph
                .get_all_cycles_with_wanted(&topology, &BTreeSet::from([ElementKind::Chp]), 10)
                .is_empty()
        );
    }

    #[test]
    fn aggregate_keeps_attributes() {
        let (net, ids) = pipes_in_series(3);
        let mut graph = HvacGraph::build(net).expect("build");
        let mut plan = plan_for(&graph, &ids[..2]);
        plan.attributes.set(Attribute::HasPump, Value::Flag(false));
        let id = graph.merge(&plan).expect("merge");
        let element = graph.element(id).expect("aggregate");
        assert_eq!(element.attributes.flag(Attribute::HasPump), Some(false));
        assert_eq!(element.members, ids[..2].to_vec());
        assert_eq!(graph.element_by_guid(plan.guid.as_str()), Some(id));
    }

    #[test]
    fn relative_difference_is_symmetric() {
        assert_eq!(relative_difference(0.0, 0.0), 0.0);
        assert!((relative_difference(100.0, 95.0) - 0.05).abs() < 1e-12);
        assert_eq!(relative_difference(3.0, 5.0), relative_difference(5.0, 3.0));
    }
}
