//! # Topology
//!
//! Undirected, simple element-level graph used by the matchers.
//!
//! A `Topology` is a read-only snapshot: matchers derive it from the
//! `HvacGraph`, restrict it (`without`, `induced`) and run the algorithms
//! below on it. It never touches ports, so it is cheap to clone.
//!
//! All iteration goes through `BTreeMap`/`BTreeSet`, so components, cycles
//! and paths come out in a deterministic order.

use crate::ElementId;
use crate::primitives::MAX_PATH_LENGTH;
use std::collections::{BTreeMap, BTreeSet};

/// Undirected simple graph over element handles.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    adjacency: BTreeMap<ElementId, BTreeSet<ElementId>>,
}

impl Topology {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: ElementId) {
        self.adjacency.entry(node).or_default();
    }

    /// Add an undirected edge. Self-loops are ignored.
    pub fn add_edge(&mut self, a: ElementId, b: ElementId) {
        if a == b {
            self.add_node(a);
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn remove_node(&mut self, node: ElementId) {
        if let Some(neighbors) = self.adjacency.remove(&node) {
            for n in neighbors {
                if let Some(set) = self.adjacency.get_mut(&n) {
                    set.remove(&node);
                }
            }
        }
    }

    /// Copy of this topology without the given nodes.
    #[must_use]
    pub fn without(&self, removed: &BTreeSet<ElementId>) -> Self {
        let mut copy = self.clone();
        for node in removed {
            copy.remove_node(*node);
        }
        copy
    }

    /// Subgraph induced by `keep`.
    #[must_use]
    pub fn induced(&self, keep: &BTreeSet<ElementId>) -> Self {
        let mut sub = Self::new();
        for node in keep {
            if let Some(neighbors) = self.adjacency.get(node) {
                sub.add_node(*node);
                for n in neighbors.intersection(keep) {
                    sub.add_edge(*node, *n);
                }
            }
        }
        sub
    }

    pub fn nodes(&self) -> impl Iterator<Item = ElementId> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn neighbors(&self, node: ElementId) -> impl Iterator<Item = ElementId> + '_ {
        self.adjacency
            .get(&node)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    #[must_use]
    pub fn contains(&self, node: ElementId) -> bool {
        self.adjacency.contains_key(&node)
    }

    #[must_use]
    pub fn contains_edge(&self, a: ElementId, b: ElementId) -> bool {
        self.adjacency.get(&a).is_some_and(|set| set.contains(&b))
    }

    #[must_use]
    pub fn degree(&self, node: ElementId) -> usize {
        self.adjacency.get(&node).map_or(0, BTreeSet::len)
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Connected components, ordered by their smallest node.
    #[must_use]
    pub fn connected_components(&self) -> Vec<BTreeSet<ElementId>> {
        let mut seen = BTreeSet::new();
        let mut components = Vec::new();

        for start in self.adjacency.keys() {
            if seen.contains(start) {
                continue;
            }
            let mut component = BTreeSet::new();
            let mut stack = vec![*start];
            seen.insert(*start);
            while let Some(current) = stack.pop() {
                component.insert(current);
                for n in self.neighbors(current) {
                    if seen.insert(n) {
                        stack.push(n);
                    }
                }
            }
            components.push(component);
        }

        components
    }

    /// Cycle basis of the graph.
    ///
    /// Each spanning-tree root is the smallest unvisited node; every non-tree
    /// edge closes exactly one basis cycle. A ring of N nodes yields a single
    /// cycle containing all N.
    #[must_use]
    pub fn cycle_basis(&self) -> Vec<Vec<ElementId>> {
        let mut remaining: BTreeSet<ElementId> = self.adjacency.keys().copied().collect();
        let mut cycles = Vec::new();

        while let Some(root) = remaining.pop_first() {
            let mut stack = vec![root];
            let mut pred: BTreeMap<ElementId, ElementId> = BTreeMap::new();
            let mut used: BTreeMap<ElementId, BTreeSet<ElementId>> = BTreeMap::new();
            pred.insert(root, root);
            used.insert(root, BTreeSet::new());

            while let Some(z) = stack.pop() {
                let z_used = used.get(&z).cloned().unwrap_or_default();
                for nbr in self.neighbors(z) {
                    if !used.contains_key(&nbr) {
                        pred.insert(nbr, z);
                        stack.push(nbr);
                        used.insert(nbr, BTreeSet::from([z]));
                    } else if !z_used.contains(&nbr) {
                        let nbr_used = used.get(&nbr).cloned().unwrap_or_default();
                        let mut cycle = vec![nbr, z];
                        let mut p = pred.get(&z).copied().unwrap_or(z);
                        while !nbr_used.contains(&p) {
                            cycle.push(p);
                            let next = pred.get(&p).copied().unwrap_or(p);
                            if next == p {
                                break;
                            }
                            p = next;
                        }
                        cycle.push(p);
                        cycles.push(cycle);
                        if let Some(set) = used.get_mut(&nbr) {
                            set.insert(z);
                        }
                    }
                }
            }

            for visited in pred.keys() {
                remaining.remove(visited);
            }
        }

        cycles
    }

    /// Enumerate simple cycles (length >= 3) that contain at least one node
    /// of `wanted`, stopping after `limit` cycles.
    ///
    /// Each cycle is reported once, starting at its smallest node.
    #[must_use]
    pub fn simple_cycles_with(
        &self,
        wanted: &BTreeSet<ElementId>,
        limit: usize,
    ) -> Vec<Vec<ElementId>> {
        let mut cycles = Vec::new();

        for start in self.adjacency.keys().copied() {
            if cycles.len() >= limit {
                break;
            }
            let mut path = vec![start];
            let mut on_path = BTreeSet::from([start]);
            self.cycles_from(start, &mut path, &mut on_path, wanted, limit, &mut cycles);
        }

        cycles
    }

    /// Recursive DFS helper for `simple_cycles_with`.
    fn cycles_from(
        &self,
        start: ElementId,
        path: &mut Vec<ElementId>,
        on_path: &mut BTreeSet<ElementId>,
        wanted: &BTreeSet<ElementId>,
        limit: usize,
        cycles: &mut Vec<Vec<ElementId>>,
    ) {
        if cycles.len() >= limit || path.len() > MAX_PATH_LENGTH {
            return;
        }
        let Some(&current) = path.last() else {
            return;
        };

        for next in self.neighbors(current) {
            if next == start {
                // Only accept one orientation of each cycle.
                if path.len() >= 3
                    && path.get(1).copied() < path.last().copied()
                    && path.iter().any(|n| wanted.contains(n))
                {
                    cycles.push(path.clone());
                    if cycles.len() >= limit {
                        return;
                    }
                }
                continue;
            }
            if next < start || on_path.contains(&next) {
                continue;
            }
            path.push(next);
            on_path.insert(next);
            self.cycles_from(start, path, on_path, wanted, limit, cycles);
            on_path.remove(&next);
            path.pop();
        }
    }

    /// Remove leaf nodes (degree <= 1) matching `prunable` until none is left.
    pub fn prune_leaves(&mut self, prunable: impl Fn(ElementId) -> bool) {
        loop {
            let leaves: Vec<ElementId> = self
                .adjacency
                .iter()
                .filter(|(node, nbrs)| nbrs.len() <= 1 && prunable(**node))
                .map(|(node, _)| *node)
                .collect();
            if leaves.is_empty() {
                return;
            }
            for leaf in leaves {
                self.remove_node(leaf);
            }
        }
    }

    /// Order the nodes of a path or ring component end to end.
    ///
    /// Paths start at their smallest endpoint, rings at their smallest node.
    /// Returns `None` if the component branches.
    #[must_use]
    pub fn walk(&self, component: &BTreeSet<ElementId>) -> Option<Vec<ElementId>> {
        let degree_in = |n: ElementId| self.neighbors(n).filter(|m| component.contains(m)).count();
        if component.iter().any(|n| degree_in(*n) > 2) {
            return None;
        }
        let start = component
            .iter()
            .copied()
            .find(|n| degree_in(*n) <= 1)
            .or_else(|| component.first().copied())?;

        let mut order = vec![start];
        let mut visited = BTreeSet::from([start]);
        let mut current = start;
        while let Some(next) = self
            .neighbors(current)
            .find(|n| component.contains(n) && !visited.contains(n))
        {
            order.push(next);
            visited.insert(next);
            current = next;
        }
        Some(order)
    }
}

// =============================================================================
// TESTS
// =============================================================================
