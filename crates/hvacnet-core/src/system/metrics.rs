//! # Network Metrics
//!
//! Informational statistics of a graph. Nothing here gates reduction.

use crate::ElementKind;
use crate::config::ReductionConfig;
use crate::graph::HvacGraph;
use crate::patterns::{Pattern, matcher};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Structural summary of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkMetrics {
    pub elements: usize,
    pub connections: usize,
    pub per_kind: BTreeMap<ElementKind, usize>,
    /// Size of the cycle basis of the element graph.
    pub cycles: usize,
    pub connected_components: usize,
    /// Candidates each pattern would report on this graph right now.
    pub candidates: BTreeMap<Pattern, usize>,
}

impl NetworkMetrics {
    #[must_use]
    pub fn of(graph: &HvacGraph, config: &ReductionConfig) -> Self {
        let mut per_kind = BTreeMap::new();
        for element in graph.active_elements() {
            *per_kind.entry(element.kind).or_insert(0) += 1;
        }
        let topology = graph.topology();
        let candidates = config
            .order
            .iter()
            .map(|pattern| {
                let scan = matcher(*pattern).find_matches(graph, config);
                (*pattern, scan.matches.len())
            })
            .collect();

        Self {
            elements: graph.element_count(),
            connections: graph.get_connections().len(),
            per_kind,
            cycles: topology.cycle_basis().len(),
            connected_components: topology.connected_components().len(),
            candidates,
        }
    }
}
