//! # Underfloor Heating
//!
//! Long, flat, meandering pipe chains. A chain qualifies when it
//!
//! 1. has at least `min_elements` elements,
//! 2. keeps at least `min_z_share` of its port positions in one horizontal
//!    plane,
//! 3. spans a bounding rectangle larger than `min_area_mm2`,
//! 4. has a pipe spacing inside the spacing window in at least one
//!    direction,
//! 5. has `length * diameter / area` strictly inside the KPI window.
//!
//! Rejected chains are left for the pipe-strand pass.

use super::{Match, Matcher, Pattern, Scan};
use crate::aggregate::{BuildContext, pipe_geometry};
use crate::config::{ReductionConfig, UnderfloorHeatingConfig};
use crate::decision::Outcome;
use crate::element::{Attributes, Element};
use crate::graph::HvacGraph;
use crate::primitives::UFH_ANGLE_TOLERANCE_DEG;
use crate::quantity::Quantity;
use crate::{Attribute, ElementId, ElementKind, HvacError, Value};
use std::collections::BTreeSet;
use tracing::debug;
use uom::si::area::square_millimeter;
use uom::si::f64::Area;
use uom::si::length::millimeter;

/// Strand building blocks. A finished `PipeStrand` aggregate is not one.
const CHAIN_KINDS: [ElementKind; 3] = [
    ElementKind::Pipe,
    ElementKind::PipeFitting,
    ElementKind::Valve,
];

/// Geometric summary of an accepted chain.
#[derive(Debug, Clone, PartialEq)]
pub struct UnderfloorSurvey {
    pub area_mm2: f64,
    pub x_spacing_mm: Option<f64>,
    pub y_spacing_mm: Option<f64>,
    pub length_mm: f64,
    pub diameter_mm: f64,
}

impl UnderfloorSurvey {
    /// Run every filter on a chain. `Err` carries the first failing reason.
    pub fn of(
        graph: &HvacGraph,
        chain: &BTreeSet<ElementId>,
        config: &UnderfloorHeatingConfig,
    ) -> Result<Self, String> {
        if chain.len() < config.min_elements {
            return Err(format!(
                "{} elements, need {}",
                chain.len(),
                config.min_elements
            ));
        }

        let elements: Vec<&Element> = chain.iter().filter_map(|id| graph.element(*id)).collect();
        let positions: Vec<[f64; 3]> = elements
            .iter()
            .flat_map(|e| e.ports.iter())
            .filter_map(|p| graph.port(*p).and_then(|port| port.position))
            .collect();
        if positions.is_empty() {
            return Err("no port positions".into());
        }

        let share = dominant_plane_share(&positions, config.z_tolerance_mm);
        if share < config.min_z_share {
            return Err(format!("only {:.0}% of ports in one plane", share * 100.0));
        }

        let area_mm2 = bounding_area(&positions);
        if area_mm2 <= config.min_area_mm2 {
            return Err(format!("area {:.0} mm2 too small", area_mm2));
        }

        let (x_spacing_mm, y_spacing_mm) = spacings(graph, &elements, config.run_tolerance_mm);
        let in_window = |s: Option<f64>| {
            s.is_some_and(|s| s >= config.min_spacing_mm && s <= config.max_spacing_mm)
        };
        if !in_window(x_spacing_mm) && !in_window(y_spacing_mm) {
            return Err(format!(
                "spacing {:?}/{:?} mm outside window",
                x_spacing_mm, y_spacing_mm
            ));
        }

        let (length, diameter) = pipe_geometry(elements.iter().copied());
        let length_mm = length.get::<millimeter>();
        let diameter_mm = diameter.get::<millimeter>();
        let kpi = length_mm * diameter_mm / area_mm2;
        if kpi <= config.min_kpi || kpi >= config.max_kpi {
            return Err(format!("kpi {:.4} outside window", kpi));
        }

        Ok(Self {
            area_mm2,
            x_spacing_mm,
            y_spacing_mm,
            length_mm,
            diameter_mm,
        })
    }
}

/// Share of positions within `tolerance` of the most populated z level.
fn dominant_plane_share(positions: &[[f64; 3]], tolerance: f64) -> f64 {
    let best = positions
        .iter()
        .map(|anchor| {
            positions
                .iter()
                .filter(|p| (p[2] - anchor[2]).abs() <= tolerance)
                .count()
        })
        .max()
        .unwrap_or(0);
    best as f64 / positions.len() as f64
}

fn bounding_area(positions: &[[f64; 3]]) -> f64 {
    let extent = |axis: usize| {
        let (lo, hi) = positions
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| {
                (lo.min(p[axis]), hi.max(p[axis]))
            });
        hi - lo
    };
    extent(0) * extent(1)
}

/// Pipe spacing along the two primary directions of the layout.
///
/// Pipe orientations are clustered modulo 180 degrees; the two most
/// populated clusters are the primary directions. The runs of a direction
/// are projected onto its normal and the median gap between neighbouring
/// runs is its spacing. The direction nearer the x axis reports as x.
fn spacings(graph: &HvacGraph, elements: &[&Element], tolerance: f64) -> (Option<f64>, Option<f64>) {
    let mut segments: Vec<(f64, [f64; 2])> = Vec::new();
    for element in elements.iter().filter(|e| e.kind == ElementKind::Pipe) {
        let ends: Vec<[f64; 3]> = element
            .ports
            .iter()
            .filter_map(|p| graph.port(*p).and_then(|port| port.position))
            .collect();
        let [a, b] = ends[..] else {
            continue;
        };
        let (dx, dy) = (b[0] - a[0], b[1] - a[1]);
        if dx == 0.0 && dy == 0.0 {
            continue;
        }
        let angle = dy.atan2(dx).to_degrees().rem_euclid(180.0);
        segments.push((angle, [(a[0] + b[0]) / 2.0, (a[1] + b[1]) / 2.0]));
    }

    let spacing = |direction: f64| {
        let (sin, cos) = direction.to_radians().sin_cos();
        let offsets = segments
            .iter()
            .filter(|(angle, _)| angle_distance(*angle, direction) <= UFH_ANGLE_TOLERANCE_DEG)
            .map(|(_, mid)| cos * mid[1] - sin * mid[0])
            .collect();
        median_gap(offsets, tolerance)
    };
    let angles: Vec<f64> = segments.iter().map(|(angle, _)| *angle).collect();
    match primary_directions(&angles, UFH_ANGLE_TOLERANCE_DEG)[..] {
        [only] if angle_distance(only, 0.0) <= 45.0 => (spacing(only), None),
        [only] => (None, spacing(only)),
        [a, b] if angle_distance(a, 0.0) <= angle_distance(b, 0.0) => (spacing(a), spacing(b)),
        [a, b] => (spacing(b), spacing(a)),
        _ => (None, None),
    }
}

/// Distance between two orientations in degrees, modulo 180.
fn angle_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(180.0);
    d.min(180.0 - d)
}

/// Up to two orientations, most populated first. Each is the angle with
/// the most others within `tolerance`; ties go to the smaller angle.
fn primary_directions(angles: &[f64], tolerance: f64) -> Vec<f64> {
    let mut remaining = angles.to_vec();
    let mut directions = Vec::new();
    while directions.len() < 2 {
        let support = |anchor: f64| {
            remaining
                .iter()
                .filter(|a| angle_distance(**a, anchor) <= tolerance)
                .count()
        };
        let Some(anchor) = remaining
            .iter()
            .copied()
            .max_by(|a, b| support(*a).cmp(&support(*b)).then_with(|| b.total_cmp(a)))
        else {
            break;
        };
        remaining.retain(|a| angle_distance(*a, anchor) > tolerance);
        directions.push(anchor);
    }
    directions
}

fn median_gap(mut coordinates: Vec<f64>, tolerance: f64) -> Option<f64> {
    coordinates.sort_by(f64::total_cmp);
    let mut runs: Vec<f64> = Vec::new();
    for c in coordinates {
        match runs.last() {
            Some(last) if (c - last).abs() <= tolerance => {}
            _ => runs.push(c),
        }
    }
    let mut gaps: Vec<f64> = runs.windows(2).map(|w| w[1] - w[0]).collect();
    if gaps.is_empty() {
        return None;
    }
    gaps.sort_by(f64::total_cmp);
    let mid = gaps.len() / 2;
    Some(if gaps.len() % 2 == 0 {
        (gaps[mid - 1] + gaps[mid]) / 2.0
    } else {
        gaps[mid]
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnderfloorHeatingMatcher;

impl Matcher for UnderfloorHeatingMatcher {
    fn pattern(&self) -> Pattern {
        Pattern::UnderfloorHeating
    }

    fn find_matches(&self, graph: &HvacGraph, config: &ReductionConfig) -> Scan {
        let kinds = BTreeSet::from(CHAIN_KINDS);
        let mut matches = Vec::new();
        for chain in graph.get_type_chains(&kinds, true) {
            let nodes: BTreeSet<ElementId> = chain.into_iter().collect();
            match UnderfloorSurvey::of(graph, &nodes, &config.underfloor_heating) {
                Ok(_) => matches.push(Match::new(Pattern::UnderfloorHeating, nodes)),
                Err(reason) => debug!(elements = nodes.len(), %reason, "not underfloor heating"),
            }
        }
        Scan::from_matches(matches)
    }

    fn attributes(&self, ctx: &BuildContext<'_>) -> Result<Outcome<Attributes>, HvacError> {
        let survey = UnderfloorSurvey::of(
            ctx.graph,
            &ctx.candidate.nodes,
            &ctx.config.underfloor_heating,
        )
        .map_err(|reason| HvacError::rejected(Pattern::UnderfloorHeating, reason))?;

        let mut attributes = Attributes::new();
        attributes.set(
            Attribute::HeatingArea,
            Value::Quantity(Area::new::<square_millimeter>(survey.area_mm2).into()),
        );
        attributes.set_quantity(Attribute::XSpacing, survey.x_spacing_mm.map(Quantity::mm));
        attributes.set_quantity(Attribute::YSpacing, survey.y_spacing_mm.map(Quantity::mm));
        attributes.set(
            Attribute::Length,
            Value::Quantity(Quantity::mm(survey.length_mm)),
        );
        attributes.set(
            Attribute::Diameter,
            Value::Quantity(Quantity::mm(survey.diameter_mm)),
        );
        Ok(Outcome::Ready(attributes))
    }
}
