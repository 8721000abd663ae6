//! # Reduction Scenarios
//!
//! End-to-end reductions of small hand-built networks, one module per
//! pattern family.

use hvacnet_core::{
    Answer, Attribute, DecisionRequest, DefaultsHandler, ElementId, ElementKind, HvacError,
    HvacGraph, Network, Pattern, Quantity, Reducer, ReductionConfig, ReplayHandler, Value,
    canonical_checksum,
};
use std::collections::BTreeMap;
use uom::si::area::square_meter;
use uom::si::length::millimeter;

// =============================================================================
// HELPERS
// =============================================================================

fn pipe(net: &mut Network, guid: &str, length: f64, diameter: f64) -> ElementId {
    let id = net.add_element(guid, ElementKind::Pipe, 2).expect("add");
    net.set_quantity(id, Attribute::Length, Quantity::mm(length))
        .expect("set");
    net.set_quantity(id, Attribute::Diameter, Quantity::mm(diameter))
        .expect("set");
    id
}

/// A length attribute in millimetres.
fn length_mm(element: &hvacnet_core::Element, attribute: Attribute) -> f64 {
    element
        .quantity(attribute)
        .and_then(Quantity::length)
        .expect("length attribute")
        .get::<millimeter>()
}

fn reduce(graph: &mut HvacGraph, config: ReductionConfig) -> hvacnet_core::ReductionReport {
    Reducer::new(config)
        .run(graph, &mut DefaultsHandler)
        .expect("reduction")
}

fn only(pattern: Pattern) -> ReductionConfig {
    ReductionConfig::with_order([pattern])
}

/// The single active element of `kind`.
fn single(graph: &HvacGraph, kind: ElementKind) -> &hvacnet_core::Element {
    let mut found = graph.active_elements().filter(|e| e.kind == kind);
    let element = found.next().expect("one element of kind");
    assert!(found.next().is_none(), "more than one {:?}", kind);
    element
}

/// Distributor with a pipe - emitter - pipe loop on two of its ports.
fn consumer_loop(net: &mut Network, distributor: ElementId, tag: &str) -> ElementId {
    let supply = pipe(net, &format!("{}-supply", tag), 500.0, 20.0);
    let heater = net
        .add_element(format!("{}-heater", tag), ElementKind::SpaceHeater, 2)
        .expect("add");
    net.set_quantity(heater, Attribute::RatedPower, Quantity::watt(1500.0))
        .expect("set");
    net.set_quantity(heater, Attribute::FlowTemperature, Quantity::celsius(70.0))
        .expect("set");
    let ret = pipe(net, &format!("{}-return", tag), 500.0, 20.0);
    net.chain(&[distributor, supply, heater, ret, distributor])
        .expect("chain");
    heater
}

// =============================================================================
// PIPE STRAND
// =============================================================================

mod pipe_strand {
    use super::*;

    #[test]
    fn four_pipes_become_one_strand() {
        let mut net = Network::new();
        let pump = net.add_element("pump", ElementKind::Pump, 2).expect("add");
        let a = pipe(&mut net, "A", 300.0, 32.0);
        let b = pipe(&mut net, "B", 800.0, 32.0);
        let c = pipe(&mut net, "C", 300.0, 25.0);
        let d = pipe(&mut net, "D", 500.0, 25.0);
        let heater = net
            .add_element("heater", ElementKind::SpaceHeater, 2)
            .expect("add");
        net.chain(&[pump, a, b, c, d, heater]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, only(Pattern::PipeStrand));
        assert_eq!(report.aggregated(Pattern::PipeStrand), 1);
        assert_eq!(graph.element_count(), 3);

        let strand = single(&graph, ElementKind::PipeStrand);
        let length = length_mm(strand, Attribute::Length);
        let diameter = length_mm(strand, Attribute::Diameter);
        assert!((length - 1900.0).abs() < 1e-9);
        assert!((25.0..=32.0).contains(&diameter));
        assert!((diameter - 55_200.0 / 1900.0).abs() < 1e-9);
        assert_eq!(strand.members.len(), 4);
        assert_eq!(strand.ports.len(), 2);
    }

    #[test]
    fn pumps_split_strands() {
        let mut net = Network::new();
        let ids = [
            pipe(&mut net, "a", 100.0, 20.0),
            pipe(&mut net, "b", 100.0, 20.0),
            net.add_element("pump", ElementKind::Pump, 2).expect("add"),
            pipe(&mut net, "c", 100.0, 20.0),
            pipe(&mut net, "d", 100.0, 20.0),
            net.add_element("end", ElementKind::SpaceHeater, 2)
                .expect("add"),
        ];
        net.chain(&ids).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, only(Pattern::PipeStrand));
        // The leading strand has a free end and only one edge port.
        assert_eq!(report.passes[0].matched, 2);
        assert_eq!(report.aggregated(Pattern::PipeStrand), 1);
        assert_eq!(report.total_rejected(), 1);
    }
}

// =============================================================================
// UNDERFLOOR HEATING
// =============================================================================

mod underfloor_heating {
    use super::*;

    const RUN_MM: f64 = 1500.0;
    const SPACING_MM: f64 = 150.0;
    const RUNS: usize = 10;

    /// A flat meander between the two ports of a distributor: `RUNS` runs
    /// along x joined by short connectors, optionally led in by one more
    /// pipe along y.
    fn meander(lead_in: bool) -> HvacGraph {
        meander_led_in_by(lead_in.then_some(ElementKind::Pipe))
    }

    /// `meander`, with the lead-in made of `lead_in` when given.
    fn meander_led_in_by(lead_in: Option<ElementKind>) -> HvacGraph {
        let mut net = Network::new();
        let distributor = net
            .add_element("dist", ElementKind::Distributor, 2)
            .expect("add");

        let mut segments: Vec<([f64; 3], [f64; 3])> = Vec::new();
        if lead_in.is_some() {
            segments.push(([0.0, -SPACING_MM, 0.0], [0.0, 0.0, 0.0]));
        }
        for k in 0..RUNS {
            let y = SPACING_MM * k as f64;
            let (x0, x1) = if k % 2 == 0 { (0.0, RUN_MM) } else { (RUN_MM, 0.0) };
            segments.push(([x0, y, 0.0], [x1, y, 0.0]));
            if k + 1 < RUNS {
                segments.push(([x1, y, 0.0], [x1, y + SPACING_MM, 0.0]));
            }
        }

        let mut ids = vec![distributor];
        for (i, (start, end)) in segments.iter().enumerate() {
            let length = ((end[0] - start[0]).powi(2) + (end[1] - start[1]).powi(2)).sqrt();
            let guid = format!("ufh-{}", i);
            let id = match lead_in {
                Some(kind) if i == 0 && kind != ElementKind::Pipe => {
                    let id = net.add_element(guid, kind, 2).expect("add");
                    net.set_quantity(id, Attribute::Length, Quantity::mm(length))
                        .expect("set");
                    net.set_quantity(id, Attribute::Diameter, Quantity::mm(10.0))
                        .expect("set");
                    id
                }
                _ => pipe(&mut net, &guid, length, 10.0),
            };
            let inlet = net.port_of(id, 0).expect("port");
            let outlet = net.port_of(id, 1).expect("port");
            net.set_port_position(inlet, *start).expect("set");
            net.set_port_position(outlet, *end).expect("set");
            ids.push(id);
        }
        ids.push(distributor);
        net.chain(&ids).expect("chain");
        HvacGraph::build(net).expect("build")
    }

    #[test]
    fn nineteen_elements_are_not_enough() {
        let mut graph = meander(false);
        assert_eq!(graph.element_count(), 20);

        let report = reduce(&mut graph, only(Pattern::UnderfloorHeating));
        assert_eq!(report.passes[0].matched, 0);
        assert_eq!(graph.element_count(), 20);
    }

    #[test]
    fn twenty_elements_are_accepted() {
        let mut graph = meander(true);
        let report = reduce(&mut graph, only(Pattern::UnderfloorHeating));
        assert_eq!(report.aggregated(Pattern::UnderfloorHeating), 1);
        assert_eq!(graph.element_count(), 2);

        let ufh = single(&graph, ElementKind::UnderfloorHeating);
        assert!((length_mm(ufh, Attribute::XSpacing) - SPACING_MM).abs() < 1e-9);
        let area = ufh
            .quantity(Attribute::HeatingArea)
            .and_then(Quantity::area)
            .expect("area");
        assert!((area.get::<square_meter>() - 2.25).abs() < 1e-9);
        assert!((length_mm(ufh, Attribute::Length) - 16_500.0).abs() < 1e-6);
    }

    #[test]
    fn valve_in_the_meander_is_part_of_the_circuit() {
        let mut graph = meander_led_in_by(Some(ElementKind::Valve));
        let report = reduce(&mut graph, only(Pattern::UnderfloorHeating));
        assert_eq!(report.aggregated(Pattern::UnderfloorHeating), 1);
        assert_eq!(graph.element_count(), 2);

        let ufh = single(&graph, ElementKind::UnderfloorHeating);
        assert_eq!(ufh.members.len(), 20);
        assert!((length_mm(ufh, Attribute::Length) - 16_500.0).abs() < 1e-6);
    }

    #[test]
    fn rotated_meander_keeps_its_spacing() {
        let mut graph = rotated_meander(30.0);
        let report = reduce(&mut graph, only(Pattern::UnderfloorHeating));
        assert_eq!(report.aggregated(Pattern::UnderfloorHeating), 1);

        let ufh = single(&graph, ElementKind::UnderfloorHeating);
        let spacings: Vec<f64> = [Attribute::XSpacing, Attribute::YSpacing]
            .into_iter()
            .filter(|a| ufh.quantity(*a).is_some())
            .map(|a| length_mm(ufh, a))
            .collect();
        assert!(spacings.iter().any(|s| (s - SPACING_MM).abs() < 1e-6));
    }

    /// The lead-in meander turned by `degrees` about the origin.
    fn rotated_meander(degrees: f64) -> HvacGraph {
        let (sin, cos) = degrees.to_radians().sin_cos();
        let turn = |p: [f64; 3]| [cos * p[0] - sin * p[1], sin * p[0] + cos * p[1], p[2]];

        let graph = meander(true);
        let mut net = Network::new();
        let mut ids = BTreeMap::new();
        for element in graph.active_elements() {
            let id = net
                .add_element(element.guid.as_str(), element.kind, element.ports.len())
                .expect("add");
            for (attribute, value) in element.attributes.iter() {
                net.set_attribute(id, attribute, value).expect("set");
            }
            for (index, port) in element.ports.iter().enumerate() {
                if let Some(position) = graph.port(*port).and_then(|p| p.position) {
                    let copy = net.port_of(id, index).expect("port");
                    net.set_port_position(copy, turn(position)).expect("set");
                }
            }
            ids.insert(element.id, id);
        }
        for (a, b) in graph.get_connections() {
            let end = |port| {
                let original = graph.port(port).expect("port");
                let element = graph.element(original.parent).expect("element");
                let index = element
                    .ports
                    .iter()
                    .position(|p| *p == port)
                    .expect("index");
                net.port_of(ids[&original.parent], index).expect("port")
            };
            let (pa, pb) = (end(a), end(b));
            net.connect(pa, pb).expect("connect");
        }
        HvacGraph::build(net).expect("build")
    }

    #[test]
    fn rejected_chain_is_left_for_the_strand_pass() {
        let mut graph = meander(false);
        let report = reduce(&mut graph, ReductionConfig::default());
        assert_eq!(report.aggregated(Pattern::UnderfloorHeating), 0);
        assert_eq!(report.aggregated(Pattern::PipeStrand), 1);
    }
}

// =============================================================================
// PARALLEL PUMPS
// =============================================================================

mod parallel_pump {
    use super::*;

    /// `feeds` pipes on the first hub, one return pipe on the second, and
    /// one pump per power between the hubs.
    fn pumps_between_hubs(powers: &[f64], feeds: usize) -> HvacGraph {
        let mut net = Network::new();
        let hub_a = net
            .add_element("hub-a", ElementKind::PipeFitting, feeds + powers.len())
            .expect("add");
        let hub_b = net
            .add_element("hub-b", ElementKind::PipeFitting, 1 + powers.len())
            .expect("add");
        for i in 0..feeds {
            let feed = pipe(&mut net, &format!("feed-{}", i), 100.0, 40.0);
            net.link(feed, hub_a).expect("link");
        }
        let ret = pipe(&mut net, "ret", 100.0, 40.0);
        net.link(hub_b, ret).expect("link");
        for (i, power) in powers.iter().enumerate() {
            let pump = net
                .add_element(format!("pump-{}", i), ElementKind::Pump, 2)
                .expect("add");
            net.set_quantity(pump, Attribute::RatedPower, Quantity::watt(*power))
                .expect("set");
            net.set_quantity(pump, Attribute::RatedHeight, Quantity::mm(4000.0 + *power))
                .expect("set");
            net.link(hub_a, pump).expect("link");
            net.link(pump, hub_b).expect("link");
        }
        HvacGraph::build(net).expect("build")
    }

    #[test]
    fn equal_pumps_are_aggregated_with_their_hubs() {
        let mut graph = pumps_between_hubs(&[1000.0, 1000.0], 1);
        let report = reduce(&mut graph, only(Pattern::ParallelPump));
        assert_eq!(report.aggregated(Pattern::ParallelPump), 1);
        // feed, ret and the aggregate
        assert_eq!(graph.element_count(), 3);

        let pumps = single(&graph, ElementKind::ParallelPump);
        assert_eq!(pumps.members.len(), 4);
        assert_eq!(
            pumps.quantity(Attribute::RatedPower),
            Some(Quantity::watt(2000.0))
        );
        assert_eq!(
            pumps.quantity(Attribute::RatedHeight),
            Some(Quantity::mm(5000.0))
        );
        assert_eq!(pumps.attributes.flag(Attribute::HasPump), Some(true));
    }

    #[test]
    fn pumps_beyond_threshold_stay_separate() {
        let mut graph = pumps_between_hubs(&[1000.0, 1200.0], 1);
        let before = graph.element_count();
        let report = reduce(&mut graph, only(Pattern::ParallelPump));
        assert_eq!(report.passes[0].matched, 0);
        assert_eq!(graph.element_count(), before);
        assert_eq!(
            graph
                .active_elements()
                .filter(|e| e.kind == ElementKind::Pump)
                .count(),
            2
        );
    }

    #[test]
    fn fanned_out_hub_is_collapsed_into_a_fitting() {
        let mut graph = pumps_between_hubs(&[800.0, 810.0], 3);
        let report = reduce(&mut graph, only(Pattern::ParallelPump));
        assert_eq!(report.aggregated(Pattern::ParallelPump), 1);
        graph.validate().expect("valid");

        let fitting = single(&graph, ElementKind::AggregatedPipeFitting);
        let pumps = single(&graph, ElementKind::ParallelPump);
        // three feeds and one shared port towards the pumps
        assert_eq!(fitting.ports.len(), 4);
        assert_eq!(pumps.ports.len(), 2);
        assert!(graph.element_neighbors(fitting.id).contains(&pumps.id));
        // three feeds, ret, the fitting and the pumps
        assert_eq!(graph.element_count(), 6);
    }

    #[test]
    fn hub_with_two_outward_connections_is_absorbed() {
        let mut graph = pumps_between_hubs(&[800.0, 810.0], 2);
        let report = reduce(&mut graph, only(Pattern::ParallelPump));
        assert_eq!(report.aggregated(Pattern::ParallelPump), 1);
        graph.validate().expect("valid");

        assert_eq!(
            graph
                .active_elements()
                .filter(|e| e.kind == ElementKind::AggregatedPipeFitting)
                .count(),
            0
        );
        let pumps = single(&graph, ElementKind::ParallelPump);
        // two pumps and both hubs
        assert_eq!(pumps.members.len(), 4);
        // feed-0, feed-1 and ret
        assert_eq!(pumps.ports.len(), 3);
        assert_eq!(graph.element_count(), 4);
    }
}

// =============================================================================
// CONSUMERS & DISTRIBUTOR MODULES
// =============================================================================

mod consumers {
    use super::*;

    #[test]
    fn emitter_loop_becomes_consumer() {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 2)
            .expect("add");
        consumer_loop(&mut net, dist, "c1");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, only(Pattern::Consumer));
        assert_eq!(report.aggregated(Pattern::Consumer), 1);
        let consumer = single(&graph, ElementKind::Consumer);
        assert_eq!(
            consumer.quantity(Attribute::RatedPower),
            Some(Quantity::watt(1500.0))
        );
        assert_eq!(
            consumer.quantity(Attribute::FlowTemperature),
            Some(Quantity::celsius(70.0))
        );
        assert_eq!(consumer.attributes.flag(Attribute::HasPump), Some(false));
    }

    #[test]
    fn heat_pump_does_not_block_a_consumer() {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 6)
            .expect("add");
        consumer_loop(&mut net, dist, "c1");
        let heat_pump = net
            .add_element("heat-pump", ElementKind::HeatPump, 2)
            .expect("add");
        let heater = net
            .add_element("c2-heater", ElementKind::SpaceHeater, 2)
            .expect("add");
        net.chain(&[dist, heat_pump, heater, dist]).expect("chain");
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let flow = pipe(&mut net, "gen-flow", 200.0, 32.0);
        let back = pipe(&mut net, "gen-return", 200.0, 32.0);
        net.chain(&[dist, flow, boiler, back, dist]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(
            &mut graph,
            ReductionConfig::with_order([
                Pattern::Consumer,
                Pattern::ConsumerHeatingDistributorModule,
            ]),
        );
        assert_eq!(report.aggregated(Pattern::Consumer), 2);
        assert_eq!(report.passes[0].skipped_mixed, 0);
        assert_eq!(report.aggregated(Pattern::ConsumerHeatingDistributorModule), 1);

        // Both consumer loops and the distributor; the boiler side stays out.
        let module = single(&graph, ElementKind::ConsumerHeatingDistributorModule);
        assert_eq!(module.members.len(), 3);
        assert!(graph.is_active(boiler));
        assert_eq!(graph.element_count(), 4);
    }

    #[test]
    fn consumer_and_generator_mix_is_skipped() {
        let mut net = Network::new();
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let heater = net
            .add_element("heater", ElementKind::SpaceHeater, 2)
            .expect("add");
        let supply = pipe(&mut net, "supply", 100.0, 20.0);
        let ret = pipe(&mut net, "ret", 100.0, 20.0);
        net.chain(&[boiler, supply, heater, ret, boiler]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, only(Pattern::Consumer));
        let stats = report.passes[0];
        assert_eq!(stats.matched, 0);
        assert_eq!(stats.skipped_mixed, 1);
        assert_eq!(graph.element_count(), 4);
        assert_eq!(single(&graph, ElementKind::Boiler).id, boiler);
    }

    #[test]
    fn distributor_module_with_generator_loop() {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 6)
            .expect("add");
        consumer_loop(&mut net, dist, "c1");
        consumer_loop(&mut net, dist, "c2");
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        net.set_quantity(boiler, Attribute::RatedPower, Quantity::watt(12_000.0))
            .expect("set");
        let flow = pipe(&mut net, "gen-flow", 200.0, 32.0);
        let back = pipe(&mut net, "gen-return", 200.0, 32.0);
        net.chain(&[dist, flow, boiler, back, dist]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, ReductionConfig::default());
        assert_eq!(report.aggregated(Pattern::Consumer), 2);
        assert_eq!(report.aggregated(Pattern::ConsumerHeatingDistributorModule), 1);
        assert_eq!(report.aggregated(Pattern::GeneratorOneFluid), 1);
        assert_eq!(report.decisions_asked, 0);
        assert_eq!(graph.element_count(), 2);

        let module = single(&graph, ElementKind::ConsumerHeatingDistributorModule);
        assert_eq!(
            module.quantity(Attribute::RatedPower),
            Some(Quantity::watt(3000.0))
        );
        assert_eq!(
            module.attributes.get(Attribute::UndefinedConsumerPorts),
            Some(Value::Count(0))
        );
        let generator = single(&graph, ElementKind::GeneratorOneFluid);
        assert_eq!(
            generator.quantity(Attribute::RatedPower),
            Some(Quantity::watt(12_000.0))
        );
        assert_eq!(generator.attributes.flag(Attribute::HasBypass), Some(false));
        assert!(graph.element_neighbors(module.id).contains(&generator.id));
    }

    #[test]
    fn odd_undefined_ports_reject_the_module() {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 5)
            .expect("add");
        consumer_loop(&mut net, dist, "c1");
        let stub = pipe(&mut net, "stub", 50.0, 20.0);
        net.link(dist, stub).expect("link");
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let flow = pipe(&mut net, "gen-flow", 200.0, 32.0);
        let back = pipe(&mut net, "gen-return", 200.0, 32.0);
        net.chain(&[dist, flow, boiler, back, dist]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(
            &mut graph,
            ReductionConfig::with_order([
                Pattern::Consumer,
                Pattern::ConsumerHeatingDistributorModule,
            ]),
        );
        let module = report.passes[1];
        assert_eq!(module.matched, 1);
        assert_eq!(module.rejected, 1);
        assert_eq!(module.aggregated, 0);
        single(&graph, ElementKind::Distributor);
    }
}

// =============================================================================
// GENERATORS
// =============================================================================

mod generator {
    use super::*;

    /// dist - a1 - j1 - boiler - j2 - a2 - dist, with a bypass pipe j1 - j2.
    fn loop_with_bypass() -> (HvacGraph, ElementId) {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 2)
            .expect("add");
        let a1 = pipe(&mut net, "a1", 100.0, 25.0);
        let j1 = net.add_element("j1", ElementKind::Junction, 3).expect("add");
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let j2 = net.add_element("j2", ElementKind::Junction, 3).expect("add");
        let a2 = pipe(&mut net, "a2", 100.0, 25.0);
        net.chain(&[dist, a1, j1, boiler, j2, a2, dist]).expect("chain");
        let bypass = pipe(&mut net, "bypass", 300.0, 25.0);
        net.chain(&[j1, bypass, j2]).expect("chain");
        (HvacGraph::build(net).expect("build"), bypass)
    }

    /// dist - pipe - boiler - pipe - three-way valve - pipe - dist.
    fn loop_with_mixing_valve() -> HvacGraph {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 2)
            .expect("add");
        let flow = pipe(&mut net, "flow", 100.0, 25.0);
        let boiler = net.add_element("boiler", ElementKind::Boiler, 2).expect("add");
        let mid = pipe(&mut net, "mid", 100.0, 25.0);
        let valve = net
            .add_element("mixer", ElementKind::ThreeWayValve, 2)
            .expect("add");
        let back = pipe(&mut net, "back", 100.0, 25.0);
        net.chain(&[dist, flow, boiler, mid, valve, back, dist])
            .expect("chain");
        HvacGraph::build(net).expect("build")
    }

    #[test]
    fn parallel_boilers_share_no_nodes() {
        let mut net = Network::new();
        let dist = net
            .add_element("dist", ElementKind::Distributor, 2)
            .expect("add");
        let flow = pipe(&mut net, "flow", 100.0, 25.0);
        let t1 = net.add_element("t1", ElementKind::Junction, 3).expect("add");
        let b1 = net.add_element("b1", ElementKind::Boiler, 2).expect("add");
        let b2 = net.add_element("b2", ElementKind::Boiler, 2).expect("add");
        let t2 = net.add_element("t2", ElementKind::Junction, 3).expect("add");
        let back = pipe(&mut net, "back", 100.0, 25.0);
        net.chain(&[dist, flow, t1, b1, t2, back, dist]).expect("chain");
        net.chain(&[t1, b2, t2]).expect("chain");
        let mut graph = HvacGraph::build(net).expect("build");

        let report = reduce(&mut graph, only(Pattern::GeneratorOneFluid));
        assert_eq!(report.aggregated(Pattern::GeneratorOneFluid), 2);
        graph.validate().expect("valid");

        let generators: Vec<_> = graph
            .active_elements()
            .filter(|e| e.kind == ElementKind::GeneratorOneFluid)
            .collect();
        assert_eq!(generators.len(), 2);
        for generator in &generators {
            assert_eq!(generator.members.len(), 1);
            assert!(generator.members[0] == b1 || generator.members[0] == b2);
        }
        assert!(graph.is_active(t1) && graph.is_active(t2));
        // dist, flow, t1, t2, back and the two generators
        assert_eq!(graph.element_count(), 7);
    }

    #[test]
    fn bypass_is_folded_into_the_loop() {
        let (mut graph, bypass) = loop_with_bypass();
        let report = reduce(&mut graph, ReductionConfig::default());
        assert_eq!(report.aggregated(Pattern::GeneratorOneFluid), 1);
        assert_eq!(report.decisions_asked, 0);

        let generator = single(&graph, ElementKind::GeneratorOneFluid);
        assert!(generator.members.contains(&bypass));
        assert_eq!(generator.attributes.flag(Attribute::HasBypass), Some(true));
        assert_eq!(graph.element_count(), 2);
    }

    #[test]
    fn mixing_valve_answer_is_used() {
        let mut graph = loop_with_mixing_valve();
        let mut yes = |request: &DecisionRequest| -> Result<Answer, HvacError> {
            assert!(request.key.ends_with("/has_bypass"));
            Ok(Answer::Bool(true))
        };
        let mut reducer = Reducer::new(ReductionConfig::default());
        let report = reducer.run(&mut graph, &mut yes).expect("run");

        assert_eq!(report.decisions_asked, 1);
        let generator = single(&graph, ElementKind::GeneratorOneFluid);
        assert_eq!(generator.attributes.flag(Attribute::HasBypass), Some(true));
    }

    #[test]
    fn cancelled_decision_rolls_back_the_run() {
        let mut graph = loop_with_mixing_valve();
        let before = canonical_checksum(&graph).expect("checksum");
        let mut cancel = |request: &DecisionRequest| -> Result<Answer, HvacError> {
            Err(HvacError::DecisionCancelled {
                key: request.key.clone(),
            })
        };

        let err = Reducer::new(ReductionConfig::default())
            .run(&mut graph, &mut cancel)
            .expect_err("cancelled");
        assert!(!err.is_recoverable());
        assert_eq!(canonical_checksum(&graph).expect("checksum"), before);
    }

    #[test]
    fn replay_reproduces_the_reduced_network() {
        let mut first = loop_with_mixing_valve();
        let mut reducer = Reducer::new(ReductionConfig::default());
        let mut no = |_: &DecisionRequest| -> Result<Answer, HvacError> { Ok(Answer::Bool(false)) };
        reducer.run(&mut first, &mut no).expect("run");
        let recorded: BTreeMap<String, Answer> = reducer.book().answers().clone();

        let mut second = loop_with_mixing_valve();
        let mut replay = ReplayHandler::new(recorded, DefaultsHandler);
        let report = Reducer::new(ReductionConfig::default())
            .run(&mut second, &mut replay)
            .expect("replay");

        assert_eq!(report.decisions_asked, 1);
        assert_eq!(
            canonical_checksum(&first).expect("checksum"),
            canonical_checksum(&second).expect("checksum")
        );
    }
}
