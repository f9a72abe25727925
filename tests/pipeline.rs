//! End-to-end tests of the placement and planning pipeline.

use std::collections::HashSet;
use std::io::{BufReader, Write};

use hexwire::cli::{place, ResolvedTopology};
use hexwire::config::MachineParams;
use hexwire::plan::{
    flatten_wiring_plan, generate_wiring_plan, read_plan_csv, to_installation_plan, wiring_diff,
    write_plan_csv,
};
use hexwire::probe::{SimulatedFabric, WiringProbe};
use hexwire::utils::{Transformation, UncrinkleDirection};
use hexwire::SocketRef;

fn topology(width: i32, height: i32, transformation: Transformation) -> ResolvedTopology {
    ResolvedTopology {
        width,
        height,
        transformation,
        uncrinkle_direction: UncrinkleDirection::Rows,
        folds: (1, 1),
    }
}

/// Parameters for a machine of a single cabinet with one populated frame.
fn single_frame_params(wire_lengths: Vec<f64>, minimum_arc_height: f64) -> MachineParams {
    let mut params = MachineParams::default();
    params.machine.num_cabinets = 1;
    params.machine.num_frames = 1;
    params.machine.wire_lengths = wire_lengths;
    params.machine.minimum_arc_height = minimum_arc_height;
    params
}

#[test]
fn single_triad_plans_nine_short_wires() {
    let topology = topology(1, 1, Transformation::Shear);
    let params = single_frame_params(vec![0.15, 0.30, 0.50], 0.0);
    let placed = place(&topology, &params).unwrap();

    assert_eq!(placed.machine.num_boards(), 3);

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();
    let flat = flatten_wiring_plan(&plan, &placed.cabinet);

    // Three boards, three wires each; everything within the single frame
    // and short enough for the shortest cable.
    assert_eq!(flat.len(), 9);
    assert!(plan.between_frames.values().all(Vec::is_empty));
    assert!(plan.between_cabinets.values().all(Vec::is_empty));
    assert!(flat.iter().all(|&(_, _, length)| length == 0.15));
}

#[test]
fn two_by_two_shear_fills_one_frame() {
    let topology = ResolvedTopology {
        width: 2,
        height: 2,
        transformation: Transformation::Shear,
        uncrinkle_direction: UncrinkleDirection::Rows,
        folds: (2, 2),
    };
    let params = single_frame_params(vec![0.15, 0.30, 0.50, 1.00], 0.0);
    let placed = place(&topology, &params).unwrap();

    // Twelve boards in one 24-slot frame.
    assert_eq!(placed.machine.num_boards(), 12);
    assert!(placed
        .cabinetised
        .iter()
        .all(|&(_, c)| c.cabinet == 0 && c.frame == 0 && c.board < 24));

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();

    // All 36 wires stay within the frame.
    let flat = flatten_wiring_plan(&plan, &placed.cabinet);
    assert_eq!(flat.len(), 36);
    assert!(plan.between_frames.values().all(Vec::is_empty));
    assert!(plan.between_cabinets.values().all(Vec::is_empty));

    // Each axis contributes one wire per board.
    for (&(c, f, _direction), wires) in &plan.between_boards {
        assert_eq!((c, f), (0, 0));
        assert_eq!(wires.len(), 12);
    }
}

#[test]
fn slack_orders_installation_within_each_axis() {
    let topology = topology(2, 4, Transformation::Slice);
    let params = single_frame_params(vec![0.15, 0.30, 0.50, 1.00], 0.0);
    let placed = place(&topology, &params).unwrap();

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();

    for wires in plan.between_boards.values() {
        let positions: std::collections::HashMap<_, _> =
            placed.physical.iter().copied().collect();
        let slacks: Vec<f64> = wires
            .iter()
            .map(|&((src_board, src_dir), (dst_board, dst_dir), length)| {
                let src = positions[&src_board] + placed.cabinet.board_wire_offset(src_dir);
                let dst = positions[&dst_board] + placed.cabinet.board_wire_offset(dst_dir);
                length - (src - dst).magnitude()
            })
            .collect();
        assert!(
            slacks.windows(2).all(|pair| pair[0] <= pair[1] + 1e-12),
            "tightest wires must come first: {slacks:?}"
        );
    }
}

#[test]
fn discovery_round_trips_a_correctly_installed_plan() {
    let topology = topology(1, 1, Transformation::Shear);
    let params = single_frame_params(vec![0.15, 0.30, 0.50], 0.0);
    let placed = place(&topology, &params).unwrap();

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();
    let entries = to_installation_plan(
        &flatten_wiring_plan(&plan, &placed.cabinet),
        &placed.cabinetised,
    );

    // Install every planned wire on a simulated fabric.
    let mut fabric = SimulatedFabric::unwired();
    for entry in &entries {
        fabric.connect(entry.src, entry.dst);
    }

    let probe = WiringProbe::new(&mut fabric, 1, 1, 3).unwrap();
    let discovered: HashSet<(SocketRef, SocketRef)> =
        probe.discover_wires(&mut fabric).unwrap().into_iter().collect();
    let planned: HashSet<(SocketRef, SocketRef)> =
        entries.iter().map(|e| (e.src, e.dst)).collect();

    assert_eq!(discovered, planned);
}

#[test]
fn repair_plan_removes_strays_then_restores_missing_wires() {
    let topology = topology(1, 1, Transformation::Shear);
    let params = single_frame_params(vec![0.15, 0.30, 0.50], 0.0);
    let placed = place(&topology, &params).unwrap();

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();
    let entries = to_installation_plan(
        &flatten_wiring_plan(&plan, &placed.cabinet),
        &placed.cabinetised,
    );

    // Wire the machine per plan, then sabotage it: cross-connect the
    // sockets of two planned wires.
    let mut fabric = SimulatedFabric::unwired();
    for entry in &entries {
        fabric.connect(entry.src, entry.dst);
    }
    let (first, second) = (entries[0], entries[1]);
    fabric.disconnect(first.src);
    fabric.disconnect(second.src);
    fabric.connect(first.src, second.dst);

    let probe = WiringProbe::new(&mut fabric, 1, 1, 3).unwrap();
    let actual = probe.discover_wires(&mut fabric).unwrap();
    let repair = wiring_diff(&actual, &entries);

    // One stray to remove first, then both disturbed wires reinstalled in
    // plan order.
    assert_eq!(repair.len(), 3);
    assert_eq!(repair[0].length, None);
    assert_eq!((repair[0].src, repair[0].dst), (first.src, second.dst));
    assert_eq!((repair[1].src, repair[1].dst), (first.src, first.dst));
    assert_eq!((repair[2].src, repair[2].dst), (second.src, second.dst));
}

#[test]
fn plan_survives_a_csv_round_trip_on_disk() {
    let topology = topology(1, 2, Transformation::Slice);
    let params = single_frame_params(vec![0.15, 0.30, 0.50], 0.0);
    let placed = place(&topology, &params).unwrap();

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();
    let entries = to_installation_plan(
        &flatten_wiring_plan(&plan, &placed.cabinet),
        &placed.cabinetised,
    );

    let mut file = tempfile::NamedTempFile::new().unwrap();
    write_plan_csv(&mut file, &entries).unwrap();
    file.flush().unwrap();

    let parsed = read_plan_csv(BufReader::new(file.reopen().unwrap())).unwrap();
    assert_eq!(parsed, entries);
}

#[test]
fn placement_is_reproducible() {
    let topology = topology(3, 3, Transformation::Shear);
    let params = MachineParams::default();
    let a = place(&topology, &params).unwrap();
    let b = place(&topology, &params).unwrap();

    assert_eq!(a.cabinetised, b.cabinetised);
    assert_eq!(a.physical, b.physical);
}
