//! Production of practical wiring plans.
//!
//! A plan is built in stages: every wire in the board graph is enumerated,
//! partitioned by how far it reaches (within a frame, within a cabinet,
//! between cabinets), assigned the shortest adequate cable from the
//! inventory, and finally flattened into the order an installer should work
//! in. Repair mode diffs the plan against the wiring actually discovered on
//! a machine.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{self, BufRead, Write};

use thiserror::Error;

use crate::board::{BoardId, Machine};
use crate::cabinet::{Cabinet, SocketRef};
use crate::coords::{CabinetCoord, Cartesian3D};
use crate::metrics::physical_wire_length;
use crate::topology::Direction;

/// A wiring plan that cannot be produced or parsed.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The inventory holds no cable long enough for some wire.
    #[error("no cable in the inventory is long enough to span a {distance:.3} m gap")]
    NoCableLongEnough { distance: f64 },

    #[error("plan line {line}: {message}")]
    Malformed { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// One end of a wire within the board graph.
pub type WireEnd = (BoardId, Direction);

/// A wire between two boards with an assigned cable length.
pub type AssignedWire = (WireEnd, WireEnd, f64);

/// North, east and south-west are the canonical "source" sides of a wire;
/// the opposite three are always destinations.
pub const SOURCE_DIRECTIONS: [Direction; 3] =
    [Direction::North, Direction::East, Direction::SouthWest];

/// Enumerate every wire in the system exactly once.
pub fn enumerate_wires(machine: &Machine) -> Vec<(WireEnd, WireEnd)> {
    let mut wires = Vec::new();
    for board in machine.board_ids() {
        for direction in SOURCE_DIRECTIONS {
            if let Some(target) = machine.follow_wire(board, direction) {
                wires.push(((board, direction), (target, direction.opposite())));
            }
        }
    }
    wires
}

/// Partition wires by whether they stay within one frame, within one
/// cabinet, or span cabinets.
#[allow(clippy::type_complexity)]
pub fn partition_wires(
    wires: &[(WireEnd, WireEnd)],
    cabinetised: &HashMap<BoardId, CabinetCoord>,
) -> (
    BTreeMap<(u32, u32), Vec<(WireEnd, WireEnd)>>,
    BTreeMap<u32, Vec<(WireEnd, WireEnd)>>,
    Vec<(WireEnd, WireEnd)>,
) {
    let mut between_boards: BTreeMap<(u32, u32), Vec<(WireEnd, WireEnd)>> = BTreeMap::new();
    let mut between_frames: BTreeMap<u32, Vec<(WireEnd, WireEnd)>> = BTreeMap::new();
    let mut between_cabinets = Vec::new();

    for &wire in wires {
        let src = cabinetised[&wire.0 .0];
        let dst = cabinetised[&wire.1 .0];

        if (src.cabinet, src.frame) == (dst.cabinet, dst.frame) {
            between_boards
                .entry((src.cabinet, src.frame))
                .or_default()
                .push(wire);
        } else if src.cabinet == dst.cabinet {
            between_frames.entry(src.cabinet).or_default().push(wire);
        } else {
            between_cabinets.push(wire);
        }
    }

    (between_boards, between_frames, between_cabinets)
}

/// Assign each wire the shortest adequate cable and order the result so the
/// tightest wires are installed first, moving left-to-right and
/// top-to-bottom beyond that.
pub fn assign_wires(
    wires: &[(WireEnd, WireEnd)],
    positions: &HashMap<BoardId, Cartesian3D>,
    cabinet: &Cabinet,
    available_wire_lengths: &[f64],
    minimum_arc_height: f64,
) -> Result<Vec<AssignedWire>, PlanError> {
    let mut assigned: Vec<(WireEnd, WireEnd, f64, f64)> = Vec::with_capacity(wires.len());

    for &(src, dst) in wires {
        let source = positions[&src.0] + cabinet.board_wire_offset(src.1);
        let dest = positions[&dst.0] + cabinet.board_wire_offset(dst.1);
        let distance = (source - dest).magnitude();

        let (length, _arc_height) =
            physical_wire_length(distance, available_wire_lengths, minimum_arc_height)
                .ok_or(PlanError::NoCableLongEnough { distance })?;

        assigned.push((src, dst, length, length - distance));
    }

    assigned.sort_by(|a, b| {
        let a_pos = positions[&a.0 .0];
        let b_pos = positions[&b.0 .0];
        // Least slack first, then left-most, then top-most source.
        a.3.total_cmp(&b.3)
            .then(a_pos.x.total_cmp(&b_pos.x))
            .then(a_pos.y.total_cmp(&b_pos.y))
    });

    Ok(assigned
        .into_iter()
        .map(|(src, dst, length, _slack)| (src, dst, length))
        .collect())
}

/// A wiring plan broken down by locality, then by wire axis.
#[derive(Debug, Clone, Default)]
pub struct WiringPlan {
    /// Wires within a single frame, keyed by (cabinet, frame, axis).
    pub between_boards: BTreeMap<(u32, u32, Direction), Vec<AssignedWire>>,
    /// Wires between frames of one cabinet, keyed by (cabinet, axis).
    pub between_frames: BTreeMap<(u32, Direction), Vec<AssignedWire>>,
    /// Wires between cabinets, keyed by axis.
    pub between_cabinets: BTreeMap<Direction, Vec<AssignedWire>>,
}

/// Produce the full wiring plan for a placed system.
pub fn generate_wiring_plan(
    machine: &Machine,
    cabinetised: &[(BoardId, CabinetCoord)],
    physical: &[(BoardId, Cartesian3D)],
    cabinet: &Cabinet,
    available_wire_lengths: &[f64],
    minimum_arc_height: f64,
) -> Result<WiringPlan, PlanError> {
    let cabinet_coords: HashMap<BoardId, CabinetCoord> =
        cabinetised.iter().map(|&(b, c)| (b, c)).collect();
    let positions: HashMap<BoardId, Cartesian3D> = physical.iter().map(|&(b, c)| (b, c)).collect();

    let wires = enumerate_wires(machine);

    let mut plan = WiringPlan::default();

    for direction in SOURCE_DIRECTIONS {
        let direction_wires: Vec<(WireEnd, WireEnd)> = wires
            .iter()
            .copied()
            .filter(|&(src, dst)| src.1 == direction || dst.1 == direction)
            .collect();

        let (between_boards, between_frames, between_cabinets) =
            partition_wires(&direction_wires, &cabinet_coords);

        for ((c, f), group) in between_boards {
            plan.between_boards.insert(
                (c, f, direction),
                assign_wires(
                    &group,
                    &positions,
                    cabinet,
                    available_wire_lengths,
                    minimum_arc_height,
                )?,
            );
        }

        for (c, group) in between_frames {
            plan.between_frames.insert(
                (c, direction),
                assign_wires(
                    &group,
                    &positions,
                    cabinet,
                    available_wire_lengths,
                    minimum_arc_height,
                )?,
            );
        }

        plan.between_cabinets.insert(
            direction,
            assign_wires(
                &between_cabinets,
                &positions,
                cabinet,
                available_wire_lengths,
                minimum_arc_height,
            )?,
        );
    }

    Ok(plan)
}

/// Flatten a wiring plan into a single installation sequence.
///
/// Frame-local wires come first (cabinets in ascending order, frames in
/// ascending order within each cabinet, axes ordered by the height of their
/// socket on the board), then cabinet-local wires, then cabinet-spanning
/// wires, so an installer finishes each frame before moving on.
pub fn flatten_wiring_plan(plan: &WiringPlan, cabinet: &Cabinet) -> Vec<AssignedWire> {
    let by_socket_height = |&d: &Direction| cabinet.board_wire_offset(d).y;
    let sorted_directions = |mut dirs: Vec<Direction>| {
        dirs.sort_by(|a, b| by_socket_height(a).total_cmp(&by_socket_height(b)));
        dirs
    };

    let mut out = Vec::new();

    // Wires between boards in the same frame.
    let mut frames: Vec<(u32, u32)> = plan
        .between_boards
        .keys()
        .map(|&(c, f, _)| (c, f))
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    frames.sort_unstable();
    for (c, f) in frames {
        let dirs: Vec<Direction> = plan
            .between_boards
            .keys()
            .filter(|&&(kc, kf, _)| (kc, kf) == (c, f))
            .map(|&(_, _, d)| d)
            .collect();
        for d in sorted_directions(dirs) {
            out.extend_from_slice(&plan.between_boards[&(c, f, d)]);
        }
    }

    // Wires between frames in the same cabinet.
    let mut cabinets: Vec<u32> = plan
        .between_frames
        .keys()
        .map(|&(c, _)| c)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    cabinets.sort_unstable();
    for c in cabinets {
        let dirs: Vec<Direction> = plan
            .between_frames
            .keys()
            .filter(|&&(kc, _)| kc == c)
            .map(|&(_, d)| d)
            .collect();
        for d in sorted_directions(dirs) {
            out.extend_from_slice(&plan.between_frames[&(c, d)]);
        }
    }

    // Wires between cabinets.
    let dirs: Vec<Direction> = plan.between_cabinets.keys().copied().collect();
    for d in sorted_directions(dirs) {
        out.extend_from_slice(&plan.between_cabinets[&d]);
    }

    out
}

/// One instruction of an installation plan: connect (or, when `length` is
/// `None`, disconnect) the wire between two sockets.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanEntry {
    pub src: SocketRef,
    pub dst: SocketRef,
    pub length: Option<f64>,
}

/// Convert a flat plan from board-graph endpoints into cabinet-space
/// instructions.
pub fn to_installation_plan(
    flat: &[AssignedWire],
    cabinetised: &[(BoardId, CabinetCoord)],
) -> Vec<PlanEntry> {
    let coords: HashMap<BoardId, CabinetCoord> = cabinetised.iter().map(|&(b, c)| (b, c)).collect();

    flat.iter()
        .map(|&((src_board, src_dir), (dst_board, dst_dir), length)| {
            let s = coords[&src_board];
            let d = coords[&dst_board];
            PlanEntry {
                src: SocketRef::new(s.cabinet, s.frame, s.board, src_dir),
                dst: SocketRef::new(d.cabinet, d.frame, d.board, dst_dir),
                length: Some(length),
            }
        })
        .collect()
}

/// Diff discovered wiring against a plan, producing the repair sequence:
/// every surplus wire is disconnected first, then the missing wires are
/// installed in plan order.
pub fn wiring_diff(
    actual: &[(SocketRef, SocketRef)],
    expected: &[PlanEntry],
) -> Vec<PlanEntry> {
    let correct: HashSet<(SocketRef, SocketRef)> =
        expected.iter().map(|e| (e.src, e.dst)).collect();
    let present: HashSet<(SocketRef, SocketRef)> = actual.iter().copied().collect();

    let mut to_remove: Vec<(SocketRef, SocketRef)> =
        present.difference(&correct).copied().collect();
    to_remove.sort_unstable();

    let mut repair: Vec<PlanEntry> = to_remove
        .into_iter()
        .map(|(src, dst)| PlanEntry {
            src,
            dst,
            length: None,
        })
        .collect();

    repair.extend(
        expected
            .iter()
            .filter(|e| !present.contains(&(e.src, e.dst)))
            .copied(),
    );

    repair
}

const PLAN_CSV_HEADER: &str = "sc,sf,sb,sd,dc,df,db,dd,length";

/// Write an installation plan as CSV.
pub fn write_plan_csv<W: Write>(mut writer: W, entries: &[PlanEntry]) -> io::Result<()> {
    writeln!(writer, "{PLAN_CSV_HEADER}")?;
    for entry in entries {
        let length = match entry.length {
            Some(length) => length.to_string(),
            None => String::new(),
        };
        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{}",
            entry.src.cabinet,
            entry.src.frame,
            entry.src.board,
            entry.src.direction,
            entry.dst.cabinet,
            entry.dst.frame,
            entry.dst.board,
            entry.dst.direction,
            length,
        )?;
    }
    Ok(())
}

/// Read an installation plan written by [`write_plan_csv`].
pub fn read_plan_csv<R: BufRead>(reader: R) -> Result<Vec<PlanEntry>, PlanError> {
    let mut entries = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_no = index + 1;

        if index == 0 {
            if line.trim() != PLAN_CSV_HEADER {
                return Err(PlanError::Malformed {
                    line: line_no,
                    message: format!("expected header {PLAN_CSV_HEADER:?}"),
                });
            }
            continue;
        }
        if line.trim().is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != 9 {
            return Err(PlanError::Malformed {
                line: line_no,
                message: format!("expected 9 fields, found {}", fields.len()),
            });
        }

        let index_field = |i: usize| -> Result<u32, PlanError> {
            fields[i].trim().parse().map_err(|_| PlanError::Malformed {
                line: line_no,
                message: format!("invalid index {:?}", fields[i]),
            })
        };
        let direction_field = |i: usize| -> Result<Direction, PlanError> {
            Direction::from_name(fields[i].trim()).ok_or_else(|| PlanError::Malformed {
                line: line_no,
                message: format!("invalid direction {:?}", fields[i]),
            })
        };

        let length = fields[8].trim();
        let length = if length.is_empty() {
            None
        } else {
            Some(length.parse().map_err(|_| PlanError::Malformed {
                line: line_no,
                message: format!("invalid length {:?}", fields[8]),
            })?)
        };

        entries.push(PlanEntry {
            src: SocketRef::new(
                index_field(0)?,
                index_field(1)?,
                index_field(2)?,
                direction_field(3)?,
            ),
            dst: SocketRef::new(
                index_field(4)?,
                index_field(5)?,
                index_field(6)?,
                direction_field(7)?,
            ),
            length,
        });
    }

    Ok(entries)
}
