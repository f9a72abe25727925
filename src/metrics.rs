//! Metrics about systems of boards and their wiring.

use std::collections::HashMap;
use std::f64::consts::PI;

use crate::board::{BoardId, Machine};
use crate::cabinet::Cabinet;
use crate::coords::{Cartesian2D, Cartesian3D};
use crate::topology::Direction;

/// Tolerance of the binary search for the cable arc's subtended angle.
const ARC_ANGLE_TOLERANCE: f64 = 1e-4;

/// Build a lookup from board to position.
pub fn position_map<C: Copy>(boards: &[(BoardId, C)]) -> HashMap<BoardId, C> {
    boards.iter().map(|&(b, c)| (b, c)).collect()
}

/// Width and height of the space occupied by a placement.
pub fn dimensions(boards: &[(BoardId, Cartesian2D)]) -> Option<Cartesian2D> {
    let max_x = boards.iter().map(|&(_, c)| c.x).max()?;
    let max_y = boards.iter().map(|&(_, c)| c.y).max()?;
    Some(Cartesian2D::new(max_x + 1, max_y + 1))
}

/// The length of the wire leaving `board` in `direction`, measured between
/// socket centres when a cabinet geometry is supplied and between board
/// corners otherwise. `None` when the socket is unwired.
pub fn wire_length(
    machine: &Machine,
    positions: &HashMap<BoardId, Cartesian3D>,
    board: BoardId,
    direction: Direction,
    cabinet: Option<&Cabinet>,
) -> Option<f64> {
    let target = machine.follow_wire(board, direction)?;

    let mut source = positions[&board];
    let mut dest = positions[&target];
    if let Some(cabinet) = cabinet {
        source = source + cabinet.board_wire_offset(direction);
        dest = dest + cabinet.board_wire_offset(direction.opposite());
    }

    Some((source - dest).magnitude())
}

/// The lengths of every wire in the system, one entry per wire.
pub fn wire_lengths(
    machine: &Machine,
    boards: &[(BoardId, Cartesian3D)],
    cabinet: Option<&Cabinet>,
) -> Vec<f64> {
    let positions = position_map(boards);

    // North, east and south-west cover each wire exactly once.
    let mut lengths = Vec::new();
    for direction in [Direction::North, Direction::East, Direction::SouthWest] {
        for &(board, _) in boards {
            if let Some(length) = wire_length(machine, &positions, board, direction, cabinet) {
                lengths.push(length);
            }
        }
    }
    lengths
}

/// Choose a cable for a socket-to-socket distance.
///
/// Picks the shortest length from `available_wire_lengths` which spans
/// `distance` while forming an arc of at least `minimum_arc_height`.
/// Returns the chosen length and the height of the arc it forms, or `None`
/// when no available cable is long enough.
///
/// The cable is modelled as a circular arc: with subtended angle `alpha`
/// and cable length `l`,
///
/// ```text
///     distance^2 / (2 l^2) == (1 - cos(alpha)) / alpha^2
/// ```
///
/// which is solved for `alpha` by binary search (the right-hand side falls
/// monotonically as `alpha` grows); the arc height is then
/// `(l / alpha) * (1 - cos(alpha / 2))`. A cable of `l >= distance * pi/2`
/// exceeds a semicircle and is modelled as a semicircle pushed out by
/// `(l - distance * pi/2) / 2`.
pub fn physical_wire_length(
    distance: f64,
    available_wire_lengths: &[f64],
    minimum_arc_height: f64,
) -> Option<(f64, f64)> {
    let mut lengths = available_wire_lengths.to_vec();
    lengths.sort_by(f64::total_cmp);

    for wire_length in lengths {
        if wire_length < distance {
            continue;
        }

        let arc_height = if wire_length >= (distance * PI) / 2.0 {
            let semicircle_length = (distance * PI) / 2.0;
            let offset = (wire_length - semicircle_length) / 2.0;
            offset + distance / 2.0
        } else {
            let lhs = distance.powi(2) / (2.0 * wire_length.powi(2));
            let rhs = |alpha: f64| (1.0 - alpha.cos()) / alpha.powi(2);

            let mut low = 0.0_f64;
            let mut high = PI;
            let mut alpha;
            loop {
                alpha = (high + low) / 2.0;
                let error = rhs(alpha) - lhs;
                if error.abs() < ARC_ANGLE_TOLERANCE {
                    break;
                } else if error < 0.0 {
                    high = alpha;
                } else {
                    low = alpha;
                }
            }

            let r = wire_length / alpha;
            r * (1.0 - (alpha / 2.0).cos())
        };

        // A too-flat arc means too tight a connection; try a longer cable.
        if arc_height < minimum_arc_height {
            continue;
        }

        return Some((wire_length, arc_height));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{create_torus, Machine};

    #[test]
    fn test_physical_wire_length_picks_shortest_sufficient() {
        let lengths = [0.5, 0.15, 0.3];

        let (chosen, _) = physical_wire_length(0.1, &lengths, 0.0).unwrap();
        assert_eq!(chosen, 0.15);

        let (chosen, _) = physical_wire_length(0.2, &lengths, 0.0).unwrap();
        assert_eq!(chosen, 0.3);

        assert_eq!(physical_wire_length(2.0, &lengths, 0.0), None);
    }

    #[test]
    fn test_minimum_arc_forces_longer_cable() {
        let lengths = [0.15, 0.3, 0.5];

        // Without an arc requirement the 0.15 m cable suffices for 0.1 m.
        let (chosen, _) = physical_wire_length(0.1, &lengths, 0.0).unwrap();
        assert_eq!(chosen, 0.15);

        // Requiring a 0.2 m arc pushes the choice up to the 0.5 m cable.
        let (chosen, arc) = physical_wire_length(0.1, &lengths, 0.2).unwrap();
        assert_eq!(chosen, 0.5);
        assert!(arc >= 0.2);
    }

    #[test]
    fn test_arc_height_semicircle_model() {
        // A 1.0 m cable over a 0.5 m gap exceeds a semicircle: it is pushed
        // out by (1 - 0.5*pi/2)/2 and peaks at that offset plus the
        // semicircle radius.
        let (chosen, arc) = physical_wire_length(0.5, &[1.0], 0.3).unwrap();
        assert_eq!(chosen, 1.0);
        let expected = (1.0 - 0.5 * PI / 2.0) / 2.0 + 0.25;
        assert!((arc - expected).abs() < 1e-9);
        assert!((arc - 0.3573).abs() < 1e-3);
    }

    #[test]
    fn test_arc_height_binary_search_branch() {
        // 0.15 m of cable over 0.1 m stays below the semicircle threshold.
        let (chosen, arc) = physical_wire_length(0.1, &[0.15], 0.0).unwrap();
        assert_eq!(chosen, 0.15);
        assert!(arc > 0.0 && arc < 0.1, "arc = {arc}");
    }

    #[test]
    fn test_wire_lengths_cover_every_wire_once() {
        let (machine, boards) = create_torus(2, 2);
        let placed: Vec<_> = boards
            .iter()
            .map(|&(b, c)| {
                let p = crate::topology::hex_to_cartesian(c);
                (b, Cartesian3D::new(f64::from(p.x), f64::from(p.y), 0.0))
            })
            .collect();

        let lengths = wire_lengths(&machine, &placed, None);
        assert_eq!(lengths.len(), 3 * boards.len());
        assert!(lengths.iter().all(|&l| l >= 0.0));
    }

    #[test]
    fn test_dimensions() {
        let mut machine = Machine::new();
        let boards = vec![
            (machine.add_board(), Cartesian2D::new(0, 0)),
            (machine.add_board(), Cartesian2D::new(3, 1)),
        ];
        assert_eq!(dimensions(&boards), Some(Cartesian2D::new(4, 2)));
        assert_eq!(dimensions(&[]), None);
    }
}
