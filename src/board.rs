//! Boards linked by wires, and utilities for building and walking systems
//! of them.
//!
//! The torus is a cyclic graph, so boards live in an arena owned by
//! [`Machine`] and refer to each other by [`BoardId`] index. Each board has
//! six link slots, one per [`Direction`]; links are always symmetric.

use std::collections::HashMap;

use crate::coords::Hexagonal;
use crate::topology::{add_direction, threeboards, wrap_around, Direction};

/// Handle to a board within a [`Machine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoardId(u32);

impl BoardId {
    /// The arena index of this board.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// An arena of boards and the wires linking them.
#[derive(Debug, Default, Clone)]
pub struct Machine {
    /// Per-board link table, indexed by `Direction as usize`.
    links: Vec<[Option<BoardId>; 6]>,
}

impl Machine {
    pub fn new() -> Self {
        Machine::default()
    }

    /// Add a new, unconnected board.
    pub fn add_board(&mut self) -> BoardId {
        let id = BoardId(self.links.len() as u32);
        self.links.push([None; 6]);
        id
    }

    pub fn num_boards(&self) -> usize {
        self.links.len()
    }

    pub fn board_ids(&self) -> impl Iterator<Item = BoardId> + '_ {
        (0..self.links.len()).map(|i| BoardId(i as u32))
    }

    /// Connect a wire between two boards in the given direction.
    ///
    /// Both sockets must be vacant; wires are symmetric, so the far end is
    /// connected in the opposite direction automatically.
    pub fn connect_wire(&mut self, board: BoardId, direction: Direction, other: BoardId) {
        assert!(
            self.follow_wire(board, direction).is_none(),
            "socket {direction} of board {} already wired",
            board.0
        );
        assert!(
            self.follow_wire(other, direction.opposite()).is_none(),
            "socket {} of board {} already wired",
            direction.opposite(),
            other.0
        );

        self.links[board.index()][direction.index() as usize] = Some(other);
        self.links[other.index()][direction.opposite().index() as usize] = Some(board);
    }

    /// Follow the wire leaving `board` in `direction`.
    pub fn follow_wire(&self, board: BoardId, direction: Direction) -> Option<BoardId> {
        self.links[board.index()][direction.index() as usize]
    }

    /// Follow a packet entering `board` on the `in_wire_side` socket and
    /// travelling in `packet_direction` through the chips of the board.
    ///
    /// Returns the side the packet enters the next board on and that board,
    /// or `None` if the exit socket is unwired.
    pub fn follow_packet(
        &self,
        board: BoardId,
        in_wire_side: Direction,
        packet_direction: Direction,
    ) -> Option<(Direction, BoardId)> {
        let out_side = packet_out_side(in_wire_side, packet_direction)?;
        let next = self.follow_wire(board, out_side)?;
        Some((out_side.opposite(), next))
    }
}

/// The side a packet leaves a board on, given the side it entered on and its
/// direction of travel.
///
/// Only the side matters (not the exact chip): for any incoming side there is
/// a fixed outgoing side for each direction of travel. Combinations that no
/// packet travelling in that direction can produce return `None`.
pub fn packet_out_side(in_wire_side: Direction, packet_direction: Direction) -> Option<Direction> {
    use Direction::*;

    match (in_wire_side, packet_direction) {
        (SouthWest, East) => Some(East),
        (West, East) => Some(NorthEast),
        (SouthWest, NorthEast) => Some(North),
        (South, NorthEast) => Some(NorthEast),
        (South, North) => Some(West),
        (East, North) => Some(North),
        // The reverse travel directions are the inverses of the above.
        (NorthEast, West) => Some(West),
        (East, West) => Some(SouthWest),
        (NorthEast, SouthWest) => Some(South),
        (North, SouthWest) => Some(SouthWest),
        (North, South) => Some(East),
        (West, South) => Some(South),
        _ => None,
    }
}

/// Build a `width x height`-threeboard torus.
///
/// Each board is wired to its east, north-east and north neighbour under
/// wrap-around; the symmetric directions follow automatically. Returns the
/// machine and the hexagonal coordinate of every board.
pub fn create_torus(width: i32, height: i32) -> (Machine, Vec<(BoardId, Hexagonal)>) {
    let mut machine = Machine::new();
    let mut boards = Vec::new();
    let mut board_at = HashMap::new();

    for coord in threeboards(width, height) {
        let id = machine.add_board();
        boards.push((id, coord));
        board_at.insert(coord, id);
    }

    for &(id, coord) in &boards {
        for direction in [Direction::East, Direction::NorthEast, Direction::North] {
            let neighbour = wrap_around(add_direction(coord, direction), (width, height));
            machine.connect_wire(id, direction, board_at[&neighbour]);
        }
    }

    (machine, boards)
}

/// Iterator over the boards visited by following wires in one direction
/// until the loop closes. The starting board is yielded first.
pub fn follow_wiring_loop(
    machine: &Machine,
    start: BoardId,
    direction: Direction,
) -> WiringLoop<'_> {
    WiringLoop {
        machine,
        direction,
        start,
        current: start,
        started: false,
    }
}

pub struct WiringLoop<'a> {
    machine: &'a Machine,
    direction: Direction,
    start: BoardId,
    current: BoardId,
    started: bool,
}

impl Iterator for WiringLoop<'_> {
    type Item = BoardId;

    fn next(&mut self) -> Option<BoardId> {
        if !self.started {
            self.started = true;
            return Some(self.start);
        }
        let next = self.machine.follow_wire(self.current, self.direction)?;
        if next == self.start {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

/// Iterator over the boards visited by a packet travelling in a fixed
/// direction until it returns to its starting state. The starting board is
/// yielded first.
pub fn follow_packet_loop(
    machine: &Machine,
    start: BoardId,
    in_wire_side: Direction,
    packet_direction: Direction,
) -> PacketLoop<'_> {
    PacketLoop {
        machine,
        packet_direction,
        start: (start, in_wire_side),
        current: (start, in_wire_side),
        started: false,
    }
}

pub struct PacketLoop<'a> {
    machine: &'a Machine,
    packet_direction: Direction,
    start: (BoardId, Direction),
    current: (BoardId, Direction),
    started: bool,
}

impl Iterator for PacketLoop<'_> {
    type Item = BoardId;

    fn next(&mut self) -> Option<BoardId> {
        if !self.started {
            self.started = true;
            return Some(self.start.0);
        }
        let (board, in_side) = self.current;
        let (next_in_side, next_board) =
            self.machine
                .follow_packet(board, in_side, self.packet_direction)?;
        if next_board == self.start.0 {
            return None;
        }
        self.current = (next_board, next_in_side);
        Some(next_board)
    }
}
