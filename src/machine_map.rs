//! The Ethernet-chip map: where each board's bottom-left chip sits in the
//! network's chip coordinate space.

use std::collections::HashMap;
use std::io::{self, Write};

use crate::board::BoardId;
use crate::coords::{CabinetCoord, Hexagonal};
use crate::topology::{board_to_chip, to_xy};

/// Chips are arranged in four concentric rings on each board.
pub const CHIP_LAYERS_PER_BOARD: i32 = 4;

/// One row of the map: a board slot and the chip coordinate of its
/// bottom-left (Ethernet-connected) chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetChip {
    pub cabinet: u32,
    pub frame: u32,
    pub board: u32,
    pub x: i32,
    pub y: i32,
}

/// Pair each board's chip coordinate with its cabinet position, ordered by
/// hexagonal position.
pub fn ethernet_chip_map(
    hex_boards: &[(BoardId, Hexagonal)],
    cabinetised: &[(BoardId, CabinetCoord)],
) -> Vec<EthernetChip> {
    let slots: HashMap<BoardId, CabinetCoord> = cabinetised.iter().map(|&(b, c)| (b, c)).collect();

    let mut boards: Vec<(BoardId, Hexagonal)> = hex_boards.to_vec();
    boards.sort_by_key(|&(_, coord)| to_xy(coord));

    boards
        .iter()
        .map(|&(board, coord)| {
            let chip = to_xy(board_to_chip(coord, CHIP_LAYERS_PER_BOARD));
            let slot = slots[&board];
            EthernetChip {
                cabinet: slot.cabinet,
                frame: slot.frame,
                board: slot.board,
                x: chip.x,
                y: chip.y,
            }
        })
        .collect()
}

/// Write the map in its CSV form.
pub fn write_ethernet_chip_csv<W: Write>(mut writer: W, rows: &[EthernetChip]) -> io::Result<()> {
    writeln!(writer, "cabinet,frame,board,x,y")?;
    for row in rows {
        writeln!(
            writer,
            "{},{},{},{},{}",
            row.cabinet, row.frame, row.board, row.x, row.y
        )?;
    }
    Ok(())
}
