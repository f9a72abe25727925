//! Transformations applied to `[(board, coord), ...]` placements.
//!
//! Each stage is a pure function from one placement to a new one: boards are
//! never duplicated or dropped, and each stage materialises its output (the
//! whole pipeline runs once at startup and every stage is O(N)).

use std::collections::BTreeMap;

use crate::board::BoardId;
use crate::cabinet::Cabinet;
use crate::coords::{CabinetCoord, Cartesian2D, Cartesian3D, Hexagonal};
use crate::topology::{self, GeometryError};

/// Convert hexagonal coordinates into Cartesian coordinates maintaining the
/// rhombus shape of the input torus.
pub fn hex_to_cartesian(boards: &[(BoardId, Hexagonal)]) -> Vec<(BoardId, Cartesian2D)> {
    boards
        .iter()
        .map(|&(board, coord)| (board, topology::hex_to_cartesian(coord)))
        .collect()
}

/// Convert hexagonal coordinates into Cartesian coordinates skewed -30
/// degrees on the x axis, turning the rhombus into a ragged rectangle.
pub fn hex_to_skewed_cartesian(boards: &[(BoardId, Hexagonal)]) -> Vec<(BoardId, Cartesian2D)> {
    boards
        .iter()
        .map(|&(board, coord)| (board, topology::hex_to_skewed_cartesian(coord)))
        .collect()
}

/// Wrap the rhombus arrangement of a toroid into a rectangle by taking every
/// coordinate modulo max+1 along each axis.
pub fn rhombus_to_rect(boards: &[(BoardId, Cartesian2D)]) -> Vec<(BoardId, Cartesian2D)> {
    let Some((max_x, max_y)) = maxes(boards) else {
        return Vec::new();
    };

    boards
        .iter()
        .map(|&(board, c)| {
            (
                board,
                Cartesian2D::new(c.x.rem_euclid(max_x + 1), c.y.rem_euclid(max_y + 1)),
            )
        })
        .collect()
}

/// Integer-divide all coordinates by `(x_div, y_div)`, collapsing the
/// hexagonal crinkle into a dense grid.
pub fn compress(
    boards: &[(BoardId, Cartesian2D)],
    x_div: i32,
    y_div: i32,
) -> Vec<(BoardId, Cartesian2D)> {
    boards
        .iter()
        .map(|&(board, c)| {
            (
                board,
                Cartesian2D::new(c.x.div_euclid(x_div), c.y.div_euclid(y_div)),
            )
        })
        .collect()
}

/// Swap the x and y axes of the placement.
///
/// Used when attempting to cabinetise a grid which only divides with the
/// axes flipped.
pub fn flip_axes(boards: &[(BoardId, Cartesian2D)]) -> Vec<(BoardId, Cartesian2D)> {
    boards
        .iter()
        .map(|&(board, c)| (board, Cartesian2D::new(c.y, c.x)))
        .collect()
}

/// Fold each dimension into the given number of segments and interleave the
/// folded segments.
pub fn fold(boards: &[(BoardId, Cartesian2D)], folds: (i32, i32)) -> Vec<(BoardId, Cartesian2D)> {
    let Some((max_x, max_y)) = maxes(boards) else {
        return Vec::new();
    };

    boards
        .iter()
        .map(|&(board, c)| {
            (
                board,
                Cartesian2D::new(
                    topology::fold_interleave_dimension(c.x, max_x + 1, folds.0),
                    topology::fold_interleave_dimension(c.y, max_y + 1, folds.1),
                ),
            )
        })
        .collect()
}

/// Map an ordered grid of boards into cabinets and frames.
pub fn cabinetise(
    boards: &[(BoardId, Cartesian2D)],
    num_cabinets: u32,
    frames_per_cabinet: u32,
    boards_per_frame: Option<u32>,
) -> Result<Vec<(BoardId, CabinetCoord)>, GeometryError> {
    let Some((max_x, max_y)) = maxes(boards) else {
        return Ok(Vec::new());
    };
    let bounds = (max_x + 1, max_y + 1);

    boards
        .iter()
        .map(|&(board, c)| {
            topology::cabinetise(c, bounds, num_cabinets, frames_per_cabinet, boards_per_frame)
                .map(|coord| (board, coord))
        })
        .collect()
}

/// Shift boards along their frames so every frame holds a contiguous block
/// of board indices, preserving their relative order.
pub fn remove_gaps(boards: &[(BoardId, CabinetCoord)]) -> Vec<(BoardId, CabinetCoord)> {
    // Group each frame's boards by their old board index.
    let mut frames: BTreeMap<(u32, u32), BTreeMap<u32, BoardId>> = BTreeMap::new();
    for &(board, c) in boards {
        frames
            .entry((c.cabinet, c.frame))
            .or_default()
            .insert(c.board, board);
    }

    let mut out = Vec::with_capacity(boards.len());
    for ((cabinet, frame), frame_boards) in frames {
        for (new_board, board) in frame_boards.into_values().enumerate() {
            out.push((board, CabinetCoord::new(cabinet, frame, new_board as u32)));
        }
    }
    out
}

/// Convert cabinet coordinates into the physical positions of the board
/// corners.
pub fn cabinet_to_physical(
    boards: &[(BoardId, CabinetCoord)],
    cabinet: &Cabinet,
) -> Vec<(BoardId, Cartesian3D)> {
    boards
        .iter()
        .map(|&(board, c)| (board, cabinet.board_position(c.cabinet, c.frame, c.board)))
        .collect()
}

fn maxes(boards: &[(BoardId, Cartesian2D)]) -> Option<(i32, i32)> {
    let max_x = boards.iter().map(|&(_, c)| c.x).max()?;
    let max_y = boards.iter().map(|&(_, c)| c.y).max()?;
    Some((max_x, max_y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::create_torus;
    use crate::cabinet::CabinetSpec;
    use std::collections::HashSet;

    fn coords<C: Copy>(boards: &[(BoardId, C)]) -> Vec<C> {
        boards.iter().map(|&(_, c)| c).collect()
    }

    fn board_set<C>(boards: &[(BoardId, C)]) -> HashSet<BoardId> {
        boards.iter().map(|&(b, _)| b).collect()
    }

    #[test]
    fn test_rhombus_to_rect_and_compress() {
        let (_machine, hex_boards) = create_torus(1, 2);
        let cart = hex_to_cartesian(&hex_boards);
        let rect = rhombus_to_rect(&cart);

        // All coordinates land inside the rectangle.
        for &c in coords(&rect).iter() {
            assert!((0..2).contains(&c.x) && (0..6).contains(&c.y), "{c:?}");
        }

        // Compressing the crinkle yields a dense, unique 2x3 grid.
        let comp = compress(&rect, 1, 2);
        let cells: HashSet<Cartesian2D> = coords(&comp).into_iter().collect();
        assert_eq!(cells.len(), 6);
        for c in cells {
            assert!((0..2).contains(&c.x) && (0..3).contains(&c.y));
        }
    }

    #[test]
    fn test_shear_compress() {
        let (_machine, hex_boards) = create_torus(2, 2);
        let skew = hex_to_skewed_cartesian(&hex_boards);
        let comp = compress(&skew, 1, 3);

        // A 2x2 sheared system compresses to a unique 6x2 grid.
        let cells: HashSet<Cartesian2D> = coords(&comp).into_iter().collect();
        assert_eq!(cells.len(), 12);
        for c in cells {
            assert!((0..6).contains(&c.x) && (0..2).contains(&c.y));
        }
    }

    #[test]
    fn test_flip_axes() {
        let (_machine, hex_boards) = create_torus(1, 1);
        let cart = hex_to_cartesian(&hex_boards);
        let flipped = flip_axes(&cart);
        for (&(_, a), &(_, b)) in cart.iter().zip(flipped.iter()) {
            assert_eq!((a.x, a.y), (b.y, b.x));
        }
    }

    #[test]
    fn test_fold_permutes_each_axis() {
        // A 4-wide strip folded in two becomes 0 3 1 2.
        let mut machine = crate::board::Machine::new();
        let strip: Vec<(BoardId, Cartesian2D)> = (0..4)
            .map(|x| (machine.add_board(), Cartesian2D::new(x, 0)))
            .collect();

        let folded = fold(&strip, (2, 1));
        let new_xs: Vec<i32> = coords(&folded).iter().map(|c| c.x).collect();
        assert_eq!(new_xs, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_pipeline_preserves_boards_and_uniqueness() {
        let (_machine, hex_boards) = create_torus(2, 4);

        let cart = hex_to_cartesian(&hex_boards);
        let rect = rhombus_to_rect(&cart);
        let comp = compress(&rect, 1, 2);
        let folded = fold(&comp, (2, 2));

        for stage in [&cart, &rect, &comp, &folded] {
            // Board identity set is preserved at every stage.
            assert_eq!(board_set(stage), board_set(&cart));
        }

        // Final coordinates are unique.
        let cells: HashSet<Cartesian2D> = coords(&folded).into_iter().collect();
        assert_eq!(cells.len(), hex_boards.len());
    }

    #[test]
    fn test_cabinetise_and_remove_gaps() {
        let mut machine = crate::board::Machine::new();
        // A 2x4 grid split across one cabinet of two frames.
        let grid: Vec<(BoardId, Cartesian2D)> = (0..2)
            .flat_map(|x| (0..4).map(move |y| Cartesian2D::new(x, y)))
            .map(|c| (machine.add_board(), c))
            .collect();

        let cabinetised = cabinetise(&grid, 1, 2, Some(24)).unwrap();
        assert_eq!(board_set(&cabinetised), board_set(&grid));
        for &(_, c) in &cabinetised {
            assert!(c.cabinet == 0 && c.frame < 2 && c.board < 4);
        }

        // Space boards out, then re-pack them.
        let gappy: Vec<(BoardId, CabinetCoord)> = cabinetised
            .iter()
            .map(|&(b, c)| (b, CabinetCoord::new(c.cabinet, c.frame, c.board * 3)))
            .collect();
        let packed = remove_gaps(&gappy);

        assert_eq!(board_set(&packed), board_set(&gappy));
        for frame in 0..2 {
            let mut in_frame: Vec<u32> = packed
                .iter()
                .filter(|&&(_, c)| c.frame == frame)
                .map(|&(_, c)| c.board)
                .collect();
            in_frame.sort_unstable();
            assert_eq!(in_frame, vec![0, 1, 2, 3]);
        }

        // Relative order within a frame is preserved.
        for frame in 0..2 {
            let before: Vec<BoardId> = {
                let mut v: Vec<_> = gappy
                    .iter()
                    .filter(|&&(_, c)| c.frame == frame)
                    .map(|&(b, c)| (c.board, b))
                    .collect();
                v.sort_unstable();
                v.into_iter().map(|(_, b)| b).collect()
            };
            let after: Vec<BoardId> = {
                let mut v: Vec<_> = packed
                    .iter()
                    .filter(|&&(_, c)| c.frame == frame)
                    .map(|&(b, c)| (c.board, b))
                    .collect();
                v.sort_unstable();
                v.into_iter().map(|(_, b)| b).collect()
            };
            assert_eq!(before, after);
        }
    }

    #[test]
    fn test_cabinet_to_physical() {
        let cabinet = Cabinet::new(CabinetSpec::default()).unwrap();
        let mut machine = crate::board::Machine::new();
        let placed = vec![
            (machine.add_board(), CabinetCoord::new(0, 0, 0)),
            (machine.add_board(), CabinetCoord::new(0, 1, 3)),
        ];

        let physical = cabinet_to_physical(&placed, &cabinet);
        assert_eq!(physical[0].1, cabinet.board_position(0, 0, 0));
        assert_eq!(physical[1].1, cabinet.board_position(0, 1, 3));
    }
}
