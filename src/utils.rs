//! Topology selection and the canonical folding pipeline.

use core::fmt;
use core::str::FromStr;

use crate::board::{create_torus, BoardId, Machine};
use crate::coords::{Cartesian2D, Hexagonal};
use crate::topology::GeometryError;
use crate::transforms;

/// Greatest common divisor.
pub fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Least common multiple; zero if either argument is zero.
pub fn lcm(a: u32, b: u32) -> u32 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// The hexagonal-torus-to-grid transformation to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transformation {
    /// Wrap the Cartesian rhombus into a rectangle, then compress.
    Slice,
    /// Skew the rhombus into a ragged rectangle, then compress.
    Shear,
}

impl fmt::Display for Transformation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Transformation::Slice => "slice",
            Transformation::Shear => "shear",
        })
    }
}

impl FromStr for Transformation {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "slice" => Ok(Transformation::Slice),
            "shear" => Ok(Transformation::Shear),
            _ => Err(GeometryError::UnknownTransformation(s.to_string())),
        }
    }
}

/// Which axis the hexagonal crinkle is compressed out of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UncrinkleDirection {
    Rows,
    Columns,
}

impl fmt::Display for UncrinkleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UncrinkleDirection::Rows => "rows",
            UncrinkleDirection::Columns => "columns",
        })
    }
}

impl FromStr for UncrinkleDirection {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rows" => Ok(UncrinkleDirection::Rows),
            "columns" => Ok(UncrinkleDirection::Columns),
            _ => Err(GeometryError::UnknownUncrinkleDirection(s.to_string())),
        }
    }
}

/// Folds applied to each axis unless overridden.
pub const DEFAULT_FOLDS: (i32, i32) = (2, 2);

/// Slicing produces a naturally square layout when the system is twice as
/// tall as it is wide; anything else shears better.
pub fn default_transformation(width: i32, height: i32) -> Transformation {
    if height == 2 * width {
        Transformation::Slice
    } else {
        Transformation::Shear
    }
}

/// The squarest (w, h) triad arrangement for a board count.
///
/// Rectangular systems come out taller than wide. A board count that is not
/// a multiple of three has no triad arrangement at all.
pub fn ideal_system_size(num_boards: u32) -> Result<(u32, u32), GeometryError> {
    if num_boards % 3 != 0 {
        return Err(GeometryError::NotAMultipleOfThree(num_boards));
    }
    if num_boards == 0 {
        return Ok((0, 0));
    }

    let num_triads = num_boards / 3;
    let mut width = 1;
    let mut i = 1;
    while i * i <= num_triads {
        if num_triads % i == 0 {
            width = i;
        }
        i += 1;
    }
    Ok((width, num_triads / width))
}

/// The smallest number of cabinets (and of frames, when one cabinet
/// suffices) that holds the given number of boards.
pub fn min_num_cabinets(
    num_boards: u32,
    frames_per_cabinet: u32,
    boards_per_frame: u32,
) -> (u32, u32) {
    if num_boards == 0 {
        return (0, 0);
    }

    let boards_per_cabinet = frames_per_cabinet * boards_per_frame;
    let num_cabinets = num_boards.div_ceil(boards_per_cabinet);

    if num_cabinets == 1 {
        (1, num_boards.div_ceil(boards_per_frame))
    } else {
        (num_cabinets, frames_per_cabinet)
    }
}

/// Generate a `(width, height)`-triad torus folded so no wire spans the
/// whole machine.
///
/// Returns the machine, the hexagonal coordinates of its boards, and their
/// folded grid coordinates.
#[allow(clippy::type_complexity)]
pub fn folded_torus(
    width: i32,
    height: i32,
    transformation: Transformation,
    uncrinkle_direction: UncrinkleDirection,
    folds: (i32, i32),
) -> (Machine, Vec<(BoardId, Hexagonal)>, Vec<(BoardId, Cartesian2D)>) {
    let (machine, hex_boards) = create_torus(width, height);

    // One in two rows (or one in three, sheared) of the Cartesian picture
    // is a crinkle offset; compressing that axis leaves a dense grid.
    let (x_div, y_div) = match (transformation, uncrinkle_direction) {
        (Transformation::Slice, UncrinkleDirection::Rows) => (1, 2),
        (Transformation::Slice, UncrinkleDirection::Columns) => (2, 1),
        (Transformation::Shear, UncrinkleDirection::Rows) => (1, 3),
        (Transformation::Shear, UncrinkleDirection::Columns) => (3, 1),
    };

    let cart_boards = match transformation {
        Transformation::Slice => transforms::compress(
            &transforms::rhombus_to_rect(&transforms::hex_to_cartesian(&hex_boards)),
            x_div,
            y_div,
        ),
        Transformation::Shear => {
            transforms::compress(&transforms::hex_to_skewed_cartesian(&hex_boards), x_div, y_div)
        }
    };

    let folded_boards = transforms::fold(&cart_boards, folds);

    (machine, hex_boards, folded_boards)
}
