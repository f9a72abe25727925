//! The hexagonal topology kernel.
//!
//! Pure geometry underneath everything else:
//! - Directions in the space the boards sit in
//! - Shortest-path normalisation and torus wrap-around
//! - Projections from hexagonal to Cartesian space
//! - Fold/interleave arithmetic for shortening wrap-around wires
//! - The cabinet/frame/board split of a rectangular grid
//! - Hexagon and threeboard generators
//!
//! Uses the hexagonal addressing scheme of Nocetti et al., "Addressing and
//! Routing in Hexagonal Networks".

use core::fmt;
use core::str::FromStr;

use thiserror::Error;

use crate::coords::{CabinetCoord, Cartesian2D, Hexagonal, Hexagonal2D};

/// Placement parameters that cannot be realised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeometryError {
    /// The board grid cannot be split into the requested cabinets and
    /// frames, even after flipping the axes.
    #[error(
        "cannot map a {width}x{height} board grid onto {num_cabinets} \
         cabinets of {frames_per_cabinet} frames"
    )]
    Indivisible {
        width: i32,
        height: i32,
        num_cabinets: u32,
        frames_per_cabinet: u32,
    },

    /// The cabinet split assigns more boards to a frame than it has slots.
    #[error("board index {board} does not fit in a {boards_per_frame}-slot frame")]
    FrameOverflow { board: u32, boards_per_frame: u32 },

    /// Board counts must be triads.
    #[error("{0} is not a multiple of three boards")]
    NotAMultipleOfThree(u32),

    #[error("unknown direction name {0:?}")]
    UnknownDirection(String),

    #[error("unknown transformation {0:?} (expected \"slice\" or \"shear\")")]
    UnknownTransformation(String),

    #[error("unknown uncrinkle direction {0:?} (expected \"rows\" or \"columns\")")]
    UnknownUncrinkleDirection(String),
}

/// One of the six wire directions leaving a board.
///
/// The integer encoding is canonical: `opposite` is +3 (mod 6) and the
/// counter-clockwise neighbour is +1 (mod 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Direction {
    East = 0,
    NorthEast = 1,
    North = 2,
    West = 3,
    SouthWest = 4,
    South = 5,
}

impl Direction {
    /// All directions in canonical encoding order.
    pub const ALL: [Direction; 6] = [
        Direction::East,
        Direction::NorthEast,
        Direction::North,
        Direction::West,
        Direction::SouthWest,
        Direction::South,
    ];

    /// The canonical integer encoding, 0..6.
    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn from_index(index: u8) -> Option<Direction> {
        match index {
            0 => Some(Direction::East),
            1 => Some(Direction::NorthEast),
            2 => Some(Direction::North),
            3 => Some(Direction::West),
            4 => Some(Direction::SouthWest),
            5 => Some(Direction::South),
            _ => None,
        }
    }

    /// The next direction counter-clockwise from this one.
    pub const fn next_ccw(self) -> Direction {
        match Direction::from_index((self.index() + 1) % 6) {
            Some(d) => d,
            None => unreachable!(),
        }
    }

    /// The next direction clockwise from this one.
    pub const fn next_cw(self) -> Direction {
        match Direction::from_index((self.index() + 5) % 6) {
            Some(d) => d,
            None => unreachable!(),
        }
    }

    /// The opposite direction.
    pub const fn opposite(self) -> Direction {
        match Direction::from_index((self.index() + 3) % 6) {
            Some(d) => d,
            None => unreachable!(),
        }
    }

    /// The vector which moves one unit in this direction.
    pub const fn vector(self) -> Hexagonal {
        match self {
            Direction::East => Hexagonal::new(1, 0, 0),
            Direction::West => Hexagonal::new(-1, 0, 0),
            Direction::North => Hexagonal::new(0, 1, 0),
            Direction::South => Hexagonal::new(0, -1, 0),
            Direction::NorthEast => Hexagonal::new(0, 0, -1),
            Direction::SouthWest => Hexagonal::new(0, 0, 1),
        }
    }

    /// Hyphenated lowercase name, as used in plan files and on the wire.
    pub const fn name(self) -> &'static str {
        match self {
            Direction::East => "east",
            Direction::NorthEast => "north-east",
            Direction::North => "north",
            Direction::West => "west",
            Direction::SouthWest => "south-west",
            Direction::South => "south",
        }
    }

    pub fn from_name(name: &str) -> Option<Direction> {
        Direction::ALL.iter().copied().find(|d| d.name() == name)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Direction {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Direction::from_name(s).ok_or_else(|| GeometryError::UnknownDirection(s.to_string()))
    }
}

/// Returns `vector` moved one unit in `direction`.
pub fn add_direction(vector: Hexagonal, direction: Direction) -> Hexagonal {
    vector + direction.vector()
}

/// The Manhattan distance required to traverse the given vector.
pub fn manhattan(vector: Hexagonal) -> i32 {
    vector.x.abs() + vector.y.abs() + vector.z.abs()
}

/// The median of the three components.
pub fn median_element(vector: Hexagonal) -> i32 {
    let mut v = [vector.x, vector.y, vector.z];
    v.sort_unstable();
    v[1]
}

/// Converts a vector into its shortest-path form.
///
/// (1, 1, 1) has distance zero, so subtracting the median component from
/// every axis yields a representative with at least one zero component whose
/// remaining components have opposite signs (or are zero).
pub fn to_shortest_path(vector: Hexagonal) -> Hexagonal {
    let median = median_element(vector);
    vector - Hexagonal::new(median, median, median)
}

/// Collapse a 3D hexagonal vector onto the equivalent 2D one.
pub fn to_xy(vector: Hexagonal) -> Hexagonal2D {
    Hexagonal2D::new(vector.x - vector.z, vector.y - vector.z)
}

/// Convert hexagonal coordinates to Cartesian values which preserve the
/// rhombus shape of a torus for presentation.
pub fn hex_to_cartesian(coords: Hexagonal) -> Cartesian2D {
    let Hexagonal2D { x, y } = to_xy(coords);
    Cartesian2D::new(x, (y * 2) - x)
}

/// Convert hexagonal coordinates to Cartesian values skewed so that x and y
/// in hexagonal space track x and y in Cartesian space, turning the rhombus
/// into a ragged rectangle.
pub fn hex_to_skewed_cartesian(coords: Hexagonal) -> Cartesian2D {
    let Hexagonal2D { x, y } = to_xy(coords);
    Cartesian2D::new(x + y, (y * 2) - x)
}

/// The chip coordinate of the bottom-left chip of the hexagonal board at the
/// given board coordinate, for boards of `layers` concentric rings of chips.
pub fn board_to_chip(coords: Hexagonal, layers: i32) -> Hexagonal {
    let c = hex_to_skewed_cartesian(coords);
    Hexagonal::new(c.x * layers, c.y * layers, 0)
}

/// Wrap a coordinate around the edges of a `(w, h)`-threeboard torus.
///
/// Repeatedly shifts by the four torus repeat vectors until the 2D
/// projection lies inside the fundamental rhombus
/// `{(x, y) : 0 <= x + y < 3w  and  0 <= 2y - x < 3h}`. Each shift strictly
/// reduces the distance to the rhombus, so the loop terminates.
pub fn wrap_around(coord: Hexagonal, bounds: (i32, i32)) -> Hexagonal {
    let (w, h) = bounds;
    debug_assert!(w > 0 && h > 0);

    let Hexagonal2D { mut x, mut y } = to_xy(coord);

    loop {
        let left = x + y < 0;
        let right = x + y >= w * 3;
        let below = (2 * y) - x < 0;
        let above = (2 * y) - x >= h * 3;

        if below && left {
            x += 1 + (w - 1) * 2 - (h - 1);
            y += 2 + (w - 1) + (h - 1);
        } else if above && right {
            x -= 1 + (w - 1) * 2 - (h - 1);
            y -= 2 + (w - 1) + (h - 1);
        } else if left {
            x += w * 2;
            y += w;
        } else if right {
            x -= w * 2;
            y -= w;
        } else if below {
            x -= h;
            y += h;
        } else if above {
            x += h;
            y -= h;
        } else {
            break;
        }
    }

    Hexagonal::new(x, y, 0)
}

/// Fold a point `x` on a line of length `w` into `f` segments.
///
/// Returns `(new_x, fold)` where `new_x` is the position within its segment
/// and `fold` the segment number. Odd-numbered folds run in the reverse
/// direction; when `w` does not divide evenly the final fold is shorter.
pub fn fold_dimension(x: i32, w: i32, f: i32) -> (i32, i32) {
    // Round segment width up so segments cover the whole line.
    let fold_width = (w + (f - 1)) / f;

    let mut new_x = x % fold_width;
    let fold = x / fold_width;

    if fold % 2 == 1 {
        if fold == f - 1 {
            new_x = (fold_width - ((fold_width * f) - w)) - new_x - 1;
        } else {
            new_x = fold_width - new_x - 1;
        }
    }

    (new_x, fold)
}

/// As [`fold_dimension`], but interleaves the folded segments so points which
/// fold onto the same position become adjacent: `new_x * f + fold`.
pub fn fold_interleave_dimension(x: i32, w: i32, f: i32) -> i32 {
    let (new_x, fold) = fold_dimension(x, w, f);
    new_x * f + fold
}

/// Map a point of an ordered `(w, h)` grid onto a cabinet/frame/board triple.
///
/// The grid is split into `num_cabinets` column groups and
/// `frames_per_cabinet` row groups; the sub-grid within a frame is flattened
/// to a board index by `board = sub_y + rows_per_frame * sub_x`. If either
/// axis does not divide, the axes are flipped once and retried; failing
/// that, the split is impossible.
pub fn cabinetise(
    coord: Cartesian2D,
    bounds: (i32, i32),
    num_cabinets: u32,
    frames_per_cabinet: u32,
    boards_per_frame: Option<u32>,
) -> Result<CabinetCoord, GeometryError> {
    let (mut x, mut y) = (coord.x, coord.y);
    let (mut w, mut h) = bounds;
    let cabinets = num_cabinets as i32;
    let frames = frames_per_cabinet as i32;

    // If not divisible, try flipping the axes.
    if w % cabinets != 0 || h % frames != 0 {
        core::mem::swap(&mut x, &mut y);
        core::mem::swap(&mut w, &mut h);
    }

    if w % cabinets != 0 || h % frames != 0 {
        return Err(GeometryError::Indivisible {
            width: bounds.0,
            height: bounds.1,
            num_cabinets,
            frames_per_cabinet,
        });
    }

    let cols_per_cabinet = w / cabinets;
    let rows_per_frame = h / frames;

    let cabinet = x / cols_per_cabinet;
    let frame = y / rows_per_frame;

    // Sub-coordinate within the frame, interleaved into a board number.
    let sub_x = x % cols_per_cabinet;
    let sub_y = y % rows_per_frame;
    let board = (sub_y + rows_per_frame * sub_x) as u32;

    if let Some(boards_per_frame) = boards_per_frame {
        if board >= boards_per_frame {
            return Err(GeometryError::FrameOverflow {
                board,
                boards_per_frame,
            });
        }
    }

    Ok(CabinetCoord::new(cabinet as u32, frame as u32, board))
}

/// All coordinates inside a hexagon of `layers` concentric rings, in a fixed
/// spiral order from the centre.
pub fn hexagon(layers: i32) -> Vec<Hexagonal2D> {
    let mut points = Vec::new();
    let mut pos = Hexagonal::new(0, 0, 0);

    // Each ring is traced as six runs of steps; the yield happens before the
    // step so the centre is emitted exactly once.
    for n in 0..layers {
        for _ in 0..n {
            points.push(to_xy(pos));
            pos.y -= 1;
        }
        for _ in 0..n {
            points.push(to_xy(pos));
            pos.z += 1;
        }
        for _ in 0..(n + 1) {
            points.push(to_xy(pos));
            pos.x -= 1;
        }
        for _ in 0..n {
            points.push(to_xy(pos));
            pos.y += 1;
        }
        for _ in 0..(n + 1) {
            points.push(to_xy(pos));
            pos.z -= 1;
        }
        for _ in 0..(n + 1) {
            points.push(to_xy(pos));
            pos.x += 1;
        }
    }

    points
}

/// As [`hexagon`] but re-based so the bottom-left corner sits at (0, 0).
pub fn hexagon_zero(layers: i32) -> Vec<Hexagonal2D> {
    hexagon(layers)
        .into_iter()
        .map(|p| Hexagonal2D::new(p.x + layers, p.y + layers - 1))
        .collect()
}

/// The hexagonal coordinates of every board in a `width x height` mesh of
/// threeboards.
///
/// Within a threeboard, z = 0 is the bottom-left board, z = 1 the top and
/// z = 2 the right.
pub fn threeboards(width: i32, height: i32) -> impl Iterator<Item = Hexagonal> {
    (0..height).flat_map(move |y| {
        (0..width).flat_map(move |x| {
            (0..3).map(move |z| {
                let x_coord = (x * 2) - y + i32::from(z >= 2);
                let y_coord = x + y + i32::from(z >= 1);
                Hexagonal::new(x_coord, y_coord, 0)
            })
        })
    })
}
