//! Physical dimensions of a set of cabinets, and positions within them.
//!
//! A machine stands in a row of cabinets; each cabinet holds a stack of
//! frames and each frame a row of boards. Every level contributes an
//! additive offset, so the position of any cabinet, frame, board or socket
//! is a sum of the offsets down the containment chain.

use core::fmt;

use thiserror::Error;

use crate::coords::{CabinetCoord, Cartesian3D};
use crate::topology::Direction;

/// A cabinet specification that fails its geometric sanity checks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CabinetError {
    #[error("{field} must be non-negative")]
    Negative { field: &'static str },

    #[error("{direction} wire must be within the bounds of the board")]
    WireOutsideBoard { direction: Direction },

    #[error("boards must be within the bounds of a frame")]
    BoardsOutsideFrame,

    #[error("frames must be within the bounds of a cabinet")]
    FramesOutsideCabinet,
}

/// One socket of one board slot in the containment hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SocketRef {
    pub cabinet: u32,
    pub frame: u32,
    pub board: u32,
    pub direction: Direction,
}

impl SocketRef {
    pub const fn new(cabinet: u32, frame: u32, board: u32, direction: Direction) -> Self {
        SocketRef {
            cabinet,
            frame,
            board,
            direction,
        }
    }

    pub const fn slot(self) -> CabinetCoord {
        CabinetCoord::new(self.cabinet, self.frame, self.board)
    }
}

impl fmt::Display for SocketRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C{} F{} B{:02} {}",
            self.cabinet, self.frame, self.board, self.direction
        )
    }
}

/// Raw cabinet measurements, all in metres.
///
/// Offsets are measured from the left-top-front corner of the containing
/// box. The `Default` value is the standard 19-inch rack arrangement of
/// 24-board frames, five frames to a cabinet.
#[derive(Debug, Clone, PartialEq)]
pub struct CabinetSpec {
    pub board_dimensions: Cartesian3D,
    /// Socket offsets from the board corner, indexed by `Direction as usize`.
    pub board_wire_offsets: [Cartesian3D; 6],
    pub inter_board_spacing: f64,

    pub boards_per_frame: u32,
    pub frame_dimensions: Cartesian3D,
    pub frame_board_offset: Cartesian3D,
    pub inter_frame_spacing: f64,

    pub frames_per_cabinet: u32,
    pub cabinet_dimensions: Cartesian3D,
    pub cabinet_frame_offset: Cartesian3D,
    pub inter_cabinet_spacing: f64,

    pub num_cabinets: u32,
}

impl Default for CabinetSpec {
    fn default() -> Self {
        let mut board_wire_offsets = [Cartesian3D::ZERO; 6];
        board_wire_offsets[Direction::SouthWest.index() as usize] =
            Cartesian3D::new(0.008, 0.013, 0.0);
        board_wire_offsets[Direction::NorthEast.index() as usize] =
            Cartesian3D::new(0.008, 0.031, 0.0);
        board_wire_offsets[Direction::East.index() as usize] = Cartesian3D::new(0.008, 0.049, 0.0);
        board_wire_offsets[Direction::West.index() as usize] = Cartesian3D::new(0.008, 0.067, 0.0);
        board_wire_offsets[Direction::North.index() as usize] = Cartesian3D::new(0.008, 0.085, 0.0);
        board_wire_offsets[Direction::South.index() as usize] = Cartesian3D::new(0.008, 0.103, 0.0);

        CabinetSpec {
            board_dimensions: Cartesian3D::new(0.014, 0.233, 0.240),
            board_wire_offsets,
            inter_board_spacing: 0.00124,

            boards_per_frame: 24,
            frame_dimensions: Cartesian3D::new(0.430, 0.266, 0.250),
            frame_board_offset: Cartesian3D::new(0.06, 0.017, 0.0),
            inter_frame_spacing: 0.133,

            frames_per_cabinet: 5,
            cabinet_dimensions: Cartesian3D::new(0.600, 2.000, 0.250),
            cabinet_frame_offset: Cartesian3D::new(0.085, 0.047, 0.0),
            inter_cabinet_spacing: 0.0,

            num_cabinets: 1,
        }
    }
}

/// A validated cabinet geometry.
#[derive(Debug, Clone, PartialEq)]
pub struct Cabinet {
    spec: CabinetSpec,
}

impl Cabinet {
    /// Validate a specification and wrap it.
    pub fn new(spec: CabinetSpec) -> Result<Cabinet, CabinetError> {
        fn check_positive(value: f64, field: &'static str) -> Result<(), CabinetError> {
            if value < 0.0 {
                Err(CabinetError::Negative { field })
            } else {
                Ok(())
            }
        }

        fn check_positive_vec(value: Cartesian3D, field: &'static str) -> Result<(), CabinetError> {
            if value.x < 0.0 || value.y < 0.0 || value.z < 0.0 {
                Err(CabinetError::Negative { field })
            } else {
                Ok(())
            }
        }

        check_positive_vec(spec.board_dimensions, "board_dimensions")?;
        check_positive(spec.inter_board_spacing, "inter_board_spacing")?;
        check_positive_vec(spec.frame_dimensions, "frame_dimensions")?;
        check_positive_vec(spec.frame_board_offset, "frame_board_offset")?;
        check_positive(spec.inter_frame_spacing, "inter_frame_spacing")?;
        check_positive_vec(spec.cabinet_dimensions, "cabinet_dimensions")?;
        check_positive_vec(spec.cabinet_frame_offset, "cabinet_frame_offset")?;
        check_positive(spec.inter_cabinet_spacing, "inter_cabinet_spacing")?;

        // Every socket must sit within the board box.
        for direction in Direction::ALL {
            let offset = spec.board_wire_offsets[direction.index() as usize];
            let d = spec.board_dimensions;
            let inside = (0.0..=d.x).contains(&offset.x)
                && (0.0..=d.y).contains(&offset.y)
                && (0.0..=d.z).contains(&offset.z);
            if !inside {
                return Err(CabinetError::WireOutsideBoard { direction });
            }
        }

        let cabinet = Cabinet { spec };

        // The board array plus its offset must fit within the frame box, and
        // likewise the frame array within the cabinet box.
        let boards_extent = cabinet.frame_board_offset_opposite();
        let d = cabinet.spec.frame_dimensions;
        if boards_extent.x > d.x || boards_extent.y > d.y || boards_extent.z > d.z {
            return Err(CabinetError::BoardsOutsideFrame);
        }

        let frames_extent = cabinet.cabinet_frame_offset_opposite();
        let d = cabinet.spec.cabinet_dimensions;
        if frames_extent.x > d.x || frames_extent.y > d.y || frames_extent.z > d.z {
            return Err(CabinetError::FramesOutsideCabinet);
        }

        Ok(cabinet)
    }

    pub fn spec(&self) -> &CabinetSpec {
        &self.spec
    }

    pub fn num_cabinets(&self) -> u32 {
        self.spec.num_cabinets
    }

    pub fn frames_per_cabinet(&self) -> u32 {
        self.spec.frames_per_cabinet
    }

    pub fn boards_per_frame(&self) -> u32 {
        self.spec.boards_per_frame
    }

    pub fn board_dimensions(&self) -> Cartesian3D {
        self.spec.board_dimensions
    }

    /// Offset of a socket from the board's left-top-front corner.
    pub fn board_wire_offset(&self, direction: Direction) -> Cartesian3D {
        self.spec.board_wire_offsets[direction.index() as usize]
    }

    /// The far corner of the board array measured from the frame corner.
    fn frame_board_offset_opposite(&self) -> Cartesian3D {
        let s = &self.spec;
        Cartesian3D::new(
            ((s.board_dimensions.x + s.inter_board_spacing) * f64::from(s.boards_per_frame)
                - s.inter_board_spacing)
                + s.frame_board_offset.x,
            s.board_dimensions.y + s.frame_board_offset.y,
            s.board_dimensions.z + s.frame_board_offset.z,
        )
    }

    /// The far corner of the frame array measured from the cabinet corner.
    fn cabinet_frame_offset_opposite(&self) -> Cartesian3D {
        let s = &self.spec;
        Cartesian3D::new(
            s.frame_dimensions.x + s.cabinet_frame_offset.x,
            ((s.frame_dimensions.y + s.inter_frame_spacing) * f64::from(s.frames_per_cabinet)
                - s.inter_frame_spacing)
                + s.cabinet_frame_offset.y,
            s.frame_dimensions.z + s.cabinet_frame_offset.z,
        )
    }

    /// Physical position of a cabinet's left-top-front corner.
    pub fn cabinet_position(&self, cabinet: u32) -> Cartesian3D {
        let s = &self.spec;
        Cartesian3D::new(
            (s.cabinet_dimensions.x + s.inter_cabinet_spacing) * f64::from(cabinet),
            0.0,
            0.0,
        )
    }

    /// Physical position of a frame's left-top-front corner.
    pub fn frame_position(&self, cabinet: u32, frame: u32) -> Cartesian3D {
        let s = &self.spec;
        self.cabinet_position(cabinet)
            + s.cabinet_frame_offset
            + Cartesian3D::new(
                0.0,
                (s.frame_dimensions.y + s.inter_frame_spacing) * f64::from(frame),
                0.0,
            )
    }

    /// Physical position of a board's left-top-front corner.
    pub fn board_position(&self, cabinet: u32, frame: u32, board: u32) -> Cartesian3D {
        let s = &self.spec;
        self.frame_position(cabinet, frame)
            + s.frame_board_offset
            + Cartesian3D::new(
                (s.board_dimensions.x + s.inter_board_spacing) * f64::from(board),
                0.0,
                0.0,
            )
    }

    /// Physical position of a socket's centre on the board face.
    pub fn socket_position(
        &self,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> Cartesian3D {
        self.board_position(cabinet, frame, board) + self.board_wire_offset(direction)
    }

    /// As [`socket_position`](Self::socket_position), addressed by a
    /// [`SocketRef`].
    pub fn socket_ref_position(&self, socket: SocketRef) -> Cartesian3D {
        self.socket_position(socket.cabinet, socket.frame, socket.board, socket.direction)
    }

    /// Outer bounding box of the given number of cabinets, frames within one
    /// cabinet, or boards within one frame. Used for diagram zooming; not
    /// part of the wiring computation.
    pub fn dimensions(
        &self,
        cabinets: Option<u32>,
        frames: Option<u32>,
        boards: Option<u32>,
    ) -> Cartesian3D {
        let s = &self.spec;
        if let Some(boards) = boards {
            Cartesian3D::new(
                (s.board_dimensions.x + s.inter_board_spacing) * f64::from(boards)
                    - s.inter_board_spacing,
                s.board_dimensions.y,
                s.board_dimensions.z,
            )
        } else if let Some(frames) = frames {
            Cartesian3D::new(
                s.frame_dimensions.x,
                (s.frame_dimensions.y + s.inter_frame_spacing) * f64::from(frames)
                    - s.inter_frame_spacing,
                s.frame_dimensions.z,
            )
        } else {
            let cabinets = cabinets.unwrap_or(s.num_cabinets);
            Cartesian3D::new(
                (s.cabinet_dimensions.x + s.inter_cabinet_spacing) * f64::from(cabinets)
                    - s.inter_cabinet_spacing,
                s.cabinet_dimensions.y,
                s.cabinet_dimensions.z,
            )
        }
    }
}
