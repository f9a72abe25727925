//! The machine parameter file.
//!
//! A TOML record supplying every measurement of the cabinet hierarchy, the
//! per-direction socket offsets, how much of the machine is populated, and
//! the cable inventory:
//!
//! ```toml
//! [board]
//! dimensions = [0.014, 0.233, 0.240]
//! inter_board_spacing = 0.00124
//!
//! [board.wire_offsets]
//! south-west = [0.008, 0.013, 0.0]
//! north-east = [0.008, 0.031, 0.0]
//! east = [0.008, 0.049, 0.0]
//! west = [0.008, 0.067, 0.0]
//! north = [0.008, 0.085, 0.0]
//! south = [0.008, 0.103, 0.0]
//!
//! [frame]
//! boards_per_frame = 24
//! dimensions = [0.430, 0.266, 0.250]
//! board_offset = [0.06, 0.017, 0.0]
//! inter_frame_spacing = 0.133
//!
//! [cabinet]
//! frames_per_cabinet = 5
//! dimensions = [0.600, 2.000, 0.250]
//! frame_offset = [0.085, 0.047, 0.0]
//! inter_cabinet_spacing = 0.0
//!
//! [machine]
//! num_cabinets = 2
//! num_frames = 5
//! wire_lengths = [0.15, 0.3, 0.5, 1.0]
//! minimum_arc_height = 0.05
//! ```

use std::io;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::cabinet::{Cabinet, CabinetError, CabinetSpec};
use crate::coords::Cartesian3D;
use crate::topology::Direction;

/// A parameter file that cannot be read or does not make sense.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Parse(#[from] toml::de::Error),

    #[error("wire lengths must be positive, unique and sorted ascending")]
    BadWireLengths,

    #[error("minimum arc height must be non-negative")]
    NegativeArcHeight,

    #[error("{num_frames} populated frames do not fit a {frames_per_cabinet}-frame cabinet")]
    TooManyFrames {
        num_frames: u32,
        frames_per_cabinet: u32,
    },

    #[error(transparent)]
    Cabinet(#[from] CabinetError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BoardSection {
    pub dimensions: [f64; 3],
    pub wire_offsets: WireOffsets,
    pub inter_board_spacing: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireOffsets {
    pub east: [f64; 3],
    #[serde(rename = "north-east")]
    pub north_east: [f64; 3],
    pub north: [f64; 3],
    pub west: [f64; 3],
    #[serde(rename = "south-west")]
    pub south_west: [f64; 3],
    pub south: [f64; 3],
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FrameSection {
    pub boards_per_frame: u32,
    pub dimensions: [f64; 3],
    pub board_offset: [f64; 3],
    pub inter_frame_spacing: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CabinetSection {
    pub frames_per_cabinet: u32,
    pub dimensions: [f64; 3],
    pub frame_offset: [f64; 3],
    pub inter_cabinet_spacing: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineSection {
    pub num_cabinets: u32,
    /// Frames actually populated with boards (per cabinet).
    pub num_frames: u32,
    /// Available cable lengths in metres, ascending.
    pub wire_lengths: Vec<f64>,
    #[serde(default = "default_minimum_arc_height")]
    pub minimum_arc_height: f64,
}

fn default_minimum_arc_height() -> f64 {
    0.05
}

/// The complete, validated parameter file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MachineParams {
    pub board: BoardSection,
    pub frame: FrameSection,
    pub cabinet: CabinetSection,
    pub machine: MachineSection,
}

impl MachineParams {
    /// Parse and validate a parameter file's text.
    pub fn parse(text: &str) -> Result<MachineParams, ConfigError> {
        let params: MachineParams = toml::from_str(text)?;
        params.validate()?;
        Ok(params)
    }

    /// Read, parse and validate a parameter file.
    pub fn from_path(path: &Path) -> Result<MachineParams, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        MachineParams::parse(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let lengths = &self.machine.wire_lengths;
        let sorted_unique_positive = !lengths.is_empty()
            && lengths.windows(2).all(|pair| pair[0] < pair[1])
            && lengths[0] > 0.0;
        if !sorted_unique_positive {
            return Err(ConfigError::BadWireLengths);
        }

        if self.machine.minimum_arc_height < 0.0 {
            return Err(ConfigError::NegativeArcHeight);
        }

        if self.machine.num_frames == 0 || self.machine.num_frames > self.cabinet.frames_per_cabinet
        {
            return Err(ConfigError::TooManyFrames {
                num_frames: self.machine.num_frames,
                frames_per_cabinet: self.cabinet.frames_per_cabinet,
            });
        }

        Ok(())
    }

    /// The raw cabinet measurements this file describes.
    pub fn cabinet_spec(&self) -> CabinetSpec {
        let vec3 = |v: [f64; 3]| Cartesian3D::new(v[0], v[1], v[2]);

        let mut board_wire_offsets = [Cartesian3D::ZERO; 6];
        let offsets = &self.board.wire_offsets;
        board_wire_offsets[Direction::East.index() as usize] = vec3(offsets.east);
        board_wire_offsets[Direction::NorthEast.index() as usize] = vec3(offsets.north_east);
        board_wire_offsets[Direction::North.index() as usize] = vec3(offsets.north);
        board_wire_offsets[Direction::West.index() as usize] = vec3(offsets.west);
        board_wire_offsets[Direction::SouthWest.index() as usize] = vec3(offsets.south_west);
        board_wire_offsets[Direction::South.index() as usize] = vec3(offsets.south);

        CabinetSpec {
            board_dimensions: vec3(self.board.dimensions),
            board_wire_offsets,
            inter_board_spacing: self.board.inter_board_spacing,

            boards_per_frame: self.frame.boards_per_frame,
            frame_dimensions: vec3(self.frame.dimensions),
            frame_board_offset: vec3(self.frame.board_offset),
            inter_frame_spacing: self.frame.inter_frame_spacing,

            frames_per_cabinet: self.cabinet.frames_per_cabinet,
            cabinet_dimensions: vec3(self.cabinet.dimensions),
            cabinet_frame_offset: vec3(self.cabinet.frame_offset),
            inter_cabinet_spacing: self.cabinet.inter_cabinet_spacing,

            num_cabinets: self.machine.num_cabinets,
        }
    }

    /// Validate the geometry and produce the [`Cabinet`].
    pub fn to_cabinet(&self) -> Result<Cabinet, ConfigError> {
        Ok(Cabinet::new(self.cabinet_spec())?)
    }
}

impl Default for MachineParams {
    /// The standard single-cabinet rack with a typical cable inventory.
    fn default() -> MachineParams {
        let spec = CabinetSpec::default();
        let flat = |v: Cartesian3D| [v.x, v.y, v.z];
        let offset = |d: Direction| flat(spec.board_wire_offsets[d.index() as usize]);

        MachineParams {
            board: BoardSection {
                dimensions: flat(spec.board_dimensions),
                wire_offsets: WireOffsets {
                    east: offset(Direction::East),
                    north_east: offset(Direction::NorthEast),
                    north: offset(Direction::North),
                    west: offset(Direction::West),
                    south_west: offset(Direction::SouthWest),
                    south: offset(Direction::South),
                },
                inter_board_spacing: spec.inter_board_spacing,
            },
            frame: FrameSection {
                boards_per_frame: spec.boards_per_frame,
                dimensions: flat(spec.frame_dimensions),
                board_offset: flat(spec.frame_board_offset),
                inter_frame_spacing: spec.inter_frame_spacing,
            },
            cabinet: CabinetSection {
                frames_per_cabinet: spec.frames_per_cabinet,
                dimensions: flat(spec.cabinet_dimensions),
                frame_offset: flat(spec.cabinet_frame_offset),
                inter_cabinet_spacing: spec.inter_cabinet_spacing,
            },
            machine: MachineSection {
                num_cabinets: spec.num_cabinets,
                num_frames: spec.frames_per_cabinet,
                wire_lengths: vec![0.15, 0.3, 0.5, 1.0],
                minimum_arc_height: default_minimum_arc_height(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    const EXAMPLE: &str = r#"
[board]
dimensions = [0.014, 0.233, 0.240]
inter_board_spacing = 0.00124

[board.wire_offsets]
south-west = [0.008, 0.013, 0.0]
north-east = [0.008, 0.031, 0.0]
east = [0.008, 0.049, 0.0]
west = [0.008, 0.067, 0.0]
north = [0.008, 0.085, 0.0]
south = [0.008, 0.103, 0.0]

[frame]
boards_per_frame = 24
dimensions = [0.430, 0.266, 0.250]
board_offset = [0.06, 0.017, 0.0]
inter_frame_spacing = 0.133

[cabinet]
frames_per_cabinet = 5
dimensions = [0.600, 2.000, 0.250]
frame_offset = [0.085, 0.047, 0.0]
inter_cabinet_spacing = 0.0

[machine]
num_cabinets = 2
num_frames = 5
wire_lengths = [0.15, 0.3, 0.5, 1.0]
minimum_arc_height = 0.05
"#;

    #[test]
    fn test_parse_example() {
        let params = MachineParams::parse(EXAMPLE).unwrap();
        assert_eq!(params.machine.num_cabinets, 2);
        assert_eq!(params.machine.wire_lengths, vec![0.15, 0.3, 0.5, 1.0]);

        let cabinet = params.to_cabinet().unwrap();
        assert_eq!(cabinet.num_cabinets(), 2);
        assert_eq!(cabinet.boards_per_frame(), 24);
        assert_eq!(
            cabinet.board_wire_offset(Direction::North),
            Cartesian3D::new(0.008, 0.085, 0.0)
        );
    }

    #[test]
    fn test_arc_height_defaults() {
        let text = EXAMPLE.replace("minimum_arc_height = 0.05\n", "");
        let params = MachineParams::parse(&text).unwrap();
        assert_eq!(params.machine.minimum_arc_height, 0.05);
    }

    #[test]
    fn test_unsorted_wire_lengths_rejected() {
        let text = EXAMPLE.replace(
            "wire_lengths = [0.15, 0.3, 0.5, 1.0]",
            "wire_lengths = [0.3, 0.15]",
        );
        assert!(matches!(
            MachineParams::parse(&text),
            Err(ConfigError::BadWireLengths)
        ));
    }

    #[test]
    fn test_overfull_cabinet_rejected() {
        let text = EXAMPLE.replace("num_frames = 5", "num_frames = 6");
        assert!(matches!(
            MachineParams::parse(&text),
            Err(ConfigError::TooManyFrames { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let text = format!("{EXAMPLE}\n[extras]\nfoo = 1\n");
        assert!(matches!(
            MachineParams::parse(&text),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(EXAMPLE.as_bytes()).unwrap();

        let params = MachineParams::from_path(file.path()).unwrap();
        assert_eq!(params.machine.num_frames, 5);

        assert!(matches!(
            MachineParams::from_path(Path::new("/nonexistent/params.toml")),
            Err(ConfigError::Io { .. })
        ));
    }

    #[test]
    fn test_default_round_trips_through_cabinet() {
        let params = MachineParams::default();
        params.validate().unwrap();
        assert!(params.to_cabinet().is_ok());
    }
}
