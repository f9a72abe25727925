//! Shared command-line argument handling for the hexwire tools.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;

use crate::board::{BoardId, Machine};
use crate::cabinet::Cabinet;
use crate::config::MachineParams;
use crate::coords::{CabinetCoord, Cartesian3D, Hexagonal};
use crate::transforms;
use crate::utils::{
    default_transformation, folded_torus, ideal_system_size, min_num_cabinets, Transformation,
    UncrinkleDirection, DEFAULT_FOLDS,
};

/// Selection of the machine's topology and how it is folded.
#[derive(Debug, Args)]
pub struct TopologyArgs {
    /// Build the squarest system with this many boards (a multiple of 3)
    #[arg(short = 'n', long, value_name = "N", conflicts_with = "triads")]
    pub num_boards: Option<u32>,

    /// Build a system of exactly W x H triads of boards
    #[arg(short = 't', long, num_args = 2, value_names = ["W", "H"])]
    pub triads: Option<Vec<u32>>,

    /// Transformation from hexagonal torus to rectangular grid
    /// (default: chosen from the dimensions)
    #[arg(short = 'T', long, value_name = "slice|shear")]
    pub transformation: Option<String>,

    /// Direction in which to uncrinkle the hexagonal mesh
    #[arg(long, default_value = "rows", value_name = "rows|columns")]
    pub uncrinkle_direction: String,

    /// Number of pieces to fold into in each dimension
    #[arg(short = 'F', long, num_args = 2, value_names = ["X", "Y"])]
    pub folds: Option<Vec<i32>>,
}

/// A fully decided topology.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedTopology {
    pub width: i32,
    pub height: i32,
    pub transformation: Transformation,
    pub uncrinkle_direction: UncrinkleDirection,
    pub folds: (i32, i32),
}

impl ResolvedTopology {
    pub fn num_boards(&self) -> u32 {
        (3 * self.width * self.height) as u32
    }
}

impl TopologyArgs {
    pub fn resolve(&self) -> Result<ResolvedTopology> {
        let (width, height) = match (self.num_boards, &self.triads) {
            (Some(n), None) => {
                let (w, h) = ideal_system_size(n).context("invalid board count")?;
                if w == 0 {
                    bail!("the system must contain at least one board");
                }
                (w as i32, h as i32)
            }
            (None, Some(triads)) => {
                let (w, h) = (triads[0], triads[1]);
                if w == 0 || h == 0 {
                    bail!("system dimensions must be positive and non-zero");
                }
                (w as i32, h as i32)
            }
            _ => bail!("exactly one of --num-boards or --triads is required"),
        };

        let transformation = match &self.transformation {
            Some(name) => name.parse::<Transformation>()?,
            None => default_transformation(width, height),
        };

        let uncrinkle_direction = self.uncrinkle_direction.parse::<UncrinkleDirection>()?;

        let folds = match &self.folds {
            Some(folds) => (folds[0], folds[1]),
            None => DEFAULT_FOLDS,
        };
        if folds.0 <= 0 || folds.1 <= 0 {
            bail!("number of pieces to fold into must be at least 1");
        }

        Ok(ResolvedTopology {
            width,
            height,
            transformation,
            uncrinkle_direction,
            folds,
        })
    }
}

/// Selection of the physical machine: parameter file and cable inventory.
#[derive(Debug, Args)]
pub struct MachineArgs {
    /// Machine parameter file (TOML); defaults to the standard rack
    #[arg(long, value_name = "FILE")]
    pub params: Option<PathBuf>,

    /// Available wire length in metres (repeatable; overrides the file)
    #[arg(short = 'l', long = "wire-length", value_name = "L")]
    pub wire_lengths: Vec<f64>,
}

impl MachineArgs {
    /// Load the parameter file (or the defaults, sized to hold
    /// `num_boards` boards in as few cabinets as possible) and apply the
    /// command-line inventory override.
    pub fn load(&self, num_boards: u32) -> Result<MachineParams> {
        let mut params = match &self.params {
            Some(path) => MachineParams::from_path(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => {
                let mut params = MachineParams::default();
                let (num_cabinets, num_frames) = min_num_cabinets(
                    num_boards,
                    params.cabinet.frames_per_cabinet,
                    params.frame.boards_per_frame,
                );
                params.machine.num_cabinets = num_cabinets.max(1);
                params.machine.num_frames = num_frames.max(1);
                params
            }
        };

        if !self.wire_lengths.is_empty() {
            let mut lengths = self.wire_lengths.clone();
            if lengths.iter().any(|&l| l <= 0.0 || !l.is_finite()) {
                bail!("wire lengths must be positive");
            }
            lengths.sort_by(f64::total_cmp);
            lengths.dedup();
            params.machine.wire_lengths = lengths;
        }

        let capacity = params.machine.num_cabinets
            * params.machine.num_frames
            * params.frame.boards_per_frame;
        if capacity < num_boards {
            bail!(
                "not enough cabinets/frames available for {num_boards} boards \
                 (capacity {capacity})"
            );
        }

        Ok(params)
    }
}

/// A system taken all the way through the placement pipeline.
pub struct PlacedSystem {
    pub machine: Machine,
    pub hex_boards: Vec<(BoardId, Hexagonal)>,
    pub cabinetised: Vec<(BoardId, CabinetCoord)>,
    pub physical: Vec<(BoardId, Cartesian3D)>,
    pub cabinet: Cabinet,
}

/// Run the canonical placement pipeline: torus, fold, cabinetise, remove
/// gaps, physical positions.
pub fn place(topology: &ResolvedTopology, params: &MachineParams) -> Result<PlacedSystem> {
    let cabinet = params.to_cabinet()?;

    let (machine, hex_boards, folded) = folded_torus(
        topology.width,
        topology.height,
        topology.transformation,
        topology.uncrinkle_direction,
        topology.folds,
    );

    let cabinetised = transforms::remove_gaps(&transforms::cabinetise(
        &folded,
        params.machine.num_cabinets,
        params.machine.num_frames,
        Some(params.frame.boards_per_frame),
    )?);
    let physical = transforms::cabinet_to_physical(&cabinetised, &cabinet);

    Ok(PlacedSystem {
        machine,
        hex_boards,
        cabinetised,
        physical,
        cabinet,
    })
}

/// Wire up the log facade: `-v` for info, `-vv` for debug.
pub fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();
}
