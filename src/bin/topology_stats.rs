//! Print basic topological statistics for a configuration of boards.

use anyhow::Result;
use clap::Parser;

use hexwire::board::follow_packet_loop;
use hexwire::cli::{init_logging, TopologyArgs};
use hexwire::machine_map::CHIP_LAYERS_PER_BOARD;
use hexwire::metrics;
use hexwire::utils::folded_torus;
use hexwire::Direction;

#[derive(Parser)]
#[command(name = "topology-stats")]
#[command(about = "Print basic topological statistics for a machine")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    topology: TopologyArgs,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let topology = cli.topology.resolve()?;
    let (w, h) = (topology.width, topology.height);

    let (machine, hex_boards, folded) = folded_torus(
        w,
        h,
        topology.transformation,
        topology.uncrinkle_direction,
        topology.folds,
    );
    let folded_dims = metrics::dimensions(&folded).expect("system has at least one board");

    let num_boards = 3 * w * h;
    // Each triad contributes a board-sized hexagon of chips per axis.
    let chips_per_axis = 3 * CHIP_LAYERS_PER_BOARD;
    let chips_per_board = 48;

    println!("# Topology Statistics");
    println!();
    println!("| Parameter          | Value | Unit   |");
    println!("| ------------------ | ----- | ------ |");
    println!(
        "| Network dimensions | {}x{} | chips  |",
        w * chips_per_axis,
        h * chips_per_axis
    );
    println!("| Board array        | {w}x{h} | triads |");
    println!(
        "| Folded array       | {}x{} | boards |",
        folded_dims.x, folded_dims.y
    );
    println!("| Number of boards   | {num_boards} |        |");
    println!("| Number of cables   | {} |        |", 3 * num_boards);
    println!(
        "| Number of chips    | {} |        |",
        num_boards * chips_per_board
    );
    println!();

    // Walk a packet loop along each axis: three chip hops are made for
    // every two boards traversed.
    let start = hex_boards[0].0;
    println!("| Axis                | Chip hops per cycle |");
    println!("| ------------------- | ------------------- |");
    for (label, direction) in [
        ("South to north", Direction::North),
        ("West to east", Direction::East),
        ("South-west to north-east", Direction::NorthEast),
    ] {
        let boards_visited =
            follow_packet_loop(&machine, start, direction.opposite(), direction).count();
        println!("| {label} | {} |", boards_visited / 2 * 3);
    }

    Ok(())
}
