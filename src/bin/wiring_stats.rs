//! Print statistics about the wires of a machine.

use std::collections::BTreeMap;

use anyhow::Result;
use clap::Parser;

use hexwire::cli::{init_logging, place, MachineArgs, TopologyArgs};
use hexwire::metrics;
use hexwire::plan::{flatten_wiring_plan, generate_wiring_plan};

#[derive(Parser)]
#[command(name = "wiring-stats")]
#[command(about = "Print statistics about the cables a machine needs")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    topology: TopologyArgs,

    #[command(flatten)]
    machine: MachineArgs,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let topology = cli.topology.resolve()?;
    let params = cli.machine.load(topology.num_boards())?;
    let placed = place(&topology, &params)?;

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )?;
    let flat = flatten_wiring_plan(&plan, &placed.cabinet);

    // Cables needed per inventory length. Keyed by the inventory index so
    // float lengths never act as map keys.
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &(_, _, length) in &flat {
        let index = params
            .machine
            .wire_lengths
            .iter()
            .position(|&l| l == length)
            .expect("assigned lengths come from the inventory");
        *counts.entry(index).or_default() += 1;
    }

    let distances = metrics::wire_lengths(&placed.machine, &placed.physical, Some(&placed.cabinet));
    let min = distances.iter().copied().fold(f64::INFINITY, f64::min);
    let max = distances.iter().copied().fold(0.0, f64::max);
    let mean: f64 = distances.iter().sum::<f64>() / distances.len() as f64;

    println!("# Wiring Statistics");
    println!();
    println!("Total cables: {}", flat.len());
    println!();
    println!("| Cable length (m) | Count |");
    println!("| ---------------- | ----- |");
    for (index, count) in counts {
        println!(
            "| {:16.2} | {count:5} |",
            params.machine.wire_lengths[index]
        );
    }
    println!();
    println!(
        "Socket-to-socket distances: min {min:.3} m, mean {mean:.3} m, max {max:.3} m"
    );

    Ok(())
}
