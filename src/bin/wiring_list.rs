//! Enumerate every connection required in a machine.

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;

use hexwire::cli::{init_logging, place, MachineArgs, TopologyArgs};
use hexwire::plan::{
    flatten_wiring_plan, generate_wiring_plan, to_installation_plan, write_plan_csv, PlanEntry,
};

#[derive(Parser)]
#[command(name = "wiring-list")]
#[command(about = "Enumerate every connection required in a machine")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    topology: TopologyArgs,

    #[command(flatten)]
    machine: MachineArgs,

    /// Listing order: the installer's working order, board-by-board, or by
    /// cable length
    #[arg(
        short = 's',
        long,
        default_value = "board",
        value_parser = ["installation-order", "board", "wire-length"],
    )]
    sort_by: String,

    /// Print an aligned table instead of CSV
    #[arg(long)]
    pretty: bool,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn print_pretty(entries: &[PlanEntry]) {
    println!("C  F  B  Socket      C  F  B  Socket      Length");
    println!("-- -- -- ----------  -- -- -- ----------  ------");
    for entry in entries {
        let length = match entry.length {
            Some(length) => format!("{length:.2}"),
            None => "remove".to_string(),
        };
        println!(
            "{:2} {:2} {:2} {:10}  {:2} {:2} {:2} {:10}  {}",
            entry.src.cabinet,
            entry.src.frame,
            entry.src.board,
            entry.src.direction.name().replace('-', " "),
            entry.dst.cabinet,
            entry.dst.frame,
            entry.dst.board,
            entry.dst.direction.name().replace('-', " "),
            length,
        );
    }
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
    let mut entries = to_installation_plan(&flat, &placed.cabinetised);

    match cli.sort_by.as_str() {
        "board" => entries.sort_by_key(|entry| (entry.src, entry.dst)),
        "wire-length" => entries.sort_by(|a, b| {
            a.length
                .unwrap_or(0.0)
                .total_cmp(&b.length.unwrap_or(0.0))
                .then_with(|| (a.src, a.dst).cmp(&(b.src, b.dst)))
        }),
        // Already in assembly order.
        _ => {}
    }

    if cli.pretty {
        print_pretty(&entries);
    } else {
        write_plan_csv(io::stdout().lock(), &entries)?;
        io::stdout().flush()?;
    }
    Ok(())
}
