//! Produce a CSV listing of Ethernet-connected chip positions.

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;

use hexwire::cli::{init_logging, place, MachineArgs, TopologyArgs};
use hexwire::machine_map::{ethernet_chip_map, write_ethernet_chip_csv};

#[derive(Parser)]
#[command(name = "ethernet-chips")]
#[command(about = "List the network position of each board's Ethernet chip")]
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

    let rows = ethernet_chip_map(&placed.hex_boards, &placed.cabinetised);
    write_ethernet_chip_csv(io::stdout().lock(), &rows)?;
    io::stdout().flush()?;
    Ok(())
}
