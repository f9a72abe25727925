//! Run a proxy server so several wiring-guide sessions can share one
//! machine.
//!
//! The hardware transport library is external to this crate, so the server
//! currently fronts a simulated machine (`--simulate`): an in-memory fabric
//! wired exactly as the installation plan prescribes. That is enough to
//! exercise guide clients end-to-end against a correctly-wired system.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;

use hexwire::cli::{init_logging, place, MachineArgs, TopologyArgs};
use hexwire::plan::{flatten_wiring_plan, generate_wiring_plan, to_installation_plan};
use hexwire::probe::{SimulatedFabric, WiringProbe};
use hexwire::proxy::{ProxyServer, DEFAULT_PORT};

#[derive(Parser)]
#[command(name = "proxy-server")]
#[command(about = "Share one machine connection between several wiring guides")]
#[command(version)]
struct Cli {
    /// Host interface to listen on
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on
    #[arg(short = 'p', long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Serve a simulated, plan-wired machine instead of real hardware
    #[arg(long)]
    simulate: bool,

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

    if !cli.simulate {
        bail!(
            "only simulated machines are supported: pass --simulate \
             (the board-management transport is an external component)"
        );
    }

    let topology = cli.topology.resolve()?;
    let params = cli.machine.load(topology.num_boards())?;
    let placed = place(&topology, &params)?;

    // Wire the simulated fabric exactly as the plan prescribes.
    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )?;
    let flat = flatten_wiring_plan(&plan, &placed.cabinet);
    let entries = to_installation_plan(&flat, &placed.cabinetised);

    let mut fabric = SimulatedFabric::unwired();
    for entry in &entries {
        fabric.connect(entry.src, entry.dst);
    }

    // Boards per probed frame: a system below one frame's worth does not
    // fill it.
    let boards_per_frame =
        if params.machine.num_cabinets == 1 && params.machine.num_frames == 1 {
            topology.num_boards()
        } else {
            params.frame.boards_per_frame
        };

    let probe = WiringProbe::new(
        &mut fabric,
        params.machine.num_cabinets,
        params.machine.num_frames,
        boards_per_frame,
    )
    .context("failed to initialise the wiring probe")?;

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("failed to install the interrupt handler")?;
    }

    let mut server = ProxyServer::bind(fabric, probe, &cli.host, cli.port)
        .with_context(|| format!("failed to listen on {}:{}", cli.host, cli.port))?;
    println!("Proxy server starting...");
    server.run(&shutdown)?;
    Ok(())
}
