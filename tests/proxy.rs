//! Proxy server/client tests over real loopback sockets.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use hexwire::cli::{place, ResolvedTopology};
use hexwire::config::MachineParams;
use hexwire::guide::{NullAnnouncer, PollOutcome, WiringGuide};
use hexwire::plan::{flatten_wiring_plan, generate_wiring_plan, to_installation_plan, PlanEntry};
use hexwire::probe::{SimulatedFabric, WiringProbe};
use hexwire::proxy::{ProxyClient, ProxyError, ProxyServer};
use hexwire::utils::{Transformation, UncrinkleDirection};
use hexwire::Direction;

struct RunningServer {
    port: u16,
    shutdown: Arc<AtomicBool>,
    handle: thread::JoinHandle<ProxyServer<SimulatedFabric>>,
}

impl RunningServer {
    /// Serve `fabric` on a fresh local port from a background thread.
    fn start(mut fabric: SimulatedFabric, dims: (u32, u32, u32)) -> RunningServer {
        let probe = WiringProbe::new(&mut fabric, dims.0, dims.1, dims.2).unwrap();
        let mut server = ProxyServer::bind(fabric, probe, "127.0.0.1", 0).unwrap();
        let port = server.local_addr().unwrap().port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = thread::spawn(move || {
            server.run(&flag).unwrap();
            server
        });

        RunningServer {
            port,
            shutdown,
            handle,
        }
    }

    /// Stop the server and hand back its state for inspection.
    fn stop(self) -> ProxyServer<SimulatedFabric> {
        self.shutdown.store(true, Ordering::SeqCst);
        self.handle.join().unwrap()
    }
}

/// A fully planned single-triad machine and its ideally-wired fabric.
fn planned_triad() -> (Vec<PlanEntry>, SimulatedFabric) {
    let topology = ResolvedTopology {
        width: 1,
        height: 1,
        transformation: Transformation::Shear,
        uncrinkle_direction: UncrinkleDirection::Rows,
        folds: (1, 1),
    };
    let mut params = MachineParams::default();
    params.machine.num_cabinets = 1;
    params.machine.num_frames = 1;
    params.machine.minimum_arc_height = 0.0;
    let placed = place(&topology, &params).unwrap();

    let plan = generate_wiring_plan(
        &placed.machine,
        &placed.cabinetised,
        &placed.physical,
        &placed.cabinet,
        &params.machine.wire_lengths,
        params.machine.minimum_arc_height,
    )
    .unwrap();
    let entries = to_installation_plan(
        &flatten_wiring_plan(&plan, &placed.cabinet),
        &placed.cabinetised,
    );

    let mut fabric = SimulatedFabric::unwired();
    for entry in &entries {
        fabric.connect(entry.src, entry.dst);
    }
    (entries, fabric)
}

#[test]
fn target_queries_are_proxied() {
    let (entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut client = ProxyClient::connect("127.0.0.1", server.port).unwrap();

    for entry in &entries {
        let target = client
            .link_target(
                entry.src.cabinet,
                entry.src.frame,
                entry.src.board,
                entry.src.direction,
            )
            .unwrap();
        assert_eq!(target, Some(entry.dst));
    }

    // A socket with no cable reports no link.
    let unwired = client.link_target(0, 0, 9, Direction::North).unwrap();
    assert_eq!(unwired, None);

    server.stop();
}

#[test]
fn led_reference_counting_across_clients() {
    let (_entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut client_a = ProxyClient::connect("127.0.0.1", server.port).unwrap();
    let mut client_b = ProxyClient::connect("127.0.0.1", server.port).unwrap();

    // Both clients light the same LED; only one hardware call happens.
    client_a.set_led(3, true, 0, 0, 0).unwrap();
    client_b.set_led(3, true, 0, 0, 0).unwrap();

    // One client releases it; it stays lit for the other.
    client_a.set_led(3, false, 0, 0, 0).unwrap();

    // The last holder disconnecting turns it off.
    drop(client_b);

    let server = server.stop();
    assert_eq!(
        server.transport().led_log(),
        &[(3, true, 0, 0, 0), (3, false, 0, 0, 0)][..]
    );
    assert!(!server.transport().led(3, 0, 0, 0));
}

#[test]
fn version_mismatch_is_refused() {
    let (_entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut stream = TcpStream::connect(("127.0.0.1", server.port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(b"VERSION,99.99.99\n").unwrap();

    // The server hangs up without a response.
    let mut buf = Vec::new();
    let received = stream.read_to_end(&mut buf).unwrap();
    assert_eq!(received, 0);

    server.stop();
}

#[test]
fn oversized_lines_disconnect_the_sender() {
    let (_entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut stream = TcpStream::connect(("127.0.0.1", server.port)).unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();
    stream.write_all(&[b'x'; 2048]).unwrap();

    let mut buf = Vec::new();
    let received = stream.read_to_end(&mut buf).unwrap();
    assert_eq!(received, 0);

    server.stop();
}

#[test]
fn unknown_commands_disconnect_the_sender() {
    let (_entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut client = ProxyClient::connect("127.0.0.1", server.port).unwrap();
    // Valid handshake, then garbage through the same socket.
    let result = {
        let mut stream = TcpStream::connect(("127.0.0.1", server.port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(b"FROB,1,2\n").unwrap();
        let mut buf = Vec::new();
        stream.read_to_end(&mut buf).unwrap()
    };
    assert_eq!(result, 0);

    // The well-behaved client is unaffected.
    client.set_led(1, true, 0, 0, 0).unwrap();
    client.set_led(1, false, 0, 0, 0).unwrap();

    server.stop();
}

#[test]
fn guide_auto_advances_over_a_proxied_machine() {
    let (entries, fabric) = planned_triad();
    let num_wires = entries.len();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let client = ProxyClient::connect("127.0.0.1", server.port).unwrap();
    let mut guide = WiringGuide::new(entries, Some(client), NullAnnouncer);
    guide.start(0).unwrap();

    // The fabric is already wired per plan, so every poll advances until
    // the final wire reports completion.
    for _ in 0..num_wires - 1 {
        assert_eq!(guide.poll().unwrap(), PollOutcome::Advanced);
    }
    assert_eq!(guide.poll().unwrap(), PollOutcome::Complete);
    guide.finish().unwrap();

    server.stop();
}

#[test]
fn client_surfaces_closed_connections() {
    let (_entries, fabric) = planned_triad();
    let server = RunningServer::start(fabric, (1, 1, 3));

    let mut client = ProxyClient::connect("127.0.0.1", server.port).unwrap();
    let server = server.stop();
    drop(server);

    let result = client.link_target(0, 0, 0, Direction::North);
    assert!(matches!(
        result,
        Err(ProxyError::ConnectionClosed) | Err(ProxyError::Io(_))
    ));
    let _ = client;
}

#[test]
fn guide_over_proxy_lights_leds_for_the_current_wire() {
    let (entries, fabric) = planned_triad();
    let first = entries[0];
    let server = RunningServer::start(fabric, (1, 1, 3));

    let client = ProxyClient::connect("127.0.0.1", server.port).unwrap();
    let mut guide = WiringGuide::new(entries, Some(client), NullAnnouncer)
        .with_auto_advance(false);
    guide.start(0).unwrap();
    assert_eq!(guide.poll().unwrap(), PollOutcome::NotPolled);
    drop(guide);

    let server = server.stop();
    let log = server.transport().led_log();
    // The first wire's endpoints were lit.
    assert!(log.contains(&(
        hexwire::guide::DEFAULT_BMP_LED,
        true,
        first.src.cabinet,
        first.src.frame,
        first.src.board
    )));
}
