//! A proxy enabling several wiring-guide sessions to share one machine
//! connection.
//!
//! The protocol is line-oriented over TCP: each message is a UTF-8 line of
//! comma-separated fields terminated by `\n`. Three commands exist:
//!
//! | Command   | Arguments           | Response            |
//! |-----------|---------------------|---------------------|
//! | `VERSION` | semver string       | `OK`                |
//! | `LED`     | c,f,b,led,state     | `OK`                |
//! | `TARGET`  | c,f,b,d             | `c,f,b,d` or `None` |
//!
//! The server multiplexes clients over a synchronous readiness selector on
//! one thread. LED state is reference counted per (cabinet, frame, board,
//! led): the hardware LED is lit exactly while at least one live client has
//! asked for it, and a disconnecting client releases everything it lit.

use std::collections::{HashMap, HashSet};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, error, info};
use polling::{Event, Events, Poller};
use thiserror::Error;

use crate::cabinet::SocketRef;
use crate::probe::{BmpTransport, LedController, LinkProber, WiringProbe};
use crate::topology::Direction;

/// Default TCP port of the proxy server.
pub const DEFAULT_PORT: u16 = 6512;

/// Protocol version exchanged in the `VERSION` handshake.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Commands longer than this get their sender disconnected.
const MAX_LINE_LENGTH: usize = 1024;

const LISTENER_KEY: usize = 0;

/// Interval at which the server loop rechecks its shutdown flag.
const WAKE_INTERVAL: Duration = Duration::from_millis(100);

/// A proxy protocol failure.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("remote server closed the connection")]
    ConnectionClosed,

    #[error("protocol version mismatch (ours {ours}, theirs {theirs})")]
    VersionMismatch { ours: String, theirs: String },

    #[error("malformed command {0:?}")]
    MalformedCommand(String),

    #[error("unexpected response {0:?}")]
    UnexpectedResponse(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

struct Client {
    stream: TcpStream,
    addr: SocketAddr,
    buffer: Vec<u8>,
}

/// The server side of the proxy.
///
/// Owns the hardware connection; clients must never hold one of their own.
pub struct ProxyServer<T: BmpTransport> {
    listener: TcpListener,
    poller: Poller,
    transport: T,
    probe: WiringProbe,
    clients: HashMap<usize, Client>,
    /// For each LED, the set of clients which have turned it on.
    led_setters: HashMap<(u32, u32, u32, u32), HashSet<usize>>,
    next_key: usize,
}

impl<T: BmpTransport> ProxyServer<T> {
    /// Bind the listening socket. Pass port 0 to pick a free port.
    pub fn bind(
        transport: T,
        probe: WiringProbe,
        host: &str,
        port: u16,
    ) -> Result<ProxyServer<T>, ProxyError> {
        let listener = TcpListener::bind((host, port))?;
        listener.set_nonblocking(true)?;

        let poller = Poller::new()?;
        // Safety: the listener lives in the returned server alongside the
        // poller and is deleted from it only on drop.
        unsafe {
            poller.add(&listener, Event::readable(LISTENER_KEY))?;
        }

        Ok(ProxyServer {
            listener,
            poller,
            transport,
            probe,
            clients: HashMap::new(),
            led_setters: HashMap::new(),
            next_key: LISTENER_KEY + 1,
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Serve clients until the shutdown flag is raised, then disconnect
    /// everyone (which also releases their LEDs).
    pub fn run(&mut self, shutdown: &AtomicBool) -> Result<(), ProxyError> {
        info!("proxy server listening on {}", self.local_addr()?);

        let mut events = Events::new();
        while !shutdown.load(Ordering::SeqCst) {
            events.clear();
            self.poller.wait(&mut events, Some(WAKE_INTERVAL))?;

            let keys: Vec<usize> = events.iter().map(|event| event.key).collect();
            for key in keys {
                if key == LISTENER_KEY {
                    self.accept_clients();
                    self.poller
                        .modify(&self.listener, Event::readable(LISTENER_KEY))?;
                } else {
                    self.service_client(key);
                }
            }
        }

        for key in self.clients.keys().copied().collect::<Vec<usize>>() {
            self.remove_client(key);
        }
        info!("proxy server terminated cleanly");
        Ok(())
    }

    fn accept_clients(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.add_client(stream, addr) {
                        error!("failed to register client {addr}: {e}");
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    error!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    fn add_client(&mut self, stream: TcpStream, addr: SocketAddr) -> io::Result<()> {
        stream.set_nonblocking(true)?;

        let key = self.next_key;
        self.next_key += 1;

        // Safety: the stream lives in the client table alongside the poller
        // and is deleted from it on removal.
        unsafe {
            self.poller.add(&stream, Event::readable(key))?;
        }

        info!("new connection from {addr}");
        self.clients.insert(
            key,
            Client {
                stream,
                addr,
                buffer: Vec::new(),
            },
        );
        Ok(())
    }

    /// Disconnect a client and release every LED it had turned on.
    fn remove_client(&mut self, key: usize) {
        if let Some(client) = self.clients.remove(&key) {
            info!("closing connection from {}", client.addr);
            let _ = self.poller.delete(&client.stream);
        }

        let lit: Vec<(u32, u32, u32, u32)> = self
            .led_setters
            .iter()
            .filter(|(_, setters)| setters.contains(&key))
            .map(|(&slot, _)| slot)
            .collect();
        for (c, f, b, led) in lit {
            if let Err(e) = self.set_led(key, c, f, b, led, false) {
                error!("failed to release LED {led} on C{c} F{f} B{b}: {e}");
            }
        }
    }

    /// Reference-counted LED update: the hardware is touched only when the
    /// LED's lit/unlit status actually changes.
    fn set_led(
        &mut self,
        key: usize,
        c: u32,
        f: u32,
        b: u32,
        led: u32,
        state: bool,
    ) -> Result<(), ProxyError> {
        let setters = self.led_setters.entry((c, f, b, led)).or_default();

        let was_lit = !setters.is_empty();
        if state {
            setters.insert(key);
        } else {
            setters.remove(&key);
        }
        let now_lit = !setters.is_empty();

        if was_lit != now_lit {
            self.transport.set_led(led, now_lit, c, f, b)?;
        }
        Ok(())
    }

    fn service_client(&mut self, key: usize) {
        let mut fresh = Vec::new();
        let mut disconnect = false;

        {
            let Some(client) = self.clients.get_mut(&key) else {
                return;
            };
            let mut chunk = [0u8; 1024];
            loop {
                match client.stream.read(&mut chunk) {
                    Ok(0) => {
                        disconnect = true;
                        break;
                    }
                    Ok(n) => fresh.extend_from_slice(&chunk[..n]),
                    Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                    Err(e) => {
                        error!("receive from {} failed: {e}", client.addr);
                        disconnect = true;
                        break;
                    }
                }
            }
        }

        if !disconnect && !fresh.is_empty() {
            disconnect = !self.process_data(key, &fresh);
        }

        if disconnect {
            self.remove_client(key);
            return;
        }

        if let Some(client) = self.clients.get(&key) {
            if let Err(e) = self.poller.modify(&client.stream, Event::readable(key)) {
                error!("failed to re-arm client {}: {e}", client.addr);
                self.remove_client(key);
            }
        }
    }

    /// Handle newly received bytes for a client. Returns false when the
    /// client must be disconnected.
    fn process_data(&mut self, key: usize, data: &[u8]) -> bool {
        let mut buffer = match self.clients.get_mut(&key) {
            Some(client) => std::mem::take(&mut client.buffer),
            None => return false,
        };
        buffer.extend_from_slice(data);

        while let Some(newline) = buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = buffer.drain(..=newline).collect();
            let line = &line[..line.len() - 1];

            // A failing or unrecognised command drops the connection.
            if let Err(e) = self.handle_line(key, line) {
                error!("disconnecting client after bad command: {e}");
                return false;
            }
        }

        if buffer.len() > MAX_LINE_LENGTH {
            error!("disconnecting client after excessively long command");
            return false;
        }

        if let Some(client) = self.clients.get_mut(&key) {
            client.buffer = buffer;
        }
        true
    }

    fn handle_line(&mut self, key: usize, line: &[u8]) -> Result<(), ProxyError> {
        let line = std::str::from_utf8(line)
            .map_err(|_| ProxyError::MalformedCommand(String::from_utf8_lossy(line).into_owned()))?;
        debug!("handling command {line:?}");

        let (command, args) = line.split_once(',').unwrap_or((line, ""));
        match command {
            "VERSION" => self.handle_version(key, args),
            "LED" => self.handle_led(key, args),
            "TARGET" => self.handle_target(key, args),
            _ => Err(ProxyError::MalformedCommand(line.to_string())),
        }
    }

    /// `VERSION,x.y.z`: handshake; a mismatching client is disconnected.
    fn handle_version(&mut self, key: usize, args: &str) -> Result<(), ProxyError> {
        if args != PROTOCOL_VERSION {
            return Err(ProxyError::VersionMismatch {
                ours: PROTOCOL_VERSION.to_string(),
                theirs: args.to_string(),
            });
        }
        self.send(key, "OK\n")
    }

    /// `LED,c,f,b,led,state`: reference-counted LED update.
    fn handle_led(&mut self, key: usize, args: &str) -> Result<(), ProxyError> {
        let fields = parse_ints(args, 5)?;
        let state = match fields[4] {
            0 => false,
            1 => true,
            _ => return Err(ProxyError::MalformedCommand(args.to_string())),
        };

        self.set_led(key, fields[0], fields[1], fields[2], fields[3], state)?;
        self.send(key, "OK\n")
    }

    /// `TARGET,c,f,b,d`: proxied link-target probe.
    fn handle_target(&mut self, key: usize, args: &str) -> Result<(), ProxyError> {
        let fields = parse_ints(args, 4)?;
        let direction = u8::try_from(fields[3])
            .ok()
            .and_then(Direction::from_index)
            .ok_or_else(|| ProxyError::MalformedCommand(args.to_string()))?;

        let target = self
            .probe
            .link_target(
                &mut self.transport,
                fields[0],
                fields[1],
                fields[2],
                direction,
            )
            .map_err(io::Error::other)?;

        let response = match target {
            Some(socket) => format!(
                "{},{},{},{}\n",
                socket.cabinet,
                socket.frame,
                socket.board,
                socket.direction.index()
            ),
            None => "None\n".to_string(),
        };
        self.send(key, &response)
    }

    /// Send a short response; a client that cannot take it immediately is
    /// dropped rather than allowed to stall the loop.
    fn send(&mut self, key: usize, response: &str) -> Result<(), ProxyError> {
        let client = self
            .clients
            .get_mut(&key)
            .ok_or(ProxyError::ConnectionClosed)?;
        client.stream.write_all(response.as_bytes())?;
        Ok(())
    }
}

fn parse_ints(args: &str, expected: usize) -> Result<Vec<u32>, ProxyError> {
    let fields: Result<Vec<u32>, _> = args.split(',').map(|field| field.trim().parse()).collect();
    match fields {
        Ok(fields) if fields.len() == expected => Ok(fields),
        _ => Err(ProxyError::MalformedCommand(args.to_string())),
    }
}

/// A client for [`ProxyServer`].
///
/// Exposes the same `set_led` and `link_target` surface as a direct
/// transport-plus-probe pair, so it substitutes for one in the interactive
/// guide. One blocking request is outstanding at a time.
pub struct ProxyClient {
    stream: TcpStream,
    buffer: Vec<u8>,
}

impl ProxyClient {
    /// Connect to a running proxy server and verify protocol compatibility.
    pub fn connect(host: &str, port: u16) -> Result<ProxyClient, ProxyError> {
        let stream = TcpStream::connect((host, port))?;
        let mut client = ProxyClient {
            stream,
            buffer: Vec::new(),
        };
        client.check_version()?;
        Ok(client)
    }

    /// Wait for a full line from the server.
    fn recv_line(&mut self) -> Result<String, ProxyError> {
        loop {
            if let Some(newline) = self.buffer.iter().position(|&byte| byte == b'\n') {
                let line: Vec<u8> = self.buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();
                return Ok(line);
            }

            let mut chunk = [0u8; 1024];
            let received = self.stream.read(&mut chunk)?;
            if received == 0 {
                return Err(ProxyError::ConnectionClosed);
            }
            self.buffer.extend_from_slice(&chunk[..received]);
        }
    }

    fn check_version(&mut self) -> Result<(), ProxyError> {
        self.stream
            .write_all(format!("VERSION,{PROTOCOL_VERSION}\n").as_bytes())?;

        match self.recv_line() {
            Ok(line) if line == "OK" => Ok(()),
            Ok(line) => Err(ProxyError::UnexpectedResponse(line)),
            // The server hangs up on version mismatch.
            Err(ProxyError::ConnectionClosed) => Err(ProxyError::VersionMismatch {
                ours: PROTOCOL_VERSION.to_string(),
                theirs: "unknown".to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    /// Set the state of an LED on the remote machine.
    pub fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> Result<(), ProxyError> {
        self.stream.write_all(
            format!(
                "LED,{cabinet},{frame},{board},{led},{}\n",
                u8::from(state)
            )
            .as_bytes(),
        )?;

        match self.recv_line()? {
            line if line == "OK" => Ok(()),
            line => Err(ProxyError::UnexpectedResponse(line)),
        }
    }

    /// Discover the socket at the other end of a link on the remote machine.
    pub fn link_target(
        &mut self,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> Result<Option<SocketRef>, ProxyError> {
        self.stream.write_all(
            format!(
                "TARGET,{cabinet},{frame},{board},{}\n",
                direction.index()
            )
            .as_bytes(),
        )?;

        let line = self.recv_line()?;
        if line == "None" {
            return Ok(None);
        }

        let fields = parse_ints(&line, 4).map_err(|_| ProxyError::UnexpectedResponse(line))?;
        let direction = u8::try_from(fields[3])
            .ok()
            .and_then(Direction::from_index)
            .ok_or_else(|| ProxyError::UnexpectedResponse(format!("direction {}", fields[3])))?;
        Ok(Some(SocketRef::new(
            fields[0], fields[1], fields[2], direction,
        )))
    }
}

impl LedController for ProxyClient {
    fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()> {
        ProxyClient::set_led(self, led, state, cabinet, frame, board).map_err(io::Error::other)
    }
}

impl LinkProber for ProxyClient {
    fn link_target(
        &mut self,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> io::Result<Option<SocketRef>> {
        ProxyClient::link_target(self, cabinet, frame, board, direction).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::SimulatedFabric;

    fn test_server() -> ProxyServer<SimulatedFabric> {
        let mut fabric = SimulatedFabric::self_looped(1, 1, 2);
        let probe = WiringProbe::new(&mut fabric, 1, 1, 2).unwrap();
        ProxyServer::bind(fabric, probe, "127.0.0.1", 0).unwrap()
    }

    #[test]
    fn test_led_reference_counting() {
        let mut server = test_server();

        // Two clients turn the same LED on: one hardware call.
        server.set_led(1, 0, 0, 0, 7, true).unwrap();
        server.set_led(2, 0, 0, 0, 7, true).unwrap();
        assert_eq!(server.transport().led_log(), &[(7, true, 0, 0, 0)][..]);
        assert!(server.transport().led(7, 0, 0, 0));

        // One client turns it off: still lit, no hardware call.
        server.set_led(1, 0, 0, 0, 7, false).unwrap();
        assert_eq!(server.transport().led_log().len(), 1);
        assert!(server.transport().led(7, 0, 0, 0));

        // The last client leaves: the LED goes out.
        server.remove_client(2);
        assert_eq!(
            server.transport().led_log(),
            &[(7, true, 0, 0, 0), (7, false, 0, 0, 0)][..]
        );
        assert!(!server.transport().led(7, 0, 0, 0));
    }

    #[test]
    fn test_disconnect_releases_only_own_leds() {
        let mut server = test_server();

        server.set_led(1, 0, 0, 0, 7, true).unwrap();
        server.set_led(2, 0, 0, 1, 7, true).unwrap();

        server.remove_client(1);
        assert!(!server.transport().led(7, 0, 0, 0));
        assert!(server.transport().led(7, 0, 0, 1));
    }

    #[test]
    fn test_parse_ints() {
        assert_eq!(parse_ints("0,1,2,3", 4).unwrap(), vec![0, 1, 2, 3]);
        assert!(parse_ints("0,1,2", 4).is_err());
        assert!(parse_ints("0,1,2,x", 4).is_err());
        assert!(parse_ints("0,1,2,-1", 4).is_err());
    }
}
