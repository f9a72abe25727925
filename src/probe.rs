//! Discovery of the live wiring of a machine.
//!
//! Board-to-board links carry a small debug value in their idle packets.
//! Writing a unique sentinel to every socket's idle-sentinel-output (IDSO)
//! register and reading back the idle-sentinel-input (IDSI) seen at another
//! socket reveals which sockets are joined by a cable. The machine must not
//! be booted while probing so the links stay idle.
//!
//! The probe only ever talks to the board management processors through the
//! [`BmpTransport`] trait; the concrete transport library is external.

use std::collections::{HashMap, HashSet};
use std::io;

use log::debug;
use thiserror::Error;

use crate::cabinet::SocketRef;
use crate::topology::Direction;

/// Number of bits in a link ID.
pub const NUM_ID_BITS: u32 = 16;

/// Register bank offsets of the idle-sentinel and handshake registers.
/// Register addresses are composed as `(reg << 2) | bank_base`.
pub const IDSO_REG: u32 = 19;
pub const IDSI_REG: u32 = 20;
/// Bit 0 set means the link handshake is alive.
pub const HAND_REG: u32 = 21;

/// Global idle-packet scrambling enable; must be zeroed so sentinels appear
/// unscrambled.
pub const SCRM_REG: u32 = 0x0004_0010;

/// Link controllers per board.
pub const FPGAS_PER_BOARD: u8 = 3;

const BANK_MASK: u32 = 0xFFFF_0000;

/// The FPGA and register-bank base responsible for a link direction.
pub const fn fpga_for_direction(direction: Direction) -> (u8, u32) {
    match direction {
        Direction::South => (0, 0x0001_0000),
        Direction::East => (0, 0x0000_0000),
        Direction::West => (1, 0x0001_0000),
        Direction::SouthWest => (1, 0x0000_0000),
        Direction::NorthEast => (2, 0x0001_0000),
        Direction::North => (2, 0x0000_0000),
    }
}

/// The link direction served by an FPGA register bank, if any.
pub const fn direction_for_fpga(fpga: u8, bank_base: u32) -> Option<Direction> {
    match (fpga, bank_base) {
        (0, 0x0001_0000) => Some(Direction::South),
        (0, 0x0000_0000) => Some(Direction::East),
        (1, 0x0001_0000) => Some(Direction::West),
        (1, 0x0000_0000) => Some(Direction::SouthWest),
        (2, 0x0001_0000) => Some(Direction::NorthEast),
        (2, 0x0000_0000) => Some(Direction::North),
        _ => None,
    }
}

/// The board management connection, as consumed by the probe.
///
/// Register values are 32-bit little-endian unsigned; addresses are 32-bit.
pub trait BmpTransport {
    fn write_fpga_reg(
        &mut self,
        fpga: u8,
        addr: u32,
        value: u32,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()>;

    fn read_fpga_reg(
        &mut self,
        fpga: u8,
        addr: u32,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<u32>;

    fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()>;
}

/// A failure while probing the machine.
#[derive(Debug, Error)]
pub enum ProbeError {
    /// A sentinel did not read back as written; the FPGA is powered down.
    #[error(
        "FPGA not powered on (cabinet {cabinet} frame {frame} board {board} link {direction})"
    )]
    FpgaPoweredDown {
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    },

    #[error(transparent)]
    Transport(#[from] io::Error),
}

/// LED control as required by the interactive guide; implemented by any
/// [`BmpTransport`]-holding access path and by the proxy client.
pub trait LedController {
    fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()>;
}

/// Link-target queries as required by the interactive guide; implemented by
/// the probe-plus-transport pair and by the proxy client.
pub trait LinkProber {
    fn link_target(
        &mut self,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> io::Result<Option<SocketRef>>;
}

/// The probe's socket-ID bijection and system dimensions.
///
/// Holds no connection of its own: every operation borrows a transport, so
/// a single hardware connection can serve the probe and LED control at once.
pub struct WiringProbe {
    num_cabinets: u32,
    frames_per_cabinet: u32,
    boards_per_frame: u32,
    id_to_link: HashMap<u16, SocketRef>,
    link_to_id: HashMap<SocketRef, u16>,
}

impl WiringProbe {
    /// Assign a fresh ID to every socket in a system of the given
    /// dimensions and load the IDs onto the machine.
    ///
    /// Fails with [`ProbeError::FpgaPoweredDown`] if any sentinel does not
    /// read back as written.
    pub fn new<T: BmpTransport>(
        transport: &mut T,
        num_cabinets: u32,
        frames_per_cabinet: u32,
        boards_per_frame: u32,
    ) -> Result<WiringProbe, ProbeError> {
        let mut probe = WiringProbe {
            num_cabinets,
            frames_per_cabinet,
            boards_per_frame,
            id_to_link: HashMap::new(),
            link_to_id: HashMap::new(),
        };
        probe.assign_link_ids(transport)?;
        Ok(probe)
    }

    /// Every socket the probe knows about, in linear-index order.
    pub fn sockets(&self) -> impl Iterator<Item = SocketRef> + '_ {
        (0..self.num_cabinets).flat_map(move |c| {
            (0..self.frames_per_cabinet).flat_map(move |f| {
                (0..self.boards_per_frame).flat_map(move |b| {
                    Direction::ALL
                        .into_iter()
                        .map(move |d| SocketRef::new(c, f, b, d))
                })
            })
        })
    }

    fn assign_link_ids<T: BmpTransport>(&mut self, transport: &mut T) -> Result<(), ProbeError> {
        // Sequentially allocated IDs could collide with values left over
        // from a previous run, so a fresh random mask is folded into every
        // ID.
        let mask: u16 = rand::random();

        let sockets: Vec<SocketRef> = self.sockets().collect();
        for (link_index, socket) in sockets.iter().enumerate() {
            let id = (link_index as u16) ^ mask;

            self.id_to_link.insert(id, *socket);
            self.link_to_id.insert(*socket, id);

            self.write_register(transport, *socket, IDSO_REG, u32::from(id))?;

            // Reading the sentinel back doubles as a power-on check.
            if self.read_register(transport, *socket, IDSO_REG)? != u32::from(id) {
                return Err(ProbeError::FpgaPoweredDown {
                    cabinet: socket.cabinet,
                    frame: socket.frame,
                    board: socket.board,
                    direction: socket.direction,
                });
            }
        }

        // Turn off idle-packet scrambling so the sentinels actually appear
        // at the far end.
        for c in 0..self.num_cabinets {
            for f in 0..self.frames_per_cabinet {
                for b in 0..self.boards_per_frame {
                    for fpga in 0..FPGAS_PER_BOARD {
                        transport.write_fpga_reg(fpga, SCRM_REG, 0, c, f, b)?;
                    }
                }
            }
        }

        debug!(
            "assigned {} link IDs (mask {mask:#06x})",
            self.link_to_id.len()
        );
        Ok(())
    }

    fn write_register<T: BmpTransport>(
        &self,
        transport: &mut T,
        socket: SocketRef,
        reg_num: u32,
        value: u32,
    ) -> Result<(), ProbeError> {
        let (fpga, bank_base) = fpga_for_direction(socket.direction);
        let addr = (reg_num << 2) | bank_base;
        transport.write_fpga_reg(
            fpga,
            addr,
            value,
            socket.cabinet,
            socket.frame,
            socket.board,
        )?;
        Ok(())
    }

    fn read_register<T: BmpTransport>(
        &self,
        transport: &mut T,
        socket: SocketRef,
        reg_num: u32,
    ) -> Result<u32, ProbeError> {
        let (fpga, bank_base) = fpga_for_direction(socket.direction);
        let addr = (reg_num << 2) | bank_base;
        Ok(transport.read_fpga_reg(fpga, addr, socket.cabinet, socket.frame, socket.board)?)
    }

    /// Determine which socket is at the other end of the given link.
    ///
    /// `None` means the link is down or whatever is connected carries no
    /// known ID.
    pub fn link_target<T: BmpTransport>(
        &self,
        transport: &mut T,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> Result<Option<SocketRef>, ProbeError> {
        let socket = SocketRef::new(cabinet, frame, board, direction);

        let handshake = self.read_register(transport, socket, HAND_REG)?;
        if handshake & 1 == 0 {
            return Ok(None);
        }

        let id = self.read_register(transport, socket, IDSI_REG)?;
        let target = u16::try_from(id)
            .ok()
            .and_then(|id| self.id_to_link.get(&id).copied());
        Ok(target)
    }

    /// Find every wire which is reported as working in both directions.
    ///
    /// Sources are canonically on the north, east or south-west side where
    /// the wiring allows it.
    pub fn discover_wires<T: BmpTransport>(
        &self,
        transport: &mut T,
    ) -> Result<Vec<(SocketRef, SocketRef)>, ProbeError> {
        let mut from_wires: HashSet<(SocketRef, SocketRef)> = HashSet::new();
        let mut to_wires: HashSet<(SocketRef, SocketRef)> = HashSet::new();

        for source in self.sockets().collect::<Vec<_>>() {
            let Some(target) = self.link_target(
                transport,
                source.cabinet,
                source.frame,
                source.board,
                source.direction,
            )?
            else {
                continue;
            };

            // Canonicalise so sources face north, east or south-west. A
            // polarised connector cannot join two destination sides, but a
            // miswired machine is exactly what this tool looks for, so no
            // order is guaranteed in that case.
            if matches!(
                source.direction,
                Direction::South | Direction::West | Direction::NorthEast
            ) {
                to_wires.insert((target, source));
            } else {
                from_wires.insert((source, target));
            }
        }

        // Only wires seen travelling in both directions count.
        let mut wires: Vec<(SocketRef, SocketRef)> =
            from_wires.intersection(&to_wires).copied().collect();
        wires.sort_unstable();
        Ok(wires)
    }
}

/// A transport paired with its probe, giving direct (non-proxied) machine
/// access to the interactive guide.
pub struct DirectMachine<T: BmpTransport> {
    transport: T,
    probe: WiringProbe,
}

impl<T: BmpTransport> DirectMachine<T> {
    pub fn new(
        mut transport: T,
        num_cabinets: u32,
        frames_per_cabinet: u32,
        boards_per_frame: u32,
    ) -> Result<Self, ProbeError> {
        let probe = WiringProbe::new(
            &mut transport,
            num_cabinets,
            frames_per_cabinet,
            boards_per_frame,
        )?;
        Ok(DirectMachine { transport, probe })
    }

    pub fn probe(&self) -> &WiringProbe {
        &self.probe
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn discover_wires(&mut self) -> Result<Vec<(SocketRef, SocketRef)>, ProbeError> {
        self.probe.discover_wires(&mut self.transport)
    }
}

impl<T: BmpTransport> LedController for DirectMachine<T> {
    fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()> {
        self.transport.set_led(led, state, cabinet, frame, board)
    }
}

impl<T: BmpTransport> LinkProber for DirectMachine<T> {
    fn link_target(
        &mut self,
        cabinet: u32,
        frame: u32,
        board: u32,
        direction: Direction,
    ) -> io::Result<Option<SocketRef>> {
        self.probe
            .link_target(&mut self.transport, cabinet, frame, board, direction)
            .map_err(io::Error::other)
    }
}

/// An in-memory machine fabric implementing [`BmpTransport`].
///
/// Models the IDSO/IDSI/HAND registers of every socket over a configurable
/// wiring map, and records LED activity. Used by the test-suite and by
/// `proxy-server --simulate`.
#[derive(Debug, Default, Clone)]
pub struct SimulatedFabric {
    wiring: HashMap<SocketRef, SocketRef>,
    idso: HashMap<SocketRef, u32>,
    dead: HashSet<SocketRef>,
    powered_down: bool,
    leds: HashMap<(u32, u32, u32, u32), bool>,
    led_log: Vec<(u32, bool, u32, u32, u32)>,
}

impl SimulatedFabric {
    /// A fabric with no cables installed.
    pub fn unwired() -> SimulatedFabric {
        SimulatedFabric::default()
    }

    /// A fabric where every board's sockets are looped back to the opposite
    /// socket of the same board.
    pub fn self_looped(num_cabinets: u32, frames_per_cabinet: u32, boards_per_frame: u32) -> Self {
        let mut fabric = SimulatedFabric::default();
        for c in 0..num_cabinets {
            for f in 0..frames_per_cabinet {
                for b in 0..boards_per_frame {
                    for d in [Direction::North, Direction::East, Direction::SouthWest] {
                        fabric.connect(
                            SocketRef::new(c, f, b, d),
                            SocketRef::new(c, f, b, d.opposite()),
                        );
                    }
                }
            }
        }
        fabric
    }

    /// Install a cable between two sockets.
    pub fn connect(&mut self, a: SocketRef, b: SocketRef) {
        self.wiring.insert(a, b);
        self.wiring.insert(b, a);
    }

    /// Remove the cable attached to a socket, if any.
    pub fn disconnect(&mut self, socket: SocketRef) {
        if let Some(other) = self.wiring.remove(&socket) {
            self.wiring.remove(&other);
        }
    }

    /// Make an endpoint report a dead handshake.
    pub fn kill_endpoint(&mut self, socket: SocketRef) {
        self.dead.insert(socket);
    }

    /// Make every register read as an unpowered FPGA does.
    pub fn power_down(&mut self) {
        self.powered_down = true;
    }

    pub fn led(&self, led: u32, cabinet: u32, frame: u32, board: u32) -> bool {
        self.leds
            .get(&(cabinet, frame, board, led))
            .copied()
            .unwrap_or(false)
    }

    /// Every `set_led` call seen, in order: `(led, state, c, f, b)`.
    pub fn led_log(&self) -> &[(u32, bool, u32, u32, u32)] {
        &self.led_log
    }

    fn socket_for(addr: u32, fpga: u8, cabinet: u32, frame: u32, board: u32) -> Option<SocketRef> {
        let direction = direction_for_fpga(fpga, addr & BANK_MASK)?;
        Some(SocketRef::new(cabinet, frame, board, direction))
    }
}

impl BmpTransport for SimulatedFabric {
    fn write_fpga_reg(
        &mut self,
        fpga: u8,
        addr: u32,
        value: u32,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()> {
        if addr == SCRM_REG {
            return Ok(());
        }
        if let Some(socket) = Self::socket_for(addr, fpga, cabinet, frame, board) {
            if (addr & !BANK_MASK) >> 2 == IDSO_REG {
                self.idso.insert(socket, value);
            }
        }
        Ok(())
    }

    fn read_fpga_reg(
        &mut self,
        fpga: u8,
        addr: u32,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<u32> {
        if self.powered_down {
            return Ok(0xFFFF_FFFF);
        }

        let Some(socket) = Self::socket_for(addr, fpga, cabinet, frame, board) else {
            return Ok(0xFFFF_FFFF);
        };

        match (addr & !BANK_MASK) >> 2 {
            IDSO_REG => Ok(self.idso.get(&socket).copied().unwrap_or(0xFFFF_FFFF)),
            IDSI_REG => {
                let sentinel = self
                    .wiring
                    .get(&socket)
                    .and_then(|remote| self.idso.get(remote));
                Ok(sentinel.copied().unwrap_or(0xFFFF_FFFF))
            }
            HAND_REG => {
                let alive = self.wiring.contains_key(&socket) && !self.dead.contains(&socket);
                Ok(u32::from(alive))
            }
            _ => Ok(0xFFFF_FFFF),
        }
    }

    fn set_led(
        &mut self,
        led: u32,
        state: bool,
        cabinet: u32,
        frame: u32,
        board: u32,
    ) -> io::Result<()> {
        self.led_log.push((led, state, cabinet, frame, board));
        self.leds.insert((cabinet, frame, board, led), state);
        Ok(())
    }
}
