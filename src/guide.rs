//! The interactive wiring-guide controller.
//!
//! Walks a predefined installation plan one instruction at a time:
//! illuminates the endpoint LEDs of the current wire, announces the step,
//! polls the live wiring to auto-advance when the installer gets it right,
//! and feeds the timing logger. Rendering, windowing and speech synthesis
//! are external: drawing surfaces consume the cursor state and the
//! [`Announcer`] trait receives the spoken instructions.

use std::cmp::Reverse;
use std::io;
use std::time::Duration;

use log::debug;

use crate::cabinet::SocketRef;
use crate::plan::PlanEntry;
use crate::probe::{LedController, LinkProber};
use crate::timing_logger::TimingLogger;

/// Suggested interval between wiring-probe polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// The diagnostic LED used to point at boards.
pub const DEFAULT_BMP_LED: u32 = 7;

/// How far the skip operations jump.
const SKIP_DISTANCE: usize = 25;

/// Full machine access as the guide needs it: LEDs plus link probing.
pub trait MachineAccess: LedController + LinkProber {}

impl<T: LedController + LinkProber> MachineAccess for T {}

/// Receives spoken instructions (the text-to-speech surface).
pub trait Announcer {
    fn announce(&mut self, message: &str);
}

/// Discards all announcements.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAnnouncer;

impl Announcer for NullAnnouncer {
    fn announce(&mut self, _message: &str) {}
}

/// The result of one auto-advance poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Nothing observable changed.
    NoChange,
    /// The current instruction was carried out; the cursor moved on.
    Advanced,
    /// The final instruction was carried out; the plan is complete.
    Complete,
    /// A cable reached the wrong socket.
    ConnectedIncorrectly,
    /// Auto-advance is off or no machine is attached.
    NotPolled,
}

/// Stateful driver of an installation plan.
pub struct WiringGuide<M: MachineAccess, A: Announcer = NullAnnouncer> {
    machine: Option<M>,
    announcer: A,
    wires: Vec<PlanEntry>,
    cur_wire: usize,
    bmp_led: u32,
    auto_advance: bool,
    /// Set after warning that the current wire is in the wrong socket;
    /// rearmed once the wire is removed again.
    connected_incorrectly: bool,
    timing_logger: Option<TimingLogger>,
}

impl<M: MachineAccess, A: Announcer> WiringGuide<M, A> {
    /// Build a guide over a non-empty installation plan.
    pub fn new(wires: Vec<PlanEntry>, machine: Option<M>, announcer: A) -> WiringGuide<M, A> {
        assert!(!wires.is_empty(), "installation plan is empty");
        WiringGuide {
            machine,
            announcer,
            wires,
            cur_wire: 0,
            bmp_led: DEFAULT_BMP_LED,
            auto_advance: true,
            connected_incorrectly: false,
            timing_logger: None,
        }
    }

    pub fn with_timing_logger(mut self, logger: TimingLogger) -> Self {
        self.timing_logger = Some(logger);
        self
    }

    pub fn with_bmp_led(mut self, led: u32) -> Self {
        self.bmp_led = led;
        self
    }

    pub fn with_auto_advance(mut self, enabled: bool) -> Self {
        self.auto_advance = enabled;
        self
    }

    /// Begin guiding: start the timing log and move to the given wire.
    pub fn start(&mut self, starting_wire: usize) -> io::Result<()> {
        assert!(starting_wire < self.wires.len(), "starting wire out of range");
        if let Some(logger) = self.timing_logger.as_mut() {
            logger.logging_started()?;
        }
        self.go_to_wire(starting_wire)
    }

    /// Stop guiding: close the timing log and darken the current wire.
    pub fn finish(&mut self) -> io::Result<()> {
        if let Some(logger) = self.timing_logger.as_mut() {
            logger.logging_stopped()?;
        }
        self.set_leds(self.cur_wire, false)
    }

    pub fn current(&self) -> &PlanEntry {
        &self.wires[self.cur_wire]
    }

    /// Cursor position and plan length.
    pub fn position(&self) -> (usize, usize) {
        (self.cur_wire, self.wires.len())
    }

    pub fn auto_advance(&self) -> bool {
        self.auto_advance
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.auto_advance = enabled;
    }

    pub fn timing_logger_mut(&mut self) -> Option<&mut TimingLogger> {
        self.timing_logger.as_mut()
    }

    /// Move the cursor, handing the LEDs over and logging the new
    /// connection's start.
    pub fn go_to_wire(&mut self, wire: usize) -> io::Result<()> {
        let last_wire = self.cur_wire;
        self.cur_wire = wire;
        self.connected_incorrectly = false;

        self.set_leds(last_wire, false)?;
        self.set_leds(wire, true)?;

        let entry = self.wires[wire];
        if let Some(logger) = self.timing_logger.as_mut() {
            logger.unpause()?;
            if entry.length.is_some() {
                logger.connection_started(entry.src, entry.dst)?;
            }
        }

        self.announce_step(last_wire, wire);
        Ok(())
    }

    pub fn next_wire(&mut self) -> io::Result<()> {
        self.go_to_wire((self.cur_wire + 1) % self.wires.len())
    }

    pub fn previous_wire(&mut self) -> io::Result<()> {
        self.go_to_wire((self.cur_wire + self.wires.len() - 1) % self.wires.len())
    }

    pub fn skip_forward(&mut self) -> io::Result<()> {
        self.go_to_wire((self.cur_wire + SKIP_DISTANCE) % self.wires.len())
    }

    pub fn skip_backward(&mut self) -> io::Result<()> {
        let len = self.wires.len();
        self.go_to_wire((self.cur_wire + len - SKIP_DISTANCE % len) % len)
    }

    pub fn first_wire(&mut self) -> io::Result<()> {
        self.go_to_wire(0)
    }

    pub fn last_wire(&mut self) -> io::Result<()> {
        self.go_to_wire(self.wires.len() - 1)
    }

    /// Check the live wiring of the current instruction and advance when it
    /// has been carried out. Call periodically (see
    /// [`DEFAULT_POLL_INTERVAL`]).
    ///
    /// Insertions advance once both endpoints report each other; removals
    /// advance once both endpoints report no link. An insertion reaching a
    /// wrong socket is announced once and rearmed when the cable is pulled
    /// out again.
    pub fn poll(&mut self) -> io::Result<PollOutcome> {
        if !self.auto_advance {
            return Ok(PollOutcome::NotPolled);
        }
        let entry = self.wires[self.cur_wire];
        let Some(machine) = self.machine.as_mut() else {
            return Ok(PollOutcome::NotPolled);
        };

        // Check both ends of the cable.
        let seen_from_src = machine.link_target(
            entry.src.cabinet,
            entry.src.frame,
            entry.src.board,
            entry.src.direction,
        )?;
        let seen_from_dst = machine.link_target(
            entry.dst.cabinet,
            entry.dst.frame,
            entry.dst.board,
            entry.dst.direction,
        )?;

        if entry.length.is_none() {
            // Waiting for the wire to be disconnected.
            if seen_from_src.is_none() && seen_from_dst.is_none() {
                return self.advance();
            }
            return Ok(PollOutcome::NoChange);
        }

        // Waiting for the wire to be connected.
        if seen_from_src == Some(entry.dst) && seen_from_dst == Some(entry.src) {
            if let Some(logger) = self.timing_logger.as_mut() {
                logger.unpause()?;
                logger.connection_complete()?;
            }
            return self.advance();
        }

        if seen_from_src.is_some() || seen_from_dst.is_some() {
            if !self.connected_incorrectly {
                self.connected_incorrectly = true;
                self.announcer.announce("Wire inserted incorrectly.");
                if let Some(logger) = self.timing_logger.as_mut() {
                    logger.unpause()?;
                    logger.connection_error()?;
                }
            }
            return Ok(PollOutcome::ConnectedIncorrectly);
        }

        // No wire is connected; rearm the warning.
        self.connected_incorrectly = false;
        Ok(PollOutcome::NoChange)
    }

    fn advance(&mut self) -> io::Result<PollOutcome> {
        if self.cur_wire + 1 == self.wires.len() {
            return Ok(PollOutcome::Complete);
        }
        debug!("wire {} done, advancing", self.cur_wire);
        self.go_to_wire(self.cur_wire + 1)?;
        Ok(PollOutcome::Advanced)
    }

    fn set_leds(&mut self, wire: usize, state: bool) -> io::Result<()> {
        let Some(machine) = self.machine.as_mut() else {
            return Ok(());
        };
        let entry = self.wires[wire];
        for socket in [entry.src, entry.dst] {
            machine.set_led(self.bmp_led, state, socket.cabinet, socket.frame, socket.board)?;
        }
        Ok(())
    }

    /// Announce the new step relative to the previous one: the cable length
    /// if it changed, then the pair of sockets being connected.
    fn announce_step(&mut self, last_wire: usize, this_wire: usize) {
        let mut message = String::new();

        // Cable-length changes are announced relative to the previous wire.
        let last_length = self.wires[last_wire].length;
        let this_length = self.wires[this_wire].length;
        if last_length != this_length {
            match this_length {
                None => message.push_str("Disconnect cable. "),
                Some(length) => {
                    message.push_str(&format!("{} meter cable. ", format_length(length)));
                }
            }
        }

        let entry = self.wires[this_wire];
        let top_left = top_left_socket(&entry);
        let bottom_right = if top_left == entry.src {
            entry.dst
        } else {
            entry.src
        };

        message.push_str(&top_left.direction.to_string().replace('-', " "));
        message.push_str(" going ");
        message.push_str(&bottom_right.direction.to_string().replace('-', " "));
        message.push('.');

        self.announcer.announce(&message);
    }
}

/// The endpoint an installer reads first: right-most cabinet, top frame,
/// right-most board (cabinets and boards number from the right).
fn top_left_socket(entry: &PlanEntry) -> SocketRef {
    std::cmp::min_by_key(entry.src, entry.dst, |s| {
        (Reverse(s.cabinet), s.frame, Reverse(s.board))
    })
}

fn format_length(length: f64) -> String {
    let text = format!("{length:.2}");
    let text = text.trim_end_matches('0').trim_end_matches('.');
    text.to_string()
}
