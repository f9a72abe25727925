//! A logger for cable installation times.
//!
//! Chronicles the installation process as a CSV of events for later
//! analysis. The first column gives the event type and is always populated;
//! the remaining columns are filled per event type and written as `NA`
//! otherwise. Timestamps are seconds since `logging_started`, compensated
//! so time spent paused does not appear as a gap.

use std::io::{self, Write};
use std::time::Instant;

use chrono::Local;

use crate::cabinet::SocketRef;

/// Every column of the log, in order.
const COLUMNS: [&str; 23] = [
    "event_type",
    "realtime",
    "time",
    "sc",
    "sf",
    "sb",
    "sd",
    "dc",
    "df",
    "db",
    "dd",
    "duration",
    "attempt_duration",
    "num_attempts",
    "c",
    "f",
    "b",
    "temp_top",
    "temp_btm",
    "temp_ext_0",
    "temp_ext_1",
    "fan_0",
    "fan_1",
];

/// Time source for the logger; swapped out in tests.
pub trait Clock {
    /// Seconds elapsed on a monotonic clock.
    fn monotonic(&self) -> f64;

    /// The current wall-clock time as an ISO-8601 string.
    fn realtime(&self) -> String;
}

/// The process clock.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> SystemClock {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn realtime(&self) -> String {
        Local::now().to_rfc3339()
    }
}

/// One board temperature/fan report.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcReadings {
    pub temp_top: f64,
    pub temp_btm: f64,
    pub temp_ext_0: f64,
    pub temp_ext_1: f64,
    pub fan_0: u32,
    pub fan_1: u32,
}

struct CurrentConnection {
    src: SocketRef,
    dst: SocketRef,
    start_time: f64,
    last_error_time: f64,
    errors: u32,
}

/// The installation event log.
pub struct TimingLogger {
    sink: Box<dyn Write>,
    clock: Box<dyn Clock>,
    start_time: Option<f64>,
    pause_start_time: Option<f64>,
    current: Option<CurrentConnection>,
}

impl TimingLogger {
    /// Start logging into `sink`. Suppress the header when appending to an
    /// existing file.
    pub fn new(sink: impl Write + 'static, add_header: bool) -> io::Result<TimingLogger> {
        TimingLogger::with_clock(sink, SystemClock::new(), add_header)
    }

    pub fn with_clock(
        sink: impl Write + 'static,
        clock: impl Clock + 'static,
        add_header: bool,
    ) -> io::Result<TimingLogger> {
        let mut logger = TimingLogger {
            sink: Box::new(sink),
            clock: Box::new(clock),
            start_time: None,
            pause_start_time: None,
            current: None,
        };
        if add_header {
            writeln!(logger.sink, "{}", COLUMNS.join(","))?;
        }
        Ok(logger)
    }

    pub fn paused(&self) -> bool {
        self.pause_start_time.is_some()
    }

    /// Seconds of compensated logging time elapsed so far.
    fn now(&self) -> f64 {
        match self.start_time {
            Some(start) => self.clock.monotonic() - start,
            None => 0.0,
        }
    }

    fn write_row(&mut self, fields: &[(&str, String)]) -> io::Result<()> {
        debug_assert!(fields.iter().all(|(name, _)| COLUMNS.contains(name)));

        let row: Vec<&str> = COLUMNS
            .iter()
            .map(|&column| {
                fields
                    .iter()
                    .find(|&&(name, _)| name == column)
                    .map(|(_, value)| value.as_str())
                    .unwrap_or("NA")
            })
            .collect();
        writeln!(self.sink, "{}", row.join(","))
    }

    fn connection_fields(connection: &CurrentConnection) -> Vec<(&'static str, String)> {
        vec![
            ("sc", connection.src.cabinet.to_string()),
            ("sf", connection.src.frame.to_string()),
            ("sb", connection.src.board.to_string()),
            ("sd", connection.src.direction.to_string()),
            ("dc", connection.dst.cabinet.to_string()),
            ("df", connection.dst.frame.to_string()),
            ("db", connection.dst.board.to_string()),
            ("dd", connection.dst.direction.to_string()),
        ]
    }

    pub fn logging_started(&mut self) -> io::Result<()> {
        self.start_time = Some(self.clock.monotonic());
        let realtime = self.clock.realtime();
        self.write_row(&[
            ("event_type", "logging_started".to_string()),
            ("time", "0".to_string()),
            ("realtime", realtime),
        ])
    }

    pub fn logging_stopped(&mut self) -> io::Result<()> {
        let time = self.now();
        self.write_row(&[
            ("event_type", "logging_stopped".to_string()),
            ("time", time.to_string()),
        ])?;
        self.start_time = None;
        Ok(())
    }

    /// A new cable has been presented for installation.
    pub fn connection_started(&mut self, src: SocketRef, dst: SocketRef) -> io::Result<()> {
        let now = self.now();
        let connection = CurrentConnection {
            src,
            dst,
            start_time: now,
            last_error_time: now,
            errors: 0,
        };

        let mut fields = vec![
            ("event_type", "connection_started".to_string()),
            ("time", now.to_string()),
            ("realtime", self.clock.realtime()),
        ];
        fields.extend(Self::connection_fields(&connection));

        self.current = Some(connection);
        self.write_row(&fields)
    }

    /// The current cable was installed incorrectly.
    pub fn connection_error(&mut self) -> io::Result<()> {
        let Some(mut connection) = self.current.take() else {
            return Ok(());
        };
        let now = self.now();

        let attempt_duration = now - connection.last_error_time;
        connection.last_error_time = now;
        connection.errors += 1;

        let mut fields = vec![
            ("event_type", "connection_error".to_string()),
            ("time", now.to_string()),
            ("realtime", self.clock.realtime()),
            ("attempt_duration", attempt_duration.to_string()),
            ("num_attempts", connection.errors.to_string()),
        ];
        fields.extend(Self::connection_fields(&connection));

        self.current = Some(connection);
        self.write_row(&fields)
    }

    /// The current cable was installed correctly.
    pub fn connection_complete(&mut self) -> io::Result<()> {
        let Some(connection) = self.current.take() else {
            return Ok(());
        };
        let now = self.now();

        let duration = now - connection.start_time;
        let attempt_duration = now - connection.last_error_time;

        let mut fields = vec![
            ("event_type", "connection_complete".to_string()),
            ("time", now.to_string()),
            ("realtime", self.clock.realtime()),
            ("duration", duration.to_string()),
            ("attempt_duration", attempt_duration.to_string()),
            ("num_attempts", (connection.errors + 1).to_string()),
        ];
        fields.extend(Self::connection_fields(&connection));

        self.write_row(&fields)
    }

    /// Stop all timers until [`unpause`](Self::unpause).
    pub fn pause(&mut self) {
        if self.pause_start_time.is_none() {
            self.pause_start_time = Some(self.now());
        }
    }

    /// Resume timers, compensating every later timestamp for the time spent
    /// paused.
    pub fn unpause(&mut self) -> io::Result<()> {
        let Some(pause_start) = self.pause_start_time.take() else {
            return Ok(());
        };

        let now = self.now();
        let pause_duration = now - pause_start;
        if let Some(start) = self.start_time.as_mut() {
            *start += pause_duration;
        }

        self.write_row(&[
            ("event_type", "pause".to_string()),
            ("time", (now - pause_duration).to_string()),
            ("duration", pause_duration.to_string()),
        ])
    }

    /// A board temperature report.
    pub fn temperature(
        &mut self,
        cabinet: u32,
        frame: u32,
        board: u32,
        readings: AdcReadings,
    ) -> io::Result<()> {
        let time = self.now();
        self.write_row(&[
            ("event_type", "temperature".to_string()),
            ("time", time.to_string()),
            ("realtime", self.clock.realtime()),
            ("c", cabinet.to_string()),
            ("f", frame.to_string()),
            ("b", board.to_string()),
            ("temp_top", readings.temp_top.to_string()),
            ("temp_btm", readings.temp_btm.to_string()),
            ("temp_ext_0", readings.temp_ext_0.to_string()),
            ("temp_ext_1", readings.temp_ext_1.to_string()),
            ("fan_0", readings.fan_0.to_string()),
            ("fan_1", readings.fan_1.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::Direction;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Clone)]
    struct FakeClock(Rc<Cell<f64>>);

    impl FakeClock {
        fn new() -> FakeClock {
            FakeClock(Rc::new(Cell::new(0.0)))
        }

        fn advance(&self, seconds: f64) {
            self.0.set(self.0.get() + seconds);
        }
    }

    impl Clock for FakeClock {
        fn monotonic(&self) -> f64 {
            self.0.get()
        }

        fn realtime(&self) -> String {
            "2000-01-01T00:00:00".to_string()
        }
    }

    #[derive(Clone, Default)]
    struct SharedBuf(Rc<RefCell<Vec<u8>>>);

    impl SharedBuf {
        fn lines(&self) -> Vec<String> {
            String::from_utf8(self.0.borrow().clone())
                .unwrap()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn field<'a>(line: &'a str, column: &str) -> &'a str {
        let index = COLUMNS.iter().position(|&c| c == column).unwrap();
        line.split(',').nth(index).unwrap()
    }

    #[test]
    fn test_header_and_na_padding() {
        let buf = SharedBuf::default();
        let mut logger = TimingLogger::with_clock(buf.clone(), FakeClock::new(), true).unwrap();
        logger.logging_started().unwrap();

        let lines = buf.lines();
        assert_eq!(lines[0], COLUMNS.join(","));
        assert_eq!(lines[1].split(',').count(), COLUMNS.len());
        assert_eq!(field(&lines[1], "event_type"), "logging_started");
        assert_eq!(field(&lines[1], "time"), "0");
        assert_eq!(field(&lines[1], "sc"), "NA");
    }

    #[test]
    fn test_no_header_when_appending() {
        let buf = SharedBuf::default();
        let mut logger = TimingLogger::with_clock(buf.clone(), FakeClock::new(), false).unwrap();
        logger.logging_started().unwrap();
        assert_eq!(field(&buf.lines()[0], "event_type"), "logging_started");
    }

    #[test]
    fn test_connection_lifecycle_and_pause_compensation() {
        let buf = SharedBuf::default();
        let clock = FakeClock::new();
        let mut logger = TimingLogger::with_clock(buf.clone(), clock.clone(), true).unwrap();

        let src = SocketRef::new(0, 0, 0, Direction::North);
        let dst = SocketRef::new(0, 0, 1, Direction::South);

        clock.advance(10.0);
        logger.logging_started().unwrap();

        clock.advance(2.0);
        logger.connection_started(src, dst).unwrap();

        // Pause for two seconds; they must not count.
        clock.advance(1.0);
        logger.pause();
        assert!(logger.paused());
        clock.advance(2.0);
        logger.unpause().unwrap();
        assert!(!logger.paused());

        clock.advance(1.0);
        logger.connection_error().unwrap();
        clock.advance(1.0);
        logger.connection_complete().unwrap();

        let lines = buf.lines();
        let started = &lines[2];
        assert_eq!(field(started, "event_type"), "connection_started");
        assert_eq!(field(started, "time"), "2");
        assert_eq!(field(started, "sd"), "north");
        assert_eq!(field(started, "dd"), "south");

        let pause = &lines[3];
        assert_eq!(field(pause, "event_type"), "pause");
        assert_eq!(field(pause, "time"), "3");
        assert_eq!(field(pause, "duration"), "2");

        let error = &lines[4];
        assert_eq!(field(error, "event_type"), "connection_error");
        assert_eq!(field(error, "time"), "4");
        assert_eq!(field(error, "num_attempts"), "1");

        let complete = &lines[5];
        assert_eq!(field(complete, "event_type"), "connection_complete");
        assert_eq!(field(complete, "time"), "5");
        assert_eq!(field(complete, "duration"), "3");
        assert_eq!(field(complete, "attempt_duration"), "1");
        assert_eq!(field(complete, "num_attempts"), "2");
    }

    #[test]
    fn test_events_without_connection_are_ignored() {
        let buf = SharedBuf::default();
        let mut logger = TimingLogger::with_clock(buf.clone(), FakeClock::new(), true).unwrap();
        logger.logging_started().unwrap();
        logger.connection_error().unwrap();
        logger.connection_complete().unwrap();
        // Header plus logging_started only.
        assert_eq!(buf.lines().len(), 2);
    }
}
