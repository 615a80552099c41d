//! In-memory channel for exercising the driver without hardware.
//!
//! [`MockChannel`] implements [`Channel`] in one of two ways:
//!
//! - **Scripted**: pre-loaded request/reply pairs, consumed in order. Each
//!   `send` must match the next expected request; its echo and reply lines
//!   are then returned by subsequent `read_line` calls.
//! - **Simulated**: a unit whose six zones answer queries and apply control
//!   commands the way the amplifier does.
//!
//! Scripted expectations take priority; once they run out a simulated device
//! (if any) answers. The mock also detects overlapping exchanges: a `send`
//! that arrives while earlier output is still unread is counted in
//! [`MockChannel::overlaps`] and fails.
//!
//! Where a real channel would block waiting for a line, the mock fails the
//! read instead.
//!
//! # Example
//!
//! ```
//! use monoprice_amp::mock::MockChannel;
//!
//! let mock = MockChannel::new();
//! // The echo "#?11\r\n" is queued automatically before the reply.
//! mock.expect("?11\r", &["#>1100010000120707070101\r\r\n"]);
//! ```

use crate::connection::Channel;
use crate::error::TransportError;
use crate::protocol::{self, COMMAND_TERMINATOR, CONTROL_PREFIX, QUERY_PREFIX};
use crate::types::{ActionCode, ControlId, State, UnitId, ZoneId, ZONES_PER_UNIT};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A pre-loaded request with the lines the device sends back for it
#[derive(Debug, Clone)]
struct Expectation {
    request: String,
    echo: String,
    replies: Vec<String>,
}

/// Zone states of a simulated unit
#[derive(Debug, Clone)]
struct Device {
    unit: UnitId,
    zones: [State; ZONES_PER_UNIT as usize],
}

impl Device {
    fn status_line(&self, zone: ZoneId) -> String {
        let id = ControlId::new(self.unit, zone);
        format!(
            "#>{}\r\r\n",
            protocol::encode_status(id, &self.zones[usize::from(zone - 1)])
        )
    }

    fn respond(&mut self, request: &str) -> io::Result<Vec<String>> {
        let body = request
            .strip_suffix(COMMAND_TERMINATOR)
            .ok_or_else(|| unexpected(request))?;

        if let Some(target) = body.strip_prefix(QUERY_PREFIX) {
            let (unit, zone) = self.address(target, request)?;
            if unit != self.unit {
                return Err(unexpected(request));
            }
            return match zone {
                0 => Ok((1..=ZONES_PER_UNIT).map(|z| self.status_line(z)).collect()),
                z if z <= ZONES_PER_UNIT => Ok(vec![self.status_line(z)]),
                _ => Err(unexpected(request)),
            };
        }

        if let Some(control) = body.strip_prefix(CONTROL_PREFIX) {
            if control.len() != 6 || !control.is_ascii() {
                return Err(unexpected(request));
            }
            let (unit, zone) = self.address(&control[..2], request)?;
            if unit != self.unit || !(1..=ZONES_PER_UNIT).contains(&zone) {
                return Err(unexpected(request));
            }
            let action = ActionCode::from_code(control[2..4].as_bytes())
                .ok_or_else(|| unexpected(request))?;
            let value: i32 = control[4..6].parse().map_err(|_| unexpected(request))?;
            protocol::apply(&mut self.zones[usize::from(zone - 1)], action, value);
            return Ok(Vec::new());
        }

        Err(unexpected(request))
    }

    fn address(&self, target: &str, request: &str) -> io::Result<(UnitId, ZoneId)> {
        let digits: Vec<u8> = target
            .chars()
            .map(|c| c.to_digit(10).map(|d| d as u8))
            .collect::<Option<_>>()
            .ok_or_else(|| unexpected(request))?;
        match digits.as_slice() {
            [unit, zone] => Ok((*unit, *zone)),
            _ => Err(unexpected(request)),
        }
    }
}

fn unexpected(request: &str) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("unexpected command {request:?}"),
    )
}

#[derive(Debug, Default)]
struct Inner {
    expectations: VecDeque<Expectation>,
    device: Option<Device>,
    pending: VecDeque<String>,
    sent_log: Vec<String>,
    overlaps: usize,
    discards: usize,
    closed: bool,
}

/// A [`Channel`] backed by memory instead of a serial port
///
/// Clones share the same state, so a test can keep a handle after moving
/// one into an amplifier.
#[derive(Debug, Clone, Default)]
pub struct MockChannel {
    inner: Arc<Mutex<Inner>>,
}

impl MockChannel {
    /// Create a scripted channel with no expectations
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a channel that behaves like unit `unit` with every zone in `state`
    pub fn simulated(unit: UnitId, state: State) -> Self {
        let mock = Self::new();
        mock.inner().device = Some(Device {
            unit,
            zones: [state; ZONES_PER_UNIT as usize],
        });
        mock
    }

    /// Expect `request` and answer with its echo followed by `replies`
    pub fn expect(&self, request: &str, replies: &[&str]) {
        self.expect_echo(request, &format!("#{request}\n"), replies);
    }

    /// Expect `request` and answer with a custom `echo` line followed by `replies`
    pub fn expect_echo(&self, request: &str, echo: &str, replies: &[&str]) {
        self.inner().expectations.push_back(Expectation {
            request: request.to_string(),
            echo: echo.to_string(),
            replies: replies.iter().map(|r| r.to_string()).collect(),
        });
    }

    /// Queue a line as if the device sent it unprompted
    pub fn push_line(&self, line: &str) {
        self.inner().pending.push_back(line.to_string());
    }

    /// Change a simulated zone, as a wall keypad would
    pub fn set_zone_state(&self, zone: ZoneId, state: State) {
        if let Some(device) = self.inner().device.as_mut() {
            if let Some(slot) = device.zones.get_mut(usize::from(zone).wrapping_sub(1)) {
                *slot = state;
            }
        }
    }

    /// Current state of a simulated zone
    pub fn zone_state(&self, zone: ZoneId) -> Option<State> {
        self.inner()
            .device
            .as_ref()
            .and_then(|device| device.zones.get(usize::from(zone).wrapping_sub(1)).copied())
    }

    /// Every command written so far, in order
    pub fn sent(&self) -> Vec<String> {
        self.inner().sent_log.clone()
    }

    /// Number of scripted requests not yet received
    pub fn remaining_expectations(&self) -> usize {
        self.inner().expectations.len()
    }

    /// Number of writes issued while a previous exchange was still unread
    pub fn overlaps(&self) -> usize {
        self.inner().overlaps
    }

    /// Number of times unread input was discarded
    pub fn discards(&self) -> usize {
        self.inner().discards
    }

    /// Lines produced by the device but not read yet
    pub fn pending_lines(&self) -> usize {
        self.inner().pending.len()
    }

    /// Simulate the channel going away
    pub fn close(&self) {
        self.inner().closed = true;
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Channel for MockChannel {
    async fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        // Give other tasks a chance to interleave, as they would on a real line.
        tokio::task::yield_now().await;

        let mut inner = self.inner();
        if inner.closed {
            return Err(TransportError::ConnectionClosed);
        }

        let request = String::from_utf8_lossy(data).into_owned();
        inner.sent_log.push(request.clone());

        if !inner.pending.is_empty() {
            inner.overlaps += 1;
            return Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{request:?} written while a previous reply was unread"),
            )
            .into());
        }

        if let Some(expectation) = inner.expectations.pop_front() {
            if expectation.request != request {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "unexpected command: expected {:?}, got {request:?}",
                        expectation.request
                    ),
                )
                .into());
            }
            inner.pending.push_back(expectation.echo);
            inner.pending.extend(expectation.replies);
            return Ok(());
        }

        let Inner {
            device, pending, ..
        } = &mut *inner;
        match device {
            Some(device) => {
                let replies = device.respond(&request)?;
                pending.push_back(format!("#{request}\n"));
                pending.extend(replies);
                Ok(())
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("no expectation left for {request:?}"),
            )
            .into()),
        }
    }

    async fn read_line(&mut self) -> Result<String, TransportError> {
        tokio::task::yield_now().await;

        let mut inner = self.inner();
        match inner.pending.pop_front() {
            Some(line) => Ok(line),
            None if inner.closed => Err(TransportError::ConnectionClosed),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "mock channel has no output pending",
            )
            .into()),
        }
    }

    /// Every pending line has already been delivered, so all of it goes, as
    /// with [`LineChannel`](crate::LineChannel) draining its ready input.
    async fn discard_input(&mut self) -> Result<(), TransportError> {
        let mut inner = self.inner();
        inner.pending.clear();
        inner.discards += 1;
        Ok(())
    }
}
