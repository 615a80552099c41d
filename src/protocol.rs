//! Wire format of the amplifier's serial protocol.
//!
//! Requests are ASCII lines terminated by a single carriage return:
//!
//! ```text
//! ?<unit>0\r                      query every zone of a unit
//! ?<unit><zone>\r                 query one zone
//! <<unit><zone><code><vv>\r       change one field of one zone
//! ```
//!
//! Replies come back as newline-terminated lines in one of two shapes, both
//! optionally preceded by `#>` or `>`:
//!
//! ```text
//! 1100010000120707070101          full status (22 characters)
//! 11VO14                          single field (6 characters)
//! ```

use crate::error::ParseError;
use crate::types::{ActionCode, ControlId, State, UnitId};

/// Prefix of commands that change a setting
pub const CONTROL_PREFIX: char = '<';

/// Prefix of commands that ask for status
pub const QUERY_PREFIX: char = '?';

/// Terminator appended to every command
pub const COMMAND_TERMINATOR: char = '\r';

/// Length of a full-status reply once normalized
pub const FULL_STATUS_LEN: usize = 22;

/// Length of a single-field reply once normalized
pub const SINGLE_FIELD_LEN: usize = 6;

/// A request ready to be written to the channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command(String);

impl Command {
    /// Query the status of all zones on a unit
    pub fn query_unit(unit: UnitId) -> Self {
        Self(format!("{QUERY_PREFIX}{unit}0{COMMAND_TERMINATOR}"))
    }

    /// Query the status of one zone
    pub fn query_zone(id: ControlId) -> Self {
        Self(format!("{QUERY_PREFIX}{id}{COMMAND_TERMINATOR}"))
    }

    /// Change one field of a zone. `value` must already be range checked.
    pub fn control(id: ControlId, action: ActionCode, value: u8) -> Self {
        Self(format!(
            "{CONTROL_PREFIX}{id}{}{value:02}{COMMAND_TERMINATOR}",
            action.code()
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Strip the line terminator and the echo marker from a reply.
///
/// The device ends replies with `\r\r\n` and starts them with `#>` or `>`
/// depending on the host's serial driver.
pub fn normalize(line: &str) -> &str {
    let line = line.trim_end_matches(&['\r', '\n'][..]);
    let line = line.strip_prefix("#>").unwrap_or(line);
    line.strip_prefix('>').unwrap_or(line)
}

/// Decode a reply line into `state`.
///
/// A full-status reply overwrites every field; a single-field reply only
/// touches the field named by its action code. On error `state` is left as
/// it was.
pub fn decode(line: &str, state: &mut State) -> Result<(), ParseError> {
    let body = normalize(line).as_bytes();

    match body.len() {
        FULL_STATUS_LEN => {
            *state = State {
                is_paging_on: parse_bool(ActionCode::PagingActive, &body[2..4]),
                is_on: parse_bool(ActionCode::Power, &body[4..6]),
                is_mute_on: parse_bool(ActionCode::Mute, &body[6..8]),
                is_do_not_disturb_on: parse_bool(ActionCode::DoNotDisturb, &body[8..10]),
                volume: parse_int(ActionCode::Volume, &body[10..12]),
                treble: parse_int(ActionCode::Treble, &body[12..14]),
                bass: parse_int(ActionCode::Bass, &body[14..16]),
                balance: parse_int(ActionCode::Balance, &body[16..18]),
                source_channel: parse_int(ActionCode::SourceChannel, &body[18..20]),
                is_keypad_connected: parse_bool(
                    ActionCode::KeypadConnectingStatus,
                    &body[20..22],
                ),
            };
            Ok(())
        }
        SINGLE_FIELD_LEN => {
            let action = ActionCode::from_code(&body[2..4]).ok_or_else(|| {
                ParseError::InvalidCommandCode(String::from_utf8_lossy(&body[2..4]).into_owned())
            })?;
            apply(state, action, parse_int(action, &body[4..6]));
            Ok(())
        }
        _ => Err(ParseError::InvalidInput(line.to_string())),
    }
}

/// Render the 22-character full-status body for a zone
pub fn encode_status(id: ControlId, state: &State) -> String {
    format!(
        "{id}{:02}{:02}{:02}{:02}{:02}{:02}{:02}{:02}{:02}{:02}",
        u8::from(state.is_paging_on),
        u8::from(state.is_on),
        u8::from(state.is_mute_on),
        u8::from(state.is_do_not_disturb_on),
        state.volume,
        state.treble,
        state.bass,
        state.balance,
        state.source_channel,
        u8::from(state.is_keypad_connected),
    )
}

/// Write one field of `state`. Boolean fields are on only for a value of 1.
pub(crate) fn apply(state: &mut State, action: ActionCode, value: i32) {
    match action {
        ActionCode::PagingActive => state.is_paging_on = value == 1,
        ActionCode::Power => state.is_on = value == 1,
        ActionCode::Mute => state.is_mute_on = value == 1,
        ActionCode::DoNotDisturb => state.is_do_not_disturb_on = value == 1,
        ActionCode::Volume => state.volume = value,
        ActionCode::Treble => state.treble = value,
        ActionCode::Bass => state.bass = value,
        ActionCode::Balance => state.balance = value,
        ActionCode::SourceChannel => state.source_channel = value,
        ActionCode::KeypadConnectingStatus => state.is_keypad_connected = value == 1,
    }
}

// Bad digits are tolerated: the field reads as -1 (or off) instead of failing
// the whole reply. Only plain ASCII digits count, so a signed field is bad too.
fn parse_int(action: ActionCode, raw: &[u8]) -> i32 {
    let value = if !raw.is_empty() && raw.iter().all(u8::is_ascii_digit) {
        std::str::from_utf8(raw).ok().and_then(|s| s.parse().ok())
    } else {
        None
    };
    match value {
        Some(value) => value,
        None => {
            tracing::warn!("Unparseable {} field {:?}", action, String::from_utf8_lossy(raw));
            -1
        }
    }
}

fn parse_bool(action: ActionCode, raw: &[u8]) -> bool {
    parse_int(action, raw) == 1
}
