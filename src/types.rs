use serde::{Deserialize, Serialize};
use std::fmt;

/// Amplifier unit identifier (1-3 when units are daisy-chained)
pub type UnitId = u8;

/// Zone identifier within a unit (1-6)
pub type ZoneId = u8;

/// Number of zones on every unit
pub const ZONES_PER_UNIT: u8 = 6;

/// Field tag used by control commands and single-field replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionCode {
    Power,
    Mute,
    DoNotDisturb,
    Volume,
    Treble,
    Bass,
    Balance,
    SourceChannel,
    KeypadConnectingStatus,
    PagingActive,
}

impl ActionCode {
    pub const ALL: [ActionCode; 10] = [
        ActionCode::Power,
        ActionCode::Mute,
        ActionCode::DoNotDisturb,
        ActionCode::Volume,
        ActionCode::Treble,
        ActionCode::Bass,
        ActionCode::Balance,
        ActionCode::SourceChannel,
        ActionCode::KeypadConnectingStatus,
        ActionCode::PagingActive,
    ];

    /// Two-character code used on the wire
    pub const fn code(self) -> &'static str {
        match self {
            ActionCode::Power => "PR",
            ActionCode::Mute => "MU",
            ActionCode::DoNotDisturb => "DT",
            ActionCode::Volume => "VO",
            ActionCode::Treble => "TR",
            ActionCode::Bass => "BS",
            ActionCode::Balance => "BL",
            ActionCode::SourceChannel => "CH",
            ActionCode::KeypadConnectingStatus => "LS",
            ActionCode::PagingActive => "PA",
        }
    }

    /// Look up the action for a two-byte wire code
    pub fn from_code(code: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|action| action.code().as_bytes() == code)
    }
}

impl fmt::Display for ActionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Address of one zone: unit id followed by zone id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId {
    pub unit: UnitId,
    pub zone: ZoneId,
}

impl ControlId {
    pub fn new(unit: UnitId, zone: ZoneId) -> Self {
        Self { unit, zone }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.unit, self.zone)
    }
}

/// Last known settings of a zone, as reported by the amplifier
///
/// Numeric fields hold `-1` when the device sent digits that did not parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub is_on: bool,
    pub is_mute_on: bool,
    pub is_do_not_disturb_on: bool,
    pub is_paging_on: bool,
    /// 0-38
    pub volume: i32,
    /// 0-14, 7 is flat
    pub treble: i32,
    /// 0-14, 7 is flat
    pub bass: i32,
    /// 0-38
    pub balance: i32,
    /// 1-6
    pub source_channel: i32,
    pub is_keypad_connected: bool,
}
