//! Wire-level constants shared by the binary codec and the server.

/// Version byte carried in every frame header.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum length of a team name or secret on the wire.
pub const MAX_NAME_LEN: usize = 32;

/// Frame types flowing trader → engine.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum WireRequestType {
    Login = 0,
    Submit = 1,
    Cancel = 2,
    /// End of the session's batch for the current acceptance window.
    Ready = 3,
}

impl WireRequestType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(WireRequestType::Login),
            1 => Some(WireRequestType::Submit),
            2 => Some(WireRequestType::Cancel),
            3 => Some(WireRequestType::Ready),
            _ => None,
        }
    }
}

/// Frame types flowing engine → trader.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum WireEventType {
    LoginAck = 10,
    MarketTick = 11,
    Fill = 12,
    OrderAck = 13,
    OrderReject = 14,
    Error = 15,
}

impl WireEventType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            10 => Some(WireEventType::LoginAck),
            11 => Some(WireEventType::MarketTick),
            12 => Some(WireEventType::Fill),
            13 => Some(WireEventType::OrderAck),
            14 => Some(WireEventType::OrderReject),
            15 => Some(WireEventType::Error),
            _ => None,
        }
    }
}

pub fn validate_name_len(len: usize) -> bool {
    len >= 1 && len <= MAX_NAME_LEN
}
