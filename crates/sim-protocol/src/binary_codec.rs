//! Binary encoding/decoding for the trader protocol.
//!
//! Framing model (single message per buffer):
//!
//! ```text
//! Every frame
//! -----------
//! [0]   : msg_type (WireRequestType / WireEventType as u8)
//! [1]   : version  (PROTOCOL_VERSION)
//! [2..4]: reserved = 0
//! [4..] : body (depends on msg_type)
//!
//! Trader → engine
//! ---------------
//! Login (0):    name_len u8, name bytes, secret_len u8, secret bytes
//! Submit (1):   client_order_id u32, instrument u32, side u8,
//!               lifespan u8 (0=GFD, 1=FAK), price i64, quantity i64
//! Cancel (2):   order_id u64
//! Ready (3):    [no body]
//!
//! Engine → trader
//! ---------------
//! LoginAck (10):    trader_id u32
//! MarketTick (11):  instrument u32, timestamp u64, nbids u8, nasks u8,
//!                   then (price i64, qty i64) pairs, bids first
//! Fill (12):        order_id u64, client_order_id u32, instrument u32,
//!                   side u8, price i64, quantity i64, remaining i64
//! OrderAck (13):    order_id u64, client_order_id u32, instrument u32,
//!                   remaining i64
//! OrderReject (14): client_order_id u32, reason u8
//! Error (15):       client_order_id u32, msg_len u16, message bytes
//! ```
//!
//! All integers are big-endian. This module encodes/decodes one message per
//! buffer; the TCP layer length-prefixes each frame with a `u32` BE.

use thiserror::Error;

use sim_core::{
    CancelOrder, ErrorNotice, FillNotice, Lifespan, MarketTick, OrderAck, OrderReject,
    OrderRequest, RejectReason, Side, SubmitOrder, TraderId, TraderNotification, MAX_DEPTH,
};

use crate::wire_types::{
    validate_name_len, WireEventType, WireRequestType, MAX_NAME_LEN, PROTOCOL_VERSION,
};

/// Errors raised while encoding or decoding a frame.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("buffer truncated")]
    Truncated,
    #[error("unknown message type {0}")]
    UnknownMessageType(u8),
    #[error("protocol version mismatch: got {0}, expected {PROTOCOL_VERSION}")]
    VersionMismatch(u8),
    #[error("invalid name or secret")]
    InvalidName,
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
}

/// Login handshake payload, sent as a trader's first frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub name: String,
    pub secret: String,
}

/// A decoded trader → engine frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireRequest {
    Login(Login),
    Order(OrderRequest),
    Ready,
}

/// A decoded engine → trader frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireEvent {
    LoginAck { trader_id: TraderId },
    Notification(TraderNotification),
}

// ============================================================================
// Trader → engine
// ============================================================================

pub fn decode_request(buf: &[u8]) -> Result<WireRequest, ProtocolError> {
    let (msg_type, body) = split_header(buf)?;
    let wire_type =
        WireRequestType::from_u8(msg_type).ok_or(ProtocolError::UnknownMessageType(msg_type))?;

    match wire_type {
        WireRequestType::Login => decode_login(body),
        WireRequestType::Submit => decode_submit(body),
        WireRequestType::Cancel => decode_cancel(body),
        WireRequestType::Ready => Ok(WireRequest::Ready),
    }
}

pub fn encode_request(req: &WireRequest, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    match req {
        WireRequest::Login(login) => encode_login(login, out),
        WireRequest::Order(OrderRequest::Submit(submit)) => encode_submit(submit, out),
        WireRequest::Order(OrderRequest::Cancel(cancel)) => {
            push_header(WireRequestType::Cancel as u8, out);
            out.extend_from_slice(&cancel.order_id.to_be_bytes());
            Ok(())
        }
        WireRequest::Ready => {
            push_header(WireRequestType::Ready as u8, out);
            Ok(())
        }
    }
}

fn decode_login(body: &[u8]) -> Result<WireRequest, ProtocolError> {
    let (name, rest) = take_short_string(body)?;
    let (secret, _) = take_short_string(rest)?;
    Ok(WireRequest::Login(Login { name, secret }))
}

fn encode_login(login: &Login, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    if !validate_name_len(login.name.len()) || login.secret.len() > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidName);
    }
    push_header(WireRequestType::Login as u8, out);
    out.push(login.name.len() as u8);
    out.extend_from_slice(login.name.as_bytes());
    out.push(login.secret.len() as u8);
    out.extend_from_slice(login.secret.as_bytes());
    Ok(())
}

fn decode_submit(body: &[u8]) -> Result<WireRequest, ProtocolError> {
    if body.len() < 4 + 4 + 1 + 1 + 8 + 8 {
        return Err(ProtocolError::Truncated);
    }
    let client_order_id = read_u32(&body[0..4])?;
    let instrument = read_u32(&body[4..8])?;
    let side = decode_side(body[8])?;
    let lifespan = match body[9] {
        0 => Lifespan::GoodForDay,
        1 => Lifespan::FillAndKill,
        _ => return Err(ProtocolError::InvalidField("lifespan")),
    };
    let price = read_i64(&body[10..18])?;
    let quantity = read_i64(&body[18..26])?;

    Ok(WireRequest::Order(OrderRequest::Submit(SubmitOrder {
        client_order_id,
        instrument,
        side,
        price,
        quantity,
        lifespan,
    })))
}

fn encode_submit(submit: &SubmitOrder, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    push_header(WireRequestType::Submit as u8, out);
    out.extend_from_slice(&submit.client_order_id.to_be_bytes());
    out.extend_from_slice(&submit.instrument.to_be_bytes());
    out.push(side_byte(submit.side));
    out.push(match submit.lifespan {
        Lifespan::GoodForDay => 0,
        Lifespan::FillAndKill => 1,
    });
    out.extend_from_slice(&submit.price.to_be_bytes());
    out.extend_from_slice(&submit.quantity.to_be_bytes());
    Ok(())
}

fn decode_cancel(body: &[u8]) -> Result<WireRequest, ProtocolError> {
    if body.len() < 8 {
        return Err(ProtocolError::Truncated);
    }
    let order_id = read_u64(&body[0..8])?;
    Ok(WireRequest::Order(OrderRequest::Cancel(CancelOrder {
        order_id,
    })))
}

// ============================================================================
// Engine → trader
// ============================================================================

pub fn encode_event(event: &WireEvent, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    match event {
        WireEvent::LoginAck { trader_id } => {
            push_header(WireEventType::LoginAck as u8, out);
            out.extend_from_slice(&trader_id.to_be_bytes());
            Ok(())
        }
        WireEvent::Notification(notification) => encode_notification(notification, out),
    }
}

pub fn decode_event(buf: &[u8]) -> Result<WireEvent, ProtocolError> {
    let (msg_type, body) = split_header(buf)?;
    let wire_type =
        WireEventType::from_u8(msg_type).ok_or(ProtocolError::UnknownMessageType(msg_type))?;

    match wire_type {
        WireEventType::LoginAck => {
            if body.len() < 4 {
                return Err(ProtocolError::Truncated);
            }
            Ok(WireEvent::LoginAck {
                trader_id: read_u32(&body[0..4])?,
            })
        }
        WireEventType::MarketTick => decode_market_tick(body),
        WireEventType::Fill => decode_fill(body),
        WireEventType::OrderAck => decode_order_ack(body),
        WireEventType::OrderReject => decode_order_reject(body),
        WireEventType::Error => decode_error(body),
    }
}

fn encode_notification(
    notification: &TraderNotification,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    match notification {
        TraderNotification::MarketTick(tick) => {
            if tick.bids.len() > MAX_DEPTH || tick.asks.len() > MAX_DEPTH {
                return Err(ProtocolError::InvalidField("depth"));
            }
            push_header(WireEventType::MarketTick as u8, out);
            out.extend_from_slice(&tick.instrument.to_be_bytes());
            out.extend_from_slice(&tick.timestamp.to_be_bytes());
            out.push(tick.bids.len() as u8);
            out.push(tick.asks.len() as u8);
            for &(price, qty) in tick.bids.iter().chain(tick.asks.iter()) {
                out.extend_from_slice(&price.to_be_bytes());
                out.extend_from_slice(&qty.to_be_bytes());
            }
            Ok(())
        }
        TraderNotification::Fill(fill) => {
            push_header(WireEventType::Fill as u8, out);
            out.extend_from_slice(&fill.order_id.to_be_bytes());
            out.extend_from_slice(&fill.client_order_id.to_be_bytes());
            out.extend_from_slice(&fill.instrument.to_be_bytes());
            out.push(side_byte(fill.side));
            out.extend_from_slice(&fill.price.to_be_bytes());
            out.extend_from_slice(&fill.quantity.to_be_bytes());
            out.extend_from_slice(&fill.remaining.to_be_bytes());
            Ok(())
        }
        TraderNotification::OrderAck(ack) => {
            push_header(WireEventType::OrderAck as u8, out);
            out.extend_from_slice(&ack.order_id.to_be_bytes());
            out.extend_from_slice(&ack.client_order_id.to_be_bytes());
            out.extend_from_slice(&ack.instrument.to_be_bytes());
            out.extend_from_slice(&ack.remaining.to_be_bytes());
            Ok(())
        }
        TraderNotification::OrderReject(reject) => {
            push_header(WireEventType::OrderReject as u8, out);
            out.extend_from_slice(&reject.client_order_id.to_be_bytes());
            out.push(reason_byte(reject.reason));
            Ok(())
        }
        TraderNotification::Error(notice) => {
            if notice.message.len() > u16::MAX as usize {
                return Err(ProtocolError::InvalidField("message"));
            }
            push_header(WireEventType::Error as u8, out);
            out.extend_from_slice(&notice.client_order_id.to_be_bytes());
            out.extend_from_slice(&(notice.message.len() as u16).to_be_bytes());
            out.extend_from_slice(notice.message.as_bytes());
            Ok(())
        }
    }
}

fn decode_market_tick(body: &[u8]) -> Result<WireEvent, ProtocolError> {
    if body.len() < 4 + 8 + 2 {
        return Err(ProtocolError::Truncated);
    }
    let instrument = read_u32(&body[0..4])?;
    let timestamp = read_u64(&body[4..12])?;
    let nbids = body[12] as usize;
    let nasks = body[13] as usize;
    if nbids > MAX_DEPTH || nasks > MAX_DEPTH {
        return Err(ProtocolError::InvalidField("depth"));
    }
    let need = 14 + (nbids + nasks) * 16;
    if body.len() < need {
        return Err(ProtocolError::Truncated);
    }

    let mut offset = 14;
    let mut read_levels = |n: usize| -> Result<Vec<(i64, i64)>, ProtocolError> {
        let mut levels = Vec::with_capacity(n);
        for _ in 0..n {
            let price = read_i64(&body[offset..offset + 8])?;
            let qty = read_i64(&body[offset + 8..offset + 16])?;
            offset += 16;
            levels.push((price, qty));
        }
        Ok(levels)
    };
    let bids = read_levels(nbids)?;
    let asks = read_levels(nasks)?;

    Ok(WireEvent::Notification(TraderNotification::MarketTick(
        MarketTick {
            instrument,
            timestamp,
            bids,
            asks,
        },
    )))
}

fn decode_fill(body: &[u8]) -> Result<WireEvent, ProtocolError> {
    if body.len() < 8 + 4 + 4 + 1 + 8 + 8 + 8 {
        return Err(ProtocolError::Truncated);
    }
    Ok(WireEvent::Notification(TraderNotification::Fill(
        FillNotice {
            order_id: read_u64(&body[0..8])?,
            client_order_id: read_u32(&body[8..12])?,
            instrument: read_u32(&body[12..16])?,
            side: decode_side(body[16])?,
            price: read_i64(&body[17..25])?,
            quantity: read_i64(&body[25..33])?,
            remaining: read_i64(&body[33..41])?,
        },
    )))
}

fn decode_order_ack(body: &[u8]) -> Result<WireEvent, ProtocolError> {
    if body.len() < 8 + 4 + 4 + 8 {
        return Err(ProtocolError::Truncated);
    }
    Ok(WireEvent::Notification(TraderNotification::OrderAck(
        OrderAck {
            order_id: read_u64(&body[0..8])?,
            client_order_id: read_u32(&body[8..12])?,
            instrument: read_u32(&body[12..16])?,
            remaining: read_i64(&body[16..24])?,
        },
    )))
}

fn decode_order_reject(body: &[u8]) -> Result<WireEvent, ProtocolError> {
    if body.len() < 5 {
        return Err(ProtocolError::Truncated);
    }
    Ok(WireEvent::Notification(TraderNotification::OrderReject(
        OrderReject {
            client_order_id: read_u32(&body[0..4])?,
            reason: decode_reason(body[4])?,
        },
    )))
}

fn decode_error(body: &[u8]) -> Result<WireEvent, ProtocolError> {
    if body.len() < 6 {
        return Err(ProtocolError::Truncated);
    }
    let client_order_id = read_u32(&body[0..4])?;
    let len = u16::from_be_bytes([body[4], body[5]]) as usize;
    if body.len() < 6 + len {
        return Err(ProtocolError::Truncated);
    }
    let message = std::str::from_utf8(&body[6..6 + len])
        .map_err(|_| ProtocolError::InvalidField("message"))?
        .to_string();
    Ok(WireEvent::Notification(TraderNotification::Error(
        ErrorNotice {
            client_order_id,
            message,
        },
    )))
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

fn push_header(msg_type: u8, out: &mut Vec<u8>) {
    out.push(msg_type);
    out.push(PROTOCOL_VERSION);
    out.extend_from_slice(&[0, 0]); // reserved
}

fn split_header(buf: &[u8]) -> Result<(u8, &[u8]), ProtocolError> {
    if buf.len() < 4 {
        return Err(ProtocolError::Truncated);
    }
    if buf[1] != PROTOCOL_VERSION {
        return Err(ProtocolError::VersionMismatch(buf[1]));
    }
    Ok((buf[0], &buf[4..]))
}

fn take_short_string(buf: &[u8]) -> Result<(String, &[u8]), ProtocolError> {
    if buf.is_empty() {
        return Err(ProtocolError::Truncated);
    }
    let len = buf[0] as usize;
    if len > MAX_NAME_LEN {
        return Err(ProtocolError::InvalidName);
    }
    if buf.len() < 1 + len {
        return Err(ProtocolError::Truncated);
    }
    let s = std::str::from_utf8(&buf[1..1 + len])
        .map_err(|_| ProtocolError::InvalidName)?
        .to_string();
    Ok((s, &buf[1 + len..]))
}

fn side_byte(side: Side) -> u8 {
    match side {
        Side::Buy => 0,
        Side::Sell => 1,
    }
}

fn decode_side(v: u8) -> Result<Side, ProtocolError> {
    match v {
        0 => Ok(Side::Buy),
        1 => Ok(Side::Sell),
        _ => Err(ProtocolError::InvalidField("side")),
    }
}

fn reason_byte(reason: RejectReason) -> u8 {
    match reason {
        RejectReason::InvalidTick => 0,
        RejectReason::InvalidLotSize => 1,
        RejectReason::SelfMatch => 2,
        RejectReason::WindowClosed => 3,
        RejectReason::UnknownOrder => 4,
        RejectReason::UnknownInstrument => 5,
        RejectReason::QuotaExceeded => 6,
        RejectReason::RateLimited => 7,
    }
}

fn decode_reason(v: u8) -> Result<RejectReason, ProtocolError> {
    match v {
        0 => Ok(RejectReason::InvalidTick),
        1 => Ok(RejectReason::InvalidLotSize),
        2 => Ok(RejectReason::SelfMatch),
        3 => Ok(RejectReason::WindowClosed),
        4 => Ok(RejectReason::UnknownOrder),
        5 => Ok(RejectReason::UnknownInstrument),
        6 => Ok(RejectReason::QuotaExceeded),
        7 => Ok(RejectReason::RateLimited),
        _ => Err(ProtocolError::InvalidField("reason")),
    }
}

fn read_u32(bytes: &[u8]) -> Result<u32, ProtocolError> {
    let arr: [u8; 4] = bytes.try_into().map_err(|_| ProtocolError::Truncated)?;
    Ok(u32::from_be_bytes(arr))
}

fn read_u64(bytes: &[u8]) -> Result<u64, ProtocolError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| ProtocolError::Truncated)?;
    Ok(u64::from_be_bytes(arr))
}

fn read_i64(bytes: &[u8]) -> Result<i64, ProtocolError> {
    let arr: [u8; 8] = bytes.try_into().map_err(|_| ProtocolError::Truncated)?;
    Ok(i64::from_be_bytes(arr))
}
