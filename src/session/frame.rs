//! Transport-neutral WebSocket frames.
//!
//! The client leg speaks axum's message type, the backend leg speaks
//! tungstenite's. Both convert through [`Frame`] so one pump
//! implementation serves both directions.

use axum::body::Bytes;
use axum::extract::ws;
use tokio_tungstenite::tungstenite::{self, protocol::frame::coding::CloseCode};

/// Close code for a clean shutdown.
pub const CLOSE_NORMAL: u16 = 1000;
/// Close code when an endpoint is going away (shutdown, idle).
pub const CLOSE_GOING_AWAY: u16 = 1001;
/// Close code for a frame larger than the configured limit.
pub const CLOSE_TOO_BIG: u16 = 1009;
/// Close code for an unexpected relay failure.
pub const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Close code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
}

impl CloseInfo {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }
}

/// A relayed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Bytes),
    Close(Option<CloseInfo>),
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Text(_) => "text",
            Frame::Binary(_) => "binary",
            Frame::Close(_) => "close",
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Frame::Text(text) => text.len(),
            Frame::Binary(data) => data.len(),
            Frame::Close(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A message type that can carry relayed frames.
pub trait WireMessage: Sized + Send {
    /// Convert into a relayable frame. Control traffic handled by the
    /// transport itself (ping, pong, raw frames) yields `None`.
    fn into_frame(self) -> Option<Frame>;

    fn from_frame(frame: Frame) -> Self;
}

impl WireMessage for ws::Message {
    fn into_frame(self) -> Option<Frame> {
        match self {
            ws::Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            ws::Message::Binary(data) => Some(Frame::Binary(data)),
            ws::Message::Close(close) => Some(Frame::Close(
                close.map(|c| CloseInfo::new(c.code, c.reason.as_str())),
            )),
            ws::Message::Ping(_) | ws::Message::Pong(_) => None,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => ws::Message::Text(text.into()),
            Frame::Binary(data) => ws::Message::Binary(data),
            Frame::Close(close) => ws::Message::Close(close.map(|c| ws::CloseFrame {
                code: c.code,
                reason: c.reason.into(),
            })),
        }
    }
}

impl WireMessage for tungstenite::Message {
    fn into_frame(self) -> Option<Frame> {
        match self {
            tungstenite::Message::Text(text) => Some(Frame::Text(text.as_str().to_owned())),
            tungstenite::Message::Binary(data) => Some(Frame::Binary(data)),
            tungstenite::Message::Close(close) => Some(Frame::Close(
                close.map(|c| CloseInfo::new(u16::from(c.code), c.reason.as_str())),
            )),
            tungstenite::Message::Ping(_)
            | tungstenite::Message::Pong(_)
            | tungstenite::Message::Frame(_) => None,
        }
    }

    fn from_frame(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => tungstenite::Message::Text(text.into()),
            Frame::Binary(data) => tungstenite::Message::Binary(data),
            Frame::Close(close) => tungstenite::Message::Close(close.map(|c| {
                tungstenite::protocol::CloseFrame {
                    code: CloseCode::from(c.code),
                    reason: c.reason.into(),
                }
            })),
        }
    }
}
