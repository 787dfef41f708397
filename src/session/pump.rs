//! One direction of a bridged session.
//!
//! A pump reads frames from one leg and writes them to the other, one at a
//! time and in order, until the source closes, a leg fails, the session goes
//! idle, or the session is cancelled. Whatever ends the pump, it leaves its
//! sink with a close frame when the sink is still writable.

use std::fmt::Display;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};

use crate::observability::metrics;
use crate::session::frame::{
    CloseInfo, Frame, WireMessage, CLOSE_GOING_AWAY, CLOSE_INTERNAL_ERROR, CLOSE_TOO_BIG,
};
use crate::session::registry::{SessionRecord, Side};

/// Per-session relay limits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayLimits {
    pub max_text: Option<usize>,
    pub max_binary: Option<usize>,
    /// Close the session after this long with no frame in either direction.
    pub idle: Option<Duration>,
}

impl RelayLimits {
    fn limit_for(&self, frame: &Frame) -> Option<usize> {
        match frame {
            Frame::Text(_) => self.max_text,
            Frame::Binary(_) => self.max_binary,
            Frame::Close(_) => None,
        }
    }
}

/// Why a pump stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpExit {
    /// The source sent a close frame; it was forwarded to the sink.
    PeerClosed(Option<CloseInfo>),
    /// The source ended without a close frame.
    SourceEnded,
    ReadFailed(String),
    WriteFailed(String),
    FrameTooLarge { kind: &'static str, len: usize },
    IdleTimeout,
    /// The session was cancelled with this close.
    Cancelled(CloseInfo),
}

impl PumpExit {
    /// The close the opposite pump should deliver to its own sink, or
    /// `None` when a close handshake is already under way.
    pub fn propagated_close(&self) -> Option<CloseInfo> {
        match self {
            PumpExit::PeerClosed(_) | PumpExit::Cancelled(_) => None,
            PumpExit::SourceEnded => Some(CloseInfo::new(CLOSE_GOING_AWAY, "peer disconnected")),
            PumpExit::ReadFailed(_) | PumpExit::WriteFailed(_) => {
                Some(CloseInfo::new(CLOSE_INTERNAL_ERROR, "relay failure"))
            }
            PumpExit::FrameTooLarge { .. } => Some(CloseInfo::new(CLOSE_TOO_BIG, "message too big")),
            PumpExit::IdleTimeout => Some(CloseInfo::new(CLOSE_GOING_AWAY, "idle timeout")),
        }
    }
}

/// Relay frames from `source` to `sink` for one side of `session`.
pub async fn pump<In, Out, R, W, E>(
    mut source: R,
    mut sink: W,
    session: &SessionRecord,
    side: Side,
    limits: &RelayLimits,
) -> PumpExit
where
    In: WireMessage,
    Out: WireMessage,
    R: Stream<Item = Result<In, E>> + Unpin,
    E: Display,
    W: Sink<Out> + Unpin,
    W::Error: Display,
{
    let mut cancelled = session.cancelled();
    let pending_close = cancelled.borrow_and_update().clone();
    if let Some(close) = pending_close {
        send_close(&mut sink, close.clone()).await;
        return PumpExit::Cancelled(close);
    }

    loop {
        let remaining_idle = limits.idle.map(|d| d.saturating_sub(session.idle_for()));

        let next = tokio::select! {
            biased;
            changed = cancelled.changed() => {
                let close = match changed {
                    Ok(()) => cancelled.borrow_and_update().clone(),
                    Err(_) => Some(CloseInfo::new(CLOSE_GOING_AWAY, "session dropped")),
                };
                if let Some(close) = close {
                    send_close(&mut sink, close.clone()).await;
                    return PumpExit::Cancelled(close);
                }
                continue;
            }
            _ = idle_timer(remaining_idle) => {
                if limits.idle.is_some_and(|idle| session.idle_for() >= idle) {
                    tracing::debug!(session_id = %session.id(), direction = side.as_str(), "Session idle");
                    send_close(&mut sink, CloseInfo::new(CLOSE_GOING_AWAY, "idle timeout")).await;
                    return PumpExit::IdleTimeout;
                }
                continue;
            }
            next = source.next() => next,
        };

        let message = match next {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::debug!(session_id = %session.id(), direction = side.as_str(), error = %e, "Read failed");
                send_close(&mut sink, CloseInfo::new(CLOSE_INTERNAL_ERROR, "relay failure")).await;
                return PumpExit::ReadFailed(e.to_string());
            }
            None => {
                tracing::debug!(session_id = %session.id(), direction = side.as_str(), "Source ended without close");
                send_close(&mut sink, CloseInfo::new(CLOSE_GOING_AWAY, "peer disconnected")).await;
                return PumpExit::SourceEnded;
            }
        };

        let Some(frame) = message.into_frame() else {
            continue;
        };

        if let Frame::Close(close) = frame {
            tracing::debug!(
                session_id = %session.id(),
                direction = side.as_str(),
                code = close.as_ref().map(|c| c.code),
                "Close received"
            );
            // The opposite leg may already be closed; that is not an error.
            let _ = sink.send(Out::from_frame(Frame::Close(close.clone()))).await;
            return PumpExit::PeerClosed(close);
        }

        let kind = frame.kind();
        let len = frame.len();
        if limits.limit_for(&frame).is_some_and(|limit| len > limit) {
            tracing::warn!(session_id = %session.id(), direction = side.as_str(), kind, len, "Frame exceeds limit");
            send_close(&mut sink, CloseInfo::new(CLOSE_TOO_BIG, "message too big")).await;
            return PumpExit::FrameTooLarge { kind, len };
        }

        if let Err(e) = sink.send(Out::from_frame(frame)).await {
            tracing::debug!(session_id = %session.id(), direction = side.as_str(), error = %e, "Write failed");
            return PumpExit::WriteFailed(e.to_string());
        }
        session.touch();
        metrics::record_frame(side.as_str(), kind, len);
    }
}

/// Best-effort close of a sink.
async fn send_close<Out, W>(sink: &mut W, close: CloseInfo)
where
    Out: WireMessage,
    W: Sink<Out> + Unpin,
{
    let _ = sink.send(Out::from_frame(Frame::Close(Some(close)))).await;
}

async fn idle_timer(limit: Option<Duration>) {
    match limit {
        Some(limit) => tokio::time::sleep(limit).await,
        None => std::future::pending().await,
    }
}
