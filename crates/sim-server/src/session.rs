//! Per-connection I/O tasks.
//!
//! Every frame on the wire is length-prefixed with a `u32` BE. After the
//! login handshake (handled in `server`), each connection gets a reader task
//! feeding the scheduler and a writer task draining its notification
//! channel. Neither task touches match state.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

use sim_core::TraderId;
use sim_protocol::{binary_codec, WireEvent, WireRequest};

use crate::types::{NotificationRx, SchedulerTx, SessionMsg};

/// Upper bound on a single frame; anything larger is a broken peer.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Read one length-prefixed frame. `None` means a clean EOF at a frame
/// boundary.
pub async fn read_frame<R>(read: &mut R) -> io::Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match read.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len == 0 || len > MAX_FRAME_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad frame length {len}"),
        ));
    }

    let mut frame = vec![0u8; len];
    read.read_exact(&mut frame).await?;
    Ok(Some(frame))
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(write: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    write.write_all(payload).await?;
    write.flush().await
}

/// Reader loop: decode frames into scheduler messages until EOF or error.
pub async fn run_reader(trader_id: TraderId, mut read: OwnedReadHalf, tx: SchedulerTx) {
    loop {
        let msg = match read_frame(&mut read).await {
            Ok(Some(frame)) => match binary_codec::decode_request(&frame) {
                Ok(WireRequest::Order(request)) => SessionMsg::Request { trader_id, request },
                Ok(WireRequest::Ready) => SessionMsg::Ready { trader_id },
                Ok(WireRequest::Login(_)) => SessionMsg::Violation {
                    trader_id,
                    detail: "login frame after handshake".to_string(),
                },
                Err(err) => SessionMsg::Violation {
                    trader_id,
                    detail: format!("undecodable frame: {err}"),
                },
            },
            Ok(None) => {
                debug!(trader_id, "session closed");
                break;
            }
            Err(err) => {
                debug!(trader_id, %err, "session read failed");
                break;
            }
        };
        if tx.send(msg).is_err() {
            // Scheduler is gone; the match is over.
            return;
        }
    }
    let _ = tx.send(SessionMsg::Disconnected { trader_id });
}

/// Writer loop: encode and send notifications until the channel closes.
pub async fn run_writer(trader_id: TraderId, mut write: OwnedWriteHalf, mut rx: NotificationRx) {
    let mut payload = Vec::with_capacity(256);
    while let Some(notification) = rx.recv().await {
        payload.clear();
        if let Err(err) =
            binary_codec::encode_event(&WireEvent::Notification(notification), &mut payload)
        {
            warn!(trader_id, %err, "unencodable notification dropped");
            continue;
        }
        if let Err(err) = write_frame(&mut write, &payload).await {
            debug!(trader_id, %err, "session write failed");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_pipe() {
        let (mut a, mut b) = tokio::io::duplex(256);
        write_frame(&mut a, b"hello").await.unwrap();
        write_frame(&mut a, &[0xAB; 3]).await.unwrap();

        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), b"hello");
        assert_eq!(read_frame(&mut b).await.unwrap().unwrap(), vec![0xAB; 3]);

        drop(a);
        assert!(read_frame(&mut b).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_an_error() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let len = (MAX_FRAME_LEN as u32 + 1).to_be_bytes();
        a.write_all(&len).await.unwrap();

        let err = read_frame(&mut b).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
