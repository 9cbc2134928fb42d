// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Length-prefixed framing with incremental decoding.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::message::Message;
use crate::WireError;

/// Sanity cap on a single frame's payload. A prefix above this is treated as
/// stream corruption rather than a frame to wait for.
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Serialize a message as one contiguous frame: 4-byte big-endian length
/// followed by the JSON payload.
pub fn encode(message: &Message) -> Result<Vec<u8>, WireError> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(payload.len()));
    }
    let mut frame = Vec::with_capacity(4 + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Stateful byte accumulator that peels complete frames off a stream.
///
/// Each connection owns its own decoder; no buffer is ever shared between
/// peers. Malformed JSON payloads are dropped (the length prefix is
/// authoritative, so the decoder stays aligned on the next frame boundary).
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append incoming bytes and return every complete message now decodable.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Message> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();

        loop {
            if self.buf.len() < 4 {
                break;
            }
            let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]])
                as usize;
            if len > MAX_FRAME_LEN {
                // Corrupt prefix; there is no boundary to resync on.
                warn!(len, "frame length exceeds cap, discarding buffered bytes");
                self.buf.clear();
                break;
            }
            if self.buf.len() < 4 + len {
                break;
            }
            let payload: Vec<u8> = self.buf.drain(..4 + len).skip(4).collect();
            match serde_json::from_slice::<Message>(&payload) {
                Ok(message) => messages.push(message),
                Err(e) => {
                    warn!(error = %e, len, "dropping malformed frame payload");
                }
            }
        }

        messages
    }

    /// Bytes buffered awaiting a complete frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

/// Read one framed message from an async reader. Used by clients and the
/// evaluator channel, which speak strict request/response.
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, WireError> {
    let mut prefix = [0u8; 4];
    match reader.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
            return Err(WireError::ConnectionClosed)
        }
        Err(e) => return Err(e.into()),
    }
    let len = u32::from_be_bytes(prefix) as usize;
    if len > MAX_FRAME_LEN {
        return Err(WireError::FrameTooLarge(len));
    }
    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            WireError::ConnectionClosed
        } else {
            WireError::Io(e)
        }
    })?;
    serde_json::from_slice(&payload).map_err(|e| WireError::Malformed(e.to_string()))
}

/// Write one framed message to an async writer.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    message: &Message,
) -> Result<(), WireError> {
    let frame = encode(message)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "frame_tests.rs"]
mod tests;
