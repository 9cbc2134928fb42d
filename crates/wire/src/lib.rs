// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol for kernel communication.
//!
//! Wire format: 4-byte length prefix (big-endian) + UTF-8 JSON payload.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod frame;
mod message;

pub use frame::{encode, read_message, write_message, FrameDecoder, MAX_FRAME_LEN};
pub use message::{ErrorPayload, Message, MessageKind};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds the frame length cap")]
    FrameTooLarge(usize),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),
}
