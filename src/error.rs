// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Link error types.

use std::io;
use thiserror::Error;

/// Failures of the Bluetooth link.
///
/// Every variant is logged where it happens. Only `connect` and the radio
/// helpers hand them back to the caller; the rest end up as state changes
/// or no-ops.
#[derive(Debug, Error)]
pub enum LinkError {
    /// No usable local Bluetooth adapter, or it could not be enabled.
    #[error("Bluetooth radio unavailable")]
    RadioUnavailable,

    /// Peer address string is not a valid Bluetooth address.
    #[error("invalid peer address: {0:?}")]
    InvalidPeerAddress(String),

    /// RFCOMM channel could not be opened.
    #[error("failed to open channel {channel} to {peer}: {source}")]
    ChannelOpenFailure {
        peer: String,
        channel: u8,
        #[source]
        source: io::Error,
    },

    /// I/O error while streaming. Terminal for the read loop.
    #[error("read failed: {0}")]
    ReadFailure(#[source] io::Error),

    /// I/O error while sending. The link stays up.
    #[error("write failed: {0}")]
    WriteFailure(#[source] io::Error),

    /// Error while closing the channel.
    #[error("close failed: {0}")]
    CloseFailure(#[source] io::Error),
}
