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

//! Byte channel to the peer.
//!
//! A [`TransportFactory`] opens a [`Channel`] on an explicit RFCOMM channel
//! number. The session wraps it into a [`Transport`] (write side, close) and
//! a [`TransportReader`] handed to the read loop.

use bluer::rfcomm::{SocketAddr, Stream};
use bluer::Address;
use futures::future::BoxFuture;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::LinkError;

/// Standard SPP UUID.
pub const SPP_UUID: Uuid = Uuid::from_u128(0x00001101_0000_1000_8000_00805F9B34FB);

/// RFCOMM channel the arm listens on.
pub const RFCOMM_CHANNEL: u8 = 2;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Freshly opened, not yet owned by a session.
pub struct Channel {
    reader: BoxedReader,
    writer: BoxedWriter,
}

impl Channel {
    /// Split a bidirectional stream into a channel.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::from_halves(Box::new(reader), Box::new(writer))
    }

    /// Build a channel from already separated halves.
    pub fn from_halves(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }
}

/// Opens channels to a peer.
pub trait TransportFactory: Send + Sync {
    /// Open a channel to `peer` on the given RFCOMM channel number, without
    /// an SDP lookup.
    fn open(&self, peer: Address, channel: u8) -> BoxFuture<'_, Result<Channel, LinkError>>;
}

/// RFCOMM factory backed by BlueZ.
#[derive(Debug, Default, Clone, Copy)]
pub struct RfcommFactory;

impl RfcommFactory {
    pub fn new() -> Self {
        Self
    }
}

impl TransportFactory for RfcommFactory {
    fn open(&self, peer: Address, channel: u8) -> BoxFuture<'_, Result<Channel, LinkError>> {
        Box::pin(async move {
            info!(
                "Opening SPP link ({}) to {} on RFCOMM channel {}",
                SPP_UUID, peer, channel
            );

            let stream = Stream::connect(SocketAddr::new(peer, channel))
                .await
                .map_err(|source| LinkError::ChannelOpenFailure {
                    peer: peer.to_string(),
                    channel,
                    source,
                })?;

            let (reader, writer) = stream.into_split();
            Ok(Channel::from_halves(Box::new(reader), Box::new(writer)))
        })
    }
}

/// Open channel owned by a session.
pub struct Transport {
    peer: Address,
    writer: Mutex<Option<BoxedWriter>>,
    open: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl Transport {
    /// Take ownership of a channel. The returned reader observes end-of-stream
    /// once the transport is closed.
    pub fn new(peer: Address, channel: Channel) -> (Self, TransportReader) {
        let (close_tx, close_rx) = watch::channel(false);

        let transport = Self {
            peer,
            writer: Mutex::new(Some(channel.writer)),
            open: AtomicBool::new(true),
            close_tx,
        };
        let reader = TransportReader {
            reader: channel.reader,
            closed: close_rx,
        };

        (transport, reader)
    }

    pub fn peer(&self) -> Address {
        self.peer
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Write and flush the whole buffer.
    ///
    /// A write stalled on flow control is abandoned as soon as the transport
    /// is closed, and its write half is dropped.
    pub async fn write(&self, bytes: &[u8]) -> Result<(), LinkError> {
        let mut closed = self.close_tx.subscribe();
        if *closed.borrow() {
            return Err(closed_error());
        }

        let mut guard = tokio::select! {
            biased;
            _ = closed.changed() => return Err(closed_error()),
            guard = self.writer.lock() => guard,
        };
        let writer = guard.as_mut().ok_or_else(closed_error)?;

        let result = tokio::select! {
            biased;
            _ = closed.changed() => Err(closed_error()),
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => result.map_err(LinkError::WriteFailure),
        };

        if !self.is_open() {
            debug!("Transport to {} closed during write, dropping writer", self.peer);
            guard.take();
        }
        result
    }

    /// Close the transport. Idempotent.
    ///
    /// The reader is released before the write half is shut down, so a
    /// pending read returns even if the shutdown fails. Never waits for an
    /// in-flight write: that write sees the close signal and drops the
    /// write half itself.
    pub async fn close(&self) -> Result<(), LinkError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            debug!("Transport to {} already closed", self.peer);
            return Ok(());
        }

        let _ = self.close_tx.send(true);

        let writer = match self.writer.try_lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => {
                debug!("Write to {} in progress, aborted by close", self.peer);
                None
            }
        };
        if let Some(mut writer) = writer {
            writer.shutdown().await.map_err(LinkError::CloseFailure)?;
        }

        debug!("Transport to {} closed", self.peer);
        Ok(())
    }
}

fn closed_error() -> LinkError {
    LinkError::WriteFailure(io::Error::new(
        io::ErrorKind::NotConnected,
        "transport closed",
    ))
}

/// Read side of a [`Transport`].
pub struct TransportReader {
    reader: BoxedReader,
    closed: watch::Receiver<bool>,
}

impl TransportReader {
    /// Read available bytes. `Ok(0)` means end-of-stream: the peer hung up or
    /// the transport was closed locally.
    pub async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.closed.borrow() {
            return Ok(0);
        }

        tokio::select! {
            biased;
            _ = self.closed.changed() => Ok(0),
            result = self.reader.read(buf) => result,
        }
    }
}
