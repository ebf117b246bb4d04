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

//! Connection session to the arm.
//!
//! A session owns at most one [`Transport`] and the read loop bound to it.
//! Connect and disconnect are serialised by a transition lock held across
//! the whole operation, including the channel open and the read loop join,
//! so an old read loop is always gone before a new transport is installed.
//! State and transport are swapped together under a short synchronous lock.

use bluer::Address;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::dispatch::{DataObserver, DeliveryContext};
use super::protocol::Command;
use super::reader::{ObserverSlot, ReadLoop};
use super::transport::{Transport, TransportFactory};
use crate::config::LinkConfig;
use crate::error::LinkError;

/// State of the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connecting => "Connecting...",
            ConnectionState::Connected => "Connected",
            ConnectionState::Closing => "Closing...",
        }
    }
}

struct Link {
    state: ConnectionState,
    transport: Option<Arc<Transport>>,
}

/// Resets a half-finished transition when its future is dropped.
///
/// Completed transitions leave the state at `Connected` or `Disconnected`,
/// which this guard does not touch.
struct TransitionGuard<'a> {
    link: &'a Mutex<Link>,
}

impl Drop for TransitionGuard<'_> {
    fn drop(&mut self) {
        let mut link = self.link.lock();
        if matches!(
            link.state,
            ConnectionState::Connecting | ConnectionState::Closing
        ) {
            warn!("{} cancelled, session reset", link.state.as_str());
            link.state = ConnectionState::Disconnected;
        }
    }
}

/// Session with the arm.
pub struct ConnectionSession {
    config: LinkConfig,
    factory: Arc<dyn TransportFactory>,
    delivery: Arc<dyn DeliveryContext>,
    link: Mutex<Link>,
    /// Held for a whole connect or disconnect; owns the read loop handle.
    transition: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    observer: Arc<ObserverSlot>,
}

impl ConnectionSession {
    /// Create a disconnected session.
    pub fn new(
        config: LinkConfig,
        factory: Arc<dyn TransportFactory>,
        delivery: Arc<dyn DeliveryContext>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            factory,
            delivery,
            link: Mutex::new(Link {
                state: ConnectionState::Disconnected,
                transport: None,
            }),
            transition: tokio::sync::Mutex::new(None),
            observer: Arc::new(ObserverSlot::new()),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.link.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Address of the connected peer.
    pub fn peer_address(&self) -> Option<Address> {
        self.link.lock().transport.as_ref().map(|t| t.peer())
    }

    /// Connect to the configured peer.
    pub async fn connect_default(&self) -> Result<(), LinkError> {
        let peer = self.config.peer_address.clone();
        self.connect(&peer).await
    }

    /// Connect to `peer`, replacing any current connection.
    ///
    /// On failure the session is left disconnected.
    pub async fn connect(&self, peer: &str) -> Result<(), LinkError> {
        let mut read_loop = self.transition.lock().await;
        let _guard = TransitionGuard { link: &self.link };

        if self.state() != ConnectionState::Disconnected {
            info!("Already connected, disconnecting first");
            self.close_link(&mut read_loop).await;
        }

        // Read loop left behind by a cancelled disconnect.
        if let Some(stale) = read_loop.take() {
            if let Err(e) = stale.await {
                error!("Read loop aborted: {}", e);
            }
        }

        let address: Address = match peer.trim().parse() {
            Ok(address) => address,
            Err(_) => {
                let err = LinkError::InvalidPeerAddress(peer.to_string());
                error!("{}", err);
                return Err(err);
            }
        };

        self.link.lock().state = ConnectionState::Connecting;
        info!("Connecting to {}...", address);

        let channel = match self.factory.open(address, self.config.rfcomm_channel).await {
            Ok(channel) => channel,
            Err(e) => {
                error!("Connection failed: {}", e);
                self.link.lock().state = ConnectionState::Disconnected;
                return Err(e);
            }
        };

        let (transport, reader) = Transport::new(address, channel);
        {
            let mut link = self.link.lock();
            link.transport = Some(Arc::new(transport));
            link.state = ConnectionState::Connected;
        }

        *read_loop = Some(
            ReadLoop::new(
                reader,
                self.observer.clone(),
                self.delivery.clone(),
                self.config.read_buffer_size,
                self.config.final_chunk,
            )
            .spawn(),
        );

        info!("Connected to {}", address);
        Ok(())
    }

    /// Close the connection. Does nothing when already disconnected.
    pub async fn disconnect(&self) {
        let mut read_loop = self.transition.lock().await;
        let _guard = TransitionGuard { link: &self.link };
        self.close_link(&mut read_loop).await;
    }

    async fn close_link(&self, read_loop: &mut Option<JoinHandle<()>>) {
        let transport = {
            let mut link = self.link.lock();
            match link.transport.take() {
                Some(transport) => {
                    link.state = ConnectionState::Closing;
                    transport
                }
                None => {
                    link.state = ConnectionState::Disconnected;
                    debug!("Not connected, nothing to close");
                    return;
                }
            }
        };

        if let Err(e) = transport.close().await {
            warn!("Error closing connection: {}", e);
        }

        if let Some(handle) = read_loop.take() {
            if let Err(e) = handle.await {
                error!("Read loop aborted: {}", e);
            }
        }

        self.link.lock().state = ConnectionState::Disconnected;
        info!("Disconnected");
    }

    /// Send raw bytes. Logged and dropped when not connected.
    pub async fn send(&self, bytes: &[u8]) {
        let transport = {
            let link = self.link.lock();
            match link.state {
                ConnectionState::Connected => link.transport.clone(),
                _ => None,
            }
        };

        let Some(transport) = transport else {
            warn!("Not connected, dropping {} byte(s)", bytes.len());
            return;
        };

        match transport.write(bytes).await {
            Ok(()) => debug!("Sent {} byte(s)", bytes.len()),
            Err(e) => error!("Send failed: {}", e),
        }
    }

    /// Send a protocol command.
    pub async fn send_command(&self, command: Command) {
        info!("Sending command {:?}", command);
        self.send(command.as_bytes()).await;
    }

    /// Register the observer for inbound chunks.
    ///
    /// Only a weak reference is kept; dropping the observer silently stops
    /// delivery.
    pub fn start_reading<O>(&self, observer: &Arc<O>)
    where
        O: DataObserver + 'static,
    {
        let observer: Arc<dyn DataObserver> = observer.clone();
        self.observer.register(Arc::downgrade(&observer));
    }

    /// Stop reading and disconnect. No end-of-stream chunk is delivered.
    pub async fn stop_reading(&self) {
        self.observer.stop();
        self.disconnect().await;
    }
}
