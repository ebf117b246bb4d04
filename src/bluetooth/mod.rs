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

//! Bluetooth link to the arm.
//!
//! Radio control, the RFCOMM transport, and the connection session with its
//! read loop.

mod dispatch;
mod protocol;
mod radio;
mod reader;
mod session;
mod transport;

pub use dispatch::{DataObserver, DeliveryContext, DispatchQueue, Job};
pub use protocol::{CodeDecoder, ColorCode, ColorCounts, Command};
pub use radio::{wait_enabled, BluezRadio, RadioGateway};
pub use reader::ChunkDecoder;
pub use session::{ConnectionSession, ConnectionState};
pub use transport::{
    BoxedReader, BoxedWriter, Channel, RfcommFactory, Transport, TransportFactory,
    TransportReader, RFCOMM_CHANNEL, SPP_UUID,
};
