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

//! Read loop draining a transport into the observer.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::dispatch::{DataObserver, DeliveryContext};
use super::transport::TransportReader;
use crate::config::FinalChunk;
use crate::error::LinkError;

/// Observer registration shared between a session and its read loop.
pub(crate) struct ObserverSlot {
    observer: RwLock<Option<Weak<dyn DataObserver>>>,
    /// Cleared by `stop_reading` so the end-of-stream chunk is skipped.
    deliver_final: AtomicBool,
}

impl ObserverSlot {
    pub(crate) fn new() -> Self {
        Self {
            observer: RwLock::new(None),
            deliver_final: AtomicBool::new(false),
        }
    }

    pub(crate) fn register(&self, observer: Weak<dyn DataObserver>) {
        *self.observer.write() = Some(observer);
        self.deliver_final.store(true, Ordering::SeqCst);
    }

    pub(crate) fn stop(&self) {
        self.deliver_final.store(false, Ordering::SeqCst);
    }

    fn current(&self) -> Option<Arc<dyn DataObserver>> {
        self.observer.read().as_ref().and_then(Weak::upgrade)
    }

    fn wants_final(&self) -> bool {
        self.deliver_final.load(Ordering::SeqCst) && self.current().is_some()
    }
}

/// Incremental UTF-8 decoder.
///
/// A code point split across reads is held back until the rest arrives.
/// Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
pub struct ChunkDecoder {
    pending: Vec<u8>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `bytes`, returning all text that is complete so far.
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);
        let mut text = String::new();

        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    break;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));

                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + len);
                        }
                        None => {
                            // Incomplete sequence at the end: wait for more bytes.
                            self.pending.drain(..valid_up_to);
                            break;
                        }
                    }
                }
            }
        }

        text
    }

    /// Flush whatever is held back.
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Background reader bound to one transport.
pub(crate) struct ReadLoop {
    reader: TransportReader,
    observer: Arc<ObserverSlot>,
    delivery: Arc<dyn DeliveryContext>,
    buffer_size: usize,
    final_chunk: FinalChunk,
}

impl ReadLoop {
    pub(crate) fn new(
        reader: TransportReader,
        observer: Arc<ObserverSlot>,
        delivery: Arc<dyn DeliveryContext>,
        buffer_size: usize,
        final_chunk: FinalChunk,
    ) -> Self {
        Self {
            reader,
            observer,
            delivery,
            buffer_size: buffer_size.max(1),
            final_chunk,
        }
    }

    pub(crate) fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    async fn run(mut self) {
        info!("Read loop started");

        let mut buffer = vec![0u8; self.buffer_size];
        let mut decoder = ChunkDecoder::new();
        let mut history = String::new();

        loop {
            match self.reader.read(&mut buffer).await {
                Ok(0) => {
                    info!("Stream ended");
                    let remainder = decoder.finish();
                    let last = match self.final_chunk {
                        FinalChunk::Remainder => remainder,
                        FinalChunk::History => {
                            history.push_str(&remainder);
                            history
                        }
                    };
                    if self.observer.wants_final() {
                        debug!("Delivering final chunk: {} bytes", last.len());
                        self.deliver(last);
                    }
                    break;
                }
                Ok(n) => {
                    let chunk = decoder.decode(&buffer[..n]);
                    debug!("Received {} bytes: {:?}", n, chunk);

                    if self.final_chunk == FinalChunk::History {
                        history.push_str(&chunk);
                    }
                    if !chunk.is_empty() {
                        self.deliver(chunk);
                    }
                }
                Err(e) => {
                    error!("{}", LinkError::ReadFailure(e));
                    break;
                }
            }
        }

        info!("Read loop stopped");
    }

    fn deliver(&self, chunk: String) {
        let observer = self.observer.clone();
        self.delivery.post(Box::new(move || match observer.current() {
            Some(observer) => observer.on_data_received(&chunk),
            None => debug!("No observer registered, dropping {} bytes", chunk.len()),
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_ascii() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(b"2\n"), "2\n");
        assert_eq!(decoder.decode(b"3\n"), "3\n");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_split_code_point() {
        let mut decoder = ChunkDecoder::new();
        let bytes = "é".as_bytes();

        assert_eq!(decoder.decode(&bytes[..1]), "");
        assert!(decoder.has_pending());
        assert_eq!(decoder.decode(&bytes[1..]), "é");
        assert!(!decoder.has_pending());
    }

    #[test]
    fn test_decode_invalid_byte() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'1', 0xFF, b'2']), "1\u{FFFD}2");
    }

    #[test]
    fn test_finish_flushes_incomplete_sequence() {
        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.decode(&[b'3', 0xC3]), "3");
        assert_eq!(decoder.finish(), "\u{FFFD}");
        assert_eq!(decoder.finish(), "");
    }

    #[test]
    fn test_observer_slot_is_weak() {
        let slot = ObserverSlot::new();
        let observer: Arc<dyn DataObserver> = Arc::new(|_: &str| {});

        slot.register(Arc::downgrade(&observer));
        assert!(slot.wants_final());

        drop(observer);
        assert!(slot.current().is_none());
        assert!(!slot.wants_final());
    }

    #[test]
    fn test_stop_clears_final_flag() {
        let slot = ObserverSlot::new();
        let observer: Arc<dyn DataObserver> = Arc::new(|_: &str| {});

        slot.register(Arc::downgrade(&observer));
        slot.stop();
        assert!(!slot.wants_final());
    }
}
