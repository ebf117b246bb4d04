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

//! Live colour tally fed by the link.

use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::bluetooth::{CodeDecoder, ColorCode, ColorCounts, DataObserver};

/// Shared tally of colour codes received from the arm.
#[derive(Debug)]
pub struct LiveTally {
    /// Partially received code, carried between chunks.
    decoder: Mutex<CodeDecoder>,

    /// Current counts.
    counts: RwLock<ColorCounts>,

    /// Publishes every change.
    updates: watch::Sender<ColorCounts>,
}

impl Default for LiveTally {
    fn default() -> Self {
        let (updates, _) = watch::channel(ColorCounts::default());
        Self {
            decoder: Mutex::new(CodeDecoder::new()),
            counts: RwLock::new(ColorCounts::default()),
            updates,
        }
    }
}

impl LiveTally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Start from previously saved counts.
    pub fn resume(counts: ColorCounts) -> Arc<Self> {
        info!("Resuming tally at {} item(s)", counts.total());
        let tally = Self::default();
        *tally.counts.write() = counts;
        tally.updates.send_replace(counts);
        Arc::new(tally)
    }

    pub fn counts(&self) -> ColorCounts {
        *self.counts.read()
    }

    /// Receiver notified on every change.
    pub fn subscribe(&self) -> watch::Receiver<ColorCounts> {
        self.updates.subscribe()
    }

    /// Count a code left buffered when the stream ended.
    pub fn flush(&self) {
        let code = self.decoder.lock().finish();
        if let Some(code) = code {
            self.apply(&[code]);
        }
    }

    fn apply(&self, codes: &[ColorCode]) {
        if codes.is_empty() {
            return;
        }

        let snapshot = {
            let mut counts = self.counts.write();
            for code in codes {
                debug!("Color received: {}", code.label());
                counts.record(*code);
            }
            *counts
        };
        self.updates.send_replace(snapshot);
    }
}

impl DataObserver for LiveTally {
    fn on_data_received(&self, chunk: &str) {
        let codes = self.decoder.lock().feed(chunk);
        self.apply(&codes);
    }
}
