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

//! Delivery of inbound chunks to the registered observer.
//!
//! The read loop never calls the observer directly. It posts a job to a
//! [`DeliveryContext`], which runs jobs one at a time in the order posted.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tokio::sync::oneshot;
use tracing::{debug, error, warn};

/// Consumer of inbound data.
pub trait DataObserver: Send + Sync {
    /// Called once per delivered chunk, in read order, never concurrently.
    fn on_data_received(&self, chunk: &str);
}

impl<F> DataObserver for F
where
    F: Fn(&str) + Send + Sync,
{
    fn on_data_received(&self, chunk: &str) {
        self(chunk)
    }
}

/// Unit of work run on a delivery context.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Single-threaded execution context for observer callbacks.
///
/// Implementations must run jobs sequentially, in the order they were
/// posted.
pub trait DeliveryContext: Send + Sync {
    fn post(&self, job: Job);
}

/// Default delivery context: a FIFO queue drained by one tokio task.
///
/// The task exits after the queue is dropped and every pending job has run.
/// A panicking job is logged and does not stop later jobs.
pub struct DispatchQueue {
    tx: async_channel::Sender<Job>,
}

impl DispatchQueue {
    /// Spawn the draining task on the current runtime.
    pub fn spawn() -> Self {
        let (tx, rx) = async_channel::unbounded::<Job>();

        tokio::spawn(async move {
            while let Ok(job) = rx.recv().await {
                if catch_unwind(AssertUnwindSafe(job)).is_err() {
                    error!("Observer panicked, continuing with next chunk");
                }
            }
            debug!("Dispatch queue drained");
        });

        Self { tx }
    }

    /// Wait until every job posted so far has run.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.post(Box::new(move || {
            let _ = done_tx.send(());
        }));
        let _ = done_rx.await;
    }
}

impl DeliveryContext for DispatchQueue {
    fn post(&self, job: Job) {
        if self.tx.try_send(job).is_err() {
            warn!("Dispatch queue closed, dropping job");
        }
    }
}
