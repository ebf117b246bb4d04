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

//! Local Bluetooth radio.

use bluer::{Adapter, AdapterEvent, AdapterProperty, Session};
use futures::future::BoxFuture;
use futures::{pin_mut, StreamExt};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

use crate::error::LinkError;

/// Access to the local radio.
pub trait RadioGateway: Send + Sync {
    /// Whether a radio exists at all.
    fn is_supported(&self) -> BoxFuture<'_, bool>;

    /// Whether the radio is currently on.
    fn is_enabled(&self) -> BoxFuture<'_, bool>;

    /// Ask for the radio to be switched on.
    ///
    /// Completes later with the resulting enabled state. The sender is
    /// dropped without a value if the request could not be made.
    fn request_enable(&self) -> oneshot::Receiver<bool>;
}

/// Make sure the radio is on, requesting enablement if needed.
pub async fn wait_enabled(radio: &dyn RadioGateway, timeout: Duration) -> Result<(), LinkError> {
    if !radio.is_supported().await {
        error!("Bluetooth is not supported on this system");
        return Err(LinkError::RadioUnavailable);
    }

    if radio.is_enabled().await {
        return Ok(());
    }

    info!("Enabling Bluetooth...");
    match tokio::time::timeout(timeout, radio.request_enable()).await {
        Ok(Ok(true)) => {
            info!("Bluetooth activated");
            Ok(())
        }
        Ok(Ok(false)) | Ok(Err(_)) => {
            warn!("Bluetooth was not enabled");
            Err(LinkError::RadioUnavailable)
        }
        Err(_) => {
            warn!("Timed out after {:?} waiting for Bluetooth", timeout);
            Err(LinkError::RadioUnavailable)
        }
    }
}

/// Radio backed by the BlueZ default adapter.
pub struct BluezRadio {
    _session: Option<Session>,
    adapter: Option<Adapter>,
}

impl BluezRadio {
    /// Connect to BlueZ. A missing daemon or adapter leaves the radio
    /// unsupported rather than failing.
    pub async fn new() -> Self {
        let session = match Session::new().await {
            Ok(session) => session,
            Err(e) => {
                warn!("BlueZ session unavailable: {}", e);
                return Self {
                    _session: None,
                    adapter: None,
                };
            }
        };

        let adapter = match session.default_adapter().await {
            Ok(adapter) => {
                info!("Using Bluetooth adapter: {}", adapter.name());
                Some(adapter)
            }
            Err(e) => {
                warn!("No Bluetooth adapter: {}", e);
                None
            }
        };

        Self {
            _session: Some(session),
            adapter,
        }
    }

    async fn power_on(adapter: Adapter) -> bluer::Result<bool> {
        let events = adapter.events().await?;
        pin_mut!(events);

        adapter.set_powered(true).await?;
        if adapter.is_powered().await? {
            return Ok(true);
        }

        while let Some(event) = events.next().await {
            if let AdapterEvent::PropertyChanged(AdapterProperty::Powered(powered)) = event {
                return Ok(powered);
            }
        }

        Ok(false)
    }
}

impl RadioGateway for BluezRadio {
    fn is_supported(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.adapter.is_some() })
    }

    fn is_enabled(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            match &self.adapter {
                Some(adapter) => adapter.is_powered().await.unwrap_or(false),
                None => false,
            }
        })
    }

    fn request_enable(&self) -> oneshot::Receiver<bool> {
        let (tx, rx) = oneshot::channel();

        let Some(adapter) = self.adapter.clone() else {
            let _ = tx.send(false);
            return rx;
        };

        tokio::spawn(async move {
            match Self::power_on(adapter).await {
                Ok(powered) => {
                    let _ = tx.send(powered);
                }
                Err(e) => error!("Failed to power on adapter: {}", e),
            }
        });

        rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Radio whose enable request resolves according to `grant`.
    struct FakeRadio {
        supported: bool,
        enabled: AtomicBool,
        grant: Option<bool>,
        requests: AtomicUsize,
        held: Mutex<Option<oneshot::Sender<bool>>>,
    }

    impl FakeRadio {
        fn new(supported: bool, enabled: bool, grant: Option<bool>) -> Self {
            Self {
                supported,
                enabled: AtomicBool::new(enabled),
                grant,
                requests: AtomicUsize::new(0),
                held: Mutex::new(None),
            }
        }
    }

    impl RadioGateway for FakeRadio {
        fn is_supported(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move { self.supported })
        }

        fn is_enabled(&self) -> BoxFuture<'_, bool> {
            Box::pin(async move { self.enabled.load(Ordering::SeqCst) })
        }

        fn request_enable(&self) -> oneshot::Receiver<bool> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            match self.grant {
                Some(granted) => {
                    self.enabled.store(granted, Ordering::SeqCst);
                    let _ = tx.send(granted);
                }
                // Never answer
                None => *self.held.lock() = Some(tx),
            }
            rx
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_unsupported_radio() {
        let radio = FakeRadio::new(false, false, Some(true));
        let result = wait_enabled(&radio, TIMEOUT).await;
        assert!(matches!(result, Err(LinkError::RadioUnavailable)));
        assert_eq!(radio.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_already_enabled_skips_request() {
        let radio = FakeRadio::new(true, true, None);
        wait_enabled(&radio, TIMEOUT).await.unwrap();
        assert_eq!(radio.requests.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_enable_granted() {
        let radio = FakeRadio::new(true, false, Some(true));
        wait_enabled(&radio, TIMEOUT).await.unwrap();
        assert!(radio.is_enabled().await);
    }

    #[tokio::test]
    async fn test_enable_refused() {
        let radio = FakeRadio::new(true, false, Some(false));
        let result = wait_enabled(&radio, TIMEOUT).await;
        assert!(matches!(result, Err(LinkError::RadioUnavailable)));
    }

    #[tokio::test]
    async fn test_enable_times_out() {
        let radio = FakeRadio::new(true, false, None);
        let result = wait_enabled(&radio, TIMEOUT).await;
        assert!(matches!(result, Err(LinkError::RadioUnavailable)));
        assert_eq!(radio.requests.load(Ordering::SeqCst), 1);
    }
}
