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

//! ColorLink controller

use anyhow::Result;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use colorlink::bluetooth::{
    wait_enabled, BluezRadio, Command, ConnectionSession, DispatchQueue, RfcommFactory,
};
use colorlink::config::Config;
use colorlink::state::LiveTally;
use colorlink::storage::CountStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("colorlink=info".parse()?),
        )
        .init();

    info!("Starting ColorLink v{}...", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded");

    let store = CountStore::new(&config.data_dir)?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        None | Some("run") => run(config, store, args.get(1).cloned()).await,
        Some("list") => {
            for name in store.list_names()? {
                println!("{}", name);
            }
            Ok(())
        }
        Some("show") => {
            let Some(name) = args.get(1) else {
                anyhow::bail!("usage: colorlink show <name>");
            };
            let counts = store.load(name)?;
            println!("{} (total {})", counts, counts.total());
            Ok(())
        }
        Some("rename") => match (args.get(1), args.get(2)) {
            (Some(old), Some(new)) => store.rename(old, new),
            _ => anyhow::bail!("usage: colorlink rename <old> <new>"),
        },
        Some("delete") => {
            let Some(name) = args.get(1) else {
                anyhow::bail!("usage: colorlink delete <name>");
            };
            store.delete(name)
        }
        Some(other) => {
            anyhow::bail!(
                "unknown command {:?}; usage: colorlink [run [name]|list|show|rename|delete]",
                other
            )
        }
    }
}

/// Stream colour codes until Ctrl-C, then save the tally. A name that is
/// already saved continues from its counts.
async fn run(config: Config, store: CountStore, name: Option<String>) -> Result<()> {
    let radio = BluezRadio::new().await;
    wait_enabled(&radio, config.link.enable_timeout()).await?;

    let delivery = Arc::new(DispatchQueue::spawn());
    let session = ConnectionSession::new(
        config.link.clone(),
        Arc::new(RfcommFactory::new()),
        delivery.clone(),
    );

    // Continue a saved tally when its name is given again
    let tally = match &name {
        Some(name) if store.list_names()?.contains(name) => {
            LiveTally::resume(store.load(name)?)
        }
        _ => LiveTally::new(),
    };
    session.start_reading(&tally);

    info!("Looking for device {}...", config.link.peer_address);
    if let Err(e) = session.connect_default().await {
        error!("Could not reach the arm: {}", e);
        return Err(e.into());
    }

    session.send_command(Command::StartStreaming).await;
    info!("Ready. Press Ctrl-C to stop.");

    let mut updates = tally.subscribe();
    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let counts = *updates.borrow_and_update();
                println!("{} (total {})", counts, counts.total());
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    session.send_command(Command::StopStreaming).await;
    session.stop_reading().await;
    delivery.flush().await;
    tally.flush();

    let name = match name {
        Some(name) => name,
        None => format!(
            "Session {} ({})",
            store.next_index()?,
            chrono::Local::now().format("%Y-%m-%d %H.%M")
        ),
    };
    let counts = tally.counts();
    store.save(&name, &counts)?;
    info!("Saved {} as {:?}", counts, name);

    info!("ColorLink stopped");
    Ok(())
}
