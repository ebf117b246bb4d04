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

//! Configuration module.
//!
//! Loads application settings, writing defaults on first run.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::bluetooth::RFCOMM_CHANNEL;

/// Hardware address of the arm's Raspberry Pi.
pub const DEFAULT_PEER_ADDRESS: &str = "2C:CF:67:DB:D2:80";

const APP_DIR: &str = "colorlink";

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data directory for saved counts.
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// Link settings.
    pub link: LinkConfig,
}

/// What the read loop delivers when the stream ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalChunk {
    /// Only text not delivered yet.
    #[default]
    Remainder,
    /// Everything received on the connection, as older controllers did.
    History,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkConfig {
    /// Bluetooth address of the arm.
    pub peer_address: String,

    /// RFCOMM channel, opened without an SDP lookup.
    pub rfcomm_channel: u8,

    /// Size of the read buffer in bytes.
    pub read_buffer_size: usize,

    /// How long to wait for the adapter to power on.
    pub enable_timeout_secs: u64,

    pub final_chunk: FinalChunk,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            peer_address: DEFAULT_PEER_ADDRESS.to_string(),
            rfcomm_channel: RFCOMM_CHANNEL,
            read_buffer_size: 1024,
            enable_timeout_secs: 30,
            final_chunk: FinalChunk::Remainder,
        }
    }
}

impl LinkConfig {
    pub fn enable_timeout(&self) -> Duration {
        Duration::from_secs(self.enable_timeout_secs)
    }
}

impl Config {
    /// Load configuration from file or create default.
    pub fn load() -> Result<Self> {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);

        std::fs::create_dir_all(&config_dir)?;

        let config_path = config_dir.join("config.toml");

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            let config = Self::default();
            let content = toml::to_string_pretty(&config)?;
            std::fs::write(&config_path, content)?;
            config
        };

        // Set data directory
        config.data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(config)
    }
}
