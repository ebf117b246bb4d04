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

//! Saved colour counts.
//!
//! Each save writes one JSON file named after the session, appends the name
//! to `data.txt` and bumps the counter in `index.txt`.

use anyhow::{bail, Context, Result};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::bluetooth::ColorCounts;

const NAMES_FILE: &str = "data.txt";
const INDEX_FILE: &str = "index.txt";

/// Flat-file store for colour counts.
#[derive(Debug, Clone)]
pub struct CountStore {
    dir: PathBuf,
}

impl CountStore {
    /// Create or open the store in `data_dir`.
    pub fn new(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        info!("Opening count store: {:?}", data_dir);
        Ok(Self {
            dir: data_dir.to_path_buf(),
        })
    }

    /// Save counts under `name` and record the name. Saving an existing
    /// name overwrites its counts and keeps its place in the list.
    pub fn save(&self, name: &str, counts: &ColorCounts) -> Result<()> {
        let name = validate_name(name)?;

        let content = serde_json::to_string(counts)?;
        std::fs::write(self.dir.join(name), content)?;

        if !self.list_names()?.iter().any(|saved| saved == name) {
            let mut names = OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.dir.join(NAMES_FILE))?;
            write!(names, "\n{}", name)?;
        }

        let index = self.next_index()?;
        std::fs::write(self.dir.join(INDEX_FILE), (index + 1).to_string())?;

        info!("Counts saved to {}", name);
        Ok(())
    }

    /// Load counts saved under `name`. Missing colours read as zero.
    pub fn load(&self, name: &str) -> Result<ColorCounts> {
        let name = validate_name(name)?;
        let content = std::fs::read_to_string(self.dir.join(name))
            .with_context(|| format!("no saved counts named {:?}", name))?;
        let counts = serde_json::from_str(&content)?;
        info!("Loaded counts from {}", name);
        Ok(counts)
    }

    /// Saved names, oldest first.
    pub fn list_names(&self) -> Result<Vec<String>> {
        let path = self.dir.join(NAMES_FILE);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = std::fs::read_to_string(path)?;
        Ok(content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Index to use for the next default session name. Starts at 1.
    pub fn next_index(&self) -> Result<u32> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(1);
        }

        let content = std::fs::read_to_string(path)?;
        match content.trim().parse() {
            Ok(index) => Ok(index),
            Err(e) => {
                error!("Corrupt index file: {}", e);
                Ok(1)
            }
        }
    }

    /// Rename saved counts.
    pub fn rename(&self, old: &str, new: &str) -> Result<()> {
        let old = validate_name(old)?;
        let new = validate_name(new)?;
        if old == new {
            return Ok(());
        }

        let old_path = self.dir.join(old);
        let new_path = self.dir.join(new);
        if !old_path.exists() {
            bail!("no saved counts named {:?}", old);
        }
        if new_path.exists() {
            bail!("name {:?} already taken", new);
        }

        std::fs::rename(&old_path, &new_path)?;

        let names = self
            .list_names()?
            .into_iter()
            .map(|name| if name == old { new.to_string() } else { name })
            .collect::<Vec<_>>();
        self.write_names(&names)?;

        info!("Renamed {} to {}", old, new);
        Ok(())
    }

    /// Delete saved counts and drop the name from the list.
    pub fn delete(&self, name: &str) -> Result<()> {
        let name = validate_name(name)?;

        let path = self.dir.join(name);
        if path.exists() {
            std::fs::remove_file(path)?;
        } else {
            warn!("Deleting {} with no counts file", name);
        }

        let names = self
            .list_names()?
            .into_iter()
            .filter(|n| n != name)
            .collect::<Vec<_>>();
        self.write_names(&names)?;

        info!("Deleted {}", name);
        Ok(())
    }

    fn write_names(&self, names: &[String]) -> Result<()> {
        let mut content = String::new();
        for name in names {
            content.push('\n');
            content.push_str(name);
        }
        std::fs::write(self.dir.join(NAMES_FILE), content)?;
        Ok(())
    }
}

/// Names become file names in the store directory.
fn validate_name(name: &str) -> Result<&str> {
    let name = name.trim();
    if name.is_empty() {
        bail!("name must not be empty");
    }
    if name == NAMES_FILE || name == INDEX_FILE {
        bail!("name {:?} is reserved", name);
    }
    if name.contains(['/', '\\', '\n']) || name == "." || name == ".." {
        bail!("invalid name {:?}", name);
    }
    Ok(name)
}
