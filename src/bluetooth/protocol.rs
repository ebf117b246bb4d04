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

//! Application protocol spoken with the arm.
//!
//! The controller sends single ASCII digits. The arm answers with a stream
//! of colour codes as ASCII integers separated by whitespace. Chunk
//! boundaries carry no meaning.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Commands sent to the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Start sorting and streaming colour codes.
    StartStreaming,
    /// Stop streaming.
    StopStreaming,
}

impl Command {
    /// Convert to wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StartStreaming => "1",
            Self::StopStreaming => "0",
        }
    }

    pub fn as_bytes(&self) -> &'static [u8] {
        self.as_str().as_bytes()
    }
}

/// Colour reported by the arm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorCode {
    Red,
    /// Shown as green on screen; stored under `pink`.
    Pink,
    Blue,
    Yellow,
}

impl ColorCode {
    /// Parse from the numeric wire code.
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Red),
            1 => Some(Self::Pink),
            2 => Some(Self::Blue),
            3 => Some(Self::Yellow),
            _ => None,
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            Self::Red => 0,
            Self::Pink => 1,
            Self::Blue => 2,
            Self::Yellow => 3,
        }
    }

    /// Label shown to the user.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Red => "Red",
            Self::Pink => "Green",
            Self::Blue => "Blue",
            Self::Yellow => "Yellow",
        }
    }
}

/// Reassembles colour codes from arbitrarily split chunks.
///
/// A token is complete once whitespace follows it; a trailing token stays
/// buffered until more text or [`CodeDecoder::finish`].
#[derive(Debug, Default)]
pub struct CodeDecoder {
    partial: String,
}

impl CodeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, returning every code completed by it.
    pub fn feed(&mut self, chunk: &str) -> Vec<ColorCode> {
        let mut codes = Vec::new();

        for ch in chunk.chars() {
            if ch.is_whitespace() {
                if let Some(code) = self.take_token() {
                    codes.push(code);
                }
            } else {
                self.partial.push(ch);
            }
        }

        codes
    }

    /// Parse whatever token is still buffered.
    pub fn finish(&mut self) -> Option<ColorCode> {
        self.take_token()
    }

    fn take_token(&mut self) -> Option<ColorCode> {
        if self.partial.is_empty() {
            return None;
        }

        let token = std::mem::take(&mut self.partial);
        match token.parse::<u32>().ok().and_then(ColorCode::from_code) {
            Some(code) => Some(code),
            None => {
                warn!("Unknown color code: {:?}", token);
                None
            }
        }
    }
}

/// Per-colour counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorCounts {
    pub red: u32,
    pub blue: u32,
    pub yellow: u32,
    pub pink: u32,
}

impl ColorCounts {
    pub fn record(&mut self, code: ColorCode) {
        let counter = match code {
            ColorCode::Red => &mut self.red,
            ColorCode::Pink => &mut self.pink,
            ColorCode::Blue => &mut self.blue,
            ColorCode::Yellow => &mut self.yellow,
        };
        *counter = counter.saturating_add(1);
    }

    pub fn get(&self, code: ColorCode) -> u32 {
        match code {
            ColorCode::Red => self.red,
            ColorCode::Pink => self.pink,
            ColorCode::Blue => self.blue,
            ColorCode::Yellow => self.yellow,
        }
    }

    pub fn total(&self) -> u32 {
        self.red
            .saturating_add(self.blue)
            .saturating_add(self.yellow)
            .saturating_add(self.pink)
    }
}

impl std::fmt::Display for ColorCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}, {}: {}, {}: {}, {}: {}",
            ColorCode::Red.label(),
            self.red,
            ColorCode::Pink.label(),
            self.pink,
            ColorCode::Blue.label(),
            self.blue,
            ColorCode::Yellow.label(),
            self.yellow
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_bytes() {
        assert_eq!(Command::StartStreaming.as_bytes(), b"1");
        assert_eq!(Command::StopStreaming.as_bytes(), b"0");
    }

    #[test]
    fn test_color_codes() {
        for code in 0..4 {
            assert_eq!(ColorCode::from_code(code).unwrap().code(), code);
        }
        assert_eq!(ColorCode::from_code(4), None);
        assert_eq!(ColorCode::Pink.label(), "Green");
    }

    #[test]
    fn test_decoder_one_code_per_chunk() {
        let mut decoder = CodeDecoder::new();
        assert_eq!(decoder.feed("2\n"), vec![ColorCode::Blue]);
        assert_eq!(decoder.feed("3\n"), vec![ColorCode::Yellow]);
    }

    #[test]
    fn test_decoder_split_across_chunks() {
        let mut decoder = CodeDecoder::new();
        assert!(decoder.feed("1").is_empty());
        assert_eq!(decoder.feed("\n0\n2"), vec![ColorCode::Pink, ColorCode::Red]);
        assert_eq!(decoder.finish(), Some(ColorCode::Blue));
        assert_eq!(decoder.finish(), None);
    }

    #[test]
    fn test_decoder_skips_unknown_tokens() {
        let mut decoder = CodeDecoder::new();
        assert_eq!(decoder.feed("7\nx\r\n3 "), vec![ColorCode::Yellow]);
    }

    #[test]
    fn test_counts() {
        let mut counts = ColorCounts::default();
        counts.record(ColorCode::Red);
        counts.record(ColorCode::Red);
        counts.record(ColorCode::Yellow);

        assert_eq!(counts.get(ColorCode::Red), 2);
        assert_eq!(counts.yellow, 1);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.to_string(), "Red: 2, Green: 0, Blue: 0, Yellow: 1");
    }

    #[test]
    fn test_total_saturates() {
        let counts = ColorCounts {
            red: u32::MAX,
            blue: 1,
            yellow: 0,
            pink: 0,
        };
        assert_eq!(counts.total(), u32::MAX);
    }

    #[test]
    fn test_counts_json_keys() {
        let counts: ColorCounts = serde_json::from_str(r#"{"red": 4, "pink": 1}"#).unwrap();
        assert_eq!(counts.red, 4);
        assert_eq!(counts.pink, 1);
        assert_eq!(counts.blue, 0);
    }
}
