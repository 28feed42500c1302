//! Session keys and output modes
//!
//! A session key names one published stream. Keys double as directory names
//! under the segment base path, so they are restricted to a path-safe
//! alphabet.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use super::error::RegistryError;

/// Longest accepted session key
pub const MAX_KEY_LEN: usize = 128;

/// Suffix clients append to the live subscribe URL
const LIVE_SUFFIX: &str = ".ts";

/// Caller-chosen identifier for a published session
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Validate and wrap a raw key
    pub fn parse(raw: &str) -> Result<Self, RegistryError> {
        let valid = !raw.is_empty()
            && raw.len() <= MAX_KEY_LEN
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');

        if valid {
            Ok(Self(raw.to_string()))
        } else {
            Err(RegistryError::InvalidKey(raw.to_string()))
        }
    }

    /// Parse a key from a live subscribe path segment, dropping a `.ts` suffix
    pub fn from_stream_name(name: &str) -> Result<Self, RegistryError> {
        Self::parse(name.strip_suffix(LIVE_SUFFIX).unwrap_or(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for SessionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// How a room's worker delivers its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputMode {
    /// Worker writes one multiplexed stream to stdout, fanned out live
    LiveStream,
    /// Worker writes a manifest plus segment files under the base path
    SegmentedFile,
}

impl OutputMode {
    pub fn is_live(self) -> bool {
        self == OutputMode::LiveStream
    }
}

impl Default for OutputMode {
    fn default() -> Self {
        OutputMode::LiveStream
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::LiveStream => f.write_str("live-stream"),
            OutputMode::SegmentedFile => f.write_str("segmented-file"),
        }
    }
}

impl FromStr for OutputMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "live" | "live-stream" | "ts" | "mpegts" => Ok(OutputMode::LiveStream),
            "segmented" | "segmented-file" | "hls" => Ok(OutputMode::SegmentedFile),
            other => Err(format!("unknown output mode: {other}")),
        }
    }
}
