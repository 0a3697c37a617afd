//! Decoder tuning knobs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// How far ahead of the presentation clock audio is buffered (ms)
    pub audio_lookahead_ms: u64,
    /// Chunks scanned at open time while looking for the audio header
    pub probe_chunk_limit: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            audio_lookahead_ms: 500,
            probe_chunk_limit: 10,
        }
    }
}
