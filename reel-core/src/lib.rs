//! # Reel Core
//!
//! Streaming decoder for interleaved audio/video movie containers: the
//! DOS-era VID format and 3DO FILM/CTRL stream files.
//!
//! A [`MovieDecoder`] reads forward through a single seekable stream,
//! decoding one video frame per call while keeping the host's audio sink
//! fed ahead of the presentation clock.

// ============================================================================
// Container Layer
// ============================================================================
pub mod container;
pub mod header;
pub mod index;
mod reader;

// ============================================================================
// Tracks / Codecs
// ============================================================================
pub mod adpcm;
pub mod audio;
pub mod video;

// ============================================================================
// Driver
// ============================================================================
pub mod config;
pub mod demux;
pub mod error;

#[cfg(test)]
pub(crate) mod testutil;

// ============================================================================
// Re-exports
// ============================================================================
pub use audio::{AudioCodec, AudioSink, MemoryAudioSink, NullAudioSink, SampleFormat, SharedAudioSink};
pub use config::DecoderConfig;
pub use container::{ContainerFormat, FourCc};
pub use demux::{movie_probe, DecoderState, DemuxCursor, MovieDecoder, MovieInfo, UnitResult};
pub use error::{CodecError, FormatError, MovieError, MovieResult};
pub use video::{FrameView, Palette, PixelFormat};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
