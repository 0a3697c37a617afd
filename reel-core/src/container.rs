// CONTAINER LAYER - chunk kinds and chunk headers for both movie families
//
// VID:  little-endian, single-byte chunk kinds, no chunk sizes.
// FILM: 3DO stream files, big-endian FourCC chunks with explicit sizes.

pub mod film;
pub mod vid;

use std::fmt;
use std::io::{Read, Seek};

use serde::{Serialize, Serializer};

use crate::error::MovieResult;

// ============================================================================
// FourCC
// ============================================================================

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FourCc(pub [u8; 4]);

impl FourCc {
    pub const fn new(tag: &[u8; 4]) -> Self {
        Self(*tag)
    }

    pub fn as_u32(self) -> u32 {
        u32::from_be_bytes(self.0)
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &b in &self.0 {
            if b.is_ascii_graphic() || b == b' ' {
                write!(f, "{}", b as char)?;
            } else {
                write!(f, "\\x{:02x}", b)?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc(\"{}\")", self)
    }
}

impl Serialize for FourCc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// Chunk kinds
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ContainerFormat {
    Vid,
    Film,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ChunkKind {
    // VID
    FullFrame,
    FullFrameRle,
    FullFrameFill,
    PartialFrameRle,
    Palette,
    AudioFirst,
    Audio,
    // FILM
    FilmFrame,
    SoundHeader,
    SoundSamples,
    Control,
    EndOfStream,
}

/// Which track a chunk kind belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
    Neither,
    End,
}

impl ChunkKind {
    pub fn track(self) -> TrackKind {
        match self {
            ChunkKind::FullFrame
            | ChunkKind::FullFrameRle
            | ChunkKind::FullFrameFill
            | ChunkKind::PartialFrameRle
            | ChunkKind::Palette
            | ChunkKind::FilmFrame => TrackKind::Video,
            ChunkKind::AudioFirst | ChunkKind::Audio | ChunkKind::SoundHeader | ChunkKind::SoundSamples => {
                TrackKind::Audio
            }
            ChunkKind::Control => TrackKind::Neither,
            ChunkKind::EndOfStream => TrackKind::End,
        }
    }

    /// True for video chunks that produce a picture (everything but palettes).
    pub fn is_frame(self) -> bool {
        self.track() == TrackKind::Video && self != ChunkKind::Palette
    }
}

/// A chunk header as read from the stream. `offset` is the position of the
/// first header byte; `body_len` is known only for sized (FILM) chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub kind: ChunkKind,
    pub offset: u64,
    pub body_len: Option<u64>,
    pub time: u32,
}

impl ChunkHeader {
    pub(crate) fn end_of_stream(offset: u64) -> Self {
        Self {
            kind: ChunkKind::EndOfStream,
            offset,
            body_len: None,
            time: 0,
        }
    }
}

/// Read the chunk header at the current stream position, which the caller
/// guarantees is `offset`. Leaves the stream at the start of the chunk body.
pub(crate) fn read_chunk_header<R: Read + Seek>(
    format: ContainerFormat,
    reader: &mut R,
    offset: u64,
) -> MovieResult<ChunkHeader> {
    match format {
        ContainerFormat::Vid => vid::read_chunk_header(reader, offset),
        ContainerFormat::Film => film::read_chunk_header(reader, offset),
    }
}
