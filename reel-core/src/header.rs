//! Container header parsing.
//!
//! Reads the fixed prologue, picks the container family from its magic and
//! returns the parameters needed to build the tracks. Touches nothing else.

use std::io::{self, Read, Seek};

use serde::Serialize;

use crate::container::{film, vid, ContainerFormat, FourCc};
use crate::error::{FormatError, MovieError, MovieResult};
use crate::reader::read_fourcc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StreamParams {
    pub format: ContainerFormat,
    pub width: u32,
    pub height: u32,
    /// Ticks between regular frames (VID only).
    pub regular_frame_delay: u16,
    /// Video codec tag (FILM only).
    pub video_codec: Option<FourCc>,
    /// Declared frame count (FILM only).
    pub frame_count: Option<u32>,
    /// Byte offset of the first chunk after the prologue.
    pub first_chunk_offset: u64,
}

/// Largest frame accepted from a header, in pixels.
pub const MAX_FRAME_PIXELS: u64 = 4096 * 4096;

impl StreamParams {
    pub fn ticks_to_ms(&self, ticks: u64) -> u64 {
        match self.format {
            ContainerFormat::Vid => vid::ticks_to_ms(ticks),
            ContainerFormat::Film => film::ticks_to_ms(ticks),
        }
    }

    pub fn frame_pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// Reject empty frames and frames too large to buffer.
pub(crate) fn check_dimensions(width: u32, height: u32) -> MovieResult<()> {
    let pixels = (width as u64).checked_mul(height as u64);
    match pixels {
        Some(p) if p > 0 && p <= MAX_FRAME_PIXELS => Ok(()),
        _ => Err(FormatError::BadDimensions { width, height }.into()),
    }
}

/// Parse the prologue at the current stream position.
pub fn parse_header<R: Read + Seek>(reader: &mut R) -> MovieResult<StreamParams> {
    let magic = read_fourcc(reader).map_err(|e: io::Error| MovieError::from_read(e, "magic"))?;

    match magic {
        vid::MAGIC => vid::parse_prologue(reader),
        film::MAGIC => film::parse_prologue(reader),
        found => Err(FormatError::BadMagic {
            expected: "VID\\0 or FILM",
            found,
        }
        .into()),
    }
}
