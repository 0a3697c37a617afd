//! # Video Track
//!
//! Owns the single-buffered 8-bit indexed frame and its palette, and turns
//! video chunk bodies into updates of both.
//!
//! ## VID run-length schemes
//!
//! Each control byte describes one run of `control & 0x7F` pixels:
//!
//! | scheme         | high bit set                  | high bit clear       | `0x00`           |
//! |----------------|-------------------------------|----------------------|------------------|
//! | skip/literal   | skip run, pixels left as-is   | literal bytes follow | early terminator |
//! | fill/literal   | one fill byte follows         | literal bytes follow | empty literal    |
//!
//! A run longer than the pixels left in the budget is a fatal corruption.

use std::io::{self, Read, Seek};

use serde::Serialize;

use crate::container::{ChunkHeader, ChunkKind};
use crate::error::{CodecError, MovieError, MovieResult};
use crate::header::{check_dimensions, StreamParams};
use crate::reader::{read_u16_le, read_u8, skip};

pub const PALETTE_COLORS: usize = 256;
pub const PALETTE_BYTES: usize = PALETTE_COLORS * 3;

pub type Palette = [u8; PALETTE_BYTES];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    /// One byte per pixel, indexing the 256-entry RGB palette.
    Indexed8,
}

/// Borrowed view of the current frame, valid between decode calls.
#[derive(Debug, Clone, Copy)]
pub struct FrameView<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RleScheme {
    SkipLiteral,
    FillLiteral,
}

pub struct VideoTrack {
    params: StreamParams,
    cur_frame: i32,
    next_frame_start_ms: u64,
    frame: Vec<u8>,
    palette: Palette,
    palette_dirty: bool,
    end_of_track: bool,
}

impl VideoTrack {
    /// Allocate the frame buffer for `params`. Fails instead of aborting
    /// when the dimensions are out of range or the allocation is refused.
    pub fn new(params: StreamParams) -> MovieResult<Self> {
        check_dimensions(params.width, params.height)?;
        let pixels = params.frame_pixels();
        let mut frame = Vec::new();
        frame.try_reserve_exact(pixels)?;
        frame.resize(pixels, 0);

        Ok(Self {
            params,
            cur_frame: -1,
            next_frame_start_ms: 0,
            frame,
            palette: [0; PALETTE_BYTES],
            palette_dirty: false,
            end_of_track: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    /// Index of the last decoded frame, -1 before the first one.
    pub fn cur_frame_index(&self) -> i32 {
        self.cur_frame
    }

    pub fn next_frame_start_ms(&self) -> u64 {
        self.next_frame_start_ms
    }

    pub fn end_of_track(&self) -> bool {
        self.end_of_track
    }

    pub(crate) fn mark_end_of_track(&mut self) {
        self.end_of_track = true;
    }

    pub fn frame(&self) -> FrameView<'_> {
        FrameView {
            data: &self.frame,
            width: self.params.width,
            height: self.params.height,
            format: PixelFormat::Indexed8,
        }
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn is_palette_dirty(&self) -> bool {
        self.palette_dirty
    }

    /// Return the palette if it changed since the last call, clearing the flag.
    pub fn take_dirty_palette(&mut self) -> Option<Palette> {
        if !self.palette_dirty {
            return None;
        }
        self.palette_dirty = false;
        Some(self.palette)
    }

    // ------------------------------------------------------------------------
    // Decode
    // ------------------------------------------------------------------------

    /// Decode a frame chunk body into the frame buffer. The stream must be
    /// positioned just past `header`.
    pub(crate) fn decode_frame<R: Read + Seek>(&mut self, reader: &mut R, header: &ChunkHeader) -> MovieResult<()> {
        if header.kind == ChunkKind::FilmFrame {
            return self.decode_film_frame(reader, header);
        }

        let additional_delay = read_u16_le(reader).map_err(frame_read)?;
        let next_ms = self.params.ticks_to_ms(self.params.regular_frame_delay as u64 * (self.cur_frame + 1) as u64)
            + self.params.ticks_to_ms(additional_delay as u64);
        self.check_schedule(next_ms)?;

        match header.kind {
            ChunkKind::FullFrame => {
                reader.read_exact(&mut self.frame).map_err(frame_read)?;
            }
            ChunkKind::FullFrameRle => {
                walk_rle(reader, RleScheme::SkipLiteral, self.frame.len(), Some(&mut self.frame[..]))?;
            }
            ChunkKind::FullFrameFill => {
                walk_rle(reader, RleScheme::FillLiteral, self.frame.len(), Some(&mut self.frame[..]))?;
            }
            ChunkKind::PartialFrameRle => {
                let start = self.read_start_row(reader)?;
                let dest = &mut self.frame[start..];
                walk_rle(reader, RleScheme::SkipLiteral, dest.len(), Some(dest))?;
            }
            other => unreachable!("{:?} is not a VID frame chunk", other),
        }

        self.commit_frame(next_ms);
        Ok(())
    }

    fn decode_film_frame<R: Read>(&mut self, reader: &mut R, header: &ChunkHeader) -> MovieResult<()> {
        let next_ms = self.params.ticks_to_ms(header.time as u64);
        self.check_schedule(next_ms)?;

        let body_len = header.body_len.unwrap_or(0) as usize;
        if body_len != self.frame.len() {
            return Err(CodecError::FrameSize {
                expected: self.frame.len(),
                actual: body_len,
            }
            .into());
        }
        reader.read_exact(&mut self.frame).map_err(frame_read)?;

        self.commit_frame(next_ms);
        Ok(())
    }

    pub(crate) fn decode_palette<R: Read>(&mut self, reader: &mut R) -> MovieResult<()> {
        let mut raw = [0u8; PALETTE_BYTES];
        reader
            .read_exact(&mut raw)
            .map_err(|e| MovieError::from_read(e, "palette"))?;
        for (dst, &src) in self.palette.iter_mut().zip(raw.iter()) {
            *dst = expand_6bit(src);
        }
        self.palette_dirty = true;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Skip
    // ------------------------------------------------------------------------

    /// Consume a frame chunk body without touching the frame buffer.
    pub(crate) fn skip_frame<R: Read + Seek>(&self, reader: &mut R, header: &ChunkHeader) -> MovieResult<()> {
        let pixels = self.frame.len();
        match header.kind {
            ChunkKind::FilmFrame => skip(reader, header.body_len.unwrap_or(0)).map_err(frame_read)?,
            ChunkKind::FullFrame => skip(reader, 2 + pixels as u64).map_err(frame_read)?,
            ChunkKind::FullFrameRle => {
                skip(reader, 2).map_err(frame_read)?;
                walk_rle(reader, RleScheme::SkipLiteral, pixels, None)?;
            }
            ChunkKind::FullFrameFill => {
                skip(reader, 2).map_err(frame_read)?;
                walk_rle(reader, RleScheme::FillLiteral, pixels, None)?;
            }
            ChunkKind::PartialFrameRle => {
                skip(reader, 2).map_err(frame_read)?;
                let start = self.read_start_row(reader)?;
                walk_rle(reader, RleScheme::SkipLiteral, pixels - start, None)?;
            }
            other => unreachable!("{:?} is not a frame chunk", other),
        }
        Ok(())
    }

    pub(crate) fn skip_palette<R: Seek>(reader: &mut R) -> MovieResult<()> {
        skip(reader, PALETTE_BYTES as u64).map_err(|e| MovieError::from_read(e, "palette"))
    }

    // ------------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------------

    /// Read a partial frame's start row and return its pixel offset.
    fn read_start_row<R: Read>(&self, reader: &mut R) -> MovieResult<usize> {
        let row = read_u16_le(reader).map_err(frame_read)?;
        if row as u32 >= self.params.height {
            return Err(CodecError::StartRowOutOfRange {
                row,
                height: self.params.height,
            }
            .into());
        }
        Ok(row as usize * self.params.width as usize)
    }

    fn check_schedule(&self, next_ms: u64) -> MovieResult<()> {
        if next_ms < self.next_frame_start_ms {
            return Err(CodecError::NonMonotonicTimestamp {
                previous_ms: self.next_frame_start_ms,
                next_ms,
            }
            .into());
        }
        Ok(())
    }

    fn commit_frame(&mut self, next_ms: u64) {
        self.cur_frame += 1;
        self.next_frame_start_ms = next_ms;
        tracing::trace!(frame = self.cur_frame, start_ms = next_ms, "decoded frame");
    }
}

fn frame_read(err: io::Error) -> MovieError {
    MovieError::from_read(err, "video frame")
}

/// Expand a 6-bit VGA DAC component to 8 bits.
pub fn expand_6bit(value: u8) -> u8 {
    let v = value & 0x3F;
    (v << 2) | (v >> 4)
}

/// Walk one RLE stream over `budget` pixels. With `dest` the runs are
/// applied to it; without, the stream is only consumed.
fn walk_rle<R: Read + Seek>(
    reader: &mut R,
    scheme: RleScheme,
    budget: usize,
    mut dest: Option<&mut [u8]>,
) -> MovieResult<()> {
    let mut pos = 0usize;

    while pos < budget {
        let control = read_u8(reader).map_err(frame_read)?;
        if control == 0 && scheme == RleScheme::SkipLiteral {
            break;
        }

        let run = (control & 0x7F) as usize;
        let remaining = budget - pos;
        if run > remaining {
            return Err(CodecError::PixelBudget { run, remaining }.into());
        }

        if control & 0x80 != 0 {
            if scheme == RleScheme::FillLiteral {
                let color = read_u8(reader).map_err(frame_read)?;
                if let Some(dest) = dest.as_deref_mut() {
                    dest[pos..pos + run].fill(color);
                }
            }
        } else if let Some(dest) = dest.as_deref_mut() {
            reader.read_exact(&mut dest[pos..pos + run]).map_err(frame_read)?;
        } else {
            skip(reader, run as u64).map_err(frame_read)?;
        }

        pos += run;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{vid, ContainerFormat};
    use crate::error::FormatError;
    use crate::testutil::{encode_fill, encode_skip_literal, vid_params};
    use std::io::Cursor;

    fn header(kind: ChunkKind) -> ChunkHeader {
        ChunkHeader {
            kind,
            offset: 0,
            body_len: None,
            time: 0,
        }
    }

    fn with_delay(delay: u16, body: &[u8]) -> Vec<u8> {
        let mut out = delay.to_le_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 7) % 5) as u8 * 40).collect()
    }

    #[test]
    fn raw_frame_is_copied_verbatim() {
        let mut track = VideoTrack::new(vid_params(4, 2, 4)).unwrap();
        let pixels: Vec<u8> = (1..=8).collect();
        let mut stream = Cursor::new(with_delay(0, &pixels));
        track.decode_frame(&mut stream, &header(ChunkKind::FullFrame)).unwrap();
        assert_eq!(track.frame().data, &pixels[..]);
        assert_eq!(track.cur_frame_index(), 0);
        assert_eq!(track.next_frame_start_ms(), 0);
    }

    #[test]
    fn skip_literal_round_trip() {
        let previous = vec![9u8; 16 * 8];
        let mut target = previous.clone();
        for (i, px) in target.iter_mut().enumerate() {
            if (i / 5) % 3 != 0 {
                *px = (i % 251) as u8;
            }
        }

        let mut track = VideoTrack::new(vid_params(16, 8, 4)).unwrap();
        track.frame.copy_from_slice(&previous);
        let body = encode_skip_literal(&previous, &target);
        let mut stream = Cursor::new(with_delay(0, &body));
        track.decode_frame(&mut stream, &header(ChunkKind::FullFrameRle)).unwrap();

        assert_eq!(track.frame().data, &target[..]);
        assert_eq!(stream.position() as usize, body.len() + 2);
    }

    #[test]
    fn fill_round_trip() {
        let mut target = vec![0u8; 20 * 10];
        target[..90].fill(3);
        target[90..95].copy_from_slice(&[1, 2, 3, 4, 5]);
        target[95..].fill(200);

        let mut track = VideoTrack::new(vid_params(20, 10, 4)).unwrap();
        let body = encode_fill(&target);
        let mut stream = Cursor::new(with_delay(0, &body));
        track.decode_frame(&mut stream, &header(ChunkKind::FullFrameFill)).unwrap();

        assert_eq!(track.frame().data, &target[..]);
    }

    #[test]
    fn early_terminator_leaves_rest_untouched() {
        let mut track = VideoTrack::new(vid_params(4, 4, 4)).unwrap();
        track.frame.fill(7);
        // two literal pixels then stop
        let mut stream = Cursor::new(with_delay(0, &[0x02, 1, 2, 0x00]));
        track.decode_frame(&mut stream, &header(ChunkKind::FullFrameRle)).unwrap();
        assert_eq!(&track.frame().data[..4], &[1, 2, 7, 7]);
        assert!(track.frame().data[4..].iter().all(|&p| p == 7));
    }

    #[test]
    fn partial_frame_starts_at_row() {
        let mut track = VideoTrack::new(vid_params(4, 4, 4)).unwrap();
        let mut body = 2u16.to_le_bytes().to_vec();
        body.extend_from_slice(&[0x84, 0x04, 5, 6, 7, 8]);
        let mut stream = Cursor::new(with_delay(0, &body));
        track.decode_frame(&mut stream, &header(ChunkKind::PartialFrameRle)).unwrap();
        assert!(track.frame().data[..12].iter().all(|&p| p == 0));
        assert_eq!(&track.frame().data[12..], &[5, 6, 7, 8]);
    }

    #[test]
    fn partial_frame_row_out_of_range_is_fatal() {
        let mut track = VideoTrack::new(vid_params(4, 4, 4)).unwrap();
        let mut stream = Cursor::new(with_delay(0, &4u16.to_le_bytes()));
        let err = track
            .decode_frame(&mut stream, &header(ChunkKind::PartialFrameRle))
            .unwrap_err();
        assert!(matches!(
            err,
            MovieError::Codec(CodecError::StartRowOutOfRange { row: 4, height: 4 })
        ));
        assert_eq!(track.cur_frame_index(), -1);
    }

    #[test]
    fn budget_overrun_is_fatal_on_decode_and_skip() {
        let body = with_delay(0, &[0x7F]);
        let mut track = VideoTrack::new(vid_params(4, 4, 4)).unwrap();
        let err = track
            .decode_frame(&mut Cursor::new(body.clone()), &header(ChunkKind::FullFrameRle))
            .unwrap_err();
        assert!(matches!(
            err,
            MovieError::Codec(CodecError::PixelBudget { run: 127, remaining: 16 })
        ));

        let err = track
            .skip_frame(&mut Cursor::new(body), &header(ChunkKind::FullFrameRle))
            .unwrap_err();
        assert!(matches!(err, MovieError::Codec(CodecError::PixelBudget { .. })));
    }

    #[test]
    fn skip_consumes_same_bytes_as_decode() {
        let target = pattern(12 * 6);
        let kinds = [
            (ChunkKind::FullFrameRle, encode_skip_literal(&vec![0; 72], &target)),
            (ChunkKind::FullFrameFill, encode_fill(&target)),
            (ChunkKind::FullFrame, target.clone()),
        ];
        for (kind, body) in kinds {
            let mut bytes = with_delay(3, &body);
            bytes.push(0xEE);

            let mut track = VideoTrack::new(vid_params(12, 6, 4)).unwrap();
            let mut decoded = Cursor::new(bytes.clone());
            track.decode_frame(&mut decoded, &header(kind)).unwrap();

            let mut skipped = Cursor::new(bytes);
            track.skip_frame(&mut skipped, &header(kind)).unwrap();

            assert_eq!(decoded.position(), skipped.position(), "{:?}", kind);
            assert_eq!(track.frame().data, &target[..]);
        }
    }

    #[test]
    fn truncated_frame_reports_truncation() {
        let mut track = VideoTrack::new(vid_params(4, 4, 4)).unwrap();
        let mut stream = Cursor::new(with_delay(0, &[1, 2, 3]));
        let err = track.decode_frame(&mut stream, &header(ChunkKind::FullFrame)).unwrap_err();
        assert!(matches!(err, MovieError::Format(FormatError::Truncated { .. })));
    }

    #[test]
    fn schedule_follows_regular_and_additional_delay() {
        let mut track = VideoTrack::new(vid_params(2, 1, 4)).unwrap();
        let mut stream = Cursor::new([with_delay(0, &[0, 0]), with_delay(6, &[0, 0]), with_delay(0, &[0, 0])].concat());

        track.decode_frame(&mut stream, &header(ChunkKind::FullFrame)).unwrap();
        assert_eq!(track.next_frame_start_ms(), 0);

        track.decode_frame(&mut stream, &header(ChunkKind::FullFrame)).unwrap();
        assert_eq!(track.next_frame_start_ms(), vid::ticks_to_ms(4) + vid::ticks_to_ms(6));

        // back to the regular cadence: 8 ticks < 4 + 6 ticks
        let err = track.decode_frame(&mut stream, &header(ChunkKind::FullFrame)).unwrap_err();
        assert!(matches!(
            err,
            MovieError::Codec(CodecError::NonMonotonicTimestamp { .. })
        ));
        assert_eq!(track.cur_frame_index(), 1);
    }

    #[test]
    fn palette_expands_and_clears_on_take() {
        let mut track = VideoTrack::new(vid_params(1, 1, 1)).unwrap();
        let mut raw = vec![0u8; PALETTE_BYTES];
        raw[0] = 0x3F;
        raw[1] = 0x20;
        raw[2] = 0xFF;
        track.decode_palette(&mut Cursor::new(raw)).unwrap();

        assert!(track.is_palette_dirty());
        let palette = track.take_dirty_palette().unwrap();
        assert_eq!(&palette[..3], &[0xFF, 0x82, 0xFF]);
        assert!(track.take_dirty_palette().is_none());
        assert_eq!(track.palette()[0], 0xFF);
    }

    #[test]
    fn oversized_track_is_refused() {
        let err = VideoTrack::new(vid_params(u32::MAX, 2, 4)).err().unwrap();
        assert!(matches!(
            err,
            MovieError::Format(FormatError::BadDimensions { width: u32::MAX, height: 2 })
        ));
        assert!(VideoTrack::new(vid_params(0, 0, 4)).is_err());
    }

    #[test]
    fn expands_dac_range_endpoints() {
        assert_eq!(expand_6bit(0), 0);
        assert_eq!(expand_6bit(0x3F), 0xFF);
        assert_eq!(expand_6bit(0x10), 0x41);
    }

    #[test]
    fn film_frame_size_must_match() {
        let params = StreamParams {
            format: ContainerFormat::Film,
            ..vid_params(2, 2, 0)
        };
        let mut track = VideoTrack::new(params).unwrap();
        let film_header = ChunkHeader {
            kind: ChunkKind::FilmFrame,
            offset: 0,
            body_len: Some(3),
            time: 240,
        };
        let err = track
            .decode_frame(&mut Cursor::new(vec![0; 3]), &film_header)
            .unwrap_err();
        assert!(matches!(
            err,
            MovieError::Codec(CodecError::FrameSize { expected: 4, actual: 3 })
        ));

        let film_header = ChunkHeader {
            body_len: Some(4),
            ..film_header
        };
        track
            .decode_frame(&mut Cursor::new(vec![1, 2, 3, 4]), &film_header)
            .unwrap();
        assert_eq!(track.next_frame_start_ms(), 1000);
        assert_eq!(track.frame().data, &[1, 2, 3, 4]);
    }
}
