//! Movie builders and encoders shared by the unit tests.

use std::io::{self, Read, Seek, SeekFrom};

use crate::container::{film, vid, ContainerFormat};
use crate::header::StreamParams;
use crate::video::PALETTE_BYTES;

const MAX_RUN: usize = 127;

pub fn vid_params(width: u32, height: u32, delay: u16) -> StreamParams {
    StreamParams {
        format: ContainerFormat::Vid,
        width,
        height,
        regular_frame_delay: delay,
        video_codec: None,
        frame_count: None,
        first_chunk_offset: vid::PROLOGUE_LEN,
    }
}

// ============================================================================
// VID
// ============================================================================

pub struct VidBuilder {
    bytes: Vec<u8>,
}

impl VidBuilder {
    pub fn new(width: u16, height: u16, delay: u16) -> Self {
        let mut bytes = vid::MAGIC.to_vec();
        bytes.push(0);
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&[0; 4]);
        bytes.extend_from_slice(&delay.to_le_bytes());
        Self { bytes }
    }

    fn frame_chunk(mut self, code: u8, delay: u16, body: &[u8]) -> Self {
        self.bytes.push(code);
        self.bytes.extend_from_slice(&delay.to_le_bytes());
        self.bytes.extend_from_slice(body);
        self
    }

    pub fn full_frame(self, delay: u16, pixels: &[u8]) -> Self {
        self.frame_chunk(vid::CHUNK_FULL_FRAME, delay, pixels)
    }

    pub fn rle_frame(self, delay: u16, encoded: &[u8]) -> Self {
        self.frame_chunk(vid::CHUNK_FULL_FRAME_RLE, delay, encoded)
    }

    pub fn fill_frame(self, delay: u16, encoded: &[u8]) -> Self {
        self.frame_chunk(vid::CHUNK_FULL_FRAME_FILL, delay, encoded)
    }

    pub fn partial_frame(self, delay: u16, start_row: u16, encoded: &[u8]) -> Self {
        let mut body = start_row.to_le_bytes().to_vec();
        body.extend_from_slice(encoded);
        self.frame_chunk(vid::CHUNK_PARTIAL_FRAME_RLE, delay, &body)
    }

    /// Raw 6-bit palette, 768 bytes.
    pub fn palette(mut self, raw: &[u8]) -> Self {
        assert_eq!(raw.len(), PALETTE_BYTES);
        self.bytes.push(vid::CHUNK_PALETTE);
        self.bytes.extend_from_slice(raw);
        self
    }

    /// Palette whose entry `i` is gray level `i % 64`.
    pub fn palette_gray(self) -> Self {
        let raw: Vec<u8> = (0..PALETTE_BYTES).map(|i| ((i / 3) % 64) as u8).collect();
        self.palette(&raw)
    }

    pub fn audio_first(mut self, time_constant: u8, samples: &[u8]) -> Self {
        self.bytes.push(vid::CHUNK_AUDIO_FIRST);
        self.bytes.extend_from_slice(&((samples.len() + 2) as u16).to_le_bytes());
        self.bytes.push(vid::AUDIO_SYNC_MARKER);
        self.bytes.push(time_constant);
        self.bytes.extend_from_slice(samples);
        self
    }

    pub fn audio(mut self, samples: &[u8]) -> Self {
        self.bytes.push(vid::CHUNK_AUDIO);
        self.bytes.extend_from_slice(&(samples.len() as u16).to_le_bytes());
        self.bytes.extend_from_slice(samples);
        self
    }

    pub fn end(mut self) -> Self {
        self.bytes.push(vid::CHUNK_END_OF_STREAM);
        self
    }

    pub fn raw(mut self, bytes: &[u8]) -> Self {
        self.bytes.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

// ============================================================================
// FILM
// ============================================================================

pub struct FilmBuilder {
    width: u32,
    height: u32,
    frame_count: u32,
    codec: [u8; 4],
    chunks: Vec<u8>,
}

impl FilmBuilder {
    pub fn new(width: u32, height: u32, frame_count: u32) -> Self {
        Self {
            width,
            height,
            frame_count,
            codec: film::CODEC_RAW.0,
            chunks: Vec::new(),
        }
    }

    pub fn codec(mut self, tag: &[u8; 4]) -> Self {
        self.codec = *tag;
        self
    }

    pub fn frame(mut self, time: u32, pixels: &[u8]) -> Self {
        stream_chunk(&mut self.chunks, b"FILM", time, b"FRME", pixels);
        self
    }

    pub fn sound_header(mut self, sample_rate: u32, channels: u32) -> Self {
        let mut body = Vec::new();
        for v in [0, sample_rate, channels] {
            body.extend_from_slice(&v.to_be_bytes());
        }
        body.extend_from_slice(&film::CODEC_ADP4.0);
        stream_chunk(&mut self.chunks, b"SNDS", 0, b"SHDR", &body);
        self
    }

    pub fn samples(mut self, adpcm: &[u8]) -> Self {
        stream_chunk(&mut self.chunks, b"SNDS", 0, b"SSMP", adpcm);
        self
    }

    /// CTRL chunk with `len` bytes of zero payload.
    pub fn control(mut self, len: usize) -> Self {
        self.chunks.extend_from_slice(b"CTRL");
        self.chunks.extend_from_slice(&((8 + len) as u32).to_be_bytes());
        self.chunks.extend(std::iter::repeat(0).take(len));
        self
    }

    pub fn finish(self) -> Vec<u8> {
        let mut fields = Vec::new();
        fields.extend_from_slice(&0u32.to_be_bytes());
        fields.extend_from_slice(&self.codec);
        for v in [self.height, self.width, film::TICKS_PER_SECOND as u32, self.frame_count] {
            fields.extend_from_slice(&v.to_be_bytes());
        }

        let mut bytes = Vec::new();
        stream_chunk(&mut bytes, b"FILM", 0, b"FHDR", &fields);
        bytes.extend_from_slice(&self.chunks);
        bytes
    }
}

fn stream_chunk(out: &mut Vec<u8>, tag: &[u8; 4], time: u32, subtype: &[u8; 4], body: &[u8]) {
    out.extend_from_slice(tag);
    out.extend_from_slice(&((20 + body.len()) as u32).to_be_bytes());
    out.extend_from_slice(&time.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(subtype);
    out.extend_from_slice(body);
}

// ============================================================================
// RLE encoders
// ============================================================================

/// Encode `target` as a skip/literal stream over `previous`. A trailing skip
/// run becomes the early terminator.
pub fn encode_skip_literal(previous: &[u8], target: &[u8]) -> Vec<u8> {
    assert_eq!(previous.len(), target.len());
    let mut out = Vec::new();
    let mut pos = 0;

    while pos < target.len() {
        let unchanged = previous[pos] == target[pos];
        let mut end = pos;
        while end < target.len() && end - pos < MAX_RUN && (previous[end] == target[end]) == unchanged {
            end += 1;
        }

        if unchanged {
            if target[end..].iter().zip(&previous[end..]).all(|(a, b)| a == b) {
                out.push(0x00);
                return out;
            }
            out.push(0x80 | (end - pos) as u8);
        } else {
            out.push((end - pos) as u8);
            out.extend_from_slice(&target[pos..end]);
        }
        pos = end;
    }
    out
}

/// Encode `target` as a fill/literal stream. Runs of three or more equal
/// pixels become fills.
pub fn encode_fill(target: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut literal_start = 0;
    let mut pos = 0;

    let flush = |out: &mut Vec<u8>, from: usize, to: usize| {
        for chunk in target[from..to].chunks(MAX_RUN) {
            out.push(chunk.len() as u8);
            out.extend_from_slice(chunk);
        }
    };

    while pos < target.len() {
        let mut run = 1;
        while pos + run < target.len() && run < MAX_RUN && target[pos + run] == target[pos] {
            run += 1;
        }
        if run >= 3 {
            flush(&mut out, literal_start, pos);
            out.push(0x80 | run as u8);
            out.push(target[pos]);
            pos += run;
            literal_start = pos;
        } else {
            pos += run;
        }
    }
    flush(&mut out, literal_start, target.len());
    out
}

// ============================================================================
// Instrumented reader
// ============================================================================

/// Counts `read` calls and bytes delivered by the wrapped stream.
pub struct CountingReader<R> {
    inner: R,
    reads: usize,
    bytes_read: u64,
}

impl<R> CountingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            reads: 0,
            bytes_read: 0,
        }
    }

    pub fn reads(&self) -> usize {
        self.reads
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.reads += 1;
        self.bytes_read += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for CountingReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skip_literal_ends_with_terminator_only_on_trailing_skip() {
        let previous = [0u8; 8];
        assert_eq!(encode_skip_literal(&previous, &[0, 0, 5, 0, 0, 0, 0, 0]), vec![0x82, 0x01, 5, 0x00]);
        assert_eq!(encode_skip_literal(&previous, &[0, 0, 0, 0, 0, 0, 0, 9]), vec![0x87, 0x01, 9]);
    }

    #[test]
    fn fill_prefers_runs_of_three() {
        assert_eq!(encode_fill(&[1, 2, 2, 2, 2, 3]), vec![0x01, 1, 0x84, 2, 0x01, 3]);
        assert_eq!(encode_fill(&[4, 4]), vec![0x02, 4, 4]);
    }
}
