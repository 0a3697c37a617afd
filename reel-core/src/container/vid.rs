// VID movie layout
//
// 15-byte prologue followed by a flat run of chunks, each introduced by a
// single kind byte. Frame bodies are not length-prefixed, so skipping one
// means walking its RLE stream (see video.rs).

use std::io::{self, Read, Seek};

use crate::container::{ChunkHeader, ChunkKind, ContainerFormat};
use crate::error::{FormatError, MovieError, MovieResult};
use crate::header::{check_dimensions, StreamParams};
use crate::reader::{read_u16_le, read_u8, read_u8_or_eof, skip};

pub const MAGIC: [u8; 4] = *b"VID\0";
pub const PROLOGUE_LEN: u64 = 15;
pub const TICKS_PER_SECOND: u64 = 60;

pub const CHUNK_FULL_FRAME: u8 = 0x00;
pub const CHUNK_FULL_FRAME_RLE: u8 = 0x01;
pub const CHUNK_PALETTE: u8 = 0x02;
pub const CHUNK_FULL_FRAME_FILL: u8 = 0x03;
pub const CHUNK_PARTIAL_FRAME_RLE: u8 = 0x04;
pub const CHUNK_END_OF_STREAM: u8 = 0x14;
pub const CHUNK_AUDIO_FIRST: u8 = 0x7C;
pub const CHUNK_AUDIO: u8 = 0x7D;

pub const AUDIO_SYNC_MARKER: u8 = 0x01;

/// Parse the prologue after the 4-byte magic has been consumed.
pub(crate) fn parse_prologue<R: Read + Seek>(reader: &mut R) -> MovieResult<StreamParams> {
    let read = |e: io::Error| MovieError::from_read(e, "VID header");

    skip(reader, 1).map_err(read)?;
    let height = read_u16_le(reader).map_err(read)?;
    let width = read_u16_le(reader).map_err(read)?;
    skip(reader, 4).map_err(read)?;
    let regular_frame_delay = read_u16_le(reader).map_err(read)?;
    check_dimensions(width as u32, height as u32)?;

    Ok(StreamParams {
        format: ContainerFormat::Vid,
        width: width as u32,
        height: height as u32,
        regular_frame_delay,
        video_codec: None,
        frame_count: None,
        first_chunk_offset: PROLOGUE_LEN,
    })
}

pub(crate) fn kind_from_code(code: u8) -> Option<ChunkKind> {
    Some(match code {
        CHUNK_FULL_FRAME => ChunkKind::FullFrame,
        CHUNK_FULL_FRAME_RLE => ChunkKind::FullFrameRle,
        CHUNK_PALETTE => ChunkKind::Palette,
        CHUNK_FULL_FRAME_FILL => ChunkKind::FullFrameFill,
        CHUNK_PARTIAL_FRAME_RLE => ChunkKind::PartialFrameRle,
        CHUNK_END_OF_STREAM => ChunkKind::EndOfStream,
        CHUNK_AUDIO_FIRST => ChunkKind::AudioFirst,
        CHUNK_AUDIO => ChunkKind::Audio,
        _ => return None,
    })
}

pub(crate) fn read_chunk_header<R: Read>(reader: &mut R, offset: u64) -> MovieResult<ChunkHeader> {
    let Some(code) = read_u8_or_eof(reader)? else {
        return Ok(ChunkHeader::end_of_stream(offset));
    };
    let kind = kind_from_code(code).ok_or(FormatError::UnknownChunk {
        code: code as u32,
        offset,
    })?;
    Ok(ChunkHeader {
        kind,
        offset,
        body_len: None,
        time: 0,
    })
}

/// Leading fields of an audio chunk body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AudioPrefix {
    pub payload_len: u64,
    pub sample_rate: Option<u32>,
}

/// Read the length prefix (and, for the first audio chunk, the sync marker
/// and time constant). Leaves the stream at the first PCM byte.
pub(crate) fn read_audio_prefix<R: Read>(reader: &mut R, kind: ChunkKind) -> MovieResult<AudioPrefix> {
    let read = |e: io::Error| MovieError::from_read(e, "VID audio chunk");

    let len = read_u16_le(reader).map_err(read)? as u64;
    if kind != ChunkKind::AudioFirst {
        return Ok(AudioPrefix {
            payload_len: len,
            sample_rate: None,
        });
    }

    if len < 2 {
        return Err(FormatError::Truncated { what: "VID audio header" }.into());
    }
    let sync = read_u8(reader).map_err(read)?;
    if sync != AUDIO_SYNC_MARKER {
        return Err(FormatError::BadAudioSync(sync).into());
    }
    let time_constant = read_u8(reader).map_err(read)?;

    Ok(AudioPrefix {
        payload_len: len - 2,
        sample_rate: Some(sample_rate_from_time_constant(time_constant)),
    })
}

/// Sound Blaster style time constant to sample rate.
pub fn sample_rate_from_time_constant(time_constant: u8) -> u32 {
    1_000_000 / (256 - time_constant as u32)
}

pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks * 1000 / TICKS_PER_SECOND
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn time_constant_maps_to_rate() {
        assert_eq!(sample_rate_from_time_constant(0xA6), 11_111);
        assert_eq!(sample_rate_from_time_constant(0xD3), 22_222);
        assert_eq!(sample_rate_from_time_constant(0xFF), 1_000_000);
    }

    #[test]
    fn unknown_kind_reports_offset() {
        let mut data = Cursor::new(vec![0x42]);
        let err = read_chunk_header(&mut data, 99).unwrap_err();
        assert!(matches!(
            err,
            MovieError::Format(FormatError::UnknownChunk { code: 0x42, offset: 99 })
        ));
    }

    #[test]
    fn first_audio_prefix_carries_rate() {
        let mut data = Cursor::new(vec![0x06, 0x00, 0x01, 0xA6, 1, 2, 3, 4]);
        let prefix = read_audio_prefix(&mut data, ChunkKind::AudioFirst).unwrap();
        assert_eq!(prefix.payload_len, 4);
        assert_eq!(prefix.sample_rate, Some(11_111));
        assert_eq!(data.position(), 4);
    }

    #[test]
    fn bad_sync_marker_is_rejected() {
        let mut data = Cursor::new(vec![0x03, 0x00, 0x09, 0xA6, 0x80]);
        let err = read_audio_prefix(&mut data, ChunkKind::AudioFirst).unwrap_err();
        assert!(matches!(err, MovieError::Format(FormatError::BadAudioSync(0x09))));
    }
}
