// FILM/CTRL movie layout (3DO stream files)
//
// FILM 'FHDR'            video header, always the first chunk
// FILM 'FRME'            one video frame
// SNDS 'SHDR'            audio header
// SNDS 'SSMP'            audio samples
// CTRL, FILL             stream control and padding
//
// Chunk sizes include the 8-byte tag/size header. FILM and SNDS chunks add
// a 12-byte sub-header (time, channel, subtype) before their payload.

use std::io::{self, Read, Seek};

use bytes::Buf;

use crate::container::{ChunkHeader, ChunkKind, ContainerFormat, FourCc};
use crate::error::{FormatError, MovieError, MovieResult};
use crate::header::{check_dimensions, StreamParams};
use crate::reader::{read_fourcc_or_eof, read_u32_be, skip};

pub const MAGIC: [u8; 4] = *b"FILM";
pub const TICKS_PER_SECOND: u64 = 240;

pub const TAG_FILM: FourCc = FourCc::new(b"FILM");
pub const TAG_SNDS: FourCc = FourCc::new(b"SNDS");
pub const TAG_CTRL: FourCc = FourCc::new(b"CTRL");
pub const TAG_FILL: FourCc = FourCc::new(b"FILL");

pub const SUB_FHDR: FourCc = FourCc::new(b"FHDR");
pub const SUB_FRME: FourCc = FourCc::new(b"FRME");
pub const SUB_SHDR: FourCc = FourCc::new(b"SHDR");
pub const SUB_SSMP: FourCc = FourCc::new(b"SSMP");

pub const CODEC_RAW: FourCc = FourCc::new(b"raw ");
pub const CODEC_ADP4: FourCc = FourCc::new(b"ADP4");

const CHUNK_HEADER_LEN: u64 = 8;
const STREAM_HEADER_LEN: u64 = 20;
const FHDR_FIELDS_LEN: usize = 24;
const SHDR_FIELDS_LEN: usize = 16;

/// Parse the FILM 'FHDR' chunk after its 4-byte tag has been consumed.
pub(crate) fn parse_prologue<R: Read + Seek>(reader: &mut R) -> MovieResult<StreamParams> {
    let read = |e: io::Error| MovieError::from_read(e, "FILM header");

    let size = read_u32_be(reader).map_err(read)? as u64;
    if size < STREAM_HEADER_LEN + FHDR_FIELDS_LEN as u64 {
        return Err(FormatError::Truncated { what: "FILM header" }.into());
    }

    let mut sub = [0u8; 12];
    reader.read_exact(&mut sub).map_err(read)?;
    let subtype = [sub[8], sub[9], sub[10], sub[11]];
    if FourCc(subtype) != SUB_FHDR {
        return Err(FormatError::BadMagic {
            expected: "FHDR",
            found: subtype,
        }
        .into());
    }

    let mut fields = [0u8; FHDR_FIELDS_LEN];
    reader.read_exact(&mut fields).map_err(read)?;
    let mut buf = &fields[..];
    let _version = buf.get_u32();
    let codec = FourCc(buf.get_u32().to_be_bytes());
    let height = buf.get_u32();
    let width = buf.get_u32();
    let _time_scale = buf.get_u32();
    let frame_count = buf.get_u32();

    if codec != CODEC_RAW {
        return Err(FormatError::UnsupportedCodec(codec).into());
    }
    check_dimensions(width, height)?;

    skip(reader, size - STREAM_HEADER_LEN - FHDR_FIELDS_LEN as u64).map_err(read)?;

    Ok(StreamParams {
        format: ContainerFormat::Film,
        width,
        height,
        regular_frame_delay: 0,
        video_codec: Some(codec),
        frame_count: Some(frame_count),
        first_chunk_offset: size,
    })
}

pub(crate) fn read_chunk_header<R: Read>(reader: &mut R, offset: u64) -> MovieResult<ChunkHeader> {
    let read = |e: io::Error| MovieError::from_read(e, "FILM chunk header");

    let Some(tag) = read_fourcc_or_eof(reader).map_err(read)? else {
        return Ok(ChunkHeader::end_of_stream(offset));
    };
    let tag = FourCc(tag);
    let size = read_u32_be(reader).map_err(read)? as u64;
    if size < CHUNK_HEADER_LEN {
        return Err(FormatError::Truncated { what: "FILM chunk" }.into());
    }

    if tag == TAG_CTRL || tag == TAG_FILL {
        return Ok(ChunkHeader {
            kind: ChunkKind::Control,
            offset,
            body_len: Some(size - CHUNK_HEADER_LEN),
            time: 0,
        });
    }
    if tag != TAG_FILM && tag != TAG_SNDS {
        return Err(FormatError::UnknownChunk {
            code: tag.as_u32(),
            offset,
        }
        .into());
    }

    if size < STREAM_HEADER_LEN {
        return Err(FormatError::Truncated { what: "FILM chunk" }.into());
    }
    let time = read_u32_be(reader).map_err(read)?;
    let _channel = read_u32_be(reader).map_err(read)?;
    let subtype = FourCc(read_u32_be(reader).map_err(read)?.to_be_bytes());

    let kind = match (tag, subtype) {
        (TAG_FILM, SUB_FRME) => ChunkKind::FilmFrame,
        (TAG_FILM, SUB_FHDR) => ChunkKind::Control,
        (TAG_SNDS, SUB_SHDR) => ChunkKind::SoundHeader,
        (TAG_SNDS, SUB_SSMP) => ChunkKind::SoundSamples,
        _ => {
            return Err(FormatError::UnknownChunk {
                code: subtype.as_u32(),
                offset,
            }
            .into())
        }
    };

    Ok(ChunkHeader {
        kind,
        offset,
        body_len: Some(size - STREAM_HEADER_LEN),
        time,
    })
}

/// Parameters carried by an SNDS 'SHDR' payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SoundHeader {
    pub sample_rate: u32,
    pub channels: u32,
    pub codec: FourCc,
}

pub(crate) fn parse_sound_header(mut payload: &[u8]) -> MovieResult<SoundHeader> {
    if payload.len() < SHDR_FIELDS_LEN {
        return Err(FormatError::Truncated { what: "SNDS header" }.into());
    }
    let _version = payload.get_u32();
    let sample_rate = payload.get_u32();
    let channels = payload.get_u32();
    let codec = FourCc(payload.get_u32().to_be_bytes());

    if codec != CODEC_ADP4 {
        return Err(FormatError::UnsupportedCodec(codec).into());
    }
    if channels != 1 {
        return Err(FormatError::UnsupportedChannels { codec, channels }.into());
    }
    if sample_rate == 0 {
        return Err(FormatError::UnsupportedSampleRate(sample_rate).into());
    }

    Ok(SoundHeader {
        sample_rate,
        channels,
        codec,
    })
}

pub fn ticks_to_ms(ticks: u64) -> u64 {
    ticks * 1000 / TICKS_PER_SECOND
}
