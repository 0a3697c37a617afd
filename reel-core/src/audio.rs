//! # Audio Track
//!
//! Turns audio chunk bodies into PCM pushed to the host's [`AudioSink`] and
//! keeps count of how much has been queued.
//!
//! - VID carries unsigned 8-bit mono PCM; the first audio chunk also holds
//!   the sample rate.
//! - FILM carries ADP4 ADPCM, expanded to signed 16-bit mono. The rate comes
//!   from a separate SNDS 'SHDR' chunk.

use std::io::{Read, Seek};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use serde::Serialize;

use crate::adpcm::AdpcmPredictor;
use crate::container::{film, vid, ChunkHeader, ChunkKind};
use crate::error::{FormatError, MovieError, MovieResult};
use crate::reader::skip;

// ============================================================================
// Sink interface
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SampleFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub signed: bool,
    pub bits: u8,
}

/// Append-only destination for decoded PCM. The decoder never reads back.
pub trait AudioSink {
    fn queue_samples(&mut self, data: &[u8], format: SampleFormat);
}

impl<S: AudioSink + ?Sized> AudioSink for &mut S {
    fn queue_samples(&mut self, data: &[u8], format: SampleFormat) {
        (**self).queue_samples(data, format)
    }
}

impl<S: AudioSink + ?Sized> AudioSink for Box<S> {
    fn queue_samples(&mut self, data: &[u8], format: SampleFormat) {
        (**self).queue_samples(data, format)
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullAudioSink;

impl AudioSink for NullAudioSink {
    fn queue_samples(&mut self, _data: &[u8], _format: SampleFormat) {}
}

/// Accumulates queued PCM in memory.
#[derive(Debug, Default)]
pub struct MemoryAudioSink {
    data: BytesMut,
    format: Option<SampleFormat>,
    pushes: usize,
}

impl MemoryAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn format(&self) -> Option<SampleFormat> {
        self.format
    }

    /// Number of `queue_samples` calls received.
    pub fn pushes(&self) -> usize {
        self.pushes
    }

    /// Hand over everything queued so far.
    pub fn take(&mut self) -> Bytes {
        self.data.split().freeze()
    }
}

impl AudioSink for MemoryAudioSink {
    fn queue_samples(&mut self, data: &[u8], format: SampleFormat) {
        self.data.extend_from_slice(data);
        self.format = Some(format);
        self.pushes += 1;
    }
}

/// Cloneable handle to a [`MemoryAudioSink`] so an output thread can drain
/// PCM while the decoder keeps queueing.
#[derive(Debug, Clone, Default)]
pub struct SharedAudioSink {
    inner: Arc<Mutex<MemoryAudioSink>>,
}

impl SharedAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take everything queued since the last drain, with its format.
    pub fn drain(&self) -> (Bytes, Option<SampleFormat>) {
        let mut sink = self.inner.lock();
        let format = sink.format();
        (sink.take(), format)
    }

    /// Total `queue_samples` calls seen so far.
    pub fn pushes(&self) -> usize {
        self.inner.lock().pushes()
    }
}

impl AudioSink for SharedAudioSink {
    fn queue_samples(&mut self, data: &[u8], format: SampleFormat) {
        self.inner.lock().queue_samples(data, format);
    }
}

// ============================================================================
// Track
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AudioCodec {
    /// Unsigned 8-bit PCM.
    PcmU8,
    /// 4-bit ADPCM expanded to signed 16-bit.
    Adpcm4,
}

impl AudioCodec {
    fn bytes_per_sample(self) -> u64 {
        match self {
            AudioCodec::PcmU8 => 1,
            AudioCodec::Adpcm4 => 2,
        }
    }
}

pub struct AudioTrack {
    sample_rate: u32,
    channels: u16,
    codec: AudioCodec,
    queued_samples: u64,
    predictor: AdpcmPredictor,
    scratch: Vec<u8>,
}

impl AudioTrack {
    pub fn new(sample_rate: u32, channels: u16, codec: AudioCodec) -> Self {
        Self {
            sample_rate,
            channels,
            codec,
            queued_samples: 0,
            predictor: AdpcmPredictor::new(),
            scratch: Vec::new(),
        }
    }

    /// Build a track from an audio header chunk found while probing.
    /// Consumes the whole chunk body. Returns `None` for audio chunks that
    /// carry no track parameters.
    pub(crate) fn discover<R: Read + Seek>(reader: &mut R, header: &ChunkHeader) -> MovieResult<Option<Self>> {
        match header.kind {
            ChunkKind::AudioFirst => {
                let prefix = vid::read_audio_prefix(reader, header.kind)?;
                skip(reader, prefix.payload_len).map_err(audio_read)?;
                Ok(prefix
                    .sample_rate
                    .map(|rate| Self::new(rate, 1, AudioCodec::PcmU8)))
            }
            ChunkKind::SoundHeader => {
                let body = read_body(reader, header)?;
                let sound = film::parse_sound_header(&body)?;
                Ok(Some(Self::new(sound.sample_rate, sound.channels as u16, AudioCodec::Adpcm4)))
            }
            _ => {
                Self::skip_audio(reader, header)?;
                Ok(None)
            }
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn codec(&self) -> AudioCodec {
        self.codec
    }

    pub fn predictor(&self) -> AdpcmPredictor {
        self.predictor
    }

    pub fn queued_samples(&self) -> u64 {
        self.queued_samples
    }

    pub fn queued_duration_ms(&self) -> u64 {
        self.queued_samples * 1000 / self.sample_rate as u64
    }

    pub fn sample_format(&self) -> SampleFormat {
        SampleFormat {
            sample_rate: self.sample_rate,
            channels: self.channels,
            signed: self.codec == AudioCodec::Adpcm4,
            bits: (self.codec.bytes_per_sample() * 8) as u8,
        }
    }

    /// Decode an audio chunk body and push its samples to `sink`. The stream
    /// must be positioned just past `header`.
    pub(crate) fn queue_audio<R: Read + Seek, S: AudioSink>(
        &mut self,
        reader: &mut R,
        header: &ChunkHeader,
        sink: &mut S,
    ) -> MovieResult<()> {
        match header.kind {
            ChunkKind::AudioFirst | ChunkKind::Audio => {
                let prefix = vid::read_audio_prefix(reader, header.kind)?;
                if let Some(rate) = prefix.sample_rate {
                    self.check_rate(rate);
                }
                self.scratch.clear();
                (&mut *reader)
                    .take(prefix.payload_len)
                    .read_to_end(&mut self.scratch)
                    .map_err(audio_read)?;
                if (self.scratch.len() as u64) < prefix.payload_len {
                    return Err(FormatError::Truncated { what: "audio chunk" }.into());
                }
                self.push(sink, self.scratch.len() as u64);
            }
            ChunkKind::SoundHeader => {
                let body = read_body(reader, header)?;
                let sound = film::parse_sound_header(&body)?;
                self.check_rate(sound.sample_rate);
            }
            ChunkKind::SoundSamples => {
                let body = read_body(reader, header)?;
                self.scratch.clear();
                self.predictor.decode_into(&body, &mut self.scratch);
                self.push(sink, body.len() as u64 * 2);
            }
            other => unreachable!("{:?} is not an audio chunk", other),
        }
        Ok(())
    }

    /// Consume an audio chunk body without decoding, ending at the same
    /// position `queue_audio` would.
    pub(crate) fn skip_audio<R: Read + Seek>(reader: &mut R, header: &ChunkHeader) -> MovieResult<()> {
        match header.kind {
            ChunkKind::AudioFirst | ChunkKind::Audio => {
                let prefix = vid::read_audio_prefix(reader, header.kind)?;
                skip(reader, prefix.payload_len).map_err(audio_read)
            }
            _ => skip(reader, header.body_len.unwrap_or(0)).map_err(audio_read),
        }
    }

    fn push<S: AudioSink>(&mut self, sink: &mut S, samples: u64) {
        if self.scratch.is_empty() {
            return;
        }
        sink.queue_samples(&self.scratch, self.sample_format());
        self.queued_samples += samples;
        tracing::trace!(
            samples,
            queued_ms = self.queued_duration_ms(),
            "queued audio"
        );
    }

    fn check_rate(&self, rate: u32) {
        if rate != self.sample_rate {
            tracing::warn!(
                "Audio header announces {} Hz, track was opened at {} Hz; keeping {} Hz",
                rate,
                self.sample_rate,
                self.sample_rate
            );
        }
    }
}

fn audio_read(err: std::io::Error) -> MovieError {
    MovieError::from_read(err, "audio chunk")
}

fn read_body<R: Read>(reader: &mut R, header: &ChunkHeader) -> MovieResult<Vec<u8>> {
    let len = header.body_len.unwrap_or(0);
    let mut body = Vec::new();
    reader.take(len).read_to_end(&mut body).map_err(audio_read)?;
    if (body.len() as u64) < len {
        return Err(FormatError::Truncated { what: "audio chunk" }.into());
    }
    Ok(body)
}
