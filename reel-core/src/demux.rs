//! # Demux / Sync Driver
//!
//! Drives one shared read cursor across the interleaved video and audio
//! chunks of a movie.
//!
//! ```text
//!  open ─► parse header ─► probe (≤ N chunks) ─► Ready ⇄ Decoding ─► Draining
//!                                                   │
//!                                                   └─► Error (any fatal)
//! ```
//!
//! Each track has a *frontier*: the number of scan positions it has already
//! claimed. A round scans forward from the lower frontier; chunks already in
//! the index cost nothing until their payload is needed, fresh chunks are
//! read once, appended to the index and either decoded or skipped so the
//! stream stays in step for the track that is behind.
//!
//! Audio is buffered ahead of the presentation clock by a fixed lookahead;
//! a round ends once one new frame is decoded and the audio watermark is met.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use crate::audio::{AudioCodec, AudioSink, AudioTrack, NullAudioSink};
use crate::config::DecoderConfig;
use crate::container::{read_chunk_header, ChunkHeader, ContainerFormat, FourCc, TrackKind};
use crate::error::{MovieError, MovieResult};
use crate::header::{parse_header, StreamParams};
use crate::index::{ChunkIndex, ChunkIndexEntry, Resolved};
use crate::reader::skip;
use crate::video::{FrameView, Palette, PixelFormat, VideoTrack};

// ============================================================================
// Public types
// ============================================================================

/// Outcome of one `decode_next_unit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitResult {
    NewFrame,
    EndOfStream,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DecoderState {
    HeaderParsed,
    Probing,
    Ready,
    Decoding,
    Draining,
    Error,
}

/// Shared read position and per-track frontiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DemuxCursor {
    /// Next unread byte of the forward scan.
    pub resume_offset: u64,
    /// Scan positions already claimed by video.
    pub video_frontier: usize,
    /// Scan positions already claimed by audio.
    pub audio_frontier: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: AudioCodec,
}

#[derive(Debug, Clone, Serialize)]
pub struct MovieInfo {
    pub format: ContainerFormat,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub regular_frame_delay_ms: u64,
    pub video_codec: Option<FourCc>,
    pub frame_count: Option<u32>,
    pub audio: Option<AudioInfo>,
    pub indexed_chunks: usize,
}

// ============================================================================
// Decoder
// ============================================================================

pub struct MovieDecoder<R: Read + Seek, S: AudioSink> {
    reader: R,
    sink: S,
    config: DecoderConfig,
    params: StreamParams,
    index: ChunkIndex,
    cursor: DemuxCursor,
    video: VideoTrack,
    audio: Option<AudioTrack>,
    state: DecoderState,
    /// Whether the stream currently sits at `cursor.resume_offset`.
    at_resume: bool,
    warned_orphan_audio: bool,
}

impl<R: Read + Seek, S: AudioSink> MovieDecoder<R, S> {
    pub fn open(reader: R, sink: S) -> MovieResult<Self> {
        Self::open_with_config(reader, sink, DecoderConfig::default())
    }

    /// Parse the header, probe for an audio track and leave the decoder
    /// ready for the first `decode_next_unit`. Nothing is kept on failure.
    pub fn open_with_config(mut reader: R, sink: S, config: DecoderConfig) -> MovieResult<Self> {
        let params = parse_header(&mut reader)?;
        let first_chunk = params.first_chunk_offset;
        reader.seek(SeekFrom::Start(first_chunk))?;
        let video = VideoTrack::new(params)?;

        tracing::info!(
            "Opened {:?} movie: {}x{}, first chunk at {}",
            params.format,
            params.width,
            params.height,
            first_chunk
        );

        let mut decoder = Self {
            reader,
            sink,
            config,
            params,
            index: ChunkIndex::new(),
            cursor: DemuxCursor {
                resume_offset: first_chunk,
                video_frontier: 0,
                audio_frontier: 0,
            },
            video,
            audio: None,
            state: DecoderState::HeaderParsed,
            at_resume: true,
            warned_orphan_audio: false,
        };

        decoder.probe(first_chunk)?;
        Ok(decoder)
    }

    /// Scan a bounded number of chunks looking for the audio header, then
    /// rewind to the first content chunk. Every visited chunk stays indexed.
    fn probe(&mut self, first_chunk: u64) -> MovieResult<()> {
        self.state = DecoderState::Probing;

        for _ in 0..self.config.probe_chunk_limit {
            let header = self.read_fresh()?;

            if header.kind.track() == TrackKind::End {
                tracing::debug!("Probe hit end of stream after {} chunks", self.index.len());
                break;
            }

            let found = if header.kind.track() == TrackKind::Audio {
                AudioTrack::discover(&mut self.reader, &header)?
            } else {
                self.skip_chunk(&header)?;
                None
            };
            self.cursor.resume_offset = self.reader.stream_position()?;

            if let Some(track) = found {
                tracing::debug!(
                    "Found {:?} audio track at chunk {}: {} Hz, {} channel(s)",
                    track.codec(),
                    self.index.len() - 1,
                    track.sample_rate(),
                    track.channels()
                );
                self.audio = Some(track);
                break;
            }
        }

        if self.audio.is_none() {
            tracing::debug!("No audio track within the first {} chunks", self.index.len());
        }

        self.reader.seek(SeekFrom::Start(first_chunk))?;
        self.at_resume = first_chunk == self.cursor.resume_offset;
        self.state = DecoderState::Ready;
        Ok(())
    }

    /// Advance until one new frame is decoded and audio is buffered up to
    /// `clock_ms` plus the lookahead, or the stream ends.
    pub fn decode_next_unit(&mut self, clock_ms: u64) -> MovieResult<UnitResult> {
        match self.state {
            DecoderState::Error => return Err(MovieError::Poisoned),
            DecoderState::Draining => return Ok(UnitResult::EndOfStream),
            _ => {}
        }

        self.state = DecoderState::Decoding;
        match self.decode_round(clock_ms) {
            Ok(UnitResult::NewFrame) => {
                self.state = DecoderState::Ready;
                Ok(UnitResult::NewFrame)
            }
            Ok(UnitResult::EndOfStream) => {
                self.state = DecoderState::Draining;
                Ok(UnitResult::EndOfStream)
            }
            Err(e) => {
                tracing::warn!("Movie decode failed at chunk cursor {:?}: {}", self.cursor, e);
                self.state = DecoderState::Error;
                Err(e)
            }
        }
    }

    fn decode_round(&mut self, clock_ms: u64) -> MovieResult<UnitResult> {
        let watermark = clock_ms.saturating_add(self.config.audio_lookahead_ms);
        let mut audio_done = self.audio_satisfied(watermark);
        let mut video_done = false;

        let mut scan_pos = match self.audio {
            Some(_) => self.cursor.video_frontier.min(self.cursor.audio_frontier),
            None => self.cursor.video_frontier,
        };

        tracing::trace!(clock_ms, watermark, audio_done, scan_pos, "decode round");

        loop {
            let (entry, fresh) = self.locate(scan_pos)?;

            match entry.kind.track() {
                TrackKind::End => {
                    if !video_done {
                        self.video.mark_end_of_track();
                        tracing::info!(
                            "End of movie after {} frames ({} chunks indexed)",
                            self.video.cur_frame_index() + 1,
                            self.index.len()
                        );
                        return Ok(UnitResult::EndOfStream);
                    }
                    break;
                }
                TrackKind::Video => {
                    if !video_done && scan_pos >= self.cursor.video_frontier {
                        let header = self.header_for(entry, fresh)?;
                        if header.kind.is_frame() {
                            self.video.decode_frame(&mut self.reader, &header)?;
                            video_done = true;
                        } else {
                            self.video.decode_palette(&mut self.reader)?;
                        }
                        self.cursor.video_frontier = scan_pos + 1;
                    } else if let Some(header) = fresh {
                        self.skip_chunk(&header)?;
                    }
                }
                TrackKind::Audio => {
                    if self.audio.is_some() && !audio_done && scan_pos >= self.cursor.audio_frontier {
                        let header = self.header_for(entry, fresh)?;
                        if let Some(track) = self.audio.as_mut() {
                            track.queue_audio(&mut self.reader, &header, &mut self.sink)?;
                        }
                        self.cursor.audio_frontier = scan_pos + 1;
                        audio_done = self.audio_satisfied(watermark);
                        if audio_done {
                            tracing::debug!("Audio watermark {} ms reached at chunk {}", watermark, scan_pos);
                        }
                    } else if let Some(header) = fresh {
                        if self.audio.is_none() && !self.warned_orphan_audio {
                            tracing::warn!("Audio chunk at {} but no audio track was found while probing", entry.offset);
                            self.warned_orphan_audio = true;
                        }
                        self.skip_chunk(&header)?;
                    }
                }
                TrackKind::Neither => {
                    if let Some(header) = fresh {
                        self.skip_chunk(&header)?;
                    }
                }
            }

            if fresh.is_some() {
                self.cursor.resume_offset = self.reader.stream_position()?;
            }

            scan_pos += 1;
            if video_done && audio_done {
                break;
            }
        }

        Ok(UnitResult::NewFrame)
    }

    // ------------------------------------------------------------------------
    // Cursor management
    // ------------------------------------------------------------------------

    /// Resolve a scan position through the index. A fresh read leaves the
    /// stream just past the chunk header and returns that header.
    fn locate(&mut self, scan_pos: usize) -> MovieResult<(ChunkIndexEntry, Option<ChunkHeader>)> {
        if let Resolved::Cached(entry) = self.index.resolve(scan_pos) {
            return Ok((entry, None));
        }
        debug_assert_eq!(scan_pos, self.index.len());

        let header = self.read_fresh()?;
        let entry = ChunkIndexEntry {
            kind: header.kind,
            offset: header.offset,
        };
        Ok((entry, Some(header)))
    }

    /// Read the next unvisited chunk header at `resume_offset` and index it.
    fn read_fresh(&mut self) -> MovieResult<ChunkHeader> {
        if !self.at_resume {
            self.reader.seek(SeekFrom::Start(self.cursor.resume_offset))?;
            self.at_resume = true;
        }

        let header = read_chunk_header(self.params.format, &mut self.reader, self.cursor.resume_offset)?;
        let entry = ChunkIndexEntry {
            kind: header.kind,
            offset: header.offset,
        };
        let scan_pos = self.index.append(entry);
        tracing::trace!(scan_pos, kind = ?entry.kind, offset = entry.offset, "indexed chunk");

        Ok(header)
    }

    /// Position the stream at a chunk's body. Fresh chunks already are;
    /// cached ones cost a seek and a header re-read.
    fn header_for(&mut self, entry: ChunkIndexEntry, fresh: Option<ChunkHeader>) -> MovieResult<ChunkHeader> {
        if let Some(header) = fresh {
            return Ok(header);
        }
        self.reader.seek(SeekFrom::Start(entry.offset))?;
        self.at_resume = false;
        read_chunk_header(self.params.format, &mut self.reader, entry.offset)
    }

    fn skip_chunk(&mut self, header: &ChunkHeader) -> MovieResult<()> {
        match header.kind.track() {
            TrackKind::Video if header.kind.is_frame() => self.video.skip_frame(&mut self.reader, header),
            TrackKind::Video => VideoTrack::skip_palette(&mut self.reader),
            TrackKind::Audio => AudioTrack::skip_audio(&mut self.reader, header),
            TrackKind::Neither => skip(&mut self.reader, header.body_len.unwrap_or(0))
                .map_err(|e| MovieError::from_read(e, "control chunk")),
            TrackKind::End => Ok(()),
        }
    }

    fn audio_satisfied(&self, watermark: u64) -> bool {
        self.audio
            .as_ref()
            .map_or(true, |track| track.queued_duration_ms() >= watermark)
    }

    // ------------------------------------------------------------------------
    // Host accessors
    // ------------------------------------------------------------------------

    pub fn frame(&self) -> FrameView<'_> {
        self.video.frame()
    }

    pub fn palette(&self) -> &Palette {
        self.video.palette()
    }

    pub fn take_dirty_palette(&mut self) -> Option<Palette> {
        self.video.take_dirty_palette()
    }

    pub fn video(&self) -> &VideoTrack {
        &self.video
    }

    pub fn audio(&self) -> Option<&AudioTrack> {
        self.audio.as_ref()
    }

    pub fn params(&self) -> &StreamParams {
        &self.params
    }

    pub fn cursor(&self) -> DemuxCursor {
        self.cursor
    }

    pub fn index(&self) -> &ChunkIndex {
        &self.index
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// The backing stream, for inspection only.
    pub fn stream(&self) -> &R {
        &self.reader
    }

    pub fn info(&self) -> MovieInfo {
        MovieInfo {
            format: self.params.format,
            width: self.params.width,
            height: self.params.height,
            pixel_format: PixelFormat::Indexed8,
            regular_frame_delay_ms: self.params.ticks_to_ms(self.params.regular_frame_delay as u64),
            video_codec: self.params.video_codec,
            frame_count: self.params.frame_count,
            audio: self.audio.as_ref().map(|track| AudioInfo {
                sample_rate: track.sample_rate(),
                channels: track.channels(),
                codec: track.codec(),
            }),
            indexed_chunks: self.index.len(),
        }
    }

    /// End the session, dropping the stream, the index and both tracks.
    pub fn close(self) {
        tracing::debug!(
            "Closing movie decoder in state {:?} after {} frames",
            self.state,
            self.video.cur_frame_index() + 1
        );
    }
}

/// Open a movie file and describe it as JSON.
pub fn movie_probe<P: AsRef<Path>>(path: P) -> MovieResult<serde_json::Value> {
    let file = BufReader::new(File::open(path)?);
    let decoder = MovieDecoder::open(file, NullAudioSink)?;
    Ok(serde_json::to_value(decoder.info())?)
}
