//! Error taxonomy for the movie decoder.
//!
//! Every error is fatal for the session that observed it. The decoder never
//! retries; the host is expected to close it and return to its caller.

use std::io;
use thiserror::Error;

use crate::container::FourCc;

/// Container-level problems: the bytes do not describe a movie we can read.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("Bad magic: expected {expected}, found {found:02X?}")]
    BadMagic { expected: &'static str, found: [u8; 4] },

    #[error("Truncated {what}")]
    Truncated { what: &'static str },

    #[error("Unknown chunk kind {code:#x} at offset {offset}")]
    UnknownChunk { code: u32, offset: u64 },

    #[error("Unsupported codec: {0}")]
    UnsupportedCodec(FourCc),

    #[error("Bad audio header: sync marker {0:#04x}")]
    BadAudioSync(u8),

    #[error("Unsupported channel count {channels} for codec {codec}")]
    UnsupportedChannels { codec: FourCc, channels: u32 },

    #[error("Unsupported sample rate {0} Hz")]
    UnsupportedSampleRate(u32),

    #[error("Bad frame dimensions {width}x{height}")]
    BadDimensions { width: u32, height: u32 },
}

/// Payload-level problems found while decoding a chunk body.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Pixel budget overrun: run of {run} with only {remaining} pixels left")]
    PixelBudget { run: usize, remaining: usize },

    #[error("Frame payload is {actual} bytes, expected {expected}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Partial frame start row {row} outside frame of height {height}")]
    StartRowOutOfRange { row: u16, height: u32 },

    #[error("Frame start time went backwards: {previous_ms} ms -> {next_ms} ms")]
    NonMonotonicTimestamp { previous_ms: u64, next_ms: u64 },
}

#[derive(Debug, Error)]
pub enum MovieError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame buffer allocation failed: {0}")]
    Alloc(#[from] std::collections::TryReserveError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Decoder already failed; close it")]
    Poisoned,
}

pub type MovieResult<T> = Result<T, MovieError>;

impl MovieError {
    /// Map an I/O error raised while reading `what`. Running out of bytes
    /// is a truncated container, everything else is a plain I/O failure.
    pub(crate) fn from_read(err: io::Error, what: &'static str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            MovieError::Format(FormatError::Truncated { what })
        } else {
            MovieError::Io(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncated() {
        let err = MovieError::from_read(io::ErrorKind::UnexpectedEof.into(), "palette");
        assert!(matches!(
            err,
            MovieError::Format(FormatError::Truncated { what: "palette" })
        ));
    }

    #[test]
    fn other_io_errors_pass_through() {
        let err = MovieError::from_read(io::ErrorKind::PermissionDenied.into(), "palette");
        assert!(matches!(err, MovieError::Io(_)));
    }

    #[test]
    fn messages_name_the_problem() {
        let err = MovieError::from(CodecError::StartRowOutOfRange { row: 130, height: 120 });
        assert_eq!(
            err.to_string(),
            "Partial frame start row 130 outside frame of height 120"
        );
    }
}
