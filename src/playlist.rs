use std::{fmt, str::FromStr, sync::Arc};

use chrono::{DateTime, FixedOffset};

use crate::error::ParseError;

/// A parsed media playlist: ordered segments plus document-level metadata.
///
/// Constructed by [`crate::parse`]; not mutated afterwards.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaPlaylist {
    /// `#EXT-X-VERSION`. 0 when the document does not declare one.
    pub version: usize,
    /// `#EXT-X-TARGETDURATION`, the ceiling for every segment duration.
    pub target_duration: f32,
    /// Sequence number of the first segment, `#EXT-X-MEDIA-SEQUENCE`.
    pub media_sequence: u64,
    pub discontinuity_sequence: u64,
    pub allow_cache: bool,
    pub playlist_type: Option<PlaylistType>,
    pub i_frames_only: bool,
    pub segments: Vec<MediaSegment>,
}

impl MediaPlaylist {
    /// Parses a playlist document. Equivalent to [`crate::parse`].
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        crate::parser::parse(input)
    }

    /// Media sequence number of the segment at `index`.
    pub fn media_sequence_of(&self, index: usize) -> u64 {
        self.media_sequence + index as u64
    }
}

impl FromStr for MediaPlaylist {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        crate::parser::parse(s)
    }
}

/// One playable unit of media referenced by the playlist.
///
/// The `key` and `map` handles are shared: every segment between one
/// `#EXT-X-KEY`/`#EXT-X-MAP` tag and its replacement points at the same
/// instance.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MediaSegment {
    /// Segment duration in seconds, `#EXTINF`.
    pub duration: f32,
    pub title: Option<String>,
    /// Sub-range of the segment resource, `#EXT-X-BYTERANGE`.
    pub byte_range: Option<ByteRange>,
    pub discontinuity: bool,
    pub key: Option<Arc<Key>>,
    pub map: Option<Arc<Map>>,
    /// Absolute timestamp of the first sample, `#EXT-X-PROGRAM-DATE-TIME`.
    pub program_date_time: Option<DateTime<FixedOffset>>,
    pub date_range: Option<DateRange>,
    pub scte35_cmd: Option<String>,
    pub scte35_out: Option<String>,
    pub scte35_in: Option<String>,
    pub end_on_next: bool,
}

/// Decryption parameters from `#EXT-X-KEY`, applied to every subsequent
/// segment until replaced by the next key tag.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub method: KeyMethod,
    /// Location of the 16-byte key. Present unless `method` is `NONE`.
    pub uri: Option<String>,
    pub iv: Option<[u8; 16]>,
    /// `KEYFORMAT`, `"identity"` when not given.
    pub key_format: String,
    /// `KEYFORMATVERSIONS`, `"1"` when not given.
    pub key_format_versions: String,
}

impl Key {
    /// The effective initialization vector for a segment.
    ///
    /// When the key tag carried no `IV`, the media sequence number is used
    /// instead, big-endian and zero-padded to 16 bytes.
    pub fn iv_or_media_sequence(&self, media_sequence: u64) -> [u8; 16] {
        match self.iv {
            Some(iv) => iv,
            None => (media_sequence as u128).to_be_bytes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMethod {
    None,
    Aes128,
    SampleAes,
}

impl fmt::Display for KeyMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            KeyMethod::None => "NONE",
            KeyMethod::Aes128 => "AES-128",
            KeyMethod::SampleAes => "SAMPLE-AES",
        })
    }
}

/// Media initialization section from `#EXT-X-MAP`, shared across segments
/// the same way as [`Key`].
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub uri: String,
    pub byte_range: Option<ByteRange>,
}

/// A timed metadata interval from `#EXT-X-DATERANGE`.
#[derive(Debug, Clone, PartialEq)]
pub struct DateRange {
    pub id: String,
    pub class: Option<String>,
    pub start_date: DateTime<FixedOffset>,
    /// Never earlier than `start_date`.
    pub end_date: Option<DateTime<FixedOffset>>,
    /// Seconds, never negative.
    pub duration: Option<f32>,
    /// Seconds, never negative.
    pub planned_duration: Option<f32>,
}

/// A sub-region of a referenced resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub length: u64,
    pub offset: u64,
}

impl ByteRange {
    pub fn new(length: u64, offset: u64) -> Self {
        Self { length, offset }
    }

    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }

    pub fn to_http_range(&self) -> String {
        format!("bytes={}-{}", self.offset, self.end().saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaylistType {
    Vod,
    Event,
}

impl fmt::Display for PlaylistType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PlaylistType::Vod => "VOD",
            PlaylistType::Event => "EVENT",
        })
    }
}
