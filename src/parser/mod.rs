//! The tag-driven parsing engine: tokenized lines are dispatched to per-tag
//! rules that mutate either the playlist or the pending segment, which is
//! flushed into the segment list when its `#EXTINF` arrives.

mod attribute;
mod line;

use std::sync::Arc;

use chrono::DateTime;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{
    error::{ParseError, ParseErrorKind, YomiResult},
    playlist::{
        ByteRange, DateRange, Key, KeyMethod, Map, MediaPlaylist, MediaSegment, PlaylistType,
    },
};
use attribute::{unquote, AttributePairs};
use line::{Line, Lines, HEADER};

/// `KEYFORMAT` and `KEYFORMATVERSIONS` require at least this protocol
/// version.
const KEY_FORMAT_MIN_VERSION: usize = 5;

/// Parses a media playlist document.
///
/// The whole document is validated while scanning; the first violation
/// aborts the parse with a line-located [`ParseError`].
pub fn parse(input: &str) -> Result<MediaPlaylist, ParseError> {
    Parser::new(input).run()
}

/// Drains `reader` to memory, then runs the synchronous parse.
pub async fn parse_async<R>(mut reader: R) -> YomiResult<MediaPlaylist>
where
    R: AsyncRead + Unpin,
{
    let mut content = String::new();
    reader.read_to_string(&mut content).await?;
    Ok(parse(&content)?)
}

#[derive(PartialEq)]
enum Flow {
    Scanning,
    Closed,
}

struct Parser<'a> {
    lines: Lines<'a>,
    playlist: MediaPlaylist,
    pending: PendingSegment,
    /// Applied to every flushed segment until replaced by the next tag.
    active_key: Option<Arc<Key>>,
    active_map: Option<Arc<Map>>,
    /// Resolved by the last `#EXT-X-BYTERANGE`, consumed by the next flush.
    pending_range: Option<ByteRange>,
    segment_ranges: RangeCursor,
    map_ranges: RangeCursor,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            lines: Lines::new(input),
            playlist: MediaPlaylist::default(),
            pending: PendingSegment::default(),
            active_key: None,
            active_map: None,
            pending_range: None,
            segment_ranges: RangeCursor::default(),
            map_ranges: RangeCursor::default(),
        }
    }

    fn run(mut self) -> Result<MediaPlaylist, ParseError> {
        self.expect_header()?;

        loop {
            let Some(line) = self.lines.next() else {
                return Err(ParseError::new(
                    self.lines.current_line(),
                    ParseErrorKind::MissingEndList,
                ));
            };
            let line_number = self.lines.current_line();

            let flow = match line {
                Line::Blank => Ok(Flow::Scanning),
                Line::Text(text) => Err(ParseErrorKind::UnexpectedLine(text.to_string())),
                Line::Directive { tag, value } => self.handle_tag(tag, value),
            }
            .map_err(|kind| ParseError::new(line_number, kind))?;

            if flow == Flow::Closed {
                break;
            }
        }

        log::debug!(
            "parsed media playlist with {} segments",
            self.playlist.segments.len()
        );
        Ok(self.playlist)
    }

    fn expect_header(&mut self) -> Result<(), ParseError> {
        loop {
            match self.lines.next() {
                Some(Line::Blank) => continue,
                Some(Line::Directive { tag, value: None }) if tag == HEADER => return Ok(()),
                _ => {
                    return Err(ParseError::new(
                        self.lines.current_line().max(1),
                        ParseErrorKind::MissingHeader,
                    ))
                }
            }
        }
    }

    fn handle_tag(&mut self, tag: &str, value: Option<&str>) -> Result<Flow, ParseErrorKind> {
        match (tag, value) {
            // #EXT-X-ENDLIST is a normal transition to the terminal state,
            // not an error path; everything after it is ignored.
            ("#EXT-X-ENDLIST", None) => return Ok(Flow::Closed),
            ("#EXT-X-DISCONTINUITY", None) => self.pending.discontinuity = true,
            ("#EXT-X-I-FRAMES-ONLY", None) => self.playlist.i_frames_only = true,
            ("#END-ON-NEXT", None) => self.pending.end_on_next = true,

            ("#EXT-X-VERSION", Some(value)) => self.playlist.version = value.parse()?,
            ("#EXT-X-TARGETDURATION", Some(value)) => {
                self.playlist.target_duration = value.parse()?
            }
            ("#EXT-X-MEDIA-SEQUENCE", Some(value)) => self.playlist.media_sequence = value.parse()?,
            ("#EXT-X-DISCONTINUITY-SEQUENCE", Some(value)) => {
                self.playlist.discontinuity_sequence = value.parse()?
            }
            ("#EXT-X-PLAYLIST-TYPE", Some(value)) => {
                self.playlist.playlist_type = Some(match value {
                    "VOD" => PlaylistType::Vod,
                    "EVENT" => PlaylistType::Event,
                    _ => return Err(ParseErrorKind::InvalidPlaylistType(value.to_string())),
                })
            }
            ("#EXT-X-ALLOW-CACHE", Some(value)) => {
                self.playlist.allow_cache = match value {
                    "YES" => true,
                    "NO" => false,
                    _ => return Err(ParseErrorKind::InvalidAllowCache(value.to_string())),
                }
            }
            ("#EXT-X-BYTERANGE", Some(value)) => {
                let (length, offset) = parse_range(value)?;
                self.pending_range = Some(self.segment_ranges.resolve(length, offset));
            }
            ("#EXT-X-KEY", Some(value)) => {
                let key = self.parse_key(value)?;
                self.active_key = Some(Arc::new(key));
            }
            ("#EXT-X-MAP", Some(value)) => {
                let map = self.parse_map(value)?;
                self.active_map = Some(Arc::new(map));
            }
            ("#EXT-X-PROGRAM-DATE-TIME", Some(value)) => {
                self.pending.program_date_time = Some(DateTime::parse_from_rfc3339(value)?)
            }
            ("#EXT-X-DATERANGE", Some(value)) => self.merge_date_range(value)?,
            ("#SCTE35-CMD", Some(value)) => self.pending.scte35_cmd = Some(value.to_string()),
            ("#SCTE35-OUT", Some(value)) => self.pending.scte35_out = Some(value.to_string()),
            ("#SCTE35-IN", Some(value)) => self.pending.scte35_in = Some(value.to_string()),
            ("#EXTINF", Some(value)) => self.flush_segment(value)?,

            _ => return Err(ParseErrorKind::UndefinedTag(tag.to_string())),
        }
        Ok(Flow::Scanning)
    }

    fn parse_key(&self, value: &str) -> Result<Key, ParseErrorKind> {
        let mut method = None;
        let mut uri = None;
        let mut iv = None;
        let mut key_format = None;
        let mut key_format_versions = None;

        for pair in AttributePairs::new(value) {
            let (attr, attr_value) = pair?;
            match attr {
                "METHOD" => {
                    method = Some(match attr_value {
                        "NONE" => KeyMethod::None,
                        "AES-128" => KeyMethod::Aes128,
                        "SAMPLE-AES" => KeyMethod::SampleAes,
                        _ => return Err(ParseErrorKind::InvalidKeyMethod(attr_value.to_string())),
                    })
                }
                "URI" => uri = Some(unquote(attr_value)?.to_string()),
                "IV" => iv = Some(parse_iv(attr_value)?),
                "KEYFORMAT" => {
                    self.require_version("KEYFORMAT")?;
                    key_format = Some(unquote(attr_value)?.to_string());
                }
                "KEYFORMATVERSIONS" => {
                    self.require_version("KEYFORMATVERSIONS")?;
                    let versions = unquote(attr_value)?;
                    if !is_key_format_versions(versions) {
                        return Err(ParseErrorKind::InvalidKeyFormatVersions(
                            attr_value.to_string(),
                        ));
                    }
                    key_format_versions = Some(versions.to_string());
                }
                // unknown attributes are ignored for forward compatibility
                _ => {}
            }
        }

        let method = method.ok_or(ParseErrorKind::MissingAttribute {
            tag: "#EXT-X-KEY",
            attribute: "METHOD",
        })?;
        if uri.is_none() && method != KeyMethod::None {
            return Err(ParseErrorKind::MissingAttribute {
                tag: "#EXT-X-KEY",
                attribute: "URI",
            });
        }

        Ok(Key {
            method,
            uri,
            iv,
            key_format: key_format.unwrap_or_else(|| "identity".to_string()),
            key_format_versions: key_format_versions.unwrap_or_else(|| "1".to_string()),
        })
    }

    fn parse_map(&mut self, value: &str) -> Result<Map, ParseErrorKind> {
        let mut uri = None;
        let mut byte_range = None;

        for pair in AttributePairs::new(value) {
            let (attr, attr_value) = pair?;
            match attr {
                "URI" => uri = Some(unquote(attr_value)?.to_string()),
                "BYTERANGE" => {
                    let (length, offset) = parse_range(unquote(attr_value)?)?;
                    byte_range = Some(self.map_ranges.resolve(length, offset));
                }
                _ => {}
            }
        }

        let uri = uri.ok_or(ParseErrorKind::MissingAttribute {
            tag: "#EXT-X-MAP",
            attribute: "URI",
        })?;
        Ok(Map { uri, byte_range })
    }

    fn merge_date_range(&mut self, value: &str) -> Result<(), ParseErrorKind> {
        let range = self.pending.date_range.get_or_insert_with(Default::default);

        for pair in AttributePairs::new(value) {
            let (attr, attr_value) = pair?;
            match attr {
                "ID" => range.id = Some(unquote(attr_value)?.to_string()),
                "CLASS" => range.class = Some(unquote(attr_value)?.to_string()),
                "START-DATE" => {
                    range.start_date = Some(DateTime::parse_from_rfc3339(unquote(attr_value)?)?)
                }
                "END-DATE" => {
                    range.end_date = Some(DateTime::parse_from_rfc3339(unquote(attr_value)?)?)
                }
                "DURATION" => {
                    range.duration = Some(parse_non_negative(unquote(attr_value)?, "DURATION")?)
                }
                "PLANNED-DURATION" => {
                    range.planned_duration =
                        Some(parse_non_negative(unquote(attr_value)?, "PLANNED-DURATION")?)
                }
                _ => {}
            }
        }

        if range.id.is_none() {
            return Err(ParseErrorKind::MissingAttribute {
                tag: "#EXT-X-DATERANGE",
                attribute: "ID",
            });
        }
        if range.start_date.is_none() {
            return Err(ParseErrorKind::MissingAttribute {
                tag: "#EXT-X-DATERANGE",
                attribute: "START-DATE",
            });
        }
        if let (Some(start), Some(end)) = (range.start_date, range.end_date) {
            if end < start {
                return Err(ParseErrorKind::EndDateBeforeStartDate);
            }
        }
        Ok(())
    }

    /// Handles `#EXTINF`: the only point where a segment enters the output.
    fn flush_segment(&mut self, value: &str) -> Result<(), ParseErrorKind> {
        let (duration, title): (f32, Option<String>) =
            if let Some(duration) = value.strip_suffix(',') {
                // two-line form: the title is the next physical line, verbatim
                let title = self
                    .lines
                    .next_raw()
                    .ok_or(ParseErrorKind::MissingTitleLine)?;
                (duration.parse()?, Some(title.to_string()))
            } else {
                match value.split_once(',') {
                    None => (value.parse()?, None),
                    Some((duration, title)) if !title.contains(',') => {
                        (duration.parse()?, Some(title.to_string()))
                    }
                    Some(_) => return Err(ParseErrorKind::InvalidExtInf(value.to_string())),
                }
            };

        // target duration is whatever has been declared up to this point
        if duration > self.playlist.target_duration {
            return Err(ParseErrorKind::DurationExceedsTarget {
                duration,
                target: self.playlist.target_duration,
            });
        }

        let pending = std::mem::take(&mut self.pending);
        self.playlist.segments.push(MediaSegment {
            duration,
            title,
            byte_range: self.pending_range.take(),
            discontinuity: pending.discontinuity,
            key: self.active_key.clone(),
            map: self.active_map.clone(),
            program_date_time: pending.program_date_time,
            date_range: pending.date_range.and_then(PendingDateRange::finish),
            scte35_cmd: pending.scte35_cmd,
            scte35_out: pending.scte35_out,
            scte35_in: pending.scte35_in,
            end_on_next: pending.end_on_next,
        });
        Ok(())
    }

    fn require_version(&self, attribute: &'static str) -> Result<(), ParseErrorKind> {
        if self.playlist.version < KEY_FORMAT_MIN_VERSION {
            return Err(ParseErrorKind::VersionGated {
                attribute,
                version: self.playlist.version,
                min_version: KEY_FORMAT_MIN_VERSION,
            });
        }
        Ok(())
    }
}

/// Segment metadata accumulated across tag lines until the next `#EXTINF`
/// flushes it.
#[derive(Default)]
struct PendingSegment {
    discontinuity: bool,
    program_date_time: Option<chrono::DateTime<chrono::FixedOffset>>,
    date_range: Option<PendingDateRange>,
    scte35_cmd: Option<String>,
    scte35_out: Option<String>,
    scte35_in: Option<String>,
    end_on_next: bool,
}

/// `#EXT-X-DATERANGE` merges lazily, so all fields stay optional until the
/// segment is flushed.
#[derive(Default)]
struct PendingDateRange {
    id: Option<String>,
    class: Option<String>,
    start_date: Option<chrono::DateTime<chrono::FixedOffset>>,
    end_date: Option<chrono::DateTime<chrono::FixedOffset>>,
    duration: Option<f32>,
    planned_duration: Option<f32>,
}

impl PendingDateRange {
    fn finish(self) -> Option<DateRange> {
        match (self.id, self.start_date) {
            (Some(id), Some(start_date)) => Some(DateRange {
                id,
                class: self.class,
                start_date,
                end_date: self.end_date,
                duration: self.duration,
                planned_duration: self.planned_duration,
            }),
            // presence was already checked when the tag was merged
            _ => None,
        }
    }
}

/// Remembers one past the end of the last resolved range of one tag kind,
/// so that a length-only range continues where the previous one stopped.
#[derive(Default)]
struct RangeCursor {
    end: Option<u64>,
}

impl RangeCursor {
    fn resolve(&mut self, length: u64, offset: Option<u64>) -> ByteRange {
        let offset = offset.or(self.end).unwrap_or(0);
        self.end = Some(offset + length);
        ByteRange { length, offset }
    }
}

/// Parses a `<length>[@<offset>]` range value.
fn parse_range(value: &str) -> Result<(u64, Option<u64>), ParseErrorKind> {
    match value.split_once('@') {
        Some((length, offset)) => Ok((length.parse()?, Some(offset.parse()?))),
        None => Ok((value.parse()?, None)),
    }
}

fn parse_iv(value: &str) -> Result<[u8; 16], ParseErrorKind> {
    let digits = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
        .unwrap_or(value);
    let bytes = hex::decode(digits)?;
    bytes
        .try_into()
        .map_err(|_| ParseErrorKind::InvalidIvLength(value.to_string()))
}

/// One or more `/`-separated runs of digits, e.g. `1` or `1/2/5`.
fn is_key_format_versions(value: &str) -> bool {
    !value.is_empty()
        && value
            .split('/')
            .all(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
}

fn parse_non_negative(value: &str, attribute: &'static str) -> Result<f32, ParseErrorKind> {
    let parsed: f32 = value.parse()?;
    if parsed < 0.0 {
        return Err(ParseErrorKind::NegativeDuration {
            attribute,
            value: parsed,
        });
    }
    Ok(parsed)
}
