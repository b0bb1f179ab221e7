use thiserror::Error;

#[derive(Error, Debug)]
pub enum YomiError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type YomiResult<T> = Result<T, YomiError>;

/// A parse failure located at a 1-based line of the input document.
///
/// The first failure aborts the parse; no partial playlist is returned.
#[derive(Error, Debug)]
#[error("invalid m3u8 document at line {line}: {kind}")]
pub struct ParseError {
    line: usize,
    #[source]
    kind: ParseErrorKind,
}

impl ParseError {
    pub(crate) fn new(line: usize, kind: ParseErrorKind) -> Self {
        Self { line, kind }
    }

    pub fn line(&self) -> usize {
        self.line
    }

    pub fn kind(&self) -> &ParseErrorKind {
        &self.kind
    }

    pub fn into_kind(self) -> ParseErrorKind {
        self.kind
    }
}

#[derive(Error, Debug)]
pub enum ParseErrorKind {
    #[error("first line must be #EXTM3U")]
    MissingHeader,

    #[error("undefined tag {0}")]
    UndefinedTag(String),

    #[error("unexpected line [{0}]")]
    UnexpectedLine(String),

    #[error("#EXT-X-ENDLIST not found before end of input")]
    MissingEndList,

    #[error("#EXTINF expects a title on the next line, but the input ended")]
    MissingTitleLine,

    #[error("attribute item [{0}] is not KEY=VALUE")]
    InvalidAttributeItem(String),

    #[error("unmatched quotes in [{0}]")]
    UnmatchedQuotes(String),

    #[error("#EXTINF value [{0}] is not duration[,title]")]
    InvalidExtInf(String),

    #[error("segment duration {duration} exceeds target duration {target}")]
    DurationExceedsTarget { duration: f32, target: f32 },

    #[error("{tag} requires the {attribute} attribute")]
    MissingAttribute {
        tag: &'static str,
        attribute: &'static str,
    },

    #[error("END-DATE is earlier than START-DATE")]
    EndDateBeforeStartDate,

    #[error("{attribute} must not be negative, got {value}")]
    NegativeDuration {
        attribute: &'static str,
        value: f32,
    },

    #[error("IV must be 16 bytes (32 hex digits), got [{0}]")]
    InvalidIvLength(String),

    #[error("{attribute} requires protocol version {min_version}, playlist declares {version}")]
    VersionGated {
        attribute: &'static str,
        version: usize,
        min_version: usize,
    },

    #[error("unknown playlist type [{0}]")]
    InvalidPlaylistType(String),

    #[error("#EXT-X-ALLOW-CACHE must be YES or NO, got [{0}]")]
    InvalidAllowCache(String),

    #[error("unknown key method [{0}]")]
    InvalidKeyMethod(String),

    #[error("KEYFORMATVERSIONS must be /-separated integers, got [{0}]")]
    InvalidKeyFormatVersions(String),

    #[error("invalid integer")]
    InvalidInt(#[from] std::num::ParseIntError),

    #[error("invalid float")]
    InvalidFloat(#[from] std::num::ParseFloatError),

    #[error("invalid date")]
    InvalidDate(#[from] chrono::ParseError),

    #[error("invalid hex value")]
    InvalidHex(#[from] hex::FromHexError),
}
