//! Error types for alphabet mapping, training, persistence and reporting.

use std::{fmt, io, path::PathBuf, str::FromStr};

use indicatif::style::TemplateError;
use serde::{Deserialize, Serialize};

use crate::types::{LexId, Token};

/// Controls how characters outside the alphabet block are handled when a
/// symbol string is decoded back to lexer IDs.
///
/// `Drop` mirrors the historical behavior of silently discarding foreign
/// characters; `Fail` turns them into [`AlphabetError::UnknownSymbol`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnknownSymbolMode {
    /// Skip characters outside the alphabet block.
    #[default]
    Drop,
    /// Reject characters outside the alphabet block.
    Fail,
}

impl FromStr for UnknownSymbolMode {
    type Err = String;

    /// Parses a mode string ("drop" or "fail").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drop" => Ok(Self::Drop),
            "fail" => Ok(Self::Fail),
            _ => Err(format!(
                "invalid unknown-symbol mode: {s:?} (expected \"drop\" or \"fail\")"
            )),
        }
    }
}

/// Errors raised by the alphabet mapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlphabetError {
    /// Lexer ID is negative or not below the alphabet size.
    OutOfRange { id: i64, size: LexId },
    /// Character lies outside the reserved alphabet block.
    UnknownSymbol(char),
    /// Field is not a decimal integer.
    InvalidId(String),
}

impl fmt::Display for AlphabetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { id, size } => {
                write!(f, "lexer id {id} is out of range [0, {size})")
            }
            Self::UnknownSymbol(ch) => write!(
                f,
                "symbol U+{:04X} is outside the alphabet block",
                *ch as u32
            ),
            Self::InvalidId(field) => write!(f, "invalid lexer id: {field:?}"),
        }
    }
}

impl std::error::Error for AlphabetError {}

/// Errors caused by invalid configuration. Always fatal, raised before any
/// training work starts.
#[derive(Debug)]
pub enum ConfigError {
    /// Alphabet size is zero.
    EmptyAlphabet,
    /// Some code point of the alphabet block is not a Unicode scalar value.
    InvalidAlphabetBlock { offset: u32, size: LexId },
    /// The same special token was listed twice.
    DuplicateSpecialToken(String),
    /// Special token is empty or contains an alphabet symbol.
    InvalidSpecialToken(String),
    /// The unknown token is not one of the special tokens.
    UnknownTokenNotSpecial(String),
    /// Config file could not be read.
    Read { path: PathBuf, source: io::Error },
    /// Config file is not valid JSON for the config schema.
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyAlphabet => write!(f, "initial alphabet size must be at least 1"),
            Self::InvalidAlphabetBlock { offset, size } => write!(
                f,
                "alphabet block U+{offset:04X}..+{size} contains invalid code points"
            ),
            Self::DuplicateSpecialToken(tok) => write!(f, "duplicate special token: {tok:?}"),
            Self::InvalidSpecialToken(tok) => write!(
                f,
                "special token {tok:?} is empty or contains alphabet symbols"
            ),
            Self::UnknownTokenNotSpecial(tok) => {
                write!(f, "unknown token {tok:?} is not listed as a special token")
            }
            Self::Read { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors that abort a training run. No vocabulary is produced.
#[derive(Debug)]
pub enum TrainError {
    /// Corpus yielded no non-empty lines.
    EmptyCorpus,
    /// Target size leaves no room for merges.
    VocabTooSmall { target: usize, floor: usize },
    /// Configuration is invalid.
    Config(ConfigError),
    /// Corpus contains a symbol the alphabet cannot map. `line` is 1-based
    /// within `path`; `path` is `None` for in-memory corpora.
    Alphabet {
        path: Option<PathBuf>,
        line: usize,
        source: AlphabetError,
    },
    /// Reading the corpus failed.
    Io(io::Error),
    /// A learned merge could not be recorded in the vocabulary.
    Vocab(VocabError),
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
}

impl fmt::Display for TrainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCorpus => write!(f, "corpus contains no non-empty lines"),
            Self::VocabTooSmall { target, floor } => write!(
                f,
                "target vocabulary size {target} must exceed specials + alphabet ({floor})"
            ),
            Self::Config(e) => write!(f, "{e}"),
            Self::Alphabet {
                path: Some(path),
                line,
                source,
            } => write!(f, "{} line {line}: {source}", path.display()),
            Self::Alphabet {
                path: None,
                line,
                source,
            } => write!(f, "corpus line {line}: {source}"),
            Self::Io(e) => write!(f, "corpus read failed: {e}"),
            Self::Vocab(e) => write!(f, "vocabulary update failed: {e}"),
            Self::ProgressBarSetup(e) => write!(f, "template parsing failed: {e}"),
        }
    }
}

impl std::error::Error for TrainError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Config(e) => Some(e),
            Self::Alphabet { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            Self::Vocab(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for TrainError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<io::Error> for TrainError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<VocabError> for TrainError {
    fn from(e: VocabError) -> Self {
        Self::Vocab(e)
    }
}

/// Errors raised while persisting, loading or applying a vocabulary.
#[derive(Debug)]
pub enum VocabError {
    /// Reading or writing the model file failed.
    Io(io::Error),
    /// Model file is not valid JSON for the model schema.
    Json(serde_json::Error),
    /// Model content violates a vocabulary invariant.
    Corrupt(String),
    /// Stored alphabet parameters are invalid.
    Config(ConfigError),
    /// Character cannot be encoded and no unknown token is configured.
    UnknownSymbol(char),
    /// Vocabulary ID is not present.
    UnknownToken(Token),
}

impl fmt::Display for VocabError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "vocabulary i/o failed: {e}"),
            Self::Json(e) => write!(f, "invalid vocabulary model: {e}"),
            Self::Corrupt(msg) => write!(f, "corrupt vocabulary model: {msg}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::UnknownSymbol(ch) => write!(
                f,
                "symbol U+{:04X} is not in the vocabulary and no unknown token is set",
                *ch as u32
            ),
            Self::UnknownToken(t) => write!(f, "unknown token id: {t}"),
        }
    }
}

impl std::error::Error for VocabError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Config(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for VocabError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for VocabError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<ConfigError> for VocabError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

/// Errors raised while transcoding an ID corpus into symbol strings.
#[derive(Debug)]
pub enum TranscodeError {
    /// Reading input or writing output failed.
    Io(io::Error),
    /// A field on the given 1-based line could not be mapped.
    Line { line: usize, source: AlphabetError },
}

impl fmt::Display for TranscodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "transcode i/o failed: {e}"),
            Self::Line { line, source } => write!(f, "line {line}: {source}"),
        }
    }
}

impl std::error::Error for TranscodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Line { source, .. } => Some(source),
        }
    }
}

impl From<io::Error> for TranscodeError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors raised while loading an ID-to-text table or writing a report.
#[derive(Debug)]
pub enum ReportError {
    /// Reading the table or writing the report failed.
    Io(io::Error),
    /// Table line does not start with a decimal lexer ID.
    InvalidTableLine { line: usize, field: String },
    /// Raw vocabulary line is not `<content>\t<id>`.
    InvalidRawLine(String),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "report i/o failed: {e}"),
            Self::InvalidTableLine { line, field } => {
                write!(f, "token table line {line}: invalid lexer id {field:?}")
            }
            Self::InvalidRawLine(line) => write!(f, "malformed vocabulary line {line:?}"),
        }
    }
}

impl std::error::Error for ReportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::InvalidTableLine { .. } | Self::InvalidRawLine(_) => None,
        }
    }
}

impl From<io::Error> for ReportError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Errors raised while counting tokens of one corpus file.
///
/// In directory runs these are collected per file instead of aborting.
#[derive(Debug)]
pub enum CountError {
    /// Reading the file failed.
    Io(io::Error),
    /// A lexer ID on the given line could not be mapped.
    Alphabet { line: usize, source: AlphabetError },
    /// The line could not be encoded with the vocabulary.
    Encode { line: usize, source: VocabError },
    /// Progress bar template string was invalid.
    ProgressBarSetup(TemplateError),
}

impl fmt::Display for CountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "corpus read failed: {e}"),
            Self::Alphabet { line, source } => write!(f, "line {line}: {source}"),
            Self::Encode { line, source } => write!(f, "line {line}: {source}"),
            Self::ProgressBarSetup(e) => write!(f, "template parsing failed: {e}"),
        }
    }
}

impl std::error::Error for CountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Alphabet { source, .. } => Some(source),
            Self::Encode { source, .. } => Some(source),
            Self::ProgressBarSetup(_) => None,
        }
    }
}

impl From<io::Error> for CountError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}
