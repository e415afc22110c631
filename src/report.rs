//! Vocabulary reports.
//!
//! Two line-oriented renderings of a [`Vocabulary`], both `<content>\t<id>`
//! in ascending ID order:
//!
//! - raw: the lexer IDs an entry spells, space separated;
//! - readable: the source text of those IDs, looked up in an
//!   [`IdToTokenTable`]. Identifier placeholders are left out, and merged
//!   entries show their parts and the concatenation:
//!   `def + ( -> "def("`.
//!
//! Special tokens are written verbatim in both.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use tracing::info;

use crate::{
    error::ReportError,
    types::{LexId, Token},
    vocab::{Vocabulary, write_atomically},
};

/// Constituents whose text contains this marker are left out of readable
/// entries.
const IDENTIFIER_MARKER: &str = "IDENTIFIER";

/// Lexer ID to source text, as dumped by the lexer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdToTokenTable {
    texts: HashMap<LexId, String>,
}

impl IdToTokenTable {
    /// Parses `<id> <ignored> <text...>` lines.
    ///
    /// The text is every field after the second, joined by single spaces. A
    /// line with fewer than three fields maps its ID to empty text. Blank
    /// lines are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`ReportError::InvalidTableLine`] naming the 1-based line whose
    /// first field is not a lexer ID.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, ReportError> {
        let mut texts = HashMap::new();
        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            let mut fields = line.split_whitespace();
            let Some(first) = fields.next() else {
                continue;
            };
            let id: LexId = first.parse().map_err(|_| ReportError::InvalidTableLine {
                line: idx + 1,
                field: first.to_string(),
            })?;
            let text = fields.skip(1).collect::<Vec<_>>().join(" ");
            texts.insert(id, text);
        }
        Ok(Self { texts })
    }

    /// Reads a table from a file.
    ///
    /// # Errors
    ///
    /// See [`IdToTokenTable::parse`].
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        Self::parse(BufReader::new(File::open(path)?))
    }

    /// Source text of a lexer ID.
    pub fn text(&self, id: LexId) -> Option<&str> {
        self.texts.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

/// One line of a raw report read back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawEntry {
    /// A regular entry: the lexer IDs it spells and its vocabulary ID.
    Ids(Vec<LexId>, Token),
    /// A special token written verbatim.
    Special(String, Token),
}

/// Parses one line written by [`write_raw`].
///
/// # Errors
///
/// Returns [`ReportError::InvalidRawLine`] if the line has no tab or the ID
/// is not a number.
pub fn parse_raw_line(line: &str) -> Result<RawEntry, ReportError> {
    let invalid = || ReportError::InvalidRawLine(line.to_string());
    let (content, id) = line.rsplit_once('\t').ok_or_else(invalid)?;
    let id: Token = id.trim().parse().map_err(|_| invalid())?;

    let ids: Option<Vec<LexId>> = content
        .split(' ')
        .map(|field| field.parse().ok())
        .collect();
    match ids {
        Some(ids) if !content.is_empty() => Ok(RawEntry::Ids(ids, id)),
        _ => Ok(RawEntry::Special(content.to_string(), id)),
    }
}

/// Writes every entry as `<lexer ids>\t<id>`. Returns the number of lines.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if writing fails.
pub fn write_raw<W: Write>(vocab: &Vocabulary, mut writer: W) -> Result<usize, ReportError> {
    let mut written = 0;
    for entry in vocab.entries() {
        match vocab.lex_ids(entry.id) {
            Some(ids) => {
                let ids: Vec<String> = ids.iter().map(LexId::to_string).collect();
                writeln!(writer, "{}\t{}", ids.join(" "), entry.id)?;
            }
            None => writeln!(writer, "{}\t{}", entry.symbols, entry.id)?,
        }
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Writes every entry with lexer IDs replaced by their source text.
///
/// IDs missing from `table` are shown as their decimal value. Entries made
/// only of identifier placeholders are skipped. A merged entry with a single
/// non-placeholder part is written in the base form (`text\t<id>`), so it
/// reads like that part's own base entry apart from the ID. Returns the
/// number of lines.
///
/// # Errors
///
/// Returns [`ReportError::Io`] if writing fails.
pub fn write_readable<W: Write>(
    vocab: &Vocabulary,
    table: &IdToTokenTable,
    mut writer: W,
) -> Result<usize, ReportError> {
    let mut written = 0;
    for entry in vocab.entries() {
        let Some(ids) = vocab.lex_ids(entry.id) else {
            writeln!(writer, "{}\t{}", entry.symbols, entry.id)?;
            written += 1;
            continue;
        };

        let parts: Vec<String> = ids
            .iter()
            .map(|&id| match table.text(id) {
                Some(text) => text.to_string(),
                None => id.to_string(),
            })
            .filter(|text| !text.contains(IDENTIFIER_MARKER))
            .collect();

        match parts.as_slice() {
            [] => continue,
            [single] => writeln!(writer, "{single}\t{}", entry.id)?,
            _ => writeln!(
                writer,
                "{} -> \"{}\"\t{}",
                parts.join(" + "),
                parts.concat(),
                entry.id
            )?,
        }
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// [`write_raw`] into `path`, replaced atomically.
///
/// # Errors
///
/// Returns [`ReportError::Io`]; `path` is untouched on failure.
pub fn write_raw_file(vocab: &Vocabulary, path: &Path) -> Result<usize, ReportError> {
    let mut written = 0;
    write_atomically(path, |w| {
        written = write_raw(vocab, w)?;
        Ok::<_, ReportError>(())
    })?;
    info!(path = %path.display(), lines = written, "wrote raw vocabulary");
    Ok(written)
}

/// [`write_readable`] into `path`, replaced atomically.
///
/// # Errors
///
/// Returns [`ReportError::Io`]; `path` is untouched on failure.
pub fn write_readable_file(
    vocab: &Vocabulary,
    table: &IdToTokenTable,
    path: &Path,
) -> Result<usize, ReportError> {
    let mut written = 0;
    write_atomically(path, |w| {
        written = write_readable(vocab, table, w)?;
        Ok::<_, ReportError>(())
    })?;
    info!(path = %path.display(), lines = written, "wrote readable vocabulary");
    Ok(written)
}
