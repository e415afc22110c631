//! Corpus transcoding between lexer-ID lines and alphabet symbol strings.
//!
//! An ID line such as `"12 7 7 3"` becomes a string of four alphabet symbols
//! with no separators. Transcoding streams line by line: blank lines are
//! skipped, every other line produces exactly one output line.

use std::{
    fs::File,
    io::{BufRead, BufReader, Write},
    path::Path,
};

use tracing::info;

use crate::{
    alphabet::AlphabetMapper,
    error::{AlphabetError, TranscodeError, UnknownSymbolMode},
    types::LexId,
    vocab::write_atomically,
};

/// Line counts produced by a transcoding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscodeStats {
    /// Lines read from the input, blank ones included.
    pub lines_read: usize,
    /// Lines written to the output.
    pub lines_written: usize,
    /// Total symbols written.
    pub symbols_written: usize,
}

/// Concatenates the symbol of every ID in order.
///
/// # Errors
///
/// Returns [`AlphabetError::OutOfRange`] for the first ID outside the alphabet.
pub fn encode_line(mapper: &AlphabetMapper, ids: &[LexId]) -> Result<String, AlphabetError> {
    ids.iter().map(|&id| mapper.id_to_symbol(id)).collect()
}

/// Parses a whitespace-separated line of decimal IDs and encodes it.
///
/// # Errors
///
/// Returns [`AlphabetError::InvalidId`] or [`AlphabetError::OutOfRange`] for
/// the first field that cannot be mapped.
pub fn encode_text_line(mapper: &AlphabetMapper, line: &str) -> Result<String, AlphabetError> {
    line.split_whitespace()
        .map(|field| mapper.parse_id(field).and_then(|id| mapper.id_to_symbol(id)))
        .collect()
}

/// Decodes a symbol string back to lexer IDs.
///
/// Characters outside the alphabet block are dropped in
/// [`UnknownSymbolMode::Drop`] and rejected in [`UnknownSymbolMode::Fail`].
///
/// # Errors
///
/// Returns [`AlphabetError::UnknownSymbol`] only in `Fail` mode.
pub fn decode_line(
    mapper: &AlphabetMapper,
    line: &str,
    mode: UnknownSymbolMode,
) -> Result<Vec<LexId>, AlphabetError> {
    let mut ids = Vec::with_capacity(line.len() / 3);
    for ch in line.chars() {
        match mapper.symbol_to_id(ch) {
            Ok(id) => ids.push(id),
            Err(e) => match mode {
                UnknownSymbolMode::Drop => continue,
                UnknownSymbolMode::Fail => return Err(e),
            },
        }
    }
    Ok(ids)
}

/// Streams an ID corpus from `reader` to `writer` as symbol strings.
///
/// # Errors
///
/// Returns [`TranscodeError::Line`] naming the 1-based line of the first
/// unmappable field, or [`TranscodeError::Io`] on read/write failure.
pub fn transcode<R: BufRead, W: Write>(
    mapper: &AlphabetMapper,
    reader: R,
    mut writer: W,
) -> Result<TranscodeStats, TranscodeError> {
    let mut stats = TranscodeStats::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        stats.lines_read += 1;

        if line.trim().is_empty() {
            continue;
        }

        let encoded = encode_text_line(mapper, &line)
            .map_err(|source| TranscodeError::Line { line: idx + 1, source })?;

        stats.symbols_written += encoded.chars().count();
        writer.write_all(encoded.as_bytes())?;
        writer.write_all(b"\n")?;
        stats.lines_written += 1;
    }

    writer.flush()?;
    Ok(stats)
}

/// Transcodes `input` into `output`.
///
/// The output is written to a temporary file next to `output` and renamed into
/// place only when the whole input transcoded successfully.
///
/// # Errors
///
/// See [`transcode`].
pub fn transcode_file(
    mapper: &AlphabetMapper,
    input: &Path,
    output: &Path,
) -> Result<TranscodeStats, TranscodeError> {
    let reader = BufReader::new(File::open(input)?);
    let mut stats = TranscodeStats::default();
    write_atomically(output, |w| {
        stats = transcode(mapper, reader, w)?;
        Ok::<_, TranscodeError>(())
    })?;

    info!(
        input = %input.display(),
        output = %output.display(),
        lines = stats.lines_written,
        skipped = stats.lines_read - stats.lines_written,
        "transcoded corpus"
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::alphabet::DEFAULT_OFFSET;

    fn mapper() -> AlphabetMapper {
        AlphabetMapper::new(8, DEFAULT_OFFSET).expect("valid alphabet block")
    }

    #[test]
    fn test_encode_line_concatenates_symbols() {
        let encoded = encode_line(&mapper(), &[0, 3, 3]).expect("ids in range");
        assert_eq!(encoded, "\u{E000}\u{E003}\u{E003}");
    }

    #[test]
    fn test_encode_decode_round_trip() {
        let m = mapper();
        let ids = vec![7, 0, 1, 1, 6, 2];
        let encoded = encode_line(&m, &ids).expect("ids in range");
        assert_eq!(encoded.chars().count(), ids.len());
        let decoded = decode_line(&m, &encoded, UnknownSymbolMode::Fail).expect("all symbols known");
        assert_eq!(decoded, ids);
    }

    #[test]
    fn test_encode_text_line_rejects_bad_fields() {
        let m = mapper();
        assert_eq!(
            encode_text_line(&m, "1 9"),
            Err(AlphabetError::OutOfRange { id: 9, size: 8 })
        );
        assert_eq!(
            encode_text_line(&m, "1 foo"),
            Err(AlphabetError::InvalidId("foo".into()))
        );
    }

    #[test]
    fn test_decode_drops_foreign_characters() {
        // one in-range symbol and one foreign character
        let decoded = decode_line(&mapper(), "\u{E002}x", UnknownSymbolMode::Drop)
            .expect("drop mode never fails");
        assert_eq!(decoded, vec![2]);
    }

    #[test]
    fn test_decode_fail_mode_rejects_foreign_characters() {
        let result = decode_line(&mapper(), "\u{E002}x", UnknownSymbolMode::Fail);
        assert_eq!(result, Err(AlphabetError::UnknownSymbol('x')));
    }

    #[test]
    fn test_transcode_skips_blank_lines() {
        let input = Cursor::new("0 1\n\n   \n2\n");
        let mut out = Vec::new();
        let stats = transcode(&mapper(), input, &mut out).expect("valid corpus");

        assert_eq!(stats.lines_read, 4);
        assert_eq!(stats.lines_written, 2);
        assert_eq!(stats.symbols_written, 3);
        let text = String::from_utf8(out).expect("utf-8 output");
        assert_eq!(text, "\u{E000}\u{E001}\n\u{E002}\n");
    }

    #[test]
    fn test_transcode_reports_line_number() {
        let input = Cursor::new("0 1\n\n5 12\n");
        let result = transcode(&mapper(), input, Vec::new());
        match result {
            Err(TranscodeError::Line { line, source }) => {
                assert_eq!(line, 3);
                assert_eq!(source, AlphabetError::OutOfRange { id: 12, size: 8 });
            }
            other => panic!("expected line error, got {other:?}"),
        }
    }

    #[test]
    fn test_transcode_file_leaves_no_partial_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("ids.txt");
        let output = dir.path().join("unicode.txt");
        std::fs::write(&input, "0 1\n99\n").expect("write input");

        assert!(transcode_file(&mapper(), &input, &output).is_err());
        assert!(!output.exists());

        std::fs::write(&input, "0 1\n7\n").expect("write input");
        let stats = transcode_file(&mapper(), &input, &output).expect("valid corpus");
        assert_eq!(stats.lines_written, 2);
        let text = std::fs::read_to_string(&output).expect("read output");
        assert_eq!(text.lines().count(), 2);
    }
}
