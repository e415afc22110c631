//! Token counting: how many vocabulary tokens a corpus costs.
//!
//! A single file is streamed on the calling thread. A directory tree is
//! counted one file per rayon task; each task returns its own [`FileStats`]
//! and the caller sums them, so a failing file costs nothing but its own
//! contribution.

use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use indicatif::ParallelProgressIterator;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    corpus::{CorpusFormat, CorpusSource},
    error::{CountError, UnknownSymbolMode},
    progress::progress_bar,
    vocab::Vocabulary,
};

/// Lines between progress events when counting a single file.
const LOG_EVERY_LINES: u64 = 100_000;

/// Options for a counting run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountOptions {
    /// How corpus lines are written.
    pub format: CorpusFormat,
    /// Draw a progress bar over files for directory trees.
    pub show_progress: bool,
}

impl Default for CountOptions {
    fn default() -> Self {
        Self {
            format: CorpusFormat::Ids,
            show_progress: true,
        }
    }
}

/// Counts for one file, or the sum over several.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FileStats {
    pub tokens: u64,
    pub lines: u64,
    /// Alphabet symbols before merging.
    pub symbols: u64,
    pub max_tokens_per_line: usize,
}

impl FileStats {
    fn record_line(&mut self, symbols: usize, tokens: usize) {
        self.lines += 1;
        self.symbols += symbols as u64;
        self.tokens += tokens as u64;
        self.max_tokens_per_line = self.max_tokens_per_line.max(tokens);
    }

    fn combine(self, other: Self) -> Self {
        Self {
            tokens: self.tokens + other.tokens,
            lines: self.lines + other.lines,
            symbols: self.symbols + other.symbols,
            max_tokens_per_line: self.max_tokens_per_line.max(other.max_tokens_per_line),
        }
    }
}

/// A corpus file that could not be counted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountFailure {
    pub path: PathBuf,
    pub message: String,
}

/// Totals over a whole corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CountReport {
    pub total_tokens: u64,
    pub line_count: u64,
    pub avg_tokens_per_line: f64,
    pub total_symbols: u64,
    pub max_tokens_per_line: usize,
    /// Symbols per token; 0 when nothing was counted.
    pub compression_ratio: f64,
    pub files_processed: usize,
    pub failures: Vec<CountFailure>,
}

impl CountReport {
    fn new(stats: FileStats, files_processed: usize, failures: Vec<CountFailure>) -> Self {
        let ratio = |num: u64, den: u64| if den == 0 { 0.0 } else { num as f64 / den as f64 };
        Self {
            total_tokens: stats.tokens,
            line_count: stats.lines,
            avg_tokens_per_line: ratio(stats.tokens, stats.lines),
            total_symbols: stats.symbols,
            max_tokens_per_line: stats.max_tokens_per_line,
            compression_ratio: ratio(stats.symbols, stats.tokens),
            files_processed,
            failures,
        }
    }
}

/// Counts the tokens of every non-empty line read from `reader`.
///
/// Decimal ID lines must stay inside the alphabet. Symbol lines are encoded
/// with [`Vocabulary::encode`], so foreign characters become the unknown
/// token.
///
/// # Errors
///
/// Returns the first read, mapping or encoding failure, naming the 1-based
/// line.
pub fn count_reader<R: BufRead>(
    reader: R,
    vocab: &Vocabulary,
    format: CorpusFormat,
) -> Result<FileStats, CountError> {
    count_lines(reader, vocab, format, false)
}

/// Counts one corpus file.
///
/// # Errors
///
/// See [`count_reader`].
pub fn count_file(
    path: &Path,
    vocab: &Vocabulary,
    format: CorpusFormat,
) -> Result<FileStats, CountError> {
    let reader = BufReader::new(File::open(path)?);
    count_lines(reader, vocab, format, false)
}

fn count_lines<R: BufRead>(
    reader: R,
    vocab: &Vocabulary,
    format: CorpusFormat,
    log_progress: bool,
) -> Result<FileStats, CountError> {
    let mut stats = FileStats::default();

    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let (symbols, tokens) = match format {
            CorpusFormat::Ids => {
                let ids = format
                    .parse_line(vocab.alphabet(), line, UnknownSymbolMode::Fail)
                    .map_err(|source| CountError::Alphabet {
                        line: idx + 1,
                        source,
                    })?;
                let tokens = vocab
                    .encode_lex_ids(&ids)
                    .map_err(|source| CountError::Encode {
                        line: idx + 1,
                        source,
                    })?;
                (ids.len(), tokens.len())
            }
            CorpusFormat::Symbols => {
                let tokens = vocab.encode(line).map_err(|source| CountError::Encode {
                    line: idx + 1,
                    source,
                })?;
                (line.chars().count(), tokens.len())
            }
        };
        stats.record_line(symbols, tokens);

        if log_progress && stats.lines % LOG_EVERY_LINES == 0 {
            info!(lines = stats.lines, tokens = stats.tokens, "counting progress");
        }
    }

    Ok(stats)
}

/// Counts the tokens of a corpus file or directory tree.
///
/// # Errors
///
/// For a single file, any failure of that file. For a tree, only a failure to
/// list the files or to set up the progress bar; per-file failures are
/// collected in [`CountReport::failures`].
pub fn count_tokens(
    source: &CorpusSource,
    vocab: &Vocabulary,
    options: &CountOptions,
) -> Result<CountReport, CountError> {
    if !source.is_tree() {
        info!(path = %source.root().display(), "counting tokens in file");
        let reader = BufReader::new(File::open(source.root())?);
        let stats = count_lines(reader, vocab, options.format, true)?;
        return Ok(CountReport::new(stats, 1, Vec::new()));
    }

    let files = source.files()?;
    info!(
        root = %source.root().display(),
        files = files.len(),
        "counting tokens in directory tree"
    );

    let pb = progress_bar(files.len() as u64, "Counting files", options.show_progress)
        .map_err(CountError::ProgressBarSetup)?;

    let results: Vec<(&PathBuf, Result<FileStats, CountError>)> = files
        .par_iter()
        .progress_with(pb)
        .map(|path| (path, count_file(path, vocab, options.format)))
        .collect();

    let mut total = FileStats::default();
    let mut files_processed = 0;
    let mut failures = Vec::new();

    for (path, result) in results {
        match result {
            Ok(stats) => {
                debug!(path = %path.display(), lines = stats.lines, tokens = stats.tokens, "file counted");
                total = total.combine(stats);
                files_processed += 1;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping file");
                failures.push(CountFailure {
                    path: path.clone(),
                    message: e.to_string(),
                });
            }
        }
    }

    Ok(CountReport::new(total, files_processed, failures))
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::alphabet::AlphabetMapper;

    fn vocab() -> Vocabulary {
        let alphabet = AlphabetMapper::new(4, 0xE000).expect("valid alphabet");
        let mut vocab =
            Vocabulary::new(alphabet, vec!["<UNK>".into()], Some("<UNK>".into())).expect("vocab");
        vocab.add_merge(1, 2).expect("merge");
        vocab
    }

    fn quiet(format: CorpusFormat) -> CountOptions {
        CountOptions {
            format,
            show_progress: false,
        }
    }

    #[test]
    fn test_blank_lines_do_not_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ids.txt");
        fs::write(&path, "\n0 1\n").expect("write corpus");

        let report = count_tokens(&CorpusSource::new(&path), &vocab(), &quiet(CorpusFormat::Ids))
            .expect("count");
        assert_eq!(report.line_count, 1);
        assert_eq!(report.total_tokens, 1);
        assert_eq!(report.files_processed, 1);
    }

    #[test]
    fn test_merges_reduce_token_count() {
        let stats = count_reader("0 1 0 1\n2 3\n".as_bytes(), &vocab(), CorpusFormat::Ids)
            .expect("count");
        assert_eq!(
            stats,
            FileStats {
                tokens: 4,
                lines: 2,
                symbols: 6,
                max_tokens_per_line: 2,
            }
        );
        let report = CountReport::new(stats, 1, Vec::new());
        assert_eq!(report.avg_tokens_per_line, 2.0);
        assert_eq!(report.compression_ratio, 1.5);
    }

    #[test]
    fn test_symbol_lines_map_foreign_to_unk() {
        let stats = count_reader(
            "\u{E000}\u{E001}x\n".as_bytes(),
            &vocab(),
            CorpusFormat::Symbols,
        )
        .expect("count");
        assert_eq!(stats.tokens, 2);
        assert_eq!(stats.symbols, 3);
    }

    #[test]
    fn test_out_of_range_id_names_line() {
        let err = count_reader("0 1\n0 9\n".as_bytes(), &vocab(), CorpusFormat::Ids)
            .expect_err("id 9 is outside the alphabet");
        assert!(matches!(err, CountError::Alphabet { line: 2, .. }));
    }

    #[test]
    fn test_tree_isolates_failing_files() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("nested");
        fs::create_dir(&nested).expect("mkdir");
        fs::write(dir.path().join("a.txt"), "0 1\n2\n").expect("write");
        fs::write(nested.join("b.txt"), "0 1 0 1\n").expect("write");
        fs::write(dir.path().join("bad.txt"), "0 7\n").expect("write");
        fs::write(dir.path().join("empty.txt"), "").expect("write");

        let report = count_tokens(&CorpusSource::new(dir.path()), &vocab(), &quiet(CorpusFormat::Ids))
            .expect("count tree");

        assert_eq!(report.files_processed, 3);
        assert_eq!(report.line_count, 3);
        assert_eq!(report.total_tokens, 4);
        assert_eq!(report.total_symbols, 7);
        assert_eq!(report.max_tokens_per_line, 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("bad.txt"));
        assert!(report.failures[0].message.contains("line 1"));
    }

    #[test]
    fn test_missing_single_file_errors() {
        let source = CorpusSource::new("/definitely/not/here.txt");
        assert!(matches!(
            count_tokens(&source, &vocab(), &quiet(CorpusFormat::Ids)),
            Err(CountError::Io(_))
        ));
    }
}
