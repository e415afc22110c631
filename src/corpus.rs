//! Restartable line sources over a single corpus file or a directory tree.

use std::{
    fs::{self, File},
    io::{self, BufRead, BufReader, Lines},
    path::{Path, PathBuf},
    sync::Arc,
    vec,
};

use crate::{
    alphabet::AlphabetMapper,
    error::{AlphabetError, UnknownSymbolMode},
    transcoder::decode_line,
    types::LexId,
};

/// How the lines of a corpus are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorpusFormat {
    /// Whitespace-separated decimal lexer IDs.
    Ids,
    /// Strings of alphabet symbols, as written by the transcoder.
    Symbols,
}

impl CorpusFormat {
    /// Parses one corpus line into lexer IDs.
    ///
    /// `mode` only applies to [`CorpusFormat::Symbols`]; a malformed ID field
    /// is always an error.
    ///
    /// # Errors
    ///
    /// Returns the first field or character the alphabet cannot map.
    pub fn parse_line(
        self,
        mapper: &AlphabetMapper,
        line: &str,
        mode: UnknownSymbolMode,
    ) -> Result<Vec<LexId>, AlphabetError> {
        match self {
            Self::Ids => line
                .split_whitespace()
                .map(|field| mapper.parse_id(field))
                .collect(),
            Self::Symbols => decode_line(mapper, line.trim(), mode),
        }
    }
}

/// A corpus rooted at one file or at a directory whose files (at any depth)
/// are read in sorted path order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusSource {
    root: PathBuf,
}

impl CorpusSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the root is a directory tree rather than a single file.
    pub fn is_tree(&self) -> bool {
        self.root.is_dir()
    }

    /// Lists the corpus files in deterministic order.
    ///
    /// # Errors
    ///
    /// Fails if the root does not exist or a directory cannot be listed.
    pub fn files(&self) -> io::Result<Vec<PathBuf>> {
        let meta = fs::metadata(&self.root)?;
        if !meta.is_dir() {
            return Ok(vec![self.root.clone()]);
        }
        let mut files = Vec::new();
        collect_files(&self.root, &mut files)?;
        files.sort();
        Ok(files)
    }

    /// Starts a fresh pass over every line of the corpus.
    ///
    /// Each call re-opens the files, so the source can be iterated any number
    /// of times.
    ///
    /// # Errors
    ///
    /// Fails if the file list cannot be built; per-line read errors are
    /// yielded by the iterator.
    pub fn lines(&self) -> io::Result<CorpusLines> {
        Ok(CorpusLines {
            pending: self.files()?.into_iter(),
            current: None,
        })
    }
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// One corpus line and where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusLine {
    /// File the line was read from; `None` for in-memory corpora.
    pub path: Option<Arc<Path>>,
    /// 1-based line number within that file.
    pub number: usize,
    pub text: String,
}

/// Lazy iterator over the lines of every file of a [`CorpusSource`].
///
/// Read errors carry the path of the file being read.
pub struct CorpusLines {
    pending: vec::IntoIter<PathBuf>,
    current: Option<OpenFile>,
}

struct OpenFile {
    path: Arc<Path>,
    lines: Lines<BufReader<File>>,
    number: usize,
}

fn with_path(path: &Path, e: io::Error) -> io::Error {
    io::Error::new(e.kind(), format!("{}: {e}", path.display()))
}

impl Iterator for CorpusLines {
    type Item = io::Result<CorpusLine>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(file) = self.current.as_mut() {
                match file.lines.next() {
                    Some(Ok(text)) => {
                        file.number += 1;
                        return Some(Ok(CorpusLine {
                            path: Some(Arc::clone(&file.path)),
                            number: file.number,
                            text,
                        }));
                    }
                    Some(Err(e)) => return Some(Err(with_path(&file.path, e))),
                    None => self.current = None,
                }
            }
            let path = self.pending.next()?;
            match File::open(&path) {
                Ok(f) => {
                    self.current = Some(OpenFile {
                        path: Arc::from(path),
                        lines: BufReader::new(f).lines(),
                        number: 0,
                    })
                }
                Err(e) => return Some(Err(with_path(&path, e))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_file_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("corpus.txt");
        fs::write(&path, "a\nb\n").expect("write corpus");

        let source = CorpusSource::new(&path);
        assert!(!source.is_tree());
        let lines: Vec<CorpusLine> = source
            .lines()
            .expect("open corpus")
            .collect::<io::Result<_>>()
            .expect("read corpus");
        let texts: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["a", "b"]);
        assert_eq!(lines[1].number, 2);
        assert_eq!(lines[1].path.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_tree_source_is_sorted_and_restartable() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("part_0001");
        fs::create_dir(&nested).expect("mkdir");
        fs::write(dir.path().join("b.txt"), "2\n").expect("write");
        fs::write(nested.join("a.txt"), "1\n").expect("write");
        fs::write(dir.path().join("a.txt"), "0\n").expect("write");

        let source = CorpusSource::new(dir.path());
        assert!(source.is_tree());
        assert_eq!(source.files().expect("list files").len(), 3);

        for _ in 0..2 {
            let lines: Vec<String> = source
                .lines()
                .expect("open corpus")
                .map(|line| line.map(|l| l.text))
                .collect::<io::Result<_>>()
                .expect("read corpus");
            assert_eq!(lines, vec!["0", "2", "1"]);
        }
    }

    #[test]
    fn test_line_numbers_restart_per_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "0\n1\n").expect("write");
        fs::write(dir.path().join("b.txt"), "2\n").expect("write");

        let last = CorpusSource::new(dir.path())
            .lines()
            .expect("open corpus")
            .last()
            .expect("three lines")
            .expect("readable");
        assert_eq!(last.number, 1);
        assert!(last.path.is_some_and(|p| p.ends_with("b.txt")));
    }

    #[test]
    fn test_parse_line_formats() {
        let mapper = AlphabetMapper::new(4, 0xE000).expect("valid alphabet");
        let ids = CorpusFormat::Ids
            .parse_line(&mapper, " 3 0  1 ", UnknownSymbolMode::Fail)
            .expect("valid ids");
        assert_eq!(ids, vec![3, 0, 1]);

        let syms = CorpusFormat::Symbols
            .parse_line(&mapper, "\u{E003}x\u{E000}\n", UnknownSymbolMode::Drop)
            .expect("drop mode");
        assert_eq!(syms, vec![3, 0]);

        assert!(matches!(
            CorpusFormat::Ids.parse_line(&mapper, "0 4", UnknownSymbolMode::Drop),
            Err(AlphabetError::OutOfRange { id: 4, .. })
        ));
    }

    #[test]
    fn test_missing_root_errors() {
        let source = CorpusSource::new("/definitely/not/here");
        assert!(source.files().is_err());
    }
}
