//! Vocabulary training over a lexer-symbol corpus.
//!
//! [`Trainer`] validates the configuration, collapses identical corpus lines
//! into weighted words, drives [`BPETrainer`] until the target size or the
//! frequency floor is reached, and records every merge in a [`Vocabulary`].

use std::{collections::HashMap, io, path::Path};

use tracing::{debug, info};

use crate::{
    bpe_trainer::{BPETrainer, MergeStep},
    config::TrainerConfig,
    corpus::{CorpusFormat, CorpusLine, CorpusSource},
    error::{TrainError, VocabError},
    progress::progress_bar,
    types::{Token, TokenFreq},
    vocab::Vocabulary,
};

/// Why training stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The vocabulary reached the configured target size.
    TargetReached,
    /// The most frequent remaining pair is below the minimum frequency.
    BelowMinFrequency,
    /// No adjacent pair is left in the corpus.
    NoPairs,
}

/// Result of a successful training run.
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub vocab: Vocabulary,
    pub merges_performed: usize,
    pub stop_reason: StopReason,
}

/// Trains BPE vocabularies with a fixed configuration.
#[derive(Debug, Clone, Default)]
pub struct Trainer {
    config: TrainerConfig,
}

impl Trainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self { config }
    }

    /// Trains on in-memory lines of alphabet symbols.
    ///
    /// # Errors
    ///
    /// See [`Trainer::train_from_source`].
    pub fn train<I, S>(&self, lines: I) -> Result<TrainOutcome, TrainError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let lines = lines.into_iter().enumerate().map(|(idx, text)| {
            Ok(CorpusLine {
                path: None,
                number: idx + 1,
                text: text.as_ref().to_owned(),
            })
        });
        self.train_lines(lines, CorpusFormat::Symbols)
    }

    /// Trains on every line of a corpus file or directory tree.
    ///
    /// # Errors
    ///
    /// - [`TrainError::Config`] for an invalid alphabet or special tokens.
    /// - [`TrainError::VocabTooSmall`] if the target leaves no room for merges.
    /// - [`TrainError::EmptyCorpus`] if no line has content.
    /// - [`TrainError::Alphabet`] for an unmappable line.
    /// - [`TrainError::Io`] if the corpus cannot be read.
    pub fn train_from_source(
        &self,
        source: &CorpusSource,
        format: CorpusFormat,
    ) -> Result<TrainOutcome, TrainError> {
        info!(corpus = %source.root().display(), ?format, "reading training corpus");
        self.train_lines(source.lines()?, format)
    }

    fn train_lines<I>(&self, lines: I, format: CorpusFormat) -> Result<TrainOutcome, TrainError>
    where
        I: Iterator<Item = io::Result<CorpusLine>>,
    {
        let cfg = &self.config;
        let mapper = cfg.validate()?;

        let floor = cfg.base_vocab_size();
        if cfg.target_vocab_size <= floor {
            return Err(TrainError::VocabTooSmall {
                target: cfg.target_vocab_size,
                floor,
            });
        }

        // identical lines become one weighted word
        let specials = cfg.special_tokens.len();
        let mut counts: HashMap<Vec<Token>, TokenFreq> = HashMap::new();
        let mut non_empty = 0usize;

        for line in lines {
            let line = line?;
            if line.text.trim().is_empty() {
                continue;
            }
            non_empty += 1;

            let ids = format
                .parse_line(&mapper, &line.text, cfg.on_unknown_symbol)
                .map_err(|source| TrainError::Alphabet {
                    path: line.path.as_deref().map(Path::to_path_buf),
                    line: line.number,
                    source,
                })?;
            let word: Vec<Token> = ids.into_iter().map(|id| specials + id as usize).collect();
            *counts.entry(word).or_insert(0) += 1;
        }

        if non_empty == 0 {
            return Err(TrainError::EmptyCorpus);
        }

        // sorted for a reproducible arena layout
        let mut words: Vec<(Vec<Token>, TokenFreq)> = counts.into_iter().collect();
        words.sort_unstable();

        info!(
            lines = non_empty,
            words = words.len(),
            target = cfg.target_vocab_size,
            base = floor,
            "starting BPE training"
        );

        let mut bpe = BPETrainer::new(words.iter().map(|(w, c)| (w.as_slice(), *c)), floor);
        drop(words);
        debug!(top_pairs = ?bpe.top_pairs(5), "initial pair frequencies");

        let mut vocab = Vocabulary::new(mapper, cfg.special_tokens.clone(), cfg.unk_token.clone())?;

        let max_merges = cfg.target_vocab_size - floor;
        let pb = progress_bar(max_merges as u64, "Learning merges", cfg.show_progress)
            .map_err(TrainError::ProgressBarSetup)?;

        let mut merges_performed = 0;
        let mut stop_reason = StopReason::TargetReached;

        while vocab.len() < cfg.target_vocab_size {
            match bpe.merge_step(cfg.min_merge_frequency) {
                MergeStep::Merged {
                    left,
                    right,
                    merged,
                    freq,
                } => {
                    let id = vocab.add_merge(left, right)?;
                    if id != merged {
                        return Err(VocabError::Corrupt(format!(
                            "merge ({left}, {right}) got id {id}, trainer assigned {merged}"
                        ))
                        .into());
                    }
                    merges_performed += 1;
                    pb.inc(1);

                    if cfg.log_interval > 0 && merges_performed % cfg.log_interval == 0 {
                        info!(
                            merges = merges_performed,
                            vocab_size = vocab.len(),
                            freq,
                            "training progress"
                        );
                    }
                }
                MergeStep::BelowMinFrequency { freq } => {
                    info!(
                        freq,
                        min = cfg.min_merge_frequency,
                        "best pair below minimum frequency"
                    );
                    stop_reason = StopReason::BelowMinFrequency;
                    break;
                }
                MergeStep::Exhausted => {
                    info!("no pairs left to merge");
                    stop_reason = StopReason::NoPairs;
                    break;
                }
            }
        }

        pb.finish_and_clear();
        info!(
            merges = merges_performed,
            vocab_size = vocab.len(),
            corpus_tokens = bpe.corpus_tokens(),
            ?stop_reason,
            "training finished"
        );

        Ok(TrainOutcome {
            vocab,
            merges_performed,
            stop_reason,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::error::{AlphabetError, UnknownSymbolMode};

    fn small_config(target: usize, min_freq: u64) -> TrainerConfig {
        TrainerConfig {
            target_vocab_size: target,
            min_merge_frequency: min_freq,
            initial_alphabet_size: 4,
            show_progress: false,
            ..Default::default()
        }
    }

    const ABAB: &str = "\u{E000}\u{E001}\u{E000}\u{E001}";
    const CD: &str = "\u{E002}\u{E003}";

    #[test]
    fn test_single_merge_reaches_target() {
        let trainer = Trainer::new(small_config(6, 2));
        let outcome = trainer.train([ABAB, ABAB, CD]).expect("training succeeds");

        assert_eq!(outcome.stop_reason, StopReason::TargetReached);
        assert_eq!(outcome.merges_performed, 1);

        let vocab = &outcome.vocab;
        assert_eq!(vocab.len(), 6);
        assert_eq!(vocab.entry(0).map(|e| e.symbols.as_str()), Some("<UNK>"));
        for lex in 0..4u32 {
            assert_eq!(vocab.base_token(lex), Some(1 + lex as usize));
        }
        assert_eq!(
            vocab.entry(5).map(|e| e.symbols.as_str()),
            Some("\u{E000}\u{E001}")
        );
    }

    #[test]
    fn test_stops_below_min_frequency() {
        let trainer = Trainer::new(small_config(100, 2));
        let outcome = trainer.train([ABAB, ABAB, CD]).expect("training succeeds");

        // (a b) x4, then (ab ab) x2, then only (c d) x1 remains
        assert_eq!(outcome.stop_reason, StopReason::BelowMinFrequency);
        assert_eq!(outcome.merges_performed, 2);
        assert_eq!(outcome.vocab.len(), 5 + outcome.merges_performed);
        assert_eq!(outcome.vocab.id_of(ABAB), Some(6));
    }

    #[test]
    fn test_ids_are_dense_and_specials_first() {
        let cfg = TrainerConfig {
            special_tokens: vec!["<UNK>".into(), "<PAD>".into(), "<EOS>".into()],
            ..small_config(20, 1)
        };
        let outcome = Trainer::new(cfg)
            .train([ABAB, CD, "\u{E003}\u{E002}\u{E001}"])
            .expect("training succeeds");

        for (idx, entry) in outcome.vocab.entries().iter().enumerate() {
            assert_eq!(entry.id, idx);
        }
        assert_eq!(outcome.vocab.special_tokens(), &["<UNK>", "<PAD>", "<EOS>"]);
        for id in 0..3 {
            assert!(outcome.vocab.is_special(id));
        }
        for (rank, rule) in outcome.vocab.merges().iter().enumerate() {
            assert_eq!(rule.merged, 3 + 4 + rank);
        }
    }

    #[test]
    fn test_no_pairs_left() {
        let trainer = Trainer::new(small_config(50, 1));
        let outcome = trainer.train(["\u{E000}", "\u{E001}"]).expect("training succeeds");
        assert_eq!(outcome.stop_reason, StopReason::NoPairs);
        assert_eq!(outcome.merges_performed, 0);
        assert_eq!(outcome.vocab.len(), 5);
    }

    #[test]
    fn test_empty_corpus_rejected() {
        let trainer = Trainer::new(small_config(10, 2));
        assert!(matches!(
            trainer.train(["", "   "]),
            Err(TrainError::EmptyCorpus)
        ));
    }

    #[test]
    fn test_target_must_exceed_base() {
        let trainer = Trainer::new(small_config(5, 2));
        assert!(matches!(
            trainer.train([ABAB]),
            Err(TrainError::VocabTooSmall { target: 5, floor: 5 })
        ));
    }

    #[test]
    fn test_fail_mode_names_line() {
        let cfg = TrainerConfig {
            on_unknown_symbol: UnknownSymbolMode::Fail,
            ..small_config(10, 1)
        };
        let result = Trainer::new(cfg).train([ABAB, "\u{E000}x"]);
        assert!(matches!(
            result,
            Err(TrainError::Alphabet {
                path: None,
                line: 2,
                source: AlphabetError::UnknownSymbol('x')
            })
        ));
    }

    #[test]
    fn test_tree_error_names_file_and_local_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("a.txt"), "0 1\n0 1\n0 1\n").expect("write a");
        fs::write(dir.path().join("b.txt"), "0 9\n").expect("write b");

        let err = Trainer::new(small_config(10, 1))
            .train_from_source(&CorpusSource::new(dir.path()), CorpusFormat::Ids)
            .expect_err("id 9 is outside the alphabet");
        assert!(matches!(
            &err,
            TrainError::Alphabet {
                path: Some(path),
                line: 1,
                source: AlphabetError::OutOfRange { id: 9, size: 4 },
            } if path.ends_with("b.txt")
        ));
        let message = err.to_string();
        assert!(message.contains("b.txt line 1:"), "{message}");
    }

    #[test]
    fn test_drop_mode_ignores_foreign_characters() {
        let trainer = Trainer::new(small_config(6, 2));
        let outcome = trainer
            .train(["\u{E000}?\u{E001}", "\u{E000}\u{E001}"])
            .expect("training succeeds");
        assert_eq!(outcome.vocab.id_of("\u{E000}\u{E001}"), Some(5));
    }

    #[test]
    fn test_train_from_id_corpus_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("ids.txt");
        fs::write(&path, "0 1 0 1\n\n0 1 0 1\n2 3\n").expect("write corpus");

        let trainer = Trainer::new(small_config(6, 2));
        let outcome = trainer
            .train_from_source(&CorpusSource::new(&path), CorpusFormat::Ids)
            .expect("training succeeds");
        assert_eq!(outcome.vocab.id_of("\u{E000}\u{E001}"), Some(5));
    }

    #[test]
    fn test_invalid_special_tokens_rejected() {
        let cfg = TrainerConfig {
            special_tokens: vec!["<UNK>".into(), "<UNK>".into()],
            ..small_config(10, 1)
        };
        assert!(matches!(
            Trainer::new(cfg).train([ABAB]),
            Err(TrainError::Config(_))
        ));
    }
}
