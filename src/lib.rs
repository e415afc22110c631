//! Byte-pair encoding over lexer token streams.
//!
//! A corpus of lexer-token-ID sequences is mapped onto a block of private-use
//! Unicode code points (one symbol per lexer ID), a BPE vocabulary is learned
//! over the resulting symbol strings using Algorithm 2 from "Byte Pair
//! Encoding is Suboptimal for Language Model Pretraining", and the result can
//! be saved, reported back as source text, and used to count the tokens of a
//! corpus.
//!
//! ```no_run
//! use lexbpe::{CorpusFormat, CorpusSource, Trainer, TrainerConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let trainer = Trainer::new(TrainerConfig::default());
//! let outcome = trainer.train_from_source(&CorpusSource::new("ids.txt"), CorpusFormat::Ids)?;
//! outcome.vocab.save("tokenizer.json".as_ref())?;
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(unused_must_use)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

mod bpe_trainer;
mod encoder;
mod progress;
mod types;

pub mod alphabet;
pub mod config;
pub mod corpus;
pub mod counter;
pub mod error;
pub mod report;
pub mod trainer;
pub mod transcoder;
pub mod vocab;

pub use alphabet::AlphabetMapper;
pub use config::TrainerConfig;
pub use corpus::{CorpusFormat, CorpusSource};
pub use counter::{CountOptions, CountReport, count_tokens};
pub use error::UnknownSymbolMode;
pub use report::IdToTokenTable;
pub use trainer::{StopReason, TrainOutcome, Trainer};
pub use types::{LexId, Token};
pub use vocab::Vocabulary;

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::report::{RawEntry, parse_raw_line, write_raw_file, write_readable_file};

    #[test]
    fn test_transcode_train_report_count() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ids = dir.path().join("ids.txt");
        let symbols = dir.path().join("unicode.txt");
        fs::write(&ids, "0 1 0 1\n\n0 1 0 1\n2 3\n").expect("write corpus");

        let config = TrainerConfig {
            target_vocab_size: 6,
            initial_alphabet_size: 4,
            show_progress: false,
            ..Default::default()
        };
        let mapper = config.alphabet().expect("valid alphabet");
        let stats = transcoder::transcode_file(&mapper, &ids, &symbols).expect("transcode");
        assert_eq!(stats.lines_written, 3);

        let outcome = Trainer::new(config)
            .train_from_source(&CorpusSource::new(&symbols), CorpusFormat::Symbols)
            .expect("train");
        assert_eq!(outcome.stop_reason, StopReason::TargetReached);

        let model = dir.path().join("tokenizer.json");
        outcome.vocab.save(&model).expect("save model");
        let vocab = Vocabulary::load(&model).expect("load model");
        assert_eq!(vocab.entries(), outcome.vocab.entries());

        let raw = dir.path().join("vocab.txt");
        write_raw_file(&vocab, &raw).expect("raw report");
        let last = fs::read_to_string(&raw)
            .expect("read report")
            .lines()
            .last()
            .map(parse_raw_line)
            .expect("non-empty report")
            .expect("valid line");
        assert_eq!(last, RawEntry::Ids(vec![0, 1], 5));

        let table_path = dir.path().join("id_to_token.txt");
        fs::write(&table_path, "0 T a\n1 T b\n2 T c\n3 T IDENTIFIER\n").expect("write table");
        let table = IdToTokenTable::load(&table_path).expect("table");
        let readable = dir.path().join("vocab_readable.txt");
        write_readable_file(&vocab, &table, &readable).expect("readable report");
        let text = fs::read_to_string(&readable).expect("read report");
        assert!(text.ends_with("a + b -> \"ab\"\t5\n"));
        assert!(!text.contains("IDENTIFIER"));

        let report = count_tokens(
            &CorpusSource::new(&ids),
            &vocab,
            &CountOptions {
                format: CorpusFormat::Ids,
                show_progress: false,
            },
        )
        .expect("count");
        assert_eq!(report.line_count, 3);
        assert_eq!(report.total_tokens, 6);
        assert_eq!(report.total_symbols, 10);
    }
}
