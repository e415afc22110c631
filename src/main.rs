//! `lexbpe` command line.
//!
//! Usage:
//!   lexbpe transcode --input ids.txt --output unicode.txt
//!   lexbpe train --corpus unicode.txt --output-dir ./bpe [--config cfg.json]
//!   lexbpe report --model ./bpe/tokenizer.json --output vocab.txt [--table id_to_token.txt]
//!   lexbpe count --model ./bpe/tokenizer.json --corpus ids/ [--symbols]
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lexbpe::{
    CorpusFormat, CorpusSource, CountOptions, IdToTokenTable, Trainer, TrainerConfig,
    UnknownSymbolMode, Vocabulary, count_tokens, report, transcoder,
};

#[derive(Parser, Debug)]
#[command(name = "lexbpe", about = "BPE vocabularies over lexer token streams")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Map an ID corpus onto alphabet symbols, one line per non-empty input line.
    Transcode {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// Config JSON supplying the alphabet size and offset.
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Learn a vocabulary; writes tokenizer.json and vocab.txt.
    Train {
        /// Corpus file or directory.
        #[arg(long)]
        corpus: PathBuf,
        #[arg(long)]
        output_dir: PathBuf,
        /// Config JSON; flags below override its values.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        vocab_size: Option<usize>,
        #[arg(long)]
        min_frequency: Option<u64>,
        /// Special token, in ID order. Repeat for several; replaces the configured list.
        #[arg(long = "special-token")]
        special_tokens: Vec<String>,
        /// What to do with characters outside the alphabet: drop or fail.
        #[arg(long)]
        on_unknown_symbol: Option<UnknownSymbolMode>,
        /// Corpus lines are decimal IDs rather than symbol strings.
        #[arg(long)]
        ids: bool,
        #[arg(long)]
        no_progress: bool,
    },

    /// Write a vocabulary report: raw, or readable when a table is given.
    Report {
        #[arg(long)]
        model: PathBuf,
        #[arg(long)]
        output: PathBuf,
        /// ID-to-token table (`<id> <kind> <text>` per line).
        #[arg(long)]
        table: Option<PathBuf>,
    },

    /// Count the tokens a corpus costs under a trained vocabulary.
    Count {
        #[arg(long)]
        model: PathBuf,
        /// Corpus file or directory.
        #[arg(long)]
        corpus: PathBuf,
        /// Corpus lines are symbol strings rather than decimal IDs.
        #[arg(long)]
        symbols: bool,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
        #[arg(long)]
        no_progress: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<TrainerConfig> {
    match path {
        Some(p) => TrainerConfig::from_json_file(p)
            .with_context(|| format!("load config {}", p.display())),
        None => Ok(TrainerConfig::default()),
    }
}

fn load_model(path: &Path) -> anyhow::Result<Vocabulary> {
    Vocabulary::load(path).with_context(|| format!("load model {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Transcode {
            input,
            output,
            config,
        } => {
            let mapper = load_config(config.as_deref())?
                .alphabet()
                .context("invalid alphabet")?;
            let stats = transcoder::transcode_file(&mapper, &input, &output)
                .with_context(|| format!("transcode {}", input.display()))?;
            println!(
                "{} lines read, {} written, {} symbols",
                stats.lines_read, stats.lines_written, stats.symbols_written
            );
        }

        Command::Train {
            corpus,
            output_dir,
            config,
            vocab_size,
            min_frequency,
            special_tokens,
            on_unknown_symbol,
            ids,
            no_progress,
        } => {
            let mut cfg = load_config(config.as_deref())?;
            if let Some(v) = vocab_size {
                cfg.target_vocab_size = v;
            }
            if let Some(f) = min_frequency {
                cfg.min_merge_frequency = f;
            }
            if !special_tokens.is_empty() {
                if let Some(unk) = &cfg.unk_token {
                    if !special_tokens.contains(unk) {
                        cfg.unk_token = None;
                    }
                }
                cfg.special_tokens = special_tokens;
            }
            if let Some(mode) = on_unknown_symbol {
                cfg.on_unknown_symbol = mode;
            }
            if no_progress {
                cfg.show_progress = false;
            }

            let format = if ids {
                CorpusFormat::Ids
            } else {
                CorpusFormat::Symbols
            };

            let outcome = Trainer::new(cfg)
                .train_from_source(&CorpusSource::new(&corpus), format)
                .with_context(|| format!("train on {}", corpus.display()))?;

            fs::create_dir_all(&output_dir)
                .with_context(|| format!("create {}", output_dir.display()))?;
            let model_path = output_dir.join("tokenizer.json");
            outcome
                .vocab
                .save(&model_path)
                .with_context(|| format!("save model {}", model_path.display()))?;
            let vocab_path = output_dir.join("vocab.txt");
            report::write_raw_file(&outcome.vocab, &vocab_path)
                .with_context(|| format!("write {}", vocab_path.display()))?;

            info!(model = %model_path.display(), vocab = %vocab_path.display(), "saved");
            println!(
                "vocabulary size {} ({} merges, stopped: {:?})",
                outcome.vocab.len(),
                outcome.merges_performed,
                outcome.stop_reason
            );
        }

        Command::Report {
            model,
            output,
            table,
        } => {
            let vocab = load_model(&model)?;
            let written = match table {
                Some(table_path) => {
                    let table = IdToTokenTable::load(&table_path)
                        .with_context(|| format!("load table {}", table_path.display()))?;
                    if table.is_empty() {
                        warn!(table = %table_path.display(), "id-to-token table is empty");
                    }
                    info!(entries = table.len(), "loaded id-to-token table");
                    report::write_readable_file(&vocab, &table, &output)
                }
                None => report::write_raw_file(&vocab, &output),
            }
            .with_context(|| format!("write {}", output.display()))?;
            println!("{written} entries written to {}", output.display());
        }

        Command::Count {
            model,
            corpus,
            symbols,
            json,
            no_progress,
        } => {
            let vocab = load_model(&model)?;
            let options = CountOptions {
                format: if symbols {
                    CorpusFormat::Symbols
                } else {
                    CorpusFormat::Ids
                },
                show_progress: !no_progress,
            };
            let report = count_tokens(&CorpusSource::new(&corpus), &vocab, &options)
                .with_context(|| format!("count {}", corpus.display()))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("Total tokens: {}", report.total_tokens);
                println!("Line count: {}", report.line_count);
                println!("Average tokens per line: {:.2}", report.avg_tokens_per_line);
                println!("Total symbols: {}", report.total_symbols);
                println!("Max tokens per line: {}", report.max_tokens_per_line);
                println!("Compression ratio: {:.3}", report.compression_ratio);
                println!("Files processed: {}", report.files_processed);
                for failure in &report.failures {
                    println!("Failed: {} ({})", failure.path.display(), failure.message);
                }
            }
        }
    }

    Ok(())
}
