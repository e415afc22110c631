use lexbpe::{Trainer, TrainerConfig, transcoder};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Example: "abaabbaa" as lexer IDs, a=0, b=1
    let config = TrainerConfig {
        target_vocab_size: 6,
        min_merge_frequency: 1,
        initial_alphabet_size: 2,
        show_progress: false,
        ..Default::default()
    };
    let mapper = config.alphabet()?;
    let line = transcoder::encode_line(&mapper, &[0, 1, 0, 0, 1, 1, 0, 0])?;

    let outcome = Trainer::new(config).train([line.as_str()])?;

    println!("Stopped after {} merges: {:?}", outcome.merges_performed, outcome.stop_reason);
    for rule in outcome.vocab.merges() {
        println!(
            "  ({}, {}) -> {}  {:?}",
            rule.left,
            rule.right,
            rule.merged,
            outcome.vocab.lex_ids(rule.merged).unwrap_or_default()
        );
    }

    println!("\nFinal tokens: {:?}", outcome.vocab.encode(&line)?);
    Ok(())
}
