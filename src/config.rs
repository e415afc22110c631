//! Training configuration.
//!
//! Serialised as JSON. Every field has a default, so `{}` is a valid config
//! that reproduces the reference setup: 226 lexer IDs at `U+E000`, a target
//! of 16384 entries and `<UNK>` as the only special token.

use std::{collections::HashSet, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    alphabet::{AlphabetMapper, DEFAULT_ALPHABET_SIZE, DEFAULT_OFFSET},
    error::{ConfigError, UnknownSymbolMode},
    types::LexId,
};

/// Configuration for BPE training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainerConfig {
    /// Final vocabulary cardinality (specials + alphabet + merges).
    pub target_vocab_size: usize,
    /// Pairs seen fewer times than this are never merged.
    pub min_merge_frequency: u64,
    /// Reserved tokens, assigned IDs `0..len` in this order.
    pub special_tokens: Vec<String>,
    /// Special token emitted for characters the vocabulary cannot encode.
    pub unk_token: Option<String>,
    /// Number of lexer IDs, `N`.
    pub initial_alphabet_size: LexId,
    /// First code point of the alphabet block.
    pub alphabet_offset: u32,
    /// What to do with corpus characters outside the alphabet block.
    pub on_unknown_symbol: UnknownSymbolMode,
    /// Draw a progress bar over merges.
    pub show_progress: bool,
    /// Log progress every N merges (0 disables).
    pub log_interval: usize,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            target_vocab_size: 16384,
            min_merge_frequency: 2,
            special_tokens: vec!["<UNK>".into()],
            unk_token: Some("<UNK>".into()),
            initial_alphabet_size: DEFAULT_ALPHABET_SIZE,
            alphabet_offset: DEFAULT_OFFSET,
            on_unknown_symbol: UnknownSymbolMode::Drop,
            show_progress: true,
            log_interval: 1000,
        }
    }
}

impl TrainerConfig {
    /// Loads a config from a JSON file; missing fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`] naming `path`.
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Builds the alphabet mapper described by this config.
    ///
    /// # Errors
    ///
    /// See [`AlphabetMapper::new`].
    pub fn alphabet(&self) -> Result<AlphabetMapper, ConfigError> {
        AlphabetMapper::new(self.initial_alphabet_size, self.alphabet_offset)
    }

    /// Number of IDs taken before the first merge: specials plus alphabet.
    pub fn base_vocab_size(&self) -> usize {
        self.special_tokens.len() + self.initial_alphabet_size as usize
    }

    /// Checks the alphabet block and the special tokens.
    ///
    /// Size constraints against the target are checked by the trainer, which
    /// reports them as [`crate::error::TrainError::VocabTooSmall`].
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<AlphabetMapper, ConfigError> {
        let mapper = self.alphabet()?;
        validate_special_tokens(&mapper, &self.special_tokens, self.unk_token.as_deref())?;
        Ok(mapper)
    }
}

/// Checks that special tokens are unique, non-empty, free of alphabet symbols,
/// and that the unknown token (if any) is one of them.
pub(crate) fn validate_special_tokens(
    mapper: &AlphabetMapper,
    special_tokens: &[String],
    unk_token: Option<&str>,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for tok in special_tokens {
        if tok.is_empty() || tok.chars().any(|c| mapper.contains(c)) {
            return Err(ConfigError::InvalidSpecialToken(tok.clone()));
        }
        if !seen.insert(tok.as_str()) {
            return Err(ConfigError::DuplicateSpecialToken(tok.clone()));
        }
    }
    if let Some(unk) = unk_token {
        if !seen.contains(unk) {
            return Err(ConfigError::UnknownTokenNotSpecial(unk.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let cfg: TrainerConfig = serde_json::from_str("{}").expect("valid config");
        assert_eq!(cfg, TrainerConfig::default());
        assert_eq!(cfg.base_vocab_size(), 227);
    }

    #[test]
    fn test_partial_json_overrides() {
        let cfg: TrainerConfig = serde_json::from_str(
            r#"{"target_vocab_size": 512, "special_tokens": ["<UNK>", "<PAD>"], "on_unknown_symbol": "fail"}"#,
        )
        .expect("valid config");
        assert_eq!(cfg.target_vocab_size, 512);
        assert_eq!(cfg.special_tokens.len(), 2);
        assert_eq!(cfg.on_unknown_symbol, UnknownSymbolMode::Fail);
        assert_eq!(cfg.min_merge_frequency, 2);
    }

    #[test]
    fn test_validate_rejects_duplicate_specials() {
        let cfg = TrainerConfig {
            special_tokens: vec!["<UNK>".into(), "<UNK>".into()],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::DuplicateSpecialToken(_))
        ));
    }

    #[test]
    fn test_validate_rejects_alphabet_symbol_in_special() {
        let cfg = TrainerConfig {
            special_tokens: vec!["<UNK>".into(), "\u{E001}".into()],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidSpecialToken(_))
        ));
    }

    #[test]
    fn test_validate_requires_unk_in_specials() {
        let cfg = TrainerConfig {
            special_tokens: vec!["<PAD>".into()],
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::UnknownTokenNotSpecial(_))
        ));
    }

    #[test]
    fn test_from_json_file_names_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.json");
        fs::write(&path, "{ not json").expect("write config");
        let err = TrainerConfig::from_json_file(&path).expect_err("invalid json");
        assert!(err.to_string().contains("cfg.json"));
    }
}
