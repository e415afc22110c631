//! Vocabulary management for the lexer-symbol BPE tokenizer.
//!
//! Structure:
//! - IDs `0..S`: special tokens, in configured order
//! - IDs `S..S+N`: one token per alphabet symbol, in lexer-ID order
//! - IDs `S+N..`: merged tokens, in the order their merges were learned
//!
//! The vocabulary is persisted as a JSON model holding the alphabet
//! parameters, special tokens and merge rules; every entry string is rebuilt
//! from those on load.

use std::{
    collections::HashMap,
    fs,
    io::{BufWriter, Write},
    path::Path,
};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::{
    alphabet::AlphabetMapper,
    config::validate_special_tokens,
    encoder::BPEEncoder,
    error::{ConfigError, VocabError},
    types::{LexId, Token},
};

/// Version tag written into model files.
const MODEL_VERSION: u32 = 1;

/// A single merge rule: (left, right) -> merged, learned at iteration `rank`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeRule {
    pub left: Token,
    pub right: Token,
    pub merged: Token,
    pub rank: usize,
}

/// One vocabulary entry: its symbol string and its dense ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VocabularyEntry {
    /// Alphabet symbols for regular entries, the literal text for specials.
    pub symbols: String,
    pub id: Token,
}

/// On-disk form of a [`Vocabulary`].
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    version: u32,
    alphabet_size: LexId,
    alphabet_offset: u32,
    special_tokens: Vec<String>,
    unk_token: Option<String>,
    merges: Vec<MergeRule>,
}

/// The complete BPE vocabulary with checked lookups by ID and by symbols.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    alphabet: AlphabetMapper,
    special_tokens: Vec<String>,
    unk_token: Option<String>,
    merges: Vec<MergeRule>,
    entries: Vec<VocabularyEntry>,
    by_symbols: HashMap<String, Token>,
    encoder: BPEEncoder,
}

impl Vocabulary {
    /// Creates a vocabulary holding the special tokens followed by the alphabet.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the special tokens are invalid for `alphabet`.
    pub fn new(
        alphabet: AlphabetMapper,
        special_tokens: Vec<String>,
        unk_token: Option<String>,
    ) -> Result<Self, ConfigError> {
        validate_special_tokens(&alphabet, &special_tokens, unk_token.as_deref())?;

        let capacity = special_tokens.len() + alphabet.size() as usize;
        let mut vocab = Self {
            alphabet,
            special_tokens: Vec::new(),
            unk_token,
            merges: Vec::new(),
            entries: Vec::with_capacity(capacity),
            by_symbols: HashMap::with_capacity(capacity),
            encoder: BPEEncoder::default(),
        };

        for tok in &special_tokens {
            vocab.push_entry(tok.clone());
        }
        vocab.special_tokens = special_tokens;

        for symbol in alphabet.symbols() {
            vocab.push_entry(symbol.to_string());
        }

        Ok(vocab)
    }

    fn push_entry(&mut self, symbols: String) -> Token {
        let id = self.entries.len();
        // two merge paths can spell the same string; lookups keep the first
        self.by_symbols.entry(symbols.clone()).or_insert(id);
        self.entries.push(VocabularyEntry { symbols, id });
        id
    }

    /// Adds a merge rule: `left` + `right` creates a new token with the next ID.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownToken`] if an operand does not exist and
    /// [`VocabError::Corrupt`] if an operand is a special token.
    pub fn add_merge(&mut self, left: Token, right: Token) -> Result<Token, VocabError> {
        for operand in [left, right] {
            if operand >= self.entries.len() {
                return Err(VocabError::UnknownToken(operand));
            }
            if self.is_special(operand) {
                return Err(VocabError::Corrupt(format!(
                    "merge operand {operand} is a special token"
                )));
            }
        }

        let mut merged = self.entries[left].symbols.clone();
        merged.push_str(&self.entries[right].symbols);

        let rank = self.merges.len();
        let id = self.push_entry(merged);
        self.merges.push(MergeRule {
            left,
            right,
            merged: id,
            rank,
        });
        self.encoder.push_merge(left, right, id);

        Ok(id)
    }

    /// Current number of entries (specials + alphabet + merges).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the vocabulary is empty (it never is after construction).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn alphabet(&self) -> &AlphabetMapper {
        &self.alphabet
    }

    pub fn special_tokens(&self) -> &[String] {
        &self.special_tokens
    }

    /// Learned merges in learn order.
    pub fn merges(&self) -> &[MergeRule] {
        &self.merges
    }

    /// All entries in ascending ID order.
    pub fn entries(&self) -> &[VocabularyEntry] {
        &self.entries
    }

    /// Looks up an entry by ID.
    pub fn entry(&self, id: Token) -> Option<&VocabularyEntry> {
        self.entries.get(id)
    }

    /// Looks up an ID by symbol string.
    pub fn id_of(&self, symbols: &str) -> Option<Token> {
        self.by_symbols.get(symbols).copied()
    }

    /// Whether `id` is one of the reserved special tokens.
    pub fn is_special(&self, id: Token) -> bool {
        id < self.special_tokens.len()
    }

    /// ID of the unknown token, if one is configured.
    pub fn unk_id(&self) -> Option<Token> {
        self.unk_token.as_deref().and_then(|t| self.id_of(t))
    }

    /// Vocabulary ID of the single-symbol entry for a lexer ID.
    pub fn base_token(&self, id: LexId) -> Option<Token> {
        (id < self.alphabet.size()).then(|| self.special_tokens.len() + id as usize)
    }

    /// Lexer IDs spelled by a non-special entry.
    ///
    /// Returns `None` for specials and unknown IDs.
    pub fn lex_ids(&self, id: Token) -> Option<Vec<LexId>> {
        if self.is_special(id) {
            return None;
        }
        let entry = self.entry(id)?;
        entry
            .symbols
            .chars()
            .map(|c| self.alphabet.symbol_to_id(c).ok())
            .collect()
    }

    /// Encodes a symbol string into vocabulary IDs.
    ///
    /// Characters outside the alphabet become the unknown token.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownSymbol`] for a foreign character when no
    /// unknown token is configured.
    pub fn encode(&self, text: &str) -> Result<Vec<Token>, VocabError> {
        let unk = self.unk_id();
        let base = self.special_tokens.len();
        let mut tokens = Vec::with_capacity(text.len() / 3);
        for ch in text.chars() {
            match self.alphabet.symbol_to_id(ch) {
                Ok(id) => tokens.push(base + id as usize),
                Err(_) => match unk {
                    Some(unk) => tokens.push(unk),
                    None => return Err(VocabError::UnknownSymbol(ch)),
                },
            }
        }
        Ok(self.encoder.encode(tokens))
    }

    /// Encodes a sequence of lexer IDs into vocabulary IDs.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::Corrupt`] naming the first ID outside the alphabet.
    pub fn encode_lex_ids(&self, ids: &[LexId]) -> Result<Vec<Token>, VocabError> {
        let tokens = ids
            .iter()
            .map(|&id| {
                self.base_token(id)
                    .ok_or_else(|| VocabError::Corrupt(format!("lexer id {id} outside alphabet")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.encoder.encode(tokens))
    }

    /// Maps vocabulary IDs back to lexer IDs. Special tokens contribute nothing.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::UnknownToken`] for an ID not in the vocabulary.
    pub fn decode_ids(&self, tokens: &[Token]) -> Result<Vec<LexId>, VocabError> {
        let mut ids = Vec::with_capacity(tokens.len());
        for &tok in tokens {
            if tok >= self.len() {
                return Err(VocabError::UnknownToken(tok));
            }
            if let Some(lex) = self.lex_ids(tok) {
                ids.extend(lex);
            }
        }
        Ok(ids)
    }

    /// Saves the model as JSON. The file is replaced atomically.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::Io`] or [`VocabError::Json`] on failure; the
    /// destination is left untouched in that case.
    pub fn save(&self, path: &Path) -> Result<(), VocabError> {
        let model = ModelFile {
            version: MODEL_VERSION,
            alphabet_size: self.alphabet.size(),
            alphabet_offset: self.alphabet.offset(),
            special_tokens: self.special_tokens.clone(),
            unk_token: self.unk_token.clone(),
            merges: self.merges.clone(),
        };
        write_atomically(path, |w| {
            serde_json::to_writer_pretty(&mut *w, &model).map_err(VocabError::Json)
        })?;
        debug!(path = %path.display(), entries = self.len(), "saved vocabulary model");
        Ok(())
    }

    /// Loads a model saved by [`Vocabulary::save`] and checks its invariants.
    ///
    /// # Errors
    ///
    /// Returns [`VocabError::Corrupt`] if merge IDs are not dense and in rank
    /// order, or if a rule references a later entry.
    pub fn load(path: &Path) -> Result<Self, VocabError> {
        let json = fs::read_to_string(path)?;
        let model: ModelFile = serde_json::from_str(&json)?;
        if model.version != MODEL_VERSION {
            return Err(VocabError::Corrupt(format!(
                "unsupported model version {}",
                model.version
            )));
        }

        let alphabet = AlphabetMapper::new(model.alphabet_size, model.alphabet_offset)?;
        let mut vocab = Self::new(alphabet, model.special_tokens, model.unk_token)?;

        for (rank, rule) in model.merges.iter().enumerate() {
            if rule.rank != rank {
                return Err(VocabError::Corrupt(format!(
                    "merge at position {rank} has rank {}",
                    rule.rank
                )));
            }
            let id = vocab.add_merge(rule.left, rule.right)?;
            if id != rule.merged {
                return Err(VocabError::Corrupt(format!(
                    "merge rank {rank} expected id {id}, found {}",
                    rule.merged
                )));
            }
        }

        debug!(path = %path.display(), entries = vocab.len(), "loaded vocabulary model");
        Ok(vocab)
    }
}

/// Writes through `fill` into a temp file beside `path`, then renames it over
/// `path`. Nothing is written to `path` if `fill` fails.
pub(crate) fn write_atomically<E>(
    path: &Path,
    fill: impl FnOnce(&mut BufWriter<&fs::File>) -> Result<(), E>,
) -> Result<(), E>
where
    E: From<std::io::Error>,
{
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        fill(&mut writer)?;
        writer.flush()?;
    }
    tmp.persist(path).map_err(|e| E::from(e.error))?;
    Ok(())
}
