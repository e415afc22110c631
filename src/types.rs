//! Type aliases and shared types for BPE training and encoding.
//!
//! These type aliases provide semantic clarity throughout the codebase.

/// Identifier of a base lexical unit produced by the external lexer.
///
/// Lexer IDs live in a small closed range `[0, N)` and each one maps to exactly
/// one alphabet symbol.
pub type LexId = u32;

/// Represents a token identifier in the vocabulary.
///
/// Token IDs are dense: special tokens first, then one ID per alphabet symbol,
/// then one ID per learned merge in the order the merges were learned.
pub type Token = usize;

/// Position of a token in the training arena.
///
/// Used to index into the doubly-linked list structure during training.
pub(crate) type TextIdx = usize;

/// Weighted frequency count for token pairs during training.
///
/// Identical corpus lines are collapsed, so a single occurrence of a pair can
/// contribute more than one to its frequency.
pub type TokenFreq = u64;

/// Merge order indicates when a merge rule was learned during training.
///
/// Lower values represent earlier merges (e.g., 0 = first merge, 1 = second merge).
pub type MergeOrder = usize;

/// A pair of adjacent tokens.
///
/// Used as a key for looking up merge rules during encoding and for
/// tracking pair frequencies during training.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct TokenPair(pub(crate) Token, pub(crate) Token);
