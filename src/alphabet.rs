//! Bijection between lexer IDs and single private-use code points.
//!
//! Lexer ID `i` maps to the scalar value `offset + i`. With the default
//! offset `U+E000` and 226 IDs, `0 -> U+E000` and `225 -> U+E0E1`.

use crate::{
    error::{AlphabetError, ConfigError},
    types::LexId,
};

/// Start of the Basic Multilingual Plane private use area.
pub const DEFAULT_OFFSET: u32 = 0xE000;

/// Number of token kinds emitted by the lexer codec.
pub const DEFAULT_ALPHABET_SIZE: LexId = 226;

/// Maps lexer IDs in `[0, size)` onto the contiguous block
/// `[offset, offset + size)` and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlphabetMapper {
    size: LexId,
    offset: u32,
}

impl AlphabetMapper {
    /// Creates a mapper, checking that every code point of the block is a
    /// valid `char`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyAlphabet`] for `size == 0` and
    /// [`ConfigError::InvalidAlphabetBlock`] if the block overflows the code
    /// space or touches the surrogate range.
    pub fn new(size: LexId, offset: u32) -> Result<Self, ConfigError> {
        if size == 0 {
            return Err(ConfigError::EmptyAlphabet);
        }
        let invalid = ConfigError::InvalidAlphabetBlock { offset, size };
        let Some(last) = offset.checked_add(size - 1) else {
            return Err(invalid);
        };
        // surrogates are the only hole in the scalar range
        let hits_surrogates = offset <= 0xDFFF && last >= 0xD800;
        if char::from_u32(offset).is_none() || char::from_u32(last).is_none() || hits_surrogates
        {
            return Err(invalid);
        }
        Ok(Self { size, offset })
    }

    /// Number of lexer IDs (and symbols) in the alphabet.
    pub fn size(&self) -> LexId {
        self.size
    }

    /// First code point of the block.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Maps a lexer ID to its symbol.
    ///
    /// # Errors
    ///
    /// Returns [`AlphabetError::OutOfRange`] if `id >= size`.
    pub fn id_to_symbol(&self, id: LexId) -> Result<char, AlphabetError> {
        if id >= self.size {
            return Err(AlphabetError::OutOfRange {
                id: i64::from(id),
                size: self.size,
            });
        }
        // block validated in `new`
        char::from_u32(self.offset + id).ok_or(AlphabetError::OutOfRange {
            id: i64::from(id),
            size: self.size,
        })
    }

    /// Maps a symbol back to its lexer ID.
    ///
    /// # Errors
    ///
    /// Returns [`AlphabetError::UnknownSymbol`] if `symbol` is outside the block.
    pub fn symbol_to_id(&self, symbol: char) -> Result<LexId, AlphabetError> {
        let cp = symbol as u32;
        if cp < self.offset || cp - self.offset >= self.size {
            return Err(AlphabetError::UnknownSymbol(symbol));
        }
        Ok(cp - self.offset)
    }

    /// Whether `symbol` belongs to the alphabet block.
    pub fn contains(&self, symbol: char) -> bool {
        self.symbol_to_id(symbol).is_ok()
    }

    /// Parses one decimal field of an ID corpus line into a lexer ID.
    ///
    /// # Errors
    ///
    /// Returns [`AlphabetError::InvalidId`] for non-numeric input and
    /// [`AlphabetError::OutOfRange`] for negative or too-large IDs.
    pub fn parse_id(&self, field: &str) -> Result<LexId, AlphabetError> {
        let value: i64 = field
            .parse()
            .map_err(|_| AlphabetError::InvalidId(field.to_string()))?;
        if value < 0 || value >= i64::from(self.size) {
            return Err(AlphabetError::OutOfRange {
                id: value,
                size: self.size,
            });
        }
        Ok(value as LexId)
    }

    /// All alphabet symbols in lexer-ID order.
    pub fn symbols(&self) -> impl Iterator<Item = char> + '_ {
        (self.offset..self.offset + self.size).filter_map(char::from_u32)
    }
}

impl Default for AlphabetMapper {
    fn default() -> Self {
        Self {
            size: DEFAULT_ALPHABET_SIZE,
            offset: DEFAULT_OFFSET,
        }
    }
}
