//! Stock symbol identifiers.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Maximum accepted symbol length. Exchange codes are typically 6 digits
/// (e.g. "005930"), but some venues use alphanumeric codes up to 12 chars.
pub const MAX_SYMBOL_LEN: usize = 12;

/// Errors from symbol validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SymbolError {
    #[error("symbol is empty")]
    Empty,

    #[error("symbol is too long: {0} chars (max {MAX_SYMBOL_LEN})")]
    TooLong(usize),

    #[error("symbol contains invalid character: {0:?}")]
    InvalidChar(char),
}

/// An exchange-assigned stock code (e.g. "005930").
///
/// Immutable once assigned to a displayed row; cheap to clone and hash,
/// so it can key subscription tables directly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "CompactString", into = "CompactString")]
pub struct Symbol(CompactString);

impl Symbol {
    /// Validate and create a symbol.
    pub fn new(code: &str) -> Result<Self, SymbolError> {
        if code.is_empty() {
            return Err(SymbolError::Empty);
        }
        if code.len() > MAX_SYMBOL_LEN {
            return Err(SymbolError::TooLong(code.len()));
        }
        if let Some(c) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(SymbolError::InvalidChar(c));
        }
        Ok(Self(CompactString::from(code)))
    }

    /// Get the raw code string.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Symbol::new(s)
    }
}

impl TryFrom<CompactString> for Symbol {
    type Error = SymbolError;

    fn try_from(value: CompactString) -> Result<Self, Self::Error> {
        Symbol::new(&value)
    }
}

impl From<Symbol> for CompactString {
    fn from(symbol: Symbol) -> Self {
        symbol.0
    }
}
