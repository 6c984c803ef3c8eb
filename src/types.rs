//! Stock keys, markets and the closed set of data sections.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a market-qualified stock key.
pub const STOCK_KEY_LEN: usize = 8;
/// Length of a bare exchange code.
pub const STOCK_CODE_LEN: usize = 6;
/// Delimiter between TIPWORD tokens in the persisted form.
pub const TIPWORD_DELIMITER: char = '/';

/// Errors raised while parsing or resolving a [`StockKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// Input was empty after trimming.
    #[error("stock code is empty")]
    Empty,
    /// Input contained something other than ASCII digits.
    #[error("stock code {0:?} must contain only digits")]
    NonDigit(String),
    /// Input was neither 6 nor 8 digits long.
    #[error("stock code {0:?} must be 6 or 8 digits")]
    BadLength(String),
    /// Two-digit market prefix is not a known market.
    #[error("unknown market code in {0:?}")]
    UnknownMarket(String),
    /// Bare code whose first digit maps to no market.
    #[error("cannot infer market for bare code {0:?}")]
    UnknownPrefix(String),
}

/// Exchange on which a stock is listed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Market {
    /// Shenzhen, market code `00`.
    Shenzhen,
    /// Shanghai, market code `01`.
    Shanghai,
    /// Beijing, market code `02`.
    Beijing,
}

impl Market {
    /// All markets in market-code order.
    pub const ALL: [Market; 3] = [Market::Shenzhen, Market::Shanghai, Market::Beijing];

    /// Two-digit prefix used in persisted keys.
    pub fn code(self) -> &'static str {
        match self {
            Market::Shenzhen => "00",
            Market::Shanghai => "01",
            Market::Beijing => "02",
        }
    }

    /// Looks up a market from its two-digit prefix.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "00" => Some(Market::Shenzhen),
            "01" => Some(Market::Shanghai),
            "02" => Some(Market::Beijing),
            _ => None,
        }
    }

    /// Infers the market of a bare 6-digit code from its first digit.
    ///
    /// `6` is Shanghai, `0` and `3` are Shenzhen, `4` and `8` are Beijing.
    /// Every other leading digit is rejected rather than guessed.
    pub fn infer(code6: &str) -> Result<Self, KeyError> {
        check_digits(code6, STOCK_CODE_LEN)?;
        match code6.as_bytes()[0] {
            b'6' => Ok(Market::Shanghai),
            b'0' | b'3' => Ok(Market::Shenzhen),
            b'4' | b'8' => Ok(Market::Beijing),
            _ => Err(KeyError::UnknownPrefix(code6.to_string())),
        }
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Market::Shenzhen => "SZ",
            Market::Shanghai => "SH",
            Market::Beijing => "BJ",
        };
        f.write_str(name)
    }
}

/// Normalized 8-character identifier: market code followed by a 6-digit code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StockKey(String);

impl StockKey {
    /// Parses a fully-qualified 8-digit key.
    pub fn parse(input: &str) -> Result<Self, KeyError> {
        let raw = input.trim();
        check_digits(raw, STOCK_KEY_LEN)?;
        if Market::from_code(&raw[..2]).is_none() {
            return Err(KeyError::UnknownMarket(raw.to_string()));
        }
        Ok(Self(raw.to_string()))
    }

    /// Builds a key from an explicit market hint and a bare code.
    pub fn with_market(market: Market, code6: &str) -> Result<Self, KeyError> {
        let raw = code6.trim();
        check_digits(raw, STOCK_CODE_LEN)?;
        Ok(Self(format!("{}{raw}", market.code())))
    }

    /// Accepts either an 8-digit key or a bare 6-digit code resolved with
    /// [`Market::infer`].
    pub fn resolve(input: &str) -> Result<Self, KeyError> {
        let raw = input.trim();
        match raw.len() {
            STOCK_CODE_LEN => Self::with_market(Market::infer(raw)?, raw),
            _ => Self::parse(raw),
        }
    }

    /// Market the key belongs to.
    pub fn market(&self) -> Market {
        // Constructors guarantee a known prefix.
        Market::from_code(&self.0[..2]).unwrap_or(Market::Shenzhen)
    }

    /// Bare 6-digit exchange code.
    pub fn code(&self) -> &str {
        &self.0[2..]
    }

    /// Full 8-digit key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for StockKey {
    type Error = KeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<StockKey> for String {
    fn from(value: StockKey) -> Self {
        value.0
    }
}

fn check_digits(raw: &str, len: usize) -> Result<(), KeyError> {
    if raw.is_empty() {
        return Err(KeyError::Empty);
    }
    if !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(KeyError::NonDigit(raw.to_string()));
    }
    if raw.len() != len {
        return Err(KeyError::BadLength(raw.to_string()));
    }
    Ok(())
}

/// One of the five independent per-key data categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Section {
    /// Attention level, a single digit 1-9.
    Mark,
    /// Free-text note.
    Tip,
    /// Ordered set of short tags.
    Tipword,
    /// Color code.
    Tipcolor,
    /// Date or timestamp.
    Time,
}

impl Section {
    /// All sections in persisted order.
    pub const ALL: [Section; 5] = [
        Section::Mark,
        Section::Tip,
        Section::Tipword,
        Section::Tipcolor,
        Section::Time,
    ];

    /// Header name used in the persisted file.
    pub fn name(self) -> &'static str {
        match self {
            Section::Mark => "MARK",
            Section::Tip => "TIP",
            Section::Tipword => "TIPWORD",
            Section::Tipcolor => "TIPCOLOR",
            Section::Time => "TIME",
        }
    }

    /// Case-insensitive lookup from a header name.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name))
    }

    /// Position of the section in [`Section::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
