//! Section values, TIPWORD token sets and the per-stock materialized view.

use serde::{Deserialize, Serialize};

use crate::types::{Market, Section, StockKey, TIPWORD_DELIMITER};

/// Ordered set of TIPWORD tokens, unique by exact string equality.
///
/// Order is first-insertion order. The `/`-joined string is only the
/// persisted form.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenSet {
    tokens: Vec<String>,
}

impl TokenSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a `/`-joined string, trimming tokens and dropping empty or
    /// repeated ones.
    pub fn parse(raw: &str) -> Self {
        let mut set = Self::new();
        set.extend(split_tokens(raw));
        set
    }

    /// Adds a token unless it is already present. Returns true when added.
    pub fn insert(&mut self, token: &str) -> bool {
        if self.contains(token) {
            return false;
        }
        self.tokens.push(token.to_string());
        true
    }

    /// Adds every token in order, skipping ones already present.
    pub fn extend<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) -> usize {
        tokens.into_iter().filter(|t| self.insert(t)).count()
    }

    /// Removes exactly the named tokens, preserving survivor order.
    pub fn remove_all<S: AsRef<str>>(&mut self, tokens: &[S]) -> usize {
        let before = self.tokens.len();
        self.tokens
            .retain(|t| !tokens.iter().any(|gone| gone.as_ref() == t));
        before - self.tokens.len()
    }

    /// True when `token` is present.
    pub fn contains(&self, token: &str) -> bool {
        self.tokens.iter().any(|t| t == token)
    }

    /// Tokens in insertion order.
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    /// Number of tokens.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// True when no token is present.
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Persisted `/`-joined form.
    pub fn joined(&self) -> String {
        self.tokens.join("/")
    }
}

impl<'a> FromIterator<&'a str> for TokenSet {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        let mut set = Self::new();
        set.extend(iter);
        set
    }
}

/// Splits a persisted TIPWORD string into trimmed, non-empty tokens.
pub fn split_tokens(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(TIPWORD_DELIMITER)
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Value stored for one key in one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionValue {
    /// Opaque text for Replace sections.
    Text(String),
    /// Token set for TIPWORD.
    Tokens(TokenSet),
}

impl SectionValue {
    /// Builds the value shape `section` stores from its persisted text.
    pub fn for_section(section: Section, raw: &str) -> Self {
        match section {
            Section::Tipword => SectionValue::Tokens(TokenSet::parse(raw)),
            _ => SectionValue::Text(raw.trim().to_string()),
        }
    }

    /// Persisted text form.
    pub fn render(&self) -> String {
        match self {
            SectionValue::Text(text) => text.clone(),
            SectionValue::Tokens(tokens) => tokens.joined(),
        }
    }

    /// True when the value would persist as an empty string.
    pub fn is_empty(&self) -> bool {
        match self {
            SectionValue::Text(text) => text.is_empty(),
            SectionValue::Tokens(tokens) => tokens.is_empty(),
        }
    }

    /// Text payload, if this is a Replace value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SectionValue::Text(text) => Some(text),
            SectionValue::Tokens(_) => None,
        }
    }

    /// Token payload, if this is a TIPWORD value.
    pub fn as_tokens(&self) -> Option<&TokenSet> {
        match self {
            SectionValue::Tokens(tokens) => Some(tokens),
            SectionValue::Text(_) => None,
        }
    }
}

/// Materialized projection of one stock across all five sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockView {
    /// Normalized key.
    pub key: StockKey,
    /// Listing market.
    pub market: Market,
    /// MARK value.
    pub mark: Option<String>,
    /// TIP value.
    pub tip: Option<String>,
    /// TIPWORD tokens, empty when absent.
    pub tipword: TokenSet,
    /// TIPCOLOR value.
    pub tipcolor: Option<String>,
    /// TIME value.
    pub time: Option<String>,
}

impl StockView {
    /// Bare 6-digit code.
    pub fn code(&self) -> &str {
        self.key.code()
    }

    /// Case-sensitive substring match against code, tip text and tokens.
    pub fn matches_keyword(&self, keyword: &str) -> bool {
        self.key.as_str().contains(keyword)
            || self.tip.as_deref().is_some_and(|tip| tip.contains(keyword))
            || self.tipword.tokens().iter().any(|t| t.contains(keyword))
    }
}
