//! Key and value validation called before every mutation is applied.

use thiserror::Error;

use crate::{
    config::ValidationConfig,
    core::codec::is_mark_digit,
    mark::split_tokens,
    op::MutationOp,
    types::{KeyError, Section, StockKey, TIPWORD_DELIMITER},
};

/// Rejection of a single mutation request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The request's code did not resolve to a [`StockKey`].
    #[error("invalid key: {0}")]
    Key(#[from] KeyError),
    /// The payload is not acceptable for the section.
    #[error("invalid {section} value: {reason}")]
    Value {
        /// Target section.
        section: Section,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ValidationError {
    fn value(section: Section, reason: impl Into<String>) -> Self {
        Self::Value {
            section,
            reason: reason.into(),
        }
    }
}

/// Capability the batch engine consults before applying a request.
pub trait Validator: Send + Sync {
    /// Resolves the raw code of a request.
    fn validate_key(&self, code: &str) -> Result<StockKey, ValidationError> {
        Ok(StockKey::resolve(code)?)
    }

    /// Checks the operation payload for `section`.
    fn validate(&self, section: Section, key: &StockKey, op: &MutationOp) -> Result<(), ValidationError>;
}

/// Default rule set driven by [`ValidationConfig`].
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    limits: ValidationConfig,
}

impl RuleValidator {
    pub fn new(limits: ValidationConfig) -> Self {
        Self { limits }
    }

    fn check_set(&self, section: Section, value: &str) -> Result<(), ValidationError> {
        match section {
            Section::Mark => {
                if !is_mark_digit(value) {
                    return Err(ValidationError::value(section, "must be a single digit 1-9"));
                }
            }
            Section::Tip => {
                check_line(section, value)?;
                let len = value.chars().count();
                if len > self.limits.max_tip_len {
                    return Err(ValidationError::value(
                        section,
                        format!("{len} chars exceeds limit of {}", self.limits.max_tip_len),
                    ));
                }
            }
            Section::Tipword => {
                if split_tokens(value).next().is_none() {
                    return Err(ValidationError::value(section, "no tokens"));
                }
                for token in value.split(TIPWORD_DELIMITER) {
                    self.check_token(token)?;
                }
            }
            Section::Tipcolor => {
                let ok = (1..=self.limits.max_color_len).contains(&value.len())
                    && value.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'#');
                if !ok {
                    return Err(ValidationError::value(section, format!("{value:?} is not a color code")));
                }
            }
            Section::Time => {
                let ok = (1..=self.limits.max_time_len).contains(&value.len())
                    && value
                        .bytes()
                        .all(|b| b.is_ascii_digit() || matches!(b, b'-' | b':' | b'/' | b'.' | b' ' | b'T'));
                if !ok || value.trim() != value {
                    return Err(ValidationError::value(section, format!("{value:?} is not a timestamp")));
                }
            }
        }
        Ok(())
    }

    fn check_token(&self, token: &str) -> Result<(), ValidationError> {
        let section = Section::Tipword;
        check_line(section, token)?;
        if token.contains(TIPWORD_DELIMITER) {
            return Err(ValidationError::value(section, format!("token {token:?} contains '/'")));
        }
        if token.chars().count() > self.limits.max_token_len {
            return Err(ValidationError::value(
                section,
                format!("token {token:?} exceeds limit of {}", self.limits.max_token_len),
            ));
        }
        Ok(())
    }
}

impl Validator for RuleValidator {
    fn validate(&self, section: Section, _key: &StockKey, op: &MutationOp) -> Result<(), ValidationError> {
        match op {
            MutationOp::Set(value) => self.check_set(section, value),
            MutationOp::DeleteTokens(tokens) => {
                if tokens.is_empty() {
                    return Err(ValidationError::value(section, "no tokens to delete"));
                }
                tokens.iter().try_for_each(|t| self.check_token(t))
            }
            MutationOp::DeleteValue | MutationOp::DeleteAllForKey => Ok(()),
        }
    }
}

/// Non-empty, single-line, already trimmed.
fn check_line(section: Section, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::value(section, "empty"));
    }
    if value.contains(['\r', '\n']) {
        return Err(ValidationError::value(section, "contains a line break"));
    }
    if value.trim() != value {
        return Err(ValidationError::value(section, "has surrounding whitespace"));
    }
    Ok(())
}
