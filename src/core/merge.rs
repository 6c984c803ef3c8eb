//! Per-section merge policies.
//!
//! A policy turns the current entry plus an operation into the next entry
//! without touching the table, so the store can reject an operation before
//! any mutation happens.

use crate::{
    mark::{split_tokens, SectionValue, TokenSet},
    op::MutationOp,
    types::Section,
};

use super::store::StoreError;

/// Closed set of merge strategies, selected by [`Section`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// `Set` overwrites with the trimmed value; deletes remove the entry.
    Replace,
    /// `Set` appends unseen tokens; `DeleteTokens` removes named tokens.
    DelimitedTokenMerge,
}

impl MergePolicy {
    /// Policy used by `section`.
    pub fn for_section(section: Section) -> Self {
        match section {
            Section::Tipword => MergePolicy::DelimitedTokenMerge,
            Section::Mark | Section::Tip | Section::Tipcolor | Section::Time => MergePolicy::Replace,
        }
    }

    /// Computes the entry that results from applying `op` to `current`.
    ///
    /// `None` means the key is absent from the section afterwards.
    pub fn merge(
        self,
        section: Section,
        current: Option<&SectionValue>,
        op: &MutationOp,
    ) -> Result<Option<SectionValue>, StoreError> {
        match (self, op) {
            (_, MutationOp::DeleteValue | MutationOp::DeleteAllForKey) => Ok(None),
            (MergePolicy::Replace, MutationOp::Set(value)) => {
                let value = value.trim();
                Ok((!value.is_empty()).then(|| SectionValue::Text(value.to_string())))
            }
            (MergePolicy::Replace, MutationOp::DeleteTokens(_)) => Err(StoreError::Unsupported {
                section,
                op: op.name(),
            }),
            (MergePolicy::DelimitedTokenMerge, MutationOp::Set(raw)) => {
                let mut tokens = current_tokens(current);
                tokens.extend(split_tokens(raw));
                Ok(non_empty(tokens))
            }
            (MergePolicy::DelimitedTokenMerge, MutationOp::DeleteTokens(gone)) => {
                let mut tokens = current_tokens(current);
                tokens.remove_all(gone);
                Ok(non_empty(tokens))
            }
        }
    }
}

fn current_tokens(current: Option<&SectionValue>) -> TokenSet {
    match current {
        Some(SectionValue::Tokens(tokens)) => tokens.clone(),
        Some(SectionValue::Text(raw)) => TokenSet::parse(raw),
        None => TokenSet::new(),
    }
}

fn non_empty(tokens: TokenSet) -> Option<SectionValue> {
    if tokens.is_empty() {
        None
    } else {
        Some(SectionValue::Tokens(tokens))
    }
}
