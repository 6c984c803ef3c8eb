//! Mutation request model and the change record returned by the store.

use serde::{Deserialize, Serialize};

use crate::{
    mark::SectionValue,
    types::{Section, StockKey},
};

/// One logical change to a section entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationOp {
    /// Replace sections overwrite; TIPWORD merges the `/`-joined tokens.
    Set(String),
    /// Remove the entry in the request's section.
    DeleteValue,
    /// Remove exactly these TIPWORD tokens.
    DeleteTokens(Vec<String>),
    /// Remove the key from every section.
    DeleteAllForKey,
}

impl MutationOp {
    /// Short name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            MutationOp::Set(_) => "set",
            MutationOp::DeleteValue => "delete_value",
            MutationOp::DeleteTokens(_) => "delete_tokens",
            MutationOp::DeleteAllForKey => "delete_all_for_key",
        }
    }
}

/// Immutable request submitted to the batch engine.
///
/// `code` is kept raw so that an unresolvable key is rejected per item
/// instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationRequest {
    /// Target section.
    pub section: Section,
    /// 8-digit key or bare 6-digit code.
    pub code: String,
    /// Operation to apply.
    pub op: MutationOp,
}

impl MutationRequest {
    /// Builds a request.
    pub fn new(section: Section, code: impl Into<String>, op: MutationOp) -> Self {
        Self {
            section,
            code: code.into(),
            op,
        }
    }

    /// Shorthand for a [`MutationOp::Set`] request.
    pub fn set(section: Section, code: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(section, code, MutationOp::Set(value.into()))
    }

    /// Shorthand for a [`MutationOp::DeleteValue`] request.
    pub fn delete(section: Section, code: impl Into<String>) -> Self {
        Self::new(section, code, MutationOp::DeleteValue)
    }

    /// Shorthand for a [`MutationOp::DeleteTokens`] request on TIPWORD.
    pub fn delete_tokens<I, S>(code: impl Into<String>, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            Section::Tipword,
            code,
            MutationOp::DeleteTokens(tokens.into_iter().map(Into::into).collect()),
        )
    }
}

/// Before/after state of one section entry touched by an apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionChange {
    /// Section touched.
    pub section: Section,
    /// Value before the apply.
    pub before: Option<SectionValue>,
    /// Value after the apply.
    pub after: Option<SectionValue>,
}

impl SectionChange {
    /// True when the entry did not change.
    pub fn is_noop(&self) -> bool {
        self.before == self.after
    }
}

/// Result of applying one request to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedChange {
    /// Key the request resolved to.
    pub key: StockKey,
    /// Per-section changes, in section order.
    pub changes: Vec<SectionChange>,
}

impl AppliedChange {
    /// True when nothing changed.
    pub fn is_noop(&self) -> bool {
        self.changes.iter().all(SectionChange::is_noop)
    }

    /// Requests that, applied in order to the post-apply state, restore the
    /// pre-apply state of every touched entry.
    ///
    /// Rollback uses snapshots; this is kept for callers that want an
    /// undo log.
    pub fn inverse(&self) -> Vec<MutationRequest> {
        let code = self.key.as_str();
        let mut out = Vec::new();
        for change in self.changes.iter().filter(|c| !c.is_noop()) {
            if change.after.is_some() {
                out.push(MutationRequest::delete(change.section, code));
            }
            if let Some(before) = &change.before {
                out.push(MutationRequest::set(change.section, code, before.render()));
            }
        }
        out
    }
}
