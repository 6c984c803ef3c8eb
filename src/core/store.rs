use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
    mark::{SectionValue, StockView, TokenSet},
    op::{AppliedChange, MutationOp, SectionChange},
    types::{Section, StockKey},
};

use super::{
    codec::{self, FormatError},
    merge::MergePolicy,
    table::SectionTable,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{op} is not supported on section {section}")]
    Unsupported { section: Section, op: &'static str },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEntriesV1 {
    pub section: Section,
    pub entries: Vec<(StockKey, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshotV1 {
    pub version: u64,
    pub sections: Vec<SectionEntriesV1>,
}

/// Five independent section tables plus a commit counter.
///
/// Equality compares section contents and order only; `version` is
/// bookkeeping.
#[derive(Debug, Clone, Default)]
pub struct RecordStore {
    tables: [SectionTable; 5],
    version: u64,
}

impl PartialEq for RecordStore {
    fn eq(&self, other: &Self) -> bool {
        self.tables == other.tables
    }
}

impl Eq for RecordStore {}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses the persisted layout.
    pub fn load(text: &str) -> Result<Self, FormatError> {
        codec::parse(text)
    }

    /// Renders the persisted layout; inverse of [`RecordStore::load`].
    pub fn serialize(&self) -> String {
        codec::render(self)
    }

    pub fn from_snapshot(snapshot: StoreSnapshotV1) -> Self {
        let mut store = Self {
            version: snapshot.version,
            ..Self::default()
        };
        for entries in snapshot.sections {
            let table = store.table_mut(entries.section);
            for (key, raw) in entries.entries {
                let value = SectionValue::for_section(entries.section, &raw);
                if !value.is_empty() {
                    table.upsert(key, value);
                }
            }
        }
        store
    }

    pub fn export_snapshot(&self) -> StoreSnapshotV1 {
        let sections = Section::ALL
            .into_iter()
            .map(|section| SectionEntriesV1 {
                section,
                entries: self
                    .table(section)
                    .iter()
                    .map(|(key, value)| (key.clone(), value.render()))
                    .collect(),
            })
            .collect();

        StoreSnapshotV1 {
            version: self.version,
            sections,
        }
    }

    pub fn get(&self, section: Section, key: &StockKey) -> Option<&SectionValue> {
        self.table(section).get(key)
    }

    pub fn get_text(&self, section: Section, key: &StockKey) -> Option<&str> {
        self.get(section, key).and_then(SectionValue::as_text)
    }

    pub fn get_tokens(&self, key: &StockKey) -> Option<&TokenSet> {
        self.get(Section::Tipword, key).and_then(SectionValue::as_tokens)
    }

    pub fn table(&self, section: Section) -> &SectionTable {
        &self.tables[section.index()]
    }

    pub(crate) fn table_mut(&mut self, section: Section) -> &mut SectionTable {
        &mut self.tables[section.index()]
    }

    /// Applies `op` using the policy `section` is configured with.
    pub fn apply(
        &mut self,
        section: Section,
        key: &StockKey,
        op: &MutationOp,
    ) -> Result<AppliedChange, StoreError> {
        self.apply_with(section, key, op, MergePolicy::for_section(section))
    }

    /// Applies `op` with an explicit policy.
    ///
    /// `DeleteAllForKey` ignores `policy` and removes the key from every
    /// section using each section's own policy. Either every touched entry
    /// changes or, on error, none does.
    pub fn apply_with(
        &mut self,
        section: Section,
        key: &StockKey,
        op: &MutationOp,
        policy: MergePolicy,
    ) -> Result<AppliedChange, StoreError> {
        let targets: Vec<(Section, MergePolicy)> = match op {
            MutationOp::DeleteAllForKey => Section::ALL
                .into_iter()
                .map(|s| (s, MergePolicy::for_section(s)))
                .collect(),
            _ => vec![(section, policy)],
        };

        let mut changes = Vec::with_capacity(targets.len());
        for (target, policy) in targets {
            let before = self.get(target, key).cloned();
            let after = policy.merge(target, before.as_ref(), op)?;
            changes.push(SectionChange {
                section: target,
                before,
                after,
            });
        }

        for change in &changes {
            let table = self.table_mut(change.section);
            match &change.after {
                Some(value) => {
                    table.upsert(key.clone(), value.clone());
                }
                None => {
                    table.remove(key);
                }
            }
        }

        debug!(section = %section, key = %key, op = op.name(), "applied mutation");
        Ok(AppliedChange {
            key: key.clone(),
            changes,
        })
    }

    /// Puts every entry touched by `change` back to its `before` state.
    pub(crate) fn revert(&mut self, change: &AppliedChange) {
        for c in change.changes.iter().filter(|c| !c.is_noop()) {
            let table = self.table_mut(c.section);
            match &c.before {
                Some(value) => {
                    table.upsert(change.key.clone(), value.clone());
                }
                None => {
                    table.remove(&change.key);
                }
            }
        }
    }

    /// Distinct keys across all sections, in section order then insertion
    /// order.
    pub fn keys(&self) -> Vec<StockKey> {
        let mut seen = hashbrown::HashSet::new();
        let mut out = Vec::new();
        for table in &self.tables {
            for key in table.keys() {
                if seen.insert(key) {
                    out.push(key.clone());
                }
            }
        }
        out
    }

    /// Projection of `key` across the five sections, `None` when the key is
    /// in no section.
    pub fn view(&self, key: &StockKey) -> Option<StockView> {
        if !self.tables.iter().any(|t| t.contains(key)) {
            return None;
        }
        let text = |section| self.get_text(section, key).map(str::to_string);
        Some(StockView {
            key: key.clone(),
            market: key.market(),
            mark: text(Section::Mark),
            tip: text(Section::Tip),
            tipword: self.get_tokens(key).cloned().unwrap_or_default(),
            tipcolor: text(Section::Tipcolor),
            time: text(Section::Time),
        })
    }

    /// Every stock's projection in [`RecordStore::keys`] order.
    pub fn views(&self) -> Vec<StockView> {
        self.keys().iter().filter_map(|key| self.view(key)).collect()
    }

    /// Total entries across all sections.
    pub fn len(&self) -> usize {
        self.tables.iter().map(SectionTable::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.iter().all(SectionTable::is_empty)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn bump_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}
