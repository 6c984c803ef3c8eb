//! Read-only summaries over a [`RecordStore`].

use std::collections::BTreeMap;

use hashbrown::HashMap;

use crate::{
    core::store::RecordStore,
    types::{Market, Section, StockKey},
};

/// Entry counts of a store.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DataStats {
    /// Entries across all sections.
    pub total_records: usize,
    pub sections: BTreeMap<Section, usize>,
    /// Distinct keys per market.
    pub markets: BTreeMap<Market, usize>,
    pub distinct_keys: usize,
}

impl DataStats {
    pub fn collect(store: &RecordStore) -> Self {
        let sections = Section::ALL
            .into_iter()
            .map(|s| (s, store.table(s).len()))
            .collect();
        let keys = store.keys();
        let mut markets: BTreeMap<Market, usize> = Market::ALL.into_iter().map(|m| (m, 0)).collect();
        for key in &keys {
            *markets.entry(key.market()).or_default() += 1;
        }
        Self {
            total_records: store.len(),
            sections,
            markets,
            distinct_keys: keys.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TipwordStats {
    /// Keys with a TIPWORD entry.
    pub tagged_keys: usize,
    /// `(token, keys carrying it)`, most frequent first, ties by token.
    pub frequencies: Vec<(String, usize)>,
    /// Keys carrying more than one token.
    pub multi_token_keys: Vec<StockKey>,
}

impl TipwordStats {
    pub fn collect(store: &RecordStore) -> Self {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        let mut multi_token_keys = Vec::new();
        let table = store.table(Section::Tipword);

        for (key, value) in table.iter() {
            let Some(tokens) = value.as_tokens() else {
                continue;
            };
            for token in tokens.tokens() {
                *counts.entry(token.as_str()).or_default() += 1;
            }
            if tokens.len() > 1 {
                multi_token_keys.push(key.clone());
            }
        }

        let mut frequencies: Vec<(String, usize)> = counts
            .into_iter()
            .map(|(token, n)| (token.to_string(), n))
            .collect();
        frequencies.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            tagged_keys: table.len(),
            frequencies,
            multi_token_keys,
        }
    }

    /// The `n` most frequent tokens.
    pub fn top(&self, n: usize) -> &[(String, usize)] {
        &self.frequencies[..n.min(self.frequencies.len())]
    }
}

/// Differences within one section.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SectionDiff {
    pub only_in_left: Vec<(StockKey, String)>,
    pub only_in_right: Vec<(StockKey, String)>,
    /// `(key, left, right)`.
    pub different: Vec<(StockKey, String, String)>,
    pub common: usize,
}

impl SectionDiff {
    pub fn is_empty(&self) -> bool {
        self.only_in_left.is_empty() && self.only_in_right.is_empty() && self.different.is_empty()
    }
}

/// Section-by-section comparison of two stores, e.g. the live store and a
/// backup.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StoreDiff {
    pub sections: BTreeMap<Section, SectionDiff>,
}

impl StoreDiff {
    pub fn compare(left: &RecordStore, right: &RecordStore) -> Self {
        let sections = Section::ALL
            .into_iter()
            .map(|section| (section, diff_section(left, right, section)))
            .collect();
        Self { sections }
    }

    pub fn is_empty(&self) -> bool {
        self.sections.values().all(SectionDiff::is_empty)
    }

    pub fn section(&self, section: Section) -> Option<&SectionDiff> {
        self.sections.get(&section)
    }
}

fn diff_section(left: &RecordStore, right: &RecordStore, section: Section) -> SectionDiff {
    let mut diff = SectionDiff::default();
    let (lt, rt) = (left.table(section), right.table(section));

    for (key, lv) in lt.iter() {
        match rt.get(key) {
            None => diff.only_in_left.push((key.clone(), lv.render())),
            Some(rv) if rv != lv => diff.different.push((key.clone(), lv.render(), rv.render())),
            Some(_) => diff.common += 1,
        }
    }
    diff.only_in_right = rt
        .iter()
        .filter(|(key, _)| !lt.contains(key))
        .map(|(key, value)| (key.clone(), value.render()))
        .collect();
    diff
}
