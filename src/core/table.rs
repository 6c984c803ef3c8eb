use hashbrown::HashMap;

use crate::{mark::SectionValue, types::StockKey};

/// One section's entries, iterated in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionTable {
    records: HashMap<StockKey, SectionValue>,
    order: Vec<StockKey>,
}

impl SectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &StockKey) -> Option<&SectionValue> {
        self.records.get(key)
    }

    pub fn contains(&self, key: &StockKey) -> bool {
        self.records.contains_key(key)
    }

    /// Inserts or overwrites; a new key goes to the end, an existing key
    /// keeps its position.
    pub fn upsert(&mut self, key: StockKey, value: SectionValue) -> Option<SectionValue> {
        match self.records.get_mut(&key) {
            Some(slot) => Some(std::mem::replace(slot, value)),
            None => {
                self.order.push(key.clone());
                self.records.insert(key, value);
                None
            }
        }
    }

    pub fn remove(&mut self, key: &StockKey) -> Option<SectionValue> {
        let removed = self.records.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn keys(&self) -> &[StockKey] {
        &self.order
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StockKey, &SectionValue)> {
        self.order
            .iter()
            .filter_map(|key| self.records.get(key).map(|value| (key, value)))
    }
}
