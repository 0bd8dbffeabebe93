use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// In-memory favorite cities and coin ids, listed in the order they were
/// added. Independent of the asset table; nothing here feeds reconciliation.
#[derive(Clone, Debug, Default)]
pub struct FavoritesStore {
    cities: Arc<OrderedSet>,
    coins: Arc<OrderedSet>,
}

/// Value -> insertion sequence. Toggles go through the entry API so a
/// check and its insert/remove happen under one shard lock.
#[derive(Debug, Default)]
struct OrderedSet {
    entries: DashMap<String, u64>,
    next_seq: AtomicU64,
}

impl OrderedSet {
    fn toggle(&self, value: &str) -> bool {
        match self.entries.entry(value.to_string()) {
            Entry::Occupied(entry) => {
                entry.remove();
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(self.next_seq.fetch_add(1, Ordering::Relaxed));
                true
            }
        }
    }

    fn replace<I: IntoIterator<Item = String>>(&self, values: I) {
        self.entries.clear();
        for value in values {
            let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
            self.entries.entry(value).or_insert(seq);
        }
    }

    fn contains(&self, value: &str) -> bool {
        self.entries.contains_key(value)
    }

    fn in_insertion_order(&self) -> Vec<String> {
        let mut values: Vec<(u64, String)> = self
            .entries
            .iter()
            .map(|entry| (*entry.value(), entry.key().clone()))
            .collect();
        values.sort_unstable_by_key(|(seq, _)| *seq);
        values.into_iter().map(|(_, value)| value).collect()
    }
}

impl FavoritesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if the city is a favorite after the toggle.
    pub fn toggle_city(&self, city: &str) -> bool {
        self.cities.toggle(city)
    }

    /// Returns true if the coin is a favorite after the toggle.
    pub fn toggle_coin(&self, id: &str) -> bool {
        self.coins.toggle(id)
    }

    pub fn set_cities<I: IntoIterator<Item = String>>(&self, cities: I) {
        self.cities.replace(cities);
    }

    pub fn set_coins<I: IntoIterator<Item = String>>(&self, ids: I) {
        self.coins.replace(ids);
    }

    pub fn is_favorite_city(&self, city: &str) -> bool {
        self.cities.contains(city)
    }

    pub fn is_favorite_coin(&self, id: &str) -> bool {
        self.coins.contains(id)
    }

    pub fn cities(&self) -> Vec<String> {
        self.cities.in_insertion_order()
    }

    pub fn coins(&self) -> Vec<String> {
        self.coins.in_insertion_order()
    }
}
