use crate::market_data::types::{AssetQuote, UpdateSource};
use crate::state::asset::AssetRecord;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// Result of merging one push into the table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PushOutcome {
    /// No snapshot has produced a record for this id yet.
    UnknownAsset,
    /// Stored price was zero: price accepted, percent change reset to 0
    /// since no ratio exists against a zero baseline.
    ZeroBaseline { new_price: f64 },
    Applied {
        old_price: f64,
        new_price: f64,
        delta_pct: f64,
    },
}

/// Keyed asset records plus the set of identifiers being tracked.
///
/// Every mutation is a plain function of (table, event). Ordering is
/// arrival order: whichever source is applied last wins.
#[derive(Clone, Debug, Default)]
pub struct AssetTable {
    tracked: HashSet<String>,
    records: HashMap<String, AssetRecord>,
    /// Row order of the latest snapshot.
    order: Vec<String>,
}

impl AssetTable {
    pub fn new<I, S>(tracked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AssetTable {
            tracked: tracked.into_iter().map(Into::into).collect(),
            records: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Replaces the record set wholesale with `quotes`.
    /// Rows for untracked ids are dropped. Returns the number stored.
    pub fn apply_snapshot(&mut self, quotes: Vec<AssetQuote>) -> usize {
        self.records.clear();
        self.order.clear();

        for quote in quotes {
            if !self.tracked.contains(&quote.id) {
                debug!(id = %quote.id, "dropping snapshot row for untracked asset");
                continue;
            }
            let id = quote.id.clone();
            if self.records.insert(id.clone(), AssetRecord::from(quote)).is_none() {
                self.order.push(id);
            }
        }

        self.records.len()
    }

    pub fn apply_push(&mut self, id: &str, new_price: f64) -> PushOutcome {
        let Some(record) = self.records.get_mut(id) else {
            return PushOutcome::UnknownAsset;
        };

        let old_price = record.price;
        record.price = new_price;
        record.last_update_source = UpdateSource::Push;

        if old_price == 0.0 || !old_price.is_finite() {
            record.percent_change_24h = 0.0;
            return PushOutcome::ZeroBaseline { new_price };
        }

        let delta_pct = (new_price - old_price) / old_price * 100.0;
        record.percent_change_24h = delta_pct;

        PushOutcome::Applied {
            old_price,
            new_price,
            delta_pct,
        }
    }

    /// Swaps the tracked set and discards records that fell out of it.
    /// Returns the ids whose records were removed.
    pub fn retrack<I, S>(&mut self, ids: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tracked = ids.into_iter().map(Into::into).collect();

        let removed: Vec<String> = self
            .order
            .iter()
            .filter(|id| !self.tracked.contains(*id))
            .cloned()
            .collect();

        for id in &removed {
            self.records.remove(id);
        }
        self.order.retain(|id| self.tracked.contains(id));

        removed
    }

    pub fn get(&self, id: &str) -> Option<&AssetRecord> {
        self.records.get(id)
    }

    /// Records in snapshot row order.
    pub fn records(&self) -> Vec<&AssetRecord> {
        self.order.iter().filter_map(|id| self.records.get(id)).collect()
    }

    pub fn is_tracked(&self, id: &str) -> bool {
        self.tracked.contains(id)
    }

    pub fn tracked_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tracked.iter().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
