use std::collections::{BTreeMap, HashMap};

use lens_types::{ContentIdentifier, MetadataRecord};

struct Slot {
    seq: u64,
    record: MetadataRecord,
}

/// Records keyed by identifier, iterated in first-insertion order.
///
/// Overwriting a key keeps its sequence number; deleting and re-inserting
/// moves it to the end.
#[derive(Default)]
pub(crate) struct OrderedEntries {
    slots: HashMap<ContentIdentifier, Slot>,
    order: BTreeMap<u64, ContentIdentifier>,
    next_seq: u64,
}

impl OrderedEntries {
    pub fn upsert(&mut self, key: ContentIdentifier, record: MetadataRecord) {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.record = record;
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key);
        self.slots.insert(key, Slot { seq, record });
    }

    pub fn remove(&mut self, key: &ContentIdentifier) -> bool {
        match self.slots.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.seq);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, key: &ContentIdentifier) -> Option<&MetadataRecord> {
        self.slots.get(key).map(|s| &s.record)
    }

    pub fn contains(&self, key: &ContentIdentifier) -> bool {
        self.slots.contains_key(key)
    }

    pub fn keys(&self) -> Vec<ContentIdentifier> {
        self.order.values().copied().collect()
    }

    /// Live `(key, record)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&ContentIdentifier, &MetadataRecord)> {
        self.order
            .values()
            .filter_map(|k| self.slots.get(k).map(|s| (k, &s.record)))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }
}
