use bytes::Bytes;
use fxhash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entry::{Entry, NotNumeric};

pub const NEVER: i64 = i64::MAX;
const MAX_RELATIVE_EXPTIME: i64 = 60 * 60 * 24 * 30;

/// `0` means never expires. Values at or below thirty days are relative to
/// `now`, anything larger is already an absolute Unix timestamp.
pub fn to_absolute_exptime(raw: i64, now: i64) -> i64 {
    if raw == 0 {
        NEVER
    } else if raw <= MAX_RELATIVE_EXPTIME {
        now + raw
    } else {
        raw
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum StoreStatus {
    Stored,
    NotStored,
    Exists,
    NotFound,
    Deleted,
    Touched,
}

/// Store performs no locking of its own; callers hold whatever lock guards
/// concurrent access.
#[derive(Default)]
pub struct Store {
    entries: FxHashMap<Bytes, Entry>,
    next_unique: AtomicU64,
}

impl Store {
    pub fn new() -> Self {
        Store {
            entries: FxHashMap::default(),
            next_unique: AtomicU64::new(1),
        }
    }

    fn next_unique(&self) -> u64 {
        self.next_unique.fetch_add(1, Ordering::Relaxed)
    }

    fn find(&self, now: i64, key: &[u8]) -> Option<&Entry> {
        self.entries
            .get(key)
            .filter(|entry| entry.is_live(now))
    }

    fn find_mut(&mut self, now: i64, key: &[u8]) -> Option<&mut Entry> {
        if self.entries.get(key).is_some_and(|e| e.is_live(now)) {
            self.entries.get_mut(key)
        } else {
            None
        }
    }

    pub fn evict_expired(&mut self, now: i64) {
        self.entries.retain(|_, entry| entry.is_live(now));
    }

    pub fn get(&self, now: i64, keys: &[Bytes]) -> Vec<Entry> {
        keys.iter()
            .filter_map(|k| self.find(now, k))
            .cloned()
            .collect()
    }

    pub fn gat(&mut self, now: i64, keys: &[Bytes], new_exptime: i64) -> Vec<Entry> {
        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.find_mut(now, key) {
                entry.touch(new_exptime);
                out.push(entry.clone());
            }
        }
        out
    }

    pub fn set(&mut self, key: Bytes, flags: u32, exptime: i64, data: Bytes) -> StoreStatus {
        let unique = self.next_unique();
        let entry = Entry::new(key.clone(), flags, exptime, data, unique);
        self.entries.insert(key, entry);
        StoreStatus::Stored
    }

    pub fn add(&mut self, now: i64, key: Bytes, flags: u32, exptime: i64, data: Bytes) -> StoreStatus {
        if self.find(now, &key).is_some() {
            StoreStatus::NotStored
        } else {
            let unique = self.next_unique();
            let entry = Entry::new(key.clone(), flags, exptime, data, unique);
            self.entries.insert(key, entry);
            StoreStatus::Stored
        }
    }

    pub fn replace(
        &mut self,
        now: i64,
        key: Bytes,
        flags: u32,
        exptime: i64,
        data: Bytes,
    ) -> StoreStatus {
        if self.find(now, &key).is_none() {
            return StoreStatus::NotStored;
        }
        let unique = self.next_unique();
        let entry = Entry::new(key.clone(), flags, exptime, data, unique);
        self.entries.insert(key, entry);
        StoreStatus::Stored
    }

    pub fn cas(
        &mut self,
        now: i64,
        key: Bytes,
        flags: u32,
        exptime: i64,
        data: Bytes,
        unique: u64,
    ) -> StoreStatus {
        match self.find(now, &key) {
            None => StoreStatus::NotFound,
            Some(entry) if entry.unique != unique => StoreStatus::Exists,
            Some(_) => {
                let new_unique = self.next_unique();
                let entry = Entry::new(key.clone(), flags, exptime, data, new_unique);
                self.entries.insert(key, entry);
                StoreStatus::Stored
            }
        }
    }

    pub fn delete(&mut self, now: i64, key: &[u8]) -> StoreStatus {
        if self.find(now, key).is_some() {
            self.entries.remove(key);
            StoreStatus::Deleted
        } else {
            StoreStatus::NotFound
        }
    }

    pub fn touch(&mut self, now: i64, key: &[u8], new_exptime: i64) -> StoreStatus {
        match self.find_mut(now, key) {
            Some(entry) => {
                entry.touch(new_exptime);
                StoreStatus::Touched
            }
            None => StoreStatus::NotFound,
        }
    }

    pub fn incr(&mut self, now: i64, key: &[u8], step: u64) -> Option<Result<Bytes, NotNumeric>> {
        self.find_mut(now, key).map(|entry| entry.incr(step))
    }

    pub fn decr(&mut self, now: i64, key: &[u8], step: u64) -> Option<Result<Bytes, NotNumeric>> {
        self.find_mut(now, key).map(|entry| entry.decr(step))
    }

    pub fn append(&mut self, now: i64, key: &[u8], data: &Bytes) -> StoreStatus {
        match self.find_mut(now, key) {
            Some(entry) => {
                entry.append(data);
                StoreStatus::Stored
            }
            None => StoreStatus::NotStored,
        }
    }

    pub fn prepend(&mut self, now: i64, key: &[u8], data: &Bytes) -> StoreStatus {
        match self.find_mut(now, key) {
            Some(entry) => {
                entry.prepend(data);
                StoreStatus::Stored
            }
            None => StoreStatus::NotStored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn k(s: &str) -> Bytes {
        Bytes::from(s.to_string())
    }

    #[test]
    fn set_then_get_round_trips() {
        let mut store = Store::new();
        store.set(k("foo"), 7, NEVER, Bytes::from("hello"));
        let got = store.get(0, &[k("foo")]);
        assert_eq!(got.len(), 1);
        assert_eq!(&got[0].data[..], b"hello");
        assert_eq!(got[0].flags, 7);
    }

    #[test]
    fn add_over_expired_slot_succeeds() {
        let mut store = Store::new();
        store.set(k("k"), 0, 110, Bytes::from("A"));
        let status = store.add(200, k("k"), 0, 310, Bytes::from("B"));
        assert_eq!(status, StoreStatus::Stored);
        let got = store.get(200, &[k("k")]);
        assert_eq!(&got[0].data[..], b"B");
    }

    #[test]
    fn replace_over_expired_slot_fails() {
        let mut store = Store::new();
        store.set(k("k"), 0, 110, Bytes::from("A"));
        let status = store.replace(200, k("k"), 0, 310, Bytes::from("B"));
        assert_eq!(status, StoreStatus::NotStored);
    }

    #[test]
    fn cas_against_expired_slot_is_not_found() {
        let mut store = Store::new();
        store.set(k("k"), 0, 110, Bytes::from("A"));
        let status = store.cas(200, k("k"), 0, 310, Bytes::from("B"), 1);
        assert_eq!(status, StoreStatus::NotFound);
    }

    #[test]
    fn cas_law_succeeds_once() {
        let mut store = Store::new();
        store.set(k("foo"), 0, NEVER, Bytes::from("hello"));
        let unique = store.get(0, &[k("foo")])[0].unique;
        store.set(k("foo"), 0, NEVER, Bytes::from("world"));
        let status = store.cas(0, k("foo"), 0, NEVER, Bytes::from("XYZ"), unique);
        assert_eq!(status, StoreStatus::Exists);
    }

    #[test]
    fn append_preserves_tag_and_target_flags() {
        let mut store = Store::new();
        store.set(k("k"), 9, NEVER, Bytes::from("foo"));
        let before = store.get(0, &[k("k")])[0].unique;
        let status = store.append(0, b"k", &Bytes::from("bar"));
        assert_eq!(status, StoreStatus::Stored);
        let got = &store.get(0, &[k("k")])[0];
        assert_eq!(&got.data[..], b"foobar");
        assert_eq!(got.unique, before);
        assert_eq!(got.flags, 9);
    }

    #[test]
    fn exptime_zero_never_expires() {
        assert_eq!(to_absolute_exptime(0, 1_000_000), NEVER);
    }

    #[test]
    fn relative_and_absolute_exptime_conversion() {
        assert_eq!(to_absolute_exptime(10, 100), 110);
        assert_eq!(to_absolute_exptime(3_000_000, 100), 3_000_000);
    }

    #[test]
    fn expiry_hides_entry_at_or_after_exptime() {
        let mut store = Store::new();
        store.set(k("k"), 0, 100, Bytes::from("A"));
        assert_eq!(store.get(99, &[k("k")]).len(), 1);
        assert_eq!(store.get(100, &[k("k")]).len(), 0);
    }

    #[test]
    fn gat_with_all_absent_keys_yields_nothing() {
        let mut store = Store::new();
        assert!(store.gat(0, &[k("missing")], 100).is_empty());
    }
}
