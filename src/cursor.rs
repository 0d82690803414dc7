//! Reference proxy and forward cursor over a `BucketMap`.

use core::hash::{BuildHasher, Hash};
use core::ptr;
use std::collections::hash_map::RandomState;

use crate::bucket::{Bucket, Handle};
use crate::map::BucketMap;

/// A non-owning proxy bound to one entry of a [`BucketMap`].
///
/// Obtained from `insert`, `find`, `get_or_insert_default`, or by iterating.
/// Every access goes through the entry's bucket lock, so a proxy can be held
/// across other operations freely. If the entry is removed by any thread the
/// proxy goes stale: reads return `None` and writes return `false` - a stale
/// proxy is inert, never dangling.
pub struct EntryRef<'a, K, V, S = RandomState> {
    pub(crate) map: &'a BucketMap<K, V, S>,
    pub(crate) index: usize,
    pub(crate) handle: Handle,
}

impl<'a, K, V, S> EntryRef<'a, K, V, S> {
    pub(crate) fn new(map: &'a BucketMap<K, V, S>, index: usize, handle: Handle) -> Self {
        Self { map, index, handle }
    }

    fn bucket(&self) -> &'a Bucket<K, V> {
        self.map.bucket_at(self.index)
    }
}

impl<'a, K: Eq, V, S> EntryRef<'a, K, V, S> {
    /// Clones the entry's key under the bucket read lock.
    pub fn key(&self) -> Option<K>
    where
        K: Clone,
    {
        self.bucket().key(self.handle)
    }

    /// Clones the mapped value under the bucket read lock.
    pub fn get(&self) -> Option<V>
    where
        V: Clone,
    {
        self.bucket().value(self.handle)
    }

    /// Clones the whole entry in one read-lock critical section.
    pub fn get_pair(&self) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.bucket().entry(self.handle)
    }

    /// Replaces the mapped value, keeping the key, in one write-lock
    /// critical section. Returns `false` if the entry was removed.
    pub fn set(&self, value: V) -> bool {
        self.bucket().set_value(self.handle, value)
    }

    /// Replaces the whole entry in one write-lock critical section.
    /// Returns `false` if the entry was removed.
    ///
    /// The new key must still route to the entry's bucket (normally it
    /// compares equal to the old key); storing a key that hashes elsewhere
    /// would strand the entry where lookups never probe. Checked with a
    /// `debug_assert` in debug builds.
    pub fn set_pair(&self, entry: (K, V)) -> bool
    where
        K: Hash,
        S: BuildHasher + Clone + Default,
    {
        let (key, value) = entry;
        debug_assert_eq!(
            self.map.bucket_index_of(&key),
            self.index,
            "set_pair key must route to the entry's own bucket"
        );
        self.bucket().set_entry(self.handle, key, value)
    }

    /// `true` while the referenced entry is still live.
    pub fn is_live(&self) -> bool {
        self.bucket().contains_handle(self.handle)
    }
}

impl<K, V, S> Clone for EntryRef<'_, K, V, S> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K, V, S> Copy for EntryRef<'_, K, V, S> {}

/// Identity comparison: two proxies are equal when they name the same entry
/// generation of the same map.
impl<K, V, S> PartialEq for EntryRef<'_, K, V, S> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.map, other.map) && self.index == other.index && self.handle == other.handle
    }
}

impl<K, V, S> Eq for EntryRef<'_, K, V, S> {}

impl<K, V, S> core::fmt::Debug for EntryRef<'_, K, V, S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EntryRef")
            .field("bucket", &self.index)
            .field("handle", &self.handle)
            .finish()
    }
}

/// Forward cursor over all live entries of a [`BucketMap`], bucket by bucket
/// in index order, insertion order within each bucket.
///
/// The cursor is not a snapshot: entries inserted into or removed from
/// buckets it has not reached yet are seen or missed accordingly, and the
/// entry under the cursor may be removed by another thread (advancing then
/// skips to the next bucket). Each step takes at most a few brief bucket
/// read locks and never the container lock.
pub struct Iter<'a, K, V, S = RandomState> {
    map: &'a BucketMap<K, V, S>,
    pos: Option<(usize, Handle)>,
}

impl<'a, K, V, S> Iter<'a, K, V, S> {
    /// `pos == None` is the canonical end; construction from an
    /// end-of-bucket position normalizes to it by never materializing one.
    pub(crate) fn new(map: &'a BucketMap<K, V, S>, pos: Option<(usize, Handle)>) -> Self {
        Self { map, pos }
    }

    /// `true` once the cursor is past the last entry.
    pub fn is_end(&self) -> bool {
        self.pos.is_none()
    }
}

impl<'a, K: Eq, V, S> Iterator for Iter<'a, K, V, S> {
    type Item = EntryRef<'a, K, V, S>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, handle) = self.pos?;
        self.pos = self.map.position_after(index, handle);
        Some(EntryRef::new(self.map, index, handle))
    }
}

impl<K, V, S> Clone for Iter<'_, K, V, S> {
    fn clone(&self) -> Self {
        Self {
            map: self.map,
            pos: self.pos,
        }
    }
}

/// Two cursors are equal when both are at the canonical end of the same map
/// or both rest on the same entry.
impl<K, V, S> PartialEq for Iter<'_, K, V, S> {
    fn eq(&self, other: &Self) -> bool {
        ptr::eq(self.map, other.map) && self.pos == other.pos
    }
}

impl<K, V, S> Eq for Iter<'_, K, V, S> {}

#[cfg(test)]
mod tests {
    use crate::BucketMap;
    use std::collections::BTreeSet;

    /// Invariant: proxies from `insert` and `find` for the same key compare
    /// equal; proxies for distinct entries do not.
    #[test]
    fn entry_ref_identity() {
        let m: BucketMap<i32, char> = BucketMap::new();
        let (r_insert, _) = m.insert(1, 'A');
        let r_find = m.find(&1).unwrap();
        assert_eq!(r_insert, r_find);

        let (r_other, _) = m.insert(2, 'B');
        assert_ne!(r_insert, r_other);
    }

    /// Invariant: a proxy reads the entry it was bound to and writes through
    /// to it; `set` keeps the key.
    #[test]
    fn entry_ref_read_write() {
        let m: BucketMap<i32, char> = BucketMap::new();
        let (r, _) = m.insert(1, 'A');
        assert_eq!(r.get(), Some('A'));
        assert_eq!(r.key(), Some(1));
        assert_eq!(r.get_pair(), Some((1, 'A')));

        assert!(r.set('B'));
        assert_eq!(m.get(&1), Some('B'));

        assert!(r.set_pair((1, 'C')));
        assert_eq!(r.get_pair(), Some((1, 'C')));
    }

    /// Invariant: removing the entry makes its proxy stale - reads `None`,
    /// writes `false` - and a reinserted key gets a fresh generation.
    #[test]
    fn entry_ref_goes_stale_on_remove() {
        let m: BucketMap<i32, char> = BucketMap::new();
        let (r, _) = m.insert(1, 'A');
        assert!(r.is_live());
        m.remove(&1);
        assert!(!r.is_live());
        assert_eq!(r.get(), None);
        assert_eq!(r.key(), None);
        assert!(!r.set('B'));

        let (r2, _) = m.insert(1, 'Z');
        assert_ne!(r, r2);
        assert_eq!(r.get(), None);
        assert_eq!(r2.get(), Some('Z'));
    }

    /// Invariant: iteration starts at the first non-empty bucket, walks each
    /// chain in insertion order, skips empty buckets, and ends at the
    /// canonical end where all end cursors compare equal.
    #[test]
    fn iter_crosses_buckets() {
        let m: BucketMap<usize, usize> = BucketMap::with_bucket_count(4);
        for k in 0..12 {
            m.insert(k, k * 2);
        }
        let seen: BTreeSet<usize> = m.iter().map(|r| r.key().unwrap()).collect();
        assert_eq!(seen, (0..12).collect());

        let mut it = m.iter();
        for _ in 0..12 {
            assert!(it.next().is_some());
        }
        assert!(it.next().is_none());
        assert!(it.is_end());

        let empty: BucketMap<usize, usize> = BucketMap::with_bucket_count(4);
        assert!(empty.iter().is_end());
    }

    /// Invariant: two fresh cursors over the same map are equal, advance in
    /// lockstep, and exhausted cursors are equal regardless of path.
    #[test]
    fn iter_equality() {
        let m: BucketMap<i32, i32> = BucketMap::with_bucket_count(3);
        for k in 0..5 {
            m.insert(k, k);
        }
        let mut a = m.iter();
        let mut b = m.iter();
        assert!(a == b);
        a.next();
        assert!(a != b);
        b.next();
        assert!(a == b);
        while a.next().is_some() {}
        while b.next().is_some() {}
        assert!(a == b);
    }

    /// Invariant: removing the entry under a cursor does not derail it past
    /// the current bucket - advancing skips to the next bucket's entries.
    #[test]
    fn iter_survives_removal_under_cursor() {
        let m: BucketMap<usize, usize> = BucketMap::with_bucket_count(2);
        for k in 0..6 {
            m.insert(k, k);
        }
        let mut it = m.iter();
        let first = it.next().unwrap();
        m.remove(&first.key().unwrap());
        // Cursor already advanced past the removed entry; draining still
        // visits every remaining entry exactly once.
        let rest: Vec<usize> = it.map(|r| r.key().unwrap()).collect();
        assert_eq!(rest.len(), 5);
    }
}
