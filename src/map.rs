//! BucketMap: fixed bucket array, hash routing, and the structural lock.

use core::borrow::Borrow;
use core::fmt;
use core::hash::{BuildHasher, Hash};
use core::ptr;
use parking_lot::Mutex;
use std::collections::hash_map::RandomState;

use crate::bucket::{Bucket, Handle};
use crate::cursor::{EntryRef, Iter};

/// Bucket count used by `new()` and `Default`.
pub const DEFAULT_BUCKET_COUNT: usize = 16;

/// A thread-safe hash map over a fixed array of independently locked
/// buckets.
///
/// Every key routes to exactly one bucket by `hash(key) % bucket_count`;
/// per-key operations (`insert`, `find`, `remove`, ...) take only that
/// bucket's lock, so operations on keys in different buckets run in
/// parallel. Whole-container operations (`len`, `clear`, `iter`,
/// `get_or_insert_with`, `assign_from`) additionally take a container-level
/// structural lock that serializes them against each other - but not
/// against per-key operations.
///
/// # Consistency model
///
/// There is no container-wide snapshot. `len()` sums per-bucket counts while
/// per-key inserts and removals may still be landing in buckets already or
/// not yet visited, and iteration observes each bucket at the moment the
/// cursor reaches it. This is a deliberate trade: serializing per-key
/// traffic through the structural lock would eliminate cross-bucket
/// parallelism, the point of the design. Callers that need a stable view
/// must provide their own external synchronization.
///
/// The bucket count is fixed at construction; there is no rehashing. Chain
/// length within a bucket is `len() / bucket_count` on average and is
/// entirely the caller's tuning responsibility.
pub struct BucketMap<K, V, S = RandomState> {
    buckets: Box<[Bucket<K, V>]>,
    hasher: S,
    structural: Mutex<()>,
}

impl<K, V, S> BucketMap<K, V, S> {
    /// Number of buckets chosen at construction.
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The map's hash state.
    pub fn hasher(&self) -> &S {
        &self.hasher
    }

    pub(crate) fn bucket_at(&self, index: usize) -> &Bucket<K, V> {
        &self.buckets[index]
    }
}

impl<K: Eq, V, S> BucketMap<K, V, S> {
    /// First live position at or after bucket `start`, skipping empty
    /// buckets; `None` once every remaining bucket is empty.
    pub(crate) fn first_from(&self, start: usize) -> Option<(usize, Handle)> {
        self.buckets
            .iter()
            .enumerate()
            .skip(start)
            .find_map(|(index, bucket)| bucket.first().map(|handle| (index, handle)))
    }

    /// Position following `(index, handle)`: the chain successor if there is
    /// one, else the first entry of a later non-empty bucket. A stale handle
    /// has no successor in its chain, so the cursor moves on to the next
    /// bucket.
    pub(crate) fn position_after(&self, index: usize, handle: Handle) -> Option<(usize, Handle)> {
        match self.buckets[index].next_of(handle) {
            Some(next) => Some((index, next)),
            None => self.first_from(index + 1),
        }
    }
}

impl<K, V> BucketMap<K, V>
where
    K: Eq + Hash,
{
    /// An empty map with [`DEFAULT_BUCKET_COUNT`] buckets.
    pub fn new() -> Self {
        Self::with_bucket_count_and_hasher(DEFAULT_BUCKET_COUNT, RandomState::default())
    }

    /// An empty map with `bucket_count` buckets.
    ///
    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        Self::with_bucket_count_and_hasher(bucket_count, RandomState::default())
    }
}

impl<K, V, S> BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    pub fn with_hasher(hasher: S) -> Self {
        Self::with_bucket_count_and_hasher(DEFAULT_BUCKET_COUNT, hasher)
    }

    /// # Panics
    ///
    /// Panics if `bucket_count` is zero.
    pub fn with_bucket_count_and_hasher(bucket_count: usize, hasher: S) -> Self {
        assert!(bucket_count > 0, "bucket count must be non-zero");
        let buckets: Vec<Bucket<K, V>> = (0..bucket_count).map(|_| Bucket::new()).collect();
        Self {
            buckets: buckets.into_boxed_slice(),
            hasher,
            structural: Mutex::new(()),
        }
    }

    pub(crate) fn bucket_index_of<Q>(&self, key: &Q) -> usize
    where
        Q: ?Sized + Hash,
    {
        (self.hasher.hash_one(key) % self.buckets.len() as u64) as usize
    }

    /// Keep-first insert. Returns a proxy to the inserted entry and `true`,
    /// or a proxy to the already-present entry and `false`, in which case
    /// the stored value is untouched.
    ///
    /// Takes only the destination bucket's lock; inserts into different
    /// buckets proceed concurrently and are not serialized against
    /// whole-container operations.
    pub fn insert(&self, key: K, value: V) -> (EntryRef<'_, K, V, S>, bool) {
        let index = self.bucket_index_of(&key);
        let (handle, inserted) = self.buckets[index].insert(key, value);
        (EntryRef::new(self, index, handle), inserted)
    }

    /// Pair-consuming form of [`insert`](Self::insert).
    pub fn insert_entry(&self, entry: (K, V)) -> (EntryRef<'_, K, V, S>, bool) {
        let (key, value) = entry;
        self.insert(key, value)
    }

    /// Upsert: overwrites the value for an existing key, inserts otherwise.
    pub fn insert_or_assign(&self, key: K, value: V) -> EntryRef<'_, K, V, S> {
        let index = self.bucket_index_of(&key);
        let handle = self.buckets[index].insert_or_assign(key, value);
        EntryRef::new(self, index, handle)
    }

    /// Pair-consuming form of [`insert_or_assign`](Self::insert_or_assign).
    pub fn insert_or_assign_entry(&self, entry: (K, V)) -> EntryRef<'_, K, V, S> {
        let (key, value) = entry;
        self.insert_or_assign(key, value)
    }

    /// Proxy to the entry for `key`; `None` is the miss marker.
    pub fn find<Q>(&self, key: &Q) -> Option<EntryRef<'_, K, V, S>>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        let index = self.bucket_index_of(key);
        self.buckets[index]
            .find(key)
            .map(|handle| EntryRef::new(self, index, handle))
    }

    /// Clones the value for `key` in one bucket read-lock critical section.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
        V: Clone,
    {
        self.buckets[self.bucket_index_of(key)].get(key)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.buckets[self.bucket_index_of(key)].find(key).is_some()
    }

    /// Removes the entry for `key`, returning the owned pair. Absent keys
    /// are a no-op returning `None`. Outstanding proxies to the entry go
    /// stale.
    pub fn remove<Q>(&self, key: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Hash + Eq,
    {
        self.buckets[self.bucket_index_of(key)].remove(key)
    }

    /// Removes the entry at `pos` and returns a cursor positioned at its
    /// successor in iteration order (at the canonical end once past the
    /// last entry). The successor is computed before the removal, so it is
    /// never derived from a dead position. A stale `pos` removes nothing
    /// but still yields the successor cursor.
    pub fn remove_at<'a>(&'a self, pos: EntryRef<'a, K, V, S>) -> Iter<'a, K, V, S> {
        debug_assert!(
            ptr::eq(pos.map, self),
            "remove_at position must come from this map"
        );
        let successor = self.position_after(pos.index, pos.handle);
        let _ = self.buckets[pos.index].remove_handle(pos.handle);
        Iter::new(self, successor)
    }

    /// Proxy to the entry for `key`, inserting `default()` first if absent.
    ///
    /// Unlike `insert` and `find`, this holds the structural lock for its
    /// whole duration: all `get_or_insert_*` calls serialize against each
    /// other and against every whole-container operation, even for keys in
    /// different buckets.
    pub fn get_or_insert_with<F>(&self, key: K, default: F) -> EntryRef<'_, K, V, S>
    where
        F: FnOnce() -> V,
    {
        let _structural = self.structural.lock();
        let index = self.bucket_index_of(&key);
        if let Some(handle) = self.buckets[index].find(&key) {
            return EntryRef::new(self, index, handle);
        }
        let (handle, _) = self.buckets[index].insert(key, default());
        EntryRef::new(self, index, handle)
    }

    /// [`get_or_insert_with`](Self::get_or_insert_with) with `V::default()`
    /// - the subscript operation: `map.get_or_insert_default(k).set(v)`.
    pub fn get_or_insert_default(&self, key: K) -> EntryRef<'_, K, V, S>
    where
        V: Default,
    {
        self.get_or_insert_with(key, V::default)
    }

    /// Clears every bucket in index order under the structural lock.
    pub fn clear(&self) {
        let _structural = self.structural.lock();
        for bucket in self.buckets.iter() {
            bucket.clear();
        }
    }

    /// Sum of per-bucket lengths under the structural lock. See the type
    /// docs for what this does - and does not - guarantee under concurrent
    /// per-key mutation.
    pub fn len(&self) -> usize {
        let _structural = self.structural.lock();
        self.buckets.iter().map(Bucket::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        let _structural = self.structural.lock();
        self.buckets.iter().all(Bucket::is_empty)
    }

    /// Cursor over all live entries. The structural lock is held only while
    /// locating the first non-empty bucket; advancing the cursor afterwards
    /// takes brief bucket read locks only.
    pub fn iter(&self) -> Iter<'_, K, V, S> {
        let pos = {
            let _structural = self.structural.lock();
            self.first_from(0)
        };
        Iter::new(self, pos)
    }

    /// Replaces this map's contents with a copy of `source`'s, between two
    /// live containers.
    ///
    /// Both structural locks are acquired in memory-address order, so
    /// `a.assign_from(&b)` racing `b.assign_from(&a)` cannot deadlock.
    /// Entries are re-routed through this map's own hasher and bucket count
    /// (the two maps may differ in both). Self-assignment is a no-op.
    pub fn assign_from(&self, source: &Self)
    where
        K: Clone,
        V: Clone,
    {
        if ptr::eq(self, source) {
            return;
        }
        let this = self as *const Self as usize;
        let that = source as *const Self as usize;
        let (_first, _second) = if this < that {
            let a = self.structural.lock();
            let b = source.structural.lock();
            (a, b)
        } else {
            let b = source.structural.lock();
            let a = self.structural.lock();
            (a, b)
        };
        for bucket in self.buckets.iter() {
            bucket.clear();
        }
        for bucket in source.buckets.iter() {
            for (key, value) in bucket.snapshot() {
                let index = self.bucket_index_of(&key);
                self.buckets[index].insert(key, value);
            }
        }
    }
}

impl<K, V, S> Clone for BucketMap<K, V, S>
where
    K: Eq + Hash + Clone,
    V: Clone,
    S: BuildHasher + Clone + Default,
{
    /// Deep copy: the source's structural lock is held for the duration and
    /// each bucket is copied in index order under its own read lock. The
    /// clone shares no storage with the source and, because the hash state
    /// is cloned too, routes every key to the same bucket index.
    fn clone(&self) -> Self {
        let _structural = self.structural.lock();
        Self {
            buckets: self.buckets.iter().map(Bucket::clone).collect(),
            hasher: self.hasher.clone(),
            structural: Mutex::new(()),
        }
    }
}

impl<K, V, S> Default for BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    fn default() -> Self {
        Self::with_bucket_count_and_hasher(DEFAULT_BUCKET_COUNT, S::default())
    }
}

impl<K, V, S> FromIterator<(K, V)> for BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    /// Bulk construction through the insert path: duplicate keys resolve
    /// keep-first, consistent with [`insert`](BucketMap::insert).
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let map = Self::default();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}

impl<K, V, S, const N: usize> From<[(K, V); N]> for BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    /// Literal-list construction, keep-first like `FromIterator`.
    fn from(entries: [(K, V); N]) -> Self {
        entries.into_iter().collect()
    }
}

impl<K, V, S> Extend<(K, V)> for BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    /// Extends with upsert semantics: later pairs win, as with
    /// `std::collections::HashMap`.
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert_or_assign(key, value);
        }
    }
}

impl<'a, K, V, S> IntoIterator for &'a BucketMap<K, V, S>
where
    K: Eq + Hash,
    S: BuildHasher + Clone + Default,
{
    type Item = EntryRef<'a, K, V, S>;
    type IntoIter = Iter<'a, K, V, S>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<K, V, S> fmt::Debug for BucketMap<K, V, S>
where
    K: Eq + fmt::Debug,
    V: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for bucket in self.buckets.iter() {
            bucket.debug_entries(&mut m);
        }
        m.finish()
    }
}
