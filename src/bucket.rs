//! Bucket: one hash slot's entry chain behind a reader/writer lock.

use core::borrow::Borrow;
use parking_lot::RwLock;
use slotmap::{DefaultKey, SlotMap};

/// Stable position of one entry within a bucket. Generational: removing an
/// entry invalidates its handle forever, even if the physical slot is later
/// reused for a different key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub(crate) struct Handle(DefaultKey);

impl Handle {
    fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
}

#[derive(Debug)]
struct Slot<K, V> {
    key: K,
    value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

/// Chain state guarded by the bucket lock.
///
/// Invariants:
/// - the links from `head` to `tail` visit every live slot exactly once, in
///   insertion order, and contain at most one slot per distinct key;
/// - `slots.len()` equals the chain length;
/// - `head` is the oldest entry, `tail` the newest, both `None` when empty.
///
/// Methods here assume the caller holds the enclosing lock; none of them
/// touch `Bucket` again, so the lock is acquired exactly once per public
/// operation and need not be reentrant.
struct Chain<K, V> {
    slots: SlotMap<DefaultKey, Slot<K, V>>,
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
}

impl<K, V> Chain<K, V> {
    fn new() -> Self {
        Self {
            slots: SlotMap::new(),
            head: None,
            tail: None,
        }
    }

    fn find<Q>(&self, q: &Q) -> Option<DefaultKey>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut cur = self.head;
        while let Some(k) = cur {
            let slot = &self.slots[k];
            if slot.key.borrow() == q {
                return Some(k);
            }
            cur = slot.next;
        }
        None
    }

    fn push_tail(&mut self, key: K, value: V) -> DefaultKey {
        let prev = self.tail;
        let k = self.slots.insert(Slot {
            key,
            value,
            prev,
            next: None,
        });
        match prev {
            Some(t) => self.slots[t].next = Some(k),
            None => self.head = Some(k),
        }
        self.tail = Some(k);
        k
    }

    fn unlink(&mut self, k: DefaultKey) -> Option<(K, V)> {
        let slot = self.slots.remove(k)?;
        match slot.prev {
            Some(p) => self.slots[p].next = slot.next,
            None => self.head = slot.next,
        }
        match slot.next {
            Some(n) => self.slots[n].prev = slot.prev,
            None => self.tail = slot.prev,
        }
        Some((slot.key, slot.value))
    }

    fn clear(&mut self) {
        self.slots.clear();
        self.head = None;
        self.tail = None;
    }
}

/// One hash slot: an insertion-ordered chain of key/value entries guarded by
/// a single `RwLock`. Per-key operations on the owning map touch exactly one
/// bucket, so unrelated keys in different buckets never contend.
pub(crate) struct Bucket<K, V> {
    chain: RwLock<Chain<K, V>>,
}

impl<K: Eq, V> Bucket<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            chain: RwLock::new(Chain::new()),
        }
    }

    /// Keep-first insert: an existing key is returned untouched with
    /// `false`; otherwise the entry is linked at the tail of the chain.
    /// The slot is fully initialized before the write lock is released.
    pub(crate) fn insert(&self, key: K, value: V) -> (Handle, bool) {
        let mut chain = self.chain.write();
        if let Some(found) = chain.find(&key) {
            return (Handle::new(found), false);
        }
        (Handle::new(chain.push_tail(key, value)), true)
    }

    /// Upsert: overwrites the value in place on a key match, keeping the
    /// entry's position in the chain; otherwise links at the tail.
    pub(crate) fn insert_or_assign(&self, key: K, value: V) -> Handle {
        let mut chain = self.chain.write();
        match chain.find(&key) {
            Some(found) => {
                chain.slots[found].value = value;
                Handle::new(found)
            }
            None => Handle::new(chain.push_tail(key, value)),
        }
    }

    /// Locked linear scan; `None` is the miss marker.
    pub(crate) fn find<Q>(&self, q: &Q) -> Option<Handle>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        self.chain.read().find(q).map(Handle::new)
    }

    /// Scan and clone the matching value in one read-lock critical section.
    pub(crate) fn get<Q>(&self, q: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        V: Clone,
    {
        let chain = self.chain.read();
        chain.find(q).map(|k| chain.slots[k].value.clone())
    }

    pub(crate) fn remove<Q>(&self, q: &Q) -> Option<(K, V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        let mut chain = self.chain.write();
        let found = chain.find(q)?;
        chain.unlink(found)
    }

    /// Unlinks the entry a handle names. Stale handles are a no-op.
    pub(crate) fn remove_handle(&self, h: Handle) -> Option<(K, V)> {
        self.chain.write().unlink(h.0)
    }

    pub(crate) fn clear(&self) {
        self.chain.write().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.chain.read().slots.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.chain.read().slots.is_empty()
    }

    /// Whether a handle still names a live entry.
    pub(crate) fn contains_handle(&self, h: Handle) -> bool {
        self.chain.read().slots.contains_key(h.0)
    }

    /// Oldest live entry, `None` when the bucket is empty.
    pub(crate) fn first(&self) -> Option<Handle> {
        self.chain.read().head.map(Handle::new)
    }

    /// Successor in chain order. `None` past the tail and for stale handles,
    /// so a cursor whose entry was erased under it skips to the next bucket
    /// instead of dereferencing a dead position.
    pub(crate) fn next_of(&self, h: Handle) -> Option<Handle> {
        self.chain
            .read()
            .slots
            .get(h.0)
            .and_then(|slot| slot.next)
            .map(Handle::new)
    }

    pub(crate) fn key(&self, h: Handle) -> Option<K>
    where
        K: Clone,
    {
        self.chain.read().slots.get(h.0).map(|slot| slot.key.clone())
    }

    pub(crate) fn value(&self, h: Handle) -> Option<V>
    where
        V: Clone,
    {
        self.chain
            .read()
            .slots
            .get(h.0)
            .map(|slot| slot.value.clone())
    }

    pub(crate) fn entry(&self, h: Handle) -> Option<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        self.chain
            .read()
            .slots
            .get(h.0)
            .map(|slot| (slot.key.clone(), slot.value.clone()))
    }

    /// Value-only write; the key is untouched. `false` when the handle is
    /// stale, so a racing erase is reported instead of resurrecting the
    /// entry.
    pub(crate) fn set_value(&self, h: Handle, value: V) -> bool {
        match self.chain.write().slots.get_mut(h.0) {
            Some(slot) => {
                slot.value = value;
                true
            }
            None => false,
        }
    }

    /// Whole-entry write in one critical section. The caller is responsible
    /// for the new key still belonging to this bucket; see
    /// `EntryRef::set_pair`.
    pub(crate) fn set_entry(&self, h: Handle, key: K, value: V) -> bool {
        match self.chain.write().slots.get_mut(h.0) {
            Some(slot) => {
                slot.key = key;
                slot.value = value;
                true
            }
            None => false,
        }
    }

    /// Ordered clone of all live entries under one read lock.
    pub(crate) fn snapshot(&self) -> Vec<(K, V)>
    where
        K: Clone,
        V: Clone,
    {
        let chain = self.chain.read();
        let mut out = Vec::with_capacity(chain.slots.len());
        let mut cur = chain.head;
        while let Some(k) = cur {
            let slot = &chain.slots[k];
            out.push((slot.key.clone(), slot.value.clone()));
            cur = slot.next;
        }
        out
    }

    /// Feeds this bucket's entries, in chain order, to a `Debug` map
    /// builder without cloning them.
    pub(crate) fn debug_entries(&self, m: &mut core::fmt::DebugMap<'_, '_>)
    where
        K: core::fmt::Debug,
        V: core::fmt::Debug,
    {
        let chain = self.chain.read();
        let mut cur = chain.head;
        while let Some(k) = cur {
            let slot = &chain.slots[k];
            m.entry(&slot.key, &slot.value);
            cur = slot.next;
        }
    }
}

impl<K: Eq + Clone, V: Clone> Clone for Bucket<K, V> {
    /// Deep copy in traversal order: read-locks the source so it cannot be
    /// mutated mid-copy, then rebuilds the chain in fresh slots sharing no
    /// storage with the source.
    fn clone(&self) -> Self {
        let source = self.chain.read();
        let mut chain = Chain::new();
        let mut cur = source.head;
        while let Some(k) = cur {
            let slot = &source.slots[k];
            chain.push_tail(slot.key.clone(), slot.value.clone());
            cur = slot.next;
        }
        Bucket {
            chain: RwLock::new(chain),
        }
    }
}
