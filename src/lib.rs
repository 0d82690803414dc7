//! bucket-hashmap: a thread-safe map over a fixed array of independently
//! locked buckets, with stable handles instead of pointer-chased chains.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: finer-grained locking than a single global lock while staying
//!   far simpler than a lock-free table, built in safe, verifiable layers
//!   so each piece can be reasoned about independently.
//! - Layers:
//!   - Bucket<K, V>: one hash slot - an insertion-ordered chain of entries
//!     stored in a slot table with generational handles, guarded by one
//!     reader/writer lock.
//!   - BucketMap<K, V, S>: fixed bucket array plus hash routing; per-key
//!     operations touch exactly one bucket lock, whole-container
//!     operations serialize on a container-level structural lock.
//!   - EntryRef / Iter: a non-owning proxy to one entry and a forward
//!     cursor composed from per-bucket traversal.
//!
//! Constraints
//! - The bucket count is fixed at construction. No rehashing, ever; chain
//!   length is the caller's tuning responsibility.
//! - `hash(key) % bucket_count` routing: keys that are equal must hash
//!   identically (the standard `Eq`/`Hash` contract).
//! - Entries live in `slotmap` slot tables. A removed entry's handle is
//!   invalidated forever - a reused physical slot carries a new
//!   generation - so stale proxies read `None`/report `false` instead of
//!   dangling. No `unsafe` anywhere.
//!
//! Locking
//! - Two lock domains: one non-reentrant `RwLock` per bucket, and one
//!   container `Mutex` for structural operations. Acquisition order is
//!   always container → bucket; per-key operations take exactly one bucket
//!   lock and never the container lock.
//! - Public bucket operations acquire their lock once and delegate to
//!   helpers on the guarded chain, so no code path re-acquires a lock it
//!   already holds.
//! - Cross-instance assignment (`assign_from`) takes the two container
//!   locks in memory-address order; concurrent `a.assign_from(&b)` and
//!   `b.assign_from(&a)` cannot deadlock.
//! - All waits are indefinite blocking; there are no timeouts and no
//!   retries.
//!
//! Consistency model (deliberately relaxed)
//! - Whole-container operations serialize against each other, not against
//!   per-key operations. `len()` may race an in-flight `insert` in a
//!   bucket it has already visited; iteration observes each bucket at the
//!   moment the cursor reaches it. Tightening this would push every
//!   per-key operation through the container lock and eliminate
//!   cross-bucket parallelism - callers needing a stable view synchronize
//!   externally.
//! - `get_or_insert_with`/`get_or_insert_default` are the exception: they
//!   hold the structural lock for their whole duration and so serialize
//!   system-wide, even for unrelated keys.
//!
//! Notes and non-goals
//! - No resizing, persistence, lock-freedom, or cross-process sharing.
//! - Absence and staleness are reported through return values
//!   (`None`/`false`); there is no error type. Allocation failure aborts.
//! - Public surface is `BucketMap`, `EntryRef`, and `Iter`; the bucket
//!   layer is an implementation detail.

#![forbid(unsafe_code)]

mod bucket;
mod cursor;
mod map;
mod map_proptest;

// Public surface
pub use cursor::{EntryRef, Iter};
pub use map::{BucketMap, DEFAULT_BUCKET_COUNT};
