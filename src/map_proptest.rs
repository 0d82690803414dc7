#![cfg(test)]

// Property tests for BucketMap kept inside the crate so they can hold
// EntryRef proxies across operations without feature gates.

use crate::{BucketMap, EntryRef};
use proptest::prelude::*;
use std::collections::{BTreeSet, HashMap};
use std::hash::{BuildHasher, Hasher};

// Pool-indexed operations to improve shrinking: indices shrink to earlier
// keys, pool length shrinks, and op lists shrink in length.
#[derive(Clone, Debug)]
enum Op {
    Insert(usize, i32),
    InsertOrAssign(usize, i32),
    Remove(usize),
    Find(usize),
    Contains(String),
    Mutate(usize, i32),
    GetOrDefault(usize),
    Iterate,
    Clear,
}

fn key_from(pool: &[String], i: usize) -> String {
    pool[i].clone()
}

fn arb_scenario() -> impl Strategy<Value = (Vec<String>, Vec<Op>)> {
    proptest::collection::vec("[a-z]{0,5}", 1..=8).prop_flat_map(|pool| {
        let idxs: Vec<usize> = (0..pool.len()).collect();
        let idx = proptest::sample::select(idxs);
        let contains_pool = proptest::sample::select(pool.clone());
        let op = prop_oneof![
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Insert(i, v)),
            4 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::InsertOrAssign(i, v)),
            3 => idx.clone().prop_map(Op::Remove),
            3 => idx.clone().prop_map(Op::Find),
            2 => prop_oneof![
                contains_pool.prop_map(|s: String| s),
                "[a-z]{0,5}".prop_map(|s| s)
            ]
            .prop_map(Op::Contains),
            3 => (idx.clone(), any::<i32>()).prop_map(|(i, v)| Op::Mutate(i, v)),
            2 => idx.clone().prop_map(Op::GetOrDefault),
            2 => Just(Op::Iterate),
            1 => Just(Op::Clear),
        ];
        proptest::collection::vec(op, 1..60).prop_map(move |ops| (pool.clone(), ops))
    })
}

// Shared body so the collision variant below runs the identical state
// machine against a different hasher and bucket count.
fn run_state_machine<S>(sut: BucketMap<String, i32, S>, pool: Vec<String>, ops: Vec<Op>)
where
    S: BuildHasher + Clone + Default,
{
    let sut = &sut;
    let mut model: HashMap<String, i32> = HashMap::new();
    let mut stale: Vec<EntryRef<'_, String, i32, S>> = Vec::new();

    for op in ops {
        match op {
            Op::Insert(i, v) => {
                let k = key_from(&pool, i);
                let already = model.contains_key(&k);
                let (r, inserted) = sut.insert(k.clone(), v);
                assert_eq!(inserted, !already, "insert must report prior absence");
                if inserted {
                    model.insert(k, v);
                    assert_eq!(r.get(), Some(v));
                } else {
                    // Keep-first: the proxy names the existing entry.
                    assert_eq!(r.get(), model.get(&k).copied());
                }
            }
            Op::InsertOrAssign(i, v) => {
                let k = key_from(&pool, i);
                let r = sut.insert_or_assign(k.clone(), v);
                model.insert(k, v);
                assert_eq!(r.get(), Some(v));
            }
            Op::Remove(i) => {
                let k = key_from(&pool, i);
                let removed = sut.remove(&k);
                let expected = model.remove(&k).map(|v| (k.clone(), v));
                assert_eq!(removed, expected);
                if removed.is_some() {
                    // A fresh lookup after removal must miss.
                    assert!(sut.find(&k).is_none());
                }
            }
            Op::Find(i) => {
                let k = key_from(&pool, i);
                let found = sut.find(&k);
                assert_eq!(found.is_some(), model.contains_key(&k));
                if let Some(r) = found {
                    assert_eq!(r.get(), model.get(&k).copied());
                    // Proxies for the same live entry compare equal.
                    assert_eq!(Some(r), sut.find(&k));
                }
            }
            Op::Contains(s) => {
                assert_eq!(sut.contains_key(s.as_str()), model.contains_key(&s));
            }
            Op::Mutate(i, v) => {
                let k = key_from(&pool, i);
                if let Some(r) = sut.find(&k) {
                    assert!(r.set(v), "live proxy write must succeed");
                    model.insert(k, v);
                }
            }
            Op::GetOrDefault(i) => {
                let k = key_from(&pool, i);
                let r = sut.get_or_insert_default(k.clone());
                let expected = *model.entry(k).or_insert(0);
                assert_eq!(r.get(), Some(expected));
            }
            Op::Iterate => {
                let visited: Vec<String> = sut.iter().map(|r| r.key().unwrap()).collect();
                let distinct: BTreeSet<&String> = visited.iter().collect();
                assert_eq!(visited.len(), distinct.len(), "each entry exactly once");
                let model_keys: BTreeSet<&String> = model.keys().collect();
                assert_eq!(distinct, model_keys);
            }
            Op::Clear => {
                // Mint proxies for everything about to die, then clear.
                let doomed: Vec<_> = sut.iter().collect();
                sut.clear();
                model.clear();
                stale.extend(doomed);
                assert!(sut.iter().is_end());
            }
        }

        // Post-conditions after each op:
        // 1) proxies to cleared entries never resolve again;
        for r in &stale {
            assert_eq!(r.get(), None);
            assert!(!r.is_live());
        }
        // 2) size parity with the model.
        assert_eq!(sut.len(), model.len());
        assert_eq!(sut.is_empty(), model.is_empty());
    }
}

// Property: state-machine equivalence against std::collections::HashMap.
// Invariants exercised across random operation sequences:
// - insert keep-first / insert_or_assign upsert parity with the model;
// - remove returns the owned pair the model predicts and invalidates
//   subsequent lookups;
// - find proxies read the model's value and compare equal per live entry;
// - get_or_insert_default inserts zero exactly when the model lacks the key;
// - iteration visits each live key exactly once;
// - cleared entries' proxies stay stale; len/is_empty parity after each op.
proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine((pool, ops) in arb_scenario()) {
        run_state_machine(BucketMap::new(), pool, ops);
    }
}

// Collision variant: constant hasher over a tiny bucket array, stressing
// chain scans and equality resolution instead of routing.
#[derive(Clone, Default)]
struct ConstBuildHasher;
struct ConstHasher;
impl BuildHasher for ConstBuildHasher {
    type Hasher = ConstHasher;
    fn build_hasher(&self) -> Self::Hasher {
        ConstHasher
    }
}
impl Hasher for ConstHasher {
    fn write(&mut self, _bytes: &[u8]) {}
    fn finish(&self) -> u64 {
        0
    }
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 64, .. ProptestConfig::default() })]
    #[test]
    fn prop_state_machine_with_collisions((pool, ops) in arb_scenario()) {
        run_state_machine(
            BucketMap::with_bucket_count_and_hasher(2, ConstBuildHasher),
            pool,
            ops,
        );
    }
}
