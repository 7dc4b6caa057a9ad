//! Property tests checking the tree against an in-memory `BTreeMap`.

use pagetree::{AllocatorConfig, BPlusTree, Key, KeyType, PageAllocator, PageCache, RecordId};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tempfile::tempdir;

#[derive(Clone, Debug)]
enum Op {
    Put(i32, u16),
    Remove(i32),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (-50i32..50, any::<u16>()).prop_map(|(k, s)| Op::Put(k, s)),
        1 => (-50i32..50).prop_map(Op::Remove),
    ]
}

fn rid_for(key: i32, slot: u16) -> RecordId {
    RecordId::new(key as u32, slot)
}

fn run_ops(ops: &[Op], order: usize, cache_pages: usize) -> Result<(), TestCaseError> {
    let dir = tempdir().unwrap();
    let allocator = PageAllocator::create(
        dir.path().join("model.db"),
        Arc::new(PageCache::new(cache_pages)),
        AllocatorConfig::default().with_durable(false),
    )
    .unwrap();
    let mut tree = BPlusTree::create(allocator, KeyType::Int, order).unwrap();
    let mut model: BTreeMap<i32, RecordId> = BTreeMap::new();

    for op in ops {
        match *op {
            Op::Put(k, s) => {
                tree.put(Key::Int(k), rid_for(k, s)).unwrap();
                model.insert(k, rid_for(k, s));
            }
            Op::Remove(k) => {
                let removed = tree.remove(&Key::Int(k)).unwrap();
                prop_assert_eq!(removed, model.remove(&k).is_some());
            }
        }
    }

    let all: Vec<RecordId> = tree.scan_all().unwrap().map(|r| r.unwrap()).collect();
    prop_assert_eq!(all, model.values().copied().collect::<Vec<_>>());

    for target in [-51, -10, 0, 7, 49, 50] {
        prop_assert_eq!(tree.get(&Key::Int(target)).unwrap(), model.get(&target).copied());

        let ge: Vec<RecordId> = tree
            .scan_greater_equal(&Key::Int(target))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        prop_assert_eq!(ge, model.range(target..).map(|(_, v)| *v).collect::<Vec<_>>());

        let lt: Vec<RecordId> = tree
            .scan_less_than(&Key::Int(target))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        prop_assert_eq!(lt, model.range(..target).map(|(_, v)| *v).collect::<Vec<_>>());
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn tree_matches_model(ops in prop::collection::vec(op_strategy(), 1..200), order in 1usize..4) {
        run_ops(&ops, order, 8)?;
    }

    #[test]
    fn bulk_load_matches_input(
        keys in prop::collection::btree_set(-1000i32..1000, 0..300),
        order in 1usize..5,
        fill in 0.1f32..=1.0,
    ) {
        let dir = tempdir().unwrap();
        let allocator = PageAllocator::create(
            dir.path().join("bulk.db"),
            Arc::new(PageCache::new(16)),
            AllocatorConfig::default().with_durable(false),
        )
        .unwrap();
        let mut tree = BPlusTree::create(allocator, KeyType::Int, order).unwrap();
        tree.bulk_load(keys.iter().map(|&k| (Key::Int(k), rid_for(k, 0))), fill).unwrap();

        let all: Vec<RecordId> = tree.scan_all().unwrap().map(|r| r.unwrap()).collect();
        prop_assert_eq!(all, keys.iter().map(|&k| rid_for(k, 0)).collect::<Vec<_>>());
        for &k in keys.iter().step_by(17) {
            prop_assert_eq!(tree.get(&Key::Int(k)).unwrap(), Some(rid_for(k, 0)));
        }

        // The bulk-built tree keeps accepting inserts.
        tree.put(Key::Int(5000), rid_for(5000, 1)).unwrap();
        prop_assert_eq!(tree.get(&Key::Int(5000)).unwrap(), Some(rid_for(5000, 1)));
    }
}
