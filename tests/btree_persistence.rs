//! Integration tests for reopening trees from their backing files.

use pagetree::{
    AllocatorConfig, BPlusTree, Error, Key, KeyType, PageAllocator, PageCache, PageId, RecordId,
};
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn open_allocator(path: &Path, cache: &Arc<PageCache>, durable: bool) -> PageAllocator {
    let config = AllocatorConfig::default().with_durable(durable);
    PageAllocator::open_or_create(path, Arc::clone(cache), config).unwrap()
}

fn rid(i: i32) -> RecordId {
    RecordId::new(i as u32, (i % 7) as u16)
}

/// A durable tree survives close and reopen with identical contents.
#[test]
fn test_reopen_durable_tree() {
    init_tracing();
    let dir = tempdir().unwrap();
    let path = dir.path().join("idx.db");
    let cache = Arc::new(PageCache::new(16));

    let (root, sexp) = {
        let mut tree = BPlusTree::create(open_allocator(&path, &cache, true), KeyType::Int, 2).unwrap();
        for i in (0..120).rev() {
            tree.put(Key::Int(i), rid(i)).unwrap();
        }
        let state = (tree.root_page(), tree.to_sexp().unwrap());
        tree.close().unwrap();
        state
    };

    let tree = BPlusTree::open(open_allocator(&path, &cache, true)).unwrap();
    assert_eq!(tree.key_type(), KeyType::Int);
    assert_eq!(tree.order(), 2);
    assert_eq!(tree.root_page(), root);
    assert_eq!(tree.to_sexp().unwrap(), sexp);

    let scanned: Vec<RecordId> = tree.scan_all().unwrap().map(|r| r.unwrap()).collect();
    let expected: Vec<RecordId> = (0..120).map(rid).collect();
    assert_eq!(scanned, expected);
}

/// A non-durable tree still reaches disk through eviction and close.
#[test]
fn test_reopen_scratch_tree_after_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("scratch.db");
    let cache = Arc::new(PageCache::new(4));

    {
        let mut tree = BPlusTree::create(open_allocator(&path, &cache, false), KeyType::Int, 2).unwrap();
        tree.bulk_load((0..300).map(|i| (Key::Int(i), rid(i))), 0.5).unwrap();
        tree.close().unwrap();
    }

    let tree = BPlusTree::open(open_allocator(&path, &cache, false)).unwrap();
    for i in [0, 1, 150, 299] {
        assert_eq!(tree.get(&Key::Int(i)).unwrap(), Some(rid(i)));
    }
    assert_eq!(tree.scan_greater_equal(&Key::Int(290)).unwrap().count(), 10);
}

/// String keys round trip through the file.
#[test]
fn test_reopen_string_keys() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("names.db");
    let cache = Arc::new(PageCache::new(16));
    let names = ["ada", "grace", "barbara", "edsger", "alan", "donald"];

    {
        let mut tree =
            BPlusTree::create(open_allocator(&path, &cache, true), KeyType::String(8), 2).unwrap();
        for (i, name) in names.iter().enumerate() {
            tree.put(Key::string(name, 8).unwrap(), RecordId::new(i as u32, 0)).unwrap();
        }
        tree.close().unwrap();
    }

    let tree = BPlusTree::open(open_allocator(&path, &cache, true)).unwrap();
    assert_eq!(tree.key_type(), KeyType::String(8));
    assert_eq!(
        tree.get(&Key::string("edsger", 8).unwrap()).unwrap(),
        Some(RecordId::new(3, 0))
    );

    let below: Vec<RecordId> = tree
        .scan_less_than(&Key::string("b", 8).unwrap())
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    assert_eq!(below, vec![RecordId::new(0, 0), RecordId::new(4, 0)]);

    assert!(matches!(
        tree.get(&Key::string("ada", 4).unwrap()),
        Err(Error::KeyTypeMismatch { .. })
    ));
}

/// A clobbered metadata page is refused on open.
#[test]
fn test_open_rejects_corrupt_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.db");
    let cache = Arc::new(PageCache::new(8));

    {
        let tree = BPlusTree::create(open_allocator(&path, &cache, true), KeyType::Float, 3).unwrap();
        let page = tree.allocator().fetch(PageId::new(0)).unwrap();
        page.write(6, &[0xFF, 0xFF]).unwrap();
        tree.close().unwrap();
    }

    let err = BPlusTree::open(open_allocator(&path, &cache, true)).unwrap_err();
    assert!(matches!(err, Error::CorruptMetadata(_)));
}

/// Opening an allocator that never held a tree fails cleanly.
#[test]
fn test_open_empty_allocator() {
    let dir = tempdir().unwrap();
    let cache = Arc::new(PageCache::new(8));
    let allocator = open_allocator(&dir.path().join("empty.db"), &cache, true);
    assert!(matches!(
        BPlusTree::open(allocator),
        Err(Error::CorruptMetadata(_))
    ));
}
