/*!
 * SmallMap Tests
 * Persistence across reopen
 */

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use vfs_kernel::SmallMap;

#[test]
fn test_pairs_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("names.map");

    {
        let mut map: SmallMap<u32, String> = SmallMap::open(&path).unwrap();
        for i in 0..100 {
            map.put(i, format!("value-{}", i));
        }
        map.close().unwrap();
    }

    let map: SmallMap<u32, String> = SmallMap::open(&path).unwrap();
    assert_eq!(map.len(), 100);
    for i in 0..100 {
        assert_eq!(map.get(&i), Some(&format!("value-{}", i)));
    }
}

#[test]
fn test_remove_persists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ids.map");

    let mut map: SmallMap<String, u64> = SmallMap::open(&path).unwrap();
    map.put("keep".to_string(), 1);
    map.put("drop".to_string(), 2);
    map.force().unwrap();

    assert_eq!(map.remove(&"drop".to_string()), Some(2));
    drop(map);

    let map: SmallMap<String, u64> = SmallMap::open(&path).unwrap();
    assert!(map.contains_key(&"keep".to_string()));
    assert!(!map.contains_key(&"drop".to_string()));
}

#[test]
fn test_overwrite_keeps_latest_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("over.map");

    let mut map: SmallMap<u8, u8> = SmallMap::open(&path).unwrap();
    map.put(1, 10);
    map.put(1, 11);
    map.close().unwrap();

    let map: SmallMap<u8, u8> = SmallMap::open(&path).unwrap();
    assert_eq!(map.get(&1), Some(&11));
    assert_eq!(map.len(), 1);
}
