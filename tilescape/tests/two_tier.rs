//! Two-tier cache integration: eviction spill, background persistence,
//! oldest-first disk eviction, and teardown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use filetime::FileTime;
use tilescape::cache::{DiskCache, DiskCacheConfig, MemoryCache};
use tilescape::coord::TileCoord;
use tilescape::tile::{Bitmap, RenderParams, SourceId, TileKey};
use tokio::sync::mpsc;

fn key(x: u32, y: u32) -> TileKey {
    TileKey::new(
        TileCoord::new(x, y, 14),
        SourceId::new(1),
        RenderParams::default(),
    )
}

/// A bitmap with per-pixel structure, so pixel identity actually means
/// something.
fn patterned_bitmap(tag: u8) -> Arc<Bitmap> {
    let mut pixels = Vec::with_capacity(8 * 8 * 4);
    for y in 0..8u8 {
        for x in 0..8u8 {
            pixels.extend_from_slice(&[tag, x.wrapping_mul(31), y.wrapping_mul(17), 255]);
        }
    }
    Arc::new(Bitmap::from_rgba(8, 8, pixels).unwrap())
}

async fn wait_for(mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if predicate() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn evicted_entry_becomes_disk_readable() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskCache::open(DiskCacheConfig::new(dir.path())).unwrap());

    let memory = MemoryCache::with_policy(2, false, 0.15, true);
    memory.attach_disk(Arc::clone(&disk));

    memory.put(key(1, 1), patterned_bitmap(1));
    memory.put(key(2, 2), patterned_bitmap(2));
    memory.put(key(3, 3), patterned_bitmap(3));

    // The oldest entry was evicted from memory and handed to the writer.
    assert!(memory.get(&key(1, 1)).is_none());
    assert!(
        wait_for(|| disk.contains_key(&key(1, 1))).await,
        "spilled tile should reach disk once the writer drains"
    );
    assert_eq!(memory.stats().spills, 1);

    disk.destroy().await.unwrap();
}

#[tokio::test]
async fn round_trip_preserves_pixels() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskCache::open(DiskCacheConfig::new(dir.path())).unwrap());

    let (tx, mut rx) = mpsc::unbounded_channel();
    disk.set_on_read_complete(move |key, bitmap| {
        let _ = tx.send((key, bitmap));
    });

    let memory = MemoryCache::with_policy(1, false, 0.15, true);
    memory.attach_disk(Arc::clone(&disk));

    let original = patterned_bitmap(9);
    memory.put(key(5, 5), Arc::clone(&original));
    memory.put(key(6, 6), patterned_bitmap(6)); // evicts and spills key(5, 5)

    assert!(wait_for(|| disk.contains_key(&key(5, 5))).await);

    // Memory miss, disk hit: placeholder now, decoded content through the
    // completion callback.
    assert!(memory.get(&key(5, 5)).is_none());
    let placeholder = disk.get(&key(5, 5)).expect("persisted tile readable");
    assert_ne!(placeholder.as_ref(), original.as_ref());

    let (read_key, decoded) = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("background read should complete")
        .expect("callback channel open");

    assert_eq!(read_key, key(5, 5));
    assert_eq!(
        decoded.pixels(),
        original.pixels(),
        "persisted tile must decode pixel-identical"
    );

    disk.destroy().await.unwrap();
}

#[tokio::test]
async fn disk_eviction_deletes_oldest_modification_time_first() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(
        DiskCache::open(DiskCacheConfig::new(dir.path()).with_capacity(2)).unwrap(),
    );

    disk.put(&key(1, 0), patterned_bitmap(1));
    assert!(wait_for(|| disk.contains_key(&key(1, 0))).await);
    disk.put(&key(2, 0), patterned_bitmap(2));
    assert!(wait_for(|| disk.contains_key(&key(2, 0))).await);

    // Age the first file well past the second.
    filetime::set_file_mtime(disk.tile_path(&key(1, 0)), FileTime::from_unix_time(1_000, 0))
        .unwrap();
    filetime::set_file_mtime(disk.tile_path(&key(2, 0)), FileTime::from_unix_time(2_000, 0))
        .unwrap();

    disk.put(&key(3, 0), patterned_bitmap(3));
    assert!(wait_for(|| disk.contains_key(&key(3, 0))).await);

    assert!(
        !disk.contains_key(&key(1, 0)),
        "the oldest-modified file must be the eviction victim"
    );
    assert!(disk.contains_key(&key(2, 0)));
    assert_eq!(disk.load(), 2);

    disk.destroy().await.unwrap();
}

#[tokio::test]
async fn load_reflects_external_deletion() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskCache::open(DiskCacheConfig::new(dir.path())).unwrap());

    disk.put(&key(1, 2), patterned_bitmap(1));
    assert!(wait_for(|| disk.load() == 1).await);

    std::fs::remove_file(disk.tile_path(&key(1, 2))).unwrap();
    assert_eq!(disk.load(), 0);
    assert!(!disk.contains_key(&key(1, 2)));

    disk.destroy().await.unwrap();
}

#[tokio::test]
async fn destroy_sweeps_backing_directory() {
    let dir = tempfile::tempdir().unwrap();
    let disk = Arc::new(DiskCache::open(DiskCacheConfig::new(dir.path())).unwrap());

    let memory = MemoryCache::with_policy(1, false, 0.15, true);
    memory.attach_disk(Arc::clone(&disk));

    for x in 0..4 {
        memory.put(key(x, 9), patterned_bitmap(x as u8));
    }
    assert!(wait_for(|| disk.load() == 3).await);

    disk.destroy().await.unwrap();
    assert!(disk.is_destroyed());

    let leftover = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tile"))
        .count();
    assert_eq!(leftover, 0);
}
