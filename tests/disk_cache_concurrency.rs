//! Concurrency behavior of the shared disk cache.

use imagepipe::cache::meta::EntryMetadata;
use imagepipe::cache::DiskCache;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn meta_bytes() -> Vec<u8> {
  EntryMetadata::new(1, 2, vec![("Content-Type".into(), "image/png".into())]).to_bytes()
}

#[test]
fn parallel_writers_on_distinct_keys_all_commit() {
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::open(dir.path()).unwrap();
  let barrier = Arc::new(Barrier::new(8));

  let handles: Vec<_> = (0..8)
    .map(|i| {
      let cache = cache.clone();
      let barrier = Arc::clone(&barrier);
      thread::spawn(move || {
        barrier.wait();
        let key = format!("https://example.com/{i}.png");
        let mut editor = cache.edit(&key).expect("distinct keys never contend");
        editor.write_data(format!("payload-{i}").as_bytes()).unwrap();
        editor.write_metadata(&meta_bytes()).unwrap();
        editor.commit().unwrap();
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(cache.entry_count(), 8);
  for i in 0..8 {
    let key = format!("https://example.com/{i}.png");
    let snapshot = cache.snapshot(&key).unwrap().expect("committed entry");
    assert_eq!(snapshot.data(), format!("payload-{i}").as_bytes());
  }
}

#[test]
fn racing_editors_on_one_key_get_at_most_one_slot() {
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::open(dir.path()).unwrap();
  let barrier = Arc::new(Barrier::new(8));
  let granted = Arc::new(AtomicUsize::new(0));
  let hold = Arc::new(Barrier::new(8));

  let handles: Vec<_> = (0..8)
    .map(|_| {
      let cache = cache.clone();
      let barrier = Arc::clone(&barrier);
      let granted = Arc::clone(&granted);
      let hold = Arc::clone(&hold);
      thread::spawn(move || {
        barrier.wait();
        let editor = cache.edit("contended-key");
        if editor.is_some() {
          granted.fetch_add(1, Ordering::SeqCst);
        }
        // Keep winners alive until every thread has tried.
        hold.wait();
        drop(editor);
      })
    })
    .collect();
  for handle in handles {
    handle.join().unwrap();
  }

  assert_eq!(granted.load(Ordering::SeqCst), 1, "exactly one editor at a time");
  // All editors finished; the slot is free again.
  assert!(cache.edit("contended-key").is_some());
}

#[test]
fn readers_see_old_bytes_or_a_miss_during_a_rewrite() {
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::open(dir.path()).unwrap();

  let mut editor = cache.edit("key").unwrap();
  editor.write_data(b"v1").unwrap();
  editor.write_metadata(&meta_bytes()).unwrap();
  editor.commit().unwrap();

  let stop = Arc::new(AtomicUsize::new(0));
  let reader = {
    let cache = cache.clone();
    let stop = Arc::clone(&stop);
    thread::spawn(move || {
      let mut observed_v1 = 0usize;
      let mut observed_v2 = 0usize;
      while stop.load(Ordering::SeqCst) == 0 {
        match cache.snapshot("key").unwrap() {
          Some(snapshot) => match snapshot.data() {
            b"v1" => observed_v1 += 1,
            b"v2" => observed_v2 += 1,
            other => panic!("torn read: {other:?}"),
          },
          // A live editor reads as a miss; never a partial entry.
          None => {}
        }
      }
      (observed_v1, observed_v2)
    })
  };

  for _ in 0..50 {
    let mut editor = cache.edit("key").unwrap();
    editor.write_data(b"v2").unwrap();
    editor.write_metadata(&meta_bytes()).unwrap();
    editor.commit().unwrap();

    let mut back = cache.edit("key").unwrap();
    back.write_data(b"v1").unwrap();
    back.write_metadata(&meta_bytes()).unwrap();
    back.commit().unwrap();
  }
  stop.store(1, Ordering::SeqCst);
  let (v1, v2) = reader.join().unwrap();

  // The reader only ever saw complete values.
  assert!(v1 + v2 > 0, "reader made progress");
}

#[test]
fn snapshot_outlives_removal_of_its_entry() {
  let dir = tempfile::tempdir().unwrap();
  let cache = DiskCache::open(dir.path()).unwrap();

  let mut editor = cache.edit("key").unwrap();
  editor.write_data(b"kept-alive").unwrap();
  editor.write_metadata(&meta_bytes()).unwrap();
  let snapshot = editor.commit_and_open().unwrap();

  assert!(cache.remove("key").unwrap());
  assert!(cache.snapshot("key").unwrap().is_none());
  // The open snapshot still owns the bytes it was handed.
  assert_eq!(snapshot.data(), b"kept-alive");
}
