//! Designated main-thread registry.
//!
//! Embedders that own a UI thread designate it once at startup; the
//! pipeline then refuses blocking network I/O from that thread and
//! routes hardware-allocation decisions through the main-thread policy.
//! When no thread is designated every caller counts as a worker.

use std::sync::Mutex;
use std::thread::{self, ThreadId};

static MAIN_THREAD: Mutex<Option<ThreadId>> = Mutex::new(None);

/// Marks the calling thread as the main (UI-capable) thread.
pub fn designate_current_thread() {
  if let Ok(mut slot) = MAIN_THREAD.lock() {
    *slot = Some(thread::current().id());
  }
}

/// Whether the calling thread is the designated main thread.
pub fn is_main_thread() -> bool {
  MAIN_THREAD
    .lock()
    .map(|slot| *slot == Some(thread::current().id()))
    .unwrap_or(false)
}

#[cfg(test)]
pub(crate) fn clear_designation() {
  if let Ok(mut slot) = MAIN_THREAD.lock() {
    *slot = None;
  }
}

/// Serializes tests that mutate the process-wide designation.
#[cfg(test)]
pub(crate) static TEST_DESIGNATION_LOCK: Mutex<()> = Mutex::new(());

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn undesignated_process_has_no_main_thread() {
    let _guard = TEST_DESIGNATION_LOCK.lock().unwrap();
    clear_designation();
    assert!(!is_main_thread());
  }

  #[test]
  fn designation_tracks_the_calling_thread() {
    let _guard = TEST_DESIGNATION_LOCK.lock().unwrap();
    designate_current_thread();
    assert!(is_main_thread());

    let seen_from_worker = thread::spawn(is_main_thread).join().unwrap();
    assert!(!seen_from_worker);
    clear_designation();
  }
}
