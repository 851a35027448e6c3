//! Cancellation scopes and lifecycle binding.
//!
//! A request is bound to a [`CancellationToken`] that blocking stages
//! check at every boundary (disk read, network await, disk write).
//! The token can be cancelled directly, through a [`Disposable`], or by
//! an external [`Lifecycle`] signal the loader subscribes to for the
//! duration of the request. The core only relies on the
//! subscribe/unsubscribe + cancel-callback contract, not on any UI
//! framework's object model.

use crate::error::{Error, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

/// Cooperative cancellation flag shared across a request's stages.
#[derive(Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.cancelled.store(true, Ordering::SeqCst);
  }

  pub fn is_cancelled(&self) -> bool {
    self.cancelled.load(Ordering::SeqCst)
  }

  /// Returns `Err(Error::Cancelled)` once the token is cancelled.
  ///
  /// Called at every suspension point so resources acquired earlier are
  /// released by their owners on the unwind path.
  pub fn check(&self) -> Result<()> {
    if self.is_cancelled() {
      Err(Error::Cancelled)
    } else {
      Ok(())
    }
  }
}

/// Observer of an external lifecycle signal.
pub trait LifecycleObserver: Send + Sync {
  /// The observed lifecycle has ended; in-flight work should stop.
  fn on_destroyed(&self);
}

/// An external observable lifecycle a request can be bound to.
///
/// Implementations must tolerate unsubscribe calls for observers that
/// were never subscribed (the loader unsubscribes unconditionally on
/// every exit path).
pub trait Lifecycle: Send + Sync {
  fn subscribe(&self, observer: Arc<dyn LifecycleObserver>);
  fn unsubscribe(&self, observer: &Arc<dyn LifecycleObserver>);
}

/// Cancels a token when the observed lifecycle is destroyed.
pub struct CancelOnDestroy {
  token: CancellationToken,
}

impl CancelOnDestroy {
  pub fn new(token: CancellationToken) -> Self {
    Self { token }
  }
}

impl LifecycleObserver for CancelOnDestroy {
  fn on_destroyed(&self) {
    self.token.cancel();
  }
}

/// A lifecycle driven manually by the embedder.
///
/// Suits tests and hosts without a UI framework: call
/// [`ManualLifecycle::destroy`] when the owning scope goes away.
#[derive(Default)]
pub struct ManualLifecycle {
  observers: Mutex<Vec<Arc<dyn LifecycleObserver>>>,
  destroyed: AtomicBool,
}

impl ManualLifecycle {
  pub fn new() -> Self {
    Self::default()
  }

  /// Destroys the lifecycle, notifying current and future subscribers.
  pub fn destroy(&self) {
    self.destroyed.store(true, Ordering::SeqCst);
    let observers = match self.observers.lock() {
      Ok(mut guard) => std::mem::take(&mut *guard),
      Err(_) => return,
    };
    for observer in observers {
      observer.on_destroyed();
    }
  }

  pub fn is_destroyed(&self) -> bool {
    self.destroyed.load(Ordering::SeqCst)
  }
}

impl Lifecycle for ManualLifecycle {
  fn subscribe(&self, observer: Arc<dyn LifecycleObserver>) {
    if self.is_destroyed() {
      // Late subscribers observe the terminal state immediately.
      observer.on_destroyed();
      return;
    }
    if let Ok(mut guard) = self.observers.lock() {
      guard.push(observer);
    }
  }

  fn unsubscribe(&self, observer: &Arc<dyn LifecycleObserver>) {
    if let Ok(mut guard) = self.observers.lock() {
      guard.retain(|existing| !Arc::ptr_eq(existing, observer));
    }
  }
}

/// Handle to an enqueued request running on a worker thread.
pub struct Disposable {
  token: CancellationToken,
  handle: Mutex<Option<JoinHandle<()>>>,
}

impl Disposable {
  pub(crate) fn new(token: CancellationToken, handle: JoinHandle<()>) -> Self {
    Self {
      token,
      handle: Mutex::new(Some(handle)),
    }
  }

  /// Cancels the underlying request. Safe to call more than once.
  pub fn dispose(&self) {
    self.token.cancel();
  }

  pub fn is_disposed(&self) -> bool {
    self.token.is_cancelled()
  }

  /// Blocks until the worker finishes delivering a terminal result.
  pub fn join(&self) {
    let handle = self.handle.lock().ok().and_then(|mut guard| guard.take());
    if let Some(handle) = handle {
      let _ = handle.join();
    }
  }
}
