//! Typed, open-ended side-channel data attached to requests and options.
//!
//! Extras are a heterogeneous bag keyed by statically declared
//! [`ExtraKey`]s. The key carries the value type, so reads are
//! compile-time checked rather than stringly typed: a key declared as
//! `ExtraKey<bool>` can only ever produce a `bool`.
//!
//! # Example
//!
//! ```
//! use imagepipe::extras::{ExtraKey, Extras};
//!
//! static RETRY_COUNT: ExtraKey<u32> = ExtraKey::new("retry_count");
//!
//! let extras = Extras::new().with(&RETRY_COUNT, 3);
//! assert_eq!(extras.get(&RETRY_COUNT), Some(3));
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// A statically declared, typed key into an [`Extras`] bag.
pub struct ExtraKey<T> {
  name: &'static str,
  _marker: PhantomData<fn() -> T>,
}

impl<T> ExtraKey<T> {
  pub const fn new(name: &'static str) -> Self {
    Self {
      name,
      _marker: PhantomData,
    }
  }

  pub fn name(&self) -> &'static str {
    self.name
  }
}

impl<T> fmt::Debug for ExtraKey<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("ExtraKey").field(&self.name).finish()
  }
}

/// Immutable bag of typed extras.
///
/// Updates are copy-on-write: [`Extras::with`] returns a new bag, so an
/// `Extras` embedded in resolved options can never change underneath a
/// running request. Clones share the underlying storage.
#[derive(Clone, Default)]
pub struct Extras {
  values: Arc<HashMap<&'static str, Arc<dyn Any + Send + Sync>>>,
}

impl Extras {
  pub fn new() -> Self {
    Self::default()
  }

  /// Returns a copy of the bag with `value` stored under `key`.
  pub fn with<T: Send + Sync + 'static>(&self, key: &ExtraKey<T>, value: T) -> Self {
    let mut values: HashMap<_, _> = (*self.values).clone();
    values.insert(key.name, Arc::new(value) as Arc<dyn Any + Send + Sync>);
    Self {
      values: Arc::new(values),
    }
  }

  /// Returns a copy of the bag without `key`.
  pub fn without<T>(&self, key: &ExtraKey<T>) -> Self {
    if !self.values.contains_key(key.name) {
      return self.clone();
    }
    let mut values: HashMap<_, _> = (*self.values).clone();
    values.remove(key.name);
    Self {
      values: Arc::new(values),
    }
  }

  /// Reads the value stored under `key`, if present with the key's type.
  pub fn get<T: Clone + Send + Sync + 'static>(&self, key: &ExtraKey<T>) -> Option<T> {
    self
      .values
      .get(key.name)
      .and_then(|value| value.downcast_ref::<T>())
      .cloned()
  }

  pub fn contains<T>(&self, key: &ExtraKey<T>) -> bool {
    self.values.contains_key(key.name)
  }

  pub fn len(&self) -> usize {
    self.values.len()
  }

  pub fn is_empty(&self) -> bool {
    self.values.is_empty()
  }
}

impl fmt::Debug for Extras {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut names: Vec<_> = self.values.keys().collect();
    names.sort();
    f.debug_struct("Extras").field("keys", &names).finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  static FLAG: ExtraKey<bool> = ExtraKey::new("flag");
  static COUNT: ExtraKey<u32> = ExtraKey::new("count");

  #[test]
  fn with_and_get_round_trip() {
    let extras = Extras::new().with(&FLAG, true).with(&COUNT, 7);
    assert_eq!(extras.get(&FLAG), Some(true));
    assert_eq!(extras.get(&COUNT), Some(7));
    assert_eq!(extras.len(), 2);
  }

  #[test]
  fn missing_key_reads_none() {
    let extras = Extras::new();
    assert_eq!(extras.get(&FLAG), None);
    assert!(extras.is_empty());
  }

  #[test]
  fn with_does_not_mutate_original() {
    let base = Extras::new().with(&COUNT, 1);
    let updated = base.with(&COUNT, 2);
    assert_eq!(base.get(&COUNT), Some(1));
    assert_eq!(updated.get(&COUNT), Some(2));
  }

  #[test]
  fn without_removes_only_named_key() {
    let extras = Extras::new().with(&FLAG, false).with(&COUNT, 9);
    let trimmed = extras.without(&FLAG);
    assert_eq!(trimmed.get(&FLAG), None);
    assert_eq!(trimmed.get(&COUNT), Some(9));
  }

  #[test]
  fn type_mismatch_under_same_name_reads_none() {
    static OTHER: ExtraKey<String> = ExtraKey::new("count");
    let extras = Extras::new().with(&COUNT, 3);
    assert_eq!(extras.get(&OTHER), None);
  }
}
