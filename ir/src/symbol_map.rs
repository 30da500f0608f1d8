//! Dense scoped maps keyed by [`SymbolId`].

use crate::symbol::SymbolId;

/// A map from [`SymbolId`] to `T`, backed by a dense vector.
///
/// Passes use this as a stack-of-bindings: [`SymbolMap::replace`] installs a
/// value and returns the previous one, which the caller reinstates when the
/// scope ends. Ids are dense, so the vector grows to the largest id seen.
#[derive(Debug, Clone)]
pub struct SymbolMap<T> {
    values: Vec<Option<T>>,
}

impl<T> Default for SymbolMap<T> {
    fn default() -> Self {
        Self { values: Vec::new() }
    }
}

impl<T> SymbolMap<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sym: SymbolId) -> Option<&T> {
        self.values.get(sym).and_then(|v| v.as_ref())
    }

    pub fn get_mut(&mut self, sym: SymbolId) -> Option<&mut T> {
        self.values.get_mut(sym).and_then(|v| v.as_mut())
    }

    pub fn contains(&self, sym: SymbolId) -> bool {
        self.get(sym).is_some()
    }

    /// Install `value` for `sym`, returning the binding it displaced.
    ///
    /// Callers that are opening a scope stash the returned binding and pass
    /// it back to `replace` on scope exit.
    pub fn replace(&mut self, sym: SymbolId, value: Option<T>) -> Option<T> {
        if sym >= self.values.len() {
            self.values.resize_with(sym + 1, || None);
        }
        std::mem::replace(&mut self.values[sym], value)
    }

    pub fn set(&mut self, sym: SymbolId, value: T) {
        self.replace(sym, Some(value));
    }

    /// Upper bound (exclusive) on ids that may be present.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    /// Iterate over present `(sym, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (SymbolId, &T)> {
        self.values.iter().enumerate().filter_map(|(i, v)| v.as_ref().map(|v| (i, v)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (SymbolId, &mut T)> {
        self.values.iter_mut().enumerate().filter_map(|(i, v)| v.as_mut().map(|v| (i, v)))
    }

    /// Ids that currently have a binding.
    pub fn keys(&self) -> Vec<SymbolId> {
        self.iter().map(|(i, _)| i).collect()
    }
}
