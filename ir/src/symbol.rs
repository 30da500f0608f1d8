//! Symbol interning.
//!
//! Name lookups must never happen in inner loops, so every name referenced by
//! the IR is a dense [`SymbolId`]. A [`NodeContext`] uniquely maps strings to
//! ids; the string text is retained only for diagnostics.

use std::collections::HashMap;

use crate::expr::Expr;

/// Dense symbol identifier. Ids are indices into per-context tables.
pub type SymbolId = usize;

/// Signed machine integer wide enough to address any buffer.
pub type Index = i64;

/// Maps names to [`SymbolId`] values and back.
///
/// Mutated only while a pipeline graph is being constructed; evaluation and
/// the builder passes treat it as read-only (except for
/// [`NodeContext::insert_unique`], which mints fresh ids for pass-internal
/// variables).
#[derive(Debug, Default)]
pub struct NodeContext {
    name_to_id: HashMap<String, SymbolId>,
    id_to_name: Vec<String>,
}

impl NodeContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the name of a symbol, or a placeholder for unknown ids.
    pub fn name(&self, sym: SymbolId) -> String {
        match self.id_to_name.get(sym) {
            Some(name) => name.clone(),
            None => format!("<{sym}>"),
        }
    }

    /// Get or insert the id for `name`.
    pub fn insert(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.name_to_id.get(name) {
            return id;
        }
        let id = self.id_to_name.len();
        self.id_to_name.push(name.to_owned());
        self.name_to_id.insert(name.to_owned(), id);
        id
    }

    /// Insert a fresh id whose name starts with `prefix`.
    ///
    /// The generated name is suffixed until it does not collide with an
    /// existing one, so the returned id is always new.
    pub fn insert_unique(&mut self, prefix: &str) -> SymbolId {
        if !self.name_to_id.contains_key(prefix) {
            return self.insert(prefix);
        }
        let mut n = self.id_to_name.len();
        loop {
            let candidate = format!("{prefix}.{n}");
            if !self.name_to_id.contains_key(&candidate) {
                return self.insert(&candidate);
            }
            n += 1;
        }
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.name_to_id.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.id_to_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_name.is_empty()
    }
}

/// A named variable: a [`SymbolId`] that converts to an [`Expr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Var(SymbolId);

impl Var {
    pub fn new(ctx: &mut NodeContext, name: &str) -> Self {
        Var(ctx.insert(name))
    }

    pub fn from_sym(sym: SymbolId) -> Self {
        Var(sym)
    }

    pub fn sym(self) -> SymbolId {
        self.0
    }
}

impl From<Var> for Expr {
    fn from(v: Var) -> Expr {
        Expr::var(v.0)
    }
}
