//! Scope and reference information for every name in a module.
//!
//! Bindings are keyed by the resolver's [`Id`], so two variables with the same name in
//! different scopes never share an entry.

mod collector;
mod constant;

pub use collector::collect_bindings;
pub use constant::*;

use std::collections::HashSet;

use indexmap::IndexMap;
use swc_core::ecma::ast::{Id, Module};

/// Index of a function in pre-order. `0` is the module itself.
pub type FnIdx = usize;

pub const PROGRAM: FnIdx = 0;

/// Where a declaration, read or write happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Site {
  /// Position in a pre-order walk, used to compare source order
  pub order: usize,
  /// Innermost enclosing function
  pub function: FnIdx,
  /// Whether the enclosing statement is a direct child of the function body
  pub direct: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingKind {
  Var { has_init: bool },
  Let,
  Const,
  Function,
  FunctionExpressionName,
  Class,
  Param,
  CatchParam,
  Import,
  /// Referenced but never declared in this module
  Global,
}

#[derive(Clone, Debug)]
pub struct Binding {
  pub id: Id,
  pub kind: BindingKind,
  pub declarations: usize,
  pub declared_at: Option<Site>,
  /// The function a parameter belongs to, or the function a function declaration creates.
  pub owner: Option<FnIdx>,
  pub reads: Vec<Site>,
  pub writes: Vec<Site>,
  pub exported: bool,
}

impl Binding {
  pub(crate) fn new(id: Id) -> Self {
    Binding {
      id,
      kind: BindingKind::Global,
      declarations: 0,
      declared_at: None,
      owner: None,
      reads: vec![],
      writes: vec![],
      exported: false,
    }
  }

  /// Declared exactly once and never written afterwards.
  pub fn is_constant(&self) -> bool {
    self.kind != BindingKind::Global && self.declarations == 1 && self.writes.is_empty()
  }

  pub fn is_referenced(&self) -> bool {
    !self.reads.is_empty()
  }

  pub fn is_declared(&self) -> bool {
    self.kind != BindingKind::Global
  }
}

#[derive(Debug, Default)]
pub struct Bindings {
  pub(crate) map: IndexMap<Id, Binding>,
  /// Parent of every function, indexed by [`FnIdx`]
  pub(crate) function_parents: Vec<Option<FnIdx>>,
  /// Walk order at which every function begins
  pub(crate) function_starts: Vec<usize>,
}

impl Bindings {
  pub fn get(&self, id: &Id) -> Option<&Binding> {
    self.map.get(id)
  }

  pub fn iter(&self) -> impl Iterator<Item = &Binding> {
    self.map.values()
  }

  pub fn is_constant(&self, id: &Id) -> bool {
    self.get(id).is_some_and(Binding::is_constant)
  }

  /// Whether some binding with this name is declared anywhere in the module.
  pub fn declares_name(&self, name: &str) -> bool {
    self
      .map
      .values()
      .any(|binding| binding.is_declared() && &*binding.id.0 == name)
  }

  /// Whether `function` is `ancestor` or nested inside it.
  pub fn is_within(&self, function: FnIdx, ancestor: FnIdx) -> bool {
    let mut current = Some(function);
    while let Some(index) = current {
      if index == ancestor {
        return true;
      }
      current = self.function_parents.get(index).copied().flatten();
    }
    false
  }

  /// The function directly inside `ancestor` that contains `function`.
  fn child_within(&self, function: FnIdx, ancestor: FnIdx) -> Option<FnIdx> {
    let mut current = function;
    loop {
      let parent = self.function_parents.get(current).copied().flatten()?;
      if parent == ancestor {
        return Some(current);
      }
      current = parent;
    }
  }

  /// Whether code inside `function`, nested in `home`, only runs after `home` has passed `order`.
  ///
  /// A function expression must be created after `order`. A hoisted function declaration can
  /// run whenever it is referenced, so each of its references must run after `order` too.
  pub fn runs_after(&self, function: FnIdx, home: FnIdx, order: usize) -> bool {
    self.runs_after_inner(function, home, order, &mut HashSet::new())
  }

  fn runs_after_inner(
    &self,
    function: FnIdx,
    home: FnIdx,
    order: usize,
    visited: &mut HashSet<FnIdx>,
  ) -> bool {
    if function == home {
      return true;
    }
    let Some(child) = self.child_within(function, home) else {
      return false;
    };
    if !visited.insert(child) {
      return true;
    }

    let declaration = self
      .map
      .values()
      .find(|binding| binding.kind == BindingKind::Function && binding.owner == Some(child));
    match declaration {
      Some(declaration) => declaration.reads.iter().all(|read| {
        if self.is_within(read.function, child) {
          true
        } else if read.function == home {
          read.order > order
        } else {
          self.runs_after_inner(read.function, home, order, visited)
        }
      }),
      None => self
        .function_starts
        .get(child)
        .is_some_and(|start| *start > order),
    }
  }
}

/// Lazily computed bindings for the module currently being transformed.
///
/// The cache is never refreshed implicitly. Whoever changes declarations or scoping calls
/// [`ScopeCache::invalidate`].
#[derive(Debug, Default)]
pub struct ScopeCache {
  bindings: Option<Bindings>,
}

impl ScopeCache {
  pub fn bindings(&mut self, module: &Module) -> &Bindings {
    self
      .bindings
      .get_or_insert_with(|| collect_bindings(module))
  }

  pub fn invalidate(&mut self) {
    self.bindings = None;
  }

  pub fn is_valid(&self) -> bool {
    self.bindings.is_some()
  }
}
