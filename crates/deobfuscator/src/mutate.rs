//! Tree edits shared by the passes.

use std::collections::{HashMap, HashSet};

use swc_core::common::DUMMY_SP;
use swc_core::ecma::ast::*;
use swc_core::ecma::visit::{Visit, VisitMut, VisitMutWith, VisitWith};

use crate::utils::{retain_non_empty, StmtItem};

pub fn empty_stmt() -> Stmt {
  Stmt::Empty(EmptyStmt { span: DUMMY_SP })
}

/// Replaces every read of the given identifiers with a copy of their replacement expression.
///
/// Write positions (assignment targets and update arguments) are left alone. Replacements are
/// never visited themselves, so a replacement that mentions its own identifier cannot loop.
#[derive(Default)]
pub struct ReadReplacer {
  replacements: HashMap<Id, Expr>,
  pub replaced: usize,
}

impl ReadReplacer {
  pub fn new(replacements: HashMap<Id, Expr>) -> Self {
    ReadReplacer {
      replacements,
      replaced: 0,
    }
  }

  pub fn add_replacement(&mut self, id: Id, expr: Expr) {
    self.replacements.insert(id, expr);
  }

  pub fn is_empty(&self) -> bool {
    self.replacements.is_empty()
  }
}

impl VisitMut for ReadReplacer {
  fn visit_mut_expr(&mut self, expr: &mut Expr) {
    let Expr::Ident(ident) = expr else {
      expr.visit_mut_children_with(self);
      return;
    };
    let Some(replacement) = self.replacements.get(&ident.to_id()) else {
      return;
    };

    *expr = replacement.clone();
    self.replaced += 1;
  }

  fn visit_mut_prop(&mut self, prop: &mut Prop) {
    let Prop::Shorthand(ident) = prop else {
      prop.visit_mut_children_with(self);
      return;
    };
    let Some(replacement) = self.replacements.get(&ident.to_id()) else {
      return;
    };

    *prop = Prop::KeyValue(KeyValueProp {
      key: PropName::Ident(IdentName::new(ident.sym.clone(), ident.span)),
      value: Box::new(replacement.clone()),
    });
    self.replaced += 1;
  }

  fn visit_mut_update_expr(&mut self, update: &mut UpdateExpr) {
    if !update.arg.is_ident() {
      update.arg.visit_mut_with(self);
    }
  }

  fn visit_mut_assign_expr(&mut self, assign: &mut AssignExpr) {
    assign.right.visit_mut_with(self);
    match &mut assign.left {
      AssignTarget::Simple(SimpleAssignTarget::Ident(_)) => {}
      AssignTarget::Simple(target) => target.visit_mut_children_with(self),
      AssignTarget::Pat(pat) => pat.visit_mut_children_with(self),
    }
  }
}

/// Replace reads of `replacements` across `node`, returning how many were replaced.
pub fn replace_reads<N: VisitMutWith<ReadReplacer>>(
  node: &mut N,
  replacements: HashMap<Id, Expr>,
) -> usize {
  let mut replacer = ReadReplacer::new(replacements);
  node.visit_mut_with(&mut replacer);
  replacer.replaced
}

/// Removes the declarators and function declarations of the given identifiers.
///
/// Declarations left without declarators are dropped from their statement list.
struct DeclarationRemover<'a> {
  ids: &'a HashSet<Id>,
  removed: usize,
}

impl DeclarationRemover<'_> {
  fn is_target(&self, pat: &Pat) -> bool {
    pat
      .as_ident()
      .is_some_and(|binding| self.ids.contains(&binding.id.to_id()))
  }
}

impl VisitMut for DeclarationRemover<'_> {
  fn visit_mut_var_decl(&mut self, var: &mut VarDecl) {
    let before = var.decls.len();
    var.decls.retain(|decl| !self.is_target(&decl.name));
    self.removed += before - var.decls.len();
    var.visit_mut_children_with(self);
  }

  fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
    stmt.visit_mut_children_with(self);

    match stmt {
      Stmt::Decl(Decl::Var(var)) if var.decls.is_empty() => {
        *stmt = empty_stmt();
      }
      Stmt::Decl(Decl::Fn(function)) if self.ids.contains(&function.ident.to_id()) => {
        *stmt = empty_stmt();
        self.removed += 1;
      }
      _ => {}
    }
  }

  fn visit_mut_for_stmt(&mut self, stmt: &mut ForStmt) {
    stmt.visit_mut_children_with(self);

    if let Some(VarDeclOrExpr::VarDecl(var)) = &stmt.init {
      if var.decls.is_empty() {
        stmt.init = None;
      }
    }
  }

  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    stmts.visit_mut_children_with(self);
    retain_non_empty(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    items.visit_mut_children_with(self);
    retain_non_empty(items);
  }
}

/// Remove the declarators and function declarations binding `ids`. Returns how many went.
pub fn remove_declarations(module: &mut Module, ids: &HashSet<Id>) -> usize {
  if ids.is_empty() {
    return 0;
  }
  let mut remover = DeclarationRemover { ids, removed: 0 };
  module.visit_mut_with(&mut remover);
  remover.removed
}

/// Removes `id = <expr>;` statements.
struct AssignmentRemover<'a> {
  ids: &'a HashSet<Id>,
  removed: usize,
}

impl VisitMut for AssignmentRemover<'_> {
  fn visit_mut_stmt(&mut self, stmt: &mut Stmt) {
    stmt.visit_mut_children_with(self);

    let Stmt::Expr(ExprStmt { expr, .. }) = stmt else {
      return;
    };
    let Expr::Assign(AssignExpr {
      op: AssignOp::Assign,
      left: AssignTarget::Simple(SimpleAssignTarget::Ident(target)),
      ..
    }) = &**expr
    else {
      return;
    };

    if self.ids.contains(&target.id.to_id()) {
      *stmt = empty_stmt();
      self.removed += 1;
    }
  }

  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    stmts.visit_mut_children_with(self);
    retain_non_empty(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    items.visit_mut_children_with(self);
    retain_non_empty(items);
  }
}

/// Remove every `id = <expr>;` statement assigning one of `ids`.
pub fn remove_assignments(module: &mut Module, ids: &HashSet<Id>) -> usize {
  if ids.is_empty() {
    return 0;
  }
  let mut remover = AssignmentRemover { ids, removed: 0 };
  module.visit_mut_with(&mut remover);
  remover.removed
}

/// Removes expression statements and variable declarations that mention one of `ids`.
///
/// Nested statement lists are cleaned first, so a block is kept while only its inner
/// statements reference the ids.
struct ReferencingStatementRemover<'a> {
  ids: &'a HashSet<Id>,
  removed: usize,
}

impl ReferencingStatementRemover<'_> {
  fn retain<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    for item in items.iter_mut() {
      item.visit_mut_with(self);
    }

    let before = items.len();
    items.retain(|item| match item.as_stmt() {
      Some(stmt @ (Stmt::Expr(_) | Stmt::Decl(Decl::Var(_)))) => !references_any(stmt, self.ids),
      _ => true,
    });
    self.removed += before - items.len();
  }
}

impl VisitMut for ReferencingStatementRemover<'_> {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.retain(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.retain(items);
  }
}

pub fn remove_statements_referencing(module: &mut Module, ids: &HashSet<Id>) -> usize {
  if ids.is_empty() {
    return 0;
  }
  let mut remover = ReferencingStatementRemover { ids, removed: 0 };
  module.visit_mut_with(&mut remover);
  remover.removed
}

/// Removes the statements `predicate` selects. Statements that stay are searched for nested
/// statement lists, statements that go are not.
struct StatementRemover<F> {
  predicate: F,
  removed: usize,
}

impl<F: FnMut(&Stmt) -> bool> StatementRemover<F> {
  fn retain<T: StmtItem + VisitMutWith<Self>>(&mut self, items: &mut Vec<T>) {
    let before = items.len();
    items.retain_mut(|item| {
      if item.as_stmt().is_some_and(|stmt| (self.predicate)(stmt)) {
        return false;
      }
      item.visit_mut_with(self);
      true
    });
    self.removed += before - items.len();
  }
}

impl<F: FnMut(&Stmt) -> bool> VisitMut for StatementRemover<F> {
  fn visit_mut_stmts(&mut self, stmts: &mut Vec<Stmt>) {
    self.retain(stmts);
  }

  fn visit_mut_module_items(&mut self, items: &mut Vec<ModuleItem>) {
    self.retain(items);
  }
}

/// Remove every statement of a statement list for which `predicate` returns true, outermost
/// first. Returns how many went.
pub fn remove_statements(module: &mut Module, predicate: impl FnMut(&Stmt) -> bool) -> usize {
  let mut remover = StatementRemover {
    predicate,
    removed: 0,
  };
  module.visit_mut_with(&mut remover);
  remover.removed
}

pub struct ReferenceCounter<'a> {
  ids: &'a HashSet<Id>,
  count: usize,
}

impl Visit for ReferenceCounter<'_> {
  fn visit_ident(&mut self, ident: &Ident) {
    if self.ids.contains(&ident.to_id()) {
      self.count += 1;
    }
  }
}

/// Count identifier occurrences of `ids` in `node`, declarations included.
pub fn count_references<N: for<'a> VisitWith<ReferenceCounter<'a>>>(
  node: &N,
  ids: &HashSet<Id>,
) -> usize {
  let mut counter = ReferenceCounter { ids, count: 0 };
  node.visit_with(&mut counter);
  counter.count
}

pub fn references_any<N: for<'a> VisitWith<ReferenceCounter<'a>>>(
  node: &N,
  ids: &HashSet<Id>,
) -> bool {
  !ids.is_empty() && count_references(node, ids) > 0
}
