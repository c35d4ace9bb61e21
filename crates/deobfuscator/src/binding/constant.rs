use std::collections::HashSet;

use swc_core::atoms::Atom;
use swc_core::ecma::ast::{
  AssignExpr, AssignOp, AssignTarget, Expr, ExprStmt, FnDecl, Function, Id, Module,
  SimpleAssignTarget, VarDeclarator,
};
use swc_core::ecma::visit::{Visit, VisitWith};

use super::{Binding, BindingKind, Bindings, FnIdx};
use crate::mutate::{remove_assignments, remove_declarations};

/// How a constant variable got its value, which decides how it is removed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
  /// `var x = <value>;`
  Declaration,
  /// `var x; x = <value>;` or a parameter assigned once in its own function
  Assignment,
  FunctionDeclaration,
}

/// A name bound to a single value for its entire lifetime.
#[derive(Clone, Debug)]
pub struct ConstantVariable<T> {
  pub id: Id,
  pub name: Atom,
  pub expression: T,
  pub origin: Origin,
}

/// Whether every read of `binding` runs after `home` has passed `order`, including reads in
/// closures that might be called earlier.
fn reads_follow(binding: &Binding, bindings: &Bindings, home: FnIdx, order: usize) -> bool {
  binding.reads.iter().all(|read| {
    if read.function == home {
      read.order > order
    } else {
      bindings.runs_after(read.function, home, order)
    }
  })
}

impl<T> ConstantVariable<T> {
  /// Resolve `name = init` of a declarator.
  ///
  /// `guard` inspects the initializer and returns the value this caller is interested in.
  pub fn resolve_declarator(
    declarator: &VarDeclarator,
    bindings: &Bindings,
    guard: impl FnOnce(&Expr) -> Option<T>,
  ) -> Option<Self> {
    let ident = &declarator.name.as_ident()?.id;
    let init = declarator.init.as_deref()?;
    let binding = bindings.get(&ident.to_id())?;

    if binding.exported || !binding.is_constant() {
      return None;
    }
    if !matches!(
      binding.kind,
      BindingKind::Var { has_init: true } | BindingKind::Let | BindingKind::Const
    ) {
      return None;
    }

    // Reads before a hoisted declaration observe `undefined`
    let declared_at = binding.declared_at?;
    if !reads_follow(binding, bindings, declared_at.function, declared_at.order) {
      return None;
    }

    Some(ConstantVariable {
      id: ident.to_id(),
      name: ident.sym.clone(),
      expression: guard(init)?,
      origin: Origin::Declaration,
    })
  }

  /// Resolve `name = value` where `name` is declared without an initializer, or is a parameter.
  ///
  /// `is_direct_statement` is whether the assignment is a whole expression statement.
  pub fn resolve_assignment(
    assign: &AssignExpr,
    is_direct_statement: bool,
    bindings: &Bindings,
    guard: impl FnOnce(&Expr) -> Option<T>,
  ) -> Option<Self> {
    if !is_direct_statement || assign.op != AssignOp::Assign {
      return None;
    }
    let AssignTarget::Simple(SimpleAssignTarget::Ident(target)) = &assign.left else {
      return None;
    };
    let binding = bindings.get(&target.id.to_id())?;

    if binding.exported || binding.declarations != 1 {
      return None;
    }
    let [write] = binding.writes.as_slice() else {
      return None;
    };
    if !write.direct {
      return None;
    }

    let home = match binding.kind {
      BindingKind::Var { has_init: false } => binding.declared_at?.function,
      BindingKind::Param => binding.owner?,
      _ => return None,
    };
    if write.function != home {
      return None;
    }
    if binding.reads.iter().any(|read| read.order < write.order)
      || !reads_follow(binding, bindings, home, write.order)
    {
      return None;
    }

    Some(ConstantVariable {
      id: target.id.to_id(),
      name: target.id.sym.clone(),
      expression: guard(&assign.right)?,
      origin: Origin::Assignment,
    })
  }

  pub fn binding<'b>(&self, bindings: &'b Bindings) -> Option<&'b Binding> {
    bindings.get(&self.id)
  }

  /// Delete the declarator, assignment statement or function declaration that gave this
  /// variable its value.
  pub fn remove(&self, module: &mut Module) {
    remove_all(module, std::slice::from_ref(self));
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> ConstantVariable<U> {
    ConstantVariable {
      id: self.id,
      name: self.name,
      expression: f(self.expression),
      origin: self.origin,
    }
  }
}

impl ConstantVariable<Box<Function>> {
  /// Resolve a function declaration that is never reassigned.
  pub fn resolve_function(declaration: &FnDecl, bindings: &Bindings) -> Option<Self> {
    let id = declaration.ident.to_id();
    let binding = bindings.get(&id)?;

    if binding.exported || !binding.is_constant() || binding.kind != BindingKind::Function {
      return None;
    }

    Some(ConstantVariable {
      id,
      name: declaration.ident.sym.clone(),
      expression: declaration.function.clone(),
      origin: Origin::FunctionDeclaration,
    })
  }
}

/// Finds every declarator and assignment statement that resolves to a constant variable.
struct ConstantCollector<'a, T, G> {
  bindings: &'a Bindings,
  guard: G,
  found: Vec<ConstantVariable<T>>,
}

impl<T, G: Fn(&Expr) -> Option<T>> Visit for ConstantCollector<'_, T, G> {
  fn visit_var_declarator(&mut self, declarator: &VarDeclarator) {
    self.found.extend(ConstantVariable::resolve_declarator(
      declarator,
      self.bindings,
      &self.guard,
    ));
    declarator.visit_children_with(self);
  }

  fn visit_expr_stmt(&mut self, stmt: &ExprStmt) {
    if let Expr::Assign(assign) = &*stmt.expr {
      self.found.extend(ConstantVariable::resolve_assignment(
        assign,
        true,
        self.bindings,
        &self.guard,
      ));
    }
    stmt.visit_children_with(self);
  }
}

/// Resolve every constant variable of `module` whose value passes `guard`, in source order.
pub fn collect_constants<T>(
  module: &Module,
  bindings: &Bindings,
  guard: impl Fn(&Expr) -> Option<T>,
) -> Vec<ConstantVariable<T>> {
  let mut collector = ConstantCollector {
    bindings,
    guard,
    found: vec![],
  };
  module.visit_with(&mut collector);
  collector.found
}

/// Remove several constant variables in one walk per origin.
pub fn remove_all<T>(module: &mut Module, variables: &[ConstantVariable<T>]) {
  let ids_with = |origins: &[Origin]| -> HashSet<Id> {
    variables
      .iter()
      .filter(|variable| origins.contains(&variable.origin))
      .map(|variable| variable.id.clone())
      .collect()
  };

  remove_declarations(
    module,
    &ids_with(&[Origin::Declaration, Origin::FunctionDeclaration]),
  );
  remove_assignments(module, &ids_with(&[Origin::Assignment]));
}
